use std::process::ExitCode;
use std::sync::Arc;

use arbor::{
    application::{
        error::AppError,
        guard::{Actor, CapabilityGuard, GuardConfig},
        options::{CreateOptionCommand, OptionService, UpdateOptionCommand},
        repos::{OptionsRepo, TaxonomyRepo, TaxonomyWriteRepo, UserMetaRepo},
        taxonomy::{
            CreateNodeCommand, NodeFilter, ObjectNodeFilter, RelationshipCommand, TaxonomyConfig,
            TaxonomyService, UpdateNodeCommand,
        },
    },
    cache::{CacheConfig, OptionCache},
    config::{self, AutoloadArg, FilterArgs, OptionsCommand, TermsCommand},
    domain::{
        options::{Autoload, OptionNamespace},
        taxonomy::{Taxonomy, TermField, TermFields},
    },
    infra::{db::PostgresRepositories, error::InfraError, telemetry},
};
use serde::Serialize;
use serde_json::json;
use tracing::{Dispatch, Level, dispatcher, error, info};
use tracing_subscriber::fmt as tracing_fmt;

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => {
            report_application_error(&error);
            error.exit_code()
        }
    }
}

fn report_application_error(error: &AppError) {
    let report = error.report();
    let emit = || {
        error!(
            source = report.source,
            chain = ?report.messages,
            "{}",
            report.render()
        );
    };

    if dispatcher::has_been_set() {
        emit();
        return;
    }

    let subscriber = tracing_fmt()
        .with_max_level(Level::ERROR)
        .with_writer(std::io::stderr)
        .finish();
    let dispatch = Dispatch::new(subscriber);
    dispatcher::with_default(&dispatch, emit);
}

async fn run() -> Result<(), AppError> {
    let (cli_args, settings) = config::load_with_cli()?;
    telemetry::init(&settings.logging)?;

    let repositories = init_repositories(&settings).await?;
    let actor = cli_args.as_user.map_or(Actor::Anonymous, Actor::User);

    match cli_args.command {
        config::Command::Migrate => run_migrations(&repositories).await,
        config::Command::Options(command) => {
            let app = build_application_context(repositories, &settings);
            run_options(&app.options, actor, command).await
        }
        config::Command::Terms(command) => {
            let app = build_application_context(repositories, &settings);
            run_terms(&app.taxonomy, actor, command).await
        }
    }
}

async fn init_repositories(settings: &config::Settings) -> Result<Arc<PostgresRepositories>, AppError> {
    let url = settings.database.url.as_deref().ok_or_else(|| {
        InfraError::configuration("database.url is required (set ARBOR__DATABASE__URL or --database-url)")
    })?;

    let pool = PostgresRepositories::connect(url, settings.database.max_connections.get())
        .await
        .map_err(InfraError::from)?;

    Ok(Arc::new(PostgresRepositories::new(pool)))
}

async fn run_migrations(repositories: &PostgresRepositories) -> Result<(), AppError> {
    PostgresRepositories::run_migrations(repositories.pool())
        .await
        .map_err(InfraError::from)?;
    info!(target = "arbor::migrate", "database migrations applied");
    Ok(())
}

struct ApplicationContext {
    options: OptionService,
    taxonomy: TaxonomyService,
}

fn build_application_context(
    repositories: Arc<PostgresRepositories>,
    settings: &config::Settings,
) -> ApplicationContext {
    let options_repo: Arc<dyn OptionsRepo> = repositories.clone();
    let user_meta: Arc<dyn UserMetaRepo> = repositories.clone();
    let taxonomy_reader: Arc<dyn TaxonomyRepo> = repositories.clone();
    let taxonomy_writer: Arc<dyn TaxonomyWriteRepo> = repositories;

    let cache = Arc::new(OptionCache::new(
        options_repo.clone(),
        OptionNamespace::new(settings.tenant.option_prefix.clone()),
        CacheConfig::from(&settings.cache),
    ));
    let guard = CapabilityGuard::new(
        cache.clone(),
        user_meta,
        GuardConfig::from(&settings.guard),
    );

    ApplicationContext {
        options: OptionService::new(options_repo, cache.clone(), guard.clone()),
        taxonomy: TaxonomyService::new(
            taxonomy_reader,
            taxonomy_writer,
            cache,
            guard,
            TaxonomyConfig::from(&settings.taxonomy),
        ),
    }
}

async fn run_options(
    service: &OptionService,
    actor: Actor,
    command: OptionsCommand,
) -> Result<(), AppError> {
    match command {
        OptionsCommand::Get { name } => print_json(&service.get_value(&name).await?),
        OptionsCommand::Show { id } => {
            let record = service.find_by_id(actor, id).await?.ok_or(AppError::NotFound)?;
            print_json(&record)
        }
        OptionsCommand::Autoload => print_json(&service.autoload().await?),
        OptionsCommand::Create {
            name,
            value,
            autoload,
        } => {
            let record = service
                .create(
                    actor,
                    CreateOptionCommand {
                        name,
                        value,
                        autoload: autoload_flag(autoload),
                    },
                )
                .await?;
            print_json(&record)
        }
        OptionsCommand::Update {
            id,
            value,
            autoload,
        } => {
            let record = service
                .update(
                    actor,
                    UpdateOptionCommand {
                        id,
                        value,
                        autoload: autoload_flag(autoload),
                    },
                )
                .await?;
            print_json(&record)
        }
        OptionsCommand::Delete { id } => {
            service.delete(actor, id).await?;
            print_json(&json!({ "deleted": id }))
        }
        OptionsCommand::ResetCache => {
            service.reset_cache(actor).await?;
            print_json(&json!({ "reset": true }))
        }
    }
}

async fn run_terms(
    service: &TaxonomyService,
    actor: Actor,
    command: TermsCommand,
) -> Result<(), AppError> {
    match command {
        TermsCommand::Get { id, fields } => {
            let node = service
                .get(id, &parse_fields(&fields)?)
                .await?
                .ok_or(AppError::NotFound)?;
            print_json(&node)
        }
        TermsCommand::List { taxonomy, filter } => {
            let taxonomy = Taxonomy::new(taxonomy)?;
            let (filter, fields) = split_filter(filter)?;
            print_json(&service.list(&taxonomy, filter, &fields).await?)
        }
        TermsCommand::Categories {
            include_default,
            filter,
        } => {
            let (filter, fields) = split_filter(filter)?;
            print_json(
                &service
                    .list_categories(filter, include_default, &fields)
                    .await?,
            )
        }
        TermsCommand::Tags { filter } => {
            let (filter, fields) = split_filter(filter)?;
            print_json(&service.list_tags(filter, &fields).await?)
        }
        TermsCommand::Tree { taxonomy, group } => {
            let taxonomy = Taxonomy::new(taxonomy)?;
            print_json(&service.tree(&taxonomy, group, &TermFields::all()).await?)
        }
        TermsCommand::Create {
            taxonomy,
            name,
            slug,
            description,
            parent_id,
            group,
            object_id,
            order,
        } => {
            let created = service
                .create(
                    actor,
                    CreateNodeCommand {
                        slug,
                        description,
                        parent_id,
                        group,
                        object_id,
                        order,
                        ..CreateNodeCommand::new(Taxonomy::new(taxonomy)?, name)
                    },
                )
                .await?;
            print_json(&json!({
                "node": created.node,
                "relationship": created.relationship,
            }))
        }
        TermsCommand::Update {
            id,
            name,
            slug,
            description,
            parent_id,
            group,
        } => {
            let node = service
                .update(
                    actor,
                    UpdateNodeCommand {
                        id,
                        name,
                        slug,
                        description,
                        parent_id,
                        group,
                    },
                )
                .await?;
            print_json(&node)
        }
        TermsCommand::Delete { ids } => {
            let deleted = service.bulk_delete(actor, &ids).await?;
            print_json(&json!({ "deleted": deleted }))
        }
        TermsCommand::Relate {
            object_id,
            term_id,
            order,
        } => {
            let relationship = service
                .create_relationship(
                    actor,
                    RelationshipCommand {
                        object_id,
                        term_taxonomy_id: term_id,
                        order,
                    },
                )
                .await?;
            print_json(&relationship)
        }
        TermsCommand::Unrelate { object_id, term_id } => {
            service
                .delete_relationship(actor, object_id, term_id)
                .await?;
            print_json(&json!({ "object_id": object_id, "term_taxonomy_id": term_id }))
        }
        TermsCommand::ForObject {
            object_id,
            taxonomy,
            group,
            parent_id,
        } => {
            let filter = ObjectNodeFilter {
                object_id,
                taxonomy: Taxonomy::new(taxonomy)?,
                group,
                parent_id,
            };
            print_json(&service.list_by_object(filter, &TermFields::all()).await?)
        }
        TermsCommand::Relationships { object_id } => {
            print_json(&service.relationships_for_object(object_id).await?)
        }
    }
}

fn autoload_flag(arg: AutoloadArg) -> Autoload {
    match arg {
        AutoloadArg::Yes => Autoload::Yes,
        AutoloadArg::No => Autoload::No,
    }
}

/// An empty list selects every column.
fn parse_fields(raw: &[String]) -> Result<TermFields, AppError> {
    if raw.is_empty() {
        return Ok(TermFields::all());
    }
    raw.iter()
        .map(|field| field.trim().parse::<TermField>().map_err(AppError::from))
        .collect()
}

fn split_filter(args: FilterArgs) -> Result<(NodeFilter, TermFields), AppError> {
    let fields = parse_fields(&args.fields)?;
    let filter = NodeFilter {
        group: args.group,
        parent_id: args.parent_id,
        keyword: args.keyword,
        excludes: args.excludes,
    };
    Ok((filter, fields))
}

fn print_json<T: Serialize>(value: &T) -> Result<(), AppError> {
    let out = serde_json::to_string_pretty(value)
        .map_err(|err| InfraError::Io(std::io::Error::other(format!("failed to render output: {err}"))))?;
    println!("{out}");
    Ok(())
}
