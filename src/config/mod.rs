//! Configuration layer: typed settings with layered precedence (file → env → CLI).

mod cli;

use std::{num::NonZeroU32, str::FromStr};

use clap::Parser;
use config::{Config, Environment, File};
use serde::Deserialize;
use thiserror::Error;
use tracing::level_filters::LevelFilter;

pub use cli::{
    AutoloadArg, CliArgs, Command, FilterArgs, GlobalOverrides, OptionsCommand, TermsCommand,
};

const DEFAULT_CONFIG_BASENAME: &str = "config/default";
const LOCAL_CONFIG_BASENAME: &str = "arbor";
const ENV_PREFIX: &str = "ARBOR";
const DEFAULT_DB_MAX_CONNECTIONS: u32 = 5;
const DEFAULT_OPTION_PREFIX: &str = "arbor_";
const DEFAULT_CATEGORY_OPTION: &str = "default_category";
const DEFAULT_MAX_TREE_DEPTH: usize = 16;
const MAX_TREE_DEPTH_LIMIT: usize = 256;
const DEFAULT_ROLE_MAP_OPTION: &str = "user_roles";
const DEFAULT_ROLE_META_KEY: &str = "role";
const MAX_OPTION_PREFIX_CHARS: usize = 32;

#[derive(Debug, Clone)]
pub struct Settings {
    pub logging: LoggingSettings,
    pub database: DatabaseSettings,
    pub tenant: TenantSettings,
    pub cache: CacheSettings,
    pub taxonomy: TaxonomySettings,
    pub guard: GuardSettings,
}

#[derive(Debug, Clone)]
pub struct LoggingSettings {
    pub level: LevelFilter,
    pub format: LogFormat,
}

#[derive(Debug, Clone, Copy)]
pub enum LogFormat {
    Json,
    Compact,
}

#[derive(Debug, Clone)]
pub struct DatabaseSettings {
    pub url: Option<String>,
    pub max_connections: NonZeroU32,
}

#[derive(Debug, Clone)]
pub struct TenantSettings {
    /// Prepended to logical option names to form the tenant's physical keys.
    pub option_prefix: String,
}

#[derive(Debug, Clone)]
pub struct CacheSettings {
    pub enable_option_cache: bool,
}

#[derive(Debug, Clone)]
pub struct TaxonomySettings {
    pub default_category_option: String,
    pub max_tree_depth: usize,
}

#[derive(Debug, Clone)]
pub struct GuardSettings {
    pub role_map_option: String,
    pub role_meta_key: String,
}

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("failed to build configuration: {0}")]
    Build(#[from] config::ConfigError),
    #[error("invalid configuration for `{key}`: {reason}")]
    Invalid { key: &'static str, reason: String },
}

impl LoadError {
    fn invalid(key: &'static str, reason: impl Into<String>) -> Self {
        Self::Invalid {
            key,
            reason: reason.into(),
        }
    }
}

/// Load settings from files, `ARBOR__*` environment variables and CLI overrides.
pub fn load(cli: &CliArgs) -> Result<Settings, LoadError> {
    let mut builder = Config::builder()
        .add_source(File::with_name(DEFAULT_CONFIG_BASENAME).required(false))
        .add_source(File::with_name(LOCAL_CONFIG_BASENAME).required(false));

    if let Some(path) = cli.config_file.as_ref() {
        builder = builder.add_source(File::from(path.as_path()).required(true));
    }

    builder = builder.add_source(Environment::with_prefix(ENV_PREFIX).separator("__"));

    let mut raw: RawSettings = builder.build()?.try_deserialize()?;
    raw.apply_overrides(&cli.overrides);

    Settings::from_raw(raw)
}

/// Parse process arguments and load settings for them.
pub fn load_with_cli() -> Result<(CliArgs, Settings), LoadError> {
    let args = CliArgs::parse();
    let settings = load(&args)?;
    Ok((args, settings))
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawSettings {
    logging: RawLoggingSettings,
    database: RawDatabaseSettings,
    tenant: RawTenantSettings,
    cache: RawCacheSettings,
    taxonomy: RawTaxonomySettings,
    guard: RawGuardSettings,
}

impl RawSettings {
    fn apply_overrides(&mut self, overrides: &GlobalOverrides) {
        if let Some(level) = overrides.log_level.as_ref() {
            self.logging.level = Some(level.clone());
        }
        if let Some(json) = overrides.log_json {
            self.logging.json = Some(json);
        }
        if let Some(url) = overrides.database_url.as_ref() {
            self.database.url = Some(url.clone());
        }
        if let Some(max) = overrides.database_max_connections {
            self.database.max_connections = Some(max);
        }
        if let Some(prefix) = overrides.option_prefix.as_ref() {
            self.tenant.option_prefix = Some(prefix.clone());
        }
        if let Some(enabled) = overrides.option_cache {
            self.cache.enable_option_cache = Some(enabled);
        }
    }
}

impl Settings {
    fn from_raw(raw: RawSettings) -> Result<Self, LoadError> {
        let RawSettings {
            logging,
            database,
            tenant,
            cache,
            taxonomy,
            guard,
        } = raw;

        Ok(Self {
            logging: build_logging_settings(logging)?,
            database: build_database_settings(database)?,
            tenant: build_tenant_settings(tenant)?,
            cache: CacheSettings {
                enable_option_cache: cache.enable_option_cache.unwrap_or(true),
            },
            taxonomy: build_taxonomy_settings(taxonomy)?,
            guard: build_guard_settings(guard)?,
        })
    }
}

fn build_logging_settings(logging: RawLoggingSettings) -> Result<LoggingSettings, LoadError> {
    let level = match logging.level {
        Some(level) => LevelFilter::from_str(level.as_str()).map_err(|err| {
            LoadError::invalid("logging.level", format!("failed to parse: {err}"))
        })?,
        None => LevelFilter::INFO,
    };

    let format = if logging.json.unwrap_or(false) {
        LogFormat::Json
    } else {
        LogFormat::Compact
    };

    Ok(LoggingSettings { level, format })
}

fn build_database_settings(database: RawDatabaseSettings) -> Result<DatabaseSettings, LoadError> {
    let url = database.url.and_then(|value| {
        let trimmed = value.trim();
        (!trimmed.is_empty()).then(|| trimmed.to_string())
    });

    let max_connections = database
        .max_connections
        .unwrap_or(DEFAULT_DB_MAX_CONNECTIONS);
    let max_connections = NonZeroU32::new(max_connections).ok_or_else(|| {
        LoadError::invalid("database.max_connections", "must be greater than zero")
    })?;

    Ok(DatabaseSettings {
        url,
        max_connections,
    })
}

fn build_tenant_settings(tenant: RawTenantSettings) -> Result<TenantSettings, LoadError> {
    let option_prefix = tenant
        .option_prefix
        .unwrap_or_else(|| DEFAULT_OPTION_PREFIX.to_string());

    if option_prefix.chars().count() > MAX_OPTION_PREFIX_CHARS {
        return Err(LoadError::invalid(
            "tenant.option_prefix",
            format!("must be at most {MAX_OPTION_PREFIX_CHARS} characters"),
        ));
    }
    if !option_prefix
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '_')
    {
        return Err(LoadError::invalid(
            "tenant.option_prefix",
            "only ASCII letters, digits and `_` are allowed",
        ));
    }

    Ok(TenantSettings { option_prefix })
}

fn build_taxonomy_settings(taxonomy: RawTaxonomySettings) -> Result<TaxonomySettings, LoadError> {
    let default_category_option = required_name(
        taxonomy.default_category_option,
        DEFAULT_CATEGORY_OPTION,
        "taxonomy.default_category_option",
    )?;

    let max_tree_depth = taxonomy.max_tree_depth.unwrap_or(DEFAULT_MAX_TREE_DEPTH);
    if max_tree_depth == 0 || max_tree_depth > MAX_TREE_DEPTH_LIMIT {
        return Err(LoadError::invalid(
            "taxonomy.max_tree_depth",
            format!("must be between 1 and {MAX_TREE_DEPTH_LIMIT}"),
        ));
    }

    Ok(TaxonomySettings {
        default_category_option,
        max_tree_depth,
    })
}

fn build_guard_settings(guard: RawGuardSettings) -> Result<GuardSettings, LoadError> {
    Ok(GuardSettings {
        role_map_option: required_name(
            guard.role_map_option,
            DEFAULT_ROLE_MAP_OPTION,
            "guard.role_map_option",
        )?,
        role_meta_key: required_name(
            guard.role_meta_key,
            DEFAULT_ROLE_META_KEY,
            "guard.role_meta_key",
        )?,
    })
}

fn required_name(
    value: Option<String>,
    default: &str,
    key: &'static str,
) -> Result<String, LoadError> {
    let value = value.unwrap_or_else(|| default.to_string());
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(LoadError::invalid(key, "must not be empty"));
    }
    Ok(trimmed.to_string())
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawLoggingSettings {
    level: Option<String>,
    json: Option<bool>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawDatabaseSettings {
    url: Option<String>,
    max_connections: Option<u32>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawTenantSettings {
    option_prefix: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawCacheSettings {
    enable_option_cache: Option<bool>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawTaxonomySettings {
    default_category_option: Option<String>,
    max_tree_depth: Option<usize>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawGuardSettings {
    role_map_option: Option<String>,
    role_meta_key: Option<String>,
}
