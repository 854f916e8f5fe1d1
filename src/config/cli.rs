use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum, builder::BoolishValueParser};

/// Command-line arguments for the Arbor binary.
#[derive(Debug, Parser)]
#[command(
    name = "arbor",
    version,
    about = "Taxonomy and option administration for Arbor"
)]
pub struct CliArgs {
    /// Optional path to a configuration file.
    #[arg(long = "config-file", env = "ARBOR_CONFIG_FILE", value_name = "PATH")]
    pub config_file: Option<PathBuf>,

    #[command(flatten)]
    pub overrides: GlobalOverrides,

    /// User id the command runs as; anonymous when omitted.
    #[arg(long = "as-user", env = "ARBOR_USER_ID", value_name = "ID", global = true)]
    pub as_user: Option<i64>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Args, Default, Clone)]
pub struct GlobalOverrides {
    /// Override the base log level (trace|debug|info|warn|error).
    #[arg(long = "log-level", value_name = "LEVEL", global = true)]
    pub log_level: Option<String>,

    /// Toggle JSON logging.
    #[arg(
        long = "log-json",
        value_name = "BOOL",
        value_parser = BoolishValueParser::new(),
        global = true
    )]
    pub log_json: Option<bool>,

    /// Override the database connection URL.
    #[arg(long = "database-url", value_name = "URL", global = true)]
    pub database_url: Option<String>,

    /// Override the database pool size.
    #[arg(long = "database-max-connections", value_name = "COUNT", global = true)]
    pub database_max_connections: Option<u32>,

    /// Override the tenant prefix applied to physical option names.
    #[arg(long = "option-prefix", value_name = "PREFIX", global = true)]
    pub option_prefix: Option<String>,

    /// Toggle the in-memory option cache.
    #[arg(
        long = "option-cache",
        value_name = "BOOL",
        value_parser = BoolishValueParser::new(),
        global = true
    )]
    pub option_cache: Option<bool>,
}

#[derive(Debug, Subcommand, Clone)]
pub enum Command {
    /// Apply pending database migrations.
    Migrate,
    /// Read and manage configuration options.
    #[command(subcommand)]
    Options(OptionsCommand),
    /// Read and manage taxonomy terms and their relationships.
    #[command(subcommand)]
    Terms(TermsCommand),
}

#[derive(Debug, Subcommand, Clone)]
pub enum OptionsCommand {
    /// Resolve a logical option name.
    Get { name: String },
    /// Print one stored option row.
    Show { id: i64 },
    /// Print every autoload option, prefixed rows winning.
    Autoload,
    /// Create a new option under the tenant prefix.
    Create {
        name: String,
        value: String,
        #[arg(long, value_enum, default_value_t = AutoloadArg::Yes)]
        autoload: AutoloadArg,
    },
    /// Replace the value of a stored option.
    Update {
        id: i64,
        value: String,
        #[arg(long, value_enum, default_value_t = AutoloadArg::Yes)]
        autoload: AutoloadArg,
    },
    /// Delete a stored option.
    Delete { id: i64 },
    /// Drop every cached option entry.
    ResetCache,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum AutoloadArg {
    Yes,
    No,
}

#[derive(Debug, Args, Default, Clone)]
pub struct FilterArgs {
    #[arg(long)]
    pub group: Option<i32>,
    #[arg(long = "parent")]
    pub parent_id: Option<i64>,
    #[arg(long)]
    pub keyword: Option<String>,
    /// Term ids to leave out; repeatable.
    #[arg(long = "exclude", value_name = "ID")]
    pub excludes: Vec<i64>,
    /// Comma-separated columns to select.
    #[arg(long, value_delimiter = ',', value_name = "FIELDS")]
    pub fields: Vec<String>,
}

#[derive(Debug, Subcommand, Clone)]
pub enum TermsCommand {
    /// Print one term.
    Get {
        id: i64,
        #[arg(long, value_delimiter = ',', value_name = "FIELDS")]
        fields: Vec<String>,
    },
    /// List terms of any taxonomy.
    List {
        taxonomy: String,
        #[command(flatten)]
        filter: FilterArgs,
    },
    /// List categories.
    Categories {
        /// Keep the configured default category in the listing.
        #[arg(long)]
        include_default: bool,
        #[command(flatten)]
        filter: FilterArgs,
    },
    /// List tags.
    Tags {
        #[command(flatten)]
        filter: FilterArgs,
    },
    /// Print a whole forest as nested JSON.
    Tree {
        taxonomy: String,
        #[arg(long, default_value_t = 0)]
        group: i32,
    },
    /// Create a term, optionally related to an object.
    Create {
        taxonomy: String,
        name: String,
        #[arg(long)]
        slug: Option<String>,
        #[arg(long, default_value = "")]
        description: String,
        #[arg(long = "parent", default_value_t = 0)]
        parent_id: i64,
        #[arg(long, default_value_t = 0)]
        group: i32,
        #[arg(long = "object")]
        object_id: Option<i64>,
        #[arg(long, default_value_t = 0)]
        order: i32,
    },
    /// Update a term.
    Update {
        id: i64,
        name: String,
        #[arg(long)]
        slug: Option<String>,
        #[arg(long, default_value = "")]
        description: String,
        #[arg(long = "parent", default_value_t = 0)]
        parent_id: i64,
        #[arg(long, default_value_t = 0)]
        group: i32,
    },
    /// Delete one or more terms. Relationship rows are kept.
    Delete {
        #[arg(required = true)]
        ids: Vec<i64>,
    },
    /// Relate an object to a term.
    Relate {
        object_id: i64,
        term_id: i64,
        #[arg(long, default_value_t = 0)]
        order: i32,
    },
    /// Remove a relationship.
    Unrelate { object_id: i64, term_id: i64 },
    /// List terms related to an object.
    ForObject {
        object_id: i64,
        taxonomy: String,
        #[arg(long)]
        group: Option<i32>,
        #[arg(long = "parent")]
        parent_id: Option<i64>,
    },
    /// List raw relationship rows of an object.
    Relationships { object_id: i64 },
}
