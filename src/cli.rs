use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "hanaframe", about = "Time-series queries against SAP HANA with typed results")]
pub struct Cli {
    /// Path to config file
    #[arg(short = 'c', long, global = true, env = "HANAFRAME_CONFIG")]
    pub config: Option<PathBuf>,

    /// Emit diagnostics to stderr
    #[arg(short = 'v', long, global = true, env = "HANAFRAME_VERBOSE")]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Expand macros, run a query and print the typed result
    Query(QueryArgs),

    /// Check that the server is reachable
    Health(HealthArgs),
}

/// Connection settings shared by every subcommand.
#[derive(Args, Debug, Default, Clone)]
pub struct ConnectionArgs {
    /// HANA server as host:port
    #[arg(short = 's', long, env = "HANAFRAME_URL")]
    pub url: Option<String>,

    /// Database user
    #[arg(short = 'u', long, env = "HANAFRAME_USER")]
    pub user: Option<String>,

    /// Database password
    #[arg(short = 'p', long, env = "HANAFRAME_PASSWORD", hide_env_values = true)]
    pub password: Option<String>,

    /// Tenant database name
    #[arg(short = 'd', long, env = "HANAFRAME_DATABASE")]
    pub database: Option<String>,

    /// Default schema for unqualified names
    #[arg(long, env = "HANAFRAME_SCHEMA")]
    pub schema: Option<String>,

    /// Encrypt the connection with TLS
    #[arg(long, env = "HANAFRAME_ENCRYPT")]
    pub encrypt: bool,

    /// Skip server certificate validation
    #[arg(long, env = "HANAFRAME_TLS_SKIP_VERIFY")]
    pub tls_skip_verify: bool,

    /// Config file profile name
    #[arg(short = 'P', long, env = "HANAFRAME_PROFILE")]
    pub profile: Option<String>,
}

#[derive(Parser, Debug)]
pub struct QueryArgs {
    /// SQL query text, may contain $__ macros
    pub sql: Option<String>,

    /// Read SQL from file
    #[arg(short = 'f', long = "file", conflicts_with = "sql")]
    pub sql_file: Option<PathBuf>,

    /// Range start: RFC 3339, `now` or `now-<interval>`
    #[arg(long, default_value = "now-1h")]
    pub from: String,

    /// Range end: RFC 3339, `now` or `now-<interval>`
    #[arg(long, default_value = "now")]
    pub to: String,

    /// Bucket size for $__interval and $__timeGroup(col, $__interval)
    #[arg(short = 'i', long, default_value = "1m")]
    pub interval: String,

    /// Max rows to materialize (default: 1000000)
    #[arg(short = 'l', long, env = "HANAFRAME_ROW_LIMIT")]
    pub limit: Option<usize>,

    /// Query timeout in seconds (default: 60)
    #[arg(short = 't', long, env = "HANAFRAME_TIMEOUT")]
    pub timeout: Option<u64>,

    #[command(flatten)]
    pub connection: ConnectionArgs,
}

#[derive(Parser, Debug)]
pub struct HealthArgs {
    /// Caller role; `Admin` receives the detailed diagnosis
    #[arg(long, env = "HANAFRAME_ROLE", default_value = "Viewer")]
    pub role: String,

    #[command(flatten)]
    pub connection: ConnectionArgs,
}
