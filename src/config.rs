use crate::classify::{DEFAULT_USER_ERROR, ErrorMessages};
use crate::cli::ConnectionArgs;
use crate::error::HanaframeError;
use crate::materialize::RowLimit;
use directories::ProjectDirs;
use secrecy::SecretString;
use serde::Deserialize;
use std::collections::HashMap;
use std::num::NonZeroUsize;
use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_ROW_LIMIT: NonZeroUsize = NonZeroUsize::new(1_000_000).unwrap();
pub const DEFAULT_QUERY_TIMEOUT_SECS: u64 = 60;
pub const DEFAULT_CONNECTION_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_MAX_OPEN_CONNS: usize = 100;
pub const DEFAULT_MAX_IDLE_CONNS: usize = 100;
pub const DEFAULT_CONN_MAX_LIFETIME_SECS: u64 = 14_400;

/// Top-level application configuration.
#[derive(Debug)]
pub struct AppConfig {
    pub datasource: DataSourceInfo,
    pub plugin: PluginConfig,
    pub query_timeout_secs: u64,
    pub verbose: bool,
}

/// Where and how to connect. Built once; the password is already decrypted.
#[derive(Debug)]
pub struct DataSourceInfo {
    /// `host:port`
    pub url: String,
    pub user: String,
    pub database: String,
    pub default_schema: Option<String>,
    pub password: SecretString,
    pub tls: TlsSettings,
    pub pool: PoolSettings,
    pub connection_timeout_secs: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TlsSettings {
    pub encrypt: bool,
    pub skip_verify: bool,
    pub server_name: Option<String>,
    pub root_cert_file: Option<PathBuf>,
}

/// Connection pool policy, consumed once when the pool is built.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolSettings {
    pub max_open: usize,
    pub max_idle: usize,
    /// Zero means connections never age out.
    pub max_lifetime: Duration,
}

impl PoolSettings {
    /// Whether a connection opened `age` ago must be closed instead of reused.
    pub fn is_expired(&self, age: Duration) -> bool {
        !self.max_lifetime.is_zero() && age >= self.max_lifetime
    }
}

impl Default for PoolSettings {
    fn default() -> Self {
        Self {
            max_open: DEFAULT_MAX_OPEN_CONNS,
            max_idle: DEFAULT_MAX_IDLE_CONNS,
            max_lifetime: Duration::from_secs(DEFAULT_CONN_MAX_LIFETIME_SECS),
        }
    }
}

/// Settings handed to the query path.
#[derive(Debug, Clone)]
pub struct PluginConfig {
    pub row_limit: RowLimit,
    /// Column names the frame consumer treats as time. Passed through unchanged.
    pub time_column_names: Vec<String>,
    /// Column types the frame consumer treats as metric labels. Passed through unchanged.
    pub metric_column_types: Vec<String>,
    pub error_messages: ErrorMessages,
}

impl Default for PluginConfig {
    fn default() -> Self {
        Self {
            row_limit: RowLimit::from(DEFAULT_ROW_LIMIT),
            time_column_names: vec!["time".to_string(), "time_sec".to_string()],
            metric_column_types: ["CHAR", "VARCHAR", "TINYTEXT", "TEXT", "MEDIUMTEXT", "LONGTEXT"]
                .into_iter()
                .map(String::from)
                .collect(),
            error_messages: ErrorMessages::default(),
        }
    }
}

// --- TOML config file structs ---

#[derive(Debug, Deserialize, Default)]
struct TomlConfig {
    #[serde(default)]
    defaults: TomlDefaults,
    #[serde(default)]
    profiles: HashMap<String, TomlProfile>,
}

#[derive(Debug, Deserialize, Default)]
struct TomlDefaults {
    row_limit: Option<usize>,
    timeout: Option<u64>,
    verbose: Option<bool>,
    max_open_conns: Option<usize>,
    max_idle_conns: Option<usize>,
    conn_max_lifetime: Option<u64>,
    user_facing_default_error: Option<String>,
}

#[derive(Debug, Deserialize, Default, Clone)]
struct TomlProfile {
    url: Option<String>,
    user: Option<String>,
    password: Option<String>,
    password_env: Option<String>,
    database: Option<String>,
    default_schema: Option<String>,
    encrypt: Option<bool>,
    tls_skip_verify: Option<bool>,
    tls_server_name: Option<String>,
    tls_root_cert_file: Option<PathBuf>,
    connection_timeout: Option<u64>,
    max_open_conns: Option<usize>,
    max_idle_conns: Option<usize>,
    conn_max_lifetime: Option<u64>,
}

/// Config path resolution result, distinguishing explicit vs auto-resolved paths.
struct ResolvedConfigPath {
    path: PathBuf,
    /// true if user explicitly specified via --config or HANAFRAME_CONFIG
    explicit: bool,
}

/// Resolve the config file path: --config flag > env var > platform default.
fn resolve_config_path(cli_config: Option<&PathBuf>) -> Option<ResolvedConfigPath> {
    if let Some(path) = cli_config {
        return Some(ResolvedConfigPath { path: path.clone(), explicit: true });
    }
    if let Some(path) = env_non_empty("HANAFRAME_CONFIG") {
        return Some(ResolvedConfigPath { path: PathBuf::from(path), explicit: true });
    }
    ProjectDirs::from("", "", "hanaframe").map(|dirs| ResolvedConfigPath {
        path: dirs.config_dir().join("config.toml"),
        explicit: false,
    })
}

/// Load and parse the TOML config file (if it exists).
fn load_toml_config(resolved: Option<&ResolvedConfigPath>) -> Result<TomlConfig, HanaframeError> {
    let Some(resolved) = resolved else {
        return Ok(TomlConfig::default());
    };

    if !resolved.path.exists() {
        if resolved.explicit {
            return Err(HanaframeError::Config {
                message: format!("config file not found: {}", resolved.path.display()),
            });
        }
        return Ok(TomlConfig::default());
    }

    let content = std::fs::read_to_string(&resolved.path).map_err(|e| HanaframeError::Config {
        message: format!("cannot read config file {}: {}", resolved.path.display(), e),
    })?;

    toml::from_str(&content).map_err(|e| HanaframeError::Config {
        message: format!("invalid config file {}: {}", resolved.path.display(), e),
    })
}

/// `Some` only for a non-empty string.
pub fn non_empty(value: Option<&str>) -> Option<&str> {
    value.filter(|v| !v.is_empty())
}

/// Read an env var, treating unset and empty the same way.
pub fn env_non_empty(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.is_empty())
}

/// Resolve a secret from direct value, env indirection, or fallback env var.
fn resolve_secret(
    direct: Option<&str>,
    env_key: Option<&str>,
    fallback_env: &str,
) -> Option<SecretString> {
    if let Some(val) = non_empty(direct) {
        return Some(SecretString::from(val.to_string()));
    }
    if let Some(val) = env_key.and_then(env_non_empty) {
        return Some(SecretString::from(val));
    }
    env_non_empty(fallback_env).map(SecretString::from)
}

fn required(value: Option<&str>, what: &str) -> Result<String, HanaframeError> {
    non_empty(value)
        .map(str::to_string)
        .ok_or_else(|| HanaframeError::Config {
            message: format!("no {what} specified (use a flag, env var or profile)"),
        })
}

/// Build AppConfig from connection flags plus the per-command overrides.
pub fn load(
    connection: &ConnectionArgs,
    row_limit: Option<usize>,
    timeout: Option<u64>,
    verbose: bool,
    config_path: Option<&PathBuf>,
) -> Result<AppConfig, HanaframeError> {
    let resolved_path = resolve_config_path(config_path);
    let toml_config = load_toml_config(resolved_path.as_ref())?;

    let profile = connection
        .profile
        .as_ref()
        .map(|name| {
            toml_config.profiles.get(name).cloned().ok_or_else(|| HanaframeError::Config {
                message: format!("profile '{}' not found in config file", name),
            })
        })
        .transpose()?
        .unwrap_or_default();
    let defaults = &toml_config.defaults;

    let url = required(connection.url.as_deref().or(profile.url.as_deref()), "server url")?;
    let user = required(connection.user.as_deref().or(profile.user.as_deref()), "user")?;

    let password = resolve_secret(
        connection.password.as_deref(),
        profile.password_env.as_deref(),
        "HANAFRAME_PASSWORD",
    )
    .or_else(|| {
        non_empty(profile.password.as_deref()).map(|p| SecretString::from(p.to_string()))
    })
    .ok_or_else(|| HanaframeError::Config {
        message: "no password specified".to_string(),
    })?;

    let database = connection
        .database
        .as_deref()
        .or(profile.database.as_deref())
        .unwrap_or_default()
        .to_string();

    let default_schema = non_empty(connection.schema.as_deref().or(profile.default_schema.as_deref()))
        .map(str::to_string);

    let tls = TlsSettings {
        encrypt: connection.encrypt || profile.encrypt.unwrap_or(false),
        skip_verify: connection.tls_skip_verify || profile.tls_skip_verify.unwrap_or(false),
        server_name: profile.tls_server_name.clone(),
        root_cert_file: profile.tls_root_cert_file.clone(),
    };

    let pool = PoolSettings {
        max_open: profile
            .max_open_conns
            .or(defaults.max_open_conns)
            .unwrap_or(DEFAULT_MAX_OPEN_CONNS),
        max_idle: profile
            .max_idle_conns
            .or(defaults.max_idle_conns)
            .unwrap_or(DEFAULT_MAX_IDLE_CONNS),
        max_lifetime: Duration::from_secs(
            profile
                .conn_max_lifetime
                .or(defaults.conn_max_lifetime)
                .unwrap_or(DEFAULT_CONN_MAX_LIFETIME_SECS),
        ),
    };
    if pool.max_open == 0 {
        return Err(HanaframeError::Config {
            message: "max_open_conns must be at least 1".to_string(),
        });
    }

    // row_limit: CLI/ENV > TOML > built-in; zero anywhere falls through
    let default_limit = defaults
        .row_limit
        .and_then(RowLimit::new)
        .unwrap_or(RowLimit::from(DEFAULT_ROW_LIMIT));
    let row_limit = RowLimit::resolve(row_limit, default_limit);

    let default_error = defaults
        .user_facing_default_error
        .clone()
        .unwrap_or_else(|| DEFAULT_USER_ERROR.to_string());

    let query_timeout_secs = timeout
        .or(defaults.timeout)
        .unwrap_or(DEFAULT_QUERY_TIMEOUT_SECS);

    let verbose = verbose || defaults.verbose.unwrap_or(false);

    Ok(AppConfig {
        datasource: DataSourceInfo {
            url,
            user,
            database,
            default_schema,
            password,
            tls,
            pool,
            connection_timeout_secs: profile
                .connection_timeout
                .unwrap_or(DEFAULT_CONNECTION_TIMEOUT_SECS),
        },
        plugin: PluginConfig {
            row_limit,
            error_messages: ErrorMessages::with_default_error(default_error),
            ..PluginConfig::default()
        },
        query_timeout_secs,
        verbose,
    })
}
