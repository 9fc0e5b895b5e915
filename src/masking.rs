use secrecy::{ExposeSecret, SecretString};
use serde::Serialize;

use crate::config::DataSourceInfo;

/// Length of a secret, never its contents.
pub fn secret_len(secret: &SecretString) -> usize {
    secret.expose_secret().len()
}

/// Diagnostic view of a data source configuration.
///
/// Sensitive and identifying fields are reduced to their lengths so the summary
/// can go to logs as-is.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConfigSummary {
    pub config_url_length: usize,
    pub config_user_length: usize,
    pub config_database_length: usize,
    pub config_default_schema_length: usize,
    pub config_password_length: usize,
    pub config_max_open_conns: usize,
    pub config_max_idle_conns: usize,
    pub config_conn_max_life_time: u64,
    pub config_conn_timeout: u64,
    pub config_tls_encrypt: bool,
    pub config_tls_skip_verify: bool,
    pub config_server_name_length: usize,
    pub config_ssl_root_cert_file_length: usize,
}

impl ConfigSummary {
    pub fn from_datasource(ds: &DataSourceInfo) -> Self {
        Self {
            config_url_length: ds.url.len(),
            config_user_length: ds.user.len(),
            config_database_length: ds.database.len(),
            config_default_schema_length: ds.default_schema.as_deref().map_or(0, str::len),
            config_password_length: secret_len(&ds.password),
            config_max_open_conns: ds.pool.max_open,
            config_max_idle_conns: ds.pool.max_idle,
            config_conn_max_life_time: ds.pool.max_lifetime.as_secs(),
            config_conn_timeout: ds.connection_timeout_secs,
            config_tls_encrypt: ds.tls.encrypt,
            config_tls_skip_verify: ds.tls.skip_verify,
            config_server_name_length: ds.tls.server_name.as_deref().map_or(0, str::len),
            config_ssl_root_cert_file_length: ds
                .tls
                .root_cert_file
                .as_ref()
                .map_or(0, |p| p.as_os_str().len()),
        }
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}
