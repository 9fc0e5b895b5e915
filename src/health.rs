use std::sync::Arc;

use serde::Serialize;

use crate::backend::ConnectionPool;
use crate::classify::ErrorClassifier;
use crate::config::DataSourceInfo;
use crate::error::DomainError;
use crate::logging::Timer;
use crate::masking::ConfigSummary;

pub const HEALTH_OK_MESSAGE: &str = "Database Connection OK";
const PLUGIN_ID: &str = "hdb";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HealthState {
    Ok,
    Error,
}

/// Extra diagnosis shown to administrators only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HealthDetails {
    pub verbose_message: String,
    pub error_details_link: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HealthStatus {
    pub status: HealthState,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<HealthDetails>,
}

impl HealthStatus {
    pub fn ok() -> Self {
        Self {
            status: HealthState::Ok,
            message: HEALTH_OK_MESSAGE.to_string(),
            details: None,
        }
    }

    pub fn is_ok(&self) -> bool {
        self.status == HealthState::Ok
    }
}

/// Who is asking. Only used to decide whether details are attached.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Privilege {
    Admin,
    Viewer,
}

impl Privilege {
    pub fn from_role(role: &str) -> Self {
        if role.trim().eq_ignore_ascii_case("admin") {
            Privilege::Admin
        } else {
            Privilege::Viewer
        }
    }
}

pub struct HealthProber<P> {
    pool: Arc<P>,
    classifier: ErrorClassifier,
    summary: ConfigSummary,
}

impl<P: ConnectionPool> HealthProber<P> {
    /// The data source is reduced to a length-only summary up front; the prober
    /// never holds the password.
    pub fn new(pool: Arc<P>, classifier: ErrorClassifier, datasource: &DataSourceInfo) -> Self {
        Self {
            pool,
            classifier,
            summary: ConfigSummary::from_datasource(datasource),
        }
    }

    pub fn probe(&self, privilege: Privilege) -> HealthStatus {
        let timer = Timer::start();
        let err = match self.pool.ping() {
            Ok(()) => {
                tracing::debug!(elapsed_ms = timer.elapsed_ms() as u64, "health check ok");
                return HealthStatus::ok();
            }
            Err(err) => err,
        };

        let classified = self.classifier.classify(&err);
        self.log_failure(&classified);

        // Both roles see the same message; only admins get the diagnosis.
        let details = match privilege {
            Privilege::Admin => Some(HealthDetails {
                verbose_message: classified.verbose_message.clone(),
                error_details_link: classified.details_link.clone(),
            }),
            Privilege::Viewer => None,
        };

        HealthStatus {
            status: HealthState::Error,
            message: classified.message,
            details,
        }
    }

    fn log_failure(&self, classified: &DomainError) {
        match self.summary.to_json() {
            Ok(config) => tracing::error!(
                message_type = "ds_config_health_check_error_detailed",
                plugin_id = PLUGIN_ID,
                kind = ?classified.kind,
                error = %classified.verbose_message,
                config = %config,
                "health check failed"
            ),
            Err(_) => tracing::error!(
                message_type = "ds_config_health_check_error",
                plugin_id = PLUGIN_ID,
                kind = ?classified.kind,
                error = %classified.verbose_message,
                "health check failed"
            ),
        }
    }
}
