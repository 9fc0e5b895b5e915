use thiserror::Error;

/// Raw, unclassified failure raised anywhere on the query or health path.
///
/// Callers outside this crate never see these directly; they are routed through
/// [`crate::classify::ErrorClassifier`] into a [`DomainError`] first.
#[derive(Debug, Error)]
pub enum HanaframeError {
    #[error("network: {message}")]
    Network {
        message: String,
        #[source]
        source: Option<std::io::Error>,
    },

    #[error("driver ({code}): {message}")]
    Driver {
        code: i32,
        message: String,
        #[source]
        source: Option<std::io::Error>,
    },

    #[error("conversion: column '{column}' ({type_name}) row {row}: {message}")]
    Conversion {
        column: String,
        type_name: String,
        row: usize,
        message: String,
    },

    #[error("macro: {message}")]
    Macro { message: String },

    #[error("query: {message}")]
    Query { message: String },

    #[error("cancelled: query was cancelled by the caller")]
    Cancelled,

    #[error("timeout: query timed out after {seconds}s")]
    Timeout { seconds: u64 },

    #[error("config: {message}")]
    Config { message: String },

    #[error("format: {message}")]
    Format { message: String },
}

/// Category a failure is presented under.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Network,
    DriverProtocol,
    Other,
}

/// A classified failure.
///
/// `Display` renders only the safe message. The verbose message may contain raw
/// driver or transport text and is meant for privileged callers and logs.
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct DomainError {
    pub kind: ErrorKind,
    pub message: String,
    pub verbose_message: String,
    pub code: Option<i32>,
    pub details_link: Option<String>,
}
