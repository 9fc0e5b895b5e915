use std::error::Error as StdError;
use std::io;

use crate::error::{DomainError, ErrorKind, HanaframeError};

pub const DEFAULT_USER_ERROR: &str = "Please inspect the server log for details";
pub const NETWORK_DOCS_LINK: &str =
    "https://grafana.com/docs/grafana/latest/datasources/mysql/#configure-the-data-source";
pub const DRIVER_DOCS_LINK: &str = "https://help.sap.com/docs/HANA_SERVICE_CF/7c78579ce9b14a669c1f3295b0d8ca16/20a78d3275191014b41bae7c4a46d835.html";

/// Fixed strings used when presenting classified errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorMessages {
    /// Safe message for anything that is neither a network nor a driver error.
    pub default_error: String,
    pub network_docs_link: String,
    pub driver_docs_link: String,
}

impl Default for ErrorMessages {
    fn default() -> Self {
        Self {
            default_error: DEFAULT_USER_ERROR.to_string(),
            network_docs_link: NETWORK_DOCS_LINK.to_string(),
            driver_docs_link: DRIVER_DOCS_LINK.to_string(),
        }
    }
}

impl ErrorMessages {
    pub fn with_default_error(default_error: impl Into<String>) -> Self {
        Self {
            default_error: default_error.into(),
            ..Self::default()
        }
    }
}

/// Maps raw failures into the Network / DriverProtocol / Other taxonomy.
#[derive(Debug, Clone, Default)]
pub struct ErrorClassifier {
    messages: ErrorMessages,
}

impl ErrorClassifier {
    pub fn new(messages: ErrorMessages) -> Self {
        Self { messages }
    }

    /// Network beats DriverProtocol: a transport fault anywhere in the source
    /// chain means the protocol exchange never completed.
    pub fn classify(&self, err: &HanaframeError) -> DomainError {
        let verbose_message = error_chain(err);

        if let Some(transport) = network_cause(err) {
            return DomainError {
                kind: ErrorKind::Network,
                message: format!(
                    "Network error: failed to connect to the server. Error message: {transport}"
                ),
                verbose_message,
                code: None,
                details_link: Some(self.messages.network_docs_link.clone()),
            };
        }

        if let HanaframeError::Driver { code, .. } = err {
            let mut message = "Database error: request rejected by the SAP HANA server".to_string();
            if *code > 0 {
                message.push_str(&format!(". HANA error number: {code}"));
            }
            return DomainError {
                kind: ErrorKind::DriverProtocol,
                message,
                verbose_message,
                code: Some(*code),
                details_link: Some(self.messages.driver_docs_link.clone()),
            };
        }

        DomainError {
            kind: ErrorKind::Other,
            message: self.messages.default_error.clone(),
            verbose_message,
            code: None,
            details_link: None,
        }
    }
}

/// Transport text of the first network-level fault in the chain, if any.
fn network_cause(err: &HanaframeError) -> Option<String> {
    if let HanaframeError::Network { message, source } = err {
        return Some(match source {
            Some(io_err) => io_err.to_string(),
            None => message.clone(),
        });
    }

    let mut current: Option<&(dyn StdError + 'static)> = Some(err as &(dyn StdError + 'static));
    while let Some(e) = current {
        if let Some(io_err) = e.downcast_ref::<io::Error>()
            && is_transport_fault(io_err.kind())
        {
            return Some(io_err.to_string());
        }
        current = e.source();
    }
    None
}

fn is_transport_fault(kind: io::ErrorKind) -> bool {
    matches!(
        kind,
        io::ErrorKind::ConnectionRefused
            | io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionAborted
            | io::ErrorKind::NotConnected
            | io::ErrorKind::TimedOut
            | io::ErrorKind::HostUnreachable
            | io::ErrorKind::NetworkUnreachable
            | io::ErrorKind::AddrNotAvailable
    )
}

/// `outer: inner: innermost`, skipping causes already contained in their parent's text.
fn error_chain(err: &HanaframeError) -> String {
    let mut text = err.to_string();
    let mut current = err.source();
    while let Some(cause) = current {
        let cause_text = cause.to_string();
        if !text.contains(&cause_text) {
            text.push_str(": ");
            text.push_str(&cause_text);
        }
        current = cause.source();
    }
    text
}
