use std::io;

use hanaframe::classify::{
    DEFAULT_USER_ERROR, DRIVER_DOCS_LINK, ErrorClassifier, ErrorMessages, NETWORK_DOCS_LINK,
};
use hanaframe::error::{ErrorKind, HanaframeError};

use crate::support::{connection_refused, driver_301};

#[test]
fn network_refused_is_network() {
    let classified = ErrorClassifier::default().classify(&connection_refused());

    assert_eq!(classified.kind, ErrorKind::Network);
    assert!(
        classified.message.contains("failed to connect"),
        "Got: {}",
        classified.message
    );
    assert!(classified.verbose_message.contains("refused"));
    assert_eq!(classified.details_link.as_deref(), Some(NETWORK_DOCS_LINK));
    assert_eq!(classified.code, None);
}

#[test]
fn driver_code_is_driver_protocol() {
    let classified = ErrorClassifier::default().classify(&driver_301());

    assert_eq!(classified.kind, ErrorKind::DriverProtocol);
    assert!(classified.message.contains("301"), "Got: {}", classified.message);
    assert!(
        !classified.message.contains("unique constraint"),
        "backend text belongs in the verbose message only"
    );
    assert!(classified.verbose_message.contains("unique constraint violated"));
    assert_eq!(classified.code, Some(301));
    assert_eq!(classified.details_link.as_deref(), Some(DRIVER_DOCS_LINK));
}

#[test]
fn driver_without_code_omits_number() {
    let err = HanaframeError::Driver {
        code: 0,
        message: "generic failure".to_string(),
        source: None,
    };
    let classified = ErrorClassifier::default().classify(&err);
    assert_eq!(classified.kind, ErrorKind::DriverProtocol);
    assert!(!classified.message.contains("error number"));
}

#[test]
fn network_beats_driver_code() {
    let err = HanaframeError::Driver {
        code: 10709,
        message: "connection failed".to_string(),
        source: Some(io::Error::new(io::ErrorKind::TimedOut, "socket read timed out")),
    };
    let classified = ErrorClassifier::default().classify(&err);
    assert_eq!(classified.kind, ErrorKind::Network);
    assert!(classified.message.contains("socket read timed out"));
}

#[test]
fn reset_connection_under_driver_error_is_network() {
    let err = HanaframeError::Driver {
        code: 0,
        message: "fetch failed".to_string(),
        source: Some(io::Error::from(io::ErrorKind::ConnectionReset)),
    };
    assert_eq!(ErrorClassifier::default().classify(&err).kind, ErrorKind::Network);
}

#[test]
fn non_transport_io_cause_keeps_driver_kind() {
    let err = HanaframeError::Driver {
        code: 258,
        message: "insufficient privilege".to_string(),
        source: Some(io::Error::from(io::ErrorKind::NotFound)),
    };
    assert_eq!(
        ErrorClassifier::default().classify(&err).kind,
        ErrorKind::DriverProtocol
    );
}

#[test]
fn everything_else_is_other_with_configured_message() {
    let classifier = ErrorClassifier::new(ErrorMessages::with_default_error("Ask your admin"));
    let errors = [
        HanaframeError::Macro {
            message: "bad macro".to_string(),
        },
        HanaframeError::Conversion {
            column: "v".to_string(),
            type_name: "DOUBLE".to_string(),
            row: 3,
            message: "cannot parse \"abc\" as float".to_string(),
        },
        HanaframeError::Cancelled,
        HanaframeError::Timeout { seconds: 5 },
    ];
    for err in &errors {
        let classified = classifier.classify(err);
        assert_eq!(classified.kind, ErrorKind::Other, "{err}");
        assert_eq!(classified.message, "Ask your admin");
        assert_eq!(classified.verbose_message, err.to_string());
        assert_eq!(classified.details_link, None);
    }
}

#[test]
fn default_message_is_used_without_configuration() {
    let err = HanaframeError::Query {
        message: "boom".to_string(),
    };
    let classified = ErrorClassifier::default().classify(&err);
    assert_eq!(classified.message, DEFAULT_USER_ERROR);
    assert_eq!(classified.to_string(), DEFAULT_USER_ERROR);
}

#[test]
fn parse_failure_is_other_with_detail() {
    let err = HanaframeError::Conversion {
        column: "v".to_string(),
        type_name: "DOUBLE".to_string(),
        row: 0,
        message: "cannot parse \"abc\" as float".to_string(),
    };
    let classified = ErrorClassifier::default().classify(&err);
    assert_eq!(classified.kind, ErrorKind::Other);
    assert!(classified.verbose_message.contains("abc"));
}
