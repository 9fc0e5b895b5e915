use crate::error::DomainError;
use crate::materialize::{ResultTable, RowLimit};

/// Print rendered output to stdout.
pub fn print_result(rendered: &str) {
    println!("{}", rendered);
}

/// Print the safe message of a classified error to stderr: `error: <message>`.
pub fn print_error(err: &DomainError) {
    eprintln!("error: {}", err);
}

/// Print a raw message to stderr for failures that happen before a query runs.
pub fn print_setup_error(message: &str) {
    eprintln!("error: {}", message);
}

/// A table that filled the limit may have been cut short.
pub fn truncation_message(table: &ResultTable, limit: RowLimit) -> Option<String> {
    (table.row_count() == limit.get()).then(|| {
        format!(
            "result reached the row limit of {}; more rows may exist",
            limit.get()
        )
    })
}

/// Print a truncation warning to stderr. Format: `warning: {message}`.
pub fn print_truncation_warning(message: &str) {
    eprintln!("warning: {}", message);
}
