use hanaframe::convert::ConverterRegistry;
use hanaframe::materialize::{Interrupt, RowLimit, materialize};
use hanaframe::output::truncation_message;

use crate::support::numbered_cursor;

fn limit(n: usize) -> RowLimit {
    RowLimit::new(n).unwrap()
}

#[test]
fn truncation_reported_when_limit_reached() {
    let mut cursor = numbered_cursor(150);
    let table = materialize(
        &mut cursor,
        &ConverterRegistry::hana(),
        limit(100),
        &Interrupt::none(),
    )
    .unwrap();

    let message = truncation_message(&table, limit(100)).expect("table filled the limit");
    assert!(message.contains("row limit of 100"), "Got: {}", message);
}

#[test]
fn no_truncation_below_limit() {
    let mut cursor = numbered_cursor(99);
    let table = materialize(
        &mut cursor,
        &ConverterRegistry::hana(),
        limit(100),
        &Interrupt::none(),
    )
    .unwrap();
    assert_eq!(truncation_message(&table, limit(100)), None);
}
