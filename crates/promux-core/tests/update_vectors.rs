//! Update payload vector tests.

#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]
#![allow(clippy::panic)]

use std::fs;

use promux_core::protocol::update::parse_updates;

fn load(name: &str) -> Vec<u8> {
    fs::read(format!("tests/vectors/{name}")).unwrap()
}

#[test]
fn parse_update_batch() {
    let updates = parse_updates(&load("updates.json")).unwrap();
    assert_eq!(updates.len(), 3);

    // omitted fields default to empty / zero
    assert_eq!(updates[0].name, "req_total");
    assert_eq!(updates[0].method, "inc");
    assert!(updates[0].label_values.is_empty());
    assert_eq!(updates[0].value, 0.0);

    assert_eq!(updates[1].label_values, vec!["worker1"]);
    assert_eq!(updates[1].value, 1_048_576.0);
}

#[test]
fn missing_method_fails_the_batch() {
    let payload = br#"[
        {"name": "req_total", "method": "inc"},
        {"name": "req_total"}
    ]"#;
    assert!(parse_updates(payload).is_err());
}

#[test]
fn malformed_batch_yields_nothing() {
    assert!(parse_updates(b"[{\"name\": ").is_err());
    assert!(parse_updates(b"{\"name\": \"x\", \"method\": \"inc\"}").is_err());
}
