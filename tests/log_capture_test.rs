//! Structured log output of the ledger, health monitor and routing engine.

use std::collections::HashSet;

use rust_decimal_macros::dec;
use tracing::{error, info, warn};
use tracing_test::traced_test;

mod common;
use common::fixtures::*;
use common::log_capture::TestLogCapture;

#[test]
fn capture_sees_levels_and_fields() {
    let capture = TestLogCapture::start();

    info!(account = "alice", tx_id = 7, "Credit applied");
    warn!("Adjustment rejected");

    capture.assert_logged_at_level(tracing::Level::INFO, "Credit applied");
    capture.assert_logged_at_level(tracing::Level::WARN, "Adjustment rejected");
    capture.assert_field_logged("account", "alice");
    capture.assert_field_logged("tx_id", "7");
    capture.assert_not_logged("Debit applied");
}

#[test]
#[should_panic(expected = "Unexpected errors")]
fn capture_flags_error_events() {
    let capture = TestLogCapture::start();
    info!("fine");
    capture.assert_no_errors();

    error!("journal write failed");
    capture.assert_no_errors();
}

#[test]
fn rejected_debit_is_logged_with_reason() {
    let capture = TestLogCapture::start();
    let world = World::new(scenario_providers());
    world.fund("alice", dec!(1));

    let _ = world
        .ledger
        .debit("alice", dec!(5), TransactionMeta::usage("sage", "sage-max", 10, 10));

    let rejected = capture.matching("Debit rejected");
    assert_eq!(rejected.len(), 1);
    assert_eq!(rejected[0].level, tracing::Level::WARN);
    assert_eq!(rejected[0].field("reason"), Some("insufficient_funds"));
    assert_eq!(rejected[0].field("provider"), Some("sage"));
    capture.assert_no_errors();
}

#[test]
fn health_transition_is_logged_once() {
    let capture = TestLogCapture::start();
    let world = World::new(scenario_providers());

    world.take_down("swift");
    // Already down: no further transition.
    world.health.record("swift", 100, false);

    let changes = capture.matching("Provider health changed");
    let to_down: Vec<_> = changes
        .iter()
        .filter(|l| l.field("to") == Some("down"))
        .collect();
    assert_eq!(to_down.len(), 1);
    assert_eq!(to_down[0].field("provider"), Some("swift"));
}

#[test]
fn routing_decision_logs_choice_at_debug() {
    let capture = TestLogCapture::start();
    let world = World::new(scenario_providers());

    world
        .engine
        .select_provider(&pro_request("alice"), &HashSet::new())
        .unwrap();
    world
        .engine
        .select_provider(&pro_request("alice"), &HashSet::new())
        .unwrap();

    capture.assert_logged_at_level(tracing::Level::DEBUG, "Routing decision");
    capture.assert_logged("served from cache");
    capture.assert_field_logged("account", "alice");
}

#[traced_test]
#[test]
fn restored_ledger_logs_summary() {
    use llmroute::storage::SqliteJournal;
    use std::sync::Arc;

    let journal = Arc::new(SqliteJournal::open_in_memory().unwrap());
    let ledger = CreditLedger::with_journal(journal.clone());
    ledger
        .credit("alice", dec!(2), CreditKind::Purchase, TransactionMeta::default())
        .unwrap();

    let restored = CreditLedger::restore(journal).unwrap();

    assert_eq!(restored.balance("alice"), dec!(2));
    assert!(logs_contain("Ledger restored from journal"));
    assert!(logs_contain("accounts=1"));
}
