//! E2E tests for the `llmroute` binary.
//!
//! Every invocation runs against a private temp directory: the journal,
//! config and catalog are passed explicitly and the `LLMROUTE_*` environment
//! is cleared.

use std::path::Path;

use assert_cmd::Command;
use llmroute::test_utils::{TestDir, make_test_catalog_toml};
use predicates::prelude::*;
use serde_json::Value;

struct Sandbox {
    dir: TestDir,
}

impl Sandbox {
    fn new() -> Self {
        let dir = TestDir::new();
        dir.create_file("catalog.toml", &make_test_catalog_toml());
        Self { dir }
    }

    fn cmd(&self) -> Command {
        self.cmd_with_catalog(&self.dir.file_path("catalog.toml"))
    }

    #[allow(deprecated)]
    fn cmd_with_catalog(&self, catalog: &Path) -> Command {
        let mut cmd = Command::cargo_bin("llmroute").unwrap();
        for key in [
            "LLMROUTE_CONFIG",
            "LLMROUTE_CATALOG",
            "LLMROUTE_CACHE_TTL",
            "LLMROUTE_PROBE_INTERVAL",
            "LLMROUTE_LOG",
            "LLMROUTE_LOG_FORMAT",
            "LLMROUTE_LOG_FILE",
            "RUST_LOG",
        ] {
            cmd.env_remove(key);
        }
        cmd.arg("--config")
            .arg(self.dir.file_path("config.toml"))
            .arg("--catalog")
            .arg(catalog)
            .arg("--journal")
            .arg(self.dir.file_path("ledger.sqlite"));
        cmd
    }

    /// Run with `--json`, assert success, and parse stdout.
    fn json(&self, args: &[&str]) -> Value {
        let output = self.cmd().arg("--json").args(args).output().unwrap();
        assert!(
            output.status.success(),
            "{args:?} failed: {}",
            String::from_utf8_lossy(&output.stderr)
        );
        serde_json::from_slice(&output.stdout).unwrap()
    }
}

#[test]
fn no_command_prints_quickstart() {
    Sandbox::new()
        .cmd()
        .assert()
        .success()
        .stdout(predicate::str::contains("QUICK START"));
}

#[test]
fn unknown_command_is_rejected() {
    Sandbox::new()
        .cmd()
        .arg("notacommand")
        .assert()
        .failure()
        .stderr(predicate::str::contains("unrecognized").or(predicate::str::contains("error")));
}

#[test]
fn catalog_lists_providers_and_filters_by_tier() {
    let sandbox = Sandbox::new();

    let all = sandbox.json(&["catalog"]);
    assert_eq!(all["schemaVersion"], "llmroute.v1");
    assert_eq!(all["command"], "catalog");
    assert_eq!(all["data"]["providers"].as_array().unwrap().len(), 2);

    let free = sandbox.json(&["catalog", "--tier", "free"]);
    let providers = free["data"]["providers"].as_array().unwrap();
    assert_eq!(providers.len(), 1);
    assert_eq!(providers[0]["id"], "local-llm");
}

#[test]
fn catalog_export_roundtrips_through_a_file() {
    let sandbox = Sandbox::new();
    let exported = sandbox.dir.file_path("exported.toml");

    sandbox
        .cmd()
        .args(["catalog", "--tier", "free", "--export"])
        .arg(&exported)
        .assert()
        .success()
        .stdout(predicate::str::contains("Wrote 1 providers"));

    let output = sandbox
        .cmd_with_catalog(&exported)
        .args(["--json", "catalog"])
        .output()
        .unwrap();
    assert!(output.status.success());
    let value: Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(value["data"]["providers"][0]["id"], "local-llm");
}

#[test]
fn invalid_catalog_file_exits_with_parse_error() {
    let sandbox = Sandbox::new();
    sandbox.dir.create_file("catalog.toml", "[[providers]]\nid = 42\n");

    sandbox
        .cmd()
        .arg("catalog")
        .assert()
        .code(3)
        .stderr(predicate::str::contains("error[LLMR-K"));
}

#[test]
fn ledger_credit_debit_balance_persist_across_runs() {
    let sandbox = Sandbox::new();

    let credit = sandbox.json(&["ledger", "credit", "alice", "10", "--note", "signup"]);
    assert_eq!(credit["data"]["accountId"], "alice");
    assert_eq!(credit["data"]["balance"], "10");
    assert_eq!(credit["data"]["txId"], 1);

    let debit = sandbox.json(&["ledger", "debit", "alice", "2.5"]);
    assert_eq!(debit["data"]["balance"], "7.5");
    assert_eq!(debit["data"]["txId"], 2);

    let balance = sandbox.json(&["ledger", "balance", "alice"]);
    assert_eq!(balance["data"][0]["balance"], "7.5");
    assert_eq!(balance["data"][0]["lifetimePurchased"], "10");
}

#[test]
fn ledger_human_output_shows_balance() {
    let sandbox = Sandbox::new();
    sandbox
        .cmd()
        .args(["ledger", "credit", "bob", "3"])
        .assert()
        .success()
        .stdout(predicate::str::contains("bob: balance"));

    sandbox
        .cmd()
        .args(["ledger", "balance"])
        .assert()
        .success()
        .stdout(predicate::str::contains("bob").and(predicate::str::contains("Monthly cap")));
}

#[test]
fn overdraft_exits_with_ledger_code_and_is_kept_in_history() {
    let sandbox = Sandbox::new();
    sandbox.json(&["ledger", "credit", "alice", "1"]);

    sandbox
        .cmd()
        .args(["ledger", "debit", "alice", "5"])
        .assert()
        .code(4)
        .stderr(predicate::str::contains("error[LLMR-L001]"));

    let history = sandbox.json(&["ledger", "history", "alice", "--rejected"]);
    assert_eq!(history["data"]["transactions"].as_array().unwrap().len(), 1);
    let rejected = history["data"]["rejected"].as_array().unwrap();
    assert_eq!(rejected.len(), 1);
    assert_eq!(rejected[0]["reason"], "insufficient_funds");

    let balance = sandbox.json(&["ledger", "balance", "alice"]);
    assert_eq!(balance["data"][0]["balance"], "1");
}

#[test]
fn json_errors_are_enveloped_on_stderr() {
    let sandbox = Sandbox::new();
    let output = sandbox
        .cmd()
        .args(["--json", "ledger", "cap", "nobody", "1"])
        .output()
        .unwrap();

    assert_eq!(output.status.code(), Some(4));
    // Log lines may precede the envelope; it is always the last line.
    let stderr = String::from_utf8(output.stderr).unwrap();
    let value: Value = serde_json::from_str(stderr.lines().last().unwrap()).unwrap();
    assert_eq!(value["command"], "error");
    assert_eq!(value["data"]["code"], "LLMR-L004");
}

#[test]
fn debit_of_never_credited_account_is_insufficient_funds() {
    let sandbox = Sandbox::new();
    sandbox
        .cmd()
        .args(["ledger", "debit", "nobody", "1"])
        .assert()
        .code(4)
        .stderr(predicate::str::contains("error[LLMR-L001]"));

    let history = sandbox.json(&["ledger", "history", "nobody", "--rejected"]);
    assert!(history["data"]["transactions"].as_array().unwrap().is_empty());
    let rejected = history["data"]["rejected"].as_array().unwrap();
    assert_eq!(rejected.len(), 1);
    assert_eq!(rejected[0]["balance"], "0");

    let balances = sandbox.json(&["ledger", "balance"]);
    assert!(balances["data"].as_array().unwrap().is_empty());
}

#[test]
fn monthly_cap_blocks_debits_until_cleared() {
    let sandbox = Sandbox::new();
    sandbox.json(&["ledger", "credit", "alice", "10"]);

    let cap = sandbox.json(&["ledger", "cap", "alice", "1"]);
    assert_eq!(cap["data"]["monthlyCap"], "1");

    sandbox
        .cmd()
        .args(["ledger", "debit", "alice", "2"])
        .assert()
        .code(4)
        .stderr(predicate::str::contains("LLMR-L003"));

    sandbox.json(&["ledger", "cap", "alice", "--clear"]);
    let debit = sandbox.json(&["ledger", "debit", "alice", "2"]);
    assert_eq!(debit["data"]["balance"], "8");
}

#[test]
fn invalid_amount_is_rejected() {
    let sandbox = Sandbox::new();
    sandbox
        .cmd()
        .args(["ledger", "credit", "alice", "lots"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("amount"));

    sandbox
        .cmd()
        .args(["ledger", "credit", "alice", "-1"])
        .assert()
        .code(4)
        .stderr(predicate::str::contains("LLMR-L002"));
}

#[test]
fn route_uses_ledger_balance_and_catalog() {
    let sandbox = Sandbox::new();
    sandbox.json(&["ledger", "credit", "alice", "10"]);

    let decision = sandbox.json(&["route", "--account", "alice", "--tier", "pro"]);
    assert_eq!(decision["command"], "route");
    assert_eq!(decision["data"]["primary"]["providerId"], "cloud");
    assert_eq!(decision["data"]["primary"]["modelId"], "large");
    assert_eq!(decision["data"]["fallbacks"][0]["providerId"], "local-llm");
    assert_eq!(decision["data"]["cacheHit"], false);
}

#[test]
fn route_free_tier_and_privacy_go_local() {
    let sandbox = Sandbox::new();

    let free = sandbox.json(&["route", "--account", "guest"]);
    assert_eq!(free["data"]["primary"]["providerId"], "local-llm");
    assert_eq!(free["data"]["cascadeStep"], "budget");

    let private = sandbox.json(&[
        "route", "--account", "guest", "--tier", "pro", "--credits", "50", "--privacy",
    ]);
    assert_eq!(private["data"]["primary"]["providerId"], "local-llm");
    assert_eq!(private["data"]["cascadeStep"], "privacy");
}

#[test]
fn route_human_output_explains_choice() {
    Sandbox::new()
        .cmd()
        .args(["route", "--account", "guest", "--tier", "pro", "--credits", "5"])
        .assert()
        .success()
        .stdout(
            predicate::str::contains("Route: cloud/large")
                .and(predicate::str::contains("Why: step=")),
        );
}

#[test]
fn catalog_human_output_is_panelled_without_color() {
    Sandbox::new()
        .cmd()
        .args(["catalog", "--no-color"])
        .assert()
        .success()
        .stdout(
            predicate::str::contains("cloud")
                .and(predicate::str::contains("Model"))
                .and(predicate::str::contains("\u{1b}[").not()),
        );
}

#[test]
fn route_without_eligible_provider_exits_2() {
    Sandbox::new()
        .cmd()
        .args(["route", "--account", "guest", "--tier", "pro", "--tokens", "1000000"])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("LLMR-R001"));
}

#[test]
fn route_rejects_unknown_dimension_values() {
    Sandbox::new()
        .cmd()
        .args(["route", "--account", "guest", "--task", "poetry"])
        .assert()
        .code(3)
        .stderr(predicate::str::contains("poetry"));
}

#[test]
fn config_reports_sources() {
    let sandbox = Sandbox::new();
    sandbox
        .dir
        .create_file("config.toml", "[cache]\nttl_secs = 120\n");

    let output = sandbox
        .cmd()
        .env("LLMROUTE_PROBE_INTERVAL", "45")
        .args(["--json", "config"])
        .output()
        .unwrap();
    assert!(output.status.success());
    let value: Value = serde_json::from_slice(&output.stdout).unwrap();
    let data = &value["data"];

    assert_eq!(data["cacheTtlSecs"], 120);
    assert_eq!(data["sources"]["cacheTtl"], "config_file");
    assert_eq!(data["probeIntervalSecs"], 45);
    assert_eq!(data["sources"]["probeInterval"], "env");
    assert_eq!(data["sources"]["journalPath"], "cli");
}

#[test]
fn invalid_env_override_exits_with_config_error() {
    Sandbox::new()
        .cmd()
        .env("LLMROUTE_CACHE_TTL", "soon")
        .arg("config")
        .assert()
        .code(3)
        .stderr(predicate::str::contains("LLMROUTE_CACHE_TTL"));
}
