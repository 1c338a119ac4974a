// crates/chainpulse-cli/tests/pipeline_commands.rs
// ============================================================================
// Module: CLI Pipeline Command Tests
// Description: End-to-end runs of the chainpulse binary.
// Purpose: Ensure ledger, analysis, listing, and verification commands agree.
// Dependencies: chainpulse-cli binary, chainpulse-core, serde_json, tempfile
// ============================================================================

//! ## Overview
//! Drives the binary against a temporary ledger state file and `SQLite`
//! store, checking that committed content verifies and tampered content
//! does not.

#![allow(
    clippy::panic,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::use_debug,
    clippy::panic_in_result_fn,
    clippy::unwrap_in_result,
    reason = "Test-only assertions and helpers are permitted."
)]

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fs;
use std::path::Path;
use std::path::PathBuf;
use std::process::Command;
use std::process::Output;
use std::process::Stdio;

use chainpulse_core::CanonicalVersion;
use chainpulse_core::InsightDraft;
use chainpulse_core::canonical_string;
use serde_json::Value;
use tempfile::TempDir;

// ============================================================================
// SECTION: Helpers
// ============================================================================

const DRAFTS: &str = r#"[
  {"category":"RISK","title":"X","summary":"Y","fullAnalysis":"","sentimentScore":-40,"confidence":70,"dataPoints":[]},
  {"category":"TREND","title":"TVL climbing","summary":"Inflows across BSC lending","fullAnalysis":"detail","sentimentScore":35,"confidence":64,"dataPoints":["tvl +4%"]}
]"#;

/// Wraps draft JSON in the generator response envelope.
fn response(drafts: &str) -> String {
    format!("{{\"insights\": {drafts}}}")
}

struct Workspace {
    dir: TempDir,
    config: PathBuf,
}

impl Workspace {
    fn new() -> Self {
        let dir = TempDir::new().expect("tempdir");
        let config = dir.path().join("chainpulse.toml");
        let text = format!(
            "[writer]\naddress = \"0x2222222222222222222222222222222222222222\"\n\n[ledger]\nstate_path = '{}'\n\n[store]\npath = '{}'\n\n[audit]\nenabled = false\n",
            dir.path().join("ledger.json").display(),
            dir.path().join("insights.db").display(),
        );
        fs::write(&config, text).expect("write config");
        Self {
            dir,
            config,
        }
    }

    fn path(&self, name: &str) -> PathBuf {
        self.dir.path().join(name)
    }

    fn run(&self, args: &[&str]) -> Output {
        Command::new(env!("CARGO_BIN_EXE_chainpulse"))
            .arg("--config")
            .arg(&self.config)
            .args(args)
            .output()
            .expect("run chainpulse")
    }

    fn run_json(&self, args: &[&str]) -> Value {
        let output = self.run(args);
        assert!(
            output.status.success(),
            "command {args:?} failed: {}",
            String::from_utf8_lossy(&output.stderr)
        );
        serde_json::from_slice(&output.stdout).expect("json output")
    }

    fn write(&self, name: &str, contents: &str) -> PathBuf {
        let path = self.path(name);
        fs::write(&path, contents).expect("write input");
        path
    }
}

fn arg(path: &Path) -> String {
    path.display().to_string()
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[test]
fn config_validate_and_example() {
    let workspace = Workspace::new();
    let output = workspace.run(&["config", "validate"]);
    assert!(output.status.success());
    assert_eq!(String::from_utf8_lossy(&output.stdout).trim(), "config ok");

    let example = workspace.run(&["config", "example"]);
    assert!(example.status.success());
    assert!(String::from_utf8_lossy(&example.stdout).contains("[writer]"));
}

#[test]
fn commands_fail_closed_without_ledger_state() {
    let workspace = Workspace::new();
    let output = workspace.run(&["predictions"]);
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("chainpulse ledger init"));
}

#[test]
fn ledger_init_show_and_rotation() {
    let workspace = Workspace::new();
    let init = workspace.run_json(&["ledger", "init"]);
    assert_eq!(init["owner"], "0x2222222222222222222222222222222222222222");
    assert_eq!(init["predictionCount"], 0);
    assert_eq!(init["chainId"], 97);

    let again = workspace.run(&["ledger", "init"]);
    assert!(!again.status.success());
    assert!(String::from_utf8_lossy(&again.stderr).contains("already exists"));

    let rotated = workspace.run_json(&[
        "ledger",
        "set-agent",
        "--agent",
        "0x3333333333333333333333333333333333333333",
    ]);
    assert_eq!(rotated["agent"], "0x3333333333333333333333333333333333333333");
    assert_eq!(rotated["nonce"], 1);

    let outsider = workspace.run(&[
        "ledger",
        "transfer-ownership",
        "--new-owner",
        "0x4444444444444444444444444444444444444444",
        "--caller",
        "0x5555555555555555555555555555555555555555",
    ]);
    assert!(!outsider.status.success());

    let show = workspace.run_json(&["ledger", "show"]);
    assert_eq!(show["owner"], "0x2222222222222222222222222222222222222222");
}

#[test]
fn analyze_commits_persists_and_verifies() {
    let workspace = Workspace::new();
    workspace.run_json(&["ledger", "init"]);
    let drafts = workspace.write("drafts.json", &response(DRAFTS));

    let analysis = workspace.run_json(&["analyze", "--drafts", &arg(&drafts)]);
    assert_eq!(analysis["success"], true);
    assert_eq!(analysis["insightCount"], 2);
    let explorer = analysis["explorerUrl"].as_str().unwrap();
    assert!(explorer.starts_with("https://testnet.bscscan.com/tx/0x"));
    assert_eq!(analysis["insights"][0]["predictionId"], 0);
    assert_eq!(analysis["insights"][1]["predictionId"], 1);

    let predictions = workspace.run_json(&["predictions"]);
    assert_eq!(predictions["total"], 2);
    assert_eq!(predictions["predictions"][0]["id"], 1);
    assert_eq!(predictions["predictions"][0]["categoryName"], "TREND");

    let insights = workspace.run_json(&["insights", "--category", "RISK"]);
    assert_eq!(insights["total"], 1);
    let insight_id = insights["insights"][0]["id"].as_str().unwrap().to_string();

    let verified = workspace.run_json(&["verify", "--insight", &insight_id]);
    assert_eq!(verified["verified"], true);
    assert_eq!(verified["outcome"]["status"], "verified");

    let parsed: Vec<InsightDraft> = serde_json::from_str(DRAFTS).unwrap();
    let committed = canonical_string(&parsed[0], CanonicalVersion::V1).unwrap();
    let exact = workspace.write("exact.txt", &committed);
    let by_content = workspace.run_json(&["verify", "--prediction-id", "0", "--content", &arg(&exact)]);
    assert_eq!(by_content["verified"], true);

    let tampered = workspace.write("tampered.txt", &committed.replace("\"X\"", "\"Z\""));
    let mismatch = workspace.run_json(&["verify", "--prediction-id", "0", "--content", &arg(&tampered)]);
    assert_eq!(mismatch["verified"], false);
    assert_eq!(mismatch["outcome"]["status"], "mismatch");

    let reconcile = workspace.run_json(&["reconcile"]);
    assert_eq!(reconcile["predictionCount"], 2);
    assert_eq!(reconcile["orphans"].as_array().unwrap().len(), 0);

    let show = workspace.run_json(&["ledger", "show"]);
    assert_eq!(show["predictionCount"], 2);
}

#[test]
fn rejected_analysis_reports_generic_failure() {
    let workspace = Workspace::new();
    workspace.run_json(&["ledger", "init"]);
    let drafts = workspace.write("drafts.json", &response(&DRAFTS.replace("\"RISK\"", "\"UNKNOWN_CATEGORY\"")));

    let output = workspace.run(&["analyze", "--drafts", &arg(&drafts)]);
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.starts_with("analysis failed (schema_invalid)"), "stderr: {stderr}");
    assert!(!stderr.contains("UNKNOWN_CATEGORY"));

    let predictions = workspace.run_json(&["predictions"]);
    assert_eq!(predictions["total"], 0);
}

#[test]
fn analyze_requires_the_generator_envelope() {
    let workspace = Workspace::new();
    workspace.run_json(&["ledger", "init"]);
    let pair: Vec<Value> = serde_json::from_str(DRAFTS).unwrap();
    let six: Vec<Value> = pair.iter().cycle().take(6).cloned().collect();
    let six = serde_json::json!({ "insights": six }).to_string();
    let cases = [
        workspace.write("bare.json", DRAFTS),
        workspace.write("empty.json", &response("[]")),
        workspace.write("six.json", &six),
        workspace.write("no-points.json", &response(&DRAFTS.replace(",\"dataPoints\":[]", ""))),
    ];
    for drafts in &cases {
        let output = workspace.run(&["analyze", "--drafts", &arg(drafts)]);
        assert!(!output.status.success());
        let stderr = String::from_utf8_lossy(&output.stderr);
        assert!(stderr.starts_with("analysis failed (schema_invalid)"), "stderr: {stderr}");
    }

    let predictions = workspace.run_json(&["predictions"]);
    assert_eq!(predictions["total"], 0);
}

#[test]
fn overlapping_writers_keep_every_committed_record() {
    let workspace = Workspace::new();
    workspace.run_json(&["ledger", "init"]);
    let drafts = workspace.write("drafts.json", &response(DRAFTS));
    // Create the insight store up front so only ledger writes overlap.
    workspace.run_json(&["insights"]);

    let children: Vec<_> = (0 .. 4)
        .map(|_| {
            Command::new(env!("CARGO_BIN_EXE_chainpulse"))
                .arg("--config")
                .arg(&workspace.config)
                .args(["analyze", "--drafts", &arg(&drafts)])
                .stdout(Stdio::piped())
                .stderr(Stdio::piped())
                .spawn()
                .expect("spawn chainpulse")
        })
        .collect();
    for child in children {
        let output = child.wait_with_output().expect("wait for chainpulse");
        assert!(output.status.success(), "stderr: {}", String::from_utf8_lossy(&output.stderr));
    }

    let show = workspace.run_json(&["ledger", "show"]);
    assert_eq!(show["predictionCount"], 8);

    let insights = workspace.run_json(&["insights", "--limit", "100"]);
    assert_eq!(insights["total"], 8);
    let mut ids: Vec<String> = insights["insights"]
        .as_array()
        .unwrap()
        .iter()
        .map(|insight| insight["id"].as_str().unwrap().to_string())
        .collect();
    ids.sort();
    ids.dedup();
    assert_eq!(ids.len(), 8);
    for id in &ids {
        let verified = workspace.run_json(&["verify", "--insight", id]);
        assert_eq!(verified["verified"], true, "insight {id}");
    }
}

#[test]
fn verify_rejects_out_of_range_prediction_id() {
    let workspace = Workspace::new();
    workspace.run_json(&["ledger", "init"]);
    let content = workspace.write("content.txt", "anything");
    let output = workspace.run(&["verify", "--prediction-id", "1000001", "--content", &arg(&content)]);
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("invalid request"));
}
