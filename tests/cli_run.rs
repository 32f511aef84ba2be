//! CLI subprocess tests: run, preview and check-config against file-backed
//! collaborators in a temp directory.

use assert_cmd::Command;
use predicates::prelude::*;
use predicates::str::contains;
use serde_json::Value;
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

const CONFIG: &str = r#"
[mail]
sender = "reports@example.com"
recipients = ["finops@example.com"]

[retry]
jitter_pct = 0.0

[[metrics.conversions]]
name = "coffee cups"
unit_price = 5.0
"#;

const INVOCATION: &str = r#"{
  "query": "SELECT service, cost FROM cur",
  "database": "billing",
  "output_location": "s3://results/",
  "query_name": "monthly_costs",
  "report_date": "2026-03-01"
}"#;

const ENGINE_OK: &str = r#"{
  "execution_id": "replay-42",
  "states": ["RUNNING", "RUNNING", "SUCCEEDED"],
  "pages": [
    [["service", "cost"], ["EC2", "1000"]],
    [["S3", "200"]]
  ]
}"#;

const ENGINE_FAILED: &str = r#"{
  "execution_id": "replay-43",
  "states": ["RUNNING", "FAILED"],
  "reason": "SYNTAX_ERROR: line 1:8: Column 'cost' cannot be resolved"
}"#;

const RECOMMENDATIONS: &str = r#"[
  {"category": "Rightsizing", "monthly_savings": 300.0, "description": "Downsize idle instances"}
]"#;

struct Fixture {
    dir: TempDir,
}

impl Fixture {
    fn new(engine_script: &str) -> Self {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("config.toml"), CONFIG).unwrap();
        fs::write(dir.path().join("invocation.json"), INVOCATION).unwrap();
        fs::write(dir.path().join("engine.json"), engine_script).unwrap();
        fs::write(dir.path().join("recs.json"), RECOMMENDATIONS).unwrap();
        Self { dir }
    }

    fn path(&self, name: &str) -> PathBuf {
        self.dir.path().join(name)
    }

    fn cmd(&self) -> Command {
        let mut cmd = Command::new(assert_cmd::cargo::cargo_bin!("cost-digest"));
        cmd.env("XDG_CONFIG_HOME", self.path(".config"));
        cmd.env_remove("COST_DIGEST_CONFIG");
        cmd.env("RUST_LOG", "warn");
        cmd.env("NO_COLOR", "1");
        cmd
    }

    fn run_args(&self, outbox: &Path) -> Vec<String> {
        vec![
            "--config".into(),
            self.path("config.toml").display().to_string(),
            "run".into(),
            "--invocation".into(),
            self.path("invocation.json").display().to_string(),
            "--engine-script".into(),
            self.path("engine.json").display().to_string(),
            "--recommendations".into(),
            self.path("recs.json").display().to_string(),
            "--outbox".into(),
            outbox.display().to_string(),
            "--simulate-time".into(),
        ]
    }
}

fn outbox_files(dir: &Path) -> Vec<PathBuf> {
    match fs::read_dir(dir) {
        Ok(entries) => entries.map(|e| e.unwrap().path()).collect(),
        Err(_) => Vec::new(),
    }
}

#[test]
fn help_lists_subcommands() {
    let fx = Fixture::new(ENGINE_OK);
    fx.cmd()
        .arg("--help")
        .assert()
        .success()
        .stdout(contains("run"))
        .stdout(contains("check-config"))
        .stdout(contains("preview"));
}

#[test]
fn run_writes_report_to_outbox() {
    let fx = Fixture::new(ENGINE_OK);
    let outbox = fx.path("outbox");
    let output = fx.cmd().args(fx.run_args(&outbox)).assert().success().get_output().clone();

    let outcome: Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(outcome["status"], "success");
    assert_eq!(outcome["kind"], "report");
    assert_eq!(outcome["execution_id"], "replay-42");
    assert_eq!(outcome["rows"], 2);
    assert_eq!(outcome["partial"], false);

    let files = outbox_files(&outbox);
    assert_eq!(files.len(), 1);
    let envelope: Value = serde_json::from_str(&fs::read_to_string(&files[0]).unwrap()).unwrap();
    assert_eq!(
        envelope["subject"],
        "Cloud Cost Report — monthly_costs (2026-03-01)"
    );
    assert_eq!(envelope["message_id"], outcome["message_id"]);
    assert_eq!(
        envelope["attachments"][0]["filename"],
        "monthly_costs_2026-03-01.csv"
    );
    let text = envelope["text"].as_str().unwrap();
    assert!(text.contains("$1,200.00"));
    assert!(text.contains("60 coffee cups"));
}

#[test]
fn missing_recommendations_file_is_partial_not_failure() {
    let fx = Fixture::new(ENGINE_OK);
    fs::remove_file(fx.path("recs.json")).unwrap();
    let outbox = fx.path("outbox");
    let output = fx.cmd().args(fx.run_args(&outbox)).assert().success().get_output().clone();

    let outcome: Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(outcome["partial"], true);
    assert_eq!(outbox_files(&outbox).len(), 1);
}

#[test]
fn failed_query_exits_with_query_code_and_sends_nothing() {
    let fx = Fixture::new(ENGINE_FAILED);
    let outbox = fx.path("outbox");
    let output = fx
        .cmd()
        .arg("--json")
        .args(fx.run_args(&outbox))
        .assert()
        .code(4)
        .get_output()
        .clone();

    let outcome: Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(outcome["status"], "failure");
    assert_eq!(outcome["kind"], "query_failed");
    assert_eq!(outcome["execution_id"], "replay-43");

    let stderr = String::from_utf8_lossy(&output.stderr);
    let last = stderr.lines().last().unwrap();
    let error: Value = serde_json::from_str(last).unwrap();
    assert_eq!(error["error"]["kind"], "query_failed");
    assert_eq!(error["error"]["code"], 4);
    assert!(
        error["error"]["message"]
            .as_str()
            .unwrap()
            .contains("Column 'cost' cannot be resolved")
    );

    assert!(outbox_files(&outbox).is_empty());
}

#[test]
fn preview_prints_report_without_sending() {
    let fx = Fixture::new(ENGINE_OK);
    fx.cmd()
        .args([
            "--config",
            fx.path("config.toml").to_str().unwrap(),
            "preview",
            "--invocation",
            fx.path("invocation.json").to_str().unwrap(),
            "--engine-script",
            fx.path("engine.json").to_str().unwrap(),
            "--recommendations",
            fx.path("recs.json").to_str().unwrap(),
            "--simulate-time",
        ])
        .assert()
        .success()
        .stdout(contains("Subject: Cloud Cost Report — monthly_costs (2026-03-01)"))
        .stdout(contains("Rightsizing"))
        .stdout(contains("[attachment] monthly_costs_2026-03-01.csv"));
}

#[test]
fn check_config_accepts_valid_file() {
    let fx = Fixture::new(ENGINE_OK);
    fx.cmd()
        .args(["--config", fx.path("config.toml").to_str().unwrap(), "check-config"])
        .assert()
        .success()
        .stdout(contains("Config OK"))
        .stdout(contains("finops@example.com"));
}

#[test]
fn check_config_rejects_empty_recipients() {
    let fx = Fixture::new(ENGINE_OK);
    let bad = fx.path("bad.toml");
    fs::write(&bad, "[mail]\nsender = \"reports@example.com\"\nrecipients = []\n").unwrap();
    fx.cmd()
        .args(["--config", bad.to_str().unwrap(), "check-config"])
        .assert()
        .code(2)
        .stderr(contains("recipients"));
}

#[test]
fn config_is_found_through_env_var() {
    let fx = Fixture::new(ENGINE_OK);
    fx.cmd()
        .env("COST_DIGEST_CONFIG", fx.path("config.toml"))
        .args(["--json", "check-config"])
        .assert()
        .success()
        .stdout(contains("\"valid\": true"));
}

#[test]
fn config_is_found_in_xdg_dir() {
    let fx = Fixture::new(ENGINE_OK);
    let xdg = fx.path(".config").join("cost-digest");
    fs::create_dir_all(&xdg).unwrap();
    fs::copy(fx.path("config.toml"), xdg.join("config.toml")).unwrap();
    fx.cmd().arg("check-config").assert().success();
}

#[test]
fn missing_config_is_a_config_error() {
    let fx = Fixture::new(ENGINE_OK);
    fx.cmd()
        .args(["--json", "check-config"])
        .assert()
        .code(2)
        .stderr(contains("\"kind\":\"config\"").or(contains("\"kind\": \"config\"")));
}

#[test]
fn unknown_flag_is_usage_error() {
    let fx = Fixture::new(ENGINE_OK);
    fx.cmd().arg("--bogus").assert().code(2);
}
