//! CLI integration tests for dblink.
//!
//! These tests cover argument parsing, help output and exit codes for
//! configuration errors; none of them needs a running database.

use assert_cmd::Command;
use predicates::prelude::*;
use std::io::Write;

/// Get a command for the dblink binary.
fn cmd() -> Command {
    Command::cargo_bin("dblink").unwrap()
}

fn config_file(contents: &str) -> tempfile::NamedTempFile {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(contents.as_bytes()).unwrap();
    file
}

// =============================================================================
// Help and Version Tests
// =============================================================================

#[test]
fn test_help_shows_all_commands() {
    cmd()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("tables"))
        .stdout(predicate::str::contains("describe"))
        .stdout(predicate::str::contains("relationships"))
        .stdout(predicate::str::contains("sync"))
        .stdout(predicate::str::contains("page"))
        .stdout(predicate::str::contains("scroll"))
        .stdout(predicate::str::contains("call"))
        .stdout(predicate::str::contains("health-check"));
}

#[test]
fn test_version_flag() {
    cmd()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("dblink"));
}

#[test]
fn test_global_flags_in_help() {
    cmd()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("--config"))
        .stdout(predicate::str::contains("--output-json"))
        .stdout(predicate::str::contains("--log-format"))
        .stdout(predicate::str::contains("--verbosity"));
}

#[test]
fn test_describe_subcommand_help() {
    cmd()
        .args(["describe", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("--indices"))
        .stdout(predicate::str::contains("--row-count"));
}

#[test]
fn test_sync_subcommand_help() {
    cmd()
        .args(["sync", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("--desired"))
        .stdout(predicate::str::contains("--dry-run"));
}

#[test]
fn test_page_subcommand_help() {
    cmd()
        .args(["page", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("--query"))
        .stdout(predicate::str::contains("--page-size"));
}

#[test]
fn test_scroll_subcommand_help() {
    cmd()
        .args(["scroll", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("--query"))
        .stdout(predicate::str::contains("--start"))
        .stdout(predicate::str::contains("--windows"));
}

#[test]
fn test_scroll_accepts_negative_start() {
    cmd()
        .args([
            "--config",
            "/nonexistent/dblink.yaml",
            "scroll",
            "--query",
            "SELECT 1",
            "--start",
            "-10",
        ])
        .assert()
        .failure()
        .stderr(predicate::str::contains("unexpected argument").not());
}

// =============================================================================
// Argument Errors
// =============================================================================

#[test]
fn test_unknown_command_fails() {
    cmd().arg("migrate").assert().failure();
}

#[test]
fn test_describe_requires_table() {
    cmd().arg("describe").assert().failure();
}

#[test]
fn test_invalid_table_kind_rejected() {
    cmd()
        .args(["tables", "--types", "table,sequence"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("sequence"));
}

// =============================================================================
// Configuration Errors
// =============================================================================

#[test]
fn test_missing_config_file() {
    cmd()
        .args(["--config", "/nonexistent/dblink.yaml", "health-check"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Error"));
}

#[test]
fn test_malformed_yaml_exits_with_config_code() {
    let file = config_file("data_source: [unclosed");
    cmd()
        .args(["--config", file.path().to_str().unwrap(), "health-check"])
        .assert()
        .code(2);
}

#[test]
fn test_missing_host_exits_with_config_code() {
    let file = config_file(
        r#"
data_source:
  host: ""
  database: app
  user: app
"#,
    );
    cmd()
        .args(["--config", file.path().to_str().unwrap(), "tables"])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("host"));
}

#[test]
fn test_unknown_database_type_exits_with_config_code() {
    let file = config_file(
        r#"
data_source:
  type: oracle
  host: localhost
  database: app
  user: app
"#,
    );
    cmd()
        .args(["--config", file.path().to_str().unwrap(), "health-check"])
        .assert()
        .code(2);
}

#[test]
fn test_invalid_ssl_mode_exits_with_config_code() {
    let file = config_file(
        r#"
data_source:
  host: localhost
  database: app
  user: app
  ssl_mode: sometimes
"#,
    );
    cmd()
        .args(["--config", file.path().to_str().unwrap(), "health-check"])
        .assert()
        .code(2);
}
