use std::fs;
use std::path::{Path, PathBuf};

use assert_cmd::cargo::cargo_bin_cmd;
use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

const BOARD_MEETING: &str = "On January 15, 2024, the Board met in New York City \
                            with John Doe and Jane Smith to approve the merger.";

fn investicat() -> Command {
    let mut cmd: Command = cargo_bin_cmd!("investicat").into();
    for key in [
        "INVESTICAT_AI_API_KEY",
        "OPENAI_API_KEY",
        "INVESTICAT_AI_BASE_URL",
        "INVESTICAT_AI_MODEL",
        "INVESTICAT_AI_TIMEOUT_SECS",
        "INVESTICAT_DISABLE_AI",
        "INVESTICAT_SYSTEM_USER_EMAIL",
        "INVESTICAT_SYSTEM_USER_NAME",
    ] {
        cmd.env_remove(key);
    }
    cmd.env("RUST_LOG", "off");
    cmd
}

fn write_doc(dir: &Path, name: &str, content: &str) -> PathBuf {
    let path = dir.join(name);
    fs::write(&path, content).unwrap();
    path
}

fn parse_graph(json: &str) -> serde_json::Value {
    serde_json::from_str(json).unwrap()
}

// --- Binary startup ---

#[test]
fn binary_runs() {
    investicat()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("investicat"));
}

#[test]
fn files_are_required() {
    investicat().assert().failure();
}

// --- Single document ---

#[test]
fn single_document_to_stdout() {
    let tmp = TempDir::new().unwrap();
    let doc = write_doc(tmp.path(), "board.txt", BOARD_MEETING);

    let output = investicat()
        .arg("--no-ai")
        .arg(&doc)
        .assert()
        .success()
        .stderr(predicate::str::contains("board.txt (fallback extraction)"))
        .stderr(predicate::str::contains("PARTICIPATES_IN=2"))
        .get_output()
        .stdout
        .clone();

    let graph = parse_graph(&String::from_utf8(output).unwrap());
    assert_eq!(graph["nodes"]["documents"][0]["filename"], "board.txt");
    assert_eq!(graph["nodes"]["dates"][0]["date"], "2024-01-15T00:00:00Z");
    assert_eq!(graph["nodes"]["locations"][0]["address"], "New York City");
    assert_eq!(graph["relationships"].as_array().unwrap().len(), 5);
}

#[test]
fn single_document_to_file_quiet() {
    let tmp = TempDir::new().unwrap();
    let doc = write_doc(tmp.path(), "board.txt", BOARD_MEETING);
    let out = tmp.path().join("graph.json");

    investicat()
        .args(["--no-ai", "--quiet", "-o"])
        .arg(&out)
        .arg(&doc)
        .assert()
        .success()
        .stdout(predicate::str::is_empty())
        .stderr(predicate::str::contains("extraction").not());

    let graph = parse_graph(&fs::read_to_string(&out).unwrap());
    assert_eq!(graph["nodes"]["events"].as_array().unwrap().len(), 1);
}

#[test]
fn missing_api_key_falls_back_to_patterns() {
    let tmp = TempDir::new().unwrap();
    let doc = write_doc(tmp.path(), "board.txt", BOARD_MEETING);

    investicat()
        .arg(&doc)
        .assert()
        .success()
        .stderr(predicate::str::contains("AI unavailable: no API credential configured"));
}

#[test]
fn empty_document_fails() {
    let tmp = TempDir::new().unwrap();
    let doc = write_doc(tmp.path(), "empty.txt", "  \n");

    investicat()
        .arg("--no-ai")
        .arg(&doc)
        .assert()
        .failure()
        .stdout(predicate::str::is_empty())
        .stderr(predicate::str::contains("Document contains no text"));
}

#[test]
fn unsupported_format_fails() {
    let tmp = TempDir::new().unwrap();
    let doc = write_doc(tmp.path(), "sheet.xlsx", "cells");

    investicat()
        .arg("--no-ai")
        .arg(&doc)
        .assert()
        .failure()
        .stderr(predicate::str::contains("Unsupported format"));
}

// --- Configuration ---

#[test]
fn config_file_adds_system_user() {
    let tmp = TempDir::new().unwrap();
    let doc = write_doc(tmp.path(), "board.txt", BOARD_MEETING);
    let config = write_doc(
        tmp.path(),
        "investicat.json",
        r#"{"ai": {"enabled": false},
            "system_user": {"email": "journalist@example.com", "name": "System User"}}"#,
    );

    let output = investicat()
        .arg("--config")
        .arg(&config)
        .arg(&doc)
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();

    let graph = parse_graph(&String::from_utf8(output).unwrap());
    assert_eq!(
        graph["nodes"]["users"][0]["email"],
        "journalist@example.com"
    );
    assert_eq!(graph["nodes"]["users"][0]["password"], "placeholder");
}

#[test]
fn invalid_config_file_fails() {
    let tmp = TempDir::new().unwrap();
    let doc = write_doc(tmp.path(), "board.txt", BOARD_MEETING);
    let config = write_doc(tmp.path(), "bad.json", r#"{"max_passage_chars": 5}"#);

    investicat()
        .arg("--config")
        .arg(&config)
        .arg(&doc)
        .assert()
        .failure()
        .stderr(predicate::str::contains("max_passage_chars"));
}

// --- Batch ---

#[test]
fn batch_writes_one_file_per_document() {
    let tmp = TempDir::new().unwrap();
    let board = write_doc(tmp.path(), "board.txt", BOARD_MEETING);
    let deal = write_doc(
        tmp.path(),
        "deal.md",
        "Acme Corp signed the contract with Globex Industries on 2024-02-01.",
    );
    let out = tmp.path().join("graphs");

    investicat()
        .arg("--no-ai")
        .arg("-o")
        .arg(&out)
        .arg(&board)
        .arg(&deal)
        .assert()
        .success()
        .stderr(predicate::str::contains("2 succeeded, 0 failed"));

    assert!(out.join("board.txt.json").exists());
    let graph = parse_graph(&fs::read_to_string(out.join("deal.md.json")).unwrap());
    assert_eq!(graph["nodes"]["dates"][0]["date"], "2024-02-01T00:00:00Z");
}

#[test]
fn batch_keeps_documents_with_the_same_name() {
    let tmp = TempDir::new().unwrap();
    fs::create_dir(tmp.path().join("a")).unwrap();
    fs::create_dir(tmp.path().join("b")).unwrap();
    let first = write_doc(&tmp.path().join("a"), "report.txt", BOARD_MEETING);
    let second = write_doc(
        &tmp.path().join("b"),
        "report.txt",
        "Acme Corp signed the contract with Globex Industries on 2024-02-01.",
    );
    let out = tmp.path().join("graphs");

    investicat()
        .args(["--no-ai", "--quiet", "-o"])
        .arg(&out)
        .arg(&first)
        .arg(&second)
        .assert()
        .success();

    assert_eq!(fs::read_dir(&out).unwrap().count(), 2);
    let first_graph = parse_graph(&fs::read_to_string(out.join("report.txt.json")).unwrap());
    let second_graph = parse_graph(&fs::read_to_string(out.join("report.txt.2.json")).unwrap());
    assert_eq!(
        first_graph["nodes"]["dates"][0]["date"],
        "2024-01-15T00:00:00Z"
    );
    assert_eq!(
        second_graph["nodes"]["dates"][0]["date"],
        "2024-02-01T00:00:00Z"
    );
}

#[test]
fn batch_reports_failures_and_exits_nonzero() {
    let tmp = TempDir::new().unwrap();
    let board = write_doc(tmp.path(), "board.txt", BOARD_MEETING);
    let empty = write_doc(tmp.path(), "empty.txt", "");

    let output = investicat()
        .arg("--no-ai")
        .arg(&board)
        .arg(&empty)
        .assert()
        .failure()
        .stderr(predicate::str::contains("1 succeeded, 1 failed"))
        .stderr(predicate::str::contains("empty.txt"))
        .get_output()
        .stdout
        .clone();

    let graphs = parse_graph(&String::from_utf8(output).unwrap());
    assert_eq!(graphs.as_array().unwrap().len(), 1);
}
