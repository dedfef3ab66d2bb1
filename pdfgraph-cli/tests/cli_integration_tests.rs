//! Integration tests for the pdfgraph CLI
//!
//! Runs the built binary against documents created in temporary
//! directories.

use anyhow::Result;
use pretty_assertions::assert_eq;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};
use tempfile::{tempdir, TempDir};

fn get_cli_path() -> PathBuf {
    PathBuf::from(env!("CARGO_BIN_EXE_pdfgraph"))
}

fn setup_temp_dir() -> TempDir {
    tempdir().expect("Failed to create temp directory")
}

fn run_cli_command(args: &[&str]) -> Result<Output> {
    let output = Command::new(get_cli_path()).args(args).output()?;
    Ok(output)
}

fn stdout(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).into_owned()
}

/// Identifiers listed by the `closure` command, one per tab-separated line.
fn listed_objects(text: &str) -> Vec<&str> {
    text.lines()
        .filter_map(|line| line.split_once('\t').map(|(id, _)| id))
        .collect()
}

fn assert_pdf_exists_and_valid(path: &Path) {
    assert!(path.exists(), "PDF file should exist: {}", path.display());
    let content = fs::read(path).expect("Failed to read PDF file");
    assert!(
        content.starts_with(b"%PDF-"),
        "File should start with PDF header"
    );
    assert!(content.ends_with(b"%%EOF\n"), "File should end with %%EOF");
}

fn create_pdf(dir: &TempDir, name: &str, pages: usize) -> PathBuf {
    let path = dir.path().join(name);
    let output = run_cli_command(&[
        "create",
        "-o",
        path.to_str().unwrap(),
        "-p",
        &pages.to_string(),
    ])
    .expect("CLI command should run");
    assert!(output.status.success(), "create should succeed");
    path
}

#[test]
fn test_cli_create_command() {
    let temp_dir = setup_temp_dir();
    let path = create_pdf(&temp_dir, "created.pdf", 2);

    assert_pdf_exists_and_valid(&path);
    let content = String::from_utf8_lossy(&fs::read(&path).unwrap()).into_owned();
    assert!(content.contains("/Count 2"));
}

#[test]
fn test_cli_info_command() {
    let temp_dir = setup_temp_dir();
    let path = create_pdf(&temp_dir, "info.pdf", 3);

    let output = run_cli_command(&["info", path.to_str().unwrap()]).unwrap();
    assert!(output.status.success());

    let text = stdout(&output);
    assert!(text.contains("PDF Version: 1.7"));
    assert!(text.contains("Pages: 3"));
    assert!(text.contains("Objects: 6"));
    assert!(text.contains("ID: "));
    assert!(!text.contains("Recovered"));
}

#[test]
fn test_cli_closure_command() {
    let temp_dir = setup_temp_dir();
    let path = create_pdf(&temp_dir, "closure.pdf", 1);

    let output = run_cli_command(&["closure", path.to_str().unwrap()]).unwrap();
    assert!(output.status.success());
    let text = stdout(&output);
    assert!(text.contains("4 of 4 objects reachable"));
    assert_eq!(listed_objects(&text), vec!["1 0 R", "2 0 R", "3 0 R", "4 0 R"]);

    // Page 4 reaches the page tree, which leads back to it
    let output =
        run_cli_command(&["closure", path.to_str().unwrap(), "--object", "4"]).unwrap();
    assert!(output.status.success());
    let text = stdout(&output);
    assert!(text.contains("2 of 4 objects reachable"));
    assert_eq!(listed_objects(&text), vec!["2 0 R", "4 0 R"]);

    let output =
        run_cli_command(&["closure", path.to_str().unwrap(), "--object", "40"]).unwrap();
    assert!(!output.status.success());
}

#[test]
fn test_cli_compact_command() {
    let temp_dir = setup_temp_dir();
    let input = create_pdf(&temp_dir, "input.pdf", 2);
    let output_path = temp_dir.path().join("compacted.pdf");

    let output = run_cli_command(&[
        "compact",
        input.to_str().unwrap(),
        "-o",
        output_path.to_str().unwrap(),
    ])
    .unwrap();
    assert!(output.status.success());
    assert_pdf_exists_and_valid(&output_path);
    assert!(stdout(&output).contains("Compacted 5 objects to 5"));
}

#[test]
fn test_cli_rebuild_damaged_file() {
    let temp_dir = setup_temp_dir();
    let input = create_pdf(&temp_dir, "damaged.pdf", 1);

    // Drop the cross-reference section and trailer
    let mut bytes = fs::read(&input).unwrap();
    let cut = bytes
        .windows(6)
        .rposition(|w| w == b"\nxref\n")
        .unwrap();
    bytes.truncate(cut + 1);
    fs::write(&input, &bytes).unwrap();

    let strict = run_cli_command(&["info", "--strict", input.to_str().unwrap()]).unwrap();
    assert!(!strict.status.success());

    let output_path = temp_dir.path().join("rebuilt.pdf");
    let output = run_cli_command(&[
        "rebuild",
        input.to_str().unwrap(),
        "-o",
        output_path.to_str().unwrap(),
    ])
    .unwrap();
    assert!(output.status.success());
    assert!(stdout(&output).contains("Catalog located by scanning"));
    assert_pdf_exists_and_valid(&output_path);

    let info = run_cli_command(&["info", "--strict", output_path.to_str().unwrap()]).unwrap();
    assert!(info.status.success());
    assert!(stdout(&info).contains("Pages: 1"));
}

#[test]
fn test_cli_missing_input() {
    let temp_dir = setup_temp_dir();
    let missing = temp_dir.path().join("absent.pdf");

    let output = run_cli_command(&["info", missing.to_str().unwrap()]).unwrap();
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("Failed to open"));
}

#[test]
fn test_cli_help() {
    let output = run_cli_command(&["--help"]).unwrap();
    assert!(output.status.success());
    let text = stdout(&output);
    for command in ["info", "closure", "compact", "rebuild"] {
        assert!(text.contains(command), "help should list {command}");
    }
}
