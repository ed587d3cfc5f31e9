//! CLI integration tests for raiox-cli.
//!
//! These tests run the actual binary against synthesized PNG fixtures and
//! check outputs and exit codes.

use assert_cmd::Command;
use image::{DynamicImage, ImageBuffer, ImageFormat, Luma};
use predicates::prelude::*;
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// Get a Command for the raiox binary.
fn raiox() -> Command {
    Command::cargo_bin("raiox").unwrap()
}

/// Write a synthetic radiograph: a horizontal ramp with thread-like bands.
fn write_xray(dir: &Path, name: &str, band: u32, invert: bool) -> PathBuf {
    let img = ImageBuffer::from_fn(128, 96, |x, y| {
        let thread = if (y / band) % 2 == 0 { 60 } else { 0 };
        let value = ((x * 255) / 128) as u8 / 2 + thread;
        Luma([if invert { 255 - value } else { value }])
    });
    let path = dir.join(name);
    DynamicImage::ImageLuma8(img)
        .save_with_format(&path, ImageFormat::Png)
        .unwrap();
    path
}

fn json_stdout(cmd: &mut Command) -> serde_json::Value {
    let output = cmd.assert().success().get_output().stdout.clone();
    serde_json::from_slice(&output).unwrap()
}

// ============================================================================
// Help and Version Tests
// ============================================================================

#[test]
fn test_help_displays_usage() {
    raiox()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("X-ray implant embedding inspection"))
        .stdout(predicate::str::contains("embed"))
        .stdout(predicate::str::contains("compare"))
        .stdout(predicate::str::contains("rank"));
}

#[test]
fn test_version_displays_version() {
    raiox()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("raiox"));
}

#[test]
fn test_help_shows_exit_codes() {
    raiox()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("Exit codes:"))
        .stdout(predicate::str::contains("65"))
        .stdout(predicate::str::contains("66"))
        .stdout(predicate::str::contains("70"));
}

#[test]
fn test_embed_help_shows_options() {
    raiox()
        .args(["embed", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("--format"))
        .stdout(predicate::str::contains("--backend"));
}

// ============================================================================
// Exit Code Tests
// ============================================================================

#[test]
fn test_missing_file_returns_input_error() {
    // Exit code 66 = EX_NOINPUT
    raiox()
        .args(["embed", "nonexistent_file.png"])
        .assert()
        .code(66)
        .stderr(predicate::str::contains("Failed to read file"));
}

#[test]
fn test_undecodable_image_returns_data_error() {
    let temp = TempDir::new().unwrap();
    let file = temp.path().join("broken.png");
    fs::write(&file, b"not really a png").unwrap();

    // Exit code 65 = EX_DATAERR
    raiox()
        .args(["embed", file.to_str().unwrap()])
        .assert()
        .code(65)
        .stderr(predicate::str::contains("Failed to embed"));
}

#[test]
fn test_mock_backend_accepts_arbitrary_bytes() {
    let temp = TempDir::new().unwrap();
    let file = temp.path().join("blob.bin");
    fs::write(&file, b"not really a png").unwrap();

    raiox()
        .args(["--backend", "mock", "embed", file.to_str().unwrap()])
        .assert()
        .success()
        .stdout(predicate::str::contains("Dimension:"))
        .stdout(predicate::str::contains("512"));
}

#[test]
fn test_rank_with_zero_limit_is_usage_error() {
    let temp = TempDir::new().unwrap();
    let query = write_xray(temp.path(), "query.png", 8, false);

    raiox()
        .args([
            "rank",
            "--limit",
            "0",
            query.to_str().unwrap(),
            query.to_str().unwrap(),
        ])
        .assert()
        .code(64);
}

// ============================================================================
// Embed Tests
// ============================================================================

#[test]
fn test_embed_summary() {
    let temp = TempDir::new().unwrap();
    let file = write_xray(temp.path(), "xray.png", 8, false);

    raiox()
        .args(["embed", file.to_str().unwrap()])
        .assert()
        .success()
        .stdout(predicate::str::contains("Embedding computed"))
        .stdout(predicate::str::contains("SHA3-256:"))
        .stdout(predicate::str::contains("raster-grid-16"))
        .stdout(predicate::str::contains("512"));
}

#[test]
fn test_embed_json_is_unit_norm() {
    let temp = TempDir::new().unwrap();
    let file = write_xray(temp.path(), "xray.png", 8, false);

    let json = json_stdout(raiox().args(["embed", "--format", "json", file.to_str().unwrap()]));

    assert_eq!(json["dimension"], 512);
    assert_eq!(json["vector"].as_array().unwrap().len(), 512);
    assert!((json["norm"].as_f64().unwrap() - 1.0).abs() < 1e-3);
    assert_eq!(json["sha3_256"].as_str().unwrap().len(), 64);
}

#[test]
fn test_embed_quiet_prints_nothing() {
    let temp = TempDir::new().unwrap();
    let file = write_xray(temp.path(), "xray.png", 8, false);

    raiox()
        .args(["--quiet", "embed", file.to_str().unwrap()])
        .assert()
        .success()
        .stdout(predicate::str::is_empty());
}

#[test]
fn test_embed_is_deterministic() {
    let temp = TempDir::new().unwrap();
    let file = write_xray(temp.path(), "xray.png", 8, false);

    let first = json_stdout(raiox().args(["embed", "-f", "json", file.to_str().unwrap()]));
    let second = json_stdout(raiox().args(["embed", "-f", "json", file.to_str().unwrap()]));
    assert_eq!(first["vector"], second["vector"]);
}

// ============================================================================
// Compare and Rank Tests
// ============================================================================

#[test]
fn test_compare_identical_images_is_full_similarity() {
    let temp = TempDir::new().unwrap();
    let a = write_xray(temp.path(), "a.png", 8, false);
    let b = write_xray(temp.path(), "b.png", 8, false);

    let json = json_stdout(raiox().args([
        "compare",
        "--format",
        "json",
        a.to_str().unwrap(),
        b.to_str().unwrap(),
    ]));

    assert!(json["distance"].as_f64().unwrap().abs() < 1e-5);
    assert!((json["similarity_percent"].as_f64().unwrap() - 100.0).abs() < 1e-3);
}

#[test]
fn test_compare_summary_output() {
    let temp = TempDir::new().unwrap();
    let a = write_xray(temp.path(), "a.png", 8, false);
    let b = write_xray(temp.path(), "b.png", 8, true);

    raiox()
        .args(["compare", a.to_str().unwrap(), b.to_str().unwrap()])
        .assert()
        .success()
        .stdout(predicate::str::contains("Cosine distance:"))
        .stdout(predicate::str::contains("Similarity:"));
}

#[test]
fn test_rank_puts_identical_reference_first() {
    let temp = TempDir::new().unwrap();
    let catalog = temp.path().join("Acme");
    fs::create_dir(&catalog).unwrap();

    let query = write_xray(temp.path(), "query.png", 8, false);
    let inverted = write_xray(&catalog, "inverted.png", 8, true);
    let same = write_xray(&catalog, "same.png", 8, false);
    let coarse = write_xray(&catalog, "coarse.png", 32, true);

    let json = json_stdout(raiox().args([
        "rank",
        "--format",
        "json",
        "--limit",
        "2",
        query.to_str().unwrap(),
        inverted.to_str().unwrap(),
        same.to_str().unwrap(),
        coarse.to_str().unwrap(),
    ]));

    let ranked = json.as_array().unwrap();
    assert_eq!(ranked.len(), 2);
    assert_eq!(ranked[0]["name"], "same.png");
    assert_eq!(ranked[0]["manufacturer"], "Acme");
    assert_eq!(ranked[0]["implant_id"], 2);
    assert!(
        ranked[0]["similarity_percent"].as_f64().unwrap()
            >= ranked[1]["similarity_percent"].as_f64().unwrap()
    );
}

#[test]
fn test_rank_missing_reference_returns_input_error() {
    let temp = TempDir::new().unwrap();
    let query = write_xray(temp.path(), "query.png", 8, false);

    raiox()
        .args(["rank", query.to_str().unwrap(), "missing.png"])
        .assert()
        .code(66)
        .stderr(predicate::str::contains("missing.png"));
}
