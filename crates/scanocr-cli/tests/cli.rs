use assert_cmd::Command;
use predicates::prelude::*;

const CREDENTIAL_VARS: [&str; 3] = ["SCANOCR_API_KEY", "DASHSCOPE_API_KEY", "OPENAI_API_KEY"];

fn scanocr(dir: &std::path::Path) -> Command {
    let mut cmd = Command::cargo_bin("scanocr").unwrap();
    cmd.current_dir(dir);
    for var in CREDENTIAL_VARS {
        cmd.env_remove(var);
    }
    cmd
}

#[test]
fn test_help_lists_subcommands() {
    let dir = tempfile::tempdir().unwrap();
    scanocr(dir.path())
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("process"))
        .stdout(predicate::str::contains("blocks"))
        .stdout(predicate::str::contains("languages"));
}

#[test]
fn test_missing_input_fails() {
    let dir = tempfile::tempdir().unwrap();
    scanocr(dir.path())
        .args(["process", "absent.pdf"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Input file not found"));
}

#[test]
fn test_vision_without_credential_fails() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("scan.pdf"), b"%PDF-1.5\n").unwrap();

    scanocr(dir.path())
        .args(["process", "scan.pdf", "--backend", "vision"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("no API credential found"));
}

#[test]
fn test_page_number_is_one_based() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("scan.pdf"), b"%PDF-1.5\n").unwrap();

    scanocr(dir.path())
        .args(["page", "scan.pdf", "0"])
        .assert()
        .failure();
}

#[test]
fn test_config_init_and_get() {
    let dir = tempfile::tempdir().unwrap();
    let config = dir.path().join("config.json");
    let config = config.to_str().unwrap();

    scanocr(dir.path())
        .args(["-c", config, "config", "path"])
        .assert()
        .success()
        .stdout(predicate::str::contains("not created"));

    scanocr(dir.path())
        .args(["-c", config, "config", "init"])
        .assert()
        .success();

    scanocr(dir.path())
        .args(["-c", config, "config", "set", "tesseract.min_confidence", "75"])
        .assert()
        .success();

    scanocr(dir.path())
        .args(["-c", config, "config", "get", "tesseract.min_confidence"])
        .assert()
        .success()
        .stdout(predicate::str::contains("75"));

    scanocr(dir.path())
        .args(["-c", config, "config", "init"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("already exists"));
}

#[test]
fn test_process_offers_markdown_format() {
    let dir = tempfile::tempdir().unwrap();
    scanocr(dir.path())
        .args(["process", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("markdown"));

    std::fs::write(dir.path().join("scan.pdf"), b"%PDF-1.5\n").unwrap();
    scanocr(dir.path())
        .args(["process", "scan.pdf", "--format", "html"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("invalid value"));
}

#[test]
fn test_markdown_with_model_needs_credential() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("scan.pdf"), b"%PDF-1.5\n").unwrap();

    scanocr(dir.path())
        .args(["process", "scan.pdf", "--format", "markdown", "--ai"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("no API credential found"));
}
