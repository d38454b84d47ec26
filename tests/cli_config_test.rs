use std::process::Command;
use tempfile::TempDir;

fn docquery() -> Command {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_docquery"));
    // Keep host overrides out of the child
    for (key, _) in std::env::vars() {
        if key.starts_with("DQ_") {
            cmd.env_remove(key);
        }
    }
    cmd
}

#[test]
fn test_init_command() {
    let temp_dir = TempDir::new().unwrap();

    let output = docquery()
        .arg("init")
        .current_dir(temp_dir.path())
        .output()
        .expect("Failed to run init command");
    assert!(output.status.success());

    let config_path = temp_dir.path().join(".docquery/settings.toml");
    assert!(config_path.exists());

    let content = std::fs::read_to_string(&config_path).unwrap();
    assert!(content.contains("version = 1"));
    assert!(content.contains("[chunking]"));
    assert!(content.contains("[retrieval]"));
    assert!(content.contains("[query]"));

    // Second init without --force refuses to overwrite
    let output = docquery()
        .arg("init")
        .current_dir(temp_dir.path())
        .output()
        .unwrap();
    assert!(!output.status.success());

    let output = docquery()
        .args(["init", "--force"])
        .current_dir(temp_dir.path())
        .output()
        .unwrap();
    assert!(output.status.success());
}

#[test]
fn test_config_command() {
    let temp_dir = TempDir::new().unwrap();
    let config_dir = temp_dir.path().join(".docquery");
    std::fs::create_dir_all(&config_dir).unwrap();
    std::fs::write(
        config_dir.join("settings.toml"),
        r#"
[retrieval]
top_k = 11

[query]
max_parallel_questions = 7
"#,
    )
    .unwrap();

    let output = docquery()
        .arg("config")
        .current_dir(temp_dir.path())
        .output()
        .expect("Failed to run config command");
    assert!(output.status.success());

    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("top_k = 11"));
    assert!(stdout.contains("max_parallel_questions = 7"));
}

#[test]
fn test_config_command_reports_invalid_values() {
    let temp_dir = TempDir::new().unwrap();
    let config_path = temp_dir.path().join("custom.toml");
    std::fs::write(
        &config_path,
        r#"
[chunking]
chunk_words = 10
overlap_words = 10
"#,
    )
    .unwrap();

    let output = docquery()
        .arg("--config")
        .arg(&config_path)
        .arg("config")
        .current_dir(temp_dir.path())
        .output()
        .unwrap();

    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("Configuration problems"));
}

#[test]
fn test_ask_requires_question() {
    let output = docquery()
        .args(["ask", "https://example.com/policy.pdf"])
        .output()
        .unwrap();
    assert!(!output.status.success());
}
