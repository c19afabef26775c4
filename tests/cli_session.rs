use assert_cmd::cargo::cargo_bin_cmd;
use predicates::str::contains;
use tempfile::TempDir;

#[test]
fn help_lists_the_top_level_commands() {
    let mut cmd = cargo_bin_cmd!("lyra-dev");
    cmd.arg("--help")
        .assert()
        .success()
        .stdout(contains("dev"))
        .stdout(contains("preview"))
        .stdout(contains("upload"))
        .stdout(contains("resolve"))
        .stdout(contains("config"));
}

#[test]
fn dev_without_a_workspace_rc_prints_remediation_and_stops() {
    let temp = TempDir::new().unwrap();
    let mut cmd = cargo_bin_cmd!("lyra-dev");
    cmd.current_dir(temp.path())
        .arg("dev")
        .assert()
        .success()
        .stderr(contains("lyra.config.json"))
        .stderr(contains("type"));
}

#[test]
fn dev_with_an_unsupported_type_prints_remediation_and_stops() {
    let temp = TempDir::new().unwrap();
    std::fs::write(
        temp.path().join("lyra.config.json"),
        r#"{"type": "desktop"}"#,
    )
    .unwrap();

    let mut cmd = cargo_bin_cmd!("lyra-dev");
    cmd.current_dir(temp.path())
        .arg("dev")
        .assert()
        .success()
        .stderr(contains("supported project type"));
}

#[test]
fn preview_rejects_h5_projects() {
    let temp = TempDir::new().unwrap();
    std::fs::write(temp.path().join("lyra.config.json"), r#"{"type": "h5"}"#).unwrap();

    let mut cmd = cargo_bin_cmd!("lyra-dev");
    cmd.current_dir(temp.path())
        .arg("preview")
        .assert()
        .success()
        .stderr(contains("only supports mini-programs"));
}

#[test]
fn upload_rejects_h5_projects() {
    let temp = TempDir::new().unwrap();
    std::fs::write(temp.path().join("lyra.config.json"), r#"{"type": "h5"}"#).unwrap();

    let mut cmd = cargo_bin_cmd!("lyra-dev");
    cmd.current_dir(temp.path())
        .arg("upload")
        .assert()
        .success()
        .stderr(contains("only supports mini-programs"));
}

#[test]
fn config_set_writes_the_requested_key() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("config.toml");

    let mut cmd = cargo_bin_cmd!("lyra-dev");
    cmd.args([
        "config",
        "set",
        "web.host",
        "127.0.0.1",
        "--file",
        path.to_str().unwrap(),
    ])
    .assert()
    .success();

    let written = std::fs::read_to_string(path).unwrap();
    assert!(written.contains("host = \"127.0.0.1\""));
}
