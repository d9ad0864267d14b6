use std::io::Write;
use std::path::Path;
use std::process::{Command, Output, Stdio};
use tempfile::TempDir;

const CONFIG_KEYS: &[&str] = &[
    "DISCORD_APPLICATION_ID",
    "STATE_FILE_PATH",
    "POLL_INTERVAL_MS",
    "DEBUG_MODE",
    "FLRP_DEBUG_LOG",
];

fn relay(home: &Path, cwd: &Path) -> Command {
    let mut command = Command::new(env!("CARGO_BIN_EXE_flrp-relay"));
    command
        .current_dir(cwd)
        .env("HOME", home)
        .env("XDG_DATA_HOME", home.join("data"))
        .env("XDG_RUNTIME_DIR", home)
        .env("TMPDIR", home);
    for key in CONFIG_KEYS {
        command.env_remove(key);
    }
    command
}

fn write_env(dir: &Path, state_file: &Path) {
    std::fs::write(
        dir.join(".env"),
        format!(
            "# relay settings\nDISCORD_APPLICATION_ID=1396127471342194719\nSTATE_FILE_PATH=\"{}\"\nPOLL_INTERVAL_MS=100\n",
            state_file.display()
        ),
    )
    .expect("write .env");
}

fn stdout(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).into_owned()
}

#[test]
fn check_config_prints_resolved_settings() {
    let home = TempDir::new().expect("temp home");
    let state_file = home.path().join("fl_studio_state.json");
    write_env(home.path(), &state_file);

    let output = relay(home.path(), home.path())
        .arg("check-config")
        .output()
        .expect("run check-config");

    assert!(output.status.success(), "stderr: {}", String::from_utf8_lossy(&output.stderr));
    let config: serde_json::Value = serde_json::from_str(&stdout(&output)).expect("json config");
    assert_eq!(config["application_id"], "1396127471342194719");
    assert_eq!(config["poll_interval_ms"], 100);
    assert_eq!(config["debug"], false);
    assert_eq!(
        config["status_file"].as_str(),
        Some(state_file.to_string_lossy().as_ref())
    );
}

#[test]
fn missing_required_setting_exits_with_failure() {
    let home = TempDir::new().expect("temp home");
    std::fs::write(home.path().join(".env"), "DISCORD_APPLICATION_ID=42\n").expect("write .env");

    let output = relay(home.path(), home.path())
        .arg("check-config")
        .output()
        .expect("run check-config");

    assert_eq!(output.status.code(), Some(1));
    assert!(String::from_utf8_lossy(&output.stderr).contains("STATE_FILE_PATH"));
}

#[test]
fn explicit_json_config_is_used() {
    let home = TempDir::new().expect("temp home");
    let config_path = home.path().join("relay.json");
    std::fs::write(
        &config_path,
        r#"{"DISCORD_APPLICATION_ID":"42","STATE_FILE_PATH":"/tmp/fl.json","DEBUG_MODE":true}"#,
    )
    .expect("write json config");

    let output = relay(home.path(), home.path())
        .args(["check-config", "--config"])
        .arg(&config_path)
        .output()
        .expect("run check-config");

    assert!(output.status.success());
    let config: serde_json::Value = serde_json::from_str(&stdout(&output)).expect("json config");
    assert_eq!(config["application_id"], "42");
    assert_eq!(config["debug"], true);
}

#[test]
fn status_prints_derived_activity() {
    let home = TempDir::new().expect("temp home");
    let state_file = home.path().join("fl_studio_state.json");
    write_env(home.path(), &state_file);
    std::fs::write(
        &state_file,
        r#"{"state":"Recording","bpm":140.6,"plugin":"Serum","project_name":"Night Drive"}"#,
    )
    .expect("write status");

    let output = relay(home.path(), home.path())
        .arg("status")
        .output()
        .expect("run status");

    assert!(output.status.success());
    let report: serde_json::Value = serde_json::from_str(&stdout(&output)).expect("json report");
    assert_eq!(report["snapshot"]["tempo"], 140);
    assert_eq!(report["activity"]["state"], "140 BPM");
    assert_eq!(report["activity"]["details"], "Recording • Serum - Night Drive");
    assert_eq!(report["activity"]["assets"]["small_image"], "recording");
}

#[test]
fn status_without_file_fails() {
    let home = TempDir::new().expect("temp home");
    write_env(home.path(), &home.path().join("missing.json"));

    let output = relay(home.path(), home.path())
        .arg("status")
        .output()
        .expect("run status");

    assert_eq!(output.status.code(), Some(1));
}

#[test]
fn run_answers_console_commands_and_quits() {
    let home = TempDir::new().expect("temp home");
    write_env(home.path(), &home.path().join("fl_studio_state.json"));

    let mut child = relay(home.path(), home.path())
        .arg("run")
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .expect("spawn relay");

    {
        let stdin = child.stdin.as_mut().expect("stdin");
        stdin.write_all(b"status\nstop\nquit\n").expect("write commands");
    }
    let output = child.wait_with_output().expect("relay exit");

    assert!(output.status.success());
    let text = stdout(&output);
    assert!(text.contains("Monitoring stopped"), "stdout: {text}");
    assert!(text.contains("Exiting"), "stdout: {text}");
}
