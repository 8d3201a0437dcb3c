use std::{
    fs,
    net::TcpListener,
    path::{Path, PathBuf},
    process::{Child, Command, Output, Stdio},
    time::{Duration, Instant},
};

const START_TIMEOUT: Duration = Duration::from_secs(20);

fn write_config(dir: &Path, file_name: &str, env: &str, port: u16) -> PathBuf {
    let config_path = dir.join(file_name);
    fs::write(
        &config_path,
        format!(
            r#"
name = "discountd-cli-test"
env = "{env}"
sqlite_path = "{sqlite}"
keys_dir = "{keys}"

[authority]
ip = "127.0.0.1"
port = {port}

[client]
endpoint = "http://127.0.0.1:{port}"
timeout_seconds = 5

[observability]
filter_level = "info"

[observability.log]
output = "console"
"#,
            sqlite = dir.join("data").display(),
            keys = dir.join("keys").display(),
        ),
    )
    .expect("write config");

    config_path
}

fn run_discountd(args: &[&str], current_dir: Option<&Path>) -> Output {
    let mut cmd = Command::new(PathBuf::from(env!("CARGO_BIN_EXE_discountd")));
    cmd.args(args);
    if let Some(dir) = current_dir {
        cmd.current_dir(dir);
    }
    cmd.output().expect("run discountd command")
}

fn stdout(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).trim().to_string()
}

fn free_port() -> u16 {
    TcpListener::bind("127.0.0.1:0")
        .expect("bind ephemeral port")
        .local_addr()
        .expect("local addr")
        .port()
}

struct ServerProcess {
    child: Child,
}

impl Drop for ServerProcess {
    fn drop(&mut self) {
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}

async fn spawn_server(config: &Path, port: u16) -> ServerProcess {
    let child = Command::new(PathBuf::from(env!("CARGO_BIN_EXE_discountd")))
        .arg("--config")
        .arg(config)
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()
        .expect("spawn discountd");
    let mut server = ServerProcess { child };

    let url = format!("http://127.0.0.1:{port}/health");
    let client = reqwest::Client::new();
    let start = Instant::now();
    loop {
        if let Some(status) = server.child.try_wait().unwrap_or(None) {
            panic!("discountd exited early: status={status:?}");
        }
        if let Ok(resp) = client.get(&url).send().await
            && resp.status().is_success()
        {
            return server;
        }
        if start.elapsed() > START_TIMEOUT {
            panic!("discountd did not become healthy within {START_TIMEOUT:?}");
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
}

#[test]
fn discountd_test_command_accepts_explicit_valid_config() {
    let temp = tempfile::tempdir().expect("temp dir");
    let config_path = write_config(temp.path(), "valid.toml", "dev", 39990);
    let output = run_discountd(&["test", config_path.to_str().expect("utf8 path")], None);

    assert!(
        output.status.success(),
        "command should succeed, stderr: {}",
        String::from_utf8_lossy(&output.stderr)
    );
}

#[test]
fn discountd_test_command_finds_default_config_in_current_directory() {
    let temp = tempfile::tempdir().expect("temp dir");
    write_config(temp.path(), "config.toml", "dev", 39991);
    let output = run_discountd(&["test"], Some(temp.path()));

    assert!(
        output.status.success(),
        "command should succeed, stderr: {}",
        String::from_utf8_lossy(&output.stderr)
    );
}

#[test]
fn discountd_test_command_allows_warning_only_config() {
    let temp = tempfile::tempdir().expect("temp dir");
    // prod + console 日志 + never 清理策略只产生警告
    let config_path = write_config(temp.path(), "warn.toml", "prod", 39992);
    let output = run_discountd(&["test", config_path.to_str().expect("utf8 path")], None);

    assert!(
        output.status.success(),
        "warnings must not fail validation, stderr: {}",
        String::from_utf8_lossy(&output.stderr)
    );
}

#[test]
fn discountd_test_command_rejects_invalid_config() {
    let temp = tempfile::tempdir().expect("temp dir");
    let config_path = write_config(temp.path(), "invalid.toml", "staging", 39993);
    let output = run_discountd(&["test", config_path.to_str().expect("utf8 path")], None);
    assert!(!output.status.success());
}

#[test]
fn discountd_test_command_fails_without_config() {
    let temp = tempfile::tempdir().expect("temp dir");
    let output = run_discountd(&["test", "missing.toml"], Some(temp.path()));
    assert!(!output.status.success());
}

#[test]
fn discountd_keygen_writes_key_file() {
    let temp = tempfile::tempdir().expect("temp dir");
    let config_path = write_config(temp.path(), "config.toml", "test", 39994);
    let output = run_discountd(
        &["--config", config_path.to_str().expect("utf8 path"), "keygen"],
        None,
    );

    assert!(
        output.status.success(),
        "keygen should succeed, stderr: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    let key_id = stdout(&output);
    assert_eq!(key_id.len(), 8);

    let key_file = temp.path().join("keys").join(format!("{key_id}.key"));
    let bytes = fs::read(&key_file).expect("key file should exist");
    assert_eq!(bytes.len(), 36);
}

#[test]
fn discountd_verify_malformed_code_is_invalid() {
    let temp = tempfile::tempdir().expect("temp dir");
    let config_path = write_config(temp.path(), "config.toml", "test", 39995);
    let output = run_discountd(
        &[
            "--config",
            config_path.to_str().expect("utf8 path"),
            "verify",
            "not-a-code",
        ],
        None,
    );

    assert_eq!(stdout(&output), "INVALID");
    assert!(!output.status.success());
}

#[tokio::test]
async fn discountd_issue_verify_redeem_end_to_end() {
    let temp = tempfile::tempdir().expect("temp dir");
    let port = free_port();
    let config_path = write_config(temp.path(), "config.toml", "test", port);
    let config = config_path.to_str().expect("utf8 path");
    let _server = spawn_server(&config_path, port).await;

    let keygen = run_discountd(&["--config", config, "keygen"], None);
    assert!(keygen.status.success());
    let key_id = stdout(&keygen);

    let issued = run_discountd(
        &[
            "--config", config, "issue", "--key-id", &key_id, "--item", "Tomato Soup 500g",
            "--price", "150", "--date", "2099-12-30", "--quantity", "2",
        ],
        None,
    );
    assert!(
        issued.status.success(),
        "issue should succeed, stderr: {}",
        String::from_utf8_lossy(&issued.stderr)
    );
    let codes: Vec<String> = stdout(&issued).lines().map(str::to_string).collect();
    assert_eq!(codes.len(), 2);
    assert_ne!(codes[0], codes[1]);
    assert!(codes[0].contains(&key_id));
    assert!(codes[0].starts_with("16Tomato Soup 500g000150"));

    let verify = run_discountd(&["--config", config, "verify", &codes[0]], None);
    assert_eq!(stdout(&verify), "VALID");
    assert!(verify.status.success());

    let redeem = run_discountd(&["--config", config, "redeem", &codes[0]], None);
    assert_eq!(stdout(&redeem), "VALID");

    let again = run_discountd(&["--config", config, "redeem", &codes[0]], None);
    assert_eq!(stdout(&again), "INVALID");
    assert!(!again.status.success());

    // nonce 是记录部分的最后 16 个字符
    let record_len = 34 + codes[1][..2].parse::<usize>().expect("length prefix");
    let nonce = &codes[1][record_len - 16..record_len];
    let consume = run_discountd(&["--config", config, "consume", nonce], None);
    assert_eq!(stdout(&consume), "REMOVED");

    let verify = run_discountd(&["--config", config, "verify", &codes[1]], None);
    assert_eq!(stdout(&verify), "INVALID");
}
