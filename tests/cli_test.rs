//! End-to-end tests of the binary that need no network: config creation,
//! config errors, dry runs and interrupts.

use std::fs;
use std::path::Path;
use std::process::{Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};
use tempfile::TempDir;

const KEY_HEX: &str = "000102030405060708090a0b0c0d0e0f101112131415161718191a1b1c1d1e1f";

fn ossenc_bin() -> String {
    env!("CARGO_BIN_EXE_ossenc").to_string()
}

fn write_config(dir: &Path) -> String {
    let path = dir.join("config.json");
    fs::write(
        &path,
        format!(
            r#"{{
    "EncryptionKey": "{}",
    "FileNameFormat": "%Y/%{{name}}%{{ext}}",
    "OSSAccessKeyId": "id",
    "OSSAccessKeySecret": "secret",
    "OSSPrefix": "https://bucket.example.com/backups/",
    "OSSBucket": "bucket"
}}"#,
            KEY_HEX
        ),
    )
    .unwrap();
    path.to_string_lossy().into_owned()
}

// =============================================================================
// Config
// =============================================================================

#[test]
fn test_create_config_writes_fresh_key() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("new.json");

    let output = Command::new(ossenc_bin())
        .args(["-C", "-c", path.to_str().unwrap()])
        .output()
        .unwrap();

    assert!(
        output.status.success(),
        "ossenc -C failed: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    assert!(String::from_utf8_lossy(&output.stderr).contains("Config file created"));

    let json: serde_json::Value = serde_json::from_slice(&fs::read(&path).unwrap()).unwrap();
    let key = json["EncryptionKey"].as_str().unwrap();
    assert_eq!(key.len(), 64);
    assert!(key.chars().all(|c| c.is_ascii_hexdigit()));

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let mode = fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }

    // Running again keeps the key.
    let output = Command::new(ossenc_bin())
        .args(["-C", "-c", path.to_str().unwrap()])
        .output()
        .unwrap();
    assert!(output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("Config file updated"));
    let again: serde_json::Value = serde_json::from_slice(&fs::read(&path).unwrap()).unwrap();
    assert_eq!(again["EncryptionKey"].as_str().unwrap(), key);
}

#[test]
fn test_missing_config_fails() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("absent.json");

    let output = Command::new(ossenc_bin())
        .args(["-l", "-c", path.to_str().unwrap()])
        .output()
        .unwrap();

    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("Cannot read"), "{}", stderr);
    assert!(stderr.ends_with('\n'));
}

// =============================================================================
// Dry runs
// =============================================================================

#[test]
fn test_dry_run_upload_prints_destination() {
    let dir = TempDir::new().unwrap();
    let config = write_config(dir.path());
    let file = dir.path().join("notes.txt");
    fs::write(&file, "hello").unwrap();

    let output = Command::new(ossenc_bin())
        .args(["-n", "-f", "-c", &config, file.to_str().unwrap()])
        .output()
        .unwrap();

    assert!(
        output.status.success(),
        "dry run failed: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    assert_eq!(
        String::from_utf8_lossy(&output.stdout),
        format!(
            "{} -> https://bucket.example.com/backups/notes.txt\n",
            file.display()
        )
    );
}

#[test]
fn test_dry_run_print_command() {
    let dir = TempDir::new().unwrap();
    let config = write_config(dir.path());
    let file = dir.path().join("db.sql");
    fs::write(&file, "select 1;").unwrap();

    let output = Command::new(ossenc_bin())
        .args(["-n", "-P", "-F", "%{name}.gz", "-c", &config, file.to_str().unwrap()])
        .output()
        .unwrap();

    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    let lines: Vec<&str> = stdout.lines().collect();
    assert_eq!(lines[0], format!("# {}", file.display()));
    assert_eq!(
        lines[1],
        format!(
            "curl -s https://bucket.example.com/backups/db.gz | openssl enc -d -aes-256-ofb -iv 0 -K {} | unpigz",
            KEY_HEX
        )
    );
}

#[test]
fn test_dry_run_without_encryption() {
    let dir = TempDir::new().unwrap();
    let config = write_config(dir.path());

    let output = Command::new(ossenc_bin())
        .args(["-n", "-P", "-E", "-f", "-c", &config, "/does/not/matter.tar"])
        .output()
        .unwrap();

    assert!(output.status.success());
    assert!(String::from_utf8_lossy(&output.stdout)
        .contains("curl -s https://bucket.example.com/backups/matter.tar | unpigz"));
}

#[test]
fn test_conflicting_modes_rejected() {
    let output = Command::new(ossenc_bin())
        .args(["-l", "-d", "x"])
        .output()
        .unwrap();
    assert!(!output.status.success());
}

// =============================================================================
// Interrupts
// =============================================================================

#[cfg(unix)]
#[test]
fn test_interrupt_with_idle_stdin_exits() {
    let dir = TempDir::new().unwrap();
    let config = write_config(dir.path());

    // stdin stays open and silent, so the encoder thread sits in read().
    let mut child = Command::new(ossenc_bin())
        .args(["-f", "-c", &config])
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .unwrap();
    let _stdin = child.stdin.take();

    thread::sleep(Duration::from_secs(1));
    let sent = Command::new("kill")
        .args(["-INT", &child.id().to_string()])
        .status()
        .unwrap();
    assert!(sent.success());

    let interrupted = Instant::now();
    let status = loop {
        if let Some(status) = child.try_wait().unwrap() {
            break status;
        }
        if interrupted.elapsed() > Duration::from_secs(10) {
            let _ = child.kill();
            panic!("ossenc still running 10s after SIGINT");
        }
        thread::sleep(Duration::from_millis(20));
    };

    assert!(!status.success());
    let output = child.wait_with_output().unwrap();
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("Transfer cancelled"), "{}", stderr);
}
