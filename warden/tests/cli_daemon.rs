//! Drives the real `wardend` binary as a subprocess: `start-daemon` in the
//! foreground, `status` and `scale-service` against it over HTTP, then
//! `shutdown-daemon` to tear it down cleanly.
use std::io::Write;
use std::process::{Child, Command, Stdio};
use std::time::Duration;

use assert_cmd::prelude::*;
use tempfile::tempdir;

fn free_port() -> u16 {
    std::net::TcpListener::bind("127.0.0.1:0").unwrap().local_addr().unwrap().port()
}

struct Daemon {
    child: Child,
    port: u16,
}

impl Drop for Daemon {
    fn drop(&mut self) {
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}

fn boot_daemon(config_path: &std::path::Path) -> Daemon {
    let port = free_port();
    let child = Command::cargo_bin("wardend")
        .unwrap()
        .arg("start-daemon")
        .arg("--foreground")
        .arg("--config")
        .arg(config_path)
        .arg("--port")
        .arg(port.to_string())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()
        .expect("failed to spawn wardend");

    let client = reqwest::blocking::Client::new();
    for _ in 0..50 {
        if client.get(format!("http://127.0.0.1:{port}/manager")).send().is_ok() {
            return Daemon { child, port };
        }
        std::thread::sleep(Duration::from_millis(50));
    }
    panic!("daemon didn't come up in time");
}

#[test]
fn start_daemon_reports_status_and_shuts_down_over_the_real_binary() {
    let dir = tempdir().unwrap();
    let config_path = dir.path().join("config.yml");
    std::fs::File::create(&config_path).unwrap().write_all(b"---\n").unwrap();

    let mut daemon = boot_daemon(&config_path);

    let status_output = Command::cargo_bin("wardend")
        .unwrap()
        .args(["status", "--port"])
        .arg(daemon.port.to_string())
        .output()
        .expect("failed to run status");
    assert!(status_output.status.success());
    assert!(String::from_utf8_lossy(&status_output.stdout).contains("Manager state"));

    let shutdown_output = Command::cargo_bin("wardend")
        .unwrap()
        .args(["shutdown-daemon", "--port"])
        .arg(daemon.port.to_string())
        .output()
        .expect("failed to run shutdown-daemon");
    assert!(shutdown_output.status.success());
    assert!(String::from_utf8_lossy(&shutdown_output.stdout).contains("shutdown requested"));

    let status = daemon.child.wait().expect("daemon process vanished");
    assert!(status.success());
    // Already reaped; `Drop` will no-op on the dead pid.
}

#[test]
fn malformed_config_file_fails_fast_with_a_nonzero_exit() {
    let dir = tempdir().unwrap();
    let config_path = dir.path().join("config.yml");
    std::fs::File::create(&config_path).unwrap().write_all(b"not: [valid: yaml").unwrap();

    let output = Command::cargo_bin("wardend")
        .unwrap()
        .arg("start-daemon")
        .arg("--foreground")
        .arg("--config")
        .arg(&config_path)
        .arg("--port")
        .arg(free_port().to_string())
        .output()
        .expect("failed to run start-daemon");
    assert!(!output.status.success());
}
