//! End-to-end CLI tests for the netbound binary.
//!
//! Every test points `XDG_CONFIG_HOME` at a temp dir so a developer's own
//! config file cannot leak in.

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

mod support;

fn netbound(config_home: &TempDir) -> Command {
    let mut cmd = Command::cargo_bin("netbound").unwrap();
    cmd.env("XDG_CONFIG_HOME", config_home.path())
        .env_remove("RUST_LOG");
    cmd
}

#[test]
fn test_binary_help_displays_usage() {
    let home = TempDir::new().unwrap();
    netbound(&home)
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("chosen network interface class"))
        .stdout(predicate::str::contains("--network"));
}

#[test]
fn test_binary_version_displays_version() {
    let home = TempDir::new().unwrap();
    netbound(&home)
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("netbound"));
}

#[test]
fn test_binary_without_uri_fails() {
    let home = TempDir::new().unwrap();
    netbound(&home)
        .assert()
        .failure()
        .stderr(predicate::str::contains("required"));
}

#[test]
fn test_binary_unknown_network_fails() {
    let home = TempDir::new().unwrap();
    netbound(&home)
        .args(["https://example.com/", "-o", "out.bin", "--network", "satellite"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("unknown transport class"));
}

#[test]
fn test_binary_relative_uri_reports_invalid_arguments() {
    let home = TempDir::new().unwrap();
    let out = home.path().join("out.bin");
    netbound(&home)
        .arg("not-a-url")
        .arg("-o")
        .arg(&out)
        .assert()
        .failure()
        .stdout(predicate::str::is_empty())
        .stderr(predicate::str::contains("INVALID_ARGUMENTS"));
    assert!(!out.exists());
}

#[test]
fn test_binary_malformed_header_reports_invalid_arguments() {
    let home = TempDir::new().unwrap();
    netbound(&home)
        .args(["https://example.com/", "-o", "out.bin", "-H", "no-colon"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("INVALID_ARGUMENTS"));
}

#[test]
fn test_binary_json_mode_rejects_malformed_stdin() {
    let home = TempDir::new().unwrap();
    netbound(&home)
        .arg("--json")
        .write_stdin("{not json")
        .assert()
        .failure()
        .stderr(predicate::str::contains("not a valid JSON request map"));
}

#[test]
fn test_binary_json_mode_reports_missing_fields() {
    let home = TempDir::new().unwrap();
    netbound(&home)
        .arg("--json")
        .write_stdin(r#"{"id": "r1", "method": "GET"}"#)
        .assert()
        .failure()
        .stderr(predicate::str::contains("INVALID_ARGUMENTS"))
        .stderr(predicate::str::contains("uri"));
}

#[test]
fn test_binary_invalid_config_file_fails() {
    let home = TempDir::new().unwrap();
    let dir = home.path().join("netbound");
    std::fs::create_dir_all(&dir).unwrap();
    std::fs::write(dir.join("config.toml"), "default_timeout_ms = 0\n").unwrap();

    netbound(&home)
        .args(["https://example.com/", "-o", "out.bin"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("default_timeout_ms"));
}

#[test]
fn test_binary_unknown_config_key_fails() {
    let home = TempDir::new().unwrap();
    let dir = home.path().join("netbound");
    std::fs::create_dir_all(&dir).unwrap();
    std::fs::write(dir.join("config.toml"), "concurrency = 4\n").unwrap();

    netbound(&home)
        .arg("--help")
        .assert()
        .success();
    netbound(&home)
        .args(["https://example.com/", "-o", "out.bin"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("concurrency"));
}

/// Serves response headers and the first slice of a body, then stalls.
#[cfg(unix)]
fn stalled_body_server() -> std::net::SocketAddr {
    use std::io::{Read, Write};
    use std::net::TcpListener;

    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    std::thread::spawn(move || {
        let Ok((mut stream, _)) = listener.accept() else {
            return;
        };
        let mut request = Vec::new();
        let mut buf = [0_u8; 1024];
        while !request.windows(4).any(|w| w == b"\r\n\r\n") {
            match stream.read(&mut buf) {
                Ok(0) | Err(_) => return,
                Ok(n) => request.extend_from_slice(&buf[..n]),
            }
        }
        let _ = stream.write_all(b"HTTP/1.1 200 OK\r\nContent-Length: 100000\r\n\r\n");
        let _ = stream.write_all(&[b'x'; 100]);
        let _ = stream.flush();
        // Hold the connection until the client goes away.
        let _ = stream.read(&mut buf);
    });
    addr
}

#[cfg(unix)]
#[test]
fn test_binary_interrupt_mid_transfer_removes_partial_output() {
    use std::io::{BufRead, BufReader};
    use std::process::{Command as StdCommand, Stdio};
    use std::sync::mpsc;
    use std::time::Duration;

    if support::socket_guard::should_skip_socket_bound_test() {
        return;
    }

    let home = TempDir::new().unwrap();
    let out = home.path().join("partial.bin");
    let addr = stalled_body_server();

    let mut child = StdCommand::new(env!("CARGO_BIN_EXE_netbound"))
        .env("XDG_CONFIG_HOME", home.path())
        .env_remove("RUST_LOG")
        .arg(format!("http://{addr}/big"))
        .arg("-o")
        .arg(&out)
        .arg("--quiet")
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .unwrap();

    let (lines_tx, lines) = mpsc::channel();
    let stdout = child.stdout.take().unwrap();
    std::thread::spawn(move || {
        for line in BufReader::new(stdout).lines() {
            let Ok(line) = line else { break };
            if lines_tx.send(line).is_err() {
                break;
            }
        }
    });

    loop {
        let Ok(line) = lines.recv_timeout(Duration::from_secs(10)) else {
            child.kill().unwrap();
            panic!("no progress event before the deadline");
        };
        if line.contains("NoActiveNetwork") {
            // Host without any outbound route; DEFAULT cannot be borrowed here.
            let _ = child.wait();
            return;
        }
        assert!(!line.contains(r#""type":"error""#), "unexpected error event: {line}");
        if line.contains(r#""type":"progress""#) {
            break;
        }
    }
    assert!(out.exists(), "partial output should exist while streaming");

    let pid = libc::pid_t::try_from(child.id()).unwrap();
    // SAFETY: pid belongs to the child spawned above, which has not been reaped.
    assert_eq!(unsafe { libc::kill(pid, libc::SIGINT) }, 0);

    let status = child.wait().unwrap();
    assert_eq!(status.code(), Some(130));
    assert!(!out.exists(), "partial output must be removed on interrupt");
    assert!(
        lines.try_iter().all(|line| !line.contains(r#""type":"complete""#)),
        "no terminal event after interrupt"
    );
}
