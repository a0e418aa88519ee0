#![cfg(all(unix, feature = "cli"))]

use std::fs::File;
use std::io::{Read, Write};
use std::os::fd::AsFd;
use std::path::PathBuf;
use std::process::{Child, Command, Output, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use fdsel::fdpass::DescriptorChannel;
use fdsel::transport::UnixSocket;

fn unique_name(tag: &str) -> String {
    format!(
        "fdsel-cli-{tag}-{}-{}",
        std::process::id(),
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .expect("time should be after epoch")
            .as_nanos()
    )
}

fn file_with(tag: &str, contents: &[u8]) -> PathBuf {
    let path = std::env::temp_dir().join(unique_name(tag));
    File::create(&path)
        .and_then(|mut file| file.write_all(contents))
        .expect("temp file should be writable");
    path
}

fn connect_with_retry(name: &str, timeout: Duration) -> UnixSocket {
    let start = Instant::now();
    loop {
        if let Ok(socket) = UnixSocket::connect(format!("\0{name}")) {
            return socket;
        }
        if start.elapsed() >= timeout {
            panic!("connect timeout");
        }
        thread::sleep(Duration::from_millis(25));
    }
}

fn wait_with_timeout(mut child: Child, timeout: Duration) -> Output {
    let start = Instant::now();
    while child.try_wait().expect("child should be waitable").is_none() {
        if start.elapsed() >= timeout {
            let _ = child.kill();
            panic!("child did not exit in time");
        }
        thread::sleep(Duration::from_millis(25));
    }
    child.wait_with_output().expect("child output should be readable")
}

#[test]
fn serve_prints_payload_and_descriptor_contents() {
    let name = unique_name("serve");
    let child = Command::new(env!("CARGO_BIN_EXE_fdsel"))
        .args(["--log-level", "error", "--format", "json", "serve"])
        .arg(format!("@{name}"))
        .args(["--fds", "--count", "1", "--poll-timeout", "50ms"])
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .expect("serve command should start");

    let client = connect_with_retry(&name, Duration::from_secs(3));
    let path = file_with("serve", b"AB");
    let file = File::open(&path).unwrap();
    client.send_with_fds(b"x", &[file.as_fd()]).unwrap();
    drop(file);

    let output = wait_with_timeout(child, Duration::from_secs(5));
    std::fs::remove_file(&path).unwrap();
    assert!(
        output.status.success(),
        "serve failed: {}",
        String::from_utf8_lossy(&output.stderr)
    );

    let stdout = String::from_utf8(output.stdout).unwrap();
    let line = stdout.lines().next().expect("one message line");
    let value: serde_json::Value = serde_json::from_str(line).unwrap();
    assert_eq!(value["payload"], "x");
    assert_eq!(value["payload_size"], 1);
    assert_eq!(value["descriptors"][0]["data"], "AB");
}

#[test]
fn send_passes_file_descriptor() {
    let name = unique_name("send");
    let listener = UnixSocket::bind(format!("\0{name}")).unwrap();
    let path = file_with("send", b"AB");

    let child = Command::new(env!("CARGO_BIN_EXE_fdsel"))
        .args(["--log-level", "error", "send"])
        .arg(format!("@{name}"))
        .args(["--data", "x", "--fd-file"])
        .arg(&path)
        .stdout(Stdio::null())
        .stderr(Stdio::piped())
        .spawn()
        .expect("send command should start");

    let server = listener.accept().unwrap();
    let mut received = server.recv_with_fds(64, 1).unwrap();
    assert_eq!(&received.payload[..], b"x");

    let mut files = received.take_files();
    assert_eq!(files.len(), 1);
    let mut contents = String::new();
    files[0].read_to_string(&mut contents).unwrap();
    assert_eq!(contents, "AB");

    let output = wait_with_timeout(child, Duration::from_secs(5));
    std::fs::remove_file(&path).unwrap();
    assert!(
        output.status.success(),
        "send failed: {}",
        String::from_utf8_lossy(&output.stderr)
    );
}

#[test]
fn send_waits_for_reply_from_serve() {
    let name = unique_name("reply");
    let server = Command::new(env!("CARGO_BIN_EXE_fdsel"))
        .args(["--log-level", "error", "--format", "raw", "serve"])
        .arg(format!("@{name}"))
        .args(["--count", "1", "--reply", "string from server\n"])
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .expect("serve command should start");

    // Probe until the server is up; the probe connection sends nothing.
    drop(connect_with_retry(&name, Duration::from_secs(3)));

    let output = Command::new(env!("CARGO_BIN_EXE_fdsel"))
        .args(["--log-level", "error", "--format", "raw", "send"])
        .arg(format!("@{name}"))
        .args(["--wait", "--wait-timeout", "3s"])
        .output()
        .expect("send command should run");
    assert!(
        output.status.success(),
        "send failed: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    assert_eq!(output.stdout, b"string from server\n");

    let served = wait_with_timeout(server, Duration::from_secs(5));
    assert!(served.status.success());
    assert_eq!(served.stdout, b"hello from client\n");
}

#[test]
fn send_to_missing_socket_is_transport_error() {
    let output = Command::new(env!("CARGO_BIN_EXE_fdsel"))
        .args(["--log-level", "error", "send"])
        .arg(format!("@{}", unique_name("missing")))
        .output()
        .expect("send command should run");

    assert_eq!(output.status.code(), Some(3));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("connect failed"), "stderr: {stderr}");
}

#[test]
fn version_prints_package_version() {
    let output = Command::new(env!("CARGO_BIN_EXE_fdsel"))
        .arg("version")
        .output()
        .expect("version command should run");

    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert_eq!(stdout.trim(), format!("fdsel {}", env!("CARGO_PKG_VERSION")));
}
