//! `tap serve` must exit cleanly when its client goes away, and must flush
//! ledger writes made through MCP tools before it does.

use std::io::{BufRead, BufReader, Write};
use std::process::{Command, Stdio};
use std::time::{Duration, Instant};
use tempfile::TempDir;

fn tap_binary() -> std::path::PathBuf {
    assert_cmd::cargo::cargo_bin!("tap").into()
}

fn spawn_serve(data_dir: &TempDir) -> std::process::Child {
    Command::new(tap_binary())
        .arg("serve")
        .env("TAPESTRY_DATA_DIR", data_dir.path())
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .expect("failed to spawn tap serve")
}

/// Send a JSON-RPC message as newline-delimited JSON.
fn send_jsonrpc(stdin: &mut impl Write, msg: &serde_json::Value) {
    let line = serde_json::to_string(msg).unwrap();
    writeln!(stdin, "{line}").unwrap();
    stdin.flush().unwrap();
}

fn read_response(reader: &mut impl BufRead) -> serde_json::Value {
    let mut line = String::new();
    reader.read_line(&mut line).expect("read response");
    serde_json::from_str(&line).expect("response should be JSON")
}

fn mcp_handshake(stdin: &mut impl Write, reader: &mut impl BufRead) {
    send_jsonrpc(
        stdin,
        &serde_json::json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": "initialize",
            "params": {
                "protocolVersion": "2024-11-05",
                "capabilities": {},
                "clientInfo": { "name": "test", "version": "0.1.0" }
            }
        }),
    );
    let init = read_response(reader);
    assert_eq!(init["id"], 1);

    send_jsonrpc(
        stdin,
        &serde_json::json!({
            "jsonrpc": "2.0",
            "method": "notifications/initialized"
        }),
    );
}

#[test]
fn serve_exits_on_early_stdin_eof() {
    let dir = TempDir::new().unwrap();
    let mut child = spawn_serve(&dir);

    drop(child.stdin.take());

    let start = Instant::now();
    let output = child.wait_with_output().expect("wait");
    let elapsed = start.elapsed();

    assert!(
        output.status.success(),
        "early stdin EOF should exit 0, got {}",
        output.status
    );
    assert!(elapsed < Duration::from_secs(2), "took {elapsed:?}");
}

#[test]
fn serve_flushes_woven_threads_on_eof() {
    let dir = TempDir::new().unwrap();
    let mut child = spawn_serve(&dir);
    let mut stdin = child.stdin.take().expect("stdin pipe");
    let mut reader = BufReader::new(child.stdout.take().expect("stdout pipe"));

    mcp_handshake(&mut stdin, &mut reader);

    send_jsonrpc(
        &mut stdin,
        &serde_json::json!({
            "jsonrpc": "2.0",
            "id": 2,
            "method": "tools/call",
            "params": {
                "name": "tap_weave",
                "arguments": {
                    "intention": "awe",
                    "time": "night",
                    "region": "sahara",
                    "title": "Stars over the erg"
                }
            }
        }),
    );
    let response = read_response(&mut reader);
    assert_eq!(response["id"], 2);
    assert!(response.get("error").is_none(), "got {response}");

    drop(stdin);
    let start = Instant::now();
    let status = child.wait().expect("wait");
    assert!(status.success(), "tap serve should exit 0, got {status}");
    assert!(start.elapsed() < Duration::from_secs(2));

    #[allow(deprecated)]
    let list = assert_cmd::Command::cargo_bin("tap")
        .unwrap()
        .env("TAPESTRY_DATA_DIR", dir.path())
        .arg("list")
        .output()
        .unwrap();
    let stdout = String::from_utf8_lossy(&list.stdout);
    assert!(stdout.contains("Stars over the erg"), "got {stdout}");
    assert!(stdout.contains("threads: 1"));
}
