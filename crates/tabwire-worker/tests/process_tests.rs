//! Integration tests for the worker binary.
//!
//! The test plays the host: it listens on an ephemeral port, starts the
//! worker with that port and talks to it over the accepted socket.

use serde_json::{json, Value};
use std::process::Stdio;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::process::{Child, Command};

async fn send(stream: &mut TcpStream, message: &Value) {
    let bytes = serde_json::to_vec(message).unwrap();
    stream
        .write_all(&(bytes.len() as u32).to_be_bytes())
        .await
        .unwrap();
    stream.write_all(&bytes).await.unwrap();
}

async fn receive(stream: &mut TcpStream) -> Value {
    let mut len = [0u8; 4];
    stream.read_exact(&mut len).await.unwrap();
    let mut payload = vec![0u8; u32::from_be_bytes(len) as usize];
    stream.read_exact(&mut payload).await.unwrap();
    serde_json::from_slice(&payload).unwrap()
}

/// Start the worker and accept its connection.
async fn start_worker(extra_args: &[&str]) -> (Child, TcpStream) {
    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind listener");
    let port = listener.local_addr().unwrap().port();

    let child = Command::new(env!("CARGO_BIN_EXE_tabwire-worker"))
        .arg(port.to_string())
        .args(extra_args)
        .args(["--host", "127.0.0.1"])
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .kill_on_drop(true)
        .spawn()
        .expect("Failed to start worker");

    let (stream, _) = tokio::time::timeout(Duration::from_secs(30), listener.accept())
        .await
        .expect("Worker did not connect in time")
        .unwrap();
    (child, stream)
}

#[tokio::test]
async fn test_handshake_and_shutdown() {
    let (mut child, mut stream) = start_worker(&[]).await;

    let hello = receive(&mut stream).await;
    assert_eq!(hello["response"], "pid_response");
    assert_eq!(hello["pid"], child.id().unwrap());

    send(&mut stream, &json!({"command": "shutdown"})).await;
    let status = tokio::time::timeout(Duration::from_secs(30), child.wait())
        .await
        .expect("Worker did not exit after shutdown")
        .unwrap();
    assert!(status.success());
}

#[tokio::test]
async fn test_debug_mode_traces_startup() {
    let (mut child, mut stream) = start_worker(&["debug"]).await;
    receive(&mut stream).await;

    send(&mut stream, &json!({"command": "get_debug_buffer"})).await;
    let reply = receive(&mut stream).await;
    assert_eq!(reply["response"], "ok");
    assert!(reply["std_out"]
        .as_str()
        .unwrap()
        .starts_with("Worker starting..."));
    // Log lines are captured too.
    assert!(reply["std_err"].as_str().unwrap().contains("Starting Tabwire worker"));

    send(&mut stream, &json!({"command": "shutdown"})).await;
    let status = tokio::time::timeout(Duration::from_secs(30), child.wait())
        .await
        .expect("Worker did not exit after shutdown")
        .unwrap();
    assert!(status.success());
}

#[tokio::test]
async fn test_host_disconnect_ends_process() {
    let (mut child, mut stream) = start_worker(&[]).await;
    receive(&mut stream).await;
    drop(stream);

    let status = tokio::time::timeout(Duration::from_secs(30), child.wait())
        .await
        .expect("Worker did not exit after disconnect")
        .unwrap();
    assert!(!status.success());
}
