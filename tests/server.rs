//! End-to-end: a real listener, a real script, raw HTTP/1.1 on the wire.

use std::fs;
use std::net::SocketAddr;
use std::os::unix::fs::PermissionsExt;
use std::path::PathBuf;
use std::sync::OnceLock;
use std::time::Duration;

use shelld::{Dispatcher, Server};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

/// `/fail` exits 3, `/slow` sleeps, anything else echoes the request back.
fn script() -> &'static PathBuf {
    static SCRIPT: OnceLock<PathBuf> = OnceLock::new();
    SCRIPT.get_or_init(|| {
        let dir = std::env::temp_dir().join(format!("shelld-server-{}", std::process::id()));
        fs::create_dir_all(&dir).unwrap();
        let path = dir.join("handler.sh");
        fs::write(
            &path,
            r#"#!/bin/sh
case "$2" in
    /fail) echo boom >&2; exit 3 ;;
    /slow) exec sleep 30 ;;
esac
printf '%s %s %s\n' "$1" "$2" "$#"
cat
"#,
        )
        .unwrap();
        fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
        path
    })
}

struct Running {
    addr: SocketAddr,
    stop: oneshot::Sender<()>,
    handle: JoinHandle<Result<(), shelld::Error>>,
}

async fn start() -> Running {
    let server = Server::bind("127.0.0.1:0".parse().unwrap()).await.unwrap();
    let addr = server.local_addr().unwrap();
    let (stop, stopped) = oneshot::channel::<()>();

    let handle = tokio::spawn(server.serve_with_shutdown(Dispatcher::new(script()), async {
        let _ = stopped.await;
    }));

    Running { addr, stop, handle }
}

/// Sends `request` and reads until the server closes the connection.
async fn exchange(addr: SocketAddr, request: &str) -> (String, Vec<u8>) {
    let mut stream = TcpStream::connect(addr).await.unwrap();
    stream.write_all(request.as_bytes()).await.unwrap();

    let mut raw = Vec::new();
    stream.read_to_end(&mut raw).await.unwrap();

    let split = raw
        .windows(4)
        .position(|w| w == b"\r\n\r\n")
        .expect("no header terminator");
    let head = String::from_utf8(raw[..split].to_vec()).unwrap();
    (head, raw[split + 4..].to_vec())
}

#[tokio::test]
async fn post_runs_script_with_request() {
    let server = start().await;

    let (head, body) = exchange(
        server.addr,
        "POST /hello?x=1 HTTP/1.1\r\n\
         Host: localhost\r\n\
         Content-Length: 5\r\n\
         Connection: close\r\n\
         \r\n\
         hello",
    )
    .await;

    assert!(head.starts_with("HTTP/1.1 200"), "{head}");
    assert!(head.to_ascii_lowercase().contains("content-length: 23"), "{head}");
    // method, uri, and three header pairs: host, content-length, connection
    assert_eq!(body, b"POST /hello?x=1 8\nhello");

    server.stop.send(()).unwrap();
    server.handle.await.unwrap().unwrap();
}

#[tokio::test]
async fn failing_script_is_500() {
    let server = start().await;

    let (head, body) = exchange(
        server.addr,
        "GET /fail HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n",
    )
    .await;

    let body = String::from_utf8(body).unwrap();
    assert!(head.starts_with("HTTP/1.1 500"), "{head}");
    assert!(body.contains("exit status: 3"), "{body}");
    assert!(!body.contains("boom"));

    server.stop.send(()).unwrap();
    server.handle.await.unwrap().unwrap();
}

#[tokio::test]
async fn shutdown_cancels_in_flight_command() {
    let server = start().await;
    let addr = server.addr;

    let client = tokio::spawn(async move {
        exchange(addr, "GET /slow HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n").await
    });

    // Let the request reach the script before shutting down.
    tokio::time::sleep(Duration::from_millis(500)).await;
    server.stop.send(()).unwrap();

    let (head, body) = tokio::time::timeout(Duration::from_secs(5), client)
        .await
        .expect("request was not cancelled")
        .unwrap();
    assert!(head.starts_with("HTTP/1.1 500"), "{head}");
    assert!(String::from_utf8(body).unwrap().contains("cancelled"));

    tokio::time::timeout(Duration::from_secs(5), server.handle)
        .await
        .expect("server did not drain")
        .unwrap()
        .unwrap();
}

#[tokio::test]
async fn idle_connection_does_not_block_shutdown() {
    let server = start().await;

    // A keep-alive connection that never sends a request.
    let _idle = TcpStream::connect(server.addr).await.unwrap();
    tokio::time::sleep(Duration::from_millis(100)).await;

    server.stop.send(()).unwrap();
    tokio::time::timeout(Duration::from_secs(5), server.handle)
        .await
        .expect("server did not drain")
        .unwrap()
        .unwrap();
}
