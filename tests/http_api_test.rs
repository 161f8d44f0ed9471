//! HTTP control plane and websocket relay against a bound server

mod common;

use camproxy::server::ProxyServer;
use common::{read_pid_file, test_config, wait_until_dead, ShellInvocation};
use futures::StreamExt;
use serde_json::Value;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;

struct TestServer {
    addr: SocketAddr,
    shutdown: Option<oneshot::Sender<()>>,
    task: JoinHandle<anyhow::Result<()>>,
    _dir: TempDir,
}

impl TestServer {
    async fn start(script: &str) -> Self {
        Self::start_with(TempDir::new().unwrap(), ShellInvocation::new(script)).await
    }

    async fn start_with(dir: TempDir, invocation: ShellInvocation) -> Self {
        let config = test_config(dir.path());
        let server = ProxyServer::new(config, Arc::new(invocation));

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (tx, rx) = oneshot::channel::<()>();
        let task = tokio::spawn(server.serve(listener, async {
            let _ = rx.await;
        }));

        Self {
            addr,
            shutdown: Some(tx),
            task,
            _dir: dir,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    fn ws_url(&self, path: &str) -> String {
        format!("ws://{}{}", self.addr, path)
    }

    async fn stop(mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        tokio::time::timeout(Duration::from_secs(10), self.task)
            .await
            .expect("server shut down")
            .unwrap()
            .unwrap();
    }
}

#[tokio::test]
async fn test_list_cameras() {
    let server = TestServer::start("exec sleep 30").await;
    let body: Value = reqwest::get(server.url("/cameras"))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();

    let cameras = body["cameras"].as_array().unwrap();
    assert_eq!(cameras.len(), 2);
    let cam1 = cameras.iter().find(|c| c["id"] == "cam1").unwrap();
    assert_eq!(cam1["enabled"], true);
    assert_eq!(cam1["resolution"]["width"], 1280);
    assert_eq!(cam1["status"]["websocket"], false);
    assert_eq!(cam1["status"]["hls"], false);

    server.stop().await;
}

#[tokio::test]
async fn test_hls_start_status_stop() {
    let server = TestServer::start("exec sleep 30").await;
    let client = reqwest::Client::new();

    let response = client
        .post(server.url("/cameras/cam1/hls/start"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 200);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["status"], "started");
    assert_eq!(body["hls_url"], "/streams/cam1/index.m3u8");

    let body: Value = client
        .post(server.url("/cameras/cam1/hls/start"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["status"], "already running");

    let status: Value = client
        .get(server.url("/cameras/cam1/hls/status"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(status["running"], true);
    assert_eq!(status["output_ready"], false);

    let body: Value = client
        .post(server.url("/cameras/cam1/hls/stop"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["status"], "stopped");

    let status: Value = client
        .get(server.url("/cameras/cam1/hls/status"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(status["running"], false);

    server.stop().await;
}

#[tokio::test]
async fn test_hls_start_error_mapping() {
    let server = TestServer::start("exec sleep 30").await;
    let client = reqwest::Client::new();

    let response = client
        .post(server.url("/cameras/missing/hls/start"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 404);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["detail"], "Camera missing not found");

    let response = client
        .post(server.url("/cameras/cam-off/hls/start"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 400);

    server.stop().await;

    let failing = TestServer::start("exit 3").await;
    let response = client
        .post(failing.url("/cameras/cam1/hls/start"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 500);
    failing.stop().await;
}

#[tokio::test]
async fn test_websocket_unknown_camera_closes_with_policy_violation() {
    let server = TestServer::start("exec sleep 30").await;
    let (mut socket, _) = tokio_tungstenite::connect_async(server.ws_url("/stream/missing"))
        .await
        .unwrap();

    let message = tokio::time::timeout(Duration::from_secs(5), socket.next())
        .await
        .unwrap()
        .unwrap()
        .unwrap();
    match message {
        Message::Close(Some(frame)) => assert_eq!(u16::from(frame.code), 1008),
        other => panic!("expected close frame, got {other:?}"),
    }

    server.stop().await;
}

#[tokio::test]
async fn test_websocket_relays_binary_frames() {
    let server = TestServer::start("printf 'hello camera'; exec sleep 30").await;
    let (mut socket, _) = tokio_tungstenite::connect_async(server.ws_url("/stream/cam1"))
        .await
        .unwrap();

    let mut received = Vec::new();
    while received.len() < b"hello camera".len() {
        let message = tokio::time::timeout(Duration::from_secs(5), socket.next())
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        match message {
            Message::Binary(data) => received.extend_from_slice(&data),
            other => panic!("expected binary frame, got {other:?}"),
        }
    }
    assert_eq!(received, b"hello camera");

    socket.close(None).await.unwrap();
    drop(socket);
    server.stop().await;
}

#[tokio::test]
async fn test_websocket_disconnect_terminates_transcoder() {
    let dir = TempDir::new().unwrap();
    let pid_file = dir.path().join("relay.pid");
    let invocation =
        ShellInvocation::new("echo $$ > '{pidfile}'; exec sleep 30").with_pid_file(&pid_file);
    let server = TestServer::start_with(dir, invocation).await;

    let (socket, _) = tokio_tungstenite::connect_async(server.ws_url("/stream/cam1"))
        .await
        .unwrap();
    let pid = read_pid_file(&pid_file).await;

    // Drop without a close handshake, as a browser tab being killed would
    drop(socket);
    assert!(wait_until_dead(pid, Duration::from_secs(3)).await);

    server.stop().await;
}
