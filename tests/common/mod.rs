//! Shared utilities for integration testing.

use std::net::SocketAddr;
use std::time::Duration;

use axum::{http::HeaderMap, http::StatusCode, routing::get, Json, Router};
use referral_gateway::{GatewayConfig, GatewayServer, Shutdown};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

/// Start a mock upstream that answers every request with
/// `<request line>|<x-user-role or ->`.
pub async fn start_mock_upstream() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        loop {
            match listener.accept().await {
                Ok((mut socket, _)) => {
                    tokio::spawn(async move {
                        let mut buf = Vec::new();
                        let mut chunk = [0u8; 1024];
                        while !buf.windows(4).any(|w| w == b"\r\n\r\n") {
                            match socket.read(&mut chunk).await {
                                Ok(0) | Err(_) => return,
                                Ok(n) => buf.extend_from_slice(&chunk[..n]),
                            }
                        }

                        let head = String::from_utf8_lossy(&buf);
                        let mut lines = head.lines();
                        let request_line = lines.next().unwrap_or_default().to_string();
                        let role = lines
                            .filter_map(|l| l.split_once(':'))
                            .find(|(name, _)| name.trim().eq_ignore_ascii_case("x-user-role"))
                            .map(|(_, v)| v.trim().to_string())
                            .unwrap_or_else(|| "-".to_string());

                        let body = format!("{request_line}|{role}");
                        let response = format!(
                            "HTTP/1.1 200 OK\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                            body.len(),
                            body
                        );
                        let _ = socket.write_all(response.as_bytes()).await;
                        let _ = socket.shutdown().await;
                    });
                }
                Err(_) => break,
            }
        }
    });

    addr
}

/// Start a mock hosted auth service exposing `/auth/v1/user`.
///
/// Tokens: `admin-token` (admin claim), `user-token` (plain user).
#[allow(dead_code)]
pub async fn start_mock_auth() -> SocketAddr {
    async fn user(headers: HeaderMap) -> (StatusCode, Json<serde_json::Value>) {
        let auth = headers
            .get("authorization")
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default();
        match auth {
            "Bearer admin-token" => (
                StatusCode::OK,
                Json(serde_json::json!({
                    "id": "admin-1",
                    "email": "ops@example.com",
                    "app_metadata": { "role": "admin" }
                })),
            ),
            "Bearer user-token" => (
                StatusCode::OK,
                Json(serde_json::json!({ "id": "user-1", "email": "user@example.com" })),
            ),
            _ => (StatusCode::UNAUTHORIZED, Json(serde_json::json!({}))),
        }
    }

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let app = Router::new().route("/auth/v1/user", get(user));
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    addr
}

/// Start the gateway in the background. Returns its address and the
/// shutdown handle.
pub async fn start_gateway(mut config: GatewayConfig) -> (SocketAddr, Shutdown) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    config.listener.bind_address = addr.to_string();
    config.observability.metrics_enabled = false;

    let server = GatewayServer::new(config).unwrap();
    let shutdown = Shutdown::new();
    let server_shutdown = shutdown.subscribe();
    tokio::spawn(async move {
        let _ = server.run(listener, server_shutdown).await;
    });

    tokio::time::sleep(Duration::from_millis(50)).await;
    (addr, shutdown)
}

/// A client that neither pools connections nor follows redirects.
pub fn client() -> reqwest::Client {
    reqwest::Client::builder()
        .pool_max_idle_per_host(0)
        .redirect(reqwest::redirect::Policy::none())
        .no_proxy()
        .build()
        .unwrap()
}
