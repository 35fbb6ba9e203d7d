//! Local servers for tests. Everything binds to `127.0.0.1:0`.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use axum::http::{HeaderMap, StatusCode};
use axum::routing::post;
use axum::{Json, Router};
use parking_lot::Mutex;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

use crate::constants::{CSRF_TOKEN_HEADER, USER_STATUS_PATH};

const TLS_HANDSHAKE: u8 = 0x16;

/// Plain-HTTP responder that counts TLS handshakes separately from HTTP requests.
pub struct RawServer {
    pub port: u16,
    pub tls_attempts: Arc<AtomicUsize>,
    pub http_requests: Arc<AtomicUsize>,
}

impl RawServer {
    pub fn tls_attempts(&self) -> usize {
        self.tls_attempts.load(Ordering::SeqCst)
    }

    pub fn http_requests(&self) -> usize {
        self.http_requests.load(Ordering::SeqCst)
    }
}

async fn drain_request(sock: &mut TcpStream) {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 1024];
    let header_end = loop {
        let n = match sock.read(&mut chunk).await {
            Ok(0) | Err(_) => return,
            Ok(n) => n,
        };
        buf.extend_from_slice(&chunk[..n]);
        if let Some(pos) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
            break pos + 4;
        }
    };
    let head = String::from_utf8_lossy(&buf[..header_end]).to_ascii_lowercase();
    let content_len = head
        .lines()
        .find_map(|l| l.strip_prefix("content-length:"))
        .and_then(|v| v.trim().parse::<usize>().ok())
        .unwrap_or(0);
    let mut have = buf.len() - header_end;
    while have < content_len {
        match sock.read(&mut chunk).await {
            Ok(0) | Err(_) => return,
            Ok(n) => have += n,
        }
    }
}

pub async fn spawn_raw_server(status: u16, body: &'static str) -> RawServer {
    spawn_raw_server_with_headers(status, String::new(), body).await
}

/// Like [`spawn_raw_server`], with extra `Name: value\r\n` header lines in every response.
pub async fn spawn_raw_server_with_headers(
    status: u16,
    extra_headers: String,
    body: &'static str,
) -> RawServer {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    let tls_attempts = Arc::new(AtomicUsize::new(0));
    let http_requests = Arc::new(AtomicUsize::new(0));
    let (tls, http) = (tls_attempts.clone(), http_requests.clone());
    let extra_headers = Arc::new(extra_headers);
    tokio::spawn(async move {
        while let Ok((mut sock, _)) = listener.accept().await {
            let (tls, http) = (tls.clone(), http.clone());
            let extra_headers = extra_headers.clone();
            tokio::spawn(async move {
                let mut first = [0u8; 1];
                if sock.peek(&mut first).await.unwrap_or(0) == 0 {
                    return;
                }
                if first[0] == TLS_HANDSHAKE {
                    tls.fetch_add(1, Ordering::SeqCst);
                    return;
                }
                drain_request(&mut sock).await;
                http.fetch_add(1, Ordering::SeqCst);
                let resp = format!(
                    "HTTP/1.1 {status} Test\r\nContent-Type: application/json\r\n{extra_headers}Content-Length: {}\r\nConnection: close\r\n\r\n{body}",
                    body.len()
                );
                let _ = sock.write_all(resp.as_bytes()).await;
                let _ = sock.shutdown().await;
            });
        }
    });
    RawServer {
        port,
        tls_attempts,
        http_requests,
    }
}

/// Listener on a loopback address outside the allowlist. Counts every accepted connection and
/// answers plaintext requests with `200 {}`.
pub struct OutsideListener {
    pub host: String,
    pub port: u16,
    pub accepted: Arc<AtomicUsize>,
}

impl OutsideListener {
    pub fn accepted(&self) -> usize {
        self.accepted.load(Ordering::SeqCst)
    }
}

pub async fn spawn_outside_listener() -> OutsideListener {
    let host = "127.0.0.2";
    let listener = TcpListener::bind((host, 0)).await.unwrap();
    let port = listener.local_addr().unwrap().port();
    let accepted = Arc::new(AtomicUsize::new(0));
    let counter = accepted.clone();
    tokio::spawn(async move {
        while let Ok((mut sock, _)) = listener.accept().await {
            counter.fetch_add(1, Ordering::SeqCst);
            tokio::spawn(async move {
                drain_request(&mut sock).await;
                let _ = sock
                    .write_all(
                        b"HTTP/1.1 200 OK\r\nContent-Type: application/json\r\nContent-Length: 2\r\nConnection: close\r\n\r\n{}",
                    )
                    .await;
                let _ = sock.shutdown().await;
            });
        }
    });
    OutsideListener {
        host: host.to_string(),
        port,
        accepted,
    }
}

/// Fake language server: answers the user-status path with 200 when the csrf header matches.
pub struct FakeLanguageServer {
    pub port: u16,
    pub hits: Arc<AtomicUsize>,
    pub seen_tokens: Arc<Mutex<Vec<String>>>,
}

pub async fn spawn_language_server(expected_token: &'static str) -> FakeLanguageServer {
    let hits = Arc::new(AtomicUsize::new(0));
    let seen_tokens = Arc::new(Mutex::new(Vec::new()));
    let (counter, seen) = (hits.clone(), seen_tokens.clone());
    let app = Router::new().route(
        USER_STATUS_PATH,
        post(move |headers: HeaderMap, _body: Json<serde_json::Value>| {
            let (counter, seen) = (counter.clone(), seen.clone());
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                let token = headers
                    .get(CSRF_TOKEN_HEADER)
                    .and_then(|v| v.to_str().ok())
                    .unwrap_or_default()
                    .to_string();
                seen.lock().push(token.clone());
                if token == expected_token {
                    (StatusCode::OK, Json(serde_json::json!({ "userStatus": {} })))
                } else {
                    (
                        StatusCode::FORBIDDEN,
                        Json(serde_json::json!({ "code": "permission_denied" })),
                    )
                }
            }
        }),
    );
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    FakeLanguageServer {
        port,
        hits,
        seen_tokens,
    }
}

/// A port nothing listens on.
pub async fn closed_port() -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    listener.local_addr().unwrap().port()
}
