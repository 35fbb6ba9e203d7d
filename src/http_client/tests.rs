use super::*;
use crate::test_support::{
    closed_port, spawn_outside_listener, spawn_raw_server, spawn_raw_server_with_headers,
};

#[test]
fn allowlist_accepts_loopback_and_private_ranges_only() {
    for host in [
        "localhost",
        "127.0.0.1",
        "10.0.0.1",
        "10.255.255.254",
        "172.16.0.1",
        "172.31.255.255",
        "192.168.1.20",
    ] {
        assert!(is_allowed_host(host), "{host} should be allowed");
    }
    for host in [
        "8.8.8.8",
        "172.15.0.1",
        "172.32.0.1",
        "192.169.0.1",
        "127.0.0.2",
        "10.evil.com",
        "localhost.evil.com",
        "example.com",
        "::1",
        "",
    ] {
        assert!(!is_allowed_host(host), "{host} should be blocked");
    }
}

#[tokio::test]
async fn non_local_host_fails_before_any_network_activity() {
    let outside = spawn_outside_listener().await;
    assert!(!is_allowed_host(&outside.host));
    let client = SecureClient::new().unwrap();

    let req = HttpRequest::post(&outside.host, outside.port, "/").timeout(Duration::from_secs(30));
    let err = client.request(&req).await.unwrap_err();
    assert!(err.is_security(), "{err}");

    let err = client
        .request(&HttpRequest::post("8.8.8.8", 443, "/").timeout(Duration::from_secs(30)))
        .await
        .unwrap_err();
    assert!(err.is_security(), "{err}");

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(outside.accepted(), 0);
    assert!(client.protocol_cache().is_empty());
}

#[tokio::test]
async fn redirects_are_returned_not_followed() {
    let outside = spawn_outside_listener().await;
    let location = format!("Location: http://{}:{}/steal\r\n", outside.host, outside.port);
    let server = spawn_raw_server_with_headers(307, location, "").await;
    let client = SecureClient::new().unwrap();

    let req = HttpRequest::post("127.0.0.1", server.port, "/probe")
        .header("X-Codeium-Csrf-Token", "secret")
        .json(serde_json::json!({}));
    let resp = client.request(&req).await.unwrap();
    assert_eq!(resp.status_code, 307);
    assert_eq!(resp.protocol, Protocol::Http);
    assert!(!resp.is_success());

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(outside.accepted(), 0);
    assert_eq!(server.http_requests(), 1);
}

#[tokio::test]
async fn plaintext_fallback_is_remembered_per_endpoint() {
    let server = spawn_raw_server(200, r#"{"ok":true}"#).await;
    let client = SecureClient::new().unwrap();
    let req = HttpRequest::post("127.0.0.1", server.port, "/probe").json(serde_json::json!({}));

    let first = client.request(&req).await.unwrap();
    assert_eq!(first.protocol, Protocol::Http);
    assert_eq!(first.data, serde_json::json!({"ok": true}));
    assert_eq!(server.tls_attempts(), 1);
    assert_eq!(
        client.protocol_cache().get("127.0.0.1", server.port),
        Some(Protocol::Http)
    );

    let second = client.request(&req).await.unwrap();
    assert_eq!(second.protocol, Protocol::Http);
    assert_eq!(server.tls_attempts(), 1, "HTTPS must not be retried");
    assert_eq!(server.http_requests(), 2);
    assert_eq!(client.protocol_cache().len(), 1);
}

#[tokio::test]
async fn cache_is_shared_between_clones() {
    let server = spawn_raw_server(200, "{}").await;
    let client = SecureClient::new().unwrap();
    let clone = client.clone();
    let req = HttpRequest::get("127.0.0.1", server.port, "/");
    clone.request(&req).await.unwrap();
    assert_eq!(
        client.protocol_cache().get("127.0.0.1", server.port),
        Some(Protocol::Http)
    );
}

#[tokio::test]
async fn no_fallback_when_disabled() {
    let server = spawn_raw_server(200, "{}").await;
    let client = SecureClient::new().unwrap();
    let req = HttpRequest::post("127.0.0.1", server.port, "/").allow_fallback(false);
    let err = client.request(&req).await.unwrap_err();
    assert!(!err.is_security());
    assert_eq!(server.http_requests(), 0);
    assert!(client.protocol_cache().is_empty());
}

#[tokio::test]
async fn unreachable_endpoint_reports_the_https_error() {
    let port = closed_port().await;
    let client = SecureClient::new().unwrap();
    let req = HttpRequest::post("127.0.0.1", port, "/").timeout(Duration::from_secs(2));
    match client.request(&req).await {
        Err(RequestError::Transport { protocol, .. }) | Err(RequestError::Timeout { protocol }) => {
            assert_eq!(protocol, Protocol::Https)
        }
        other => panic!("unexpected {other:?}"),
    }
    assert!(client.protocol_cache().get("127.0.0.1", port).is_none());
}

#[tokio::test]
async fn error_status_with_text_body_is_tolerated() {
    let server = spawn_raw_server(503, "<html>busy</html>").await;
    let client = SecureClient::new().unwrap();
    let resp = client
        .request(&HttpRequest::post("127.0.0.1", server.port, "/"))
        .await
        .unwrap();
    assert_eq!(resp.status_code, 503);
    assert_eq!(resp.data, serde_json::json!({"error": "HTTP 503"}));
    assert!(!resp.is_success());
}

#[test]
fn body_parsing_rules() {
    assert_eq!(
        parse_body(b"", 200, Protocol::Http).unwrap(),
        serde_json::json!({})
    );
    assert_eq!(
        parse_body(br#"{"a":1}"#, 200, Protocol::Http).unwrap(),
        serde_json::json!({"a": 1})
    );
    assert_eq!(
        parse_body(b"nope", 401, Protocol::Https).unwrap(),
        serde_json::json!({"error": "HTTP 401"})
    );
    assert!(matches!(
        parse_body(b"nope", 200, Protocol::Https),
        Err(RequestError::InvalidResponse {
            protocol: Protocol::Https
        })
    ));
}

#[test]
fn response_classification() {
    let resp = |status_code| HttpResponse {
        status_code,
        data: Value::Null,
        protocol: Protocol::Http,
    };
    assert!(resp(200).is_success());
    assert!(resp(204).is_success());
    assert!(!resp(302).is_success());
    assert!(resp(401).is_auth_failure());
    assert!(resp(403).is_auth_failure());
    assert!(!resp(500).is_auth_failure());
}
