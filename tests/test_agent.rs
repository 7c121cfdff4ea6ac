use std::collections::HashMap;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::sync::oneshot;

use fleet_admin::http::request::{Method, Request};
use fleet_admin::http::response::StatusCode;
use fleet_admin::proxy::agent::{build_http_request, MAX_REPLY_BODY_BYTES};
use fleet_admin::proxy::{AgentError, HttpAgentClient, RemoteAgent};

fn client(port: u16) -> HttpAgentClient {
    HttpAgentClient::new(port, Duration::from_secs(2), Duration::from_secs(2))
}

/// Serves one canned reply and hands back the raw request it received.
async fn one_shot_agent(reply: &'static [u8]) -> (u16, oneshot::Receiver<String>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    let (tx, rx) = oneshot::channel();

    tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.unwrap();
        let mut received = Vec::new();
        let mut chunk = [0u8; 1024];
        while !received.windows(4).any(|w| w == b"\r\n\r\n") {
            let n = socket.read(&mut chunk).await.unwrap();
            if n == 0 {
                break;
            }
            received.extend_from_slice(&chunk[..n]);
        }
        // the client may hang up early on oversized replies
        let _ = socket.write_all(reply).await;
        let _ = socket.shutdown().await;
        let _ = tx.send(String::from_utf8_lossy(&received).into_owned());
    });

    (port, rx)
}

#[test]
fn test_build_http_request_basic() {
    let mut headers = HashMap::new();
    headers.insert("Accept".to_string(), "application/json".to_string());

    let req = Request {
        method: Method::GET,
        path: "/session/start".to_string(),
        query: HashMap::new(),
        version: "HTTP/1.1".to_string(),
        headers,
        body: vec![],
    };

    let url = url::Url::parse("http://10.0.0.5:8182/session/start").unwrap();
    let bytes = build_http_request(&req, &url);
    let request_str = String::from_utf8_lossy(&bytes);

    assert!(request_str.starts_with("GET /session/start HTTP/1.1\r\n"));
    assert!(request_str.contains("Host: 10.0.0.5:8182\r\n"));
    assert!(request_str.contains("Accept: application/json\r\n"));
    assert!(request_str.contains("Connection: close\r\n"));
    assert!(request_str.ends_with("\r\n\r\n"));
}

#[test]
fn test_build_http_request_drops_hop_by_hop_headers() {
    let mut headers = HashMap::new();
    headers.insert("Connection".to_string(), "keep-alive".to_string());
    headers.insert("Keep-Alive".to_string(), "timeout=5".to_string());
    headers.insert("Upgrade".to_string(), "websocket".to_string());

    let req = Request {
        method: Method::POST,
        path: "/session/stop".to_string(),
        query: HashMap::new(),
        version: "HTTP/1.1".to_string(),
        headers,
        body: b"{}".to_vec(),
    };

    let url = url::Url::parse("http://agent.local/session/stop").unwrap();
    let request_str = String::from_utf8_lossy(&build_http_request(&req, &url)).into_owned();

    assert!(request_str.contains("Host: agent.local\r\n"));
    assert!(request_str.contains("Content-Length: 2\r\n"));
    assert!(request_str.contains("Connection: close\r\n"));
    assert!(!request_str.contains("keep-alive"));
    assert!(!request_str.contains("Keep-Alive"));
    assert!(!request_str.contains("Upgrade"));
    assert!(request_str.ends_with("\r\n\r\n{}"));
}

#[test]
fn test_agent_url_rejects_hosts_with_paths() {
    let c = client(8182);

    let url = c.agent_url("10.0.0.5", "/session/start").unwrap();
    assert_eq!(url.as_str(), "http://10.0.0.5:8182/session/start");

    assert!(matches!(
        c.agent_url("10.0.0.5/evil", "/session/start"),
        Err(AgentError::InvalidHost(_))
    ));
    assert!(matches!(
        c.agent_url("", "/session/start"),
        Err(AgentError::InvalidHost(_))
    ));
}

#[tokio::test]
async fn test_start_session_calls_agent_and_returns_reply() {
    let (port, received) = one_shot_agent(
        b"HTTP/1.1 200 OK\r\nContent-Type: application/json\r\nContent-Length: 15\r\n\r\n{\"status\":\"ok\"}",
    )
    .await;

    let reply = client(port).start_session("127.0.0.1").await.unwrap();

    assert_eq!(reply.status, StatusCode::Ok);
    assert_eq!(reply.body, br#"{"status":"ok"}"#);

    let request = received.await.unwrap();
    assert!(request.starts_with("GET /session/start HTTP/1.1\r\n"));
    assert!(request.contains(&format!("Host: 127.0.0.1:{}\r\n", port)));
}

#[tokio::test]
async fn test_agent_error_status_is_passed_through() {
    let (port, _received) =
        one_shot_agent(b"HTTP/1.1 409 Conflict\r\n\r\n{\"status\":\"busy\"}").await;

    let reply = client(port).stop_session("127.0.0.1").await.unwrap();

    assert_eq!(reply.status, StatusCode::Other(409));
    assert_eq!(reply.body, br#"{"status":"busy"}"#);
}

#[tokio::test]
async fn test_unreachable_agent_is_a_connect_error() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);

    let err = client(port).start_session("127.0.0.1").await.unwrap_err();

    assert!(matches!(err, AgentError::Connect { .. }));
}

#[tokio::test]
async fn test_silent_agent_times_out() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    tokio::spawn(async move {
        // accept and never answer
        let (_socket, _) = listener.accept().await.unwrap();
        tokio::time::sleep(Duration::from_secs(5)).await;
    });

    let c = HttpAgentClient::new(port, Duration::from_secs(1), Duration::from_millis(100));
    let err = c.start_session("127.0.0.1").await.unwrap_err();

    assert!(matches!(err, AgentError::Timeout(_)));
}

#[tokio::test]
async fn test_huge_content_length_is_rejected() {
    let (port, _received) = one_shot_agent(
        b"HTTP/1.1 200 OK\r\nContent-Length: 18446744073709551615\r\n\r\n{}",
    )
    .await;

    let err = client(port).start_session("127.0.0.1").await.unwrap_err();

    assert!(matches!(err, AgentError::Protocol(_)));
}

#[tokio::test]
async fn test_content_length_above_cap_is_rejected() {
    let (port, _received) = one_shot_agent(
        b"HTTP/1.1 200 OK\r\nContent-Length: 100000000000000\r\n\r\n{}",
    )
    .await;

    let err = client(port).start_session("127.0.0.1").await.unwrap_err();

    assert!(matches!(err, AgentError::Protocol(_)));
}

#[tokio::test]
async fn test_unbounded_reply_without_length_is_cut_off() {
    let mut reply = b"HTTP/1.1 200 OK\r\n\r\n".to_vec();
    reply.resize(reply.len() + MAX_REPLY_BODY_BYTES + 1024, b'x');
    let reply: &'static [u8] = Box::leak(reply.into_boxed_slice());
    let (port, _received) = one_shot_agent(reply).await;

    let err = client(port).start_session("127.0.0.1").await.unwrap_err();

    assert!(matches!(err, AgentError::Protocol(_)));
}
