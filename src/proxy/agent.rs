//! Client for the session agent running on the remote host.
//!
//! The agent listens on `http://<host>:<port>` and exposes
//! `/session/start` and `/session/stop`. Its replies are passed back to the
//! operator unchanged.

use async_trait::async_trait;
use bytes::{Buf, BytesMut};
use std::collections::HashMap;
use std::time::Duration;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::timeout;

use crate::config::AgentConfig;
use crate::http::request::{Method, Request, RequestBuilder};
use crate::http::response::StatusCode;

/// Default buffer size for reading replies
const BUFFER_SIZE: usize = 8192;

/// Reply headers larger than this are rejected
const MAX_HEADER_BYTES: usize = 64 * 1024;

/// Reply bodies larger than this are rejected
pub const MAX_REPLY_BODY_BYTES: usize = 1024 * 1024;

#[derive(Debug, Error)]
pub enum AgentError {
    #[error("invalid agent address for host {0:?}")]
    InvalidHost(String),
    #[error("could not connect to {addr}: {source}")]
    Connect {
        addr: String,
        #[source]
        source: std::io::Error,
    },
    #[error("{0} timed out")]
    Timeout(&'static str),
    #[error("i/o error talking to agent: {0}")]
    Io(#[from] std::io::Error),
    #[error("malformed agent reply: {0}")]
    Protocol(String),
}

/// Status and raw body returned by the agent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgentReply {
    pub status: StatusCode,
    pub body: Vec<u8>,
}

#[async_trait]
pub trait RemoteAgent: Send + Sync {
    async fn start_session(&self, host: &str) -> Result<AgentReply, AgentError>;
    async fn stop_session(&self, host: &str) -> Result<AgentReply, AgentError>;
}

/// Plain HTTP/1.1 agent client with bounded connect and request time.
pub struct HttpAgentClient {
    port: u16,

    /// Connection timeout duration
    connection_timeout: Duration,

    /// Request timeout duration
    request_timeout: Duration,
}

impl HttpAgentClient {
    pub fn new(port: u16, connection_timeout: Duration, request_timeout: Duration) -> Self {
        Self {
            port,
            connection_timeout,
            request_timeout,
        }
    }

    pub fn from_config(cfg: &AgentConfig) -> Self {
        Self::new(cfg.port, cfg.connect_timeout(), cfg.request_timeout())
    }

    /// Agent URL for `path` on `host`.
    pub fn agent_url(&self, host: &str, path: &str) -> Result<url::Url, AgentError> {
        let url = url::Url::parse(&format!("http://{}:{}{}", host, self.port, path))
            .map_err(|_| AgentError::InvalidHost(host.to_string()))?;
        if url.host_str().is_none() || url.path() != path {
            return Err(AgentError::InvalidHost(host.to_string()));
        }
        Ok(url)
    }

    async fn call(&self, host: &str, path: &str) -> Result<AgentReply, AgentError> {
        let url = self.agent_url(host, path)?;
        let addr = match (url.host_str(), url.port_or_known_default()) {
            (Some(h), Some(p)) => format!("{}:{}", h, p),
            _ => return Err(AgentError::InvalidHost(host.to_string())),
        };

        tracing::debug!(host, path, "Calling session agent");

        let stream = timeout(self.connection_timeout, TcpStream::connect(&addr))
            .await
            .map_err(|_| AgentError::Timeout("connect"))?
            .map_err(|source| AgentError::Connect { addr: addr.clone(), source })?;

        let request = RequestBuilder::new()
            .method(Method::GET)
            .path(path)
            .header("Accept", "application/json")
            .build()
            .map_err(|e| AgentError::Protocol(e.to_string()))?;

        let reply = timeout(
            self.request_timeout,
            self.send_request_and_receive_reply(stream, &request, &url),
        )
        .await
        .map_err(|_| AgentError::Timeout("agent request"))??;

        tracing::debug!(host, path, status = reply.status.as_u16(), "Session agent replied");
        Ok(reply)
    }

    async fn send_request_and_receive_reply(
        &self,
        mut stream: TcpStream,
        request: &Request,
        agent_url: &url::Url,
    ) -> Result<AgentReply, AgentError> {
        let request_bytes = build_http_request(request, agent_url);
        stream.write_all(&request_bytes).await?;
        stream.flush().await?;

        read_http_reply(&mut stream).await
    }
}

#[async_trait]
impl RemoteAgent for HttpAgentClient {
    async fn start_session(&self, host: &str) -> Result<AgentReply, AgentError> {
        self.call(host, "/session/start").await
    }

    async fn stop_session(&self, host: &str) -> Result<AgentReply, AgentError> {
        self.call(host, "/session/stop").await
    }
}

/// Serializes `request` for the agent at `agent_url`.
///
/// The Host header is rewritten to the agent, hop-by-hop headers are dropped
/// and `Connection: close` is forced so the reply ends with the stream.
pub fn build_http_request(request: &Request, agent_url: &url::Url) -> Vec<u8> {
    let mut buffer = Vec::new();

    let path = if request.path.is_empty() {
        "/"
    } else {
        &request.path
    };

    buffer.extend_from_slice(
        format!("{} {} {}\r\n", request.method.as_str(), path, request.version).as_bytes()
    );

    let mut headers = request.headers.clone();

    if let Some(host) = agent_url.host_str() {
        let host_value = match agent_url.port() {
            Some(port) => format!("{}:{}", host, port),
            None => host.to_string(),
        };
        headers.insert("Host".to_string(), host_value);
    }

    for hop in ["Connection", "Keep-Alive", "Proxy-Connection", "Transfer-Encoding", "Upgrade"] {
        headers.remove(hop);
    }
    headers.insert("Connection".to_string(), "close".to_string());
    headers.insert("Content-Length".to_string(), request.body.len().to_string());

    let mut names: Vec<_> = headers.iter().collect();
    names.sort();
    for (key, value) in names {
        buffer.extend_from_slice(format!("{}: {}\r\n", key, value).as_bytes());
    }

    buffer.extend_from_slice(b"\r\n");
    buffer.extend_from_slice(&request.body);

    buffer
}

/// Reads one HTTP reply from `stream`.
pub async fn read_http_reply<R>(stream: &mut R) -> Result<AgentReply, AgentError>
where
    R: AsyncRead + Unpin,
{
    let mut buffer = BytesMut::with_capacity(BUFFER_SIZE);

    loop {
        let n = stream.read_buf(&mut buffer).await?;

        if let Some(headers_end) = buffer
            .windows(4)
            .position(|window| window == b"\r\n\r\n")
        {
            let headers_bytes = buffer.split_to(headers_end + 4);
            let (status, headers) = parse_reply_headers(&headers_bytes)?;
            let body = read_reply_body(stream, &mut buffer, &headers).await?;

            return Ok(AgentReply { status, body });
        }

        if n == 0 {
            return Err(AgentError::Protocol(
                "connection closed before complete reply received".to_string(),
            ));
        }

        if buffer.len() > MAX_HEADER_BYTES {
            return Err(AgentError::Protocol("reply headers too large".to_string()));
        }
    }
}

fn parse_reply_headers(headers_bytes: &[u8]) -> Result<(StatusCode, HashMap<String, String>), AgentError> {
    let headers_str = std::str::from_utf8(headers_bytes)
        .map_err(|_| AgentError::Protocol("invalid UTF-8 in reply headers".to_string()))?;

    let mut lines = headers_str.lines();

    let status_line = lines
        .next()
        .ok_or_else(|| AgentError::Protocol("empty reply".to_string()))?;
    let code = status_line
        .split_whitespace()
        .nth(1)
        .and_then(|c| c.parse::<u16>().ok())
        .ok_or_else(|| AgentError::Protocol(format!("invalid status line: {}", status_line)))?;

    let mut headers = HashMap::new();
    for line in lines {
        if line.is_empty() {
            break;
        }

        if let Some((key, value)) = line.split_once(':') {
            headers.insert(key.trim().to_ascii_lowercase(), value.trim().to_string());
        }
    }

    Ok((StatusCode::from_u16(code), headers))
}

fn body_too_large() -> AgentError {
    AgentError::Protocol(format!("reply body exceeds {} bytes", MAX_REPLY_BODY_BYTES))
}

/// Reads the body by Content-Length, or until the agent closes the stream.
async fn read_reply_body<R>(
    stream: &mut R,
    buffer: &mut BytesMut,
    headers: &HashMap<String, String>,
) -> Result<Vec<u8>, AgentError>
where
    R: AsyncRead + Unpin,
{
    let content_length = match headers.get("content-length") {
        Some(cl) => cl
            .parse::<usize>()
            .map_err(|_| AgentError::Protocol(format!("invalid Content-Length: {}", cl)))?,
        None => {
            let mut body = buffer.split().to_vec();
            let limit = (MAX_REPLY_BODY_BYTES + 1).saturating_sub(body.len()) as u64;
            stream.take(limit).read_to_end(&mut body).await?;
            if body.len() > MAX_REPLY_BODY_BYTES {
                return Err(body_too_large());
            }
            return Ok(body);
        }
    };

    if content_length > MAX_REPLY_BODY_BYTES {
        return Err(body_too_large());
    }

    let mut body = Vec::with_capacity(content_length);

    let from_buffer = buffer.len().min(content_length);
    body.extend_from_slice(&buffer[..from_buffer]);
    buffer.advance(from_buffer);

    let mut chunk = [0u8; BUFFER_SIZE];
    while body.len() < content_length {
        let to_read = (content_length - body.len()).min(BUFFER_SIZE);
        let n = stream.read(&mut chunk[..to_read]).await?;

        if n == 0 {
            return Err(AgentError::Protocol(
                "connection closed before complete body received".to_string(),
            ));
        }

        body.extend_from_slice(&chunk[..n]);
    }

    Ok(body)
}
