//! Relay for the remote screen-sharing session.
//!
//! The operator's viewer connects to a fixed local address; each accepted
//! connection is piped to the screen server of the host the session targets.

use async_trait::async_trait;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::io::copy_bidirectional;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Mutex;
use tokio::task::{JoinHandle, JoinSet};

use crate::config::ScreenConfig;

#[async_trait]
pub trait ScreenProxy: Send + Sync {
    /// Points the relay at `host:port`, replacing any previous target.
    async fn retarget(&self, host: &str, port: u16) -> std::io::Result<()>;

    /// Stops relaying. Idempotent.
    async fn stop(&self);

    /// Current target, if the relay is running.
    async fn target(&self) -> Option<(String, u16)>;
}

#[derive(Default)]
struct RelayState {
    target: Option<(String, u16)>,
    task: Option<JoinHandle<()>>,
}

impl RelayState {
    /// Aborts the accept loop and waits for it, so its listener is closed
    /// before this returns.
    async fn shutdown(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
            let _ = task.await;
        }
        self.target = None;
    }
}

/// TCP relay listening on a fixed local address.
pub struct TcpRelay {
    listen_addr: String,
    state: Mutex<RelayState>,
}

impl TcpRelay {
    pub fn new(listen_addr: impl Into<String>) -> Self {
        Self {
            listen_addr: listen_addr.into(),
            state: Mutex::new(RelayState::default()),
        }
    }

    pub fn from_config(cfg: &ScreenConfig) -> Self {
        Self::new(cfg.listen_addr.clone())
    }
}

#[async_trait]
impl ScreenProxy for TcpRelay {
    async fn retarget(&self, host: &str, port: u16) -> std::io::Result<()> {
        let mut state = self.state.lock().await;
        state.shutdown().await;

        let listener = TcpListener::bind(&self.listen_addr).await?;
        let target: Arc<str> = Arc::from(format!("{}:{}", host, port));
        tracing::info!(listen = %self.listen_addr, target = %target, "Screen relay started");

        state.task = Some(tokio::spawn(accept_loop(listener, target)));
        state.target = Some((host.to_string(), port));
        Ok(())
    }

    async fn stop(&self) {
        let mut state = self.state.lock().await;
        if state.task.is_some() {
            tracing::info!(listen = %self.listen_addr, "Screen relay stopped");
        }
        state.shutdown().await;
    }

    async fn target(&self) -> Option<(String, u16)> {
        self.state.lock().await.target.clone()
    }
}

/// Accepts viewers and relays each one in a task owned by this loop, so
/// aborting the loop also tears down every open relay connection.
async fn accept_loop(listener: TcpListener, target: Arc<str>) {
    let mut connections = JoinSet::new();

    loop {
        tokio::select! {
            accepted = listener.accept() => match accepted {
                Ok((inbound, peer)) => {
                    connections.spawn(relay_connection(inbound, peer, Arc::clone(&target)));
                }
                Err(e) => tracing::warn!(error = %e, "Screen relay accept failed"),
            },
            Some(_) = connections.join_next(), if !connections.is_empty() => {}
        }
    }
}

async fn relay_connection(mut inbound: TcpStream, peer: SocketAddr, target: Arc<str>) {
    let mut outbound = match TcpStream::connect(&*target).await {
        Ok(stream) => stream,
        Err(e) => {
            tracing::warn!(peer = %peer, target = %target, error = %e, "Screen target unreachable");
            return;
        }
    };

    match copy_bidirectional(&mut inbound, &mut outbound).await {
        Ok((up, down)) => {
            tracing::debug!(peer = %peer, target = %target, up, down, "Screen relay connection closed");
        }
        Err(e) => {
            tracing::debug!(peer = %peer, target = %target, error = %e, "Screen relay connection failed");
        }
    }
}
