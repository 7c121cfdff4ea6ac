#![allow(dead_code)]

use async_trait::async_trait;
use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use fleet_admin::http::request::{Method, Request, RequestBuilder};
use fleet_admin::http::response::StatusCode;
use fleet_admin::proxy::{AgentError, AgentReply, RemoteAgent, ScreenProxy};

/// Agent double that records calls and can be told to be unreachable.
#[derive(Default)]
pub struct FakeAgent {
    pub calls: Mutex<Vec<(String, String)>>,
    pub unreachable: AtomicBool,
}

impl FakeAgent {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn set_unreachable(&self, value: bool) {
        self.unreachable.store(value, Ordering::SeqCst);
    }

    pub fn calls(&self) -> Vec<(String, String)> {
        self.calls.lock().unwrap().clone()
    }

    fn answer(&self, action: &str, host: &str) -> Result<AgentReply, AgentError> {
        self.calls
            .lock()
            .unwrap()
            .push((action.to_string(), host.to_string()));

        if self.unreachable.load(Ordering::SeqCst) {
            return Err(AgentError::Connect {
                addr: format!("{}:8182", host),
                source: io::Error::from(io::ErrorKind::ConnectionRefused),
            });
        }
        Ok(AgentReply {
            status: StatusCode::Ok,
            body: format!(r#"{{"status":"{}"}}"#, action).into_bytes(),
        })
    }
}

#[async_trait]
impl RemoteAgent for FakeAgent {
    async fn start_session(&self, host: &str) -> Result<AgentReply, AgentError> {
        self.answer("started", host)
    }

    async fn stop_session(&self, host: &str) -> Result<AgentReply, AgentError> {
        self.answer("stopped", host)
    }
}

/// Screen relay double remembering its target.
#[derive(Default)]
pub struct FakeScreen {
    pub current: Mutex<Option<(String, u16)>>,
    pub stops: Mutex<usize>,
    pub port_taken: AtomicBool,
}

impl FakeScreen {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn set_port_taken(&self, value: bool) {
        self.port_taken.store(value, Ordering::SeqCst);
    }

    pub fn stop_count(&self) -> usize {
        *self.stops.lock().unwrap()
    }
}

#[async_trait]
impl ScreenProxy for FakeScreen {
    async fn retarget(&self, host: &str, port: u16) -> io::Result<()> {
        if self.port_taken.load(Ordering::SeqCst) {
            return Err(io::Error::from(io::ErrorKind::AddrInUse));
        }
        *self.current.lock().unwrap() = Some((host.to_string(), port));
        Ok(())
    }

    async fn stop(&self) {
        *self.current.lock().unwrap() = None;
        *self.stops.lock().unwrap() += 1;
    }

    async fn target(&self) -> Option<(String, u16)> {
        self.current.lock().unwrap().clone()
    }
}

pub fn get(path: &str) -> Request {
    RequestBuilder::new().method(Method::GET).path(path).build().unwrap()
}

pub fn post(path: &str, body: &str) -> Request {
    RequestBuilder::new()
        .method(Method::POST)
        .path(path)
        .header("Content-Type", "application/json")
        .body(body)
        .build()
        .unwrap()
}
