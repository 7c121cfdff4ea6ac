//! Remote collaborators of a session
//!
//! The session agent on the target host is driven over HTTP, and the remote
//! screen is reached through a local TCP relay.

pub mod agent;
pub mod screen;

pub use agent::{AgentError, AgentReply, HttpAgentClient, RemoteAgent};
pub use screen::{ScreenProxy, TcpRelay};
