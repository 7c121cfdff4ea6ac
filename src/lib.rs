//! Fleet Admin - desktop profile administration service
//!
//! Connects an operator to a remote desktop session, captures the
//! configuration changes made there and stores them as profiles.

pub mod admin;
pub mod config;
pub mod error;
pub mod http;
pub mod profile;
pub mod proxy;
pub mod server;
pub mod session;
