//! Configuration-capture session.
//!
//! # States
//!
//! ```text
//!   Idle ──start(host)──▶ Active ──select_changes──▶ Pending
//!    ▲                      │                          │
//!    └────────── stop ──────┴── stop / save / discard ─┘
//! ```
//!
//! - **Idle**: no host, no collectors, nothing pending.
//! - **Active**: a host is targeted and one collector per supported
//!   namespace is capturing changes.
//! - **Pending**: the collectors were frozen into a changeset under a fresh
//!   uid; nothing captures anymore until the changeset is saved as a profile,
//!   discarded, or the session is stopped.
//!
//! Every transition runs while holding the state lock, including the call to
//! the remote agent, so concurrent requests observe them one at a time.

pub mod collector;
pub mod goa;
pub mod gsettings;

use std::collections::BTreeSet;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::Mutex;

use crate::http::request::Request;
use crate::profile::{Profile, ProfileDraft, ProfileStore, StoreError};
use crate::proxy::{AgentReply, RemoteAgent, ScreenProxy};
use collector::{ChangeRecord, CollectorError, CollectorFactory, CollectorRegistry};

pub use collector::Collector;

/// Collectors created for every new session.
pub fn supported_collectors() -> Vec<CollectorFactory> {
    vec![
        gsettings::GSettingsCollector::boxed as CollectorFactory,
        goa::GoaCollector::boxed,
    ]
}

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("session already started")]
    AlreadyStarted,
    #[error("there was no session started")]
    NoSession,
    #[error("session was not started")]
    NotStarted,
    #[error("could not connect to host")]
    ConnectFailed,
    #[error("namespace {0} not supported or session not started")]
    NamespaceUnavailable(String),
    #[error("change selection has not been submitted yet in the current session")]
    NoChangeset,
    #[error("nonexisting uid")]
    UidMismatch,
    #[error("profile {0} not found")]
    ProfileNotFound(String),
    #[error("{0}")]
    Collector(#[from] CollectorError),
    #[error(transparent)]
    Store(#[from] StoreError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    SessionActive,
    ChangesetPending,
}

#[derive(Debug, Default)]
pub enum SessionState {
    #[default]
    Idle,
    Active {
        host: String,
        collectors: CollectorRegistry,
    },
    Pending {
        host: String,
        uid: String,
        changeset: CollectorRegistry,
    },
}

impl SessionState {
    pub fn phase(&self) -> Phase {
        match self {
            SessionState::Idle => Phase::Idle,
            SessionState::Active { .. } => Phase::SessionActive,
            SessionState::Pending { .. } => Phase::ChangesetPending,
        }
    }

    pub fn host(&self) -> Option<&str> {
        match self {
            SessionState::Idle => None,
            SessionState::Active { host, .. } | SessionState::Pending { host, .. } => Some(host),
        }
    }
}

/// Fresh opaque token: a random 128-bit integer in decimal.
pub fn new_token() -> String {
    uuid::Uuid::new_v4().as_u128().to_string()
}

pub struct Session {
    state: Mutex<SessionState>,
    factories: Vec<CollectorFactory>,
    agent: Arc<dyn RemoteAgent>,
    screen: Arc<dyn ScreenProxy>,
    screen_port: u16,
}

impl Session {
    pub fn new(agent: Arc<dyn RemoteAgent>, screen: Arc<dyn ScreenProxy>, screen_port: u16) -> Self {
        Self::with_collectors(agent, screen, screen_port, supported_collectors())
    }

    pub fn with_collectors(
        agent: Arc<dyn RemoteAgent>,
        screen: Arc<dyn ScreenProxy>,
        screen_port: u16,
        factories: Vec<CollectorFactory>,
    ) -> Self {
        Self {
            state: Mutex::new(SessionState::Idle),
            factories,
            agent,
            screen,
            screen_port,
        }
    }

    pub async fn phase(&self) -> Phase {
        self.state.lock().await.phase()
    }

    pub async fn target_host(&self) -> Option<String> {
        self.state.lock().await.host().map(str::to_string)
    }

    pub async fn pending_uid(&self) -> Option<String> {
        match &*self.state.lock().await {
            SessionState::Pending { uid, .. } => Some(uid.clone()),
            _ => None,
        }
    }

    /// Namespaces with a live collector.
    pub async fn active_namespaces(&self) -> Vec<String> {
        match &*self.state.lock().await {
            SessionState::Active { collectors, .. } => {
                collectors.namespaces().into_iter().map(str::to_string).collect()
            }
            _ => Vec::new(),
        }
    }

    /// Asks the agent on `host` to start a session and, once it answered,
    /// retargets the screen relay and starts capturing.
    pub async fn start(&self, host: &str) -> Result<AgentReply, SessionError> {
        let mut state = self.state.lock().await;
        if !matches!(*state, SessionState::Idle) {
            return Err(SessionError::AlreadyStarted);
        }

        let reply = match self.agent.start_session(host).await {
            Ok(reply) => reply,
            Err(e) => {
                tracing::warn!(host, error = %e, "Could not start session on host");
                return Err(SessionError::ConnectFailed);
            }
        };

        // A relay failure does not undo the remote start.
        if let Err(e) = self.screen.retarget(host, self.screen_port).await {
            tracing::error!(host, error = %e, "Failed to retarget screen relay");
        }

        *state = SessionState::Active {
            host: host.to_string(),
            collectors: CollectorRegistry::from_factories(&self.factories),
        };
        tracing::info!(host, status = reply.status.as_u16(), "Session started");
        Ok(reply)
    }

    /// Hands a change for `namespace` to its live collector.
    pub async fn submit_change(&self, namespace: &str, request: &Request) -> Result<(), SessionError> {
        let mut state = self.state.lock().await;
        let collector = match &mut *state {
            SessionState::Active { collectors, .. } => collectors.get_mut(namespace),
            _ => None,
        }
        .ok_or_else(|| SessionError::NamespaceUnavailable(namespace.to_string()))?;

        collector.capture_change(request)?;
        Ok(())
    }

    /// Changes captured so far by the desktop settings collector.
    pub async fn settings_changes(&self) -> Result<Vec<ChangeRecord>, SessionError> {
        let state = self.state.lock().await;
        match &*state {
            SessionState::Active { collectors, .. } => collectors
                .get(gsettings::NAMESPACE)
                .map(|c| c.list_captured())
                .ok_or(SessionError::NotStarted),
            _ => Err(SessionError::NotStarted),
        }
    }

    /// Marks `indices` on the settings collector and freezes all collectors
    /// into a changeset under a new uid, which is returned.
    pub async fn select_changes(&self, indices: &BTreeSet<usize>) -> Result<String, SessionError> {
        let mut state = self.state.lock().await;
        let SessionState::Active { collectors, .. } = &mut *state else {
            return Err(SessionError::NotStarted);
        };
        collectors
            .get_mut(gsettings::NAMESPACE)
            .ok_or(SessionError::NotStarted)?
            .mark_selected(indices);

        let uid = new_token();
        if let SessionState::Active { host, collectors } = std::mem::take(&mut *state) {
            *state = SessionState::Pending {
                host,
                uid: uid.clone(),
                changeset: collectors,
            };
        }

        tracing::info!(uid = %uid, selected = indices.len(), "Changeset frozen");
        Ok(uid)
    }

    /// Checks that a changeset is pending under `id`.
    pub async fn check_pending(&self, id: &str) -> Result<(), SessionError> {
        let state = self.state.lock().await;
        pending_guard(&state, id).map(|_| ())
    }

    /// Writes the pending changeset as profile `id` and returns to idle. If
    /// writing fails the changeset stays pending.
    pub async fn save_profile(
        &self,
        id: &str,
        draft: ProfileDraft,
        store: &ProfileStore,
    ) -> Result<Profile, SessionError> {
        let mut state = self.state.lock().await;
        let changeset = pending_guard(&state, id)?;

        let profile = Profile::new(id, draft, changeset.export_all());
        store.write_profile(&profile).await?;
        store.upsert_index_entry(profile.index_entry()).await?;

        *state = SessionState::Idle;
        drop(state);

        self.screen.stop().await;
        tracing::info!(uid = id, name = %profile.name, "Profile saved");
        Ok(profile)
    }

    /// Drops the pending changeset `id` and returns to idle.
    pub async fn discard(&self, id: &str) -> Result<(), SessionError> {
        let mut state = self.state.lock().await;
        match &*state {
            SessionState::Pending { uid, .. } if uid == id => {}
            _ => return Err(SessionError::ProfileNotFound(id.to_string())),
        }

        *state = SessionState::Idle;
        drop(state);

        self.screen.stop().await;
        tracing::info!(uid = id, "Changeset discarded");
        Ok(())
    }

    /// Tells the agent to stop and clears all local state. Local cleanup
    /// happens even when the agent cannot be reached.
    pub async fn stop(&self) -> Result<AgentReply, SessionError> {
        let mut state = self.state.lock().await;
        let Some(host) = state.host().map(str::to_string) else {
            return Err(SessionError::NoSession);
        };

        let result = self.agent.stop_session(&host).await;

        self.screen.stop().await;
        *state = SessionState::Idle;
        tracing::info!(host = %host, "Session stopped");

        result.map_err(|e| {
            tracing::warn!(host = %host, error = %e, "Could not stop session on host");
            SessionError::ConnectFailed
        })
    }
}

fn pending_guard<'a>(state: &'a SessionState, id: &str) -> Result<&'a CollectorRegistry, SessionError> {
    match state {
        SessionState::Pending { uid, changeset, .. } if uid == id => Ok(changeset),
        SessionState::Pending { .. } => Err(SessionError::UidMismatch),
        _ => Err(SessionError::NoChangeset),
    }
}
