//! The admin HTTP service: route table, shared service state and the
//! [`App`] entry point used by the transport.

pub mod handlers;

use std::sync::Arc;

use crate::config::Config;
use crate::http::request::{Method, Request};
use crate::http::response::Response;
use crate::http::router::{PatternError, Router};
use crate::profile::ProfileStore;
use crate::proxy::{HttpAgentClient, RemoteAgent, ScreenProxy, TcpRelay};
use crate::session::Session;

/// State shared by all handlers.
pub struct AdminService {
    pub config: Config,
    pub session: Session,
    pub store: ProfileStore,
}

impl AdminService {
    pub fn new(config: Config, agent: Arc<dyn RemoteAgent>, screen: Arc<dyn ScreenProxy>) -> Self {
        let session = Session::new(agent, screen, config.screen.target_port);
        let store = ProfileStore::new(config.paths.profiles_dir.clone());
        Self {
            config,
            session,
            store,
        }
    }

    /// Service talking to real agents and relaying the screen over TCP.
    pub fn from_config(config: Config) -> Self {
        let agent = Arc::new(HttpAgentClient::from_config(&config.agent));
        let screen = Arc::new(TcpRelay::from_config(&config.screen));
        Self::new(config, agent, screen)
    }
}

/// Builds the route table. Order matters: the first pattern matching a path
/// decides, so `profiles/add` must precede `profiles/<profile_id>`.
pub fn router() -> Result<Router<AdminService>, PatternError> {
    use Method::{GET, POST};

    let mut r = Router::new();
    r.route("static/<path:path>", &[GET], |svc: Arc<AdminService>, _req, p| async move {
        svc.serve_static(&p).await
    })?
    .route("profiles/", &[GET], |svc: Arc<AdminService>, _req, _p| async move {
        svc.profiles().await
    })?
    .route("profiles/save/<id>", &[POST], |svc: Arc<AdminService>, req, p| async move {
        svc.profiles_save(&p, &req).await
    })?
    .route("profiles/add", &[GET], |svc: Arc<AdminService>, _req, _p| async move {
        svc.template("profile.add.html").await
    })?
    .route("profiles/delete/<uid>", &[GET], |svc: Arc<AdminService>, _req, p| async move {
        svc.profiles_delete(&p).await
    })?
    .route("profiles/discard/<id>", &[GET], |svc: Arc<AdminService>, _req, p| async move {
        svc.profiles_discard(&p).await
    })?
    .route("profiles/<profile_id>", &[GET], |svc: Arc<AdminService>, _req, p| async move {
        svc.profile(&p).await
    })?
    .route("changes", &[GET], |svc: Arc<AdminService>, _req, _p| async move {
        svc.changes().await
    })?
    .route("changes/submit/<name>", &[POST], |svc: Arc<AdminService>, req, p| async move {
        svc.changes_submit(&p, &req).await
    })?
    .route("changes/select", &[POST], |svc: Arc<AdminService>, req, _p| async move {
        svc.changes_select(&req).await
    })?
    .route("deploy/<name>", &[GET], |svc: Arc<AdminService>, _req, _p| async move {
        svc.template("deploy.html").await
    })?
    .route("session/start", &[POST], |svc: Arc<AdminService>, req, _p| async move {
        svc.session_start(&req).await
    })?
    .route("session/stop", &[GET], |svc: Arc<AdminService>, _req, _p| async move {
        svc.session_stop().await
    })?
    .route("", &[GET], |svc: Arc<AdminService>, _req, _p| async move {
        svc.template("index.html").await
    })?;

    Ok(r)
}

/// Route table plus service: what a connection hands each request to.
pub struct App {
    router: Router<AdminService>,
    service: Arc<AdminService>,
}

impl App {
    pub fn new(service: AdminService) -> Result<Self, PatternError> {
        Ok(Self {
            router: router()?,
            service: Arc::new(service),
        })
    }

    pub fn service(&self) -> &Arc<AdminService> {
        &self.service
    }

    pub async fn handle(&self, req: Request) -> Response {
        self.router.dispatch(Arc::clone(&self.service), req).await
    }
}
