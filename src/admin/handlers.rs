//! Request handlers of the admin service.
//!
//! Validation failures are answered with 403 and a `{"status": ...}` body;
//! successful mutations answer `{"status": "ok"}`.

use anyhow::Context;
use serde_json::{json, Value};
use std::collections::BTreeSet;
use std::io::ErrorKind;
use std::path::{Component, Path};

use super::AdminService;
use crate::error::ApiError;
use crate::http::mime;
use crate::http::request::Request;
use crate::http::response::{Response, ResponseBuilder, StatusCode};
use crate::http::router::{HandlerResult, Params};
use crate::profile::ProfileDraft;
use crate::proxy::AgentReply;

fn ok() -> Response {
    Response::status_json(StatusCode::Ok, "ok")
}

fn relay(reply: AgentReply) -> Response {
    Response::raw_json(reply.status, reply.body)
}

/// Only plain relative paths below the static root are served.
fn is_safe_relative(path: &Path) -> bool {
    path.components().all(|c| matches!(c, Component::Normal(_)))
}

/// Parses the `sel` list of a select request: non-negative integers, or
/// strings holding one.
fn parse_selection(data: &Value) -> Option<BTreeSet<usize>> {
    data.get("sel")?
        .as_array()?
        .iter()
        .map(|item| match item {
            Value::Number(n) => n.as_u64().and_then(|n| usize::try_from(n).ok()),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        })
        .collect()
}

impl AdminService {
    /// Serves a page from the templates directory as-is.
    pub async fn template(&self, name: &str) -> HandlerResult {
        let path = self.config.paths.templates_dir().join(name);
        let page = tokio::fs::read(&path)
            .await
            .with_context(|| format!("failed to read template {}", path.display()))?;
        Ok(Response::html(page))
    }

    pub async fn serve_static(&self, params: &Params) -> HandlerResult {
        let relative = params.string("path")?;
        let relative = Path::new(&relative);
        if !is_safe_relative(relative) {
            return Err(ApiError::NotFound);
        }

        let path = self.config.paths.static_dir().join(relative);
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(ResponseBuilder::new(StatusCode::Ok)
                .header("Content-Type", mime::guess(&path))
                .body(bytes)
                .build()),
            Err(e) if matches!(e.kind(), ErrorKind::NotFound | ErrorKind::IsADirectory) => {
                Err(ApiError::NotFound)
            }
            Err(e) => Err(anyhow::Error::new(e)
                .context(format!("failed to read {}", path.display()))
                .into()),
        }
    }

    pub async fn profiles(&self) -> HandlerResult {
        let index = self.store.read_index_raw().await?;
        Ok(Response::raw_json(StatusCode::Ok, index))
    }

    pub async fn profile(&self, params: &Params) -> HandlerResult {
        let uid = params.string("profile_id")?;
        match self.store.read_profile_raw(&uid).await? {
            Some(body) => Ok(Response::raw_json(StatusCode::Ok, body)),
            None => Err(ApiError::NotFound),
        }
    }

    pub async fn profiles_save(&self, params: &Params, req: &Request) -> HandlerResult {
        let id = params.string("id")?;
        self.session.check_pending(&id).await?;

        let draft = ProfileDraft::from_body(&req.body)?;
        self.session.save_profile(&id, draft, &self.store).await?;
        Ok(ok())
    }

    pub async fn profiles_delete(&self, params: &Params) -> HandlerResult {
        let uid = params.string("uid")?;
        self.store.delete_profile(&uid).await?;
        Ok(ok())
    }

    pub async fn profiles_discard(&self, params: &Params) -> HandlerResult {
        let id = params.string("id")?;
        self.session.discard(&id).await?;
        Ok(ok())
    }

    /// Captured desktop settings changes as `[key, value]` pairs, in index
    /// order.
    pub async fn changes(&self) -> HandlerResult {
        let changes: Vec<Value> = self
            .session
            .settings_changes()
            .await?
            .into_iter()
            .map(|change| json!([change.key, change.value]))
            .collect();
        Ok(Response::json(StatusCode::Ok, &changes))
    }

    pub async fn changes_submit(&self, params: &Params, req: &Request) -> HandlerResult {
        let namespace = params.string("name")?;
        self.session.submit_change(&namespace, req).await?;
        Ok(ok())
    }

    pub async fn changes_select(&self, req: &Request) -> HandlerResult {
        let data = match req.json::<Value>() {
            Ok(data @ Value::Object(_)) => data,
            _ => return Err(ApiError::forbidden("bad JSON data")),
        };
        let selection = parse_selection(&data).ok_or_else(|| ApiError::forbidden("bad_form_data"))?;

        let uid = self.session.select_changes(&selection).await?;
        Ok(Response::json(
            StatusCode::Ok,
            &json!({ "status": "ok", "uuid": uid }),
        ))
    }

    pub async fn session_start(&self, req: &Request) -> HandlerResult {
        if self.session.target_host().await.is_some() {
            return Err(ApiError::forbidden("session already started"));
        }

        let data = match req.json::<Value>() {
            Ok(data @ Value::Object(_)) => data,
            _ => return Err(ApiError::forbidden("Request data was not a valid JSON object")),
        };
        let host = data
            .get("host")
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|h| !h.is_empty())
            .ok_or_else(|| ApiError::forbidden("no host was specified in POST request"))?;

        let reply = self.session.start(host).await?;
        Ok(relay(reply))
    }

    pub async fn session_stop(&self) -> HandlerResult {
        let reply = self.session.stop().await?;
        Ok(relay(reply))
    }
}
