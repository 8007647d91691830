use crate::ipc::error::err;
use crate::ipc::types::{AppState, LoadState, Request};
use crate::snapshot::Snapshot;
use crate::view::{self, FilterState, ViewError};
use rusqlite::Connection;

pub fn required_str(req: &Request, key: &str) -> Result<String, serde_json::Value> {
    req.params
        .get(key)
        .and_then(|v| v.as_str())
        .map(|v| v.to_string())
        .ok_or_else(|| err(&req.id, "bad_params", format!("missing {}", key), None))
}

pub fn optional_str<'a>(req: &'a Request, key: &str) -> Result<Option<&'a str>, serde_json::Value> {
    match req.params.get(key) {
        None => Ok(None),
        Some(v) if v.is_null() => Ok(None),
        Some(v) => v
            .as_str()
            .map(Some)
            .ok_or_else(|| err(&req.id, "bad_params", format!("{} must be string", key), None)),
    }
}

pub fn db_conn<'a>(state: &'a AppState, req: &Request) -> Result<&'a Connection, serde_json::Value> {
    state
        .db
        .as_ref()
        .ok_or_else(|| err(&req.id, "no_workspace", "select a workspace first", None))
}

/// The loaded snapshot, or the error a client should see while there is none.
pub fn ready_snapshot<'a>(state: &'a AppState, req: &Request) -> Result<&'a Snapshot, serde_json::Value> {
    match &state.scores {
        LoadState::Ready(snapshot) => Ok(snapshot),
        LoadState::Loading => Err(err(&req.id, "loading", "scores are still loading", None)),
        LoadState::Idle => Err(err(&req.id, "not_loaded", "call scores.load first", None)),
    }
}

pub fn view_err(req: &Request, e: ViewError) -> serde_json::Value {
    err(&req.id, &e.code, e.message, e.details)
}

pub fn parse_filters(req: &Request) -> Result<FilterState, serde_json::Value> {
    view::parse_filter_state(req.params.get("filters")).map_err(|e| view_err(req, e))
}
