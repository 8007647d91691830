use std::path::PathBuf;

use rusqlite::Connection;
use serde::Deserialize;

use crate::snapshot::Snapshot;

#[derive(Debug, Deserialize, Clone)]
pub struct Request {
    pub id: String,
    pub method: String,
    #[serde(default)]
    pub params: serde_json::Value,
}

/// Where the score snapshot stands. A failed load stays in `Loading`; only a
/// successful load produces `Ready`.
#[derive(Debug, Default)]
pub enum LoadState {
    #[default]
    Idle,
    Loading,
    Ready(Snapshot),
}

impl LoadState {
    pub fn as_str(&self) -> &'static str {
        match self {
            LoadState::Idle => "idle",
            LoadState::Loading => "loading",
            LoadState::Ready(_) => "ready",
        }
    }
}

pub struct AppState {
    pub workspace: Option<PathBuf>,
    pub db: Option<Connection>,
    pub scores: LoadState,
}
