use std::path::PathBuf;

use rusqlite::Connection;
use serde::Deserialize;

use crate::model::Identity;

#[derive(Debug, Deserialize, Clone)]
pub struct Request {
    pub id: String,
    pub method: String,
    #[serde(default)]
    pub params: serde_json::Value,
}

pub struct AppState {
    pub workspace: Option<PathBuf>,
    pub db: Option<Connection>,
    /// Signed-in user; cleared whenever the database is swapped.
    pub session: Option<Identity>,
}
