use std::collections::HashMap;
use std::path::PathBuf;

use rusqlite::Connection;
use serde::Deserialize;

use crate::capabilities::UserRole;
use crate::imports::StagedBatch;

#[derive(Debug, Deserialize, Clone)]
pub struct Request {
    pub id: String,
    pub method: String,
    #[serde(default)]
    pub params: serde_json::Value,
    /// Acting role; the daemon's default role applies when absent.
    #[serde(default)]
    pub role: Option<String>,
    #[serde(default, rename = "userId")]
    pub user_id: Option<String>,
}

pub struct AppState {
    pub workspace: Option<PathBuf>,
    pub db: Option<Connection>,
    pub default_role: UserRole,
    /// Import batches waiting for confirm, keyed by batch id.
    pub staged_imports: HashMap<String, StagedBatch>,
}

impl AppState {
    pub fn new(default_role: UserRole) -> Self {
        Self {
            workspace: None,
            db: None,
            default_role,
            staged_imports: HashMap::new(),
        }
    }
}
