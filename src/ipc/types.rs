use std::path::PathBuf;

use serde::Deserialize;

use crate::config::Config;
use crate::policy::POLICY_FILE_NAME;
use crate::store::RECORD_FILE_NAME;

#[derive(Debug, Deserialize, Clone)]
pub struct Request {
    pub id: String,
    pub method: String,
    #[serde(default)]
    pub params: serde_json::Value,
}

pub struct AppState {
    pub workspace: Option<PathBuf>,
    pub config: Config,
}

impl AppState {
    pub fn new(config: Config) -> Self {
        Self {
            workspace: config.workspace.clone(),
            config,
        }
    }

    pub fn records_path(&self) -> Option<PathBuf> {
        self.workspace.as_ref().map(|w| w.join(RECORD_FILE_NAME))
    }

    pub fn policy_path(&self) -> Option<PathBuf> {
        self.workspace.as_ref().map(|w| w.join(POLICY_FILE_NAME))
    }
}
