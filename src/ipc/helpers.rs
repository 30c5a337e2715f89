use std::path::PathBuf;

use crate::error::GradebookError;
use crate::ipc::error::{err, err_from};
use crate::ipc::types::{AppState, Request};

pub struct HandlerErr {
    pub code: &'static str,
    pub message: String,
    pub details: Option<serde_json::Value>,
}

impl HandlerErr {
    pub fn bad_params(message: impl Into<String>) -> Self {
        Self {
            code: "bad_params",
            message: message.into(),
            details: None,
        }
    }

    pub fn response(self, id: &str) -> serde_json::Value {
        err(id, self.code, self.message, self.details)
    }
}

/// Either a handler-level parameter problem or a library error.
pub enum Failure {
    Handler(HandlerErr),
    Gradebook(GradebookError),
}

impl Failure {
    pub fn response(self, id: &str) -> serde_json::Value {
        match self {
            Self::Handler(e) => e.response(id),
            Self::Gradebook(e) => err_from(id, &e),
        }
    }
}

impl From<HandlerErr> for Failure {
    fn from(e: HandlerErr) -> Self {
        Self::Handler(e)
    }
}

impl From<GradebookError> for Failure {
    fn from(e: GradebookError) -> Self {
        Self::Gradebook(e)
    }
}

pub fn require_str<'a>(req: &'a Request, key: &str) -> Result<&'a str, HandlerErr> {
    req.params
        .get(key)
        .and_then(|v| v.as_str())
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| HandlerErr::bad_params(format!("missing params.{}", key)))
}

pub fn require_f64(req: &Request, key: &str) -> Result<f64, HandlerErr> {
    req.params
        .get(key)
        .and_then(|v| v.as_f64())
        .filter(|v| v.is_finite())
        .ok_or_else(|| HandlerErr::bad_params(format!("missing/invalid params.{}", key)))
}

pub fn records_path(state: &AppState) -> Result<PathBuf, HandlerErr> {
    state.records_path().ok_or_else(no_workspace)
}

pub fn policy_path(state: &AppState) -> Result<PathBuf, HandlerErr> {
    state.policy_path().ok_or_else(no_workspace)
}

fn no_workspace() -> HandlerErr {
    HandlerErr {
        code: "no_workspace",
        message: "select a workspace first".to_string(),
        details: None,
    }
}
