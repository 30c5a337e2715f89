use crate::ipc::error::ok;
use crate::ipc::helpers::{policy_path, require_str, Failure};
use crate::ipc::types::{AppState, Request};
use crate::policy::{self, GradingPolicy};
use serde_json::json;
use tracing::info;

fn handle_policy_get(state: &mut AppState, _req: &Request) -> Result<serde_json::Value, Failure> {
    let path = policy_path(state)?;
    Ok(json!({ "policy": policy::load(&path) }))
}

fn handle_policy_set(state: &mut AppState, req: &Request) -> Result<serde_json::Value, Failure> {
    let path = policy_path(state)?;
    let policy: GradingPolicy = require_str(req, "policy")?.parse()?;
    policy::save(&path, policy)?;
    info!(policy = policy.as_str(), "grading policy updated");
    Ok(json!({ "policy": policy }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let result = match req.method.as_str() {
        "policy.get" => handle_policy_get(state, req),
        "policy.set" => handle_policy_set(state, req),
        _ => return None,
    };
    Some(match result {
        Ok(v) => ok(&req.id, v),
        Err(e) => e.response(&req.id),
    })
}
