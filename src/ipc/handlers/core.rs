use crate::ipc::error::{err, err_from, ok};
use crate::ipc::types::{AppState, Request};
use crate::store;
use serde_json::json;
use std::path::PathBuf;
use tracing::info;

fn handle_health(state: &mut AppState, req: &Request) -> serde_json::Value {
    ok(
        &req.id,
        json!({
            "version": env!("CARGO_PKG_VERSION"),
            "workspacePath": state.workspace.as_ref().map(|p| p.to_string_lossy().to_string()),
            "weights": state.config.weights,
            "examScale": {
                "midMax": state.config.exam_scale.mid_max(),
                "finalMax": state.config.exam_scale.final_max(),
            },
            "letterScale": state.config.letter_scale,
        }),
    )
}

fn handle_workspace_select(state: &mut AppState, req: &Request) -> serde_json::Value {
    let p = req
        .params
        .get("path")
        .and_then(|v| v.as_str())
        .map(PathBuf::from);
    let Some(path) = p else {
        return err(&req.id, "bad_params", "missing params.path", None);
    };

    if let Err(e) = std::fs::create_dir_all(&path) {
        return err(
            &req.id,
            "io_failed",
            format!("failed to create workspace: {e}"),
            Some(json!({ "path": path.to_string_lossy() })),
        );
    }

    // Loading bootstraps the record file with its header when absent.
    match store::load_all(&path.join(store::RECORD_FILE_NAME)) {
        Ok(records) => {
            info!(workspace = %path.display(), records = records.len(), "workspace selected");
            state.workspace = Some(path.clone());
            ok(
                &req.id,
                json!({
                    "workspacePath": path.to_string_lossy(),
                    "recordCount": records.len(),
                }),
            )
        }
        Err(e) => err_from(&req.id, &e),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "health" => Some(handle_health(state, req)),
        "workspace.select" => Some(handle_workspace_select(state, req)),
        _ => None,
    }
}
