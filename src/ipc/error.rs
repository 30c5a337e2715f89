use serde_json::json;

use crate::error::GradebookError;

pub fn ok(id: &str, result: serde_json::Value) -> serde_json::Value {
    json!({
        "id": id,
        "ok": true,
        "result": result
    })
}

pub fn err(
    id: &str,
    code: &str,
    message: impl Into<String>,
    details: Option<serde_json::Value>,
) -> serde_json::Value {
    let mut error = json!({
        "code": code,
        "message": message.into(),
    });
    if let Some(d) = details {
        error["details"] = d;
    }
    json!({
        "id": id,
        "ok": false,
        "error": error,
    })
}

pub fn err_from(id: &str, e: &GradebookError) -> serde_json::Value {
    let details = match e {
        GradebookError::OutOfRange {
            student,
            value,
            min,
            max,
        } => Some(json!({ "username": student, "value": value, "min": min, "max": max })),
        GradebookError::Unachievable {
            target,
            max_achievable,
        } => Some(json!({ "target": target, "maxAchievable": max_achievable })),
        GradebookError::Io { path, .. } | GradebookError::Csv { path, .. } => {
            Some(json!({ "path": path.to_string_lossy() }))
        }
        _ => None,
    };
    err(id, e.code(), e.to_string(), details)
}
