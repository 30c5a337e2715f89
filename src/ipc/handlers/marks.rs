use crate::config::ExamScale;
use crate::ipc::error::ok;
use crate::ipc::helpers::{records_path, require_str, Failure, HandlerErr};
use crate::ipc::types::{AppState, Request};
use crate::record::{AssessmentSlot, Edit, ScoreRecord};
use crate::store;
use crate::upsert::{self, EditRejection, BULK_UPDATE_MAX_EDITS};
use serde_json::json;
use tracing::{info, warn};

const MARKS_LIST_MAX_ROWS: i64 = 2000;

fn handle_marks_list(state: &mut AppState, req: &Request) -> Result<serde_json::Value, Failure> {
    let path = records_path(state)?;
    let subject = req
        .params
        .get("subjectCode")
        .and_then(|v| v.as_str())
        .map(str::trim)
        .filter(|s| !s.is_empty());
    let row_start = req
        .params
        .get("rowStart")
        .and_then(|v| v.as_i64())
        .unwrap_or(0);
    let row_count_req = req
        .params
        .get("rowCount")
        .and_then(|v| v.as_i64())
        .unwrap_or(MARKS_LIST_MAX_ROWS);

    if row_start < 0 || row_count_req < 0 {
        return Err(HandlerErr {
            code: "bad_params",
            message: "rowStart/rowCount must be >= 0".to_string(),
            details: Some(json!({ "rowStart": row_start, "rowCount": row_count_req })),
        }
        .into());
    }
    if row_count_req > MARKS_LIST_MAX_ROWS {
        return Err(HandlerErr {
            code: "bad_params",
            message: "requested page is too large".to_string(),
            details: Some(json!({ "rowCount": row_count_req, "maxRows": MARKS_LIST_MAX_ROWS })),
        }
        .into());
    }

    let records = store::load_all(&path)?;
    let selected: Vec<&ScoreRecord> = match subject {
        Some(s) => store::records_for_subject(&records, s),
        None => records.iter().collect(),
    };
    let total = selected.len();
    let page: Vec<&ScoreRecord> = selected
        .into_iter()
        .skip(row_start as usize)
        .take(row_count_req as usize)
        .collect();

    Ok(json!({
        "rowStart": row_start,
        "rowCount": page.len(),
        "total": total,
        "records": page,
    }))
}

fn handle_marks_enroll(state: &mut AppState, req: &Request) -> Result<serde_json::Value, Failure> {
    let path = records_path(state)?;
    let subject = require_str(req, "subjectCode")?;
    let username = require_str(req, "username")?;

    let existing = store::load_all(&path)?;
    let (records, created) = upsert::enroll(&existing, subject, username)?;
    if created {
        store::persist(&path, &records)?;
        info!(subject, student = username, "student enrolled");
    }
    Ok(json!({ "created": created }))
}

/// Edits whose value fits a mark, with their positions in the payload, plus
/// per-edit rejections for values that do not.
struct ParsedEdits {
    edits: Vec<Edit>,
    positions: Vec<usize>,
    rejected: Vec<EditRejection>,
}

fn parse_edits(req: &Request, slot: AssessmentSlot, scale: ExamScale) -> Result<ParsedEdits, HandlerErr> {
    let Some(arr) = req.params.get("edits").and_then(|v| v.as_array()) else {
        return Err(HandlerErr::bad_params("missing edits[]"));
    };
    let mut parsed = ParsedEdits {
        edits: Vec::with_capacity(arr.len()),
        positions: Vec::with_capacity(arr.len()),
        rejected: Vec::new(),
    };
    for (i, e) in arr.iter().enumerate() {
        let Some(username) = e.get("username").and_then(|v| v.as_str()) else {
            return Err(HandlerErr {
                code: "bad_params",
                message: format!("edit at index {} needs a username", i),
                details: Some(json!({ "index": i })),
            });
        };
        let raw = e.get("value").cloned().unwrap_or(serde_json::Value::Null);
        match raw.as_i64() {
            Some(v) => {
                parsed.edits.push(Edit::new(username, v));
                parsed.positions.push(i);
            }
            None => {
                warn!(student = username, value = %raw, "edit value is not an integer mark");
                parsed
                    .rejected
                    .push(upsert::unrepresentable_value(i, username, raw, slot, scale));
            }
        }
    }
    Ok(parsed)
}

fn handle_marks_bulk_update(state: &mut AppState, req: &Request) -> Result<serde_json::Value, Failure> {
    let path = records_path(state)?;
    let subject = require_str(req, "subjectCode")?;
    let slot: AssessmentSlot = require_str(req, "slot")?.parse()?;
    let scale = state.config.exam_scale;

    let submitted = req
        .params
        .get("edits")
        .and_then(|v| v.as_array())
        .map(|a| a.len())
        .unwrap_or(0);
    if submitted > BULK_UPDATE_MAX_EDITS {
        return Ok(json!({
            "updated": 0,
            "created": 0,
            "rejected": submitted,
            "limitExceeded": true,
            "errors": [{
                "index": -1,
                "code": "too_many_edits",
                "message": format!(
                    "bulk payload exceeds max edits: {} > {}",
                    submitted, BULK_UPDATE_MAX_EDITS
                )
            }]
        }));
    }
    let parsed = parse_edits(req, slot, scale)?;

    let existing = store::load_all(&path)?;
    let outcome = upsert::apply(&existing, subject, slot, &parsed.edits, scale)?;
    if outcome.updated + outcome.created > 0 {
        store::persist(&path, &outcome.records)?;
    }

    let mut rejected = parsed.rejected;
    rejected.extend(outcome.rejected.into_iter().map(|mut r| {
        r.index = parsed.positions[r.index];
        r
    }));
    rejected.sort_by_key(|r| r.index);
    info!(
        subject,
        %slot,
        updated = outcome.updated,
        created = outcome.created,
        rejected = rejected.len(),
        "bulk update saved"
    );

    let mut result = json!({
        "updated": outcome.updated,
        "created": outcome.created,
    });
    if !rejected.is_empty() {
        result["rejected"] = json!(rejected.len());
        result["errors"] = json!(rejected);
    }
    Ok(result)
}

fn handle_subject_remove(state: &mut AppState, req: &Request) -> Result<serde_json::Value, Failure> {
    let path = records_path(state)?;
    let subject = require_str(req, "subjectCode")?;

    let existing = store::load_all(&path)?;
    let (records, removed) = upsert::remove_subject(&existing, subject)?;
    if removed > 0 {
        store::persist(&path, &records)?;
    }
    info!(subject, removed, "subject records removed");
    Ok(json!({ "removed": removed }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let result = match req.method.as_str() {
        "marks.list" => handle_marks_list(state, req),
        "marks.enroll" => handle_marks_enroll(state, req),
        "marks.bulkUpdate" => handle_marks_bulk_update(state, req),
        "subject.remove" => handle_subject_remove(state, req),
        _ => return None,
    };
    Some(match result {
        Ok(v) => ok(&req.id, v),
        Err(e) => e.response(&req.id),
    })
}
