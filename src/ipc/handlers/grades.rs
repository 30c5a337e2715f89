use crate::calc::{self, round_off_2_decimals};
use crate::error::GradebookError;
use crate::ipc::error::ok;
use crate::ipc::helpers::{policy_path, records_path, require_f64, require_str, Failure, HandlerErr};
use crate::ipc::types::{AppState, Request};
use crate::policy::{self, GradingPolicy};
use crate::record::{AssessmentSlot, ScoreRecord};
use crate::store;
use serde_json::json;

fn find_record<'a>(
    records: &'a [ScoreRecord],
    subject: &str,
    username: &str,
) -> Result<&'a ScoreRecord, GradebookError> {
    records
        .iter()
        .find(|r| r.matches(subject, username))
        .ok_or_else(|| GradebookError::NotFound(format!("record for {} in {}", username, subject)))
}

fn handle_grades_weighted(state: &mut AppState, req: &Request) -> Result<serde_json::Value, Failure> {
    let path = records_path(state)?;
    let subject = require_str(req, "subjectCode")?;
    let username = require_str(req, "username")?;

    let records = store::load_all(&path)?;
    let record = find_record(&records, subject, username)?;
    let pct = calc::weighted_percentage(record, &state.config.weights, state.config.exam_scale);
    Ok(json!({
        "username": record.student_username,
        "subjectCode": record.subject_code,
        "weightedPercentage": pct,
    }))
}

fn handle_grades_classify(state: &mut AppState, req: &Request) -> Result<serde_json::Value, Failure> {
    let score = require_f64(req, "score")?;
    let population: Vec<f64> = match req.params.get("population") {
        None => Vec::new(),
        Some(v) if v.is_null() => Vec::new(),
        Some(v) => {
            let Some(arr) = v.as_array() else {
                return Err(HandlerErr::bad_params("population must be an array of numbers").into());
            };
            let mut out = Vec::with_capacity(arr.len());
            for x in arr {
                match x.as_f64().filter(|f| f.is_finite()) {
                    Some(f) => out.push(f),
                    None => {
                        return Err(HandlerErr::bad_params("population must be an array of numbers").into())
                    }
                }
            }
            out
        }
    };
    // An explicit policy wins; otherwise use the saved one.
    let policy = match req.params.get("policy").and_then(|v| v.as_str()) {
        Some(p) => p.parse::<GradingPolicy>()?,
        None => match policy_path(state) {
            Ok(p) => policy::load(&p),
            Err(_) => GradingPolicy::default(),
        },
    };

    let grade = calc::classify(policy, state.config.letter_scale, score, &population);
    Ok(json!({ "policy": policy, "grade": grade }))
}

fn handle_grades_subject_report(state: &mut AppState, req: &Request) -> Result<serde_json::Value, Failure> {
    let path = records_path(state)?;
    let subject = require_str(req, "subjectCode")?;

    let records = store::load_all(&path)?;
    let subject_records = store::records_for_subject(&records, subject);
    let policy = policy::load(&policy_path(state)?);
    let (weights, exam_scale, letter_scale) = (
        state.config.weights,
        state.config.exam_scale,
        state.config.letter_scale,
    );

    let scores: Vec<f64> = subject_records
        .iter()
        .map(|r| calc::weighted_percentage(r, &weights, exam_scale))
        .collect();
    let students: Vec<serde_json::Value> = subject_records
        .iter()
        .zip(&scores)
        .map(|(r, &score)| {
            json!({
                "username": r.student_username,
                "weightedPercentage": round_off_2_decimals(score),
                "grade": calc::classify(policy, letter_scale, score, &scores),
            })
        })
        .collect();

    Ok(json!({
        "subjectCode": subject,
        "policy": policy,
        "stats": calc::population_stats(&scores),
        "students": students,
    }))
}

fn handle_grades_required(state: &mut AppState, req: &Request) -> Result<serde_json::Value, Failure> {
    let path = records_path(state)?;
    let subject = require_str(req, "subjectCode")?;
    let username = require_str(req, "username")?;
    let target = require_f64(req, "target")?;

    let records = store::load_all(&path)?;
    let record = find_record(&records, subject, username)?;
    let pending = calc::pending_exams(record);
    // Default to the first pending exam, as the dashboard calculator does.
    let slot: AssessmentSlot = match req.params.get("slot").and_then(|v| v.as_str()) {
        Some(s) => s.parse()?,
        None => match pending.first() {
            Some(s) => *s,
            None => {
                return Ok(json!({
                    "pending": [],
                    "message": "All assessments have been graded.",
                }))
            }
        },
    };

    let req_score = calc::required_score(
        record,
        &state.config.weights,
        state.config.exam_scale,
        target,
        slot,
    )?;
    Ok(json!({
        "pending": pending.iter().map(|s| s.to_string()).collect::<Vec<_>>(),
        "slot": slot.to_string(),
        "required": req_score,
    }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let result = match req.method.as_str() {
        "grades.weighted" => handle_grades_weighted(state, req),
        "grades.classify" => handle_grades_classify(state, req),
        "grades.subjectReport" => handle_grades_subject_report(state, req),
        "grades.required" => handle_grades_required(state, req),
        _ => return None,
    };
    Some(match result {
        Ok(v) => ok(&req.id, v),
        Err(e) => e.response(&req.id),
    })
}
