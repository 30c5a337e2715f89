use serde::Serialize;
use tracing::{debug, warn};

use crate::config::ExamScale;
use crate::error::{GradebookError, Result};
use crate::record::{AssessmentSlot, Edit, ScoreRecord};

/// Largest batch the sidecar accepts in one `marks.bulkUpdate`.
pub const BULK_UPDATE_MAX_EDITS: usize = 5000;

/// Why one edit in a batch was not applied.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EditRejection {
    pub index: usize,
    pub username: String,
    /// The submitted value as it arrived, which may not fit a mark at all.
    pub value: serde_json::Value,
    pub code: &'static str,
    pub message: String,
}

#[derive(Debug, Clone)]
pub struct UpsertOutcome {
    /// Every prior record plus any created ones, ready to persist.
    pub records: Vec<ScoreRecord>,
    pub updated: usize,
    pub created: usize,
    pub rejected: Vec<EditRejection>,
}

fn validate_value(slot: AssessmentSlot, scale: ExamScale, edit: &Edit) -> Result<u32> {
    let max = scale.slot_max(slot);
    if edit.value < 0 || edit.value > i64::from(max) {
        return Err(GradebookError::OutOfRange {
            student: edit.username.clone(),
            value: edit.value,
            min: 0,
            max,
        });
    }
    Ok(edit.value as u32)
}

fn range_message(username: &str, slot: AssessmentSlot, scale: ExamScale) -> String {
    format!(
        "Invalid mark for student {}. {} marks must be between 0–{}.",
        username,
        slot.label(),
        scale.slot_max(slot)
    )
}

/// Rejection for a submitted value that is not a whole number or does not
/// fit an integer mark, e.g. `7.5` or `1e20`.
pub fn unrepresentable_value(
    index: usize,
    username: &str,
    raw: serde_json::Value,
    slot: AssessmentSlot,
    scale: ExamScale,
) -> EditRejection {
    EditRejection {
        index,
        username: username.to_string(),
        value: raw,
        code: "out_of_range",
        message: range_message(username.trim(), slot, scale),
    }
}

fn checked_subject(subject_code: &str) -> Result<&str> {
    let subject = subject_code.trim();
    if subject.is_empty() {
        return Err(GradebookError::BadParams("subject code must not be empty".to_string()));
    }
    Ok(subject)
}

/// Applies `edits` to `slot` of each targeted student's record in
/// `subject_code`.
///
/// Each edit stands alone: an invalid one is reported in
/// [`UpsertOutcome::rejected`] and its siblings still apply. Students with
/// no record yet get a fresh all-zero one. Repeated edits for a student
/// apply in order, so the last one wins. A blank subject code rejects the
/// whole batch.
pub fn apply(
    existing: &[ScoreRecord],
    subject_code: &str,
    slot: AssessmentSlot,
    edits: &[Edit],
    scale: ExamScale,
) -> Result<UpsertOutcome> {
    let subject_code = checked_subject(subject_code)?;
    let mut records: Vec<ScoreRecord> = existing.to_vec();
    let mut updated = 0usize;
    let mut created = 0usize;
    let mut rejected: Vec<EditRejection> = Vec::new();

    for (index, edit) in edits.iter().enumerate() {
        let username = edit.username.trim();
        if username.is_empty() {
            rejected.push(EditRejection {
                index,
                username: edit.username.clone(),
                value: edit.value.into(),
                code: "bad_params",
                message: format!("edit at index {} has an empty username", index),
            });
            continue;
        }

        let value = match validate_value(slot, scale, edit) {
            Ok(v) => v,
            Err(e) => {
                warn!(subject = subject_code, %slot, student = username, value = edit.value, "edit rejected");
                rejected.push(EditRejection {
                    index,
                    username: edit.username.clone(),
                    value: edit.value.into(),
                    code: e.code(),
                    message: range_message(username, slot, scale),
                });
                continue;
            }
        };

        match records.iter().position(|r| r.matches(subject_code, username)) {
            Some(pos) => {
                records[pos] = records[pos].with_slot(slot, value);
                updated += 1;
            }
            None => {
                records.push(ScoreRecord::new(subject_code, username).with_slot(slot, value));
                created += 1;
            }
        }
    }

    debug!(
        subject = subject_code,
        %slot,
        updated,
        created,
        rejected = rejected.len(),
        "batch upsert applied"
    );

    Ok(UpsertOutcome {
        records,
        updated,
        created,
        rejected,
    })
}

/// Ensures an all-zero record exists for `(subject_code, username)`.
/// Returns the record set and whether a record was created.
pub fn enroll(existing: &[ScoreRecord], subject_code: &str, username: &str) -> Result<(Vec<ScoreRecord>, bool)> {
    let subject_code = checked_subject(subject_code)?;
    let username = username.trim();
    if username.is_empty() {
        return Err(GradebookError::BadParams("username must not be empty".to_string()));
    }
    let mut records = existing.to_vec();
    if records.iter().any(|r| r.matches(subject_code, username)) {
        return Ok((records, false));
    }
    records.push(ScoreRecord::new(subject_code, username));
    Ok((records, true))
}

/// Drops every record of `subject_code`. Returns the remaining records and
/// how many were removed.
pub fn remove_subject(existing: &[ScoreRecord], subject_code: &str) -> Result<(Vec<ScoreRecord>, usize)> {
    let subject_code = checked_subject(subject_code)?;
    let records: Vec<ScoreRecord> = existing
        .iter()
        .filter(|r| !r.is_subject(subject_code))
        .cloned()
        .collect();
    let removed = existing.len() - records.len();
    Ok((records, removed))
}
