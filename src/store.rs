use std::collections::HashSet;
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

use csv::{ReaderBuilder, StringRecord, Trim, WriterBuilder};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::{GradebookError, Result};
use crate::config::ExamScale;
use crate::record::{ScoreRecord, ASSIGNMENT_COUNT, ASSIGNMENT_MAX, QUIZ_COUNT, QUIZ_MAX};

pub const RECORD_FILE_NAME: &str = "marks.csv";

pub const HEADER: [&str; FIELD_COUNT] = [
    "Subject", "Username", "Quiz1", "Quiz2", "Quiz3", "Quiz4", "Assign1", "Assign2", "Assign3",
    "Assign4", "Mid", "Final",
];

const FIELD_COUNT: usize = 2 + QUIZ_COUNT + ASSIGNMENT_COUNT + 2;

/// Loads every well-formed record from `path`.
///
/// Rows with the wrong field count, unparseable or out-of-range integers,
/// or a repeated (subject, student) pair are skipped with a warning. A
/// missing or empty file is (re)created with just the header.
pub fn load_all(path: &Path) -> Result<Vec<ScoreRecord>> {
    let needs_bootstrap = match fs::metadata(path) {
        Ok(m) => m.len() == 0,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => true,
        Err(e) => return Err(GradebookError::io(path, e)),
    };
    if needs_bootstrap {
        info!(path = %path.display(), "record file missing or empty; writing header");
        persist(path, &[])?;
        return Ok(Vec::new());
    }

    let file = File::open(path).map_err(|e| GradebookError::io(path, e))?;
    let mut rdr = ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .trim(Trim::All)
        .from_reader(file);

    match rdr.headers() {
        Ok(h) if h.iter().ne(HEADER.iter().copied()) => {
            warn!(path = %path.display(), header = ?h, "unexpected record file header");
        }
        Ok(_) => {}
        Err(e) => warn!(path = %path.display(), error = %e, "unreadable record file header"),
    }

    let mut out: Vec<ScoreRecord> = Vec::new();
    let mut seen: HashSet<(String, String)> = HashSet::new();
    let mut skipped = 0usize;
    for row in rdr.records() {
        let row = match row {
            Ok(r) => r,
            Err(e) => {
                let line = e.position().map(|p| p.line()).unwrap_or(0);
                warn!(path = %path.display(), line, error = %e, "skipping unreadable row");
                skipped += 1;
                continue;
            }
        };
        let line = row.position().map(|p| p.line()).unwrap_or(0);
        let record = match parse_row(&row) {
            Ok(r) => r,
            Err(reason) => {
                warn!(path = %path.display(), line, reason = %reason, "skipping malformed row");
                skipped += 1;
                continue;
            }
        };
        let key = (
            record.subject_code.to_ascii_lowercase(),
            record.student_username.clone(),
        );
        if !seen.insert(key) {
            warn!(
                path = %path.display(),
                line,
                subject = %record.subject_code,
                student = %record.student_username,
                "skipping duplicate record; first occurrence kept"
            );
            skipped += 1;
            continue;
        }
        out.push(record);
    }

    debug!(path = %path.display(), loaded = out.len(), skipped, "record file loaded");
    Ok(out)
}

fn parse_row(row: &StringRecord) -> std::result::Result<ScoreRecord, String> {
    if row.len() != FIELD_COUNT {
        return Err(format!("expected {} fields, got {}", FIELD_COUNT, row.len()));
    }
    let subject = &row[0];
    let username = &row[1];
    if subject.is_empty() || username.is_empty() {
        return Err("empty subject or username".to_string());
    }

    let mut nums = [0u32; FIELD_COUNT - 2];
    for (i, slot) in nums.iter_mut().enumerate() {
        let raw = &row[i + 2];
        *slot = raw
            .parse::<u32>()
            .map_err(|_| format!("field {} ({}) is not a non-negative integer: {:?}", i + 3, HEADER[i + 2], raw))?;
    }

    for (i, &value) in nums.iter().enumerate() {
        let max = field_max(i);
        if value > max {
            return Err(format!(
                "field {} ({}) is {} but at most {} is allowed",
                i + 3,
                HEADER[i + 2],
                value,
                max
            ));
        }
    }

    let mut record = ScoreRecord::new(subject, username);
    record.quizzes.copy_from_slice(&nums[0..QUIZ_COUNT]);
    record
        .assignments
        .copy_from_slice(&nums[QUIZ_COUNT..QUIZ_COUNT + ASSIGNMENT_COUNT]);
    record.mid = nums[QUIZ_COUNT + ASSIGNMENT_COUNT];
    record.final_exam = nums[QUIZ_COUNT + ASSIGNMENT_COUNT + 1];
    Ok(record)
}

// Upper bound for numeric field `i` (0 = Quiz1). Exam fields accept the
// widest supported scale; the aggregator caps them to the configured one.
fn field_max(i: usize) -> u32 {
    let exam_max = |f: fn(ExamScale) -> u32| ExamScale::ALL.into_iter().map(f).max().unwrap_or(0);
    if i < QUIZ_COUNT {
        QUIZ_MAX
    } else if i < QUIZ_COUNT + ASSIGNMENT_COUNT {
        ASSIGNMENT_MAX
    } else if i == QUIZ_COUNT + ASSIGNMENT_COUNT {
        exam_max(ExamScale::mid_max)
    } else {
        exam_max(ExamScale::final_max)
    }
}

/// Replaces `path` with the header followed by `records` in the given order.
///
/// The content goes to a temporary sibling first and is renamed into place,
/// so a failed write leaves the previous file intact.
pub fn persist(path: &Path, records: &[ScoreRecord]) -> Result<()> {
    let csv_err = |source: csv::Error| GradebookError::Csv {
        path: path.to_path_buf(),
        source,
    };

    write_atomically(path, |file| {
        let mut wtr = WriterBuilder::new().has_headers(false).from_writer(file);
        wtr.write_record(HEADER).map_err(csv_err)?;
        for r in records {
            let mut fields: Vec<String> = Vec::with_capacity(FIELD_COUNT);
            fields.push(r.subject_code.clone());
            fields.push(r.student_username.clone());
            fields.extend(r.quizzes.iter().map(u32::to_string));
            fields.extend(r.assignments.iter().map(u32::to_string));
            fields.push(r.mid.to_string());
            fields.push(r.final_exam.to_string());
            wtr.write_record(&fields).map_err(csv_err)?;
        }
        let file = wtr
            .into_inner()
            .map_err(|e| GradebookError::io(path, e.into_error()))?;
        Ok(file)
    })?;

    debug!(path = %path.display(), count = records.len(), "record file persisted");
    Ok(())
}

/// Writes through `fill` into a temp file next to `path`, syncs it, then
/// renames it over `path`.
pub(crate) fn write_atomically<F>(path: &Path, fill: F) -> Result<()>
where
    F: FnOnce(File) -> Result<File>,
{
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|e| GradebookError::io(parent, e))?;
    }
    let tmp = temp_sibling(path);
    let result = (|| {
        let file = File::create(&tmp).map_err(|e| GradebookError::io(&tmp, e))?;
        let mut file = fill(file)?;
        file.flush().map_err(|e| GradebookError::io(&tmp, e))?;
        file.sync_all().map_err(|e| GradebookError::io(&tmp, e))?;
        fs::rename(&tmp, path).map_err(|e| GradebookError::io(path, e))
    })();
    if result.is_err() {
        let _ = fs::remove_file(&tmp);
    }
    result
}

fn temp_sibling(path: &Path) -> PathBuf {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| "gradebook".to_string());
    path.with_file_name(format!(".{}.{}.tmp", name, Uuid::new_v4()))
}

/// Records of one subject, in store order.
pub fn records_for_subject<'a>(
    records: &'a [ScoreRecord],
    subject_code: &str,
) -> Vec<&'a ScoreRecord> {
    records.iter().filter(|r| r.is_subject(subject_code)).collect()
}
