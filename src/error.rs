use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum GradebookError {
    #[error("unknown assessment slot: {0} (expected quiz1..quiz4, assignment1..assignment4, mid, final)")]
    UnknownSlot(String),

    #[error("invalid mark for student {student}: {value} is outside {min}–{max}")]
    OutOfRange {
        student: String,
        value: i64,
        min: u32,
        max: u32,
    },

    #[error("unknown grading policy: {0} (expected absolute or relative)")]
    InvalidPolicy(String),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("{0}")]
    BadParams(String),

    #[error("{0} not found")]
    NotFound(String),

    #[error("target {target:.2}% is unachievable; the maximum achievable grade is {max_achievable:.2}%")]
    Unachievable { target: f64, max_achievable: f64 },

    #[error("i/o failure on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("record file {}: {source}", path.display())]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },
}

impl GradebookError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Stable code used in sidecar error envelopes.
    pub fn code(&self) -> &'static str {
        match self {
            Self::UnknownSlot(_) => "unknown_slot",
            Self::OutOfRange { .. } => "out_of_range",
            Self::InvalidPolicy(_) | Self::InvalidConfig(_) | Self::BadParams(_) => "bad_params",
            Self::NotFound(_) => "not_found",
            Self::Unachievable { .. } => "unachievable",
            Self::Io { .. } | Self::Csv { .. } => "io_failed",
        }
    }
}

pub type Result<T> = std::result::Result<T, GradebookError>;
