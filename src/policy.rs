use std::io::Write;
use std::path::Path;
use std::str::FromStr;

use serde::Serialize;
use tracing::{debug, warn};

use crate::error::{GradebookError, Result};
use crate::store::write_atomically;

pub const POLICY_FILE_NAME: &str = "grading_policy.txt";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum GradingPolicy {
    #[default]
    Absolute,
    Relative,
}

impl GradingPolicy {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Absolute => "absolute",
            Self::Relative => "relative",
        }
    }
}

impl FromStr for GradingPolicy {
    type Err = GradebookError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let t = s.trim();
        if t.eq_ignore_ascii_case("absolute") {
            Ok(Self::Absolute)
        } else if t.eq_ignore_ascii_case("relative") {
            Ok(Self::Relative)
        } else {
            Err(GradebookError::InvalidPolicy(t.to_string()))
        }
    }
}

/// Reads the saved policy. Never fails: anything missing, empty or
/// unrecognised means [`GradingPolicy::Absolute`].
pub fn load(path: &Path) -> GradingPolicy {
    let text = match std::fs::read_to_string(path) {
        Ok(t) => t,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            debug!(path = %path.display(), "no policy file; using absolute");
            return GradingPolicy::default();
        }
        Err(e) => {
            warn!(path = %path.display(), error = %e, "policy file unreadable; using absolute");
            return GradingPolicy::default();
        }
    };
    let Some(first) = text.lines().map(str::trim).find(|l| !l.is_empty()) else {
        return GradingPolicy::default();
    };
    first.parse().unwrap_or_else(|e| {
        warn!(path = %path.display(), error = %e, "policy file invalid; using absolute");
        GradingPolicy::default()
    })
}

pub fn save(path: &Path, policy: GradingPolicy) -> Result<()> {
    write_atomically(path, |mut file| {
        writeln!(file, "{}", policy.as_str()).map_err(|e| GradebookError::io(path, e))?;
        Ok(file)
    })?;
    debug!(path = %path.display(), policy = policy.as_str(), "grading policy saved");
    Ok(())
}
