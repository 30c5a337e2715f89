use std::path::PathBuf;

use serde::Serialize;
use tracing::debug;

use crate::error::{GradebookError, Result};
use crate::record::{AssessmentSlot, ASSIGNMENT_MAX, QUIZ_MAX};

const WEIGHT_SUM_TOLERANCE: f64 = 1e-9;

/// Component weights; always sum to 1.0.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Weights {
    quiz: f64,
    assignment: f64,
    mid: f64,
    final_exam: f64,
}

impl Weights {
    pub fn new(quiz: f64, assignment: f64, mid: f64, final_exam: f64) -> Result<Self> {
        let parts = [quiz, assignment, mid, final_exam];
        if parts.iter().any(|w| !w.is_finite() || *w < 0.0 || *w > 1.0) {
            return Err(GradebookError::InvalidConfig(format!(
                "weights must each be within 0..1, got {parts:?}"
            )));
        }
        let sum: f64 = parts.iter().sum();
        if (sum - 1.0).abs() > WEIGHT_SUM_TOLERANCE {
            return Err(GradebookError::InvalidConfig(format!(
                "weights must sum to 1.0, got {sum}"
            )));
        }
        Ok(Self {
            quiz,
            assignment,
            mid,
            final_exam,
        })
    }

    /// Parses `quiz,assignment,mid,final`.
    pub fn parse(raw: &str) -> Result<Self> {
        let parts: Vec<&str> = raw.split(',').map(str::trim).collect();
        if parts.len() != 4 {
            return Err(GradebookError::InvalidConfig(format!(
                "expected 4 comma-separated weights, got {raw:?}"
            )));
        }
        let mut vals = [0.0f64; 4];
        for (i, p) in parts.iter().enumerate() {
            vals[i] = p.parse::<f64>().map_err(|_| {
                GradebookError::InvalidConfig(format!("weight {p:?} is not a number"))
            })?;
        }
        Self::new(vals[0], vals[1], vals[2], vals[3])
    }

    pub fn quiz(&self) -> f64 {
        self.quiz
    }

    pub fn assignment(&self) -> f64 {
        self.assignment
    }

    pub fn mid(&self) -> f64 {
        self.mid
    }

    pub fn final_exam(&self) -> f64 {
        self.final_exam
    }
}

impl Default for Weights {
    fn default() -> Self {
        Self {
            quiz: 0.20,
            assignment: 0.20,
            mid: 0.20,
            final_exam: 0.40,
        }
    }
}

/// Mid/final maxima used by a deployment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub enum ExamScale {
    #[default]
    Mid20Final40,
    Mid25Final35,
}

impl ExamScale {
    pub const ALL: [ExamScale; 2] = [Self::Mid20Final40, Self::Mid25Final35];

    pub fn parse(raw: &str) -> Result<Self> {
        match raw.trim() {
            "20/40" => Ok(Self::Mid20Final40),
            "25/35" => Ok(Self::Mid25Final35),
            other => Err(GradebookError::InvalidConfig(format!(
                "exam scale must be 20/40 or 25/35, got {other:?}"
            ))),
        }
    }

    pub fn mid_max(self) -> u32 {
        match self {
            Self::Mid20Final40 => 20,
            Self::Mid25Final35 => 25,
        }
    }

    pub fn final_max(self) -> u32 {
        match self {
            Self::Mid20Final40 => 40,
            Self::Mid25Final35 => 35,
        }
    }

    /// Inclusive upper bound for a slot's raw mark.
    pub fn slot_max(self, slot: AssessmentSlot) -> u32 {
        match slot {
            AssessmentSlot::Quiz(_) => QUIZ_MAX,
            AssessmentSlot::Assignment(_) => ASSIGNMENT_MAX,
            AssessmentSlot::Mid => self.mid_max(),
            AssessmentSlot::Final => self.final_max(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub enum LetterScale {
    #[default]
    TenBand,
    FiveBand,
}

impl LetterScale {
    pub fn parse(raw: &str) -> Result<Self> {
        match raw.trim() {
            "10" => Ok(Self::TenBand),
            "5" => Ok(Self::FiveBand),
            other => Err(GradebookError::InvalidConfig(format!(
                "letter scale must be 10 or 5, got {other:?}"
            ))),
        }
    }
}

/// Deployment configuration, fixed for the lifetime of the process.
#[derive(Debug, Clone, Default)]
pub struct Config {
    pub weights: Weights,
    pub exam_scale: ExamScale,
    pub letter_scale: LetterScale,
    pub workspace: Option<PathBuf>,
}

impl Config {
    /// Reads `GRADEBOOK_*` variables. Unset variables keep their defaults;
    /// set but invalid ones are a startup error.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut cfg = Config::default();
        if let Some(raw) = lookup("GRADEBOOK_WEIGHTS") {
            cfg.weights = Weights::parse(&raw)?;
        }
        if let Some(raw) = lookup("GRADEBOOK_EXAM_SCALE") {
            cfg.exam_scale = ExamScale::parse(&raw)?;
        }
        if let Some(raw) = lookup("GRADEBOOK_LETTER_SCALE") {
            cfg.letter_scale = LetterScale::parse(&raw)?;
        }
        cfg.workspace = lookup("GRADEBOOK_WORKSPACE")
            .filter(|s| !s.trim().is_empty())
            .map(PathBuf::from);
        debug!(?cfg, "configuration loaded");
        Ok(cfg)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |k| map.get(k).cloned()
    }

    #[test]
    fn defaults_when_nothing_is_set() {
        let cfg = Config::from_lookup(lookup(&[])).unwrap();
        assert_eq!(cfg.weights, Weights::default());
        assert_eq!(cfg.exam_scale, ExamScale::Mid20Final40);
        assert_eq!(cfg.letter_scale, LetterScale::TenBand);
        assert!(cfg.workspace.is_none());
    }

    #[test]
    fn weights_not_summing_to_one_fail_startup() {
        let e = Config::from_lookup(lookup(&[("GRADEBOOK_WEIGHTS", "0.3,0.3,0.3,0.3")]))
            .unwrap_err();
        assert!(matches!(e, GradebookError::InvalidConfig(_)));
        assert!(Weights::new(0.25, 0.25, 0.25, 0.25).is_ok());
        assert!(Weights::new(1.5, -0.5, 0.0, 0.0).is_err());
    }

    #[test]
    fn alternate_scales_parse() {
        let cfg = Config::from_lookup(lookup(&[
            ("GRADEBOOK_EXAM_SCALE", "25/35"),
            ("GRADEBOOK_LETTER_SCALE", "5"),
            ("GRADEBOOK_WEIGHTS", "0.1, 0.2, 0.3, 0.4"),
        ]))
        .unwrap();
        assert_eq!(cfg.exam_scale.mid_max(), 25);
        assert_eq!(cfg.exam_scale.final_max(), 35);
        assert_eq!(cfg.letter_scale, LetterScale::FiveBand);
        assert!((cfg.weights.final_exam() - 0.4).abs() < 1e-12);
    }
}
