use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::GradebookError;

pub const QUIZ_COUNT: usize = 4;
pub const ASSIGNMENT_COUNT: usize = 4;
pub const QUIZ_MAX: u32 = 10;
pub const ASSIGNMENT_MAX: u32 = 10;

/// One student's scores for one subject.
///
/// Identity is `(subject_code, student_username)`. Subject codes compare
/// ASCII case-insensitively, usernames exactly. A fresh record is all zeros,
/// meaning "not yet graded".
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScoreRecord {
    pub subject_code: String,
    pub student_username: String,
    pub quizzes: [u32; QUIZ_COUNT],
    pub assignments: [u32; ASSIGNMENT_COUNT],
    pub mid: u32,
    #[serde(rename = "final")]
    pub final_exam: u32,
}

impl ScoreRecord {
    pub fn new(subject_code: impl Into<String>, student_username: impl Into<String>) -> Self {
        Self {
            subject_code: subject_code.into(),
            student_username: student_username.into(),
            quizzes: [0; QUIZ_COUNT],
            assignments: [0; ASSIGNMENT_COUNT],
            mid: 0,
            final_exam: 0,
        }
    }

    pub fn matches(&self, subject_code: &str, student_username: &str) -> bool {
        self.is_subject(subject_code) && self.student_username == student_username
    }

    pub fn is_subject(&self, subject_code: &str) -> bool {
        self.subject_code.eq_ignore_ascii_case(subject_code)
    }

    pub fn get(&self, slot: AssessmentSlot) -> u32 {
        match slot {
            AssessmentSlot::Quiz(n) => self.quizzes[slot_index(n)],
            AssessmentSlot::Assignment(n) => self.assignments[slot_index(n)],
            AssessmentSlot::Mid => self.mid,
            AssessmentSlot::Final => self.final_exam,
        }
    }

    /// Structural update: returns a copy with only `slot` changed.
    pub fn with_slot(&self, slot: AssessmentSlot, value: u32) -> Self {
        let mut next = self.clone();
        match slot {
            AssessmentSlot::Quiz(n) => next.quizzes[slot_index(n)] = value,
            AssessmentSlot::Assignment(n) => next.assignments[slot_index(n)] = value,
            AssessmentSlot::Mid => next.mid = value,
            AssessmentSlot::Final => next.final_exam = value,
        }
        next
    }

    pub fn quiz_total(&self) -> u64 {
        self.quizzes.iter().map(|&q| u64::from(q)).sum()
    }

    pub fn assignment_total(&self) -> u64 {
        self.assignments.iter().map(|&a| u64::from(a)).sum()
    }
}

// Slot indices are validated on construction; clamp keeps a hand-built
// out-of-range variant from panicking.
fn slot_index(n: u8) -> usize {
    (n.clamp(1, QUIZ_COUNT as u8) - 1) as usize
}

/// One named scoring component of a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AssessmentSlot {
    /// 1-based quiz index.
    Quiz(u8),
    /// 1-based assignment index.
    Assignment(u8),
    Mid,
    Final,
}

impl AssessmentSlot {
    pub fn quiz(n: u8) -> Option<Self> {
        (1..=QUIZ_COUNT as u8).contains(&n).then_some(Self::Quiz(n))
    }

    pub fn assignment(n: u8) -> Option<Self> {
        (1..=ASSIGNMENT_COUNT as u8)
            .contains(&n)
            .then_some(Self::Assignment(n))
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Quiz(_) => "Quiz",
            Self::Assignment(_) => "Assignment",
            Self::Mid => "Mid Term",
            Self::Final => "Final Exam",
        }
    }
}

impl FromStr for AssessmentSlot {
    type Err = GradebookError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.trim().to_ascii_lowercase();
        let parsed = match lower.as_str() {
            "mid" => Some(Self::Mid),
            "final" => Some(Self::Final),
            other => {
                if let Some(n) = other.strip_prefix("quiz") {
                    n.parse::<u8>().ok().and_then(Self::quiz)
                } else if let Some(n) = other.strip_prefix("assignment") {
                    n.parse::<u8>().ok().and_then(Self::assignment)
                } else {
                    None
                }
            }
        };
        parsed.ok_or_else(|| GradebookError::UnknownSlot(s.to_string()))
    }
}

impl fmt::Display for AssessmentSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Quiz(n) => write!(f, "quiz{n}"),
            Self::Assignment(n) => write!(f, "assignment{n}"),
            Self::Mid => f.write_str("mid"),
            Self::Final => f.write_str("final"),
        }
    }
}

/// A pending change for one student, scoped to a subject and slot by the
/// batch it belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Edit {
    pub username: String,
    pub value: i64,
}

impl Edit {
    pub fn new(username: impl Into<String>, value: i64) -> Self {
        Self {
            username: username.into(),
            value,
        }
    }
}
