use serde::{Serialize, Serializer};
use std::fmt;

use crate::config::{ExamScale, LetterScale, Weights};
use crate::error::{GradebookError, Result};
use crate::policy::GradingPolicy;
use crate::record::{AssessmentSlot, ScoreRecord, ASSIGNMENT_COUNT, ASSIGNMENT_MAX, QUIZ_COUNT, QUIZ_MAX};

const QUIZ_POOL: f64 = (QUIZ_COUNT as u32 * QUIZ_MAX) as f64;
const ASSIGNMENT_POOL: f64 = (ASSIGNMENT_COUNT as u32 * ASSIGNMENT_MAX) as f64;
const SIGMA_EPSILON: f64 = 1e-9;

/// Two-decimal rounding used for displayed percentages.
pub fn round_off_2_decimals(x: f64) -> f64 {
    (x * 100.0).round() / 100.0
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct Contributions {
    quiz: f64,
    assignment: f64,
    mid: f64,
    final_exam: f64,
}

// Marks above a component's maximum count as full marks, so the composite
// stays within 0-100 whatever a hand-built record holds.
fn capped_ratio(earned: u64, max: f64) -> f64 {
    (earned as f64 / max).min(1.0)
}

impl Contributions {
    fn of(record: &ScoreRecord, weights: &Weights, scale: ExamScale) -> Self {
        Self {
            quiz: 100.0 * capped_ratio(record.quiz_total(), QUIZ_POOL) * weights.quiz(),
            assignment: 100.0 * capped_ratio(record.assignment_total(), ASSIGNMENT_POOL) * weights.assignment(),
            mid: 100.0 * capped_ratio(u64::from(record.mid), f64::from(scale.mid_max())) * weights.mid(),
            final_exam: 100.0
                * capped_ratio(u64::from(record.final_exam), f64::from(scale.final_max()))
                * weights.final_exam(),
        }
    }

    fn total(&self) -> f64 {
        self.quiz + self.assignment + self.mid + self.final_exam
    }
}

/// Weighted 0-100 composite of a record. An all-zero record scores 0.
pub fn weighted_percentage(record: &ScoreRecord, weights: &Weights, scale: ExamScale) -> f64 {
    Contributions::of(record, weights, scale).total()
}

/// Letter grades, best first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum LetterGrade {
    A,
    AMinus,
    BPlus,
    B,
    BMinus,
    CPlus,
    C,
    CMinus,
    DPlus,
    D,
    F,
}

impl LetterGrade {
    const TEN_BAND: [LetterGrade; 10] = [
        LetterGrade::A,
        LetterGrade::AMinus,
        LetterGrade::BPlus,
        LetterGrade::B,
        LetterGrade::BMinus,
        LetterGrade::CPlus,
        LetterGrade::C,
        LetterGrade::CMinus,
        LetterGrade::DPlus,
        LetterGrade::D,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::A => "A",
            Self::AMinus => "A-",
            Self::BPlus => "B+",
            Self::B => "B",
            Self::BMinus => "B-",
            Self::CPlus => "C+",
            Self::C => "C",
            Self::CMinus => "C-",
            Self::DPlus => "D+",
            Self::D => "D",
            Self::F => "F",
        }
    }

    /// Strips the +/- modifier.
    pub fn base(self) -> Self {
        match self {
            Self::A | Self::AMinus => Self::A,
            Self::BPlus | Self::B | Self::BMinus => Self::B,
            Self::CPlus | Self::C | Self::CMinus => Self::C,
            Self::DPlus | Self::D => Self::D,
            Self::F => Self::F,
        }
    }
}

impl fmt::Display for LetterGrade {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for LetterGrade {
    fn serialize<S: Serializer>(&self, s: S) -> std::result::Result<S::Ok, S::Error> {
        s.serialize_str(self.as_str())
    }
}

const ABSOLUTE_TEN_BAND: [f64; 10] = [86.0, 82.0, 78.0, 74.0, 70.0, 66.0, 62.0, 58.0, 54.0, 50.0];
const ABSOLUTE_FIVE_BAND: [(f64, LetterGrade); 4] = [
    (85.0, LetterGrade::A),
    (75.0, LetterGrade::B),
    (60.0, LetterGrade::C),
    (50.0, LetterGrade::D),
];
/// Offsets from the mean, in standard deviations, for A..D.
const RELATIVE_SIGMA_OFFSETS: [f64; 10] = [1.5, 1.2, 0.9, 0.6, 0.3, 0.0, -0.4, -0.8, -1.2, -1.6];

pub fn classify_absolute(scale: LetterScale, score: f64) -> LetterGrade {
    match scale {
        LetterScale::TenBand => ABSOLUTE_TEN_BAND
            .iter()
            .zip(LetterGrade::TEN_BAND)
            .find(|(min, _)| score >= **min)
            .map(|(_, g)| g)
            .unwrap_or(LetterGrade::F),
        LetterScale::FiveBand => ABSOLUTE_FIVE_BAND
            .iter()
            .find(|(min, _)| score >= *min)
            .map(|(_, g)| *g)
            .unwrap_or(LetterGrade::F),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PopulationStats {
    pub count: usize,
    pub mean: f64,
    /// Population standard deviation (divides by N).
    pub std_dev: f64,
}

pub fn population_stats(values: &[f64]) -> Option<PopulationStats> {
    if values.is_empty() {
        return None;
    }
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
    Some(PopulationStats {
        count: values.len(),
        mean,
        std_dev: variance.sqrt(),
    })
}

fn classify_relative_ten_band(score: f64, stats: &PopulationStats) -> LetterGrade {
    let (mean, sigma) = (stats.mean, stats.std_dev);
    if sigma <= SIGMA_EPSILON {
        // Degenerate spread: only the sign of the offset is meaningful.
        return if (score - mean).abs() <= SIGMA_EPSILON {
            LetterGrade::CPlus
        } else if score > mean {
            LetterGrade::A
        } else {
            LetterGrade::F
        };
    }
    RELATIVE_SIGMA_OFFSETS
        .iter()
        .zip(LetterGrade::TEN_BAND)
        .find(|(k, _)| score >= mean + **k * sigma)
        .map(|(_, g)| g)
        .unwrap_or(LetterGrade::F)
}

/// Letter grade for `score` under `policy`.
///
/// The relative policy needs the weighted percentages of everyone in the
/// subject; with fewer than two of them it falls back to absolute.
pub fn classify(policy: GradingPolicy, scale: LetterScale, score: f64, population: &[f64]) -> LetterGrade {
    match policy {
        GradingPolicy::Absolute => classify_absolute(scale, score),
        GradingPolicy::Relative => {
            let stats = match population_stats(population) {
                Some(s) if s.count >= 2 => s,
                _ => return classify_absolute(scale, score),
            };
            let grade = classify_relative_ten_band(score, &stats);
            match scale {
                LetterScale::TenBand => grade,
                LetterScale::FiveBand => grade.base(),
            }
        }
    }
}

/// Exams still at zero, i.e. not yet graded.
pub fn pending_exams(record: &ScoreRecord) -> Vec<AssessmentSlot> {
    let mut out = Vec::new();
    if record.mid == 0 {
        out.push(AssessmentSlot::Mid);
    }
    if record.final_exam == 0 {
        out.push(AssessmentSlot::Final);
    }
    out
}

/// Best reachable percentage if every pending exam gets full marks.
pub fn max_achievable(record: &ScoreRecord, weights: &Weights, scale: ExamScale) -> f64 {
    let c = Contributions::of(record, weights, scale);
    let mid = if record.mid == 0 { 100.0 * weights.mid() } else { c.mid };
    let final_exam = if record.final_exam == 0 {
        100.0 * weights.final_exam()
    } else {
        c.final_exam
    };
    c.quiz + c.assignment + mid + final_exam
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RequiredScore {
    pub target: f64,
    pub max_achievable: f64,
    /// Raw mark needed on the exam; 0 when the target is already secured.
    pub needed: f64,
    pub out_of: u32,
    pub already_secured: bool,
}

/// Raw mark needed on pending exam `slot` to reach `target` percent,
/// holding every other component at its current value.
pub fn required_score(
    record: &ScoreRecord,
    weights: &Weights,
    scale: ExamScale,
    target: f64,
    slot: AssessmentSlot,
) -> Result<RequiredScore> {
    if !(0.0..=100.0).contains(&target) {
        return Err(GradebookError::BadParams(format!(
            "desired grade must be between 0 and 100, got {target}"
        )));
    }
    if !matches!(slot, AssessmentSlot::Mid | AssessmentSlot::Final) || !pending_exams(record).contains(&slot) {
        return Err(GradebookError::NotFound(format!("pending exam {slot}")));
    }

    let max = max_achievable(record, weights, scale);
    if target > max + SIGMA_EPSILON {
        return Err(GradebookError::Unachievable {
            target,
            max_achievable: max,
        });
    }

    let c = Contributions::of(record, weights, scale);
    let (current, weight) = match slot {
        AssessmentSlot::Mid => (c.total() - c.mid, weights.mid()),
        _ => (c.total() - c.final_exam, weights.final_exam()),
    };
    let out_of = scale.slot_max(slot);
    let needed_percent = if weight > 0.0 { (target - current) / weight } else { 0.0 };
    let needed = (needed_percent / 100.0 * out_of as f64).max(0.0);
    if needed > out_of as f64 + SIGMA_EPSILON {
        return Err(GradebookError::Unachievable {
            target,
            max_achievable: current + 100.0 * weight,
        });
    }

    Ok(RequiredScore {
        target,
        max_achievable: max,
        needed,
        out_of,
        already_secured: needed == 0.0,
    })
}
