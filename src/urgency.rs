//! Urgency evaluation
//!
//! Emergency vocabulary anywhere in the recorded interview forces
//! [`UrgencyLevel::Emergency`]. Otherwise moderate-severity signals are
//! weighted by the stage they were reported at and summed. The result never
//! drops below the previously recorded level.

use crate::lexicon::{fold, EMERGENCY_TERMS, MODERATE_TERMS};
use crate::state_machine::state::{InterviewData, Stage, UrgencyLevel};
use regex::Regex;
use std::sync::LazyLock;

const HIGH_THRESHOLD: u32 = 6;
const MEDIUM_THRESHOLD: u32 = 2;

static PAIN_SCALE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b(10|[0-9])\b").expect("pain scale regex is valid"));

/// "2/10", "2 de 10", "2 out of 10": the trailing 10 is the scale, not the score
static SCORE_OUT_OF_TEN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b(10|[0-9])\s*(?:/|de|em|out of)\s*10\b").expect("scored scale regex is valid")
});

/// Weight of a moderate signal reported at `stage`
fn stage_weight(stage: Stage) -> u32 {
    match stage {
        Stage::Initial | Stage::Duration | Stage::Quality | Stage::Factors => 1,
        // Analysis covers details volunteered after the full interview
        Stage::Intensity | Stage::History | Stage::Analysis => 2,
        Stage::Complete => 0,
    }
}

/// Self-reported 0-10 score. An explicit "N/10" form wins over bare numbers.
fn pain_score(folded: &str) -> Option<u32> {
    if let Some(score) = SCORE_OUT_OF_TEN.captures(folded).and_then(|c| c.get(1)) {
        return score.as_str().parse().ok();
    }
    PAIN_SCALE
        .find_iter(folded)
        .filter_map(|m| m.as_str().parse::<u32>().ok())
        .max()
}

/// Extra weight for a self-reported 0-10 pain score
fn pain_scale_weight(folded: &str) -> u32 {
    match pain_score(folded) {
        Some(8..=10) => 3,
        Some(5..=7) => 1,
        _ => 0,
    }
}

/// Severity evidence collected from the interview
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UrgencyAssessment {
    pub emergency_terms: Vec<String>,
    pub score: u32,
}

impl UrgencyAssessment {
    pub fn level(&self) -> UrgencyLevel {
        if !self.emergency_terms.is_empty() {
            UrgencyLevel::Emergency
        } else if self.score >= HIGH_THRESHOLD {
            UrgencyLevel::High
        } else if self.score >= MEDIUM_THRESHOLD {
            UrgencyLevel::Medium
        } else {
            UrgencyLevel::Low
        }
    }
}

pub fn assess(interview: &InterviewData) -> UrgencyAssessment {
    let mut assessment = UrgencyAssessment::default();

    for (stage, text) in interview.entries() {
        let folded = fold(text);

        assessment
            .emergency_terms
            .extend(EMERGENCY_TERMS.matches(&folded).into_iter().map(String::from));

        let hits = u32::try_from(MODERATE_TERMS.count(&folded)).unwrap_or(u32::MAX);
        assessment.score = assessment
            .score
            .saturating_add(hits.saturating_mul(stage_weight(stage)));

        if stage == Stage::Intensity {
            assessment.score = assessment.score.saturating_add(pain_scale_weight(&folded));
        }
    }

    assessment
}

/// Urgency after the latest turn: `max(previous, computed)`.
pub fn evaluate(interview: &InterviewData, previous: UrgencyLevel) -> UrgencyLevel {
    previous.max(assess(interview).level())
}
