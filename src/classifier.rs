//! Message intent classification
//!
//! Keyword matching over the lexicons in [`crate::lexicon`]. Symptom
//! vocabulary outranks scheduling vocabulary; no match falls through to
//! [`Intent::GeneralQuestion`].

use crate::lexicon::{fold, SCHEDULING_TERMS, SYMPTOM_TERMS};
use serde::{Deserialize, Serialize};
use std::fmt;

/// What the user is trying to do with a message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Intent {
    SymptomReport,
    SchedulingRequest,
    GeneralQuestion,
}

impl Intent {
    pub fn as_str(self) -> &'static str {
        match self {
            Intent::SymptomReport => "symptom_report",
            Intent::SchedulingRequest => "scheduling_request",
            Intent::GeneralQuestion => "general_question",
        }
    }
}

impl fmt::Display for Intent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Classification with the evidence behind it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Classification {
    pub intent: Intent,
    pub symptom_hits: usize,
    pub scheduling_hits: usize,
}

impl Classification {
    /// Nothing matched; the intent is the default branch
    pub fn is_ambiguous(&self) -> bool {
        self.symptom_hits == 0 && self.scheduling_hits == 0
    }
}

/// Classify a message into an intent.
pub fn classify(text: &str) -> Intent {
    classify_detailed(text).intent
}

pub fn classify_detailed(text: &str) -> Classification {
    let folded = fold(text);
    let symptom_hits = SYMPTOM_TERMS.count(&folded);
    let scheduling_hits = SCHEDULING_TERMS.count(&folded);

    let intent = if symptom_hits > 0 {
        Intent::SymptomReport
    } else if scheduling_hits > 0 {
        Intent::SchedulingRequest
    } else {
        Intent::GeneralQuestion
    };

    Classification {
        intent,
        symptom_hits,
        scheduling_hits,
    }
}
