//! Triage conversation state types

use serde::{Deserialize, Serialize};
use std::fmt;

// ============================================================================
// Interview Stage
// ============================================================================

/// Step of the clinical interview protocol, in protocol order
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    #[default]
    Initial,
    Duration,
    Intensity,
    Quality,
    Factors,
    History,
    Analysis,
    Complete,
}

impl Stage {
    #[cfg(test)]
    pub const ALL: [Stage; 8] = [
        Stage::Initial,
        Stage::Duration,
        Stage::Intensity,
        Stage::Quality,
        Stage::Factors,
        Stage::History,
        Stage::Analysis,
        Stage::Complete,
    ];

    /// The stage that follows this one, `None` once complete
    pub fn next(self) -> Option<Stage> {
        match self {
            Stage::Initial => Some(Stage::Duration),
            Stage::Duration => Some(Stage::Intensity),
            Stage::Intensity => Some(Stage::Quality),
            Stage::Quality => Some(Stage::Factors),
            Stage::Factors => Some(Stage::History),
            Stage::History => Some(Stage::Analysis),
            Stage::Analysis => Some(Stage::Complete),
            Stage::Complete => None,
        }
    }

    /// Stages whose user answer is recorded as interview data
    pub fn is_collecting(self) -> bool {
        self <= Stage::History
    }

    /// A question from the protocol is pending an answer
    pub fn is_interview_active(self) -> bool {
        self > Stage::Initial && self <= Stage::History
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Stage::Initial => "initial",
            Stage::Duration => "duration",
            Stage::Intensity => "intensity",
            Stage::Quality => "quality",
            Stage::Factors => "factors",
            Stage::History => "history",
            Stage::Analysis => "analysis",
            Stage::Complete => "complete",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Urgency
// ============================================================================

/// Triage severity, ordered from least to most urgent
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
#[serde(rename_all = "snake_case")]
pub enum UrgencyLevel {
    #[default]
    Low,
    Medium,
    High,
    Emergency,
}

impl UrgencyLevel {
    pub fn as_str(self) -> &'static str {
        match self {
            UrgencyLevel::Low => "low",
            UrgencyLevel::Medium => "medium",
            UrgencyLevel::High => "high",
            UrgencyLevel::Emergency => "emergency",
        }
    }

    /// Label shown to patients
    pub fn label_pt(self) -> &'static str {
        match self {
            UrgencyLevel::Low => "baixo",
            UrgencyLevel::Medium => "moderado",
            UrgencyLevel::High => "alto",
            UrgencyLevel::Emergency => "emergência",
        }
    }
}

impl fmt::Display for UrgencyLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Diagnostic Hypotheses
// ============================================================================

/// Candidate diagnosis proposed by the reasoning service
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiagnosticHypothesis {
    pub condition: String,
    /// 0 to 100
    pub probability: u8,
    pub reasoning: String,
}

/// Sort by descending probability, ties keep their original order
pub fn rank_hypotheses(mut hypotheses: Vec<DiagnosticHypothesis>) -> Vec<DiagnosticHypothesis> {
    hypotheses.sort_by(|a, b| b.probability.cmp(&a.probability));
    hypotheses
}

// ============================================================================
// Interview Data
// ============================================================================

/// Answers collected at each stage of the interview
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct InterviewData {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chief_complaint: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub intensity: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quality: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub factors: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub history: Option<String>,
    /// Extra details sent while the analysis is pending
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub additions: Vec<String>,
}

impl InterviewData {
    /// Record the answer given while the conversation was at `stage`
    pub fn record(&mut self, stage: Stage, text: &str) {
        let text = text.trim().to_string();
        match stage {
            Stage::Initial => self.chief_complaint = Some(text),
            Stage::Duration => self.duration = Some(text),
            Stage::Intensity => self.intensity = Some(text),
            Stage::Quality => self.quality = Some(text),
            Stage::Factors => self.factors = Some(text),
            Stage::History => self.history = Some(text),
            Stage::Analysis => self.additions.push(text),
            Stage::Complete => {}
        }
    }

    /// Every recorded answer tagged with the stage it was given at.
    /// Additions are reported under [`Stage::Analysis`].
    pub fn entries(&self) -> Vec<(Stage, &str)> {
        let fixed = [
            (Stage::Initial, &self.chief_complaint),
            (Stage::Duration, &self.duration),
            (Stage::Intensity, &self.intensity),
            (Stage::Quality, &self.quality),
            (Stage::Factors, &self.factors),
            (Stage::History, &self.history),
        ];

        fixed
            .into_iter()
            .filter_map(|(stage, text)| text.as_deref().map(|t| (stage, t)))
            .chain(self.additions.iter().map(|t| (Stage::Analysis, t.as_str())))
            .collect()
    }

    pub fn summary(&self, urgency: UrgencyLevel) -> SymptomSummary {
        SymptomSummary {
            chief_complaint: self.chief_complaint.clone(),
            duration: self.duration.clone(),
            intensity: self.intensity.clone(),
            quality: self.quality.clone(),
            factors: self.factors.clone(),
            history: self.history.clone(),
            additions: self.additions.clone(),
            urgency,
        }
    }
}

/// Structured input handed to the hypothesis generator
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SymptomSummary {
    pub chief_complaint: Option<String>,
    pub duration: Option<String>,
    pub intensity: Option<String>,
    pub quality: Option<String>,
    pub factors: Option<String>,
    pub history: Option<String>,
    pub additions: Vec<String>,
    pub urgency: UrgencyLevel,
}

// ============================================================================
// Conversation State
// ============================================================================

/// Triage state of one conversation
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TriageState {
    pub stage: Stage,
    pub urgency: UrgencyLevel,
    /// Terminated: either the interview completed or the user cleared the chat
    pub is_complete: bool,
    /// The one-time emergency alert has already been raised
    #[serde(default)]
    pub urgent_flag_raised: bool,
    #[serde(default)]
    pub interview: InterviewData,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub hypotheses: Vec<DiagnosticHypothesis>,
}

/// Context for a conversation turn (immutable)
#[derive(Debug, Clone)]
pub struct ConvContext {
    pub conversation_id: String,
    pub user_id: String,
}

impl ConvContext {
    pub fn new(conversation_id: impl Into<String>, user_id: impl Into<String>) -> Self {
        Self {
            conversation_id: conversation_id.into(),
            user_id: user_id.into(),
        }
    }
}
