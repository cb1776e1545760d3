//! Diagnostic hypothesis generation through the reasoning service

use crate::llm::{LlmError, LlmRequest, LlmService};
use crate::runtime::HypothesisGenerator;
use crate::state_machine::state::rank_hypotheses;
use crate::state_machine::{DiagnosticHypothesis, SymptomSummary};
use async_trait::async_trait;
use serde::Deserialize;
use std::fmt::Write;
use std::sync::Arc;

/// Hypotheses kept from a single answer
pub const MAX_HYPOTHESES: usize = 5;

const SYSTEM_PROMPT: &str = "You assist a clinical triage service. Given a structured patient \
interview (in Portuguese), list the most plausible diagnostic hypotheses for a physician to \
evaluate. Answer ONLY with a JSON array of objects with the fields \"condition\" (string, in \
Portuguese), \"probability\" (integer 0-100) and \"reasoning\" (one short sentence in \
Portuguese). Never include treatment advice.";

/// Generator backed by an LLM
pub struct LlmHypothesisGenerator {
    llm: Arc<dyn LlmService>,
}

impl LlmHypothesisGenerator {
    pub fn new(llm: Arc<dyn LlmService>) -> Self {
        Self { llm }
    }
}

#[async_trait]
impl HypothesisGenerator for LlmHypothesisGenerator {
    async fn generate(
        &self,
        summary: &SymptomSummary,
    ) -> Result<Vec<DiagnosticHypothesis>, LlmError> {
        let request = LlmRequest {
            system: Some(SYSTEM_PROMPT.to_string()),
            prompt: render_summary(summary),
            max_tokens: Some(1024),
        };

        let response = self.llm.complete(&request).await?;
        parse_hypotheses(&response.text)
    }
}

/// Installed when no reasoning service is configured
pub struct UnavailableGenerator;

#[async_trait]
impl HypothesisGenerator for UnavailableGenerator {
    async fn generate(
        &self,
        _summary: &SymptomSummary,
    ) -> Result<Vec<DiagnosticHypothesis>, LlmError> {
        Err(LlmError::unavailable("No reasoning service configured"))
    }
}

/// Interview rendered as the user turn of the request
pub fn render_summary(summary: &SymptomSummary) -> String {
    let fields = [
        ("Queixa principal", &summary.chief_complaint),
        ("Duração", &summary.duration),
        ("Intensidade (0-10)", &summary.intensity),
        ("Característica", &summary.quality),
        ("Fatores de melhora/piora", &summary.factors),
        ("Histórico", &summary.history),
    ];

    let mut out = String::new();
    for (label, value) in fields {
        let _ = writeln!(out, "{label}: {}", value.as_deref().unwrap_or("não informado"));
    }
    for addition in &summary.additions {
        let _ = writeln!(out, "Informação adicional: {addition}");
    }
    let _ = write!(out, "Urgência estimada: {}", summary.urgency.label_pt());
    out
}

#[derive(Debug, Deserialize)]
struct RawHypothesis {
    condition: String,
    #[serde(default)]
    probability: f64,
    #[serde(default)]
    reasoning: String,
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn clamp_probability(p: f64) -> u8 {
    p.clamp(0.0, 100.0).round() as u8
}

/// First hypotheses array in the model answer. Each `[` is tried as the
/// start of the array, so prose, citations like "[1]" and code fences around
/// it are skipped.
fn extract_hypotheses(text: &str) -> Result<Vec<RawHypothesis>, LlmError> {
    let mut last_error = None;
    let mut saw_empty = false;

    for (start, _) in text.match_indices('[') {
        let Some(candidate) = text.get(start..) else {
            continue;
        };
        match serde_json::Deserializer::from_str(candidate)
            .into_iter::<Vec<RawHypothesis>>()
            .next()
        {
            Some(Ok(raw)) if raw.is_empty() => saw_empty = true,
            Some(Ok(raw)) => return Ok(raw),
            Some(Err(e)) => last_error = Some(e),
            None => {}
        }
    }

    if saw_empty {
        return Ok(vec![]);
    }
    Err(match last_error {
        Some(e) => LlmError::malformed(format!("Invalid hypotheses JSON: {e}")),
        None => LlmError::malformed("No JSON array in reasoning service answer"),
    })
}

pub fn parse_hypotheses(text: &str) -> Result<Vec<DiagnosticHypothesis>, LlmError> {
    let raw = extract_hypotheses(text)?;

    let hypotheses = raw
        .into_iter()
        .filter(|h| !h.condition.trim().is_empty())
        .map(|h| DiagnosticHypothesis {
            condition: h.condition.trim().to_string(),
            probability: clamp_probability(h.probability),
            reasoning: h.reasoning.trim().to_string(),
        })
        .collect();

    let mut ranked = rank_hypotheses(hypotheses);
    ranked.truncate(MAX_HYPOTHESES);
    Ok(ranked)
}
