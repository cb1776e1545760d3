//! LLM provider configuration

use super::anthropic::DEFAULT_MODEL;
use super::{AnthropicService, LlmError, LlmService, LoggingService};
use std::sync::Arc;
use std::time::Duration;

/// Configuration for the reasoning service
#[derive(Debug, Clone, Default)]
pub struct LlmConfig {
    pub anthropic_api_key: Option<String>,
    /// Gateway URL; when set, authentication is left to the gateway
    pub gateway: Option<String>,
    pub model: Option<String>,
}

impl LlmConfig {
    pub fn from_env() -> Self {
        Self {
            anthropic_api_key: std::env::var("ANTHROPIC_API_KEY").ok(),
            gateway: std::env::var("LLM_GATEWAY").ok(),
            model: std::env::var("TRIAGE_MODEL").ok(),
        }
    }

    fn api_key(&self) -> Option<String> {
        if self.gateway.is_some() {
            return Some("implicit".to_string());
        }
        self.anthropic_api_key.clone().filter(|k| !k.is_empty())
    }
}

/// Build the logging-wrapped service, `None` when no credentials are configured
pub fn build_service(
    config: &LlmConfig,
    timeout: Duration,
) -> Result<Option<Arc<dyn LlmService>>, LlmError> {
    let Some(api_key) = config.api_key() else {
        return Ok(None);
    };

    let model = config.model.as_deref().unwrap_or(DEFAULT_MODEL);
    let service = AnthropicService::new(api_key, model, config.gateway.as_deref(), timeout)?;
    Ok(Some(Arc::new(LoggingService::new(Arc::new(service)))))
}
