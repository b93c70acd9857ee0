// src/config/llm.rs
// Upstream LLM provider credentials, the Tool Invocation Loop's iteration
// cap and LLM request timeout, and the per-`tools/call` wall-clock cap
// (`tool_call_timeout_secs`, wired into `McpService::with_tool_call_timeout`
// in `main.rs` and from there into every `McpClient::call_tool`).

use super::helpers::{env_or, env_usize};
use super::ConfigError;
use crate::llm::provider::openai::OpenAIModel;

#[derive(Debug, Clone)]
pub struct LlmConfig {
    pub api_key: String,
    pub model: OpenAIModel,
    pub request_timeout_secs: u64,
    pub iteration_cap: usize,
    pub tool_call_timeout_secs: u64,
}

impl LlmConfig {
    pub fn from_env() -> Self {
        Self {
            api_key: std::env::var("OPENAI_API_KEY").unwrap_or_default(),
            model: parse_model(&env_or("OPENAI_MODEL", "gpt-5.1")),
            request_timeout_secs: env_usize("LLM_REQUEST_TIMEOUT_SECS", 120) as u64,
            iteration_cap: env_usize("TOOL_LOOP_ITERATION_CAP", 15),
            tool_call_timeout_secs: env_usize("TOOL_CALL_TIMEOUT_SECS", 60) as u64,
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.api_key.is_empty() {
            return Err(ConfigError::MissingEnv("OPENAI_API_KEY".into()));
        }
        if self.iteration_cap == 0 {
            return Err(ConfigError::Invalid {
                field: "TOOL_LOOP_ITERATION_CAP".into(),
                reason: "must be at least 1".into(),
            });
        }
        Ok(())
    }
}

fn parse_model(raw: &str) -> OpenAIModel {
    match raw {
        "gpt-5.1-mini" => OpenAIModel::Gpt51Mini,
        "gpt-5.1-codex-max" => OpenAIModel::Gpt51CodexMax,
        _ => OpenAIModel::Gpt51,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_model_falls_back_to_default() {
        assert_eq!(parse_model("not-a-real-model"), OpenAIModel::Gpt51);
        assert_eq!(parse_model("gpt-5.1-mini"), OpenAIModel::Gpt51Mini);
    }

    #[test]
    fn test_validate_requires_api_key() {
        let mut config = LlmConfig::from_env();
        config.api_key = String::new();
        assert!(config.validate().is_err());
    }
}
