// src/config/mod.rs
// Composes the host's small configuration surface: HTTP bind address, the
// MCP server-descriptor document, and upstream LLM provider settings.

pub mod helpers;
pub mod llm;
pub mod mcp;
pub mod server;

use thiserror::Error;

pub use llm::LlmConfig;
pub use mcp::McpConfig;
pub use server::ServerConfig;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required environment variable: {0}")]
    MissingEnv(String),
    #[error("invalid value for {field}: {reason}")]
    Invalid { field: String, reason: String },
}

/// Top-level configuration, loaded once at startup.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub mcp: McpConfig,
    pub llm: LlmConfig,
}

impl AppConfig {
    /// Reads `.env` (if present) then the process environment. Never
    /// panics; callers validate the result before using it.
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();

        Self {
            server: ServerConfig::from_env(),
            mcp: McpConfig::from_env(),
            llm: LlmConfig::from_env(),
        }
    }

    /// Checked at startup; a failure here is fatal (exit code 2).
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.server.validate()?;
        self.mcp.validate()?;
        self.llm.validate()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_rejects_empty_api_key() {
        let mut config = AppConfig {
            server: ServerConfig::from_env(),
            mcp: McpConfig { descriptor_path: "servers.json".into() },
            llm: LlmConfig::from_env(),
        };
        config.llm.api_key = String::new();
        assert!(config.validate().is_err());
    }
}

