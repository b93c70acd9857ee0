// src/config/mcp.rs
// Path to the server-descriptor document the MCP Service loads at startup.

use std::path::PathBuf;

use super::helpers::env_or;
use super::ConfigError;

#[derive(Debug, Clone)]
pub struct McpConfig {
    pub descriptor_path: PathBuf,
}

impl McpConfig {
    pub fn from_env() -> Self {
        Self { descriptor_path: PathBuf::from(env_or("MCP_SERVERS_CONFIG", "servers.json")) }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.descriptor_path.as_os_str().is_empty() {
            return Err(ConfigError::Invalid {
                field: "MCP_SERVERS_CONFIG".into(),
                reason: "must not be empty".into(),
            });
        }
        Ok(())
    }
}
