// src/config/server.rs
// HTTP bind address and optional log directory.

use std::path::PathBuf;

use super::helpers::{env_or, env_usize};
use super::ConfigError;

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub log_dir: Option<PathBuf>,
}

impl ServerConfig {
    pub fn from_env() -> Self {
        let port = env_usize("PORT", 8080) as u16;
        Self {
            host: env_or("HOST", "0.0.0.0"),
            port,
            log_dir: std::env::var("LOG_DIR").ok().map(PathBuf::from),
        }
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.host.is_empty() {
            return Err(ConfigError::Invalid { field: "HOST".into(), reason: "must not be empty".into() });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bind_address_formats_host_and_port() {
        let config = ServerConfig { host: "127.0.0.1".into(), port: 3000, log_dir: None };
        assert_eq!(config.bind_address(), "127.0.0.1:3000");
    }
}
