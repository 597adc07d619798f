//! Configuration loading
//!
//! A single JSON document describes the downstream servers. It is loaded
//! once at startup and immutable afterwards.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// Name of the configuration file searched for in the working directory
/// and next to the executable.
pub const CONFIG_FILE_NAME: &str = "mcpbridge.config.json";

/// Environment variable naming an explicit configuration path.
pub const CONFIG_ENV_VAR: &str = "MCPBRIDGE_CONFIG";

/// Bridge configuration (from mcpbridge.config.json)
#[derive(Debug, Clone, Deserialize)]
pub struct BridgeConfig {
    pub servers: HashMap<String, ServerConfig>,
}

/// Descriptor for one downstream MCP server
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Transport type; only "stdio" is supported. Validated when a
    /// connection is first requested, not at load time.
    #[serde(rename = "type", default = "default_transport")]
    pub transport: String,
    pub command: String,
    #[serde(default)]
    pub args: Vec<String>,
    /// Merged over the bridge's own environment; values are env-expanded.
    #[serde(default)]
    pub env: HashMap<String, String>,
    /// Working directory for the child process.
    pub cwd: Option<String>,
    pub description: Option<String>,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

fn default_transport() -> String {
    "stdio".to_string()
}

fn default_enabled() -> bool {
    true
}

impl BridgeConfig {
    /// Load the configuration, trying in order:
    /// 1. The path named by `MCPBRIDGE_CONFIG`
    /// 2. `mcpbridge.config.json` in the working directory
    /// 3. `mcpbridge.config.json` next to the executable
    ///
    /// A missing or unparseable file is a fatal startup error.
    pub fn load() -> Result<Self> {
        let path = Self::find_config_file()
            .context("no mcpbridge.config.json found (set MCPBRIDGE_CONFIG or place one in the working directory)")?;
        tracing::debug!("loading config from: {}", path.display());
        Self::load_from_path(&path)
    }

    /// Load from a specific path
    pub fn load_from_path(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;
        let config: BridgeConfig = serde_json::from_str(&content)
            .with_context(|| format!("failed to parse config file {}", path.display()))?;
        Ok(config)
    }

    fn find_config_file() -> Option<PathBuf> {
        if let Ok(env_path) = std::env::var(CONFIG_ENV_VAR) {
            let path = PathBuf::from(&env_path);
            if path.exists() {
                return Some(path);
            }
            tracing::warn!("{}={} does not exist", CONFIG_ENV_VAR, env_path);
        }

        let local = PathBuf::from(CONFIG_FILE_NAME);
        if local.exists() {
            return Some(local);
        }

        if let Ok(exe) = std::env::current_exe() {
            if let Some(dir) = exe.parent() {
                let adjacent = dir.join(CONFIG_FILE_NAME);
                if adjacent.exists() {
                    return Some(adjacent);
                }
            }
        }

        None
    }

    /// Names of all enabled servers, sorted for stable output.
    pub fn enabled_server_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .servers
            .iter()
            .filter(|(_, cfg)| cfg.enabled)
            .map(|(name, _)| name.clone())
            .collect();
        names.sort();
        names
    }

    /// Look up a descriptor by name.
    pub fn get(&self, name: &str) -> Option<&ServerConfig> {
        self.servers.get(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(json: &str) -> BridgeConfig {
        serde_json::from_str(json).expect("config should parse")
    }

    #[test]
    fn minimal_descriptor_gets_defaults() {
        let config = parse(r#"{"servers": {"files": {"command": "file-server"}}}"#);
        let srv = config.get("files").unwrap();
        assert_eq!(srv.transport, "stdio");
        assert_eq!(srv.command, "file-server");
        assert!(srv.args.is_empty());
        assert!(srv.env.is_empty());
        assert!(srv.cwd.is_none());
        assert!(srv.enabled);
    }

    #[test]
    fn full_descriptor_round_trips() {
        let config = parse(
            r#"{
            "servers": {
                "db": {
                    "type": "stdio",
                    "command": "db-server",
                    "args": ["--readonly"],
                    "env": {"DB_URL": "postgres://localhost"},
                    "cwd": "/srv/db",
                    "description": "Database access",
                    "enabled": false
                }
            }
        }"#,
        );
        let srv = config.get("db").unwrap();
        assert_eq!(srv.args, vec!["--readonly"]);
        assert_eq!(srv.env.get("DB_URL").unwrap(), "postgres://localhost");
        assert_eq!(srv.cwd.as_deref(), Some("/srv/db"));
        assert_eq!(srv.description.as_deref(), Some("Database access"));
        assert!(!srv.enabled);
    }

    #[test]
    fn non_stdio_transport_is_accepted_at_load_time() {
        // Rejection happens on first connection, not here.
        let config = parse(r#"{"servers": {"web": {"type": "sse", "command": "web-server"}}}"#);
        assert_eq!(config.get("web").unwrap().transport, "sse");
    }

    #[test]
    fn enabled_names_are_sorted_and_filtered() {
        let config = parse(
            r#"{"servers": {
                "zeta": {"command": "z"},
                "alpha": {"command": "a"},
                "off": {"command": "o", "enabled": false}
            }}"#,
        );
        assert_eq!(config.enabled_server_names(), vec!["alpha", "zeta"]);
    }

    #[test]
    fn missing_command_is_a_parse_error() {
        let result: std::result::Result<BridgeConfig, _> =
            serde_json::from_str(r#"{"servers": {"bad": {}}}"#);
        assert!(result.is_err());
    }
}
