//! `.pi/mcp-servers.json` config parsing (§6): one entry per preconfigured
//! server, with bit-exact validation — unique ids matching `^[A-Za-z0-9_-]+$`,
//! timeout clamped to `[1000, 300000]` ms.

use std::collections::HashSet;
use std::time::Duration;

use pi_runtime_core::RuntimeError;
use serde::Deserialize;

const MIN_TIMEOUT_MS: u64 = 1_000;
const MAX_TIMEOUT_MS: u64 = 300_000;
const DEFAULT_TIMEOUT_MS: u64 = 30_000;

fn default_timeout() -> u64 {
    DEFAULT_TIMEOUT_MS
}

/// One server entry from the config file.
#[derive(Debug, Clone, Deserialize)]
pub struct McpServerConfig {
    pub id: String,
    pub url: String,
    pub name: Option<String>,
    pub description: Option<String>,
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_timeout")]
    pub timeout: u64,
}

impl McpServerConfig {
    pub fn timeout_duration(&self) -> Duration {
        Duration::from_millis(self.timeout.clamp(MIN_TIMEOUT_MS, MAX_TIMEOUT_MS))
    }

    fn validate(&self) -> Result<(), RuntimeError> {
        if self.id.is_empty() || !self.id.chars().all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-') {
            return Err(RuntimeError::schema_violation(&[self.id.as_str()]));
        }
        if !(MIN_TIMEOUT_MS..=MAX_TIMEOUT_MS).contains(&self.timeout) {
            return Err(RuntimeError::schema_violation(&["timeout"]));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Deserialize)]
struct McpConfigFile {
    version: String,
    servers: Vec<McpServerConfig>,
}

/// Parses and validates `raw` per §6's bit-exact rules. A parse failure or a
/// validation failure (duplicate id, bad id shape, out-of-range timeout) falls
/// back to an empty config (§7: "config parse failure → C10 falls back to
/// empty config and reports warning") rather than failing the caller.
pub fn load(raw: &str) -> Vec<McpServerConfig> {
    match parse_strict(raw) {
        Ok(servers) => servers,
        Err(_err) => {
            #[cfg(feature = "tracing")]
            tracing::warn!(error = %_err, "mcp-servers.json invalid, falling back to empty config");
            Vec::new()
        }
    }
}

/// Parses and validates `raw`, returning every rejection reason instead of
/// silently discarding it.
pub fn parse_strict(raw: &str) -> Result<Vec<McpServerConfig>, RuntimeError> {
    let file: McpConfigFile = serde_json::from_str(raw).map_err(|_| RuntimeError::schema_violation(&["servers"]))?;

    if file.version != "1.0" {
        return Err(RuntimeError::schema_violation(&["version"]));
    }

    let mut seen = HashSet::new();
    for server in &file.servers {
        server.validate()?;
        if !seen.insert(server.id.clone()) {
            return Err(RuntimeError::schema_violation(&["id"]));
        }
    }

    Ok(file.servers)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_well_formed_config() {
        let raw = r#"{"version":"1.0","servers":[
            {"id":"fs","url":"stdio-command","enabled":true,"timeout":5000}
        ]}"#;
        let servers = parse_strict(raw).unwrap();
        assert_eq!(servers.len(), 1);
        assert_eq!(servers[0].id, "fs");
    }

    #[test]
    fn defaults_timeout_and_enabled() {
        let raw = r#"{"version":"1.0","servers":[{"id":"fs","url":"stdio-command"}]}"#;
        let servers = parse_strict(raw).unwrap();
        assert_eq!(servers[0].timeout, DEFAULT_TIMEOUT_MS);
        assert!(!servers[0].enabled);
    }

    #[test]
    fn rejects_duplicate_ids() {
        let raw = r#"{"version":"1.0","servers":[
            {"id":"fs","url":"a"},
            {"id":"fs","url":"b"}
        ]}"#;
        assert!(parse_strict(raw).is_err());
    }

    #[test]
    fn rejects_invalid_id_shape() {
        let raw = r#"{"version":"1.0","servers":[{"id":"bad id!","url":"a"}]}"#;
        assert!(parse_strict(raw).is_err());
    }

    #[test]
    fn rejects_out_of_range_timeout() {
        let raw = r#"{"version":"1.0","servers":[{"id":"fs","url":"a","timeout":500}]}"#;
        assert!(parse_strict(raw).is_err());
    }

    #[test]
    fn load_falls_back_to_empty_on_parse_failure() {
        assert!(load("not json").is_empty());
        assert!(load(r#"{"version":"1.0","servers":[{"id":"fs","url":"a"},{"id":"fs","url":"b"}]}"#).is_empty());
    }
}
