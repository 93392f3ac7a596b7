//! Session configuration.
//!
//! Timeouts are enforced by the transport; the adapter never runs timers of
//! its own.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

pub const TIMEOUT_ENV: &str = "NETKIT_TIMEOUT_SECS";
pub const CONNECT_TIMEOUT_ENV: &str = "NETKIT_CONNECT_TIMEOUT_SECS";
pub const USER_AGENT_ENV: &str = "NETKIT_USER_AGENT";

/// Settings applied to every request sent through a `Session`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Whole-exchange timeout. `None` waits indefinitely.
    pub timeout: Option<Duration>,
    pub connect_timeout: Option<Duration>,
    /// Sent on every request unless the request sets the same header.
    pub default_headers: Vec<(String, String)>,
    pub user_agent: String,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            timeout: None,
            connect_timeout: None,
            default_headers: vec![
                ("Accept".to_string(), "*/*".to_string()),
                ("Accept-Language".to_string(), "en;q=1.0".to_string()),
            ],
            user_agent: default_user_agent(),
        }
    }
}

impl SessionConfig {
    /// Defaults overlaid with `NETKIT_*` environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        if let Some(secs) = lookup(TIMEOUT_ENV) {
            config.timeout = Some(parse_secs(TIMEOUT_ENV, secs)?);
        }
        if let Some(secs) = lookup(CONNECT_TIMEOUT_ENV) {
            config.connect_timeout = Some(parse_secs(CONNECT_TIMEOUT_ENV, secs)?);
        }
        if let Some(agent) = lookup(USER_AGENT_ENV) {
            config.user_agent = agent;
        }
        Ok(config)
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = Some(timeout);
        self
    }

    pub fn with_default_header(mut self, name: &str, value: &str) -> Self {
        self.default_headers
            .retain(|(key, _)| !key.eq_ignore_ascii_case(name));
        self.default_headers
            .push((name.to_string(), value.to_string()));
        self
    }

    pub fn with_user_agent(mut self, user_agent: &str) -> Self {
        self.user_agent = user_agent.to_string();
        self
    }
}

fn default_user_agent() -> String {
    format!("netkit/{}", env!("CARGO_PKG_VERSION"))
}

fn parse_secs(name: &'static str, value: String) -> Result<Duration, ConfigError> {
    value
        .trim()
        .parse::<u64>()
        .map(Duration::from_secs)
        .map_err(|_| ConfigError::InvalidEnv { name, value })
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| vars.get(name).cloned()
    }

    #[test]
    fn default_has_user_agent_and_no_timeouts() {
        let config = SessionConfig::default();
        assert!(config.user_agent.starts_with("netkit/"));
        assert!(config.timeout.is_none());
        assert!(config.connect_timeout.is_none());
        assert!(config
            .default_headers
            .iter()
            .any(|(name, _)| name == "Accept-Language"));
    }

    #[test]
    fn env_overrides_defaults() {
        let config = SessionConfig::from_lookup(lookup(&[
            (TIMEOUT_ENV, "30"),
            (CONNECT_TIMEOUT_ENV, " 5 "),
            (USER_AGENT_ENV, "tests/1.0"),
        ]))
        .unwrap();
        assert_eq!(config.timeout, Some(Duration::from_secs(30)));
        assert_eq!(config.connect_timeout, Some(Duration::from_secs(5)));
        assert_eq!(config.user_agent, "tests/1.0");
    }

    #[test]
    fn env_rejects_malformed_timeout() {
        let err = SessionConfig::from_lookup(lookup(&[(TIMEOUT_ENV, "soon")])).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidEnv { name, .. } if name == TIMEOUT_ENV));
    }

    #[test]
    fn default_header_replaces_same_name() {
        let config = SessionConfig::default().with_default_header("accept", "application/json");
        let accepts: Vec<_> = config
            .default_headers
            .iter()
            .filter(|(name, _)| name.eq_ignore_ascii_case("accept"))
            .collect();
        assert_eq!(accepts.len(), 1);
        assert_eq!(accepts[0].1, "application/json");
    }

    #[test]
    fn config_deserializes_with_missing_fields() {
        let config: SessionConfig =
            serde_json::from_str(r#"{"user_agent":"custom"}"#).unwrap();
        assert_eq!(config.user_agent, "custom");
        assert_eq!(config.default_headers, SessionConfig::default().default_headers);
    }
}
