pub mod triage_config;

pub use triage_config::{
    configure_config_routes, ConfigStore, InMemoryConfigStore, TriageConfig, TriageConfigUpdate,
};

use std::collections::HashMap;
use std::time::Duration;

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub queue: QueueConfig,
    pub follow_up: FollowUpConfig,
    pub llm: LlmConfig,
    pub seed_kb: bool,
}

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Clone, Debug)]
pub struct QueueConfig {
    /// Unset means no queue infrastructure; triage falls back to immediate dispatch.
    pub redis_url: Option<String>,
    pub queue_key: String,
    pub workers: usize,
    pub immediate_delay: Duration,
}

#[derive(Clone, Debug)]
pub struct FollowUpConfig {
    pub delay: Duration,
    pub poll_interval: Duration,
}

#[derive(Clone, Debug)]
pub struct LlmConfig {
    /// Deterministic keyword classifier and template drafter when true.
    pub stub_mode: bool,
    pub url: Option<String>,
    pub api_key: String,
    pub model: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self::from_map(&HashMap::new())
    }
}

impl AppConfig {
    pub fn from_env() -> Result<Self, anyhow::Error> {
        let vars: HashMap<String, String> = std::env::vars().collect();
        Ok(Self::from_map(&vars))
    }

    pub fn from_map(vars: &HashMap<String, String>) -> Self {
        let get_str = |key: &str, default: &str| -> String {
            vars.get(key)
                .cloned()
                .unwrap_or_else(|| default.to_string())
        };
        let get_opt = |key: &str| -> Option<String> {
            vars.get(key).filter(|v| !v.trim().is_empty()).cloned()
        };
        let get_u64 = |key: &str, default: u64| -> u64 {
            vars.get(key)
                .and_then(|v| v.parse().ok())
                .unwrap_or(default)
        };
        let get_bool = |key: &str, default: bool| -> bool {
            vars.get(key)
                .map(|v| matches!(v.to_lowercase().as_str(), "1" | "true" | "yes" | "on"))
                .unwrap_or(default)
        };

        AppConfig {
            server: ServerConfig {
                host: get_str("SERVER_HOST", "0.0.0.0"),
                port: u16::try_from(get_u64("SERVER_PORT", 5000)).unwrap_or(5000),
            },
            queue: QueueConfig {
                redis_url: get_opt("REDIS_URL"),
                queue_key: get_str("TRIAGE_QUEUE_KEY", "triage:jobs"),
                workers: get_u64("TRIAGE_WORKERS", 4).max(1) as usize,
                immediate_delay: Duration::from_millis(get_u64("TRIAGE_IMMEDIATE_DELAY_MS", 100)),
            },
            follow_up: FollowUpConfig {
                delay: Duration::from_secs(get_u64("FOLLOW_UP_DELAY_HOURS", 24) * 60 * 60),
                poll_interval: Duration::from_secs(get_u64("FOLLOW_UP_POLL_SECS", 60).max(1)),
            },
            llm: LlmConfig {
                stub_mode: get_bool("STUB_MODE", true),
                url: get_opt("LLM_URL"),
                api_key: get_str("LLM_API_KEY", ""),
                model: get_str("LLM_MODEL", "gpt-4o-mini"),
            },
            seed_kb: get_bool("SEED_KB", true),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_without_env() {
        let config = AppConfig::default();
        assert_eq!(config.server.port, 5000);
        assert!(config.queue.redis_url.is_none());
        assert_eq!(config.queue.workers, 4);
        assert_eq!(config.queue.immediate_delay, Duration::from_millis(100));
        assert_eq!(config.follow_up.delay, Duration::from_secs(24 * 3600));
        assert!(config.llm.stub_mode);
    }

    #[test]
    fn test_overrides_and_bad_values() {
        let vars: HashMap<String, String> = [
            ("SERVER_PORT", "not-a-port"),
            ("REDIS_URL", "redis://127.0.0.1/"),
            ("TRIAGE_WORKERS", "0"),
            ("STUB_MODE", "false"),
            ("FOLLOW_UP_DELAY_HOURS", "2"),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();

        let config = AppConfig::from_map(&vars);
        assert_eq!(config.server.port, 5000);
        assert_eq!(config.queue.redis_url.as_deref(), Some("redis://127.0.0.1/"));
        assert_eq!(config.queue.workers, 1);
        assert!(!config.llm.stub_mode);
        assert_eq!(config.follow_up.delay, Duration::from_secs(7200));
    }
}
