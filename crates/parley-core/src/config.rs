use serde::{Deserialize, Serialize};

/// Root of `config.toml`.
#[derive(Deserialize, Serialize, Debug, Clone, Default, PartialEq)]
#[serde(default)]
pub struct RootConfig {
    pub engine: EngineConfig,
    pub logging: LoggingConfig,
}

/// Settings of the streaming session engine.
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct EngineConfig {
    /// Provider new sessions are created with.
    pub provider: String,
    pub model: Option<String>,
    pub system_prompt: Option<String>,
    pub project_id: Option<String>,
    /// User turn whose completion triggers title generation.
    pub title_generation_turn: usize,
    /// Title of a topic until one is generated.
    pub default_topic_title: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            provider: "claude".to_string(),
            model: None,
            system_prompt: None,
            project_id: None,
            title_generation_turn: 2,
            default_topic_title: "New Chat".to_string(),
        }
    }
}

#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct LoggingConfig {
    /// `EnvFilter` directive used when `RUST_LOG` is unset.
    pub level: String,
    /// Also write a daily rolling log file under the logs directory.
    pub file: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            file: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_config_fills_defaults() {
        let config: RootConfig = toml::from_str(
            r#"
            [engine]
            provider = "gemini"
            "#,
        )
        .unwrap();
        assert_eq!(config.engine.provider, "gemini");
        assert_eq!(config.engine.title_generation_turn, 2);
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_empty_config_is_default() {
        let config: RootConfig = toml::from_str("").unwrap();
        assert_eq!(config, RootConfig::default());
    }
}
