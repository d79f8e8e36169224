use std::path::PathBuf;
use std::time::Duration;

use chatgpt::config::ChatGPTEngine;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{0} is not set")]
    Missing(&'static str),
    #[error("{name} has an invalid value {value:?}: {reason}")]
    Invalid {
        name: &'static str,
        value: String,
        reason: &'static str,
    },
}

#[derive(Debug, Clone)]
pub struct Config {
    pub chatgpt_api_key: String,
    pub chatgpt_engine: ChatGPTEngine,
    pub chatgpt_timeout: Duration,
    pub data_dir: PathBuf,
    pub dialogue_db: String,
}

impl Config {
    /// Reads the process environment; call `dotenv()` first to pick up `.env`.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let chatgpt_api_key = lookup("CHATGPT_API_KEY")
            .filter(|key| !key.trim().is_empty())
            .ok_or(ConfigError::Missing("CHATGPT_API_KEY"))?;

        let chatgpt_engine = match lookup("CHATGPT_MODEL").as_deref() {
            None | Some("gpt-3.5-turbo") => ChatGPTEngine::Gpt35Turbo,
            Some("gpt-4") => ChatGPTEngine::Gpt4,
            Some("gpt-4-32k") => ChatGPTEngine::Gpt4_32k,
            Some(other) => {
                return Err(ConfigError::Invalid {
                    name: "CHATGPT_MODEL",
                    value: other.to_string(),
                    reason: "expected gpt-3.5-turbo, gpt-4 or gpt-4-32k",
                })
            }
        };

        let chatgpt_timeout = match lookup("CHATGPT_TIMEOUT_SECS") {
            None => Duration::from_secs(60),
            Some(raw) => match raw.trim().parse::<u64>() {
                Ok(secs) if secs > 0 => Duration::from_secs(secs),
                _ => {
                    return Err(ConfigError::Invalid {
                        name: "CHATGPT_TIMEOUT_SECS",
                        value: raw,
                        reason: "expected a positive number of seconds",
                    })
                }
            },
        };

        Ok(Self {
            chatgpt_api_key,
            chatgpt_engine,
            chatgpt_timeout,
            data_dir: lookup("STUDY_NOTES_DATA_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("lessons")),
            dialogue_db: lookup("STUDY_NOTES_DIALOGUE_DB")
                .unwrap_or_else(|| "db.sqlite".to_string()),
        })
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn config(vars: &[(&str, &str)]) -> Result<Config, ConfigError> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|name| vars.get(name).cloned())
    }

    #[test]
    fn defaults_apply_when_only_the_key_is_set() {
        let config = config(&[("CHATGPT_API_KEY", "sk-test")]).unwrap();

        assert_eq!(config.chatgpt_api_key, "sk-test");
        assert_eq!(config.chatgpt_timeout, Duration::from_secs(60));
        assert_eq!(config.data_dir, PathBuf::from("lessons"));
        assert_eq!(config.dialogue_db, "db.sqlite");
        assert!(matches!(config.chatgpt_engine, ChatGPTEngine::Gpt35Turbo));
    }

    #[test]
    fn api_key_is_required() {
        assert!(matches!(config(&[]), Err(ConfigError::Missing("CHATGPT_API_KEY"))));
        assert!(matches!(config(&[("CHATGPT_API_KEY", " ")]), Err(ConfigError::Missing(_))));
    }

    #[test]
    fn overrides_are_validated() {
        let config_ok = config(&[
            ("CHATGPT_API_KEY", "sk-test"),
            ("CHATGPT_MODEL", "gpt-4"),
            ("CHATGPT_TIMEOUT_SECS", "15"),
            ("STUDY_NOTES_DATA_DIR", "/var/lib/notes"),
        ])
        .unwrap();
        assert!(matches!(config_ok.chatgpt_engine, ChatGPTEngine::Gpt4));
        assert_eq!(config_ok.chatgpt_timeout, Duration::from_secs(15));
        assert_eq!(config_ok.data_dir, PathBuf::from("/var/lib/notes"));

        assert!(config(&[("CHATGPT_API_KEY", "k"), ("CHATGPT_TIMEOUT_SECS", "0")]).is_err());
        assert!(config(&[("CHATGPT_API_KEY", "k"), ("CHATGPT_MODEL", "llama")]).is_err());
    }
}
