//! Provider configuration.
//!
//! Credentials, endpoints and tuning knobs are plain data handed to the
//! adapters; nothing here interprets them beyond filling defaults. Values come
//! from an optional JSON file and are then overlaid with environment variables.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::errors::{FightError, FightResult};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FightConfig {
    pub openai: RemoteProviderConfig,
    pub anthropic: RemoteProviderConfig,
    pub local: LocalProviderConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RemoteProviderConfig {
    pub api_key: Option<String>,
    /// OpenAI organisation scoping; ignored by other vendors.
    pub org_id: Option<String>,
    pub base_url: Option<String>,
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
    pub timeout_secs: u64,
}

impl Default for RemoteProviderConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            org_id: None,
            base_url: None,
            temperature: None,
            max_tokens: None,
            timeout_secs: 60,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LocalProviderConfig {
    /// Base URL of the local inference server.
    pub endpoint: String,
    pub model_name: String,
    /// Location of the weights on disk; checked before the first load.
    pub model_path: Option<String>,
    pub context_size: u32,
    pub batch_size: u32,
    pub temperature: f32,
    pub top_p: f32,
    pub max_tokens: u32,
    pub stop: Vec<String>,
    pub timeout_secs: u64,
}

impl Default for LocalProviderConfig {
    fn default() -> Self {
        Self {
            endpoint: "http://127.0.0.1:11434".to_string(),
            model_name: "LLaMA-3.2-11B-Vision-Instruct".to_string(),
            model_path: None,
            context_size: 2048,
            batch_size: 512,
            temperature: 0.7,
            top_p: 0.9,
            max_tokens: 500,
            stop: vec!["\n\n".to_string()],
            timeout_secs: 300,
        }
    }
}

impl FightConfig {
    /// Defaults overlaid with the process environment.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        config.overlay_env_with(|key| std::env::var(key).ok());
        config
    }

    /// Read a JSON config file, then overlay the process environment.
    pub fn load(path: &Path) -> FightResult<Self> {
        let raw = std::fs::read_to_string(path)
            .map_err(|err| FightError::Config(format!("{}: {err}", path.display())))?;
        let mut config = Self::from_json(&raw)?;
        config.overlay_env_with(|key| std::env::var(key).ok());
        Ok(config)
    }

    pub fn from_json(raw: &str) -> FightResult<Self> {
        serde_json::from_str(raw).map_err(|err| FightError::Config(err.to_string()))
    }

    /// Apply environment-style overrides through `lookup`. Empty values are ignored.
    pub fn overlay_env_with<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(v) = get("OPENAI_API_KEY") {
            self.openai.api_key = Some(v);
        }
        if let Some(v) = get("OPENAI_ORG_ID") {
            self.openai.org_id = Some(v);
        }
        if let Some(v) = get("OPENAI_BASE_URL") {
            self.openai.base_url = Some(v);
        }
        if let Some(v) = get("ANTHROPIC_API_KEY") {
            self.anthropic.api_key = Some(v);
        }
        if let Some(v) = get("ANTHROPIC_BASE_URL") {
            self.anthropic.base_url = Some(v);
        }
        if let Some(v) = get("LLAMA_ENDPOINT") {
            self.local.endpoint = v;
        }
        if let Some(v) = get("LLAMA_MODEL") {
            self.local.model_name = v;
        }
        if let Some(v) = get("LLAMA_MODEL_PATH") {
            self.local.model_path = Some(v);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn partial_json_keeps_defaults() {
        let config = FightConfig::from_json(
            r#"{ "openai": { "api_key": "sk-file" }, "local": { "context_size": 4096 } }"#,
        )
        .unwrap();
        assert_eq!(config.openai.api_key.as_deref(), Some("sk-file"));
        assert_eq!(config.openai.timeout_secs, 60);
        assert_eq!(config.local.context_size, 4096);
        assert_eq!(config.local.batch_size, 512);
        assert_eq!(config.local.stop, vec!["\n\n".to_string()]);
    }

    #[test]
    fn environment_overrides_file_values() {
        let mut config =
            FightConfig::from_json(r#"{ "openai": { "api_key": "sk-file" } }"#).unwrap();
        let env: HashMap<&str, &str> = HashMap::from([
            ("OPENAI_API_KEY", "sk-env"),
            ("OPENAI_ORG_ID", "org-1"),
            ("ANTHROPIC_API_KEY", ""),
            ("LLAMA_MODEL_PATH", "/models/llama"),
        ]);
        config.overlay_env_with(|key| env.get(key).map(|v| v.to_string()));
        assert_eq!(config.openai.api_key.as_deref(), Some("sk-env"));
        assert_eq!(config.openai.org_id.as_deref(), Some("org-1"));
        assert_eq!(config.anthropic.api_key, None);
        assert_eq!(config.local.model_path.as_deref(), Some("/models/llama"));
    }

    #[test]
    fn malformed_json_is_a_config_error() {
        let err = FightConfig::from_json("{ nope").unwrap_err();
        assert_eq!(err.code(), "CFG-1000");
    }

    #[test]
    fn load_reads_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("fight.json");
        std::fs::write(&path, r#"{ "local": { "model_name": "tiny" } }"#).unwrap();
        let config = FightConfig::load(&path).unwrap();
        // LLAMA_MODEL may be set in the environment running the tests.
        if std::env::var("LLAMA_MODEL").is_err() {
            assert_eq!(config.local.model_name, "tiny");
        }
        assert!(FightConfig::load(&dir.path().join("missing.json")).is_err());
    }
}
