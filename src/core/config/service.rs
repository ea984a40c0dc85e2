use std::env;
use std::fs;
use std::path::Path;
use std::sync::Arc;

use serde_json::{Map, Value};

use super::paths::AppPaths;
use super::settings::Settings;
use super::validation::validate_config;
use crate::core::errors::{PipelineError, PipelineResult};

const REDACT_PLACEHOLDER: &str = "****";

const SENSITIVE_PATTERNS: [&str; 8] = [
    "api_key",
    "secret",
    "password",
    "_token",
    "token_",
    "credential",
    "access_key",
    "bearer",
];

const SENSITIVE_WHITELIST: [&str; 2] = ["max_tokens", "tokens"];

/// Environment variables that override a dotted configuration path.
const ENV_OVERRIDES: [(&str, &[&str]); 12] = [
    ("EMBEDDING_PROVIDER", &["embedding.provider"]),
    ("LLM_PROVIDER", &["llm.provider"]),
    ("LLM_MODEL", &["llm.openai.model"]),
    (
        "LLM_ENVIRONMENT",
        &["llm.openai.environment", "embedding.openai.environment"],
    ),
    ("AZURE_OPENAI_KEY", &["credentials.azure_api_key"]),
    (
        "AZURE_OPENAI_API_VERSION",
        &["llm.openai.api_version", "embedding.openai.api_version"],
    ),
    ("OPENAI_EMBEDDING_MODEL", &["embedding.openai.model"]),
    ("GOOGLE_API_KEY", &["credentials.google_api_key"]),
    ("GEMINI_MODEL", &["llm.gemini.model"]),
    ("GEMINI_EMBEDDING_MODEL", &["embedding.gemini.model"]),
    ("ALT_WORDING_COUNT", &["retrieval.alternatives_per_example"]),
    ("ENDPOINT_DIRECTORY_URL", &["directory.url"]),
];

#[derive(Clone)]
pub struct ConfigService {
    paths: Arc<AppPaths>,
}

impl ConfigService {
    pub fn new(paths: Arc<AppPaths>) -> Self {
        Self { paths }
    }

    pub fn paths(&self) -> &AppPaths {
        &self.paths
    }

    /// Read config.yml + secrets.yaml + process environment into `Settings`.
    pub fn load_settings(&self) -> PipelineResult<Settings> {
        self.load_settings_with(|key| env::var(key).ok())
    }

    pub fn load_settings_with<F>(&self, lookup: F) -> PipelineResult<Settings>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut merged = self.load_config();
        apply_env_overrides(&mut merged, lookup);
        validate_config(&merged)?;

        tracing::debug!(
            "Effective configuration: {}",
            redact_sensitive_values(&merged)
        );

        serde_json::from_value(merged).map_err(PipelineError::config)
    }

    pub fn load_config(&self) -> Value {
        let public_config = load_yaml_file(&self.paths.config_path);
        let secrets_config = load_yaml_file(&self.paths.secrets_path);
        deep_merge(&public_config, &secrets_config)
    }

    pub fn redact_sensitive_values(&self, value: &Value) -> Value {
        redact_sensitive_values(value)
    }
}

fn load_yaml_file(path: &Path) -> Value {
    if !path.exists() {
        return Value::Object(Map::new());
    }

    match fs::read_to_string(path) {
        Ok(contents) => match serde_yaml::from_str::<Value>(&contents) {
            Ok(value @ Value::Object(_)) => value,
            Ok(_) => Value::Object(Map::new()),
            Err(err) => {
                tracing::warn!("Ignoring unreadable config {}: {}", path.display(), err);
                Value::Object(Map::new())
            }
        },
        Err(_) => Value::Object(Map::new()),
    }
}

fn apply_env_overrides<F>(config: &mut Value, lookup: F)
where
    F: Fn(&str) -> Option<String>,
{
    for (var, targets) in ENV_OVERRIDES {
        let Some(raw) = lookup(var) else {
            continue;
        };
        let raw = raw.trim();
        if raw.is_empty() {
            continue;
        }
        let value = match var {
            // must reach validation as a number
            "ALT_WORDING_COUNT" => raw
                .parse::<u64>()
                .map(Value::from)
                .unwrap_or_else(|_| Value::String(raw.to_string())),
            name if name.ends_with("_PROVIDER") => Value::String(raw.to_lowercase()),
            _ => Value::String(raw.to_string()),
        };
        for target in targets.iter() {
            set_path(config, target, value.clone());
        }
    }
}

fn set_path(config: &mut Value, dotted: &str, value: Value) {
    let mut current = config;
    let mut parts = dotted.split('.').peekable();
    while let Some(part) = parts.next() {
        if !current.is_object() {
            *current = Value::Object(Map::new());
        }
        let Value::Object(map) = current else {
            return;
        };
        if parts.peek().is_none() {
            map.insert(part.to_string(), value);
            return;
        }
        current = map
            .entry(part.to_string())
            .or_insert_with(|| Value::Object(Map::new()));
    }
}

fn deep_merge(base: &Value, override_value: &Value) -> Value {
    match (base, override_value) {
        (Value::Object(base_map), Value::Object(override_map)) => {
            let mut merged: Map<String, Value> = base_map.clone();
            for (key, value) in override_map {
                let merged_value = match merged.get(key) {
                    Some(existing) => deep_merge(existing, value),
                    None => value.clone(),
                };
                merged.insert(key.clone(), merged_value);
            }
            Value::Object(merged)
        }
        _ => override_value.clone(),
    }
}

fn redact_sensitive_values(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut redacted = Map::new();
            for (key, val) in map {
                if is_sensitive_key(key) && !val.is_null() {
                    redacted.insert(key.clone(), Value::String(REDACT_PLACEHOLDER.to_string()));
                } else {
                    redacted.insert(key.clone(), redact_sensitive_values(val));
                }
            }
            Value::Object(redacted)
        }
        Value::Array(items) => Value::Array(items.iter().map(redact_sensitive_values).collect()),
        _ => value.clone(),
    }
}

fn is_sensitive_key(key: &str) -> bool {
    let key_lower = key.to_lowercase();
    if SENSITIVE_WHITELIST
        .iter()
        .any(|allowed| *allowed == key_lower)
    {
        return false;
    }
    SENSITIVE_PATTERNS
        .iter()
        .any(|pattern| key_lower.contains(pattern))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn service_in(dir: &Path) -> ConfigService {
        ConfigService::new(Arc::new(AppPaths::from_root(dir)))
    }

    #[test]
    fn deep_merge_merges_objects_and_overrides_scalars() {
        let base = json!({
            "llm": { "provider": "openai", "max_tokens": 4096 },
            "retrieval": { "top_k": 25 }
        });
        let override_value = json!({
            "llm": { "provider": "gemini" },
            "credentials": { "google_api_key": "g" }
        });

        let merged = deep_merge(&base, &override_value);

        assert_eq!(
            merged,
            json!({
                "llm": { "provider": "gemini", "max_tokens": 4096 },
                "retrieval": { "top_k": 25 },
                "credentials": { "google_api_key": "g" }
            })
        );
    }

    #[test]
    fn env_overrides_fan_out_to_every_target() {
        let mut config = json!({ "llm": { "openai": { "model": "gpt-4o-global" } } });
        apply_env_overrides(&mut config, |key| match key {
            "LLM_ENVIRONMENT" => Some("prod".to_string()),
            "ALT_WORDING_COUNT" => Some("5".to_string()),
            "LLM_PROVIDER" => Some("Gemini".to_string()),
            _ => None,
        });

        assert_eq!(config["llm"]["openai"]["environment"], "prod");
        assert_eq!(config["embedding"]["openai"]["environment"], "prod");
        assert_eq!(config["llm"]["openai"]["model"], "gpt-4o-global");
        assert_eq!(config["retrieval"]["alternatives_per_example"], 5);
        assert_eq!(config["llm"]["provider"], "gemini");
    }

    #[test]
    fn redact_sensitive_values_replaces_secrets_only() {
        let input = json!({
            "credentials": { "azure_api_key": "secret", "google_api_key": null },
            "llm": { "max_tokens": 42 }
        });

        let redacted = redact_sensitive_values(&input);

        assert_eq!(
            redacted,
            json!({
                "credentials": { "azure_api_key": "****", "google_api_key": null },
                "llm": { "max_tokens": 42 }
            })
        );
    }

    #[test]
    fn load_settings_merges_files_and_environment() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(
            dir.path().join("config.yml"),
            "embedding:\n  provider: lite\n  lite:\n    model: bge-small-en-v1.5\nretrieval:\n  top_k: 10\n",
        )
        .unwrap();
        fs::write(
            dir.path().join("secrets.yaml"),
            "credentials:\n  azure_api_key: from-file\n",
        )
        .unwrap();

        let settings = service_in(dir.path())
            .load_settings_with(|key| match key {
                "GOOGLE_API_KEY" => Some("from-env".to_string()),
                _ => None,
            })
            .unwrap();

        assert_eq!(settings.embedding.provider, "lite");
        assert_eq!(settings.embedding.lite.model, "bge-small-en-v1.5");
        assert_eq!(settings.embedding.lite.cache_dir, None);
        assert_eq!(settings.retrieval.top_k, 10);
        assert_eq!(settings.retrieval.alternatives_per_example, 3);
        assert_eq!(settings.credentials.azure_api_key.as_deref(), Some("from-file"));
        assert_eq!(settings.credentials.google_api_key.as_deref(), Some("from-env"));
        assert_eq!(settings.llm.provider, "openai");
    }

    #[test]
    fn load_settings_rejects_invalid_values() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("config.yml"), "retrieval:\n  top_k: 0\n").unwrap();

        let err = service_in(dir.path())
            .load_settings_with(|_| None)
            .unwrap_err();
        assert!(matches!(err, PipelineError::Configuration(_)));
        assert!(err.to_string().contains("retrieval.top_k"));
    }
}
