use serde_json::{Map, Value};

use crate::core::errors::PipelineError;

pub fn validate_config(config: &Value) -> Result<(), PipelineError> {
    let root = config
        .as_object()
        .ok_or_else(|| config_type_error("root", "object"))?;

    if let Some(embedding) = expect_optional_object(root, "embedding")? {
        validate_optional_string_field(embedding, "embedding.provider", "provider")?;

        if let Some(local) = expect_optional_object(embedding, "local")? {
            validate_optional_string_field(local, "embedding.local.base_url", "base_url")?;
            validate_optional_string_field(local, "embedding.local.model", "model")?;
            validate_optional_string_field(local, "embedding.local.query_prefix", "query_prefix")?;
            validate_optional_string_field(
                local,
                "embedding.local.document_prefix",
                "document_prefix",
            )?;
            if !matches!(local.get("dimension"), Some(Value::Null)) {
                validate_u64_field(local, "embedding.local.dimension", "dimension", 1, 65_536)?;
            }
        }
        if let Some(lite) = expect_optional_object(embedding, "lite")? {
            validate_optional_string_field(lite, "embedding.lite.model", "model")?;
            validate_optional_string_field(lite, "embedding.lite.cache_dir", "cache_dir")?;
        }
        if let Some(openai) = expect_optional_object(embedding, "openai")? {
            validate_optional_string_field(openai, "embedding.openai.model", "model")?;
            validate_optional_string_field(openai, "embedding.openai.environment", "environment")?;
            validate_u64_field(openai, "embedding.openai.dimension", "dimension", 1, 65_536)?;
        }
        if let Some(gemini) = expect_optional_object(embedding, "gemini")? {
            validate_optional_string_field(gemini, "embedding.gemini.model", "model")?;
            validate_u64_field(gemini, "embedding.gemini.dimension", "dimension", 1, 65_536)?;
        }
    }

    if let Some(llm) = expect_optional_object(root, "llm")? {
        validate_optional_string_field(llm, "llm.provider", "provider")?;
        validate_u64_field(llm, "llm.max_tokens", "max_tokens", 1, 1_000_000)?;
        for provider in ["openai", "gemini", "local"] {
            if let Some(section) = expect_optional_object(llm, provider)? {
                validate_optional_string_field(
                    section,
                    &format!("llm.{}.model", provider),
                    "model",
                )?;
            }
        }
    }

    if let Some(retrieval) = expect_optional_object(root, "retrieval")? {
        validate_u64_field(retrieval, "retrieval.top_k", "top_k", 1, 1_000)?;
        validate_u64_field(
            retrieval,
            "retrieval.alternatives_per_example",
            "alternatives_per_example",
            0,
            100,
        )?;
        validate_bool_field(retrieval, "retrieval.deduplicate", "deduplicate")?;
    }

    if let Some(index) = expect_optional_object(root, "index")? {
        validate_required_string_field(index, "index.collection", "collection")?;
    }

    if let Some(http) = expect_optional_object(root, "http")? {
        validate_u64_field(
            http,
            "http.request_timeout_secs",
            "request_timeout_secs",
            1,
            86_400,
        )?;
        validate_u64_field(
            http,
            "http.directory_timeout_secs",
            "directory_timeout_secs",
            1,
            86_400,
        )?;
    }

    if let Some(directory) = expect_optional_object(root, "directory")? {
        validate_optional_string_field(directory, "directory.url", "url")?;
    }

    Ok(())
}

fn expect_optional_object<'a>(
    root: &'a Map<String, Value>,
    key: &str,
) -> Result<Option<&'a Map<String, Value>>, PipelineError> {
    match root.get(key) {
        Some(Value::Object(map)) => Ok(Some(map)),
        Some(_) => Err(config_type_error(key, "object")),
        None => Ok(None),
    }
}

fn validate_bool_field(
    section: &Map<String, Value>,
    path: &str,
    key: &str,
) -> Result<(), PipelineError> {
    let Some(value) = section.get(key) else {
        return Ok(());
    };
    if value.as_bool().is_some() {
        return Ok(());
    }
    Err(config_type_error(path, "boolean"))
}

fn validate_u64_field(
    section: &Map<String, Value>,
    path: &str,
    key: &str,
    min: u64,
    max: u64,
) -> Result<(), PipelineError> {
    let Some(value) = section.get(key) else {
        return Ok(());
    };
    let Some(number) = value.as_u64() else {
        return Err(config_type_error(path, "integer"));
    };
    if number < min || number > max {
        return Err(PipelineError::Configuration(format!(
            "Invalid config at '{}': must be between {} and {}",
            path, min, max
        )));
    }
    Ok(())
}

fn validate_required_string_field(
    section: &Map<String, Value>,
    path: &str,
    key: &str,
) -> Result<(), PipelineError> {
    let value = section.get(key).ok_or_else(|| {
        PipelineError::Configuration(format!("Invalid config at '{}': value is required", path))
    })?;
    let Some(text) = value.as_str() else {
        return Err(config_type_error(path, "string"));
    };
    if text.trim().is_empty() {
        return Err(PipelineError::Configuration(format!(
            "Invalid config at '{}': value cannot be empty",
            path
        )));
    }
    Ok(())
}

fn validate_optional_string_field(
    section: &Map<String, Value>,
    path: &str,
    key: &str,
) -> Result<(), PipelineError> {
    match section.get(key) {
        None | Some(Value::Null) | Some(Value::String(_)) => Ok(()),
        Some(_) => Err(config_type_error(path, "string")),
    }
}

fn config_type_error(path: &str, expected: &str) -> PipelineError {
    PipelineError::Configuration(format!(
        "Invalid config at '{}': expected {}",
        path, expected
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn accepts_empty_and_typical_configs() {
        validate_config(&json!({})).unwrap();
        validate_config(&json!({
            "embedding": { "provider": "local", "local": { "dimension": null } },
            "llm": { "provider": "openai", "max_tokens": 4096, "openai": { "model": "gpt-4o-global" } },
            "retrieval": { "top_k": 25, "alternatives_per_example": 0, "deduplicate": true },
            "index": { "collection": "few_shot_examples" }
        }))
        .unwrap();
    }

    #[test]
    fn rejects_wrong_types_and_ranges() {
        let err = validate_config(&json!({ "llm": "openai" })).unwrap_err();
        assert!(err.to_string().contains("'llm': expected object"));

        let err = validate_config(&json!({ "embedding": { "openai": { "dimension": 0 } } }))
            .unwrap_err();
        assert!(err.to_string().contains("embedding.openai.dimension"));

        let err = validate_config(&json!({ "embedding": { "lite": { "model": 384 } } }))
            .unwrap_err();
        assert!(err.to_string().contains("embedding.lite.model"));

        let err = validate_config(&json!({ "index": { "collection": "  " } })).unwrap_err();
        assert!(err.to_string().contains("cannot be empty"));

        let err = validate_config(&json!({ "retrieval": { "deduplicate": "yes" } }))
            .unwrap_err();
        assert!(err.to_string().contains("expected boolean"));
    }
}
