//! Endpoint directory for the Azure OpenAI proxy.
//!
//! The directory is a JSON document shaped
//! `{environment: {model: [{endpoint, model_version}, ...]}}`. It is fetched
//! once when a backend is built and then only read.

use std::collections::BTreeMap;
use std::time::Duration;

use rand::seq::IndexedRandom;
use serde::{Deserialize, Serialize};

use crate::core::errors::{PipelineError, PipelineResult};
use crate::http::build_client;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Endpoint {
    pub endpoint: String,
    #[serde(default)]
    pub model_version: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EndpointDirectory {
    environments: BTreeMap<String, BTreeMap<String, Vec<Endpoint>>>,
}

impl EndpointDirectory {
    /// Single attempt; a failed fetch is a hard `Discovery` error.
    pub async fn fetch(url: Option<&str>, timeout: Duration) -> PipelineResult<Self> {
        let url = url.filter(|u| !u.trim().is_empty()).ok_or_else(|| {
            PipelineError::Configuration(
                "directory.url (ENDPOINT_DIRECTORY_URL) must be set to use Azure OpenAI endpoints"
                    .to_string(),
            )
        })?;

        tracing::info!("Fetching endpoint directory from {}", url);
        let response = build_client(timeout)?
            .get(url)
            .send()
            .await
            .and_then(|res| res.error_for_status())
            .map_err(|e| {
                PipelineError::Discovery(format!("Failed to fetch endpoint directory: {}", e))
            })?;

        let directory: EndpointDirectory = response.json().await.map_err(|e| {
            PipelineError::Discovery(format!("Malformed endpoint directory: {}", e))
        })?;

        tracing::info!(
            "Endpoint directory loaded: {} environment(s)",
            directory.environments.len()
        );
        Ok(directory)
    }

    pub fn from_json(value: serde_json::Value) -> PipelineResult<Self> {
        serde_json::from_value(value)
            .map_err(|e| PipelineError::Discovery(format!("Malformed endpoint directory: {}", e)))
    }

    pub fn endpoints(&self, environment: &str, model: &str) -> &[Endpoint] {
        self.environments
            .get(environment)
            .and_then(|models| models.get(model))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Endpoints for `model` whose version tag contains `model_version`.
    pub fn eligible(&self, environment: &str, model: &str, model_version: &str) -> Vec<&Endpoint> {
        self.endpoints(environment, model)
            .iter()
            .filter(|entry| entry.model_version.contains(model_version))
            .collect()
    }

    /// First model name in `environment` accepted by `predicate`.
    pub fn find_model<P>(&self, environment: &str, predicate: P) -> Option<&str>
    where
        P: Fn(&str) -> bool,
    {
        self.environments.get(environment).and_then(|models| {
            models
                .iter()
                .find(|(name, endpoints)| predicate(name) && !endpoints.is_empty())
                .map(|(name, _)| name.as_str())
        })
    }
}

/// Uniform random pick; callers re-pick on every attempt.
pub fn choose_endpoint<'a>(candidates: &[&'a Endpoint]) -> Option<&'a Endpoint> {
    let mut rng = rand::rng();
    candidates.choose(&mut rng).copied()
}
