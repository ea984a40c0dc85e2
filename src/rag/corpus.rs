//! Example corpus and the static prompt material that ships with it.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::core::errors::{PipelineError, PipelineResult};

pub const EXAMPLES_FILE: &str = "few_shot_examples.json";
pub const SCHEMA_FILE: &str = "schema.txt";
pub const TEMPLATE_FILE: &str = "prompt_template.md";
pub const RULES_FILE: &str = "rules.txt";

/// A worked description → configuration pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Example {
    #[serde(deserialize_with = "id_from_string_or_number")]
    pub id: String,
    pub description: String,
    #[serde(default)]
    pub alt_descriptions: Vec<String>,
    pub config: Value,
    #[serde(default)]
    pub headers: Option<String>,
    #[serde(rename = "type", default)]
    pub kind: String,
}

impl Example {
    /// Primary description first, then every alternative phrasing.
    pub fn variants(&self) -> impl Iterator<Item = &str> {
        std::iter::once(self.description.as_str())
            .chain(self.alt_descriptions.iter().map(String::as_str))
    }
}

fn id_from_string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum RawId {
        Text(String),
        Number(serde_json::Number),
    }

    Ok(match RawId::deserialize(deserializer)? {
        RawId::Text(text) => text,
        RawId::Number(number) => number.to_string(),
    })
}

/// Everything read from the data directory at startup; immutable afterwards.
#[derive(Debug, Clone)]
pub struct Corpus {
    pub examples: Vec<Example>,
    pub schema: String,
    pub template: String,
    pub rules: Option<String>,
}

impl Corpus {
    pub fn load(data_dir: &Path) -> PipelineResult<Self> {
        let examples = load_examples(&data_dir.join(EXAMPLES_FILE))?;
        let schema = read_text(&data_dir.join(SCHEMA_FILE))?;
        let template = read_text(&data_dir.join(TEMPLATE_FILE))?;

        let rules_path = data_dir.join(RULES_FILE);
        let rules = if rules_path.exists() {
            Some(read_text(&rules_path)?)
        } else {
            None
        };

        let variants: usize = examples.iter().map(|e| 1 + e.alt_descriptions.len()).sum();
        tracing::info!(
            "Loaded {} examples ({} description variants) from {}",
            examples.len(),
            variants,
            data_dir.display()
        );

        Ok(Self {
            examples,
            schema,
            template,
            rules,
        })
    }
}

pub fn load_examples(path: &Path) -> PipelineResult<Vec<Example>> {
    let text = read_text(path)?;
    parse_examples(&text).map_err(|e| match e {
        PipelineError::Corpus(message) => {
            PipelineError::Corpus(format!("{}: {}", path.display(), message))
        }
        other => other,
    })
}

pub fn parse_examples(text: &str) -> PipelineResult<Vec<Example>> {
    let examples: Vec<Example> =
        serde_json::from_str(text).map_err(|e| PipelineError::Corpus(e.to_string()))?;

    let mut seen = std::collections::HashSet::new();
    for example in &examples {
        if !seen.insert(example.id.as_str()) {
            return Err(PipelineError::Corpus(format!(
                "duplicate example id '{}'",
                example.id
            )));
        }
    }
    Ok(examples)
}

fn read_text(path: &Path) -> PipelineResult<String> {
    fs::read_to_string(path).map_err(|e| {
        PipelineError::Io(std::io::Error::new(
            e.kind(),
            format!("{}: {}", path.display(), e),
        ))
    })
}
