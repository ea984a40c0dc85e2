//! Recovery of one JSON object from free-form model output.
//!
//! Strategies run in order and the first candidate that parses to an object
//! wins. A candidate that fails to parse, or parses to something other than
//! an object, falls through to the next strategy.

use regex::Regex;
use serde_json::Value;

use crate::core::errors::{PipelineError, PipelineResult};

const EXCERPT_CHARS: usize = 200;

trait ExtractionStrategy {
    fn name(&self) -> &'static str;
    fn candidate<'a>(&self, text: &'a str) -> Option<&'a str>;
}

/// Leading object cut where brace depth returns to zero.
struct BalancedPrefix;

impl ExtractionStrategy for BalancedPrefix {
    fn name(&self) -> &'static str {
        "balanced-prefix"
    }

    fn candidate<'a>(&self, text: &'a str) -> Option<&'a str> {
        let trimmed = text.trim();
        if !trimmed.starts_with('{') {
            return None;
        }

        let mut depth = 0usize;
        let mut in_string = false;
        let mut escaped = false;
        for (idx, ch) in trimmed.char_indices() {
            if in_string {
                match ch {
                    _ if escaped => escaped = false,
                    '\\' => escaped = true,
                    '"' => in_string = false,
                    _ => {}
                }
                continue;
            }
            match ch {
                '"' => in_string = true,
                '{' => depth += 1,
                '}' => {
                    depth = depth.saturating_sub(1);
                    if depth == 0 {
                        return Some(&trimmed[..=idx]);
                    }
                }
                _ => {}
            }
        }
        None
    }
}

/// Body of a ``` fence, with or without a language tag.
struct FencedBlock {
    pattern: Regex,
}

impl ExtractionStrategy for FencedBlock {
    fn name(&self) -> &'static str {
        "fenced-block"
    }

    fn candidate<'a>(&self, text: &'a str) -> Option<&'a str> {
        self.pattern
            .captures(text)
            .and_then(|caps| caps.get(1))
            .map(|m| m.as_str())
    }
}

/// First brace span with at most one level of nesting.
struct ShallowBraces {
    pattern: Regex,
}

impl ExtractionStrategy for ShallowBraces {
    fn name(&self) -> &'static str {
        "shallow-braces"
    }

    fn candidate<'a>(&self, text: &'a str) -> Option<&'a str> {
        self.pattern.find(text).map(|m| m.as_str())
    }
}

/// Everything from the first `{` to the last `}`.
struct OuterBraces;

impl ExtractionStrategy for OuterBraces {
    fn name(&self) -> &'static str {
        "outer-braces"
    }

    fn candidate<'a>(&self, text: &'a str) -> Option<&'a str> {
        let start = text.find('{')?;
        let end = text.rfind('}')?;
        (end > start).then(|| &text[start..=end])
    }
}

pub struct ResponseExtractor {
    strategies: Vec<Box<dyn ExtractionStrategy + Send + Sync>>,
}

impl ResponseExtractor {
    pub fn new() -> PipelineResult<Self> {
        let fenced = Regex::new(r"```[A-Za-z0-9_+-]*[ \t]*\r?\n?\s*(\{[\s\S]*?\})\s*```")
            .map_err(PipelineError::config)?;
        let shallow =
            Regex::new(r"\{(?:[^{}]|\{[^{}]*\})*\}").map_err(PipelineError::config)?;

        Ok(Self {
            strategies: vec![
                Box::new(BalancedPrefix),
                Box::new(FencedBlock { pattern: fenced }),
                Box::new(ShallowBraces { pattern: shallow }),
                Box::new(OuterBraces),
            ],
        })
    }

    pub fn extract(&self, raw: &str) -> PipelineResult<Value> {
        let mut last_parse_error: Option<String> = None;

        for strategy in &self.strategies {
            let Some(candidate) = strategy.candidate(raw) else {
                continue;
            };
            match serde_json::from_str::<Value>(candidate) {
                Ok(value @ Value::Object(_)) => {
                    tracing::debug!("Extracted configuration via {}", strategy.name());
                    return Ok(value);
                }
                Ok(other) => {
                    last_parse_error = Some(format!(
                        "{} candidate is {} rather than an object",
                        strategy.name(),
                        json_kind(&other)
                    ));
                }
                Err(e) => {
                    last_parse_error = Some(format!("{}: {}", strategy.name(), e));
                }
            }
        }

        let excerpt = excerpt(raw);
        match last_parse_error {
            Some(message) => Err(PipelineError::Parse { message, excerpt }),
            None => Err(PipelineError::Extraction { excerpt }),
        }
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

fn excerpt(raw: &str) -> String {
    raw.chars().take(EXCERPT_CHARS).collect()
}
