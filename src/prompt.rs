//! Prompt rendering.
//!
//! The template uses `{name}` placeholders; `{{` and `}}` stand for literal
//! braces so JSON snippets can live in the template. Unknown names are kept
//! as written.

use regex::{Captures, Regex};

use crate::core::errors::{PipelineError, PipelineResult};
use crate::rag::RetrievedExample;

const PLACEHOLDER_PATTERN: &str = r"\{\{|\}\}|\{([A-Za-z_][A-Za-z0-9_]*)\}";

pub struct PromptAssembler {
    template: String,
    schema: String,
    rules: Option<String>,
    placeholder: Regex,
}

impl PromptAssembler {
    pub fn new(
        template: impl Into<String>,
        schema: impl Into<String>,
        rules: Option<String>,
    ) -> PipelineResult<Self> {
        Ok(Self {
            template: template.into(),
            schema: schema.into(),
            rules,
            placeholder: Regex::new(PLACEHOLDER_PATTERN).map_err(PipelineError::config)?,
        })
    }

    pub fn assemble(
        &self,
        description: &str,
        headers: Option<&str>,
        examples: &[RetrievedExample],
    ) -> String {
        let few_shot = render_examples(examples);
        let headers = headers.unwrap_or_default();
        let rules = self.rules.as_deref().unwrap_or_default();

        self.placeholder
            .replace_all(&self.template, |caps: &Captures| {
                let whole = &caps[0];
                match whole {
                    "{{" => "{".to_string(),
                    "}}" => "}".to_string(),
                    _ => match &caps[1] {
                        "canvasxpress_config_english" => description.to_string(),
                        "headers_column_names" => headers.to_string(),
                        "schema_info" => self.schema.clone(),
                        "rules_info" => rules.to_string(),
                        "few_shot_examples" => few_shot.clone(),
                        _ => whole.to_string(),
                    },
                }
            })
            .into_owned()
    }
}

/// One line per example, in retrieval order.
pub fn render_examples(examples: &[RetrievedExample]) -> String {
    let mut out = String::new();
    for example in examples {
        let config = serde_json::to_string_pretty(&example.config)
            .unwrap_or_else(|_| example.config.to_string());
        out.push_str(&format!(
            "English Text: {}; Headers/Column Names: {}, Answer: {}\n",
            example.description, example.headers, config
        ));
    }
    out
}
