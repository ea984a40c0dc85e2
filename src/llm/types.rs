use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }
}

/// Assistant text of an OpenAI-style chat completion body.
pub(crate) fn completion_text(payload: &Value) -> Option<String> {
    payload
        .get("choices")?
        .get(0)?
        .get("message")?
        .get("content")?
        .as_str()
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn completion_text_reads_first_choice() {
        let payload = json!({
            "choices": [{ "message": { "role": "assistant", "content": "{\"graphType\":\"Bar\"}" } }]
        });
        assert_eq!(
            completion_text(&payload).as_deref(),
            Some("{\"graphType\":\"Bar\"}")
        );
        assert_eq!(completion_text(&json!({ "choices": [] })), None);
    }
}
