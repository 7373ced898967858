//! Typed content returned by successful tool invocations

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Content {
    Text { text: String },
}

impl Content {
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text { text: text.into() }
    }
}

/// Ordered content items produced by one tool call, serialized as `{ "content": [...] }`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvocationResult {
    pub content: Vec<Content>,
}

impl InvocationResult {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            content: vec![Content::text(text)],
        }
    }

    pub fn push(mut self, content: Content) -> Self {
        self.content.push(content);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn text_content_uses_type_tag() {
        let result = InvocationResult::text("Tool echo: hi").push(Content::text("second"));

        assert_eq!(
            serde_json::to_value(&result).expect("serializable"),
            json!({
                "content": [
                    { "type": "text", "text": "Tool echo: hi" },
                    { "type": "text", "text": "second" }
                ]
            })
        );
    }
}
