use serde::{Deserialize, Serialize};

/// Why the model stopped generating
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FinishReason {
    Stop,
    /// Token limit reached; structured output is probably cut off
    Length,
    ContentFilter,
    Other,
}

impl FinishReason {
    /// Map a provider's `finish_reason` string
    pub fn from_provider(reason: &str) -> Self {
        match reason {
            "stop" | "end_turn" => Self::Stop,
            "length" | "max_tokens" => Self::Length,
            "content_filter" => Self::ContentFilter,
            _ => Self::Other,
        }
    }
}

/// Tokens billed for one call
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

impl Usage {
    pub fn new(prompt_tokens: u32, completion_tokens: u32) -> Self {
        Self {
            prompt_tokens,
            completion_tokens,
            total_tokens: prompt_tokens.saturating_add(completion_tokens),
        }
    }
}

/// Raw answer to one block prompt
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmResponse {
    pub id: String,
    pub model: String,
    pub content: String,
    pub finish_reason: Option<FinishReason>,
    pub usage: Option<Usage>,
}

impl LlmResponse {
    pub fn new(id: impl Into<String>, model: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            model: model.into(),
            content: content.into(),
            finish_reason: None,
            usage: None,
        }
    }

    pub fn with_finish_reason(mut self, reason: FinishReason) -> Self {
        self.finish_reason = Some(reason);
        self
    }

    pub fn with_usage(mut self, usage: Usage) -> Self {
        self.usage = Some(usage);
        self
    }

    pub fn content(&self) -> &str {
        &self.content
    }

    /// Whether generation stopped at the token limit
    pub fn is_truncated(&self) -> bool {
        self.finish_reason == Some(FinishReason::Length)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_finish_reason_mapping() {
        assert_eq!(FinishReason::from_provider("stop"), FinishReason::Stop);
        assert_eq!(FinishReason::from_provider("length"), FinishReason::Length);
        assert_eq!(FinishReason::from_provider("tool_calls"), FinishReason::Other);
    }

    #[test]
    fn test_truncated_response() {
        let response = LlmResponse::new("id-1", "gpt-4o-mini", "{\"summary\": \"cut")
            .with_finish_reason(FinishReason::Length)
            .with_usage(Usage::new(3, 1));

        assert!(response.is_truncated());
        assert_eq!(response.usage.map(|u| u.total_tokens), Some(4));
        assert!(!LlmResponse::new("id-2", "m", "ok").is_truncated());
    }
}
