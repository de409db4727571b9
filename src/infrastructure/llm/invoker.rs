//! LLM invocation with timeout, retry and output validation

use std::sync::Arc;
use std::time::{Duration, Instant};

use jsonschema::{Draft, JSONSchema};
use serde_json::{json, Value};
use tokio::time::timeout;
use tracing::{debug, warn};

use crate::domain::workflow::{CompiledPrompt, WorkflowError};
use crate::domain::{LlmProvider, LlmRequest, LlmResponseFormat, RetryPolicy, Usage};
use crate::infrastructure::observability::record_block_invocation;

/// Timeout and retry settings for LLM calls
#[derive(Debug, Clone)]
pub struct LlmInvokerConfig {
    /// Applied to each call separately
    pub call_timeout: Duration,
    pub retry: RetryPolicy,
}

impl Default for LlmInvokerConfig {
    fn default() -> Self {
        Self {
            call_timeout: Duration::from_secs(60),
            retry: RetryPolicy::default(),
        }
    }
}

/// Structured result of one block's LLM call
#[derive(Debug, Clone)]
pub struct Invocation {
    pub output: Value,
    pub model: String,
    pub usage: Usage,
    /// Wall-clock time across all attempts
    pub duration: Duration,
    pub attempts: u32,
}

/// Sends compiled prompts to the LLM service
#[derive(Debug, Clone)]
pub struct LlmInvoker {
    provider: Arc<dyn LlmProvider>,
    config: LlmInvokerConfig,
}

impl LlmInvoker {
    pub fn new(provider: Arc<dyn LlmProvider>, config: LlmInvokerConfig) -> Self {
        Self { provider, config }
    }

    pub fn config(&self) -> &LlmInvokerConfig {
        &self.config
    }

    /// Call the LLM for `compiled`, retrying transient failures.
    ///
    /// Timeouts and `Unavailable` errors are retried with backoff; permanent
    /// provider errors and schema violations fail immediately.
    pub async fn invoke(&self, compiled: &CompiledPrompt) -> Result<Invocation, WorkflowError> {
        let request = build_request(compiled);
        let max_attempts = self.config.retry.attempts();
        let started = Instant::now();
        let mut last_error = String::new();

        for attempt in 1..=max_attempts {
            let call = self.provider.chat(&compiled.model, request.clone());

            match timeout(self.config.call_timeout, call).await {
                Ok(Ok(response)) => {
                    let duration = started.elapsed();
                    let usage = response.usage.clone().unwrap_or_default();
                    record_block_invocation(
                        &compiled.model,
                        true,
                        duration,
                        Some(u64::from(usage.total_tokens)),
                    );

                    if response.is_truncated() {
                        warn!(
                            block = %compiled.block,
                            model = %compiled.model,
                            "LLM output stopped at the token limit"
                        );
                    }

                    let output = parse_output(
                        &compiled.block,
                        response.content(),
                        compiled.output_schema.as_ref(),
                    )?;

                    debug!(
                        block = %compiled.block,
                        model = %compiled.model,
                        attempt,
                        tokens = usage.total_tokens,
                        "LLM call succeeded"
                    );

                    return Ok(Invocation {
                        output,
                        model: compiled.model.clone(),
                        usage,
                        duration,
                        attempts: attempt,
                    });
                }
                Ok(Err(err)) if err.is_transient() => {
                    last_error = err.to_string();
                }
                Ok(Err(err)) => {
                    record_block_invocation(&compiled.model, false, started.elapsed(), None);
                    return Err(WorkflowError::invocation(
                        &compiled.block,
                        attempt,
                        err.to_string(),
                    ));
                }
                Err(_) => {
                    last_error = format!(
                        "timed out after {}ms",
                        self.config.call_timeout.as_millis()
                    );
                }
            }

            warn!(
                block = %compiled.block,
                model = %compiled.model,
                attempt,
                max_attempts,
                error = %last_error,
                "LLM call failed"
            );

            if attempt < max_attempts {
                tokio::time::sleep(self.config.retry.delay_after(attempt)).await;
            }
        }

        record_block_invocation(&compiled.model, false, started.elapsed(), None);
        Err(WorkflowError::invocation(
            &compiled.block,
            max_attempts,
            last_error,
        ))
    }
}

fn build_request(compiled: &CompiledPrompt) -> LlmRequest {
    let format = if compiled.output_schema.is_some() {
        LlmResponseFormat::JsonObject
    } else {
        LlmResponseFormat::Text
    };

    LlmRequest::builder()
        .user(compiled.prompt.clone())
        .parameters(&compiled.parameters)
        .response_format(format)
        .build()
}

/// Remove one surrounding Markdown code fence, if present
pub fn strip_code_fence(text: &str) -> &str {
    let trimmed = text.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let Some(body) = rest.strip_suffix("```") else {
        return trimmed;
    };
    // Drop the info string (`json`) on the opening line
    match body.find('\n') {
        Some(newline) => body[newline + 1..].trim(),
        None => body.trim(),
    }
}

/// Turn raw model text into the block's structured output.
///
/// With a schema the text must be JSON that validates. Without one, a JSON
/// object is kept as is and anything else becomes `{"content": text}`.
pub fn parse_output(
    block: &str,
    content: &str,
    schema: Option<&Value>,
) -> Result<Value, WorkflowError> {
    let body = strip_code_fence(content);

    let Some(schema) = schema else {
        return Ok(match serde_json::from_str::<Value>(body) {
            Ok(value @ Value::Object(_)) => value,
            _ => json!({ "content": content }),
        });
    };

    let value: Value = serde_json::from_str(body).map_err(|e| {
        WorkflowError::output_validation(block, format!("response is not valid JSON: {}", e))
    })?;

    let compiled = JSONSchema::options()
        .with_draft(Draft::Draft7)
        .compile(schema)
        .map_err(|e| WorkflowError::configuration(format!("Block '{}' has an invalid output schema: {}", block, e)))?;

    if let Err(errors) = compiled.validate(&value) {
        let messages: Vec<String> = errors
            .map(|e| {
                let path = e.instance_path.to_string();
                let path = if path.is_empty() { "/".to_string() } else { path };
                format!("{}: {}", path, e.to_string().replace('\n', " "))
            })
            .collect();
        return Err(WorkflowError::output_validation(block, messages.join("; ")));
    }

    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::llm::{MockLlmProvider, MockReply};
    use crate::domain::workflow::{FailureKind, ModelParameters};

    fn compiled(schema: Option<Value>) -> CompiledPrompt {
        CompiledPrompt {
            block: "summary".into(),
            prompt: "Summarize".into(),
            model: "gpt-4o-mini".into(),
            parameters: ModelParameters::default(),
            output_schema: schema,
        }
    }

    fn invoker(provider: Arc<MockLlmProvider>, attempts: u32, timeout_ms: u64) -> LlmInvoker {
        LlmInvoker::new(
            provider,
            LlmInvokerConfig {
                call_timeout: Duration::from_millis(timeout_ms),
                retry: RetryPolicy::new(attempts).with_initial_delay(1).with_max_delay(5),
            },
        )
    }

    fn summary_schema() -> Value {
        json!({
            "type": "object",
            "required": ["summary"],
            "properties": {"summary": {"type": "string"}}
        })
    }

    #[test]
    fn test_strip_code_fence() {
        assert_eq!(strip_code_fence("```json\n{\"a\":1}\n```"), "{\"a\":1}");
        assert_eq!(strip_code_fence("```\n[1]\n```"), "[1]");
        assert_eq!(strip_code_fence("  {\"a\":1} "), "{\"a\":1}");
        assert_eq!(strip_code_fence("```unterminated"), "```unterminated");
    }

    #[test]
    fn test_parse_output_without_schema() {
        assert_eq!(
            parse_output("b", "plain words", None).unwrap(),
            json!({"content": "plain words"})
        );
        assert_eq!(
            parse_output("b", "{\"k\": 1}", None).unwrap(),
            json!({"k": 1})
        );
        assert_eq!(
            parse_output("b", "[1, 2]", None).unwrap(),
            json!({"content": "[1, 2]"})
        );
    }

    #[test]
    fn test_parse_output_with_schema() {
        let schema = summary_schema();
        assert_eq!(
            parse_output("b", "```json\n{\"summary\": \"x\"}\n```", Some(&schema)).unwrap(),
            json!({"summary": "x"})
        );

        let err = parse_output("b", "{\"title\": \"x\"}", Some(&schema)).unwrap_err();
        assert_eq!(err.kind(), FailureKind::Validation);

        let err = parse_output("b", "not json", Some(&schema)).unwrap_err();
        assert!(err.to_string().contains("not valid JSON"));
    }

    #[tokio::test]
    async fn test_invoke_success() {
        let provider = Arc::new(MockLlmProvider::new("{\"summary\": \"short\"}"));
        let invocation = invoker(provider.clone(), 3, 1000)
            .invoke(&compiled(Some(summary_schema())))
            .await
            .unwrap();

        assert_eq!(invocation.output, json!({"summary": "short"}));
        assert_eq!(invocation.attempts, 1);
        assert_eq!(invocation.usage.total_tokens, 15);
        assert_eq!(provider.models(), vec!["gpt-4o-mini"]);
        assert_eq!(
            provider.requests()[0].response_format,
            LlmResponseFormat::JsonObject
        );
    }

    #[tokio::test]
    async fn test_transient_errors_are_retried() {
        let provider = Arc::new(MockLlmProvider::scripted(
            vec![
                MockReply::Unavailable("503".into()),
                MockReply::Unavailable("connection reset".into()),
            ],
            MockReply::Text("done".into()),
        ));

        let invocation = invoker(provider.clone(), 3, 1000)
            .invoke(&compiled(None))
            .await
            .unwrap();

        assert_eq!(invocation.attempts, 3);
        assert_eq!(invocation.output, json!({"content": "done"}));
        assert_eq!(provider.call_count(), 3);
    }

    #[tokio::test]
    async fn test_timeout_on_every_attempt_fails() {
        let provider = Arc::new(MockLlmProvider::scripted(
            vec![],
            MockReply::Delayed(Duration::from_millis(200), "late".into()),
        ));

        let err = invoker(provider.clone(), 2, 20)
            .invoke(&compiled(None))
            .await
            .unwrap_err();

        assert_eq!(err.kind(), FailureKind::Invocation);
        assert!(err.to_string().contains("after 2 attempt(s)"));
        assert!(err.to_string().contains("timed out"));
        assert_eq!(provider.call_count(), 2);
    }

    #[tokio::test]
    async fn test_permanent_error_not_retried() {
        let provider = Arc::new(MockLlmProvider::scripted(
            vec![MockReply::Failure("model not found".into())],
            MockReply::Text("never".into()),
        ));

        let err = invoker(provider.clone(), 3, 1000)
            .invoke(&compiled(None))
            .await
            .unwrap_err();

        assert_eq!(err.kind(), FailureKind::Invocation);
        assert_eq!(provider.call_count(), 1);
    }

    #[tokio::test]
    async fn test_schema_violation_not_retried() {
        let provider = Arc::new(MockLlmProvider::new("{\"wrong\": true}"));

        let err = invoker(provider.clone(), 3, 1000)
            .invoke(&compiled(Some(summary_schema())))
            .await
            .unwrap_err();

        assert_eq!(err.kind(), FailureKind::Validation);
        assert_eq!(provider.call_count(), 1);
    }
}
