//! Prompt compilation
//!
//! Turns a block template plus resolved variables into the final prompt and
//! settles which model and parameters the call uses. Precedence for both is
//! block override, then workflow default, then system default.

use std::collections::HashMap;

use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use serde::{Deserialize, Serialize};

use super::entity::{Block, Workflow};

/// `{name}` placeholder. JSON braces such as `{"a": 1}` never match.
static PLACEHOLDER_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\{([a-zA-Z_][a-zA-Z0-9_-]*)\}").unwrap());

/// Lead-in for the schema section appended to structured blocks
pub const SCHEMA_FRAMING: &str = "Respond only with JSON matching this schema:";

/// Generation parameters. Unset fields defer to the next layer down.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ModelParameters {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stop: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub presence_penalty: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub frequency_penalty: Option<f32>,
}

impl ModelParameters {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// Layer `self` on top of `base`; set keys in `self` win
    pub fn merged_over(&self, base: &ModelParameters) -> ModelParameters {
        ModelParameters {
            temperature: self.temperature.or(base.temperature),
            max_tokens: self.max_tokens.or(base.max_tokens),
            top_p: self.top_p.or(base.top_p),
            stop: self.stop.clone().or_else(|| base.stop.clone()),
            presence_penalty: self.presence_penalty.or(base.presence_penalty),
            frequency_penalty: self.frequency_penalty.or(base.frequency_penalty),
        }
    }
}

/// Everything needed to invoke the LLM for one block
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CompiledPrompt {
    pub block: String,
    pub prompt: String,
    pub model: String,
    pub parameters: ModelParameters,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_schema: Option<serde_json::Value>,
}

/// Compiles block prompts against system defaults
#[derive(Debug, Clone)]
pub struct PromptCompiler {
    default_model: String,
    default_parameters: ModelParameters,
}

impl PromptCompiler {
    pub fn new(default_model: impl Into<String>, default_parameters: ModelParameters) -> Self {
        Self {
            default_model: default_model.into(),
            default_parameters,
        }
    }

    pub fn default_model(&self) -> &str {
        &self.default_model
    }

    /// Build the final prompt for `block`.
    ///
    /// Unknown placeholders stay as literal text. The custom instruction goes
    /// after the template and before the schema framing, so the framing is
    /// always the last thing the model reads.
    pub fn compile(
        &self,
        workflow: &Workflow,
        block: &Block,
        variables: &HashMap<String, String>,
        custom_instruction: Option<&str>,
    ) -> CompiledPrompt {
        let mut prompt = render_template(block.template(), variables);

        if let Some(instruction) = custom_instruction.map(str::trim).filter(|s| !s.is_empty()) {
            prompt.push_str("\n\n");
            prompt.push_str(instruction);
        }

        if let Some(schema) = block.output_schema() {
            let pretty = serde_json::to_string_pretty(schema).unwrap_or_else(|_| schema.to_string());
            prompt.push_str("\n\n");
            prompt.push_str(SCHEMA_FRAMING);
            prompt.push('\n');
            prompt.push_str(&pretty);
        }

        let model = block
            .model()
            .or(workflow.default_model())
            .unwrap_or(&self.default_model)
            .to_string();

        let parameters = block
            .parameters()
            .merged_over(&workflow.default_parameters().merged_over(&self.default_parameters));

        CompiledPrompt {
            block: block.name().to_string(),
            prompt,
            model,
            parameters,
            output_schema: block.output_schema().cloned(),
        }
    }
}

/// Substitute `{name}` placeholders in a single pass; values are not rescanned
pub fn render_template(template: &str, variables: &HashMap<String, String>) -> String {
    PLACEHOLDER_PATTERN
        .replace_all(template, |caps: &Captures| match variables.get(&caps[1]) {
            Some(value) => value.clone(),
            None => caps[0].to_string(),
        })
        .into_owned()
}
