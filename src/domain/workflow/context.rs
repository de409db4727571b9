//! Execution context and variable resolution
//!
//! The context is private to one job execution. It holds the request text and
//! the structured output of every block that has finished so far, and resolves
//! the inputs a block declares against them.

use std::collections::HashMap;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;

use super::entity::{Block, InputSource};
use super::error::WorkflowError;

/// Variable name -> rendered value
pub type ResolvedVariables = HashMap<String, String>;

/// A `block_output` field path that did not resolve and was bound to ""
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolutionWarning {
    pub block: String,
    pub input: String,
    pub source: String,
    pub field: String,
}

impl ResolutionWarning {
    pub fn message(&self) -> String {
        format!(
            "Block '{}' input '{}': field '{}' not present in output of '{}', using empty value",
            self.block, self.input, self.field, self.source
        )
    }
}

/// Running state of one workflow execution
#[derive(Debug, Clone)]
pub struct ExecutionContext {
    request_text: String,

    /// Block outputs in completion order
    outputs: IndexMap<String, Value>,

    warnings: Vec<ResolutionWarning>,
}

impl ExecutionContext {
    pub fn new(request_text: impl Into<String>) -> Self {
        Self {
            request_text: request_text.into(),
            outputs: IndexMap::new(),
            warnings: Vec::new(),
        }
    }

    pub fn request_text(&self) -> &str {
        &self.request_text
    }

    pub fn outputs(&self) -> &IndexMap<String, Value> {
        &self.outputs
    }

    pub fn warnings(&self) -> &[ResolutionWarning] {
        &self.warnings
    }

    /// Record the output of a finished block
    pub fn set_output(&mut self, block: impl Into<String>, output: Value) {
        self.outputs.insert(block.into(), output);
    }

    pub fn get_output(&self, block: &str) -> Option<&Value> {
        self.outputs.get(block)
    }

    /// Consume the context, keeping only what is persisted
    pub fn into_parts(self) -> (IndexMap<String, Value>, Vec<ResolutionWarning>) {
        (self.outputs, self.warnings)
    }

    /// Resolve every input `block` declares.
    ///
    /// A missing field in an existing output binds to an empty string and is
    /// recorded as a warning. A source block that has not run yet is an error.
    pub fn resolve_inputs(&mut self, block: &Block) -> Result<ResolvedVariables, WorkflowError> {
        let mut resolved = ResolvedVariables::with_capacity(block.inputs().len());

        for input in block.inputs() {
            let value = match input.source() {
                InputSource::RequestText => self.request_text.clone(),
                InputSource::BlockOutput { block: source, field } => {
                    let output = self.outputs.get(source).ok_or_else(|| {
                        WorkflowError::variable_resolution(format!(
                            "Block '{}' input '{}' needs output of '{}', which has not run",
                            block.name(),
                            input.name(),
                            source
                        ))
                    })?;

                    match field {
                        None => value_to_string(output),
                        Some(path) => match get_nested_field(output, path) {
                            Some(v) => value_to_string(v),
                            None => {
                                let warning = ResolutionWarning {
                                    block: block.name().to_string(),
                                    input: input.name().to_string(),
                                    source: source.clone(),
                                    field: path.clone(),
                                };
                                warn!(
                                    block = %warning.block,
                                    input = %warning.input,
                                    source = %warning.source,
                                    field = %warning.field,
                                    "Block output field missing, using empty value"
                                );
                                self.warnings.push(warning);
                                String::new()
                            }
                        },
                    }
                }
            };

            resolved.insert(input.name().to_string(), value);
        }

        Ok(resolved)
    }
}

/// Get a nested field from a JSON value using dot notation
/// (`result.items.0.name`)
pub fn get_nested_field<'a>(value: &'a Value, path: &str) -> Option<&'a Value> {
    let mut current = value;

    for part in path.split('.') {
        match current {
            Value::Object(obj) => {
                current = obj.get(part)?;
            }
            Value::Array(arr) => {
                let index: usize = part.parse().ok()?;
                current = arr.get(index)?;
            }
            _ => return None,
        }
    }

    Some(current)
}

/// Render a JSON value for prompt substitution
pub fn value_to_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),

        // For arrays and objects, use JSON representation
        _ => serde_json::to_string(value).unwrap_or_default(),
    }
}
