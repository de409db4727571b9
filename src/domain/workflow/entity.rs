//! Workflow domain entity

use std::fmt;

use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use super::error::WorkflowError;
use super::prompt::ModelParameters;

/// Maximum length for workflow IDs
pub const MAX_ID_LENGTH: usize = 50;

/// Regex pattern for valid workflow IDs: alphanumeric and hyphens
static ID_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[a-zA-Z0-9][a-zA-Z0-9-]*[a-zA-Z0-9]$|^[a-zA-Z0-9]$").unwrap());

/// Regex pattern for block and input names, which double as prompt placeholders
static NAME_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[a-zA-Z_][a-zA-Z0-9_-]*$").unwrap());

/// Validated workflow identifier
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct WorkflowId(String);

impl WorkflowId {
    /// Create a new validated workflow ID
    pub fn new(id: impl Into<String>) -> Result<Self, WorkflowError> {
        let id = id.into();
        validate_workflow_id(&id)?;
        Ok(Self(id))
    }

    /// Get the ID as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for WorkflowId {
    type Error = WorkflowError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<WorkflowId> for String {
    fn from(id: WorkflowId) -> Self {
        id.0
    }
}

impl fmt::Display for WorkflowId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl AsRef<str> for WorkflowId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Validate a workflow ID string
pub fn validate_workflow_id(id: &str) -> Result<(), WorkflowError> {
    if id.is_empty() {
        return Err(WorkflowError::configuration("Workflow ID cannot be empty"));
    }

    if id.len() > MAX_ID_LENGTH {
        return Err(WorkflowError::configuration(format!(
            "Workflow ID exceeds maximum length of {} characters",
            MAX_ID_LENGTH
        )));
    }

    if !ID_PATTERN.is_match(id) {
        return Err(WorkflowError::configuration(format!(
            "Invalid workflow ID '{}': must be alphanumeric with hyphens, start and end with alphanumeric",
            id
        )));
    }

    Ok(())
}

/// Check that a block or input name can be referenced from a template
pub fn is_valid_name(name: &str) -> bool {
    NAME_PATTERN.is_match(name)
}

/// Workflow lifecycle status
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowStatus {
    /// Blocks may still be edited; not triggerable
    #[default]
    Draft,
    /// Frozen and triggerable
    Active,
    /// Retired; neither editable nor triggerable
    Archived,
}

impl WorkflowStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Draft => "draft",
            Self::Active => "active",
            Self::Archived => "archived",
        }
    }
}

impl fmt::Display for WorkflowStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Built-in vs user-defined block. Does not change execution.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum BlockKind {
    Core,
    #[default]
    Custom,
}

/// Where a block input takes its value from
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum InputSource {
    /// The original request body
    RequestText,

    /// The output of an earlier block, optionally narrowed to a field path
    BlockOutput {
        block: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        field: Option<String>,
    },
}

/// A named variable consumed by a block
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct BlockInput {
    name: String,

    #[serde(flatten)]
    source: InputSource,
}

impl BlockInput {
    /// Bind `name` to the request text
    pub fn request_text(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            source: InputSource::RequestText,
        }
    }

    /// Bind `name` to the whole output of `block`
    pub fn block_output(name: impl Into<String>, block: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            source: InputSource::BlockOutput {
                block: block.into(),
                field: None,
            },
        }
    }

    /// Bind `name` to a field of `block`'s output
    pub fn block_field(
        name: impl Into<String>,
        block: impl Into<String>,
        field: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            source: InputSource::BlockOutput {
                block: block.into(),
                field: Some(field.into()),
            },
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn source(&self) -> &InputSource {
        &self.source
    }

    /// Name of the block this input depends on, if any
    pub fn source_block(&self) -> Option<&str> {
        match &self.source {
            InputSource::BlockOutput { block, .. } => Some(block),
            InputSource::RequestText => None,
        }
    }
}

/// One step of a workflow
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Block {
    /// Unique name within the workflow
    name: String,

    /// Execution position; lower runs first
    order_index: i32,

    /// Prompt template with `{variable}` placeholders
    template: String,

    #[serde(default)]
    kind: BlockKind,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    inputs: Vec<BlockInput>,

    /// JSON Schema the block's result must satisfy
    #[serde(default, skip_serializing_if = "Option::is_none")]
    output_schema: Option<serde_json::Value>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    model: Option<String>,

    #[serde(default, skip_serializing_if = "ModelParameters::is_empty")]
    parameters: ModelParameters,
}

impl Block {
    pub fn new(name: impl Into<String>, order_index: i32, template: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            order_index,
            template: template.into(),
            kind: BlockKind::default(),
            inputs: Vec::new(),
            output_schema: None,
            model: None,
            parameters: ModelParameters::default(),
        }
    }

    // Builder methods

    pub fn with_kind(mut self, kind: BlockKind) -> Self {
        self.kind = kind;
        self
    }

    pub fn with_input(mut self, input: BlockInput) -> Self {
        self.inputs.push(input);
        self
    }

    pub fn with_output_schema(mut self, schema: serde_json::Value) -> Self {
        self.output_schema = Some(schema);
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    pub fn with_parameters(mut self, parameters: ModelParameters) -> Self {
        self.parameters = parameters;
        self
    }

    // Getters

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn order_index(&self) -> i32 {
        self.order_index
    }

    pub fn template(&self) -> &str {
        &self.template
    }

    pub fn kind(&self) -> BlockKind {
        self.kind
    }

    pub fn inputs(&self) -> &[BlockInput] {
        &self.inputs
    }

    pub fn output_schema(&self) -> Option<&serde_json::Value> {
        self.output_schema.as_ref()
    }

    pub fn model(&self) -> Option<&str> {
        self.model.as_deref()
    }

    pub fn parameters(&self) -> &ModelParameters {
        &self.parameters
    }
}

/// A workflow definition
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Workflow {
    /// Unique workflow identifier
    id: WorkflowId,

    /// Human-readable name
    name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    description: Option<String>,

    #[serde(default)]
    status: WorkflowStatus,

    /// Blocks in declaration order; execution order comes from `order_index`
    #[serde(default)]
    blocks: Vec<Block>,

    /// Model used by blocks without their own override
    #[serde(default, skip_serializing_if = "Option::is_none")]
    default_model: Option<String>,

    /// Parameters layered between system defaults and block overrides
    #[serde(default, skip_serializing_if = "ModelParameters::is_empty")]
    default_parameters: ModelParameters,

    /// Definition version (increments when blocks change)
    #[serde(default = "default_version")]
    version: u32,

    #[serde(default = "Utc::now")]
    created_at: DateTime<Utc>,

    #[serde(default = "Utc::now")]
    updated_at: DateTime<Utc>,
}

fn default_version() -> u32 {
    1
}

impl Workflow {
    /// Create a new draft workflow
    pub fn new(id: WorkflowId, name: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id,
            name: name.into(),
            description: None,
            status: WorkflowStatus::Draft,
            blocks: Vec::new(),
            default_model: None,
            default_parameters: ModelParameters::default(),
            version: 1,
            created_at: now,
            updated_at: now,
        }
    }

    // Builder methods

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_block(mut self, block: Block) -> Self {
        self.blocks.push(block);
        self
    }

    pub fn with_blocks(mut self, blocks: Vec<Block>) -> Self {
        self.blocks = blocks;
        self
    }

    pub fn with_status(mut self, status: WorkflowStatus) -> Self {
        self.status = status;
        self
    }

    pub fn with_default_model(mut self, model: impl Into<String>) -> Self {
        self.default_model = Some(model.into());
        self
    }

    pub fn with_default_parameters(mut self, parameters: ModelParameters) -> Self {
        self.default_parameters = parameters;
        self
    }

    // Getters

    pub fn id(&self) -> &WorkflowId {
        &self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    pub fn status(&self) -> WorkflowStatus {
        self.status
    }

    pub fn blocks(&self) -> &[Block] {
        &self.blocks
    }

    pub fn default_model(&self) -> Option<&str> {
        self.default_model.as_deref()
    }

    pub fn default_parameters(&self) -> &ModelParameters {
        &self.default_parameters
    }

    pub fn version(&self) -> u32 {
        self.version
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    pub fn is_triggerable(&self) -> bool {
        self.status == WorkflowStatus::Active
    }

    /// Get a block by name
    pub fn get_block(&self, name: &str) -> Option<&Block> {
        self.blocks.iter().find(|b| b.name() == name)
    }

    // State changes

    /// Replace the block list. Only drafts are editable.
    pub fn set_blocks(&mut self, blocks: Vec<Block>) -> Result<(), WorkflowError> {
        if self.status != WorkflowStatus::Draft {
            return Err(WorkflowError::configuration(format!(
                "Workflow '{}' is {} and its blocks cannot be edited",
                self.id, self.status
            )));
        }
        self.blocks = blocks;
        self.increment_version();
        Ok(())
    }

    /// Move a draft workflow to active
    pub fn activate(&mut self) -> Result<(), WorkflowError> {
        if self.status != WorkflowStatus::Draft {
            return Err(WorkflowError::configuration(format!(
                "Workflow '{}' is {} and cannot be activated",
                self.id, self.status
            )));
        }
        self.status = WorkflowStatus::Active;
        self.touch();
        Ok(())
    }

    pub fn archive(&mut self) {
        self.status = WorkflowStatus::Archived;
        self.touch();
    }

    fn touch(&mut self) {
        self.updated_at = Utc::now();
    }

    fn increment_version(&mut self) {
        self.version += 1;
        self.touch();
    }
}
