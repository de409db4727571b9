//! Processing request entity
//!
//! Requests are owned by the request-management collaborator. The engine reads
//! their text and any stored custom instructions.

use std::collections::HashMap;
use std::fmt;

use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::domain::DomainError;

/// Maximum length for request IDs
pub const MAX_ID_LENGTH: usize = 100;

static ID_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[a-zA-Z0-9][a-zA-Z0-9_-]*$").unwrap());

/// Validated request identifier
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct RequestId(String);

impl RequestId {
    pub fn new(id: impl Into<String>) -> Result<Self, DomainError> {
        let id = id.into();
        if id.is_empty() || id.len() > MAX_ID_LENGTH || !ID_PATTERN.is_match(&id) {
            return Err(DomainError::invalid_id(format!(
                "Invalid request ID '{}': must be 1-{} alphanumeric, '-' or '_' characters",
                id, MAX_ID_LENGTH
            )));
        }
        Ok(Self(id))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for RequestId {
    type Error = DomainError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<RequestId> for String {
    fn from(id: RequestId) -> Self {
        id.0
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl AsRef<str> for RequestId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Free text appended to one block's prompt for this request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomInstruction {
    pub block: String,
    pub text: String,
    #[serde(default = "default_active")]
    pub active: bool,
}

fn default_active() -> bool {
    true
}

/// A user submission to be processed by workflows
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessingRequest {
    id: RequestId,
    text: String,
    #[serde(default)]
    custom_instructions: Vec<CustomInstruction>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl ProcessingRequest {
    pub fn new(id: RequestId, text: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id,
            text: text.into(),
            custom_instructions: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn with_instruction(mut self, block: impl Into<String>, text: impl Into<String>) -> Self {
        self.set_instruction(block, text);
        self
    }

    pub fn id(&self) -> &RequestId {
        &self.id
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn custom_instructions(&self) -> &[CustomInstruction] {
        &self.custom_instructions
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    pub fn set_text(&mut self, text: impl Into<String>) {
        self.text = text.into();
        self.updated_at = Utc::now();
    }

    /// Store an active instruction for `block`, deactivating any previous one
    pub fn set_instruction(&mut self, block: impl Into<String>, text: impl Into<String>) {
        let block = block.into();
        for existing in self.custom_instructions.iter_mut().filter(|i| i.block == block) {
            existing.active = false;
        }
        self.custom_instructions.push(CustomInstruction {
            block,
            text: text.into(),
            active: true,
        });
        self.updated_at = Utc::now();
    }

    /// Block name -> active instruction text. The latest active entry wins.
    pub fn active_instructions(&self) -> HashMap<String, String> {
        self.custom_instructions
            .iter()
            .filter(|i| i.active)
            .map(|i| (i.block.clone(), i.text.clone()))
            .collect()
    }
}
