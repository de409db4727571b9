//! Execution planning
//!
//! A plan is built once per workflow version. It fixes the block order and
//! turns every `block_output` input into an explicit dependency edge, so
//! sequencing problems surface before any LLM call is made.

use std::collections::{HashMap, HashSet};

use serde::Serialize;

use super::entity::{is_valid_name, Block, Workflow, WorkflowId, WorkflowStatus};
use super::error::WorkflowError;

/// Consumer block depends on the output of a source block
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DependencyEdge {
    pub consumer: String,
    pub source: String,
    pub input: String,
}

/// Validated, ordered view of a workflow
#[derive(Debug, Clone, Serialize)]
pub struct ExecutionPlan {
    workflow_id: WorkflowId,
    version: u32,
    blocks: Vec<Block>,
    edges: Vec<DependencyEdge>,
}

impl ExecutionPlan {
    /// Validate `workflow` and produce its execution order
    pub fn build(workflow: &Workflow) -> Result<Self, WorkflowError> {
        if workflow.status() == WorkflowStatus::Archived {
            return Err(WorkflowError::not_triggerable(
                workflow.id().as_str(),
                workflow.status().as_str(),
            ));
        }

        if workflow.blocks().is_empty() {
            return Err(WorkflowError::configuration(format!(
                "Workflow '{}' has no blocks",
                workflow.id()
            )));
        }

        let mut names = HashSet::new();
        let mut indexes: HashMap<i32, &str> = HashMap::new();
        for block in workflow.blocks() {
            if !is_valid_name(block.name()) {
                return Err(WorkflowError::configuration(format!(
                    "Invalid block name '{}'",
                    block.name()
                )));
            }
            if !names.insert(block.name()) {
                return Err(WorkflowError::configuration(format!(
                    "Duplicate block name '{}'",
                    block.name()
                )));
            }
            if let Some(other) = indexes.insert(block.order_index(), block.name()) {
                return Err(WorkflowError::configuration(format!(
                    "Blocks '{}' and '{}' share order index {}",
                    other,
                    block.name(),
                    block.order_index()
                )));
            }
        }

        // Stable sort keeps declaration order for equal keys, though duplicates
        // were rejected above.
        let mut blocks = workflow.blocks().to_vec();
        blocks.sort_by_key(|b| b.order_index());

        let order: HashMap<&str, i32> = blocks
            .iter()
            .map(|b| (b.name(), b.order_index()))
            .collect();

        let mut edges = Vec::new();
        for block in &blocks {
            let mut input_names = HashSet::new();
            for input in block.inputs() {
                if !is_valid_name(input.name()) {
                    return Err(WorkflowError::configuration(format!(
                        "Block '{}' declares invalid input name '{}'",
                        block.name(),
                        input.name()
                    )));
                }
                if !input_names.insert(input.name()) {
                    return Err(WorkflowError::configuration(format!(
                        "Block '{}' declares input '{}' twice",
                        block.name(),
                        input.name()
                    )));
                }

                let Some(source) = input.source_block() else {
                    continue;
                };

                let source_index = order.get(source).ok_or_else(|| {
                    WorkflowError::configuration(format!(
                        "Block '{}' input '{}' references unknown block '{}'",
                        block.name(),
                        input.name(),
                        source
                    ))
                })?;

                if *source_index >= block.order_index() {
                    return Err(WorkflowError::configuration(format!(
                        "Block '{}' input '{}' references block '{}' which does not run before it",
                        block.name(),
                        input.name(),
                        source
                    )));
                }

                edges.push(DependencyEdge {
                    consumer: block.name().to_string(),
                    source: source.to_string(),
                    input: input.name().to_string(),
                });
            }
        }

        Ok(Self {
            workflow_id: workflow.id().clone(),
            version: workflow.version(),
            blocks,
            edges,
        })
    }

    pub fn workflow_id(&self) -> &WorkflowId {
        &self.workflow_id
    }

    pub fn version(&self) -> u32 {
        self.version
    }

    /// Blocks in execution order
    pub fn blocks(&self) -> &[Block] {
        &self.blocks
    }

    pub fn edges(&self) -> &[DependencyEdge] {
        &self.edges
    }

    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    /// Names of the blocks `block` reads from
    pub fn dependencies_of(&self, block: &str) -> Vec<&str> {
        self.edges
            .iter()
            .filter(|e| e.consumer == block)
            .map(|e| e.source.as_str())
            .collect()
    }
}
