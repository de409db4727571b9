//! Load workflow definitions from JSON files

use std::path::Path;

use tracing::{debug, info};

use crate::domain::{ExecutionPlan, Workflow, WorkflowError};

/// Parse one workflow definition and check that it can be planned
pub fn parse_workflow(content: &str) -> Result<Workflow, WorkflowError> {
    let workflow: Workflow = serde_json::from_str(content)
        .map_err(|e| WorkflowError::configuration(format!("Invalid workflow definition: {}", e)))?;

    ExecutionPlan::build(&workflow)?;
    Ok(workflow)
}

/// Load and validate a single definition file
pub fn load_workflow_file(path: impl AsRef<Path>) -> Result<Workflow, WorkflowError> {
    let path = path.as_ref();
    debug!(path = %path.display(), "Loading workflow definition");

    let content = std::fs::read_to_string(path).map_err(|e| {
        WorkflowError::configuration(format!("Failed to read {}: {}", path.display(), e))
    })?;

    parse_workflow(&content).map_err(|e| match e {
        WorkflowError::Configuration(msg) => {
            WorkflowError::configuration(format!("{}: {}", path.display(), msg))
        }
        other => other,
    })
}

/// Load every `*.json` file in `dir`, sorted by file name
pub fn load_workflow_dir(dir: impl AsRef<Path>) -> Result<Vec<Workflow>, WorkflowError> {
    let dir = dir.as_ref();

    let entries = std::fs::read_dir(dir).map_err(|e| {
        WorkflowError::configuration(format!("Failed to read {}: {}", dir.display(), e))
    })?;

    let mut paths: Vec<_> = entries
        .filter_map(Result::ok)
        .map(|entry| entry.path())
        .filter(|path| path.extension().is_some_and(|ext| ext == "json"))
        .collect();
    paths.sort();

    let workflows = paths
        .iter()
        .map(load_workflow_file)
        .collect::<Result<Vec<_>, _>>()?;

    info!(
        dir = %dir.display(),
        count = workflows.len(),
        "Loaded workflow definitions"
    );

    Ok(workflows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    const VALID: &str = r#"{
        "id": "summarize",
        "name": "Summarize",
        "status": "active",
        "blocks": [
            {"name": "b1", "order_index": 0, "template": "Summarize {t}",
             "inputs": [{"name": "t", "type": "request_text"}]}
        ]
    }"#;

    #[test]
    fn test_parse_valid() {
        let workflow = parse_workflow(VALID).unwrap();
        assert_eq!(workflow.id().as_str(), "summarize");
        assert!(workflow.is_triggerable());
    }

    #[test]
    fn test_parse_rejects_bad_dependency() {
        let content = r#"{
            "id": "bad",
            "name": "Bad",
            "blocks": [
                {"name": "b1", "order_index": 0, "template": "{x}",
                 "inputs": [{"name": "x", "type": "block_output", "block": "b1"}]}
            ]
        }"#;
        let err = parse_workflow(content).unwrap_err();
        assert!(err.to_string().contains("does not run before it"));
    }

    #[test]
    fn test_parse_rejects_malformed_json() {
        let err = parse_workflow("{").unwrap_err();
        assert!(err.to_string().contains("Invalid workflow definition"));
    }

    #[test]
    fn test_load_dir_reads_json_only() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("a.json"), VALID).unwrap();
        fs::write(dir.path().join("notes.txt"), "ignored").unwrap();

        let workflows = load_workflow_dir(dir.path()).unwrap();
        assert_eq!(workflows.len(), 1);
    }

    #[test]
    fn test_load_file_error_names_path() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("broken.json");
        fs::write(&path, "[]").unwrap();

        let err = load_workflow_file(&path).unwrap_err();
        assert!(err.to_string().contains("broken.json"));
    }
}
