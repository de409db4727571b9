//! Validate command - checks a workflow definition file

use std::fmt::Write as _;
use std::path::PathBuf;

use clap::Args;

use crate::domain::{ExecutionPlan, InputSource, Workflow};
use crate::infrastructure::workflow::load_workflow_file;

#[derive(Debug, Args)]
pub struct ValidateArgs {
    /// Workflow definition (JSON)
    pub file: PathBuf,
}

/// Print the execution plan, or fail with the configuration error
pub async fn run(args: ValidateArgs) -> anyhow::Result<()> {
    let workflow = load_workflow_file(&args.file)?;
    let plan = ExecutionPlan::build(&workflow)?;

    print!("{}", render_plan(&workflow, &plan));
    Ok(())
}

/// Human-readable summary of a plan, one line per block
pub fn render_plan(workflow: &Workflow, plan: &ExecutionPlan) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "Workflow {} (v{}, {}): {}",
        workflow.id(),
        workflow.version(),
        workflow.status(),
        workflow.name()
    );

    for (position, block) in plan.blocks().iter().enumerate() {
        let model = block
            .model()
            .or(workflow.default_model())
            .unwrap_or("engine default");
        let _ = write!(
            out,
            "  {}. {} [order {}, model {}]",
            position + 1,
            block.name(),
            block.order_index(),
            model
        );

        let inputs: Vec<String> = block
            .inputs()
            .iter()
            .map(|input| match input.source() {
                InputSource::RequestText => format!("{} <- request", input.name()),
                InputSource::BlockOutput { block, field: None } => {
                    format!("{} <- {}", input.name(), block)
                }
                InputSource::BlockOutput {
                    block,
                    field: Some(field),
                } => format!("{} <- {}.{}", input.name(), block, field),
            })
            .collect();
        if !inputs.is_empty() {
            let _ = write!(out, " inputs: {}", inputs.join(", "));
        }
        if block.output_schema().is_some() {
            out.push_str(" (structured)");
        }
        out.push('\n');
    }

    out
}
