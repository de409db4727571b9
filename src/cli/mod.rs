//! CLI module for the workflow engine
//!
//! - `serve`: run the engine and its HTTP API
//! - `validate`: check a workflow definition file and print its plan

pub mod serve;
pub mod validate;

use clap::{Parser, Subcommand};

/// PMP Workflow Engine - runs multi-block LLM workflows as jobs
#[derive(Parser)]
#[command(name = "pmp-workflow-engine")]
#[command(version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Run the engine with workers, webhook dispatch and the HTTP API
    Serve,

    /// Validate a workflow definition and print its execution plan
    Validate(validate::ValidateArgs),
}
