//! Command-line front-end: `serve` runs the HTTP API, `submit`/`status` are
//! thin one-shot clients against a running instance.

use clap::{Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(name = "orchestrator", about = "Multi-agent task orchestrator")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Start the HTTP API and worker pool.
    Serve,
    /// Submit a task to a running instance and print its id.
    Submit {
        /// Task type, e.g. "simple" or "research_and_analyze".
        #[arg(long = "type")]
        task_type: String,
        /// JSON-encoded input object.
        #[arg(long, default_value = "{}")]
        input: String,
        /// Base URL of a running instance.
        #[arg(long, default_value = "http://127.0.0.1:8080")]
        url: String,
    },
    /// Fetch and print a task's current status.
    Status {
        task_id: String,
        #[arg(long, default_value = "http://127.0.0.1:8080")]
        url: String,
    },
}
