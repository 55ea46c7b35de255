//! CLI commands.

mod events;
mod run;
mod tasks;
mod workers;

use anyhow::Result;
use clap::{Parser, Subcommand};

use crate::client::ApiClient;
use crate::output::OutputFormat;

/// drover CLI - Submit and manage tasks on a drover cluster.
#[derive(Debug, Parser)]
#[command(name = "drover")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Manager address (host:port).
    #[arg(long, global = true, env = "DROVER_MANAGER", default_value = "localhost:5555")]
    manager: String,

    /// Output format (table or json).
    #[arg(long, global = true, default_value = "table")]
    format: OutputFormat,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Submit a new task.
    Run(run::RunCommand),

    /// Inspect and control tasks.
    Tasks(tasks::TasksCommand),

    /// Show the task event log.
    Events(events::EventsCommand),

    /// Manage the worker list.
    Workers(workers::WorkersCommand),
}

impl Cli {
    pub async fn run(&self) -> Result<()> {
        let client = ApiClient::new(&self.manager)?;

        match &self.command {
            Commands::Run(cmd) => cmd.run(&client).await,
            Commands::Tasks(cmd) => cmd.run(&client, self.format).await,
            Commands::Events(cmd) => cmd.run(&client, self.format).await,
            Commands::Workers(cmd) => cmd.run(&client).await,
        }
    }
}
