//! `drover run` - submit a task.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;

use drover_task::{Task, TaskSpec};

use crate::client::ApiClient;
use crate::output::print_single;

/// Submit a new task from a specification file.
#[derive(Debug, Args)]
pub struct RunCommand {
    /// Task specification file (JSON).
    #[arg(short, long, default_value = "task.json")]
    filename: PathBuf,
}

impl RunCommand {
    pub async fn run(&self, client: &ApiClient) -> Result<()> {
        let raw = std::fs::read_to_string(&self.filename)
            .with_context(|| format!("Unable to read {}", self.filename.display()))?;

        let spec: TaskSpec = serde_json::from_str(&raw)
            .with_context(|| format!("Invalid task spec in {}", self.filename.display()))?;

        let task: Task = client.post("/v1/tasks", &spec).await?;

        println!(
            "{} task {} ({})",
            "Submitted".green().bold(),
            task.id,
            task.name
        );
        print_single(&task);
        Ok(())
    }
}
