//! `drover tasks` - inspect and control tasks.

use anyhow::Result;
use clap::{Args, Subcommand};
use colored::Colorize;
use serde::Serialize;
use tabled::Tabled;
use uuid::Uuid;

use drover_task::Task;

use crate::client::ApiClient;
use crate::output::{print_output, print_single, OutputFormat};

#[derive(Debug, Args)]
pub struct TasksCommand {
    #[command(subcommand)]
    command: Option<TasksSubcommand>,
}

#[derive(Debug, Subcommand)]
enum TasksSubcommand {
    /// List all tasks (default).
    List,

    /// Show one task in full.
    Get { id: Uuid },

    /// Stop a task on its worker.
    Stop { id: Uuid },
}

#[derive(Debug, Serialize, Tabled)]
struct TaskRow {
    id: Uuid,
    name: String,
    state: String,
    worker: String,
    container: String,
    restarts: u32,
}

impl From<&Task> for TaskRow {
    fn from(task: &Task) -> Self {
        Self {
            id: task.id,
            name: task.name.clone(),
            state: task.state.to_string(),
            worker: task.assigned_worker.clone().unwrap_or_else(|| "-".to_string()),
            container: task
                .container_id
                .as_deref()
                .map(short_container_id)
                .unwrap_or_else(|| "-".to_string()),
            restarts: task.restart_count,
        }
    }
}

fn short_container_id(id: &str) -> String {
    id.chars().take(12).collect()
}

impl TasksCommand {
    pub async fn run(&self, client: &ApiClient, format: OutputFormat) -> Result<()> {
        match self.command.as_ref().unwrap_or(&TasksSubcommand::List) {
            TasksSubcommand::List => {
                let tasks: Vec<Task> = client.get("/v1/tasks").await?;
                let rows: Vec<TaskRow> = tasks.iter().map(TaskRow::from).collect();
                print_output(&rows, format);
            }
            TasksSubcommand::Get { id } => {
                let task: Task = client.get(&format!("/v1/tasks/{id}")).await?;
                print_single(&task);
            }
            TasksSubcommand::Stop { id } => {
                let task: Task = client.delete(&format!("/v1/tasks/{id}")).await?;
                println!(
                    "{} task {} ({})",
                    "Stopped".green().bold(),
                    task.id,
                    task.state
                );
            }
        }
        Ok(())
    }
}
