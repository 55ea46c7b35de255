//! `drover workers` - manage the manager's worker list.

use anyhow::Result;
use clap::{Args, Subcommand};
use colored::Colorize;

use crate::client::ApiClient;

#[derive(Debug, Args)]
pub struct WorkersCommand {
    #[command(subcommand)]
    command: Option<WorkersSubcommand>,
}

#[derive(Debug, Subcommand)]
enum WorkersSubcommand {
    /// List known workers (default).
    List,

    /// Register a worker with the manager.
    Add { addr: String },
}

#[derive(Debug, serde::Serialize)]
struct AddWorkerRequest {
    addr: String,
}

impl WorkersCommand {
    pub async fn run(&self, client: &ApiClient) -> Result<()> {
        match self.command.as_ref().unwrap_or(&WorkersSubcommand::List) {
            WorkersSubcommand::List => {
                let workers: Vec<String> = client.get("/v1/workers").await?;
                if workers.is_empty() {
                    println!("{}", "No workers registered.".dimmed());
                } else {
                    for worker in workers {
                        println!("{worker}");
                    }
                }
            }
            WorkersSubcommand::Add { addr } => {
                let _: serde_json::Value = client
                    .post(
                        "/v1/workers",
                        &AddWorkerRequest { addr: addr.clone() },
                    )
                    .await?;
                println!("{} worker {}", "Added".green().bold(), addr);
            }
        }
        Ok(())
    }
}
