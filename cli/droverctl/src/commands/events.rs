//! `drover events` - show the task event log.

use anyhow::Result;
use clap::Args;
use serde::Serialize;
use tabled::Tabled;
use uuid::Uuid;

use drover_task::TaskEvent;

use crate::client::ApiClient;
use crate::output::{print_output, OutputFormat};

#[derive(Debug, Args)]
pub struct EventsCommand {}

#[derive(Debug, Serialize, Tabled)]
struct EventRow {
    id: Uuid,
    desired: String,
    task: Uuid,
    name: String,
    timestamp: String,
}

impl From<&TaskEvent> for EventRow {
    fn from(event: &TaskEvent) -> Self {
        Self {
            id: event.id,
            desired: event.state.to_string(),
            task: event.task.id,
            name: event.task.name.clone(),
            timestamp: event.timestamp.to_rfc3339(),
        }
    }
}

impl EventsCommand {
    pub async fn run(&self, client: &ApiClient, format: OutputFormat) -> Result<()> {
        let mut events: Vec<TaskEvent> = client.get("/v1/events").await?;
        events.sort_by_key(|e| e.timestamp);

        let rows: Vec<EventRow> = events.iter().map(EventRow::from).collect();
        print_output(&rows, format);
        Ok(())
    }
}
