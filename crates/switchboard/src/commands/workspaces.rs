//! `switchboard workspaces`: list what is persisted without starting anything.

use super::serve::resolve_data_dir;
use switchboard_core::GatewayConfig;
use switchboard_storage::{ConfigStore, JsonConfigStore, WorkspaceRecord};

pub async fn list_workspaces(config: &GatewayConfig, json: bool) -> anyhow::Result<()> {
    let data_dir = resolve_data_dir(config)?;
    let records = JsonConfigStore::new(&data_dir).get_all().await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&records)?);
        return Ok(());
    }

    if records.is_empty() {
        println!("No workspaces in {}", data_dir.display());
        return Ok(());
    }
    for record in &records {
        println!("{}", summary_line(record));
    }
    Ok(())
}

/// One line per workspace: id, name, server count and the server names.
fn summary_line(record: &WorkspaceRecord) -> String {
    let servers: Vec<String> = record
        .servers
        .iter()
        .map(|s| {
            if s.disabled {
                format!("{} (disabled)", s.name)
            } else {
                s.name.clone()
            }
        })
        .collect();
    format!(
        "{:<24} {:<24} {} server(s): {}",
        record.id,
        record.name,
        servers.len(),
        servers.join(", ")
    )
}
