// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

use anyhow::Result;
use clap::Subcommand;
use colored::Colorize;
use uuid::Uuid;

use overwatch_core::domain::audit::AuditEntry;

use crate::daemon::connect;

#[derive(Subcommand)]
pub enum AuditCommand {
    /// List kill switch audit entries, newest first
    List {
        /// Only entries for this node
        #[arg(long = "node", value_name = "NODE_ID")]
        node_id: Option<Uuid>,

        /// Maximum number of entries
        #[arg(short, long, default_value = "20")]
        limit: usize,

        /// Print raw JSON instead of a summary
        #[arg(long)]
        json: bool,
    },
}

pub async fn handle_command(command: AuditCommand, host: &str, port: u16) -> Result<()> {
    let client = connect(host, port).await?;

    match command {
        AuditCommand::List { node_id, limit, json } => {
            let entries = client.list_audit(node_id, Some(limit)).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&entries)?);
                return Ok(());
            }
            print_entries(&entries);
            Ok(())
        }
    }
}

fn print_entries(entries: &[AuditEntry]) {
    if entries.is_empty() {
        println!("{}", "No audit entries found".yellow());
        return;
    }

    for entry in entries {
        let failed = entry.failed_actions().count();
        let outcome = if failed == 0 {
            "all actions succeeded".green()
        } else {
            format!("{} action(s) failed", failed).red()
        };
        println!(
            "{} {} node {} rev {} ({})",
            entry.timestamp.to_rfc3339().dimmed(),
            entry.action.bold(),
            entry.target_node_id,
            entry.transition_revision,
            outcome
        );
        println!("  operator: {}", entry.operator_id);
        for result in &entry.results {
            let line = format!("  - {}", result.summary());
            if result.succeeded {
                println!("{}", line);
            } else {
                println!("{}", line.red());
            }
        }
    }
}
