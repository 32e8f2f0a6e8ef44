// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

use anyhow::Result;
use colored::Colorize;

use overwatch_core::application::kill_switch::RunStatus;

use crate::daemon::connect;

/// Re-drive suspended nodes whose suspension has no audit entry yet
pub async fn execute(host: &str, port: u16) -> Result<()> {
    let client = connect(host, port).await?;
    let summary = client.reconcile().await?;

    println!(
        "Scanned {} suspended node(s), re-drove {}",
        summary.scanned, summary.redriven
    );
    for report in &summary.reports {
        let status = match report.status {
            RunStatus::Completed => "completed".green(),
            RunStatus::CompletedWithFailures => "completed with failures".yellow(),
            RunStatus::AuditFailed => "AUDIT FAILED".red().bold(),
            RunStatus::Skipped => "skipped".dimmed(),
        };
        println!("  {} rev {}: {}", report.node_id, report.transition_revision, status);
        if let Some(error) = &report.error {
            println!("    {}", error.red());
        }
    }
    Ok(())
}
