// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Node commands
//!
//! Commands: list, create, show, suspend, dispatch

use anyhow::Result;
use clap::Subcommand;
use colored::Colorize;
use uuid::Uuid;

use overwatch_core::domain::deactivation::DeactivationState;

use crate::daemon::client::DispatchDecision;
use crate::daemon::{connect, DaemonClient};

#[derive(Subcommand)]
pub enum NodeCommand {
    /// List nodes
    List,

    /// Register a node
    Create {
        /// Owning operator identity
        #[arg(long, value_name = "OPERATOR_ID")]
        owner: String,

        /// Display name
        #[arg(long)]
        name: String,

        /// Deployment identifier on the compute platform
        #[arg(long, value_name = "REFERENCE")]
        compute_reference: Option<String>,

        /// Create the node already suspended
        #[arg(long)]
        suspended: bool,
    },

    /// Show a node and its deactivation state
    Show {
        #[arg(value_name = "NODE_ID")]
        node_id: Uuid,
    },

    /// Engage the kill switch for a node
    Suspend {
        #[arg(value_name = "NODE_ID")]
        node_id: Uuid,

        /// Only suspend the node if this operator owns it
        #[arg(long, value_name = "OPERATOR_ID")]
        operator: Option<String>,
    },

    /// Ask the dispatch guard whether work may be sent to a node
    Dispatch {
        #[arg(value_name = "NODE_ID")]
        node_id: Uuid,
    },
}

pub async fn handle_command(command: NodeCommand, host: &str, port: u16) -> Result<()> {
    let client = connect(host, port).await?;

    match command {
        NodeCommand::List => list_nodes(client).await,
        NodeCommand::Create { owner, name, compute_reference, suspended } => {
            create_node(client, &owner, &name, compute_reference.as_deref(), suspended).await
        }
        NodeCommand::Show { node_id } => show_node(client, node_id).await,
        NodeCommand::Suspend { node_id, operator } => suspend_node(client, node_id, operator.as_deref()).await,
        NodeCommand::Dispatch { node_id } => check_dispatch(client, node_id).await,
    }
}

fn state_label(state: DeactivationState) -> colored::ColoredString {
    match state {
        DeactivationState::Active => "active".green(),
        DeactivationState::Suspending => "suspending".yellow(),
        DeactivationState::Suspended => "suspended".red(),
    }
}

async fn list_nodes(client: DaemonClient) -> Result<()> {
    let nodes = client.list_nodes().await?;

    if nodes.is_empty() {
        println!("{}", "No nodes found".yellow());
        return Ok(());
    }

    println!("{} nodes found:", nodes.len());
    println!("{:<38} {:<20} {:<20} {:<6} {}", "ID", "NAME", "OWNER", "REV", "STATE");
    for view in nodes {
        println!(
            "{:<38} {:<20} {:<20} {:<6} {}",
            view.node.id,
            view.node.name.bold(),
            view.node.owner_id,
            view.node.revision,
            state_label(view.state)
        );
    }
    Ok(())
}

async fn create_node(
    client: DaemonClient,
    owner: &str,
    name: &str,
    compute_reference: Option<&str>,
    suspended: bool,
) -> Result<()> {
    let node = client.create_node(owner, name, compute_reference, suspended).await?;
    println!("{}", format!("✓ Node created: {}", node.id).green());
    if suspended {
        println!(
            "{}",
            "Node was created suspended; no deactivation actions run for new nodes.".dimmed()
        );
    }
    Ok(())
}

async fn show_node(client: DaemonClient, node_id: Uuid) -> Result<()> {
    let view = client.get_node(node_id).await?;
    let node = &view.node;

    println!("{}", "Node:".bold());
    println!("  ID: {}", node.id);
    println!("  Name: {}", node.name);
    println!("  Owner: {}", node.owner_id);
    println!("  Compute reference: {}", node.compute_reference().unwrap_or("(none)"));
    println!("  Revision: {}", node.revision);
    println!("  State: {}", state_label(view.state));
    if let Some(rev) = node.suspended_at_revision {
        println!("  Suspended at revision: {}", rev);
    }
    println!("  Updated: {}", node.updated_at.to_rfc3339());
    Ok(())
}

async fn suspend_node(client: DaemonClient, node_id: Uuid, operator: Option<&str>) -> Result<()> {
    let response = client.suspend_node(node_id, operator).await?;
    println!("{}", format!("✓ Kill switch engaged for node {}", response.node_id).green());
    if let Some(rev) = response.transition_revision {
        println!("  Suspension revision: {}", rev);
    }
    println!(
        "{}",
        format!("Deactivation runs in the background. Check `overwatch audit list --node {}`.", node_id)
            .dimmed()
    );
    Ok(())
}

async fn check_dispatch(client: DaemonClient, node_id: Uuid) -> Result<()> {
    match client.check_dispatch(node_id).await? {
        DispatchDecision::Allowed => println!("{}", format!("✓ Dispatch allowed for node {}", node_id).green()),
        DispatchDecision::Refused(reason) => println!("{}", format!("✗ Dispatch refused: {}", reason).red()),
    }
    Ok(())
}
