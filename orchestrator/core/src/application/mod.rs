// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

pub mod action_executor;
pub mod actions;
pub mod audit_recorder;
pub mod kill_switch;
pub mod node_service;
pub mod repository_factory;

// Re-export the kill switch surface for convenience
pub use action_executor::{ActionExecutor, ActionRegistry, ExecutionBudget, RegistryError};
pub use kill_switch::{KillSwitchError, KillSwitchOrchestrator, ReconcileSummary, RunReport, RunStatus};
pub use node_service::{NodeChangeListener, NodeService};
