// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Command implementations for the Overwatch CLI

pub mod audit;
pub mod config;
pub mod node;
pub mod reconcile;

pub use self::audit::AuditCommand;
pub use self::config::ConfigCommand;
pub use self::node::NodeCommand;
