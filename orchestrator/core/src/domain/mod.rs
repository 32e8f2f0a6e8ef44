// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Domain Layer
//!
//! Node aggregate, suspension transition detection, deactivation action
//! contracts, audit records and the ports to external control planes.
//!
//! # Architecture
//!
//! - **Layer:** Domain Layer
//! - **Purpose:** Pure types and decisions, no I/O

pub mod audit;
pub mod control_plane;
pub mod deactivation;
pub mod events;
pub mod node;
pub mod overwatch_config;
pub mod repository;
pub mod transition;
