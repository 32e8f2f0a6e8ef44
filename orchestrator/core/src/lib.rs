// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Overwatch Core
//!
//! Kill switch orchestration for operator-owned nodes. When a node's
//! suspension flag turns on, every registered deactivation action (compute
//! teardown, session revocation, operator notification) runs concurrently
//! under a time budget, and exactly one immutable audit entry records the
//! outcome.
//!
//! # Architecture
//!
//! - **domain** - node aggregate, transition detection, action contract,
//!   audit entry, control plane ports, configuration manifest
//! - **application** - node write path, action executor, audit recorder,
//!   kill switch orchestrator
//! - **infrastructure** - repositories, control plane adapters, event bus
//! - **presentation** - HTTP API

pub mod domain;
pub mod application;
pub mod infrastructure;
pub mod presentation;

pub use domain::*;
