// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Warden server core.
//!
//! Coordinates a fleet of remote backup agents: agents hold a persistent
//! outbound gRPC connection, the server dispatches work over that connection,
//! tracks liveness, and fans out status events to WebSocket subscribers.
//!
//! # Architecture
//!
//! - **domain**: aggregates, value types, repository contracts
//! - **application**: connection registry, notification dispatch
//! - **infrastructure**: persistence, secret codec, event hub, outbound delivery
//! - **presentation**: agent gateway gRPC service, WebSocket endpoint

pub mod domain;
pub mod application;
pub mod infrastructure;
pub mod presentation;

pub use domain::*;
