// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Application layer: services orchestrating domain and infrastructure.

pub mod connections;
pub mod notifier;
pub mod settings;
