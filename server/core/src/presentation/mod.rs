// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Presentation layer: agent gateway gRPC service and WebSocket endpoint.

pub mod grpc;
pub mod ws;
pub mod api;
