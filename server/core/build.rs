// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Build Script for warden-server-core
//!
//! Compiles the `warden.agent.v1` Protocol Buffer definitions for the agent
//! gateway gRPC service.
//!
//! # Dependencies
//!
//! - **protoc**: Protocol buffer compiler (vendored via `protoc-bin-vendored`)
//! - **tonic-build**: Code generator for Rust gRPC stubs
//!
//! Generated code is placed in `OUT_DIR` and included via
//! `tonic::include_proto!` in `src/presentation/grpc/mod.rs`.

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Set PROTOC environment variable to point to the vendored protoc binary
    std::env::set_var("PROTOC", protoc_bin_vendored::protoc_bin_path().unwrap());

    tonic_build::configure()
        .build_server(true)
        .build_client(true)
        .compile_protos(
            &["../../proto/warden_agent.proto"],
            &["../../proto"],
        )?;

    println!("cargo:rerun-if-changed=../../proto/warden_agent.proto");

    Ok(())
}
