// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

use axum::{
    extract::State,
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use serde_json::json;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};

use crate::application::connections::ConnectionRegistry;
use crate::infrastructure::hub::Hub;
use crate::presentation::ws;

pub struct AppState {
    pub hub: Arc<Hub>,
    pub registry: Arc<ConnectionRegistry>,
}

pub fn app(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/ws", get(ws::ws_handler))
        .route("/healthz", get(health))
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(state)
}

async fn health(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(json!({
        "status": "healthy",
        "connected_agents": state.registry.connected_count(),
        "hub_subscribers": state.hub.connected_count(),
    }))
}
