use crate::AppState;
use axum::{Json, extract::State, response::IntoResponse};
use serde::Serialize;
use utoipa::ToSchema;

#[derive(Serialize, ToSchema)]
pub struct RootResponse {
    pub message: String,
}

#[derive(Serialize, ToSchema)]
pub struct HealthResponse {
    pub status: String,
    pub datastore: String,
    pub renderer: String,
    pub ocr: String,
    pub version: String,
}

#[utoipa::path(
    get,
    path = "/api/",
    responses(
        (status = 200, description = "Service banner", body = RootResponse)
    ),
    tag = "system"
)]
pub async fn root() -> impl IntoResponse {
    Json(RootResponse {
        message: "PDF Master API".to_string(),
    })
}

#[utoipa::path(
    get,
    path = "/api/health",
    responses(
        (status = 200, description = "System health status", body = HealthResponse)
    ),
    tag = "system"
)]
pub async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    let datastore_status = match &state.datastore {
        Some(db) => {
            if db.ping().await.is_ok() {
                "connected"
            } else {
                "disconnected"
            }
        }
        None => "disabled",
    };

    let renderer_status = if state.renderer.health_check().await {
        state.renderer.name().to_string()
    } else {
        "unavailable".to_string()
    };

    let ocr_status = if !state.recognizer.is_enabled() {
        "disabled".to_string()
    } else if state.recognizer.health_check().await {
        state.recognizer.name().to_string()
    } else {
        "unavailable".to_string()
    };

    Json(HealthResponse {
        status: "ok".to_string(),
        datastore: datastore_status.to_string(),
        renderer: renderer_status,
        ocr: ocr_status,
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}
