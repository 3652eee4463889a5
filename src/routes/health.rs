use axum::{Json, extract::State};
use sea_orm::ConnectionTrait;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::{
    error::AppResult,
    response::{ApiResponse, Meta},
    state::AppState,
};

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct HealthData {
    pub status: String,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ReadinessData {
    pub status: String,
    pub backend: String,
    pub claim_strategy: String,
}

#[utoipa::path(
    get,
    path = "/health",
    responses(
        (status = 200, description = "Process is up", body = ApiResponse<HealthData>),
    ),
    tag = "Health"
)]
pub async fn health_check() -> Json<ApiResponse<HealthData>> {
    let data = HealthData {
        status: "ok".to_string(),
    };

    Json(ApiResponse::success(
        "Health check",
        data,
        Some(Meta::empty()),
    ))
}

/// Pings the store and reports which claim dialect is active.
#[utoipa::path(
    get,
    path = "/health/ready",
    responses(
        (status = 200, description = "Store reachable", body = ApiResponse<ReadinessData>),
        (status = 503, description = "Store unreachable")
    ),
    tag = "Health"
)]
pub async fn readiness(State(state): State<AppState>) -> AppResult<Json<ApiResponse<ReadinessData>>> {
    state.orm.ping().await?;
    let data = ReadinessData {
        status: "ready".to_string(),
        backend: format!("{:?}", state.orm.get_database_backend()).to_lowercase(),
        claim_strategy: state.claims.name().to_string(),
    };
    Ok(Json(ApiResponse::success("Readiness check", data, Some(Meta::empty()))))
}
