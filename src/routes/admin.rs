use axum::{
    Json, Router,
    extract::{Path, State},
    routing::{get, post},
};
use uuid::Uuid;

use crate::{
    dto::{
        balance::LedgerReport,
        cards::{CardList, GenerateCardsRequest},
        products::{ImportCodesRequest, ImportCodesResult},
    },
    error::AppResult,
    middleware::auth::AuthUser,
    response::ApiResponse,
    services::admin_service,
    state::AppState,
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/products/{id}/codes", post(import_codes))
        .route("/cards", post(generate_cards))
        .route("/users/{id}/ledger-check", get(ledger_check))
}

#[utoipa::path(
    post,
    path = "/api/admin/products/{id}/codes",
    params(
        ("id" = Uuid, Path, description = "Product ID")
    ),
    request_body = ImportCodesRequest,
    responses(
        (status = 200, description = "Codes added to stock", body = ApiResponse<ImportCodesResult>),
        (status = 403, description = "Forbidden"),
        (status = 404, description = "Product not found")
    ),
    security(("bearer_auth" = [])),
    tag = "Admin"
)]
pub async fn import_codes(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
    Json(payload): Json<ImportCodesRequest>,
) -> AppResult<Json<ApiResponse<ImportCodesResult>>> {
    let resp = admin_service::import_codes(&state, &user, id, payload).await?;
    Ok(Json(resp))
}

#[utoipa::path(
    post,
    path = "/api/admin/cards",
    request_body = GenerateCardsRequest,
    responses(
        (status = 200, description = "Generated recharge cards", body = ApiResponse<CardList>),
        (status = 400, description = "Invalid batch"),
        (status = 403, description = "Forbidden")
    ),
    security(("bearer_auth" = [])),
    tag = "Admin"
)]
pub async fn generate_cards(
    State(state): State<AppState>,
    user: AuthUser,
    Json(payload): Json<GenerateCardsRequest>,
) -> AppResult<Json<ApiResponse<CardList>>> {
    let resp = admin_service::generate_cards(&state, &user, payload).await?;
    Ok(Json(resp))
}

#[utoipa::path(
    get,
    path = "/api/admin/users/{id}/ledger-check",
    params(
        ("id" = Uuid, Path, description = "User ID")
    ),
    responses(
        (status = 200, description = "Ledger replay against the cached balance", body = ApiResponse<LedgerReport>),
        (status = 403, description = "Forbidden"),
        (status = 404, description = "User not found")
    ),
    security(("bearer_auth" = [])),
    tag = "Admin"
)]
pub async fn ledger_check(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<ApiResponse<LedgerReport>>> {
    let resp = admin_service::ledger_check(&state, &user, id).await?;
    Ok(Json(resp))
}
