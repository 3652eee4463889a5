use axum::{
    Json, Router,
    extract::{Query, State},
    routing::get,
};

use crate::{
    dto::balance::{BalanceView, LedgerList},
    error::AppResult,
    middleware::auth::AuthUser,
    response::ApiResponse,
    routes::params::Pagination,
    services::ledger_service,
    state::AppState,
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(get_balance))
        .route("/transactions", get(list_transactions))
}

#[utoipa::path(
    get,
    path = "/api/balance",
    responses(
        (status = 200, description = "Cached balance", body = ApiResponse<BalanceView>)
    ),
    security(("bearer_auth" = [])),
    tag = "Balance"
)]
pub async fn get_balance(
    State(state): State<AppState>,
    user: AuthUser,
) -> AppResult<Json<ApiResponse<BalanceView>>> {
    let resp = ledger_service::get_balance(&state, &user).await?;
    Ok(Json(resp))
}

#[utoipa::path(
    get,
    path = "/api/balance/transactions",
    params(Pagination),
    responses(
        (status = 200, description = "Ledger entries, newest first", body = ApiResponse<LedgerList>)
    ),
    security(("bearer_auth" = [])),
    tag = "Balance"
)]
pub async fn list_transactions(
    State(state): State<AppState>,
    user: AuthUser,
    Query(pagination): Query<Pagination>,
) -> AppResult<Json<ApiResponse<LedgerList>>> {
    let resp = ledger_service::list_transactions(&state, &user, pagination).await?;
    Ok(Json(resp))
}
