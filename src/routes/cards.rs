use axum::{Json, Router, extract::State, routing::post};

use crate::{
    dto::cards::{RedeemCardRequest, RedeemResult},
    error::AppResult,
    middleware::auth::AuthUser,
    response::ApiResponse,
    services::recharge_service,
    state::AppState,
};

pub fn router() -> Router<AppState> {
    Router::new().route("/redeem", post(redeem_card))
}

#[utoipa::path(
    post,
    path = "/api/cards/redeem",
    request_body = RedeemCardRequest,
    responses(
        (status = 200, description = "Card redeemed", body = ApiResponse<RedeemResult>),
        (status = 404, description = "Card not found"),
        (status = 409, description = "Card use limit reached"),
        (status = 410, description = "Card expired")
    ),
    security(("bearer_auth" = [])),
    tag = "Cards"
)]
pub async fn redeem_card(
    State(state): State<AppState>,
    user: AuthUser,
    Json(payload): Json<RedeemCardRequest>,
) -> AppResult<Json<ApiResponse<RedeemResult>>> {
    let resp = recharge_service::redeem(&state, &user, payload).await?;
    Ok(Json(resp))
}
