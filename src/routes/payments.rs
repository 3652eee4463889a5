use axum::{
    Form, Router,
    extract::{Query, State},
    routing::get,
};

use crate::{
    error::AppResult,
    gateway::Params,
    services::payment_service::{self, CallbackOutcome},
    state::AppState,
};

const ACK_SUCCESS: &str = "success";
const ACK_FAIL: &str = "fail";

pub fn router() -> Router<AppState> {
    Router::new().route("/notify", get(notify_get).post(notify_post))
}

/// Map a callback result to the plain-text body the gateway expects.
pub fn ack(result: &AppResult<CallbackOutcome>) -> &'static str {
    match result {
        Ok(_) => ACK_SUCCESS,
        Err(_) => ACK_FAIL,
    }
}

#[utoipa::path(
    get,
    path = "/api/payments/notify",
    responses(
        (status = 200, description = "`success` when handled, `fail` otherwise", body = String)
    ),
    tag = "Payments"
)]
pub async fn notify_get(
    State(state): State<AppState>,
    Query(params): Query<Params>,
) -> &'static str {
    ack(&payment_service::handle_callback(&state, &params).await)
}

#[utoipa::path(
    post,
    path = "/api/payments/notify",
    request_body(content = String, content_type = "application/x-www-form-urlencoded"),
    responses(
        (status = 200, description = "`success` when handled, `fail` otherwise", body = String)
    ),
    tag = "Payments"
)]
pub async fn notify_post(
    State(state): State<AppState>,
    Form(params): Form<Params>,
) -> &'static str {
    ack(&payment_service::handle_callback(&state, &params).await)
}
