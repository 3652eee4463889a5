use axum::{Json, Router, extract::State, routing::post};

use crate::{
    dto::users::{EnsureUserRequest, UserSession},
    error::AppResult,
    middleware::auth::AuthUser,
    response::ApiResponse,
    services::user_service,
    state::AppState,
};

pub fn router() -> Router<AppState> {
    Router::new().route("/", post(ensure_user))
}

#[utoipa::path(
    post,
    path = "/api/users",
    request_body = EnsureUserRequest,
    responses(
        (status = 200, description = "User for the external identity, with a session token", body = ApiResponse<UserSession>),
        (status = 403, description = "Forbidden")
    ),
    security(("bearer_auth" = [])),
    tag = "Users"
)]
pub async fn ensure_user(
    State(state): State<AppState>,
    caller: AuthUser,
    Json(payload): Json<EnsureUserRequest>,
) -> AppResult<Json<ApiResponse<UserSession>>> {
    let resp = user_service::register(&state, &caller, payload).await?;
    Ok(Json(resp))
}
