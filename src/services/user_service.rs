use chrono::Duration;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DbErr, EntityTrait, IntoActiveModel,
    QueryFilter, Set,
};
use sea_orm::sea_query::OnConflict;
use uuid::Uuid;

use crate::{
    db::now,
    dto::users::{EnsureUserRequest, UserSession},
    entity::users::{ActiveModel as UserActive, Column as UserCol, Entity as Users, Model as UserModel},
    error::{AppError, AppResult},
    middleware::auth::{AuthUser, ROLE_USER, ensure_admin, issue_token},
    response::{ApiResponse, Meta},
    state::AppState,
};

const DEFAULT_LANGUAGE: &str = "en";
const SESSION_TTL_HOURS: i64 = 24;

/// Find the user behind an external identity, creating it on first contact.
/// A supplied language replaces the stored one.
pub async fn ensure_user<C: ConnectionTrait>(
    conn: &C,
    external_id: &str,
    language: Option<&str>,
) -> AppResult<UserModel> {
    let external_id = external_id.trim();
    if external_id.is_empty() {
        return Err(AppError::BadRequest("external_id is required".into()));
    }

    Users::insert(UserActive {
        id: Set(Uuid::new_v4()),
        external_id: Set(external_id.to_string()),
        balance: Set(0),
        language: Set(language.unwrap_or(DEFAULT_LANGUAGE).to_string()),
        role: Set(ROLE_USER.to_string()),
        created_at: Set(now()),
    })
    .on_conflict(OnConflict::column(UserCol::ExternalId).do_nothing().to_owned())
    .exec_without_returning(conn)
    .await?;

    let user = Users::find()
        .filter(UserCol::ExternalId.eq(external_id))
        .one(conn)
        .await?
        .ok_or_else(|| AppError::OrmError(DbErr::RecordNotFound(external_id.to_string())))?;

    match language {
        Some(lang) if lang != user.language => {
            let mut active = user.into_active_model();
            active.language = Set(lang.to_string());
            Ok(active.update(conn).await?)
        }
        _ => Ok(user),
    }
}

pub async fn register(
    state: &AppState,
    caller: &AuthUser,
    payload: EnsureUserRequest,
) -> AppResult<ApiResponse<UserSession>> {
    ensure_admin(caller)?;
    let user = ensure_user(&state.orm, &payload.external_id, payload.language.as_deref()).await?;
    let token = issue_token(
        &state.jwt_secret,
        user.id,
        &user.role,
        Duration::hours(SESSION_TTL_HOURS),
    )?;
    tracing::debug!(user_id = %user.id, "user session issued");

    Ok(ApiResponse::success(
        "User",
        UserSession {
            user: user.into(),
            token,
        },
        Some(Meta::empty()),
    ))
}
