use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::models::User;

#[derive(Debug, Deserialize, ToSchema)]
pub struct EnsureUserRequest {
    pub external_id: String,
    pub language: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct UserSession {
    pub user: User,
    /// Bearer token for calls made on this user's behalf.
    pub token: String,
}
