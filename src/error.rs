use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use sea_orm::{DbErr, RuntimeErr};
use thiserror::Error;

use crate::response::ApiResponse;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("No stock available")]
    NoStock,

    #[error("Insufficient balance: have {balance}, need {required}")]
    InsufficientBalance { balance: i64, required: i64 },

    #[error("Recharge card not found")]
    CardNotFound,

    #[error("Recharge card already used")]
    CardAlreadyUsed,

    #[error("Recharge card expired")]
    CardExpired,

    #[error("Recharge card has reached its maximum uses")]
    CardMaxUsesReached,

    #[error("Recharge card has reached its per-user limit")]
    CardMaxUsesPerUserReached,

    #[error("Order not found")]
    OrderNotFound,

    #[error("Amount mismatch: expected {expected}, received {received}")]
    AmountMismatch { expected: i64, received: i64 },

    #[error("Invalid signature")]
    InvalidSignature,

    #[error("Product not found")]
    ProductNotFound,

    #[error("User not found")]
    UserNotFound,

    #[error("Bad Request {0}")]
    BadRequest(String),

    #[error("Unauthorized {0}")]
    Unauthorized(String),

    #[error("Forbidden")]
    Forbidden,

    #[error("Transient store error")]
    TransientStore(#[source] DbErr),

    #[error("Transaction timed out")]
    Timeout,

    #[error("ORM error")]
    OrmError(#[source] DbErr),

    #[error("Internal Server Error")]
    Internal(#[from] anyhow::Error),
}

impl From<DbErr> for AppError {
    fn from(err: DbErr) -> Self {
        if is_transient_db_err(&err) {
            AppError::TransientStore(err)
        } else {
            AppError::OrmError(err)
        }
    }
}

impl AppError {
    /// Stable identifier the bot layer maps to a localized message.
    pub fn code(&self) -> &'static str {
        match self {
            AppError::NoStock => "no_stock",
            AppError::InsufficientBalance { .. } => "insufficient_balance",
            AppError::CardNotFound => "card_not_found",
            AppError::CardAlreadyUsed => "card_already_used",
            AppError::CardExpired => "card_expired",
            AppError::CardMaxUsesReached => "card_max_uses_reached",
            AppError::CardMaxUsesPerUserReached => "card_max_uses_per_user_reached",
            AppError::OrderNotFound => "order_not_found",
            AppError::AmountMismatch { .. } => "amount_mismatch",
            AppError::InvalidSignature => "invalid_signature",
            AppError::ProductNotFound => "product_not_found",
            AppError::UserNotFound => "user_not_found",
            AppError::BadRequest(_) => "bad_request",
            AppError::Unauthorized(_) => "unauthorized",
            AppError::Forbidden => "forbidden",
            AppError::TransientStore(_) => "transient_store_error",
            AppError::Timeout => "timeout",
            AppError::OrmError(_) => "store_error",
            AppError::Internal(_) => "internal",
        }
    }

    /// Errors the transaction boundary may retry.
    pub fn is_transient(&self) -> bool {
        matches!(self, AppError::TransientStore(_) | AppError::Timeout)
    }

    /// Expected business outcomes, as opposed to faults.
    pub fn is_business_rule(&self) -> bool {
        matches!(
            self,
            AppError::NoStock
                | AppError::InsufficientBalance { .. }
                | AppError::CardNotFound
                | AppError::CardAlreadyUsed
                | AppError::CardExpired
                | AppError::CardMaxUsesReached
                | AppError::CardMaxUsesPerUserReached
        )
    }
}

// SQLSTATE: serialization_failure, deadlock_detected, lock_not_available, query_canceled.
const PG_TRANSIENT_CODES: [&str; 4] = ["40001", "40P01", "55P03", "57014"];

// SQLITE_BUSY and SQLITE_LOCKED, including their extended codes.
fn is_sqlite_busy(code: &str) -> bool {
    code.parse::<i32>()
        .map(|c| matches!(c & 0xff, 5 | 6))
        .unwrap_or(false)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Dialect {
    Postgres,
    Sqlite,
}

// Numeric SQLite codes overlap SQLSTATE values: PG 22021 masks to SQLITE_BUSY.
fn is_transient_code(dialect: Dialect, code: &str) -> bool {
    match dialect {
        Dialect::Postgres => PG_TRANSIENT_CODES.contains(&code),
        Dialect::Sqlite => is_sqlite_busy(code),
    }
}

fn is_transient_sqlx(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_) => true,
        sqlx::Error::Database(db) => {
            let dialect = if db.try_downcast_ref::<sqlx::sqlite::SqliteError>().is_some() {
                Dialect::Sqlite
            } else {
                Dialect::Postgres
            };
            db.code().is_some_and(|code| is_transient_code(dialect, &code))
        }
        _ => false,
    }
}

pub fn is_transient_db_err(err: &DbErr) -> bool {
    match err {
        DbErr::ConnectionAcquire(_) | DbErr::Conn(_) => true,
        DbErr::Exec(RuntimeErr::SqlxError(e)) | DbErr::Query(RuntimeErr::SqlxError(e)) => {
            is_transient_sqlx(e)
        }
        _ => false,
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = match &self {
            AppError::NoStock
            | AppError::CardAlreadyUsed
            | AppError::CardMaxUsesReached
            | AppError::CardMaxUsesPerUserReached => StatusCode::CONFLICT,
            AppError::InsufficientBalance { .. } => StatusCode::PAYMENT_REQUIRED,
            AppError::CardExpired => StatusCode::GONE,
            AppError::CardNotFound
            | AppError::OrderNotFound
            | AppError::ProductNotFound
            | AppError::UserNotFound => StatusCode::NOT_FOUND,
            AppError::AmountMismatch { .. } | AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::InvalidSignature | AppError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            AppError::Forbidden => StatusCode::FORBIDDEN,
            AppError::TransientStore(_) | AppError::Timeout => StatusCode::SERVICE_UNAVAILABLE,
            AppError::OrmError(_) | AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        if status.is_server_error() {
            tracing::error!(error = ?self, "request failed");
        }

        let body = ApiResponse::error(self.to_string(), self.code());

        (status, axum::Json(body)).into_response()
    }
}

pub type AppResult<T> = Result<T, AppError>;
