use std::future::Future;

use anyhow::Result;
use chrono::{SubsecRound, Utc};
use sea_orm::{
    ConnectOptions, Database, DatabaseConnection, DbBackend, QuerySelect,
    prelude::DateTimeWithTimeZone,
};
use sea_orm_migration::MigratorTrait;

use crate::{
    config::TxPolicy,
    error::{AppError, AppResult},
    migration::Migrator,
};

pub type OrmConn = DatabaseConnection;

/// Create a SeaORM connection.
pub async fn create_orm_conn(database_url: &str) -> Result<DatabaseConnection> {
    let mut options = ConnectOptions::new(database_url);
    // Every pooled connection to an in-memory SQLite database would see its own empty schema.
    if database_url.contains(":memory:") || database_url.contains("mode=memory") {
        options.max_connections(1).min_connections(1);
    }
    let conn = Database::connect(options).await?;
    Ok(conn)
}

pub async fn run_migrations(conn: &DatabaseConnection) -> Result<()> {
    Migrator::up(conn, None).await?;
    Ok(())
}

/// Current time at microsecond precision, the finest both backends store.
pub fn now() -> DateTimeWithTimeZone {
    Utc::now().trunc_subsecs(6).fixed_offset()
}

/// Apply `FOR UPDATE` where the dialect has row locks.
///
/// SQLite serializes writers at the database level, so the clause is omitted there.
pub fn lock_for_update<Q: QuerySelect>(query: Q, backend: DbBackend) -> Q {
    match backend {
        DbBackend::Sqlite => query,
        _ => query.lock_exclusive(),
    }
}

/// Run one transactional unit of work under the policy's deadline, retrying
/// transient store failures.
///
/// `op` must open and commit its own transaction; a timed-out attempt is
/// dropped mid-flight, which rolls the open transaction back. Timeouts are
/// surfaced rather than retried.
pub async fn with_retry<T, F, Fut>(policy: &TxPolicy, op: &'static str, mut f: F) -> AppResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = AppResult<T>>,
{
    let mut attempt: u32 = 1;
    loop {
        let result = match tokio::time::timeout(policy.timeout, f()).await {
            Ok(result) => result,
            Err(_) => {
                tracing::warn!(op, attempt, "transaction deadline exceeded");
                Err(AppError::Timeout)
            }
        };

        match result {
            Err(err @ AppError::TransientStore(_)) if attempt < policy.max_attempts => {
                tracing::warn!(op, attempt, error = ?err, "transient store error, retrying");
                tokio::time::sleep(policy.backoff * attempt).await;
                attempt += 1;
            }
            other => return other,
        }
    }
}
