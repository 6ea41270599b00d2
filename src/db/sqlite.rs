//! SQLite implementation of the store traits.
//!
//! Uses [`sqlx`] with the `sqlite` feature. Migrations are run automatically
//! on startup via [`SqliteStore::connect`].
//!
//! # Migrations path
//!
//! `sqlx::migrate!("./migrations")` resolves the path **at compile time**
//! relative to `CARGO_MANIFEST_DIR` (the crate root), so the directory is
//! embedded into the binary. The database file location is determined at
//! runtime by `DATABASE_URL` and is unrelated to the working directory.
//!
//! # Queries
//!
//! The `sqlx::query` (runtime-verified) form is used deliberately so that no
//! `DATABASE_URL` environment variable is needed at compile time. Timestamps
//! are stored as RFC 3339 text; SQLite has no native datetime type and the
//! text form keeps rows greppable with the `sqlite3` shell.

use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;
use std::str::FromStr;
use std::time::Duration;
use tracing::warn;

use super::{
    ActiveTask, NewOperation, OperationStats, OperationStatus, OperationStore, RateLimitStore,
    TaskStore,
};

/// SQLite-backed store for all three tables.
#[derive(Clone, Debug)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Open (or create) the SQLite database at `url` and run pending
    /// migrations.
    ///
    /// `url` should be a sqlx-compatible SQLite URL, e.g. `"sqlite://bot.db"`.
    pub async fn connect(url: &str) -> Result<Self, sqlx::Error> {
        let options = SqliteConnectOptions::from_str(url)?
            .create_if_missing(true)
            .busy_timeout(Duration::from_secs(30));
        let pool = SqlitePoolOptions::new().connect_with(options).await?;
        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .map_err(|e| sqlx::Error::Migrate(Box::new(e)))?;
        Ok(Self { pool })
    }
}

fn parse_ts(raw: &str) -> DateTime<Utc> {
    raw.parse().unwrap_or_else(|e: chrono::ParseError| {
        warn!(raw, error = %e, "failed to parse stored timestamp; using now");
        Utc::now()
    })
}

impl OperationStore for SqliteStore {
    async fn log_operation(&self, op: NewOperation<'_>) -> Result<i64, sqlx::Error> {
        let created_at = Utc::now().to_rfc3339();
        let result = sqlx::query(
            "INSERT INTO operations_log \
             (user_id, username, operation, status, file_name, file_size, created_at) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        )
        .bind(op.user_id)
        .bind(op.username)
        .bind(op.operation)
        .bind(op.status.as_str())
        .bind(op.file_name)
        .bind(op.file_size)
        .bind(&created_at)
        .execute(&self.pool)
        .await?;
        Ok(result.last_insert_rowid())
    }

    async fn update_operation_status(
        &self,
        operation_id: i64,
        status: OperationStatus,
        error_message: Option<&str>,
    ) -> Result<(), sqlx::Error> {
        let completed_at = Utc::now().to_rfc3339();
        sqlx::query(
            "UPDATE operations_log \
             SET status = ?1, completed_at = ?2, error_message = ?3 \
             WHERE id = ?4",
        )
        .bind(status.as_str())
        .bind(&completed_at)
        .bind(error_message)
        .bind(operation_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn stats(&self) -> Result<OperationStats, sqlx::Error> {
        let (total,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM operations_log")
            .fetch_one(&self.pool)
            .await?;
        let (completed,): (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM operations_log WHERE status = 'completed'")
                .fetch_one(&self.pool)
                .await?;
        let (errors,): (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM operations_log WHERE status = 'error'")
                .fetch_one(&self.pool)
                .await?;
        let (unique_users,): (i64,) =
            sqlx::query_as("SELECT COUNT(DISTINCT user_id) FROM operations_log")
                .fetch_one(&self.pool)
                .await?;

        let success_rate = if total > 0 {
            completed as f64 / total as f64 * 100.0
        } else {
            0.0
        };

        Ok(OperationStats {
            total_operations: total,
            successful_operations: completed,
            error_operations: errors,
            unique_users,
            success_rate,
        })
    }
}

impl TaskStore for SqliteStore {
    async fn save_active_task(
        &self,
        user_id: i64,
        job_id: Option<&str>,
        file_name: &str,
    ) -> Result<(), sqlx::Error> {
        let created_at = Utc::now().to_rfc3339();
        sqlx::query(
            "INSERT OR REPLACE INTO active_tasks (user_id, job_id, file_name, created_at) \
             VALUES (?1, ?2, ?3, ?4)",
        )
        .bind(user_id)
        .bind(job_id)
        .bind(file_name)
        .bind(&created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_active_task(&self, user_id: i64) -> Result<Option<ActiveTask>, sqlx::Error> {
        let row: Option<(i64, Option<String>, String, String)> = sqlx::query_as(
            "SELECT user_id, job_id, file_name, created_at \
             FROM active_tasks WHERE user_id = ?1",
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|(user_id, job_id, file_name, created_at)| ActiveTask {
            user_id,
            job_id,
            file_name,
            created_at: parse_ts(&created_at),
        }))
    }

    async fn remove_active_task(&self, user_id: i64) -> Result<(), sqlx::Error> {
        sqlx::query("DELETE FROM active_tasks WHERE user_id = ?1")
            .bind(user_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

impl RateLimitStore for SqliteStore {
    async fn check_user_rate_limit(
        &self,
        user_id: i64,
        cooldown: Duration,
    ) -> Result<bool, sqlx::Error> {
        let row: Option<(String,)> =
            sqlx::query_as("SELECT last_request FROM user_limits WHERE user_id = ?1")
                .bind(user_id)
                .fetch_optional(&self.pool)
                .await?;

        let now = Utc::now();
        if let Some((last_request,)) = row {
            let last = parse_ts(&last_request);
            let elapsed = now.signed_duration_since(last);
            if elapsed < chrono::Duration::from_std(cooldown).unwrap_or(chrono::Duration::zero())
            {
                return Ok(false);
            }
        }

        sqlx::query(
            "INSERT OR REPLACE INTO user_limits (user_id, last_request, request_count) \
             VALUES (?1, ?2, COALESCE((SELECT request_count + 1 FROM user_limits WHERE user_id = ?1), 1))",
        )
        .bind(user_id)
        .bind(now.to_rfc3339())
        .execute(&self.pool)
        .await?;
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn store() -> (SqliteStore, tempfile::TempDir) {
        let dir = tempfile::tempdir().expect("tempdir");
        let url = format!("sqlite://{}/bot.db", dir.path().display());
        let store = SqliteStore::connect(&url).await.expect("connect");
        (store, dir)
    }

    fn conversion_op(user_id: i64) -> NewOperation<'static> {
        NewOperation {
            user_id,
            username: Some("tester"),
            operation: "conversion",
            status: OperationStatus::Processing,
            file_name: Some("doc.pdf"),
            file_size: Some(1024),
        }
    }

    #[tokio::test]
    async fn operation_lifecycle_insert_then_terminal_update() {
        let (store, _dir) = store().await;
        let id = store.log_operation(conversion_op(7)).await.unwrap();
        assert!(id > 0);

        store
            .update_operation_status(id, OperationStatus::Completed, None)
            .await
            .unwrap();

        let stats = store.stats().await.unwrap();
        assert_eq!(stats.total_operations, 1);
        assert_eq!(stats.successful_operations, 1);
        assert_eq!(stats.error_operations, 0);
        assert_eq!(stats.unique_users, 1);
        assert!((stats.success_rate - 100.0).abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn stats_on_empty_log_do_not_divide_by_zero() {
        let (store, _dir) = store().await;
        let stats = store.stats().await.unwrap();
        assert_eq!(stats.total_operations, 0);
        assert_eq!(stats.success_rate, 0.0);
    }

    #[tokio::test]
    async fn error_outcome_recorded_with_message() {
        let (store, _dir) = store().await;
        let id = store.log_operation(conversion_op(7)).await.unwrap();
        store
            .update_operation_status(id, OperationStatus::Error, Some("vendor says no"))
            .await
            .unwrap();

        let stats = store.stats().await.unwrap();
        assert_eq!(stats.error_operations, 1);
        assert_eq!(stats.successful_operations, 0);
    }

    #[tokio::test]
    async fn active_task_overwritten_and_removed() {
        let (store, _dir) = store().await;

        store
            .save_active_task(42, None, "first.pdf")
            .await
            .unwrap();
        store
            .save_active_task(42, Some("job-9"), "second.pdf")
            .await
            .unwrap();

        let task = store.get_active_task(42).await.unwrap().expect("present");
        assert_eq!(task.file_name, "second.pdf");
        assert_eq!(task.job_id.as_deref(), Some("job-9"));

        store.remove_active_task(42).await.unwrap();
        assert!(store.get_active_task(42).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn removing_absent_task_is_a_noop() {
        let (store, _dir) = store().await;
        store.remove_active_task(999).await.unwrap();
    }

    #[tokio::test]
    async fn rate_limit_blocks_inside_cooldown_and_admits_after() {
        let (store, _dir) = store().await;
        let cooldown = Duration::from_secs(60);

        assert!(store.check_user_rate_limit(1, cooldown).await.unwrap());
        assert!(!store.check_user_rate_limit(1, cooldown).await.unwrap());

        // Backdate the stored timestamp beyond the cooldown window.
        let past = (Utc::now() - chrono::Duration::seconds(120)).to_rfc3339();
        sqlx::query("UPDATE user_limits SET last_request = ?1 WHERE user_id = 1")
            .bind(&past)
            .execute(&store.pool)
            .await
            .unwrap();

        assert!(store.check_user_rate_limit(1, cooldown).await.unwrap());
    }

    #[tokio::test]
    async fn rate_limit_is_per_user() {
        let (store, _dir) = store().await;
        let cooldown = Duration::from_secs(60);
        assert!(store.check_user_rate_limit(1, cooldown).await.unwrap());
        assert!(store.check_user_rate_limit(2, cooldown).await.unwrap());
    }

    #[tokio::test]
    async fn admitted_requests_increment_the_counter() {
        let (store, _dir) = store().await;
        let cooldown = Duration::from_secs(0);

        store.check_user_rate_limit(5, cooldown).await.unwrap();
        store.check_user_rate_limit(5, cooldown).await.unwrap();

        let (count,): (i64,) =
            sqlx::query_as("SELECT request_count FROM user_limits WHERE user_id = 5")
                .fetch_one(&store.pool)
                .await
                .unwrap();
        assert_eq!(count, 2);
    }
}
