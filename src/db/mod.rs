//! Database abstraction layer.
//!
//! Three small traits cover the three tables: [`OperationStore`] for the
//! append-only audit log, [`TaskStore`] for the per-user active-task marker,
//! and [`RateLimitStore`] for the request throttle. The default
//! implementation is [`sqlite::SqliteStore`]; to swap to another database,
//! implement the traits for a new type and change the concrete type in the
//! dispatcher.
//!
//! All trait methods use `impl Future` in their signatures (stable since
//! Rust 1.75) so no extra `async-trait` crate is required.

pub mod sqlite;

use chrono::{DateTime, Utc};
use std::future::Future;
use std::time::Duration;

/// Terminal and non-terminal states of an operation row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationStatus {
    Processing,
    Completed,
    Error,
}

impl OperationStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            OperationStatus::Processing => "processing",
            OperationStatus::Completed => "completed",
            OperationStatus::Error => "error",
        }
    }
}

/// A new row for the operations log.
#[derive(Debug, Clone)]
pub struct NewOperation<'a> {
    pub user_id: i64,
    pub username: Option<&'a str>,
    /// Operation kind, e.g. `"start"` or `"conversion"`.
    pub operation: &'a str,
    pub status: OperationStatus,
    pub file_name: Option<&'a str>,
    pub file_size: Option<i64>,
}

/// The per-user in-flight marker.
#[derive(Debug, Clone)]
pub struct ActiveTask {
    pub user_id: i64,
    pub job_id: Option<String>,
    pub file_name: String,
    pub created_at: DateTime<Utc>,
}

/// Aggregates over the operations log, shown by the stats button.
#[derive(Debug, Clone, Default)]
pub struct OperationStats {
    pub total_operations: i64,
    pub successful_operations: i64,
    pub error_operations: i64,
    pub unique_users: i64,
    /// Percentage 0–100; zero when the log is empty.
    pub success_rate: f64,
}

/// Append-only audit log of user requests.
pub trait OperationStore: Send + Sync + 'static {
    /// Insert a new row and return its id for the later terminal update.
    fn log_operation(
        &self,
        op: NewOperation<'_>,
    ) -> impl Future<Output = Result<i64, sqlx::Error>> + Send;

    /// Record the terminal outcome of an operation.
    fn update_operation_status(
        &self,
        operation_id: i64,
        status: OperationStatus,
        error_message: Option<&str>,
    ) -> impl Future<Output = Result<(), sqlx::Error>> + Send;

    /// Aggregate counters over the whole log.
    fn stats(&self) -> impl Future<Output = Result<OperationStats, sqlx::Error>> + Send;
}

/// The single-slot per-user active-task marker.
pub trait TaskStore: Send + Sync + 'static {
    /// Overwrite the user's marker with a new in-flight file.
    fn save_active_task(
        &self,
        user_id: i64,
        job_id: Option<&str>,
        file_name: &str,
    ) -> impl Future<Output = Result<(), sqlx::Error>> + Send;

    fn get_active_task(
        &self,
        user_id: i64,
    ) -> impl Future<Output = Result<Option<ActiveTask>, sqlx::Error>> + Send;

    /// Clear the marker. Must be called on every exit path of a request —
    /// success, vendor failure, and internal error alike.
    fn remove_active_task(
        &self,
        user_id: i64,
    ) -> impl Future<Output = Result<(), sqlx::Error>> + Send;
}

/// Per-user request throttle.
pub trait RateLimitStore: Send + Sync + 'static {
    /// Admit or reject a request from `user_id`.
    ///
    /// Returns `true` (and refreshes the stored timestamp) when the previous
    /// admitted request is older than `cooldown`; `false` otherwise. The
    /// check and the update are two statements — the read-then-write window
    /// is accepted behaviour for a chat bot, where one user cannot
    /// realistically race themselves.
    fn check_user_rate_limit(
        &self,
        user_id: i64,
        cooldown: Duration,
    ) -> impl Future<Output = Result<bool, sqlx::Error>> + Send;
}
