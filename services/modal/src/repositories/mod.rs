//! Session persistence
//!
//! The [`SessionStore`] trait is the only way session rows change state.
//! Every transition away from `open` is a single conditional write so
//! concurrent callers can never both win.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::error::DatabaseError;
use sqlx::PgPool;
use thiserror::Error;
use tracing::info;

use crate::models::{NewSession, Session, SessionStatus};

pub mod memory;
pub mod session;

pub use memory::InMemorySessionStore;
pub use session::PgSessionStore;

/// Errors surfaced by a session store
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("session {0} already exists")]
    DuplicateSession(String),

    #[error("session {0} not found")]
    NotFound(String),

    #[error("stored session {session_id} is unreadable: {reason}")]
    CorruptRow { session_id: String, reason: String },

    #[error(transparent)]
    Database(#[from] DatabaseError),
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        StoreError::Database(DatabaseError::Query(err))
    }
}

/// Type alias for store results
pub type StoreResult<T> = Result<T, StoreError>;

/// Durable home of modal sessions
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Insert a new `open` session
    async fn create(&self, input: NewSession) -> StoreResult<Session>;

    /// Fetch a session or fail with [`StoreError::NotFound`]
    async fn get(&self, session_id: &str) -> StoreResult<Session>;

    /// Unconditionally overwrite the status. Administrative use only.
    async fn set_status(&self, session_id: &str, status: SessionStatus) -> StoreResult<()>;

    /// Move an open session whose deadline has passed to `expired`.
    /// Returns false when the row was not open or not yet stale.
    async fn expire(&self, session_id: &str, now: DateTime<Utc>) -> StoreResult<bool>;

    /// Atomically flip `open -> submitted` when the row is open, owned by
    /// `owner_user_id` and unexpired at `now`. Returns whether this call won.
    async fn claim_for_submit(
        &self,
        session_id: &str,
        owner_user_id: &str,
        now: DateTime<Utc>,
    ) -> StoreResult<bool>;

    /// Delete open and expired rows whose deadline is before `cutoff`.
    /// Submitted rows are kept.
    async fn sweep_expired(&self, cutoff: DateTime<Utc>) -> StoreResult<u64>;
}

/// Apply the embedded schema migrations
pub async fn run_migrations(pool: &PgPool) -> Result<(), DatabaseError> {
    info!("Running modal session migrations");

    sqlx::migrate!("./migrations")
        .run(pool)
        .await
        .map_err(|e| DatabaseError::Migration(e.to_string()))?;

    Ok(())
}
