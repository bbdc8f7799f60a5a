//! PostgreSQL session store
//!
//! Each query is exposed as a free function over any `PgExecutor`. Pass
//! `&PgPool` to let the query acquire and release its own connection, or
//! `&mut *tx` to run it inside a caller's unit of work
//! (see `common::database::begin_transaction`).

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgRow;
use sqlx::{PgExecutor, PgPool, Row};
use tracing::{debug, info};

use super::{SessionStore, StoreError, StoreResult};
use crate::models::{NewSession, Session, SessionStatus};

/// Session store backed by the `modal_sessions` table
#[derive(Clone)]
pub struct PgSessionStore {
    pool: PgPool,
}

impl PgSessionStore {
    /// Create a new session store
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl SessionStore for PgSessionStore {
    async fn create(&self, input: NewSession) -> StoreResult<Session> {
        insert_session(&self.pool, &input.into_session(Utc::now())).await
    }

    async fn get(&self, session_id: &str) -> StoreResult<Session> {
        find_session(&self.pool, session_id)
            .await?
            .ok_or_else(|| StoreError::NotFound(session_id.to_string()))
    }

    async fn set_status(&self, session_id: &str, status: SessionStatus) -> StoreResult<()> {
        if update_status(&self.pool, session_id, status).await? {
            Ok(())
        } else {
            Err(StoreError::NotFound(session_id.to_string()))
        }
    }

    async fn expire(&self, session_id: &str, now: DateTime<Utc>) -> StoreResult<bool> {
        expire_session(&self.pool, session_id, now).await
    }

    async fn claim_for_submit(
        &self,
        session_id: &str,
        owner_user_id: &str,
        now: DateTime<Utc>,
    ) -> StoreResult<bool> {
        claim_for_submit(&self.pool, session_id, owner_user_id, now).await
    }

    async fn sweep_expired(&self, cutoff: DateTime<Utc>) -> StoreResult<u64> {
        sweep_expired(&self.pool, cutoff).await
    }
}

/// Insert a prepared session row; a colliding id yields `DuplicateSession`
pub async fn insert_session<'e, E>(executor: E, session: &Session) -> StoreResult<Session>
where
    E: PgExecutor<'e>,
{
    info!(
        "Creating modal session {} for {}:{}",
        session.session_id, session.feature, session.flow
    );

    let row = sqlx::query(
        r#"
        INSERT INTO modal_sessions
            (session_id, feature, flow, owner_user_id, guild_id, channel_id,
             state_json, status, expires_at, created_at, updated_at)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
        ON CONFLICT (session_id) DO NOTHING
        RETURNING session_id, feature, flow, owner_user_id, guild_id, channel_id,
                  state_json, status, expires_at, created_at, updated_at
        "#,
    )
    .bind(&session.session_id)
    .bind(session.feature.as_str())
    .bind(session.flow.as_str())
    .bind(&session.owner_user_id)
    .bind(&session.guild_id)
    .bind(&session.channel_id)
    .bind(&session.state_json)
    .bind(session.status.as_str())
    .bind(session.expires_at)
    .bind(session.created_at)
    .bind(session.updated_at)
    .fetch_optional(executor)
    .await?;

    match row {
        Some(row) => session_from_row(&row),
        None => Err(StoreError::DuplicateSession(session.session_id.clone())),
    }
}

/// Find a session by ID
pub async fn find_session<'e, E>(executor: E, session_id: &str) -> StoreResult<Option<Session>>
where
    E: PgExecutor<'e>,
{
    debug!("Finding modal session {}", session_id);

    let row = sqlx::query(
        r#"
        SELECT session_id, feature, flow, owner_user_id, guild_id, channel_id,
               state_json, status, expires_at, created_at, updated_at
        FROM modal_sessions
        WHERE session_id = $1
        "#,
    )
    .bind(session_id)
    .fetch_optional(executor)
    .await?;

    row.as_ref().map(session_from_row).transpose()
}

/// Overwrite the status of a session. Returns false when no row matched.
pub async fn update_status<'e, E>(
    executor: E,
    session_id: &str,
    status: SessionStatus,
) -> StoreResult<bool>
where
    E: PgExecutor<'e>,
{
    info!("Setting modal session {} to {}", session_id, status);

    let result = sqlx::query(
        r#"
        UPDATE modal_sessions
        SET status = $2, updated_at = NOW()
        WHERE session_id = $1
        "#,
    )
    .bind(session_id)
    .bind(status.as_str())
    .execute(executor)
    .await?;

    Ok(result.rows_affected() > 0)
}

/// Conditionally move a stale open session to `expired`
pub async fn expire_session<'e, E>(
    executor: E,
    session_id: &str,
    now: DateTime<Utc>,
) -> StoreResult<bool>
where
    E: PgExecutor<'e>,
{
    let result = sqlx::query(
        r#"
        UPDATE modal_sessions
        SET status = 'expired', updated_at = $2
        WHERE session_id = $1
          AND status = 'open'
          AND expires_at <= $2
        "#,
    )
    .bind(session_id)
    .bind(now)
    .execute(executor)
    .await?;

    Ok(result.rows_affected() > 0)
}

/// Claim a session for submission. Precondition and write are one
/// statement; zero affected rows means another caller won or the session
/// is not claimable.
pub async fn claim_for_submit<'e, E>(
    executor: E,
    session_id: &str,
    owner_user_id: &str,
    now: DateTime<Utc>,
) -> StoreResult<bool>
where
    E: PgExecutor<'e>,
{
    let result = sqlx::query(
        r#"
        UPDATE modal_sessions
        SET status = 'submitted', updated_at = $3
        WHERE session_id = $1
          AND owner_user_id = $2
          AND status = 'open'
          AND expires_at > $3
        "#,
    )
    .bind(session_id)
    .bind(owner_user_id)
    .bind(now)
    .execute(executor)
    .await?;

    let claimed = result.rows_affected() == 1;
    debug!("Claim on modal session {}: {}", session_id, claimed);
    Ok(claimed)
}

/// Delete stale open/expired sessions, keeping submitted ones
pub async fn sweep_expired<'e, E>(executor: E, cutoff: DateTime<Utc>) -> StoreResult<u64>
where
    E: PgExecutor<'e>,
{
    let result = sqlx::query(
        r#"
        DELETE FROM modal_sessions
        WHERE expires_at < $1
          AND status IN ('open', 'expired')
        "#,
    )
    .bind(cutoff)
    .execute(executor)
    .await?;

    Ok(result.rows_affected())
}

fn session_from_row(row: &PgRow) -> StoreResult<Session> {
    let session_id: String = row.try_get("session_id")?;
    let corrupt = |reason: String| StoreError::CorruptRow {
        session_id: session_id.clone(),
        reason,
    };

    let feature: String = row.try_get("feature")?;
    let flow: String = row.try_get("flow")?;
    let status: String = row.try_get("status")?;

    Ok(Session {
        feature: feature.parse().map_err(|e| corrupt(format!("{}", e)))?,
        flow: flow.parse().map_err(|e| corrupt(format!("{}", e)))?,
        status: status.parse().map_err(corrupt)?,
        owner_user_id: row.try_get("owner_user_id")?,
        guild_id: row.try_get("guild_id")?,
        channel_id: row.try_get("channel_id")?,
        state_json: row.try_get("state_json")?,
        expires_at: row.try_get("expires_at")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
        session_id: session_id.clone(),
    })
}
