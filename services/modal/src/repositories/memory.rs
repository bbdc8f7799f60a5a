//! In-memory session store
//!
//! Holds every row behind one async mutex, so each operation, including the
//! conditional claim, runs as a single indivisible step. Used by the test
//! suite and for local runs without PostgreSQL.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info};

use super::{SessionStore, StoreError, StoreResult};
use crate::models::{NewSession, Session, SessionStatus};

#[derive(Debug, Clone, Default)]
pub struct InMemorySessionStore {
    sessions: Arc<Mutex<HashMap<String, Session>>>,
}

impl InMemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a row verbatim, bypassing creation rules
    pub async fn insert(&self, session: Session) {
        self.sessions
            .lock()
            .await
            .insert(session.session_id.clone(), session);
    }

    /// Move a session's deadline, leaving its status alone
    pub async fn set_expires_at(&self, session_id: &str, expires_at: DateTime<Utc>) -> StoreResult<()> {
        let mut sessions = self.sessions.lock().await;
        let session = sessions
            .get_mut(session_id)
            .ok_or_else(|| StoreError::NotFound(session_id.to_string()))?;
        session.expires_at = expires_at;
        Ok(())
    }

    pub async fn len(&self) -> usize {
        self.sessions.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.sessions.lock().await.is_empty()
    }
}

#[async_trait]
impl SessionStore for InMemorySessionStore {
    async fn create(&self, input: NewSession) -> StoreResult<Session> {
        let mut sessions = self.sessions.lock().await;
        if sessions.contains_key(&input.session_id) {
            return Err(StoreError::DuplicateSession(input.session_id));
        }

        let session = input.into_session(Utc::now());
        info!(
            "Creating modal session {} for {}:{}",
            session.session_id, session.feature, session.flow
        );
        sessions.insert(session.session_id.clone(), session.clone());
        Ok(session)
    }

    async fn get(&self, session_id: &str) -> StoreResult<Session> {
        self.sessions
            .lock()
            .await
            .get(session_id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(session_id.to_string()))
    }

    async fn set_status(&self, session_id: &str, status: SessionStatus) -> StoreResult<()> {
        let mut sessions = self.sessions.lock().await;
        let session = sessions
            .get_mut(session_id)
            .ok_or_else(|| StoreError::NotFound(session_id.to_string()))?;

        info!("Setting modal session {} to {}", session_id, status);
        session.status = status;
        session.updated_at = Utc::now();
        Ok(())
    }

    async fn expire(&self, session_id: &str, now: DateTime<Utc>) -> StoreResult<bool> {
        let mut sessions = self.sessions.lock().await;
        match sessions.get_mut(session_id) {
            Some(session) if session.status == SessionStatus::Open && session.expires_at <= now => {
                session.status = SessionStatus::Expired;
                session.updated_at = now;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn claim_for_submit(
        &self,
        session_id: &str,
        owner_user_id: &str,
        now: DateTime<Utc>,
    ) -> StoreResult<bool> {
        let mut sessions = self.sessions.lock().await;
        let claimed = match sessions.get_mut(session_id) {
            Some(session)
                if session.status == SessionStatus::Open
                    && session.owner_user_id == owner_user_id
                    && session.expires_at > now =>
            {
                session.status = SessionStatus::Submitted;
                session.updated_at = now;
                true
            }
            _ => false,
        };

        debug!("Claim on modal session {}: {}", session_id, claimed);
        Ok(claimed)
    }

    async fn sweep_expired(&self, cutoff: DateTime<Utc>) -> StoreResult<u64> {
        let mut sessions = self.sessions.lock().await;
        let before = sessions.len();
        sessions.retain(|_, session| {
            session.status == SessionStatus::Submitted || session.expires_at >= cutoff
        });
        Ok((before - sessions.len()) as u64)
    }
}
