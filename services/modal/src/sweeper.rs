//! Periodic removal of stale sessions

use chrono::{DateTime, Duration, Utc};
use std::sync::Arc;
use tokio_cron_scheduler::{Job, JobScheduler, JobSchedulerError};
use tracing::{error, info};

use crate::repositories::{SessionStore, StoreResult};

/// Deletes open and expired sessions whose deadline passed more than
/// `grace` ago. Submitted sessions are never swept.
#[derive(Clone)]
pub struct SessionSweeper {
    store: Arc<dyn SessionStore>,
    grace: Duration,
}

impl SessionSweeper {
    pub fn new(store: Arc<dyn SessionStore>, grace: Duration) -> Self {
        Self { store, grace }
    }

    pub async fn sweep_once(&self, now: DateTime<Utc>) -> StoreResult<u64> {
        let removed = self.store.sweep_expired(now - self.grace).await?;
        if removed > 0 {
            info!("Swept {} stale modal sessions", removed);
        }
        Ok(removed)
    }

    /// Schedule the sweep on a cron expression. The returned scheduler
    /// must be kept alive for the job to keep running.
    pub async fn start(&self, schedule: &str) -> Result<JobScheduler, JobSchedulerError> {
        let sweeper = self.clone();
        let scheduler = JobScheduler::new().await?;

        let job = Job::new_async(schedule, move |_, _| {
            let sweeper = sweeper.clone();
            Box::pin(async move {
                if let Err(e) = sweeper.sweep_once(Utc::now()).await {
                    error!("Failed to sweep modal sessions: {}", e);
                }
            })
        })?;

        scheduler.add(job).await?;
        scheduler.start().await?;

        info!("Started session sweeper with schedule: {}", schedule);
        Ok(scheduler)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::custom_id::{Feature, Flow};
    use crate::models::{NewSession, SessionStatus};
    use crate::repositories::InMemorySessionStore;

    #[tokio::test]
    async fn test_sweep_once_respects_grace() {
        let store = InMemorySessionStore::new();
        for id in ["recent", "old", "done"] {
            store
                .create(NewSession {
                    session_id: id.to_string(),
                    feature: Feature::Suggestions,
                    flow: Flow::Create,
                    owner_user_id: "u1".to_string(),
                    guild_id: None,
                    channel_id: None,
                    state_json: "{}".to_string(),
                    ttl_seconds: 60,
                })
                .await
                .unwrap();
        }
        store.set_status("done", SessionStatus::Submitted).await.unwrap();

        let now = Utc::now();
        store.set_expires_at("recent", now - Duration::minutes(10)).await.unwrap();
        store.set_expires_at("old", now - Duration::hours(3)).await.unwrap();
        store.set_expires_at("done", now - Duration::hours(3)).await.unwrap();

        let sweeper = SessionSweeper::new(Arc::new(store.clone()), Duration::hours(1));
        assert_eq!(sweeper.sweep_once(now).await.unwrap(), 1);
        assert!(store.get("old").await.is_err());
        assert!(store.get("recent").await.is_ok());
        assert!(store.get("done").await.is_ok());
    }

    #[tokio::test]
    async fn test_start_rejects_bad_schedule() {
        let sweeper = SessionSweeper::new(Arc::new(InMemorySessionStore::new()), Duration::hours(1));
        assert!(sweeper.start("not a schedule").await.is_err());
    }
}
