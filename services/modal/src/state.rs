//! Application state shared across handlers

use sqlx::PgPool;
use std::sync::Arc;

use crate::repositories::SessionStore;
use crate::router::SessionRouter;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    /// Absent when the service runs on the in-memory store
    pub db_pool: Option<PgPool>,
    pub store: Arc<dyn SessionStore>,
    pub router: SessionRouter,
}
