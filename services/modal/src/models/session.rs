//! Session model and related functionality

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::custom_id::{Feature, Flow};

/// Shortest lifetime a session may be given, in seconds
pub const MIN_SESSION_TTL_SECONDS: i64 = 60;

/// Longest lifetime a session may be given, in seconds (30 days)
pub const MAX_SESSION_TTL_SECONDS: i64 = 30 * 24 * 60 * 60;

/// Lifecycle status of a session. `Open` moves to exactly one of the
/// other two and never back.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    Open,
    Submitted,
    Expired,
}

impl SessionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionStatus::Open => "open",
            SessionStatus::Submitted => "submitted",
            SessionStatus::Expired => "expired",
        }
    }
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SessionStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "open" => Ok(SessionStatus::Open),
            "submitted" => Ok(SessionStatus::Submitted),
            "expired" => Ok(SessionStatus::Expired),
            other => Err(format!("unknown session status: {}", other)),
        }
    }
}

/// Session entity
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub session_id: String,
    pub feature: Feature,
    pub flow: Flow,
    pub owner_user_id: String,
    pub guild_id: Option<String>,
    pub channel_id: Option<String>,
    /// Opaque payload the owning flow needs after submission
    pub state_json: String,
    pub status: SessionStatus,
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Session {
    pub fn is_owned_by(&self, user_id: &str) -> bool {
        self.owner_user_id == user_id
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }
}

/// New session creation payload
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewSession {
    pub session_id: String,
    pub feature: Feature,
    pub flow: Flow,
    pub owner_user_id: String,
    pub guild_id: Option<String>,
    pub channel_id: Option<String>,
    pub state_json: String,
    /// Requested lifetime, clamped to
    /// [`MIN_SESSION_TTL_SECONDS`]..=[`MAX_SESSION_TTL_SECONDS`]
    pub ttl_seconds: i64,
}

impl NewSession {
    /// Materialise the row written by `create`
    pub fn into_session(self, now: DateTime<Utc>) -> Session {
        Session {
            expires_at: build_expiry(
                now,
                Duration::seconds(self.ttl_seconds.clamp(0, MAX_SESSION_TTL_SECONDS)),
            ),
            session_id: self.session_id,
            feature: self.feature,
            flow: self.flow,
            owner_user_id: self.owner_user_id,
            guild_id: self.guild_id,
            channel_id: self.channel_id,
            state_json: self.state_json,
            status: SessionStatus::Open,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Absolute deadline for a session created at `now`. Always later than
/// `now`, even for zero or negative `ttl`.
pub fn build_expiry(now: DateTime<Utc>, ttl: Duration) -> DateTime<Utc> {
    now + ttl.max(Duration::seconds(MIN_SESSION_TTL_SECONDS))
}
