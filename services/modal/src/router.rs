//! Session router
//!
//! Recognises protocol-owned events and walks a submission through
//! decode, gate, validation, lookup, ownership, liveness, status and claim.
//! Every terminal state answers the user exactly once with an ephemeral
//! reply. The checks before the claim are advisory; only the store's
//! conditional claim decides who wins.

use async_trait::async_trait;
use chrono::Utc;
use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::channel::{
    ChannelError, FollowUpMessage, InteractionChannel, InteractionEnvelope, InteractionKind,
    OpenFormRequest, parse_envelope, try_parse_submission,
};
use crate::custom_id::{self, CURRENT_SCHEMA_VERSION, CustomIdError, Feature, Flow};
use crate::feature_gate::FeatureGate;
use crate::models::{FormField, NewSession, Session, SessionStatus, SubmissionContext};
use crate::repositories::{SessionStore, StoreError};

/// Default session lifetime, matching the channel's interaction token window
pub const DEFAULT_SESSION_TTL_SECONDS: i64 = 15 * 60;

/// User-facing texts for every terminal state
pub mod replies {
    pub const NOT_WIRED: &str = "This form isn't wired up yet. Please try again later.";
    pub const COMPONENT_RESERVED: &str = "This action isn't available yet.";
    pub const INVALID_SUBMISSION: &str =
        "That submission couldn't be read. Please reopen the flow and try again.";
    pub const SESSION_NOT_FOUND: &str =
        "This form session was not found. Please reopen the flow to start again.";
    pub const NOT_OWNER: &str =
        "This form belongs to another user. Open the flow yourself to get your own.";
    pub const EXPIRED: &str = "This form session has expired. Please reopen the flow.";
    pub const INACTIVE: &str = "This form session is no longer active. Please reopen the flow.";
    pub const CLAIM_LOST: &str = "This form was already submitted or has expired.";
    pub const RECEIVED: &str = "Your submission was received.";
    pub const HANDLER_FAILED: &str =
        "Your submission was received but could not be processed. Please try again later.";
}

/// Terminal state reached for one inbound event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RouteOutcome {
    /// Not a protocol event, or the gate is closed
    Declined,
    NotWired,
    ComponentAcknowledged,
    InvalidSubmission,
    SessionNotFound,
    NotOwner,
    Expired,
    Inactive,
    ClaimLost,
    Accepted,
}

impl RouteOutcome {
    /// Whether the protocol took ownership of the event
    pub fn handled(&self) -> bool {
        !matches!(self, RouteOutcome::Declined)
    }
}

impl fmt::Display for RouteOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RouteOutcome::Declined => "declined",
            RouteOutcome::NotWired => "not_wired",
            RouteOutcome::ComponentAcknowledged => "component_acknowledged",
            RouteOutcome::InvalidSubmission => "invalid_submission",
            RouteOutcome::SessionNotFound => "session_not_found",
            RouteOutcome::NotOwner => "not_owner",
            RouteOutcome::Expired => "expired",
            RouteOutcome::Inactive => "inactive",
            RouteOutcome::ClaimLost => "claim_lost",
            RouteOutcome::Accepted => "accepted",
        };
        f.write_str(name)
    }
}

/// Failures the router cannot resolve into a reply
#[derive(Error, Debug)]
pub enum RouterError {
    #[error("session store failure: {0}")]
    Store(#[from] StoreError),

    #[error("channel failure: {0}")]
    Channel(#[from] ChannelError),
}

/// Failures while opening a new session-backed form
#[derive(Error, Debug)]
pub enum OpenError {
    #[error("modal path is not enabled for {feature} in guild {guild_id:?}")]
    GateClosed {
        feature: Feature,
        guild_id: Option<String>,
    },

    #[error(transparent)]
    Identifier(#[from] CustomIdError),

    #[error("session store failure: {0}")]
    Store(#[from] StoreError),

    #[error("channel failure: {0}")]
    Channel(#[from] ChannelError),
}

/// Everything a flow needs to finish an accepted submission
#[derive(Debug, Clone)]
pub struct SessionHandoff {
    pub feature: Feature,
    pub flow: Flow,
    pub session_id: String,
    pub state_json: String,
    pub submission: SubmissionContext,
}

/// Business flow that consumes accepted submissions
#[async_trait]
pub trait SubmissionHandler: Send + Sync {
    async fn handle(
        &self,
        handoff: SessionHandoff,
        channel: &dyn InteractionChannel,
    ) -> anyhow::Result<()>;
}

/// Handlers keyed by the flow they own
#[derive(Clone, Default)]
pub struct FlowRegistry {
    handlers: HashMap<(Feature, Flow), Arc<dyn SubmissionHandler>>,
}

impl FlowRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler; the pair must belong to the vocabulary
    pub fn register(
        &mut self,
        feature: Feature,
        flow: Flow,
        handler: Arc<dyn SubmissionHandler>,
    ) -> Result<&mut Self, CustomIdError> {
        if !feature.supports(flow) {
            return Err(CustomIdError::UnsupportedFlow(format!("{}:{}", feature, flow)));
        }
        self.handlers.insert((feature, flow), handler);
        Ok(self)
    }

    pub fn get(&self, feature: Feature, flow: Flow) -> Option<Arc<dyn SubmissionHandler>> {
        self.handlers.get(&(feature, flow)).cloned()
    }
}

/// Request from a flow to present a new session-backed form
#[derive(Debug, Clone)]
pub struct OpenSessionRequest {
    pub interaction_id: String,
    pub interaction_token: String,
    pub feature: Feature,
    pub flow: Flow,
    pub owner_user_id: String,
    pub guild_id: Option<String>,
    pub channel_id: Option<String>,
    pub state_json: String,
    pub title: String,
    pub fields: Vec<FormField>,
    /// Falls back to the router's default when unset
    pub ttl_seconds: Option<i64>,
}

/// Dispatcher for protocol-owned events
#[derive(Clone)]
pub struct SessionRouter {
    store: Arc<dyn SessionStore>,
    channel: Arc<dyn InteractionChannel>,
    gate: Arc<FeatureGate>,
    handlers: FlowRegistry,
    default_ttl_seconds: i64,
}

impl SessionRouter {
    pub fn new(
        store: Arc<dyn SessionStore>,
        channel: Arc<dyn InteractionChannel>,
        gate: Arc<FeatureGate>,
        handlers: FlowRegistry,
    ) -> Self {
        Self {
            store,
            channel,
            gate,
            handlers,
            default_ttl_seconds: DEFAULT_SESSION_TTL_SECONDS,
        }
    }

    pub fn with_default_ttl(mut self, ttl_seconds: i64) -> Self {
        self.default_ttl_seconds = ttl_seconds;
        self
    }

    /// Route one raw inbound event. `Declined` means the event belongs to
    /// someone else; every other outcome has been answered.
    pub async fn route(&self, raw: &Value) -> Result<RouteOutcome, RouterError> {
        let Some(envelope) = parse_envelope(raw) else {
            return Ok(RouteOutcome::Declined);
        };
        if !custom_id::is_protocol_id(&envelope.custom_id) {
            return Ok(RouteOutcome::Declined);
        }

        let Some(decoded) = custom_id::decode(&envelope.custom_id) else {
            info!("Unroutable modal identifier {:?}", envelope.custom_id);
            return self
                .reply(&envelope, replies::NOT_WIRED, RouteOutcome::NotWired)
                .await;
        };

        if !self
            .gate
            .is_enabled(decoded.feature, envelope.guild_id.as_deref())
        {
            debug!(
                "Modal path disabled for {} in guild {:?}",
                decoded.feature, envelope.guild_id
            );
            return Ok(RouteOutcome::Declined);
        }

        match envelope.kind {
            InteractionKind::Component => {
                return self
                    .reply(
                        &envelope,
                        replies::COMPONENT_RESERVED,
                        RouteOutcome::ComponentAcknowledged,
                    )
                    .await;
            }
            InteractionKind::ModalSubmit => {}
        }

        let submission = match try_parse_submission(raw) {
            Ok(submission) => submission,
            Err(e) => {
                info!("Rejected submission {}: {}", envelope.id, e);
                return self
                    .reply(&envelope, replies::INVALID_SUBMISSION, RouteOutcome::InvalidSubmission)
                    .await;
            }
        };

        let session = match self.store.get(&decoded.session_id).await {
            Ok(session) => session,
            Err(StoreError::NotFound(_)) => {
                info!("Modal session {} not found", decoded.session_id);
                return self
                    .reply(&envelope, replies::SESSION_NOT_FOUND, RouteOutcome::SessionNotFound)
                    .await;
            }
            Err(e) => return Err(e.into()),
        };

        if session.feature != decoded.feature || session.flow != decoded.flow {
            warn!(
                "Modal session {} belongs to {}:{}, identifier named {}:{}",
                session.session_id, session.feature, session.flow, decoded.feature, decoded.flow
            );
            return self
                .reply(&envelope, replies::SESSION_NOT_FOUND, RouteOutcome::SessionNotFound)
                .await;
        }

        if !session.is_owned_by(&submission.user_id) {
            info!(
                "User {} tried to submit modal session {} owned by {}",
                submission.user_id, session.session_id, session.owner_user_id
            );
            return self
                .reply(&envelope, replies::NOT_OWNER, RouteOutcome::NotOwner)
                .await;
        }

        let now = Utc::now();
        if session.status == SessionStatus::Open && session.is_expired_at(now) {
            let expired = self.store.expire(&session.session_id, now).await?;
            info!(
                "Modal session {} expired at {} (marked: {})",
                session.session_id, session.expires_at, expired
            );
            return self
                .reply(&envelope, replies::EXPIRED, RouteOutcome::Expired)
                .await;
        }

        if session.status != SessionStatus::Open {
            info!(
                "Modal session {} is {}, not open",
                session.session_id, session.status
            );
            return self
                .reply(&envelope, replies::INACTIVE, RouteOutcome::Inactive)
                .await;
        }

        let claimed = self
            .store
            .claim_for_submit(&session.session_id, &submission.user_id, now)
            .await?;
        if !claimed {
            info!("Lost the claim on modal session {}", session.session_id);
            return self
                .reply(&envelope, replies::CLAIM_LOST, RouteOutcome::ClaimLost)
                .await;
        }

        info!(
            "Accepted submission for modal session {} ({}:{})",
            session.session_id, session.feature, session.flow
        );

        // The claim is committed; the flow gets the submission even if the
        // acknowledgement fails, and the failure is still reported.
        let acknowledged = self.channel.acknowledge(&envelope.id, &envelope.token).await;
        if let Err(e) = &acknowledged {
            error!(
                "Failed to acknowledge accepted submission {}: {}",
                envelope.id, e
            );
        }

        self.hand_off(session, submission).await?;
        acknowledged?;

        Ok(RouteOutcome::Accepted)
    }

    /// Create a session and present its form. If the form cannot be
    /// presented the session is expired so it can never be submitted.
    pub async fn open(&self, request: OpenSessionRequest) -> Result<Session, OpenError> {
        if !self
            .gate
            .is_enabled(request.feature, request.guild_id.as_deref())
        {
            return Err(OpenError::GateClosed {
                feature: request.feature,
                guild_id: request.guild_id,
            });
        }

        let session_id = Uuid::new_v4().simple().to_string();
        let custom_id = custom_id::encode(
            request.feature,
            request.flow,
            &session_id,
            CURRENT_SCHEMA_VERSION,
        )?;

        let session = self
            .store
            .create(NewSession {
                session_id,
                feature: request.feature,
                flow: request.flow,
                owner_user_id: request.owner_user_id,
                guild_id: request.guild_id,
                channel_id: request.channel_id,
                state_json: request.state_json,
                ttl_seconds: request.ttl_seconds.unwrap_or(self.default_ttl_seconds),
            })
            .await?;

        let form = OpenFormRequest {
            interaction_id: request.interaction_id,
            interaction_token: request.interaction_token,
            custom_id,
            title: request.title,
            fields: request.fields,
        };

        if let Err(e) = self.channel.open_form(&form).await {
            warn!(
                "Failed to present form for modal session {}: {}",
                session.session_id, e
            );
            if let Err(store_err) = self
                .store
                .set_status(&session.session_id, SessionStatus::Expired)
                .await
            {
                error!(
                    "Failed to expire orphaned modal session {}: {}",
                    session.session_id, store_err
                );
            }
            return Err(e.into());
        }

        info!(
            "Opened modal session {} for user {}",
            session.session_id, session.owner_user_id
        );
        Ok(session)
    }

    async fn reply(
        &self,
        envelope: &InteractionEnvelope,
        content: &str,
        outcome: RouteOutcome,
    ) -> Result<RouteOutcome, RouterError> {
        self.channel
            .reply_ephemeral(&envelope.id, &envelope.token, content)
            .await?;
        Ok(outcome)
    }

    async fn hand_off(
        &self,
        session: Session,
        submission: SubmissionContext,
    ) -> Result<(), RouterError> {
        let token = submission.interaction_token.clone();

        let Some(handler) = self.handlers.get(session.feature, session.flow) else {
            warn!(
                "No handler registered for {}:{}; modal session {} was accepted without processing",
                session.feature, session.flow, session.session_id
            );
            self.channel
                .follow_up(&token, &FollowUpMessage::ephemeral(replies::RECEIVED))
                .await?;
            return Ok(());
        };

        let session_id = session.session_id.clone();
        let handoff = SessionHandoff {
            feature: session.feature,
            flow: session.flow,
            session_id: session.session_id,
            state_json: session.state_json,
            submission,
        };

        if let Err(e) = handler.handle(handoff, self.channel.as_ref()).await {
            error!("Handler failed for modal session {}: {:#}", session_id, e);
            self.channel
                .follow_up(&token, &FollowUpMessage::ephemeral(replies::HANDLER_FAILED))
                .await?;
        }

        Ok(())
    }
}
