//! Channel adapter
//!
//! The only place that talks to the interaction channel over the network or
//! reads its native event shape. Outbound calls run under a fixed timeout;
//! inbound payloads are treated as untrusted and never cause a panic.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::collections::HashMap;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};

use crate::custom_id::{self, MAX_CUSTOM_ID_LEN};
use crate::models::form::clamp_title;
use crate::models::{AttachmentInfo, FormField, SubmissionContext, SubmissionValue};
use crate::validation::{ValidationError, validate_submission};

/// Default REST base of the channel
pub const DEFAULT_API_BASE: &str = "https://discord.com/api/v10";

/// Budget for a single outbound call
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(8);

/// Interaction type of a component press
pub const INTERACTION_COMPONENT: i64 = 3;

/// Interaction type of a form submission
pub const INTERACTION_MODAL_SUBMIT: i64 = 5;

const RESPONSE_CHANNEL_MESSAGE: i64 = 4;
const RESPONSE_DEFERRED_CHANNEL_MESSAGE: i64 = 5;
const RESPONSE_MODAL: i64 = 9;

const FLAG_EPHEMERAL: u64 = 1 << 6;

/// "Unknown interaction": the token expired or was already consumed
pub const ERROR_UNKNOWN_INTERACTION: i64 = 10062;

/// "Interaction has already been acknowledged"
pub const ERROR_ALREADY_ACKNOWLEDGED: i64 = 40060;

/// Errors raised by outbound channel calls
#[derive(Error, Debug)]
pub enum ChannelError {
    /// The identifier does not decode or is too long; nothing was sent
    #[error(
        "custom id {custom_id:?} ({length} characters) is not a valid identifier within {MAX_CUSTOM_ID_LEN} characters"
    )]
    IdentifierLengthExceeded { custom_id: String, length: usize },

    #[error("{endpoint} timed out after {timeout:?}")]
    Timeout { endpoint: String, timeout: Duration },

    #[error("{endpoint} rejected the request with status {status}: {body}")]
    RequestRejected {
        endpoint: String,
        status: u16,
        body: String,
    },

    #[error("{endpoint} request failed: {source}")]
    Transport {
        endpoint: String,
        #[source]
        source: reqwest::Error,
    },
}

impl ChannelError {
    /// JSON error code carried by a rejected request, if any
    pub fn error_code(&self) -> Option<i64> {
        match self {
            ChannelError::RequestRejected { body, .. } => serde_json::from_str::<Value>(body)
                .ok()
                .and_then(|value| value.get("code").and_then(Value::as_i64)),
            _ => None,
        }
    }

    /// True for the two acknowledgement races that are harmless
    pub fn is_acknowledgement_race(&self) -> bool {
        matches!(
            self.error_code(),
            Some(ERROR_ALREADY_ACKNOWLEDGED | ERROR_UNKNOWN_INTERACTION)
        )
    }
}

/// Request to present a form in response to an interaction
#[derive(Debug, Clone)]
pub struct OpenFormRequest {
    pub interaction_id: String,
    pub interaction_token: String,
    /// Encoded wire identifier
    pub custom_id: String,
    pub title: String,
    pub fields: Vec<FormField>,
}

impl OpenFormRequest {
    /// Callback body presenting the form
    pub fn to_payload(&self) -> Value {
        let components: Vec<Value> = self.fields.iter().map(FormField::to_component).collect();
        json!({
            "type": RESPONSE_MODAL,
            "data": {
                "custom_id": self.custom_id,
                "title": clamp_title(&self.title),
                "components": components,
            }
        })
    }
}

/// Message sent after an interaction was acknowledged
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FollowUpMessage {
    pub content: String,
    pub ephemeral: bool,
}

impl FollowUpMessage {
    pub fn ephemeral(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            ephemeral: true,
        }
    }

    fn to_payload(&self) -> Value {
        let mut payload = json!({ "content": self.content });
        if self.ephemeral {
            payload["flags"] = json!(FLAG_EPHEMERAL);
        }
        payload
    }
}

/// Outbound operations the protocol needs from the channel
#[async_trait]
pub trait InteractionChannel: Send + Sync {
    /// Present a form. Fails before any call when the identifier cannot be sent.
    async fn open_form(&self, request: &OpenFormRequest) -> Result<(), ChannelError>;

    /// Send a deferred, ephemeral acknowledgement. Benign races are swallowed.
    async fn acknowledge(
        &self,
        interaction_id: &str,
        interaction_token: &str,
    ) -> Result<(), ChannelError>;

    /// Send a message after the interaction was acknowledged
    async fn follow_up(
        &self,
        interaction_token: &str,
        message: &FollowUpMessage,
    ) -> Result<(), ChannelError>;

    /// Answer the interaction with a message only its user can see
    async fn reply_ephemeral(
        &self,
        interaction_id: &str,
        interaction_token: &str,
        content: &str,
    ) -> Result<(), ChannelError>;
}

/// Settings for [`DiscordChannel`]
#[derive(Debug, Clone)]
pub struct ChannelConfig {
    pub api_base: String,
    pub application_id: String,
    pub timeout: Duration,
}

impl ChannelConfig {
    pub fn new(application_id: impl Into<String>) -> Self {
        Self {
            api_base: DEFAULT_API_BASE.to_string(),
            application_id: application_id.into(),
            timeout: DEFAULT_TIMEOUT,
        }
    }
}

/// REST implementation of [`InteractionChannel`]
#[derive(Debug, Clone)]
pub struct DiscordChannel {
    client: reqwest::Client,
    config: ChannelConfig,
}

impl DiscordChannel {
    pub fn new(config: ChannelConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            config,
        }
    }

    fn callback_url(&self, interaction_id: &str, interaction_token: &str) -> (String, String) {
        let base = self.config.api_base.trim_end_matches('/');
        (
            format!("{}/interactions/{}/{}/callback", base, interaction_id, interaction_token),
            format!("POST /interactions/{}/:token/callback", interaction_id),
        )
    }

    fn webhook_url(&self, interaction_token: &str) -> (String, String) {
        let base = self.config.api_base.trim_end_matches('/');
        (
            format!("{}/webhooks/{}/{}", base, self.config.application_id, interaction_token),
            format!("POST /webhooks/{}/:token", self.config.application_id),
        )
    }

    /// POST a JSON body under the timeout budget. `endpoint` is the
    /// token-free label used in errors and logs.
    async fn post(&self, url: String, endpoint: String, body: Value) -> Result<(), ChannelError> {
        debug!("Calling {}", endpoint);

        let call = async {
            let response = self
                .client
                .post(&url)
                .json(&body)
                .send()
                .await
                .map_err(|source| ChannelError::Transport {
                    endpoint: endpoint.clone(),
                    source,
                })?;

            let status = response.status();
            if status.is_success() {
                return Ok(());
            }

            let body = response.text().await.unwrap_or_default();
            Err(ChannelError::RequestRejected {
                endpoint: endpoint.clone(),
                status: status.as_u16(),
                body,
            })
        };

        match tokio::time::timeout(self.config.timeout, call).await {
            Ok(result) => result,
            Err(_) => Err(ChannelError::Timeout {
                endpoint,
                timeout: self.config.timeout,
            }),
        }
    }
}

#[async_trait]
impl InteractionChannel for DiscordChannel {
    async fn open_form(&self, request: &OpenFormRequest) -> Result<(), ChannelError> {
        if custom_id::decode(&request.custom_id).is_none() {
            return Err(ChannelError::IdentifierLengthExceeded {
                custom_id: request.custom_id.clone(),
                length: request.custom_id.len(),
            });
        }

        let (url, endpoint) = self.callback_url(&request.interaction_id, &request.interaction_token);
        self.post(url, endpoint, request.to_payload()).await
    }

    async fn acknowledge(
        &self,
        interaction_id: &str,
        interaction_token: &str,
    ) -> Result<(), ChannelError> {
        let (url, endpoint) = self.callback_url(interaction_id, interaction_token);
        let body = json!({
            "type": RESPONSE_DEFERRED_CHANNEL_MESSAGE,
            "data": { "flags": FLAG_EPHEMERAL }
        });

        match self.post(url, endpoint, body).await {
            Err(e) if e.is_acknowledgement_race() => {
                warn!("Ignoring acknowledgement race for {}: {}", interaction_id, e);
                Ok(())
            }
            other => other,
        }
    }

    async fn follow_up(
        &self,
        interaction_token: &str,
        message: &FollowUpMessage,
    ) -> Result<(), ChannelError> {
        let (url, endpoint) = self.webhook_url(interaction_token);
        self.post(url, endpoint, message.to_payload()).await
    }

    async fn reply_ephemeral(
        &self,
        interaction_id: &str,
        interaction_token: &str,
        content: &str,
    ) -> Result<(), ChannelError> {
        let (url, endpoint) = self.callback_url(interaction_id, interaction_token);
        let body = json!({
            "type": RESPONSE_CHANNEL_MESSAGE,
            "data": { "content": content, "flags": FLAG_EPHEMERAL }
        });
        self.post(url, endpoint, body).await
    }
}

/// Kinds of inbound event the protocol looks at
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InteractionKind {
    Component,
    ModalSubmit,
}

/// Routing-relevant slice of an inbound event
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InteractionEnvelope {
    pub id: String,
    pub token: String,
    pub kind: InteractionKind,
    pub custom_id: String,
    pub user_id: Option<String>,
    pub guild_id: Option<String>,
}

/// Read the envelope of a component or submission event. Anything else,
/// or an event missing its id, token or custom id, yields `None`.
pub fn parse_envelope(raw: &Value) -> Option<InteractionEnvelope> {
    let kind = match raw.get("type").and_then(Value::as_i64)? {
        INTERACTION_COMPONENT => InteractionKind::Component,
        INTERACTION_MODAL_SUBMIT => InteractionKind::ModalSubmit,
        _ => return None,
    };

    Some(InteractionEnvelope {
        id: string_at(raw, &["id"])?,
        token: string_at(raw, &["token"])?,
        kind,
        custom_id: string_at(raw, &["data", "custom_id"])?,
        user_id: user_id(raw),
        guild_id: string_at(raw, &["guild_id"]),
    })
}

/// Why a payload could not become a [`SubmissionContext`]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SubmissionParseError {
    #[error("payload is not an object")]
    NotAnObject,

    #[error("payload is not a form submission (type {0:?})")]
    NotASubmission(Option<i64>),

    #[error("payload failed validation: {0}")]
    Invalid(#[from] ValidationError),

    #[error("custom id {0:?} is not a protocol identifier")]
    UnknownIdentifier(String),

    #[error("payload has no {0}")]
    MissingField(&'static str),
}

/// Extract a submission context, logging and discarding bad payloads
pub fn parse_submission(raw: &Value) -> Option<SubmissionContext> {
    match try_parse_submission(raw) {
        Ok(context) => Some(context),
        Err(e) => {
            warn!("Discarding submission payload: {}", e);
            None
        }
    }
}

/// Extract a submission context, reporting why a payload was rejected
pub fn try_parse_submission(raw: &Value) -> Result<SubmissionContext, SubmissionParseError> {
    if !raw.is_object() {
        return Err(SubmissionParseError::NotAnObject);
    }

    let kind = raw.get("type").and_then(Value::as_i64);
    if kind != Some(INTERACTION_MODAL_SUBMIT) {
        return Err(SubmissionParseError::NotASubmission(kind));
    }

    let data = raw
        .get("data")
        .ok_or(SubmissionParseError::MissingField("data"))?;
    let validated = validate_submission(data)?;

    let decoded = custom_id::decode(&validated.custom_id)
        .ok_or_else(|| SubmissionParseError::UnknownIdentifier(validated.custom_id.clone()))?;

    let interaction_id =
        string_at(raw, &["id"]).ok_or(SubmissionParseError::MissingField("id"))?;
    let interaction_token =
        string_at(raw, &["token"]).ok_or(SubmissionParseError::MissingField("token"))?;
    let user_id = user_id(raw).ok_or(SubmissionParseError::MissingField("user id"))?;

    let values: HashMap<String, SubmissionValue> = validated
        .fields
        .into_iter()
        .map(|field| (field.id, SubmissionValue::from(field.value)))
        .collect();

    Ok(SubmissionContext {
        interaction_id,
        interaction_token,
        custom_id: validated.custom_id,
        decoded,
        user_id,
        guild_id: string_at(raw, &["guild_id"]),
        channel_id: string_at(raw, &["channel_id"])
            .or_else(|| string_at(raw, &["channel", "id"])),
        values,
        attachments: attachments(data),
    })
}

fn string_at(value: &Value, path: &[&str]) -> Option<String> {
    let mut current = value;
    for key in path {
        current = current.get(*key)?;
    }
    current
        .as_str()
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

/// Guild events carry the user under `member`, direct messages at the top
fn user_id(raw: &Value) -> Option<String> {
    string_at(raw, &["member", "user", "id"]).or_else(|| string_at(raw, &["user", "id"]))
}

fn attachments(data: &Value) -> HashMap<String, AttachmentInfo> {
    let Some(table) = data
        .get("resolved")
        .and_then(|resolved| resolved.get("attachments"))
        .and_then(Value::as_object)
    else {
        return HashMap::new();
    };

    table
        .iter()
        .filter(|(_, entry)| entry.is_object())
        .map(|(key, entry)| {
            let info = AttachmentInfo {
                id: string_at(entry, &["id"]).unwrap_or_else(|| key.clone()),
                filename: string_at(entry, &["filename"]),
                content_type: string_at(entry, &["content_type"]),
                size: entry.get("size").and_then(Value::as_u64),
                url: string_at(entry, &["url"]),
            };
            (key.clone(), info)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::custom_id::{Feature, Flow};

    fn submission_event() -> Value {
        json!({
            "id": "1100",
            "token": "tok",
            "type": 5,
            "guild_id": "g1",
            "channel_id": "c1",
            "member": { "user": { "id": "u1" } },
            "data": {
                "custom_id": "modal:todo:v1:create:abc123",
                "components": [
                    { "type": 18, "component": { "type": 4, "custom_id": "title", "value": "Buy milk" } },
                    { "type": 18, "component": { "type": 19, "custom_id": "photo", "values": ["77"] } },
                    { "type": 18, "component": { "type": 21, "custom_id": "priority", "value": null } }
                ],
                "resolved": {
                    "attachments": {
                        "77": { "id": "77", "filename": "milk.png", "size": 1024, "url": "https://cdn/milk.png" }
                    }
                }
            }
        })
    }

    #[test]
    fn test_parse_submission_normalises_payload() {
        let context = parse_submission(&submission_event()).unwrap();

        assert_eq!(context.interaction_id, "1100");
        assert_eq!(context.user_id, "u1");
        assert_eq!(context.guild_id.as_deref(), Some("g1"));
        assert_eq!(context.channel_id.as_deref(), Some("c1"));
        assert_eq!(context.decoded.feature, Feature::Todo);
        assert_eq!(context.decoded.flow, Flow::Create);
        assert_eq!(context.decoded.session_id, "abc123");
        assert_eq!(context.text("title"), Some("Buy milk"));
        assert_eq!(context.list("photo"), Some(&["77".to_string()][..]));
        assert_eq!(context.values["priority"], SubmissionValue::Null);
        assert_eq!(context.attachments["77"].filename.as_deref(), Some("milk.png"));
        assert_eq!(context.attachments["77"].size, Some(1024));
    }

    #[test]
    fn test_parse_submission_reads_dm_user() {
        let mut event = submission_event();
        event.as_object_mut().unwrap().remove("member");
        event["user"] = json!({ "id": "dm-user" });
        assert_eq!(parse_submission(&event).unwrap().user_id, "dm-user");
    }

    #[test]
    fn test_parse_submission_rejects_bad_payloads() {
        assert_eq!(
            try_parse_submission(&json!([1, 2])),
            Err(SubmissionParseError::NotAnObject)
        );

        let mut component = submission_event();
        component["type"] = json!(3);
        assert_eq!(
            try_parse_submission(&component),
            Err(SubmissionParseError::NotASubmission(Some(3)))
        );

        let mut invalid = submission_event();
        invalid["data"]["components"] = json!([]);
        assert_eq!(
            try_parse_submission(&invalid),
            Err(SubmissionParseError::Invalid(ValidationError::NoFields))
        );

        let mut foreign = submission_event();
        foreign["data"]["custom_id"] = json!("legacy:form");
        assert!(matches!(
            try_parse_submission(&foreign),
            Err(SubmissionParseError::UnknownIdentifier(_))
        ));

        let mut anonymous = submission_event();
        anonymous.as_object_mut().unwrap().remove("member");
        assert_eq!(
            try_parse_submission(&anonymous),
            Err(SubmissionParseError::MissingField("user id"))
        );

        assert!(parse_submission(&Value::Null).is_none());
    }

    #[test]
    fn test_parse_envelope() {
        let envelope = parse_envelope(&submission_event()).unwrap();
        assert_eq!(envelope.kind, InteractionKind::ModalSubmit);
        assert_eq!(envelope.custom_id, "modal:todo:v1:create:abc123");
        assert_eq!(envelope.user_id.as_deref(), Some("u1"));

        let ping = json!({ "id": "1", "token": "t", "type": 1 });
        assert_eq!(parse_envelope(&ping), None);

        let no_token = json!({ "id": "1", "type": 3, "data": { "custom_id": "modal:x" } });
        assert_eq!(parse_envelope(&no_token), None);
    }

    #[test]
    fn test_error_code_classification() {
        let race = ChannelError::RequestRejected {
            endpoint: "POST /x".into(),
            status: 400,
            body: r#"{"message":"Interaction has already been acknowledged.","code":40060}"#.into(),
        };
        assert!(race.is_acknowledgement_race());

        let other = ChannelError::RequestRejected {
            endpoint: "POST /x".into(),
            status: 400,
            body: r#"{"message":"Invalid Form Body","code":50035}"#.into(),
        };
        assert_eq!(other.error_code(), Some(50035));
        assert!(!other.is_acknowledgement_race());

        let opaque = ChannelError::RequestRejected {
            endpoint: "POST /x".into(),
            status: 502,
            body: "Bad Gateway".into(),
        };
        assert_eq!(opaque.error_code(), None);
    }

    #[test]
    fn test_open_form_payload() {
        let request = OpenFormRequest {
            interaction_id: "1".into(),
            interaction_token: "t".into(),
            custom_id: "modal:todo:v1:create:abc".into(),
            title: "New todo".into(),
            fields: vec![FormField::short_text("title", "Title")],
        };

        let payload = request.to_payload();
        assert_eq!(payload["type"], 9);
        assert_eq!(payload["data"]["custom_id"], "modal:todo:v1:create:abc");
        assert_eq!(payload["data"]["components"][0]["component"]["custom_id"], "title");
    }
}
