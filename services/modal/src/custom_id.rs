//! Wire identifier codec
//!
//! A modal session travels through the channel inside the form's custom id:
//! `modal:<feature>:v<version>:<flow>:<session_id>`. The channel caps custom
//! ids at 100 characters, so the codec enforces the budget on encode and
//! rejects anything else on decode.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::OnceLock;
use thiserror::Error;

/// Leading segment of every protocol-owned identifier
pub const CUSTOM_ID_PREFIX: &str = "modal";

/// Externally imposed ceiling on custom id length
pub const MAX_CUSTOM_ID_LEN: usize = 100;

/// Maximum length of a session id
pub const MAX_SESSION_ID_LEN: usize = 64;

/// Schema version written by this build
pub const CURRENT_SCHEMA_VERSION: u32 = 1;

const SEGMENT_COUNT: usize = 5;

/// Errors raised while encoding an identifier. These indicate a caller
/// defect, not bad runtime data.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CustomIdError {
    #[error("unsupported feature: {0}")]
    UnsupportedFeature(String),

    #[error("unsupported flow: {0}")]
    UnsupportedFlow(String),

    #[error("invalid session id: {0:?}")]
    InvalidSessionId(String),

    #[error("invalid schema version: {0}")]
    InvalidVersion(u32),

    #[error("identifier is {0} characters long, the limit is {MAX_CUSTOM_ID_LEN}")]
    IdentifierTooLong(usize),
}

/// Features that own modal flows
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Feature {
    Todo,
    Nominations,
    Suggestions,
    History,
}

impl Feature {
    pub const ALL: [Feature; 4] = [
        Feature::Todo,
        Feature::Nominations,
        Feature::Suggestions,
        Feature::History,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Feature::Todo => "todo",
            Feature::Nominations => "nominations",
            Feature::Suggestions => "suggestions",
            Feature::History => "history",
        }
    }

    /// Flows registered for this feature in the current schema
    pub fn flows(&self) -> &'static [Flow] {
        match self {
            Feature::Todo => &[Flow::Create, Flow::Edit],
            Feature::Nominations => &[Flow::Nominate],
            Feature::Suggestions => &[Flow::Create, Flow::Review],
            Feature::History => &[Flow::Query],
        }
    }

    pub fn supports(&self, flow: Flow) -> bool {
        self.flows().contains(&flow)
    }
}

impl fmt::Display for Feature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Feature {
    type Err = CustomIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Feature::ALL
            .into_iter()
            .find(|feature| feature.as_str() == s)
            .ok_or_else(|| CustomIdError::UnsupportedFeature(s.to_string()))
    }
}

/// Flows a feature can present as a modal
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Flow {
    Create,
    Edit,
    Nominate,
    Review,
    Query,
}

impl Flow {
    pub const ALL: [Flow; 5] = [
        Flow::Create,
        Flow::Edit,
        Flow::Nominate,
        Flow::Review,
        Flow::Query,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Flow::Create => "create",
            Flow::Edit => "edit",
            Flow::Nominate => "nominate",
            Flow::Review => "review",
            Flow::Query => "query",
        }
    }
}

impl fmt::Display for Flow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Flow {
    type Err = CustomIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Flow::ALL
            .into_iter()
            .find(|flow| flow.as_str() == s)
            .ok_or_else(|| CustomIdError::UnsupportedFlow(s.to_string()))
    }
}

/// Decoded form of a wire identifier
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CustomId {
    pub feature: Feature,
    pub flow: Flow,
    pub session_id: String,
    pub version: u32,
}

impl CustomId {
    pub fn new(feature: Feature, flow: Flow, session_id: impl Into<String>) -> Self {
        Self {
            feature,
            flow,
            session_id: session_id.into(),
            version: CURRENT_SCHEMA_VERSION,
        }
    }

    pub fn encode(&self) -> Result<String, CustomIdError> {
        encode(self.feature, self.flow, &self.session_id, self.version)
    }
}

/// Check a session id against `[A-Za-z0-9_-]{1,64}`
pub fn is_valid_session_id(session_id: &str) -> bool {
    static SESSION_ID_REGEX: OnceLock<Regex> = OnceLock::new();
    let regex = SESSION_ID_REGEX.get_or_init(|| {
        Regex::new(r"^[A-Za-z0-9_-]{1,64}$").expect("Failed to compile session id regex")
    });

    regex.is_match(session_id)
}

/// True when the identifier carries the protocol prefix. Says nothing about
/// whether the rest of it decodes.
pub fn is_protocol_id(custom_id: &str) -> bool {
    custom_id
        .strip_prefix(CUSTOM_ID_PREFIX)
        .is_some_and(|rest| rest.starts_with(':'))
}

/// Build the wire identifier for a session
pub fn encode(
    feature: Feature,
    flow: Flow,
    session_id: &str,
    version: u32,
) -> Result<String, CustomIdError> {
    if !feature.supports(flow) {
        return Err(CustomIdError::UnsupportedFlow(format!("{}:{}", feature, flow)));
    }

    if !is_valid_session_id(session_id) {
        return Err(CustomIdError::InvalidSessionId(session_id.to_string()));
    }

    if version == 0 {
        return Err(CustomIdError::InvalidVersion(version));
    }

    let encoded = format!(
        "{}:{}:v{}:{}:{}",
        CUSTOM_ID_PREFIX, feature, version, flow, session_id
    );

    if encoded.len() > MAX_CUSTOM_ID_LEN {
        return Err(CustomIdError::IdentifierTooLong(encoded.len()));
    }

    Ok(encoded)
}

/// Decode an untrusted identifier. Returns `None` on any mismatch.
///
/// Versions newer than [`CURRENT_SCHEMA_VERSION`] are accepted; the feature
/// and flow must still belong to the current vocabulary.
pub fn decode(custom_id: &str) -> Option<CustomId> {
    if custom_id.len() > MAX_CUSTOM_ID_LEN {
        return None;
    }

    let segments: Vec<&str> = custom_id.split(':').collect();
    if segments.len() != SEGMENT_COUNT || segments[0] != CUSTOM_ID_PREFIX {
        return None;
    }

    let feature: Feature = segments[1].parse().ok()?;
    let version = parse_version(segments[2])?;
    let flow: Flow = segments[3].parse().ok()?;
    let session_id = segments[4];

    if !feature.supports(flow) || !is_valid_session_id(session_id) {
        return None;
    }

    Some(CustomId {
        feature,
        flow,
        session_id: session_id.to_string(),
        version,
    })
}

fn parse_version(segment: &str) -> Option<u32> {
    let digits = segment.strip_prefix('v')?;
    if digits.is_empty() || digits.starts_with('0') || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }

    match digits.parse::<u32>() {
        Ok(0) | Err(_) => None,
        Ok(version) => Some(version),
    }
}
