//! Normalised view of an inbound form submission

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::custom_id::CustomId;
use crate::validation::FieldValue;

/// Value of a single submitted field
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SubmissionValue {
    Text(String),
    List(Vec<String>),
    Flag(bool),
    Null,
}

impl From<FieldValue> for SubmissionValue {
    fn from(value: FieldValue) -> Self {
        match value {
            FieldValue::Text(text) => SubmissionValue::Text(text),
            FieldValue::Selection(values) | FieldValue::Attachments(values) => {
                SubmissionValue::List(values)
            }
            FieldValue::Choice(Some(choice)) => SubmissionValue::Text(choice),
            FieldValue::Choice(None) => SubmissionValue::Null,
            FieldValue::Toggle(checked) => SubmissionValue::Flag(checked),
        }
    }
}

/// Metadata the channel resolved for an uploaded file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttachmentInfo {
    pub id: String,
    pub filename: Option<String>,
    pub content_type: Option<String>,
    pub size: Option<u64>,
    pub url: Option<String>,
}

/// Everything downstream code needs from one submission event. Built fresh
/// per event and never persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SubmissionContext {
    pub interaction_id: String,
    pub interaction_token: String,
    pub custom_id: String,
    #[serde(skip)]
    pub decoded: CustomId,
    pub user_id: String,
    pub guild_id: Option<String>,
    pub channel_id: Option<String>,
    pub values: HashMap<String, SubmissionValue>,
    pub attachments: HashMap<String, AttachmentInfo>,
}

impl SubmissionContext {
    pub fn text(&self, field_id: &str) -> Option<&str> {
        match self.values.get(field_id) {
            Some(SubmissionValue::Text(text)) => Some(text),
            _ => None,
        }
    }

    pub fn list(&self, field_id: &str) -> Option<&[String]> {
        match self.values.get(field_id) {
            Some(SubmissionValue::List(values)) => Some(values),
            _ => None,
        }
    }

    pub fn flag(&self, field_id: &str) -> Option<bool> {
        match self.values.get(field_id) {
            Some(SubmissionValue::Flag(checked)) => Some(*checked),
            _ => None,
        }
    }
}
