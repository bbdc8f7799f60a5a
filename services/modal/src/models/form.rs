//! Outbound form definitions

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};

use crate::validation::{FieldKind, MAX_CHECKBOX_GROUP_VALUES, MAX_TEXT_LEN, MAX_UPLOAD_FILES};

/// The channel rejects longer modal titles
pub const MAX_TITLE_LEN: usize = 45;

/// Wire code of the labelled container wrapping every field
const LABEL_COMPONENT: i64 = 18;

/// One selectable option
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChoiceOption {
    pub label: String,
    pub value: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub default: bool,
}

impl ChoiceOption {
    pub fn new(label: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            value: value.into(),
            description: None,
            default: false,
        }
    }
}

/// Input control behind a field
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldInput {
    ShortText {
        placeholder: Option<String>,
        max_length: usize,
        value: Option<String>,
    },
    Paragraph {
        placeholder: Option<String>,
        max_length: usize,
        value: Option<String>,
    },
    StringSelect {
        options: Vec<ChoiceOption>,
        max_values: usize,
    },
    UserSelect { max_values: usize },
    RoleSelect { max_values: usize },
    ChannelSelect { max_values: usize },
    MentionableSelect { max_values: usize },
    CheckboxGroup {
        options: Vec<ChoiceOption>,
        max_values: usize,
    },
    FileUpload { max_files: usize },
    RadioGroup { options: Vec<ChoiceOption> },
    Checkbox { default: bool },
}

impl FieldInput {
    pub fn kind(&self) -> FieldKind {
        match self {
            FieldInput::ShortText { .. } | FieldInput::Paragraph { .. } => FieldKind::TextInput,
            FieldInput::StringSelect { .. } => FieldKind::StringSelect,
            FieldInput::UserSelect { .. } => FieldKind::UserSelect,
            FieldInput::RoleSelect { .. } => FieldKind::RoleSelect,
            FieldInput::ChannelSelect { .. } => FieldKind::ChannelSelect,
            FieldInput::MentionableSelect { .. } => FieldKind::MentionableSelect,
            FieldInput::CheckboxGroup { .. } => FieldKind::CheckboxGroup,
            FieldInput::FileUpload { .. } => FieldKind::FileUpload,
            FieldInput::RadioGroup { .. } => FieldKind::RadioGroup,
            FieldInput::Checkbox { .. } => FieldKind::Checkbox,
        }
    }
}

/// A labelled field shown in the form
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FormField {
    pub id: String,
    pub label: String,
    pub description: Option<String>,
    pub required: bool,
    pub input: FieldInput,
}

impl FormField {
    pub fn new(id: impl Into<String>, label: impl Into<String>, input: FieldInput) -> Self {
        Self {
            id: id.into(),
            label: label.into(),
            description: None,
            required: true,
            input,
        }
    }

    pub fn short_text(id: impl Into<String>, label: impl Into<String>) -> Self {
        Self::new(
            id,
            label,
            FieldInput::ShortText {
                placeholder: None,
                max_length: MAX_TEXT_LEN,
                value: None,
            },
        )
    }

    pub fn paragraph(id: impl Into<String>, label: impl Into<String>) -> Self {
        Self::new(
            id,
            label,
            FieldInput::Paragraph {
                placeholder: None,
                max_length: MAX_TEXT_LEN,
                value: None,
            },
        )
    }

    pub fn optional(mut self) -> Self {
        self.required = false;
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Wire representation: the input wrapped in a labelled container
    pub fn to_component(&self) -> Value {
        let mut inner = Map::new();
        inner.insert("type".into(), json!(self.input.kind().code()));
        inner.insert("custom_id".into(), json!(self.id));

        match &self.input {
            FieldInput::ShortText {
                placeholder,
                max_length,
                value,
            }
            | FieldInput::Paragraph {
                placeholder,
                max_length,
                value,
            } => {
                let style = if matches!(self.input, FieldInput::ShortText { .. }) { 1 } else { 2 };
                inner.insert("style".into(), json!(style));
                inner.insert("max_length".into(), json!((*max_length).min(MAX_TEXT_LEN)));
                inner.insert("required".into(), json!(self.required));
                if let Some(placeholder) = placeholder {
                    inner.insert("placeholder".into(), json!(placeholder));
                }
                if let Some(value) = value {
                    inner.insert("value".into(), json!(value));
                }
            }
            FieldInput::StringSelect {
                options,
                max_values,
            } => {
                inner.insert("options".into(), json!(options));
                insert_bounds(&mut inner, self.required, (*max_values).max(1));
            }
            FieldInput::UserSelect { max_values }
            | FieldInput::RoleSelect { max_values }
            | FieldInput::ChannelSelect { max_values }
            | FieldInput::MentionableSelect { max_values } => {
                insert_bounds(&mut inner, self.required, (*max_values).max(1));
            }
            FieldInput::CheckboxGroup {
                options,
                max_values,
            } => {
                inner.insert("options".into(), json!(options));
                let max = (*max_values).clamp(1, MAX_CHECKBOX_GROUP_VALUES);
                insert_bounds(&mut inner, self.required, max);
            }
            FieldInput::FileUpload { max_files } => {
                let max = (*max_files).clamp(1, MAX_UPLOAD_FILES);
                insert_bounds(&mut inner, self.required, max);
            }
            FieldInput::RadioGroup { options } => {
                inner.insert("options".into(), json!(options));
                inner.insert("required".into(), json!(self.required));
            }
            FieldInput::Checkbox { default } => {
                inner.insert("default".into(), json!(default));
            }
        }

        let mut label = Map::new();
        label.insert("type".into(), json!(LABEL_COMPONENT));
        label.insert("label".into(), json!(self.label));
        if let Some(description) = &self.description {
            label.insert("description".into(), json!(description));
        }
        label.insert("component".into(), Value::Object(inner));
        Value::Object(label)
    }
}

fn insert_bounds(inner: &mut Map<String, Value>, required: bool, max_values: usize) {
    inner.insert("min_values".into(), json!(if required { 1 } else { 0 }));
    inner.insert("max_values".into(), json!(max_values));
    inner.insert("required".into(), json!(required));
}

/// Truncate a title to the channel's limit on a character boundary
pub fn clamp_title(title: &str) -> String {
    title.chars().take(MAX_TITLE_LEN).collect()
}
