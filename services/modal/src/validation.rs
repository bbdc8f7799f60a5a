//! Structural validation of submitted forms
//!
//! The channel delivers a submission as a loosely typed component tree. This
//! module flattens it once into a typed list of fields and rejects anything
//! it does not recognise. No business logic sees the raw tree.

use serde_json::{Map, Value};
use std::collections::HashSet;
use thiserror::Error;

use crate::custom_id::MAX_CUSTOM_ID_LEN;

/// Maximum length of a field id
pub const MAX_FIELD_ID_LEN: usize = 100;

/// Maximum characters in a text input value
pub const MAX_TEXT_LEN: usize = 4000;

/// Maximum selections in a checkbox group
pub const MAX_CHECKBOX_GROUP_VALUES: usize = 25;

/// Maximum files in a single upload field
pub const MAX_UPLOAD_FILES: usize = 10;

/// Why a submission was rejected. The first defect found wins.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("submission data is not an object")]
    NotAnObject,

    #[error("submission has no custom id")]
    MissingCustomId,

    #[error("custom id is {0} characters long, the limit is {MAX_CUSTOM_ID_LEN}")]
    CustomIdTooLong(usize),

    #[error("submission has no component list")]
    MissingComponents,

    #[error("submission contains no fields")]
    NoFields,

    #[error("malformed component: {0}")]
    MalformedComponent(String),

    #[error("containers may not be nested")]
    NestedContainer,

    #[error("unsupported component type {0}")]
    UnsupportedKind(i64),

    #[error("field has an empty or missing id")]
    MissingFieldId,

    #[error("field id is {0} characters long, the limit is {MAX_FIELD_ID_LEN}")]
    FieldIdTooLong(usize),

    #[error("duplicate field id {0:?}")]
    DuplicateFieldId(String),

    #[error("field {field:?}: {reason}")]
    InvalidValue { field: String, reason: String },
}

impl ValidationError {
    fn invalid(field: &str, reason: impl Into<String>) -> Self {
        ValidationError::InvalidValue {
            field: field.to_string(),
            reason: reason.into(),
        }
    }
}

/// Field kinds a form may contain
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FieldKind {
    TextInput,
    StringSelect,
    UserSelect,
    RoleSelect,
    MentionableSelect,
    ChannelSelect,
    CheckboxGroup,
    FileUpload,
    RadioGroup,
    Checkbox,
}

impl FieldKind {
    /// Component type code used on the wire
    pub fn code(&self) -> i64 {
        match self {
            FieldKind::StringSelect => 3,
            FieldKind::TextInput => 4,
            FieldKind::UserSelect => 5,
            FieldKind::RoleSelect => 6,
            FieldKind::MentionableSelect => 7,
            FieldKind::ChannelSelect => 8,
            FieldKind::FileUpload => 19,
            FieldKind::RadioGroup => 21,
            FieldKind::CheckboxGroup => 22,
            FieldKind::Checkbox => 23,
        }
    }
}

/// Containers that group fields
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ContainerKind {
    /// Holds its fields in `components`
    ActionRow,
    /// Holds exactly one field in `component`
    Label,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ComponentKind {
    Container(ContainerKind),
    Field(FieldKind),
}

impl ComponentKind {
    fn from_code(code: i64) -> Option<Self> {
        let kind = match code {
            1 => ComponentKind::Container(ContainerKind::ActionRow),
            18 => ComponentKind::Container(ContainerKind::Label),
            3 => ComponentKind::Field(FieldKind::StringSelect),
            4 => ComponentKind::Field(FieldKind::TextInput),
            5 => ComponentKind::Field(FieldKind::UserSelect),
            6 => ComponentKind::Field(FieldKind::RoleSelect),
            7 => ComponentKind::Field(FieldKind::MentionableSelect),
            8 => ComponentKind::Field(FieldKind::ChannelSelect),
            19 => ComponentKind::Field(FieldKind::FileUpload),
            21 => ComponentKind::Field(FieldKind::RadioGroup),
            22 => ComponentKind::Field(FieldKind::CheckboxGroup),
            23 => ComponentKind::Field(FieldKind::Checkbox),
            _ => return None,
        };
        Some(kind)
    }
}

/// Value carried by a validated field
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldValue {
    Text(String),
    Selection(Vec<String>),
    Attachments(Vec<String>),
    Choice(Option<String>),
    Toggle(bool),
}

/// A leaf field that passed validation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmittedField {
    pub id: String,
    pub kind: FieldKind,
    pub value: FieldValue,
}

/// Typed view of a structurally valid submission
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedSubmission {
    pub custom_id: String,
    pub fields: Vec<SubmittedField>,
}

/// Validate the `data` object of a form submission event.
pub fn validate_submission(data: &Value) -> Result<ValidatedSubmission, ValidationError> {
    let data = data.as_object().ok_or(ValidationError::NotAnObject)?;

    let custom_id = match data.get("custom_id").and_then(Value::as_str) {
        Some(id) if !id.is_empty() => id,
        _ => return Err(ValidationError::MissingCustomId),
    };
    if custom_id.len() > MAX_CUSTOM_ID_LEN {
        return Err(ValidationError::CustomIdTooLong(custom_id.len()));
    }

    let components = data
        .get("components")
        .and_then(Value::as_array)
        .ok_or(ValidationError::MissingComponents)?;

    let attachments = data
        .get("resolved")
        .and_then(|resolved| resolved.get("attachments"))
        .and_then(Value::as_object);

    let leaves = flatten(components)?;
    if leaves.is_empty() {
        return Err(ValidationError::NoFields);
    }

    let mut seen = HashSet::new();
    let mut fields = Vec::with_capacity(leaves.len());
    for (kind, leaf) in leaves {
        let field = validate_field(kind, leaf, attachments)?;
        if !seen.insert(field.id.clone()) {
            return Err(ValidationError::DuplicateFieldId(field.id));
        }
        fields.push(field);
    }

    Ok(ValidatedSubmission {
        custom_id: custom_id.to_string(),
        fields,
    })
}

fn component_kind(component: &Value) -> Result<(ComponentKind, &Map<String, Value>), ValidationError> {
    let object = component
        .as_object()
        .ok_or_else(|| ValidationError::MalformedComponent("component is not an object".into()))?;
    let code = object
        .get("type")
        .and_then(Value::as_i64)
        .ok_or_else(|| ValidationError::MalformedComponent("component has no type".into()))?;
    let kind = ComponentKind::from_code(code).ok_or(ValidationError::UnsupportedKind(code))?;
    Ok((kind, object))
}

/// Collect leaf fields from at most two levels: top-level entries are either
/// fields or containers whose children are fields.
fn flatten(components: &[Value]) -> Result<Vec<(FieldKind, &Map<String, Value>)>, ValidationError> {
    let mut leaves = Vec::new();

    for component in components {
        let (kind, object) = component_kind(component)?;
        match kind {
            ComponentKind::Field(field) => leaves.push((field, object)),
            ComponentKind::Container(ContainerKind::ActionRow) => {
                let children = object
                    .get("components")
                    .and_then(Value::as_array)
                    .ok_or_else(|| {
                        ValidationError::MalformedComponent("action row has no components".into())
                    })?;
                for child in children {
                    leaves.push(leaf(child)?);
                }
            }
            ComponentKind::Container(ContainerKind::Label) => {
                let child = object.get("component").ok_or_else(|| {
                    ValidationError::MalformedComponent("label has no component".into())
                })?;
                leaves.push(leaf(child)?);
            }
        }
    }

    Ok(leaves)
}

fn leaf(component: &Value) -> Result<(FieldKind, &Map<String, Value>), ValidationError> {
    match component_kind(component)? {
        (ComponentKind::Field(kind), object) => Ok((kind, object)),
        (ComponentKind::Container(_), _) => Err(ValidationError::NestedContainer),
    }
}

fn validate_field(
    kind: FieldKind,
    object: &Map<String, Value>,
    attachments: Option<&Map<String, Value>>,
) -> Result<SubmittedField, ValidationError> {
    let id = match object.get("custom_id").and_then(Value::as_str) {
        Some(id) if !id.is_empty() => id,
        _ => return Err(ValidationError::MissingFieldId),
    };
    if id.len() > MAX_FIELD_ID_LEN {
        return Err(ValidationError::FieldIdTooLong(id.len()));
    }

    let value = match kind {
        FieldKind::TextInput => {
            let text = object
                .get("value")
                .and_then(Value::as_str)
                .ok_or_else(|| ValidationError::invalid(id, "text value must be a string"))?;
            let length = text.chars().count();
            if length > MAX_TEXT_LEN {
                return Err(ValidationError::invalid(
                    id,
                    format!("text is {} characters long, the limit is {}", length, MAX_TEXT_LEN),
                ));
            }
            FieldValue::Text(text.to_string())
        }
        FieldKind::StringSelect
        | FieldKind::UserSelect
        | FieldKind::RoleSelect
        | FieldKind::MentionableSelect
        | FieldKind::ChannelSelect => FieldValue::Selection(string_list(id, object)?),
        FieldKind::CheckboxGroup => {
            let values = string_list(id, object)?;
            if values.len() > MAX_CHECKBOX_GROUP_VALUES {
                return Err(ValidationError::invalid(
                    id,
                    format!(
                        "{} options checked, the limit is {}",
                        values.len(),
                        MAX_CHECKBOX_GROUP_VALUES
                    ),
                ));
            }
            FieldValue::Selection(values)
        }
        FieldKind::FileUpload => {
            let values = string_list(id, object)?;
            if values.is_empty() {
                return Err(ValidationError::invalid(id, "no files uploaded"));
            }
            if values.len() > MAX_UPLOAD_FILES {
                return Err(ValidationError::invalid(
                    id,
                    format!("{} files uploaded, the limit is {}", values.len(), MAX_UPLOAD_FILES),
                ));
            }
            if let Some(missing) = values
                .iter()
                .find(|attachment| !attachments.is_some_and(|table| table.contains_key(*attachment)))
            {
                return Err(ValidationError::invalid(
                    id,
                    format!("attachment {} is not resolved", missing),
                ));
            }
            FieldValue::Attachments(values)
        }
        FieldKind::RadioGroup => match object.get("value") {
            None | Some(Value::Null) => FieldValue::Choice(None),
            Some(Value::String(choice)) => FieldValue::Choice(Some(choice.clone())),
            Some(_) => {
                return Err(ValidationError::invalid(id, "choice must be a string or null"));
            }
        },
        FieldKind::Checkbox => {
            let checked = object
                .get("value")
                .and_then(Value::as_bool)
                .ok_or_else(|| ValidationError::invalid(id, "checkbox value must be a boolean"))?;
            FieldValue::Toggle(checked)
        }
    };

    Ok(SubmittedField {
        id: id.to_string(),
        kind,
        value,
    })
}

fn string_list(id: &str, object: &Map<String, Value>) -> Result<Vec<String>, ValidationError> {
    let values = object
        .get("values")
        .and_then(Value::as_array)
        .ok_or_else(|| ValidationError::invalid(id, "values must be a list"))?;

    values
        .iter()
        .map(|value| {
            value
                .as_str()
                .map(str::to_string)
                .ok_or_else(|| ValidationError::invalid(id, "every value must be a string"))
        })
        .collect()
}
