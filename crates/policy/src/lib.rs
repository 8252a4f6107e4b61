use linkform_contracts::{FieldDescriptor, ResolvedField};
use serde_json::{Map, Value};

/// Record attribute values keyed by field name, as fetched from the store or
/// submitted by a client.
pub type RecordFields = Map<String, Value>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteError {
    MissingRequired(String),
}

impl std::fmt::Display for WriteError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            WriteError::MissingRequired(name) => {
                write!(f, "required field `{}` is missing or empty", name)
            }
        }
    }
}

impl std::error::Error for WriteError {}

/// Joins each descriptor with the record's current value, in descriptor
/// order. Descriptor order is the render order. An attribute the record does
/// not carry resolves to `Null`, never an error.
pub fn map_for_display(descriptors: &[FieldDescriptor], record: &RecordFields) -> Vec<ResolvedField> {
    descriptors
        .iter()
        .map(|descriptor| ResolvedField {
            field: descriptor.clone(),
            value: record.get(&descriptor.name).cloned().unwrap_or(Value::Null),
        })
        .collect()
}

/// Filters an untrusted edit set down to the fields the token permits.
///
/// Required descriptors must have a non-empty edit value or the whole write
/// is rejected before anything leaves this function. Readonly descriptors
/// are dropped even when the client submitted a value for them; this is the
/// server-side security boundary, independent of any client-side disabling.
/// Edit keys with no matching descriptor are never forwarded.
pub fn map_for_write(
    descriptors: &[FieldDescriptor],
    edits: &RecordFields,
) -> Result<RecordFields, WriteError> {
    for descriptor in descriptors {
        if descriptor.required && !is_present(edits.get(&descriptor.name)) {
            return Err(WriteError::MissingRequired(descriptor.name.clone()));
        }
    }

    let mut out = Map::new();
    for descriptor in descriptors {
        if descriptor.readonly {
            continue;
        }
        if let Some(value) = edits.get(&descriptor.name) {
            out.insert(descriptor.name.clone(), value.clone());
        }
    }

    Ok(out)
}

/// The fixed write for confirm mode: exactly one field set to the token's
/// confirm state, defaulting to `true` when the claim is absent.
pub fn confirm_write(confirm_field: &str, confirm_state: Option<&Value>) -> RecordFields {
    let mut out = Map::new();
    out.insert(
        confirm_field.to_string(),
        confirm_state.cloned().unwrap_or(Value::Bool(true)),
    );
    out
}

/// Whether the record already holds the confirm state.
pub fn confirm_current_state(
    record: &RecordFields,
    confirm_field: &str,
    confirm_state: Option<&Value>,
) -> bool {
    let expected = confirm_state.cloned().unwrap_or(Value::Bool(true));
    record.get(confirm_field) == Some(&expected)
}

fn is_present(value: Option<&Value>) -> bool {
    match value {
        None | Some(Value::Null) => false,
        Some(Value::String(s)) => !s.trim().is_empty(),
        Some(_) => true,
    }
}
