use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Edit widget for one record attribute. The set is closed: a token minted
/// with a `type` this version does not know falls back to `Text` rather than
/// rendering nothing.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
    Textarea,
    #[default]
    #[serde(other)]
    Text,
}

/// Schema entry declared inside a token. Controls both render behavior and
/// write permission for one record attribute; `readonly` is enforced
/// server-side on every write, not just in the UI.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldDescriptor {
    pub name: String,
    #[serde(rename = "type", default)]
    pub field_type: FieldType,
    #[serde(default)]
    pub readonly: bool,
    #[serde(default)]
    pub required: bool,
}

impl FieldDescriptor {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            field_type: FieldType::Text,
            readonly: false,
            required: false,
        }
    }

    pub fn readonly(mut self) -> Self {
        self.readonly = true;
        self
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }
}

/// A field descriptor joined with the record's current value, for display.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolvedField {
    #[serde(flatten)]
    pub field: FieldDescriptor,
    pub value: Value,
}

/// Claims carried by a signed link token. Immutable once issued; verified
/// and decoded on every page load and every write, never persisted
/// server-side. Wire names are camelCase so tokens minted for the previous
/// implementation keep working.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LinkClaims {
    pub base: String,
    pub table: String,
    pub record: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fields: Option<Vec<FieldDescriptor>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title_string: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confirm_field: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confirm_state: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exp: Option<u64>,
}

impl LinkClaims {
    pub fn new(
        base: impl Into<String>,
        table: impl Into<String>,
        record: impl Into<String>,
    ) -> Self {
        Self {
            base: base.into(),
            table: table.into(),
            record: record.into(),
            fields: None,
            title: None,
            title_string: None,
            confirm_field: None,
            confirm_state: None,
            exp: None,
        }
    }

    /// Descriptor list for edit mode, empty when the token has no `fields`
    /// claim.
    pub fn field_descriptors(&self) -> &[FieldDescriptor] {
        self.fields.as_deref().unwrap_or_default()
    }

    pub fn is_confirm_mode(&self) -> bool {
        self.confirm_field.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn descriptor_defaults_are_text_editable_optional() {
        let field: FieldDescriptor =
            serde_json::from_value(serde_json::json!({ "name": "email" }))
                .expect("minimal descriptor should deserialize");

        assert_eq!(field.name, "email");
        assert_eq!(field.field_type, FieldType::Text);
        assert!(!field.readonly);
        assert!(!field.required);
    }

    #[test]
    fn unknown_field_type_fails_closed_to_text() {
        let field: FieldDescriptor = serde_json::from_value(serde_json::json!({
            "name": "bio",
            "type": "richtext"
        }))
        .expect("descriptor with unknown type should deserialize");

        assert_eq!(field.field_type, FieldType::Text);

        let area: FieldDescriptor = serde_json::from_value(serde_json::json!({
            "name": "bio",
            "type": "textarea"
        }))
        .expect("textarea descriptor should deserialize");
        assert_eq!(area.field_type, FieldType::Textarea);
    }

    #[test]
    fn claims_round_trip_camel_case_wire_names() {
        let claims: LinkClaims = serde_json::from_value(serde_json::json!({
            "base": "b1",
            "table": "t1",
            "record": "r1",
            "titleString": "Confirm attendance",
            "confirmField": "approved",
            "confirmState": "Accepted"
        }))
        .expect("confirm claims should deserialize");

        assert!(claims.is_confirm_mode());
        assert_eq!(claims.confirm_field.as_deref(), Some("approved"));
        assert_eq!(
            claims.confirm_state,
            Some(Value::String("Accepted".to_string()))
        );
        assert!(claims.fields.is_none());
        assert!(claims.field_descriptors().is_empty());

        let wire = serde_json::to_value(&claims).expect("claims should serialize");
        assert_eq!(
            wire.get("titleString").and_then(|v| v.as_str()),
            Some("Confirm attendance")
        );
        assert!(wire.get("confirm_field").is_none());
    }

    #[test]
    fn resolved_field_serializes_flat() {
        let resolved = ResolvedField {
            field: FieldDescriptor::new("note").readonly(),
            value: Value::String("internal".to_string()),
        };

        let wire = serde_json::to_value(&resolved).expect("resolved field should serialize");
        assert_eq!(wire.get("name").and_then(|v| v.as_str()), Some("note"));
        assert_eq!(wire.get("readonly").and_then(|v| v.as_bool()), Some(true));
        assert_eq!(wire.get("value").and_then(|v| v.as_str()), Some("internal"));
    }
}
