use linkform_contracts::{LinkClaims, ResolvedField};
use serde::Serialize;
use serde_json::Value;

use crate::store::RecordFields;

/// Props consumed by the rendering layer. The renderer picks the view from
/// these alone: `confirm_field` present means confirm mode, otherwise the
/// edit form. Not-found never reaches this type; it is a bare 404 upstream.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ViewProps {
    pub title_string: Option<String>,
    pub confirm_field: Option<String>,
    pub confirm_state: Option<Value>,
    pub current_state: bool,
    pub title: Option<String>,
    pub fields: Vec<ResolvedField>,
    pub jwt: String,
}

/// Shapes display props from verified claims and a fetched record. Pure; the
/// edit/saving/confirmed state machine lives in the rendering session, not
/// here.
pub(crate) fn resolve_view(claims: &LinkClaims, record: &RecordFields, jwt: &str) -> ViewProps {
    let current_state = match claims.confirm_field.as_deref() {
        Some(field) => {
            linkform_policy::confirm_current_state(record, field, claims.confirm_state.as_ref())
        }
        None => false,
    };

    // `title` claim names a record attribute to display; `title_string` is a
    // literal and passes through untouched.
    let title = claims
        .title
        .as_deref()
        .and_then(|name| record.get(name))
        .and_then(|v| v.as_str())
        .map(str::to_string);

    let fields = linkform_policy::map_for_display(claims.field_descriptors(), record);

    ViewProps {
        title_string: claims.title_string.clone(),
        confirm_field: claims.confirm_field.clone(),
        confirm_state: claims.confirm_state.clone(),
        current_state,
        title,
        fields,
        jwt: jwt.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use linkform_contracts::FieldDescriptor;
    use serde_json::Map;

    fn record(value: Value) -> RecordFields {
        value
            .as_object()
            .expect("fixture must be a JSON object")
            .clone()
    }

    #[test]
    fn edit_mode_resolves_fields_in_order() {
        let mut claims = LinkClaims::new("b1", "t1", "r1");
        claims.fields = Some(vec![
            FieldDescriptor::new("email").required(),
            FieldDescriptor::new("note").readonly(),
        ]);
        let rec = record(serde_json::json!({
            "email": "a@x.com",
            "note": "internal"
        }));

        let props = resolve_view(&claims, &rec, "tok");

        assert!(props.confirm_field.is_none());
        assert!(!props.current_state);
        assert_eq!(props.jwt, "tok");
        assert_eq!(props.fields.len(), 2);
        assert_eq!(props.fields[0].field.name, "email");
        assert_eq!(props.fields[0].value, Value::String("a@x.com".to_string()));
        assert!(!props.fields[0].field.readonly);
        assert_eq!(props.fields[1].value, Value::String("internal".to_string()));
        assert!(props.fields[1].field.readonly);
    }

    #[test]
    fn title_claim_reads_from_record_title_string_is_literal() {
        let mut claims = LinkClaims::new("b1", "t1", "r1");
        claims.title = Some("Name".to_string());
        claims.title_string = Some("Editing your entry".to_string());
        let rec = record(serde_json::json!({ "Name": "Ada" }));

        let props = resolve_view(&claims, &rec, "tok");

        assert_eq!(props.title.as_deref(), Some("Ada"));
        assert_eq!(props.title_string.as_deref(), Some("Editing your entry"));

        // Title attribute missing from the record resolves to no title.
        let props = resolve_view(&claims, &Map::new(), "tok");
        assert!(props.title.is_none());
    }

    #[test]
    fn confirm_mode_reports_current_state() {
        let mut claims = LinkClaims::new("b1", "t1", "r1");
        claims.confirm_field = Some("approved".to_string());

        let props = resolve_view(&claims, &record(serde_json::json!({ "approved": false })), "t");
        assert!(!props.current_state);

        let props = resolve_view(&claims, &record(serde_json::json!({ "approved": true })), "t");
        assert!(props.current_state);
        assert!(props.fields.is_empty());
    }

    #[test]
    fn props_serialize_camel_case() {
        let claims = LinkClaims::new("b1", "t1", "r1");
        let props = resolve_view(&claims, &Map::new(), "tok");

        let wire = serde_json::to_value(&props).expect("props should serialize");
        assert!(wire.get("titleString").is_some());
        assert!(wire.get("currentState").is_some());
        assert!(wire.get("confirmField").is_some());
        assert!(wire.get("title_string").is_none());
    }
}
