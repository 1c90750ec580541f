//! Error body normalization
//!
//! The API reports failures in several shapes depending on which view raised
//! them: a bare string, `{"error": "..."}`, `{"error": {...}}` with nested
//! detail, `{"detail": "..."}` from the auth layer, or a map of field
//! validation messages. `ErrorNormalizer` collapses all of them into one
//! message. Resolution is an ordered match, first hit wins:
//!
//! 1. String payload → itself
//! 2. String `error` → that string
//! 3. Object `error` → nested resolution (entity reference, nested string
//!    `error`, then the serialized object); array `error` → the serialized
//!    array
//! 4. `message` / `detail` / `msg` → first present, stringified
//! 5. Validation map (`details` by default) → `field: values` lines
//! 6. Anything else → the serialized payload
//!
//! The error kind is classified from the status code alone.

use std::sync::Arc;

use reqwest::StatusCode;
use serde_json::{Map, Value};

use crate::error::{ApiError, ErrorKind};

/// Keys that may carry a top-level message, in priority order.
const MESSAGE_KEYS: &[&str] = &["message", "detail", "msg"];

/// Formats a nested `error` object that refers to a domain entity.
///
/// Returns `None` when the object carries no reference the formatter
/// recognises, letting the normalizer fall through to the generic arms.
pub trait NestedErrorFormatter: Send + Sync {
    fn format(&self, nested: &Map<String, Value>) -> Option<String>;
}

/// Entity reference formatter driven by configurable field names.
///
/// With the defaults, `{"error": "X", "entity_id": 5}` formats as
/// `X (Entity: entity, ID: 5)`. The entity field may be a plain name or an
/// object with `full_name`/`name` and `id`.
#[derive(Debug, Clone)]
pub struct EntityReference {
    pub label: String,
    pub entity_key: String,
    pub id_key: String,
}

impl EntityReference {
    pub fn new(
        label: impl Into<String>,
        entity_key: impl Into<String>,
        id_key: impl Into<String>,
    ) -> Self {
        Self {
            label: label.into(),
            entity_key: entity_key.into(),
            id_key: id_key.into(),
        }
    }
}

impl Default for EntityReference {
    fn default() -> Self {
        Self::new("Entity", "entity", "entity_id")
    }
}

impl NestedErrorFormatter for EntityReference {
    fn format(&self, nested: &Map<String, Value>) -> Option<String> {
        let entity = present(nested.get(&self.entity_key));
        let id = present(nested.get(&self.id_key));
        if entity.is_none() && id.is_none() {
            return None;
        }

        let fallback_name = self.label.to_lowercase();
        let name = match entity {
            Some(Value::String(name)) => name.clone(),
            Some(Value::Object(fields)) => ["full_name", "name"]
                .iter()
                .find_map(|k| fields.get(*k).and_then(Value::as_str))
                .map(str::to_string)
                .unwrap_or_else(|| fallback_name.clone()),
            _ => fallback_name.clone(),
        };

        let id = id
            .or_else(|| match entity {
                Some(Value::Object(fields)) => present(fields.get("id")),
                _ => None,
            })
            .map(scalar_text)
            .unwrap_or_else(|| "N/A".to_string());

        Some(match non_empty_str(nested.get("error")) {
            Some(message) => format!("{message} ({}: {name}, ID: {id})", self.label),
            None => format!("Error with {fallback_name} {name} (ID: {id})"),
        })
    }
}

/// Collapses heterogeneous failure bodies into one `ApiError`.
#[derive(Clone)]
pub struct ErrorNormalizer {
    formatter: Arc<dyn NestedErrorFormatter>,
    validation_keys: Vec<String>,
}

impl ErrorNormalizer {
    pub fn new(formatter: Arc<dyn NestedErrorFormatter>, validation_keys: Vec<String>) -> Self {
        Self {
            formatter,
            validation_keys,
        }
    }

    /// Build the error for a failed response.
    ///
    /// Bodies that are not JSON are treated as a string payload; an empty
    /// body yields the status's reason phrase.
    pub fn normalize(&self, status: StatusCode, body: &[u8], exempt: bool) -> ApiError {
        let kind = ErrorKind::from_status(status.as_u16(), exempt);
        let message = if body.iter().all(u8::is_ascii_whitespace) {
            status
                .canonical_reason()
                .map(str::to_string)
                .unwrap_or_else(|| format!("HTTP {}", status.as_u16()))
        } else {
            let payload = serde_json::from_slice::<Value>(body)
                .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(body).into_owned()));
            self.message(&payload)
        };
        ApiError::new(kind, message).with_status(status.as_u16())
    }

    /// Resolve the message for a decoded payload.
    pub fn message(&self, payload: &Value) -> String {
        let fields = match payload {
            Value::String(text) => return text.clone(),
            Value::Object(fields) => fields,
            other => return other.to_string(),
        };

        match fields.get("error") {
            Some(Value::String(message)) if !message.is_empty() => return message.clone(),
            Some(Value::Object(nested)) => return self.nested_message(nested),
            Some(list @ Value::Array(_)) => return list.to_string(),
            _ => {}
        }

        if let Some(message) = MESSAGE_KEYS.iter().find_map(|k| truthy(fields.get(*k))) {
            return match message {
                Value::String(text) => text.clone(),
                other => other.to_string(),
            };
        }

        let validation = self
            .validation_keys
            .iter()
            .find_map(|k| fields.get(k).and_then(Value::as_object))
            .filter(|map| !map.is_empty());
        if let Some(map) = validation {
            return map
                .iter()
                .map(|(field, values)| format!("{field}: {}", joined(values)))
                .collect::<Vec<_>>()
                .join("\n");
        }

        payload.to_string()
    }

    fn nested_message(&self, nested: &Map<String, Value>) -> String {
        if let Some(message) = self.formatter.format(nested) {
            return message;
        }
        match non_empty_str(nested.get("error")) {
            Some(message) => message.to_string(),
            None => Value::Object(nested.clone()).to_string(),
        }
    }
}

impl Default for ErrorNormalizer {
    fn default() -> Self {
        Self::new(Arc::new(EntityReference::default()), vec!["details".into()])
    }
}

fn present(value: Option<&Value>) -> Option<&Value> {
    value.filter(|v| !v.is_null())
}

fn non_empty_str(value: Option<&Value>) -> Option<&str> {
    value.and_then(Value::as_str).filter(|s| !s.is_empty())
}

/// Values that count as "set" for message lookup: not null, false, 0 or "".
fn truthy(value: Option<&Value>) -> Option<&Value> {
    value.filter(|v| match v {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::String(s) => !s.is_empty(),
        Value::Number(n) => n.as_f64() != Some(0.0),
        Value::Array(_) | Value::Object(_) => true,
    })
}

fn scalar_text(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}

fn joined(values: &Value) -> String {
    match values {
        Value::Array(items) => items
            .iter()
            .map(scalar_text)
            .collect::<Vec<_>>()
            .join(", "),
        other => scalar_text(other),
    }
}
