//! Identifier normalization.
//!
//! Room and user identifiers reach the hub in several shapes: plain strings,
//! numbers, or objects that carry the real identifier under a conventional key.
//! Everything that derives a room key from an inbound payload goes through
//! [`normalize`], so the same user or chat always maps to the same room.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Number, Value};
use std::fmt;

/// Keys searched, in order, when an identifier arrives as an object.
pub const CANDIDATE_KEYS: [&str; 6] = ["_id", "id", "chatId", "roomId", "userId", "pairingId"];

/// Normalize a JSON value into a room/user identifier.
///
/// Returns `None` for null, empty strings, booleans, and objects that carry no
/// candidate key. Objects are resolved through the first candidate key that is
/// present with a non-null value; the search stops there even if that value
/// itself normalizes to `None`.
#[must_use]
pub fn normalize(value: &Value) -> Option<String> {
    match value {
        Value::Null | Value::Bool(_) => None,
        Value::String(s) => {
            let trimmed = s.trim();
            (!trimmed.is_empty()).then(|| trimmed.to_string())
        }
        Value::Number(n) => Some(number_key(n)),
        Value::Object(map) => CANDIDATE_KEYS
            .iter()
            .find_map(|key| map.get(*key).filter(|v| !v.is_null()))
            .and_then(normalize),
        Value::Array(items) => {
            let mut parts = Vec::with_capacity(items.len());
            for item in items {
                match item {
                    Value::String(s) => parts.push(s.clone()),
                    Value::Number(n) => parts.push(number_key(n)),
                    _ => return None,
                }
            }
            let joined = parts.join(",");
            (!joined.is_empty()).then_some(joined)
        }
    }
}

/// Integral floats render like integers, so `1.0` and `1` name the same room.
fn number_key(n: &Number) -> String {
    // Exactly representable integers only; beyond 2^53 the float is kept as is.
    const MAX_SAFE: f64 = 9_007_199_254_740_992.0;
    match n.as_f64() {
        Some(f) if n.is_f64() && f.fract() == 0.0 && f.abs() < MAX_SAFE => {
            format!("{}", f as i64)
        }
        _ => n.to_string(),
    }
}

/// An identifier that was normalized during deserialization.
///
/// Accepts any JSON shape; shapes that do not resolve become an empty `Ident`
/// rather than a decode error, so handlers can treat them as a no-op.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct Ident(Option<String>);

impl Ident {
    /// Normalize a raw JSON value.
    #[must_use]
    pub fn from_value(value: &Value) -> Self {
        Self(normalize(value))
    }

    /// The normalized identifier, if any.
    #[must_use]
    pub fn as_deref(&self) -> Option<&str> {
        self.0.as_deref()
    }

    /// Consume into the normalized identifier.
    #[must_use]
    pub fn into_inner(self) -> Option<String> {
        self.0
    }

    /// Whether normalization produced nothing.
    #[must_use]
    pub fn is_none(&self) -> bool {
        self.0.is_none()
    }
}

impl From<&str> for Ident {
    fn from(s: &str) -> Self {
        Self::from_value(&Value::String(s.to_string()))
    }
}

impl From<String> for Ident {
    fn from(s: String) -> Self {
        Self::from_value(&Value::String(s))
    }
}

impl From<&String> for Ident {
    fn from(s: &String) -> Self {
        Self::from(s.as_str())
    }
}

impl From<&Ident> for Ident {
    fn from(ident: &Ident) -> Self {
        ident.clone()
    }
}

impl From<&Value> for Ident {
    fn from(value: &Value) -> Self {
        Self::from_value(value)
    }
}

impl<'de> Deserialize<'de> for Ident {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        Ok(Self::from_value(&value))
    }
}

impl fmt::Display for Ident {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.0 {
            Some(id) => f.write_str(id),
            None => f.write_str("<none>"),
        }
    }
}
