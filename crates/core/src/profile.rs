//! User profile: caller-defined data describing the authenticated user.

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Opaque user profile.
///
/// The shape is owned by the application. The only properties the engine
/// ever reads are the (configurable) roles and expiration properties.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Profile(Value);

impl Profile {
    pub fn new(value: Value) -> Self {
        Self(value)
    }

    pub fn as_value(&self) -> &Value {
        &self.0
    }

    pub fn into_value(self) -> Value {
        self.0
    }

    /// Top-level property lookup; `None` for missing keys and non-object profiles.
    pub fn property(&self, name: &str) -> Option<&Value> {
        self.0.as_object().and_then(|map| map.get(name))
    }

    /// True for a JSON `null` profile, which storage treats as absent.
    pub fn is_null(&self) -> bool {
        self.0.is_null()
    }

    /// Expiration instant stored under `property`.
    ///
    /// Only strings are considered. Missing values, other JSON types and
    /// unparsable strings yield `None`, meaning "never expires".
    pub fn expiration(&self, property: &str) -> Option<DateTime<Utc>> {
        match self.property(property)? {
            Value::String(raw) => parse_instant(raw),
            _ => None,
        }
    }

    /// True if the expiration under `property` is strictly before `now`.
    pub fn is_expired_at(&self, property: &str, now: DateTime<Utc>) -> bool {
        self.expiration(property).is_some_and(|at| at < now)
    }
}

impl From<Value> for Profile {
    fn from(value: Value) -> Self {
        Self(value)
    }
}

impl From<Profile> for Value {
    fn from(value: Profile) -> Self {
        value.0
    }
}

/// Parse a timestamp in one of the formats identity providers commonly emit.
///
/// Values without an offset are taken as UTC.
pub fn parse_instant(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(at) = DateTime::parse_from_rfc3339(raw) {
        return Some(at.with_timezone(&Utc));
    }
    if let Ok(at) = DateTime::parse_from_rfc2822(raw) {
        return Some(at.with_timezone(&Utc));
    }
    for format in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"] {
        if let Ok(at) = NaiveDateTime::parse_from_str(raw, format) {
            return Some(at.and_utc());
        }
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|day| day.and_hms_opt(0, 0, 0))
        .map(|at| at.and_utc())
}
