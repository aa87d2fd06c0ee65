use serde_json::Value;
use std::fmt;
use std::sync::Arc;
use tokio::time::Instant;

/// Upstream data-version identifier, taken from the realm's `"v"` field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionMarker(String);

impl VersionMarker {
    pub fn new(v: impl Into<String>) -> Self {
        Self(v.into())
    }

    /// Reads the `"v"` field of a realm payload. Upstream has shipped it both
    /// as a string and as a number.
    pub fn from_realm(realm: &Value) -> Option<Self> {
        match realm.get("v")? {
            Value::String(s) => Some(Self(s.clone())),
            Value::Number(n) => Some(Self(n.to_string())),
            _ => None,
        }
    }
}

impl fmt::Display for VersionMarker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub data: Arc<Value>,
    pub fetched_at: Instant,
    /// Marker that was current when `data` was fetched, if one was known.
    pub marker: Option<VersionMarker>,
}
