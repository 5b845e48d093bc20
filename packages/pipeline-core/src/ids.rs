//! Newtype identifiers shared across the storage and orchestration layers.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Monotonic identifier for a [`crate::record::Record`].
///
/// Assigned by the Record Store on insert; claim ordering relies on this
/// being comparable and monotonically increasing within a batch insert.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RecordId(pub u64);

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Monotonic identifier for a [`crate::batch::Batch`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct BatchId(pub u64);

impl fmt::Display for BatchId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Opaque tenant identifier carried on every request (`X-Session-ID`).
///
/// Never validated for shape beyond the boundary length check (§6.1);
/// internally it is just an opaque partition key -- no query ever
/// crosses a `TenantId` boundary.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TenantId(pub String);

impl TenantId {
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TenantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for TenantId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for TenantId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_id_orders_numerically() {
        assert!(RecordId(1) < RecordId(2));
    }

    #[test]
    fn tenant_id_from_str() {
        let t: TenantId = "tenant-a".into();
        assert_eq!(t.as_str(), "tenant-a");
    }
}
