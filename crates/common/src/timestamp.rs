//! Timestamp utilities.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A wrapper around DateTime<Utc> with consistent serialization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Timestamp(DateTime<Utc>);

impl Timestamp {
    /// Create a new timestamp from the current time.
    pub fn now() -> Self {
        Timestamp(Utc::now())
    }

    /// Parse an RFC 3339 string such as `2025-07-30T10:00:00Z`.
    pub fn parse_rfc3339(value: &str) -> crate::Result<Self> {
        DateTime::parse_from_rfc3339(value)
            .map(|dt| Timestamp(dt.with_timezone(&Utc)))
            .map_err(|e| crate::Error::Other(format!("invalid timestamp '{}': {}", value, e)))
    }

    /// Get the inner DateTime<Utc>.
    pub fn inner(&self) -> DateTime<Utc> {
        self.0
    }

    /// Format as ISO 8601 string with second precision.
    pub fn to_iso8601(&self) -> String {
        self.0.format("%Y-%m-%dT%H:%M:%SZ").to_string()
    }
}

impl Default for Timestamp {
    fn default() -> Self {
        Self::now()
    }
}

impl std::fmt::Display for Timestamp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_iso8601())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timestamp_serialization() {
        let ts = Timestamp::now();
        let json = serde_json::to_string(&ts).unwrap();
        let parsed: Timestamp = serde_json::from_str(&json).unwrap();
        assert_eq!(ts, parsed);
    }

    #[test]
    fn test_parse_rfc3339() {
        let ts = Timestamp::parse_rfc3339("2025-07-30T10:00:00Z").unwrap();
        assert_eq!(ts.to_string(), "2025-07-30T10:00:00Z");
        assert!(Timestamp::parse_rfc3339("yesterday").is_err());
    }
}
