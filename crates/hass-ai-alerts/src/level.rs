//! Alert severity and the timing rules attached to it

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Severity of a triggered threshold, ordered from least to most severe
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum AlertLevel {
    Warning,
    Alert,
    Critical,
}

impl AlertLevel {
    /// Most severe first, the order thresholds are checked in
    pub const BY_SEVERITY: [AlertLevel; 3] =
        [AlertLevel::Critical, AlertLevel::Alert, AlertLevel::Warning];

    pub fn as_str(&self) -> &'static str {
        match self {
            AlertLevel::Warning => "WARNING",
            AlertLevel::Alert => "ALERT",
            AlertLevel::Critical => "CRITICAL",
        }
    }

    pub fn icon(&self) -> &'static str {
        match self {
            AlertLevel::Warning => "⚠️",
            AlertLevel::Alert => "🚨",
            AlertLevel::Critical => "🔥",
        }
    }

    /// Minimum time between two notifications for the same entity
    pub fn throttle(&self) -> Duration {
        let minutes = match self {
            AlertLevel::Warning => 60,
            AlertLevel::Alert => 30,
            AlertLevel::Critical => 10,
        };
        Duration::from_secs(minutes * 60)
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_uppercase().as_str() {
            "WARNING" => Some(AlertLevel::Warning),
            "ALERT" => Some(AlertLevel::Alert),
            "CRITICAL" => Some(AlertLevel::Critical),
            _ => None,
        }
    }
}

impl fmt::Display for AlertLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How often an entity of the given weight is re-checked
///
/// Weights outside 1..=5 use the weight-3 interval.
pub fn check_interval(weight: u8) -> Duration {
    let secs = match weight {
        5 => 30,
        4 => 60,
        3 => 5 * 60,
        2 => 15 * 60,
        1 => 30 * 60,
        _ => 5 * 60,
    };
    Duration::from_secs(secs)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_severity_order() {
        assert!(AlertLevel::Critical > AlertLevel::Alert);
        assert!(AlertLevel::Alert > AlertLevel::Warning);
        assert_eq!(AlertLevel::BY_SEVERITY[0], AlertLevel::Critical);
    }

    #[test]
    fn test_throttle_and_intervals() {
        assert_eq!(AlertLevel::Warning.throttle(), Duration::from_secs(3600));
        assert_eq!(AlertLevel::Alert.throttle(), Duration::from_secs(1800));
        assert_eq!(AlertLevel::Critical.throttle(), Duration::from_secs(600));

        assert_eq!(check_interval(5), Duration::from_secs(30));
        assert_eq!(check_interval(4), Duration::from_secs(60));
        assert_eq!(check_interval(1), Duration::from_secs(1800));
        assert_eq!(check_interval(0), check_interval(3));
    }

    #[test]
    fn test_wire_names() {
        assert_eq!(serde_json::to_value(AlertLevel::Critical).unwrap(), "CRITICAL");
        assert_eq!(AlertLevel::parse(" alert "), Some(AlertLevel::Alert));
        assert_eq!(AlertLevel::parse("info"), None);
    }
}
