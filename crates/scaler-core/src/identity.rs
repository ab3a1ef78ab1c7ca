//! Trigger-index prefixes on metric names
//!
//! Every trigger on a workload publishes its metrics as `s<index>-<name>`, so
//! two triggers that pick the same base name never collide. The prefix is
//! applied when metric specs are handed to the outer loop and stripped again
//! before a name is forwarded to a backend.

use crate::error::{Result, ScalerError};
use std::fmt;

/// A base metric name bound to the trigger that owns it
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MetricIdentifier {
    pub trigger_index: usize,
    pub base_name: String,
}

impl MetricIdentifier {
    pub fn new(trigger_index: usize, base_name: impl Into<String>) -> Self {
        Self {
            trigger_index,
            base_name: base_name.into(),
        }
    }

    /// Decode a fully-qualified name for the given trigger
    pub fn parse(trigger_index: usize, name: &str) -> Result<Self> {
        let base_name = strip_index(trigger_index, name)?;
        Ok(Self {
            trigger_index,
            base_name,
        })
    }

    pub fn name(&self) -> String {
        with_index(self.trigger_index, &self.base_name)
    }
}

impl fmt::Display for MetricIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "s{}-{}", self.trigger_index, self.base_name)
    }
}

fn prefix(trigger_index: usize) -> String {
    format!("s{}-", trigger_index)
}

/// Prefix `base_name` with the trigger index
pub fn with_index(trigger_index: usize, base_name: &str) -> String {
    format!("{}{}", prefix(trigger_index), base_name)
}

/// Remove the `s<index>-` prefix, failing if it is not exactly present
pub fn strip_index(trigger_index: usize, name: &str) -> Result<String> {
    let expected = prefix(trigger_index);
    name.strip_prefix(&expected)
        .map(str::to_string)
        .ok_or_else(|| ScalerError::Format {
            name: name.to_string(),
            expected_prefix: expected,
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_with_index() {
        assert_eq!(with_index(0, "queueLength"), "s0-queueLength");
        assert_eq!(with_index(12, "queueLength"), "s12-queueLength");
    }

    #[test]
    fn test_strip_index_roundtrip() {
        for index in [0, 1, 9, 10, 123] {
            for name in ["metricName", "a", "s-metric", "metric-with-dashes"] {
                assert_eq!(strip_index(index, &with_index(index, name)).unwrap(), name);
            }
        }
    }

    #[test]
    fn test_strip_index_multi_digit() {
        assert_eq!(strip_index(123, "s123-metricName").unwrap(), "metricName");
    }

    #[test]
    fn test_strip_index_wrong_index() {
        assert!(strip_index(1, "s0-metricName").is_err());
        assert!(strip_index(0, "s1-x").is_err());
        // s1 must not match s12-
        assert!(strip_index(1, "s12-metricName").is_err());
    }

    #[test]
    fn test_strip_index_missing_prefix() {
        assert!(strip_index(0, "metricName").is_err());
        assert!(strip_index(0, "0-metricName").is_err());
        assert!(strip_index(0, "").is_err());
    }

    #[test]
    fn test_strip_index_error_is_format() {
        let err = strip_index(2, "s0-metricName").unwrap_err();
        match err {
            ScalerError::Format {
                name,
                expected_prefix,
            } => {
                assert_eq!(name, "s0-metricName");
                assert_eq!(expected_prefix, "s2-");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_metric_identifier() {
        let id = MetricIdentifier::new(3, "lag");
        assert_eq!(id.name(), "s3-lag");
        assert_eq!(id.to_string(), "s3-lag");
        assert_eq!(MetricIdentifier::parse(3, "s3-lag").unwrap(), id);
        assert!(MetricIdentifier::parse(4, "s3-lag").is_err());
    }
}
