//! Core data models shared by every scaler

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// How the outer loop compares a metric against its target
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum MetricTargetType {
    #[default]
    AverageValue,
    Value,
    Utilization,
}

impl fmt::Display for MetricTargetType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            MetricTargetType::AverageValue => "AverageValue",
            MetricTargetType::Value => "Value",
            MetricTargetType::Utilization => "Utilization",
        };
        f.write_str(s)
    }
}

impl FromStr for MetricTargetType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "" | "AverageValue" => Ok(MetricTargetType::AverageValue),
            "Value" => Ok(MetricTargetType::Value),
            "Utilization" => Ok(MetricTargetType::Utilization),
            other => Err(format!("unknown metric target type {other:?}")),
        }
    }
}

/// Static shape of a metric the outer loop registers for scaling
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricSpec {
    /// Fully-qualified name, including the trigger index prefix
    pub metric_name: String,
    pub target_type: MetricTargetType,
    pub target_value: f64,
}

/// One metric sample produced by an evaluation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExternalMetricValue {
    pub metric_name: String,
    pub value: f64,
    pub timestamp: DateTime<Utc>,
}

impl ExternalMetricValue {
    pub fn now(metric_name: impl Into<String>, value: f64) -> Self {
        Self {
            metric_name: metric_name.into(),
            value,
            timestamp: Utc::now(),
        }
    }
}
