//! Configuration handed to every scaler constructor
//!
//! The host process parses and validates triggers before building scalers,
//! so this is a read-only snapshot. The trigger index must stay stable for
//! the lifetime of the workload's trigger set.

use crate::models::MetricTargetType;
use std::collections::HashMap;
use std::time::Duration;

/// Identity of the workload a trigger belongs to
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScalableObject {
    pub name: String,
    pub namespace: String,
    pub kind: String,
}

#[derive(Debug, Clone)]
pub struct ScalerConfig {
    pub scalable_object: ScalableObject,
    /// Raw metadata from the trigger definition
    pub trigger_metadata: HashMap<String, String>,
    /// Environment of the scale target, already resolved
    pub resolved_env: HashMap<String, String>,
    /// Parameters from the trigger's authentication reference
    pub auth_params: HashMap<String, String>,
    pub metric_type: MetricTargetType,
    /// 0-based position of this trigger among the workload's triggers
    pub trigger_index: usize,
    /// Upper bound for a single backend request
    pub global_timeout: Duration,
}

impl Default for ScalerConfig {
    fn default() -> Self {
        Self {
            scalable_object: ScalableObject::default(),
            trigger_metadata: HashMap::new(),
            resolved_env: HashMap::new(),
            auth_params: HashMap::new(),
            metric_type: MetricTargetType::default(),
            trigger_index: 0,
            global_timeout: Duration::from_secs(3),
        }
    }
}

impl ScalerConfig {
    pub fn new(scalable_object: ScalableObject, trigger_index: usize) -> Self {
        Self {
            scalable_object,
            trigger_index,
            ..Default::default()
        }
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.trigger_metadata.insert(key.into(), value.into());
        self
    }

    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.resolved_env.insert(key.into(), value.into());
        self
    }

    pub fn with_auth_param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.auth_params.insert(key.into(), value.into());
        self
    }

    pub fn with_metric_type(mut self, metric_type: MetricTargetType) -> Self {
        self.metric_type = metric_type;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.global_timeout = timeout;
        self
    }
}
