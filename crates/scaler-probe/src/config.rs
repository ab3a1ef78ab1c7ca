//! Probe configuration

use anyhow::{Context, Result};
use scaler_core::external::{
    ACTIVATION_THRESHOLD, CA_CERT, SCALER_ADDRESS, TLS_CERT_FILE, TLS_CLIENT_CERT, TLS_CLIENT_KEY,
};
use scaler_core::{MetricTargetType, ScalableObject, ScalerConfig};
use serde::Deserialize;
use std::collections::HashMap;
use std::time::Duration;

/// Probe configuration, from `scaler-probe.{toml,yaml,json}` and `PROBE_*`
#[derive(Debug, Clone, Deserialize)]
pub struct ProbeConfig {
    /// API server port for health/metrics
    #[serde(default = "default_api_port")]
    pub api_port: u16,

    #[serde(default = "default_scaled_object_name")]
    pub scaled_object_name: String,

    #[serde(default = "default_namespace")]
    pub scaled_object_namespace: String,

    #[serde(default)]
    pub trigger_index: usize,

    #[serde(default)]
    pub metric_type: MetricTargetType,

    /// Per-request timeout for unary calls
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,

    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,

    /// Stream activity instead of polling
    #[serde(default)]
    pub push: bool,

    /// Trigger metadata; must contain `scalerAddress`
    #[serde(default)]
    pub metadata: HashMap<String, String>,

    /// Secret material for TLS (`caCert`, `tlsClientCert`, `tlsClientKey`)
    #[serde(default)]
    pub auth: HashMap<String, String>,
}

const FROM_ENV_SUFFIX: &str = "FromEnv";

/// The config crate lowercases keys, so restore the camel case names the
/// external scaler reads. A trailing `fromenv` always becomes `FromEnv` so
/// env indirection keeps working for any key.
fn canonical_key(key: &str) -> String {
    const KNOWN: [&str; 6] = [
        SCALER_ADDRESS,
        TLS_CERT_FILE,
        ACTIVATION_THRESHOLD,
        CA_CERT,
        TLS_CLIENT_CERT,
        TLS_CLIENT_KEY,
    ];

    let suffix_start = key.len().checked_sub(FROM_ENV_SUFFIX.len()).filter(|&split| {
        split > 0
            && key.is_char_boundary(split)
            && key[split..].eq_ignore_ascii_case(FROM_ENV_SUFFIX)
    });
    let base = match suffix_start {
        Some(split) => &key[..split],
        None => key,
    };

    let base = KNOWN
        .iter()
        .find(|known| known.eq_ignore_ascii_case(base))
        .map_or(base, |known| *known);

    match suffix_start {
        Some(_) => format!("{base}{FROM_ENV_SUFFIX}"),
        None => base.to_string(),
    }
}

fn default_api_port() -> u16 {
    8080
}

fn default_scaled_object_name() -> String {
    std::env::var("HOSTNAME").unwrap_or_else(|_| "scaler-probe".to_string())
}

fn default_namespace() -> String {
    "default".to_string()
}

fn default_timeout_ms() -> u64 {
    3000
}

fn default_poll_interval() -> u64 {
    30
}

impl ProbeConfig {
    /// Load configuration from an optional config file and the environment
    pub fn load() -> Result<Self> {
        let config = config::Config::builder()
            .add_source(config::File::with_name("scaler-probe").required(false))
            .add_source(
                config::Environment::with_prefix("PROBE")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .context("Failed to read probe configuration")?;

        config
            .try_deserialize()
            .context("Invalid probe configuration")
    }

    pub fn workload(&self) -> String {
        format!("{}/{}", self.scaled_object_namespace, self.scaled_object_name)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs.max(1))
    }

    /// The read-only snapshot handed to the scaler constructor
    pub fn scaler_config(&self) -> ScalerConfig {
        let scalable_object = ScalableObject {
            name: self.scaled_object_name.clone(),
            namespace: self.scaled_object_namespace.clone(),
            kind: "ScaledObject".to_string(),
        };

        let mut config = ScalerConfig::new(scalable_object, self.trigger_index)
            .with_metric_type(self.metric_type)
            .with_timeout(Duration::from_millis(self.timeout_ms));
        config.trigger_metadata = self
            .metadata
            .iter()
            .map(|(k, v)| (canonical_key(k), v.clone()))
            .collect();
        config.resolved_env = std::env::vars().collect();
        for (key, value) in &self.auth {
            config = config.with_auth_param(canonical_key(key), value.clone());
        }
        config
    }
}
