//! Trigger metadata for external scalers

use crate::config::ScalerConfig;
use crate::error::{Result, ScalerError};
use crate::proto::ScaledObjectRef;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;

pub const SCALER_ADDRESS: &str = "scalerAddress";
pub const TLS_CERT_FILE: &str = "tlsCertFile";
pub const ACTIVATION_THRESHOLD: &str = "activationThreshold";
pub const CA_CERT: &str = "caCert";
pub const TLS_CLIENT_CERT: &str = "tlsClientCert";
pub const TLS_CLIENT_KEY: &str = "tlsClientKey";

const FROM_ENV_SUFFIX: &str = "FromEnv";

/// Material used to build a TLS transport
#[derive(Clone, Default, PartialEq, Eq)]
pub struct TlsSettings {
    /// PEM CA bundle on disk
    pub cert_file: Option<PathBuf>,
    /// PEM CA bundle passed inline through auth params
    pub ca_cert: Option<String>,
    pub client_cert: Option<String>,
    pub client_key: Option<String>,
}

impl TlsSettings {
    pub fn is_enabled(&self) -> bool {
        self.cert_file.is_some() || self.ca_cert.is_some() || self.client_cert.is_some()
    }
}

impl fmt::Debug for TlsSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TlsSettings")
            .field("cert_file", &self.cert_file)
            .field("ca_cert", &self.ca_cert.as_ref().map(|_| "<pem>"))
            .field("client_cert", &self.client_cert.as_ref().map(|_| "<pem>"))
            .field("client_key", &self.client_key.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ExternalScalerMetadata {
    /// `host:port` of the remote scaler, as written in the trigger
    pub scaler_address: String,
    pub tls: TlsSettings,
    pub activation_threshold: Option<f64>,
    /// Metadata forwarded to the remote scaler untouched
    pub original_metadata: HashMap<String, String>,
    pub trigger_index: usize,
}

impl ExternalScalerMetadata {
    pub fn parse(config: &ScalerConfig) -> Result<Self> {
        let meta = &config.trigger_metadata;

        let scaler_address = meta
            .get(SCALER_ADDRESS)
            .map(|s| s.trim())
            .filter(|s| !s.is_empty())
            .ok_or_else(|| ScalerError::config(format!("{SCALER_ADDRESS} is a required field")))?
            .to_string();

        let cert_file = meta
            .get(TLS_CERT_FILE)
            .filter(|s| !s.is_empty())
            .map(PathBuf::from);

        let non_empty_auth = |key: &str| {
            config
                .auth_params
                .get(key)
                .filter(|s| !s.is_empty())
                .cloned()
        };
        let tls = TlsSettings {
            cert_file,
            ca_cert: non_empty_auth(CA_CERT),
            client_cert: non_empty_auth(TLS_CLIENT_CERT),
            client_key: non_empty_auth(TLS_CLIENT_KEY),
        };
        if tls.client_cert.is_some() != tls.client_key.is_some() {
            return Err(ScalerError::config(format!(
                "{TLS_CLIENT_CERT} and {TLS_CLIENT_KEY} must be provided together"
            )));
        }

        let activation_threshold = match meta.get(ACTIVATION_THRESHOLD).filter(|s| !s.is_empty()) {
            Some(raw) => Some(raw.parse::<f64>().map_err(|e| {
                ScalerError::config(format!("invalid {ACTIVATION_THRESHOLD} {raw:?}: {e}"))
            })?),
            None => None,
        };

        Ok(Self {
            scaler_address,
            tls,
            activation_threshold,
            original_metadata: resolve_original_metadata(config),
            trigger_index: config.trigger_index,
        })
    }

    /// Key under which the pooled connection for this address is stored.
    ///
    /// Only the address participates: triggers pointing at the same address
    /// share one transport whatever TLS material they carry.
    pub fn pool_key(&self) -> String {
        pool_key(&self.scaler_address)
    }

    /// URI handed to the transport, with a scheme added for bare `host:port`
    pub fn endpoint_uri(&self) -> String {
        if self.scaler_address.contains("://") {
            return self.scaler_address.clone();
        }
        let scheme = if self.tls.is_enabled() { "https" } else { "http" };
        format!("{}://{}", scheme, self.scaler_address)
    }

    pub fn scaled_object_ref(&self, config: &ScalerConfig) -> ScaledObjectRef {
        ScaledObjectRef {
            name: config.scalable_object.name.clone(),
            namespace: config.scalable_object.namespace.clone(),
            scaler_metadata: self.original_metadata.clone(),
        }
    }
}

/// Stable hash of a scaler address
pub fn pool_key(address: &str) -> String {
    hex::encode(Sha256::digest(address.as_bytes()))
}

/// Copy non-empty trigger metadata, resolving `<key>FromEnv` entries through
/// the resolved environment and storing them under `<key>`.
fn resolve_original_metadata(config: &ScalerConfig) -> HashMap<String, String> {
    let mut resolved = HashMap::with_capacity(config.trigger_metadata.len());
    for (key, value) in &config.trigger_metadata {
        if let Some(stripped) = key.strip_suffix(FROM_ENV_SUFFIX) {
            if let Some(env_value) = config.resolved_env.get(value).filter(|v| !v.is_empty()) {
                resolved.insert(stripped.to_string(), env_value.clone());
            }
        } else if !value.is_empty() {
            resolved.insert(key.clone(), value.clone());
        }
    }
    resolved
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ScalableObject;

    fn config() -> ScalerConfig {
        ScalerConfig::new(
            ScalableObject {
                name: "worker".to_string(),
                namespace: "jobs".to_string(),
                kind: "ScaledObject".to_string(),
            },
            2,
        )
    }

    #[test]
    fn test_parse_requires_address() {
        let err = ExternalScalerMetadata::parse(&config()).unwrap_err();
        assert!(matches!(err, ScalerError::Config(_)));

        let err =
            ExternalScalerMetadata::parse(&config().with_metadata(SCALER_ADDRESS, "  ")).unwrap_err();
        assert!(matches!(err, ScalerError::Config(_)));
    }

    #[test]
    fn test_parse_minimal() {
        let meta =
            ExternalScalerMetadata::parse(&config().with_metadata(SCALER_ADDRESS, "scaler:6000"))
                .unwrap();
        assert_eq!(meta.scaler_address, "scaler:6000");
        assert_eq!(meta.trigger_index, 2);
        assert!(!meta.tls.is_enabled());
        assert_eq!(meta.activation_threshold, None);
        assert_eq!(meta.endpoint_uri(), "http://scaler:6000");
    }

    #[test]
    fn test_parse_tls_cert_file() {
        let meta = ExternalScalerMetadata::parse(
            &config()
                .with_metadata(SCALER_ADDRESS, "scaler:6000")
                .with_metadata(TLS_CERT_FILE, "/certs/ca.pem"),
        )
        .unwrap();
        assert_eq!(meta.tls.cert_file, Some(PathBuf::from("/certs/ca.pem")));
        assert_eq!(meta.endpoint_uri(), "https://scaler:6000");
    }

    #[test]
    fn test_explicit_scheme_is_kept() {
        let meta = ExternalScalerMetadata::parse(
            &config().with_metadata(SCALER_ADDRESS, "http://scaler.svc:6000"),
        )
        .unwrap();
        assert_eq!(meta.endpoint_uri(), "http://scaler.svc:6000");
    }

    #[test]
    fn test_client_cert_requires_key() {
        let err = ExternalScalerMetadata::parse(
            &config()
                .with_metadata(SCALER_ADDRESS, "scaler:6000")
                .with_auth_param(TLS_CLIENT_CERT, "-----BEGIN CERTIFICATE-----"),
        )
        .unwrap_err();
        assert!(matches!(err, ScalerError::Config(_)));
    }

    #[test]
    fn test_activation_threshold() {
        let meta = ExternalScalerMetadata::parse(
            &config()
                .with_metadata(SCALER_ADDRESS, "scaler:6000")
                .with_metadata(ACTIVATION_THRESHOLD, "41.5"),
        )
        .unwrap();
        assert_eq!(meta.activation_threshold, Some(41.5));

        let err = ExternalScalerMetadata::parse(
            &config()
                .with_metadata(SCALER_ADDRESS, "scaler:6000")
                .with_metadata(ACTIVATION_THRESHOLD, "lots"),
        )
        .unwrap_err();
        assert!(matches!(err, ScalerError::Config(_)));
    }

    #[test]
    fn test_original_metadata_resolution() {
        let meta = ExternalScalerMetadata::parse(
            &config()
                .with_metadata(SCALER_ADDRESS, "scaler:6000")
                .with_metadata("queue", "orders")
                .with_metadata("empty", "")
                .with_metadata("passwordFromEnv", "QUEUE_PASSWORD")
                .with_metadata("tokenFromEnv", "MISSING")
                .with_env("QUEUE_PASSWORD", "hunter2"),
        )
        .unwrap();

        let original = &meta.original_metadata;
        assert_eq!(original.get("queue").map(String::as_str), Some("orders"));
        assert_eq!(original.get("password").map(String::as_str), Some("hunter2"));
        assert_eq!(
            original.get(SCALER_ADDRESS).map(String::as_str),
            Some("scaler:6000")
        );
        assert!(!original.contains_key("empty"));
        assert!(!original.contains_key("token"));
        assert!(!original.contains_key("passwordFromEnv"));
    }

    #[test]
    fn test_pool_key_ignores_tls() {
        let plain =
            ExternalScalerMetadata::parse(&config().with_metadata(SCALER_ADDRESS, "scaler:6000"))
                .unwrap();
        let tls = ExternalScalerMetadata::parse(
            &config()
                .with_metadata(SCALER_ADDRESS, "scaler:6000")
                .with_metadata(TLS_CERT_FILE, "/certs/other.pem"),
        )
        .unwrap();
        assert_eq!(plain.pool_key(), tls.pool_key());
        assert_ne!(plain.pool_key(), pool_key("scaler:6001"));
        assert_eq!(plain.pool_key().len(), 64);
    }

    #[test]
    fn test_scaled_object_ref_payload() {
        let cfg = config()
            .with_metadata(SCALER_ADDRESS, "scaler:6000")
            .with_metadata("queue", "orders");
        let meta = ExternalScalerMetadata::parse(&cfg).unwrap();
        let reference = meta.scaled_object_ref(&cfg);
        assert_eq!(reference.name, "worker");
        assert_eq!(reference.namespace, "jobs");
        assert_eq!(
            reference.scaler_metadata.get("queue").map(String::as_str),
            Some("orders")
        );
    }

    #[test]
    fn test_debug_redacts_key() {
        let tls = TlsSettings {
            client_cert: Some("cert".to_string()),
            client_key: Some("secret-key".to_string()),
            ..Default::default()
        };
        let rendered = format!("{tls:?}");
        assert!(!rendered.contains("secret-key"));
    }
}
