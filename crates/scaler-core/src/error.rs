//! Error taxonomy for scalers and the connection pool

use thiserror::Error;

pub type Result<T, E = ScalerError> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum ScalerError {
    /// Mandatory configuration is missing or malformed
    #[error("invalid scaler configuration: {0}")]
    Config(String),

    /// A transport to the remote scaler could not be built
    #[error("cannot connect to {address}: {message}")]
    Connection {
        address: String,
        message: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// An RPC failed or a stream broke
    #[error("{rpc} call to {address} failed: {status}")]
    Transport {
        rpc: &'static str,
        address: String,
        #[source]
        status: tonic::Status,
    },

    /// A metric name did not carry the expected trigger index prefix
    #[error("metric name {name:?} does not start with expected prefix {expected_prefix:?}")]
    Format {
        name: String,
        expected_prefix: String,
    },

    #[error("scaler has been closed")]
    Closed,
}

impl ScalerError {
    pub fn config(message: impl Into<String>) -> Self {
        ScalerError::Config(message.into())
    }

    pub fn connection<E>(address: impl Into<String>, message: impl Into<String>, source: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        ScalerError::Connection {
            address: address.into(),
            message: message.into(),
            source: Box::new(source),
        }
    }

    pub fn transport(rpc: &'static str, address: impl Into<String>, status: tonic::Status) -> Self {
        ScalerError::Transport {
            rpc,
            address: address.into(),
            status,
        }
    }

    /// Transient errors self-heal on a later tick or reconnect
    pub fn is_transient(&self) -> bool {
        matches!(self, ScalerError::Transport { .. })
    }
}
