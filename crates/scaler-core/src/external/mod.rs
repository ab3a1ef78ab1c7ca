//! External scalers: triggers served by an out-of-process gRPC service
//!
//! This module provides:
//! - Metadata parsing for `external` / `external-push` triggers
//! - A connection pool sharing one transport per scaler address
//! - Pull and push scaler implementations on top of the pool

mod client;
mod metadata;
mod pool;
mod transport;


pub use client::{BackoffPolicy, ExternalPushScaler, ExternalScaler};
pub use metadata::{
    pool_key, ExternalScalerMetadata, TlsSettings, ACTIVATION_THRESHOLD, CA_CERT, SCALER_ADDRESS,
    TLS_CERT_FILE, TLS_CLIENT_CERT, TLS_CLIENT_KEY,
};
pub use pool::{ConnectionPool, Connector, ConnectivityState, GrpcConnector, PooledConnection};
pub use transport::{ActivityStream, ScalerTransport};
