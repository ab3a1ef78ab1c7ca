//! Trigger layer of an event-driven autoscaler
//!
//! This crate provides:
//! - The `Scaler` / `PushScaler` contract every trigger backend implements
//! - Trigger-index prefixes that keep metric names of sibling triggers apart
//! - External scalers backed by a remote gRPC service, with a shared
//!   connection pool and a reconnecting push stream
//! - Health checks and observability for a host process

pub mod config;
pub mod error;
pub mod external;
pub mod health;
pub mod identity;
pub mod models;
pub mod observability;
pub mod proto;
pub mod scaler;

pub use config::{ScalableObject, ScalerConfig};
pub use error::{Result, ScalerError};
pub use external::{ConnectionPool, ExternalPushScaler, ExternalScaler, GrpcConnector};
pub use health::{ComponentHealth, ComponentStatus, HealthRegistry, HealthResponse, ReadinessResponse};
pub use identity::{strip_index, with_index, MetricIdentifier};
pub use models::*;
pub use observability::{ScalerMetrics, StructuredLogger};
pub use scaler::{PushScaler, Scaler};
