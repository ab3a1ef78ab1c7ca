//! The contract every trigger backend implements
//!
//! The outer control loop holds one `Scaler` per configured trigger and never
//! needs backend-specific logic. Backends that stream their state instead of
//! being polled also implement `PushScaler`.

use crate::error::Result;
use crate::models::{ExternalMetricValue, MetricSpec};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

pub use async_trait::async_trait;

#[async_trait]
pub trait Scaler: Send + Sync {
    /// Evaluate the trigger once.
    ///
    /// An error means the backend could not be evaluated this tick; callers
    /// keep their previous state rather than scaling to zero.
    async fn get_metrics_and_activity(
        &self,
        metric_name: &str,
    ) -> Result<(Vec<ExternalMetricValue>, bool)>;

    /// Metrics the outer loop should register for this trigger
    async fn get_metric_spec_for_scaling(&self) -> Vec<MetricSpec>;

    /// Release backend resources. Calling it more than once is a no-op.
    async fn close(&self) -> Result<()>;
}

#[async_trait]
pub trait PushScaler: Scaler {
    /// Stream activity transitions into `active` until `cancel` fires.
    ///
    /// `run` owns the sender, so the channel closes exactly once when it
    /// returns. Callers must not run the same instance twice concurrently.
    async fn run(&self, cancel: CancellationToken, active: mpsc::Sender<bool>);
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    struct FixedScaler {
        value: f64,
        activation: f64,
        closed: AtomicBool,
    }

    #[async_trait]
    impl Scaler for FixedScaler {
        async fn get_metrics_and_activity(
            &self,
            metric_name: &str,
        ) -> Result<(Vec<ExternalMetricValue>, bool)> {
            let metric = ExternalMetricValue::now(metric_name, self.value);
            Ok((vec![metric], self.value > self.activation))
        }

        async fn get_metric_spec_for_scaling(&self) -> Vec<MetricSpec> {
            vec![MetricSpec {
                metric_name: crate::identity::with_index(0, "fixed"),
                target_type: Default::default(),
                target_value: 10.0,
            }]
        }

        async fn close(&self) -> Result<()> {
            self.closed.store(true, Ordering::SeqCst);
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_scaler_is_object_safe() {
        let scaler: Arc<dyn Scaler> = Arc::new(FixedScaler {
            value: 5.0,
            activation: 1.0,
            closed: AtomicBool::new(false),
        });

        let specs = scaler.get_metric_spec_for_scaling().await;
        assert_eq!(specs[0].metric_name, "s0-fixed");

        let (metrics, active) = scaler
            .get_metrics_and_activity(&specs[0].metric_name)
            .await
            .unwrap();
        assert_eq!(metrics.len(), 1);
        assert_eq!(metrics[0].value, 5.0);
        assert!(active);

        scaler.close().await.unwrap();
        scaler.close().await.unwrap();
    }
}
