//! Scalers backed by an out-of-process gRPC service
//!
//! This module provides:
//! - `ExternalScaler`, polled through unary RPCs on every evaluation tick
//! - `ExternalPushScaler`, which additionally keeps a `StreamIsActive` stream
//!   open and reconnects with exponential backoff when it breaks

use super::metadata::ExternalScalerMetadata;
use super::pool::{ConnectionPool, Connector, ConnectivityState, GrpcConnector, PooledConnection};
use super::transport::ScalerTransport;
use crate::config::ScalerConfig;
use crate::error::{Result, ScalerError};
use crate::identity::{strip_index, with_index};
use crate::models::{ExternalMetricValue, MetricSpec, MetricTargetType};
use crate::observability::ScalerMetrics;
use crate::proto::{self, GetMetricsRequest, ScaledObjectRef};
use crate::scaler::{PushScaler, Scaler};
use async_trait::async_trait;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_stream::StreamExt;
use tokio_util::sync::CancellationToken;
use tonic::Status;
use tracing::{debug, error, info, warn};

/// Pull-mode scaler delegating to a remote external scaler
pub struct ExternalScaler<C: Connector = GrpcConnector> {
    pool: Arc<ConnectionPool<C>>,
    metadata: ExternalScalerMetadata,
    metric_type: MetricTargetType,
    scaled_object_ref: ScaledObjectRef,
    request_timeout: Duration,
    metrics: ScalerMetrics,
    closed: AtomicBool,
}

impl<C: Connector> ExternalScaler<C> {
    pub fn new(config: &ScalerConfig, pool: Arc<ConnectionPool<C>>) -> Result<Self> {
        let metadata = ExternalScalerMetadata::parse(config)?;
        let scaled_object_ref = metadata.scaled_object_ref(config);

        Ok(Self {
            pool,
            metadata,
            metric_type: config.metric_type,
            scaled_object_ref,
            request_timeout: config.global_timeout,
            metrics: ScalerMetrics::new(),
            closed: AtomicBool::new(false),
        })
    }

    pub fn metadata(&self) -> &ExternalScalerMetadata {
        &self.metadata
    }

    pub fn scaled_object_ref(&self) -> &ScaledObjectRef {
        &self.scaled_object_ref
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    async fn connection(&self) -> Result<Arc<PooledConnection<C::Transport>>> {
        if self.is_closed() {
            return Err(ScalerError::Closed);
        }
        self.pool.acquire(&self.metadata).await
    }

    /// Issue one RPC on the pooled transport, bounded by the request timeout.
    /// Failures are returned as-is; the next tick retries.
    async fn call<F, Fut, R>(&self, rpc: &'static str, f: F) -> Result<R>
    where
        F: FnOnce(C::Transport) -> Fut + Send,
        Fut: Future<Output = std::result::Result<R, Status>> + Send,
        R: Send,
    {
        let conn = self.connection().await?;
        let started = Instant::now();

        let result = match tokio::time::timeout(self.request_timeout, f(conn.transport())).await {
            Ok(result) => result,
            Err(_) => Err(Status::deadline_exceeded(format!(
                "no response within {}ms",
                self.request_timeout.as_millis()
            ))),
        };
        self.metrics.observe_rpc_duration(rpc, started.elapsed());

        match result {
            Ok(response) => {
                conn.report(ConnectivityState::Ready);
                Ok(response)
            }
            Err(status) => {
                conn.report_status(&status);
                self.metrics.inc_rpc_error(rpc);
                Err(ScalerError::transport(
                    rpc,
                    &self.metadata.scaler_address,
                    status,
                ))
            }
        }
    }

    /// Ask the remote scaler whether the workload is active
    pub async fn is_active(&self) -> Result<bool> {
        let request = self.scaled_object_ref.clone();
        let response = self
            .call("IsActive", move |transport| async move {
                transport.is_active(request).await
            })
            .await?;
        Ok(response.result)
    }
}

#[async_trait]
impl<C: Connector> Scaler for ExternalScaler<C> {
    async fn get_metrics_and_activity(
        &self,
        metric_name: &str,
    ) -> Result<(Vec<ExternalMetricValue>, bool)> {
        let trigger_index = self.metadata.trigger_index;
        // The remote scaler only knows its own bare metric names
        let bare_name = strip_index(trigger_index, metric_name)?;

        let request = GetMetricsRequest {
            scaled_object_ref: Some(self.scaled_object_ref.clone()),
            metric_name: bare_name,
        };
        let response = self
            .call("GetMetrics", move |transport| async move {
                transport.get_metrics(request).await
            })
            .await?;

        let metrics: Vec<ExternalMetricValue> = response
            .metric_values
            .iter()
            .map(|value| {
                let name = if value.metric_name.is_empty() {
                    metric_name.to_string()
                } else {
                    with_index(trigger_index, &value.metric_name)
                };
                ExternalMetricValue::now(name, metric_value(value))
            })
            .collect();

        let active = match self.metadata.activation_threshold {
            Some(threshold) => metrics.iter().any(|m| m.value > threshold),
            None => self.is_active().await?,
        };

        debug!(
            address = %self.metadata.scaler_address,
            metric_name = %metric_name,
            values = metrics.len(),
            active = active,
            "Evaluated external scaler"
        );

        Ok((metrics, active))
    }

    async fn get_metric_spec_for_scaling(&self) -> Vec<MetricSpec> {
        let request = self.scaled_object_ref.clone();
        let response = match self
            .call("GetMetricSpec", move |transport| async move {
                transport.get_metric_spec(request).await
            })
            .await
        {
            Ok(response) => response,
            Err(e) => {
                error!(
                    address = %self.metadata.scaler_address,
                    trigger_index = self.metadata.trigger_index,
                    error = %e,
                    "Failed to get metric spec from external scaler"
                );
                return Vec::new();
            }
        };

        response
            .metric_specs
            .iter()
            .map(|spec| MetricSpec {
                metric_name: with_index(self.metadata.trigger_index, &spec.metric_name),
                target_type: self.metric_type,
                target_value: target_value(spec),
            })
            .collect()
    }

    async fn close(&self) -> Result<()> {
        // Pooled transports are shared with other triggers and stay open
        if !self.closed.swap(true, Ordering::AcqRel) {
            debug!(
                address = %self.metadata.scaler_address,
                trigger_index = self.metadata.trigger_index,
                "Closed external scaler"
            );
        }
        Ok(())
    }
}

/// A positive float wins over the integer field
fn metric_value(value: &proto::MetricValue) -> f64 {
    if value.metric_value_float > 0.0 {
        value.metric_value_float
    } else {
        value.metric_value as f64
    }
}

fn target_value(spec: &proto::MetricSpec) -> f64 {
    if spec.target_size_float > 0.0 {
        spec.target_size_float
    } else {
        spec.target_size as f64
    }
}

/// Delays between reconnects of a push stream
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackoffPolicy {
    pub initial: Duration,
    pub max: Duration,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            initial: Duration::from_secs(2),
            max: Duration::from_secs(60),
        }
    }
}

/// Smallest delay between reconnects; a zero delay would spin
const MIN_BACKOFF: Duration = Duration::from_millis(100);

impl BackoffPolicy {
    /// Clamp `initial` to at least `MIN_BACKOFF` and `max` to at least `initial`
    pub fn normalized(self) -> Self {
        let initial = self.initial.max(MIN_BACKOFF);
        Self {
            initial,
            max: self.max.max(initial),
        }
    }
}

/// Doubling backoff. It is never reset after a successful reconnect, only
/// when a new `run` starts.
#[derive(Debug)]
struct ReconnectBackoff {
    next: Duration,
    max: Duration,
}

impl ReconnectBackoff {
    fn new(policy: BackoffPolicy) -> Self {
        let policy = policy.normalized();
        Self {
            next: policy.initial,
            max: policy.max,
        }
    }

    fn next_delay(&mut self) -> Duration {
        let delay = self.next.min(self.max);
        self.next = delay.saturating_mul(2).min(self.max);
        delay
    }
}

/// Why a single streaming session ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StreamOutcome {
    Disconnected,
    Cancelled,
    ReceiverClosed,
}

/// Push-mode scaler: everything `ExternalScaler` does plus `StreamIsActive`
pub struct ExternalPushScaler<C: Connector = GrpcConnector> {
    scaler: ExternalScaler<C>,
    backoff: BackoffPolicy,
}

impl<C: Connector> ExternalPushScaler<C> {
    pub fn new(config: &ScalerConfig, pool: Arc<ConnectionPool<C>>) -> Result<Self> {
        Ok(Self {
            scaler: ExternalScaler::new(config, pool)?,
            backoff: BackoffPolicy::default(),
        })
    }

    pub fn with_backoff(mut self, backoff: BackoffPolicy) -> Self {
        self.backoff = backoff.normalized();
        self
    }

    pub fn inner(&self) -> &ExternalScaler<C> {
        &self.scaler
    }

    /// Open one activity stream and forward its messages until it ends
    async fn stream_once(
        &self,
        cancel: &CancellationToken,
        active: &mpsc::Sender<bool>,
    ) -> StreamOutcome {
        if cancel.is_cancelled() {
            return StreamOutcome::Cancelled;
        }
        let address = &self.scaler.metadata.scaler_address;

        // Not gated on `close`: the stream lives until its token is cancelled
        let conn = tokio::select! {
            _ = cancel.cancelled() => return StreamOutcome::Cancelled,
            conn = self.scaler.pool.acquire(&self.scaler.metadata) => match conn {
                Ok(conn) => conn,
                Err(e) => {
                    warn!(address = %address, error = %e, "Failed to get connection for activity stream");
                    return StreamOutcome::Disconnected;
                }
            },
        };

        let request = self.scaler.scaled_object_ref.clone();
        let transport = conn.transport();
        let mut stream = tokio::select! {
            _ = cancel.cancelled() => return StreamOutcome::Cancelled,
            stream = transport.stream_is_active(request) => match stream {
                Ok(stream) => stream,
                Err(status) => {
                    conn.report_status(&status);
                    self.scaler.metrics.inc_rpc_error("StreamIsActive");
                    warn!(address = %address, error = %status, "Failed to open activity stream");
                    return StreamOutcome::Disconnected;
                }
            },
        };
        conn.report(ConnectivityState::Ready);
        debug!(address = %address, "Activity stream open");

        loop {
            let message = tokio::select! {
                _ = cancel.cancelled() => return StreamOutcome::Cancelled,
                message = stream.next() => message,
            };

            match message {
                Some(Ok(response)) => {
                    self.scaler.metrics.inc_stream_messages();
                    tokio::select! {
                        _ = cancel.cancelled() => return StreamOutcome::Cancelled,
                        sent = active.send(response.result) => {
                            if sent.is_err() {
                                return StreamOutcome::ReceiverClosed;
                            }
                        }
                    }
                }
                Some(Err(status)) => {
                    conn.report_status(&status);
                    self.scaler.metrics.inc_rpc_error("StreamIsActive");
                    warn!(address = %address, error = %status, "Activity stream broke");
                    return StreamOutcome::Disconnected;
                }
                None => {
                    info!(address = %address, "Activity stream closed by remote scaler");
                    return StreamOutcome::Disconnected;
                }
            }
        }
    }
}

#[async_trait]
impl<C: Connector> Scaler for ExternalPushScaler<C> {
    async fn get_metrics_and_activity(
        &self,
        metric_name: &str,
    ) -> Result<(Vec<ExternalMetricValue>, bool)> {
        self.scaler.get_metrics_and_activity(metric_name).await
    }

    async fn get_metric_spec_for_scaling(&self) -> Vec<MetricSpec> {
        self.scaler.get_metric_spec_for_scaling().await
    }

    async fn close(&self) -> Result<()> {
        self.scaler.close().await
    }
}

#[async_trait]
impl<C: Connector> PushScaler for ExternalPushScaler<C> {
    async fn run(&self, cancel: CancellationToken, active: mpsc::Sender<bool>) {
        let address = self.scaler.metadata.scaler_address.clone();
        let trigger_index = self.scaler.metadata.trigger_index;
        info!(address = %address, trigger_index = trigger_index, "Starting push scaler");

        let mut backoff = ReconnectBackoff::new(self.backoff);
        // First attempt goes out without delay
        let mut outcome = self.stream_once(&cancel, &active).await;

        loop {
            match outcome {
                StreamOutcome::Cancelled => break,
                StreamOutcome::ReceiverClosed => {
                    debug!(address = %address, "Activity receiver dropped");
                    break;
                }
                StreamOutcome::Disconnected => {}
            }

            let delay = backoff.next_delay();
            debug!(
                address = %address,
                backoff_secs = delay.as_secs(),
                "Reconnecting activity stream after backoff"
            );
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(delay) => {}
            }

            self.scaler.metrics.inc_stream_reconnects();
            outcome = self.stream_once(&cancel, &active).await;
        }

        info!(address = %address, trigger_index = trigger_index, "Push scaler stopped");
        // `active` drops here, closing the channel
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_policy_default() {
        let policy = BackoffPolicy::default();
        assert_eq!(policy.initial, Duration::from_secs(2));
        assert_eq!(policy.max, Duration::from_secs(60));
    }

    #[test]
    fn test_backoff_doubles_and_caps() {
        let mut backoff = ReconnectBackoff::new(BackoffPolicy::default());
        let delays: Vec<u64> = (0..9).map(|_| backoff.next_delay().as_secs()).collect();
        assert_eq!(delays, vec![2, 4, 8, 16, 32, 60, 60, 60, 60]);
    }

    #[test]
    fn test_backoff_initial_above_max() {
        let mut backoff = ReconnectBackoff::new(BackoffPolicy {
            initial: Duration::from_secs(90),
            max: Duration::from_secs(60),
        });
        assert_eq!(backoff.next_delay(), Duration::from_secs(60));
        assert_eq!(backoff.next_delay(), Duration::from_secs(60));
    }

    #[test]
    fn test_backoff_saturates_with_huge_max() {
        let mut backoff = ReconnectBackoff::new(BackoffPolicy {
            initial: Duration::from_secs(2),
            max: Duration::MAX,
        });
        let mut last = Duration::ZERO;
        for _ in 0..200 {
            let delay = backoff.next_delay();
            assert!(delay >= last);
            last = delay;
        }
        assert_eq!(last, Duration::MAX);
    }

    #[test]
    fn test_zero_initial_backoff_is_clamped() {
        let policy = BackoffPolicy {
            initial: Duration::ZERO,
            max: Duration::ZERO,
        }
        .normalized();
        assert_eq!(policy.initial, MIN_BACKOFF);
        assert_eq!(policy.max, MIN_BACKOFF);

        let mut backoff = ReconnectBackoff::new(BackoffPolicy {
            initial: Duration::ZERO,
            max: Duration::from_secs(1),
        });
        assert_eq!(backoff.next_delay(), MIN_BACKOFF);
        assert_eq!(backoff.next_delay(), MIN_BACKOFF * 2);
    }

    #[test]
    fn test_float_values_take_precedence() {
        let value = proto::MetricValue {
            metric_name: "m".to_string(),
            metric_value: 3,
            metric_value_float: 2.5,
        };
        assert_eq!(metric_value(&value), 2.5);

        let value = proto::MetricValue {
            metric_name: "m".to_string(),
            metric_value: 42,
            metric_value_float: 0.0,
        };
        assert_eq!(metric_value(&value), 42.0);

        let spec = proto::MetricSpec {
            metric_name: "m".to_string(),
            target_size: 10,
            target_size_float: 0.0,
        };
        assert_eq!(target_value(&spec), 10.0);
    }
}
