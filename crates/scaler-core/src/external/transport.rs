//! RPC surface of a remote external scaler

use crate::proto::{
    ExternalScalerClient, GetMetricSpecResponse, GetMetricsRequest, GetMetricsResponse,
    IsActiveResponse, ScaledObjectRef,
};
use async_trait::async_trait;
use std::pin::Pin;
use tokio_stream::Stream;
use tonic::transport::Channel;
use tonic::Status;

/// Activity updates pushed by the remote scaler
pub type ActivityStream = Pin<Box<dyn Stream<Item = Result<IsActiveResponse, Status>> + Send>>;

/// A transport that can serve the four external scaler RPCs.
///
/// Implementations must be cheap to clone and safe to use from many
/// triggers at once; the pool hands the same transport to all of them.
#[async_trait]
pub trait ScalerTransport: Clone + Send + Sync + 'static {
    async fn is_active(&self, request: ScaledObjectRef) -> Result<IsActiveResponse, Status>;

    async fn stream_is_active(&self, request: ScaledObjectRef) -> Result<ActivityStream, Status>;

    async fn get_metric_spec(
        &self,
        request: ScaledObjectRef,
    ) -> Result<GetMetricSpecResponse, Status>;

    async fn get_metrics(&self, request: GetMetricsRequest) -> Result<GetMetricsResponse, Status>;
}

#[async_trait]
impl ScalerTransport for Channel {
    async fn is_active(&self, request: ScaledObjectRef) -> Result<IsActiveResponse, Status> {
        let mut client = ExternalScalerClient::new(self.clone());
        let response = client.is_active(tonic::Request::new(request)).await?;
        Ok(response.into_inner())
    }

    async fn stream_is_active(&self, request: ScaledObjectRef) -> Result<ActivityStream, Status> {
        let mut client = ExternalScalerClient::new(self.clone());
        let response = client
            .stream_is_active(tonic::Request::new(request))
            .await?;
        Ok(Box::pin(response.into_inner()))
    }

    async fn get_metric_spec(
        &self,
        request: ScaledObjectRef,
    ) -> Result<GetMetricSpecResponse, Status> {
        let mut client = ExternalScalerClient::new(self.clone());
        let response = client.get_metric_spec(tonic::Request::new(request)).await?;
        Ok(response.into_inner())
    }

    async fn get_metrics(&self, request: GetMetricsRequest) -> Result<GetMetricsResponse, Status> {
        let mut client = ExternalScalerClient::new(self.clone());
        let response = client.get_metrics(tonic::Request::new(request)).await?;
        Ok(response.into_inner())
    }
}
