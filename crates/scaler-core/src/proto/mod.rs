//! Wire types for the `externalscaler` gRPC package
//!
//! With the `proto-gen` feature the code is generated at build time by
//! tonic-build. Otherwise the checked-in types below are used; they keep the
//! same field names and tags as `proto/externalscaler/externalscaler.proto`
//! so existing remote scalers interoperate either way.

#[cfg(feature = "proto-gen")]
pub mod externalscaler {
    tonic::include_proto!("externalscaler");
}

#[cfg(not(feature = "proto-gen"))]
pub mod externalscaler {
    use prost::Message;
    use std::collections::HashMap;

    #[derive(Clone, PartialEq, Message)]
    pub struct ScaledObjectRef {
        #[prost(string, tag = "1")]
        pub name: String,
        #[prost(string, tag = "2")]
        pub namespace: String,
        #[prost(map = "string, string", tag = "3")]
        pub scaler_metadata: HashMap<String, String>,
    }

    #[derive(Clone, PartialEq, Message)]
    pub struct IsActiveResponse {
        #[prost(bool, tag = "1")]
        pub result: bool,
    }

    #[derive(Clone, PartialEq, Message)]
    pub struct GetMetricSpecResponse {
        #[prost(message, repeated, tag = "1")]
        pub metric_specs: Vec<MetricSpec>,
    }

    #[derive(Clone, PartialEq, Message)]
    pub struct MetricSpec {
        #[prost(string, tag = "1")]
        pub metric_name: String,
        #[prost(int64, tag = "2")]
        pub target_size: i64,
        #[prost(double, tag = "3")]
        pub target_size_float: f64,
    }

    #[derive(Clone, PartialEq, Message)]
    pub struct GetMetricsRequest {
        #[prost(message, optional, tag = "1")]
        pub scaled_object_ref: Option<ScaledObjectRef>,
        #[prost(string, tag = "2")]
        pub metric_name: String,
    }

    #[derive(Clone, PartialEq, Message)]
    pub struct GetMetricsResponse {
        #[prost(message, repeated, tag = "1")]
        pub metric_values: Vec<MetricValue>,
    }

    #[derive(Clone, PartialEq, Message)]
    pub struct MetricValue {
        #[prost(string, tag = "1")]
        pub metric_name: String,
        #[prost(int64, tag = "2")]
        pub metric_value: i64,
        #[prost(double, tag = "3")]
        pub metric_value_float: f64,
    }

    pub mod external_scaler_client {
        use super::*;
        use tonic::codegen::*;
        use tonic::transport::Uri;

        #[derive(Debug, Clone)]
        pub struct ExternalScalerClient<T> {
            inner: tonic::client::Grpc<T>,
        }

        impl ExternalScalerClient<tonic::transport::Channel> {
            pub fn new(channel: tonic::transport::Channel) -> Self {
                let inner = tonic::client::Grpc::new(channel);
                Self { inner }
            }
        }

        impl<T> ExternalScalerClient<T>
        where
            T: tonic::client::GrpcService<tonic::body::BoxBody>,
            T::Error: Into<StdError>,
            T::ResponseBody: Body<Data = Bytes> + Send + 'static,
            <T::ResponseBody as Body>::Error: Into<StdError> + Send,
        {
            pub fn with_origin(inner: T, origin: Uri) -> Self {
                let inner = tonic::client::Grpc::with_origin(inner, origin);
                Self { inner }
            }

            async fn ready(&mut self) -> Result<(), tonic::Status> {
                self.inner.ready().await.map_err(|e| {
                    tonic::Status::new(
                        tonic::Code::Unknown,
                        format!("Service was not ready: {}", e.into()),
                    )
                })
            }

            pub async fn is_active(
                &mut self,
                request: impl tonic::IntoRequest<ScaledObjectRef>,
            ) -> Result<tonic::Response<IsActiveResponse>, tonic::Status> {
                self.ready().await?;
                let codec = tonic::codec::ProstCodec::default();
                let path = http::uri::PathAndQuery::from_static(
                    "/externalscaler.ExternalScaler/IsActive",
                );
                self.inner.unary(request.into_request(), path, codec).await
            }

            pub async fn stream_is_active(
                &mut self,
                request: impl tonic::IntoRequest<ScaledObjectRef>,
            ) -> Result<tonic::Response<tonic::codec::Streaming<IsActiveResponse>>, tonic::Status>
            {
                self.ready().await?;
                let codec = tonic::codec::ProstCodec::default();
                let path = http::uri::PathAndQuery::from_static(
                    "/externalscaler.ExternalScaler/StreamIsActive",
                );
                self.inner
                    .server_streaming(request.into_request(), path, codec)
                    .await
            }

            pub async fn get_metric_spec(
                &mut self,
                request: impl tonic::IntoRequest<ScaledObjectRef>,
            ) -> Result<tonic::Response<GetMetricSpecResponse>, tonic::Status> {
                self.ready().await?;
                let codec = tonic::codec::ProstCodec::default();
                let path = http::uri::PathAndQuery::from_static(
                    "/externalscaler.ExternalScaler/GetMetricSpec",
                );
                self.inner.unary(request.into_request(), path, codec).await
            }

            pub async fn get_metrics(
                &mut self,
                request: impl tonic::IntoRequest<GetMetricsRequest>,
            ) -> Result<tonic::Response<GetMetricsResponse>, tonic::Status> {
                self.ready().await?;
                let codec = tonic::codec::ProstCodec::default();
                let path = http::uri::PathAndQuery::from_static(
                    "/externalscaler.ExternalScaler/GetMetrics",
                );
                self.inner.unary(request.into_request(), path, codec).await
            }
        }
    }
}

pub use externalscaler::external_scaler_client::ExternalScalerClient;
pub use externalscaler::*;
