//! Shared transports to remote external scalers
//!
//! One transport is kept per scaler address and handed to every trigger that
//! points at it. Each transport gets a watcher task that evicts it from the
//! pool once it reaches the terminal `Shutdown` state; triggers never close a
//! pooled transport themselves.

use super::metadata::{pool_key, ExternalScalerMetadata};
use super::transport::ScalerTransport;
use async_trait::async_trait;
use crate::error::{Result, ScalerError};
use crate::observability::ScalerMetrics;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Mutex};
use tokio_util::sync::CancellationToken;
use tonic::transport::{Certificate, Channel, ClientTlsConfig, Endpoint, Identity};
use tracing::{debug, info};

/// Connectivity of a pooled transport
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectivityState {
    Idle,
    Ready,
    TransientFailure,
    /// Terminal: the transport is being released
    Shutdown,
}

/// Builds transports for the pool.
///
/// `connect` runs under the pool lock, so it must not perform network I/O
/// and must not block the runtime thread.
#[async_trait]
pub trait Connector: Send + Sync + 'static {
    type Transport: ScalerTransport;

    async fn connect(&self, metadata: &ExternalScalerMetadata) -> Result<Self::Transport>;
}

/// Connector producing lazily-connected tonic channels
#[derive(Debug, Clone)]
pub struct GrpcConnector {
    pub connect_timeout: Duration,
    pub keepalive_interval: Duration,
    pub keepalive_timeout: Duration,
}

impl Default for GrpcConnector {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(10),
            keepalive_interval: Duration::from_secs(30),
            keepalive_timeout: Duration::from_secs(10),
        }
    }
}

impl GrpcConnector {
    async fn tls_config(&self, metadata: &ExternalScalerMetadata) -> Result<ClientTlsConfig> {
        let tls = &metadata.tls;
        let mut config = ClientTlsConfig::new();

        if let Some(path) = &tls.cert_file {
            let pem = tokio::fs::read(path).await.map_err(|e| {
                ScalerError::connection(
                    &metadata.scaler_address,
                    format!("failed to read TLS certificate {}", path.display()),
                    e,
                )
            })?;
            config = config.ca_certificate(Certificate::from_pem(pem));
        } else if let Some(ca) = &tls.ca_cert {
            config = config.ca_certificate(Certificate::from_pem(ca));
        }

        if let (Some(cert), Some(key)) = (&tls.client_cert, &tls.client_key) {
            config = config.identity(Identity::from_pem(cert, key));
        }

        Ok(config)
    }
}

#[async_trait]
impl Connector for GrpcConnector {
    type Transport = Channel;

    async fn connect(&self, metadata: &ExternalScalerMetadata) -> Result<Channel> {
        let address = &metadata.scaler_address;

        let mut endpoint = Endpoint::from_shared(metadata.endpoint_uri())
            .map_err(|e| ScalerError::connection(address, "invalid scaler address", e))?
            .connect_timeout(self.connect_timeout)
            .http2_keep_alive_interval(self.keepalive_interval)
            .keep_alive_timeout(self.keepalive_timeout)
            .keep_alive_while_idle(true);

        if metadata.tls.is_enabled() {
            let tls = self.tls_config(metadata).await?;
            endpoint = endpoint
                .tls_config(tls)
                .map_err(|e| ScalerError::connection(address, "invalid TLS configuration", e))?;
        }

        // The channel dials on first use, keeping socket work out of the pool lock
        Ok(endpoint.connect_lazy())
    }
}

/// A transport owned by the pool, plus its connectivity state
pub struct PooledConnection<T> {
    key: String,
    address: String,
    transport: T,
    state: watch::Sender<ConnectivityState>,
}

impl<T: Clone> PooledConnection<T> {
    fn new(key: String, address: String, transport: T) -> Self {
        let (state, _) = watch::channel(ConnectivityState::Idle);
        Self {
            key,
            address,
            transport,
            state,
        }
    }

    /// A handle to the shared transport
    pub fn transport(&self) -> T {
        self.transport.clone()
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    pub fn state(&self) -> ConnectivityState {
        *self.state.borrow()
    }

    /// Record the outcome of a call. `Shutdown` is terminal and only the pool
    /// may enter it.
    pub fn report(&self, next: ConnectivityState) {
        if next == ConnectivityState::Shutdown {
            return;
        }
        self.state.send_if_modified(|current| {
            if *current == ConnectivityState::Shutdown || *current == next {
                return false;
            }
            *current = next;
            true
        });
    }

    /// Record a failed call, marking the transport unhealthy when the remote
    /// side could not be reached
    pub fn report_status(&self, status: &tonic::Status) {
        if status.code() == tonic::Code::Unavailable {
            self.report(ConnectivityState::TransientFailure);
        }
    }

    fn shutdown(&self) {
        self.state.send_replace(ConnectivityState::Shutdown);
    }
}

impl<T> std::fmt::Debug for PooledConnection<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PooledConnection")
            .field("address", &self.address)
            .field("state", &*self.state.borrow())
            .finish()
    }
}

type ConnectionMap<T> = HashMap<String, Arc<PooledConnection<T>>>;

/// Process-wide cache of transports, keyed by scaler address.
///
/// Built once by the host process and shared by every external scaler.
/// Dropping the pool shuts down all of its transports.
pub struct ConnectionPool<C: Connector = GrpcConnector> {
    connector: C,
    connections: Arc<Mutex<ConnectionMap<C::Transport>>>,
    /// Cancelled on drop; every watcher shuts its connection down
    closing: CancellationToken,
    metrics: ScalerMetrics,
}

impl Default for ConnectionPool<GrpcConnector> {
    fn default() -> Self {
        Self::new(GrpcConnector::default())
    }
}

impl<C: Connector> ConnectionPool<C> {
    pub fn new(connector: C) -> Self {
        Self {
            connector,
            connections: Arc::new(Mutex::new(HashMap::new())),
            closing: CancellationToken::new(),
            metrics: ScalerMetrics::new(),
        }
    }

    pub fn connector(&self) -> &C {
        &self.connector
    }

    /// Get the shared transport for `metadata.scaler_address`, building it on
    /// first use
    pub async fn acquire(
        &self,
        metadata: &ExternalScalerMetadata,
    ) -> Result<Arc<PooledConnection<C::Transport>>> {
        let key = metadata.pool_key();
        let mut connections = self.connections.lock().await;

        if let Some(conn) = connections.get(&key) {
            // A shut-down entry whose watcher has not run yet is replaced here;
            // the watcher will leave the replacement alone
            if conn.state() != ConnectivityState::Shutdown {
                return Ok(Arc::clone(conn));
            }
        }

        let transport = self.connector.connect(metadata).await?;
        let conn = Arc::new(PooledConnection::new(
            key.clone(),
            metadata.scaler_address.clone(),
            transport,
        ));
        connections.insert(key, Arc::clone(&conn));
        self.metrics.inc_connections_created();
        self.metrics.set_pool_connections(connections.len());
        drop(connections);

        self.spawn_watcher(Arc::clone(&conn));

        info!(
            address = %metadata.scaler_address,
            tls = metadata.tls.is_enabled(),
            "Created pooled connection to external scaler"
        );

        Ok(conn)
    }

    fn spawn_watcher(&self, conn: Arc<PooledConnection<C::Transport>>) {
        let connections = Arc::clone(&self.connections);
        let metrics = self.metrics.clone();
        let closing = self.closing.clone();
        let mut state = conn.state.subscribe();

        tokio::spawn(async move {
            // The watcher holds the sender through `conn`, so this only
            // returns once the state reaches Shutdown
            tokio::select! {
                _ = state.wait_for(|s| *s == ConnectivityState::Shutdown) => {}
                _ = closing.cancelled() => conn.shutdown(),
            }

            let mut connections = connections.lock().await;
            let owned = connections
                .get(&conn.key)
                .is_some_and(|current| Arc::ptr_eq(current, &conn));
            if owned {
                connections.remove(&conn.key);
                metrics.inc_connections_evicted();
                metrics.set_pool_connections(connections.len());
            }
            drop(connections);

            debug!(
                address = %conn.address,
                evicted = owned,
                "Released pooled connection after shutdown"
            );
        });
    }

    /// Move the transport for `address` to `Shutdown`; its watcher evicts it
    pub async fn shutdown(&self, address: &str) -> bool {
        let connections = self.connections.lock().await;
        match connections.get(&pool_key(address)) {
            Some(conn) => {
                conn.shutdown();
                true
            }
            None => false,
        }
    }

    pub async fn shutdown_all(&self) {
        let connections = self.connections.lock().await;
        for conn in connections.values() {
            conn.shutdown();
        }
        info!(
            connections = connections.len(),
            "Shutting down pooled external scaler connections"
        );
    }

    /// Number of transports currently pooled
    pub async fn len(&self) -> usize {
        self.connections.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    pub async fn contains(&self, address: &str) -> bool {
        self.connections
            .lock()
            .await
            .contains_key(&pool_key(address))
    }

    /// Connectivity of the transport for `address`, if pooled
    pub async fn state(&self, address: &str) -> Option<ConnectivityState> {
        self.connections
            .lock()
            .await
            .get(&pool_key(address))
            .map(|conn| conn.state())
    }
}

impl<C: Connector> Drop for ConnectionPool<C> {
    fn drop(&mut self) {
        // Watchers shut their own connection down once `closing` fires, which
        // covers the case where the map is locked right now
        self.closing.cancel();
        if let Ok(connections) = self.connections.try_lock() {
            for conn in connections.values() {
                conn.shutdown();
            }
        }
    }
}
