//! Shared state for the gateway routes

use std::sync::Arc;

use crate::api::ApiServerAdapter;
use crate::auth::{AclAuthorizationProvider, AuthenticationInfoProvider, LocalAuthenticator};
use crate::config::GatewayConfig;
use crate::connection::{ConnectionFactory, ConnectionResult};
use crate::core::ProxyChain;
use crate::observability::MetricsRegistry;
use crate::pool::WorkerPool;
use crate::server::{ApiServer, ApiServerConfig};

/// Everything a request handler needs
pub struct GatewayState {
    pub adapter: ApiServerAdapter,
    pub metrics: Arc<MetricsRegistry>,
    pub max_read_size_in_bytes: u64,
    pub max_write_size_in_bytes: u64,
}

impl GatewayState {
    pub fn new(
        adapter: ApiServerAdapter,
        metrics: Arc<MetricsRegistry>,
        max_read_size_in_bytes: u64,
        max_write_size_in_bytes: u64,
    ) -> Self {
        Self {
            adapter,
            metrics,
            max_read_size_in_bytes,
            max_write_size_in_bytes,
        }
    }

    /// Wire up storage, pool, authentication, the proxy chain and the
    /// server from configuration
    pub fn from_config(config: &GatewayConfig) -> ConnectionResult<Self> {
        let factory: Arc<dyn ConnectionFactory> = Arc::new(config.storage.connection_factory()?);
        Ok(Self::with_factory(config, factory))
    }

    /// Same as `from_config` with an explicit connection factory
    pub fn with_factory(config: &GatewayConfig, factory: Arc<dyn ConnectionFactory>) -> Self {
        let pool = Arc::new(WorkerPool::new(
            factory,
            config.pool.max_workers,
            config.checkout_policy(),
        ));
        let authenticator: Arc<dyn AuthenticationInfoProvider> = Arc::new(
            LocalAuthenticator::new(config.user_table(), config.session_ttl()),
        );
        let provider = Arc::new(AclAuthorizationProvider::new(
            Arc::clone(&authenticator),
            config.acl.clone(),
        ));
        let metrics = Arc::new(MetricsRegistry::new());
        let chain = Arc::new(ProxyChain::standard(
            provider,
            config.max_read_size_in_bytes,
            config.max_write_size_in_bytes,
            Arc::clone(&metrics),
        ));
        let server = Arc::new(ApiServer::new(
            chain,
            pool,
            authenticator,
            ApiServerConfig {
                interactive_session_key: config.interactive_session_key.clone(),
                transaction_manager_key: config.transaction_manager_key.clone(),
                worker_idle_timeout: config.worker_idle_timeout(),
            },
        ));

        Self::new(
            ApiServerAdapter::new(server),
            metrics,
            config.max_read_size_in_bytes,
            config.max_write_size_in_bytes,
        )
    }

    pub fn server(&self) -> &Arc<ApiServer> {
        self.adapter.server()
    }
}
