use std::time::{Duration, SystemTime};

use tarpc::tokio_serde::formats::Json;
use tarpc::{client, context};
use tokio::net::ToSocketAddrs;
use tracing::{debug, info};

use crate::cache::{CacheScope, CachingInterceptor};
use crate::config::ClientConfig;
use crate::error::{KvError, Result};
use crate::shared_types::{GetRequest, KeyValueStoreClient, SetRequest};

/// Longest wait a client will ask for.
pub const MAX_TIMEOUT: Duration = Duration::from_secs(10 * 60);

/// Extra rpc deadline on top of the wait budget, so a server side timeout
/// is reported before the framework gives up on the call.
const DEADLINE_GRACE: Duration = Duration::from_secs(1);

/// A connection to the store. The session is one cache scope: repeated
/// `get`s of a key are answered locally after the first success.
pub struct KvsClient {
    scope: CacheScope<KeyValueStoreClient>,
    timeout: Duration,
}

impl KvsClient {
    pub async fn connect(addr: impl ToSocketAddrs, config: &ClientConfig) -> Result<Self> {
        let connect = tarpc::serde_transport::tcp::connect(addr, Json::default);
        let transport = tokio::time::timeout(config.connection_timeout(), connect)
            .await
            .map_err(|_| {
                KvError::Connection(format!(
                    "connect timed out after {:?}",
                    config.connection_timeout()
                ))
            })??;
        info!(peer = ?transport.peer_addr().ok(), "Connected to server");

        let stub = KeyValueStoreClient::new(client::Config::default(), transport).spawn();
        Ok(Self {
            scope: CacheScope::new(stub),
            timeout: config.timeout(),
        })
    }

    pub async fn set(&self, key: impl Into<String>, value: impl Into<String>) -> Result<()> {
        let req = SetRequest {
            key: key.into(),
            value: value.into(),
        };
        debug!(key = %req.key, "Set");
        let key = req.key.clone();
        self.scope
            .downstream()
            .set(call_context(self.timeout), req)
            .await
            .map_err(|err| KvError::from_rpc(&key, err))??;
        Ok(())
    }

    /// `get` with the session's default timeout.
    pub async fn get(&mut self, key: impl Into<String>) -> Result<String> {
        let timeout = self.timeout;
        self.get_with_timeout(key, timeout).await
    }

    /// Waits up to `timeout` (capped at ten minutes) for the key to be set.
    pub async fn get_with_timeout(
        &mut self,
        key: impl Into<String>,
        timeout: Duration,
    ) -> Result<String> {
        let timeout = timeout.min(MAX_TIMEOUT);
        let req = GetRequest {
            key: key.into(),
            timeout_ms: Some(timeout.as_millis() as u64),
        };
        let resp = self.scope.get(call_context(timeout), req).await?;
        Ok(resp.value)
    }

    /// Opens a new cache scope sharing this connection.
    pub fn scope(&self) -> CacheScope<KeyValueStoreClient> {
        CacheScope::new(self.scope.downstream().clone())
    }

    pub fn interceptor(&self) -> &CachingInterceptor {
        self.scope.interceptor()
    }
}

fn call_context(timeout: Duration) -> context::Context {
    let mut ctx = context::current();
    ctx.deadline = SystemTime::now() + timeout + DEADLINE_GRACE;
    ctx
}
