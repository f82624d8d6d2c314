//! Call-scoped response cache for `get`.
//!
//! Values in the store never change once written, so a value resolved once
//! inside a scope can answer every later `get` of that key in the same scope
//! without going back to the server.

use std::collections::HashMap;

use async_trait::async_trait;
use tarpc::context;
use tracing::{debug, error};

use crate::error::{KvError, Result};
use crate::shared_types::{GetRequest, GetResponse, KeyValueStoreClient};

/// An outgoing `get` as seen at the interception point.
#[derive(Debug, Clone)]
pub enum OutgoingGet {
    Structured(GetRequest),
    /// JSON encoded `GetRequest`, as written to the wire.
    Serialized(Vec<u8>),
}

impl From<GetRequest> for OutgoingGet {
    fn from(req: GetRequest) -> Self {
        OutgoingGet::Structured(req)
    }
}

impl OutgoingGet {
    fn into_request(self) -> Result<GetRequest> {
        match self {
            OutgoingGet::Structured(req) => Ok(req),
            OutgoingGet::Serialized(bytes) => serde_json::from_slice(&bytes).map_err(|err| {
                error!(%err, "Undecodable get request at interception point");
                KvError::Internal(format!("undecodable get request: {err}"))
            }),
        }
    }
}

/// What the interceptor decided for one call. Exactly one per call.
#[derive(Debug, PartialEq, Eq)]
pub enum Intercept {
    /// Completed locally; nothing is sent.
    Handled(GetResponse),
    /// Send this request downstream.
    Forward(GetRequest),
}

/// Where forwarded `get`s go.
#[async_trait]
pub trait Downstream: Send + Sync {
    async fn get_value(&self, ctx: context::Context, req: GetRequest) -> Result<GetResponse>;
}

#[async_trait]
impl Downstream for KeyValueStoreClient {
    async fn get_value(&self, ctx: context::Context, req: GetRequest) -> Result<GetResponse> {
        let key = req.key.clone();
        self.get(ctx, req)
            .await
            .map_err(|err| KvError::from_rpc(&key, err))?
    }
}

#[derive(Debug, Default)]
pub struct CachingInterceptor {
    cache: HashMap<String, String>,
    hits: u64,
    misses: u64,
}

impl CachingInterceptor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn intercept(&mut self, outgoing: OutgoingGet) -> Result<Intercept> {
        let req = outgoing.into_request()?;
        match self.cache.get(&req.key) {
            Some(value) => {
                self.hits += 1;
                debug!(key = %req.key, "Key found in cache");
                Ok(Intercept::Handled(GetResponse {
                    value: value.clone(),
                }))
            }
            None => {
                self.misses += 1;
                debug!(key = %req.key, "Key not found in cache");
                Ok(Intercept::Forward(req))
            }
        }
    }

    pub fn record(&mut self, key: String, resp: &GetResponse) {
        self.cache.insert(key, resp.value.clone());
    }

    pub fn hits(&self) -> u64 {
        self.hits
    }

    pub fn misses(&self) -> u64 {
        self.misses
    }

    pub fn len(&self) -> usize {
        self.cache.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cache.is_empty()
    }
}

/// One cache scope over a downstream. Drop it to end the scope.
pub struct CacheScope<D> {
    downstream: D,
    interceptor: CachingInterceptor,
}

impl<D: Downstream> CacheScope<D> {
    pub fn new(downstream: D) -> Self {
        Self {
            downstream,
            interceptor: CachingInterceptor::new(),
        }
    }

    pub async fn get(
        &mut self,
        ctx: context::Context,
        outgoing: impl Into<OutgoingGet>,
    ) -> Result<GetResponse> {
        match self.interceptor.intercept(outgoing.into())? {
            Intercept::Handled(resp) => Ok(resp),
            Intercept::Forward(req) => {
                let key = req.key.clone();
                let resp = self.downstream.get_value(ctx, req).await?;
                self.interceptor.record(key, &resp);
                Ok(resp)
            }
        }
    }

    pub fn interceptor(&self) -> &CachingInterceptor {
        &self.interceptor
    }

    pub fn downstream(&self) -> &D {
        &self.downstream
    }
}
