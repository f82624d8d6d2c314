use std::sync::Arc;
use std::time::{Duration, SystemTime};

use futures::future::{self, BoxFuture};
use futures::FutureExt;
use tarpc::context;
use tracing::{debug, info};

use crate::error::KvError;
use crate::shared_types::{GetRequest, GetResponse, KeyValueStore, SetRequest, SetResponse};
use crate::store::Store;

/// Serves the store over rpc. Cloned once per channel.
#[derive(Clone)]
pub struct KvService {
    store: Arc<Store>,
}

impl KvService {
    pub fn new(store: Arc<Store>) -> Self {
        Self { store }
    }

    /// The caller's budget, capped by policy and by the time left on the
    /// call's own deadline.
    fn wait_budget(&self, ctx: &context::Context, req: &GetRequest) -> Duration {
        let budget = self
            .store
            .policy()
            .resolve(req.timeout_ms.map(Duration::from_millis));
        let remaining = ctx
            .deadline
            .duration_since(SystemTime::now())
            .unwrap_or(Duration::ZERO);
        budget.min(remaining)
    }
}

impl KeyValueStore for KvService {
    type SetFut = future::Ready<Result<SetResponse, KvError>>;
    type GetFut = BoxFuture<'static, Result<GetResponse, KvError>>;

    fn set(self, _: context::Context, req: SetRequest) -> Self::SetFut {
        let SetRequest { key, value } = req;
        let result = match self.store.set(key.clone(), value) {
            Ok(()) => {
                info!(%key, "Set");
                Ok(SetResponse {})
            }
            Err(err) => {
                debug!(%key, %err, "Set rejected");
                Err(err)
            }
        };
        future::ready(result)
    }

    fn get(self, ctx: context::Context, req: GetRequest) -> Self::GetFut {
        let budget = self.wait_budget(&ctx, &req);
        async move {
            let value = self.store.get(&req.key, budget).await?;
            Ok(GetResponse { value })
        }
        .boxed()
    }
}
