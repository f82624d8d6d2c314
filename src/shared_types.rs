use serde::{Deserialize, Serialize};

use crate::error::KvError;

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SetRequest {
    pub key: String,
    pub value: String,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SetResponse {}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct GetRequest {
    pub key: String,
    /// How long the caller is willing to wait for the key to be set.
    /// `None` leaves the choice to the server.
    #[serde(default)]
    pub timeout_ms: Option<u64>,
}

impl GetRequest {
    pub fn new(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            timeout_ms: None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct GetResponse {
    pub value: String,
}

#[tarpc::service]
pub trait KeyValueStore {
    /// Set a value for a key that has none yet
    async fn set(req: SetRequest) -> Result<SetResponse, KvError>;
    /// Get the value of a key, waiting for it to be set if needed
    async fn get(req: GetRequest) -> Result<GetResponse, KvError>;
}
