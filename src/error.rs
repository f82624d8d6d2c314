use serde::{Deserialize, Serialize};
use tarpc::client::RpcError;
use thiserror::Error;

/// Errors produced by the store, the cache shim and the client session.
///
/// The type is serializable so the service can return it in-band.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum KvError {
    /// `set` on a key that already has a value.
    #[error("key already exists: {0}")]
    AlreadyExists(String),

    /// `get` waited its whole budget and the key never appeared.
    #[error("deadline exceeded waiting for key: {0}")]
    DeadlineExceeded(String),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Transport level failure, passed through from the rpc framework.
    #[error("connection error: {0}")]
    Connection(String),

    /// A broken pipeline contract, such as an undecodable request at the
    /// cache interception point. Never retried.
    #[error("internal error: {0}")]
    Internal(String),
}

/// Coarse status codes, also used as the client binary exit code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Ok = 0,
    Timeout = 1,
    InvalidArgument = 2,
    InternalError = 3,
    InvalidUsage = 5,
    ConnectionError = 8,
}

impl Status {
    pub fn code(self) -> i32 {
        self as i32
    }
}

impl KvError {
    pub fn status(&self) -> Status {
        match self {
            KvError::AlreadyExists(_) => Status::InvalidUsage,
            KvError::DeadlineExceeded(_) => Status::Timeout,
            KvError::InvalidArgument(_) => Status::InvalidArgument,
            KvError::Connection(_) => Status::ConnectionError,
            KvError::Internal(_) => Status::InternalError,
        }
    }

    /// Maps a framework error for a call on `key`.
    pub(crate) fn from_rpc(key: &str, err: RpcError) -> Self {
        match err {
            RpcError::DeadlineExceeded => KvError::DeadlineExceeded(key.to_owned()),
            other => KvError::Connection(other.to_string()),
        }
    }
}

impl From<std::io::Error> for KvError {
    fn from(err: std::io::Error) -> Self {
        KvError::Connection(err.to_string())
    }
}

pub type Result<T, E = KvError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_mapping() {
        assert_eq!(KvError::AlreadyExists("k".into()).status(), Status::InvalidUsage);
        assert_eq!(KvError::DeadlineExceeded("k".into()).status(), Status::Timeout);
        assert_eq!(KvError::Connection("refused".into()).status().code(), 8);
        assert_eq!(Status::Ok.code(), 0);
    }

    #[test]
    fn rpc_deadline_maps_to_deadline_exceeded() {
        let err = KvError::from_rpc("key1", RpcError::DeadlineExceeded);
        assert_eq!(err, KvError::DeadlineExceeded("key1".into()));
    }
}
