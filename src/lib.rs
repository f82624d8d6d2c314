//! Write-once key value store served over tarpc.
//!
//! The server side [`Store`] suspends a `get` on an absent key until another
//! caller sets it or the wait budget expires. The client side [`CacheScope`]
//! answers repeated `get`s of a key locally within one scope.

pub mod admission;
pub mod cache;
pub mod config;
pub mod error;
pub mod listener;
pub mod service;
pub mod session;
pub mod shared_types;
pub mod store;

pub use cache::{CacheScope, CachingInterceptor, Downstream, Intercept, OutgoingGet};
pub use config::{ClientConfig, ServerConfig};
pub use error::{KvError, Result, Status};
pub use listener::KvServer;
pub use service::KvService;
pub use session::KvsClient;
pub use shared_types::*;
pub use store::{Store, WaitPolicy};
