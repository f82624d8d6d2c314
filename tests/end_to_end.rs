use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use kv_rendezvous::*;
use tarpc::context;

async fn start_server(wait_budget_ms: u64) -> KvServer {
    let config = ServerConfig {
        host: "127.0.0.1".into(),
        port: 0,
        wait_budget_ms,
        ..ServerConfig::default()
    };
    KvServer::bind(&config).await.unwrap()
}

async fn connect(server: &KvServer) -> KvsClient {
    KvsClient::connect(server.local_addr(), &ClientConfig::default())
        .await
        .unwrap()
}

/// Counts the gets that actually reach the server.
struct Counting {
    inner: KeyValueStoreClient,
    calls: Arc<AtomicUsize>,
}

#[async_trait]
impl Downstream for Counting {
    async fn get_value(&self, ctx: context::Context, req: GetRequest) -> Result<GetResponse> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.inner.get_value(ctx, req).await
    }
}

#[tokio::test]
async fn single_client() {
    let server = start_server(100).await;
    let mut client = connect(&server).await;

    client.set("key1", "mykey1").await.unwrap();
    assert_eq!(client.get("key1").await.unwrap(), "mykey1");

    client.set("key2", "mykey2").await.unwrap();
    assert_eq!(client.get("key2").await.unwrap(), "mykey2");

    let err = client.set("key1", "mynewkey1").await.unwrap_err();
    assert_eq!(err, KvError::AlreadyExists("key1".into()));
    assert_eq!(err.status(), Status::InvalidUsage);

    server.shutdown().await;
}

#[tokio::test]
async fn two_clients() {
    let server = start_server(100).await;
    let mut client1 = connect(&server).await;
    let mut client2 = connect(&server).await;

    client1.set("key1", "mykey1").await.unwrap();
    assert_eq!(client2.get("key1").await.unwrap(), "mykey1");
    assert_eq!(client1.get("key1").await.unwrap(), "mykey1");

    client2.set("key2", "mykey2").await.unwrap();
    assert_eq!(client1.get("key2").await.unwrap(), "mykey2");

    server.shutdown().await;
}

#[tokio::test]
async fn get_value_times_out() {
    let server = start_server(100).await;
    let mut client = connect(&server).await;

    let start = Instant::now();
    let err = client
        .get_with_timeout("key1", Duration::from_millis(100))
        .await
        .unwrap_err();

    assert_eq!(err, KvError::DeadlineExceeded("key1".into()));
    assert_eq!(err.status(), Status::Timeout);
    assert!(start.elapsed() >= Duration::from_millis(100));
    assert_eq!(server.store().pending_keys(), 0);

    server.shutdown().await;
}

#[tokio::test]
async fn pending_get_returns_value_set_by_other_client() {
    let server = start_server(3000).await;
    let mut reader = connect(&server).await;
    let writer = connect(&server).await;

    let pending = tokio::spawn(async move {
        reader
            .get_with_timeout("k", Duration::from_secs(3))
            .await
    });
    tokio::time::sleep(Duration::from_millis(100)).await;
    writer.set("k", "X").await.unwrap();

    assert_eq!(pending.await.unwrap().unwrap(), "X");
    server.shutdown().await;
}

#[tokio::test]
async fn cache_hit_skips_the_server() {
    let server = start_server(100).await;
    let client = connect(&server).await;
    let calls = Arc::new(AtomicUsize::new(0));
    let mut scope = CacheScope::new(Counting {
        inner: client.scope().downstream().clone(),
        calls: calls.clone(),
    });

    client.set("key1", "mykey1").await.unwrap();

    let resp = scope.get(context::current(), GetRequest::new("key1")).await;
    assert_eq!(resp.unwrap().value, "mykey1");
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    let resp = scope.get(context::current(), GetRequest::new("key1")).await;
    assert_eq!(resp.unwrap().value, "mykey1");
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    // a fresh scope starts cold
    let mut fresh = CacheScope::new(Counting {
        inner: client.scope().downstream().clone(),
        calls: calls.clone(),
    });
    fresh
        .get(context::current(), GetRequest::new("key1"))
        .await
        .unwrap();
    assert_eq!(calls.load(Ordering::SeqCst), 2);

    server.shutdown().await;
}

#[tokio::test]
async fn session_caches_reads() {
    let server = start_server(100).await;
    let mut client = connect(&server).await;

    client.set("key1", "mykey1").await.unwrap();
    assert_eq!(client.get("key1").await.unwrap(), "mykey1");
    assert_eq!(client.get("key1").await.unwrap(), "mykey1");
    assert_eq!(client.interceptor().misses(), 1);
    assert_eq!(client.interceptor().hits(), 1);

    server.shutdown().await;
}

#[tokio::test]
async fn racing_writers_have_one_winner() {
    let server = start_server(100).await;
    let a = connect(&server).await;
    let b = connect(&server).await;

    let (ra, rb) = tokio::join!(a.set("k", "a"), b.set("k", "b"));
    let winner = match (ra, rb) {
        (Ok(()), Err(KvError::AlreadyExists(_))) => "a",
        (Err(KvError::AlreadyExists(_)), Ok(())) => "b",
        other => panic!("expected exactly one winner, got {other:?}"),
    };

    let mut reader = connect(&server).await;
    assert_eq!(reader.get("k").await.unwrap(), winner);
    server.shutdown().await;
}

#[tokio::test]
async fn connections_over_limit_are_refused() {
    let config = ServerConfig {
        host: "127.0.0.1".into(),
        port: 0,
        max_connections: 1,
        ..ServerConfig::default()
    };
    let server = KvServer::bind(&config).await.unwrap();

    let first = connect(&server).await;
    first.set("k", "v").await.unwrap();

    let second = connect(&server).await;
    assert!(second.set("k2", "v").await.is_err());
    assert!(!server.store().contains("k2"));

    server.shutdown().await;
}
