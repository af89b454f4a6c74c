//! End-to-end scenarios over a real Unix socket: literal JSON frames in,
//! literal JSON frames out.

use std::sync::Arc;
use std::time::Duration;

use serde_json::{json, Value};
use strata_core::bus::MessageBus;
use strata_core::network::SocketServer;
use strata_core::storage::{DiskTier, RamTier, StorageCoordinator};
use tempfile::TempDir;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::unix::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::UnixStream;

struct Server {
    socket_path: std::path::PathBuf,
    ram: Arc<RamTier>,
    _temp: TempDir,
}

/// Build the full stack and start serving on a socket in a temp dir.
async fn start_server(max_bytes: usize, sweep_interval: Duration) -> Server {
    let temp = TempDir::new().unwrap();
    let socket_path = temp.path().join("strata.sock");

    let bus = Arc::new(MessageBus::new());

    let ram = Arc::new(RamTier::with_options(max_bytes, sweep_interval));
    ram.register(&bus).unwrap();
    let _reaper = ram.start_reaper();

    let disk = Arc::new(DiskTier::open(temp.path().join("store.db")).unwrap());
    disk.register(&bus).unwrap();

    let coordinator = Arc::new(StorageCoordinator::new(Arc::clone(&bus)));
    coordinator.register().unwrap();

    let server = SocketServer::bind(&socket_path, Arc::clone(&bus)).unwrap();
    tokio::spawn(async move {
        let _ = server.run().await;
    });

    Server {
        socket_path,
        ram,
        _temp: temp,
    }
}

struct Client {
    reader: BufReader<OwnedReadHalf>,
    writer: OwnedWriteHalf,
}

impl Client {
    async fn connect(server: &Server) -> Self {
        let stream = UnixStream::connect(&server.socket_path).await.unwrap();
        let (read_half, writer) = stream.into_split();
        Self {
            reader: BufReader::new(read_half),
            writer,
        }
    }

    async fn roundtrip(&mut self, frame: Value) -> Value {
        let mut line = frame.to_string();
        line.push('\n');
        self.writer.write_all(line.as_bytes()).await.unwrap();

        let mut reply = String::new();
        self.reader.read_line(&mut reply).await.unwrap();
        serde_json::from_str(reply.trim_end()).unwrap()
    }
}

#[tokio::test]
async fn test_set_persistent_then_get_key() {
    let server = start_server(1024 * 1024, Duration::from_millis(100)).await;
    let mut client = Client::connect(&server).await;

    let reply = client
        .roundtrip(json!({
            "id": "a",
            "event": "SET",
            "flags": { "persistent": true, "ttl": 3600 },
            "key": "k",
            "value": "v",
            "group": "g"
        }))
        .await;
    assert_eq!(reply, json!({ "id": "a", "response": true }));

    let reply = client
        .roundtrip(json!({ "id": "b", "event": "GET KEY", "key": "k" }))
        .await;
    assert_eq!(reply, json!({ "id": "b", "response": "v" }));
}

#[tokio::test]
async fn test_volatile_set_get_delete_get() {
    let server = start_server(1024 * 1024, Duration::from_millis(100)).await;
    let mut client = Client::connect(&server).await;

    let reply = client
        .roundtrip(json!({
            "id": "1",
            "event": "SET",
            "flags": { "persistent": false, "ttl": 3600 },
            "key": "k2",
            "value": "v2",
            "group": "g2"
        }))
        .await;
    assert_eq!(reply["response"], json!(true));

    let reply = client
        .roundtrip(json!({ "id": "2", "event": "GET KEY", "key": "k2" }))
        .await;
    assert_eq!(reply["response"], json!("v2"));

    let reply = client
        .roundtrip(json!({ "id": "3", "event": "DELETE KEY", "key": "k2" }))
        .await;
    assert_eq!(reply["response"], json!(1));

    let reply = client
        .roundtrip(json!({ "id": "4", "event": "GET KEY", "key": "k2" }))
        .await;
    assert_eq!(reply["response"], json!(""));
}

#[tokio::test]
async fn test_ttl_expiry() {
    let server = start_server(1024 * 1024, Duration::from_millis(100)).await;
    let mut client = Client::connect(&server).await;

    client
        .roundtrip(json!({
            "id": "t1",
            "event": "SET",
            "flags": { "persistent": false, "ttl": 2 },
            "key": "kT",
            "value": "vT",
            "group": "g"
        }))
        .await;

    let reply = client
        .roundtrip(json!({ "id": "t2", "event": "GET KEY", "key": "kT" }))
        .await;
    assert_eq!(reply["response"], json!("vT"));

    tokio::time::sleep(Duration::from_millis(3000)).await;

    let reply = client
        .roundtrip(json!({ "id": "t3", "event": "GET KEY", "key": "kT" }))
        .await;
    assert_eq!(reply["response"], json!(""));
}

#[tokio::test]
async fn test_size_based_eviction() {
    // budget of 10 MiB, twelve 1 MiB values: the reaper must evict the
    // earliest three to get back under budget
    let server = start_server(10 * 1024 * 1024, Duration::from_millis(100)).await;
    let mut client = Client::connect(&server).await;

    let big_value = "x".repeat(1024 * 1024);
    for i in 0..12 {
        let reply = client
            .roundtrip(json!({
                "id": format!("s{i:02}"),
                "event": "SET",
                "flags": { "persistent": false, "ttl": 0 },
                "key": format!("k{i:02}"),
                "value": big_value,
                "group": "g"
            }))
            .await;
        assert_eq!(reply["response"], json!(true));
    }

    tokio::time::sleep(Duration::from_millis(600)).await;

    for i in 0..3 {
        let reply = client
            .roundtrip(json!({ "id": "e", "event": "GET KEY", "key": format!("k{i:02}") }))
            .await;
        assert_eq!(reply["response"], json!(""), "k{i:02} should be evicted");
    }
    for i in [3, 11] {
        let reply = client
            .roundtrip(json!({ "id": "e", "event": "GET KEY", "key": format!("k{i:02}") }))
            .await;
        assert_eq!(reply["response"], json!(big_value), "k{i:02} should survive");
    }

    assert!(server.ram.usage() <= 10 * 1024 * 1024);
}

#[tokio::test]
async fn test_cross_tier_group_query() {
    let server = start_server(1024 * 1024, Duration::from_millis(100)).await;
    let mut client = Client::connect(&server).await;

    client
        .roundtrip(json!({
            "id": "1",
            "event": "SET",
            "flags": { "persistent": true, "ttl": 0 },
            "key": "k1",
            "value": "v1",
            "group": "G"
        }))
        .await;
    client
        .roundtrip(json!({
            "id": "2",
            "event": "SET",
            "flags": { "persistent": false, "ttl": 0 },
            "key": "k2",
            "value": "v2",
            "group": "G"
        }))
        .await;

    let reply = client
        .roundtrip(json!({ "id": "3", "event": "GET GROUP", "group": "G" }))
        .await;
    assert_eq!(
        reply["response"],
        json!([
            { "key": "k2", "value": "v2" },
            { "key": "k1", "value": "v1" }
        ])
    );
}

#[tokio::test]
async fn test_list_across_tiers() {
    let server = start_server(1024 * 1024, Duration::from_millis(100)).await;
    let mut client = Client::connect(&server).await;

    client
        .roundtrip(json!({
            "id": "1",
            "event": "SET",
            "flags": { "persistent": true, "ttl": 0 },
            "key": "pk",
            "value": "pv",
            "group": "pg"
        }))
        .await;
    client
        .roundtrip(json!({
            "id": "2",
            "event": "SET",
            "flags": { "persistent": false, "ttl": 0 },
            "key": "vk",
            "value": "vv",
            "group": "vg"
        }))
        .await;

    let reply = client.roundtrip(json!({ "id": "3", "event": "LIST" })).await;
    assert_eq!(
        reply["response"],
        json!([
            { "key": "vk", "value": "vv", "group": "vg" },
            { "key": "pk", "value": "pv", "group": "pg" }
        ])
    );
}

#[tokio::test]
async fn test_empty_key_is_an_error_frame() {
    let server = start_server(1024 * 1024, Duration::from_millis(100)).await;
    let mut client = Client::connect(&server).await;

    let reply = client
        .roundtrip(json!({ "id": "v1", "event": "GET KEY", "key": "" }))
        .await;
    assert!(reply.get("error").is_some());
    assert!(reply.get("response").is_none());

    // the connection is still usable afterwards
    let reply = client
        .roundtrip(json!({ "id": "v2", "event": "LIST" }))
        .await;
    assert_eq!(reply["response"], json!([]));
}

#[tokio::test]
async fn test_concurrent_connections() {
    let server = start_server(1024 * 1024, Duration::from_millis(100)).await;

    let mut tasks = Vec::new();
    for i in 0..8 {
        let path = server.socket_path.clone();
        tasks.push(tokio::spawn(async move {
            let stream = UnixStream::connect(&path).await.unwrap();
            let (read_half, mut writer) = stream.into_split();
            let mut reader = BufReader::new(read_half);

            let frame = json!({
                "id": format!("c{i}"),
                "event": "SET",
                "flags": { "persistent": false, "ttl": 0 },
                "key": format!("key-{i}"),
                "value": format!("value-{i}"),
                "group": "shared"
            });
            writer
                .write_all(format!("{frame}\n").as_bytes())
                .await
                .unwrap();
            let mut reply = String::new();
            reader.read_line(&mut reply).await.unwrap();
            let reply: Value = serde_json::from_str(reply.trim_end()).unwrap();
            assert_eq!(reply["response"], json!(true));
        }));
    }
    for task in tasks {
        task.await.unwrap();
    }

    let mut client = Client::connect(&server).await;
    let reply = client
        .roundtrip(json!({ "id": "g", "event": "GET GROUP", "group": "shared" }))
        .await;
    assert_eq!(reply["response"].as_array().unwrap().len(), 8);
}
