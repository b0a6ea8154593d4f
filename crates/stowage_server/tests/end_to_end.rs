//! End-to-end scenarios against a real server on a loopback port.

use std::collections::HashSet;
use std::net::SocketAddr;
use std::time::Duration;
use stowage_client::{deadline_after, Client, ClientConfig, ClientError, Engine, Subscription};
use stowage_codec::Value;
use stowage_protocol::{read_frame, Message, MessageType, Response, Status, MAX_FRAME_LEN};
use stowage_server::{Server, ServerConfig, ServerResult, ShutdownHandle};
use tempfile::TempDir;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio::task::JoinHandle;

struct TestServer {
    addr: SocketAddr,
    shutdown: ShutdownHandle,
    task: JoinHandle<ServerResult<()>>,
    _dir: TempDir,
}

impl TestServer {
    async fn start() -> Self {
        Self::start_with(|config| config).await
    }

    async fn start_with(tune: impl FnOnce(ServerConfig) -> ServerConfig) -> Self {
        let dir = stowage_testkit::temp_dir();
        let config = ServerConfig::new("127.0.0.1:0".parse().unwrap())
            .with_data_dir(dir.path())
            .with_bootstrap_admin("oliver", "hello")
            .with_broker_batch_timeout(Duration::from_millis(5));
        let server = Server::bind(tune(config)).await.unwrap();
        let addr = server.local_addr().unwrap();
        let shutdown = server.shutdown_handle();
        let task = tokio::spawn(server.run());
        Self {
            addr,
            shutdown,
            task,
            _dir: dir,
        }
    }

    async fn client(&self) -> Client {
        Client::connect(ClientConfig::new(self.addr).without_heartbeat())
            .await
            .unwrap()
    }

    /// Logged-in admin client with `sys/{cache,files,events}` created.
    async fn admin(&self) -> Client {
        let client = self.client().await;
        client.login("oliver", "hello").await.unwrap();
        let registry = client.registry();
        if registry.database("sys").await.is_err() {
            registry.create_database("sys").await.unwrap();
            for (name, engine) in [
                ("cache", Engine::Kv),
                ("files", Engine::Object),
                ("events", Engine::Broker),
            ] {
                registry.create_collection("sys", name, engine, 0).await.unwrap();
            }
        }
        client
    }

    async fn stop(self) {
        self.shutdown.shutdown();
        self.task.await.unwrap().unwrap();
    }
}

async fn drain(sub: &mut Subscription, wait: Duration) -> Vec<Vec<u8>> {
    let mut out = Vec::new();
    while let Ok(Some(message)) = tokio::time::timeout(wait, sub.next()).await {
        out.push(message.to_vec());
    }
    out
}

#[tokio::test(flavor = "multi_thread")]
async fn ping_and_versions() {
    let server = TestServer::start().await;
    let client = server.client().await;

    assert_eq!(client.ping().await.unwrap(), "pong");
    assert_eq!(client.supported_versions().await.unwrap(), vec![1]);
    client.check_protocol_version().await.unwrap();

    server.stop().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn login_and_auth_status() {
    let server = TestServer::start().await;
    let client = server.client().await;

    assert!(!client.auth_status().await.unwrap());
    let err = client.login("oliver", "wrong").await.unwrap_err();
    assert_eq!(err.status(), Some(Status::InvalidCredentials));
    assert!(!client.auth_status().await.unwrap());

    client.login("oliver", "hello").await.unwrap();
    assert!(client.auth_status().await.unwrap());

    server.stop().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn kv_deadline_expires() {
    let server = TestServer::start().await;
    let client = server.admin().await;
    let kv = client.kv("sys", "cache");

    kv.set_with_ttl("session", &Value::from("abc"), Duration::from_millis(50))
        .await
        .unwrap();
    assert_eq!(kv.get("session").await.unwrap(), Some(Value::from("abc")));
    assert!(kv.ttl("session").await.unwrap().unwrap() > 0);

    tokio::time::sleep(Duration::from_millis(120)).await;
    assert_eq!(kv.get("session").await.unwrap(), None);
    assert!(!kv.exists("session").await.unwrap());

    let err = kv
        .set_until("late", &Value::Integer(1), deadline_after(Duration::ZERO) - 1)
        .await
        .unwrap_err();
    assert_eq!(err.status(), Some(Status::BadRequest));

    server.stop().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn kv_commands_over_the_wire() {
    let server = TestServer::start().await;
    let client = server.admin().await;
    let kv = client.kv("sys", "cache");

    assert!(kv.set_if_not_exists("a", &Value::Integer(1), None).await.unwrap());
    assert!(!kv.set_if_not_exists("a", &Value::Integer(2), None).await.unwrap());
    assert_eq!(kv.increment("a", Value::Integer(4)).await.unwrap(), Value::Integer(5));
    kv.right_push("list", &Value::from("x")).await.unwrap();
    assert_eq!(kv.left_pop("list").await.unwrap(), Some(Value::from("x")));
    assert_eq!(kv.left_pop("list").await.unwrap(), None);

    assert_eq!(kv.keys().await.unwrap(), vec!["a".to_string(), "list".to_string()]);
    kv.delete_all().await.unwrap();
    assert_eq!(kv.count().await.unwrap(), 0);

    let err = client.objects("sys", "cache").count().await.unwrap_err();
    assert_eq!(err.status(), Some(Status::CommandNotAllowed));

    server.stop().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn object_put_get_metadata_delete() {
    let server = TestServer::start().await;
    let client = server.admin().await;
    let objects = client.objects("sys", "files");

    objects.put("k1", b"hello").await.unwrap();
    assert_eq!(objects.get("k1").await.unwrap(), Some(b"hello".to_vec()));

    let info = objects.metadata("k1").await.unwrap().unwrap();
    assert_eq!(info.size, 5);
    assert_eq!(info.checksum, 0x3610_A686);

    objects.delete("k1").await.unwrap();
    assert_eq!(objects.get("k1").await.unwrap(), None);
    assert!(objects.delete("k1").await.unwrap_err().is_not_found());

    server.stop().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn broker_wildcards() {
    let server = TestServer::start().await;
    let subscriber = server.admin().await;
    let publisher = server.admin().await;
    let broker = subscriber.broker("sys", "events");

    let mut exact = broker.subscribe("foo.bar").await.unwrap();
    let mut star = broker.subscribe("foo.*").await.unwrap();
    let mut tail = broker.subscribe("foo.>").await.unwrap();
    let mut all = broker.subscribe(">").await.unwrap();
    let mut other = broker.subscribe("bar.*").await.unwrap();

    publisher
        .broker("sys", "events")
        .publish("foo.bar", b"hi")
        .await
        .unwrap();

    let wait = Duration::from_millis(300);
    for sub in [&mut exact, &mut star, &mut tail, &mut all] {
        assert_eq!(drain(sub, wait).await, vec![b"hi".to_vec()], "{}", sub.key());
    }
    assert!(drain(&mut other, Duration::from_millis(50)).await.is_empty());

    server.stop().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn queue_group_balances_publishes() {
    let server = TestServer::start().await;
    let publisher = server.admin().await;

    let mut members = Vec::new();
    let mut subs = Vec::new();
    for _ in 0..3 {
        let member = server.admin().await;
        subs.push(
            member
                .broker("sys", "events")
                .subscribe_queue("jobs", "workers")
                .await
                .unwrap(),
        );
        members.push(member);
    }

    let broker = publisher.broker("sys", "events");
    for i in 0..100u32 {
        broker.publish("jobs", &i.to_be_bytes()).await.unwrap();
    }

    let mut counts = Vec::new();
    let mut seen = HashSet::new();
    for sub in &mut subs {
        let got = drain(sub, Duration::from_millis(300)).await;
        counts.push(got.len());
        seen.extend(got);
    }
    assert_eq!(counts.iter().sum::<usize>(), 100);
    assert_eq!(seen.len(), 100);
    let (min, max) = (counts.iter().min().unwrap(), counts.iter().max().unwrap());
    assert!(max - min <= 1, "unbalanced: {counts:?}");

    server.stop().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn idle_connections_are_closed() {
    let server = TestServer::start_with(|config| {
        config
            .with_inactivity_timeout(Duration::from_millis(200))
            .with_reaper_interval(Duration::from_millis(50))
    })
    .await;

    let idle = server.client().await;
    let chatty = Client::connect(
        ClientConfig::new(server.addr).with_heartbeat(Duration::from_millis(50)),
    )
    .await
    .unwrap();

    tokio::time::sleep(Duration::from_millis(600)).await;
    assert!(idle.is_closed());
    assert!(matches!(idle.ping().await, Err(ClientError::ConnectionClosed)));
    assert_eq!(chatty.ping().await.unwrap(), "pong");

    server.stop().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn oversized_frame_closes_connection() {
    let server = TestServer::start().await;
    let mut stream = TcpStream::connect(server.addr).await.unwrap();
    stream
        .write_all(&(MAX_FRAME_LEN + 1).to_be_bytes())
        .await
        .unwrap();

    let mut buf = bytes::BytesMut::new();
    let frame = read_frame(&mut stream, &mut buf).await.unwrap();
    let message = Message::decode(&frame).unwrap();
    assert_eq!(message.message_type, MessageType::Response);
    assert_eq!(
        Response::decode(&message.payload).unwrap().status,
        Status::InvalidMessage
    );
    assert!(read_frame(&mut stream, &mut buf).await.unwrap_err().is_eof());

    server.stop().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn registry_round_trip() {
    let server = TestServer::start().await;
    let client = server.admin().await;
    let registry = client.registry();

    let coll = registry
        .create_collection("sys", "sessions", Engine::Kv, stowage_client::FLAG_DISABLE_TTL)
        .await
        .unwrap();
    assert!(coll.disable_ttl);
    let renamed = registry
        .rename_collection("sys", "sessions", "logins")
        .await
        .unwrap();
    assert_eq!(renamed.name, "logins");

    let names: Vec<String> = registry
        .collections("sys")
        .await
        .unwrap()
        .into_iter()
        .map(|c| c.name)
        .collect();
    assert!(names.contains(&"logins".to_string()));
    assert!(!names.contains(&"sessions".to_string()));

    let err = registry.create_database("sys").await.unwrap_err();
    assert_eq!(err.status(), Some(Status::AlreadyExists));

    server.stop().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn oversized_response_keeps_connection_open() {
    let server = TestServer::start().await;
    let client = server.admin().await;
    let kv = client.kv("sys", "cache");

    let blob = Value::Binary(vec![7u8; 9 * 1024 * 1024]);
    kv.set("big1", &blob).await.unwrap();
    kv.set("big2", &blob).await.unwrap();

    let err = kv.get_all().await.unwrap_err();
    assert_eq!(err.status(), Some(Status::InternalServerError));

    assert_eq!(client.ping().await.unwrap(), "pong");
    assert!(kv.exists("big1").await.unwrap());

    server.stop().await;
}
