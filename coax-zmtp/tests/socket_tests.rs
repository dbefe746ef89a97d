//! End-to-end socket tests over loopback TCP.

use std::time::Duration;

use bytes::Bytes;
use compio::buf::BufResult;
use compio::io::AsyncWriteExt;
use compio::net::{TcpListener, TcpStream};

use coax_core::error::Error;
use coax_core::message::Message;
use coax_core::options::SocketOptions;
use coax_core::socket_type::{Role, SocketType};
use coax_zmtp::codec::Frame;
use coax_zmtp::command::{self, Command};
use coax_zmtp::handshake::perform_handshake;
use coax_zmtp::mechanism::MechanismKind;
use coax_zmtp::Socket;

/// Best-effort tracing init for debugging with `RUST_LOG` set.
fn init_tracing() {
    if std::env::var("RUST_LOG").is_ok() {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .try_init();
    }
}

/// Poll until the socket has `n` registered connections.
async fn wait_for_connections(socket: &Socket, n: usize) {
    for _ in 0..200 {
        if socket.connection_count().await == n {
            return;
        }
        compio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!(
        "timed out waiting for {n} connections, have {}",
        socket.connection_count().await
    );
}

#[compio::test]
async fn test_hello_world_round_trip() {
    init_tracing();

    let server = Socket::server(SocketType::Server);
    let addr = server.bind("tcp://127.0.0.1:0").await.unwrap();

    let client = Socket::client(SocketType::Client);
    client.connect(&format!("tcp://{addr}")).await.unwrap();
    wait_for_connections(&server, 1).await;

    client.send("HELLO").await.unwrap();
    let msg = server.recv().await.unwrap();
    match msg {
        Message::User(frames) => {
            assert_eq!(frames, vec![Bytes::from_static(b"HELLO")]);
        }
        other => panic!("expected user message, got {other:?}"),
    }

    server.send("WORLD").await.unwrap();
    let msg = client.recv().await.unwrap();
    match msg {
        Message::User(frames) => {
            assert_eq!(frames, vec![Bytes::from_static(b"WORLD")]);
        }
        other => panic!("expected user message, got {other:?}"),
    }
}

#[compio::test]
async fn test_multipart_arrives_whole_and_ordered() {
    let server = Socket::server(SocketType::Server);
    let addr = server.bind("tcp://127.0.0.1:0").await.unwrap();

    let client = Socket::client(SocketType::Client);
    client.connect(&format!("tcp://{addr}")).await.unwrap();
    wait_for_connections(&server, 1).await;

    client
        .send_multipart(vec![
            Bytes::from_static(b"A"),
            Bytes::from_static(b"B"),
            Bytes::from_static(b"C"),
        ])
        .await
        .unwrap();

    let msg = server.recv().await.unwrap();
    match msg {
        Message::User(frames) => {
            assert_eq!(
                frames,
                vec![
                    Bytes::from_static(b"A"),
                    Bytes::from_static(b"B"),
                    Bytes::from_static(b"C"),
                ]
            );
        }
        other => panic!("expected user message, got {other:?}"),
    }
}

#[compio::test]
async fn test_empty_multipart_rejected() {
    let client = Socket::client(SocketType::Client);
    let err = client.send_multipart(vec![]).await.unwrap_err();
    assert!(matches!(err, Error::Protocol(_)));
}

#[compio::test]
async fn test_identity_becomes_registry_key() {
    let server = Socket::server(SocketType::Server);
    let addr = server.bind("tcp://127.0.0.1:0").await.unwrap();

    let options = SocketOptions::default().with_identity("worker-1");
    let client = Socket::client(SocketType::Client).with_options(options);
    client.connect(&format!("tcp://{addr}")).await.unwrap();
    wait_for_connections(&server, 1).await;

    assert_eq!(server.peers().await, vec!["worker-1".to_string()]);

    server.send_to("worker-1", "direct").await.unwrap();
    let msg = client.recv().await.unwrap();
    assert!(matches!(msg, Message::User(_)));
}

#[compio::test]
async fn test_disconnect_unknown_peer() {
    let server = Socket::server(SocketType::Server);
    server.bind("tcp://127.0.0.1:0").await.unwrap();

    let err = server.disconnect("no-such-peer").await.unwrap_err();
    assert!(matches!(err, Error::ConnectionNotFound(_)));
}

#[compio::test]
async fn test_peer_disconnect_surfaces_single_error() {
    let server = Socket::server(SocketType::Server);
    let addr = server.bind("tcp://127.0.0.1:0").await.unwrap();

    let client = Socket::client(SocketType::Client);
    client.connect(&format!("tcp://{addr}")).await.unwrap();
    wait_for_connections(&server, 1).await;

    client.close().await;

    let msg = server.recv().await.unwrap();
    assert!(matches!(msg, Message::Error(_)));
    wait_for_connections(&server, 0).await;
}

#[compio::test]
async fn test_connect_retries_until_listener_appears() {
    init_tracing();

    // Grab a free port, then close the listener before the client dials.
    let probe = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = probe.local_addr().unwrap();
    drop(probe);

    let options = SocketOptions::default()
        .with_retry_ivl(Duration::from_millis(20))
        .with_retry_ivl_max(Duration::from_millis(20));
    let client = Socket::client(SocketType::Client).with_options(options);

    let endpoint = format!("tcp://{addr}");
    let dial = compio::runtime::spawn(async move {
        let key = client.connect(&endpoint).await?;
        Ok::<_, Error>((client, key))
    });

    // Let a few dial attempts fail before the listener exists.
    compio::time::sleep(Duration::from_millis(100)).await;

    let server = Socket::server(SocketType::Server);
    server.bind(&format!("tcp://{addr}")).await.unwrap();

    let (client, _key) = dial.await.unwrap();
    wait_for_connections(&server, 1).await;

    client.send("after-retry").await.unwrap();
    let msg = server.recv().await.unwrap();
    assert!(matches!(msg, Message::User(_)));
}

#[compio::test]
async fn test_concurrent_connects_all_registered() {
    let server = Socket::server(SocketType::Server);
    let addr = server.bind("tcp://127.0.0.1:0").await.unwrap();
    let endpoint = format!("tcp://{addr}");

    let mut tasks = Vec::new();
    for _ in 0..4 {
        let endpoint = endpoint.clone();
        tasks.push(compio::runtime::spawn(async move {
            let client = Socket::client(SocketType::Client);
            client.connect(&endpoint).await?;
            Ok::<_, Error>(client)
        }));
    }

    let mut clients = Vec::new();
    for task in tasks {
        clients.push(task.await.unwrap());
    }
    wait_for_connections(&server, 4).await;

    // Anonymous peers get distinct generated keys.
    let keys = server.peers().await;
    assert_eq!(keys.len(), 4);
    let unique: std::collections::HashSet<_> = keys.iter().collect();
    assert_eq!(unique.len(), 4);

    server.send("fan-out").await.unwrap();
    for client in &clients {
        let msg = client.recv().await.unwrap();
        assert!(matches!(msg, Message::User(_)));
    }
}

#[compio::test]
async fn test_slow_consumer_stalls_peer_sends() {
    let server = Socket::server(SocketType::Server);
    let addr = server.bind("tcp://127.0.0.1:0").await.unwrap();

    let client = Socket::client(SocketType::Client);
    client.connect(&format!("tcp://{addr}")).await.unwrap();
    wait_for_connections(&server, 1).await;

    // Well beyond what kernel socket buffers can absorb.
    const TOTAL: usize = 2048;
    let payload = Bytes::from(vec![0u8; 16 * 1024]);

    let (done_tx, done_rx) = flume::unbounded();
    let sender = compio::runtime::spawn(async move {
        for _ in 0..TOTAL {
            client.send(payload.clone()).await.unwrap();
        }
        let _ = done_tx.send(());
        client
    });

    // With the server never calling recv, the receive loop parks at the
    // rendezvous hand-off, stops reading, and the writer must stall on
    // full socket buffers long before pushing 32 MiB through.
    compio::time::sleep(Duration::from_millis(300)).await;
    assert!(
        done_rx.try_recv().is_err(),
        "all sends completed with no consumer draining"
    );

    // Draining unblocks the writer and delivers everything in order.
    let mut received = 0;
    while received < TOTAL {
        let msg = server.recv().await.unwrap();
        assert!(msg.is_user());
        received += 1;
    }

    let _client = sender.await;
    assert!(done_rx.try_recv().is_ok());
}

#[compio::test]
async fn test_concurrent_adds_and_removes_stay_consistent() {
    let server = Socket::server(SocketType::Server);
    let addr = server.bind("tcp://127.0.0.1:0").await.unwrap();
    let endpoint = format!("tcp://{addr}");

    let mut tasks = Vec::new();
    for i in 0..6 {
        let endpoint = endpoint.clone();
        tasks.push(compio::runtime::spawn(async move {
            let options = SocketOptions::default().with_identity(format!("peer-{i}"));
            let client = Socket::client(SocketType::Client).with_options(options);
            client.connect(&endpoint).await?;
            Ok::<_, Error>(client)
        }));
    }

    let mut clients = Vec::new();
    for task in tasks {
        clients.push(task.await.unwrap());
    }
    wait_for_connections(&server, 6).await;

    // Explicit removals race a peer-initiated close and its eviction.
    let (r0, r1, r2, ()) = futures::join!(
        server.disconnect("peer-0"),
        server.disconnect("peer-1"),
        server.disconnect("peer-2"),
        clients[3].close(),
    );
    r0.unwrap();
    r1.unwrap();
    r2.unwrap();

    // The self-closed peer surfaces exactly one terminal error.
    let msg = server.recv().await.unwrap();
    assert!(msg.is_error());

    wait_for_connections(&server, 2).await;
    let mut keys = server.peers().await;
    keys.sort();
    assert_eq!(keys, vec!["peer-4".to_string(), "peer-5".to_string()]);

    // Survivors are still reachable.
    server.send_to("peer-4", "still-here").await.unwrap();
    let msg = clients[4].recv().await.unwrap();
    assert!(msg.is_user());
}

#[compio::test]
async fn test_identity_collision_replaces_connection() {
    let server = Socket::server(SocketType::Server);
    let addr = server.bind("tcp://127.0.0.1:0").await.unwrap();
    let endpoint = format!("tcp://{addr}");

    let options = SocketOptions::default().with_identity("dup");
    let first = Socket::client(SocketType::Client).with_options(options.clone());
    first.connect(&endpoint).await.unwrap();
    wait_for_connections(&server, 1).await;

    let second = Socket::client(SocketType::Client).with_options(options);
    second.connect(&endpoint).await.unwrap();

    // Still exactly one entry under the shared identity.
    compio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(server.peers().await, vec!["dup".to_string()]);
    assert_eq!(server.connection_count().await, 1);

    // The surviving entry reaches the second client.
    server.send_to("dup", "hello-again").await.unwrap();
    let msg = second.recv().await.unwrap();
    assert!(matches!(msg, Message::User(_)));
}

#[compio::test]
async fn test_close_drops_all_connections() {
    let server = Socket::server(SocketType::Server);
    let addr = server.bind("tcp://127.0.0.1:0").await.unwrap();
    let endpoint = format!("tcp://{addr}");

    let a = Socket::client(SocketType::Client);
    let b = Socket::client(SocketType::Client);
    a.connect(&endpoint).await.unwrap();
    b.connect(&endpoint).await.unwrap();
    wait_for_connections(&server, 2).await;

    server.close().await;
    assert_eq!(server.connection_count().await, 0);

    // Both clients observe the shutdown as a terminal error message.
    assert!(matches!(a.recv().await.unwrap(), Message::Error(_)));
    assert!(matches!(b.recv().await.unwrap(), Message::Error(_)));
}

#[compio::test]
async fn test_ping_absorbed_and_answered_with_pong() {
    // Raw peer so we can inject PING and watch the wire for the PONG.
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let client = Socket::client(SocketType::Client);
    let endpoint = format!("tcp://{addr}");
    let dial = compio::runtime::spawn(async move {
        client.connect(&endpoint).await?;
        Ok::<_, Error>(client)
    });

    let (mut stream, _) = listener.accept().await.unwrap();
    let mut mechanism = MechanismKind::Null.build();
    perform_handshake(
        &mut stream,
        mechanism.as_mut(),
        SocketType::Server,
        Role::Server,
        Bytes::new(),
        &std::collections::HashMap::new(),
    )
    .await
    .unwrap();
    let client = dial.await.unwrap();

    // PING first, then a user frame.
    let ping = Command::encode_body(command::PING, &[]).unwrap();
    let BufResult(res, _) = stream
        .write_all(Frame::command(ping).encode().to_vec())
        .await;
    res.unwrap();
    let BufResult(res, _) = stream
        .write_all(
            Frame::data(Bytes::from_static(b"payload"), false)
                .encode()
                .to_vec(),
        )
        .await;
    res.unwrap();

    // The client surfaces only the user frame; the PING was absorbed.
    let msg = client.recv().await.unwrap();
    match msg {
        Message::User(frames) => assert_eq!(frames, vec![Bytes::from_static(b"payload")]),
        other => panic!("expected user message, got {other:?}"),
    }

    // And exactly one PONG came back over the raw stream.
    let pong = read_one_command(&mut stream).await;
    assert_eq!(pong.name, command::PONG);
}

async fn read_one_command(stream: &mut TcpStream) -> Command {
    use bytes::BytesMut;
    use coax_zmtp::codec::FrameDecoder;
    use compio::io::AsyncRead;

    let mut buf = BytesMut::new();
    loop {
        if let Some(frame) = FrameDecoder::decode_frame(&mut buf).unwrap() {
            assert!(frame.is_command());
            return Command::parse(&frame.payload).unwrap();
        }
        let chunk = vec![0u8; 256];
        let BufResult(res, chunk) = AsyncRead::read(stream, chunk).await;
        let n = res.unwrap();
        assert!(n > 0, "peer closed before sending a command");
        buf.extend_from_slice(&chunk[..n]);
    }
}
