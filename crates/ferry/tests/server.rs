//! End-to-end tests: a real server on a random port, real WebSocket clients.

use std::time::Duration;

use ferry::prelude::*;
use futures_util::{SinkExt, StreamExt};
use tokio_tungstenite::tungstenite::Message;

// =========================================================================
// Helpers
// =========================================================================

type ClientWs = tokio_tungstenite::WebSocketStream<
    tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>,
>;

const QUIET: Duration = Duration::from_millis(150);

async fn start_with(builder: FerryServerBuilder) -> String {
    let server = builder
        .bind("127.0.0.1:0")
        .build()
        .await
        .expect("server should build");
    let addr = server
        .local_addr()
        .expect("should have local addr")
        .to_string();

    tokio::spawn(async move {
        let _ = server.run().await;
    });
    tokio::time::sleep(Duration::from_millis(10)).await;
    addr
}

async fn start_server() -> String {
    start_with(FerryServerBuilder::new()).await
}

async fn connect(addr: &str) -> ClientWs {
    let (ws, _) = tokio_tungstenite::connect_async(format!("ws://{addr}/socket"))
        .await
        .expect("should connect");
    ws
}

async fn send(ws: &mut ClientWs, event: &ClientEvent) {
    let text = serde_json::to_string(event).expect("encode");
    ws.send(Message::Text(text.into())).await.expect("send");
}

/// Next data frame, or `None` on timeout. Keepalive pings are answered by
/// the client library while reading and skipped here.
async fn next_data(ws: &mut ClientWs, wait: Duration) -> Option<Message> {
    let deadline = tokio::time::Instant::now() + wait;
    loop {
        let msg = tokio::time::timeout_at(deadline, ws.next())
            .await
            .ok()?
            .expect("stream ended")
            .expect("ws error");
        if !matches!(msg, Message::Ping(_) | Message::Pong(_)) {
            return Some(msg);
        }
    }
}

async fn recv(ws: &mut ClientWs) -> ServerEvent {
    let msg = next_data(ws, Duration::from_secs(2))
        .await
        .expect("timed out waiting for event");
    serde_json::from_slice(&msg.into_data()).expect("decode")
}

async fn assert_silent(ws: &mut ClientWs) {
    let next = next_data(ws, QUIET).await;
    assert!(next.is_none(), "expected no event, got {next:?}");
}

fn metadata() -> FileMetadata {
    FileMetadata {
        file_name: "a.txt".into(),
        file_size: 10,
        file_type: "text/plain".into(),
        total_chunks: 2,
    }
}

fn create(room: &str) -> ClientEvent {
    ClientEvent::CreateRoom {
        room_id: room.into(),
        metadata: metadata(),
    }
}

fn chunk(room: &str, index: u64, bytes: &[u8]) -> ClientEvent {
    ClientEvent::FileChunk {
        chunk: bytes.to_vec(),
        room_id: room.into(),
        chunk_index: index,
        total_chunks: 2,
    }
}

/// Opens `room` as `sender` and joins it with `recipient`, consuming the
/// handshake events. Returns the recipient's peer id.
async fn open_room(sender: &mut ClientWs, recipient: &mut ClientWs, room: &str) -> PeerId {
    send(sender, &create(room)).await;
    assert_eq!(
        recv(sender).await,
        ServerEvent::RoomCreated { room_id: room.into() }
    );

    send(recipient, &ClientEvent::JoinRoom(room.into())).await;
    assert_eq!(
        recv(recipient).await,
        ServerEvent::ReadyToReceive { metadata: metadata() }
    );
    match recv(sender).await {
        ServerEvent::RecipientJoined { recipient_id, room_id } => {
            assert_eq!(room_id, RoomId::from(room));
            recipient_id
        }
        other => panic!("expected RecipientJoined, got {other:?}"),
    }
}

// =========================================================================
// Tests
// =========================================================================

#[tokio::test]
async fn test_full_transfer_over_websockets() {
    let addr = start_server().await;
    let mut a = connect(&addr).await;
    let mut b = connect(&addr).await;
    let mut c = connect(&addr).await;

    open_room(&mut a, &mut b, "r1").await;

    send(&mut a, &chunk("r1", 0, b"hello")).await;
    assert_eq!(
        recv(&mut b).await,
        ServerEvent::ReceiveChunk {
            chunk: b"hello".to_vec(),
            chunk_index: 0,
            total_chunks: 2,
        }
    );

    send(&mut a, &ClientEvent::TransferComplete("r1".into())).await;
    assert_eq!(recv(&mut b).await, ServerEvent::TransferComplete);
    assert_silent(&mut a).await;

    send(&mut c, &ClientEvent::JoinRoom("r1".into())).await;
    assert!(matches!(recv(&mut c).await, ServerEvent::RoomError(_)));
}

#[tokio::test]
async fn test_recipient_ids_are_distinct() {
    let addr = start_server().await;
    let mut a = connect(&addr).await;
    let mut b = connect(&addr).await;
    let mut c = connect(&addr).await;

    let b_id = open_room(&mut a, &mut b, "r1").await;
    send(&mut c, &ClientEvent::JoinRoom("r1".into())).await;
    recv(&mut c).await;
    let c_id = match recv(&mut a).await {
        ServerEvent::RecipientJoined { recipient_id, .. } => recipient_id,
        other => panic!("expected RecipientJoined, got {other:?}"),
    };
    assert_ne!(b_id, c_id);
}

#[tokio::test]
async fn test_join_unknown_room_yields_room_error() {
    let addr = start_server().await;
    let mut b = connect(&addr).await;

    send(&mut b, &ClientEvent::JoinRoom("missing".into())).await;
    assert_eq!(
        recv(&mut b).await,
        ServerEvent::RoomError("room missing not found or expired".into())
    );
}

#[tokio::test]
async fn test_chunk_from_non_sender_goes_nowhere() {
    let addr = start_server().await;
    let mut a = connect(&addr).await;
    let mut b = connect(&addr).await;
    let mut intruder = connect(&addr).await;

    open_room(&mut a, &mut b, "r1").await;

    send(&mut intruder, &chunk("r1", 0, b"forged")).await;
    send(&mut b, &chunk("r1", 0, b"forged")).await;
    send(&mut b, &ClientEvent::TransferComplete("r1".into())).await;

    assert_silent(&mut a).await;
    assert_silent(&mut b).await;
    assert_silent(&mut intruder).await;

    // The room survived the forged completion.
    send(&mut a, &chunk("r1", 1, b"real")).await;
    assert!(matches!(
        recv(&mut b).await,
        ServerEvent::ReceiveChunk { chunk_index: 1, .. }
    ));
}

#[tokio::test]
async fn test_sender_disconnect_cancels_transfer() {
    let addr = start_server().await;
    let mut a = connect(&addr).await;
    let mut b = connect(&addr).await;

    open_room(&mut a, &mut b, "r1").await;

    a.close(None).await.expect("close");
    drop(a);

    assert_eq!(
        recv(&mut b).await,
        ServerEvent::TransferCancelled("Sender disconnected".into())
    );

    let mut c = connect(&addr).await;
    send(&mut c, &ClientEvent::JoinRoom("r1".into())).await;
    assert!(matches!(recv(&mut c).await, ServerEvent::RoomError(_)));
}

#[tokio::test]
async fn test_recipient_disconnect_keeps_room_alive() {
    let addr = start_server().await;
    let mut a = connect(&addr).await;
    let mut b = connect(&addr).await;
    let mut c = connect(&addr).await;

    open_room(&mut a, &mut b, "r1").await;
    send(&mut c, &ClientEvent::JoinRoom("r1".into())).await;
    recv(&mut c).await;
    recv(&mut a).await;

    b.close(None).await.expect("close");
    drop(b);
    assert_silent(&mut a).await;

    send(&mut a, &chunk("r1", 0, b"still here")).await;
    assert!(matches!(
        recv(&mut c).await,
        ServerEvent::ReceiveChunk { chunk_index: 0, .. }
    ));
}

#[tokio::test]
async fn test_malformed_frame_gets_room_error_and_connection_survives() {
    let addr = start_server().await;
    let mut a = connect(&addr).await;

    a.send(Message::Text("{not json".to_string().into())).await.unwrap();
    assert_eq!(
        recv(&mut a).await,
        ServerEvent::RoomError("Invalid message".into())
    );

    send(&mut a, &create("r1")).await;
    assert_eq!(
        recv(&mut a).await,
        ServerEvent::RoomCreated { room_id: "r1".into() }
    );
}

#[tokio::test]
async fn test_binary_frames_are_accepted() {
    let addr = start_server().await;
    let mut a = connect(&addr).await;

    let bytes = serde_json::to_vec(&create("bin")).unwrap();
    a.send(Message::Binary(bytes.into())).await.unwrap();
    assert_eq!(
        recv(&mut a).await,
        ServerEvent::RoomCreated { room_id: "bin".into() }
    );
}

#[tokio::test]
async fn test_wrong_path_is_refused() {
    let addr = start_server().await;
    let result = tokio_tungstenite::connect_async(format!("ws://{addr}/other")).await;
    assert!(result.is_err());
}

#[tokio::test]
async fn test_idle_room_expires_when_ttl_configured() {
    let relay = RelayConfig {
        room_ttl: Some(Duration::from_millis(200)),
        sweep_interval: Duration::from_millis(50),
        ..RelayConfig::default()
    };
    let addr = start_with(FerryServerBuilder::new().relay_config(relay)).await;
    let mut a = connect(&addr).await;
    let mut b = connect(&addr).await;

    open_room(&mut a, &mut b, "r1").await;

    assert_eq!(
        recv(&mut b).await,
        ServerEvent::TransferCancelled("Room expired".into())
    );
    assert_eq!(
        recv(&mut a).await,
        ServerEvent::TransferCancelled("Room expired".into())
    );
}

#[tokio::test]
async fn test_stalled_socket_does_not_block_other_clients() {
    let addr = start_with(
        FerryServerBuilder::new().handshake_timeout(Duration::from_secs(30)),
    )
    .await;

    // Opens TCP and never sends the upgrade request.
    let _stalled = tokio::net::TcpStream::connect(addr.as_str()).await.unwrap();
    tokio::time::sleep(Duration::from_millis(20)).await;

    let mut a = tokio::time::timeout(Duration::from_secs(2), connect(&addr))
        .await
        .expect("a stalled socket must not hold up other upgrades");
    send(&mut a, &create("r1")).await;
    assert_eq!(
        recv(&mut a).await,
        ServerEvent::RoomCreated { room_id: "r1".into() }
    );
}

fn with_fast_keepalive() -> FerryServerBuilder {
    FerryServerBuilder::new()
        .keepalive(Duration::from_millis(100), Duration::from_millis(400))
}

#[tokio::test]
async fn test_listening_recipient_outlives_keepalive_timeout() {
    let addr = start_with(with_fast_keepalive()).await;
    let mut a = connect(&addr).await;
    let mut b = connect(&addr).await;

    open_room(&mut a, &mut b, "r1").await;

    // Six chunks spread over well past the keepalive timeout; b never
    // sends anything but pongs.
    for index in 0..6 {
        tokio::time::sleep(Duration::from_millis(200)).await;
        send(&mut a, &chunk("r1", index, b"data")).await;
        assert!(matches!(
            recv(&mut b).await,
            ServerEvent::ReceiveChunk { chunk_index, .. } if chunk_index == index
        ));
    }

    send(&mut a, &ClientEvent::TransferComplete("r1".into())).await;
    assert_eq!(recv(&mut b).await, ServerEvent::TransferComplete);
}

#[tokio::test]
async fn test_sender_waiting_for_recipient_keeps_its_room() {
    let addr = start_with(with_fast_keepalive()).await;
    let mut a = connect(&addr).await;

    send(&mut a, &create("r1")).await;
    recv(&mut a).await;

    // Reading only answers pings; no data goes up.
    assert!(next_data(&mut a, Duration::from_millis(1000)).await.is_none());

    let mut b = connect(&addr).await;
    send(&mut b, &ClientEvent::JoinRoom("r1".into())).await;
    assert!(matches!(recv(&mut b).await, ServerEvent::ReadyToReceive { .. }));
    assert!(matches!(
        recv(&mut a).await,
        ServerEvent::RecipientJoined { .. }
    ));
}

#[tokio::test]
async fn test_unresponsive_client_is_closed_after_keepalive_timeout() {
    let addr = start_with(
        FerryServerBuilder::new()
            .keepalive(Duration::from_millis(100), Duration::from_millis(300)),
    )
    .await;
    let mut a = connect(&addr).await;

    // Not polling the socket means pings go unanswered.
    tokio::time::sleep(Duration::from_millis(700)).await;

    let closed = tokio::time::timeout(Duration::from_secs(2), async {
        loop {
            match a.next().await {
                Some(Ok(Message::Ping(_) | Message::Pong(_))) => continue,
                other => return other,
            }
        }
    })
    .await
    .expect("server should close the unresponsive connection");
    assert!(matches!(closed, None | Some(Ok(Message::Close(_))) | Some(Err(_))));
}
