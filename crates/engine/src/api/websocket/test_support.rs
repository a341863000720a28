use super::*;

use std::{net::SocketAddr, time::Duration};

use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpListener;
use tokio_tungstenite::{connect_async, tungstenite::Message as WsMessage};

use partyline_domain::{Role, RoomCode};

pub(crate) type TestSocket =
    tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>;

pub(crate) const RECV_TIMEOUT: Duration = Duration::from_secs(2);

pub(crate) async fn spawn_ws_server(
    state: Arc<WsState>,
) -> (SocketAddr, tokio::task::JoinHandle<()>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let router = crate::router(state);

    let handle = tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });

    (addr, handle)
}

pub(crate) async fn ws_connect(addr: SocketAddr) -> TestSocket {
    let url = format!("ws://{}/ws", addr);
    let (ws, _resp) = connect_async(url).await.unwrap();
    ws
}

pub(crate) async fn ws_send_client(ws: &mut TestSocket, frame: &ClientFrame) {
    let json = serde_json::to_string(frame).unwrap();
    ws.send(WsMessage::Text(json.into())).await.unwrap();
}

pub(crate) async fn ws_send_raw(ws: &mut TestSocket, text: &str) {
    ws.send(WsMessage::Text(text.to_string().into())).await.unwrap();
}

pub(crate) async fn ws_recv_server(ws: &mut TestSocket) -> RelayFrame {
    loop {
        let msg = ws.next().await.unwrap().unwrap();
        match msg {
            WsMessage::Text(text) => {
                return serde_json::from_str::<RelayFrame>(text.as_str()).unwrap();
            }
            WsMessage::Binary(bin) => {
                let text = String::from_utf8(bin.to_vec()).unwrap();
                return serde_json::from_str::<RelayFrame>(&text).unwrap();
            }
            _ => {}
        }
    }
}

pub(crate) async fn ws_expect_message<F>(
    ws: &mut TestSocket,
    timeout: Duration,
    mut predicate: F,
) -> RelayFrame
where
    F: FnMut(&RelayFrame) -> bool,
{
    tokio::time::timeout(timeout, async {
        loop {
            let msg = ws_recv_server(ws).await;
            if predicate(&msg) {
                return msg;
            }
        }
    })
    .await
    .unwrap()
}

pub(crate) async fn ws_expect_no_message_matching<F>(
    ws: &mut TestSocket,
    timeout: Duration,
    mut predicate: F,
) where
    F: FnMut(&RelayFrame) -> bool,
{
    let result = tokio::time::timeout(timeout, async {
        loop {
            let msg = ws_recv_server(ws).await;
            if predicate(&msg) {
                panic!("unexpected message: {:?}", msg);
            }
        }
    })
    .await;

    // We only succeed if we timed out without seeing a matching message.
    assert!(result.is_err());
}

/// Connect and open a room as host. Returns the socket, room and host id.
pub(crate) async fn connect_host(addr: SocketAddr) -> (TestSocket, RoomCode, ConnectionId) {
    let mut ws = ws_connect(addr).await;
    ws_send_client(&mut ws, &ClientFrame::CreateRoom { code: None }).await;
    match ws_expect_message(&mut ws, RECV_TIMEOUT, |m| {
        matches!(m, RelayFrame::RoomJoined { .. })
    })
    .await
    {
        RelayFrame::RoomJoined {
            room,
            connection_id,
            ..
        } => (ws, room, connection_id),
        other => panic!("unexpected frame: {:?}", other),
    }
}

/// Connect and join `room` as a player. Returns the socket and player id.
pub(crate) async fn connect_player(addr: SocketAddr, room: &RoomCode) -> (TestSocket, ConnectionId) {
    let mut ws = ws_connect(addr).await;
    ws_send_client(
        &mut ws,
        &ClientFrame::JoinRoom {
            room: room.clone(),
            role: Role::Player,
        },
    )
    .await;
    match ws_expect_message(&mut ws, RECV_TIMEOUT, |m| {
        matches!(m, RelayFrame::RoomJoined { .. })
    })
    .await
    {
        RelayFrame::RoomJoined { connection_id, .. } => (ws, connection_id),
        other => panic!("unexpected frame: {:?}", other),
    }
}
