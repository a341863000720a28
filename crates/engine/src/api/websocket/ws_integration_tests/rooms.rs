use super::*;

#[tokio::test]
async fn when_player_joins_then_host_sees_connect_and_player_sees_host_peer() {
    let state = Arc::new(WsState::new());
    let (addr, server) = spawn_ws_server(state.clone()).await;

    let (mut host_ws, room, host_id) = connect_host(addr).await;

    let mut player_ws = ws_connect(addr).await;
    ws_send_client(
        &mut player_ws,
        &ClientFrame::JoinRoom {
            room: room.clone(),
            role: Role::Player,
        },
    )
    .await;

    let joined = ws_expect_message(&mut player_ws, RECV_TIMEOUT, |m| {
        matches!(m, RelayFrame::RoomJoined { .. })
    })
    .await;
    let player_id = match joined {
        RelayFrame::RoomJoined {
            room: joined_room,
            connection_id,
            role,
            peers,
        } => {
            assert_eq!(joined_room, room);
            assert_eq!(role, Role::Player);
            assert_eq!(peers.len(), 1);
            assert_eq!(peers[0].connection_id, host_id);
            assert_eq!(peers[0].role, Role::Host);
            connection_id
        }
        other => panic!("unexpected frame: {:?}", other),
    };

    let connect = ws_expect_message(&mut host_ws, RECV_TIMEOUT, |m| {
        matches!(m, RelayFrame::Connect { .. })
    })
    .await;
    assert_eq!(
        connect,
        RelayFrame::Connect {
            connection_id: player_id,
            role: Role::Player
        }
    );

    assert_eq!(state.connections.room_members(&room).await.len(), 2);
    server.abort();
}

#[tokio::test]
async fn when_room_is_unknown_then_join_fails_with_room_not_found() {
    let state = Arc::new(WsState::new());
    let (addr, server) = spawn_ws_server(state).await;

    let mut ws = ws_connect(addr).await;
    ws_send_client(
        &mut ws,
        &ClientFrame::JoinRoom {
            room: RoomCode::new("NOPE").unwrap(),
            role: Role::Player,
        },
    )
    .await;

    let frame = ws_expect_message(&mut ws, RECV_TIMEOUT, |m| {
        matches!(m, RelayFrame::Error { .. })
    })
    .await;
    assert!(matches!(
        frame,
        RelayFrame::Error {
            code: ErrorCode::RoomNotFound,
            ..
        }
    ));
    server.abort();
}

#[tokio::test]
async fn when_second_host_joins_then_host_already_connected() {
    let state = Arc::new(WsState::new());
    let (addr, server) = spawn_ws_server(state).await;
    let (_host_ws, room, _host_id) = connect_host(addr).await;

    let mut intruder = ws_connect(addr).await;
    ws_send_client(
        &mut intruder,
        &ClientFrame::JoinRoom {
            room,
            role: Role::Host,
        },
    )
    .await;

    let frame = ws_expect_message(&mut intruder, RECV_TIMEOUT, |m| {
        matches!(m, RelayFrame::Error { .. })
    })
    .await;
    assert!(matches!(
        frame,
        RelayFrame::Error {
            code: ErrorCode::HostAlreadyConnected,
            ..
        }
    ));
    server.abort();
}

#[tokio::test]
async fn when_socket_closes_then_peers_get_disconnect_and_empty_room_closes() {
    let state = Arc::new(WsState::new());
    let (addr, server) = spawn_ws_server(state.clone()).await;
    let (mut host_ws, room, _host_id) = connect_host(addr).await;
    let (player_ws, player_id) = connect_player(addr, &room).await;

    drop(player_ws);

    let frame = ws_expect_message(&mut host_ws, RECV_TIMEOUT, |m| {
        matches!(m, RelayFrame::Disconnect { .. })
    })
    .await;
    assert_eq!(
        frame,
        RelayFrame::Disconnect {
            connection_id: player_id
        }
    );

    ws_send_client(&mut host_ws, &ClientFrame::LeaveRoom).await;
    tokio::time::timeout(RECV_TIMEOUT, async {
        while state.connections.room_count().await > 0 {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .unwrap();
    server.abort();
}

#[tokio::test]
async fn when_frame_is_malformed_then_parse_error() {
    let state = Arc::new(WsState::new());
    let (addr, server) = spawn_ws_server(state).await;
    let mut ws = ws_connect(addr).await;

    ws_send_raw(&mut ws, "{\"type\": \"teleport\"}").await;

    let frame = ws_expect_message(&mut ws, RECV_TIMEOUT, |m| {
        matches!(m, RelayFrame::Error { .. })
    })
    .await;
    assert!(matches!(
        frame,
        RelayFrame::Error {
            code: ErrorCode::ParseError,
            ..
        }
    ));

    // The socket survives the bad frame.
    ws_send_client(&mut ws, &ClientFrame::Heartbeat).await;
    let frame = ws_expect_message(&mut ws, RECV_TIMEOUT, |_| true).await;
    assert_eq!(frame, RelayFrame::Pong);
    server.abort();
}

#[tokio::test]
async fn health_endpoint_answers_ok() {
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use tower::ServiceExt;

    let app = crate::router(Arc::new(WsState::new()));
    let response = app
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}
