use super::*;

#[tokio::test]
async fn when_host_sends_to_players_then_every_player_receives_it_once() {
    let state = Arc::new(WsState::new());
    let (addr, server) = spawn_ws_server(state).await;
    let (mut host_ws, room, host_id) = connect_host(addr).await;
    let (mut a_ws, _a) = connect_player(addr, &room).await;
    let (mut b_ws, _b) = connect_player(addr, &room).await;

    let message = json!({"event": "server:loadgame", "data": "poll"});
    ws_send_client(
        &mut host_ws,
        &ClientFrame::Send {
            to: Target::Players,
            message: message.clone(),
        },
    )
    .await;

    for ws in [&mut a_ws, &mut b_ws] {
        let frame = ws_expect_message(ws, RECV_TIMEOUT, |m| {
            matches!(m, RelayFrame::Message { .. })
        })
        .await;
        assert_eq!(
            frame,
            RelayFrame::Message {
                from: host_id,
                message: message.clone()
            }
        );
        ws_expect_no_message_matching(ws, Duration::from_millis(150), |m| {
            matches!(m, RelayFrame::Message { .. })
        })
        .await;
    }
    server.abort();
}

#[tokio::test]
async fn when_player_sends_to_host_then_host_sees_sender_id() {
    let state = Arc::new(WsState::new());
    let (addr, server) = spawn_ws_server(state).await;
    let (mut host_ws, room, _host_id) = connect_host(addr).await;
    let (mut player_ws, player_id) = connect_player(addr, &room).await;

    let message = json!({"event": "client:join", "data": {"name": "Ada"}});
    ws_send_client(
        &mut player_ws,
        &ClientFrame::Send {
            to: Target::Host,
            message: message.clone(),
        },
    )
    .await;

    let frame = ws_expect_message(&mut host_ws, RECV_TIMEOUT, |m| {
        matches!(m, RelayFrame::Message { .. })
    })
    .await;
    assert_eq!(
        frame,
        RelayFrame::Message {
            from: player_id,
            message
        }
    );
    server.abort();
}

#[tokio::test]
async fn when_player_addresses_other_players_then_forbidden() {
    let state = Arc::new(WsState::new());
    let (addr, server) = spawn_ws_server(state).await;
    let (_host_ws, room, _host_id) = connect_host(addr).await;
    let (mut a_ws, _a) = connect_player(addr, &room).await;
    let (mut b_ws, b) = connect_player(addr, &room).await;

    ws_send_client(
        &mut a_ws,
        &ClientFrame::Send {
            to: Target::Connection(b),
            message: json!({"event": "addplayer"}),
        },
    )
    .await;

    let frame = ws_expect_message(&mut a_ws, RECV_TIMEOUT, |m| {
        matches!(m, RelayFrame::Error { .. })
    })
    .await;
    assert!(matches!(
        frame,
        RelayFrame::Error {
            code: ErrorCode::Forbidden,
            ..
        }
    ));
    ws_expect_no_message_matching(&mut b_ws, Duration::from_millis(150), |m| {
        matches!(m, RelayFrame::Message { .. })
    })
    .await;
    server.abort();
}

#[tokio::test]
async fn when_host_targets_one_connection_then_only_it_receives() {
    let state = Arc::new(WsState::new());
    let (addr, server) = spawn_ws_server(state).await;
    let (mut host_ws, room, _host_id) = connect_host(addr).await;
    let (mut a_ws, a) = connect_player(addr, &room).await;
    let (mut b_ws, _b) = connect_player(addr, &room).await;

    ws_send_client(
        &mut host_ws,
        &ClientFrame::Send {
            to: Target::Connection(a),
            message: json!({"event": "playersinroom", "data": []}),
        },
    )
    .await;

    let _ = ws_expect_message(&mut a_ws, RECV_TIMEOUT, |m| {
        matches!(m, RelayFrame::Message { .. })
    })
    .await;
    ws_expect_no_message_matching(&mut b_ws, Duration::from_millis(150), |m| {
        matches!(m, RelayFrame::Message { .. })
    })
    .await;
    server.abort();
}
