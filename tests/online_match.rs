//! End-to-end matches over real WebSocket connections.

use std::sync::Arc;
use std::time::Duration;

use futures_util::future::join_all;
use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::time::{sleep, timeout};
use tokio_tungstenite::{connect_async, tungstenite::Message, MaybeTlsStream, WebSocketStream};

use tictactoe::client::{GameClient, Phase};
use tictactoe::network::protocol::{ClientMessage, ErrorCode, MatchOverInfo, ServerMessage};
use tictactoe::{GameServer, Outcome, ServerConfig, Symbol};

type Ws = WebSocketStream<MaybeTlsStream<TcpStream>>;

const RECV_TIMEOUT: Duration = Duration::from_secs(5);

// =============================================================================
// Helpers
// =============================================================================

async fn start_server(config: ServerConfig) -> (Arc<GameServer>, String) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let server = Arc::new(GameServer::new(config));

    let running = server.clone();
    tokio::spawn(async move { running.serve(listener).await });

    (server, format!("ws://{}", addr))
}

async fn connect(url: &str) -> Ws {
    connect_async(url).await.unwrap().0
}

async fn send(ws: &mut Ws, msg: ClientMessage) {
    ws.send(Message::Text(msg.to_json().unwrap())).await.unwrap();
}

async fn recv(ws: &mut Ws) -> ServerMessage {
    loop {
        let frame = timeout(RECV_TIMEOUT, ws.next())
            .await
            .expect("timed out waiting for server")
            .expect("connection closed")
            .unwrap();
        if let Message::Text(text) = frame {
            return ServerMessage::from_json(&text).unwrap();
        }
    }
}

async fn expect_error(ws: &mut Ws, code: ErrorCode) {
    match recv(ws).await {
        ServerMessage::Error(err) => assert_eq!(err.code, code, "{}", err.message),
        other => panic!("expected {:?} error, got {:?}", code, other),
    }
}

/// Round-trip a ping so every earlier reply is known to have arrived.
async fn expect_nothing_pending(ws: &mut Ws) {
    send(ws, ClientMessage::Ping { timestamp: 7 }).await;
    match recv(ws).await {
        ServerMessage::Pong { timestamp, .. } => assert_eq!(timestamp, 7),
        other => panic!("unexpected message: {:?}", other),
    }
}

async fn wait_for_queue(server: &GameServer, len: usize) {
    for _ in 0..500 {
        if server.queue_size().await == len {
            return;
        }
        sleep(Duration::from_millis(10)).await;
    }
    panic!("queue never reached {}", len);
}

fn request(name: &str) -> ClientMessage {
    ClientMessage::RequestToPlay { player_name: name.to_string() }
}

fn submit(cell_index: usize) -> ClientMessage {
    ClientMessage::SubmitMove { cell_index: cell_index as i64 }
}

/// Connect alice then bob; alice waits first so she plays circle.
async fn paired(server: &GameServer, url: &str) -> (Ws, Ws) {
    let mut alice = connect(url).await;
    send(&mut alice, request("alice")).await;
    wait_for_queue(server, 1).await;

    let mut bob = connect(url).await;
    send(&mut bob, request("bob")).await;

    assert_eq!(recv(&mut alice).await, ServerMessage::OpponentFound {
        opponent_name: "bob".to_string(),
        playing_as: Symbol::Circle,
    });
    assert_eq!(recv(&mut bob).await, ServerMessage::OpponentFound {
        opponent_name: "alice".to_string(),
        playing_as: Symbol::Cross,
    });

    (alice, bob)
}

/// Play `cells` alternately starting with circle; both players see every move.
async fn play(alice: &mut Ws, bob: &mut Ws, cells: &[usize]) {
    for (i, &cell) in cells.iter().enumerate() {
        let (mover, symbol) = if i % 2 == 0 {
            (&mut *alice, Symbol::Circle)
        } else {
            (&mut *bob, Symbol::Cross)
        };
        send(mover, submit(cell)).await;

        let echo = ServerMessage::PlayerMoveFromServer { cell_index: cell, symbol };
        assert_eq!(recv(alice).await, echo);
        assert_eq!(recv(bob).await, echo);
    }
}

// =============================================================================
// Matches
// =============================================================================

#[tokio::test]
async fn circle_wins_left_column() {
    let (server, url) = start_server(ServerConfig::default()).await;
    let (mut alice, mut bob) = paired(&server, &url).await;

    play(&mut alice, &mut bob, &[0, 1, 3, 4, 6]).await;

    let over = ServerMessage::MatchOver(MatchOverInfo {
        outcome: Outcome::CircleWins,
        winning_line: Some([0, 3, 6]),
    });
    assert_eq!(recv(&mut alice).await, over);
    assert_eq!(recv(&mut bob).await, over);

    send(&mut bob, submit(8)).await;
    expect_error(&mut bob, ErrorCode::MatchAlreadyFinished).await;
    expect_nothing_pending(&mut bob).await;
    expect_nothing_pending(&mut alice).await;
}

#[tokio::test]
async fn diagonal_win_reports_line() {
    let (server, url) = start_server(ServerConfig::default()).await;
    let (mut alice, mut bob) = paired(&server, &url).await;

    play(&mut alice, &mut bob, &[0, 2, 1, 4, 5, 6]).await;

    let over = ServerMessage::MatchOver(MatchOverInfo {
        outcome: Outcome::CrossWins,
        winning_line: Some([2, 4, 6]),
    });
    assert_eq!(recv(&mut alice).await, over);
    assert_eq!(recv(&mut bob).await, over);
}

#[tokio::test]
async fn full_board_is_draw() {
    let (server, url) = start_server(ServerConfig::default()).await;
    let (mut alice, mut bob) = paired(&server, &url).await;

    play(&mut alice, &mut bob, &[0, 1, 2, 4, 3, 5, 7, 6, 8]).await;

    let over = ServerMessage::MatchOver(MatchOverInfo {
        outcome: Outcome::Draw,
        winning_line: None,
    });
    assert_eq!(recv(&mut alice).await, over);
    assert_eq!(recv(&mut bob).await, over);
}

#[tokio::test]
async fn invalid_moves_answered_only_to_submitter() {
    let (server, url) = start_server(ServerConfig::default()).await;
    let (mut alice, mut bob) = paired(&server, &url).await;

    // Cross cannot open
    send(&mut bob, submit(4)).await;
    expect_error(&mut bob, ErrorCode::InvalidMove).await;

    play(&mut alice, &mut bob, &[4]).await;

    // Occupied cell, then out of range
    send(&mut bob, submit(4)).await;
    expect_error(&mut bob, ErrorCode::InvalidMove).await;
    send(&mut bob, submit(9)).await;
    expect_error(&mut bob, ErrorCode::InvalidMove).await;

    expect_nothing_pending(&mut alice).await;

    // Rejections did not consume cross's turn
    send(&mut bob, submit(0)).await;
    let echo = ServerMessage::PlayerMoveFromServer { cell_index: 0, symbol: Symbol::Cross };
    assert_eq!(recv(&mut alice).await, echo);
    assert_eq!(recv(&mut bob).await, echo);
}

#[tokio::test]
async fn negative_cell_index_is_invalid_move() {
    let (server, url) = start_server(ServerConfig::default()).await;
    let (mut alice, mut bob) = paired(&server, &url).await;

    alice
        .send(Message::Text(r#"{"type":"submit_move","cell_index":-1}"#.to_string()))
        .await
        .unwrap();
    expect_error(&mut alice, ErrorCode::InvalidMove).await;
    expect_nothing_pending(&mut bob).await;

    // Circle still holds the turn
    play(&mut alice, &mut bob, &[4]).await;
}

#[tokio::test]
async fn disconnect_notifies_remaining_player_once() {
    let (server, url) = start_server(ServerConfig::default()).await;
    let (mut alice, mut bob) = paired(&server, &url).await;

    play(&mut alice, &mut bob, &[4]).await;
    alice.close(None).await.unwrap();

    assert_eq!(recv(&mut bob).await, ServerMessage::OpponentLeftMatch);

    send(&mut bob, submit(0)).await;
    expect_error(&mut bob, ErrorCode::MatchAlreadyFinished).await;
    expect_nothing_pending(&mut bob).await;

    for _ in 0..500 {
        if server.match_count().await == 0 {
            break;
        }
        sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(server.match_count().await, 0);
}

#[tokio::test]
async fn leave_ends_match() {
    let (server, url) = start_server(ServerConfig::default()).await;
    let (mut alice, mut bob) = paired(&server, &url).await;

    send(&mut bob, ClientMessage::Leave).await;
    assert_eq!(recv(&mut alice).await, ServerMessage::OpponentLeftMatch);

    // Both may queue again
    send(&mut alice, request("alice")).await;
    wait_for_queue(&server, 1).await;
    send(&mut bob, request("bob")).await;
    assert!(matches!(recv(&mut alice).await, ServerMessage::OpponentFound { playing_as: Symbol::Circle, .. }));
    assert!(matches!(recv(&mut bob).await, ServerMessage::OpponentFound { playing_as: Symbol::Cross, .. }));
}

// =============================================================================
// Matchmaking
// =============================================================================

#[tokio::test]
async fn queue_is_first_come_first_served() {
    let (server, url) = start_server(ServerConfig::default()).await;

    let mut players = Vec::new();
    for (i, name) in ["a", "b", "c", "d"].iter().enumerate() {
        let mut ws = connect(&url).await;
        send(&mut ws, request(name)).await;
        wait_for_queue(&server, if i % 2 == 0 { 1 } else { 0 }).await;
        players.push(ws);
    }

    let mut opponents = Vec::new();
    for ws in players.iter_mut() {
        match recv(ws).await {
            ServerMessage::OpponentFound { opponent_name, .. } => opponents.push(opponent_name),
            other => panic!("unexpected message: {:?}", other),
        }
    }
    assert_eq!(opponents, vec!["b", "a", "d", "c"]);
    assert_eq!(server.queue_size().await, 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_requests_pair_everyone_once() {
    let (server, url) = start_server(ServerConfig::default()).await;

    let players = (0..8).map(|i| {
        let url = url.clone();
        tokio::spawn(async move {
            let name = format!("p{}", i);
            let mut ws = connect(&url).await;
            send(&mut ws, request(&name)).await;
            let found = recv(&mut ws).await;
            (name, found, ws)
        })
    });
    let results: Vec<_> = join_all(players).await.into_iter().map(|r| r.unwrap()).collect();

    let mut circles = 0;
    for (name, found, _) in &results {
        let ServerMessage::OpponentFound { opponent_name, playing_as } = found else {
            panic!("unexpected message: {:?}", found);
        };
        assert_ne!(opponent_name, name);

        // The opponent was paired with us and holds the other symbol
        let (_, theirs, _) = results.iter().find(|(n, _, _)| n == opponent_name).unwrap();
        assert_eq!(theirs, &ServerMessage::OpponentFound {
            opponent_name: name.clone(),
            playing_as: playing_as.other(),
        });
        if *playing_as == Symbol::Circle {
            circles += 1;
        }
    }
    assert_eq!(circles, 4);
    assert_eq!(server.queue_size().await, 0);
    assert_eq!(server.match_count().await, 4);

    // No second pairing announced to anyone
    for (_, _, mut ws) in results {
        expect_nothing_pending(&mut ws).await;
    }
}

#[tokio::test]
async fn lone_player_gets_opponent_not_found() {
    let config = ServerConfig {
        matchmaking_timeout: Some(Duration::from_millis(200)),
        sweep_interval: Duration::from_millis(20),
        ..Default::default()
    };
    let (server, url) = start_server(config).await;

    let mut alice = connect(&url).await;
    send(&mut alice, request("alice")).await;
    assert_eq!(recv(&mut alice).await, ServerMessage::OpponentNotFound);
    assert_eq!(server.queue_size().await, 0);

    // Retrying re-enters the queue
    send(&mut alice, request("alice")).await;
    wait_for_queue(&server, 1).await;
}

#[tokio::test]
async fn duplicate_and_invalid_requests_rejected() {
    let (server, url) = start_server(ServerConfig::default()).await;

    let mut alice = connect(&url).await;
    send(&mut alice, request("   ")).await;
    expect_error(&mut alice, ErrorCode::InvalidName).await;

    send(&mut alice, request("alice")).await;
    send(&mut alice, request("alice")).await;
    expect_error(&mut alice, ErrorCode::AlreadyQueued).await;
    assert_eq!(server.queue_size().await, 1);

    send(&mut alice, submit(0)).await;
    expect_error(&mut alice, ErrorCode::NotInMatch).await;
}

#[tokio::test]
async fn malformed_message_rejected() {
    let (_server, url) = start_server(ServerConfig::default()).await;
    let mut ws = connect(&url).await;

    ws.send(Message::Text("{\"type\":\"teleport\"}".to_string())).await.unwrap();
    expect_error(&mut ws, ErrorCode::InvalidInput).await;

    // Connection stays usable
    expect_nothing_pending(&mut ws).await;
}

#[tokio::test]
async fn connection_limit_enforced() {
    let config = ServerConfig {
        max_connections: 1,
        ..Default::default()
    };
    let (server, url) = start_server(config).await;

    let _first = connect(&url).await;
    for _ in 0..500 {
        if server.connection_count().await == 1 {
            break;
        }
        sleep(Duration::from_millis(10)).await;
    }

    let mut second = connect(&url).await;
    expect_error(&mut second, ErrorCode::ServerFull).await;
}

#[tokio::test]
async fn connection_burst_respects_limit() {
    let config = ServerConfig {
        max_connections: 2,
        ..Default::default()
    };
    let (_server, url) = start_server(config).await;

    let sockets = join_all((0..6).map(|_| connect(&url))).await;

    let mut rejected = 0;
    for mut ws in sockets {
        match timeout(Duration::from_millis(500), ws.next()).await {
            Ok(Some(Ok(Message::Text(text)))) => {
                match ServerMessage::from_json(&text).unwrap() {
                    ServerMessage::Error(err) => assert_eq!(err.code, ErrorCode::ServerFull),
                    other => panic!("unexpected message: {:?}", other),
                }
                rejected += 1;
            }
            Ok(other) => panic!("unexpected frame: {:?}", other),
            Err(_) => {}
        }
    }
    assert_eq!(rejected, 4);
}

#[tokio::test]
async fn shutdown_notifies_clients() {
    let (server, url) = start_server(ServerConfig::default()).await;
    let mut alice = connect(&url).await;
    for _ in 0..500 {
        if server.connection_count().await == 1 {
            break;
        }
        sleep(Duration::from_millis(10)).await;
    }

    server.shutdown();
    assert!(matches!(recv(&mut alice).await, ServerMessage::Shutdown { .. }));
}

// =============================================================================
// Client wiring
// =============================================================================

#[tokio::test]
async fn game_clients_mirror_server_board() {
    let (server, url) = start_server(ServerConfig::default()).await;

    let mut alice = GameClient::connect(&url, "alice").await.unwrap();
    wait_for_queue(&server, 1).await;
    let mut bob = GameClient::connect(&url, "bob").await.unwrap();

    alice.next_event().await.unwrap();
    bob.next_event().await.unwrap();
    assert_eq!(alice.state().playing_as(), Some(Symbol::Circle));
    assert_eq!(bob.state().opponent_name(), Some("alice"));

    // Not bob's turn yet
    assert!(!bob.click_cell(0).await.unwrap());
    assert!(alice.click_cell(4).await.unwrap());

    // Local boards change only on the echo
    assert_eq!(alice.state().board().get(4), None);
    alice.next_event().await.unwrap();
    bob.next_event().await.unwrap();
    assert_eq!(alice.state().board().get(4), Some(Symbol::Circle));
    assert_eq!(bob.state().board().get(4), Some(Symbol::Circle));
    assert!(bob.state().is_my_turn());

    alice.leave().await.unwrap();
    assert_eq!(bob.next_event().await, Some(ServerMessage::OpponentLeftMatch));
    assert_eq!(bob.state().phase(), Phase::Finished(Outcome::OpponentLeft));
}
