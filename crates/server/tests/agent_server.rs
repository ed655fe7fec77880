use futures_util::{SinkExt, StreamExt};
use protocol::ServerMessage;
use server::{wire_events, AgentServer, GameRunner, Simulation, Transport};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

type Agent = WebSocketStream<MaybeTlsStream<TcpStream>>;

async fn next_server_message(agent: &mut Agent) -> ServerMessage {
    loop {
        let frame = tokio::time::timeout(Duration::from_secs(5), agent.next())
            .await
            .expect("timed out waiting for a frame")
            .expect("connection closed")
            .expect("websocket error");
        if let Message::Text(text) = frame {
            return ServerMessage::parse(text.as_str()).expect("undecodable server frame");
        }
    }
}

async fn setup() -> (Arc<GameRunner>, Arc<AgentServer>, Agent) {
    let runner = Arc::new(GameRunner::with_tick_interval(Duration::from_millis(20)));
    let agents = Arc::new(AgentServer::with_address("127.0.0.1", 0));
    wire_events(&runner, &agents);

    let addr = agents.start().await.unwrap();
    let (agent, _) = connect_async(format!("ws://{}/agent", addr)).await.unwrap();
    (runner, agents, agent)
}

#[tokio::test]
async fn test_agent_joins_and_receives_ticks() {
    let (runner, agents, mut agent) = setup().await;

    agent
        .send(Message::text(
            r#"{"type":"join","player_id":1,"team_id":0,"name":"alpha"}"#,
        ))
        .await
        .unwrap();

    match next_server_message(&mut agent).await {
        ServerMessage::Joined { player } => {
            assert_eq!(player.player_id, 1);
            assert_eq!(player.name, "alpha");
        }
        other => panic!("expected joined, got {:?}", other),
    }
    assert_eq!(runner.player_count(), 1);
    assert_eq!(agents.joined_count(), 1);

    runner.start();
    match next_server_message(&mut agent).await {
        ServerMessage::State { snapshot } => {
            assert!(snapshot.tick >= 1);
            assert_eq!(snapshot.players.len(), 1);
            assert_eq!(snapshot.players[0].player_id, 1);
        }
        other => panic!("expected state, got {:?}", other),
    }
    runner.stop();
}

#[tokio::test]
async fn test_malformed_frame_gets_error_reply() {
    let (runner, _agents, mut agent) = setup().await;

    agent.send(Message::text("not json")).await.unwrap();

    assert!(matches!(
        next_server_message(&mut agent).await,
        ServerMessage::Error { .. }
    ));
    assert_eq!(runner.player_count(), 0);
}

#[tokio::test]
async fn test_second_join_from_a_session_is_rejected() {
    let (runner, agents, mut first) = setup().await;
    first
        .send(Message::text(r#"{"type":"join","player_id":3,"team_id":1}"#))
        .await
        .unwrap();
    assert!(matches!(
        next_server_message(&mut first).await,
        ServerMessage::Joined { .. }
    ));

    first
        .send(Message::text(r#"{"type":"join","player_id":4,"team_id":1}"#))
        .await
        .unwrap();
    first
        .send(Message::text(r#"{"type":"move","dx":0,"dy":1}"#))
        .await
        .unwrap();
    // Let the server drain both frames.
    tokio::time::sleep(Duration::from_millis(100)).await;

    assert_eq!(runner.player_count(), 1);
    assert_eq!(agents.joined_count(), 1);
}
