mod bots;
mod controller;
mod deck;
mod hand;
mod phase;
mod registry;
mod rules;
mod state;

use std::sync::Arc;

use axum::Router;
use axum::extract::ws::{Message, WebSocket};
use axum::extract::{State, WebSocketUpgrade};
use axum::response::IntoResponse;
use axum::routing::get;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use protocol::{Command, Event, JoinErrorKind, ScopedEvent};
use tokio::sync::Mutex;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use registry::{AppState, JoinOutcome, RoomHandle, RoomMessage, join_game};

#[tokio::main]
/// Sets up tracing, spawns the dead-room watchdog, then serves the
/// websocket endpoint and a read-only room listing on `PORT` (default 3001).
async fn main() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("{}=info", env!("CARGO_CRATE_NAME")).into()),
        )
        .with(tracing_subscriber::fmt::layer().with_target(true))
        .init();

    let app_state = Arc::new(AppState::default());
    let watchdog_state = app_state.clone();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(tokio::time::Duration::from_secs(300));
        loop {
            interval.tick().await;
            cleanup_dead_rooms(&watchdog_state).await;
        }
    });

    let app = Router::new()
        .route("/rooms", get(rooms_handler))
        .route("/ws", get(websocket_handler))
        .with_state(app_state);

    let port = std::env::var("PORT").unwrap_or_else(|_| "3001".into());
    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{port}")).await.unwrap();
    tracing::info!(port, "Red King server listening");
    axum::serve(listener, app).await.unwrap();
}

/// Drops rooms whose actor task has exited (every connection gone and the
/// actor loop already broke) — a fallback; the actor deregisters itself on
/// the normal path.
async fn cleanup_dead_rooms(state: &Arc<AppState>) {
    let mut rooms = state.rooms.lock().await;
    rooms.retain(|code, handle| {
        let alive = !handle.to_room.is_closed();
        if !alive {
            tracing::info!(code, "Removing dead room");
        }
        alive
    });
}

async fn rooms_handler(State(state): State<Arc<AppState>>) -> String {
    registry::list_rooms(&state)
        .await
        .into_iter()
        .map(|(code, alive)| format!("{code}: alive={alive}"))
        .collect::<Vec<_>>()
        .join("\n")
}

async fn websocket_handler(ws: WebSocketUpgrade, State(state): State<Arc<AppState>>) -> impl IntoResponse {
    ws.on_upgrade(|socket| websocket(socket, state))
}

/// Handshake, then bidirectional relay for the life of the connection. The
/// first client message must be `host-game` or `join-game`; anything else
/// closes the socket.
async fn websocket(stream: WebSocket, state: Arc<AppState>) {
    let (mut sender, mut receiver) = stream.split();

    let Some((handle, player_id)) = handshake(&mut sender, &mut receiver, &state).await else {
        return;
    };

    let events_rx = handle.events.subscribe();
    let sender = Arc::new(Mutex::new(sender));

    let mut send_task = {
        let sender = sender.clone();
        let player_id = player_id.clone();
        tokio::spawn(async move { send_loop(sender, events_rx, player_id).await })
    };
    let mut receive_task = {
        let to_room = handle.to_room.clone();
        let player_id = player_id.clone();
        tokio::spawn(async move { receive_loop(receiver, to_room, player_id).await })
    };

    tokio::select! {
        _ = &mut send_task => receive_task.abort(),
        _ = &mut receive_task => send_task.abort(),
    }

    let _ = handle.to_room.send(RoomMessage::Leave { player_id }).await;
}

/// Reads the first text message as a `host-game`/`join-game` command and
/// resolves it against the registry. Any other command, or a parse failure,
/// ends the connection.
async fn handshake(
    sender: &mut SplitSink<WebSocket, Message>,
    receiver: &mut SplitStream<WebSocket>,
    state: &Arc<AppState>,
) -> Option<(RoomHandle, String)> {
    let raw = loop {
        match receiver.next().await {
            Some(Ok(Message::Text(text))) => break text,
            Some(Ok(_)) => continue,
            _ => return None,
        }
    };

    let command: Command = match serde_json::from_str(&raw) {
        Ok(c) => c,
        Err(err) => {
            tracing::warn!(?err, "Malformed handshake message");
            return None;
        }
    };

    match command {
        Command::HostGame { name } => {
            let (code, player_id, handle) = registry::host_game(state, name).await;
            let event = Event::RoomCreated { code: code.clone(), players: vec![], self_id: player_id.clone() };
            send_json(sender, &event).await;
            Some((handle, player_id))
        }
        Command::JoinGame { code, name } => match join_game(state, &code, name).await {
            Some((handle, JoinOutcome::Joined { player_id })) => Some((handle, player_id)),
            Some((_, JoinOutcome::Rejected(kind))) => {
                send_json(sender, &join_error(kind)).await;
                None
            }
            None => {
                send_json(sender, &join_error(JoinErrorKind::RoomNotFound)).await;
                None
            }
        },
        _ => None,
    }
}

fn join_error(kind: JoinErrorKind) -> Event {
    let message = match kind {
        JoinErrorKind::RoomNotFound => "That room code doesn't exist.",
        JoinErrorKind::GameInProgress => "That game has already started.",
        JoinErrorKind::RoomFull => "That room is full.",
        JoinErrorKind::NameTaken => "That name is already taken in this room.",
        JoinErrorKind::AlreadyInRoom => "You're already in this room.",
    };
    Event::JoinError { kind, message: message.into() }
}

async fn send_json(sender: &mut SplitSink<WebSocket, Message>, event: &Event) {
    if let Ok(text) = serde_json::to_string(event) {
        let _ = sender.send(Message::Text(text.into())).await;
    }
}

/// Forwards room events that reach `player_id` to this connection's socket.
async fn send_loop(sender: Arc<Mutex<SplitSink<WebSocket, Message>>>, mut events: tokio::sync::broadcast::Receiver<ScopedEvent>, player_id: String) {
    let mut enclosed = sender.lock().await;
    loop {
        match events.recv().await {
            Ok(scoped) => {
                if !scoped.reaches(&player_id) {
                    continue;
                }
                let Ok(text) = serde_json::to_string(&scoped.event) else { continue };
                if enclosed.send(Message::Text(text.into())).await.is_err() {
                    return;
                }
            }
            Err(tokio::sync::broadcast::error::RecvError::Closed) => return,
            Err(tokio::sync::broadcast::error::RecvError::Lagged(skipped)) => {
                tracing::warn!(skipped, %player_id, "Client lagged behind room broadcast");
            }
        }
    }
}

/// Forwards inbound client commands to the room actor, tagged with this
/// connection's player id.
async fn receive_loop(mut receiver: SplitStream<WebSocket>, to_room: tokio::sync::mpsc::Sender<RoomMessage>, player_id: String) {
    while let Some(message) = receiver.next().await {
        match message {
            Ok(Message::Text(text)) => match serde_json::from_str::<Command>(&text) {
                Ok(command) => {
                    if to_room.send(RoomMessage::Command { player_id: player_id.clone(), command }).await.is_err() {
                        return;
                    }
                }
                Err(err) => tracing::warn!(?err, %player_id, "Dropped malformed command"),
            },
            Ok(Message::Close(_)) => return,
            Ok(_) => {}
            Err(_) => return,
        }
    }
}
