//! Room registry (C2): code generation, room lookup, and the actor loop that
//! owns one [`Room`] and serializes every command against it.
//!
//! The registry itself only ever touches [`AppState::rooms`] — once a room
//! exists, all game logic happens inside its actor task, reached only
//! through the `mpsc` channel in its [`RoomHandle`]. This mirrors the
//! relay server's `AppState`/`Room` split, generalized from a byte relay to
//! an authoritative game loop.

use std::collections::HashMap;
use std::sync::Arc;

use protocol::{Command, Event, JoinErrorKind, ScopedEvent};
use rand::Rng;
use tokio::sync::{Mutex, broadcast, mpsc, oneshot};

use crate::bots::{self, Strategy};
use crate::controller;
use crate::state::{Player, Room};

const CODE_ALPHABET: &[u8] = b"ABCDEFGHJKLMNPQRSTUVWXYZ23456789";
const CODE_LEN: usize = 4;
pub const BROADCAST_CAPACITY: usize = 256;

/// Global server state: every live room, keyed by its join code.
#[derive(Default)]
pub struct AppState {
    pub rooms: Mutex<HashMap<String, RoomHandle>>,
}

/// What the registry and per-connection tasks hold onto for a live room:
/// the channel into its actor and a broadcast tap for fan-out.
#[derive(Clone)]
pub struct RoomHandle {
    pub to_room: mpsc::Sender<RoomMessage>,
    pub events: broadcast::Sender<ScopedEvent>,
}

/// One inbound message to a room actor.
pub enum RoomMessage {
    Join { name: String, reply: oneshot::Sender<JoinOutcome> },
    Command { player_id: String, command: Command },
    Leave { player_id: String },
    BotTurn { bot_id: String },
}

/// The result of a join attempt, handed back to the connection task.
pub enum JoinOutcome {
    Joined { player_id: String },
    Rejected(JoinErrorKind),
}

/// `host-game`: creates a fresh room with `name` as its host and spawns its
/// actor task. The code is resampled on collision against the live table.
pub async fn host_game(state: &Arc<AppState>, name: String) -> (String, String, RoomHandle) {
    let mut rooms = state.rooms.lock().await;
    let code = loop {
        let candidate = random_code();
        if !rooms.contains_key(&candidate) {
            break candidate;
        }
    };

    let host_id = "p1".to_string();
    let host = Player { id: host_id.clone(), name: normalize_name(&name), is_host: true, is_cpu: false, difficulty: None };
    let room = Room::new(code.clone(), host);

    let (to_room, rx) = mpsc::channel(64);
    let (events, _) = broadcast::channel(BROADCAST_CAPACITY);
    let handle = RoomHandle { to_room, events: events.clone() };
    rooms.insert(code.clone(), handle.clone());

    tokio::spawn(run_room_actor(room, rx, events, state.clone()));
    (code, host_id, handle)
}

/// `join-game`: looks the code up (case-insensitive, per spec §6) and
/// forwards a `Join` message to the room's actor, which applies the
/// name/capacity/lifecycle checks.
pub async fn join_game(state: &Arc<AppState>, code: &str, name: String) -> Option<(RoomHandle, JoinOutcome)> {
    let code = code.to_uppercase();
    let handle = state.rooms.lock().await.get(&code).cloned()?;
    let (reply, rx) = oneshot::channel();
    handle.to_room.send(RoomMessage::Join { name, reply }).await.ok()?;
    let outcome = rx.await.ok()?;
    Some((handle, outcome))
}

/// Trims whitespace and caps to 20 characters (spec §6); an empty result
/// falls back to "Player" rather than rejecting the join/host outright,
/// since neither `host-game` nor the `JoinErrorKind` taxonomy has a slot
/// for an invalid-name failure.
fn normalize_name(name: &str) -> String {
    let trimmed: String = name.trim().chars().take(20).collect();
    if trimmed.is_empty() { "Player".to_string() } else { trimmed }
}

fn random_code() -> String {
    let mut rng = rand::rng();
    (0..CODE_LEN)
        .map(|_| CODE_ALPHABET[rng.random_range(0..CODE_ALPHABET.len())] as char)
        .collect()
}

/// The actor loop: owns `room` exclusively and applies every message against
/// it in order, broadcasting whatever events each step produces. Exits (and
/// deregisters the room) once every connection has left.
async fn run_room_actor(
    mut room: Room,
    mut rx: mpsc::Receiver<RoomMessage>,
    events: broadcast::Sender<ScopedEvent>,
    state: Arc<AppState>,
) {
    let mut strategies: HashMap<String, Box<dyn Strategy>> = HashMap::new();

    while let Some(message) = rx.recv().await {
        let mut produced = Vec::new();
        match message {
            RoomMessage::Join { name, reply } => {
                let outcome = try_join(&mut room, name);
                match &outcome {
                    JoinOutcome::Joined { player_id } => {
                        produced.push(ScopedEvent::private(
                            player_id,
                            Event::RoomJoined { code: room.code.clone(), players: room.player_infos(), self_id: player_id.clone() },
                        ));
                        produced.push(ScopedEvent::room(Event::PlayerListUpdated { players: room.player_infos() }));
                    }
                    JoinOutcome::Rejected(_) => {}
                }
                let _ = reply.send(outcome);
            }
            RoomMessage::Leave { player_id } => {
                produced.extend(handle_leave(&mut room, &player_id));
                if room.players.is_empty() {
                    break;
                }
            }
            RoomMessage::Command { player_id, command } => {
                if let Command::AddCpuPlayer { difficulty } = command {
                    let bot_id_before: std::collections::HashSet<String> =
                        room.players.iter().filter(|p| p.is_cpu).map(|p| p.id.clone()).collect();
                    produced.extend(controller::handle_command(&mut room, &player_id, Command::AddCpuPlayer { difficulty }));
                    if let Some(new_bot) = room.players.iter().find(|p| p.is_cpu && !bot_id_before.contains(&p.id)) {
                        strategies.insert(new_bot.id.clone(), bots::strategy_for(new_bot.difficulty.unwrap_or(difficulty)));
                    }
                } else {
                    produced.extend(controller::handle_command(&mut room, &player_id, command));
                }
            }
            RoomMessage::BotTurn { bot_id } => {
                let still_armed = room.game.as_ref().is_some_and(|g| {
                    g.pending_bot_turn.as_deref() == Some(bot_id.as_str())
                        && g.current_turn_player() == Some(bot_id.as_str())
                });
                if still_armed {
                    room.game.as_mut().unwrap().pending_bot_turn = None;
                    if let Some(strategy) = strategies.get(&bot_id) {
                        produced.extend(bots::run_bot_turn(&mut room, &bot_id, strategy.as_ref()));
                    }
                }
            }
        }

        let needs_match_check = produced.iter().any(|e| {
            matches!(
                e.event,
                Event::CardDiscarded { .. } | Event::MatchResult { success: true, .. } | Event::HandLayoutsUpdated { .. }
            )
        });
        if needs_match_check {
            produced.extend(bots::opportunistic_match(&mut room, &strategies));
        }

        let needs_auto_peek = produced
            .iter()
            .any(|e| matches!(e.event, Event::PlayerPeekDone { .. } | Event::GameStarted { .. }));
        if needs_auto_peek {
            for bot in room.players.iter().filter(|p| p.is_cpu).map(|p| p.id.clone()).collect::<Vec<_>>() {
                produced.extend(auto_peek_if_pending(&mut room, &bot));
            }
        }

        for event in produced {
            let _ = events.send(event);
        }

        arm_bot_turn_if_needed(&mut room, &state);
    }

    state.rooms.lock().await.remove(&room.code);
}

fn auto_peek_if_pending(room: &mut Room, bot_id: &str) -> Vec<ScopedEvent> {
    let pending = room
        .game
        .as_ref()
        .is_some_and(|g| g.phase == protocol::Phase::Peek && !g.peek_done.contains(bot_id));
    if pending { bots::auto_peek(room, bot_id) } else { Vec::new() }
}

fn try_join(room: &mut Room, name: String) -> JoinOutcome {
    if room.lifecycle != crate::state::RoomLifecycle::Waiting {
        return JoinOutcome::Rejected(JoinErrorKind::GameInProgress);
    }
    if room.players.len() >= 8 {
        return JoinOutcome::Rejected(JoinErrorKind::RoomFull);
    }
    let name = normalize_name(&name);
    if room.has_name(&name) {
        return JoinOutcome::Rejected(JoinErrorKind::NameTaken);
    }
    let player_id = format!("p{}", room.players.len() + 1);
    room.players.push(Player { id: player_id.clone(), name, is_host: false, is_cpu: false, difficulty: None });
    JoinOutcome::Joined { player_id }
}

fn handle_leave(room: &mut Room, player_id: &str) -> Vec<ScopedEvent> {
    let was_host = room.host_id == player_id;
    let emptied = room.remove_player(player_id);
    if emptied {
        return Vec::new();
    }
    let mut events = vec![ScopedEvent::room(Event::PlayerListUpdated { players: room.player_infos() })];
    if was_host {
        events.push(ScopedEvent::room(Event::HostChanged { new_host_id: room.host_id.clone() }));
    }
    events.extend(controller::recheck_peek_completion(room));
    events
}

/// Arms a 1.5s timer for the room's current turn player if it is a bot and
/// no timer is already pending (spec §4.7/§9).
fn arm_bot_turn_if_needed(room: &mut Room, state: &Arc<AppState>) {
    let code = room.code.clone();
    let Some(game) = &mut room.game else { return };
    let Some(current) = game.current_turn_player().map(str::to_owned) else { return };
    if game.pending_bot_turn.is_some() {
        return;
    }
    if !room.players.iter().any(|p| p.id == current && p.is_cpu) {
        return;
    }
    game.pending_bot_turn = Some(current.clone());

    let state = state.clone();
    tokio::spawn(async move {
        tokio::time::sleep(std::time::Duration::from_millis(bots::BOT_THINK_MS)).await;
        if let Some(handle) = state.rooms.lock().await.get(&code).cloned() {
            let _ = handle.to_room.send(RoomMessage::BotTurn { bot_id: current }).await;
        }
    });
}

/// Lists every live room with its player count, for the read-only `/rooms`
/// endpoint (analogous to the relay server's `/enlist`).
pub async fn list_rooms(state: &Arc<AppState>) -> Vec<(String, bool)> {
    let rooms = state.rooms.lock().await;
    rooms.iter().map(|(code, handle)| (code.clone(), handle.to_room.capacity() > 0)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::Player;

    fn player(id: &str, name: &str, is_host: bool) -> Player {
        Player { id: id.into(), name: name.into(), is_host, is_cpu: false, difficulty: None }
    }

    #[test]
    fn normalize_name_trims_caps_and_defaults_empty() {
        assert_eq!(normalize_name("  Alice  "), "Alice");
        assert_eq!(normalize_name(&"x".repeat(30)), "x".repeat(20));
        assert_eq!(normalize_name("   "), "Player");
    }

    #[test]
    fn try_join_rejects_name_taken_once_whitespace_is_normalized() {
        let mut room = Room::new("ABCD".into(), player("p1", "Alice", true));
        let outcome = try_join(&mut room, "  Alice  ".into());
        assert!(matches!(outcome, JoinOutcome::Rejected(JoinErrorKind::NameTaken)));
    }

    #[test]
    fn try_join_normalizes_the_joiners_own_name() {
        let mut room = Room::new("ABCD".into(), player("p1", "Alice", true));
        let outcome = try_join(&mut room, "  Bob  ".into());
        assert!(matches!(outcome, JoinOutcome::Joined { .. }));
        assert_eq!(room.players.last().unwrap().name, "Bob");
    }
}
