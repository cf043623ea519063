//! The room and session data model (C5 + the non-behavioral half of §3).
//!
//! [`Room`] owns everything about one game session: its player list (whose
//! insertion order is turn order), and, once a game has started, the
//! [`GameState`]. The mutating operations that belong to the rule engine
//! (C4) live in `rules.rs` as methods on `Room`/`GameState`; this module is
//! the data and the phase/turn bookkeeping around it (C5).

use std::collections::HashSet;

use protocol::{Card, Difficulty, Phase, PlayerInfo, RuleType};

use crate::deck::Deck;
use crate::hand::Hand;

/// A connected participant. `id` is the connection identity for humans and
/// `bot-<n>` for CPUs.
#[derive(Clone, Debug)]
pub struct Player {
    pub id: String,
    pub name: String,
    pub is_host: bool,
    pub is_cpu: bool,
    pub difficulty: Option<Difficulty>,
}

impl Player {
    pub fn info(&self) -> PlayerInfo {
        PlayerInfo {
            id: self.id.clone(),
            name: self.name.clone(),
            is_host: self.is_host,
            is_cpu: self.is_cpu,
        }
    }
}

/// The phase the room itself is in, independent of the finer-grained
/// in-game `Phase` of `GameState`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RoomLifecycle {
    Waiting,
    Playing,
}

/// The slot a successful `call-match-other` confirmed, awaiting the
/// caller's follow-up `give-after-match`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PendingGive {
    pub caller_id: String,
    pub target_id: String,
    pub target_slot: usize,
}

/// The mid-game state, created on `start-game` and torn down on `game-end`.
pub struct GameState {
    pub deck: Deck,
    pub hands: std::collections::HashMap<String, Hand>,
    pub discard_pile: Vec<Card>,
    pub phase: Phase,
    pub peek_done: HashSet<String>,
    pub turn_order: Vec<String>,
    pub turn_index: usize,
    pub drawn_card: Option<Card>,
    pub drawn_by: Option<String>,
    /// The rule armed by the current turn player's last discard, awaiting
    /// `use-*`/`finish-peek`/`skip-rule` before the turn can advance.
    pub pending_rule: Option<RuleType>,
    /// While a black-king rule is pending and the caller has peeked, the
    /// two slots they may now choose to switch.
    pub black_king_peeked: Option<((String, usize), (String, usize))>,
    pub red_king_caller: Option<String>,
    pub redemption_order: Vec<String>,
    pub redemption_index: usize,
    /// The target slot confirmed by the most recent successful
    /// `call-match-other`; `give-after-match` must name this exact slot and
    /// is a no-op against anything else, including a match the caller never
    /// actually called.
    pub pending_give: Option<PendingGive>,
    /// Re-entrancy guard: `Some(bot_id)` while a scheduled bot turn is
    /// already armed, so duplicate triggers don't double-queue it.
    pub pending_bot_turn: Option<String>,
    /// Per-bot recollection of card identities, keyed by bot player id.
    pub bot_memory: std::collections::HashMap<String, crate::bots::BotMemory>,
}

impl GameState {
    pub fn top_discard(&self) -> Option<Card> {
        self.discard_pile.last().copied()
    }

    pub fn current_turn_player(&self) -> Option<&str> {
        match self.phase {
            Phase::Play => self.turn_order.get(self.turn_index).map(String::as_str),
            Phase::Redemption => self
                .redemption_order
                .get(self.redemption_index)
                .map(String::as_str),
            _ => None,
        }
    }

    /// Whether `player_id` is the protected Red King caller during
    /// redemption — their hand is immutable from any external input,
    /// including their own (invariant 4).
    pub fn is_protected(&self, player_id: &str) -> bool {
        self.phase == Phase::Redemption && self.red_king_caller.as_deref() == Some(player_id)
    }
}

/// One game session: its players (insertion order = turn order) and,
/// while playing, the game state.
pub struct Room {
    pub code: String,
    pub host_id: String,
    pub players: Vec<Player>,
    pub lifecycle: RoomLifecycle,
    pub game: Option<GameState>,
}

impl Room {
    pub fn new(code: String, host: Player) -> Self {
        Room {
            code,
            host_id: host.id.clone(),
            players: vec![host],
            lifecycle: RoomLifecycle::Waiting,
            game: None,
        }
    }

    pub fn player(&self, id: &str) -> Option<&Player> {
        self.players.iter().find(|p| p.id == id)
    }

    pub fn has_player(&self, id: &str) -> bool {
        self.player(id).is_some()
    }

    pub fn has_name(&self, name: &str) -> bool {
        self.players.iter().any(|p| p.name == name)
    }

    pub fn player_infos(&self) -> Vec<PlayerInfo> {
        self.players.iter().map(Player::info).collect()
    }

    /// Turn order is the room's player list rotated by one, so the player
    /// after the host acts first.
    pub fn rotated_turn_order(&self) -> Vec<String> {
        if self.players.is_empty() {
            return Vec::new();
        }
        let mut order: Vec<String> = self.players.iter().map(|p| p.id.clone()).collect();
        order.rotate_left(1);
        order
    }

    /// Removes `player_id`, reassigning host if needed. Returns whether the
    /// room is now empty (the caller deletes it in that case, invariant 5).
    pub fn remove_player(&mut self, player_id: &str) -> bool {
        self.players.retain(|p| p.id != player_id);

        if !self.players.iter().any(|p| p.is_host)
            && let Some(new_host) = self.players.first_mut()
        {
            new_host.is_host = true;
            self.host_id = new_host.id.clone();
        }

        if let Some(game) = &mut self.game {
            game.hands.remove(player_id);
            game.peek_done.remove(player_id);

            let turn_player = game.current_turn_player().map(str::to_owned);

            game.turn_order.retain(|p| p != player_id);
            if game.turn_index >= game.turn_order.len() {
                game.turn_index = 0;
            }
            game.redemption_order.retain(|p| p != player_id);
            if game.redemption_index >= game.redemption_order.len() {
                game.redemption_index = 0;
            }

            if game.drawn_by.as_deref() == Some(player_id) {
                game.drawn_card = None;
                game.drawn_by = None;
            }
            if game.red_king_caller.as_deref() == Some(player_id) {
                game.red_king_caller = None;
            }
            let _ = turn_player;
        }

        self.players.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn player(id: &str, is_host: bool) -> Player {
        Player { id: id.into(), name: id.into(), is_host, is_cpu: false, difficulty: None }
    }

    #[test]
    fn turn_order_rotates_past_host() {
        let mut room = Room::new("ABCD".into(), player("p0", true));
        room.players.push(player("p1", false));
        room.players.push(player("p2", false));
        room.players.push(player("p3", false));

        let order = room.rotated_turn_order();
        assert_eq!(order, vec!["p1", "p2", "p3", "p0"]);
    }

    #[test]
    fn leaving_host_reassigns_and_last_leave_empties_room() {
        let mut room = Room::new("ABCD".into(), player("p0", true));
        room.players.push(player("p1", false));

        assert!(!room.remove_player("p0"));
        assert!(room.player("p1").unwrap().is_host);
        assert_eq!(room.host_id, "p1");

        assert!(room.remove_player("p1"));
    }
}
