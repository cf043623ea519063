//! Phase and turn transitions shared by the rule engine and the controller
//! (C5): turn advance, redemption bookkeeping, and reveal scoring.

use protocol::{Event, Phase, PlayerResult, ScopedEvent};

use crate::state::{GameState, Room};

/// Clears the in-flight drawn card and moves to the next turn, or rolls the
/// phase forward when a round of turns completes. Always emits a
/// `TurnUpdate`/`PhaseChanged` to the room.
pub fn advance_turn(room: &mut Room) -> Vec<ScopedEvent> {
    let Some(game) = &mut room.game else { return Vec::new() };
    game.drawn_card = None;
    game.drawn_by = None;
    game.pending_rule = None;

    match game.phase {
        Phase::Play => {
            if game.turn_order.is_empty() {
                return Vec::new();
            }
            game.turn_index = (game.turn_index + 1) % game.turn_order.len();
            turn_update_event(game)
        }
        Phase::Redemption => {
            game.redemption_index += 1;
            if game.redemption_index >= game.redemption_order.len() {
                enter_reveal(room)
            } else {
                turn_update_event(room.game.as_ref().unwrap())
            }
        }
        _ => Vec::new(),
    }
}

fn turn_update_event(game: &GameState) -> Vec<ScopedEvent> {
    let Some(current) = game.current_turn_player() else { return Vec::new() };
    vec![ScopedEvent::room(Event::TurnUpdate {
        current_turn: current.to_owned(),
        deck_count: game.deck.len(),
        top_discard: game.top_discard(),
    })]
}

/// `call-red-king`: only legal on the current turn player's turn in `play`
/// with no card currently drawn. Builds the redemption order starting right
/// after the caller.
pub fn call_red_king(room: &mut Room, player_id: &str) -> Vec<ScopedEvent> {
    let Some(game) = &mut room.game else { return Vec::new() };
    if game.phase != Phase::Play || game.drawn_card.is_some() {
        return Vec::new();
    }
    if game.current_turn_player() != Some(player_id) {
        return Vec::new();
    }

    let caller_index = match game.turn_order.iter().position(|p| p == player_id) {
        Some(i) => i,
        None => return Vec::new(),
    };

    let mut redemption_order = game.turn_order[caller_index + 1..].to_vec();
    redemption_order.extend_from_slice(&game.turn_order[..caller_index]);

    game.red_king_caller = Some(player_id.to_owned());
    game.redemption_order = redemption_order;
    game.redemption_index = 0;
    game.phase = Phase::Redemption;
    game.drawn_card = None;
    game.drawn_by = None;

    let mut events = vec![ScopedEvent::room(Event::PhaseChanged {
        phase: Phase::Redemption,
        current_turn: game.current_turn_player().map(str::to_owned),
        top_discard: game.top_discard(),
    })];
    events.extend(turn_update_event(game));
    events
}

/// Moves into `reveal`, scoring every hand and emitting `GameResults`. The
/// Red King caller loses all ties; among tied non-callers the first in
/// `turn_order` wins (spec leaves this tiebreak unspecified beyond that).
fn enter_reveal(room: &mut Room) -> Vec<ScopedEvent> {
    let Some(game) = &mut room.game else { return Vec::new() };
    game.phase = Phase::Reveal;

    let caller = game.red_king_caller.clone();
    let mut results: Vec<PlayerResult> = room
        .players
        .iter()
        .map(|p| {
            let hand = game.hands.get(&p.id);
            PlayerResult {
                player_id: p.id.clone(),
                hand: hand.map(|h| h.slots().to_vec()).unwrap_or_default(),
                score: hand.map(|h| h.score()).unwrap_or(0),
            }
        })
        .collect();

    let winner_id = pick_winner(&results, caller.as_deref(), &game.turn_order);
    results.sort_by_key(|r| r.score);

    vec![ScopedEvent::room(Event::GameResults { results, winner_id, caller_id: caller })]
}

fn pick_winner(results: &[PlayerResult], caller: Option<&str>, turn_order: &[String]) -> String {
    let min_score = results.iter().map(|r| r.score).min().unwrap_or(0);
    let mut lowest: Vec<&PlayerResult> = results.iter().filter(|r| r.score == min_score).collect();

    if lowest.len() > 1
        && let Some(caller_id) = caller
        && let Some(pos) = lowest.iter().position(|r| r.player_id == caller_id)
    {
        // The caller loses ties: drop them and keep the rest.
        lowest.remove(pos);
    }

    if lowest.len() > 1 {
        // Deterministic tiebreak among remaining non-caller ties: first in
        // turn order wins (spec §4.5/§9: arbitrary but deterministic).
        lowest.sort_by_key(|r| {
            turn_order
                .iter()
                .position(|p| *p == r.player_id)
                .unwrap_or(usize::MAX)
        });
    }

    lowest
        .first()
        .map(|r| r.player_id.clone())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hand::Hand;
    use crate::state::{GameState, Player, RoomLifecycle};
    use protocol::{Card, Rank, Suit};
    use std::collections::{HashMap, HashSet};

    fn player(id: &str, is_host: bool) -> Player {
        Player { id: id.into(), name: id.into(), is_host, is_cpu: false, difficulty: None }
    }

    fn card(rank: Rank, id: u8) -> Card {
        Card { suit: Suit::Clubs, rank, id }
    }

    fn room_with_players(ids: &[&str]) -> Room {
        let mut room = Room::new("ABCD".into(), player(ids[0], true));
        for id in &ids[1..] {
            room.players.push(player(id, false));
        }
        room
    }

    fn start_game(room: &mut Room) {
        let turn_order = room.rotated_turn_order();
        room.lifecycle = RoomLifecycle::Playing;
        room.game = Some(GameState {
            deck: crate::deck::Deck::fresh(),
            hands: HashMap::new(),
            discard_pile: Vec::new(),
            phase: Phase::Play,
            peek_done: HashSet::new(),
            turn_order,
            turn_index: 0,
            drawn_card: None,
            drawn_by: None,
            pending_rule: None,
            black_king_peeked: None,
            red_king_caller: None,
            redemption_order: Vec::new(),
            redemption_index: 0,
            pending_give: None,
            pending_bot_turn: None,
            bot_memory: HashMap::new(),
        });
    }

    #[test]
    fn redemption_skips_caller_then_reveals() {
        let mut room = room_with_players(&["p0", "p1", "p2"]);
        start_game(&mut room);
        for id in ["p0", "p1", "p2"] {
            room.game.as_mut().unwrap().hands.insert(
                id.into(),
                Hand::new([card(Rank::Five, 0), card(Rank::Five, 1), card(Rank::Five, 2), card(Rank::Five, 3)]),
            );
        }
        room.game.as_mut().unwrap().turn_index =
            room.game.as_ref().unwrap().turn_order.iter().position(|p| p == "p0").unwrap();

        let events = call_red_king(&mut room, "p0");
        assert!(!events.is_empty());
        assert_eq!(room.game.as_ref().unwrap().redemption_order, vec!["p1", "p2"]);

        advance_turn(&mut room);
        assert_eq!(room.game.as_ref().unwrap().phase, Phase::Redemption);
        advance_turn(&mut room);
        assert_eq!(room.game.as_ref().unwrap().phase, Phase::Reveal);
    }

    #[test]
    fn caller_loses_ties() {
        let mut room = room_with_players(&["p0", "p1"]);
        start_game(&mut room);
        room.game.as_mut().unwrap().red_king_caller = Some("p0".into());
        let results = vec![
            PlayerResult { player_id: "p0".into(), hand: vec![], score: 10 },
            PlayerResult { player_id: "p1".into(), hand: vec![], score: 10 },
        ];
        let winner = pick_winner(&results, Some("p0"), &room.game.as_ref().unwrap().turn_order);
        assert_eq!(winner, "p1");
    }
}
