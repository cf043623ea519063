//! Session controller (C6): dispatches inbound commands against a single
//! room, checking phase/turn eligibility before delegating into the rule
//! engine (C4), hand model (C3) and phase machine (C5), then returns the
//! `(scope, event)` pairs for the caller to fan out (C8, spec §9).
//!
//! `host-game`/`join-game` are not handled here: they create or locate a
//! room in the registry (C2) before a `Room` exists to dispatch against.
//! Everything else assumes the caller already belongs to `room`.

use std::collections::HashMap;

use protocol::{Command, Event, Phase, ScopedEvent};

use protocol::Difficulty;

use crate::deck::Deck;
use crate::hand::Hand;
use crate::rules;
use crate::state::{GameState, Player, Room, RoomLifecycle};

/// Dispatches one command from `player_id` against `room`. Commands that
/// fail eligibility (wrong phase, wrong turn, unknown player) are silently
/// dropped per spec §4.6/§7 — this returns an empty `Vec`.
pub fn handle_command(room: &mut Room, player_id: &str, command: Command) -> Vec<ScopedEvent> {
    if !room.has_player(player_id) {
        return Vec::new();
    }

    match command {
        // The connection already joined this room during the handshake;
        // a later host-game/join-game from it names a room it's already in.
        Command::HostGame { .. } | Command::JoinGame { .. } => vec![ScopedEvent::private(
            player_id,
            Event::JoinError {
                kind: protocol::JoinErrorKind::AlreadyInRoom,
                message: "You're already in this room.".into(),
            },
        )],
        Command::StartGame => start_game(room, player_id),
        Command::EndGame => end_game(room, player_id),
        Command::LeaveRoom => {
            // Handled by the registry, which owns connection teardown; a
            // LeaveRoom that reaches here (e.g. from a bot) is a no-op.
            Vec::new()
        }
        Command::PeekDone => peek_done(room, player_id),
        Command::DrawCard => rules::draw_card(room, player_id),
        Command::KeepCard { slot } => rules::keep_drawn(room, player_id, slot),
        Command::DiscardCard => rules::discard_drawn(room, player_id),
        Command::SkipRule => rules::skip_rule(room, player_id),
        Command::UsePeekOwn { slot } => rules::use_peek_own(room, player_id, slot),
        Command::UsePeekOther { target_id, slot } => rules::use_peek_other(room, player_id, &target_id, slot),
        Command::FinishPeek => rules::finish_peek(room, player_id),
        Command::UseBlindSwitch { a_slot, target_id, b_slot } => {
            rules::use_blind_switch(room, player_id, player_id, a_slot, &target_id, b_slot)
        }
        Command::UseBlackKingPeek { target1_id, slot1, target2_id, slot2 } => {
            rules::use_black_king_peek(room, player_id, &target1_id, slot1, &target2_id, slot2)
        }
        Command::UseBlackKingSwitch { a_slot, target_id, b_slot } => {
            rules::use_black_king_switch(room, player_id, player_id, a_slot, &target_id, b_slot)
        }
        Command::UseBlackKingSkip => rules::use_black_king_skip(room, player_id),
        Command::CallMatchOwn { slot } => rules::call_match_own(room, player_id, slot),
        Command::CallMatchOther { target_id, slot } => rules::call_match_other(room, player_id, &target_id, slot),
        Command::GiveCardAfterMatch { own_slot, target_id, target_slot } => {
            rules::give_after_match(room, player_id, own_slot, &target_id, target_slot)
        }
        Command::CallRedKing => rules::call_red_king(room, player_id),
        Command::AddCpuPlayer { difficulty } => add_cpu_player(room, player_id, difficulty),
    }
}

/// `start-game`: host only, from the lobby. Deals 4 cards to every player,
/// builds the rotated turn order, and enters `peek`.
fn start_game(room: &mut Room, player_id: &str) -> Vec<ScopedEvent> {
    if room.lifecycle != RoomLifecycle::Waiting || room.host_id != player_id || room.players.is_empty() {
        return Vec::new();
    }

    let mut rng = rand::rng();
    let mut deck = Deck::shuffled(&mut rng);
    let mut hands = HashMap::new();
    for p in &room.players {
        let mut cards = [None; 4];
        for slot in &mut cards {
            *slot = deck.draw().ok();
        }
        if cards.iter().any(Option::is_none) {
            // Not enough cards to deal a full hand — refuse to start.
            return Vec::new();
        }
        hands.insert(p.id.clone(), Hand::new(cards.map(Option::unwrap)));
    }

    let turn_order = room.rotated_turn_order();
    room.lifecycle = RoomLifecycle::Playing;
    room.game = Some(GameState {
        deck,
        hands,
        discard_pile: Vec::new(),
        phase: Phase::Peek,
        peek_done: Default::default(),
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

    let game = room.game.as_ref().unwrap();
    let mut events = vec![ScopedEvent::room(Event::GameStarted { phase: Phase::Peek })];
    for p in &room.players {
        let hand = &game.hands[&p.id];
        let opponents = room
            .players
            .iter()
            .filter(|other| other.id != p.id)
            .map(|other| protocol::OpponentSummary {
                player_id: other.id.clone(),
                card_count: game.hands[&other.id].len(),
            })
            .collect();
        events.push(ScopedEvent::private(
            &p.id,
            Event::CardsDealt {
                hand: hand.layout(),
                own_cards: hand.slots().to_vec(),
                phase: Phase::Peek,
                deck_count: game.deck.len(),
                opponents,
            },
        ));
    }
    events
}

/// `peek-done`: each player may send it once. Completion (everyone done)
/// moves the room into `play` with the first turn starting after the host.
fn peek_done(room: &mut Room, player_id: &str) -> Vec<ScopedEvent> {
    let Some(game) = &mut room.game else { return Vec::new() };
    if game.phase != Phase::Peek || game.peek_done.contains(player_id) {
        return Vec::new();
    }
    game.peek_done.insert(player_id.to_owned());

    let mut events = vec![ScopedEvent::room(Event::PlayerPeekDone { player_id: player_id.to_owned() })];
    if game.peek_done.len() >= room.players.len() {
        events.extend(enter_play(room));
    }
    events
}

fn enter_play(room: &mut Room) -> Vec<ScopedEvent> {
    let Some(game) = &mut room.game else { return Vec::new() };
    game.phase = Phase::Play;
    game.turn_index = 0;
    let current = game.current_turn_player().map(str::to_owned);
    vec![
        ScopedEvent::room(Event::PhaseChanged { phase: Phase::Play, current_turn: current.clone(), top_discard: None }),
        ScopedEvent::room(Event::TurnUpdate {
            current_turn: current.unwrap_or_default(),
            deck_count: game.deck.len(),
            top_discard: None,
        }),
    ]
}

/// Re-checks peek completion after a mid-peek departure — the leaving
/// player's consent is no longer required (spec §4.5).
pub fn recheck_peek_completion(room: &mut Room) -> Vec<ScopedEvent> {
    let Some(game) = &room.game else { return Vec::new() };
    if game.phase == Phase::Peek && game.peek_done.len() >= room.players.len() && !room.players.is_empty() {
        enter_play(room)
    } else {
        Vec::new()
    }
}

/// `end-game`: host only, terminal `reveal` phase returns the room to the
/// lobby, clearing `gameState`.
fn end_game(room: &mut Room, player_id: &str) -> Vec<ScopedEvent> {
    let Some(game) = &room.game else { return Vec::new() };
    if game.phase != Phase::Reveal || room.host_id != player_id {
        return Vec::new();
    }
    room.game = None;
    room.lifecycle = RoomLifecycle::Waiting;
    vec![ScopedEvent::room(Event::GameEnded { players: room.player_infos() })]
}

/// `add-cpu-player`: host only, from the lobby, subject to the room's
/// 8-player cap.
fn add_cpu_player(room: &mut Room, player_id: &str, difficulty: Difficulty) -> Vec<ScopedEvent> {
    if room.lifecycle != RoomLifecycle::Waiting || room.host_id != player_id || room.players.len() >= 8 {
        return Vec::new();
    }
    let bot_id = format!("bot-{}", room.players.iter().filter(|p| p.is_cpu).count() + 1);
    room.players.push(Player {
        id: bot_id,
        name: format!("CPU {:?}", difficulty),
        is_host: false,
        is_cpu: true,
        difficulty: Some(difficulty),
    });
    vec![ScopedEvent::room(Event::PlayerListUpdated { players: room.player_infos() })]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn player(id: &str, is_host: bool) -> Player {
        Player { id: id.into(), name: id.into(), is_host, is_cpu: false, difficulty: None }
    }

    #[test]
    fn deal_conservation_for_two_players() {
        let mut room = Room::new("ABCD".into(), player("p0", true));
        room.players.push(player("p1", false));

        let events = handle_command(&mut room, "p0", Command::StartGame);
        assert!(!events.is_empty());

        let game = room.game.as_ref().unwrap();
        assert_eq!(game.hands["p0"].len(), 4);
        assert_eq!(game.hands["p1"].len(), 4);
        assert_eq!(game.deck.len(), 46);
        assert!(game.discard_pile.is_empty());

        let mut ids: Vec<u8> = game.deck.cards().iter().map(|c| c.id).collect();
        for hand in game.hands.values() {
            ids.extend(hand.slots().iter().flatten().map(|c| c.id));
        }
        ids.sort_unstable();
        ids.dedup();
        assert_eq!(ids.len(), 54);
    }

    #[test]
    fn turn_rotation_completes_a_full_cycle() {
        let mut room = Room::new("ABCD".into(), player("p0", true));
        for id in ["p1", "p2", "p3"] {
            room.players.push(player(id, false));
        }
        handle_command(&mut room, "p0", Command::StartGame);
        for id in ["p0", "p1", "p2", "p3"] {
            handle_command(&mut room, id, Command::PeekDone);
        }
        assert_eq!(room.game.as_ref().unwrap().current_turn_player(), Some("p1"));

        for _ in 0..4 {
            let current = room.game.as_ref().unwrap().current_turn_player().unwrap().to_owned();
            handle_command(&mut room, &current, Command::DrawCard);
            let current = room.game.as_ref().unwrap().current_turn_player().unwrap().to_owned();
            let card = room.game.as_ref().unwrap().drawn_card;
            if card.and_then(|c| crate::deck::rule_type(&c)).is_none() {
                handle_command(&mut room, &current, Command::DiscardCard);
            } else {
                handle_command(&mut room, &current, Command::DiscardCard);
                handle_command(&mut room, &current, Command::SkipRule);
            }
        }
        assert_eq!(room.game.as_ref().unwrap().current_turn_player(), Some("p1"));
    }

    #[test]
    fn join_game_from_an_existing_member_is_rejected_as_already_in_room() {
        let mut room = Room::new("ABCD".into(), player("p0", true));
        room.players.push(player("p1", false));

        let events = handle_command(&mut room, "p1", Command::JoinGame { code: "ABCD".into(), name: "p1".into() });

        assert_eq!(events.len(), 1);
        match &events[0].event {
            Event::JoinError { kind, .. } => assert_eq!(*kind, protocol::JoinErrorKind::AlreadyInRoom),
            other => panic!("expected JoinError, got {other:?}"),
        }
    }
}
