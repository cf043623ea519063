//! Pure rule-engine operations (C4): the table in spec §4.4.
//!
//! Every operation here is a guarded, synchronous state mutation that
//! returns the events it produced. A guard failure — wrong phase, a gap
//! slot where a card is required, or a protected target — is a silent
//! no-op per spec §4.6/§7: an empty `Vec` and nothing else.

use protocol::{Card, Event, HighlightKind, Phase, RuleType, ScopedEvent, SlotHighlight};

use crate::deck::{point_value, rule_type};
use crate::phase::advance_turn;
use crate::state::Room;

fn playable(room: &Room) -> bool {
    matches!(room.game.as_ref().map(|g| g.phase), Some(Phase::Play | Phase::Redemption))
}

fn is_current_turn(room: &Room, player_id: &str) -> bool {
    room.game.as_ref().and_then(|g| g.current_turn_player()) == Some(player_id)
}

/// `keep drawn`: swap the drawn card into `slot`, push whatever was there to
/// discard (nothing, if it was a gap), then clear the drawn card and
/// advance the turn.
pub fn keep_drawn(room: &mut Room, player_id: &str, slot: usize) -> Vec<ScopedEvent> {
    if !playable(room) || !is_current_turn(room, player_id) {
        return Vec::new();
    }
    let Some(game) = &mut room.game else { return Vec::new() };
    if game.drawn_by.as_deref() != Some(player_id) {
        return Vec::new();
    }
    let drawn = game.drawn_card.take().expect("drawn_by implies drawn_card");
    let Some(hand) = game.hands.get_mut(player_id) else { return Vec::new() };
    let old = hand.get(slot);
    hand.remove_at(slot);
    hand.add_card(drawn);
    if let Some(old_card) = old {
        game.discard_pile.push(old_card);
    }
    game.drawn_by = None;

    let mut events = vec![ScopedEvent::private(player_id, Event::HandUpdated { hand: hand.slots().to_vec() })];
    if let Some(old_card) = old {
        events.push(ScopedEvent::room(Event::CardDiscarded {
            player_id: player_id.to_owned(),
            card: old_card,
            action: "kept drawn card".into(),
        }));
    }
    events.extend(advance_turn(room));
    events
}

/// `discard drawn`: push the drawn card to discard. If it carries a rule,
/// arm it (no turn advance, `ExecuteRule` to the discarder); otherwise
/// advance the turn immediately.
pub fn discard_drawn(room: &mut Room, player_id: &str) -> Vec<ScopedEvent> {
    if !playable(room) || !is_current_turn(room, player_id) {
        return Vec::new();
    }
    let Some(game) = &mut room.game else { return Vec::new() };
    if game.drawn_by.as_deref() != Some(player_id) {
        return Vec::new();
    }
    let card = game.drawn_card.take().expect("drawn_by implies drawn_card");
    game.drawn_by = None;
    game.discard_pile.push(card);

    let mut events = vec![ScopedEvent::room(Event::CardDiscarded {
        player_id: player_id.to_owned(),
        card,
        action: "discarded drawn card".into(),
    })];

    match rule_type(&card) {
        Some(rule) => {
            game.pending_rule = Some(rule);
            events.push(ScopedEvent::private(player_id, Event::ExecuteRule { rule_type: rule, card }));
        }
        None => events.extend(advance_turn(room)),
    }
    events
}

/// `skip-rule`: abandon whichever rule is currently armed, advancing the
/// turn without using it.
pub fn skip_rule(room: &mut Room, player_id: &str) -> Vec<ScopedEvent> {
    let Some(game) = &room.game else { return Vec::new() };
    if game.pending_rule.is_none() || !is_current_turn(room, player_id) {
        return Vec::new();
    }
    advance_turn(room)
}

fn pending_rule_is(room: &Room, expected: RuleType) -> bool {
    room.game.as_ref().and_then(|g| g.pending_rule) == Some(expected)
}

/// `peek-own`: the 7/8 rule. Private reveal of the caller's own slot.
/// Never advances the turn; `finish-peek` does.
pub fn use_peek_own(room: &mut Room, player_id: &str, slot: usize) -> Vec<ScopedEvent> {
    if !is_current_turn(room, player_id) || !pending_rule_is(room, RuleType::PeekOwn) {
        return Vec::new();
    }
    let Some(game) = &room.game else { return Vec::new() };
    let Some(hand) = game.hands.get(player_id) else { return Vec::new() };
    let Some(card) = hand.get(slot) else { return Vec::new() };

    vec![ScopedEvent::private(player_id, Event::PeekResult { card, slot, target_id: None })]
}

/// `peek-other`: the 9/10 rule. Private reveal of a non-protected target's
/// slot. Never advances the turn; `finish-peek` does.
pub fn use_peek_other(room: &mut Room, player_id: &str, target_id: &str, slot: usize) -> Vec<ScopedEvent> {
    if !is_current_turn(room, player_id) || !pending_rule_is(room, RuleType::PeekOther) {
        return Vec::new();
    }
    let Some(game) = &room.game else { return Vec::new() };
    if game.is_protected(target_id) {
        return Vec::new();
    }
    let Some(hand) = game.hands.get(target_id) else { return Vec::new() };
    let Some(card) = hand.get(slot) else { return Vec::new() };

    vec![ScopedEvent::private(
        player_id,
        Event::PeekResult { card, slot, target_id: Some(target_id.to_owned()) },
    )]
}

/// `finish-peek`: completes a `peek-own`/`peek-other` rule and advances the
/// turn, whether or not the caller actually used the peek.
pub fn finish_peek(room: &mut Room, player_id: &str) -> Vec<ScopedEvent> {
    if !is_current_turn(room, player_id) {
        return Vec::new();
    }
    if !pending_rule_is(room, RuleType::PeekOwn) && !pending_rule_is(room, RuleType::PeekOther) {
        return Vec::new();
    }
    advance_turn(room)
}

/// Shared switch logic for `blind-switch` and `black-king-switch`: exchange
/// two occupied, non-protected slots and broadcast a highlight.
fn do_switch(
    room: &mut Room,
    a_id: &str,
    a_slot: usize,
    b_id: &str,
    b_slot: usize,
    kind: HighlightKind,
) -> Option<Vec<ScopedEvent>> {
    let game = room.game.as_ref()?;
    if game.is_protected(a_id) || game.is_protected(b_id) {
        return None;
    }
    if !game.hands.get(a_id)?.is_occupied(a_slot) || !game.hands.get(b_id)?.is_occupied(b_slot) {
        return None;
    }

    let game = room.game.as_mut()?;
    let swapped = if a_id == b_id {
        game.hands.get_mut(a_id)?.swap_within(a_slot, b_slot)
    } else {
        let (left, right) = split_hands(&mut game.hands, a_id, b_id)?;
        crate::hand::Hand::swap_between(left, a_slot, right, b_slot)
    };

    if !swapped {
        return None;
    }

    let game = room.game.as_mut()?;
    crate::bots::invalidate_memory(&mut game.bot_memory, a_id, a_slot);
    crate::bots::invalidate_memory(&mut game.bot_memory, b_id, b_slot);

    Some(vec![ScopedEvent::room(Event::CardsHighlighted {
        slots: vec![
            SlotHighlight { player_id: a_id.to_owned(), slot_index: a_slot },
            SlotHighlight { player_id: b_id.to_owned(), slot_index: b_slot },
        ],
        kind,
    })])
}

fn split_hands<'a>(
    hands: &'a mut std::collections::HashMap<String, crate::hand::Hand>,
    a_id: &str,
    b_id: &str,
) -> Option<(&'a mut crate::hand::Hand, &'a mut crate::hand::Hand)> {
    if a_id == b_id {
        return None;
    }
    let ptr: *mut std::collections::HashMap<String, crate::hand::Hand> = hands;
    // Safety: a_id != b_id, so the two mutable borrows never alias.
    unsafe {
        let a = (*ptr).get_mut(a_id)?;
        let b = (*ptr).get_mut(b_id)?;
        Some((a, b))
    }
}

/// `blind-switch`: the J/Q rule. Exchanges two slots and advances the turn.
pub fn use_blind_switch(
    room: &mut Room,
    player_id: &str,
    a_id: &str,
    a_slot: usize,
    b_id: &str,
    b_slot: usize,
) -> Vec<ScopedEvent> {
    if !is_current_turn(room, player_id) || !pending_rule_is(room, RuleType::BlindSwitch) {
        return Vec::new();
    }
    let Some(mut events) = do_switch(room, a_id, a_slot, b_id, b_slot, HighlightKind::Swap) else {
        return Vec::new();
    };
    events.extend(advance_turn(room));
    events
}

/// `black-king-peek`: private reveal of two non-protected slots to the
/// caller. Never advances the turn; a switch or skip follows.
pub fn use_black_king_peek(
    room: &mut Room,
    player_id: &str,
    t1: &str,
    s1: usize,
    t2: &str,
    s2: usize,
) -> Vec<ScopedEvent> {
    if !is_current_turn(room, player_id) || !pending_rule_is(room, RuleType::BlackKing) {
        return Vec::new();
    }
    let Some(game) = &room.game else { return Vec::new() };
    if game.is_protected(t1) || game.is_protected(t2) {
        return Vec::new();
    }
    let Some(card1) = game.hands.get(t1).and_then(|h| h.get(s1)) else { return Vec::new() };
    let Some(card2) = game.hands.get(t2).and_then(|h| h.get(s2)) else { return Vec::new() };

    room.game.as_mut().unwrap().black_king_peeked =
        Some(((t1.to_owned(), s1), (t2.to_owned(), s2)));

    vec![ScopedEvent::private(
        player_id,
        Event::BlackKingPeekResult {
            card1,
            target1_id: t1.to_owned(),
            slot1: s1,
            card2,
            target2_id: t2.to_owned(),
            slot2: s2,
        },
    )]
}

/// `black-king-switch`: as `blind-switch`, advances the turn.
pub fn use_black_king_switch(
    room: &mut Room,
    player_id: &str,
    a_id: &str,
    a_slot: usize,
    b_id: &str,
    b_slot: usize,
) -> Vec<ScopedEvent> {
    if !is_current_turn(room, player_id) || !pending_rule_is(room, RuleType::BlackKing) {
        return Vec::new();
    }
    let Some(mut events) = do_switch(room, a_id, a_slot, b_id, b_slot, HighlightKind::Switch) else {
        return Vec::new();
    };
    room.game.as_mut().unwrap().black_king_peeked = None;
    events.extend(advance_turn(room));
    events
}

/// `black-king-skip`: declines the switch, advances the turn.
pub fn use_black_king_skip(room: &mut Room, player_id: &str) -> Vec<ScopedEvent> {
    if !is_current_turn(room, player_id) || !pending_rule_is(room, RuleType::BlackKing) {
        return Vec::new();
    }
    room.game.as_mut().unwrap().black_king_peeked = None;
    advance_turn(room)
}

/// `match-own`: out-of-turn. Reveals the caller's slot; on a rank match it
/// is removed and discarded, otherwise the caller draws a penalty card.
/// Never advances the turn, and never disturbs the current turn player.
pub fn call_match_own(room: &mut Room, player_id: &str, slot: usize) -> Vec<ScopedEvent> {
    if !playable(room) || room.game.as_ref().is_some_and(|g| g.is_protected(player_id)) {
        return Vec::new();
    }
    let Some(game) = &mut room.game else { return Vec::new() };
    let Some(top) = game.top_discard() else { return Vec::new() };
    let Some(card) = game.hands.get(player_id).and_then(|h| h.get(slot)) else { return Vec::new() };

    if card.rank == top.rank {
        let hand = game.hands.get_mut(player_id).unwrap();
        hand.remove_at(slot);
        game.discard_pile.push(card);
        vec![ScopedEvent::room(Event::MatchResult {
            caller_id: player_id.to_owned(),
            target_id: None,
            card: Some(card),
            success: true,
            match_type: "own".into(),
        })]
    } else {
        let mut events = vec![ScopedEvent::room(Event::MatchResult {
            caller_id: player_id.to_owned(),
            target_id: None,
            card: None,
            success: false,
            match_type: "own".into(),
        })];
        events.extend(penalty_draw(game, player_id));
        events
    }
}

/// `match-other`: out-of-turn. On a rank match, no mutation happens yet —
/// the caller must follow up with `give-after-match`. On a miss the caller
/// (not the target) takes the penalty.
pub fn call_match_other(room: &mut Room, player_id: &str, target_id: &str, slot: usize) -> Vec<ScopedEvent> {
    if !playable(room) || room.game.as_ref().is_some_and(|g| g.is_protected(player_id)) {
        return Vec::new();
    }
    let Some(game) = &mut room.game else { return Vec::new() };
    if game.is_protected(target_id) {
        return Vec::new();
    }
    let Some(top) = game.top_discard() else { return Vec::new() };
    let Some(card) = game.hands.get(target_id).and_then(|h| h.get(slot)) else { return Vec::new() };

    if card.rank == top.rank {
        game.pending_give = Some(crate::state::PendingGive {
            caller_id: player_id.to_owned(),
            target_id: target_id.to_owned(),
            target_slot: slot,
        });
        vec![ScopedEvent::room(Event::MatchResult {
            caller_id: player_id.to_owned(),
            target_id: Some(target_id.to_owned()),
            card: Some(card),
            success: true,
            match_type: "other".into(),
        })]
    } else {
        let mut events = vec![ScopedEvent::room(Event::MatchResult {
            caller_id: player_id.to_owned(),
            target_id: Some(target_id.to_owned()),
            card: None,
            success: false,
            match_type: "other".into(),
        })];
        events.extend(penalty_draw(game, player_id));
        events
    }
}

/// `give-after-match`: the successful `match-other` follow-up. Removes the
/// matched card from the target's slot (discarding it) and moves the
/// caller's given card into the now-open target slot.
pub fn give_after_match(
    room: &mut Room,
    player_id: &str,
    own_slot: usize,
    target_id: &str,
    target_slot: usize,
) -> Vec<ScopedEvent> {
    if !playable(room) || room.game.as_ref().is_some_and(|g| g.is_protected(player_id)) {
        return Vec::new();
    }
    let Some(game) = &mut room.game else { return Vec::new() };
    if game.is_protected(target_id) {
        return Vec::new();
    }
    let bound = match &game.pending_give {
        Some(p) => p.caller_id == player_id && p.target_id == target_id && p.target_slot == target_slot,
        None => false,
    };
    if !bound {
        return Vec::new();
    }
    if !game.hands.get(player_id).is_some_and(|h| h.is_occupied(own_slot))
        || !game.hands.get(target_id).is_some_and(|h| h.is_occupied(target_slot))
    {
        return Vec::new();
    }
    let Some(top) = game.top_discard() else { return Vec::new() };
    let still_matches = game.hands.get(target_id).and_then(|h| h.get(target_slot)).is_some_and(|c| c.rank == top.rank);
    if !still_matches {
        game.pending_give = None;
        return Vec::new();
    }
    game.pending_give = None;

    let matched = game.hands.get_mut(target_id).unwrap().remove_at(target_slot).unwrap();
    game.discard_pile.push(matched);

    let given = game.hands.get_mut(player_id).unwrap().remove_at(own_slot).unwrap();
    game.hands.get_mut(target_id).unwrap().add_card(given);

    vec![
        ScopedEvent::private(
            player_id,
            Event::HandUpdated { hand: game.hands.get(player_id).unwrap().slots().to_vec() },
        ),
        ScopedEvent::private(
            target_id,
            Event::HandUpdated { hand: game.hands.get(target_id).unwrap().slots().to_vec() },
        ),
        ScopedEvent::room(Event::HandLayoutsUpdated {
            layouts: room
                .players
                .iter()
                .filter_map(|p| {
                    room.game.as_ref().unwrap().hands.get(&p.id).map(|h| (p.id.clone(), h.layout()))
                })
                .collect(),
        }),
    ]
}

fn penalty_draw(game: &mut crate::state::GameState, player_id: &str) -> Vec<ScopedEvent> {
    match game.deck.draw() {
        Ok(card) => {
            game.hands.get_mut(player_id).unwrap().add_card(card);
            vec![ScopedEvent::private(
                player_id,
                Event::HandUpdated { hand: game.hands.get(player_id).unwrap().slots().to_vec() },
            )]
        }
        Err(_) => Vec::new(),
    }
}

pub use crate::phase::call_red_king;

/// `draw-card`: takes the top of the deck as the in-flight drawn card. On
/// an empty deck, skips the draw and advances the turn instead (spec §4.1).
pub fn draw_card(room: &mut Room, player_id: &str) -> Vec<ScopedEvent> {
    if !playable(room) || !is_current_turn(room, player_id) {
        return Vec::new();
    }
    let Some(game) = &mut room.game else { return Vec::new() };
    if game.drawn_card.is_some() {
        return Vec::new();
    }
    match game.deck.draw() {
        Ok(card) => {
            game.drawn_card = Some(card);
            game.drawn_by = Some(player_id.to_owned());
            let rule = rule_type(&card);
            let mut events = vec![ScopedEvent::private(
                player_id,
                Event::CardDrawn { card, has_rule: rule.is_some(), rule_type: rule },
            )];
            for p in &room.players {
                if p.id != player_id {
                    events.push(ScopedEvent::private(
                        &p.id,
                        Event::OpponentDrew {
                            player_id: player_id.to_owned(),
                            name: room.player(player_id).map(|p| p.name.clone()).unwrap_or_default(),
                            deck_count: room.game.as_ref().unwrap().deck.len(),
                        },
                    ));
                }
            }
            events
        }
        Err(_) => advance_turn(room),
    }
}

/// Convenience used by tests and the bot driver to read a point value off
/// a card without importing the deck module directly.
pub fn value_of(card: &Card) -> i32 {
    point_value(card)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hand::Hand;
    use crate::state::{GameState, Player, RoomLifecycle};
    use protocol::{Rank, Suit};
    use std::collections::{HashMap, HashSet};

    fn player(id: &str, is_host: bool) -> Player {
        Player { id: id.into(), name: id.into(), is_host, is_cpu: false, difficulty: None }
    }

    fn card(suit: Suit, rank: Rank, id: u8) -> Card {
        Card { suit, rank, id }
    }

    fn two_player_room() -> Room {
        let mut room = Room::new("ABCD".into(), player("p0", true));
        room.players.push(player("p1", false));
        room.lifecycle = RoomLifecycle::Playing;
        let mut hands = HashMap::new();
        hands.insert(
            "p0".to_string(),
            Hand::new([
                card(Suit::Clubs, Rank::Five, 0),
                card(Suit::Clubs, Rank::Six, 1),
                card(Suit::Clubs, Rank::Seven, 2),
                card(Suit::Clubs, Rank::Eight, 3),
            ]),
        );
        hands.insert(
            "p1".to_string(),
            Hand::new([
                card(Suit::Hearts, Rank::Five, 10),
                card(Suit::Hearts, Rank::Six, 11),
                card(Suit::Hearts, Rank::Seven, 12),
                card(Suit::Hearts, Rank::Eight, 13),
            ]),
        );
        room.game = Some(GameState {
            deck: crate::deck::Deck::fresh(),
            hands,
            discard_pile: vec![card(Suit::Hearts, Rank::Five, 20)],
            phase: Phase::Play,
            peek_done: HashSet::new(),
            turn_order: vec!["p0".into(), "p1".into()],
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
        room
    }

    #[test]
    fn match_own_success_leaves_gap_and_updates_top() {
        let mut room = two_player_room();
        let events = call_match_own(&mut room, "p0", 0);
        assert!(events.iter().any(|e| matches!(e.event, Event::MatchResult { success: true, .. })));
        let game = room.game.as_ref().unwrap();
        assert!(!game.hands["p0"].is_occupied(0));
        assert_eq!(game.top_discard().unwrap().rank, Rank::Five);
    }

    #[test]
    fn match_own_penalty_fills_gap() {
        let mut room = two_player_room();
        room.game.as_mut().unwrap().hands.get_mut("p0").unwrap().remove_at(2);
        call_match_own(&mut room, "p0", 1); // Six vs top Five: miss, draws penalty
        let hand = &room.game.as_ref().unwrap().hands["p0"];
        assert_eq!(hand.len(), 4);
        assert!(hand.is_occupied(2));
    }

    #[test]
    fn information_hiding_on_peek_other() {
        let mut room = two_player_room();
        room.game.as_mut().unwrap().pending_rule = Some(RuleType::PeekOther);
        let events = use_peek_other(&mut room, "p0", "p1", 0);
        assert_eq!(events.len(), 1);
        match &events[0].scope {
            protocol::Scope::Private(target) => assert_eq!(target, "p0"),
            _ => panic!("peek-other must be private"),
        }
    }

    #[test]
    fn redemption_protects_caller_hand() {
        let mut room = two_player_room();
        let game = room.game.as_mut().unwrap();
        game.phase = Phase::Redemption;
        game.red_king_caller = Some("p0".into());
        game.redemption_order = vec!["p1".into()];
        game.redemption_index = 0;
        game.pending_rule = Some(RuleType::BlindSwitch);

        let before = room.game.as_ref().unwrap().hands["p0"].get(0);
        use_blind_switch(&mut room, "p1", "p0", 0, "p1", 1);
        let after = room.game.as_ref().unwrap().hands["p0"].get(0);
        assert_eq!(before, after);
    }

    #[test]
    fn keep_drawn_out_of_turn_is_a_silent_no_op() {
        let mut room = two_player_room();
        room.game.as_mut().unwrap().drawn_card = Some(card(Suit::Clubs, Rank::Nine, 99));
        room.game.as_mut().unwrap().drawn_by = Some("p0".into());
        let before = room.game.as_ref().unwrap().hands["p1"].slots().to_vec();

        let events = keep_drawn(&mut room, "p1", 0); // p1 never drew; not their turn either

        assert!(events.is_empty());
        assert_eq!(room.game.as_ref().unwrap().hands["p1"].slots().to_vec(), before);
        assert_eq!(room.game.as_ref().unwrap().drawn_card, Some(card(Suit::Clubs, Rank::Nine, 99)));
    }

    #[test]
    fn blind_switch_round_trip_restores_state() {
        let mut room = two_player_room();
        room.game.as_mut().unwrap().pending_rule = Some(RuleType::BlindSwitch);
        let before_a = room.game.as_ref().unwrap().hands["p0"].get(0);
        let before_b = room.game.as_ref().unwrap().hands["p1"].get(0);

        do_switch(&mut room, "p0", 0, "p1", 0, HighlightKind::Swap).unwrap();
        do_switch(&mut room, "p0", 0, "p1", 0, HighlightKind::Swap).unwrap();

        assert_eq!(room.game.as_ref().unwrap().hands["p0"].get(0), before_a);
        assert_eq!(room.game.as_ref().unwrap().hands["p1"].get(0), before_b);
    }

    #[test]
    fn give_after_match_without_a_prior_call_is_a_silent_no_op() {
        let mut room = two_player_room();
        let before_p0 = room.game.as_ref().unwrap().hands["p0"].slots().to_vec();
        let before_p1 = room.game.as_ref().unwrap().hands["p1"].slots().to_vec();
        let before_top = room.game.as_ref().unwrap().top_discard();

        // p1's slot 0 (Hearts Five) matches the Hearts Five top discard, but
        // no call-match-other ever confirmed it.
        let events = give_after_match(&mut room, "p0", 1, "p1", 0);

        assert!(events.is_empty());
        assert_eq!(room.game.as_ref().unwrap().hands["p0"].slots().to_vec(), before_p0);
        assert_eq!(room.game.as_ref().unwrap().hands["p1"].slots().to_vec(), before_p1);
        assert_eq!(room.game.as_ref().unwrap().top_discard(), before_top);
    }

    #[test]
    fn give_after_match_rejects_a_slot_other_than_the_one_confirmed() {
        let mut room = two_player_room();
        call_match_other(&mut room, "p0", "p1", 0); // Hearts Five matches top Five: confirmed
        let before_p1 = room.game.as_ref().unwrap().hands["p1"].slots().to_vec();

        // Caller now tries to give against a different target slot than the
        // one call-match-other actually confirmed.
        let events = give_after_match(&mut room, "p0", 1, "p1", 1);

        assert!(events.is_empty());
        assert_eq!(room.game.as_ref().unwrap().hands["p1"].slots().to_vec(), before_p1);
    }

    #[test]
    fn give_after_match_completes_the_confirmed_match() {
        let mut room = two_player_room();
        call_match_other(&mut room, "p0", "p1", 0);

        let events = give_after_match(&mut room, "p0", 1, "p1", 0);

        assert!(!events.is_empty());
        assert!(!room.game.as_ref().unwrap().hands["p0"].is_occupied(1));
        assert_eq!(room.game.as_ref().unwrap().hands["p1"].get(0), Some(card(Suit::Clubs, Rank::Six, 1)));
        assert_eq!(room.game.as_ref().unwrap().top_discard(), Some(card(Suit::Hearts, Rank::Five, 10)));
        assert!(room.game.as_ref().unwrap().pending_give.is_none());
    }

    #[test]
    fn give_after_match_rechecks_rank_if_the_slot_changed_in_the_meantime() {
        let mut room = two_player_room();
        call_match_other(&mut room, "p0", "p1", 0);
        // Something else moved a non-matching card into the confirmed slot
        // before the caller's give-after-match arrived.
        let hand = room.game.as_mut().unwrap().hands.get_mut("p1").unwrap();
        hand.remove_at(0);
        hand.add_card(card(Suit::Spades, Rank::Nine, 30));

        let events = give_after_match(&mut room, "p0", 1, "p1", 0);

        assert!(events.is_empty());
        assert_eq!(room.game.as_ref().unwrap().hands["p1"].get(0), Some(card(Suit::Spades, Rank::Nine, 30)));
        assert!(room.game.as_ref().unwrap().pending_give.is_none());
    }
}
