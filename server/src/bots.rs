//! Bot driver (C7): strategy interface, three built-ins, scheduled turn
//! execution and opportunistic matching.
//!
//! Bots re-enter the session controller through the exact same
//! [`crate::controller::handle_command`] entry point as a human player, so
//! they are subject to the same eligibility guards (spec §4.7).

use std::collections::HashMap;

use protocol::{Card, Command, Difficulty, RuleType, ScopedEvent};
use rand::Rng;

use crate::controller::handle_command;
use crate::deck::rule_type;
use crate::rules::value_of as point_value;
use crate::state::Room;

/// How long a bot waits before acting on a turn handed to it (spec §4.7).
pub const BOT_THINK_MS: u64 = 1500;

/// A slot a bot remembers the identity of: either its own or a tagged
/// opponent reference.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct SlotKey {
    pub player_id: String,
    pub slot: usize,
}

/// What a single bot currently believes about card identities, built up
/// from its own peeks/switches rather than the server's full knowledge
/// (except for [`Difficulty::Hard`], which reads the real hands directly).
#[derive(Default, Clone, Debug)]
pub struct BotMemory {
    known: HashMap<SlotKey, Card>,
}

impl BotMemory {
    pub fn remember(&mut self, player_id: &str, slot: usize, card: Card) {
        self.known.insert(SlotKey { player_id: player_id.to_owned(), slot }, card);
    }

    pub fn forget(&mut self, player_id: &str, slot: usize) {
        self.known.remove(&SlotKey { player_id: player_id.to_owned(), slot });
    }

    pub fn get(&self, player_id: &str, slot: usize) -> Option<Card> {
        self.known.get(&SlotKey { player_id: player_id.to_owned(), slot }).copied()
    }

    pub fn known_own_slots<'a>(&'a self, bot_id: &'a str) -> impl Iterator<Item = (usize, Card)> + 'a {
        self.known.iter().filter_map(move |(k, c)| (k.player_id == bot_id).then_some((k.slot, *c)))
    }
}

/// Invalidates any bot's memory of `(player_id, slot)` — called after a
/// switch changes what sits there (spec §4.7).
pub fn invalidate_memory(memories: &mut HashMap<String, BotMemory>, player_id: &str, slot: usize) {
    for memory in memories.values_mut() {
        memory.forget(player_id, slot);
    }
}

/// Keep or discard the just-drawn card.
pub enum KeepOrDiscard {
    Keep(usize),
    Discard,
}

/// What a bot does with an armed rule.
pub enum RuleDecision {
    Skip,
    UsePeekOwn { slot: usize },
    UsePeekOther { target_id: String, slot: usize },
    UseBlindSwitch { own_slot: usize, target_id: String, target_slot: usize },
    UseBlackKing { t1: String, s1: usize, t2: String, s2: usize, do_switch: bool },
}

/// The four pure decisions every built-in strategy implements (spec §4.7).
pub trait Strategy: Send {
    fn should_call_red_king(&self, room: &Room, bot_id: &str, memory: &BotMemory) -> bool;
    fn decide_keep_or_discard(&self, room: &Room, bot_id: &str, memory: &mut BotMemory, drawn: Card) -> KeepOrDiscard;
    fn decide_rule_usage(&self, room: &Room, bot_id: &str, memory: &mut BotMemory, rule: RuleType) -> RuleDecision;
    fn should_match_own(&self, bot_id: &str, memory: &BotMemory, slot: usize, known_card: Card, top_discard: Card) -> bool;
}

/// A heuristic estimate of a hand's score from only the slots a bot
/// actually knows; unknown slots are charged a flat 6 points (spec §4.7,
/// medium strategy).
fn estimated_score(room: &Room, bot_id: &str, memory: &BotMemory) -> i32 {
    let Some(game) = &room.game else { return 0 };
    let Some(hand) = game.hands.get(bot_id) else { return 0 };
    hand.slots()
        .iter()
        .enumerate()
        .filter_map(|(i, slot)| slot.map(|_| i))
        .map(|i| memory.get(bot_id, i).map(|c| point_value(&c)).unwrap_or(6))
        .sum()
}

fn first_unknown_own_slot(room: &Room, bot_id: &str, memory: &BotMemory) -> Option<usize> {
    let game = room.game.as_ref()?;
    let hand = game.hands.get(bot_id)?;
    (0..hand.len()).find(|&i| hand.is_occupied(i) && memory.get(bot_id, i).is_none())
}

fn worst_known_own_slot(bot_id: &str, memory: &BotMemory) -> Option<(usize, i32)> {
    memory.known_own_slots(bot_id).map(|(i, c)| (i, point_value(&c))).max_by_key(|(_, v)| *v)
}

fn random_opponent(room: &Room, bot_id: &str, rng: &mut impl Rng) -> Option<(String, usize)> {
    let opponents: Vec<&str> = room.players.iter().map(|p| p.id.as_str()).filter(|id| *id != bot_id).collect();
    let target = *opponents.get(rng.random_range(0..opponents.len().max(1)))?;
    let hand = room.game.as_ref()?.hands.get(target)?;
    let occupied: Vec<usize> = (0..hand.len()).filter(|&i| hand.is_occupied(i)).collect();
    let slot = *occupied.get(rng.random_range(0..occupied.len().max(1)))?;
    Some((target.to_owned(), slot))
}

/// Coin-flips and flat probabilities, never opportunistically matches.
pub struct EasyStrategy;

impl Strategy for EasyStrategy {
    fn should_call_red_king(&self, room: &Room, bot_id: &str, memory: &BotMemory) -> bool {
        estimated_score(room, bot_id, memory) < 10 && rand::rng().random_bool(0.5)
    }

    fn decide_keep_or_discard(&self, _room: &Room, _bot_id: &str, _memory: &mut BotMemory, _drawn: Card) -> KeepOrDiscard {
        if rand::rng().random_bool(0.4) { KeepOrDiscard::Keep(rand::rng().random_range(0..4)) } else { KeepOrDiscard::Discard }
    }

    fn decide_rule_usage(&self, room: &Room, bot_id: &str, memory: &mut BotMemory, rule: RuleType) -> RuleDecision {
        if !rand::rng().random_bool(0.5) {
            return RuleDecision::Skip;
        }
        random_rule_decision(room, bot_id, memory, rule)
    }

    fn should_match_own(&self, _bot_id: &str, _memory: &BotMemory, _slot: usize, _known_card: Card, _top_discard: Card) -> bool {
        false
    }
}

fn hand_len(room: &Room, player_id: &str) -> usize {
    room.game.as_ref().and_then(|g| g.hands.get(player_id)).map(crate::hand::Hand::len).unwrap_or(4)
}

fn random_rule_decision(room: &Room, bot_id: &str, memory: &mut BotMemory, rule: RuleType) -> RuleDecision {
    let mut rng = rand::rng();
    match rule {
        RuleType::PeekOwn => {
            RuleDecision::UsePeekOwn { slot: rng.random_range(0..hand_len(room, bot_id).max(1)) }
        }
        RuleType::PeekOther => {
            if let Some((target_id, slot)) = random_opponent(room, bot_id, &mut rng) {
                RuleDecision::UsePeekOther { target_id, slot }
            } else {
                RuleDecision::Skip
            }
        }
        RuleType::BlindSwitch => {
            let own_len = hand_len(room, bot_id);
            if let Some((target_id, target_slot)) = random_opponent(room, bot_id, &mut rng) {
                RuleDecision::UseBlindSwitch { own_slot: rng.random_range(0..own_len.max(1)), target_id, target_slot }
            } else {
                RuleDecision::Skip
            }
        }
        RuleType::BlackKing => {
            let (t1, s1) = random_opponent(room, bot_id, &mut rng).unwrap_or((bot_id.to_owned(), 0));
            let (t2, s2) = random_opponent(room, bot_id, &mut rng).unwrap_or((bot_id.to_owned(), 0));
            let _ = memory;
            RuleDecision::UseBlackKing { t1, s1, t2, s2, do_switch: rng.random_bool(0.5) }
        }
    }
}

/// Conservative: charges unknown slots 6 points, plays it safe.
pub struct MediumStrategy;

impl Strategy for MediumStrategy {
    fn should_call_red_king(&self, room: &Room, bot_id: &str, memory: &BotMemory) -> bool {
        let known_count = memory.known_own_slots(bot_id).count();
        let known_sum: i32 = memory.known_own_slots(bot_id).map(|(_, c)| point_value(&c)).sum();
        known_count >= 2 && known_sum <= 5 && estimated_score(room, bot_id, memory) <= 8
    }

    fn decide_keep_or_discard(&self, room: &Room, bot_id: &str, memory: &mut BotMemory, drawn: Card) -> KeepOrDiscard {
        let drawn_value = point_value(&drawn);
        match worst_known_own_slot(bot_id, memory) {
            Some((slot, worst_value)) if drawn_value < worst_value => KeepOrDiscard::Keep(slot),
            _ => {
                if let Some(slot) = first_unknown_own_slot(room, bot_id, memory) {
                    KeepOrDiscard::Keep(slot)
                } else {
                    KeepOrDiscard::Discard
                }
            }
        }
    }

    fn decide_rule_usage(&self, room: &Room, bot_id: &str, memory: &mut BotMemory, rule: RuleType) -> RuleDecision {
        match rule {
            RuleType::PeekOwn => match first_unknown_own_slot(room, bot_id, memory) {
                Some(slot) => RuleDecision::UsePeekOwn { slot },
                None => RuleDecision::Skip,
            },
            RuleType::PeekOther => match random_opponent(room, bot_id, &mut rand::rng()) {
                Some((target_id, slot)) => RuleDecision::UsePeekOther { target_id, slot },
                None => RuleDecision::Skip,
            },
            RuleType::BlindSwitch => match (worst_known_own_slot(bot_id, memory), random_opponent(room, bot_id, &mut rand::rng())) {
                (Some((own_slot, _)), Some((target_id, target_slot))) => {
                    RuleDecision::UseBlindSwitch { own_slot, target_id, target_slot }
                }
                _ => RuleDecision::Skip,
            },
            RuleType::BlackKing => {
                let mut rng = rand::rng();
                match (random_opponent(room, bot_id, &mut rng), random_opponent(room, bot_id, &mut rng)) {
                    (Some((t1, s1)), Some((t2, s2))) => RuleDecision::UseBlackKing { t1, s1, t2, s2, do_switch: false },
                    _ => RuleDecision::Skip,
                }
            }
        }
    }

    fn should_match_own(&self, _bot_id: &str, _memory: &BotMemory, _slot: usize, known_card: Card, top_discard: Card) -> bool {
        known_card.rank == top_discard.rank
    }
}

/// Full information: the server is the bot's own driver, so it reads real
/// hands directly instead of relying on remembered slots.
pub struct HardStrategy;

impl HardStrategy {
    fn actual(room: &Room, player_id: &str, slot: usize) -> Option<Card> {
        room.game.as_ref()?.hands.get(player_id)?.get(slot)
    }

    fn worst_own_slot(room: &Room, bot_id: &str) -> Option<(usize, Card)> {
        let hand = room.game.as_ref()?.hands.get(bot_id)?;
        (0..hand.len())
            .filter_map(|i| hand.get(i).map(|c| (i, c)))
            .max_by_key(|(_, c)| point_value(c))
    }

    fn best_opponent_slot(room: &Room, bot_id: &str) -> Option<(String, usize, Card)> {
        room.players
            .iter()
            .filter(|p| p.id != bot_id)
            .filter_map(|p| {
                let hand = room.game.as_ref()?.hands.get(&p.id)?;
                (0..hand.len())
                    .filter_map(|i| hand.get(i).map(|c| (p.id.clone(), i, c)))
                    .min_by_key(|(_, _, c)| point_value(c))
            })
            .min_by_key(|(_, _, c)| point_value(c))
    }
}

impl Strategy for HardStrategy {
    fn should_call_red_king(&self, room: &Room, bot_id: &str, _memory: &BotMemory) -> bool {
        let Some(hand) = room.game.as_ref().and_then(|g| g.hands.get(bot_id)) else { return false };
        let score: i32 = hand.slots().iter().flatten().map(point_value).sum();
        score <= 5
    }

    fn decide_keep_or_discard(&self, room: &Room, bot_id: &str, _memory: &mut BotMemory, drawn: Card) -> KeepOrDiscard {
        match Self::worst_own_slot(room, bot_id) {
            Some((slot, worst)) if point_value(&drawn) < point_value(&worst) => KeepOrDiscard::Keep(slot),
            _ => KeepOrDiscard::Discard,
        }
    }

    fn decide_rule_usage(&self, room: &Room, bot_id: &str, _memory: &mut BotMemory, rule: RuleType) -> RuleDecision {
        match rule {
            RuleType::PeekOwn => RuleDecision::Skip, // Already full information.
            RuleType::PeekOther => RuleDecision::Skip,
            RuleType::BlindSwitch => match (Self::worst_own_slot(room, bot_id), Self::best_opponent_slot(room, bot_id)) {
                (Some((own_slot, own_card)), Some((target_id, target_slot, target_card)))
                    if point_value(&target_card) < point_value(&own_card) =>
                {
                    RuleDecision::UseBlindSwitch { own_slot, target_id, target_slot }
                }
                _ => RuleDecision::Skip,
            },
            RuleType::BlackKing => {
                let (t1, s1) = Self::best_opponent_slot(room, bot_id).map(|(t, s, _)| (t, s)).unwrap_or((bot_id.to_owned(), 0));
                let worst = Self::worst_own_slot(room, bot_id);
                let do_switch = match (worst, Self::actual(room, &t1, s1)) {
                    (Some((_, own_card)), Some(their_card)) => point_value(&their_card) < point_value(&own_card),
                    _ => false,
                };
                let (t2, s2) = worst.map(|(s, _)| (bot_id.to_owned(), s)).unwrap_or((bot_id.to_owned(), 0));
                RuleDecision::UseBlackKing { t1, s1, t2, s2, do_switch }
            }
        }
    }

    fn should_match_own(&self, _bot_id: &str, _memory: &BotMemory, _slot: usize, known_card: Card, top_discard: Card) -> bool {
        known_card.rank == top_discard.rank
    }
}

/// Looks up the strategy for a bot's configured difficulty.
pub fn strategy_for(difficulty: Difficulty) -> Box<dyn Strategy> {
    match difficulty {
        Difficulty::Easy => Box::new(EasyStrategy),
        Difficulty::Medium => Box::new(MediumStrategy),
        Difficulty::Hard => Box::new(HardStrategy),
    }
}

/// Bots auto-complete the peek phase by remembering the bottom two slots
/// (indices 2, 3) and immediately signaling `peek-done` (spec §4.7).
pub fn auto_peek(room: &mut Room, bot_id: &str) -> Vec<ScopedEvent> {
    if let Some(game) = &mut room.game {
        for slot in [2usize, 3usize] {
            if let Some(card) = game.hands.get(bot_id).and_then(|h| h.get(slot)) {
                game.bot_memory.entry(bot_id.to_owned()).or_default().remember(bot_id, slot, card);
            }
        }
    }
    handle_command(room, bot_id, Command::PeekDone)
}

/// Runs one full scheduled turn for `bot_id`: decide red-king, draw,
/// keep-or-discard, and rule usage if one was armed — each step re-entering
/// [`handle_command`] exactly as a human action would.
pub fn run_bot_turn(room: &mut Room, bot_id: &str, strategy: &dyn Strategy) -> Vec<ScopedEvent> {
    let mut events = Vec::new();
    let mut memory = room.game.as_mut().map(|g| g.bot_memory.remove(bot_id).unwrap_or_default()).unwrap_or_default();

    if strategy.should_call_red_king(room, bot_id, &memory) {
        events.extend(handle_command(room, bot_id, Command::CallRedKing));
        store_memory(room, bot_id, memory);
        return events;
    }

    events.extend(handle_command(room, bot_id, Command::DrawCard));
    let Some(drawn) = room.game.as_ref().and_then(|g| g.drawn_card) else {
        store_memory(room, bot_id, memory);
        return events;
    };

    match strategy.decide_keep_or_discard(room, bot_id, &mut memory, drawn) {
        KeepOrDiscard::Keep(slot) => {
            events.extend(handle_command(room, bot_id, Command::KeepCard { slot }));
            memory.remember(bot_id, slot, drawn);
        }
        KeepOrDiscard::Discard => {
            events.extend(handle_command(room, bot_id, Command::DiscardCard));
            if let Some(rule) = rule_type(&drawn) {
                events.extend(apply_rule_decision(room, bot_id, strategy, &mut memory, rule));
            }
        }
    }

    store_memory(room, bot_id, memory);
    events
}

fn apply_rule_decision(
    room: &mut Room,
    bot_id: &str,
    strategy: &dyn Strategy,
    memory: &mut BotMemory,
    rule: RuleType,
) -> Vec<ScopedEvent> {
    match strategy.decide_rule_usage(room, bot_id, memory, rule) {
        RuleDecision::Skip => handle_command(room, bot_id, Command::SkipRule),
        RuleDecision::UsePeekOwn { slot } => {
            let mut events = handle_command(room, bot_id, Command::UsePeekOwn { slot });
            if let Some(card) = room.game.as_ref().and_then(|g| g.hands.get(bot_id)).and_then(|h| h.get(slot)) {
                memory.remember(bot_id, slot, card);
            }
            events.extend(handle_command(room, bot_id, Command::FinishPeek));
            events
        }
        RuleDecision::UsePeekOther { target_id, slot } => {
            let mut events = handle_command(room, bot_id, Command::UsePeekOther { target_id: target_id.clone(), slot });
            if let Some(card) = room.game.as_ref().and_then(|g| g.hands.get(&target_id)).and_then(|h| h.get(slot)) {
                memory.remember(&target_id, slot, card);
            }
            events.extend(handle_command(room, bot_id, Command::FinishPeek));
            events
        }
        RuleDecision::UseBlindSwitch { own_slot, target_id, target_slot } => {
            handle_command(room, bot_id, Command::UseBlindSwitch { a_slot: own_slot, target_id, b_slot: target_slot })
        }
        RuleDecision::UseBlackKing { t1, s1, t2, s2, do_switch } => {
            let mut events = handle_command(
                room,
                bot_id,
                Command::UseBlackKingPeek { target1_id: t1.clone(), slot1: s1, target2_id: t2.clone(), slot2: s2 },
            );
            if do_switch {
                events.extend(handle_command(
                    room,
                    bot_id,
                    Command::UseBlackKingSwitch { a_slot: s1, target_id: t2, b_slot: s2 },
                ));
            } else {
                events.extend(handle_command(room, bot_id, Command::UseBlackKingSkip));
            }
            events
        }
    }
}

fn store_memory(room: &mut Room, bot_id: &str, memory: BotMemory) {
    if let Some(game) = &mut room.game {
        game.bot_memory.insert(bot_id.to_owned(), memory);
    }
}

/// Scans every bot's memory for a rank match against the current top of
/// discard and fires at most one `call-match-own` attempt per bot (spec
/// §4.7). Meant to be called after any event that updates the discard top.
pub fn opportunistic_match(room: &mut Room, bots: &HashMap<String, Box<dyn Strategy>>) -> Vec<ScopedEvent> {
    let Some(top) = room.game.as_ref().and_then(|g| g.top_discard()) else { return Vec::new() };
    let bot_ids: Vec<String> = room.players.iter().filter(|p| p.is_cpu).map(|p| p.id.clone()).collect();

    let mut events = Vec::new();
    for bot_id in bot_ids {
        let Some(strategy) = bots.get(&bot_id) else { continue };
        let memory = room.game.as_ref().and_then(|g| g.bot_memory.get(&bot_id)).cloned().unwrap_or_default();
        let candidate = memory.known_own_slots(&bot_id).find(|(_, card)| card.rank == top.rank);
        if let Some((slot, card)) = candidate
            && strategy.should_match_own(&bot_id, &memory, slot, card, top)
        {
            events.extend(handle_command(room, &bot_id, Command::CallMatchOwn { slot }));
        }
    }
    events
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_forgets_invalidated_slot() {
        let mut memories = HashMap::new();
        let mut mem = BotMemory::default();
        mem.remember("p0", 1, Card { suit: protocol::Suit::Clubs, rank: protocol::Rank::Five, id: 0 });
        memories.insert("bot-1".to_string(), mem);

        invalidate_memory(&mut memories, "p0", 1);
        assert!(memories["bot-1"].get("p0", 1).is_none());
    }
}
