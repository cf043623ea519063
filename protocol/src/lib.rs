//! Wire-level types shared between the session server and anything that speaks
//! to it. Every command a client sends and every event the server emits is
//! represented here as a serde-tagged enum so both sides agree on the exact
//! field names, which are `lowerCamelCase` to match a deployed client.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// A card suit. `Joker` stands in for both joker cards; they are told apart
/// by `Card::id`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Suit {
    Hearts,
    Diamonds,
    Clubs,
    Spades,
    Joker,
}

/// A card rank.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Rank {
    Ace,
    Two,
    Three,
    Four,
    Five,
    Six,
    Seven,
    Eight,
    Nine,
    Ten,
    Jack,
    Queen,
    King,
    Joker,
}

/// An immutable card value. `id` disambiguates the two jokers and is stable
/// across the life of a game.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Card {
    pub suit: Suit,
    pub rank: Rank,
    pub id: u8,
}

/// The rule a card triggers when discarded, if any.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum RuleType {
    PeekOwn,
    PeekOther,
    BlindSwitch,
    BlackKing,
}

/// The phase the game session is currently in.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Phase {
    Waiting,
    Peek,
    Play,
    Redemption,
    Reveal,
}

/// The public shape of a player's hand: which slots are occupied, without
/// revealing card identity.
pub type Layout = Vec<bool>;

/// A player as seen from the outside (no hidden information).
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerInfo {
    pub id: String,
    pub name: String,
    pub is_host: bool,
    pub is_cpu: bool,
}

/// Commands a client sends over the persistent channel. The wire identifier
/// for each variant is its `lowerCamelCase` tag, matching spec §4.6 verbatim.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "command", rename_all = "camelCase")]
pub enum Command {
    HostGame { name: String },
    JoinGame { code: String, name: String },
    StartGame,
    EndGame,
    LeaveRoom,
    PeekDone,
    DrawCard,
    KeepCard { slot: usize },
    DiscardCard,
    SkipRule,
    UsePeekOwn { slot: usize },
    UsePeekOther { target_id: String, slot: usize },
    FinishPeek,
    UseBlindSwitch { a_slot: usize, target_id: String, b_slot: usize },
    UseBlackKingPeek {
        target1_id: String,
        slot1: usize,
        target2_id: String,
        slot2: usize,
    },
    UseBlackKingSwitch { a_slot: usize, target_id: String, b_slot: usize },
    UseBlackKingSkip,
    CallMatchOwn { slot: usize },
    CallMatchOther { target_id: String, slot: usize },
    GiveCardAfterMatch {
        own_slot: usize,
        target_id: String,
        target_slot: usize,
    },
    CallRedKing,
    AddCpuPlayer { difficulty: Difficulty },
}

/// Bot skill tier, selected at add-cpu-player time.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Difficulty {
    Easy,
    Medium,
    Hard,
}

/// A join failure kind, surfaced privately to the requester (spec §4.2/§7).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum JoinErrorKind {
    RoomNotFound,
    GameInProgress,
    RoomFull,
    NameTaken,
    AlreadyInRoom,
}

/// A single card-slot highlight, used to call out a swap/switch/match.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SlotHighlight {
    pub player_id: String,
    pub slot_index: usize,
}

/// The kind of a [`SlotHighlight`] batch.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum HighlightKind {
    Swap,
    Switch,
    Match,
}

/// A single player's final standing at reveal.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerResult {
    pub player_id: String,
    pub hand: Vec<Option<Card>>,
    pub score: i32,
}

/// Events the server emits. Every variant is dispatched through exactly one
/// scope (private to one player, or to the whole room) per spec §4.8 — the
/// scope lives alongside the event in [`ScopedEvent`], not in this type.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "camelCase")]
pub enum Event {
    RoomCreated {
        code: String,
        players: Vec<PlayerInfo>,
        self_id: String,
    },
    RoomJoined {
        code: String,
        players: Vec<PlayerInfo>,
        self_id: String,
    },
    PlayerListUpdated {
        players: Vec<PlayerInfo>,
    },
    HostChanged {
        new_host_id: String,
    },
    GameStarted {
        phase: Phase,
    },
    CardsDealt {
        hand: Layout,
        own_cards: Vec<Option<Card>>,
        phase: Phase,
        deck_count: usize,
        opponents: Vec<OpponentSummary>,
    },
    PlayerPeekDone {
        player_id: String,
    },
    PhaseChanged {
        phase: Phase,
        current_turn: Option<String>,
        top_discard: Option<Card>,
    },
    CardDrawn {
        card: Card,
        has_rule: bool,
        rule_type: Option<RuleType>,
    },
    OpponentDrew {
        player_id: String,
        name: String,
        deck_count: usize,
    },
    HandUpdated {
        hand: Vec<Option<Card>>,
    },
    CardDiscarded {
        player_id: String,
        card: Card,
        action: String,
    },
    TurnUpdate {
        current_turn: String,
        deck_count: usize,
        top_discard: Option<Card>,
    },
    ExecuteRule {
        rule_type: RuleType,
        card: Card,
    },
    PeekResult {
        card: Card,
        slot: usize,
        target_id: Option<String>,
    },
    BlackKingPeekResult {
        card1: Card,
        target1_id: String,
        slot1: usize,
        card2: Card,
        target2_id: String,
        slot2: usize,
    },
    CardsHighlighted {
        slots: Vec<SlotHighlight>,
        kind: HighlightKind,
    },
    MatchResult {
        caller_id: String,
        target_id: Option<String>,
        card: Option<Card>,
        success: bool,
        match_type: String,
    },
    HandLayoutsUpdated {
        layouts: HashMap<String, Layout>,
    },
    GameResults {
        results: Vec<PlayerResult>,
        winner_id: String,
        caller_id: Option<String>,
    },
    GameEnded {
        players: Vec<PlayerInfo>,
    },
    YouLeft,
    JoinError {
        kind: JoinErrorKind,
        message: String,
    },
}

/// Opponent hand-count summary handed out at deal time (no card identities).
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OpponentSummary {
    pub player_id: String,
    pub card_count: usize,
}

/// Who an [`Event`] is allowed to reach.
#[derive(Clone, Debug)]
pub enum Scope {
    /// Delivered only to one player.
    Private(String),
    /// Delivered to every member of the room, including the actor.
    Room,
}

/// An event paired with the scope it must be delivered under. This is the
/// unit the fan-out broadcast channel carries (spec §4.8/C8).
#[derive(Clone, Debug)]
pub struct ScopedEvent {
    pub scope: Scope,
    pub event: Event,
}

impl ScopedEvent {
    pub fn private(player_id: impl Into<String>, event: Event) -> Self {
        ScopedEvent { scope: Scope::Private(player_id.into()), event }
    }

    pub fn room(event: Event) -> Self {
        ScopedEvent { scope: Scope::Room, event }
    }

    /// Whether this event should be delivered to `player_id`.
    pub fn reaches(&self, player_id: &str) -> bool {
        match &self.scope {
            Scope::Private(target) => target == player_id,
            Scope::Room => true,
        }
    }
}
