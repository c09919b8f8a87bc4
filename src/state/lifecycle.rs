use serde::{Deserialize, Serialize};
use thiserror::Error;
use utoipa::ToSchema;

/// Lifecycle status of a game. `Finished` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum GameStatus {
    /// Created, chapters fixed, play order not materialized yet.
    Open,
    /// Play order materialized; the current pointer moves with next/previous.
    Started,
    /// No further pointer movement or answer changes.
    Finished,
}

/// Indicates why a game transitioned to finished.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FinishReason {
    /// The host advanced past the last question.
    PlayOrderCompleted,
    /// The host finished the game explicitly.
    ManualStop,
}

/// Commands checked against the lifecycle before the engine touches storage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleEvent {
    /// Materialize the play order and start playing.
    Start,
    /// Move the current pointer forward.
    Advance,
    /// Move the current pointer backward.
    Retreat,
    /// Record or retract a team answer.
    RecordAnswer,
    /// Finish the game.
    Finish(FinishReason),
}

/// Error returned when an event is not allowed from the current status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("invalid transition: {event:?} cannot be applied while {from:?}")]
pub struct InvalidTransition {
    /// Status the game was in when the event was received.
    pub from: GameStatus,
    /// Event that cannot be applied from this status.
    pub event: LifecycleEvent,
}

impl GameStatus {
    /// Compute the status reached by applying `event`, if the event is allowed.
    ///
    /// This is the only place a status change is decided; pointer moves and
    /// answer bookkeeping map back onto the current status.
    pub fn transition(self, event: LifecycleEvent) -> Result<GameStatus, InvalidTransition> {
        let next = match (self, event) {
            (GameStatus::Open, LifecycleEvent::Start) => GameStatus::Started,
            (GameStatus::Started, LifecycleEvent::Advance) => GameStatus::Started,
            (GameStatus::Started, LifecycleEvent::Retreat) => GameStatus::Started,
            (GameStatus::Started, LifecycleEvent::Finish(_)) => GameStatus::Finished,
            (GameStatus::Open | GameStatus::Started, LifecycleEvent::RecordAnswer) => self,
            (from, event) => return Err(InvalidTransition { from, event }),
        };

        Ok(next)
    }

    /// Whether no event can leave this status.
    pub fn is_terminal(self) -> bool {
        matches!(self, GameStatus::Finished)
    }
}
