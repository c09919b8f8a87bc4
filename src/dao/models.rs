use serde::{Deserialize, Serialize};
use std::time::SystemTime;
use uuid::Uuid;

use crate::state::lifecycle::GameStatus;

/// Book and chapter reference used to pull questions into a game.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct ChapterRef {
    /// Book name as authored in the question bank.
    pub book: String,
    /// Chapter identifier within the book.
    pub chapter: String,
}

/// Aggregate game entity persisted by the storage layer.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct GameEntity {
    /// Primary key of the game.
    pub id: Uuid,
    /// Display name of the game.
    pub name: String,
    /// Time budget per question, in seconds.
    pub seconds: u32,
    /// Number of questions the host configured for the game.
    pub question_count: u32,
    /// Lifecycle status.
    pub status: GameStatus,
    /// Creation timestamp.
    pub created_at: SystemTime,
    /// Chapters the play order is drawn from, fixed at creation.
    pub chapters: Vec<ChapterRef>,
    /// Game question currently displayed, if the game has been started.
    pub current_game_question_id: Option<Uuid>,
    /// Incremented on every committed update of this record.
    pub version: u64,
}

impl GameEntity {
    /// Build an open game stamped with the current time.
    pub fn new(name: String, seconds: u32, question_count: u32, chapters: Vec<ChapterRef>) -> Self {
        Self {
            id: Uuid::new_v4(),
            name,
            seconds,
            question_count,
            status: GameStatus::Open,
            created_at: SystemTime::now(),
            chapters,
            current_game_question_id: None,
            version: 0,
        }
    }
}

/// Materialized entry of a game's shuffled play order.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct GameQuestionEntity {
    /// Primary key of the game question.
    pub id: Uuid,
    /// Owning game.
    pub game_id: Uuid,
    /// Question from the bank shown at this position.
    pub question_id: Uuid,
    /// Zero-based position in the play order.
    pub position: u32,
}

/// Representation of a team stored in persistence.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TeamEntity {
    /// Stable identifier for the team.
    pub id: Uuid,
    /// Owning game.
    pub game_id: Uuid,
    /// Display name chosen for the team.
    pub name: String,
}

impl TeamEntity {
    /// Build a team for `game_id` with a fresh identifier.
    pub fn new(game_id: Uuid, name: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            game_id,
            name: name.into(),
        }
    }
}

/// Answer option attached to a question.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AnswerEntity {
    /// Stable identifier for the answer.
    pub id: Uuid,
    /// Question the answer belongs to.
    pub question_id: Uuid,
    /// Answer text.
    pub text: String,
    /// Whether the answer is correct, set when the question is authored.
    pub correct: bool,
}

/// Question record of the question bank.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct QuestionEntity {
    /// Stable identifier for the question.
    pub id: Uuid,
    /// Book the question is drawn from.
    pub book: String,
    /// Chapter within the book.
    pub chapter: String,
    /// Verse range the question covers.
    pub verses: String,
    /// Question text.
    pub text: String,
    /// Answer options.
    pub answers: Vec<AnswerEntity>,
}

impl QuestionEntity {
    /// Whether the question belongs to the referenced chapter.
    pub fn in_chapter(&self, chapter: &ChapterRef) -> bool {
        self.book == chapter.book && self.chapter == chapter.chapter
    }
}

/// Record of a team selecting an answer during a game.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TeamAnswerEntity {
    /// Time-ordered identifier of the record.
    pub id: Uuid,
    /// Game the answer was given in.
    pub game_id: Uuid,
    /// Team that selected the answer.
    pub team_id: Uuid,
    /// Selected answer.
    pub answer_id: Uuid,
    /// When the answer was recorded.
    pub created_at: SystemTime,
}

impl TeamAnswerEntity {
    /// Build a fresh record stamped with the current time.
    pub fn new(game_id: Uuid, team_id: Uuid, answer_id: Uuid) -> Self {
        Self {
            id: Uuid::now_v7(),
            game_id,
            team_id,
            answer_id,
            created_at: SystemTime::now(),
        }
    }

    /// Whether the record matches a `(game, team, answer)` triple.
    pub fn matches(&self, game_id: Uuid, team_id: Uuid, answer_id: Uuid) -> bool {
        self.game_id == game_id && self.team_id == team_id && self.answer_id == answer_id
    }
}

/// Sort team answers into canonical scoring order (creation time, then id).
pub fn sort_team_answers(answers: &mut [TeamAnswerEntity]) {
    answers.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
}
