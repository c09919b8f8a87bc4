use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use crate::{
    dao::models::{ChapterRef, GameEntity, TeamEntity},
    dto::{format_system_time, question::QuestionSummary},
    state::lifecycle::GameStatus,
};

/// Payload used to create a new game.
#[derive(Debug, Deserialize, ToSchema, Validate)]
pub struct CreateGameRequest {
    #[validate(length(min = 1, message = "game name must not be empty"))]
    pub name: String,
    /// Time budget per question, in seconds.
    #[validate(range(min = 1, message = "seconds must be at least 1"))]
    pub seconds: u32,
    /// Number of questions the host intends to play.
    #[serde(default)]
    pub question_count: u32,
    /// Chapters the play order is drawn from.
    #[serde(default)]
    #[validate(nested)]
    pub chapters: Vec<ChapterInput>,
}

/// Book and chapter reference supplied at game creation.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, Validate)]
pub struct ChapterInput {
    #[validate(length(min = 1, message = "book must not be empty"))]
    pub book: String,
    #[validate(length(min = 1, message = "chapter must not be empty"))]
    pub chapter: String,
}

impl From<ChapterInput> for ChapterRef {
    fn from(value: ChapterInput) -> Self {
        Self {
            book: value.book,
            chapter: value.chapter,
        }
    }
}

impl From<ChapterRef> for ChapterInput {
    fn from(value: ChapterRef) -> Self {
        Self {
            book: value.book,
            chapter: value.chapter,
        }
    }
}

/// Payload used to add a team to a game.
#[derive(Debug, Deserialize, ToSchema, Validate)]
pub struct CreateTeamRequest {
    #[validate(length(min = 1, message = "team name must not be empty"))]
    pub name: String,
}

/// Game projection used by listings and the games-list topic.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct GameSummary {
    pub id: Uuid,
    pub name: String,
    pub seconds: u32,
    pub question_count: u32,
    pub status: GameStatus,
    pub created_at: String,
    pub chapters: Vec<ChapterInput>,
    pub current_game_question_id: Option<Uuid>,
}

impl From<GameEntity> for GameSummary {
    fn from(value: GameEntity) -> Self {
        Self {
            id: value.id,
            name: value.name,
            seconds: value.seconds,
            question_count: value.question_count,
            status: value.status,
            created_at: format_system_time(value.created_at),
            chapters: value.chapters.into_iter().map(Into::into).collect(),
            current_game_question_id: value.current_game_question_id,
        }
    }
}

#[derive(Clone, Debug, Serialize, ToSchema)]
/// Public projection of a team.
pub struct TeamSummary {
    pub id: Uuid,
    pub game_id: Uuid,
    pub name: String,
}

impl From<TeamEntity> for TeamSummary {
    fn from(value: TeamEntity) -> Self {
        Self {
            id: value.id,
            game_id: value.game_id,
            name: value.name,
        }
    }
}

/// A game together with its teams.
#[derive(Debug, Serialize, ToSchema)]
pub struct GameDetails {
    pub game: GameSummary,
    pub teams: Vec<TeamSummary>,
}

/// What the host and viewers should be looking at right now.
#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum QuestionView {
    /// No question has been materialized for the current pointer yet.
    Waiting {
        /// Placeholder text shown to viewers.
        message: String,
    },
    /// A question is on screen.
    Active {
        /// Game question the pointer references.
        game_question_id: Uuid,
        /// Zero-based position in the play order.
        position: u32,
        /// Length of the play order.
        total: u32,
        /// Question with every answer and its correct flag.
        question: QuestionSummary,
    },
    /// The game is over.
    Finished,
}

impl QuestionView {
    /// Placeholder shown before the play order has a current question.
    pub fn waiting() -> Self {
        QuestionView::Waiting {
            message: "Waiting for game to start".to_string(),
        }
    }
}

/// Answer selected by a team, as shown in team reports.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct TeamAnswerSummary {
    /// Identifier of the team answer record.
    pub id: Uuid,
    pub answer_id: Uuid,
    pub question_id: Uuid,
    pub text: String,
    pub correct: bool,
    pub created_at: String,
}

/// Team with the answers it selected and the score they yield.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct TeamReport {
    pub id: Uuid,
    pub game_id: Uuid,
    pub name: String,
    pub score: u32,
    pub answers: Vec<TeamAnswerSummary>,
}

/// Final state of a game with every team scored.
#[derive(Debug, Serialize, ToSchema)]
pub struct FinishedGameReport {
    pub game: GameSummary,
    pub teams: Vec<TeamReport>,
}

/// Returned after recording a team answer.
#[derive(Debug, Serialize, ToSchema)]
pub struct SubmitAnswerResponse {
    /// Identifier of the team answer record, existing or new.
    pub team_answer_id: Uuid,
}
