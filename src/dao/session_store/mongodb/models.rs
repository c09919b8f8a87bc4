use mongodb::bson::{self, DateTime, Document, doc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    dao::models::{
        AnswerEntity, ChapterRef, GameEntity, GameQuestionEntity, QuestionEntity,
        TeamAnswerEntity, TeamEntity,
    },
    state::lifecycle::GameStatus,
};

pub fn bson_id(id: Uuid) -> bson::Uuid {
    bson::Uuid::from_bytes(id.into_bytes())
}

fn from_bson_id(id: bson::Uuid) -> Uuid {
    Uuid::from_bytes(id.bytes())
}

pub fn doc_id(id: Uuid) -> Document {
    doc! {"_id": bson_id(id)}
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MongoGameDocument {
    #[serde(rename = "_id")]
    id: bson::Uuid,
    name: String,
    seconds: u32,
    question_count: u32,
    status: GameStatus,
    created_at: DateTime,
    chapters: Vec<ChapterRef>,
    current_game_question_id: Option<bson::Uuid>,
    version: i64,
}

impl From<GameEntity> for MongoGameDocument {
    fn from(value: GameEntity) -> Self {
        Self {
            id: bson_id(value.id),
            name: value.name,
            seconds: value.seconds,
            question_count: value.question_count,
            status: value.status,
            created_at: DateTime::from_system_time(value.created_at),
            chapters: value.chapters,
            current_game_question_id: value.current_game_question_id.map(bson_id),
            version: value.version as i64,
        }
    }
}

impl From<MongoGameDocument> for GameEntity {
    fn from(value: MongoGameDocument) -> Self {
        Self {
            id: from_bson_id(value.id),
            name: value.name,
            seconds: value.seconds,
            question_count: value.question_count,
            status: value.status,
            created_at: value.created_at.to_system_time(),
            chapters: value.chapters,
            current_game_question_id: value.current_game_question_id.map(from_bson_id),
            version: value.version as u64,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MongoTeamDocument {
    #[serde(rename = "_id")]
    id: bson::Uuid,
    game_id: bson::Uuid,
    name: String,
}

impl From<TeamEntity> for MongoTeamDocument {
    fn from(value: TeamEntity) -> Self {
        Self {
            id: bson_id(value.id),
            game_id: bson_id(value.game_id),
            name: value.name,
        }
    }
}

impl From<MongoTeamDocument> for TeamEntity {
    fn from(value: MongoTeamDocument) -> Self {
        Self {
            id: from_bson_id(value.id),
            game_id: from_bson_id(value.game_id),
            name: value.name,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MongoGameQuestionDocument {
    #[serde(rename = "_id")]
    id: bson::Uuid,
    game_id: bson::Uuid,
    question_id: bson::Uuid,
    position: u32,
}

impl From<GameQuestionEntity> for MongoGameQuestionDocument {
    fn from(value: GameQuestionEntity) -> Self {
        Self {
            id: bson_id(value.id),
            game_id: bson_id(value.game_id),
            question_id: bson_id(value.question_id),
            position: value.position,
        }
    }
}

impl From<MongoGameQuestionDocument> for GameQuestionEntity {
    fn from(value: MongoGameQuestionDocument) -> Self {
        Self {
            id: from_bson_id(value.id),
            game_id: from_bson_id(value.game_id),
            question_id: from_bson_id(value.question_id),
            position: value.position,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MongoTeamAnswerDocument {
    #[serde(rename = "_id")]
    id: bson::Uuid,
    game_id: bson::Uuid,
    team_id: bson::Uuid,
    answer_id: bson::Uuid,
    created_at: DateTime,
}

impl From<TeamAnswerEntity> for MongoTeamAnswerDocument {
    fn from(value: TeamAnswerEntity) -> Self {
        Self {
            id: bson_id(value.id),
            game_id: bson_id(value.game_id),
            team_id: bson_id(value.team_id),
            answer_id: bson_id(value.answer_id),
            created_at: DateTime::from_system_time(value.created_at),
        }
    }
}

impl From<MongoTeamAnswerDocument> for TeamAnswerEntity {
    fn from(value: MongoTeamAnswerDocument) -> Self {
        Self {
            id: from_bson_id(value.id),
            game_id: from_bson_id(value.game_id),
            team_id: from_bson_id(value.team_id),
            answer_id: from_bson_id(value.answer_id),
            created_at: value.created_at.to_system_time(),
        }
    }
}

/// Answers are embedded in their question; the owning id is restored on load.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MongoAnswerDocument {
    id: bson::Uuid,
    text: String,
    correct: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MongoQuestionDocument {
    #[serde(rename = "_id")]
    id: bson::Uuid,
    book: String,
    chapter: String,
    verses: String,
    text: String,
    answers: Vec<MongoAnswerDocument>,
}

impl From<QuestionEntity> for MongoQuestionDocument {
    fn from(value: QuestionEntity) -> Self {
        Self {
            id: bson_id(value.id),
            book: value.book,
            chapter: value.chapter,
            verses: value.verses,
            text: value.text,
            answers: value
                .answers
                .into_iter()
                .map(|answer| MongoAnswerDocument {
                    id: bson_id(answer.id),
                    text: answer.text,
                    correct: answer.correct,
                })
                .collect(),
        }
    }
}

impl From<MongoQuestionDocument> for QuestionEntity {
    fn from(value: MongoQuestionDocument) -> Self {
        let question_id = from_bson_id(value.id);
        Self {
            id: question_id,
            book: value.book,
            chapter: value.chapter,
            verses: value.verses,
            text: value.text,
            answers: value
                .answers
                .into_iter()
                .map(|answer| AnswerEntity {
                    id: from_bson_id(answer.id),
                    question_id,
                    text: answer.text,
                    correct: answer.correct,
                })
                .collect(),
        }
    }
}
