use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use crate::dao::models::{AnswerEntity, QuestionEntity};

/// Payload used to author a question with its answer options.
#[derive(Debug, Deserialize, ToSchema, Validate)]
pub struct CreateQuestionRequest {
    #[validate(length(min = 1, message = "book must not be empty"))]
    pub book: String,
    #[validate(length(min = 1, message = "chapter must not be empty"))]
    pub chapter: String,
    #[serde(default)]
    pub verses: String,
    #[validate(length(min = 1, message = "question text must not be empty"))]
    pub text: String,
    #[serde(default)]
    #[validate(nested)]
    pub answers: Vec<CreateAnswerRequest>,
}

/// Answer option supplied when authoring a question.
#[derive(Debug, Deserialize, ToSchema, Validate)]
pub struct CreateAnswerRequest {
    #[validate(length(min = 1, message = "answer text must not be empty"))]
    pub text: String,
    #[serde(default)]
    pub correct: bool,
}

impl CreateAnswerRequest {
    pub fn into_entity(self, question_id: Uuid) -> AnswerEntity {
        AnswerEntity {
            id: Uuid::new_v4(),
            question_id,
            text: self.text,
            correct: self.correct,
        }
    }
}

impl From<CreateQuestionRequest> for QuestionEntity {
    fn from(value: CreateQuestionRequest) -> Self {
        let id = Uuid::new_v4();
        Self {
            id,
            book: value.book,
            chapter: value.chapter,
            verses: value.verses,
            text: value.text,
            answers: value
                .answers
                .into_iter()
                .map(|answer| answer.into_entity(id))
                .collect(),
        }
    }
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct AnswerSummary {
    pub id: Uuid,
    pub question_id: Uuid,
    pub text: String,
    pub correct: bool,
}

impl From<AnswerEntity> for AnswerSummary {
    fn from(value: AnswerEntity) -> Self {
        Self {
            id: value.id,
            question_id: value.question_id,
            text: value.text,
            correct: value.correct,
        }
    }
}

/// Question as exposed to the host, including correct flags.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct QuestionSummary {
    pub id: Uuid,
    pub book: String,
    pub chapter: String,
    pub verses: String,
    pub text: String,
    pub answers: Vec<AnswerSummary>,
}

impl From<QuestionEntity> for QuestionSummary {
    fn from(value: QuestionEntity) -> Self {
        Self {
            id: value.id,
            book: value.book,
            chapter: value.chapter,
            verses: value.verses,
            text: value.text,
            answers: value.answers.into_iter().map(Into::into).collect(),
        }
    }
}
