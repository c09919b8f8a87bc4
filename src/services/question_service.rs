use tracing::info;
use uuid::Uuid;

use crate::{
    dao::models::QuestionEntity,
    dto::question::{AnswerSummary, CreateAnswerRequest, CreateQuestionRequest, QuestionSummary},
    error::ServiceError,
    services::engine::GameEngine,
};

/// Every question of the bank.
pub async fn list_questions(engine: &GameEngine) -> Result<Vec<QuestionSummary>, ServiceError> {
    let questions = engine.questions().list_questions().await?;
    Ok(questions.into_iter().map(Into::into).collect())
}

/// Author a question with its answer options.
pub async fn create_question(
    engine: &GameEngine,
    request: CreateQuestionRequest,
) -> Result<QuestionSummary, ServiceError> {
    let question: QuestionEntity = request.into();
    engine.questions().save_question(question.clone()).await?;
    info!(
        question_id = %question.id,
        book = %question.book,
        chapter = %question.chapter,
        answers = question.answers.len(),
        "question created"
    );
    Ok(question.into())
}

pub async fn get_question(
    engine: &GameEngine,
    question_id: Uuid,
) -> Result<QuestionSummary, ServiceError> {
    engine
        .questions()
        .find_question(question_id)
        .await?
        .map(Into::into)
        .ok_or_else(|| question_not_found(question_id))
}

pub async fn delete_question(engine: &GameEngine, question_id: Uuid) -> Result<(), ServiceError> {
    if !engine.questions().delete_question(question_id).await? {
        return Err(question_not_found(question_id));
    }
    info!(%question_id, "question deleted");
    Ok(())
}

/// Attach a new answer option to a question.
pub async fn add_answer(
    engine: &GameEngine,
    question_id: Uuid,
    request: CreateAnswerRequest,
) -> Result<AnswerSummary, ServiceError> {
    let answer = request.into_entity(question_id);
    if !engine.questions().save_answer(answer.clone()).await? {
        return Err(question_not_found(question_id));
    }
    info!(%question_id, answer_id = %answer.id, "answer added");
    Ok(answer.into())
}

pub async fn delete_answer(
    engine: &GameEngine,
    question_id: Uuid,
    answer_id: Uuid,
) -> Result<(), ServiceError> {
    if !engine
        .questions()
        .delete_answer(question_id, answer_id)
        .await?
    {
        return Err(ServiceError::NotFound(format!(
            "answer `{answer_id}` not found on question `{question_id}`"
        )));
    }
    info!(%question_id, %answer_id, "answer deleted");
    Ok(())
}

fn question_not_found(question_id: Uuid) -> ServiceError {
    ServiceError::NotFound(format!("question `{question_id}` not found"))
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use tokio::sync::mpsc;

    use super::*;
    use crate::dao::session_store::{StoreHandles, memory::MemoryStore};

    fn engine() -> GameEngine {
        let (tx, _rx) = mpsc::unbounded_channel();
        GameEngine::new(
            StoreHandles::from_store(MemoryStore::new()),
            tx,
            Duration::from_secs(5),
        )
    }

    fn request() -> CreateQuestionRequest {
        CreateQuestionRequest {
            book: "John".into(),
            chapter: "3".into(),
            verses: "16".into(),
            text: "Who so loved the world?".into(),
            answers: vec![
                CreateAnswerRequest {
                    text: "God".into(),
                    correct: true,
                },
                CreateAnswerRequest {
                    text: "Nicodemus".into(),
                    correct: false,
                },
            ],
        }
    }

    #[tokio::test]
    async fn answers_belong_to_their_question() {
        let engine = engine();
        let created = create_question(&engine, request()).await.unwrap();
        assert!(
            created
                .answers
                .iter()
                .all(|answer| answer.question_id == created.id)
        );

        let added = add_answer(
            &engine,
            created.id,
            CreateAnswerRequest {
                text: "The Pharisees".into(),
                correct: false,
            },
        )
        .await
        .unwrap();
        let fetched = get_question(&engine, created.id).await.unwrap();
        assert_eq!(fetched.answers.len(), 3);

        delete_answer(&engine, created.id, added.id).await.unwrap();
        let fetched = get_question(&engine, created.id).await.unwrap();
        assert_eq!(fetched.answers.len(), 2);
    }

    #[tokio::test]
    async fn missing_question_is_not_found() {
        let engine = engine();
        let missing = Uuid::new_v4();
        assert!(matches!(
            get_question(&engine, missing).await,
            Err(ServiceError::NotFound(_))
        ));
        assert!(matches!(
            delete_question(&engine, missing).await,
            Err(ServiceError::NotFound(_))
        ));
        let orphan = add_answer(
            &engine,
            missing,
            CreateAnswerRequest {
                text: "Nobody".into(),
                correct: false,
            },
        )
        .await;
        assert!(matches!(orphan, Err(ServiceError::NotFound(_))));
    }
}
