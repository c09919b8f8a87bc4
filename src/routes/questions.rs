use axum::{
    Json, Router,
    extract::{Path, State},
    http::StatusCode,
    routing::{delete, get, post},
};
use axum_valid::Valid;
use uuid::Uuid;

use crate::{
    dto::question::{AnswerSummary, CreateAnswerRequest, CreateQuestionRequest, QuestionSummary},
    error::AppError,
    services::question_service,
    state::SharedState,
};

/// Question bank authoring endpoints.
pub fn router() -> Router<SharedState> {
    Router::new()
        .route("/api/v1/questions", get(list_questions).post(create_question))
        .route(
            "/api/v1/questions/{id}",
            get(get_question).delete(delete_question),
        )
        .route("/api/v1/questions/{id}/answers", post(add_answer))
        .route(
            "/api/v1/questions/{id}/answers/{answer_id}",
            delete(delete_answer),
        )
}

#[utoipa::path(
    get,
    path = "/api/v1/questions",
    tag = "questions",
    responses((status = 200, description = "Every question of the bank", body = [QuestionSummary]))
)]
pub async fn list_questions(
    State(state): State<SharedState>,
) -> Result<Json<Vec<QuestionSummary>>, AppError> {
    let engine = state.require_engine().await?;
    Ok(Json(question_service::list_questions(&engine).await?))
}

/// Author a question with its answer options.
#[utoipa::path(
    post,
    path = "/api/v1/questions",
    tag = "questions",
    request_body = CreateQuestionRequest,
    responses(
        (status = 201, description = "Question created", body = QuestionSummary),
        (status = 400, description = "Invalid question")
    )
)]
pub async fn create_question(
    State(state): State<SharedState>,
    Valid(Json(payload)): Valid<Json<CreateQuestionRequest>>,
) -> Result<(StatusCode, Json<QuestionSummary>), AppError> {
    let engine = state.require_engine().await?;
    let question = question_service::create_question(&engine, payload).await?;
    Ok((StatusCode::CREATED, Json(question)))
}

#[utoipa::path(
    get,
    path = "/api/v1/questions/{id}",
    tag = "questions",
    params(("id" = Uuid, Path, description = "Question identifier")),
    responses(
        (status = 200, description = "Question with its answers", body = QuestionSummary),
        (status = 404, description = "Unknown question")
    )
)]
pub async fn get_question(
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
) -> Result<Json<QuestionSummary>, AppError> {
    let engine = state.require_engine().await?;
    Ok(Json(question_service::get_question(&engine, id).await?))
}

#[utoipa::path(
    delete,
    path = "/api/v1/questions/{id}",
    tag = "questions",
    params(("id" = Uuid, Path, description = "Question identifier")),
    responses(
        (status = 204, description = "Question deleted"),
        (status = 404, description = "Unknown question")
    )
)]
pub async fn delete_question(
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    let engine = state.require_engine().await?;
    question_service::delete_question(&engine, id).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[utoipa::path(
    post,
    path = "/api/v1/questions/{id}/answers",
    tag = "questions",
    params(("id" = Uuid, Path, description = "Question identifier")),
    request_body = CreateAnswerRequest,
    responses(
        (status = 201, description = "Answer added", body = AnswerSummary),
        (status = 404, description = "Unknown question")
    )
)]
pub async fn add_answer(
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
    Valid(Json(payload)): Valid<Json<CreateAnswerRequest>>,
) -> Result<(StatusCode, Json<AnswerSummary>), AppError> {
    let engine = state.require_engine().await?;
    let answer = question_service::add_answer(&engine, id, payload).await?;
    Ok((StatusCode::CREATED, Json(answer)))
}

#[utoipa::path(
    delete,
    path = "/api/v1/questions/{id}/answers/{answer_id}",
    tag = "questions",
    params(
        ("id" = Uuid, Path, description = "Question identifier"),
        ("answer_id" = Uuid, Path, description = "Answer identifier")
    ),
    responses(
        (status = 204, description = "Answer deleted"),
        (status = 404, description = "Unknown question or answer")
    )
)]
pub async fn delete_answer(
    State(state): State<SharedState>,
    Path((id, answer_id)): Path<(Uuid, Uuid)>,
) -> Result<StatusCode, AppError> {
    let engine = state.require_engine().await?;
    question_service::delete_answer(&engine, id, answer_id).await?;
    Ok(StatusCode::NO_CONTENT)
}
