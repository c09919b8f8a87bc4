use axum::{
    Json, Router,
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
};
use axum_valid::Valid;
use uuid::Uuid;

use crate::{
    dto::game::{
        CreateGameRequest, CreateTeamRequest, FinishedGameReport, GameDetails, GameSummary,
        QuestionView, SubmitAnswerResponse, TeamReport, TeamSummary,
    },
    error::AppError,
    services::game_service,
    state::SharedState,
};

/// Game administration, lifecycle and team answer endpoints.
pub fn router() -> Router<SharedState> {
    Router::new()
        .route("/api/v1/games", get(list_games).post(create_game))
        .route("/api/v1/games/{id}", get(get_game).delete(delete_game))
        .route("/api/v1/games/{id}/teams", post(add_team))
        .route("/api/v1/games/{id}/teams/{team_id}", get(team_report))
        .route("/api/v1/games/{id}/home", get(home_team))
        .route(
            "/api/v1/games/{id}/teams/{team_id}/answers/{answer_id}",
            post(submit_answer).delete(retract_answer),
        )
        .route("/api/v1/games/{id}/start", post(start_game))
        .route("/api/v1/games/{id}/next", post(next_question))
        .route("/api/v1/games/{id}/previous", post(previous_question))
        .route("/api/v1/games/{id}/finish", post(finish_game))
        .route("/api/v1/games/{id}/current", get(current_question))
        .route("/api/v1/games/{id}/finished", get(finished_report))
}

/// List the most recently created games, newest first.
#[utoipa::path(
    get,
    path = "/api/v1/games",
    tag = "games",
    responses((status = 200, description = "Recent games", body = [GameSummary]))
)]
pub async fn list_games(
    State(state): State<SharedState>,
) -> Result<Json<Vec<GameSummary>>, AppError> {
    let engine = state.require_engine().await?;
    let limit = state.config().games_list_limit;
    Ok(Json(game_service::list_games(&engine, limit).await?))
}

/// Create an open game together with its home team.
#[utoipa::path(
    post,
    path = "/api/v1/games",
    tag = "games",
    request_body = CreateGameRequest,
    responses(
        (status = 201, description = "Game created", body = GameDetails),
        (status = 400, description = "Invalid game definition")
    )
)]
pub async fn create_game(
    State(state): State<SharedState>,
    Valid(Json(payload)): Valid<Json<CreateGameRequest>>,
) -> Result<(StatusCode, Json<GameDetails>), AppError> {
    let engine = state.require_engine().await?;
    let details = game_service::create_game(&engine, payload).await?;
    Ok((StatusCode::CREATED, Json(details)))
}

#[utoipa::path(
    get,
    path = "/api/v1/games/{id}",
    tag = "games",
    params(("id" = Uuid, Path, description = "Game identifier")),
    responses(
        (status = 200, description = "Game with its teams", body = GameDetails),
        (status = 404, description = "Unknown game")
    )
)]
pub async fn get_game(
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
) -> Result<Json<GameDetails>, AppError> {
    let engine = state.require_engine().await?;
    Ok(Json(game_service::get_game(&engine, id).await?))
}

/// Delete a game with its teams, play order and answers.
#[utoipa::path(
    delete,
    path = "/api/v1/games/{id}",
    tag = "games",
    params(("id" = Uuid, Path, description = "Game identifier")),
    responses(
        (status = 204, description = "Game deleted"),
        (status = 404, description = "Unknown game")
    )
)]
pub async fn delete_game(
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    let engine = state.require_engine().await?;
    game_service::delete_game(&engine, id).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[utoipa::path(
    post,
    path = "/api/v1/games/{id}/teams",
    tag = "teams",
    params(("id" = Uuid, Path, description = "Game identifier")),
    request_body = CreateTeamRequest,
    responses(
        (status = 201, description = "Team created", body = TeamSummary),
        (status = 404, description = "Unknown game")
    )
)]
pub async fn add_team(
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
    Valid(Json(payload)): Valid<Json<CreateTeamRequest>>,
) -> Result<(StatusCode, Json<TeamSummary>), AppError> {
    let engine = state.require_engine().await?;
    let team = game_service::add_team(&engine, id, payload).await?;
    Ok((StatusCode::CREATED, Json(team)))
}

/// Answers recorded for a team with its running score.
#[utoipa::path(
    get,
    path = "/api/v1/games/{id}/teams/{team_id}",
    tag = "teams",
    params(
        ("id" = Uuid, Path, description = "Game identifier"),
        ("team_id" = Uuid, Path, description = "Team identifier")
    ),
    responses(
        (status = 200, description = "Team report", body = TeamReport),
        (status = 404, description = "Unknown game or team")
    )
)]
pub async fn team_report(
    State(state): State<SharedState>,
    Path((id, team_id)): Path<(Uuid, Uuid)>,
) -> Result<Json<TeamReport>, AppError> {
    let engine = state.require_engine().await?;
    Ok(Json(engine.team_report(id, team_id).await?))
}

#[utoipa::path(
    get,
    path = "/api/v1/games/{id}/home",
    tag = "teams",
    params(("id" = Uuid, Path, description = "Game identifier")),
    responses(
        (status = 200, description = "Home team report", body = TeamReport),
        (status = 404, description = "Unknown game")
    )
)]
pub async fn home_team(
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
) -> Result<Json<TeamReport>, AppError> {
    let engine = state.require_engine().await?;
    Ok(Json(engine.home_team(id).await?))
}

/// Record that a team picked an answer. Repeating the call returns the same record.
#[utoipa::path(
    post,
    path = "/api/v1/games/{id}/teams/{team_id}/answers/{answer_id}",
    tag = "teams",
    params(
        ("id" = Uuid, Path, description = "Game identifier"),
        ("team_id" = Uuid, Path, description = "Team identifier"),
        ("answer_id" = Uuid, Path, description = "Answer option identifier")
    ),
    responses(
        (status = 200, description = "Answer recorded", body = SubmitAnswerResponse),
        (status = 404, description = "Unknown game, team or answer"),
        (status = 409, description = "Game is finished")
    )
)]
pub async fn submit_answer(
    State(state): State<SharedState>,
    Path((id, team_id, answer_id)): Path<(Uuid, Uuid, Uuid)>,
) -> Result<Json<SubmitAnswerResponse>, AppError> {
    let engine = state.require_engine().await?;
    let team_answer_id = engine.submit_team_answer(id, team_id, answer_id).await?;
    Ok(Json(SubmitAnswerResponse { team_answer_id }))
}

#[utoipa::path(
    delete,
    path = "/api/v1/games/{id}/teams/{team_id}/answers/{answer_id}",
    tag = "teams",
    params(
        ("id" = Uuid, Path, description = "Game identifier"),
        ("team_id" = Uuid, Path, description = "Team identifier"),
        ("answer_id" = Uuid, Path, description = "Answer option identifier")
    ),
    responses(
        (status = 204, description = "Answer retracted"),
        (status = 404, description = "Unknown game, team or answer"),
        (status = 409, description = "Game is finished")
    )
)]
pub async fn retract_answer(
    State(state): State<SharedState>,
    Path((id, team_id, answer_id)): Path<(Uuid, Uuid, Uuid)>,
) -> Result<StatusCode, AppError> {
    let engine = state.require_engine().await?;
    engine.retract_team_answer(id, team_id, answer_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Draw the play order and start the game.
#[utoipa::path(
    post,
    path = "/api/v1/games/{id}/start",
    tag = "lifecycle",
    params(("id" = Uuid, Path, description = "Game identifier")),
    responses(
        (status = 200, description = "Game started", body = GameSummary),
        (status = 409, description = "Game is not open")
    )
)]
pub async fn start_game(
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
) -> Result<Json<GameSummary>, AppError> {
    let engine = state.require_engine().await?;
    Ok(Json(engine.start_game(id).await?.into()))
}

/// Move to the next question; past the last one the game finishes.
#[utoipa::path(
    post,
    path = "/api/v1/games/{id}/next",
    tag = "lifecycle",
    params(("id" = Uuid, Path, description = "Game identifier")),
    responses(
        (status = 200, description = "Game advanced", body = GameSummary),
        (status = 409, description = "Game is not started")
    )
)]
pub async fn next_question(
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
) -> Result<Json<GameSummary>, AppError> {
    let engine = state.require_engine().await?;
    Ok(Json(engine.next_question(id).await?.into()))
}

#[utoipa::path(
    post,
    path = "/api/v1/games/{id}/previous",
    tag = "lifecycle",
    params(("id" = Uuid, Path, description = "Game identifier")),
    responses(
        (status = 200, description = "Game moved back, or unchanged at the first question", body = GameSummary),
        (status = 409, description = "Game is not started")
    )
)]
pub async fn previous_question(
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
) -> Result<Json<GameSummary>, AppError> {
    let engine = state.require_engine().await?;
    Ok(Json(engine.previous_question(id).await?.into()))
}

#[utoipa::path(
    post,
    path = "/api/v1/games/{id}/finish",
    tag = "lifecycle",
    params(("id" = Uuid, Path, description = "Game identifier")),
    responses(
        (status = 200, description = "Game finished", body = GameSummary),
        (status = 409, description = "Game is not started")
    )
)]
pub async fn finish_game(
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
) -> Result<Json<GameSummary>, AppError> {
    let engine = state.require_engine().await?;
    Ok(Json(engine.finish_game(id).await?.into()))
}

/// What players should currently see.
#[utoipa::path(
    get,
    path = "/api/v1/games/{id}/current",
    tag = "lifecycle",
    params(("id" = Uuid, Path, description = "Game identifier")),
    responses(
        (status = 200, description = "Current question, waiting or finished", body = QuestionView),
        (status = 404, description = "Unknown game")
    )
)]
pub async fn current_question(
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
) -> Result<Json<QuestionView>, AppError> {
    let engine = state.require_engine().await?;
    Ok(Json(engine.current_question(id).await?))
}

#[utoipa::path(
    get,
    path = "/api/v1/games/{id}/finished",
    tag = "lifecycle",
    params(("id" = Uuid, Path, description = "Game identifier")),
    responses(
        (status = 200, description = "Every team with answers and score", body = FinishedGameReport),
        (status = 404, description = "Unknown game")
    )
)]
pub async fn finished_report(
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
) -> Result<Json<FinishedGameReport>, AppError> {
    let engine = state.require_engine().await?;
    Ok(Json(engine.finished_game_report(id).await?))
}
