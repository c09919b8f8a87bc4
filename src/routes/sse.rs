use std::convert::Infallible;

use axum::{
    Router,
    extract::{Path, State},
    response::sse::{Event, Sse},
    routing::get,
};
use futures::Stream;
use tracing::info;
use uuid::Uuid;

use crate::{
    error::AppError,
    services::{live_updates, sse_service},
    state::{SharedState, Topic},
};

#[utoipa::path(
    get,
    path = "/sse/games",
    tag = "live",
    responses(
        (status = 200, description = "Games list stream", content_type = "text/event-stream", body = String),
        (status = 503, description = "Storage unavailable")
    )
)]
/// Stream the list of recent games, starting with its current snapshot.
pub async fn games_stream(
    State(state): State<SharedState>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, AppError> {
    open_stream(state, Topic::GamesList).await
}

#[utoipa::path(
    get,
    path = "/sse/games/{id}",
    tag = "live",
    params(("id" = Uuid, Path, description = "Game identifier")),
    responses(
        (status = 200, description = "Current question and team updates of one game", content_type = "text/event-stream", body = String),
        (status = 404, description = "Unknown game")
    )
)]
/// Stream the current question and team updates of one game.
pub async fn game_stream(
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, AppError> {
    open_stream(state, Topic::Game(id)).await
}

async fn open_stream(
    state: SharedState,
    topic: Topic,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, AppError> {
    let subscription = live_updates::subscribe(&state, topic).await?;
    info!(%topic, "new SSE connection");
    Ok(sse_service::to_sse_stream(state, subscription))
}

/// Configure the SSE endpoints.
pub fn router() -> Router<SharedState> {
    Router::<SharedState>::new()
        .route("/sse/games", get(games_stream))
        .route("/sse/games/{id}", get(game_stream))
}
