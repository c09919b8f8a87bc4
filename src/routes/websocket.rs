use axum::{
    Router,
    extract::{Path, State, WebSocketUpgrade},
    response::IntoResponse,
    routing::get,
};
use uuid::Uuid;

use crate::{
    services::websocket_service,
    state::{SharedState, Topic},
};

#[utoipa::path(
    get,
    path = "/ws/games",
    tag = "live",
    responses((status = 101, description = "Switching protocols to WebSocket"))
)]
/// Subscribe to the list of recent games over a WebSocket.
pub async fn games_socket(
    State(state): State<SharedState>,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| websocket_service::handle_socket(state, socket, Topic::GamesList))
}

#[utoipa::path(
    get,
    path = "/ws/games/{id}",
    tag = "live",
    params(("id" = Uuid, Path, description = "Game identifier")),
    responses((status = 101, description = "Switching protocols to WebSocket"))
)]
/// Subscribe to one game's current question and team updates over a WebSocket.
pub async fn game_socket(
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| websocket_service::handle_socket(state, socket, Topic::Game(id)))
}

/// Configure the WebSocket endpoints.
pub fn router() -> Router<SharedState> {
    Router::<SharedState>::new()
        .route("/ws/games", get(games_socket))
        .route("/ws/games/{id}", get(game_socket))
}
