use axum::Router;

use crate::state::SharedState;

pub mod docs;
pub mod games;
pub mod health;
pub mod questions;
pub mod sse;
pub mod websocket;

/// Compose all route trees, wiring in shared state and documentation routes.
pub fn router(state: SharedState) -> Router<()> {
    let api_router = health::router()
        .merge(games::router())
        .merge(questions::router())
        .merge(sse::router())
        .merge(websocket::router());

    api_router.merge(docs::router()).with_state(state)
}
