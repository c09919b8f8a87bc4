/// OpenAPI documentation generation.
pub mod documentation;
/// Game lifecycle, answers and reports under per-game serialization.
pub mod engine;
/// Game creation, listing, deletion and teams.
pub mod game_service;
/// Health check service.
pub mod health_service;
/// Post-commit event queue feeding the topic broadcaster.
pub mod live_updates;
/// Question bank authoring.
pub mod question_service;
/// Score computation over recorded answers.
pub mod scoring;
/// Server-Sent Events streaming of topic subscriptions.
pub mod sse_service;
/// Storage connection supervisor with degraded mode handling.
pub mod storage_supervisor;
/// WebSocket topic subscriptions.
pub mod websocket_service;
