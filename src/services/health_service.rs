use tracing::warn;

use crate::{dto::health::HealthResponse, state::SharedState};

/// Report whether the storage backend is usable, logging connectivity issues.
pub async fn health_status(state: &SharedState) -> HealthResponse {
    match state.require_engine().await {
        Ok(engine) => {
            if let Err(err) = engine.sessions().health_check().await {
                warn!(error = %err, "storage health check failed");
            }
        }
        Err(_) => warn!("storage unavailable (degraded mode)"),
    }

    if state.is_degraded() {
        HealthResponse::degraded()
    } else {
        HealthResponse::ok()
    }
}
