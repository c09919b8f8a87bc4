use serde::Serialize;
use utoipa::ToSchema;

/// Storage availability as seen by the service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    /// Storage is installed and answering.
    Ok,
    /// No storage backend is usable; game operations fail with 503.
    Degraded,
}

/// Body of the `/healthcheck` route.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
pub struct HealthResponse {
    /// Current availability.
    pub status: HealthStatus,
}

impl HealthResponse {
    /// Storage is available.
    pub fn ok() -> Self {
        Self {
            status: HealthStatus::Ok,
        }
    }

    /// Running without storage.
    pub fn degraded() -> Self {
        Self {
            status: HealthStatus::Degraded,
        }
    }
}
