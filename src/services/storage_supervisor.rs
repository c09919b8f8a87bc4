use std::{future::Future, sync::Arc, time::Duration};

use tokio::time::sleep;
use tracing::{info, warn};

use crate::{
    dao::{
        session_store::{SessionStore, StoreHandles},
        storage::StorageError,
    },
    state::SharedState,
};

const INITIAL_DELAY: Duration = Duration::from_millis(1_000);
const MAX_DELAY: Duration = Duration::from_secs(10);
const HEALTH_POLL_INTERVAL: Duration = Duration::from_secs(5);
const MAX_RECONNECT_ATTEMPTS: u32 = 3;

/// Connect to the storage backend, install the engine, then watch the backend's health.
///
/// The shared state stays degraded while no connection exists or while the
/// backend fails its health checks.
pub async fn run<F, Fut>(state: SharedState, mut connect: F)
where
    F: FnMut() -> Fut + Send + 'static,
    Fut: Future<Output = Result<StoreHandles, StorageError>> + Send,
{
    let mut delay = INITIAL_DELAY;

    loop {
        match connect().await {
            Ok(stores) => {
                let sessions = stores.sessions.clone();
                state.install_stores(stores).await;
                info!("storage connection established; leaving degraded mode");
                delay = INITIAL_DELAY;

                loop {
                    if sessions.health_check().await.is_ok() {
                        if state.is_degraded() {
                            info!("storage healthy again; leaving degraded mode");
                            state.update_degraded(false);
                        }
                        sleep(HEALTH_POLL_INTERVAL).await;
                        continue;
                    }

                    if reconnect(&state, &sessions).await {
                        state.update_degraded(false);
                        sleep(HEALTH_POLL_INTERVAL).await;
                    } else {
                        warn!("exhausted storage reconnect attempts; staying in degraded mode");
                        break;
                    }
                }

                state.clear_engine().await;
                sleep(delay).await;
                delay = (delay * 2).min(MAX_DELAY);
            }
            Err(err) => {
                warn!(error = %err, "storage connection attempt failed");
                sleep(delay).await;
                delay = (delay * 2).min(MAX_DELAY);
            }
        }
    }
}

async fn reconnect(state: &SharedState, sessions: &Arc<dyn SessionStore>) -> bool {
    let mut reconnect_delay = INITIAL_DELAY;

    for attempt in 0..MAX_RECONNECT_ATTEMPTS {
        match sessions.try_reconnect().await {
            Ok(()) => {
                info!(attempt, "storage reconnection succeeded after health check failure");
                return true;
            }
            Err(err) => {
                if attempt == 0 {
                    warn!(
                        attempt, error = %err,
                        "storage reconnect first attempt failed; entering degraded mode"
                    );
                    state.update_degraded(true);
                } else {
                    warn!(attempt, error = %err, "storage reconnect attempt failed");
                }
                sleep(reconnect_delay).await;
                reconnect_delay = (reconnect_delay * 2).min(MAX_DELAY);
            }
        }
    }
    false
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use super::*;
    use crate::{config::AppConfig, dao::session_store::memory::MemoryStore, state::AppState};

    #[tokio::test(start_paused = true)]
    async fn retries_until_connected_then_installs_engine() {
        let state = AppState::new(AppConfig::default());
        let attempts = Arc::new(AtomicU32::new(0));
        let counter = attempts.clone();

        let supervisor = tokio::spawn(run(state.clone(), move || {
            let counter = counter.clone();
            async move {
                if counter.fetch_add(1, Ordering::SeqCst) < 2 {
                    Err(StorageError::Timeout)
                } else {
                    Ok(StoreHandles::from_store(MemoryStore::new()))
                }
            }
        }));

        let mut watcher = state.degraded_watcher();
        while *watcher.borrow_and_update() {
            watcher.changed().await.unwrap();
        }

        assert_eq!(attempts.load(Ordering::SeqCst), 3);
        assert!(state.require_engine().await.is_ok());
        supervisor.abort();
    }
}
