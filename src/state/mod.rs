pub mod broadcaster;
pub mod lifecycle;

use std::sync::Arc;

use tokio::sync::{Mutex, RwLock, mpsc, watch};
use tracing::debug;

use crate::{
    config::AppConfig,
    dao::session_store::StoreHandles,
    error::ServiceError,
    services::{
        engine::{GameEngine, GameGates},
        live_updates::LiveEvent,
    },
};

pub use self::broadcaster::{Broadcaster, Subscription, SubscriptionHandle, Topic};

pub type SharedState = Arc<AppState>;

/// Central application state: the engine once storage is available, plus the live-update hub.
pub struct AppState {
    config: AppConfig,
    engine: RwLock<Option<Arc<GameEngine>>>,
    gates: GameGates,
    broadcaster: Broadcaster,
    live_tx: mpsc::UnboundedSender<LiveEvent>,
    live_rx: Mutex<Option<mpsc::UnboundedReceiver<LiveEvent>>>,
    degraded: watch::Sender<bool>,
}

impl AppState {
    /// Construct a new [`AppState`] wrapped in an [`Arc`] so it can be cloned cheaply.
    ///
    /// The application starts in degraded mode until a storage backend is installed.
    pub fn new(config: AppConfig) -> SharedState {
        let (degraded_tx, _rx) = watch::channel(true);
        let (live_tx, live_rx) = mpsc::unbounded_channel();
        Arc::new(Self {
            config,
            engine: RwLock::new(None),
            gates: GameGates::default(),
            broadcaster: Broadcaster::new(),
            live_tx,
            live_rx: Mutex::new(Some(live_rx)),
            degraded: degraded_tx,
        })
    }

    /// Runtime configuration.
    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// Topic hub used by the WebSocket and SSE transports.
    pub fn broadcaster(&self) -> &Broadcaster {
        &self.broadcaster
    }

    /// Hand the live-event queue over to its worker. Returns `None` once taken.
    pub async fn take_live_receiver(&self) -> Option<mpsc::UnboundedReceiver<LiveEvent>> {
        self.live_rx.lock().await.take()
    }

    /// Queue work for the live update worker.
    pub fn queue_live(&self, event: LiveEvent) {
        if self.live_tx.send(event).is_err() {
            debug!(?event, "live update worker gone; dropping event");
        }
    }

    /// Build an engine over the given stores and leave degraded mode.
    ///
    /// Game gates outlive the engine, so operations still running on a
    /// replaced engine keep excluding those of its successor.
    pub async fn install_stores(&self, stores: StoreHandles) {
        let engine = GameEngine::new(
            stores,
            self.live_tx.clone(),
            self.config.transaction_timeout,
        )
        .with_gates(self.gates.clone());
        {
            let mut guard = self.engine.write().await;
            *guard = Some(Arc::new(engine));
        }
        self.update_degraded(false);
    }

    /// Drop the current engine and enter degraded mode.
    pub async fn clear_engine(&self) {
        {
            let mut guard = self.engine.write().await;
            guard.take();
        }
        self.update_degraded(true);
    }

    /// Obtain the engine, if a storage backend is installed.
    pub async fn engine(&self) -> Option<Arc<GameEngine>> {
        let guard = self.engine.read().await;
        guard.as_ref().cloned()
    }

    /// Obtain the engine or fail with [`ServiceError::Degraded`].
    pub async fn require_engine(&self) -> Result<Arc<GameEngine>, ServiceError> {
        self.engine().await.ok_or(ServiceError::Degraded)
    }

    /// Current degraded flag.
    pub fn is_degraded(&self) -> bool {
        *self.degraded.borrow()
    }

    /// Subscribe to degraded mode updates.
    pub fn degraded_watcher(&self) -> watch::Receiver<bool> {
        self.degraded.subscribe()
    }

    /// Update and broadcast the degraded flag when the value changes.
    pub fn update_degraded(&self, value: bool) {
        self.degraded.send_if_modified(|current| {
            if *current == value {
                return false;
            }
            *current = value;
            true
        });
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use tokio::sync::oneshot;
    use uuid::Uuid;

    use super::*;
    use crate::{
        dao::{session_store::memory::MemoryStore, storage::StorageError},
        services::engine::Planned,
    };

    #[tokio::test]
    async fn installing_stores_leaves_degraded_mode() {
        let state = AppState::new(AppConfig::default());
        let mut watcher = state.degraded_watcher();
        assert!(state.is_degraded());
        assert!(matches!(
            state.require_engine().await,
            Err(ServiceError::Degraded)
        ));

        state
            .install_stores(StoreHandles::from_store(MemoryStore::new()))
            .await;
        assert!(!state.is_degraded());
        assert!(watcher.has_changed().unwrap());
        assert!(!*watcher.borrow_and_update());
        assert!(state.require_engine().await.is_ok());

        state.clear_engine().await;
        assert!(state.is_degraded());
        assert!(state.engine().await.is_none());
    }

    #[tokio::test]
    async fn live_receiver_is_handed_out_once() {
        let state = AppState::new(AppConfig::default());
        assert!(state.take_live_receiver().await.is_some());
        assert!(state.take_live_receiver().await.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn reinstalled_engine_shares_game_gates() {
        let config = AppConfig {
            transaction_timeout: Duration::from_millis(50),
            ..AppConfig::default()
        };
        let state = AppState::new(config);
        let store = MemoryStore::new();
        state
            .install_stores(StoreHandles::from_store(store.clone()))
            .await;
        let previous = state.require_engine().await.unwrap();
        let game_id = Uuid::new_v4();

        let (held_tx, held_rx) = oneshot::channel();
        let (release_tx, release_rx) = oneshot::channel::<()>();
        let holder = tokio::spawn(async move {
            previous
                .run_gated(game_id, || async move {
                    let _ = held_tx.send(());
                    Ok(Planned::Commit(Box::pin(async move {
                        let _ = release_rx.await;
                        Ok::<_, ServiceError>(())
                    })))
                })
                .await
        });
        held_rx.await.unwrap();

        state.install_stores(StoreHandles::from_store(store)).await;
        let current = state.require_engine().await.unwrap();
        let blocked = current
            .run_gated(game_id, || async { Ok(Planned::Done(())) })
            .await;
        assert!(matches!(
            blocked,
            Err(ServiceError::Unavailable(StorageError::Timeout))
        ));

        release_tx.send(()).unwrap();
        holder.await.unwrap().unwrap();
        current
            .run_gated(game_id, || async { Ok(Planned::Done(())) })
            .await
            .unwrap();
    }
}
