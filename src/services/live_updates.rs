use serde::Serialize;
use tokio::{sync::mpsc, task::JoinHandle};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::{
    dto::sse::ServerEvent,
    error::ServiceError,
    services::game_service,
    state::{SharedState, Subscription, SubscriptionHandle, Topic},
};

const EVENT_CURRENT_QUESTION: &str = "current_question";
const EVENT_TEAM_UPDATED: &str = "team_updated";
const EVENT_GAMES: &str = "games";

/// Work for the live update worker.
///
/// The engine queues change notifications after each successful commit.
/// Subscriptions and clients queue snapshot requests on the same queue, so a
/// single task computes and publishes every snapshot in queue order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LiveEvent {
    /// Status or current question of a game changed.
    GameChanged(Uuid),
    /// Answers of a team changed, or the team was created.
    TeamChanged {
        /// Game the team plays in.
        game_id: Uuid,
        /// Team whose report changed.
        team_id: Uuid,
    },
    /// A game was created, deleted, or changed status.
    GamesListChanged,
    /// A client asked for a fresh snapshot of a topic.
    Refresh(Topic),
    /// A new subscriber waits for its first snapshot.
    Snapshot(SubscriptionHandle),
}

/// Start the worker that turns queued [`LiveEvent`]s into published snapshots.
pub fn spawn(state: SharedState, receiver: mpsc::UnboundedReceiver<LiveEvent>) -> JoinHandle<()> {
    tokio::spawn(run(state, receiver))
}

async fn run(state: SharedState, mut receiver: mpsc::UnboundedReceiver<LiveEvent>) {
    while let Some(event) = receiver.recv().await {
        match event {
            LiveEvent::GameChanged(game_id) => refresh(&state, Topic::Game(game_id)).await,
            LiveEvent::GamesListChanged => refresh(&state, Topic::GamesList).await,
            LiveEvent::Refresh(topic) => refresh(&state, topic).await,
            LiveEvent::TeamChanged { game_id, team_id } => {
                publish_team(&state, game_id, team_id).await
            }
            LiveEvent::Snapshot(handle) => send_first_snapshot(&state, handle).await,
        }
    }
    info!("live update queue closed");
}

/// Compute the current snapshot of `topic`.
///
/// `Ok(None)` means the payload could not be serialized; the failure is logged.
async fn snapshot(state: &SharedState, topic: Topic) -> Result<Option<ServerEvent>, ServiceError> {
    let engine = state.require_engine().await?;
    let event = match topic {
        Topic::GamesList => {
            let games =
                game_service::list_games(&engine, state.config().games_list_limit).await?;
            to_event(EVENT_GAMES, &games)
        }
        Topic::Game(game_id) => {
            let view = engine.current_question(game_id).await?;
            to_event(EVENT_CURRENT_QUESTION, &view)
        }
    };
    Ok(event)
}

/// Subscribe to `topic` and queue its current snapshot for the new subscriber.
///
/// Fails if storage is unavailable or the game does not exist. The snapshot
/// itself is computed by the worker, after every change queued before it.
pub async fn subscribe(state: &SharedState, topic: Topic) -> Result<Subscription, ServiceError> {
    let engine = state.require_engine().await?;
    if let Topic::Game(game_id) = topic {
        engine.load_game(game_id).await?;
    }

    let subscription = state.broadcaster().subscribe(topic);
    state.queue_live(LiveEvent::Snapshot(subscription.handle));
    Ok(subscription)
}

/// Ask the worker to publish a fresh snapshot of `topic` to every subscriber.
pub fn request_refresh(state: &SharedState, topic: Topic) {
    state.queue_live(LiveEvent::Refresh(topic));
}

async fn refresh(state: &SharedState, topic: Topic) {
    if state.broadcaster().subscriber_count(topic) == 0 {
        debug!(%topic, "no subscribers; skipping refresh");
        return;
    }

    match snapshot(state, topic).await {
        Ok(Some(event)) => {
            let delivered = state.broadcaster().publish(topic, event);
            debug!(%topic, delivered, "published snapshot");
        }
        Ok(None) => {}
        Err(err) => warn!(%topic, error = %err, "failed to compute live snapshot"),
    }
}

async fn send_first_snapshot(state: &SharedState, handle: SubscriptionHandle) {
    let topic = handle.topic;
    match snapshot(state, topic).await {
        Ok(Some(event)) => {
            if !state.broadcaster().publish_to(handle, event) {
                debug!(%topic, subscription = handle.id, "subscriber left before its snapshot");
            }
        }
        Ok(None) => {}
        Err(err) => {
            warn!(%topic, subscription = handle.id, error = %err, "failed to compute first snapshot")
        }
    }
}

async fn publish_team(state: &SharedState, game_id: Uuid, team_id: Uuid) {
    let topic = Topic::Game(game_id);
    if state.broadcaster().subscriber_count(topic) == 0 {
        return;
    }

    let report = match state.require_engine().await {
        Ok(engine) => engine.team_report(game_id, team_id).await,
        Err(err) => Err(err),
    };
    match report {
        Ok(report) => {
            if let Some(event) = to_event(EVENT_TEAM_UPDATED, &report) {
                let delivered = state.broadcaster().publish(topic, event);
                debug!(%topic, %team_id, delivered, "published team update");
            }
        }
        Err(err) => warn!(%game_id, %team_id, error = %err, "failed to build team report"),
    }
}

fn to_event(name: &str, payload: &impl Serialize) -> Option<ServerEvent> {
    match ServerEvent::json(Some(name.to_string()), payload) {
        Ok(event) => Some(event),
        Err(err) => {
            warn!(event = name, error = %err, "failed to serialize live update payload");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use std::{sync::Arc, time::Duration};

    use futures::future::BoxFuture;
    use tokio::time::{sleep, timeout};

    use super::*;
    use crate::{
        config::AppConfig,
        dao::{
            models::{
                AnswerEntity, GameEntity, GameQuestionEntity, QuestionEntity, TeamAnswerEntity,
                TeamEntity,
            },
            session_store::{QuestionBank, SessionStore, StoreHandles, WriteBatch, memory::MemoryStore},
            storage::StorageResult,
        },
        dto::game::{ChapterInput, CreateGameRequest},
        state::AppState,
    };

    async fn running_state() -> SharedState {
        running_state_over(StoreHandles::from_store(MemoryStore::new())).await
    }

    async fn running_state_over(stores: StoreHandles) -> SharedState {
        let state = AppState::new(AppConfig::default());
        state.install_stores(stores).await;
        let receiver = state.take_live_receiver().await.unwrap();
        spawn(state.clone(), receiver);
        state
    }

    async fn next_event(subscription: &mut Subscription) -> ServerEvent {
        timeout(Duration::from_secs(1), subscription.receiver.recv())
            .await
            .unwrap()
            .unwrap()
    }

    /// Game reads that hand back what they read only after `lag`.
    struct LaggingGameReads {
        inner: MemoryStore,
        lag: Duration,
    }

    impl SessionStore for LaggingGameReads {
        fn commit(&self, batch: WriteBatch) -> BoxFuture<'static, StorageResult<()>> {
            self.inner.commit(batch)
        }

        fn find_game(&self, id: Uuid) -> BoxFuture<'static, StorageResult<Option<GameEntity>>> {
            let read = self.inner.find_game(id);
            let lag = self.lag;
            Box::pin(async move {
                let game = read.await;
                sleep(lag).await;
                game
            })
        }

        fn list_games(&self, limit: usize) -> BoxFuture<'static, StorageResult<Vec<GameEntity>>> {
            self.inner.list_games(limit)
        }

        fn delete_game(&self, id: Uuid) -> BoxFuture<'static, StorageResult<bool>> {
            self.inner.delete_game(id)
        }

        fn list_teams(&self, game_id: Uuid) -> BoxFuture<'static, StorageResult<Vec<TeamEntity>>> {
            self.inner.list_teams(game_id)
        }

        fn find_game_question(
            &self,
            id: Uuid,
        ) -> BoxFuture<'static, StorageResult<Option<GameQuestionEntity>>> {
            self.inner.find_game_question(id)
        }

        fn find_game_question_at(
            &self,
            game_id: Uuid,
            position: u32,
        ) -> BoxFuture<'static, StorageResult<Option<GameQuestionEntity>>> {
            self.inner.find_game_question_at(game_id, position)
        }

        fn list_game_questions(
            &self,
            game_id: Uuid,
        ) -> BoxFuture<'static, StorageResult<Vec<GameQuestionEntity>>> {
            self.inner.list_game_questions(game_id)
        }

        fn insert_team_answer(
            &self,
            answer: TeamAnswerEntity,
        ) -> BoxFuture<'static, StorageResult<()>> {
            self.inner.insert_team_answer(answer)
        }

        fn find_team_answer(
            &self,
            game_id: Uuid,
            team_id: Uuid,
            answer_id: Uuid,
        ) -> BoxFuture<'static, StorageResult<Option<TeamAnswerEntity>>> {
            self.inner.find_team_answer(game_id, team_id, answer_id)
        }

        fn delete_team_answers(
            &self,
            game_id: Uuid,
            team_id: Uuid,
            answer_id: Uuid,
        ) -> BoxFuture<'static, StorageResult<u64>> {
            self.inner.delete_team_answers(game_id, team_id, answer_id)
        }

        fn list_team_answers(
            &self,
            game_id: Uuid,
            team_id: Uuid,
        ) -> BoxFuture<'static, StorageResult<Vec<TeamAnswerEntity>>> {
            self.inner.list_team_answers(game_id, team_id)
        }

        fn health_check(&self) -> BoxFuture<'static, StorageResult<()>> {
            self.inner.health_check()
        }

        fn try_reconnect(&self) -> BoxFuture<'static, StorageResult<()>> {
            self.inner.try_reconnect()
        }
    }

    fn ruth_question() -> QuestionEntity {
        let id = Uuid::new_v4();
        QuestionEntity {
            id,
            book: "Ruth".into(),
            chapter: "1".into(),
            verses: "16".into(),
            text: "Where you go I will go".into(),
            answers: vec![AnswerEntity {
                id: Uuid::new_v4(),
                question_id: id,
                text: "Ruth".into(),
                correct: true,
            }],
        }
    }

    #[tokio::test]
    async fn game_changes_reach_game_subscribers() {
        let state = running_state().await;
        let engine = state.require_engine().await.unwrap();
        let created = game_service::create_game(
            &engine,
            CreateGameRequest {
                name: "Live".into(),
                seconds: 10,
                question_count: 0,
                chapters: vec![ChapterInput {
                    book: "Ruth".into(),
                    chapter: "1".into(),
                }],
            },
        )
        .await
        .unwrap();
        let game_id = created.game.id;

        let mut subscription = state.broadcaster().subscribe(Topic::Game(game_id));
        engine.start_game(game_id).await.unwrap();

        let event = timeout(Duration::from_secs(1), subscription.receiver.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(event.event.as_deref(), Some(EVENT_CURRENT_QUESTION));
        assert_eq!(event.data["state"], "waiting");
    }

    #[tokio::test]
    async fn games_list_snapshot_lists_created_games() {
        let state = running_state().await;
        let mut subscription = state.broadcaster().subscribe(Topic::GamesList);
        let engine = state.require_engine().await.unwrap();
        game_service::create_game(
            &engine,
            CreateGameRequest {
                name: "Listed".into(),
                seconds: 10,
                question_count: 0,
                chapters: Vec::new(),
            },
        )
        .await
        .unwrap();

        let event = timeout(Duration::from_secs(1), subscription.receiver.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(event.event.as_deref(), Some(EVENT_GAMES));
        assert_eq!(event.data[0]["name"], "Listed");
    }

    #[tokio::test]
    async fn new_subscribers_receive_the_current_snapshot() {
        let state = running_state().await;
        let mut subscription = subscribe(&state, Topic::GamesList).await.unwrap();

        let event = next_event(&mut subscription).await;
        assert_eq!(event.event.as_deref(), Some(EVENT_GAMES));
        assert_eq!(event.data, serde_json::json!([]));
    }

    #[tokio::test]
    async fn unknown_game_subscription_is_rejected() {
        let state = running_state().await;
        let topic = Topic::Game(Uuid::new_v4());
        assert!(matches!(
            subscribe(&state, topic).await,
            Err(ServiceError::NotFound(_))
        ));
        assert_eq!(state.broadcaster().subscriber_count(topic), 0);
    }

    #[tokio::test]
    async fn snapshot_fails_while_degraded() {
        let state = AppState::new(AppConfig::default());
        assert!(matches!(
            snapshot(&state, Topic::GamesList).await,
            Err(ServiceError::Degraded)
        ));
    }

    #[tokio::test]
    async fn slow_refresh_never_overtakes_a_later_change() {
        let store = MemoryStore::new();
        store.save_question(ruth_question()).await.unwrap();
        let state = running_state_over(StoreHandles {
            sessions: Arc::new(LaggingGameReads {
                inner: store.clone(),
                lag: Duration::from_millis(100),
            }),
            questions: Arc::new(store),
        })
        .await;
        let engine = state.require_engine().await.unwrap();
        let created = game_service::create_game(
            &engine,
            CreateGameRequest {
                name: "Lagging".into(),
                seconds: 10,
                question_count: 1,
                chapters: vec![ChapterInput {
                    book: "Ruth".into(),
                    chapter: "1".into(),
                }],
            },
        )
        .await
        .unwrap();
        let game_id = created.game.id;
        engine.start_game(game_id).await.unwrap();

        let topic = Topic::Game(game_id);
        let mut subscription = subscribe(&state, topic).await.unwrap();
        assert_eq!(next_event(&mut subscription).await.data["state"], "active");

        // The refresh reads the started game, then the game finishes while it lags.
        request_refresh(&state, topic);
        engine.finish_game(game_id).await.unwrap();

        let mut last = None;
        while let Ok(Some(event)) =
            timeout(Duration::from_millis(500), subscription.receiver.recv()).await
        {
            last = Some(event);
        }
        assert_eq!(last.unwrap().data["state"], "finished");
    }
}
