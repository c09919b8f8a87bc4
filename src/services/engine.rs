//! Game session engine: lifecycle transitions, play order navigation, answer
//! recording and score reports.
//!
//! Every read-then-write operation runs behind a per-game gate. Waiting for the
//! gate and the reads are bounded by the configured transaction timeout; the
//! write they plan is then driven to completion so its outcome is never
//! ambiguous. Writes go through a single [`WriteBatch`] per operation, so a
//! failure leaves the game exactly as it was read.

use std::{
    collections::{HashMap, HashSet},
    future::Future,
    sync::Arc,
    time::Duration,
};

use dashmap::DashMap;
use futures::future::BoxFuture;
use rand::seq::SliceRandom;
use tokio::{
    sync::{Mutex, mpsc},
    time::timeout,
};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::{
    dao::{
        models::{
            GameEntity, GameQuestionEntity, TeamAnswerEntity, TeamEntity, sort_team_answers,
        },
        session_store::{QuestionBank, SessionStore, StoreHandles, WriteBatch},
        storage::{StorageError, StorageResult},
    },
    dto::{
        format_system_time,
        game::{FinishedGameReport, QuestionView, TeamAnswerSummary, TeamReport},
    },
    error::ServiceError,
    services::{live_updates::LiveEvent, scoring},
    state::lifecycle::{FinishReason, GameStatus, LifecycleEvent},
};

/// Name of the team created together with every game.
pub const HOME_TEAM_NAME: &str = "Home";

/// Per-game gates, shared by every engine built over the same application state.
pub type GameGates = Arc<DashMap<Uuid, Arc<Mutex<()>>>>;

/// Result of the read phase of a gated operation.
pub enum Planned<T> {
    /// Nothing to write.
    Done(T),
    /// A write that yields the result once it is committed.
    Commit(BoxFuture<'static, Result<T, ServiceError>>),
}

impl<T: Send + 'static> Planned<T> {
    /// Commit `write`, then yield `value`.
    pub fn after<W>(write: BoxFuture<'static, StorageResult<W>>, value: T) -> Self
    where
        W: Send + 'static,
    {
        Self::Commit(Box::pin(async move {
            write.await?;
            Ok(value)
        }))
    }

    /// Transform the value once the write, if any, succeeded.
    pub fn map<U, F>(self, f: F) -> Planned<U>
    where
        U: Send + 'static,
        F: FnOnce(T) -> U + Send + 'static,
    {
        match self {
            Planned::Done(value) => Planned::Done(f(value)),
            Planned::Commit(write) => Planned::Commit(Box::pin(async move { write.await.map(f) })),
        }
    }
}

/// Drives games through their lifecycle on top of the injected stores.
pub struct GameEngine {
    sessions: Arc<dyn SessionStore>,
    questions: Arc<dyn QuestionBank>,
    events: mpsc::UnboundedSender<LiveEvent>,
    gates: GameGates,
    transaction_timeout: Duration,
}

impl GameEngine {
    /// Build an engine publishing its change notifications on `events`.
    pub fn new(
        stores: StoreHandles,
        events: mpsc::UnboundedSender<LiveEvent>,
        transaction_timeout: Duration,
    ) -> Self {
        Self {
            sessions: stores.sessions,
            questions: stores.questions,
            events,
            gates: GameGates::default(),
            transaction_timeout,
        }
    }

    /// Serialize on `gates` instead of a private set, so engines replacing
    /// each other still exclude one another.
    pub fn with_gates(mut self, gates: GameGates) -> Self {
        self.gates = gates;
        self
    }

    /// Session store the engine writes to.
    pub fn sessions(&self) -> &Arc<dyn SessionStore> {
        &self.sessions
    }

    /// Question bank the play order is drawn from.
    pub fn questions(&self) -> &Arc<dyn QuestionBank> {
        &self.questions
    }

    /// Queue a live update. Only called after the corresponding commit succeeded.
    pub fn notify(&self, event: LiveEvent) {
        if self.events.send(event).is_err() {
            debug!(?event, "live update worker gone; dropping event");
        }
    }

    fn gate(&self, game_id: Uuid) -> Arc<Mutex<()>> {
        self.gates.entry(game_id).or_default().clone()
    }

    /// Drop the gate of a deleted game.
    pub fn forget_game(&self, game_id: Uuid) {
        self.gates.remove(&game_id);
    }

    /// Run `plan` while holding the gate of `game_id`, then commit what it planned.
    ///
    /// Waiting for the gate and running `plan` count against the transaction
    /// timeout. The planned write runs to completion under the gate, outside
    /// the timeout.
    pub async fn run_gated<F, Fut, T>(&self, game_id: Uuid, plan: F) -> Result<T, ServiceError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Planned<T>, ServiceError>>,
    {
        let gate = self.gate(game_id);
        let reads = async {
            let guard = gate.lock_owned().await;
            plan().await.map(|planned| (guard, planned))
        };

        let (_guard, planned) = match timeout(self.transaction_timeout, reads).await {
            Ok(result) => result?,
            Err(_) => {
                warn!(%game_id, limit_ms = self.transaction_timeout.as_millis() as u64, "game operation timed out");
                return Err(ServiceError::Unavailable(StorageError::Timeout));
            }
        };

        match planned {
            Planned::Done(value) => Ok(value),
            Planned::Commit(write) => write.await,
        }
    }

    /// Load a game or fail with [`ServiceError::NotFound`].
    pub async fn load_game(&self, game_id: Uuid) -> Result<GameEntity, ServiceError> {
        self.sessions
            .find_game(game_id)
            .await?
            .ok_or_else(|| game_not_found(game_id))
    }

    fn commit_game_update(&self, game: GameEntity, batch: WriteBatch) -> Planned<GameEntity> {
        let mut committed = game.clone();
        committed.version += 1;
        Planned::after(self.sessions.commit(batch.update_game(game)), committed)
    }

    /// Position of the game question the pointer references, if any.
    async fn current_position(&self, game: &GameEntity) -> Result<Option<u32>, ServiceError> {
        let Some(game_question_id) = game.current_game_question_id else {
            return Ok(None);
        };

        let row = self
            .sessions
            .find_game_question(game_question_id)
            .await?
            .ok_or_else(|| {
                ServiceError::NotFound(format!("game question `{game_question_id}` not found"))
            })?;
        Ok(Some(row.position))
    }

    /// Shuffle the questions of the game's chapters into its play order and start it.
    pub async fn start_game(&self, game_id: Uuid) -> Result<GameEntity, ServiceError> {
        let started = self
            .run_gated(game_id, || self.start_locked(game_id))
            .await?;

        self.notify(LiveEvent::GameChanged(game_id));
        self.notify(LiveEvent::GamesListChanged);
        Ok(started)
    }

    async fn start_locked(&self, game_id: Uuid) -> Result<Planned<GameEntity>, ServiceError> {
        let game = self.load_game(game_id).await?;
        let status = game.status.transition(LifecycleEvent::Start)?;

        let mut question_ids = self
            .questions
            .questions_for_chapters(game.chapters.clone())
            .await?;
        question_ids.shuffle(&mut rand::rng());

        let rows = question_ids
            .into_iter()
            .enumerate()
            .map(|(position, question_id)| GameQuestionEntity {
                id: Uuid::new_v4(),
                game_id,
                question_id,
                position: position as u32,
            })
            .collect::<Vec<_>>();
        let total = rows.len();

        let mut updated = game;
        updated.status = status;
        updated.current_game_question_id = rows.first().map(|row| row.id);

        let batch = WriteBatch::new().insert_game_questions(rows);
        Ok(self.commit_game_update(updated, batch).map(move |started| {
            info!(%game_id, total, "game started");
            started
        }))
    }

    /// Move the pointer to the next question, finishing the game past the last one.
    pub async fn next_question(&self, game_id: Uuid) -> Result<GameEntity, ServiceError> {
        let updated = self
            .run_gated(game_id, || self.advance_locked(game_id))
            .await?;

        self.notify(LiveEvent::GameChanged(game_id));
        if updated.status.is_terminal() {
            self.notify(LiveEvent::GamesListChanged);
        }
        Ok(updated)
    }

    async fn advance_locked(&self, game_id: Uuid) -> Result<Planned<GameEntity>, ServiceError> {
        let game = self.load_game(game_id).await?;
        game.status.transition(LifecycleEvent::Advance)?;

        let next_row = match self.current_position(&game).await? {
            Some(position) => {
                self.sessions
                    .find_game_question_at(game_id, position + 1)
                    .await?
            }
            None => None,
        };

        let mut updated = game.clone();
        match &next_row {
            Some(row) => updated.current_game_question_id = Some(row.id),
            None => {
                updated.status = game
                    .status
                    .transition(LifecycleEvent::Finish(FinishReason::PlayOrderCompleted))?;
            }
        }

        let next_position = next_row.map(|row| row.position);
        Ok(self
            .commit_game_update(updated, WriteBatch::new())
            .map(move |updated| {
                match next_position {
                    Some(position) => info!(%game_id, position, "advanced to next question"),
                    None => info!(%game_id, "play order completed; game finished"),
                }
                updated
            }))
    }

    /// Move the pointer back one question. A no-op at the first position.
    pub async fn previous_question(&self, game_id: Uuid) -> Result<GameEntity, ServiceError> {
        let (game, moved) = self
            .run_gated(game_id, || self.retreat_locked(game_id))
            .await?;

        if moved {
            self.notify(LiveEvent::GameChanged(game_id));
        }
        Ok(game)
    }

    async fn retreat_locked(
        &self,
        game_id: Uuid,
    ) -> Result<Planned<(GameEntity, bool)>, ServiceError> {
        let game = self.load_game(game_id).await?;
        game.status.transition(LifecycleEvent::Retreat)?;

        let position = match self.current_position(&game).await? {
            None | Some(0) => {
                debug!(%game_id, "already at the first question");
                return Ok(Planned::Done((game, false)));
            }
            Some(position) => position - 1,
        };

        let row = self
            .sessions
            .find_game_question_at(game_id, position)
            .await?
            .ok_or_else(|| {
                ServiceError::NotFound(format!(
                    "no question at position {position} for game `{game_id}`"
                ))
            })?;

        let mut updated = game;
        updated.current_game_question_id = Some(row.id);
        Ok(self
            .commit_game_update(updated, WriteBatch::new())
            .map(move |updated| {
                info!(%game_id, position, "moved back to previous question");
                (updated, true)
            }))
    }

    /// Finish a started game, keeping its pointer for display.
    pub async fn finish_game(&self, game_id: Uuid) -> Result<GameEntity, ServiceError> {
        let finished = self
            .run_gated(game_id, || self.finish_locked(game_id))
            .await?;

        self.notify(LiveEvent::GameChanged(game_id));
        self.notify(LiveEvent::GamesListChanged);
        Ok(finished)
    }

    async fn finish_locked(&self, game_id: Uuid) -> Result<Planned<GameEntity>, ServiceError> {
        let mut game = self.load_game(game_id).await?;
        game.status = game
            .status
            .transition(LifecycleEvent::Finish(FinishReason::ManualStop))?;

        Ok(self
            .commit_game_update(game, WriteBatch::new())
            .map(move |finished| {
                info!(%game_id, "game finished by host");
                finished
            }))
    }

    /// What is on screen for the game right now. Reads only.
    pub async fn current_question(&self, game_id: Uuid) -> Result<QuestionView, ServiceError> {
        let game = self.load_game(game_id).await?;
        if game.status == GameStatus::Finished {
            return Ok(QuestionView::Finished);
        }

        let Some(game_question_id) = game.current_game_question_id else {
            return Ok(QuestionView::waiting());
        };
        let Some(row) = self.sessions.find_game_question(game_question_id).await? else {
            return Ok(QuestionView::waiting());
        };
        let Some(question) = self.questions.find_question(row.question_id).await? else {
            warn!(%game_id, question_id = %row.question_id, "current question missing from question bank");
            return Ok(QuestionView::waiting());
        };

        let total = self.sessions.list_game_questions(game_id).await?.len() as u32;
        Ok(QuestionView::Active {
            game_question_id: row.id,
            position: row.position,
            total,
            question: question.into(),
        })
    }

    async fn find_team(&self, game_id: Uuid, team_id: Uuid) -> Result<TeamEntity, ServiceError> {
        self.sessions
            .list_teams(game_id)
            .await?
            .into_iter()
            .find(|team| team.id == team_id)
            .ok_or_else(|| {
                ServiceError::NotFound(format!("team `{team_id}` not found in game `{game_id}`"))
            })
    }

    /// Record that a team selected an answer, returning the record id.
    ///
    /// Submitting the same answer again returns the existing record.
    pub async fn submit_team_answer(
        &self,
        game_id: Uuid,
        team_id: Uuid,
        answer_id: Uuid,
    ) -> Result<Uuid, ServiceError> {
        let (record_id, created) = self
            .run_gated(game_id, || self.submit_locked(game_id, team_id, answer_id))
            .await?;

        if created {
            self.notify(LiveEvent::TeamChanged { game_id, team_id });
        }
        Ok(record_id)
    }

    async fn submit_locked(
        &self,
        game_id: Uuid,
        team_id: Uuid,
        answer_id: Uuid,
    ) -> Result<Planned<(Uuid, bool)>, ServiceError> {
        self.ensure_answers_accepted(game_id, team_id, answer_id)
            .await?;

        if let Some(existing) = self
            .sessions
            .find_team_answer(game_id, team_id, answer_id)
            .await?
        {
            debug!(%game_id, %team_id, %answer_id, "answer already recorded");
            return Ok(Planned::Done((existing.id, false)));
        }

        let record = TeamAnswerEntity::new(game_id, team_id, answer_id);
        let record_id = record.id;
        let write = self.sessions.insert_team_answer(record);
        Ok(Planned::after(write, (record_id, true)).map(move |recorded| {
            info!(%game_id, %team_id, %answer_id, "team answer recorded");
            recorded
        }))
    }

    /// Remove every record of a team selecting an answer. Nothing to remove is success.
    pub async fn retract_team_answer(
        &self,
        game_id: Uuid,
        team_id: Uuid,
        answer_id: Uuid,
    ) -> Result<(), ServiceError> {
        self.run_gated(game_id, || self.retract_locked(game_id, team_id, answer_id))
            .await?;

        self.notify(LiveEvent::TeamChanged { game_id, team_id });
        Ok(())
    }

    async fn retract_locked(
        &self,
        game_id: Uuid,
        team_id: Uuid,
        answer_id: Uuid,
    ) -> Result<Planned<()>, ServiceError> {
        self.ensure_answers_accepted(game_id, team_id, answer_id)
            .await?;

        let write = self
            .sessions
            .delete_team_answers(game_id, team_id, answer_id);
        Ok(Planned::Commit(Box::pin(async move {
            let removed = write.await?;
            info!(%game_id, %team_id, %answer_id, removed, "team answer retracted");
            Ok(())
        })))
    }

    /// The game accepts answer changes, the team belongs to it and the answer exists.
    async fn ensure_answers_accepted(
        &self,
        game_id: Uuid,
        team_id: Uuid,
        answer_id: Uuid,
    ) -> Result<(), ServiceError> {
        let game = self.load_game(game_id).await?;
        game.status.transition(LifecycleEvent::RecordAnswer)?;
        self.find_team(game_id, team_id).await?;

        let found = self.questions.find_answers(vec![answer_id]).await?;
        if found.is_empty() {
            return Err(ServiceError::NotFound(format!(
                "answer `{answer_id}` not found"
            )));
        }
        Ok(())
    }

    async fn build_team_report(&self, team: TeamEntity) -> Result<TeamReport, ServiceError> {
        let mut records = self.sessions.list_team_answers(team.game_id, team.id).await?;
        sort_team_answers(&mut records);

        let answer_ids = records
            .iter()
            .map(|record| record.answer_id)
            .collect::<HashSet<_>>()
            .into_iter()
            .collect::<Vec<_>>();
        let answers = self
            .questions
            .find_answers(answer_ids)
            .await?
            .into_iter()
            .map(|answer| (answer.id, answer))
            .collect::<HashMap<_, _>>();

        let mut summaries = Vec::with_capacity(records.len());
        for record in records {
            let Some(answer) = answers.get(&record.answer_id) else {
                warn!(team_id = %team.id, answer_id = %record.answer_id, "recorded answer missing from question bank");
                continue;
            };
            summaries.push(TeamAnswerSummary {
                id: record.id,
                answer_id: answer.id,
                question_id: answer.question_id,
                text: answer.text.clone(),
                correct: answer.correct,
                created_at: format_system_time(record.created_at),
            });
        }

        let score = scoring::score(summaries.iter().map(|answer| answer.correct));
        Ok(TeamReport {
            id: team.id,
            game_id: team.game_id,
            name: team.name,
            score,
            answers: summaries,
        })
    }

    /// A team with its answers and derived score.
    pub async fn team_report(
        &self,
        game_id: Uuid,
        team_id: Uuid,
    ) -> Result<TeamReport, ServiceError> {
        self.load_game(game_id).await?;
        let team = self.find_team(game_id, team_id).await?;
        self.build_team_report(team).await
    }

    /// Report of the team created together with the game.
    pub async fn home_team(&self, game_id: Uuid) -> Result<TeamReport, ServiceError> {
        self.load_game(game_id).await?;
        let team = self
            .sessions
            .list_teams(game_id)
            .await?
            .into_iter()
            .find(|team| team.name == HOME_TEAM_NAME)
            .ok_or_else(|| {
                ServiceError::NotFound(format!("game `{game_id}` has no home team"))
            })?;
        self.build_team_report(team).await
    }

    /// The game with every team, their answers and scores.
    pub async fn finished_game_report(
        &self,
        game_id: Uuid,
    ) -> Result<FinishedGameReport, ServiceError> {
        let game = self.load_game(game_id).await?;
        let teams = self.sessions.list_teams(game_id).await?;

        let mut reports = Vec::with_capacity(teams.len());
        for team in teams {
            reports.push(self.build_team_report(team).await?);
        }

        Ok(FinishedGameReport {
            game: game.into(),
            teams: reports,
        })
    }
}

fn game_not_found(game_id: Uuid) -> ServiceError {
    ServiceError::NotFound(format!("game `{game_id}` not found"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dao::{
        models::{AnswerEntity, ChapterRef, QuestionEntity},
        session_store::memory::MemoryStore,
    };

    struct Fixture {
        store: MemoryStore,
        engine: Arc<GameEngine>,
        events: mpsc::UnboundedReceiver<LiveEvent>,
        game_id: Uuid,
        home_id: Uuid,
    }

    fn chapter() -> ChapterRef {
        ChapterRef {
            book: "Luke".into(),
            chapter: "2".into(),
        }
    }

    fn question(text: &str, correct_first: bool) -> QuestionEntity {
        let id = Uuid::new_v4();
        QuestionEntity {
            id,
            book: "Luke".into(),
            chapter: "2".into(),
            verses: "1-7".into(),
            text: text.into(),
            answers: vec![
                AnswerEntity {
                    id: Uuid::new_v4(),
                    question_id: id,
                    text: "first".into(),
                    correct: correct_first,
                },
                AnswerEntity {
                    id: Uuid::new_v4(),
                    question_id: id,
                    text: "second".into(),
                    correct: !correct_first,
                },
            ],
        }
    }

    async fn fixture(question_total: usize) -> Fixture {
        let store = MemoryStore::new();
        for index in 0..question_total {
            store
                .save_question(question(&format!("question {index}"), true))
                .await
                .unwrap();
        }

        let game = GameEntity::new("Quiz".into(), 30, question_total as u32, vec![chapter()]);
        let home = TeamEntity::new(game.id, HOME_TEAM_NAME);
        let (game_id, home_id) = (game.id, home.id);
        store
            .commit(WriteBatch::new().insert_game(game).insert_team(home))
            .await
            .unwrap();

        let (tx, events) = mpsc::unbounded_channel();
        let engine = Arc::new(GameEngine::new(
            StoreHandles::from_store(store.clone()),
            tx,
            Duration::from_secs(5),
        ));

        Fixture {
            store,
            engine,
            events,
            game_id,
            home_id,
        }
    }

    async fn position(fixture: &Fixture) -> Option<u32> {
        match fixture.engine.current_question(fixture.game_id).await.unwrap() {
            QuestionView::Active { position, .. } => Some(position),
            _ => None,
        }
    }

    #[tokio::test]
    async fn start_materializes_contiguous_play_order() {
        let fixture = fixture(5).await;
        let game = fixture.engine.start_game(fixture.game_id).await.unwrap();
        assert_eq!(game.status, GameStatus::Started);
        assert_eq!(game.version, 1);

        let rows = fixture.store.list_game_questions(fixture.game_id).await.unwrap();
        let positions = rows.iter().map(|row| row.position).collect::<Vec<_>>();
        assert_eq!(positions, vec![0, 1, 2, 3, 4]);
        assert_eq!(game.current_game_question_id, Some(rows[0].id));

        let distinct = rows.iter().map(|row| row.question_id).collect::<HashSet<_>>();
        assert_eq!(distinct.len(), 5);
    }

    #[tokio::test]
    async fn start_requires_open_game() {
        let fixture = fixture(2).await;
        fixture.engine.start_game(fixture.game_id).await.unwrap();
        let err = fixture.engine.start_game(fixture.game_id).await.unwrap_err();
        assert!(matches!(err, ServiceError::InvalidState(_)));
        assert_eq!(
            fixture.store.list_game_questions(fixture.game_id).await.unwrap().len(),
            2
        );
    }

    #[tokio::test]
    async fn unknown_game_is_not_found() {
        let fixture = fixture(1).await;
        let missing = Uuid::new_v4();
        assert!(matches!(
            fixture.engine.start_game(missing).await,
            Err(ServiceError::NotFound(_))
        ));
        assert!(matches!(
            fixture.engine.current_question(missing).await,
            Err(ServiceError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn empty_play_order_waits_then_finishes_on_next() {
        let fixture = fixture(0).await;
        let game = fixture.engine.start_game(fixture.game_id).await.unwrap();
        assert_eq!(game.status, GameStatus::Started);
        assert!(game.current_game_question_id.is_none());
        assert!(matches!(
            fixture.engine.current_question(fixture.game_id).await.unwrap(),
            QuestionView::Waiting { .. }
        ));

        let game = fixture.engine.next_question(fixture.game_id).await.unwrap();
        assert_eq!(game.status, GameStatus::Finished);
    }

    #[tokio::test]
    async fn open_game_shows_waiting_placeholder() {
        let fixture = fixture(3).await;
        let view = fixture.engine.current_question(fixture.game_id).await.unwrap();
        match view {
            QuestionView::Waiting { message } => assert_eq!(message, "Waiting for game to start"),
            other => panic!("unexpected view {other:?}"),
        }
    }

    #[tokio::test]
    async fn next_advances_then_finishes_past_the_end() {
        let fixture = fixture(3).await;
        fixture.engine.start_game(fixture.game_id).await.unwrap();
        assert_eq!(position(&fixture).await, Some(0));

        fixture.engine.next_question(fixture.game_id).await.unwrap();
        assert_eq!(position(&fixture).await, Some(1));
        fixture.engine.next_question(fixture.game_id).await.unwrap();
        assert_eq!(position(&fixture).await, Some(2));

        let before = fixture.store.find_game(fixture.game_id).await.unwrap().unwrap();
        let finished = fixture.engine.next_question(fixture.game_id).await.unwrap();
        assert_eq!(finished.status, GameStatus::Finished);
        assert_eq!(
            finished.current_game_question_id,
            before.current_game_question_id
        );
        assert!(matches!(
            fixture.engine.current_question(fixture.game_id).await.unwrap(),
            QuestionView::Finished
        ));
    }

    #[tokio::test]
    async fn previous_is_a_noop_at_first_position() {
        let fixture = fixture(3).await;
        fixture.engine.start_game(fixture.game_id).await.unwrap();

        let game = fixture.engine.previous_question(fixture.game_id).await.unwrap();
        assert_eq!(game.status, GameStatus::Started);
        assert_eq!(game.version, 1);
        assert_eq!(position(&fixture).await, Some(0));

        fixture.engine.next_question(fixture.game_id).await.unwrap();
        fixture.engine.previous_question(fixture.game_id).await.unwrap();
        assert_eq!(position(&fixture).await, Some(0));
    }

    #[tokio::test]
    async fn navigation_requires_started_game() {
        let fixture = fixture(2).await;
        for result in [
            fixture.engine.next_question(fixture.game_id).await,
            fixture.engine.previous_question(fixture.game_id).await,
            fixture.engine.finish_game(fixture.game_id).await,
        ] {
            assert!(matches!(result, Err(ServiceError::InvalidState(_))));
        }

        fixture.engine.start_game(fixture.game_id).await.unwrap();
        fixture.engine.finish_game(fixture.game_id).await.unwrap();
        for result in [
            fixture.engine.next_question(fixture.game_id).await,
            fixture.engine.previous_question(fixture.game_id).await,
            fixture.engine.finish_game(fixture.game_id).await,
        ] {
            assert!(matches!(result, Err(ServiceError::InvalidState(_))));
        }
    }

    #[tokio::test]
    async fn failed_commit_leaves_game_open() {
        let fixture = fixture(3).await;
        fixture.store.fail_next_commit();

        let err = fixture.engine.start_game(fixture.game_id).await.unwrap_err();
        assert!(err.is_retryable());

        let game = fixture.store.find_game(fixture.game_id).await.unwrap().unwrap();
        assert_eq!(game.status, GameStatus::Open);
        assert!(game.current_game_question_id.is_none());
        assert!(
            fixture
                .store
                .list_game_questions(fixture.game_id)
                .await
                .unwrap()
                .is_empty()
        );

        fixture.engine.start_game(fixture.game_id).await.unwrap();
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_next_calls_serialize() {
        let fixture = fixture(4).await;
        fixture.engine.start_game(fixture.game_id).await.unwrap();

        let first = {
            let engine = fixture.engine.clone();
            let game_id = fixture.game_id;
            tokio::spawn(async move { engine.next_question(game_id).await })
        };
        let second = {
            let engine = fixture.engine.clone();
            let game_id = fixture.game_id;
            tokio::spawn(async move { engine.next_question(game_id).await })
        };
        first.await.unwrap().unwrap();
        second.await.unwrap().unwrap();

        assert_eq!(position(&fixture).await, Some(2));
    }

    #[tokio::test]
    async fn scores_are_floored_at_zero() {
        let fixture = fixture(4).await;
        fixture.engine.start_game(fixture.game_id).await.unwrap();

        // First answers are correct, second answers are not.
        let questions = fixture.store.list_questions().await.unwrap();
        let picks = [
            questions[0].answers[0].id,
            questions[1].answers[1].id,
            questions[2].answers[1].id,
            questions[3].answers[0].id,
        ];
        for answer_id in picks {
            fixture
                .engine
                .submit_team_answer(fixture.game_id, fixture.home_id, answer_id)
                .await
                .unwrap();
        }

        let report = fixture.engine.home_team(fixture.game_id).await.unwrap();
        assert_eq!(report.answers.len(), 4);
        assert_eq!(report.score, 1);
        let order = report.answers.iter().map(|a| a.answer_id).collect::<Vec<_>>();
        assert_eq!(order, picks.to_vec());
    }

    #[tokio::test]
    async fn duplicate_submission_returns_existing_record() {
        let fixture = fixture(1).await;
        let answer_id = fixture.store.list_questions().await.unwrap()[0].answers[0].id;

        let first = fixture
            .engine
            .submit_team_answer(fixture.game_id, fixture.home_id, answer_id)
            .await
            .unwrap();
        let second = fixture
            .engine
            .submit_team_answer(fixture.game_id, fixture.home_id, answer_id)
            .await
            .unwrap();
        assert_eq!(first, second);

        let report = fixture
            .engine
            .team_report(fixture.game_id, fixture.home_id)
            .await
            .unwrap();
        assert_eq!(report.answers.len(), 1);
        assert_eq!(report.score, 1);
    }

    #[tokio::test]
    async fn retract_removes_answer_and_rescores() {
        let fixture = fixture(1).await;
        let answer_id = fixture.store.list_questions().await.unwrap()[0].answers[0].id;
        fixture
            .engine
            .submit_team_answer(fixture.game_id, fixture.home_id, answer_id)
            .await
            .unwrap();

        fixture
            .engine
            .retract_team_answer(fixture.game_id, fixture.home_id, answer_id)
            .await
            .unwrap();
        fixture
            .engine
            .retract_team_answer(fixture.game_id, fixture.home_id, answer_id)
            .await
            .unwrap();

        let report = fixture.engine.home_team(fixture.game_id).await.unwrap();
        assert!(report.answers.is_empty());
        assert_eq!(report.score, 0);
    }

    #[tokio::test]
    async fn answers_are_rejected_once_finished() {
        let fixture = fixture(1).await;
        let answer_id = fixture.store.list_questions().await.unwrap()[0].answers[0].id;
        fixture.engine.start_game(fixture.game_id).await.unwrap();
        fixture.engine.finish_game(fixture.game_id).await.unwrap();

        let submit = fixture
            .engine
            .submit_team_answer(fixture.game_id, fixture.home_id, answer_id)
            .await;
        assert!(matches!(submit, Err(ServiceError::InvalidState(_))));
        let retract = fixture
            .engine
            .retract_team_answer(fixture.game_id, fixture.home_id, answer_id)
            .await;
        assert!(matches!(retract, Err(ServiceError::InvalidState(_))));
    }

    #[tokio::test]
    async fn unknown_team_or_answer_is_not_found() {
        let fixture = fixture(1).await;
        let answer_id = fixture.store.list_questions().await.unwrap()[0].answers[0].id;

        let unknown_team = fixture
            .engine
            .submit_team_answer(fixture.game_id, Uuid::new_v4(), answer_id)
            .await;
        assert!(matches!(unknown_team, Err(ServiceError::NotFound(_))));

        let unknown_answer = fixture
            .engine
            .submit_team_answer(fixture.game_id, fixture.home_id, Uuid::new_v4())
            .await;
        assert!(matches!(unknown_answer, Err(ServiceError::NotFound(_))));
    }

    #[tokio::test]
    async fn live_events_follow_commits() {
        let mut fixture = fixture(2).await;
        fixture.engine.start_game(fixture.game_id).await.unwrap();
        assert_eq!(
            fixture.events.recv().await,
            Some(LiveEvent::GameChanged(fixture.game_id))
        );
        assert_eq!(
            fixture.events.recv().await,
            Some(LiveEvent::GamesListChanged)
        );

        fixture.store.fail_next_commit();
        assert!(fixture.engine.next_question(fixture.game_id).await.is_err());
        assert!(fixture.events.try_recv().is_err());

        let answer_id = fixture.store.list_questions().await.unwrap()[0].answers[0].id;
        fixture
            .engine
            .submit_team_answer(fixture.game_id, fixture.home_id, answer_id)
            .await
            .unwrap();
        assert_eq!(
            fixture.events.recv().await,
            Some(LiveEvent::TeamChanged {
                game_id: fixture.game_id,
                team_id: fixture.home_id,
            })
        );
    }

    #[tokio::test]
    async fn finished_report_scores_every_team() {
        let fixture = fixture(2).await;
        let guests = TeamEntity::new(fixture.game_id, "Guests");
        let guests_id = guests.id;
        fixture
            .store
            .commit(WriteBatch::new().insert_team(guests))
            .await
            .unwrap();
        fixture.engine.start_game(fixture.game_id).await.unwrap();

        let questions = fixture.store.list_questions().await.unwrap();
        fixture
            .engine
            .submit_team_answer(fixture.game_id, fixture.home_id, questions[0].answers[0].id)
            .await
            .unwrap();
        fixture
            .engine
            .submit_team_answer(fixture.game_id, guests_id, questions[0].answers[1].id)
            .await
            .unwrap();
        fixture.engine.finish_game(fixture.game_id).await.unwrap();

        let report = fixture
            .engine
            .finished_game_report(fixture.game_id)
            .await
            .unwrap();
        assert_eq!(report.game.status, GameStatus::Finished);
        let scores = report
            .teams
            .iter()
            .map(|team| (team.name.as_str(), team.score))
            .collect::<Vec<_>>();
        assert_eq!(scores, vec![("Home", 1), ("Guests", 0)]);
    }

    #[tokio::test]
    async fn play_order_is_shuffled_per_game() {
        const STARTS: usize = 240;
        let fixture = fixture(4).await;
        let questions = fixture.store.list_questions().await.unwrap();

        let mut leads = HashMap::<Uuid, usize>::new();
        let mut orders = HashSet::new();
        for _ in 0..STARTS {
            let game = GameEntity::new("Draw".into(), 30, 4, vec![chapter()]);
            let game_id = game.id;
            fixture
                .store
                .commit(WriteBatch::new().insert_game(game))
                .await
                .unwrap();
            fixture.engine.start_game(game_id).await.unwrap();

            let mut rows = fixture.store.list_game_questions(game_id).await.unwrap();
            rows.sort_by_key(|row| row.position);
            let order = rows.iter().map(|row| row.question_id).collect::<Vec<_>>();
            *leads.entry(order[0]).or_default() += 1;
            orders.insert(order);
        }

        // Each question leads a quarter of the games on average; 30 is far in the tail.
        assert_eq!(leads.len(), questions.len());
        for question in &questions {
            let count = leads.get(&question.id).copied().unwrap_or_default();
            assert!(count >= 30, "question led only {count} of {STARTS} games");
        }
        assert!(orders.len() > 1);
    }

    #[tokio::test(start_paused = true)]
    async fn timeout_bounds_reads_but_not_the_commit() {
        let (tx, _events) = mpsc::unbounded_channel();
        let engine = GameEngine::new(
            StoreHandles::from_store(MemoryStore::new()),
            tx,
            Duration::from_millis(50),
        );
        let game_id = Uuid::new_v4();

        let committed = engine
            .run_gated(game_id, || async {
                Ok(Planned::Commit(Box::pin(async {
                    tokio::time::sleep(Duration::from_millis(200)).await;
                    Ok::<_, ServiceError>(7)
                })))
            })
            .await;
        assert_eq!(committed.unwrap(), 7);

        let slow_read = engine
            .run_gated(game_id, || async {
                tokio::time::sleep(Duration::from_millis(200)).await;
                Ok(Planned::Done(()))
            })
            .await;
        assert!(matches!(
            slow_read,
            Err(ServiceError::Unavailable(StorageError::Timeout))
        ));
    }
}
