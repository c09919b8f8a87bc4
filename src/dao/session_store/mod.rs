pub mod memory;
#[cfg(feature = "mongo-store")]
pub mod mongodb;

use std::sync::Arc;

use futures::future::BoxFuture;
use uuid::Uuid;

use crate::dao::models::{
    AnswerEntity, ChapterRef, GameEntity, GameQuestionEntity, QuestionEntity, TeamAnswerEntity,
    TeamEntity,
};
use crate::dao::storage::StorageResult;

/// A single write inside a [`WriteBatch`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreWrite {
    /// Insert a brand-new game.
    InsertGame(GameEntity),
    /// Replace a game, provided its stored version still equals `expected_version`.
    UpdateGame {
        /// New state of the game (its `version` already bumped).
        game: GameEntity,
        /// Version the caller read before computing the update.
        expected_version: u64,
    },
    /// Insert a team.
    InsertTeam(TeamEntity),
    /// Insert the materialized play order of a game.
    InsertGameQuestions(Vec<GameQuestionEntity>),
}

/// Ordered set of writes committed atomically: either all apply or none do.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WriteBatch {
    writes: Vec<StoreWrite>,
}

impl WriteBatch {
    /// Start an empty batch.
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue the insertion of a new game.
    pub fn insert_game(mut self, game: GameEntity) -> Self {
        self.writes.push(StoreWrite::InsertGame(game));
        self
    }

    /// Queue an update of `game`, guarded by the version it was read at.
    ///
    /// The stored copy gets `version + 1`.
    pub fn update_game(mut self, mut game: GameEntity) -> Self {
        let expected_version = game.version;
        game.version += 1;
        self.writes.push(StoreWrite::UpdateGame {
            game,
            expected_version,
        });
        self
    }

    /// Queue the insertion of a team.
    pub fn insert_team(mut self, team: TeamEntity) -> Self {
        self.writes.push(StoreWrite::InsertTeam(team));
        self
    }

    /// Queue the insertion of game questions. Empty lists are skipped.
    pub fn insert_game_questions(mut self, rows: Vec<GameQuestionEntity>) -> Self {
        if !rows.is_empty() {
            self.writes.push(StoreWrite::InsertGameQuestions(rows));
        }
        self
    }

    /// Writes in the order they were queued.
    pub fn writes(&self) -> &[StoreWrite] {
        &self.writes
    }

    /// Consume the batch, yielding its writes.
    pub fn into_writes(self) -> Vec<StoreWrite> {
        self.writes
    }

    /// Whether the batch holds no writes.
    pub fn is_empty(&self) -> bool {
        self.writes.is_empty()
    }
}

/// Durable storage for games, teams, game questions and team answers.
pub trait SessionStore: Send + Sync {
    /// Apply every write of the batch atomically.
    fn commit(&self, batch: WriteBatch) -> BoxFuture<'static, StorageResult<()>>;
    fn find_game(&self, id: Uuid) -> BoxFuture<'static, StorageResult<Option<GameEntity>>>;
    /// Most recently created games first, at most `limit` of them.
    fn list_games(&self, limit: usize) -> BoxFuture<'static, StorageResult<Vec<GameEntity>>>;
    /// Delete a game with its teams, game questions and team answers.
    fn delete_game(&self, id: Uuid) -> BoxFuture<'static, StorageResult<bool>>;
    /// Teams of a game in creation order.
    fn list_teams(&self, game_id: Uuid) -> BoxFuture<'static, StorageResult<Vec<TeamEntity>>>;
    fn find_game_question(
        &self,
        id: Uuid,
    ) -> BoxFuture<'static, StorageResult<Option<GameQuestionEntity>>>;
    fn find_game_question_at(
        &self,
        game_id: Uuid,
        position: u32,
    ) -> BoxFuture<'static, StorageResult<Option<GameQuestionEntity>>>;
    /// Play order of a game sorted by position.
    fn list_game_questions(
        &self,
        game_id: Uuid,
    ) -> BoxFuture<'static, StorageResult<Vec<GameQuestionEntity>>>;
    fn insert_team_answer(
        &self,
        answer: TeamAnswerEntity,
    ) -> BoxFuture<'static, StorageResult<()>>;
    /// Earliest record for the triple, if any.
    fn find_team_answer(
        &self,
        game_id: Uuid,
        team_id: Uuid,
        answer_id: Uuid,
    ) -> BoxFuture<'static, StorageResult<Option<TeamAnswerEntity>>>;
    /// Delete every record for the triple, returning how many were removed.
    fn delete_team_answers(
        &self,
        game_id: Uuid,
        team_id: Uuid,
        answer_id: Uuid,
    ) -> BoxFuture<'static, StorageResult<u64>>;
    /// Answers of a team within a game, in canonical scoring order.
    fn list_team_answers(
        &self,
        game_id: Uuid,
        team_id: Uuid,
    ) -> BoxFuture<'static, StorageResult<Vec<TeamAnswerEntity>>>;
    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>>;
    fn try_reconnect(&self) -> BoxFuture<'static, StorageResult<()>>;
}

/// Question and answer records grouped by book and chapter.
pub trait QuestionBank: Send + Sync {
    /// Identifiers of every question in any of the chapters. Order is unspecified.
    fn questions_for_chapters(
        &self,
        chapters: Vec<ChapterRef>,
    ) -> BoxFuture<'static, StorageResult<Vec<Uuid>>>;
    fn find_question(&self, id: Uuid) -> BoxFuture<'static, StorageResult<Option<QuestionEntity>>>;
    fn answers_for_question(
        &self,
        question_id: Uuid,
    ) -> BoxFuture<'static, StorageResult<Vec<AnswerEntity>>>;
    /// Answers matching any of the ids; unknown ids are skipped.
    fn find_answers(&self, ids: Vec<Uuid>) -> BoxFuture<'static, StorageResult<Vec<AnswerEntity>>>;
    fn list_questions(&self) -> BoxFuture<'static, StorageResult<Vec<QuestionEntity>>>;
    /// Insert or replace a question together with its answers.
    fn save_question(&self, question: QuestionEntity) -> BoxFuture<'static, StorageResult<()>>;
    fn delete_question(&self, id: Uuid) -> BoxFuture<'static, StorageResult<bool>>;
    /// Attach an answer to its question. Returns `false` when the question is unknown.
    fn save_answer(&self, answer: AnswerEntity) -> BoxFuture<'static, StorageResult<bool>>;
    fn delete_answer(
        &self,
        question_id: Uuid,
        answer_id: Uuid,
    ) -> BoxFuture<'static, StorageResult<bool>>;
}

/// Both storage roles backed by the same concrete store.
#[derive(Clone)]
pub struct StoreHandles {
    /// Game session records.
    pub sessions: Arc<dyn SessionStore>,
    /// Question bank records.
    pub questions: Arc<dyn QuestionBank>,
}

impl StoreHandles {
    /// Share one store between both roles.
    pub fn from_store<S>(store: S) -> Self
    where
        S: SessionStore + QuestionBank + 'static,
    {
        let store = Arc::new(store);
        Self {
            sessions: store.clone(),
            questions: store,
        }
    }
}
