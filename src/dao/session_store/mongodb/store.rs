use std::{collections::HashSet, sync::Arc};

use futures::{TryStreamExt, future::BoxFuture};
use mongodb::{
    Client, ClientSession, Collection, Database, IndexModel,
    bson::{Bson, Document, doc},
    options::IndexOptions,
};
use tokio::sync::RwLock;
use uuid::Uuid;

use super::{
    config::MongoConfig,
    connection::establish_connection,
    error::{MongoDaoError, MongoResult},
    models::{
        MongoGameDocument, MongoGameQuestionDocument, MongoQuestionDocument,
        MongoTeamAnswerDocument, MongoTeamDocument, bson_id, doc_id,
    },
};
use crate::dao::{
    models::{
        AnswerEntity, ChapterRef, GameEntity, GameQuestionEntity, QuestionEntity,
        TeamAnswerEntity, TeamEntity,
    },
    session_store::{QuestionBank, SessionStore, StoreWrite, WriteBatch},
    storage::StorageResult,
};

const GAME_COLLECTION_NAME: &str = "games";
const TEAM_COLLECTION_NAME: &str = "teams";
const GAME_QUESTION_COLLECTION_NAME: &str = "game_questions";
const TEAM_ANSWER_COLLECTION_NAME: &str = "team_answers";
const QUESTION_COLLECTION_NAME: &str = "questions";

/// MongoDB backend. Batches run inside a multi-document transaction, which
/// requires a replica set deployment.
#[derive(Clone)]
pub struct MongoSessionStore {
    inner: Arc<MongoInner>,
}

struct MongoInner {
    state: RwLock<MongoState>,
    config: MongoConfig,
}

struct MongoState {
    client: Client,
    database: Database,
}

impl MongoInner {
    async fn ping(&self) -> MongoResult<()> {
        let database = {
            let guard = self.state.read().await;
            guard.database.clone()
        };

        database
            .run_command(doc! { "ping": 1 })
            .await
            .map_err(|source| MongoDaoError::HealthPing { source })?;
        Ok(())
    }

    async fn reconnect(&self) -> MongoResult<()> {
        let (client, database) = establish_connection(&self.config).await?;
        let mut guard = self.state.write().await;
        guard.client = client;
        guard.database = database;
        Ok(())
    }
}

impl MongoSessionStore {
    /// Establish a connection to MongoDB and ensure indexes are present.
    pub async fn connect(config: MongoConfig) -> MongoResult<Self> {
        let (client, database) = establish_connection(&config).await?;

        let inner = Arc::new(MongoInner {
            state: RwLock::new(MongoState { client, database }),
            config,
        });

        let store = Self { inner };
        store.ensure_indexes().await?;
        Ok(store)
    }

    async fn ensure_indexes(&self) -> MongoResult<()> {
        let database = self.database().await;

        let positions = IndexModel::builder()
            .keys(doc! {"game_id": 1, "position": 1})
            .options(
                IndexOptions::builder()
                    .name(Some("game_position_idx".to_owned()))
                    .unique(Some(true))
                    .build(),
            )
            .build();
        database
            .collection::<Document>(GAME_QUESTION_COLLECTION_NAME)
            .create_index(positions)
            .await
            .map_err(|source| MongoDaoError::EnsureIndex {
                collection: GAME_QUESTION_COLLECTION_NAME,
                index: "game_id,position",
                source,
            })?;

        let team_answers = IndexModel::builder()
            .keys(doc! {"game_id": 1, "team_id": 1, "created_at": 1})
            .options(
                IndexOptions::builder()
                    .name(Some("team_answer_order_idx".to_owned()))
                    .build(),
            )
            .build();
        database
            .collection::<Document>(TEAM_ANSWER_COLLECTION_NAME)
            .create_index(team_answers)
            .await
            .map_err(|source| MongoDaoError::EnsureIndex {
                collection: TEAM_ANSWER_COLLECTION_NAME,
                index: "game_id,team_id,created_at",
                source,
            })?;

        let chapters = IndexModel::builder()
            .keys(doc! {"book": 1, "chapter": 1})
            .options(
                IndexOptions::builder()
                    .name(Some("question_chapter_idx".to_owned()))
                    .build(),
            )
            .build();
        database
            .collection::<Document>(QUESTION_COLLECTION_NAME)
            .create_index(chapters)
            .await
            .map_err(|source| MongoDaoError::EnsureIndex {
                collection: QUESTION_COLLECTION_NAME,
                index: "book,chapter",
                source,
            })?;

        Ok(())
    }

    async fn client(&self) -> Client {
        let guard = self.inner.state.read().await;
        guard.client.clone()
    }

    async fn database(&self) -> Database {
        let guard = self.inner.state.read().await;
        guard.database.clone()
    }

    async fn games(&self) -> Collection<MongoGameDocument> {
        self.database().await.collection(GAME_COLLECTION_NAME)
    }

    async fn teams(&self) -> Collection<MongoTeamDocument> {
        self.database().await.collection(TEAM_COLLECTION_NAME)
    }

    async fn game_questions(&self) -> Collection<MongoGameQuestionDocument> {
        self.database().await.collection(GAME_QUESTION_COLLECTION_NAME)
    }

    async fn team_answers(&self) -> Collection<MongoTeamAnswerDocument> {
        self.database().await.collection(TEAM_ANSWER_COLLECTION_NAME)
    }

    async fn questions(&self) -> Collection<MongoQuestionDocument> {
        self.database().await.collection(QUESTION_COLLECTION_NAME)
    }

    async fn commit(&self, batch: WriteBatch) -> MongoResult<()> {
        if batch.is_empty() {
            return Ok(());
        }

        let client = self.client().await;
        let mut session = client
            .start_session()
            .await
            .map_err(|source| MongoDaoError::Transaction {
                step: "start_session",
                source,
            })?;
        session
            .start_transaction()
            .await
            .map_err(|source| MongoDaoError::Transaction {
                step: "start_transaction",
                source,
            })?;

        match self.apply_writes(&mut session, batch).await {
            Ok(()) => session
                .commit_transaction()
                .await
                .map_err(|source| MongoDaoError::Transaction {
                    step: "commit_transaction",
                    source,
                }),
            Err(err) => {
                // The transaction is discarded either way; the write error is the one to report.
                let _ = session.abort_transaction().await;
                Err(err)
            }
        }
    }

    async fn apply_writes(&self, session: &mut ClientSession, batch: WriteBatch) -> MongoResult<()> {
        let transaction_error = |source| MongoDaoError::Transaction {
            step: "write",
            source,
        };

        for write in batch.into_writes() {
            match write {
                StoreWrite::InsertGame(game) => {
                    let document: MongoGameDocument = game.into();
                    self.games()
                        .await
                        .insert_one(&document)
                        .session(&mut *session)
                        .await
                        .map_err(transaction_error)?;
                }
                StoreWrite::UpdateGame {
                    game,
                    expected_version,
                } => {
                    let id = game.id;
                    let document: MongoGameDocument = game.into();
                    let result = self
                        .games()
                        .await
                        .replace_one(
                            doc! {"_id": bson_id(id), "version": expected_version as i64},
                            &document,
                        )
                        .session(&mut *session)
                        .await
                        .map_err(transaction_error)?;
                    if result.matched_count == 0 {
                        return Err(MongoDaoError::VersionConflict { id });
                    }
                }
                StoreWrite::InsertTeam(team) => {
                    let game_id = team.game_id;
                    let games = self
                        .games()
                        .await
                        .count_documents(doc_id(game_id))
                        .session(&mut *session)
                        .await
                        .map_err(transaction_error)?;
                    if games == 0 {
                        return Err(MongoDaoError::MissingGame { id: game_id });
                    }
                    let document: MongoTeamDocument = team.into();
                    self.teams()
                        .await
                        .insert_one(&document)
                        .session(&mut *session)
                        .await
                        .map_err(transaction_error)?;
                }
                StoreWrite::InsertGameQuestions(rows) => {
                    let documents = rows
                        .into_iter()
                        .map(MongoGameQuestionDocument::from)
                        .collect::<Vec<_>>();
                    self.game_questions()
                        .await
                        .insert_many(documents)
                        .session(&mut *session)
                        .await
                        .map_err(transaction_error)?;
                }
            }
        }

        Ok(())
    }

    async fn find_game(&self, id: Uuid) -> MongoResult<Option<GameEntity>> {
        let document = self
            .games()
            .await
            .find_one(doc_id(id))
            .await
            .map_err(|source| MongoDaoError::LoadGame { id, source })?;
        Ok(document.map(Into::into))
    }

    async fn list_games(&self, limit: usize) -> MongoResult<Vec<GameEntity>> {
        let documents: Vec<MongoGameDocument> = self
            .games()
            .await
            .find(doc! {})
            .sort(doc! {"created_at": -1})
            .limit(limit as i64)
            .await
            .map_err(|source| MongoDaoError::ListGames { source })?
            .try_collect()
            .await
            .map_err(|source| MongoDaoError::ListGames { source })?;

        Ok(documents.into_iter().map(Into::into).collect())
    }

    async fn delete_game(&self, id: Uuid) -> MongoResult<bool> {
        let client = self.client().await;
        let delete_error = |source| MongoDaoError::DeleteGame { id, source };
        let mut session = client.start_session().await.map_err(delete_error)?;
        session.start_transaction().await.map_err(delete_error)?;

        let owned = doc! {"game_id": bson_id(id)};
        let outcome: MongoResult<bool> = async {
            let result = self
                .games()
                .await
                .delete_one(doc_id(id))
                .session(&mut session)
                .await
                .map_err(delete_error)?;
            if result.deleted_count == 0 {
                return Ok(false);
            }
            self.teams()
                .await
                .delete_many(owned.clone())
                .session(&mut session)
                .await
                .map_err(delete_error)?;
            self.game_questions()
                .await
                .delete_many(owned.clone())
                .session(&mut session)
                .await
                .map_err(delete_error)?;
            self.team_answers()
                .await
                .delete_many(owned.clone())
                .session(&mut session)
                .await
                .map_err(delete_error)?;
            Ok(true)
        }
        .await;

        match outcome {
            Ok(true) => {
                session.commit_transaction().await.map_err(delete_error)?;
                Ok(true)
            }
            Ok(false) => {
                let _ = session.abort_transaction().await;
                Ok(false)
            }
            Err(err) => {
                let _ = session.abort_transaction().await;
                Err(err)
            }
        }
    }

    async fn list_teams(&self, game_id: Uuid) -> MongoResult<Vec<TeamEntity>> {
        let teams_error = |source| MongoDaoError::Teams { game_id, source };
        let documents: Vec<MongoTeamDocument> = self
            .teams()
            .await
            .find(doc! {"game_id": bson_id(game_id)})
            .sort(doc! {"$natural": 1})
            .await
            .map_err(teams_error)?
            .try_collect()
            .await
            .map_err(teams_error)?;
        Ok(documents.into_iter().map(Into::into).collect())
    }

    async fn find_game_question(&self, id: Uuid) -> MongoResult<Option<GameQuestionEntity>> {
        let document = self
            .game_questions()
            .await
            .find_one(doc_id(id))
            .await
            .map_err(|source| MongoDaoError::GameQuestions {
                game_id: id,
                source,
            })?;
        Ok(document.map(Into::into))
    }

    async fn find_game_question_at(
        &self,
        game_id: Uuid,
        position: u32,
    ) -> MongoResult<Option<GameQuestionEntity>> {
        let document = self
            .game_questions()
            .await
            .find_one(doc! {"game_id": bson_id(game_id), "position": position as i64})
            .await
            .map_err(|source| MongoDaoError::GameQuestions { game_id, source })?;
        Ok(document.map(Into::into))
    }

    async fn list_game_questions(&self, game_id: Uuid) -> MongoResult<Vec<GameQuestionEntity>> {
        let rows_error = |source| MongoDaoError::GameQuestions { game_id, source };
        let documents: Vec<MongoGameQuestionDocument> = self
            .game_questions()
            .await
            .find(doc! {"game_id": bson_id(game_id)})
            .sort(doc! {"position": 1})
            .await
            .map_err(rows_error)?
            .try_collect()
            .await
            .map_err(rows_error)?;
        Ok(documents.into_iter().map(Into::into).collect())
    }

    async fn insert_team_answer(&self, answer: TeamAnswerEntity) -> MongoResult<()> {
        let game_id = answer.game_id;
        let document: MongoTeamAnswerDocument = answer.into();
        self.team_answers()
            .await
            .insert_one(&document)
            .await
            .map_err(|source| MongoDaoError::TeamAnswers { game_id, source })?;
        Ok(())
    }

    async fn find_team_answer(
        &self,
        game_id: Uuid,
        team_id: Uuid,
        answer_id: Uuid,
    ) -> MongoResult<Option<TeamAnswerEntity>> {
        let document = self
            .team_answers()
            .await
            .find_one(triple_filter(game_id, team_id, answer_id))
            .sort(doc! {"created_at": 1, "_id": 1})
            .await
            .map_err(|source| MongoDaoError::TeamAnswers { game_id, source })?;
        Ok(document.map(Into::into))
    }

    async fn delete_team_answers(
        &self,
        game_id: Uuid,
        team_id: Uuid,
        answer_id: Uuid,
    ) -> MongoResult<u64> {
        let result = self
            .team_answers()
            .await
            .delete_many(triple_filter(game_id, team_id, answer_id))
            .await
            .map_err(|source| MongoDaoError::TeamAnswers { game_id, source })?;
        Ok(result.deleted_count)
    }

    async fn list_team_answers(
        &self,
        game_id: Uuid,
        team_id: Uuid,
    ) -> MongoResult<Vec<TeamAnswerEntity>> {
        let answers_error = |source| MongoDaoError::TeamAnswers { game_id, source };
        let documents: Vec<MongoTeamAnswerDocument> = self
            .team_answers()
            .await
            .find(doc! {"game_id": bson_id(game_id), "team_id": bson_id(team_id)})
            .sort(doc! {"created_at": 1, "_id": 1})
            .await
            .map_err(answers_error)?
            .try_collect()
            .await
            .map_err(answers_error)?;
        Ok(documents.into_iter().map(Into::into).collect())
    }

    async fn load_questions(&self, filter: Document) -> MongoResult<Vec<QuestionEntity>> {
        let questions_error = |source| MongoDaoError::Questions { source };
        let documents: Vec<MongoQuestionDocument> = self
            .questions()
            .await
            .find(filter)
            .sort(doc! {"book": 1, "chapter": 1, "verses": 1})
            .await
            .map_err(questions_error)?
            .try_collect()
            .await
            .map_err(questions_error)?;
        Ok(documents.into_iter().map(Into::into).collect())
    }

    async fn questions_for_chapters(&self, chapters: Vec<ChapterRef>) -> MongoResult<Vec<Uuid>> {
        if chapters.is_empty() {
            return Ok(Vec::new());
        }

        let any_chapter = chapters
            .into_iter()
            .map(|chapter| Bson::Document(doc! {"book": chapter.book, "chapter": chapter.chapter}))
            .collect::<Vec<_>>();
        let questions = self.load_questions(doc! {"$or": any_chapter}).await?;
        Ok(questions.into_iter().map(|question| question.id).collect())
    }

    async fn find_question(&self, id: Uuid) -> MongoResult<Option<QuestionEntity>> {
        let document = self
            .questions()
            .await
            .find_one(doc_id(id))
            .await
            .map_err(|source| MongoDaoError::Questions { source })?;
        Ok(document.map(Into::into))
    }

    async fn find_answers(&self, ids: Vec<Uuid>) -> MongoResult<Vec<AnswerEntity>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let wanted = ids.iter().copied().collect::<HashSet<_>>();
        let any_id = ids.into_iter().map(bson_id).collect::<Vec<_>>();
        let questions = self
            .load_questions(doc! {"answers.id": {"$in": any_id}})
            .await?;
        Ok(questions
            .into_iter()
            .flat_map(|question| question.answers)
            .filter(|answer| wanted.contains(&answer.id))
            .collect())
    }

    async fn save_question(&self, question: QuestionEntity) -> MongoResult<()> {
        let id = question.id;
        let document: MongoQuestionDocument = question.into();
        self.questions()
            .await
            .replace_one(doc_id(id), &document)
            .upsert(true)
            .await
            .map_err(|source| MongoDaoError::Questions { source })?;
        Ok(())
    }

    async fn delete_question(&self, id: Uuid) -> MongoResult<bool> {
        let result = self
            .questions()
            .await
            .delete_one(doc_id(id))
            .await
            .map_err(|source| MongoDaoError::Questions { source })?;
        Ok(result.deleted_count > 0)
    }

    async fn save_answer(&self, answer: AnswerEntity) -> MongoResult<bool> {
        let Some(mut question) = self.find_question(answer.question_id).await? else {
            return Ok(false);
        };
        match question.answers.iter_mut().find(|a| a.id == answer.id) {
            Some(existing) => *existing = answer,
            None => question.answers.push(answer),
        }
        self.save_question(question).await?;
        Ok(true)
    }

    async fn delete_answer(&self, question_id: Uuid, answer_id: Uuid) -> MongoResult<bool> {
        let result = self
            .questions()
            .await
            .update_one(
                doc_id(question_id),
                doc! {"$pull": {"answers": {"id": bson_id(answer_id)}}},
            )
            .await
            .map_err(|source| MongoDaoError::Questions { source })?;
        Ok(result.modified_count > 0)
    }
}

fn triple_filter(game_id: Uuid, team_id: Uuid, answer_id: Uuid) -> Document {
    doc! {
        "game_id": bson_id(game_id),
        "team_id": bson_id(team_id),
        "answer_id": bson_id(answer_id),
    }
}

impl SessionStore for MongoSessionStore {
    fn commit(&self, batch: WriteBatch) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.commit(batch).await.map_err(Into::into) })
    }

    fn find_game(&self, id: Uuid) -> BoxFuture<'static, StorageResult<Option<GameEntity>>> {
        let store = self.clone();
        Box::pin(async move { store.find_game(id).await.map_err(Into::into) })
    }

    fn list_games(&self, limit: usize) -> BoxFuture<'static, StorageResult<Vec<GameEntity>>> {
        let store = self.clone();
        Box::pin(async move { store.list_games(limit).await.map_err(Into::into) })
    }

    fn delete_game(&self, id: Uuid) -> BoxFuture<'static, StorageResult<bool>> {
        let store = self.clone();
        Box::pin(async move { store.delete_game(id).await.map_err(Into::into) })
    }

    fn list_teams(&self, game_id: Uuid) -> BoxFuture<'static, StorageResult<Vec<TeamEntity>>> {
        let store = self.clone();
        Box::pin(async move { store.list_teams(game_id).await.map_err(Into::into) })
    }

    fn find_game_question(
        &self,
        id: Uuid,
    ) -> BoxFuture<'static, StorageResult<Option<GameQuestionEntity>>> {
        let store = self.clone();
        Box::pin(async move { store.find_game_question(id).await.map_err(Into::into) })
    }

    fn find_game_question_at(
        &self,
        game_id: Uuid,
        position: u32,
    ) -> BoxFuture<'static, StorageResult<Option<GameQuestionEntity>>> {
        let store = self.clone();
        Box::pin(async move {
            store
                .find_game_question_at(game_id, position)
                .await
                .map_err(Into::into)
        })
    }

    fn list_game_questions(
        &self,
        game_id: Uuid,
    ) -> BoxFuture<'static, StorageResult<Vec<GameQuestionEntity>>> {
        let store = self.clone();
        Box::pin(async move { store.list_game_questions(game_id).await.map_err(Into::into) })
    }

    fn insert_team_answer(
        &self,
        answer: TeamAnswerEntity,
    ) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.insert_team_answer(answer).await.map_err(Into::into) })
    }

    fn find_team_answer(
        &self,
        game_id: Uuid,
        team_id: Uuid,
        answer_id: Uuid,
    ) -> BoxFuture<'static, StorageResult<Option<TeamAnswerEntity>>> {
        let store = self.clone();
        Box::pin(async move {
            store
                .find_team_answer(game_id, team_id, answer_id)
                .await
                .map_err(Into::into)
        })
    }

    fn delete_team_answers(
        &self,
        game_id: Uuid,
        team_id: Uuid,
        answer_id: Uuid,
    ) -> BoxFuture<'static, StorageResult<u64>> {
        let store = self.clone();
        Box::pin(async move {
            store
                .delete_team_answers(game_id, team_id, answer_id)
                .await
                .map_err(Into::into)
        })
    }

    fn list_team_answers(
        &self,
        game_id: Uuid,
        team_id: Uuid,
    ) -> BoxFuture<'static, StorageResult<Vec<TeamAnswerEntity>>> {
        let store = self.clone();
        Box::pin(async move {
            store
                .list_team_answers(game_id, team_id)
                .await
                .map_err(Into::into)
        })
    }

    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.inner.ping().await.map_err(Into::into) })
    }

    fn try_reconnect(&self) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.inner.reconnect().await.map_err(Into::into) })
    }
}

impl QuestionBank for MongoSessionStore {
    fn questions_for_chapters(
        &self,
        chapters: Vec<ChapterRef>,
    ) -> BoxFuture<'static, StorageResult<Vec<Uuid>>> {
        let store = self.clone();
        Box::pin(async move {
            store
                .questions_for_chapters(chapters)
                .await
                .map_err(Into::into)
        })
    }

    fn find_question(&self, id: Uuid) -> BoxFuture<'static, StorageResult<Option<QuestionEntity>>> {
        let store = self.clone();
        Box::pin(async move { store.find_question(id).await.map_err(Into::into) })
    }

    fn answers_for_question(
        &self,
        question_id: Uuid,
    ) -> BoxFuture<'static, StorageResult<Vec<AnswerEntity>>> {
        let store = self.clone();
        Box::pin(async move {
            let question = store.find_question(question_id).await?;
            Ok(question.map(|question| question.answers).unwrap_or_default())
        })
    }

    fn find_answers(&self, ids: Vec<Uuid>) -> BoxFuture<'static, StorageResult<Vec<AnswerEntity>>> {
        let store = self.clone();
        Box::pin(async move { store.find_answers(ids).await.map_err(Into::into) })
    }

    fn list_questions(&self) -> BoxFuture<'static, StorageResult<Vec<QuestionEntity>>> {
        let store = self.clone();
        Box::pin(async move { store.load_questions(doc! {}).await.map_err(Into::into) })
    }

    fn save_question(&self, question: QuestionEntity) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.save_question(question).await.map_err(Into::into) })
    }

    fn delete_question(&self, id: Uuid) -> BoxFuture<'static, StorageResult<bool>> {
        let store = self.clone();
        Box::pin(async move { store.delete_question(id).await.map_err(Into::into) })
    }

    fn save_answer(&self, answer: AnswerEntity) -> BoxFuture<'static, StorageResult<bool>> {
        let store = self.clone();
        Box::pin(async move { store.save_answer(answer).await.map_err(Into::into) })
    }

    fn delete_answer(
        &self,
        question_id: Uuid,
        answer_id: Uuid,
    ) -> BoxFuture<'static, StorageResult<bool>> {
        let store = self.clone();
        Box::pin(async move {
            store
                .delete_answer(question_id, answer_id)
                .await
                .map_err(Into::into)
        })
    }
}
