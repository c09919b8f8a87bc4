//! In-process backend used by default and as the test fake.

use std::{
    collections::{HashMap, HashSet},
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
};

use futures::future::BoxFuture;
use indexmap::IndexMap;
use thiserror::Error;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::{QuestionBank, SessionStore, StoreWrite, WriteBatch};
use crate::dao::{
    models::{
        AnswerEntity, ChapterRef, GameEntity, GameQuestionEntity, QuestionEntity,
        TeamAnswerEntity, TeamEntity, sort_team_answers,
    },
    storage::{StorageError, StorageResult},
};

#[derive(Debug, Error)]
#[error("injected storage failure")]
struct InjectedFailure;

#[derive(Default)]
struct MemoryState {
    games: HashMap<Uuid, GameEntity>,
    teams: IndexMap<Uuid, TeamEntity>,
    game_questions: HashMap<Uuid, GameQuestionEntity>,
    team_answers: Vec<TeamAnswerEntity>,
    questions: IndexMap<Uuid, QuestionEntity>,
}

impl MemoryState {
    /// Check every write against the current state without mutating anything.
    fn validate(&self, writes: &[StoreWrite]) -> StorageResult<()> {
        let mut new_games = HashSet::new();
        let mut taken_positions: HashSet<(Uuid, u32)> = self
            .game_questions
            .values()
            .map(|row| (row.game_id, row.position))
            .collect();

        for write in writes {
            match write {
                StoreWrite::InsertGame(game) => {
                    if self.games.contains_key(&game.id) || !new_games.insert(game.id) {
                        return Err(StorageError::Conflict { game_id: game.id });
                    }
                }
                StoreWrite::UpdateGame {
                    game,
                    expected_version,
                } => match self.games.get(&game.id) {
                    Some(stored) if stored.version == *expected_version => {}
                    _ => return Err(StorageError::Conflict { game_id: game.id }),
                },
                StoreWrite::InsertTeam(team) => {
                    if !self.games.contains_key(&team.game_id) && !new_games.contains(&team.game_id)
                    {
                        return Err(StorageError::Conflict {
                            game_id: team.game_id,
                        });
                    }
                }
                StoreWrite::InsertGameQuestions(rows) => {
                    for row in rows {
                        if self.game_questions.contains_key(&row.id)
                            || !taken_positions.insert((row.game_id, row.position))
                        {
                            return Err(StorageError::Conflict {
                                game_id: row.game_id,
                            });
                        }
                    }
                }
            }
        }

        Ok(())
    }

    fn apply(&mut self, writes: Vec<StoreWrite>) {
        for write in writes {
            match write {
                StoreWrite::InsertGame(game) | StoreWrite::UpdateGame { game, .. } => {
                    self.games.insert(game.id, game);
                }
                StoreWrite::InsertTeam(team) => {
                    self.teams.insert(team.id, team);
                }
                StoreWrite::InsertGameQuestions(rows) => {
                    self.game_questions
                        .extend(rows.into_iter().map(|row| (row.id, row)));
                }
            }
        }
    }
}

/// Session store and question bank kept entirely in memory.
#[derive(Clone, Default)]
pub struct MemoryStore {
    state: Arc<RwLock<MemoryState>>,
    fail_next_commit: Arc<AtomicBool>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next [`SessionStore::commit`] fail without applying anything.
    pub fn fail_next_commit(&self) {
        self.fail_next_commit.store(true, Ordering::SeqCst);
    }
}

impl SessionStore for MemoryStore {
    fn commit(&self, batch: WriteBatch) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move {
            let mut guard = store.state.write().await;
            if store.fail_next_commit.swap(false, Ordering::SeqCst) {
                return Err(StorageError::unavailable(
                    "commit rejected".into(),
                    InjectedFailure,
                ));
            }
            guard.validate(batch.writes())?;
            guard.apply(batch.into_writes());
            Ok(())
        })
    }

    fn find_game(&self, id: Uuid) -> BoxFuture<'static, StorageResult<Option<GameEntity>>> {
        let store = self.clone();
        Box::pin(async move { Ok(store.state.read().await.games.get(&id).cloned()) })
    }

    fn list_games(&self, limit: usize) -> BoxFuture<'static, StorageResult<Vec<GameEntity>>> {
        let store = self.clone();
        Box::pin(async move {
            let guard = store.state.read().await;
            let mut games = guard.games.values().cloned().collect::<Vec<_>>();
            games.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(a.id.cmp(&b.id)));
            games.truncate(limit);
            Ok(games)
        })
    }

    fn delete_game(&self, id: Uuid) -> BoxFuture<'static, StorageResult<bool>> {
        let store = self.clone();
        Box::pin(async move {
            let mut guard = store.state.write().await;
            if guard.games.remove(&id).is_none() {
                return Ok(false);
            }
            guard.teams.retain(|_, team| team.game_id != id);
            guard.game_questions.retain(|_, row| row.game_id != id);
            guard.team_answers.retain(|answer| answer.game_id != id);
            Ok(true)
        })
    }

    fn list_teams(&self, game_id: Uuid) -> BoxFuture<'static, StorageResult<Vec<TeamEntity>>> {
        let store = self.clone();
        Box::pin(async move {
            let guard = store.state.read().await;
            Ok(guard
                .teams
                .values()
                .filter(|team| team.game_id == game_id)
                .cloned()
                .collect())
        })
    }

    fn find_game_question(
        &self,
        id: Uuid,
    ) -> BoxFuture<'static, StorageResult<Option<GameQuestionEntity>>> {
        let store = self.clone();
        Box::pin(async move { Ok(store.state.read().await.game_questions.get(&id).cloned()) })
    }

    fn find_game_question_at(
        &self,
        game_id: Uuid,
        position: u32,
    ) -> BoxFuture<'static, StorageResult<Option<GameQuestionEntity>>> {
        let store = self.clone();
        Box::pin(async move {
            let guard = store.state.read().await;
            Ok(guard
                .game_questions
                .values()
                .find(|row| row.game_id == game_id && row.position == position)
                .cloned())
        })
    }

    fn list_game_questions(
        &self,
        game_id: Uuid,
    ) -> BoxFuture<'static, StorageResult<Vec<GameQuestionEntity>>> {
        let store = self.clone();
        Box::pin(async move {
            let guard = store.state.read().await;
            let mut rows = guard
                .game_questions
                .values()
                .filter(|row| row.game_id == game_id)
                .cloned()
                .collect::<Vec<_>>();
            rows.sort_by_key(|row| row.position);
            Ok(rows)
        })
    }

    fn insert_team_answer(
        &self,
        answer: TeamAnswerEntity,
    ) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move {
            store.state.write().await.team_answers.push(answer);
            Ok(())
        })
    }

    fn find_team_answer(
        &self,
        game_id: Uuid,
        team_id: Uuid,
        answer_id: Uuid,
    ) -> BoxFuture<'static, StorageResult<Option<TeamAnswerEntity>>> {
        let store = self.clone();
        Box::pin(async move {
            let guard = store.state.read().await;
            let mut matching = guard
                .team_answers
                .iter()
                .filter(|answer| answer.matches(game_id, team_id, answer_id))
                .cloned()
                .collect::<Vec<_>>();
            sort_team_answers(&mut matching);
            Ok(matching.into_iter().next())
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
            let mut guard = store.state.write().await;
            let before = guard.team_answers.len();
            guard
                .team_answers
                .retain(|answer| !answer.matches(game_id, team_id, answer_id));
            Ok((before - guard.team_answers.len()) as u64)
        })
    }

    fn list_team_answers(
        &self,
        game_id: Uuid,
        team_id: Uuid,
    ) -> BoxFuture<'static, StorageResult<Vec<TeamAnswerEntity>>> {
        let store = self.clone();
        Box::pin(async move {
            let guard = store.state.read().await;
            let mut answers = guard
                .team_answers
                .iter()
                .filter(|answer| answer.game_id == game_id && answer.team_id == team_id)
                .cloned()
                .collect::<Vec<_>>();
            sort_team_answers(&mut answers);
            Ok(answers)
        })
    }

    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>> {
        Box::pin(async { Ok(()) })
    }

    fn try_reconnect(&self) -> BoxFuture<'static, StorageResult<()>> {
        Box::pin(async { Ok(()) })
    }
}

impl QuestionBank for MemoryStore {
    fn questions_for_chapters(
        &self,
        chapters: Vec<ChapterRef>,
    ) -> BoxFuture<'static, StorageResult<Vec<Uuid>>> {
        let store = self.clone();
        Box::pin(async move {
            let guard = store.state.read().await;
            Ok(guard
                .questions
                .values()
                .filter(|question| chapters.iter().any(|chapter| question.in_chapter(chapter)))
                .map(|question| question.id)
                .collect())
        })
    }

    fn find_question(&self, id: Uuid) -> BoxFuture<'static, StorageResult<Option<QuestionEntity>>> {
        let store = self.clone();
        Box::pin(async move { Ok(store.state.read().await.questions.get(&id).cloned()) })
    }

    fn answers_for_question(
        &self,
        question_id: Uuid,
    ) -> BoxFuture<'static, StorageResult<Vec<AnswerEntity>>> {
        let store = self.clone();
        Box::pin(async move {
            let guard = store.state.read().await;
            Ok(guard
                .questions
                .get(&question_id)
                .map(|question| question.answers.clone())
                .unwrap_or_default())
        })
    }

    fn find_answers(&self, ids: Vec<Uuid>) -> BoxFuture<'static, StorageResult<Vec<AnswerEntity>>> {
        let store = self.clone();
        Box::pin(async move {
            let wanted = ids.into_iter().collect::<HashSet<_>>();
            let guard = store.state.read().await;
            Ok(guard
                .questions
                .values()
                .flat_map(|question| question.answers.iter())
                .filter(|answer| wanted.contains(&answer.id))
                .cloned()
                .collect())
        })
    }

    fn list_questions(&self) -> BoxFuture<'static, StorageResult<Vec<QuestionEntity>>> {
        let store = self.clone();
        Box::pin(async move { Ok(store.state.read().await.questions.values().cloned().collect()) })
    }

    fn save_question(&self, question: QuestionEntity) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move {
            store
                .state
                .write()
                .await
                .questions
                .insert(question.id, question);
            Ok(())
        })
    }

    fn delete_question(&self, id: Uuid) -> BoxFuture<'static, StorageResult<bool>> {
        let store = self.clone();
        Box::pin(async move {
            Ok(store
                .state
                .write()
                .await
                .questions
                .shift_remove(&id)
                .is_some())
        })
    }

    fn save_answer(&self, answer: AnswerEntity) -> BoxFuture<'static, StorageResult<bool>> {
        let store = self.clone();
        Box::pin(async move {
            let mut guard = store.state.write().await;
            let Some(question) = guard.questions.get_mut(&answer.question_id) else {
                return Ok(false);
            };
            match question.answers.iter_mut().find(|a| a.id == answer.id) {
                Some(existing) => *existing = answer,
                None => question.answers.push(answer),
            }
            Ok(true)
        })
    }

    fn delete_answer(
        &self,
        question_id: Uuid,
        answer_id: Uuid,
    ) -> BoxFuture<'static, StorageResult<bool>> {
        let store = self.clone();
        Box::pin(async move {
            let mut guard = store.state.write().await;
            let Some(question) = guard.questions.get_mut(&question_id) else {
                return Ok(false);
            };
            let before = question.answers.len();
            question.answers.retain(|answer| answer.id != answer_id);
            Ok(question.answers.len() != before)
        })
    }
}
