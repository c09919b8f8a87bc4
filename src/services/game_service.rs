use std::collections::HashSet;

use futures::TryFutureExt;
use tracing::{debug, info};
use uuid::Uuid;

use crate::{
    dao::{
        models::{ChapterRef, GameEntity, TeamEntity},
        session_store::WriteBatch,
    },
    dto::game::{CreateGameRequest, CreateTeamRequest, GameDetails, GameSummary, TeamSummary},
    error::ServiceError,
    services::{
        engine::{GameEngine, HOME_TEAM_NAME, Planned},
        live_updates::LiveEvent,
    },
};

/// Create an open game together with its home team.
pub async fn create_game(
    engine: &GameEngine,
    request: CreateGameRequest,
) -> Result<GameDetails, ServiceError> {
    let chapters = request
        .chapters
        .into_iter()
        .map(ChapterRef::from)
        .collect::<Vec<_>>();
    let distinct = chapters.iter().collect::<HashSet<_>>();
    if distinct.len() != chapters.len() {
        return Err(ServiceError::InvalidInput(
            "chapters must not contain duplicates".into(),
        ));
    }

    let game = GameEntity::new(
        request.name,
        request.seconds,
        request.question_count,
        chapters,
    );
    let home = TeamEntity::new(game.id, HOME_TEAM_NAME);

    engine
        .sessions()
        .commit(
            WriteBatch::new()
                .insert_game(game.clone())
                .insert_team(home.clone()),
        )
        .await?;
    info!(game_id = %game.id, name = %game.name, "game created");

    engine.notify(LiveEvent::GamesListChanged);
    Ok(GameDetails {
        game: game.into(),
        teams: vec![home.into()],
    })
}

/// Most recently created games, newest first.
pub async fn list_games(
    engine: &GameEngine,
    limit: usize,
) -> Result<Vec<GameSummary>, ServiceError> {
    let games = engine.sessions().list_games(limit).await?;
    debug!(count = games.len(), "listed games");
    Ok(games.into_iter().map(Into::into).collect())
}

/// A game and its teams.
pub async fn get_game(engine: &GameEngine, game_id: Uuid) -> Result<GameDetails, ServiceError> {
    let game = engine.load_game(game_id).await?;
    let teams = engine.sessions().list_teams(game_id).await?;
    Ok(GameDetails {
        game: game.into(),
        teams: teams.into_iter().map(Into::into).collect(),
    })
}

/// Delete a game with everything it owns.
pub async fn delete_game(engine: &GameEngine, game_id: Uuid) -> Result<(), ServiceError> {
    let deleted = engine
        .run_gated(game_id, || async {
            Ok(Planned::Commit(Box::pin(
                engine
                    .sessions()
                    .delete_game(game_id)
                    .map_err(ServiceError::from),
            )))
        })
        .await?;
    if !deleted {
        return Err(ServiceError::NotFound(format!("game `{game_id}` not found")));
    }

    engine.forget_game(game_id);
    info!(%game_id, "game deleted");
    engine.notify(LiveEvent::GamesListChanged);
    Ok(())
}

/// Add a team to an existing game.
///
/// Runs behind the game's gate so it cannot interleave with a deletion.
pub async fn add_team(
    engine: &GameEngine,
    game_id: Uuid,
    request: CreateTeamRequest,
) -> Result<TeamSummary, ServiceError> {
    let team = engine
        .run_gated(game_id, || plan_team(engine, game_id, request.name))
        .await?;
    info!(%game_id, team_id = %team.id, name = %team.name, "team added");

    engine.notify(LiveEvent::TeamChanged {
        game_id,
        team_id: team.id,
    });
    Ok(team.into())
}

async fn plan_team(
    engine: &GameEngine,
    game_id: Uuid,
    name: String,
) -> Result<Planned<TeamEntity>, ServiceError> {
    engine.load_game(game_id).await?;
    let team = TeamEntity::new(game_id, name);
    let write = engine
        .sessions()
        .commit(WriteBatch::new().insert_team(team.clone()));
    Ok(Planned::after(write, team))
}
