use mongodb::error::Error as MongoError;
use thiserror::Error;
use uuid::Uuid;

pub type MongoResult<T> = std::result::Result<T, MongoDaoError>;

#[derive(Debug, Error)]
pub enum MongoDaoError {
    #[error("failed to parse MongoDB connection URI `{uri}`")]
    InvalidUri {
        uri: String,
        #[source]
        source: MongoError,
    },
    #[error("failed to build MongoDB client from options")]
    ClientConstruction {
        #[source]
        source: MongoError,
    },
    #[error("MongoDB ping failed during initial connection after {attempts} attempt(s)")]
    InitialPing {
        attempts: u32,
        #[source]
        source: MongoError,
    },
    #[error("MongoDB ping health check failed")]
    HealthPing {
        #[source]
        source: MongoError,
    },
    #[error("failed to ensure index `{index}` on collection `{collection}`")]
    EnsureIndex {
        collection: &'static str,
        index: &'static str,
        #[source]
        source: MongoError,
    },
    #[error("MongoDB transaction failed during `{step}`")]
    Transaction {
        step: &'static str,
        #[source]
        source: MongoError,
    },
    #[error("game `{id}` changed since it was read")]
    VersionConflict { id: Uuid },
    #[error("game `{id}` no longer exists")]
    MissingGame { id: Uuid },
    #[error("failed to load game `{id}`")]
    LoadGame {
        id: Uuid,
        #[source]
        source: MongoError,
    },
    #[error("failed to list games")]
    ListGames {
        #[source]
        source: MongoError,
    },
    #[error("failed to delete game `{id}`")]
    DeleteGame {
        id: Uuid,
        #[source]
        source: MongoError,
    },
    #[error("failed to access teams of game `{game_id}`")]
    Teams {
        game_id: Uuid,
        #[source]
        source: MongoError,
    },
    #[error("failed to access play order of game `{game_id}`")]
    GameQuestions {
        game_id: Uuid,
        #[source]
        source: MongoError,
    },
    #[error("failed to access team answers of game `{game_id}`")]
    TeamAnswers {
        game_id: Uuid,
        #[source]
        source: MongoError,
    },
    #[error("failed to access the question bank")]
    Questions {
        #[source]
        source: MongoError,
    },
}
