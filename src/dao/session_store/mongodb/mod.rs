mod config;
mod connection;
mod error;
mod models;
pub mod store;

pub use config::MongoConfig;
pub use error::MongoDaoError;
pub use store::MongoSessionStore;

use crate::dao::storage::StorageError;

impl From<MongoDaoError> for StorageError {
    fn from(err: MongoDaoError) -> Self {
        match err {
            MongoDaoError::VersionConflict { id } | MongoDaoError::MissingGame { id } => {
                StorageError::Conflict { game_id: id }
            }
            other => StorageError::unavailable(other.to_string(), other),
        }
    }
}
