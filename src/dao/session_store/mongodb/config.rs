use mongodb::options::ClientOptions;

use super::error::{MongoDaoError, MongoResult};

const DEFAULT_DATABASE_NAME: &str = "trivia";
/// Pings attempted before the initial connection is reported as failed.
const DEFAULT_CONNECT_ATTEMPTS: u32 = 10;

/// Parsed connection settings for the session store.
#[derive(Clone)]
pub struct MongoConfig {
    /// Driver options parsed from the connection string.
    pub options: ClientOptions,
    /// Database holding the game and question bank collections.
    pub database_name: String,
    /// Pings attempted while establishing a connection.
    pub connect_attempts: u32,
}

impl MongoConfig {
    /// Parse `uri`, using `trivia` as database when `database` is not given.
    pub async fn from_uri(uri: &str, database: Option<&str>) -> MongoResult<Self> {
        let options = ClientOptions::parse(uri)
            .await
            .map_err(|source| MongoDaoError::InvalidUri {
                uri: uri.to_owned(),
                source,
            })?;

        Ok(Self {
            options,
            database_name: database
                .filter(|name| !name.is_empty())
                .unwrap_or(DEFAULT_DATABASE_NAME)
                .to_owned(),
            connect_attempts: DEFAULT_CONNECT_ATTEMPTS,
        })
    }
}
