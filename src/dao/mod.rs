/// Database model definitions.
pub mod models;
/// Session store and question bank backends.
pub mod session_store;
/// Storage abstraction layer for database operations.
pub mod storage;
