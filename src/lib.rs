//! Library crate for the trivia session backend: game lifecycle engine, stores,
//! HTTP routes and live updates, exposed for the binaries and integration tests.

pub mod config;
pub mod dao;
pub mod dto;
pub mod error;
pub mod routes;
pub mod services;
pub mod state;
