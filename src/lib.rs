pub mod attachments;
pub mod auth;
pub mod comments;
pub mod config;
pub mod error;
pub mod mail;
pub mod models;
pub mod openapi;
pub mod password;
pub mod rate_limit; // in-memory rate limiting
pub mod reactions;
pub mod repo;
pub mod routes;
pub mod security;
pub mod statistics;
pub mod storage;
pub mod tasks;
pub mod verification;

// Re-export commonly used items for tests / external users
pub use config::AppConfig;
pub use routes::{config, AppState};
pub use security::SecurityHeaders;
