pub mod auth;
pub mod chat;
pub mod config;
pub mod error;
pub mod gemini;
pub mod persona;
pub mod router;
pub mod server;
pub mod storage;
pub mod users;
