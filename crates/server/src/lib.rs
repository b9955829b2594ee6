//! Liveness endpoint for the hosting platform.
//!
//! The bot has no HTTP API; the server only answers `GET /` so the process
//! can be checked while the bot polls Telegram.

pub use server::{run, run_with_listener, spawn_with_listener};

mod server;
