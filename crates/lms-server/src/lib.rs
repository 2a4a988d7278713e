//! In-memory collaborator service for the lesson player.
//!
//! Serves lessons, per-step progress and the global settings flag over the
//! same JSON contract the player's HTTP clients speak.

pub mod error;
pub mod routes;
pub mod server;
pub mod state;

pub use error::{ServerError, ServerResult};
pub use routes::router;
pub use server::{LmsServer, ServerConfig};
pub use state::{AppState, Settings};
