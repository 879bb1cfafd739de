//! Chainflow Core — transport-agnostic domain logic for the Chainflow
//! workflow engine.
//!
//! A workflow is an ordered list of entities. Triggering it runs every entity
//! in turn through a text-generation backend, feeding each output into the
//! next input, and records one run row per entity.
//!
//! This crate has **no HTTP framework dependency** by default, so it backs
//! both the HTTP server (`chainflow-server`) and the CLI.
//!
//! # Feature Flags
//!
//! - `axum` — Enables `IntoResponse` impl on `ServerError` for use in axum handlers.

pub mod chain;
pub mod config;
pub mod db;
pub mod definition;
pub mod error;
pub mod events;
pub mod generation;
pub mod models;
pub mod state;
pub mod store;

#[cfg(test)]
mod testing;

// Convenience re-exports
pub use db::Database;
pub use error::ServerError;
pub use state::{AppState, AppStateInner};
