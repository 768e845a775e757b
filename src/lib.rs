// ABOUTME: Library crate for the table-mirror CLI
// ABOUTME: Exposes the mirror engine, configuration, and command layers

pub mod commands;
pub mod config;
pub mod mirror;
pub mod mysql;
pub mod utils;

pub use config::{EndpointConfig, MirrorConfig, RetryPolicy};
pub use mirror::{SyncOrchestrator, SyncReport};
