#![forbid(unsafe_code)]

//! Coordinates seeding a MySQL replica's data directory from a healthy
//! source host onto a target host through their remote agents.

pub mod agent;
pub mod api;
pub mod config;
pub mod errors;
pub mod models;
pub mod orchestrator;
pub mod persistence;

pub use config::GlobalConfig;
pub use errors::{AppError, Result};
