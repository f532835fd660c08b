//! Courier: moves finished TV downloads from cloud storage into the series
//! library and tells Sonarr and Plex about them.

pub mod app_mode;
pub mod cli;
pub mod config;
pub mod error;
pub mod jobs;
pub mod services;

pub use error::EngineError;
