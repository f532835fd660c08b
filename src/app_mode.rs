//! Which pipeline the process runs.

use std::env;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RunMode {
    /// Loop over grabbed-download job markers.
    #[default]
    Grabbed,
    /// Replay the download client's failed imports once and exit.
    Failed,
}

impl RunMode {
    pub fn from_env() -> Self {
        env::var("RUN_MODE")
            .ok()
            .and_then(|value| Self::from_arg(&value))
            .unwrap_or_default()
    }

    pub fn from_arg(value: &str) -> Option<Self> {
        match value {
            "grabbed" => Some(RunMode::Grabbed),
            "failed" => Some(RunMode::Failed),
            _ => None,
        }
    }
}
