//! Error types for the village runner

use thiserror::Error;

/// Errors reported by a [`GameInterface`](crate::game::GameInterface) implementation
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum GameError {
    /// The game session is no longer logged in
    #[error("Game session is not active")]
    SessionInactive,

    /// The automation driver behind the session broke (browser crashed, page closed)
    #[error("Automation driver failure: {0}")]
    Driver(String),

    /// One entity could not be read; the cached value stays in place
    #[error("Sync failed: {0}")]
    Sync(String),

    /// A command was refused or could not be completed
    #[error("Command failed: {0}")]
    Command(String),

    /// Logging in was rejected
    #[error("Login failed: {0}")]
    Login(String),
}

impl GameError {
    /// Whether this error means the session has to be re-established
    pub fn is_session_loss(&self) -> bool {
        matches!(self, GameError::SessionInactive | GameError::Driver(_))
    }
}

pub type GameResult<T> = Result<T, GameError>;

/// Errors from the target advisor upstream. Never fatal: callers treat any of
/// these as "no suggestions this cycle".
#[derive(Debug, Error)]
pub enum AdvisorError {
    #[error("Advisor request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Advisor returned status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Invalid advisor response: {0}")]
    InvalidResponse(String),

    #[error("Advisor response is not valid JSON: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Errors that end or interrupt a tick of the engine
#[derive(Debug, Error)]
pub enum EngineError {
    /// Stop was requested while the tick was in progress
    #[error("Stop requested")]
    Stopped,

    /// Re-establishing the session was exhausted
    #[error("Could not establish a game session after {attempts} attempt(s): {last_error}")]
    FatalLogin { attempts: u32, last_error: String },

    #[error(transparent)]
    Game(#[from] GameError),
}

/// Configuration loading and validation errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_loss_classification() {
        assert!(GameError::SessionInactive.is_session_loss());
        assert!(GameError::Driver("page closed".to_string()).is_session_loss());
        assert!(!GameError::Sync("troops".to_string()).is_session_loss());
        assert!(!GameError::Command("no resources".to_string()).is_session_loss());
        assert!(!GameError::Login("bad password".to_string()).is_session_loss());
    }
}
