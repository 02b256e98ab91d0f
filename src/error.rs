//! Error taxonomy for the log engine.
//!
//! Only three things can go wrong inside the engine: a malformed process list
//! on load, an event naming a process the registry does not know, and a
//! failure reported by one of the external collaborators. Scanning and search
//! never fail.

use thiserror::Error;

/// Result alias used by the engine modules.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    /// The process list handed to `load` was rejected; prior state is kept.
    #[error("invalid process list: {reason}")]
    InvalidLoad { reason: String },

    /// A status or enable request referenced a name absent from the registry.
    #[error("unknown process: {name}")]
    UnknownProcess { name: String },

    /// The supervisor or an auxiliary collaborator reported a failure.
    #[error("{message}")]
    ExternalCallFailure { message: String },
}

impl Error {
    pub fn invalid_load(reason: impl Into<String>) -> Self {
        Self::InvalidLoad {
            reason: reason.into(),
        }
    }

    pub fn unknown_process(name: impl Into<String>) -> Self {
        Self::UnknownProcess { name: name.into() }
    }

    /// Wraps any collaborator error, keeping its message verbatim.
    pub fn external(err: impl std::fmt::Display) -> Self {
        Self::ExternalCallFailure {
            message: err.to_string(),
        }
    }

    /// Stale events after a reload are expected and must not surface to the user.
    pub fn is_stale_event(&self) -> bool {
        matches!(self, Self::UnknownProcess { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn external_keeps_message_verbatim() {
        let err = Error::external(anyhow::anyhow!("spawn failed: No such file"));
        assert_eq!(err.to_string(), "spawn failed: No such file");
    }

    #[test]
    fn only_unknown_process_is_stale() {
        assert!(Error::unknown_process("web").is_stale_event());
        assert!(!Error::invalid_load("empty").is_stale_event());
    }
}
