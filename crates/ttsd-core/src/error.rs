//! Stable error taxonomy shared by every crate in the workspace.
//!
//! The numeric codes mirror the wire-stable codes a client persists across
//! process restarts, so variant order must never change — new variants are
//! appended, never inserted.

use thiserror::Error;

/// Errors returned by coordinator operations (Manager, Session, Speaker).
///
/// Each variant carries the stable numeric code clients key off of; see
/// [`TtsError::code`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum TtsError {
    #[error("operation failed")]
    Fail,
    #[error("TTS is not enabled")]
    NotEnabled,
    #[error("a session already exists for this app id")]
    CreateSessionDuplicate,
    #[error("app id input was empty")]
    EmptyAppIdInput,
    #[error("speaker resource is busy")]
    ResourceBusy,
    #[error("no session found for id")]
    NoSessionFound,
    #[error("nested claim request")]
    NestedClaimRequest,
    #[error("configuration is invalid")]
    InvalidConfiguration,
    #[error("session is not active")]
    SessionNotActive,
    #[error("app not found")]
    AppNotFound,
    #[error("operation violates current resource policy")]
    PolicyViolation,
    #[error("object has been destroyed")]
    ObjectDestroyed,
}

impl TtsError {
    /// Stable numeric code, matching the taxonomy in the external interface.
    pub const fn code(self) -> u32 {
        match self {
            TtsError::Fail => 1,
            TtsError::NotEnabled => 2,
            TtsError::CreateSessionDuplicate => 3,
            TtsError::EmptyAppIdInput => 4,
            TtsError::ResourceBusy => 5,
            TtsError::NoSessionFound => 6,
            TtsError::NestedClaimRequest => 7,
            TtsError::InvalidConfiguration => 8,
            TtsError::SessionNotActive => 9,
            TtsError::AppNotFound => 10,
            TtsError::PolicyViolation => 11,
            TtsError::ObjectDestroyed => 1010,
        }
    }
}

/// `Ok` sentinel alongside [`TtsError`]; kept separate from `code()` so
/// success doesn't need a variant of its own.
pub const TTS_OK: u32 = 0;

pub type Result<T> = std::result::Result<T, TtsError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_are_stable() {
        assert_eq!(TtsError::Fail.code(), 1);
        assert_eq!(TtsError::ObjectDestroyed.code(), 1010);
    }

    #[test]
    fn ok_is_zero() {
        assert_eq!(TTS_OK, 0);
    }
}
