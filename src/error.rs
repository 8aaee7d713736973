//! Unified error types for the provisioning core.
//!
//! A single `Error` enum that every subsystem can convert into, keeping the
//! control loop's error handling uniform. All variants are `Copy` so they
//! can be passed through the supervisor and mode arbiter without allocation.

use core::fmt;

pub use crate::app::ports::{ConfigError, StorageError};

// ---------------------------------------------------------------------------
// Top-level error
// ---------------------------------------------------------------------------

/// Every fallible operation in the crate funnels into this type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// A storage location could not be read or written.
    Storage(StorageError),
    /// A record or the manager configuration is invalid.
    Config(ConfigError),
    /// The auxiliary field registry was declared incorrectly.
    Registry(RegistryError),
    /// No credential set could be joined.
    Join(JoinError),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Storage(e) => write!(f, "storage: {e}"),
            Self::Config(e) => write!(f, "config: {e}"),
            Self::Registry(e) => write!(f, "registry: {e}"),
            Self::Join(e) => write!(f, "join: {e}"),
        }
    }
}

impl std::error::Error for Error {}

impl From<StorageError> for Error {
    fn from(e: StorageError) -> Self {
        Self::Storage(e)
    }
}

impl From<ConfigError> for Error {
    fn from(e: ConfigError) -> Self {
        Self::Config(e)
    }
}

// ---------------------------------------------------------------------------
// Registry errors
// ---------------------------------------------------------------------------

/// Raised while building the auxiliary field registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegistryError {
    /// More fields than [`MAX_AUX_FIELDS`](crate::registry::MAX_AUX_FIELDS).
    TooManyFields,
    /// Field id is empty, too long, or collides with a built-in key.
    InvalidId,
    /// `max_len` is zero, over 255, or larger than the backing buffer.
    InvalidLength,
    /// Two fields share the same id.
    DuplicateId,
}

impl fmt::Display for RegistryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TooManyFields => write!(f, "too many auxiliary fields"),
            Self::InvalidId => write!(f, "invalid field id"),
            Self::InvalidLength => write!(f, "invalid field length"),
            Self::DuplicateId => write!(f, "duplicate field id"),
        }
    }
}

impl std::error::Error for RegistryError {}

impl From<RegistryError> for Error {
    fn from(e: RegistryError) -> Self {
        Self::Registry(e)
    }
}

// ---------------------------------------------------------------------------
// Join errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinError {
    /// No credential set met the minimum secret length.
    NoCandidates,
    /// The poll budget ran out before the link came up.
    Timeout,
    /// The network capability reported a hard failure.
    Rejected,
}

impl fmt::Display for JoinError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoCandidates => write!(f, "no usable credential set"),
            Self::Timeout => write!(f, "join poll budget exhausted"),
            Self::Rejected => write!(f, "network rejected all candidates"),
        }
    }
}

impl std::error::Error for JoinError {}

impl From<JoinError> for Error {
    fn from(e: JoinError) -> Self {
        Self::Join(e)
    }
}

// ---------------------------------------------------------------------------
// Convenience Result alias
// ---------------------------------------------------------------------------

/// Crate-wide `Result` alias.
pub type Result<T> = core::result::Result<T, Error>;
