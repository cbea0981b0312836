use thiserror::Error;

/// Result alias used throughout the crate.
pub type Result<T, E = Error> = core::result::Result<T, E>;

/// Errors reported by the engine, its composites and the resampler.
#[derive(Debug, Error)]
pub enum Error {
    /// A consistency check failed. This is always a bug in a plugin or in the
    /// engine itself, never something the caller did wrong.
    #[error("internal error (please report this as a bug): {0}")]
    Internal(#[from] InternalError),

    /// The same plugin instance was reachable twice from one call.
    #[error("plugin {name} appears more than once in the processing graph; each instance may only be used once per call")]
    DuplicatePlugin { name: String },

    #[error("channel mismatch: expected {expected} channels, got {actual}")]
    ChannelMismatch { expected: usize, actual: usize },

    #[error("invalid value for {name}: {reason}")]
    InvalidParameter { name: &'static str, reason: String },
}

/// Violated invariants. Wrapped in [`Error::Internal`].
#[derive(Debug, Error)]
pub enum InternalError {
    #[error("plugin {plugin} returned {produced} samples but was only given {requested}")]
    TooManySamples {
        plugin: String,
        produced: usize,
        requested: usize,
    },

    #[error("{region} would overflow: {requested} samples pushed with only {free} free")]
    CapacityExceeded {
        region: &'static str,
        requested: usize,
        free: usize,
    },

    #[error("{region} underflow: {requested} samples requested with only {available} available")]
    Underflow {
        region: &'static str,
        requested: usize,
        available: usize,
    },

    #[error("plugin {plugin} was entered while already being processed")]
    ReentrantAccess { plugin: String },
}

impl Error {
    /// Returns true for errors that indicate a bug rather than misuse.
    pub fn is_internal(&self) -> bool {
        matches!(self, Error::Internal(_))
    }

    pub(crate) fn invalid(name: &'static str, reason: impl Into<String>) -> Self {
        Error::InvalidParameter {
            name,
            reason: reason.into(),
        }
    }
}
