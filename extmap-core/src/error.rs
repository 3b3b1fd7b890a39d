use thiserror::Error;

/// Errors reported while validating input before it reaches a map.
///
/// Broken preconditions of the map operations themselves (merging extents that do
/// not touch, removing a range that is not mapped, unsorted complement input) are
/// not represented here: they panic.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Offset overflow: {0}")]
    Overflow(String),

    #[error("Corruption detected: {0}")]
    Corruption(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Returns a stable error code for this error variant.
    pub fn code(&self) -> &'static str {
        match self {
            Error::InvalidArgument(_) => "INVALID_ARGUMENT",
            Error::Overflow(_) => "OVERFLOW",
            Error::Corruption(_) => "CORRUPTION",
            Error::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// Adds context to an error by wrapping it in an Internal error.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use extmap_core::{Extent, Error};
    ///
    /// fn load() -> Result<Extent, Error> {
    ///     Extent::try_new(0, 0, 0).map_err(|e| e.with_context("loading inode 12"))
    /// }
    /// ```
    pub fn with_context(self, context: &str) -> Error {
        Error::Internal(format!("{}: {}", context, self))
    }
}

pub type Result<T> = std::result::Result<T, Error>;
