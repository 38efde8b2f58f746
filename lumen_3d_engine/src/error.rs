//! Error types for the Lumen3D engine
//!
//! Every fallible operation in the engine returns [`Result`]. Errors are split
//! into two kinds: fatal errors (the device or its setup is unusable and the
//! application is expected to shut down) and recoverable errors (the caller
//! gets the error back and decides what to do).

use std::fmt;

/// Result type for Lumen3D engine operations
pub type Result<T> = std::result::Result<T, Error>;

/// How an error should be treated by the caller
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Unrecoverable: propagate and terminate
    Fatal,
    /// The caller must check and handle it
    Recoverable,
}

/// Lumen3D engine errors
#[derive(Debug, Clone)]
pub enum Error {
    /// Backend-specific error (failed Vulkan call, etc.)
    BackendError(String),

    /// Out of host or GPU memory
    OutOfMemory,

    /// Invalid resource or invalid request (bad size, unknown name, etc.)
    InvalidResource(String),

    /// Initialization failed (no suitable GPU, missing layer or extension, etc.)
    InitializationFailed(String),

    /// The logical device was lost
    DeviceLost,

    /// The swapchain no longer matches the surface and must be recreated
    SwapchainOutOfDate,

    /// No candidate format supports the requested usage
    UnsupportedFormat(String),

    /// File access error (shader bytecode, etc.)
    Io(String),
}

impl Error {
    /// Classify this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::InitializationFailed(_) | Error::DeviceLost => ErrorKind::Fatal,
            _ => ErrorKind::Recoverable,
        }
    }

    /// Shorthand for `kind() == ErrorKind::Fatal`
    pub fn is_fatal(&self) -> bool {
        self.kind() == ErrorKind::Fatal
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::BackendError(msg) => write!(f, "Backend error: {}", msg),
            Error::OutOfMemory => write!(f, "Out of GPU memory"),
            Error::InvalidResource(msg) => write!(f, "Invalid resource: {}", msg),
            Error::InitializationFailed(msg) => write!(f, "Initialization failed: {}", msg),
            Error::DeviceLost => write!(f, "Device lost"),
            Error::SwapchainOutOfDate => write!(f, "Swapchain out of date"),
            Error::UnsupportedFormat(msg) => write!(f, "Unsupported format: {}", msg),
            Error::Io(msg) => write!(f, "I/O error: {}", msg),
        }
    }
}

impl std::error::Error for Error {}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Io(err.to_string())
    }
}

#[cfg(test)]
#[path = "error_tests.rs"]
mod tests;
