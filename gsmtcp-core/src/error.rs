use std::io;
use thiserror::Error;

/// Main error type for modem operations
///
/// Low-level link failures are carried unmodified in `Transport`. Modem
/// replies that signal failure are translated into the other variants with
/// the raw modem text preserved for diagnostics.
#[derive(Error, Debug)]
pub enum GsmError {
    #[error("Transport error: {0}")]
    Transport(#[from] io::Error),

    #[error("Timed out waiting for {waiting_for}")]
    TimedOut { waiting_for: String },

    #[error("Protocol error: {0}")]
    Protocol(String),

    /// The modem accepted fewer bytes than requested. The caller is expected
    /// to resubmit `data[written..]`.
    #[error("Partial send: {written} of {requested} bytes accepted")]
    PartialSend { written: usize, requested: usize },

    #[error("Already connected")]
    AlreadyConnected,

    #[error("Not ready: {0}")]
    NotReady(String),

    #[error("Maximum retries ({retries}) for registering to network exceeded")]
    MaxRetriesExceeded { retries: u32 },

    #[error("Network registration failed: {0}")]
    RegistrationFailed(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Invalid data: {0}")]
    InvalidData(String),
}

impl GsmError {
    /// Build a timeout error naming what was being waited for
    pub fn timed_out(waiting_for: impl Into<String>) -> Self {
        GsmError::TimedOut {
            waiting_for: waiting_for.into(),
        }
    }

    /// Check whether this error is a response timeout
    pub fn is_timeout(&self) -> bool {
        matches!(self, GsmError::TimedOut { .. })
    }

    /// Check whether this error is a truncated send
    pub fn is_partial_send(&self) -> bool {
        matches!(self, GsmError::PartialSend { .. })
    }
}

impl From<GsmError> for io::Error {
    fn from(err: GsmError) -> Self {
        match err {
            GsmError::Transport(e) => e,
            GsmError::TimedOut { .. } => io::Error::new(io::ErrorKind::TimedOut, err),
            GsmError::NotReady(_) => io::Error::new(io::ErrorKind::NotConnected, err),
            GsmError::InvalidData(_) | GsmError::InvalidConfig(_) => {
                io::Error::new(io::ErrorKind::InvalidInput, err)
            }
            other => io::Error::other(other),
        }
    }
}

/// Result type alias for modem operations
pub type GsmResult<T> = Result<T, GsmError>;
