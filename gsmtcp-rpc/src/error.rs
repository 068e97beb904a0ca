//! Error types for the JSON-RPC client

use gsmtcp_core::GsmError;
use std::io;
use thiserror::Error;

/// Errors from a JSON-RPC call
#[derive(Error, Debug)]
pub enum RpcError {
    #[error("I/O error: {0}")]
    Io(#[source] io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Malformed HTTP response: {0}")]
    Http(String),

    #[error("HTTP status {status} {reason}")]
    HttpStatus { status: u16, reason: String },

    /// Non-null `error` member in the response
    #[error("Remote error: {0}")]
    Remote(serde_json::Value),

    #[error("Unexpected null result")]
    NullResult,

    /// Response does not have the shape the framer was configured for
    #[error("Unexpected response shape: {0}")]
    UnexpectedShape(String),

    #[error("Response exceeds {limit} bytes")]
    FrameTooLarge { limit: usize },

    /// Modem failure carried up through the stream
    #[error(transparent)]
    Gsm(#[from] GsmError),
}

impl From<io::Error> for RpcError {
    /// Unwrap modem errors that `ModemStream` passed through `io::Error`
    fn from(err: io::Error) -> Self {
        let wraps_gsm = err
            .get_ref()
            .is_some_and(|inner| inner.is::<GsmError>());
        if !wraps_gsm {
            return RpcError::Io(err);
        }
        let kind = err.kind();
        match err.into_inner().map(|inner| inner.downcast::<GsmError>()) {
            Some(Ok(gsm)) => RpcError::Gsm(*gsm),
            Some(Err(other)) => RpcError::Io(io::Error::new(kind, other)),
            None => RpcError::Io(kind.into()),
        }
    }
}

pub type RpcResult<T> = std::result::Result<T, RpcError>;
