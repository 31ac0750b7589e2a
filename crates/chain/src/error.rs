//! Error taxonomy for the chain layer.
//!
//! The three read-path failure modes (transport, JSON-RPC error object,
//! malformed response) are kept distinct so callers can decide between
//! retrying, degrading to a fallback path, or skipping an opportunity.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    /// Transport failure: connection error, timeout, non-2xx status.
    #[error("network: {0}")]
    Network(String),

    /// The endpoint answered with a JSON-RPC `error` object.
    #[error("rpc error {code}: {message}")]
    Rpc { code: i64, message: String },

    /// The response body could not be decoded into the expected shape.
    #[error("decode: {0}")]
    Decode(String),

    /// Key parsing or ECDSA failure while signing.
    #[error("signing: {0}")]
    Signing(String),

    /// Every submission avenue for an attempt failed.
    #[error("submission: {0}")]
    Submission(String),

    /// Local I/O failure (metrics sink).
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Decode(err.to_string())
    }
}
