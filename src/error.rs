//! Error kinds surfaced by log operations.

use cid::Cid;

/// Errors produced by log construction, appends, joins, and loads.
///
/// Argument validation and permission gates fail the enclosing operation
/// before any index mutation; store failures propagate unchanged.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The local identity is not allowed to write to the log.
    #[error("could not append entry, key \"{0}\" is not allowed to write to the log")]
    AppendDenied(String),
    /// A joined entry was signed by a key the access controller rejects.
    #[error("could not join entry, key \"{0}\" is not allowed to write to the log")]
    JoinDenied(String),
    /// Signature verification failed for a joined entry.
    #[error("invalid signature on entry {0}")]
    SignatureInvalid(Cid),
    /// The block store has no block under this hash.
    #[error("block {0} not found in the store")]
    NotFound(Cid),
    /// The block store failed for a reason other than absence.
    #[error("block store failure: {0}")]
    Storage(String),
    /// Producing a signature failed.
    #[error("signing failure: {0}")]
    Signing(String),
    /// Malformed input: snapshots, hashes, or inconsistent preload data.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    /// CBOR encoding or decoding of an entry failed.
    #[error("entry encoding failure: {0}")]
    Encoding(#[from] serde_cbor::Error),
    /// JSON encoding or decoding of a log view failed.
    #[error("json failure: {0}")]
    Json(#[from] serde_json::Error),
    /// A secp256k1 key, message, or signature was malformed.
    #[error("crypto failure: {0}")]
    Crypto(#[from] secp256k1::Error),
}
