//! Error type shared by the codec and the session layer.

use std::time::Duration;

use thiserror::Error;

use crate::protocol::messages::Signature;

/// Everything that can go wrong talking to the driver peer.
///
/// Decode-time variants ([`UnsupportedVersion`](Self::UnsupportedVersion),
/// [`UnknownRecordType`](Self::UnknownRecordType),
/// [`MalformedPayload`](Self::MalformedPayload)) are local to a single
/// message; the rest are surfaced by session operations.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    /// An operation was attempted before handlers were installed.
    #[error("connexion handlers are not installed")]
    NotInstalled,

    /// This application signature already holds a live session.
    #[error("application {0} already has a registered client")]
    AlreadyRegistered(Signature),

    /// The driver refused to hand out a client id.
    #[error("driver rejected client registration: {0}")]
    RegistrationRejected(String),

    /// The session was unregistered, torn down, or never valid.
    #[error("client session is not registered")]
    InvalidSession,

    /// A record carried a version tag this crate does not understand.
    #[error("unsupported record version 0x{found:04X} (expected 0x{expected:04X})")]
    UnsupportedVersion { found: u16, expected: u16 },

    /// A record carried an unexpected structure type tag.
    #[error("unknown record type 0x{found:04X} (expected 0x{expected:04X})")]
    UnknownRecordType { found: u16, expected: u16 },

    /// The payload length does not match the fixed record size.
    #[error("malformed payload: expected {expected} bytes, got {actual}")]
    MalformedPayload { expected: usize, actual: usize },

    /// A blocking round-trip exceeded its deadline.
    #[error("driver did not respond within {0:?}")]
    PeerUnresponsive(Duration),

    /// The driver service could not be reached.
    #[error("driver service is unavailable")]
    PeerUnavailable,

    /// A caller-supplied value cannot be represented on the wire.
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),
}

impl ProtocolError {
    /// Returns `true` for errors that only affect the message being decoded.
    pub fn is_decode_error(&self) -> bool {
        matches!(
            self,
            ProtocolError::UnsupportedVersion { .. }
                | ProtocolError::UnknownRecordType { .. }
                | ProtocolError::MalformedPayload { .. }
        )
    }
}
