//! Driver peer abstraction.
//!
//! The privileged driver owns the device; this crate only talks to it.  The
//! [`DriverPeer`] trait is the whole surface we need from it: open a channel,
//! hand out client ids, accept mask updates and control requests, answer the
//! prefs query, and push notifications back through a [`MessageSink`].
//!
//! # Delivery model (for beginners)
//!
//! Requests go *to* the driver through `DriverPeer` and may block on a reply,
//! so the round-trips are `async`.  Notifications come *from* the driver on
//! whatever thread the transport uses, one at a time, and are handed to the
//! sink synchronously.  The sink must never block the driver for long and
//! must never let a failure escape back into it.
//!
//! # Testability
//!
//! [`loopback::LoopbackPeer`] implements the trait in-process.  It records
//! every request and lets tests (and the monitor binary) inject driver
//! messages without any real driver installed.

use std::sync::Arc;

use async_trait::async_trait;
use connexion_core::protocol::messages::{CapabilityMask, ClientMode, Signature};
use connexion_core::ProtocolError;
use thiserror::Error;

pub mod loopback;

/// Error type for driver-peer operations.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PeerError {
    /// The driver service is not loaded or has gone away.
    #[error("driver service is unavailable")]
    Unavailable,

    /// The driver understood the request and refused it.
    #[error("driver rejected the request: {0}")]
    Rejected(String),

    /// The channel to the driver failed mid-request.
    #[error("transport failure: {0}")]
    Transport(String),
}

impl From<PeerError> for ProtocolError {
    fn from(err: PeerError) -> Self {
        match err {
            PeerError::Unavailable | PeerError::Transport(_) => ProtocolError::PeerUnavailable,
            PeerError::Rejected(reason) => ProtocolError::InvalidParameter(reason),
        }
    }
}

/// Everything the driver needs to hand out a client id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistrationRequest {
    pub signature: Signature,
    /// Display name, already truncated to fit the Pascal-string field.
    pub name: String,
    pub mode: ClientMode,
    pub mask: CapabilityMask,
}

/// Receiver of driver-originated notifications.
///
/// Called on the transport's delivery thread, one call at a time.
pub trait MessageSink: Send + Sync {
    /// A raw message of the given four-character type arrived.
    fn on_message(&self, message_type: u32, payload: &[u8]);

    /// A device was connected; `connection` is the driver's handle for it.
    fn device_added(&self, connection: u32);

    /// A device was disconnected.
    fn device_removed(&self, connection: u32);
}

/// Trait abstracting the driver service.
///
/// Mask updates, unregistration and disconnect are one-way notifications with
/// no reply, so they are synchronous.  Everything that waits for the driver
/// is `async` and is bounded by the caller's timeout.
#[async_trait]
pub trait DriverPeer: Send + Sync {
    /// Opens the notification channel.  Fails with [`PeerError::Unavailable`]
    /// when the driver service cannot be located.
    async fn connect(&self, sink: Arc<dyn MessageSink>) -> Result<(), PeerError>;

    /// Asks for a new client id.  The driver never returns id 0 on success.
    async fn register_client(&self, request: RegistrationRequest) -> Result<u16, PeerError>;

    fn set_client_mask(&self, client: u16, mask: u32) -> Result<(), PeerError>;

    fn set_client_button_mask(&self, client: u16, mask: u32) -> Result<(), PeerError>;

    /// Sends one control request; `client` is `None` for the global form.
    async fn control(&self, client: Option<u16>, code: u32, param: i32) -> Result<i32, PeerError>;

    fn unregister_client(&self, client: u16) -> Result<(), PeerError>;

    /// Returns the encoded prefs record for `device_id`.
    async fn device_prefs(&self, device_id: u16) -> Result<Vec<u8>, PeerError>;

    /// Uploads encoded button-label data.
    async fn set_button_labels(&self, labels: Vec<u8>) -> Result<(), PeerError>;

    /// Closes the notification channel.
    fn disconnect(&self) -> Result<(), PeerError>;
}
