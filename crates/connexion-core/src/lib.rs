//! # connexion-core
//!
//! Shared library for the 3Dconnexion client protocol: wire records,
//! constants and mask tables, the record codec, typed control commands and
//! the pure axis/button logic applied before state reaches an application.
//!
//! It has no dependencies on OS APIs, threads, or the driver itself.
//!
//! # Architecture overview (for beginners)
//!
//! A 6-DoF "space mouse" is owned by a privileged driver.  An application
//! that wants the raw motion registers itself as a *client*, tells the driver
//! which axes and buttons to forward, and then receives a fixed 48-byte
//! device-state record every time the device moves.
//!
//! This crate (`connexion-core`) is the shared foundation.  It defines:
//!
//! - **`protocol`** – What the bytes mean.  Records are encoded and decoded
//!   byte-for-byte with the driver's packed C layout, and control requests
//!   are modelled as a closed set of typed commands.
//!
//! - **`domain`** – What an application should see.  Axis masking, drift
//!   filtering, the dominant-axis rule, and per-client edge detection that
//!   turns a stream of full records into axis and button changes.
//!
//! The session lifecycle and callback dispatch live in `connexion-client`.

pub mod domain;
pub mod protocol;

// Re-export the most-used types at the crate root so callers can write
// `connexion_core::DeviceState` instead of the full module path.
pub use domain::axes::{Axis, AxisValues, AXIS_COUNT};
pub use domain::edges::{EdgeTracker, StateChange, Subscription};
pub use protocol::codec::{decode_message, encode_device_state};
pub use protocol::commands::{ControlCommand, DeviceIds, Keystroke};
pub use protocol::error::ProtocolError;
pub use protocol::messages::{
    ButtonMask, CapabilityMask, ClientMode, DevicePrefs, DeviceState, Event, FeatureSwitches,
    MessageType, Signature,
};
