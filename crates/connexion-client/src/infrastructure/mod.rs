//! Infrastructure layer for the connexion client.
//!
//! Contains the adapters at the edge of the crate: the driver peer and the
//! configuration file.
//!
//! **Dependency rule**: this layer may depend on `application` and
//! `connexion_core`.  The application layer reaches it only through the
//! [`peer::DriverPeer`] and [`peer::MessageSink`] traits.
//!
//! # Sub-modules
//!
//! - **`peer`** – The `DriverPeer` trait plus `LoopbackPeer`, an in-process
//!   driver used by tests and by the monitor binary.
//!
//! - **`storage`** – TOML configuration for the monitor binary.

pub mod peer;
pub mod storage;
