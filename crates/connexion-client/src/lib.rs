//! connexion-client library entry point.
//!
//! Re-exports all public modules so that integration tests in `tests/`
//! and the binary entry point in `main.rs` share the same module tree.
//!
//! # What does connexion-client do? (for beginners)
//!
//! An application that wants raw 6-DoF input does not read the device; it
//! asks the driver to forward it.  This crate manages that conversation:
//!
//! 1. `SessionManager::install` opens the channel to the driver and attaches
//!    the application's `ConnexionHandler`.
//! 2. `SessionManager::register` claims a client id for the application's
//!    signature and chooses which axes and buttons it wants.
//! 3. The driver pushes device-state records; the dispatch router decodes
//!    them, drops what the client did not subscribe to, and calls the
//!    handler with axis and button changes.
//! 4. Control requests (LED, calibration, keystrokes, device ids) go back to
//!    the driver through the same session.
//! 5. `unregister` and `shutdown` release everything in reverse order.
//!
//! The driver itself sits behind the `DriverPeer` trait.  `LoopbackPeer` is an
//! in-process implementation used by the tests and the monitor binary.

/// Application layer: session lifecycle and event dispatch.
pub mod application;

/// Infrastructure layer: the driver peer and configuration storage.
pub mod infrastructure;

pub use application::dispatch::{ConnexionHandler, DispatchOptions, DispatchStats};
pub use application::session::{ClientSession, SessionManager, DEFAULT_TIMEOUT};
pub use infrastructure::peer::{DriverPeer, MessageSink, PeerError};
