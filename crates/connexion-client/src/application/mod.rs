//! Application layer of the connexion client.
//!
//! # What does the application layer do?
//!
//! - **`session`** – `SessionManager`, the public entry point: installs the
//!   handler, registers and unregisters clients, updates masks, and sends
//!   control requests.  Every driver round-trip is bounded by a timeout.
//!
//! - **`dispatch`** – `DispatchRouter`, which decodes driver notifications,
//!   filters them by each client's subscription, and calls the application's
//!   `ConnexionHandler`.  Handler failures are contained here.
//!
//! - **`registry`** – The table of live clients shared by the two above.

pub mod dispatch;
pub mod registry;
pub mod session;
