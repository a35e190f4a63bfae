//! DispatchRouter: turns raw driver messages into application callbacks.
//!
//! This is the receiving half of the client.  The driver peer hands every
//! notification to the router (it implements [`MessageSink`]); the router
//! decodes it, finds the client it is addressed to, applies that client's
//! subscription and the configured axis filters, and calls exactly one
//! [`ConnexionHandler`] method per resulting change.
//!
//! # Pipeline
//!
//! ```text
//! raw message ─► decode ─► lookup targetClient ─► mask ─► drift ─► dominant
//!                  │              │       │                          │
//!            decode_failed     dropped    │                    EdgeTracker
//!                                         │                          │
//!                      state_changed(Command)       state_changed(Axes / Buttons)
//! ```
//!
//! A record whose `command` is an explicit assignment (anything but None,
//! HandleAxis or HandleButtons) skips the axis pipeline and reaches the
//! handler once, as [`StateChange::Command`] with its `param`, `value` and
//! raw report.  Plugin-mode clients receive their assigned functions this way.
//!
//! # Failure isolation
//!
//! Nothing that goes wrong here may reach the driver's delivery thread.  Bad
//! records are counted and reported to the handler's diagnostic hook, and a
//! panicking handler is caught, logged and counted; delivery of later
//! messages carries on.
//!
//! # Quiescence
//!
//! Each delivery holds the router's gate for its whole duration.
//! [`quiesce`](DispatchRouter::quiesce) takes the gate once, so when it
//! returns any delivery that was in flight on another thread has finished.
//! A delivery re-checks that its target is still registered before every
//! handler call, so removing a client and then quiescing guarantees the
//! handler never hears about it again.  Quiescing from inside a handler
//! (on the delivery thread itself) returns immediately instead of
//! deadlocking; the liveness re-check suppresses the rest of that delivery.

use std::any::Any;
use std::cell::Cell;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};

use connexion_core::protocol::codec::decode_raw_message;
use connexion_core::protocol::messages::{DeviceState, Event, MessageType, Signature};
use connexion_core::{AxisValues, EdgeTracker, ProtocolError, StateChange, Subscription};
use tracing::{debug, error, warn};

use crate::application::registry::{ClientRegistry, RegisteredClient};
use crate::infrastructure::peer::MessageSink;

/// Application callbacks for driver events.
///
/// All methods run on the driver's delivery thread, one call at a time.
///
/// The event callbacks are `device_added`, `device_removed`,
/// `state_changed`, `prefs_changed` and `calibration`.  `decode_failed` is
/// the diagnostic sink: a record that fails to decode reaches only that
/// method and never any of the event callbacks.
#[cfg_attr(test, mockall::automock)]
pub trait ConnexionHandler: Send + Sync {
    /// A device was connected.
    fn device_added(&self, connection: u32);

    /// A device was disconnected.
    fn device_removed(&self, connection: u32);

    /// Subscribed axes or buttons of a registered client changed, or the
    /// driver routed an assignment to it ([`StateChange::Command`]).
    fn state_changed(&self, change: &StateChange);

    /// Prefs of the application with `signature` changed in the driver.
    fn prefs_changed(&self, signature: Signature);

    /// A state record meant for calibration arrived.
    fn calibration(&self, _state: &DeviceState) {}

    /// Diagnostic sink: a message could not be decoded and was dropped.
    /// Not an event; no other callback runs for that message.
    fn decode_failed(&self, _error: &ProtocolError) {}
}

/// Router behaviour knobs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DispatchOptions {
    /// Report only what changed since the client's previous state.
    pub edge_detection: bool,
    /// Keep only the largest-magnitude axis of each record.
    pub dominant: bool,
    /// Zero axes whose magnitude is at or below this value.
    pub drift_threshold: u16,
}

impl Default for DispatchOptions {
    fn default() -> Self {
        Self {
            edge_detection: true,
            dominant: false,
            drift_threshold: 0,
        }
    }
}

/// Counters since the router was created.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchStats {
    /// State changes handed to the handler.
    pub delivered: u64,
    /// Records addressed to a client with no live session.
    pub dropped: u64,
    /// Messages clients are expected to ignore.
    pub ignored: u64,
    pub decode_failures: u64,
    pub handler_failures: u64,
}

#[derive(Default)]
struct Counters {
    delivered: AtomicU64,
    dropped: AtomicU64,
    ignored: AtomicU64,
    decode_failures: AtomicU64,
    handler_failures: AtomicU64,
}

fn bump(counter: &AtomicU64) {
    counter.fetch_add(1, Ordering::Relaxed);
}

thread_local! {
    /// Address of the router currently delivering on this thread, or 0.
    static DELIVERING: Cell<usize> = const { Cell::new(0) };
}

struct DeliveryGuard<'a> {
    _gate: Option<MutexGuard<'a, ()>>,
    previous: usize,
}

impl Drop for DeliveryGuard<'_> {
    fn drop(&mut self) {
        DELIVERING.with(|d| d.set(self.previous));
    }
}

/// Routes decoded driver messages to a [`ConnexionHandler`].
pub struct DispatchRouter {
    handler: Arc<dyn ConnexionHandler>,
    registry: Arc<RwLock<ClientRegistry>>,
    options: DispatchOptions,
    tracker: Mutex<EdgeTracker>,
    gate: Mutex<()>,
    closed: AtomicBool,
    counters: Counters,
}

impl DispatchRouter {
    pub fn new(
        handler: Arc<dyn ConnexionHandler>,
        registry: Arc<RwLock<ClientRegistry>>,
        options: DispatchOptions,
    ) -> Self {
        Self {
            handler,
            registry,
            options,
            tracker: Mutex::new(EdgeTracker::new(options.edge_detection)),
            gate: Mutex::new(()),
            closed: AtomicBool::new(false),
            counters: Counters::default(),
        }
    }

    pub fn options(&self) -> DispatchOptions {
        self.options
    }

    pub fn stats(&self) -> DispatchStats {
        DispatchStats {
            delivered: self.counters.delivered.load(Ordering::Relaxed),
            dropped: self.counters.dropped.load(Ordering::Relaxed),
            ignored: self.counters.ignored.load(Ordering::Relaxed),
            decode_failures: self.counters.decode_failures.load(Ordering::Relaxed),
            handler_failures: self.counters.handler_failures.load(Ordering::Relaxed),
        }
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Drops the remembered state of `client`, so a later registration under
    /// the same id starts from a zero baseline.
    pub fn forget(&self, client: u16) {
        self.tracker().forget(client);
    }

    /// Waits for an in-flight delivery on another thread to finish.
    ///
    /// Returns immediately when called from inside a handler.
    pub fn quiesce(&self) {
        if self.delivering_here() {
            return;
        }
        drop(self.gate.lock().unwrap_or_else(PoisonError::into_inner));
    }

    /// Stops all further delivery and waits for the in-flight one.
    pub fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
        self.quiesce();
    }

    // ── Delivery ─────────────────────────────────────────────────────────────

    fn deliver(&self, message_type: u32, payload: &[u8]) {
        let event = match decode_raw_message(message_type, payload) {
            Ok(event) => event,
            Err(err) => {
                bump(&self.counters.decode_failures);
                warn!(
                    message_type = ?MessageType::from(message_type),
                    len = payload.len(),
                    "dropping undecodable message: {err}"
                );
                self.invoke("decode_failed", |h| h.decode_failed(&err));
                return;
            }
        };

        match event {
            Event::DeviceState(state) => self.route_state(&state),
            Event::Calibration(state) => {
                if self.lookup(state.target_client).is_some() {
                    self.invoke("calibration", |h| h.calibration(&state));
                } else {
                    self.drop_record(state.target_client);
                }
            }
            Event::PrefsChanged(signature) => {
                debug!(%signature, "prefs changed");
                self.invoke("prefs_changed", |h| h.prefs_changed(signature));
            }
            Event::Ignored(ty) => {
                bump(&self.counters.ignored);
                debug!(message_type = ?ty, "ignoring message");
            }
        }
    }

    fn route_state(&self, state: &DeviceState) {
        let client = state.target_client;
        let Some(entry) = self.lookup(client) else {
            self.drop_record(client);
            return;
        };

        if let Some(change) = StateChange::command(state) {
            debug!(client, command = ?state.client_command(), "routing driver assignment");
            self.deliver_changes(client, entry.generation, [change]);
            return;
        }

        let axes = self.filter_axes(state.axis, &entry.subscription);
        let changes = self.tracker().observe(
            client,
            state.device_address,
            axes,
            state.buttons,
            &entry.subscription,
        );

        self.deliver_changes(client, entry.generation, changes);
    }

    fn deliver_changes(
        &self,
        client: u16,
        generation: u64,
        changes: impl IntoIterator<Item = StateChange>,
    ) {
        for change in changes {
            if self.is_closed() || !self.is_live(client, generation) {
                debug!(client, "session ended during delivery");
                return;
            }
            if self.invoke("state_changed", |h| h.state_changed(&change)) {
                bump(&self.counters.delivered);
            }
        }
    }

    fn filter_axes(&self, axes: AxisValues, subscription: &Subscription) -> AxisValues {
        let mut axes = axes.masked(subscription.capability);
        if self.options.drift_threshold > 0 {
            axes = axes.filter_drift(self.options.drift_threshold);
        }
        if self.options.dominant {
            axes = axes.dominant();
        }
        axes
    }

    fn drop_record(&self, client: u16) {
        bump(&self.counters.dropped);
        warn!(client, "dropping record for unregistered client");
    }

    /// Calls the handler, converting a panic into a logged failure.
    fn invoke(&self, callback: &'static str, f: impl FnOnce(&dyn ConnexionHandler)) -> bool {
        match panic::catch_unwind(AssertUnwindSafe(|| f(self.handler.as_ref()))) {
            Ok(()) => true,
            Err(payload) => {
                bump(&self.counters.handler_failures);
                error!(callback, reason = %panic_message(payload.as_ref()), "handler panicked");
                false
            }
        }
    }

    // ── Private helpers ──────────────────────────────────────────────────────

    fn enter(&self) -> DeliveryGuard<'_> {
        let me = self as *const Self as usize;
        let previous = DELIVERING.with(|d| d.replace(me));
        // A nested delivery from inside a handler already holds the gate.
        let gate = if previous == me {
            None
        } else {
            Some(self.gate.lock().unwrap_or_else(PoisonError::into_inner))
        };
        DeliveryGuard {
            _gate: gate,
            previous,
        }
    }

    fn delivering_here(&self) -> bool {
        DELIVERING.with(|d| d.get() == self as *const Self as usize)
    }

    fn tracker(&self) -> MutexGuard<'_, EdgeTracker> {
        self.tracker.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn lookup(&self, client: u16) -> Option<RegisteredClient> {
        self.registry
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(client)
            .cloned()
    }

    fn is_live(&self, client: u16, generation: u64) -> bool {
        self.registry
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .is_live(client, generation)
    }
}

impl MessageSink for DispatchRouter {
    fn on_message(&self, message_type: u32, payload: &[u8]) {
        let _guard = self.enter();
        if self.is_closed() {
            debug!("router closed; discarding message");
            return;
        }
        self.deliver(message_type, payload);
    }

    fn device_added(&self, connection: u32) {
        let _guard = self.enter();
        if !self.is_closed() {
            debug!(connection, "device added");
            self.invoke("device_added", |h| h.device_added(connection));
        }
    }

    fn device_removed(&self, connection: u32) {
        let _guard = self.enter();
        if !self.is_closed() {
            debug!(connection, "device removed");
            self.invoke("device_removed", |h| h.device_removed(connection));
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
