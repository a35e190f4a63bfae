//! In-process driver peer.
//!
//! Behaves like the driver service as far as the protocol is concerned:
//! hands out client ids, refuses a second wildcard claim, remembers masks,
//! answers control requests and the prefs query.  Every request is recorded
//! so tests can assert on exactly what was sent, and driver notifications
//! can be injected with the `emit_*` helpers.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use connexion_core::protocol::codec::{encode_device_prefs, encode_device_state, encode_prefs_changed};
use connexion_core::protocol::labels::decode_button_labels;
use connexion_core::protocol::messages::{ClientMode, DevicePrefs, DeviceState, MessageType, Signature};
use connexion_core::{ControlCommand, DeviceIds};
use tracing::debug;

use super::{DriverPeer, MessageSink, PeerError, RegistrationRequest};

/// Client table size of the driver.
pub const DEFAULT_MAX_CLIENTS: usize = 16;

/// What the peer knows about one registered client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoopbackClient {
    pub signature: Signature,
    pub name: String,
    pub mode: ClientMode,
    pub mask: u32,
    pub button_mask: u32,
}

/// One control request as received by the peer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ControlRecord {
    pub client: Option<u16>,
    pub code: u32,
    pub param: i32,
}

impl ControlRecord {
    /// The typed command, if the code is one the driver knows.
    pub fn command(&self) -> Option<ControlCommand> {
        ControlCommand::from_wire(self.code, self.param).ok()
    }
}

struct LoopbackState {
    available: bool,
    connected: bool,
    max_clients: usize,
    clients: BTreeMap<u16, LoopbackClient>,
    controls: Vec<ControlRecord>,
    labels: Option<Vec<u8>>,
    prefs: DevicePrefs,
    device_ids: DeviceIds,
    led: u8,
    response_delay: Duration,
}

/// In-process implementation of [`DriverPeer`].
pub struct LoopbackPeer {
    state: Mutex<LoopbackState>,
    sink: Mutex<Option<Arc<dyn MessageSink>>>,
}

impl LoopbackPeer {
    pub fn new() -> Self {
        Self::with_max_clients(DEFAULT_MAX_CLIENTS)
    }

    /// Creates a peer whose client table holds at most `max_clients` entries.
    pub fn with_max_clients(max_clients: usize) -> Self {
        Self {
            state: Mutex::new(LoopbackState {
                available: true,
                connected: false,
                max_clients,
                clients: BTreeMap::new(),
                controls: Vec::new(),
                labels: None,
                prefs: DevicePrefs::default(),
                device_ids: DeviceIds {
                    vendor: 0x256F,
                    product: 0xC635,
                },
                led: 0,
                response_delay: Duration::ZERO,
            }),
            sink: Mutex::new(None),
        }
    }

    // ── Test controls ────────────────────────────────────────────────────────

    /// Delays every round-trip reply by `delay`.
    pub fn set_response_delay(&self, delay: Duration) {
        self.state().response_delay = delay;
    }

    /// Simulates the driver being unloaded: the client table and the
    /// notification channel are gone and every later call fails.
    pub fn unload(&self) {
        {
            let mut state = self.state();
            state.available = false;
            state.connected = false;
            state.clients.clear();
        }
        *self.sink_slot() = None;
    }

    pub fn set_prefs(&self, prefs: DevicePrefs) {
        self.state().prefs = prefs;
    }

    pub fn set_device_ids(&self, ids: DeviceIds) {
        self.state().device_ids = ids;
    }

    // ── Inspection ───────────────────────────────────────────────────────────

    pub fn is_connected(&self) -> bool {
        self.state().connected
    }

    /// Every control request received so far, oldest first.
    pub fn controls(&self) -> Vec<ControlRecord> {
        self.state().controls.clone()
    }

    pub fn client(&self, id: u16) -> Option<LoopbackClient> {
        self.state().clients.get(&id).cloned()
    }

    pub fn client_count(&self) -> usize {
        self.state().clients.len()
    }

    pub fn led_state(&self) -> u8 {
        self.state().led
    }

    /// Labels from the last upload, decoded.
    pub fn button_labels(&self) -> Option<Vec<String>> {
        let data = self.state().labels.clone()?;
        decode_button_labels(&data).ok()
    }

    // ── Notification injection ───────────────────────────────────────────────

    /// Delivers a raw message to the sink on the calling thread.
    ///
    /// Returns `false` when no sink is connected.
    pub fn emit(&self, message_type: u32, payload: &[u8]) -> bool {
        match self.current_sink() {
            Some(sink) => {
                sink.on_message(message_type, payload);
                true
            }
            None => false,
        }
    }

    pub fn emit_state(&self, state: &DeviceState) -> bool {
        self.emit(MessageType::DEVICE_STATE, &encode_device_state(state))
    }

    pub fn emit_calibration(&self, state: &DeviceState) -> bool {
        self.emit(MessageType::CALIBRATE_DEVICE, &encode_device_state(state))
    }

    pub fn emit_prefs_changed(&self, signature: Signature) -> bool {
        self.emit(MessageType::PREFS_CHANGED, &encode_prefs_changed(signature))
    }

    pub fn attach_device(&self, connection: u32) -> bool {
        match self.current_sink() {
            Some(sink) => {
                sink.device_added(connection);
                true
            }
            None => false,
        }
    }

    pub fn detach_device(&self, connection: u32) -> bool {
        match self.current_sink() {
            Some(sink) => {
                sink.device_removed(connection);
                true
            }
            None => false,
        }
    }

    // ── Private helpers ──────────────────────────────────────────────────────

    fn state(&self) -> MutexGuard<'_, LoopbackState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn sink_slot(&self) -> MutexGuard<'_, Option<Arc<dyn MessageSink>>> {
        self.sink.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn current_sink(&self) -> Option<Arc<dyn MessageSink>> {
        self.sink_slot().clone()
    }

    /// Waits out the configured response delay.
    async fn respond(&self) {
        let delay = self.state().response_delay;
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
    }

    fn available(&self) -> Result<MutexGuard<'_, LoopbackState>, PeerError> {
        let state = self.state();
        if state.available {
            Ok(state)
        } else {
            Err(PeerError::Unavailable)
        }
    }
}

impl Default for LoopbackPeer {
    fn default() -> Self {
        Self::new()
    }
}

fn unknown_client(id: u16) -> PeerError {
    PeerError::Rejected(format!("unknown client {id}"))
}

#[async_trait]
impl DriverPeer for LoopbackPeer {
    async fn connect(&self, sink: Arc<dyn MessageSink>) -> Result<(), PeerError> {
        self.available()?.connected = true;
        *self.sink_slot() = Some(sink);
        debug!("loopback peer connected");
        Ok(())
    }

    async fn register_client(&self, request: RegistrationRequest) -> Result<u16, PeerError> {
        self.respond().await;
        let mut state = self.available()?;
        if !state.connected {
            return Err(PeerError::Transport("notification channel is not open".into()));
        }
        if request.signature.is_wildcard()
            && state.clients.values().any(|c| c.signature.is_wildcard())
        {
            return Err(PeerError::Rejected("wildcard already claimed".into()));
        }
        if state.clients.len() >= state.max_clients {
            return Err(PeerError::Rejected("client table is full".into()));
        }

        // Lowest free id, so ids are reissued after unregistration.
        let id = (1..=u16::MAX)
            .find(|id| !state.clients.contains_key(id))
            .ok_or_else(|| PeerError::Rejected("no free client id".into()))?;
        state.clients.insert(
            id,
            LoopbackClient {
                signature: request.signature,
                name: request.name,
                mode: request.mode,
                mask: request.mask.0,
                button_mask: request.mask.legacy_buttons(),
            },
        );
        Ok(id)
    }

    fn set_client_mask(&self, client: u16, mask: u32) -> Result<(), PeerError> {
        let mut state = self.available()?;
        let entry = state.clients.get_mut(&client).ok_or_else(|| unknown_client(client))?;
        entry.mask = mask;
        Ok(())
    }

    fn set_client_button_mask(&self, client: u16, mask: u32) -> Result<(), PeerError> {
        let mut state = self.available()?;
        let entry = state.clients.get_mut(&client).ok_or_else(|| unknown_client(client))?;
        entry.button_mask = mask;
        Ok(())
    }

    async fn control(&self, client: Option<u16>, code: u32, param: i32) -> Result<i32, PeerError> {
        self.respond().await;
        let mut state = self.available()?;
        if let Some(id) = client {
            if !state.clients.contains_key(&id) {
                return Err(unknown_client(id));
            }
        }
        state.controls.push(ControlRecord {
            client,
            code,
            param,
        });

        let command = ControlCommand::from_wire(code, param)
            .map_err(|e| PeerError::Rejected(e.to_string()))?;
        let result = match command {
            ControlCommand::GetDeviceId => state.device_ids.to_result(),
            ControlCommand::SetLedState(led) => {
                state.led = led;
                0
            }
            _ => 0,
        };
        Ok(result)
    }

    fn unregister_client(&self, client: u16) -> Result<(), PeerError> {
        let mut state = self.available()?;
        state
            .clients
            .remove(&client)
            .map(|_| ())
            .ok_or_else(|| unknown_client(client))
    }

    async fn device_prefs(&self, _device_id: u16) -> Result<Vec<u8>, PeerError> {
        self.respond().await;
        let state = self.available()?;
        encode_device_prefs(&state.prefs).map_err(|e| PeerError::Transport(e.to_string()))
    }

    async fn set_button_labels(&self, labels: Vec<u8>) -> Result<(), PeerError> {
        self.respond().await;
        self.available()?.labels = Some(labels);
        Ok(())
    }

    fn disconnect(&self) -> Result<(), PeerError> {
        self.state().connected = false;
        *self.sink_slot() = None;
        debug!("loopback peer disconnected");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use connexion_core::protocol::messages::CapabilityMask;

    struct NullSink;

    impl MessageSink for NullSink {
        fn on_message(&self, _message_type: u32, _payload: &[u8]) {}
        fn device_added(&self, _connection: u32) {}
        fn device_removed(&self, _connection: u32) {}
    }

    fn request(signature: Signature) -> RegistrationRequest {
        RegistrationRequest {
            signature,
            name: "test".to_string(),
            mode: ClientMode::TakeOver,
            mask: CapabilityMask(CapabilityMask::ALL),
        }
    }

    async fn connected_peer() -> LoopbackPeer {
        let peer = LoopbackPeer::new();
        peer.connect(Arc::new(NullSink)).await.expect("connect should succeed");
        peer
    }

    #[tokio::test]
    async fn test_register_assigns_nonzero_ids() {
        // Arrange
        let peer = connected_peer().await;

        // Act
        let a = peer.register_client(request(Signature::from_four_cc(b"AAAA"))).await.unwrap();
        let b = peer.register_client(request(Signature::from_four_cc(b"BBBB"))).await.unwrap();

        // Assert
        assert_eq!(a, 1);
        assert_eq!(b, 2);
        assert_eq!(peer.client_count(), 2);
    }

    #[tokio::test]
    async fn test_register_before_connect_fails() {
        let peer = LoopbackPeer::new();
        let result = peer.register_client(request(Signature::WILDCARD)).await;
        assert!(matches!(result, Err(PeerError::Transport(_))));
    }

    #[tokio::test]
    async fn test_second_wildcard_claim_is_rejected() {
        let peer = connected_peer().await;
        peer.register_client(request(Signature::WILDCARD)).await.unwrap();

        let result = peer.register_client(request(Signature::WILDCARD)).await;

        assert!(matches!(result, Err(PeerError::Rejected(_))));
    }

    #[tokio::test]
    async fn test_full_client_table_is_rejected() {
        let peer = LoopbackPeer::with_max_clients(1);
        peer.connect(Arc::new(NullSink)).await.unwrap();
        peer.register_client(request(Signature::from_four_cc(b"AAAA"))).await.unwrap();

        let result = peer.register_client(request(Signature::from_four_cc(b"BBBB"))).await;

        assert!(matches!(result, Err(PeerError::Rejected(_))));
    }

    #[tokio::test]
    async fn test_ids_are_reissued_after_unregister() {
        let peer = connected_peer().await;
        let id = peer.register_client(request(Signature::WILDCARD)).await.unwrap();
        peer.unregister_client(id).unwrap();

        let again = peer.register_client(request(Signature::WILDCARD)).await.unwrap();

        assert_eq!(again, id);
    }

    #[tokio::test]
    async fn test_control_is_recorded_and_led_tracked() {
        let peer = connected_peer().await;

        peer.control(None, ControlCommand::SetLedState(1).code(), 1).await.unwrap();

        assert_eq!(peer.led_state(), 1);
        assert_eq!(peer.controls()[0].command(), Some(ControlCommand::SetLedState(1)));
    }

    #[tokio::test]
    async fn test_control_for_unknown_client_is_rejected() {
        let peer = connected_peer().await;
        let result = peer.control(Some(9), ControlCommand::Calibrate.code(), 0).await;
        assert!(matches!(result, Err(PeerError::Rejected(_))));
        assert!(peer.controls().is_empty());
    }

    #[tokio::test]
    async fn test_unload_makes_every_call_unavailable() {
        // Arrange
        let peer = connected_peer().await;
        let id = peer.register_client(request(Signature::WILDCARD)).await.unwrap();

        // Act
        peer.unload();

        // Assert
        assert_eq!(peer.set_client_mask(id, 0), Err(PeerError::Unavailable));
        assert_eq!(
            peer.control(None, ControlCommand::Calibrate.code(), 0).await,
            Err(PeerError::Unavailable)
        );
        assert_eq!(peer.device_prefs(0).await, Err(PeerError::Unavailable));
        assert!(!peer.emit_state(&DeviceState::new(id)));
    }

    #[tokio::test]
    async fn test_masks_are_stored_per_client() {
        let peer = connected_peer().await;
        let id = peer.register_client(request(Signature::WILDCARD)).await.unwrap();

        peer.set_client_mask(id, CapabilityMask::AXIS).unwrap();
        peer.set_client_button_mask(id, 0xF0).unwrap();

        let client = peer.client(id).unwrap();
        assert_eq!(client.mask, CapabilityMask::AXIS);
        assert_eq!(client.button_mask, 0xF0);
    }

    #[tokio::test]
    async fn test_emit_without_sink_returns_false() {
        let peer = LoopbackPeer::new();
        assert!(!peer.emit(MessageType::DEVICE_STATE, &[]));
        assert!(!peer.attach_device(1));
    }
}
