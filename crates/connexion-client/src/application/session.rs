//! SessionManager: the client lifecycle against the driver peer.
//!
//! # State machine (for beginners)
//!
//! ```text
//!  Uninstalled ──install──► Installed ──register──► Registered(session)
//!       ▲                       │  ▲                      │
//!       └──────shutdown─────────┘  └──────unregister──────┘
//! ```
//!
//! - `install` opens the notification channel and attaches the
//!   [`DispatchRouter`] that calls the application's handler.
//! - `register` returns a [`ClientSession`]: a plain value naming one
//!   driver-side client.  Mask updates and per-client control requests take
//!   that value; once it is unregistered every operation on it fails with
//!   [`ProtocolError::InvalidSession`].
//! - `shutdown` unregisters everything, detaches the router and closes the
//!   channel.  Calling it when nothing is installed does nothing.
//!
//! Every operation in `Uninstalled` fails with [`ProtocolError::NotInstalled`].
//!
//! # Timeouts
//!
//! The protocol itself never times out.  Every round-trip that waits for the
//! driver (`install`, `register`, `control`, the prefs query, label upload)
//! is bounded by the manager's timeout and reports
//! [`ProtocolError::PeerUnresponsive`] when it expires.

use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;

use connexion_core::protocol::codec::{decode_device_prefs, truncate_name};
use connexion_core::protocol::labels::encode_button_labels;
use connexion_core::protocol::messages::{
    ButtonMask, CapabilityMask, ClientMode, DevicePrefs, Signature,
};
use connexion_core::{ControlCommand, DeviceIds, ProtocolError, Subscription};
use tracing::{debug, info, warn};

use crate::application::dispatch::{ConnexionHandler, DispatchOptions, DispatchRouter, DispatchStats};
use crate::application::registry::ClientRegistry;
use crate::infrastructure::peer::{DriverPeer, MessageSink, PeerError, RegistrationRequest};

/// Default bound on a driver round-trip.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_millis(1000);

/// One registered client, returned by [`SessionManager::register`].
///
/// A plain value: clone it freely, but mask updates through one copy are not
/// seen by the others.  Query the manager for the authoritative masks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientSession {
    id: u16,
    generation: u64,
    signature: Signature,
    name: String,
    mode: ClientMode,
    capability_mask: CapabilityMask,
    button_mask: ButtonMask,
}

impl ClientSession {
    /// Driver-assigned client id; never 0.
    pub fn id(&self) -> u16 {
        self.id
    }

    pub fn signature(&self) -> Signature {
        self.signature
    }

    /// Display name as sent to the driver, after truncation.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn mode(&self) -> ClientMode {
        self.mode
    }

    pub fn capability_mask(&self) -> CapabilityMask {
        self.capability_mask
    }

    pub fn button_mask(&self) -> ButtonMask {
        self.button_mask
    }
}

/// Owns the connection to the driver peer and every session opened on it.
pub struct SessionManager {
    peer: Arc<dyn DriverPeer>,
    timeout: Duration,
    options: DispatchOptions,
    registry: Arc<RwLock<ClientRegistry>>,
    router: Mutex<Option<Arc<DispatchRouter>>>,
    install_lock: tokio::sync::Mutex<()>,
}

impl SessionManager {
    pub fn new(peer: Arc<dyn DriverPeer>, timeout: Duration, options: DispatchOptions) -> Self {
        Self {
            peer,
            timeout,
            options,
            registry: Arc::new(RwLock::new(ClientRegistry::new())),
            router: Mutex::new(None),
            install_lock: tokio::sync::Mutex::new(()),
        }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn is_installed(&self) -> bool {
        self.router_slot().is_some()
    }

    /// Number of sessions currently registered through this manager.
    pub fn live_sessions(&self) -> usize {
        self.registry().len()
    }

    /// Delivery counters of the attached router, if installed.
    pub fn stats(&self) -> Option<DispatchStats> {
        self.router_slot().as_ref().map(|r| r.stats())
    }

    // ── Lifecycle ────────────────────────────────────────────────────────────

    /// Opens the channel to the driver and attaches `handler`.
    ///
    /// A second call while installed keeps the first handler and returns
    /// `Ok`.
    ///
    /// # Errors
    ///
    /// - [`ProtocolError::PeerUnavailable`] if the driver cannot be located.
    /// - [`ProtocolError::PeerUnresponsive`] if it does not answer in time.
    pub async fn install(&self, handler: Arc<dyn ConnexionHandler>) -> Result<(), ProtocolError> {
        let _serialized = self.install_lock.lock().await;
        if self.is_installed() {
            info!("connexion handlers already installed; keeping the existing handler");
            return Ok(());
        }

        let router = Arc::new(DispatchRouter::new(handler, Arc::clone(&self.registry), self.options));
        let sink: Arc<dyn MessageSink> = router.clone();
        self.round_trip("install", self.peer.connect(sink)).await?;

        *self.router_slot() = Some(router);
        info!(timeout = ?self.timeout, "connexion handlers installed");
        Ok(())
    }

    /// Requests a client id for `signature`.
    ///
    /// `name` is truncated to 63 bytes on a character boundary.  The new
    /// session's button mask starts as the legacy button bits of `mask`.
    ///
    /// # Errors
    ///
    /// - [`ProtocolError::NotInstalled`] before [`install`](Self::install).
    /// - [`ProtocolError::AlreadyRegistered`] if `signature` already holds a
    ///   session from this manager.
    /// - [`ProtocolError::RegistrationRejected`] if the driver refuses.
    /// - [`ProtocolError::PeerUnavailable`] / [`ProtocolError::PeerUnresponsive`].
    pub async fn register(
        &self,
        signature: Signature,
        name: &str,
        mode: ClientMode,
        mask: CapabilityMask,
    ) -> Result<ClientSession, ProtocolError> {
        self.require_installed()?;
        if self.registry().contains_signature(signature) {
            return Err(ProtocolError::AlreadyRegistered(signature));
        }

        let wire_name = truncate_name(name);
        if wire_name.len() < name.len() {
            warn!(
                original = name.len(),
                kept = wire_name.len(),
                "client name truncated to fit the driver's name field"
            );
        }
        let request = RegistrationRequest {
            signature,
            name: wire_name.to_string(),
            mode,
            mask,
        };

        let registration = async {
            self.peer.register_client(request).await.map_err(|err| match err {
                PeerError::Rejected(reason) => ProtocolError::RegistrationRejected(reason),
                other => other.into(),
            })
        };
        let id = self.round_trip("register", registration).await?;
        if id == 0 {
            return Err(ProtocolError::RegistrationRejected(
                "driver returned client id 0".to_string(),
            ));
        }

        let button_mask = ButtonMask(mask.legacy_buttons());
        let inserted = self
            .registry_mut()
            .insert(id, signature, Subscription::new(mask, button_mask));
        let Some(generation) = inserted else {
            // Lost a race with a concurrent registration of the same signature.
            if let Err(err) = self.peer.unregister_client(id) {
                warn!(client = id, "failed to release duplicate registration: {err}");
            }
            return Err(ProtocolError::AlreadyRegistered(signature));
        };

        info!(client = id, %signature, ?mode, mask = %format!("0x{:04X}", mask.0), "client registered");
        Ok(ClientSession {
            id,
            generation,
            signature,
            name: wire_name.to_string(),
            mode,
            capability_mask: mask,
            button_mask,
        })
    }

    /// Releases `session`.  Once this returns the handler receives nothing
    /// more for it, even if a delivery was in flight on another thread.
    ///
    /// Safe to call from inside a handler.  The local session is released
    /// even if the driver call fails; that failure is still returned.
    ///
    /// # Errors
    ///
    /// - [`ProtocolError::NotInstalled`], [`ProtocolError::InvalidSession`].
    /// - [`ProtocolError::PeerUnavailable`] if the driver has gone away.
    pub fn unregister(&self, session: &ClientSession) -> Result<(), ProtocolError> {
        let router = self.require_installed()?;
        if self.registry_mut().remove(session.id, session.generation).is_none() {
            return Err(ProtocolError::InvalidSession);
        }
        router.forget(session.id);
        router.quiesce();

        let result = self.peer.unregister_client(session.id).map_err(ProtocolError::from);
        match &result {
            Ok(()) => info!(client = session.id, "client unregistered"),
            Err(err) => warn!(client = session.id, "driver failed to unregister client: {err}"),
        }
        result
    }

    /// Reverses [`install`](Self::install).  A no-op when not installed.
    pub fn shutdown(&self) {
        let Some(router) = self.router_slot().take() else {
            debug!("shutdown requested while not installed");
            return;
        };

        let drained = self.registry_mut().drain();
        for (id, _) in &drained {
            if let Err(err) = self.peer.unregister_client(*id) {
                warn!(client = id, "failed to unregister client during shutdown: {err}");
            }
        }
        router.close();
        if let Err(err) = self.peer.disconnect() {
            warn!("failed to disconnect from driver: {err}");
        }
        info!(sessions = drained.len(), "connexion handlers removed");
    }

    // ── Subscription ─────────────────────────────────────────────────────────

    /// Replaces the capability mask of `session`.  Fire-and-forget: the
    /// driver sends no acknowledgement.
    ///
    /// # Errors
    ///
    /// [`ProtocolError::NotInstalled`], [`ProtocolError::InvalidSession`],
    /// or [`ProtocolError::PeerUnavailable`].
    pub fn set_capability_mask(
        &self,
        session: &mut ClientSession,
        mask: CapabilityMask,
    ) -> Result<(), ProtocolError> {
        self.require_live(session)?;
        self.peer.set_client_mask(session.id, mask.0)?;
        if !self.registry_mut().set_capability(session.id, session.generation, mask) {
            return Err(ProtocolError::InvalidSession);
        }
        session.capability_mask = mask;
        debug!(client = session.id, mask = %format!("0x{:04X}", mask.0), "capability mask updated");
        Ok(())
    }

    /// Replaces the 32-bit button mask of `session`.
    ///
    /// # Errors
    ///
    /// Same as [`set_capability_mask`](Self::set_capability_mask).
    pub fn set_button_mask(&self, session: &mut ClientSession, mask: ButtonMask) -> Result<(), ProtocolError> {
        self.require_live(session)?;
        self.peer.set_client_button_mask(session.id, mask.0)?;
        if !self.registry_mut().set_buttons(session.id, session.generation, mask) {
            return Err(ProtocolError::InvalidSession);
        }
        session.button_mask = mask;
        debug!(client = session.id, mask = %format!("0x{:08X}", mask.0), "button mask updated");
        Ok(())
    }

    /// The capability mask currently in effect for `session`.
    ///
    /// # Errors
    ///
    /// [`ProtocolError::NotInstalled`] or [`ProtocolError::InvalidSession`].
    pub fn capability_mask(&self, session: &ClientSession) -> Result<CapabilityMask, ProtocolError> {
        self.require_installed()?;
        self.registry()
            .get_live(session.id, session.generation)
            .map(|c| c.subscription.capability)
            .ok_or(ProtocolError::InvalidSession)
    }

    /// The button mask currently in effect for `session`.
    ///
    /// # Errors
    ///
    /// [`ProtocolError::NotInstalled`] or [`ProtocolError::InvalidSession`].
    pub fn button_mask(&self, session: &ClientSession) -> Result<ButtonMask, ProtocolError> {
        self.require_installed()?;
        self.registry()
            .get_live(session.id, session.generation)
            .map(|c| c.subscription.buttons)
            .ok_or(ProtocolError::InvalidSession)
    }

    // ── Requests ─────────────────────────────────────────────────────────────

    /// Sends `command` and returns the driver's result word.
    ///
    /// With `session` set the per-client form is used; with `None` the
    /// legacy global form.  Every call reaches the driver; nothing is
    /// coalesced.
    ///
    /// # Errors
    ///
    /// - [`ProtocolError::NotInstalled`].
    /// - [`ProtocolError::InvalidSession`] for a released session, or for a
    ///   per-client-only command sent without one.
    /// - [`ProtocolError::PeerUnavailable`] / [`ProtocolError::PeerUnresponsive`].
    pub async fn control(
        &self,
        session: Option<&ClientSession>,
        command: ControlCommand,
    ) -> Result<i32, ProtocolError> {
        self.require_installed()?;
        let client = match session {
            Some(session) => {
                self.require_live(session)?;
                Some(session.id)
            }
            None if command.requires_session() => return Err(ProtocolError::InvalidSession),
            None => None,
        };

        let result = self
            .round_trip("control", self.peer.control(client, command.code(), command.param()))
            .await?;
        debug!(?client, ?command, result, "control command sent");
        Ok(result)
    }

    /// Reads the vendor and product ids of the current device.
    ///
    /// # Errors
    ///
    /// Same as [`control`](Self::control).
    pub async fn device_ids(&self, session: Option<&ClientSession>) -> Result<DeviceIds, ProtocolError> {
        let result = self.control(session, ControlCommand::GetDeviceId).await?;
        Ok(DeviceIds::from_result(result))
    }

    /// Fetches a snapshot of the driver's current prefs.
    ///
    /// # Errors
    ///
    /// [`ProtocolError::NotInstalled`], peer errors, or any decode error of
    /// the returned record.
    pub async fn get_device_prefs(&self, device_id: u16) -> Result<DevicePrefs, ProtocolError> {
        self.require_installed()?;
        let bytes = self.round_trip("device_prefs", self.peer.device_prefs(device_id)).await?;
        decode_device_prefs(&bytes)
    }

    /// Uploads on-device button labels; missing entries revert to defaults.
    ///
    /// # Errors
    ///
    /// [`ProtocolError::NotInstalled`], [`ProtocolError::InvalidParameter`]
    /// for labels that cannot be encoded, or peer errors.
    pub async fn set_button_labels<S: AsRef<str>>(&self, labels: &[S]) -> Result<(), ProtocolError> {
        self.require_installed()?;
        let data = encode_button_labels(labels)?;
        self.round_trip("set_button_labels", self.peer.set_button_labels(data)).await
    }

    // ── Private helpers ──────────────────────────────────────────────────────

    async fn round_trip<T, E, F>(&self, operation: &'static str, request: F) -> Result<T, ProtocolError>
    where
        F: Future<Output = Result<T, E>>,
        E: Into<ProtocolError>,
    {
        match tokio::time::timeout(self.timeout, request).await {
            Ok(result) => result.map_err(Into::into),
            Err(_) => {
                warn!(operation, timeout = ?self.timeout, "driver did not respond in time");
                Err(ProtocolError::PeerUnresponsive(self.timeout))
            }
        }
    }

    fn require_installed(&self) -> Result<Arc<DispatchRouter>, ProtocolError> {
        self.router_slot().as_ref().cloned().ok_or(ProtocolError::NotInstalled)
    }

    fn require_live(&self, session: &ClientSession) -> Result<(), ProtocolError> {
        self.require_installed()?;
        if self.registry().is_live(session.id, session.generation) {
            Ok(())
        } else {
            Err(ProtocolError::InvalidSession)
        }
    }

    fn router_slot(&self) -> MutexGuard<'_, Option<Arc<DispatchRouter>>> {
        self.router.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn registry(&self) -> RwLockReadGuard<'_, ClientRegistry> {
        self.registry.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn registry_mut(&self) -> RwLockWriteGuard<'_, ClientRegistry> {
        self.registry.write().unwrap_or_else(PoisonError::into_inner)
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::dispatch::MockConnexionHandler;
    use crate::infrastructure::peer::loopback::LoopbackPeer;

    fn quiet_handler() -> Arc<dyn ConnexionHandler> {
        let mut handler = MockConnexionHandler::new();
        handler.expect_state_changed().return_const(());
        handler.expect_device_added().return_const(());
        handler.expect_device_removed().return_const(());
        handler.expect_prefs_changed().return_const(());
        Arc::new(handler)
    }

    fn manager(peer: &Arc<LoopbackPeer>) -> SessionManager {
        SessionManager::new(peer.clone(), DEFAULT_TIMEOUT, DispatchOptions::default())
    }

    async fn installed() -> (Arc<LoopbackPeer>, SessionManager) {
        let peer = Arc::new(LoopbackPeer::new());
        let manager = manager(&peer);
        manager.install(quiet_handler()).await.expect("install should succeed");
        (peer, manager)
    }

    #[tokio::test]
    async fn test_register_before_install_fails() {
        let peer = Arc::new(LoopbackPeer::new());
        let manager = manager(&peer);

        let result = manager
            .register(Signature::WILDCARD, "x", ClientMode::TakeOver, CapabilityMask(CapabilityMask::ALL))
            .await;

        assert_eq!(result, Err(ProtocolError::NotInstalled));
    }

    #[tokio::test]
    async fn test_install_twice_keeps_first_handler() {
        // Arrange
        let (peer, manager) = installed().await;
        let mut second = MockConnexionHandler::new();
        second.expect_device_added().never();

        // Act
        let result = manager.install(Arc::new(second)).await;
        peer.attach_device(7);

        // Assert
        assert!(result.is_ok());
        assert!(manager.is_installed());
    }

    #[tokio::test]
    async fn test_install_against_unloaded_driver_is_unavailable() {
        let peer = Arc::new(LoopbackPeer::new());
        peer.unload();
        let manager = manager(&peer);

        assert_eq!(manager.install(quiet_handler()).await, Err(ProtocolError::PeerUnavailable));
        assert!(!manager.is_installed());
    }

    #[tokio::test]
    async fn test_register_sets_initial_masks() {
        // Arrange
        let (peer, manager) = installed().await;
        let mask = CapabilityMask(CapabilityMask::AXIS | CapabilityMask::BUTTON_1 | CapabilityMask::BUTTON_2);

        // Act
        let session = manager
            .register(Signature::from_four_cc(b"CxMn"), "Monitor", ClientMode::Plugin, mask)
            .await
            .unwrap();

        // Assert
        assert_ne!(session.id(), 0);
        assert_eq!(session.button_mask(), ButtonMask(0b11));
        assert_eq!(manager.capability_mask(&session), Ok(mask));
        let client = peer.client(session.id()).unwrap();
        assert_eq!(client.mode, ClientMode::Plugin);
        assert_eq!(client.name, "Monitor");
    }

    #[tokio::test]
    async fn test_register_truncates_long_names() {
        let (peer, manager) = installed().await;
        let name = "n".repeat(80);

        let session = manager
            .register(Signature::WILDCARD, &name, ClientMode::TakeOver, CapabilityMask(0))
            .await
            .unwrap();

        assert_eq!(session.name().len(), 63);
        assert_eq!(peer.client(session.id()).unwrap().name.len(), 63);
    }

    #[tokio::test]
    async fn test_duplicate_signature_is_already_registered() {
        let (_peer, manager) = installed().await;
        let sig = Signature::from_four_cc(b"CxMn");
        manager.register(sig, "a", ClientMode::TakeOver, CapabilityMask(0)).await.unwrap();

        let result = manager.register(sig, "b", ClientMode::TakeOver, CapabilityMask(0)).await;

        assert_eq!(result, Err(ProtocolError::AlreadyRegistered(sig)));
    }

    #[tokio::test]
    async fn test_driver_rejection_is_registration_rejected() {
        let peer = Arc::new(LoopbackPeer::with_max_clients(0));
        let manager = manager(&peer);
        manager.install(quiet_handler()).await.unwrap();

        let result = manager
            .register(Signature::WILDCARD, "x", ClientMode::TakeOver, CapabilityMask(0))
            .await;

        assert!(matches!(result, Err(ProtocolError::RegistrationRejected(_))));
    }

    #[tokio::test]
    async fn test_reissued_id_does_not_revive_stale_session() {
        // Arrange
        let (_peer, manager) = installed().await;
        let old = manager
            .register(Signature::from_four_cc(b"AAAA"), "a", ClientMode::TakeOver, CapabilityMask(0))
            .await
            .unwrap();
        manager.unregister(&old).unwrap();

        // Act: the loopback peer hands out the lowest free id again.
        let new = manager
            .register(Signature::from_four_cc(b"BBBB"), "b", ClientMode::TakeOver, CapabilityMask(0))
            .await
            .unwrap();

        // Assert
        assert_eq!(new.id(), old.id());
        assert_eq!(
            manager.control(Some(&old), ControlCommand::Calibrate).await,
            Err(ProtocolError::InvalidSession)
        );
        assert!(manager.control(Some(&new), ControlCommand::Calibrate).await.is_ok());
    }

    #[tokio::test]
    async fn test_set_switches_without_session_is_invalid() {
        let (peer, manager) = installed().await;
        let command = ControlCommand::SetSwitches(connexion_core::FeatureSwitches(0));

        assert_eq!(manager.control(None, command).await, Err(ProtocolError::InvalidSession));
        assert!(peer.controls().is_empty());
    }

    #[tokio::test]
    async fn test_device_ids_splits_result() {
        let (peer, manager) = installed().await;
        peer.set_device_ids(DeviceIds {
            vendor: 0x046D,
            product: 0xC626,
        });

        let ids = manager.device_ids(None).await.unwrap();

        assert_eq!(ids.vendor, 0x046D);
        assert_eq!(ids.product, 0xC626);
    }

    #[tokio::test]
    async fn test_button_labels_are_uploaded() {
        let (peer, manager) = installed().await;

        manager.set_button_labels(&["Fit", "Top"]).await.unwrap();

        let labels = peer.button_labels().unwrap();
        assert_eq!(&labels[..2], &["Fit".to_string(), "Top".to_string()]);
    }

    #[tokio::test]
    async fn test_shutdown_without_install_is_noop() {
        let peer = Arc::new(LoopbackPeer::new());
        let manager = manager(&peer);
        manager.shutdown();
        assert!(!manager.is_installed());
    }

    #[tokio::test]
    async fn test_shutdown_releases_everything() {
        let (peer, manager) = installed().await;
        manager
            .register(Signature::from_four_cc(b"AAAA"), "a", ClientMode::TakeOver, CapabilityMask(0))
            .await
            .unwrap();

        manager.shutdown();

        assert_eq!(peer.client_count(), 0);
        assert!(!peer.is_connected());
        assert_eq!(manager.live_sessions(), 0);
        assert_eq!(manager.get_device_prefs(0).await, Err(ProtocolError::NotInstalled));
    }
}
