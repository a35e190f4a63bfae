//! Connexion Monitor entry point.
//!
//! Registers one client with the driver and logs everything the handler
//! receives until Ctrl-C.
//!
//! # Architecture
//!
//! ```text
//! main()
//!  └─ load_config()            -- TOML file, defaults on first run
//!  └─ SessionManager::install  -- attaches LoggingHandler
//!  └─ SessionManager::register -- configured signature and masks
//!  └─ get_device_prefs         -- logged once at startup
//!  └─ ctrl_c().await
//!  └─ unregister + shutdown
//! ```
//!
//! # Driver peer
//!
//! The monitor runs against `LoopbackPeer`, the in-process driver, so it
//! starts on machines without the vendor driver installed.  A build that
//! links the real driver swaps in its `DriverPeer` implementation here.

use std::sync::Arc;

use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

use connexion_client::infrastructure::peer::loopback::LoopbackPeer;
use connexion_client::infrastructure::storage::config::{load_config, MonitorConfig};
use connexion_client::{ConnexionHandler, SessionManager};
use connexion_core::protocol::device_id;
use connexion_core::{DeviceState, ProtocolError, Signature, StateChange};

/// Handler that writes every callback to the log.
struct LoggingHandler;

impl ConnexionHandler for LoggingHandler {
    fn device_added(&self, connection: u32) {
        info!(connection, "device added");
    }

    fn device_removed(&self, connection: u32) {
        info!(connection, "device removed");
    }

    fn state_changed(&self, change: &StateChange) {
        match change {
            StateChange::Axes { client, axes, .. } => {
                let [tx, ty, tz, rx, ry, rz] = axes.0;
                debug!(client, tx, ty, tz, rx, ry, rz, "axes");
            }
            StateChange::Buttons {
                client,
                buttons,
                pressed,
                released,
                ..
            } => {
                info!(
                    client,
                    buttons = %format!("0x{buttons:08X}"),
                    pressed = %format!("0x{pressed:08X}"),
                    released = %format!("0x{released:08X}"),
                    "buttons"
                );
            }
            StateChange::Command {
                client,
                command,
                param,
                value,
                ..
            } => {
                info!(client, ?command, param, value, "driver assignment");
            }
        }
    }

    fn prefs_changed(&self, signature: Signature) {
        info!(%signature, "prefs changed");
    }

    fn calibration(&self, state: &DeviceState) {
        info!(client = state.target_client, "device calibrated");
    }

    fn decode_failed(&self, error: &ProtocolError) {
        warn!("dropped driver message: {error}");
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let (config, config_error) = match load_config() {
        Ok(config) => (config, None),
        Err(e) => (MonitorConfig::default(), Some(e)),
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level)),
        )
        .init();

    info!("Connexion Monitor starting");
    if let Some(e) = config_error {
        warn!("using default configuration: {e}");
    }

    let signature = config.signature()?;
    let peer = Arc::new(LoopbackPeer::new());
    let manager = SessionManager::new(peer, config.timeout(), config.dispatch_options());

    // ── Install and register ──────────────────────────────────────────────────
    manager.install(Arc::new(LoggingHandler)).await?;
    let mut session = manager
        .register(signature, &config.client.name, config.client.mode, config.capability_mask())
        .await?;
    manager.set_button_mask(&mut session, config.button_mask())?;

    let ids = manager.device_ids(Some(&session)).await?;
    info!(
        client = session.id(),
        vendor = %format!("0x{:04X}", ids.vendor),
        product = %format!("0x{:04X}", ids.product),
        "session ready"
    );

    match manager.get_device_prefs(device_id::ANY_DEVICE).await {
        Ok(prefs) => info!(
            app = %prefs.app_name,
            speed = prefs.main_speed,
            dominant = prefs.dominant,
            gamma = prefs.gamma(),
            "current device prefs"
        ),
        Err(e) => warn!("could not read device prefs: {e}"),
    }

    // ── Run until Ctrl-C ──────────────────────────────────────────────────────
    tokio::signal::ctrl_c().await?;
    info!("shutdown signal received");

    if let Err(e) = manager.unregister(&session) {
        warn!("unregister failed: {e}");
    }
    manager.shutdown();

    if let Some(stats) = manager.stats() {
        debug!(?stats, "final dispatch counters");
    }
    info!("Connexion Monitor stopped");
    Ok(())
}
