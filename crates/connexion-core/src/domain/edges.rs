//! Per-client edge detection over decoded device states.
//!
//! The driver forwards a full state record every time anything on the device
//! moves.  [`EdgeTracker`] remembers the last state each client saw and turns
//! a new record into the minimal list of [`StateChange`]s: axis changes and
//! button changes are reported separately, and only for the controls the
//! client subscribed to.
//!
//! Records that carry an explicit assignment (any [`ClientCommand`] other
//! than the implicit data commands) are not diffed; they become a single
//! [`StateChange::Command`] built with [`StateChange::command`].

use std::collections::HashMap;

use crate::domain::axes::AxisValues;
use crate::protocol::messages::{ButtonMask, CapabilityMask, ClientCommand, DeviceState, RAW_REPORT_SIZE};

/// The inputs one client asked the driver to forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Subscription {
    pub capability: CapabilityMask,
    pub buttons: ButtonMask,
}

impl Subscription {
    pub fn new(capability: CapabilityMask, buttons: ButtonMask) -> Self {
        Self {
            capability,
            buttons,
        }
    }

    /// 32-bit button subscription united with the legacy bits of the
    /// capability mask.
    pub fn effective_buttons(&self) -> u32 {
        self.buttons.0 | self.capability.legacy_buttons()
    }

    pub fn wants_axes(&self) -> bool {
        self.capability.has_any_axis()
    }

    pub fn wants_buttons(&self) -> bool {
        self.effective_buttons() != 0
    }
}

/// A change the router delivers to the application.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StateChange {
    /// Subscribed axis values, unsubscribed axes zeroed.
    Axes {
        client: u16,
        device_address: u16,
        axes: AxisValues,
    },
    /// Subscribed buttons, with the bits that went down and up since the
    /// previous state.
    Buttons {
        client: u16,
        device_address: u16,
        buttons: u32,
        pressed: u32,
        released: u32,
    },
    /// An assignment the driver routed to this client, such as an
    /// application-specific button function in plugin mode.
    Command {
        client: u16,
        device_address: u16,
        command: ClientCommand,
        param: i16,
        value: i32,
        raw_report: [u8; RAW_REPORT_SIZE],
    },
}

impl StateChange {
    pub fn client(&self) -> u16 {
        match self {
            StateChange::Axes { client, .. }
            | StateChange::Buttons { client, .. }
            | StateChange::Command { client, .. } => *client,
        }
    }

    /// The command change carried by `state`, or `None` for an implicit
    /// data record that goes through edge detection instead.
    pub fn command(state: &DeviceState) -> Option<StateChange> {
        let command = state.client_command();
        if command.is_implicit_data() {
            return None;
        }
        Some(StateChange::Command {
            client: state.target_client,
            device_address: state.device_address,
            command,
            param: state.param,
            value: state.value,
            raw_report: state.raw_report,
        })
    }

    pub fn is_axes(&self) -> bool {
        matches!(self, StateChange::Axes { .. })
    }

    pub fn is_buttons(&self) -> bool {
        matches!(self, StateChange::Buttons { .. })
    }

    pub fn is_command(&self) -> bool {
        matches!(self, StateChange::Command { .. })
    }
}

#[derive(Debug, Clone, Copy, Default)]
struct Observed {
    axes: AxisValues,
    buttons: u32,
}

/// Remembers the last subscribed state per client.
#[derive(Debug, Default)]
pub struct EdgeTracker {
    edge_detection: bool,
    last: HashMap<u16, Observed>,
}

impl EdgeTracker {
    /// With `edge_detection` off every observed state yields both kinds of
    /// change; with it on only the kinds that differ from the previous state.
    pub fn new(edge_detection: bool) -> Self {
        Self {
            edge_detection,
            last: HashMap::new(),
        }
    }

    pub fn edge_detection(&self) -> bool {
        self.edge_detection
    }

    /// Feeds one state for `client` and returns the changes to deliver.
    ///
    /// `axes` must already be processed (masked, filtered); buttons are
    /// masked here with the subscription's effective button set.  A client
    /// seen for the first time is compared against an all-zero state.
    pub fn observe(
        &mut self,
        client: u16,
        device_address: u16,
        axes: AxisValues,
        buttons: u32,
        subscription: &Subscription,
    ) -> Vec<StateChange> {
        let axes = axes.masked(subscription.capability);
        let buttons = buttons & subscription.effective_buttons();

        let previous = self.last.get(&client).copied().unwrap_or_default();
        self.last.insert(client, Observed { axes, buttons });

        let mut changes = Vec::with_capacity(2);
        if subscription.wants_axes() && (!self.edge_detection || axes != previous.axes) {
            changes.push(StateChange::Axes {
                client,
                device_address,
                axes,
            });
        }
        if subscription.wants_buttons() && (!self.edge_detection || buttons != previous.buttons) {
            changes.push(StateChange::Buttons {
                client,
                device_address,
                buttons,
                pressed: buttons & !previous.buttons,
                released: previous.buttons & !buttons,
            });
        }
        changes
    }

    /// Drops the remembered state of `client`.
    pub fn forget(&mut self, client: u16) {
        self.last.remove(&client);
    }

    pub fn clear(&mut self) {
        self.last.clear();
    }
}
