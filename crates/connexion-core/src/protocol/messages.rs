//! Wire types exchanged with the 3Dconnexion driver peer.
//!
//! Every record here mirrors a packed C structure (`#pragma pack(2)`) that the
//! driver writes in host byte order, which is little-endian on every platform
//! the driver ships for.  The byte-level layout lives in
//! [`crate::protocol::codec`]; this module only defines the typed view.
//!
//! # Four-character codes (for beginners)
//!
//! The driver identifies messages, commands, and applications with
//! "four-character codes": four ASCII bytes packed into a `u32`, first byte in
//! the most significant position.  `'3dSR'` therefore becomes `0x3364_5352`.
//! [`four_cc`] performs that packing at compile time.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::domain::axes::{AxisValues, AXIS_COUNT};
use crate::protocol::error::ProtocolError;

/// Packs four ASCII bytes into a big-first `u32`, the way the driver does.
pub const fn four_cc(code: &[u8; 4]) -> u32 {
    u32::from_be_bytes(*code)
}

// ── Record constants ──────────────────────────────────────────────────────────

/// Type tag of the device-state record (`'MS'`).
pub const DEVICE_STATE_TYPE: u16 = 0x4D53;

/// Version tag of the device-state record (`'m3'`, 32-bit buttons).
pub const DEVICE_STATE_VERSION: u16 = 0x6D33;

/// Exact size of an encoded device-state record in bytes.
pub const DEVICE_STATE_SIZE: usize = 48;

/// Type tag of the device-prefs record (`'MP'`).
pub const DEVICE_PREFS_TYPE: u16 = 0x4D50;

/// Version tag of the device-prefs record (`'p1'`).
pub const DEVICE_PREFS_VERSION: u16 = 0x7031;

/// Exact size of an encoded device-prefs record in bytes.
pub const DEVICE_PREFS_SIZE: usize = 152;

/// Size of the fixed application-name field, length byte included.
pub const APP_NAME_FIELD_SIZE: usize = 64;

/// Longest name that fits the application-name field.
pub const MAX_NAME_LEN: usize = APP_NAME_FIELD_SIZE - 1;

/// Size of the raw USB report carried in every device-state record.
pub const RAW_REPORT_SIZE: usize = 8;

/// Highest meaningful per-axis speed or sensitivity; 201–255 are reserved.
pub const MAX_AXIS_LEVEL: u8 = 200;

/// Fixed-point factor of [`DevicePrefs::scale`].
pub const SCALE_FACTOR: i32 = 10_000;

/// Fixed-point factor of [`DevicePrefs::gamma`]; this value means linear.
pub const GAMMA_LINEAR: u32 = 1_000;

/// User-client type used when opening the driver service.
pub const USER_CLIENT_TYPE: u32 = four_cc(b"3dUC");

/// Device identifiers accepted by the prefs query.
///
/// The driver no longer distinguishes per-device prefs and always answers
/// with [`device_id::ANY_DEVICE`]; the other values remain for compatibility.
pub mod device_id {
    pub const SPACE_NAVIGATOR: u16 = 0x00;
    pub const SPACE_NAVIGATOR_NB: u16 = 0x01;
    pub const SPACE_EXPLORER: u16 = 0x02;
    pub const SPACE_TRAVELER: u16 = 0x03;
    pub const SPACE_PILOT: u16 = 0x04;
    pub const SPACE_PILOT_PRO: u16 = 0x05;
    pub const SPACE_MOUSE_PRO: u16 = 0x06;
    /// Number of concrete device identifiers.
    pub const COUNT: u16 = 7;
    /// Wildcard meaning "the first available device".
    pub const ANY_DEVICE: u16 = 0x7FFF;
}

// ── Application signature ─────────────────────────────────────────────────────

/// Four-character application identity used for registration and prefs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Signature(pub u32);

impl Signature {
    /// `'****'`: take the device over system-wide, in every application.
    pub const WILDCARD: Signature = Signature(0x2A2A_2A2A);

    pub const fn from_four_cc(code: &[u8; 4]) -> Self {
        Signature(four_cc(code))
    }

    pub fn is_wildcard(&self) -> bool {
        *self == Self::WILDCARD
    }

    pub fn to_bytes(self) -> [u8; 4] {
        self.0.to_be_bytes()
    }
}

impl fmt::Display for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let bytes = self.to_bytes();
        if bytes.iter().all(|b| b.is_ascii_graphic() || *b == b' ') {
            let text: String = bytes.iter().map(|&b| b as char).collect();
            write!(f, "'{text}'")
        } else {
            write!(f, "0x{:08X}", self.0)
        }
    }
}

impl FromStr for Signature {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bytes: [u8; 4] = s.as_bytes().try_into().map_err(|_| {
            ProtocolError::InvalidParameter(format!(
                "signature must be exactly 4 bytes, got {:?}",
                s
            ))
        })?;
        if !bytes.iter().all(u8::is_ascii) {
            return Err(ProtocolError::InvalidParameter(format!(
                "signature must be ASCII, got {s:?}"
            )));
        }
        Ok(Signature::from_four_cc(&bytes))
    }
}

// ── Registration mode ─────────────────────────────────────────────────────────

/// How a registered client shares the device with the driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
#[repr(u16)]
pub enum ClientMode {
    /// Driver stops executing its own assignments for this client.
    TakeOver = 1,
    /// Client only receives assignments routed to plugins.
    Plugin = 2,
}

impl TryFrom<u16> for ClientMode {
    type Error = ProtocolError;

    fn try_from(value: u16) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(ClientMode::TakeOver),
            2 => Ok(ClientMode::Plugin),
            other => Err(ProtocolError::InvalidParameter(format!(
                "unknown client mode: {other}"
            ))),
        }
    }
}

// ── Masks ─────────────────────────────────────────────────────────────────────

/// Client capability mask: which controls the driver forwards to the client.
///
/// Bit layout:
/// - Bits 0–7: buttons 1–8 (legacy; see [`ButtonMask`] for all 32)
/// - Bits 8–10: translation axes X, Y, Z
/// - Bits 11–13: rotation axes X, Y, Z
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct CapabilityMask(pub u32);

impl CapabilityMask {
    pub const BUTTON_1: u32 = 0x0001;
    pub const BUTTON_2: u32 = 0x0002;
    pub const BUTTON_3: u32 = 0x0004;
    pub const BUTTON_4: u32 = 0x0008;
    pub const BUTTON_5: u32 = 0x0010;
    pub const BUTTON_6: u32 = 0x0020;
    pub const BUTTON_7: u32 = 0x0040;
    pub const BUTTON_8: u32 = 0x0080;

    pub const AXIS_1: u32 = 0x0100;
    pub const AXIS_2: u32 = 0x0200;
    pub const AXIS_3: u32 = 0x0400;
    pub const AXIS_4: u32 = 0x0800;
    pub const AXIS_5: u32 = 0x1000;
    pub const AXIS_6: u32 = 0x2000;

    /// First 8 buttons only, kept for backwards compatibility.
    pub const BUTTONS: u32 = 0x00FF;
    pub const AXIS_TRANS: u32 = 0x0700;
    pub const AXIS_ROT: u32 = 0x3800;
    pub const AXIS: u32 = 0x3F00;
    pub const ALL: u32 = 0x3FFF;

    /// Bit for the zero-based axis `index` (0 = TX … 5 = RZ).
    pub const fn axis_bit(index: usize) -> u32 {
        Self::AXIS_1 << index
    }

    /// Returns `true` if the zero-based axis `index` is forwarded.
    pub fn has_axis(&self, index: usize) -> bool {
        index < AXIS_COUNT && self.0 & Self::axis_bit(index) != 0
    }

    /// Returns `true` if at least one axis is forwarded.
    pub fn has_any_axis(&self) -> bool {
        self.0 & Self::AXIS != 0
    }

    /// The legacy button bits (buttons 1–8).
    pub fn legacy_buttons(&self) -> u32 {
        self.0 & Self::BUTTONS
    }
}

/// 32-bit button subscription, one bit per button (bit 0 = button 1).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct ButtonMask(pub u32);

impl ButtonMask {
    pub const NONE: u32 = 0;
    pub const ALL: u32 = 0xFFFF_FFFF;

    /// Bit for the one-based `button` number (1–32); 0 for out-of-range input.
    pub const fn button(button: u8) -> u32 {
        if button == 0 || button > 32 {
            0
        } else {
            1 << (button - 1)
        }
    }

    pub fn contains(&self, button: u8) -> bool {
        let bit = Self::button(button);
        bit != 0 && self.0 & bit != 0
    }
}

/// Client-controlled feature switches, sent with the `SetSwitches` command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct FeatureSwitches(pub u32);

impl FeatureSwitches {
    pub const ZOOM_ON_Y: u32 = 0x0001;
    pub const DOMINANT: u32 = 0x0002;
    pub const ENABLE_AXIS_1: u32 = 0x0004;
    pub const ENABLE_AXIS_2: u32 = 0x0008;
    pub const ENABLE_AXIS_3: u32 = 0x0010;
    pub const ENABLE_AXIS_4: u32 = 0x0020;
    pub const ENABLE_AXIS_5: u32 = 0x0040;
    pub const ENABLE_AXIS_6: u32 = 0x0080;
    pub const REVERSE_AXIS_1: u32 = 0x0100;
    pub const REVERSE_AXIS_2: u32 = 0x0200;
    pub const REVERSE_AXIS_3: u32 = 0x0400;
    pub const REVERSE_AXIS_4: u32 = 0x0800;
    pub const REVERSE_AXIS_5: u32 = 0x1000;
    pub const REVERSE_AXIS_6: u32 = 0x2000;

    pub const ENABLE_TRANS: u32 = 0x001C;
    pub const ENABLE_ROT: u32 = 0x00E0;
    pub const ENABLE_ALL: u32 = 0x00FC;
    pub const REVERSE_TRANS: u32 = 0x0700;
    pub const REVERSE_ROT: u32 = 0x3800;
    pub const REVERSE_ALL: u32 = 0x3F00;

    /// Use the driver defaults instead of client-controlled switches.
    pub const DISABLED: u32 = 0x8000_0000;

    pub const fn enable_axis_bit(index: usize) -> u32 {
        Self::ENABLE_AXIS_1 << index
    }

    pub const fn reverse_axis_bit(index: usize) -> u32 {
        Self::REVERSE_AXIS_1 << index
    }

    pub fn is_disabled(&self) -> bool {
        self.0 & Self::DISABLED != 0
    }

    /// Builds the switch bitmap that reproduces the given prefs.
    pub fn from_prefs(prefs: &DevicePrefs) -> Self {
        let mut bits = 0u32;
        if prefs.zoom_on_y {
            bits |= Self::ZOOM_ON_Y;
        }
        if prefs.dominant {
            bits |= Self::DOMINANT;
        }
        for index in 0..AXIS_COUNT {
            if prefs.enabled[index] {
                bits |= Self::enable_axis_bit(index);
            }
            if prefs.reversed[index] {
                bits |= Self::reverse_axis_bit(index);
            }
        }
        FeatureSwitches(bits)
    }
}

// ── Message type codes ────────────────────────────────────────────────────────

/// Notification types the driver sends to user-space clients.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MessageType {
    /// `'3dSR'`: forwarded device state.
    DeviceState,
    /// `'3dSC'`: device state to be used for calibration.
    CalibrateDevice,
    /// `'3dPC'`: the current application prefs changed.
    PrefsChanged,
    /// `'3dDA'`: mapping executed by the user-space helper.
    DoMapping,
    /// `'3dMD'`: down event of a two-phase mapping.
    DoMappingDown,
    /// `'3dMU'`: up event of a two-phase mapping.
    DoMappingUp,
    /// `'3dLP'`: long press forwarded to the helper.
    DoLongPress,
    /// `'3dBS'`: battery status forwarded to the helper.
    BatteryStatus,
    /// Any code this crate does not know about.
    Unknown(u32),
}

impl MessageType {
    pub const DEVICE_STATE: u32 = four_cc(b"3dSR");
    pub const CALIBRATE_DEVICE: u32 = four_cc(b"3dSC");
    pub const PREFS_CHANGED: u32 = four_cc(b"3dPC");
    pub const DO_MAPPING: u32 = four_cc(b"3dDA");
    pub const DO_MAPPING_DOWN: u32 = four_cc(b"3dMD");
    pub const DO_MAPPING_UP: u32 = four_cc(b"3dMU");
    pub const DO_LONG_PRESS: u32 = four_cc(b"3dLP");
    pub const BATTERY_STATUS: u32 = four_cc(b"3dBS");

    /// Raw four-character code of this message type.
    pub fn code(&self) -> u32 {
        match self {
            MessageType::DeviceState => Self::DEVICE_STATE,
            MessageType::CalibrateDevice => Self::CALIBRATE_DEVICE,
            MessageType::PrefsChanged => Self::PREFS_CHANGED,
            MessageType::DoMapping => Self::DO_MAPPING,
            MessageType::DoMappingDown => Self::DO_MAPPING_DOWN,
            MessageType::DoMappingUp => Self::DO_MAPPING_UP,
            MessageType::DoLongPress => Self::DO_LONG_PRESS,
            MessageType::BatteryStatus => Self::BATTERY_STATUS,
            MessageType::Unknown(code) => *code,
        }
    }

    /// Returns `true` for helper coordination messages clients must ignore.
    pub fn is_internal(&self) -> bool {
        matches!(
            self,
            MessageType::DoMapping
                | MessageType::DoMappingDown
                | MessageType::DoMappingUp
                | MessageType::DoLongPress
                | MessageType::BatteryStatus
        )
    }
}

impl From<u32> for MessageType {
    fn from(code: u32) -> Self {
        match code {
            Self::DEVICE_STATE => MessageType::DeviceState,
            Self::CALIBRATE_DEVICE => MessageType::CalibrateDevice,
            Self::PREFS_CHANGED => MessageType::PrefsChanged,
            Self::DO_MAPPING => MessageType::DoMapping,
            Self::DO_MAPPING_DOWN => MessageType::DoMappingDown,
            Self::DO_MAPPING_UP => MessageType::DoMappingUp,
            Self::DO_LONG_PRESS => MessageType::DoLongPress,
            Self::BATTERY_STATUS => MessageType::BatteryStatus,
            other => MessageType::Unknown(other),
        }
    }
}

// ── Client commands ───────────────────────────────────────────────────────────

/// Assignment the driver asks the client to execute, carried in
/// [`DeviceState::command`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ClientCommand {
    None,
    HandleRawData,
    HandleButtons,
    HandleAxis,
    AppSpecific,
    /// A command code this crate does not interpret.
    Other(u16),
}

impl From<u16> for ClientCommand {
    fn from(value: u16) -> Self {
        match value {
            0 => ClientCommand::None,
            1 => ClientCommand::HandleRawData,
            2 => ClientCommand::HandleButtons,
            3 => ClientCommand::HandleAxis,
            10 => ClientCommand::AppSpecific,
            other => ClientCommand::Other(other),
        }
    }
}

impl ClientCommand {
    /// Plain data records: the state itself is the message and carries no
    /// assignment for the client to execute.
    pub fn is_implicit_data(&self) -> bool {
        matches!(
            self,
            ClientCommand::None | ClientCommand::HandleAxis | ClientCommand::HandleButtons
        )
    }
}

impl From<ClientCommand> for u16 {
    fn from(command: ClientCommand) -> Self {
        match command {
            ClientCommand::None => 0,
            ClientCommand::HandleRawData => 1,
            ClientCommand::HandleButtons => 2,
            ClientCommand::HandleAxis => 3,
            ClientCommand::AppSpecific => 10,
            ClientCommand::Other(code) => code,
        }
    }
}

// ── Device state record ───────────────────────────────────────────────────────

/// One decoded device-state record, as forwarded by the driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceState {
    /// Record version; always [`DEVICE_STATE_VERSION`] once decoded.
    pub version: u16,
    /// Client id the driver addressed this record to.
    pub target_client: u16,
    /// Raw [`ClientCommand`] code.
    pub command: u16,
    /// Optional parameter for `command`.
    pub param: i16,
    /// Optional value for `command`.
    pub value: i32,
    /// Driver uptime clock when the record was produced.
    pub timestamp: u64,
    /// Raw USB report from the device, opaque.
    pub raw_report: [u8; RAW_REPORT_SIZE],
    /// Buttons 1–8 only; superseded by `buttons`.
    pub legacy_buttons: u16,
    /// TX, TY, TZ, RX, RY, RZ.
    pub axis: AxisValues,
    /// Transport address telling one device from another.
    pub device_address: u16,
    /// All 32 buttons, bit 0 = button 1.
    pub buttons: u32,
}

impl DeviceState {
    /// An all-zero record of the current version addressed to `target_client`.
    pub fn new(target_client: u16) -> Self {
        Self {
            version: DEVICE_STATE_VERSION,
            target_client,
            command: 0,
            param: 0,
            value: 0,
            timestamp: 0,
            raw_report: [0; RAW_REPORT_SIZE],
            legacy_buttons: 0,
            axis: AxisValues::default(),
            device_address: 0,
            buttons: 0,
        }
    }

    pub fn client_command(&self) -> ClientCommand {
        ClientCommand::from(self.command)
    }

    /// Returns `true` if the one-based `button` is held.
    pub fn is_pressed(&self, button: u8) -> bool {
        ButtonMask(self.buttons).contains(button)
    }
}

impl Default for DeviceState {
    fn default() -> Self {
        Self::new(0)
    }
}

// ── Device prefs record ───────────────────────────────────────────────────────

/// Snapshot of the driver's current prefs for one application.
///
/// Fetched on demand with the prefs query; never pushed by the driver.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DevicePrefs {
    /// Device the prefs apply to, usually [`device_id::ANY_DEVICE`].
    pub device_id: u16,
    pub app_signature: Signature,
    /// Application name, at most [`MAX_NAME_LEN`] bytes on the wire.
    pub app_name: String,
    /// Overall speed.
    pub main_speed: u8,
    /// Y axis zooms and Z pans up/down (selects `map_h` over `map_v`).
    pub zoom_on_y: bool,
    /// Only the largest axis value is reported at any instant.
    pub dominant: bool,
    /// Axis mapping with zoom on the vertical axis.
    pub map_v: [i8; AXIS_COUNT],
    /// Axis mapping with zoom on the horizontal axis.
    pub map_h: [i8; AXIS_COUNT],
    pub enabled: [bool; AXIS_COUNT],
    pub reversed: [bool; AXIS_COUNT],
    /// 0–200; 201–255 reserved.
    pub speed: [u8; AXIS_COUNT],
    /// 0–200; 201–255 reserved.
    pub sensitivity: [u8; AXIS_COUNT],
    /// `SCALE_FACTOR` × scale, sign carries the natural reverse state.
    pub scale: [i32; AXIS_COUNT],
    /// `GAMMA_LINEAR` × gamma of the axial response curve.
    pub gamma: u32,
    /// Intersect value of the response curve, fixed-point ×1000.
    pub intersect: u32,
}

impl DevicePrefs {
    /// The axis mapping selected by `zoom_on_y`.
    pub fn active_mapping(&self) -> &[i8; AXIS_COUNT] {
        if self.zoom_on_y {
            &self.map_h
        } else {
            &self.map_v
        }
    }

    pub fn gamma(&self) -> f64 {
        f64::from(self.gamma) / f64::from(GAMMA_LINEAR)
    }

    pub fn is_linear(&self) -> bool {
        self.gamma == GAMMA_LINEAR
    }

    /// Scale of the zero-based axis `index` as a float, `None` when out of range.
    pub fn scale_of(&self, index: usize) -> Option<f64> {
        self.scale
            .get(index)
            .map(|s| f64::from(*s) / f64::from(SCALE_FACTOR))
    }

    /// Zeroes disabled axes and negates reversed ones.
    pub fn apply(&self, axes: AxisValues) -> AxisValues {
        let mut out = axes;
        for index in 0..AXIS_COUNT {
            if !self.enabled[index] {
                out.0[index] = 0;
            } else if self.reversed[index] {
                out.0[index] = out.0[index].saturating_neg();
            }
        }
        out
    }
}

impl Default for DevicePrefs {
    fn default() -> Self {
        Self {
            device_id: device_id::ANY_DEVICE,
            app_signature: Signature::WILDCARD,
            app_name: String::new(),
            main_speed: 100,
            zoom_on_y: false,
            dominant: false,
            map_v: [0, 1, 2, 3, 4, 5],
            map_h: [0, 2, 1, 3, 5, 4],
            enabled: [true; AXIS_COUNT],
            reversed: [false; AXIS_COUNT],
            speed: [100; AXIS_COUNT],
            sensitivity: [100; AXIS_COUNT],
            scale: [SCALE_FACTOR; AXIS_COUNT],
            gamma: GAMMA_LINEAR,
            intersect: 0,
        }
    }
}

// ── Decoded events ────────────────────────────────────────────────────────────

/// A typed inbound message, as produced by [`crate::protocol::decode_message`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    /// A validated device-state record.
    DeviceState(DeviceState),
    /// A device-state record meant for calibration.
    Calibration(DeviceState),
    /// Prefs of the application with this signature changed.
    PrefsChanged(Signature),
    /// A message clients tolerate without acting on it.
    Ignored(MessageType),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_four_cc_packs_first_byte_high() {
        assert_eq!(four_cc(b"3dSR"), 0x3364_5352);
        assert_eq!(MessageType::DEVICE_STATE, 0x3364_5352);
    }

    #[test]
    fn test_message_type_code_round_trips_through_from() {
        for ty in [
            MessageType::DeviceState,
            MessageType::CalibrateDevice,
            MessageType::PrefsChanged,
            MessageType::DoMapping,
            MessageType::DoMappingDown,
            MessageType::DoMappingUp,
            MessageType::DoLongPress,
            MessageType::BatteryStatus,
            MessageType::Unknown(0x1234_5678),
        ] {
            assert_eq!(MessageType::from(ty.code()), ty);
        }
    }

    #[test]
    fn test_internal_message_types_are_flagged() {
        assert!(MessageType::BatteryStatus.is_internal());
        assert!(MessageType::DoLongPress.is_internal());
        assert!(!MessageType::DeviceState.is_internal());
        assert!(!MessageType::Unknown(0).is_internal());
    }

    #[test]
    fn test_signature_wildcard_is_four_asterisks() {
        let sig: Signature = "****".parse().unwrap();
        assert_eq!(sig, Signature::WILDCARD);
        assert!(sig.is_wildcard());
    }

    #[test]
    fn test_signature_parse_rejects_wrong_length() {
        assert!(matches!(
            "abc".parse::<Signature>(),
            Err(ProtocolError::InvalidParameter(_))
        ));
        assert!(matches!(
            "abcde".parse::<Signature>(),
            Err(ProtocolError::InvalidParameter(_))
        ));
    }

    #[test]
    fn test_signature_display_prints_printable_codes_as_text() {
        assert_eq!(Signature::from_four_cc(b"CxMn").to_string(), "'CxMn'");
        assert_eq!(Signature(0x0000_0001).to_string(), "0x00000001");
    }

    #[test]
    fn test_client_mode_wire_values() {
        assert_eq!(ClientMode::TakeOver as u16, 1);
        assert_eq!(ClientMode::Plugin as u16, 2);
        assert_eq!(ClientMode::try_from(2).unwrap(), ClientMode::Plugin);
        assert!(ClientMode::try_from(3).is_err());
    }

    #[test]
    fn test_capability_mask_groups_are_unions_of_single_bits() {
        assert_eq!(
            CapabilityMask::AXIS_TRANS,
            CapabilityMask::AXIS_1 | CapabilityMask::AXIS_2 | CapabilityMask::AXIS_3
        );
        assert_eq!(
            CapabilityMask::AXIS_ROT,
            CapabilityMask::AXIS_4 | CapabilityMask::AXIS_5 | CapabilityMask::AXIS_6
        );
        assert_eq!(CapabilityMask::ALL, CapabilityMask::AXIS | CapabilityMask::BUTTONS);
    }

    #[test]
    fn test_capability_mask_axis_queries() {
        let mask = CapabilityMask(CapabilityMask::AXIS_ROT);
        assert!(!mask.has_axis(0));
        assert!(mask.has_axis(3));
        assert!(mask.has_axis(5));
        assert!(!mask.has_axis(6));
        assert!(mask.has_any_axis());
        assert_eq!(mask.legacy_buttons(), 0);
    }

    #[test]
    fn test_button_mask_uses_one_based_numbers() {
        assert_eq!(ButtonMask::button(1), 0x0000_0001);
        assert_eq!(ButtonMask::button(32), 0x8000_0000);
        assert_eq!(ButtonMask::button(0), 0);
        assert_eq!(ButtonMask::button(33), 0);
        assert!(ButtonMask(0x0000_0100).contains(9));
    }

    #[test]
    fn test_feature_switch_groups_match_single_bits() {
        let enable_all: u32 = (0..AXIS_COUNT).map(FeatureSwitches::enable_axis_bit).sum();
        let reverse_all: u32 = (0..AXIS_COUNT).map(FeatureSwitches::reverse_axis_bit).sum();
        assert_eq!(enable_all, FeatureSwitches::ENABLE_ALL);
        assert_eq!(reverse_all, FeatureSwitches::REVERSE_ALL);
        assert!(FeatureSwitches(FeatureSwitches::DISABLED).is_disabled());
    }

    #[test]
    fn test_feature_switches_from_prefs() {
        let mut prefs = DevicePrefs::default();
        prefs.dominant = true;
        prefs.enabled = [true, true, true, false, false, false];
        prefs.reversed = [false, false, false, false, false, true];

        let switches = FeatureSwitches::from_prefs(&prefs);

        assert_eq!(
            switches.0,
            FeatureSwitches::DOMINANT
                | FeatureSwitches::ENABLE_TRANS
                | FeatureSwitches::REVERSE_AXIS_6
        );
    }

    #[test]
    fn test_client_command_keeps_unknown_codes() {
        assert_eq!(ClientCommand::from(3), ClientCommand::HandleAxis);
        assert_eq!(ClientCommand::from(77), ClientCommand::Other(77));
        assert_eq!(u16::from(ClientCommand::Other(77)), 77);
        assert_eq!(u16::from(ClientCommand::AppSpecific), 10);
    }

    #[test]
    fn test_prefs_active_mapping_follows_zoom_direction() {
        let mut prefs = DevicePrefs::default();
        assert_eq!(prefs.active_mapping(), &prefs.map_v);
        prefs.zoom_on_y = true;
        assert_eq!(prefs.active_mapping(), &prefs.map_h);
    }

    #[test]
    fn test_prefs_apply_disables_and_reverses_axes() {
        let mut prefs = DevicePrefs::default();
        prefs.enabled[1] = false;
        prefs.reversed[2] = true;
        prefs.reversed[3] = true;

        let out = prefs.apply(AxisValues([10, 20, 30, i16::MIN, 50, 60]));

        assert_eq!(out, AxisValues([10, 0, -30, i16::MAX, 50, 60]));
    }

    #[test]
    fn test_prefs_gamma_and_scale_are_fixed_point() {
        let mut prefs = DevicePrefs::default();
        assert!(prefs.is_linear());
        prefs.gamma = 1_500;
        prefs.scale[0] = -25_000;
        assert!(!prefs.is_linear());
        assert!((prefs.gamma() - 1.5).abs() < f64::EPSILON);
        assert!((prefs.scale_of(0).unwrap() + 2.5).abs() < f64::EPSILON);
        assert_eq!(prefs.scale_of(6), None);
    }
}
