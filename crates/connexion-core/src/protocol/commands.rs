//! Typed control commands and their parameter packing.
//!
//! The driver accepts control requests as a `(code, param)` pair of 32-bit
//! words and answers with one 32-bit result word.  Each command packs its
//! parameters differently; [`ControlCommand`] keeps that packing in one place
//! so callers never build a raw word by hand.
//!
//! ```text
//! TypeKeystroke   param = modifiers<<16 | keyCode<<8 | charCode
//! MoveMouse       param = deltaX<<16 | (deltaY & 0xFFFF)
//! ClickButton     param = buttonIndex<<16 | buttonState
//! RollWheel       param = modifiers<<16 | direction<<8 | amount
//! ReleaseModifiers param = modifiers<<16
//! DoMapping       param = mappingIndex<<16 | mappingState
//! ```

use serde::{Deserialize, Serialize};

use crate::protocol::error::ProtocolError;
use crate::protocol::messages::{four_cc, FeatureSwitches};

// ── Command codes ─────────────────────────────────────────────────────────────

pub const CTL_SET_LED_STATE: u32 = four_cc(b"3dsl");
pub const CTL_GET_DEVICE_ID: u32 = four_cc(b"3did");
pub const CTL_TYPE_KEYSTROKE: u32 = four_cc(b"3dke");
pub const CTL_MOVE_MOUSE: u32 = four_cc(b"3dmm");
pub const CTL_CLICK_BUTTON: u32 = four_cc(b"3dcb");
pub const CTL_ROLL_WHEEL: u32 = four_cc(b"3dro");
pub const CTL_RELEASE_MODIFIERS: u32 = four_cc(b"3dre");
pub const CTL_CALIBRATE: u32 = four_cc(b"3dca");
pub const CTL_UNCALIBRATE: u32 = four_cc(b"3dde");
pub const CTL_DO_MAPPING: u32 = four_cc(b"3ddm");
pub const CTL_OPEN_PREF_PANE: u32 = four_cc(b"3dop");
pub const CTL_SET_SWITCHES: u32 = four_cc(b"3dss");
pub const CTL_POPUP_MENU_RUNNING: u32 = four_cc(b"3dme");

// ── Keystroke ─────────────────────────────────────────────────────────────────

/// A keystroke to inject: modifier flags, virtual key code and character.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Keystroke {
    pub modifiers: u16,
    pub key_code: u8,
    pub char_code: u8,
}

impl Keystroke {
    /// Validates that each part fits its slot in the packed word.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::InvalidParameter`] if `modifiers` exceeds 16
    /// bits or either code exceeds 8 bits.
    pub fn new(modifiers: u32, key_code: u32, char_code: u32) -> Result<Self, ProtocolError> {
        let modifiers = u16::try_from(modifiers).map_err(|_| {
            ProtocolError::InvalidParameter(format!("keystroke modifiers 0x{modifiers:X} exceed 16 bits"))
        })?;
        let key_code = u8::try_from(key_code).map_err(|_| {
            ProtocolError::InvalidParameter(format!("key code {key_code} exceeds 8 bits"))
        })?;
        let char_code = u8::try_from(char_code).map_err(|_| {
            ProtocolError::InvalidParameter(format!("char code {char_code} exceeds 8 bits"))
        })?;
        Ok(Self {
            modifiers,
            key_code,
            char_code,
        })
    }

    pub fn pack(&self) -> u32 {
        (u32::from(self.modifiers) << 16) | (u32::from(self.key_code) << 8) | u32::from(self.char_code)
    }

    pub fn unpack(bits: u32) -> Self {
        Self {
            modifiers: (bits >> 16) as u16,
            key_code: (bits >> 8) as u8,
            char_code: bits as u8,
        }
    }
}

// ── Control command ───────────────────────────────────────────────────────────

/// One control request, with its parameters already typed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ControlCommand {
    /// Turn the device LED on (non-zero) or off.
    SetLedState(u8),
    /// Ask for the vendor and product ids of the current device.
    GetDeviceId,
    TypeKeystroke(Keystroke),
    MoveMouse { delta_x: i16, delta_y: i16 },
    ClickButton { button: u16, state: u16 },
    RollWheel { modifiers: u16, direction: u8, amount: u8 },
    ReleaseModifiers { modifiers: u16 },
    Calibrate,
    Uncalibrate,
    /// Execute the driver assignment at `index`.
    DoMapping { index: u16, state: u16 },
    OpenPrefPane,
    /// Replace the client-controlled feature switches; per-client only.
    SetSwitches(FeatureSwitches),
    /// Tell the driver a popup menu is open (or closed).
    PopupMenuRunning(bool),
}

impl ControlCommand {
    /// The four-character command code.
    pub fn code(&self) -> u32 {
        match self {
            ControlCommand::SetLedState(_) => CTL_SET_LED_STATE,
            ControlCommand::GetDeviceId => CTL_GET_DEVICE_ID,
            ControlCommand::TypeKeystroke(_) => CTL_TYPE_KEYSTROKE,
            ControlCommand::MoveMouse { .. } => CTL_MOVE_MOUSE,
            ControlCommand::ClickButton { .. } => CTL_CLICK_BUTTON,
            ControlCommand::RollWheel { .. } => CTL_ROLL_WHEEL,
            ControlCommand::ReleaseModifiers { .. } => CTL_RELEASE_MODIFIERS,
            ControlCommand::Calibrate => CTL_CALIBRATE,
            ControlCommand::Uncalibrate => CTL_UNCALIBRATE,
            ControlCommand::DoMapping { .. } => CTL_DO_MAPPING,
            ControlCommand::OpenPrefPane => CTL_OPEN_PREF_PANE,
            ControlCommand::SetSwitches(_) => CTL_SET_SWITCHES,
            ControlCommand::PopupMenuRunning(_) => CTL_POPUP_MENU_RUNNING,
        }
    }

    /// The packed parameter word sent with [`code`](Self::code).
    pub fn param(&self) -> i32 {
        let bits: u32 = match *self {
            ControlCommand::SetLedState(led) => u32::from(led),
            ControlCommand::TypeKeystroke(keystroke) => keystroke.pack(),
            ControlCommand::MoveMouse { delta_x, delta_y } => {
                (u32::from(delta_x as u16) << 16) | u32::from(delta_y as u16)
            }
            ControlCommand::ClickButton { button, state } => {
                (u32::from(button) << 16) | u32::from(state)
            }
            ControlCommand::RollWheel {
                modifiers,
                direction,
                amount,
            } => (u32::from(modifiers) << 16) | (u32::from(direction) << 8) | u32::from(amount),
            ControlCommand::ReleaseModifiers { modifiers } => u32::from(modifiers) << 16,
            ControlCommand::DoMapping { index, state } => (u32::from(index) << 16) | u32::from(state),
            ControlCommand::SetSwitches(switches) => switches.0,
            ControlCommand::PopupMenuRunning(running) => u32::from(running),
            ControlCommand::GetDeviceId
            | ControlCommand::Calibrate
            | ControlCommand::Uncalibrate
            | ControlCommand::OpenPrefPane => 0,
        };
        bits as i32
    }

    /// Returns `true` for commands only valid through a client session.
    pub fn requires_session(&self) -> bool {
        matches!(self, ControlCommand::SetSwitches(_))
    }

    /// Rebuilds a command from the words the driver receives.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::InvalidParameter`] for an unknown code.
    pub fn from_wire(code: u32, param: i32) -> Result<Self, ProtocolError> {
        let bits = param as u32;
        let high = (bits >> 16) as u16;
        let low = bits as u16;
        let command = match code {
            CTL_SET_LED_STATE => ControlCommand::SetLedState(bits as u8),
            CTL_GET_DEVICE_ID => ControlCommand::GetDeviceId,
            CTL_TYPE_KEYSTROKE => ControlCommand::TypeKeystroke(Keystroke::unpack(bits)),
            CTL_MOVE_MOUSE => ControlCommand::MoveMouse {
                delta_x: high as i16,
                delta_y: low as i16,
            },
            CTL_CLICK_BUTTON => ControlCommand::ClickButton {
                button: high,
                state: low,
            },
            CTL_ROLL_WHEEL => ControlCommand::RollWheel {
                modifiers: high,
                direction: (bits >> 8) as u8,
                amount: bits as u8,
            },
            CTL_RELEASE_MODIFIERS => ControlCommand::ReleaseModifiers { modifiers: high },
            CTL_CALIBRATE => ControlCommand::Calibrate,
            CTL_UNCALIBRATE => ControlCommand::Uncalibrate,
            CTL_DO_MAPPING => ControlCommand::DoMapping {
                index: high,
                state: low,
            },
            CTL_OPEN_PREF_PANE => ControlCommand::OpenPrefPane,
            CTL_SET_SWITCHES => ControlCommand::SetSwitches(FeatureSwitches(bits)),
            CTL_POPUP_MENU_RUNNING => ControlCommand::PopupMenuRunning(bits != 0),
            other => {
                return Err(ProtocolError::InvalidParameter(format!(
                    "unknown control code 0x{other:08X}"
                )))
            }
        };
        Ok(command)
    }
}

/// Vendor and product ids answered by [`ControlCommand::GetDeviceId`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DeviceIds {
    pub vendor: u16,
    pub product: u16,
}

impl DeviceIds {
    /// Splits the result word: vendor in the high half, product in the low.
    pub fn from_result(result: i32) -> Self {
        let bits = result as u32;
        Self {
            vendor: (bits >> 16) as u16,
            product: bits as u16,
        }
    }

    pub fn to_result(self) -> i32 {
        ((u32::from(self.vendor) << 16) | u32::from(self.product)) as i32
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_codes_are_four_cc() {
        assert_eq!(ControlCommand::SetLedState(1).code(), 0x3364_736C);
        assert_eq!(ControlCommand::Calibrate.code(), four_cc(b"3dca"));
    }

    #[test]
    fn test_led_state_param_is_the_led_value() {
        assert_eq!(ControlCommand::SetLedState(1).param(), 1);
        assert_eq!(ControlCommand::SetLedState(0).param(), 0);
    }

    #[test]
    fn test_keystroke_packing() {
        // Arrange
        let keystroke = Keystroke::new(0x0102, 0x2A, 0x61).unwrap();

        // Act
        let param = ControlCommand::TypeKeystroke(keystroke).param();

        // Assert
        assert_eq!(param as u32, 0x0102_2A61);
    }

    #[test]
    fn test_keystroke_rejects_oversized_fields() {
        assert!(matches!(
            Keystroke::new(0x1_0000, 0, 0),
            Err(ProtocolError::InvalidParameter(_))
        ));
        assert!(Keystroke::new(0, 256, 0).is_err());
        assert!(Keystroke::new(0, 0, 300).is_err());
    }

    #[test]
    fn test_move_mouse_keeps_negative_deltas() {
        let command = ControlCommand::MoveMouse {
            delta_x: -1,
            delta_y: -2,
        };
        assert_eq!(command.param() as u32, 0xFFFF_FFFE);
        assert_eq!(
            ControlCommand::from_wire(command.code(), command.param()).unwrap(),
            command
        );
    }

    #[test]
    fn test_roll_wheel_and_release_modifiers_packing() {
        let roll = ControlCommand::RollWheel {
            modifiers: 0x0008,
            direction: 1,
            amount: 3,
        };
        assert_eq!(roll.param() as u32, 0x0008_0103);
        let release = ControlCommand::ReleaseModifiers { modifiers: 0x00FF };
        assert_eq!(release.param() as u32, 0x00FF_0000);
    }

    #[test]
    fn test_set_switches_carries_disabled_bit() {
        let command = ControlCommand::SetSwitches(FeatureSwitches(FeatureSwitches::DISABLED));
        assert_eq!(command.param(), i32::MIN);
        assert!(command.requires_session());
        assert!(!ControlCommand::Calibrate.requires_session());
    }

    #[test]
    fn test_from_wire_recovers_every_command() {
        let commands = [
            ControlCommand::SetLedState(1),
            ControlCommand::GetDeviceId,
            ControlCommand::TypeKeystroke(Keystroke::unpack(0x0001_0203)),
            ControlCommand::ClickButton { button: 2, state: 1 },
            ControlCommand::Uncalibrate,
            ControlCommand::DoMapping { index: 7, state: 0 },
            ControlCommand::OpenPrefPane,
            ControlCommand::PopupMenuRunning(true),
        ];
        for command in commands {
            assert_eq!(
                ControlCommand::from_wire(command.code(), command.param()).unwrap(),
                command
            );
        }
    }

    #[test]
    fn test_from_wire_rejects_unknown_code() {
        assert!(matches!(
            ControlCommand::from_wire(four_cc(b"zzzz"), 0),
            Err(ProtocolError::InvalidParameter(_))
        ));
    }

    #[test]
    fn test_device_ids_split_result_word() {
        let ids = DeviceIds::from_result(0x046D_C62B);
        assert_eq!(ids.vendor, 0x046D);
        assert_eq!(ids.product, 0xC62B);
        assert_eq!(ids.to_result(), 0x046D_C62B);
    }
}
