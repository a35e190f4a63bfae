//! Wire protocol spoken with the driver: record types, codec, commands.

pub mod codec;
pub mod commands;
pub mod error;
pub mod labels;
pub mod messages;

pub use codec::{
    decode_device_prefs, decode_device_state, decode_message, decode_raw_message,
    encode_device_prefs, encode_device_state, encode_pascal_name, encode_prefs_changed,
};
pub use commands::{ControlCommand, DeviceIds, Keystroke};
pub use error::ProtocolError;
pub use labels::{decode_button_labels, encode_button_labels, LABEL_COUNT};
pub use messages::*;
