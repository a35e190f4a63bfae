//! Binary codec for the driver's fixed-layout records.
//!
//! Device-state record (48 bytes, little-endian, 2-byte packing):
//! ```text
//! [version:2][client:2][command:2][param:2][value:4][time:8][report:8]
//! [buttons8:2][axis:6×2][address:2][buttons:4]
//! ```
//!
//! Device-prefs record (152 bytes):
//! ```text
//! [type:2][version:2][deviceID:2][reserved1:2][appSignature:4][reserved2:4]
//! [appName:64][mainSpeed:1][zoomOnY:1][dominant:1][reserved3:1]
//! [mapV:6][mapH:6][enabled:6][reversed:6][speed:6][sensitivity:6]
//! [scale:6×4][gamma:4][intersect:4]
//! ```
//!
//! Decoding always checks the exact record size before touching a single
//! field, so a short or long payload can never cause an out-of-bounds read.
//! Reserved fields are written as zero and ignored on decode.

use tracing::warn;

use crate::domain::axes::{AxisValues, AXIS_COUNT};
use crate::protocol::error::ProtocolError;
use crate::protocol::messages::{
    DevicePrefs, DeviceState, Event, MessageType, Signature, APP_NAME_FIELD_SIZE,
    DEVICE_PREFS_SIZE, DEVICE_PREFS_TYPE, DEVICE_PREFS_VERSION, DEVICE_STATE_SIZE,
    DEVICE_STATE_VERSION, MAX_AXIS_LEVEL, MAX_NAME_LEN, RAW_REPORT_SIZE,
};

/// Size of the prefs-changed payload: one application signature.
pub const PREFS_CHANGED_SIZE: usize = 4;

// ── Public API ────────────────────────────────────────────────────────────────

/// Decodes one inbound driver message into a typed [`Event`].
///
/// Coordination messages meant for the driver's own helper, and codes this
/// crate does not know, come back as [`Event::Ignored`] rather than an error.
///
/// # Errors
///
/// - [`ProtocolError::MalformedPayload`] if a record has the wrong size.
/// - [`ProtocolError::UnsupportedVersion`] if a state record carries a
///   version tag other than [`DEVICE_STATE_VERSION`], even when its size
///   happens to match.
///
/// # Examples
///
/// ```rust
/// use connexion_core::protocol::{decode_message, encode_device_state};
/// use connexion_core::protocol::messages::{DeviceState, Event, MessageType};
///
/// let state = DeviceState::new(7);
/// let bytes = encode_device_state(&state);
/// let event = decode_message(MessageType::DeviceState, &bytes).unwrap();
/// assert_eq!(event, Event::DeviceState(state));
/// ```
pub fn decode_message(message_type: MessageType, payload: &[u8]) -> Result<Event, ProtocolError> {
    match message_type {
        MessageType::DeviceState => decode_device_state(payload).map(Event::DeviceState),
        MessageType::CalibrateDevice => decode_device_state(payload).map(Event::Calibration),
        MessageType::PrefsChanged => {
            require_exact_len(payload, PREFS_CHANGED_SIZE)?;
            Ok(Event::PrefsChanged(Signature(read_u32(payload, 0))))
        }
        other => Ok(Event::Ignored(other)),
    }
}

/// Decodes a message identified by its raw four-character code.
///
/// # Errors
///
/// See [`decode_message`].
pub fn decode_raw_message(code: u32, payload: &[u8]) -> Result<Event, ProtocolError> {
    decode_message(MessageType::from(code), payload)
}

/// Encodes a device-state record into exactly [`DEVICE_STATE_SIZE`] bytes.
pub fn encode_device_state(state: &DeviceState) -> Vec<u8> {
    let mut buf = Vec::with_capacity(DEVICE_STATE_SIZE);

    // header
    buf.extend_from_slice(&state.version.to_le_bytes());
    buf.extend_from_slice(&state.target_client.to_le_bytes());
    // command
    buf.extend_from_slice(&state.command.to_le_bytes());
    buf.extend_from_slice(&state.param.to_le_bytes());
    buf.extend_from_slice(&state.value.to_le_bytes());
    buf.extend_from_slice(&state.timestamp.to_le_bytes());
    // raw report
    buf.extend_from_slice(&state.raw_report);
    // processed data
    buf.extend_from_slice(&state.legacy_buttons.to_le_bytes());
    for value in state.axis.0 {
        buf.extend_from_slice(&value.to_le_bytes());
    }
    buf.extend_from_slice(&state.device_address.to_le_bytes());
    buf.extend_from_slice(&state.buttons.to_le_bytes());

    debug_assert_eq!(buf.len(), DEVICE_STATE_SIZE);
    buf
}

/// Decodes a device-state record.
///
/// # Errors
///
/// Returns [`ProtocolError::MalformedPayload`] unless `p` is exactly
/// [`DEVICE_STATE_SIZE`] bytes, and [`ProtocolError::UnsupportedVersion`]
/// unless the version tag is [`DEVICE_STATE_VERSION`].
pub fn decode_device_state(p: &[u8]) -> Result<DeviceState, ProtocolError> {
    require_exact_len(p, DEVICE_STATE_SIZE)?;

    let version = read_u16(p, 0);
    if version != DEVICE_STATE_VERSION {
        return Err(ProtocolError::UnsupportedVersion {
            found: version,
            expected: DEVICE_STATE_VERSION,
        });
    }

    let mut raw_report = [0u8; RAW_REPORT_SIZE];
    raw_report.copy_from_slice(&p[20..28]);

    let mut axis = [0i16; AXIS_COUNT];
    for (index, value) in axis.iter_mut().enumerate() {
        *value = read_i16(p, 30 + index * 2);
    }

    Ok(DeviceState {
        version,
        target_client: read_u16(p, 2),
        command: read_u16(p, 4),
        param: read_i16(p, 6),
        value: read_i32(p, 8),
        timestamp: read_u64(p, 12),
        raw_report,
        legacy_buttons: read_u16(p, 28),
        axis: AxisValues(axis),
        device_address: read_u16(p, 42),
        buttons: read_u32(p, 44),
    })
}

/// Encodes a device-prefs record into exactly [`DEVICE_PREFS_SIZE`] bytes.
///
/// The type and version tags are always the current ones and every reserved
/// field is written as zero.
///
/// # Errors
///
/// Returns [`ProtocolError::InvalidParameter`] if a per-axis speed or
/// sensitivity lies in the reserved range above [`MAX_AXIS_LEVEL`].
pub fn encode_device_prefs(prefs: &DevicePrefs) -> Result<Vec<u8>, ProtocolError> {
    check_levels("speed", &prefs.speed)?;
    check_levels("sensitivity", &prefs.sensitivity)?;

    let mut buf = Vec::with_capacity(DEVICE_PREFS_SIZE);

    // header
    buf.extend_from_slice(&DEVICE_PREFS_TYPE.to_le_bytes());
    buf.extend_from_slice(&DEVICE_PREFS_VERSION.to_le_bytes());
    buf.extend_from_slice(&prefs.device_id.to_le_bytes());
    buf.extend_from_slice(&0u16.to_le_bytes()); // reserved1
    // target application
    buf.extend_from_slice(&prefs.app_signature.0.to_le_bytes());
    buf.extend_from_slice(&0u32.to_le_bytes()); // reserved2
    let mut name_field = encode_pascal_name(&prefs.app_name);
    name_field.resize(APP_NAME_FIELD_SIZE, 0);
    buf.extend_from_slice(&name_field);
    // device preferences
    buf.push(prefs.main_speed);
    buf.push(u8::from(prefs.zoom_on_y));
    buf.push(u8::from(prefs.dominant));
    buf.push(0); // reserved3
    buf.extend(prefs.map_v.iter().map(|v| *v as u8));
    buf.extend(prefs.map_h.iter().map(|v| *v as u8));
    buf.extend(prefs.enabled.iter().map(|v| u8::from(*v)));
    buf.extend(prefs.reversed.iter().map(|v| u8::from(*v)));
    buf.extend_from_slice(&prefs.speed);
    buf.extend_from_slice(&prefs.sensitivity);
    for scale in prefs.scale {
        buf.extend_from_slice(&scale.to_le_bytes());
    }
    buf.extend_from_slice(&prefs.gamma.to_le_bytes());
    buf.extend_from_slice(&prefs.intersect.to_le_bytes());

    debug_assert_eq!(buf.len(), DEVICE_PREFS_SIZE);
    Ok(buf)
}

/// Decodes a device-prefs record.
///
/// # Errors
///
/// - [`ProtocolError::MalformedPayload`] unless `p` is exactly
///   [`DEVICE_PREFS_SIZE`] bytes.
/// - [`ProtocolError::UnknownRecordType`] if the type tag is not
///   [`DEVICE_PREFS_TYPE`].
/// - [`ProtocolError::UnsupportedVersion`] if the version tag is not
///   [`DEVICE_PREFS_VERSION`].
pub fn decode_device_prefs(p: &[u8]) -> Result<DevicePrefs, ProtocolError> {
    require_exact_len(p, DEVICE_PREFS_SIZE)?;

    let record_type = read_u16(p, 0);
    if record_type != DEVICE_PREFS_TYPE {
        return Err(ProtocolError::UnknownRecordType {
            found: record_type,
            expected: DEVICE_PREFS_TYPE,
        });
    }
    let version = read_u16(p, 2);
    if version != DEVICE_PREFS_VERSION {
        return Err(ProtocolError::UnsupportedVersion {
            found: version,
            expected: DEVICE_PREFS_VERSION,
        });
    }

    let mut scale = [0i32; AXIS_COUNT];
    for (index, value) in scale.iter_mut().enumerate() {
        *value = read_i32(p, 120 + index * 4);
    }

    Ok(DevicePrefs {
        device_id: read_u16(p, 4),
        app_signature: Signature(read_u32(p, 8)),
        app_name: decode_pascal_name(&p[16..16 + APP_NAME_FIELD_SIZE]),
        main_speed: p[80],
        zoom_on_y: p[81] != 0,
        dominant: p[82] != 0,
        map_v: read_i8_array(p, 84),
        map_h: read_i8_array(p, 90),
        enabled: read_flag_array(p, 96),
        reversed: read_flag_array(p, 102),
        speed: read_u8_array(p, 108),
        sensitivity: read_u8_array(p, 114),
        scale,
        gamma: read_u32(p, 144),
        intersect: read_u32(p, 148),
    })
}

/// Encodes a prefs-changed notification payload.
pub fn encode_prefs_changed(signature: Signature) -> Vec<u8> {
    signature.0.to_le_bytes().to_vec()
}

// ── Pascal strings ────────────────────────────────────────────────────────────

/// Shortens `name` to at most [`MAX_NAME_LEN`] bytes on a character boundary.
pub fn truncate_name(name: &str) -> &str {
    if name.len() <= MAX_NAME_LEN {
        return name;
    }
    let mut end = MAX_NAME_LEN;
    while !name.is_char_boundary(end) {
        end -= 1;
    }
    &name[..end]
}

/// Writes `name` as a Pascal string: one length byte, then the bytes.
///
/// Names longer than [`MAX_NAME_LEN`] bytes are truncated.
pub fn encode_pascal_name(name: &str) -> Vec<u8> {
    let name = truncate_name(name);
    let mut buf = Vec::with_capacity(name.len() + 1);
    buf.push(name.len() as u8);
    buf.extend_from_slice(name.as_bytes());
    buf
}

/// Reads a Pascal string from a fixed-size field.
///
/// A length byte larger than the field is clamped; invalid UTF-8 is replaced.
pub fn decode_pascal_name(field: &[u8]) -> String {
    let Some((&len, bytes)) = field.split_first() else {
        return String::new();
    };
    let mut len = len as usize;
    if len > bytes.len() {
        warn!(declared = len, available = bytes.len(), "clamping oversized name length");
        len = bytes.len();
    }
    String::from_utf8_lossy(&bytes[..len]).into_owned()
}

// ── Utility helpers ───────────────────────────────────────────────────────────

fn require_exact_len(buf: &[u8], expected: usize) -> Result<(), ProtocolError> {
    if buf.len() == expected {
        Ok(())
    } else {
        Err(ProtocolError::MalformedPayload {
            expected,
            actual: buf.len(),
        })
    }
}

fn check_levels(field: &str, levels: &[u8; AXIS_COUNT]) -> Result<(), ProtocolError> {
    match levels.iter().position(|level| *level > MAX_AXIS_LEVEL) {
        Some(index) => Err(ProtocolError::InvalidParameter(format!(
            "{field}[{index}] = {} is in the reserved range",
            levels[index]
        ))),
        None => Ok(()),
    }
}

// The readers below are only called after `require_exact_len`, so every
// offset is in bounds.

fn read_u16(p: &[u8], off: usize) -> u16 {
    u16::from_le_bytes([p[off], p[off + 1]])
}

fn read_i16(p: &[u8], off: usize) -> i16 {
    i16::from_le_bytes([p[off], p[off + 1]])
}

fn read_u32(p: &[u8], off: usize) -> u32 {
    u32::from_le_bytes([p[off], p[off + 1], p[off + 2], p[off + 3]])
}

fn read_i32(p: &[u8], off: usize) -> i32 {
    i32::from_le_bytes([p[off], p[off + 1], p[off + 2], p[off + 3]])
}

fn read_u64(p: &[u8], off: usize) -> u64 {
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&p[off..off + 8]);
    u64::from_le_bytes(bytes)
}

fn read_u8_array(p: &[u8], off: usize) -> [u8; AXIS_COUNT] {
    let mut out = [0u8; AXIS_COUNT];
    out.copy_from_slice(&p[off..off + AXIS_COUNT]);
    out
}

fn read_i8_array(p: &[u8], off: usize) -> [i8; AXIS_COUNT] {
    read_u8_array(p, off).map(|b| b as i8)
}

fn read_flag_array(p: &[u8], off: usize) -> [bool; AXIS_COUNT] {
    read_u8_array(p, off).map(|b| b != 0)
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::messages::{device_id, MessageType, DEVICE_STATE_VERSION};

    fn sample_state() -> DeviceState {
        DeviceState {
            version: DEVICE_STATE_VERSION,
            target_client: 0x0102,
            command: 3,
            param: -2,
            value: -70_000,
            timestamp: 0x0011_2233_4455_6677,
            raw_report: [1, 2, 3, 4, 5, 6, 7, 8],
            legacy_buttons: 0x0081,
            axis: AxisValues([100, -200, 300, -400, 500, -350]),
            device_address: 0x00FA,
            buttons: 0x8000_0081,
        }
    }

    fn sample_prefs() -> DevicePrefs {
        DevicePrefs {
            device_id: device_id::SPACE_MOUSE_PRO,
            app_signature: Signature::from_four_cc(b"CxMn"),
            app_name: "Connexion Monitor".to_string(),
            main_speed: 120,
            zoom_on_y: true,
            dominant: false,
            map_v: [0, 1, 2, 3, 4, 5],
            map_h: [0, 2, -1, 3, 5, -4],
            enabled: [true, true, false, true, true, true],
            reversed: [false, true, false, false, false, true],
            speed: [100, 110, 120, 130, 140, 200],
            sensitivity: [0, 50, 100, 150, 200, 10],
            scale: [10_000, -10_000, 25_000, 1, -1, 0],
            gamma: 1_250,
            intersect: 400,
        }
    }

    // ── Device state ─────────────────────────────────────────────────────────

    #[test]
    fn test_device_state_round_trip() {
        let state = sample_state();
        let bytes = encode_device_state(&state);
        assert_eq!(decode_device_state(&bytes).unwrap(), state);
    }

    #[test]
    fn test_device_state_is_48_bytes() {
        assert_eq!(encode_device_state(&DeviceState::new(1)).len(), DEVICE_STATE_SIZE);
        assert_eq!(DEVICE_STATE_SIZE, 48);
    }

    #[test]
    fn test_device_state_field_offsets_match_packed_layout() {
        let bytes = encode_device_state(&sample_state());

        assert_eq!(&bytes[0..2], &DEVICE_STATE_VERSION.to_le_bytes());
        assert_eq!(&bytes[2..4], &0x0102u16.to_le_bytes());
        assert_eq!(&bytes[12..20], &0x0011_2233_4455_6677u64.to_le_bytes());
        assert_eq!(&bytes[20..28], &[1, 2, 3, 4, 5, 6, 7, 8]);
        assert_eq!(&bytes[28..30], &0x0081u16.to_le_bytes());
        assert_eq!(&bytes[30..32], &100i16.to_le_bytes());
        assert_eq!(&bytes[40..42], &(-350i16).to_le_bytes());
        assert_eq!(&bytes[42..44], &0x00FAu16.to_le_bytes());
        assert_eq!(&bytes[44..48], &0x8000_0081u32.to_le_bytes());
    }

    #[test]
    fn test_decode_device_state_rejects_short_payload() {
        let bytes = encode_device_state(&sample_state());
        let result = decode_device_state(&bytes[..47]);
        assert_eq!(
            result,
            Err(ProtocolError::MalformedPayload {
                expected: 48,
                actual: 47
            })
        );
    }

    #[test]
    fn test_decode_device_state_rejects_long_payload() {
        let mut bytes = encode_device_state(&sample_state());
        bytes.push(0);
        assert!(matches!(
            decode_device_state(&bytes),
            Err(ProtocolError::MalformedPayload { actual: 49, .. })
        ));
    }

    #[test]
    fn test_decode_device_state_rejects_empty_payload() {
        assert!(matches!(
            decode_device_state(&[]),
            Err(ProtocolError::MalformedPayload { actual: 0, .. })
        ));
    }

    #[test]
    fn test_decode_device_state_rejects_same_size_other_version() {
        // Version 2 ('m2') records are the same size but must not be reinterpreted.
        let mut state = sample_state();
        state.version = 0x6D32;
        let bytes = encode_device_state(&state);

        assert_eq!(bytes.len(), DEVICE_STATE_SIZE);
        assert_eq!(
            decode_device_state(&bytes),
            Err(ProtocolError::UnsupportedVersion {
                found: 0x6D32,
                expected: DEVICE_STATE_VERSION
            })
        );
    }

    // ── Device prefs ─────────────────────────────────────────────────────────

    #[test]
    fn test_device_prefs_round_trip() {
        let prefs = sample_prefs();
        let bytes = encode_device_prefs(&prefs).unwrap();
        assert_eq!(bytes.len(), DEVICE_PREFS_SIZE);
        assert_eq!(decode_device_prefs(&bytes).unwrap(), prefs);
    }

    #[test]
    fn test_device_prefs_reserved_fields_are_zero() {
        let bytes = encode_device_prefs(&sample_prefs()).unwrap();
        assert_eq!(&bytes[6..8], &[0, 0]);
        assert_eq!(&bytes[12..16], &[0, 0, 0, 0]);
        assert_eq!(bytes[83], 0);
    }

    #[test]
    fn test_device_prefs_header_tags() {
        let bytes = encode_device_prefs(&sample_prefs()).unwrap();
        assert_eq!(&bytes[0..2], &DEVICE_PREFS_TYPE.to_le_bytes());
        assert_eq!(&bytes[2..4], &DEVICE_PREFS_VERSION.to_le_bytes());
        assert_eq!(&bytes[144..148], &1_250u32.to_le_bytes());
        assert_eq!(&bytes[148..152], &400u32.to_le_bytes());
    }

    #[test]
    fn test_device_prefs_name_is_pascal_string() {
        let bytes = encode_device_prefs(&sample_prefs()).unwrap();
        assert_eq!(bytes[16], 17);
        assert_eq!(&bytes[17..34], b"Connexion Monitor");
        assert!(bytes[34..80].iter().all(|b| *b == 0));
    }

    #[test]
    fn test_encode_device_prefs_rejects_reserved_speed() {
        let mut prefs = sample_prefs();
        prefs.speed[4] = 201;
        assert!(matches!(
            encode_device_prefs(&prefs),
            Err(ProtocolError::InvalidParameter(_))
        ));
    }

    #[test]
    fn test_encode_device_prefs_rejects_reserved_sensitivity() {
        let mut prefs = sample_prefs();
        prefs.sensitivity[0] = 255;
        assert!(encode_device_prefs(&prefs).is_err());
    }

    #[test]
    fn test_decode_device_prefs_rejects_wrong_type_tag() {
        let mut bytes = encode_device_prefs(&sample_prefs()).unwrap();
        bytes[0..2].copy_from_slice(&0x4D53u16.to_le_bytes());
        assert_eq!(
            decode_device_prefs(&bytes),
            Err(ProtocolError::UnknownRecordType {
                found: 0x4D53,
                expected: DEVICE_PREFS_TYPE
            })
        );
    }

    #[test]
    fn test_decode_device_prefs_rejects_wrong_version() {
        let mut bytes = encode_device_prefs(&sample_prefs()).unwrap();
        bytes[2..4].copy_from_slice(&0x7032u16.to_le_bytes());
        assert!(matches!(
            decode_device_prefs(&bytes),
            Err(ProtocolError::UnsupportedVersion { found: 0x7032, .. })
        ));
    }

    #[test]
    fn test_decode_device_prefs_rejects_wrong_length() {
        let bytes = encode_device_prefs(&sample_prefs()).unwrap();
        assert!(matches!(
            decode_device_prefs(&bytes[..100]),
            Err(ProtocolError::MalformedPayload {
                expected: 152,
                actual: 100
            })
        ));
    }

    #[test]
    fn test_decode_device_prefs_clamps_oversized_name_length() {
        let mut bytes = encode_device_prefs(&sample_prefs()).unwrap();
        bytes[16] = 0xFF;
        let prefs = decode_device_prefs(&bytes).unwrap();
        assert_eq!(prefs.app_name.len(), MAX_NAME_LEN);
        assert!(prefs.app_name.starts_with("Connexion Monitor"));
    }

    // ── Pascal names ─────────────────────────────────────────────────────────

    #[test]
    fn test_long_name_is_truncated_to_63_bytes() {
        let name = "x".repeat(100);
        let encoded = encode_pascal_name(&name);
        assert_eq!(encoded[0] as usize, MAX_NAME_LEN);
        assert_eq!(encoded.len(), MAX_NAME_LEN + 1);
    }

    #[test]
    fn test_truncation_respects_char_boundaries() {
        // 31 two-byte characters = 62 bytes, then a 3-byte one crossing 63.
        let name = format!("{}€", "é".repeat(31));
        let truncated = truncate_name(&name);
        assert_eq!(truncated.len(), 62);
        assert!(truncated.chars().all(|c| c == 'é'));
    }

    #[test]
    fn test_empty_name_encodes_as_single_zero_byte() {
        assert_eq!(encode_pascal_name(""), vec![0]);
        assert_eq!(decode_pascal_name(&[0; 64]), "");
        assert_eq!(decode_pascal_name(&[]), "");
    }

    // ── Message decoding ─────────────────────────────────────────────────────

    #[test]
    fn test_decode_message_device_state() {
        let state = sample_state();
        let event = decode_message(MessageType::DeviceState, &encode_device_state(&state));
        assert_eq!(event, Ok(Event::DeviceState(state)));
    }

    #[test]
    fn test_decode_message_calibration_uses_state_layout() {
        let state = sample_state();
        let event = decode_raw_message(MessageType::CALIBRATE_DEVICE, &encode_device_state(&state));
        assert_eq!(event, Ok(Event::Calibration(state)));
    }

    #[test]
    fn test_decode_message_prefs_changed() {
        let sig = Signature::from_four_cc(b"CxMn");
        let event = decode_message(MessageType::PrefsChanged, &encode_prefs_changed(sig));
        assert_eq!(event, Ok(Event::PrefsChanged(sig)));
    }

    #[test]
    fn test_decode_message_prefs_changed_requires_four_bytes() {
        assert_eq!(
            decode_message(MessageType::PrefsChanged, &[1, 2, 3]),
            Err(ProtocolError::MalformedPayload {
                expected: 4,
                actual: 3
            })
        );
    }

    #[test]
    fn test_decode_message_internal_types_are_ignored() {
        for code in [
            MessageType::DO_MAPPING,
            MessageType::DO_MAPPING_DOWN,
            MessageType::DO_MAPPING_UP,
            MessageType::DO_LONG_PRESS,
            MessageType::BATTERY_STATUS,
        ] {
            let event = decode_raw_message(code, &[0xAA; 5]).unwrap();
            assert_eq!(event, Event::Ignored(MessageType::from(code)));
        }
    }

    #[test]
    fn test_decode_message_unknown_code_is_ignored() {
        let event = decode_raw_message(0xDEAD_BEEF, &[]).unwrap();
        assert_eq!(event, Event::Ignored(MessageType::Unknown(0xDEAD_BEEF)));
    }
}
