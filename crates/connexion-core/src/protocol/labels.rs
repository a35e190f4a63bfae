//! On-device button label encoding.
//!
//! Devices with a display show a short text per button.  The driver takes
//! all labels at once as 32 NUL-terminated UTF-8 strings laid end to end in
//! button order; an empty string reverts that button to its default label.

use crate::protocol::error::ProtocolError;

/// Number of label slots, one per button.
pub const LABEL_COUNT: usize = 32;

/// Encodes `labels` for the label-setting call.
///
/// Missing trailing labels are sent as empty strings.
///
/// # Errors
///
/// Returns [`ProtocolError::InvalidParameter`] if there are more than
/// [`LABEL_COUNT`] labels, a label contains NUL, or the encoded data does
/// not fit the driver's 16-bit size field.
pub fn encode_button_labels<S: AsRef<str>>(labels: &[S]) -> Result<Vec<u8>, ProtocolError> {
    if labels.len() > LABEL_COUNT {
        return Err(ProtocolError::InvalidParameter(format!(
            "at most {LABEL_COUNT} button labels, got {}",
            labels.len()
        )));
    }

    let mut buf = Vec::new();
    for (index, label) in labels.iter().enumerate() {
        let label = label.as_ref();
        if label.contains('\0') {
            return Err(ProtocolError::InvalidParameter(format!(
                "button label {} contains NUL",
                index + 1
            )));
        }
        buf.extend_from_slice(label.as_bytes());
        buf.push(0);
    }
    buf.resize(buf.len() + (LABEL_COUNT - labels.len()), 0);

    if buf.len() > usize::from(u16::MAX) {
        return Err(ProtocolError::InvalidParameter(format!(
            "button label data is {} bytes, limit is {}",
            buf.len(),
            u16::MAX
        )));
    }
    Ok(buf)
}

/// Splits label data back into exactly [`LABEL_COUNT`] strings.
///
/// # Errors
///
/// Returns [`ProtocolError::InvalidParameter`] if the data does not hold
/// exactly [`LABEL_COUNT`] NUL-terminated strings.
pub fn decode_button_labels(data: &[u8]) -> Result<Vec<String>, ProtocolError> {
    let Some(body) = data.strip_suffix(&[0]) else {
        return Err(ProtocolError::InvalidParameter(
            "button label data is not NUL-terminated".to_string(),
        ));
    };
    let labels: Vec<String> = body
        .split(|b| *b == 0)
        .map(|bytes| String::from_utf8_lossy(bytes).into_owned())
        .collect();
    if labels.len() != LABEL_COUNT {
        return Err(ProtocolError::InvalidParameter(format!(
            "expected {LABEL_COUNT} button labels, got {}",
            labels.len()
        )));
    }
    Ok(labels)
}
