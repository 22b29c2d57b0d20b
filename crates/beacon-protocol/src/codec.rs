//! Codec for encoding and decoding Beacon events.
//!
//! Events travel as JSON text frames. Malformed payloads surface as
//! `ProtocolError` so the boundary can log and drop them instead of
//! touching optional fields ad hoc.

use thiserror::Error;

use crate::events::{ClientEvent, ServerEvent};

/// Maximum inbound event size (64 KiB).
pub const MAX_EVENT_SIZE: usize = 64 * 1024;

/// Protocol errors that can occur during encoding/decoding.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// Event exceeds maximum size.
    #[error("Event size {0} exceeds maximum {MAX_EVENT_SIZE}")]
    EventTooLarge(usize),

    /// JSON encoding/decoding error.
    #[error("Malformed event: {0}")]
    Malformed(#[from] serde_json::Error),
}

/// Decode an inbound event from a text frame.
///
/// # Errors
///
/// Returns an error if the frame is oversized or not a valid tagged event.
pub fn decode(text: &str) -> Result<ClientEvent, ProtocolError> {
    if text.len() > MAX_EVENT_SIZE {
        return Err(ProtocolError::EventTooLarge(text.len()));
    }
    Ok(serde_json::from_str(text)?)
}

/// Encode an outbound event to a text frame.
///
/// # Errors
///
/// Returns an error if serialization fails.
pub fn encode(event: &ServerEvent) -> Result<String, ProtocolError> {
    Ok(serde_json::to_string(event)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::PresenceStatus;

    #[test]
    fn test_decode_join() {
        let event = decode(r#"{"event":"join","data":{"userId":"u1"}}"#).unwrap();
        assert_eq!(
            event,
            ClientEvent::Join {
                user_id: "u1".into()
            }
        );
    }

    #[test]
    fn test_decode_room_join() {
        let event =
            decode(r#"{"event":"joinInstitutionRoom","data":{"institutionId":"inst-1"}}"#).unwrap();
        assert_eq!(
            event,
            ClientEvent::JoinInstitutionRoom {
                institution_id: "inst-1".into()
            }
        );
    }

    #[test]
    fn test_decode_rejects_garbage() {
        assert!(decode("not json").is_err());
        assert!(decode(r#"{"event":"noSuchEvent","data":{}}"#).is_err());
    }

    #[test]
    fn test_decode_rejects_oversized() {
        let padding = "x".repeat(MAX_EVENT_SIZE + 1);
        assert!(matches!(
            decode(&padding),
            Err(ProtocolError::EventTooLarge(_))
        ));
    }

    #[test]
    fn test_encode_decode_presence() {
        let text = encode(&ServerEvent::PresenceUpdate {
            user_id: "u1".into(),
            status: PresenceStatus::Offline,
        })
        .unwrap();

        let value: serde_json::Value = serde_json::from_str(&text).unwrap();
        assert_eq!(value["event"], "presenceUpdate");
        assert_eq!(value["data"]["status"], "offline");
    }
}
