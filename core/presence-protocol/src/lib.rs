//! Wire types and frame codec for the Discord local IPC presence service.
//!
//! Shared by the relay and by the fake IPC servers in tests so the envelope
//! and payload schemas cannot drift apart.
//!
//! ## Envelope
//!
//! ```text
//! +----------------+----------------+---------------------------+
//! | opcode u32 LE  | length u32 LE  | length bytes of UTF-8 JSON |
//! +----------------+----------------+---------------------------+
//! ```
//!
//! Correlation is positional: one request frame, then exactly one response
//! frame. Nothing here buffers across frames.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::io::{self, Read, Write};

pub const HANDSHAKE_VERSION: u32 = 1;
/// Exclusive upper bound for a frame payload length.
pub const MAX_FRAME_BYTES: usize = 64 * 1024;
pub const HEADER_BYTES: usize = 8;
pub const ERROR_EVENT: &str = "ERROR";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum Opcode {
    Handshake = 0,
    Frame = 1,
    Close = 2,
    Ping = 3,
    Pong = 4,
}

impl Opcode {
    pub fn as_u32(self) -> u32 {
        self as u32
    }
}

impl TryFrom<u32> for Opcode {
    type Error = FrameError;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Opcode::Handshake),
            1 => Ok(Opcode::Frame),
            2 => Ok(Opcode::Close),
            3 => Ok(Opcode::Ping),
            4 => Ok(Opcode::Pong),
            other => Err(FrameError::UnknownOpcode(other)),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    #[error("frame length {0} outside (0, {max})", max = MAX_FRAME_BYTES)]
    InvalidLength(usize),

    #[error("unknown opcode {0}")]
    UnknownOpcode(u32),

    #[error("connection closed mid-frame")]
    Truncated,

    #[error("timed out waiting for frame")]
    TimedOut,

    #[error("frame I/O failed: {0}")]
    Io(#[source] io::Error),

    #[error("frame payload is not valid JSON: {0}")]
    Json(#[source] serde_json::Error),
}

impl From<io::Error> for FrameError {
    fn from(err: io::Error) -> Self {
        match err.kind() {
            io::ErrorKind::UnexpectedEof => FrameError::Truncated,
            io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut => FrameError::TimedOut,
            _ => FrameError::Io(err),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub opcode: Opcode,
    pub payload: Vec<u8>,
}

impl Frame {
    pub fn new(opcode: Opcode, payload: Vec<u8>) -> Self {
        Self { opcode, payload }
    }

    pub fn json<T: Serialize>(opcode: Opcode, value: &T) -> Result<Self, FrameError> {
        let payload = serde_json::to_vec(value).map_err(FrameError::Json)?;
        Ok(Self::new(opcode, payload))
    }

    pub fn parse_json<T: DeserializeOwned>(&self) -> Result<T, FrameError> {
        serde_json::from_slice(&self.payload).map_err(FrameError::Json)
    }

    pub fn len(&self) -> usize {
        self.payload.len()
    }

    pub fn is_empty(&self) -> bool {
        self.payload.is_empty()
    }
}

fn check_length(length: usize) -> Result<(), FrameError> {
    if length == 0 || length >= MAX_FRAME_BYTES {
        return Err(FrameError::InvalidLength(length));
    }
    Ok(())
}

/// Builds the full envelope for one frame.
pub fn encode_frame(opcode: Opcode, payload: &[u8]) -> Result<Vec<u8>, FrameError> {
    check_length(payload.len())?;
    let mut buffer = Vec::with_capacity(HEADER_BYTES + payload.len());
    buffer.extend_from_slice(&opcode.as_u32().to_le_bytes());
    buffer.extend_from_slice(&(payload.len() as u32).to_le_bytes());
    buffer.extend_from_slice(payload);
    Ok(buffer)
}

/// Writes one frame with a single `write_all`. A short write is an error.
pub fn write_frame<W: Write>(writer: &mut W, frame: &Frame) -> Result<(), FrameError> {
    let bytes = encode_frame(frame.opcode, &frame.payload)?;
    writer.write_all(&bytes)?;
    writer.flush()?;
    Ok(())
}

/// Reads exactly one frame.
///
/// The header is validated before any payload byte is read, so a rejected
/// length leaves the payload untouched in the underlying stream.
pub fn read_frame<R: Read>(reader: &mut R) -> Result<Frame, FrameError> {
    let mut header = [0u8; HEADER_BYTES];
    reader.read_exact(&mut header)?;

    let raw_opcode = u32::from_le_bytes([header[0], header[1], header[2], header[3]]);
    let length = u32::from_le_bytes([header[4], header[5], header[6], header[7]]) as usize;

    check_length(length)?;
    let opcode = Opcode::try_from(raw_opcode)?;

    let mut payload = vec![0u8; length];
    reader.read_exact(&mut payload)?;
    Ok(Frame { opcode, payload })
}

// ═══════════════════════════════════════════════════════════════════════════════
// Payloads
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Handshake {
    pub v: u32,
    pub client_id: String,
}

impl Handshake {
    pub fn new(client_id: impl Into<String>) -> Self {
        Self {
            v: HANDSHAKE_VERSION,
            client_id: client_id.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Command {
    SetActivity,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PresenceMessage {
    pub cmd: Command,
    pub nonce: String,
    pub args: SetActivityArgs,
}

// `activity` is serialized as `null` when clearing, never omitted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SetActivityArgs {
    pub pid: u32,
    pub activity: Option<ActivityPayload>,
}

impl PresenceMessage {
    pub fn set_activity(nonce: impl Into<String>, pid: u32, activity: ActivityPayload) -> Self {
        Self {
            cmd: Command::SetActivity,
            nonce: nonce.into(),
            args: SetActivityArgs {
                pid,
                activity: Some(activity),
            },
        }
    }

    pub fn clear_activity(nonce: impl Into<String>, pid: u32) -> Self {
        Self {
            cmd: Command::SetActivity,
            nonce: nonce.into(),
            args: SetActivityArgs {
                pid,
                activity: None,
            },
        }
    }

    pub fn is_clear(&self) -> bool {
        self.args.activity.is_none()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActivityPayload {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub state: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub details: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamps: Option<TimestampWindow>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assets: Option<ActivityAssets>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimestampWindow {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end: Option<i64>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActivityAssets {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub large_image: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub large_text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub small_image: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub small_text: Option<String>,
}

/// A response frame from the IPC endpoint. Every field is optional because
/// the handshake reply (`READY`) and command replies carry different shapes.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PresenceResponse {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cmd: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub evt: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nonce: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl PresenceResponse {
    pub fn is_error(&self) -> bool {
        self.evt.as_deref() == Some(ERROR_EVENT)
    }

    pub fn error_message(&self) -> Option<String> {
        if !self.is_error() {
            return None;
        }
        let message = self
            .data
            .as_ref()
            .and_then(|data| data.get("message"))
            .and_then(|value| value.as_str())
            .unwrap_or("unknown error");
        Some(message.to_string())
    }

    pub fn ready() -> Self {
        Self {
            cmd: Some("DISPATCH".to_string()),
            evt: Some("READY".to_string()),
            nonce: None,
            data: Some(serde_json::json!({ "v": HANDSHAKE_VERSION })),
        }
    }

    pub fn ack(message: &PresenceMessage) -> Self {
        Self {
            cmd: Some("SET_ACTIVITY".to_string()),
            evt: None,
            nonce: Some(message.nonce.clone()),
            data: serde_json::to_value(&message.args.activity).ok(),
        }
    }

    pub fn error(nonce: Option<String>, code: i64, message: impl Into<String>) -> Self {
        Self {
            cmd: None,
            evt: Some(ERROR_EVENT.to_string()),
            nonce,
            data: Some(serde_json::json!({ "code": code, "message": message.into() })),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn frame_round_trip_preserves_opcode_length_and_payload() {
        let payload = br#"{"v":1,"client_id":"42"}"#.to_vec();
        let bytes = encode_frame(Opcode::Handshake, &payload).unwrap();

        assert_eq!(&bytes[..4], &0u32.to_le_bytes());
        assert_eq!(&bytes[4..8], &(payload.len() as u32).to_le_bytes());

        let frame = read_frame(&mut Cursor::new(bytes)).unwrap();
        assert_eq!(frame.opcode, Opcode::Handshake);
        assert_eq!(frame.len(), payload.len());
        assert_eq!(frame.payload, payload);
    }

    #[test]
    fn oversized_length_is_rejected_before_payload_is_consumed() {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&1u32.to_le_bytes());
        bytes.extend_from_slice(&(MAX_FRAME_BYTES as u32).to_le_bytes());
        bytes.extend_from_slice(b"{}");

        let mut cursor = Cursor::new(bytes);
        let err = read_frame(&mut cursor).unwrap_err();
        assert!(matches!(err, FrameError::InvalidLength(len) if len == MAX_FRAME_BYTES));
        assert_eq!(cursor.position(), HEADER_BYTES as u64);
    }

    #[test]
    fn zero_length_is_rejected() {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&1u32.to_le_bytes());
        bytes.extend_from_slice(&0u32.to_le_bytes());

        let mut cursor = Cursor::new(bytes);
        assert!(matches!(
            read_frame(&mut cursor),
            Err(FrameError::InvalidLength(0))
        ));
        assert_eq!(cursor.position(), HEADER_BYTES as u64);
    }

    #[test]
    fn largest_valid_length_is_accepted() {
        let payload = vec![b' '; MAX_FRAME_BYTES - 1];
        let bytes = encode_frame(Opcode::Frame, &payload).unwrap();
        let frame = read_frame(&mut Cursor::new(bytes)).unwrap();
        assert_eq!(frame.len(), MAX_FRAME_BYTES - 1);
    }

    #[test]
    fn short_payload_is_truncated_error() {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&1u32.to_le_bytes());
        bytes.extend_from_slice(&10u32.to_le_bytes());
        bytes.extend_from_slice(b"{\"a\"");

        assert!(matches!(
            read_frame(&mut Cursor::new(bytes)),
            Err(FrameError::Truncated)
        ));
    }

    #[test]
    fn short_header_is_truncated_error() {
        let bytes = vec![1u8, 0, 0];
        assert!(matches!(
            read_frame(&mut Cursor::new(bytes)),
            Err(FrameError::Truncated)
        ));
    }

    #[test]
    fn unknown_opcode_is_rejected() {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&9u32.to_le_bytes());
        bytes.extend_from_slice(&2u32.to_le_bytes());
        bytes.extend_from_slice(b"{}");

        assert!(matches!(
            read_frame(&mut Cursor::new(bytes)),
            Err(FrameError::UnknownOpcode(9))
        ));
    }

    #[test]
    fn encode_rejects_empty_payload() {
        assert!(matches!(
            encode_frame(Opcode::Frame, &[]),
            Err(FrameError::InvalidLength(0))
        ));
    }

    #[test]
    fn handshake_serializes_to_expected_shape() {
        let json = serde_json::to_value(Handshake::new("1396127471342194719")).unwrap();
        assert_eq!(
            json,
            serde_json::json!({ "v": 1, "client_id": "1396127471342194719" })
        );
    }

    #[test]
    fn clear_activity_serializes_null_activity() {
        let message = PresenceMessage::clear_activity("1700000000", 4242);
        let json = serde_json::to_value(&message).unwrap();
        assert_eq!(json["cmd"], "SET_ACTIVITY");
        assert_eq!(json["nonce"], "1700000000");
        assert_eq!(json["args"]["pid"], 4242);
        assert!(json["args"]["activity"].is_null());
        assert!(json["args"].as_object().unwrap().contains_key("activity"));
    }

    #[test]
    fn activity_omits_absent_fields() {
        let activity = ActivityPayload {
            state: "140 BPM".to_string(),
            details: "Recording".to_string(),
            timestamps: None,
            assets: Some(ActivityAssets {
                large_image: Some("fl_studio_logo".to_string()),
                ..ActivityAssets::default()
            }),
        };
        let json = serde_json::to_value(&activity).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "state": "140 BPM",
                "details": "Recording",
                "assets": { "large_image": "fl_studio_logo" }
            })
        );
    }

    #[test]
    fn error_response_exposes_message() {
        let response = PresenceResponse::error(None, 4000, "Invalid client ID");
        assert!(response.is_error());
        assert_eq!(
            response.error_message().as_deref(),
            Some("Invalid client ID")
        );
        assert!(PresenceResponse::ready().error_message().is_none());
    }
}
