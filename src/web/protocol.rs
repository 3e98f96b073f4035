//! Binary wire protocol between the server and a browser client. Each
//! message is one leading ASCII type byte plus a payload; the framed
//! channel prefixes every message with a 4-byte big-endian length.

use std::io::{self, Read, Write};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Hard cap for a single framed message.
pub const MAX_FRAME_LEN: usize = 1024 * 1024;

pub const TAG_INPUT: u8 = b'0';
pub const TAG_OUTPUT: u8 = b'1';
pub const TAG_RESIZE: u8 = b'2';
pub const TAG_PING: u8 = b'3';
pub const TAG_PONG: u8 = b'4';
pub const TAG_SET_TITLE: u8 = b'5';
pub const TAG_OPTIONS: u8 = b'6';
pub const TAG_CLOSED: u8 = b'7';

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    /// Client → server: raw keystroke / paste / mouse bytes.
    Input(Vec<u8>),
    /// Server → client: terminal output for the client emulator.
    Output(Vec<u8>),
    /// Client → server: viewport size.
    Resize { cols: u16, rows: u16 },
    Ping,
    Pong,
    /// Server → client: the session's window title changed.
    SetTitle(String),
    /// Server → client, once at establishment.
    Options { read_only: bool },
    /// Server → client, exactly once before transport teardown.
    Closed,
}

#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("empty frame")]
    Empty,
    #[error("unknown message tag {0:#04x}")]
    UnknownTag(u8),
    #[error("bad payload: {0}")]
    BadPayload(String),
    #[error("frame of {0} bytes exceeds the {MAX_FRAME_LEN} byte limit")]
    TooLarge(usize),
    #[error(transparent)]
    Io(#[from] io::Error),
}

#[derive(Serialize, Deserialize)]
struct ResizePayload {
    cols: u16,
    rows: u16,
}

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct OptionsPayload {
    read_only: bool,
}

impl Message {
    pub fn tag(&self) -> u8 {
        match self {
            Message::Input(_) => TAG_INPUT,
            Message::Output(_) => TAG_OUTPUT,
            Message::Resize { .. } => TAG_RESIZE,
            Message::Ping => TAG_PING,
            Message::Pong => TAG_PONG,
            Message::SetTitle(_) => TAG_SET_TITLE,
            Message::Options { .. } => TAG_OPTIONS,
            Message::Closed => TAG_CLOSED,
        }
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut out = vec![self.tag()];
        match self {
            Message::Input(bytes) | Message::Output(bytes) => out.extend_from_slice(bytes),
            Message::Resize { cols, rows } => {
                let payload = ResizePayload { cols: *cols, rows: *rows };
                out.extend_from_slice(&serde_json::to_vec(&payload).expect("resize payload"));
            }
            Message::SetTitle(title) => out.extend_from_slice(title.as_bytes()),
            Message::Options { read_only } => {
                let payload = OptionsPayload { read_only: *read_only };
                out.extend_from_slice(&serde_json::to_vec(&payload).expect("options payload"));
            }
            Message::Ping | Message::Pong | Message::Closed => {}
        }
        out
    }

    pub fn decode(bytes: &[u8]) -> Result<Message, ProtocolError> {
        let (&tag, payload) = bytes.split_first().ok_or(ProtocolError::Empty)?;
        let msg = match tag {
            TAG_INPUT => Message::Input(payload.to_vec()),
            TAG_OUTPUT => Message::Output(payload.to_vec()),
            TAG_RESIZE => {
                let p: ResizePayload = serde_json::from_slice(payload)
                    .map_err(|e| ProtocolError::BadPayload(e.to_string()))?;
                Message::Resize { cols: p.cols, rows: p.rows }
            }
            TAG_PING => Message::Ping,
            TAG_PONG => Message::Pong,
            TAG_SET_TITLE => Message::SetTitle(
                String::from_utf8(payload.to_vec())
                    .map_err(|e| ProtocolError::BadPayload(e.to_string()))?,
            ),
            TAG_OPTIONS => {
                let p: OptionsPayload = serde_json::from_slice(payload)
                    .map_err(|e| ProtocolError::BadPayload(e.to_string()))?;
                Message::Options { read_only: p.read_only }
            }
            TAG_CLOSED => Message::Closed,
            other => return Err(ProtocolError::UnknownTag(other)),
        };
        Ok(msg)
    }
}

/// Write one length-prefixed message to the framed channel.
pub fn write_frame<W: Write>(w: &mut W, msg: &Message) -> io::Result<()> {
    let body = msg.encode();
    w.write_all(&(body.len() as u32).to_be_bytes())?;
    w.write_all(&body)?;
    w.flush()
}

/// Read one length-prefixed message. `Ok(None)` is a clean EOF at a
/// frame boundary; oversized frames are rejected before any payload
/// byte is consumed.
pub fn read_frame<R: Read>(r: &mut R) -> Result<Option<Message>, ProtocolError> {
    let mut len_buf = [0u8; 4];
    match r.read_exact(&mut len_buf) {
        Ok(()) => {}
        Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(e.into()),
    }
    let len = u32::from_be_bytes(len_buf) as usize;
    if len > MAX_FRAME_LEN {
        return Err(ProtocolError::TooLarge(len));
    }
    let mut body = vec![0u8; len];
    r.read_exact(&mut body)?;
    Message::decode(&body).map(Some)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tags_match_the_wire_table() {
        assert_eq!(Message::Input(vec![]).tag(), b'0');
        assert_eq!(Message::Output(vec![]).tag(), b'1');
        assert_eq!(Message::Resize { cols: 1, rows: 1 }.tag(), b'2');
        assert_eq!(Message::Ping.tag(), b'3');
        assert_eq!(Message::Pong.tag(), b'4');
        assert_eq!(Message::SetTitle(String::new()).tag(), b'5');
        assert_eq!(Message::Options { read_only: true }.tag(), b'6');
        assert_eq!(Message::Closed.tag(), b'7');
    }

    #[test]
    fn messages_round_trip() {
        let samples = vec![
            Message::Input(b"ls -la\r".to_vec()),
            Message::Output(b"\x1b[31mhi\x1b[0m".to_vec()),
            Message::Resize { cols: 120, rows: 40 },
            Message::Ping,
            Message::Pong,
            Message::SetTitle("vim".to_string()),
            Message::Options { read_only: true },
            Message::Closed,
        ];
        for msg in samples {
            assert_eq!(Message::decode(&msg.encode()).unwrap(), msg);
        }
    }

    #[test]
    fn resize_payload_is_the_documented_json() {
        let decoded = Message::decode(br#"2{"cols":120,"rows":40}"#).unwrap();
        assert_eq!(decoded, Message::Resize { cols: 120, rows: 40 });
    }

    #[test]
    fn options_payload_uses_camel_case() {
        let encoded = Message::Options { read_only: false }.encode();
        assert_eq!(&encoded, br#"6{"readOnly":false}"#);
    }

    #[test]
    fn unknown_tag_and_empty_frame_are_errors() {
        assert!(matches!(Message::decode(b"9"), Err(ProtocolError::UnknownTag(b'9'))));
        assert!(matches!(Message::decode(b""), Err(ProtocolError::Empty)));
        assert!(matches!(Message::decode(b"2notjson"), Err(ProtocolError::BadPayload(_))));
    }

    #[test]
    fn framing_round_trips_over_a_stream() {
        let mut buf = Vec::new();
        write_frame(&mut buf, &Message::Resize { cols: 80, rows: 24 }).unwrap();
        write_frame(&mut buf, &Message::Output(b"hello".to_vec())).unwrap();
        let mut cursor = io::Cursor::new(buf);
        assert_eq!(
            read_frame(&mut cursor).unwrap(),
            Some(Message::Resize { cols: 80, rows: 24 })
        );
        assert_eq!(read_frame(&mut cursor).unwrap(), Some(Message::Output(b"hello".to_vec())));
        assert_eq!(read_frame(&mut cursor).unwrap(), None);
    }

    #[test]
    fn oversized_frames_are_rejected() {
        let mut buf = Vec::new();
        buf.extend_from_slice(&((MAX_FRAME_LEN as u32) + 1).to_be_bytes());
        buf.push(b'0');
        let mut cursor = io::Cursor::new(buf);
        assert!(matches!(read_frame(&mut cursor), Err(ProtocolError::TooLarge(_))));
    }
}
