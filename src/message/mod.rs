//! Ashtech `$PASHR` response framing and binary message dispatch.
use thiserror::Error;

pub mod checksum;
pub mod mben;
pub mod pben;
pub mod quality;

/// Every receiver response starts with this header, which we use
/// as frame delimiter.
pub const DELIMITER: &[u8] = b"$PASHR";

/// Recognized frame trailers, longest first. The delimiter of the next
/// response is usually captured as well, but not always.
const TRAILERS: [&[u8]; 2] = [b"\r\n$PASHR", b"\r\n"];

/// Frames this short are leftovers of a previous delimiter
const MIN_FRAME_LEN: usize = 10;

/// Binary messages we know how to recognize but do not interpret
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IgnoredMessage {
    /// Satellite ephemeris
    Snav,
    /// Satellite almanac
    Salm,
    /// Raw ephemeris
    Epb,
    /// Differential measurements
    Dben,
    /// Almanac (NMEA)
    Dal,
}

/// Closed set of message types this stream may carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageType {
    /// Per satellite measurements
    Mben,
    /// Position, velocity and time solution
    Pben,
    /// Recognized and skipped
    Ignored(IgnoredMessage),
}

const MESSAGE_TABLE: [(&str, MessageType); 7] = [
    ("MPC", MessageType::Mben),
    ("PBN", MessageType::Pben),
    ("SNV", MessageType::Ignored(IgnoredMessage::Snav)),
    ("SAL", MessageType::Ignored(IgnoredMessage::Salm)),
    ("EPB", MessageType::Ignored(IgnoredMessage::Epb)),
    ("RPC", MessageType::Ignored(IgnoredMessage::Dben)),
    ("DAL", MessageType::Ignored(IgnoredMessage::Dal)),
];

impl MessageType {
    /// Looks up a 3 letter type code
    pub fn from_code(code: &str) -> Option<Self> {
        MESSAGE_TABLE
            .iter()
            .find(|(c, _)| *c == code)
            .map(|(_, kind)| *kind)
    }

    /// Type code, as transmitted
    pub fn code(&self) -> &'static str {
        MESSAGE_TABLE
            .iter()
            .find(|(_, kind)| kind == self)
            .map(|(code, _)| *code)
            .unwrap_or_default()
    }
}

impl std::fmt::Display for MessageType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Mben => write!(f, "MBEN"),
            Self::Pben => write!(f, "PBEN"),
            Self::Ignored(msg) => write!(f, "{:?}", msg),
        }
    }
}

/// Frame level errors: the frame is dropped
#[derive(Debug, Clone, PartialEq, Error)]
pub enum FrameError {
    #[error("bad message trailer: {0:?}")]
    BadTrailer(Vec<u8>),
    #[error("truncated frame ({0} bytes)")]
    Truncated(usize),
    #[error("unknown message type \"{0}\"")]
    UnknownMessage(String),
}

/// Message level errors: the message is dropped
#[derive(Debug, Clone, PartialEq, Error)]
pub enum DecodingError {
    #[error("{message} checksum error: received {received:02x?} computed {computed:02x?}")]
    Checksum {
        message: &'static str,
        received: Vec<u8>,
        computed: Vec<u8>,
    },
    #[error("corrupted {message} record: expecting {expected} bytes, got {got}")]
    CorruptedRecord {
        message: &'static str,
        expected: usize,
        got: usize,
    },
}

/// One delimited response: type code resolved, payload and
/// trailing checksum bytes left untouched.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RawFrame<'a> {
    pub kind: MessageType,
    pub body: &'a [u8],
}

impl<'a> RawFrame<'a> {
    /// Parses a frame as returned by the transport, delimiter included.
    /// Returns `Ok(None)` for delimiter leftovers, which are not worth reporting.
    pub fn parse(bytes: &'a [u8]) -> Result<Option<Self>, FrameError> {
        if bytes.len() < MIN_FRAME_LEN {
            return Ok(None);
        }

        let stripped = TRAILERS
            .iter()
            .find(|trailer| bytes.ends_with(trailer))
            .map(|trailer| &bytes[..bytes.len() - trailer.len()])
            .ok_or_else(|| {
                let tail = bytes.len().saturating_sub(TRAILERS[0].len());
                FrameError::BadTrailer(bytes[tail..].to_vec())
            })?;

        // ",XXX," then body
        if stripped.len() < 5 {
            return Err(FrameError::Truncated(stripped.len()));
        }

        let code = String::from_utf8_lossy(&stripped[1..4]);
        let code = code.trim();

        let kind = MessageType::from_code(code)
            .ok_or_else(|| FrameError::UnknownMessage(code.to_string()))?;

        Ok(Some(Self {
            kind,
            body: &stripped[5..],
        }))
    }
}

/// Splits `checksum_len` trailing bytes off `body` and verifies them.
pub(crate) fn checked_payload<'a>(
    message: &'static str,
    body: &'a [u8],
    checksum_len: usize,
) -> Result<&'a [u8], DecodingError> {
    if body.len() < checksum_len {
        return Err(DecodingError::CorruptedRecord {
            message,
            expected: checksum_len,
            got: body.len(),
        });
    }

    let (payload, received) = body.split_at(body.len() - checksum_len);

    if checksum::verify(payload, received) {
        Ok(payload)
    } else {
        Err(DecodingError::Checksum {
            message,
            received: received.to_vec(),
            computed: checksum::compute(payload, checksum_len).unwrap_or_default(),
        })
    }
}

// Big endian field readers. Callers check the record length first.

pub(crate) fn be_u16(buf: &[u8], offset: usize) -> u16 {
    u16::from_be_bytes([buf[offset], buf[offset + 1]])
}

pub(crate) fn be_i32(buf: &[u8], offset: usize) -> i32 {
    let mut bytes = [0; 4];
    bytes.copy_from_slice(&buf[offset..offset + 4]);
    i32::from_be_bytes(bytes)
}

pub(crate) fn be_f32(buf: &[u8], offset: usize) -> f32 {
    let mut bytes = [0; 4];
    bytes.copy_from_slice(&buf[offset..offset + 4]);
    f32::from_be_bytes(bytes)
}

pub(crate) fn be_f64(buf: &[u8], offset: usize) -> f64 {
    let mut bytes = [0; 8];
    bytes.copy_from_slice(&buf[offset..offset + 8]);
    f64::from_be_bytes(bytes)
}
