//! Message framing over fixed-size HID reports
//!
//! A message is a type id plus a serialized payload. On the wire it is
//! prefixed by an 8-byte header and cut into 63-byte segments:
//!
//! ```text
//! segment 0: [0x23 0x23] [type: u16 BE] [len: u32 BE] [payload 0..55]
//! segment n: [payload ...] (last one zero-padded)
//! ```
//!
//! Each segment travels as one HID report with report ID [`REPORT_ID`].
//! There are no sequence numbers; order on the wire is the only ordering.

use crate::error::FramingError;

/// HID report ID carried by every segment ('?')
pub const REPORT_ID: u8 = 0x3F;

/// Payload bytes per HID report
pub const SEGMENT_SIZE: usize = 63;

/// Magic prefix that opens every frame header
pub const MAGIC: [u8; 2] = [0x23, 0x23];

/// Wire length of the frame header (magic + type + length)
pub const HEADER_LEN: usize = MAGIC.len() + 2 + 4;

/// Upper bound on a declared payload length (firmware images fit well below)
pub const MAX_PAYLOAD_LEN: u32 = 4 * 1024 * 1024;

/// One fixed-size transfer unit
pub type Segment = [u8; SEGMENT_SIZE];

/// Parsed frame header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    /// Message type id (family specific)
    pub message_type: u16,
    /// Length of the serialized payload, excluding header and padding
    pub payload_len: u32,
}

impl FrameHeader {
    pub fn new(message_type: u16, payload_len: u32) -> Self {
        Self {
            message_type,
            payload_len,
        }
    }

    /// Serialize to the fixed wire layout
    pub fn to_bytes(&self) -> [u8; HEADER_LEN] {
        let mut buf = [0u8; HEADER_LEN];
        buf[..2].copy_from_slice(&MAGIC);
        buf[2..4].copy_from_slice(&self.message_type.to_be_bytes());
        buf[4..8].copy_from_slice(&self.payload_len.to_be_bytes());
        buf
    }

    /// Parse a header from the start of `bytes`
    pub fn parse(bytes: &[u8]) -> Result<Self, FramingError> {
        if bytes.len() < HEADER_LEN {
            return Err(FramingError::Truncated(bytes.len()));
        }
        if bytes[..2] != MAGIC {
            return Err(FramingError::BadMagic([bytes[0], bytes[1]]));
        }

        let message_type = u16::from_be_bytes([bytes[2], bytes[3]]);
        let payload_len = u32::from_be_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]);
        if payload_len > MAX_PAYLOAD_LEN {
            return Err(FramingError::PayloadTooLarge(payload_len as usize));
        }

        Ok(Self {
            message_type,
            payload_len,
        })
    }
}

/// Number of segments needed to carry a payload of `payload_len` bytes
pub fn segment_count(payload_len: usize) -> usize {
    (HEADER_LEN + payload_len).div_ceil(SEGMENT_SIZE)
}

/// Split a message into zero-padded segments, header first
///
/// Payloads over [`MAX_PAYLOAD_LEN`] are refused, since no reader would
/// accept the header they produce.
pub fn encode(message_type: u16, payload: &[u8]) -> Result<Vec<Segment>, FramingError> {
    let payload_len = u32::try_from(payload.len())
        .ok()
        .filter(|&len| len <= MAX_PAYLOAD_LEN)
        .ok_or(FramingError::PayloadTooLarge(payload.len()))?;
    let header = FrameHeader::new(message_type, payload_len);

    let mut frame = Vec::with_capacity(HEADER_LEN + payload.len());
    frame.extend_from_slice(&header.to_bytes());
    frame.extend_from_slice(payload);

    Ok(frame
        .chunks(SEGMENT_SIZE)
        .map(|chunk| {
            let mut segment = [0u8; SEGMENT_SIZE];
            segment[..chunk.len()].copy_from_slice(chunk);
            segment
        })
        .collect())
}

/// Parse the header out of the first segment of a message
///
/// Returns the header and whatever payload bytes followed it in the segment
/// (possibly including padding; see [`continue_decode`]).
pub fn begin_decode(first_segment: &[u8]) -> Result<(FrameHeader, Vec<u8>), FramingError> {
    let header = FrameHeader::parse(first_segment)?;
    Ok((header, first_segment[HEADER_LEN..].to_vec()))
}

/// True once `accumulated` holds the whole payload
///
/// Completion is a byte-length comparison; anything past `payload_len` is
/// padding from the final segment.
pub fn continue_decode(accumulated: &[u8], header: &FrameHeader) -> bool {
    accumulated.len() >= header.payload_len as usize
}

/// Incremental reassembly of one incoming message
#[derive(Debug)]
pub struct FrameAssembler {
    header: FrameHeader,
    buf: Vec<u8>,
}

impl FrameAssembler {
    /// Start a message from its first segment
    pub fn start(first_segment: &[u8]) -> Result<Self, FramingError> {
        let (header, mut buf) = begin_decode(first_segment)?;
        buf.reserve((header.payload_len as usize).saturating_sub(buf.len()));
        Ok(Self { header, buf })
    }

    /// Whether every payload byte has arrived
    pub fn is_complete(&self) -> bool {
        continue_decode(&self.buf, &self.header)
    }

    /// Append a continuation segment, returning completion
    pub fn push(&mut self, segment: &[u8]) -> bool {
        self.buf.extend_from_slice(segment);
        self.is_complete()
    }

    /// Consume into `(message_type, payload)` with padding stripped
    pub fn finish(mut self) -> (u16, Vec<u8>) {
        self.buf.truncate(self.header.payload_len as usize);
        (self.header.message_type, self.buf)
    }
}
