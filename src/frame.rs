//! Routed telemetry frames
//!
//! A `Frame` is the decoded form of one record exchanged with the router. This
//! crate never parses wire bytes; it only lays frames out for forwarding and
//! needs the per-version header size for byte accounting.

use crc::{Crc, CRC_16_MCRF4XX};

/// Start marker of a version 1 frame
pub const STX_V1: u8 = 0xFE;

/// Start marker of a version 2 frame
pub const STX_V2: u8 = 0xFD;

/// Largest payload a frame can carry
pub const MAX_PAYLOAD_LEN: usize = 255;

/// Trailing checksum length shared by both versions
pub const CHECKSUM_LEN: usize = 2;

/// CRC-16/MCRF4XX over everything after the marker, then the CRC extra
const FRAME_CRC: Crc<u16> = Crc::<u16>::new(&CRC_16_MCRF4XX);

/// Wire protocol revision of a frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProtocolVersion {
    /// 6-byte header, 8-bit message ids
    V1,
    /// 10-byte header, 24-bit message ids
    V2,
}

impl ProtocolVersion {
    /// Classify a frame by its start marker
    pub fn from_marker(marker: u8) -> Option<Self> {
        match marker {
            STX_V1 => Some(ProtocolVersion::V1),
            STX_V2 => Some(ProtocolVersion::V2),
            _ => None,
        }
    }

    /// Start marker byte
    pub fn marker(self) -> u8 {
        match self {
            ProtocolVersion::V1 => STX_V1,
            ProtocolVersion::V2 => STX_V2,
        }
    }

    /// Header size in bytes, marker included
    pub fn header_len(self) -> usize {
        match self {
            ProtocolVersion::V1 => 6,
            ProtocolVersion::V2 => 10,
        }
    }
}

/// One decoded record
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Wire revision
    pub version: ProtocolVersion,
    /// Sender's rolling packet counter
    pub sequence: u8,
    /// Sending system
    pub system_id: u8,
    /// Sending component
    pub component_id: u8,
    /// Message type
    pub message_id: u32,
    /// Per-message seed folded into the checksum
    pub crc_extra: u8,
    /// Message body
    pub payload: Vec<u8>,
}

impl Frame {
    /// Build a frame, truncating the payload to `MAX_PAYLOAD_LEN`
    pub fn new(
        version: ProtocolVersion,
        system_id: u8,
        component_id: u8,
        message_id: u32,
        crc_extra: u8,
        mut payload: Vec<u8>,
    ) -> Self {
        payload.truncate(MAX_PAYLOAD_LEN);
        Self {
            version,
            sequence: 0,
            system_id,
            component_id,
            message_id,
            crc_extra,
            payload,
        }
    }

    /// Start marker byte
    pub fn marker(&self) -> u8 {
        self.version.marker()
    }

    /// Header size for this frame's version
    pub fn header_len(&self) -> usize {
        self.version.header_len()
    }

    /// Total bytes `to_wire_bytes` produces
    pub fn wire_len(&self) -> usize {
        self.header_len() + self.payload.len() + CHECKSUM_LEN
    }

    /// Serialise header, payload and checksum
    pub fn to_wire_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.wire_len());
        out.push(self.marker());
        out.push(self.payload.len() as u8);
        match self.version {
            ProtocolVersion::V1 => {
                out.extend_from_slice(&[self.sequence, self.system_id, self.component_id]);
                out.push(self.message_id as u8);
            }
            ProtocolVersion::V2 => {
                // No incompat/compat flags, no signature
                out.extend_from_slice(&[0, 0, self.sequence, self.system_id, self.component_id]);
                out.extend_from_slice(&self.message_id.to_le_bytes()[..3]);
            }
        }
        out.extend_from_slice(&self.payload);

        let mut digest = FRAME_CRC.digest();
        digest.update(&out[1..]);
        digest.update(&[self.crc_extra]);
        out.extend_from_slice(&digest.finalize().to_le_bytes());
        out
    }
}
