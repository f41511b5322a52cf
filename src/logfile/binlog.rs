//! Binary log format
//!
//! The remote system streams its onboard binary log as numbered 200-byte
//! blocks. Blocks arrive out of order, twice, or not at all, so they are staged
//! in a `SequencedRingBuffer` that puts them back in sequence before they hit
//! the file. Every block is answered with a status record: ACK when it was
//! placed (or is past saving), NACK when the buffer had no room so the sender
//! retries it later.
//!
//! Streaming is requested by repeatedly sending a status record carrying the
//! `BLOCK_START` sentinel until the first data block shows up, and stopped with
//! `BLOCK_STOP` when the file is closed.

use crate::frame::{Frame, ProtocolVersion};
use crate::logfile::{EndpointCore, LogFormat};
use crate::ring::sequenced::SequencedRingBuffer;
use crate::ring::AddResult;
use std::io;
use tracing::{debug, error, warn};

/// Message id of a data block
pub const DATA_BLOCK_ID: u32 = 184;

/// Checksum seed of a data block
pub const DATA_BLOCK_CRC_EXTRA: u8 = 159;

/// Message id of a block status record
pub const BLOCK_STATUS_ID: u32 = 185;

/// Checksum seed of a block status record
pub const BLOCK_STATUS_CRC_EXTRA: u8 = 186;

/// Status sequence number asking the sender to start streaming
pub const BLOCK_START: u32 = 0xFFFF_FFFE;

/// Status sequence number asking the sender to stop streaming
pub const BLOCK_STOP: u32 = 0xFFFF_FFFF;

/// Data bytes per block
pub const BLOCK_SIZE: usize = 200;

/// Payload length of a data block: seqno, target system, target component, data
pub const DATA_BLOCK_LEN: usize = 4 + 1 + 1 + BLOCK_SIZE;

/// Default number of blocks staged in memory
pub const DEFAULT_CAPACITY: usize = 1024;

/// One 200-byte block as stored in the ring buffer
pub type Block = [u8; BLOCK_SIZE];

/// Answer sent for a data block
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum BlockStatus {
    /// Resend requested
    Nack = 0,
    /// Block received
    Ack = 1,
}

/// A decoded data block payload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataBlock {
    /// Block sequence number
    pub seqno: u32,
    /// Block contents
    pub data: Block,
}

impl DataBlock {
    /// Decode a data block payload
    ///
    /// Trailing zero bytes may have been trimmed in transit, so short payloads
    /// are zero-extended. Payloads too short to hold the header yield `None`.
    pub fn parse(payload: &[u8]) -> Option<Self> {
        if payload.len() < 6 {
            return None;
        }

        let mut full = [0u8; DATA_BLOCK_LEN];
        let n = payload.len().min(DATA_BLOCK_LEN);
        full[..n].copy_from_slice(&payload[..n]);

        let seqno = u32::from_le_bytes([full[0], full[1], full[2], full[3]]);
        let mut data = [0u8; BLOCK_SIZE];
        data.copy_from_slice(&full[6..]);
        Some(Self { seqno, data })
    }

    /// Encode as a frame payload
    pub fn to_payload(&self, target_system: u8, target_component: u8) -> Vec<u8> {
        let mut payload = Vec::with_capacity(DATA_BLOCK_LEN);
        payload.extend_from_slice(&self.seqno.to_le_bytes());
        payload.push(target_system);
        payload.push(target_component);
        payload.extend_from_slice(&self.data);
        payload
    }
}

/// Binary log format staging blocks in a sequenced ring buffer
pub struct BinLog {
    buffer: SequencedRingBuffer<Block>,
}

impl Default for BinLog {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl BinLog {
    /// Create a format staging up to `capacity` blocks
    pub fn new(capacity: usize) -> Self {
        Self {
            buffer: SequencedRingBuffer::new(capacity),
        }
    }

    /// The staging buffer
    pub fn buffer(&self) -> &SequencedRingBuffer<Block> {
        &self.buffer
    }

    fn send_status(core: &mut EndpointCore, seqno: u32, status: BlockStatus) {
        let config = core.config();
        let target = config.target_system_id;

        let mut payload = Vec::with_capacity(7);
        payload.extend_from_slice(&seqno.to_le_bytes());
        payload.push(target);
        payload.push(0);
        payload.push(status as u8);

        let frame = Frame::new(
            ProtocolVersion::V2,
            config.system_id,
            config.component_id,
            BLOCK_STATUS_ID,
            BLOCK_STATUS_CRC_EXTRA,
            payload,
        );
        core.forward_and_account(&frame, target);
    }

    fn write_buffer(&mut self, core: &mut EndpointCore, full: bool) -> io::Result<usize> {
        let Some(file) = core.file_mut() else {
            return Ok(0);
        };

        if full {
            self.buffer.flush_full(file)
        } else {
            self.buffer.flush_partial(file)
        }
    }
}

impl LogFormat for BinLog {
    fn extension(&self) -> &'static str {
        "bin"
    }

    fn on_start(&mut self, _core: &mut EndpointCore) {
        self.buffer.reset();
    }

    fn startup_tick(&mut self, core: &mut EndpointCore) -> bool {
        debug!("requesting binary log stream");
        Self::send_status(core, BLOCK_START, BlockStatus::Ack);
        true
    }

    fn handle_frame(&mut self, core: &mut EndpointCore, frame: &Frame) -> bool {
        if frame.message_id != DATA_BLOCK_ID {
            return false;
        }
        let Some(block) = DataBlock::parse(&frame.payload) else {
            warn!(len = frame.payload.len(), "malformed data block");
            return false;
        };

        if core.startup_pending() {
            core.confirm_startup(frame.system_id);
        }

        let result = self.buffer.add(&block.data, block.seqno);
        let status = if result == AddResult::Overflow {
            BlockStatus::Nack
        } else {
            BlockStatus::Ack
        };
        Self::send_status(core, block.seqno, status);

        let full = matches!(result, AddResult::Full | AddResult::Overflow);
        if let Err(e) = self.write_buffer(core, full) {
            error!(error = %e, "unable to write binary log");
        }
        true
    }

    fn flush(&mut self, core: &mut EndpointCore, full: bool) -> io::Result<usize> {
        self.write_buffer(core, full)
    }

    fn on_stop(&mut self, core: &mut EndpointCore) {
        if let Err(e) = self.write_buffer(core, true) {
            error!(error = %e, "unable to drain binary log");
        }
        Self::send_status(core, BLOCK_STOP, BlockStatus::Ack);
    }
}
