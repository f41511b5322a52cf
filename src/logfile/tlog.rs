//! Telemetry log format
//!
//! Every record from the target system is appended as an 8-byte big-endian
//! timestamp (microseconds since the Unix epoch) followed by the record's wire
//! bytes. The first such record confirms that the stream is up.

use crate::frame::Frame;
use crate::logfile::{EndpointCore, LogFormat};
use std::io::Write;
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::{debug, error};

/// Telemetry log format
#[derive(Debug, Default)]
pub struct TLog {
    scratch: Vec<u8>,
}

impl TLog {
    /// Create the format
    pub fn new() -> Self {
        Self::default()
    }
}

impl LogFormat for TLog {
    fn extension(&self) -> &'static str {
        "tlog"
    }

    fn startup_tick(&mut self, _core: &mut EndpointCore) -> bool {
        debug!("waiting for first telemetry record");
        true
    }

    fn handle_frame(&mut self, core: &mut EndpointCore, frame: &Frame) -> bool {
        if core.startup_pending() {
            core.confirm_startup(frame.system_id);
        }

        let timestamp_us = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_micros() as u64;

        self.scratch.clear();
        self.scratch.extend_from_slice(&timestamp_us.to_be_bytes());
        self.scratch.extend_from_slice(&frame.to_wire_bytes());

        let Some(file) = core.file_mut() else {
            return false;
        };
        match file.write_all(&self.scratch) {
            Ok(()) => true,
            Err(e) => {
                error!(error = %e, "unable to write telemetry log");
                false
            }
        }
    }
}
