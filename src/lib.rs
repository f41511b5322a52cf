//! Seqlog Ring Buffer - sequence-aware staging and rotating log files
//! for telemetry captured over lossy links.
//!
//! # Overview
//!
//! Seqlog records the stream of one remote system into durable files. It has
//! two main components:
//!
//! 1. A sequence-aware ring buffer that puts fixed-size, numbered records back
//!    in order, reserves room for gaps and flushes byte-granularly to a sink
//!    that may accept short writes
//! 2. A log file endpoint that creates uniquely named files, waits for the
//!    stream to start, and rotates the file when the link goes silent
//!
//! A background flush daemon can drive the endpoint's timers and flush its
//! buffer periodically when the endpoint is shared with other threads.
//!
//! # Key Features
//!
//! - Gap reservation and late-record placement by sequence number
//! - Resumable partial flushes (element cursor plus byte offset)
//! - Timestamped file names with collision probing
//! - Liveness-driven file rotation
//! - Pluggable log formats (binary block log, telemetry log)
//!
//! # Usage
//!
//! The library is typically used by:
//! 1. Building an `EndpointConfig` and a `LogEndpoint` with a format
//! 2. Calling `start` to open the first file
//! 3. Feeding routed records through `write_frame`
//! 4. Polling timers and flushing, directly or via the flush daemon

#![deny(missing_docs)]

pub mod config;
pub mod error;
pub mod frame;
pub mod logfile;
pub mod ring;
pub mod router;
pub mod timer;

pub use config::EndpointConfig;
pub use error::{ConfigError, LogFileError};
pub use frame::{Frame, ProtocolVersion};
pub use logfile::binlog::BinLog;
pub use logfile::tlog::TLog;
pub use logfile::{EndpointCore, EndpointStats, LogEndpoint, LogFormat};
pub use ring::sequenced::SequencedRingBuffer;
pub use ring::{AddResult, FixedRecord};
pub use router::RouteSink;
pub use timer::{TimerHandle, TimerQueue, TimerService};

use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, error};

/// Configurations for the flush daemon
#[derive(Debug, Clone)]
pub struct FlushDaemonConfig {
    /// Interval between flush operations in milliseconds
    pub interval_ms: u64,
    /// Keep the newest half of the buffer for late records
    pub partial: bool,
}

impl Default for FlushDaemonConfig {
    fn default() -> Self {
        Self {
            interval_ms: 100,
            partial: true,
        }
    }
}

/// Handle to a running flush daemon
pub struct FlushDaemon {
    running: Arc<AtomicBool>,
    handle: Option<thread::JoinHandle<()>>,
}

impl FlushDaemon {
    /// Whether the daemon thread is still asked to run
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Stop the daemon and wait for its thread to exit
    pub fn stop(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                error!("flush daemon thread panicked");
            }
        }
    }
}

impl Drop for FlushDaemon {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Start the flush daemon driving a shared endpoint
///
/// Each tick dispatches due timers (measured from the moment the daemon
/// starts) and flushes the format's buffer into the open file. All access goes
/// through the endpoint's mutex, so the endpoint itself stays single-threaded.
///
/// # Arguments
///
/// * `endpoint` - Endpoint shared with the threads feeding it records
/// * `config` - Configuration for the flush daemon
///
/// # Returns
///
/// A handle that stops and joins the daemon thread
pub fn start_flush_daemon<F>(endpoint: Arc<Mutex<LogEndpoint<F>>>, config: FlushDaemonConfig) -> FlushDaemon
where
    F: LogFormat + Send + 'static,
{
    let running = Arc::new(AtomicBool::new(true));
    let flag = running.clone();
    let interval = Duration::from_millis(config.interval_ms.max(1));

    let handle = thread::Builder::new()
        .name("seqlog-flush-daemon".to_string())
        .spawn(move || {
            let origin = Instant::now();
            debug!(interval_ms = config.interval_ms, "flush daemon started");

            while flag.load(Ordering::SeqCst) {
                {
                    let mut endpoint = endpoint.lock();
                    endpoint.poll_timers(origin.elapsed());
                    if let Err(e) = endpoint.flush(!config.partial) {
                        error!(error = %e, "error flushing log buffer");
                    }
                }
                thread::sleep(interval);
            }

            debug!("flush daemon stopped");
        })
        .expect("Failed to spawn flush daemon thread");

    FlushDaemon {
        running,
        handle: Some(handle),
    }
}
