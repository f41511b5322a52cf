//! Rotating log file endpoint
//!
//! This module drives the lifecycle of the log file that records one remote
//! system's stream:
//!
//! - Closed: no file, no timers
//! - Starting: file open, startup timer re-checking whether the stream began
//! - Running: startup timer gone, liveness timer watching for forward progress
//!
//! `LogEndpoint::start` creates a uniquely named file and arms the startup
//! timer. The `LogFormat` decides when the stream has really started and then
//! arms the liveness timer through `EndpointCore::confirm_startup`. If the
//! liveness check sees no new record since its previous run, the link is
//! treated as dead and the file is rotated with `stop` + `start`.
//!
//! Format-specific behaviour (file extension, startup handshake, how records
//! reach the file) lives behind the `LogFormat` trait; see `binlog` and `tlog`.

pub mod binlog;
pub mod filename;
pub mod tlog;

use crate::config::EndpointConfig;
use crate::error::{LogFileError, Result};
use crate::frame::Frame;
use crate::router::RouteSink;
use crate::timer::{TimerHandle, TimerService};
use std::fs::{File, OpenOptions};
use std::io;
use std::os::unix::fs::OpenOptionsExt;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};
use tracing::{debug, error, info, trace, warn};

/// Counters for records this endpoint sent towards the router
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ReadStats {
    /// Records seen
    pub total: u64,
    /// Records handed to the router
    pub handled: u64,
    /// Bytes handed to the router, headers included
    pub handled_bytes: u64,
}

/// Counters for records the router delivered to this endpoint
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct WriteStats {
    /// Records accepted
    pub total: u64,
    /// Wire bytes accepted
    pub bytes: u64,
    /// Records the format stored; the liveness check watches this one
    pub logged: u64,
}

/// Cumulative endpoint statistics; never reset by stop/start
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct EndpointStats {
    /// Outbound direction
    pub read: ReadStats,
    /// Inbound direction
    pub write: WriteStats,
}

/// Behaviour that differs between log file formats
pub trait LogFormat {
    /// File extension without the dot
    fn extension(&self) -> &'static str;

    /// Called after a new file was opened
    fn on_start(&mut self, _core: &mut EndpointCore) {}

    /// Startup timer tick while the stream has not begun
    ///
    /// Return `true` to be called again next interval. Calling
    /// `EndpointCore::confirm_startup` ends the startup phase regardless.
    fn startup_tick(&mut self, core: &mut EndpointCore) -> bool;

    /// A record from the target system, file known to be open
    ///
    /// Returns whether the record was logged. Records the format ignores do
    /// not count as progress for the liveness check.
    fn handle_frame(&mut self, core: &mut EndpointCore, frame: &Frame) -> bool;

    /// Push buffered data into the file
    fn flush(&mut self, _core: &mut EndpointCore, _full: bool) -> io::Result<usize> {
        Ok(0)
    }

    /// Called before the file is closed
    fn on_stop(&mut self, _core: &mut EndpointCore) {}
}

/// Endpoint state shared with the active `LogFormat`
pub struct EndpointCore {
    config: EndpointConfig,
    timers: Box<dyn TimerService + Send>,
    router: Box<dyn RouteSink + Send>,
    file: Option<File>,
    path: Option<PathBuf>,
    startup_timer: Option<TimerHandle>,
    liveness_timer: Option<TimerHandle>,
    logged_snapshot: u64,
    system_id: Option<u8>,
    stats: EndpointStats,
}

impl EndpointCore {
    /// Endpoint settings
    pub fn config(&self) -> &EndpointConfig {
        &self.config
    }

    /// Cumulative statistics
    pub fn stats(&self) -> &EndpointStats {
        &self.stats
    }

    /// Whether a log file is open
    pub fn is_open(&self) -> bool {
        self.file.is_some()
    }

    /// Path of the open log file
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// The open log file
    pub fn file_mut(&mut self) -> Option<&mut File> {
        self.file.as_mut()
    }

    /// System that confirmed the current session
    pub fn system_id(&self) -> Option<u8> {
        self.system_id
    }

    /// Whether the startup timer is still armed
    pub fn startup_pending(&self) -> bool {
        self.startup_timer.is_some()
    }

    /// Whether the liveness timer is armed
    pub fn liveness_armed(&self) -> bool {
        self.liveness_timer.is_some()
    }

    /// Cancel the startup timer if armed
    pub fn remove_start_timeout(&mut self) {
        if let Some(handle) = self.startup_timer.take() {
            self.timers.cancel(handle);
        }
    }

    /// Arm the periodic liveness check unless it already runs
    pub fn arm_liveness_timer(&mut self) {
        if self.liveness_timer.is_none() {
            let handle = self.timers.schedule_periodic(self.config.alive_timeout());
            self.liveness_timer = Some(handle);
        }
    }

    /// The stream from `system_id` began: leave the startup phase
    pub fn confirm_startup(&mut self, system_id: u8) {
        self.remove_start_timeout();
        self.arm_liveness_timer();
        self.system_id = Some(system_id);
        debug!(system_id, "log stream started");
    }

    /// Serialise `frame`, hand it to the router and account for it
    pub fn forward_and_account(&mut self, frame: &Frame, target_system_id: u8) {
        let bytes = frame.to_wire_bytes();
        self.router.route(&bytes, target_system_id, frame.system_id);

        self.stats.read.total += 1;
        self.stats.read.handled += 1;
        self.stats.read.handled_bytes += (frame.payload.len() + frame.header_len()) as u64;
    }
}

/// Log file endpoint for one remote system
///
/// Dropping an open endpoint runs `stop`: buffered records are drained into
/// the file and the format's stop hook runs. For `BinLog` that hook routes a
/// `BLOCK_STOP` request, so the router still receives a record while the
/// endpoint is being dropped. Call `stop` explicitly to control when that
/// happens.
pub struct LogEndpoint<F: LogFormat> {
    format: F,
    core: EndpointCore,
}

impl<F: LogFormat> LogEndpoint<F> {
    /// Create a closed endpoint
    ///
    /// # Arguments
    ///
    /// * `config` - Endpoint settings
    /// * `format` - Log format variant
    /// * `timers` - Timer service that schedules the startup and liveness checks
    /// * `router` - Sink for records this endpoint forwards
    pub fn new<T, R>(config: EndpointConfig, format: F, timers: T, router: R) -> Self
    where
        T: TimerService + Send + 'static,
        R: RouteSink + Send + 'static,
    {
        Self {
            format,
            core: EndpointCore {
                config,
                timers: Box::new(timers),
                router: Box::new(router),
                file: None,
                path: None,
                startup_timer: None,
                liveness_timer: None,
                logged_snapshot: 0,
                system_id: None,
                stats: EndpointStats::default(),
            },
        }
    }

    /// Shared endpoint state
    pub fn core(&self) -> &EndpointCore {
        &self.core
    }

    /// Log format variant
    pub fn format(&self) -> &F {
        &self.format
    }

    /// Cumulative statistics
    pub fn stats(&self) -> &EndpointStats {
        &self.core.stats
    }

    /// Whether a log file is open
    pub fn is_open(&self) -> bool {
        self.core.is_open()
    }

    /// Open a new log file named after the current local time
    pub fn start(&mut self) -> Result<PathBuf> {
        self.start_at(SystemTime::now())
    }

    /// Open a new log file named after `now`
    pub fn start_at(&mut self, now: SystemTime) -> Result<PathBuf> {
        if self.core.file.is_some() {
            warn!("log already started");
            return Err(LogFileError::AlreadyOpen);
        }

        let path = filename::next_available(&self.core.config.logs_dir, self.format.extension(), now)?;
        let file = open_log_file(&path).map_err(|source| {
            error!(path = %path.display(), error = %source, "unable to open log file");
            LogFileError::Open { path: path.clone(), source }
        })?;

        self.core.file = Some(file);
        self.core.path = Some(path.clone());
        let handle = self.core.timers.schedule_periodic(self.core.config.startup_interval());
        self.core.startup_timer = Some(handle);
        self.format.on_start(&mut self.core);

        info!(
            target_system_id = self.core.config.target_system_id,
            path = %path.display(),
            "logging target system"
        );
        Ok(path)
    }

    /// Cancel both timers, then flush and close the file; no-op when closed
    pub fn stop(&mut self) {
        self.core.remove_start_timeout();
        if let Some(handle) = self.core.liveness_timer.take() {
            self.core.timers.cancel(handle);
        }

        if self.core.file.is_some() {
            self.format.on_stop(&mut self.core);
        }
        if let Some(file) = self.core.file.take() {
            if let Err(e) = file.sync_all() {
                warn!(error = %e, "unable to sync log file");
            }
        }

        self.core.path = None;
        self.core.system_id = None;
    }

    /// Deliver a record from the router
    ///
    /// # Returns
    ///
    /// `true` if the record was accepted for logging, `false` if the endpoint
    /// is closed or the record comes from another system
    pub fn write_frame(&mut self, frame: &Frame) -> bool {
        if !self.core.is_open() {
            return false;
        }
        if frame.system_id != self.core.config.target_system_id {
            trace!(system_id = frame.system_id, "ignoring record from other system");
            return false;
        }

        self.core.stats.write.total += 1;
        self.core.stats.write.bytes += frame.wire_len() as u64;
        if self.format.handle_frame(&mut self.core, frame) {
            self.core.stats.write.logged += 1;
        }
        true
    }

    /// Forward `frame` to `target_system_id` through the router
    pub fn forward_and_account(&mut self, frame: &Frame, target_system_id: u8) {
        self.core.forward_and_account(frame, target_system_id);
    }

    /// Push buffered data into the file; `full` also drains the newest records
    pub fn flush(&mut self, full: bool) -> io::Result<usize> {
        if !self.core.is_open() {
            return Ok(0);
        }
        self.format.flush(&mut self.core, full)
    }

    /// Advance the timer service to `now` and dispatch whatever came due
    pub fn poll_timers(&mut self, now: Duration) {
        for handle in self.core.timers.fire_due(now) {
            self.on_timer(handle);
        }
    }

    /// Dispatch one fired timer
    ///
    /// # Returns
    ///
    /// Whether the timer stays armed; stale handles are ignored
    pub fn on_timer(&mut self, handle: TimerHandle) -> bool {
        if self.core.startup_timer == Some(handle) {
            let keep = self.format.startup_tick(&mut self.core);
            if !keep && self.core.startup_timer == Some(handle) {
                self.core.remove_start_timeout();
            }
            return keep && self.core.startup_timer == Some(handle);
        }

        if self.core.liveness_timer == Some(handle) {
            return self.liveness_check();
        }

        trace!(?handle, "stale timer");
        false
    }

    /// Rotate the file if nothing was logged since the previous check
    pub fn liveness_check(&mut self) -> bool {
        let logged = self.core.stats.write.logged;
        if self.core.logged_snapshot == logged {
            warn!(
                timeout_ms = self.core.config.alive_timeout_ms,
                "no log records received, restarting log"
            );
            self.stop();
            if let Err(e) = self.start() {
                error!(error = %e, "unable to restart log");
            }
        }

        self.core.logged_snapshot = logged;
        true
    }
}

impl<F: LogFormat> Drop for LogEndpoint<F> {
    // Closes like `stop`, router records included
    fn drop(&mut self) {
        self.stop();
    }
}

fn open_log_file(path: &Path) -> io::Result<File> {
    OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .custom_flags(libc::O_NONBLOCK | libc::O_CLOEXEC)
        .mode(0o444)
        .open(path)
}
