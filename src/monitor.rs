//! The cursor monitor: a native cursor source wired to a host callback.
//!
//! `CursorMonitor` owns the opaque tap (`Box<dyn CursorSource>`) together with
//! its running flag behind one mutex, and the `ThreadsafeFunction` that
//! carries cursor changes from the OS callback thread to the host thread.
//!
//! Two host models:
//! - `CursorMonitor::new` / `CursorMonitorBuilder::spawn`: a dedicated host
//!   thread runs the callback. Dropping the monitor joins it.
//! - `CursorMonitorBuilder::build`: the caller's thread is the host and pumps
//!   the returned `CallQueue`. The callback may then hold non-`Send` state.

use std::io;
use std::sync::Mutex;
use std::thread::{self, JoinHandle};

use crate::bridge::{threadsafe_function, BridgeError, CallMode, CallQueue, ThreadsafeFunction};
use crate::config::MonitorConfig;
use crate::cursor::CursorType;
use crate::platform::{create_cursor_source, CursorSink, CursorSource, PlatformError, PlatformOptions};

/// Name of the host thread started by `CursorMonitorBuilder::spawn`.
pub const HOST_THREAD_NAME: &str = "cursor-monitor-host";

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum MonitorError {
    #[error(transparent)]
    Platform(#[from] PlatformError),
    #[error(transparent)]
    Bridge(#[from] BridgeError),
    #[error("failed to spawn host thread: {0}")]
    Spawn(#[from] io::Error),
    #[error("monitor state mutex poisoned")]
    Poisoned,
}

// ---------------------------------------------------------------------------
// Change filter
// ---------------------------------------------------------------------------

/// Suppresses repeated reports of the last forwarded cursor within one
/// session.
#[derive(Debug)]
struct ChangeFilter {
    last: Option<CursorType>,
    emit_initial: bool,
}

impl ChangeFilter {
    fn new(emit_initial: bool) -> Self {
        Self {
            last: None,
            emit_initial,
        }
    }

    /// Returns the cursor to forward, if the observation is a change. The
    /// baseline only moves through `forwarded`, except for a suppressed
    /// initial cursor.
    fn observe(&mut self, cursor: CursorType) -> Option<CursorType> {
        match self.last {
            None if !self.emit_initial => {
                self.last = Some(cursor);
                None
            }
            Some(previous) if previous == cursor => None,
            _ => Some(cursor),
        }
    }

    /// Records that `cursor` reached the host queue.
    fn forwarded(&mut self, cursor: CursorType) {
        self.last = Some(cursor);
    }
}

/// Builds the sink handed to the native source for one start/stop session.
fn forwarding_sink(tsfn: ThreadsafeFunction<CursorType>, emit_initial: bool) -> CursorSink {
    let filter = Mutex::new(ChangeFilter::new(emit_initial));
    Box::new(move |cursor| {
        let Ok(mut filter) = filter.lock() else {
            return;
        };
        let Some(cursor) = filter.observe(cursor) else {
            return;
        };
        // A dropped change must not become the baseline, or the next report
        // of the same shape would be suppressed too.
        match tsfn.call(cursor, CallMode::NonBlocking) {
            Ok(()) => {
                filter.forwarded(cursor);
                log::debug!("monitor: cursor changed to {cursor}");
            }
            Err(BridgeError::QueueFull) => {
                log::warn!("monitor: call queue full, dropping cursor change to {cursor}")
            }
            Err(BridgeError::Closing) => log::debug!("monitor: host closing, ignoring {cursor}"),
        }
    })
}

// ---------------------------------------------------------------------------
// Builder
// ---------------------------------------------------------------------------

/// Builder for a `CursorMonitor`.
#[derive(Default)]
pub struct CursorMonitorBuilder {
    config: MonitorConfig,
    platform: PlatformOptions,
    source: Option<Box<dyn CursorSource>>,
}

impl CursorMonitorBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn config(mut self, config: MonitorConfig) -> Self {
        self.config = config;
        self
    }

    /// Options for the platform source. Ignored when `source` is set.
    pub fn platform(mut self, platform: PlatformOptions) -> Self {
        self.platform = platform;
        self
    }

    /// Use a custom cursor source instead of the platform backend.
    pub fn source(mut self, source: Box<dyn CursorSource>) -> Self {
        self.source = Some(source);
        self
    }

    /// Build a monitor whose host is the calling thread.
    ///
    /// The returned `CallQueue` must be pumped (`run`, `run_for`,
    /// `dispatch_pending`) for `callback` to see any event.
    pub fn build<F>(
        self,
        callback: F,
    ) -> Result<(CursorMonitor, CallQueue<CursorType, F>), MonitorError>
    where
        F: FnMut(CursorType),
    {
        let source = match self.source {
            Some(source) => source,
            None => create_cursor_source(&self.platform)?,
        };
        let (tsfn, queue) = threadsafe_function(callback, self.config.queue_capacity);
        let monitor = CursorMonitor {
            state: Mutex::new(MonitorState {
                running: false,
                source,
            }),
            tsfn,
            config: self.config,
            host: None,
        };
        Ok((monitor, queue))
    }

    /// Build a monitor that delivers events on its own host thread.
    pub fn spawn<F>(self, callback: F) -> Result<CursorMonitor, MonitorError>
    where
        F: FnMut(CursorType) + Send + 'static,
    {
        let (mut monitor, queue) = self.build(callback)?;
        monitor.host = Some(queue.spawn(HOST_THREAD_NAME)?);
        Ok(monitor)
    }
}

// ---------------------------------------------------------------------------
// CursorMonitor
// ---------------------------------------------------------------------------

struct MonitorState {
    running: bool,
    source: Box<dyn CursorSource>,
}

/// Reports system cursor changes to a host callback.
///
/// `start` and `stop` may be called from any thread and are idempotent.
/// Dropping the monitor stops the source, lets already-queued events reach
/// the callback, and joins the host thread if the monitor owns one.
pub struct CursorMonitor {
    state: Mutex<MonitorState>,
    tsfn: ThreadsafeFunction<CursorType>,
    config: MonitorConfig,
    host: Option<JoinHandle<()>>,
}

impl CursorMonitor {
    /// Monitor with the platform source, default config, and a host thread.
    pub fn new<F>(callback: F) -> Result<Self, MonitorError>
    where
        F: FnMut(CursorType) + Send + 'static,
    {
        CursorMonitorBuilder::new().spawn(callback)
    }

    pub fn builder() -> CursorMonitorBuilder {
        CursorMonitorBuilder::new()
    }

    /// Starts the native tap. A no-op if already running.
    pub fn start(&self) -> Result<(), MonitorError> {
        let mut state = self.state.lock().map_err(|_| MonitorError::Poisoned)?;
        if state.running {
            log::debug!("monitor: start ignored, already running");
            return Ok(());
        }
        if self.tsfn.is_closing() {
            return Err(BridgeError::Closing.into());
        }

        let sink = forwarding_sink(self.tsfn.clone(), self.config.emit_initial);
        state.source.start(sink)?;
        state.running = true;
        log::info!("monitor: started");
        Ok(())
    }

    /// Stops the native tap. A no-op if not running.
    ///
    /// No new event is produced after this returns; events already queued
    /// are still delivered.
    pub fn stop(&self) -> Result<(), MonitorError> {
        let mut state = self.state.lock().map_err(|_| MonitorError::Poisoned)?;
        if !state.running {
            return Ok(());
        }
        state.source.stop()?;
        state.running = false;
        log::info!("monitor: stopped");
        Ok(())
    }

    pub fn is_running(&self) -> bool {
        self.state.lock().map(|state| state.running).unwrap_or(false)
    }

    pub fn config(&self) -> &MonitorConfig {
        &self.config
    }
}

impl Drop for CursorMonitor {
    fn drop(&mut self) {
        if let Err(e) = self.stop() {
            log::warn!("monitor: stop during drop failed: {e}");
        }
        self.tsfn.close();
        if let Some(host) = self.host.take() {
            // Dropped from a callback: the host loop ends on its own once the
            // callback returns.
            if host.thread().id() == thread::current().id() {
                log::debug!("monitor: dropped on the host thread, not joining");
                return;
            }
            if host.join().is_err() {
                log::error!("monitor: host thread panicked");
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::fake::FakeSource;
    use pretty_assertions::assert_eq;
    use std::cell::RefCell;
    use std::rc::Rc;
    use std::sync::mpsc;
    use std::time::Duration;

    fn recorder() -> (Rc<RefCell<Vec<CursorType>>>, impl FnMut(CursorType)) {
        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&seen);
        (seen, move |cursor| sink.borrow_mut().push(cursor))
    }

    #[test]
    fn monitor_is_send_and_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<CursorMonitor>();
    }

    #[test]
    fn forwards_changes_only() {
        let (source, tap) = FakeSource::new();
        let (seen, callback) = recorder();
        let (monitor, mut queue) = CursorMonitor::builder()
            .source(Box::new(source))
            .build(callback)
            .unwrap();

        monitor.start().unwrap();
        for cursor in [
            CursorType::Default,
            CursorType::Default,
            CursorType::Pointer,
            CursorType::Pointer,
            CursorType::Text,
            CursorType::Default,
        ] {
            assert!(tap.emit(cursor));
        }
        queue.dispatch_pending();

        assert_eq!(
            *seen.borrow(),
            vec![
                CursorType::Default,
                CursorType::Pointer,
                CursorType::Text,
                CursorType::Default
            ]
        );
    }

    #[test]
    fn initial_cursor_can_be_suppressed() {
        let (source, tap) = FakeSource::new();
        let (seen, callback) = recorder();
        let (monitor, mut queue) = CursorMonitor::builder()
            .config(MonitorConfig {
                emit_initial: false,
                ..MonitorConfig::default()
            })
            .source(Box::new(source))
            .build(callback)
            .unwrap();

        monitor.start().unwrap();
        tap.emit(CursorType::Default);
        tap.emit(CursorType::Default);
        tap.emit(CursorType::Wait);
        queue.dispatch_pending();

        assert_eq!(*seen.borrow(), vec![CursorType::Wait]);
    }

    #[test]
    fn start_and_stop_are_idempotent() {
        let (source, tap) = FakeSource::new();
        let (monitor, _queue) = CursorMonitor::builder()
            .source(Box::new(source))
            .build(|_| {})
            .unwrap();

        assert!(!monitor.is_running());
        monitor.stop().unwrap();

        monitor.start().unwrap();
        monitor.start().unwrap();
        assert!(monitor.is_running());
        assert_eq!(tap.starts(), 1);

        monitor.stop().unwrap();
        monitor.stop().unwrap();
        assert!(!monitor.is_running());
        assert!(!tap.is_active());
    }

    #[test]
    fn nothing_is_reported_after_stop() {
        let (source, tap) = FakeSource::new();
        let (seen, callback) = recorder();
        let (monitor, mut queue) = CursorMonitor::builder()
            .source(Box::new(source))
            .build(callback)
            .unwrap();

        monitor.start().unwrap();
        tap.emit(CursorType::Default);
        monitor.stop().unwrap();
        assert!(!tap.emit(CursorType::Pointer));

        // Queued before stop, so still delivered.
        queue.dispatch_pending();
        assert_eq!(*seen.borrow(), vec![CursorType::Default]);
    }

    #[test]
    fn restart_begins_a_fresh_session() {
        let (source, tap) = FakeSource::new();
        let (seen, callback) = recorder();
        let (monitor, mut queue) = CursorMonitor::builder()
            .source(Box::new(source))
            .build(callback)
            .unwrap();

        monitor.start().unwrap();
        tap.emit(CursorType::Text);
        monitor.stop().unwrap();
        monitor.start().unwrap();
        tap.emit(CursorType::Text);
        queue.dispatch_pending();

        assert_eq!(*seen.borrow(), vec![CursorType::Text, CursorType::Text]);
        assert_eq!(tap.starts(), 2);
    }

    #[test]
    fn source_failure_leaves_monitor_stopped() {
        let (monitor, _queue) = CursorMonitor::builder()
            .source(Box::new(FakeSource::denied()))
            .build(|_| {})
            .unwrap();

        let err = monitor.start().unwrap_err();
        assert!(
            matches!(err, MonitorError::Platform(PlatformError::PermissionDenied(_))),
            "{err}"
        );
        assert!(!monitor.is_running());
    }

    #[test]
    fn full_queue_drops_events() {
        let (source, tap) = FakeSource::new();
        let (seen, callback) = recorder();
        let (monitor, mut queue) = CursorMonitor::builder()
            .config(MonitorConfig {
                queue_capacity: 1,
                ..MonitorConfig::default()
            })
            .source(Box::new(source))
            .build(callback)
            .unwrap();

        monitor.start().unwrap();
        tap.emit(CursorType::Default);
        tap.emit(CursorType::Pointer);
        queue.dispatch_pending();
        tap.emit(CursorType::Text);
        queue.dispatch_pending();

        assert_eq!(*seen.borrow(), vec![CursorType::Default, CursorType::Text]);
    }

    #[test]
    fn change_dropped_on_full_queue_is_reported_again() {
        let (source, tap) = FakeSource::new();
        let (seen, callback) = recorder();
        let (monitor, mut queue) = CursorMonitor::builder()
            .config(MonitorConfig {
                queue_capacity: 1,
                ..MonitorConfig::default()
            })
            .source(Box::new(source))
            .build(callback)
            .unwrap();

        monitor.start().unwrap();
        tap.emit(CursorType::Default);
        tap.emit(CursorType::Pointer);
        queue.dispatch_pending();
        tap.emit(CursorType::Pointer);
        queue.dispatch_pending();

        assert_eq!(*seen.borrow(), vec![CursorType::Default, CursorType::Pointer]);
    }

    #[test]
    fn drop_stops_source_and_closes_queue() {
        let (source, tap) = FakeSource::new();
        let (seen, callback) = recorder();
        let (monitor, mut queue) = CursorMonitor::builder()
            .source(Box::new(source))
            .build(callback)
            .unwrap();

        monitor.start().unwrap();
        tap.emit(CursorType::Crosshair);
        drop(monitor);

        assert!(!tap.is_active());
        queue.run();
        assert!(queue.is_closed());
        assert_eq!(*seen.borrow(), vec![CursorType::Crosshair]);
    }

    #[test]
    fn spawned_host_thread_delivers_events() {
        let (source, tap) = FakeSource::new();
        let (tx, rx) = mpsc::channel();
        let monitor = CursorMonitor::builder()
            .source(Box::new(source))
            .spawn(move |cursor| {
                let _ = tx.send((cursor, std::thread::current().name().map(String::from)));
            })
            .unwrap();

        monitor.start().unwrap();
        tap.emit(CursorType::Grab);
        let (cursor, thread_name) = rx.recv_timeout(Duration::from_secs(5)).unwrap();
        assert_eq!(cursor, CursorType::Grab);
        assert_eq!(thread_name.as_deref(), Some(HOST_THREAD_NAME));
        drop(monitor);
    }

    #[test]
    fn change_filter_reports_first_observation_by_default() {
        let mut filter = ChangeFilter::new(true);
        assert_eq!(filter.observe(CursorType::Default), Some(CursorType::Default));
        filter.forwarded(CursorType::Default);
        assert_eq!(filter.observe(CursorType::Default), None);
        assert_eq!(filter.observe(CursorType::Move), Some(CursorType::Move));
    }

    #[test]
    fn change_filter_baseline_moves_only_when_forwarded() {
        let mut filter = ChangeFilter::new(true);
        filter.forwarded(CursorType::Default);
        assert_eq!(filter.observe(CursorType::Text), Some(CursorType::Text));
        // Not forwarded: still a change on the next report.
        assert_eq!(filter.observe(CursorType::Text), Some(CursorType::Text));
        filter.forwarded(CursorType::Text);
        assert_eq!(filter.observe(CursorType::Text), None);
    }
}
