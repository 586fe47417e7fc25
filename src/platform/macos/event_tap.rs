//! macOS cursor monitoring via a listen-only CGEventTap and CFRunLoop.
//!
//! `MacOSCursorSource` implements `CursorSource`. `start()` creates the event
//! tap on the calling thread so that permission errors surface immediately,
//! then spawns a background thread that adds the tap and a repeating poll
//! timer to a CFRunLoop and drives it.
//!
//! The tap never touches the events it sees. A mouse event only marks the
//! cursor as dirty; the timer (period `query_interval_ms`) queries NSCursor
//! while dirty, plus one trailing query. The tap sees each event before the
//! target application updates its cursor, so the trailing query is what
//! picks up the shape set in response to the last movement.
//!
//! Memory ownership:
//!   The background thread owns the tap port (CFMachPortRef), the timer, the
//!   run loop source, and the callback state (TapState). All are released
//!   after the run loop exits (i.e. after `stop()` completes).

use std::cell::{Cell, RefCell};
use std::ffi::c_void;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc};
use std::thread::{self, JoinHandle};

use super::nscursor::CursorMatcher;
use crate::cursor::CursorType;
use crate::platform::{CursorSink, CursorSource, PlatformError};

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

const CG_EVENT_LEFT_MOUSE_DOWN: u32 = 1;
const CG_EVENT_LEFT_MOUSE_UP: u32 = 2;
const CG_EVENT_RIGHT_MOUSE_DOWN: u32 = 3;
const CG_EVENT_RIGHT_MOUSE_UP: u32 = 4;
const CG_EVENT_MOUSE_MOVED: u32 = 5;
const CG_EVENT_LEFT_MOUSE_DRAGGED: u32 = 6;
const CG_EVENT_RIGHT_MOUSE_DRAGGED: u32 = 7;
const CG_EVENT_SCROLL_WHEEL: u32 = 22;
const CG_EVENT_OTHER_MOUSE_DOWN: u32 = 25;
const CG_EVENT_OTHER_MOUSE_UP: u32 = 26;
const CG_EVENT_OTHER_MOUSE_DRAGGED: u32 = 27;

/// Sent by the OS after it disabled the tap because a callback was too slow.
const CG_EVENT_TAP_DISABLED_BY_TIMEOUT: u32 = 0xFFFF_FFFE;
/// Sent by the OS after secure input or the user disabled the tap.
const CG_EVENT_TAP_DISABLED_BY_USER_INPUT: u32 = 0xFFFF_FFFF;

/// Every pointer event that can precede a cursor change.
const EVENT_MASK: u64 = (1u64 << CG_EVENT_LEFT_MOUSE_DOWN)
    | (1u64 << CG_EVENT_LEFT_MOUSE_UP)
    | (1u64 << CG_EVENT_RIGHT_MOUSE_DOWN)
    | (1u64 << CG_EVENT_RIGHT_MOUSE_UP)
    | (1u64 << CG_EVENT_MOUSE_MOVED)
    | (1u64 << CG_EVENT_LEFT_MOUSE_DRAGGED)
    | (1u64 << CG_EVENT_RIGHT_MOUSE_DRAGGED)
    | (1u64 << CG_EVENT_SCROLL_WHEEL)
    | (1u64 << CG_EVENT_OTHER_MOUSE_DOWN)
    | (1u64 << CG_EVENT_OTHER_MOUSE_UP)
    | (1u64 << CG_EVENT_OTHER_MOUSE_DRAGGED);

/// kCGSessionEventTap: events entering the login session.
const CG_SESSION_EVENT_TAP: u32 = 1;

/// kCGHeadInsertEventTap: insert tap at the head of the event tap list.
const CG_HEAD_INSERT_EVENT_TAP: u32 = 0;

/// kCGEventTapOptionListenOnly: passive tap; events cannot be modified.
const CG_EVENT_TAP_OPTION_LISTEN_ONLY: u32 = 1;

/// Timer ticks that still query after the last pointer event.
const TRAILING_QUERIES: u8 = 2;

/// Longest single run of the run loop before the stop flag is re-checked.
const RUN_SLICE_SECS: f64 = 0.25;

// ---------------------------------------------------------------------------
// Raw FFI types and declarations
// ---------------------------------------------------------------------------

type CFMachPortRef = *mut c_void;
type CFRunLoopRef = *mut c_void;
type CFRunLoopSourceRef = *mut c_void;
type CFRunLoopTimerRef = *mut c_void;
type CFStringRef = *const c_void;
type CGEventRef = *mut c_void;
type CGEventTapProxy = *mut c_void;

/// Signature required by CGEventTapCreate for the C callback.
type CGEventTapCallBack = unsafe extern "C" fn(
    proxy: CGEventTapProxy,
    event_type: u32,
    event: CGEventRef,
    user_info: *mut c_void,
) -> CGEventRef;

type CFRunLoopTimerCallBack = unsafe extern "C" fn(timer: CFRunLoopTimerRef, info: *mut c_void);

/// Mirrors `CFRunLoopTimerContext`; copied by `CFRunLoopTimerCreate`.
#[repr(C)]
struct CFRunLoopTimerContext {
    version: isize,
    info: *mut c_void,
    retain: Option<unsafe extern "C" fn(*const c_void) -> *const c_void>,
    release: Option<unsafe extern "C" fn(*const c_void)>,
    copy_description: Option<unsafe extern "C" fn(*const c_void) -> CFStringRef>,
}

#[link(name = "ApplicationServices", kind = "framework")]
extern "C" {
    /// Creates an event tap; returns null on permission failure or system error.
    fn CGEventTapCreate(
        tap: u32,
        place: u32,
        options: u32,
        events_of_interest: u64,
        callback: CGEventTapCallBack,
        user_info: *mut c_void,
    ) -> CFMachPortRef;

    /// Enables or disables an event tap.
    fn CGEventTapEnable(tap: CFMachPortRef, enable: bool);
}

#[link(name = "CoreFoundation", kind = "framework")]
extern "C" {
    fn CFMachPortCreateRunLoopSource(
        allocator: *mut c_void,
        port: CFMachPortRef,
        order: isize,
    ) -> CFRunLoopSourceRef;

    fn CFRunLoopGetCurrent() -> CFRunLoopRef;
    fn CFRunLoopAddSource(rl: CFRunLoopRef, source: CFRunLoopSourceRef, mode: CFStringRef);
    fn CFRunLoopRunInMode(mode: CFStringRef, seconds: f64, return_after_source_handled: u8)
        -> i32;

    /// Stops the specified run loop. Safe to call from any thread.
    fn CFRunLoopStop(rl: CFRunLoopRef);

    fn CFAbsoluteTimeGetCurrent() -> f64;
    fn CFRunLoopTimerCreate(
        allocator: *mut c_void,
        fire_date: f64,
        interval: f64,
        flags: u64,
        order: isize,
        callout: CFRunLoopTimerCallBack,
        context: *mut CFRunLoopTimerContext,
    ) -> CFRunLoopTimerRef;
    fn CFRunLoopAddTimer(rl: CFRunLoopRef, timer: CFRunLoopTimerRef, mode: CFStringRef);
    fn CFRunLoopTimerInvalidate(timer: CFRunLoopTimerRef);

    fn CFRelease(cf: *const c_void);

    static kCFRunLoopCommonModes: CFStringRef;
    static kCFRunLoopDefaultMode: CFStringRef;
}

// ---------------------------------------------------------------------------
// Thread-safety wrappers for raw pointers
// ---------------------------------------------------------------------------

/// Wraps CFRunLoopRef for cross-thread transfer.
///
/// Apple's documentation states that CFRunLoopStop may be called from any
/// thread.
struct SendableRunLoop(CFRunLoopRef);
unsafe impl Send for SendableRunLoop {}

/// Wraps CFMachPortRef for cross-thread transfer.
struct SendableMachPort(CFMachPortRef);
unsafe impl Send for SendableMachPort {}

/// Wraps *mut TapState for cross-thread transfer.
///
/// The raw pointer is handed off to the background thread which becomes the
/// sole owner. The calling thread no longer accesses it after handoff.
struct SendableStatePtr(*mut TapState);
unsafe impl Send for SendableStatePtr {}

// ---------------------------------------------------------------------------
// Callback state
// ---------------------------------------------------------------------------

/// Heap-allocated state shared by the tap callback and the poll timer via
/// their `info` pointers. Both run on the background run loop thread only.
///
/// The background thread reclaims it with `Box::from_raw` after the run loop
/// returns.
struct TapState {
    sink: CursorSink,
    tap_port: Cell<CFMachPortRef>,
    /// Timer ticks left that should query NSCursor.
    pending: Cell<u8>,
    /// Created on the run loop thread; NSCursor objects stay on that thread.
    matcher: RefCell<Option<CursorMatcher>>,
}

impl TapState {
    fn query(&self) -> CursorType {
        match self.matcher.borrow().as_ref() {
            Some(matcher) => matcher.current(),
            None => CursorType::Unknown,
        }
    }
}

// ---------------------------------------------------------------------------
// Public struct
// ---------------------------------------------------------------------------

/// macOS cursor source using a passive CGEventTap.
pub struct MacOSCursorSource {
    query_interval_ms: u64,
    run_loop: Option<SendableRunLoop>,
    /// Set by `stop()`; a `CFRunLoopStop` sent before the worker enters its
    /// run loop is lost, the flag is not.
    stop_requested: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
}

impl MacOSCursorSource {
    pub fn new(query_interval_ms: u64) -> Self {
        Self {
            query_interval_ms: query_interval_ms.max(1),
            run_loop: None,
            stop_requested: Arc::new(AtomicBool::new(false)),
            thread: None,
        }
    }
}

// ---------------------------------------------------------------------------
// CursorSource trait impl
// ---------------------------------------------------------------------------

impl CursorSource for MacOSCursorSource {
    fn start(&mut self, sink: CursorSink) -> Result<(), PlatformError> {
        if self.run_loop.is_some() {
            return Err(PlatformError::Other("cursor source is already running".into()));
        }

        // Heap-allocate TapState so its address is stable for the tap lifetime.
        let state_ptr = Box::into_raw(Box::new(TapState {
            sink,
            tap_port: Cell::new(std::ptr::null_mut()),
            pending: Cell::new(0),
            matcher: RefCell::new(None),
        }));

        // Create the tap on the calling thread so errors surface synchronously.
        let tap_port = unsafe {
            CGEventTapCreate(
                CG_SESSION_EVENT_TAP,
                CG_HEAD_INSERT_EVENT_TAP,
                CG_EVENT_TAP_OPTION_LISTEN_ONLY,
                EVENT_MASK,
                event_tap_callback,
                state_ptr.cast::<c_void>(),
            )
        };

        if tap_port.is_null() {
            // Reclaim TapState before returning the error.
            drop(unsafe { Box::from_raw(state_ptr) });
            return Err(PlatformError::PermissionDenied(
                "CGEventTapCreate returned null. \
                 Grant Input Monitoring in System Settings > Privacy & Security."
                    .into(),
            ));
        }
        unsafe { (*state_ptr).tap_port.set(tap_port) };

        // Send pointers into the worker via channel so the spawn closure only
        // captures Send types.
        let (handoff_tx, handoff_rx) = mpsc::channel::<(SendableMachPort, SendableStatePtr)>();
        let _ = handoff_tx.send((SendableMachPort(tap_port), SendableStatePtr(state_ptr)));

        // Channel to receive the background thread's run loop reference.
        let (rl_tx, rl_rx) = mpsc::channel::<SendableRunLoop>();
        let interval_secs = self.query_interval_ms as f64 / 1000.0;
        self.stop_requested = Arc::new(AtomicBool::new(false));
        let stop_requested = Arc::clone(&self.stop_requested);

        let spawned = thread::Builder::new()
            .name("cursor-monitor-tap".into())
            .spawn(move || {
                let (sendable_tap, sendable_state) = match handoff_rx.recv() {
                    Ok(pair) => pair,
                    Err(_) => return,
                };
                let tap_port = sendable_tap.0;
                let state_ptr = sendable_state.0;

                unsafe { run_tap(tap_port, state_ptr, interval_secs, &stop_requested, rl_tx) };
            });

        let thread = match spawned {
            Ok(thread) => thread,
            Err(e) => {
                // The closure never ran, so nothing else owns these.
                unsafe {
                    CFRelease(tap_port.cast::<c_void>());
                    drop(Box::from_raw(state_ptr));
                }
                return Err(PlatformError::Other(format!("failed to spawn tap thread: {e}")));
            }
        };

        // Wait for the background thread to confirm the run loop is running
        // before returning, so the first event can be observed immediately.
        match rl_rx.recv() {
            Ok(rl) => {
                self.run_loop = Some(rl);
                self.thread = Some(thread);
                Ok(())
            }
            Err(_) => {
                log::warn!("tap: background thread exited before run loop was ready");
                let _ = thread.join();
                Err(PlatformError::Other(
                    "background thread exited before run loop was ready".into(),
                ))
            }
        }
    }

    fn stop(&mut self) -> Result<(), PlatformError> {
        // Signal the run loop to exit; the background thread releases the tap.
        self.stop_requested.store(true, Ordering::SeqCst);
        if let Some(SendableRunLoop(rl)) = self.run_loop.take() {
            unsafe { CFRunLoopStop(rl) };
        }
        if let Some(t) = self.thread.take() {
            let _ = t.join();
        }
        Ok(())
    }
}

impl Drop for MacOSCursorSource {
    fn drop(&mut self) {
        let _ = self.stop();
    }
}

// ---------------------------------------------------------------------------
// Run loop thread
// ---------------------------------------------------------------------------

/// Body of the background thread. Owns `tap_port` and `state_ptr`.
unsafe fn run_tap(
    tap_port: CFMachPortRef,
    state_ptr: *mut TapState,
    interval_secs: f64,
    stop_requested: &AtomicBool,
    rl_tx: mpsc::Sender<SendableRunLoop>,
) {
    let state = &*state_ptr;
    *state.matcher.borrow_mut() = CursorMatcher::new();
    if state.matcher.borrow().is_none() {
        log::warn!("tap: NSCursor unavailable; every cursor reports as unknown");
    }

    let source = CFMachPortCreateRunLoopSource(std::ptr::null_mut(), tap_port, 0);
    let run_loop = CFRunLoopGetCurrent();
    CFRunLoopAddSource(run_loop, source, kCFRunLoopCommonModes);
    // The run loop now retains the source; release our reference.
    CFRelease(source.cast::<c_void>());

    let mut context = CFRunLoopTimerContext {
        version: 0,
        info: state_ptr.cast::<c_void>(),
        retain: None,
        release: None,
        copy_description: None,
    };
    let timer = CFRunLoopTimerCreate(
        std::ptr::null_mut(),
        CFAbsoluteTimeGetCurrent() + interval_secs,
        interval_secs,
        0,
        0,
        poll_timer_callback,
        &mut context,
    );
    if !timer.is_null() {
        CFRunLoopAddTimer(run_loop, timer, kCFRunLoopCommonModes);
    } else {
        log::warn!("tap: CFRunLoopTimerCreate failed; trailing cursor queries disabled");
    }

    CGEventTapEnable(tap_port, true);
    log::info!("tap: CGEventTap active");

    (state.sink)(state.query());

    // Notify the calling thread that the run loop is ready.
    let _ = rl_tx.send(SendableRunLoop(run_loop));

    // Runs until stop() sets the flag; its CFRunLoopStop only shortens the
    // current slice.
    run_until_stopped(stop_requested, || {
        CFRunLoopRunInMode(kCFRunLoopDefaultMode, RUN_SLICE_SECS, 0);
    });

    log::info!("tap: CFRunLoop exited");

    if !timer.is_null() {
        CFRunLoopTimerInvalidate(timer);
        CFRelease(timer.cast::<c_void>());
    }
    CGEventTapEnable(tap_port, false);
    CFRelease(tap_port.cast::<c_void>());
    drop(Box::from_raw(state_ptr));
}

fn run_until_stopped(stop_requested: &AtomicBool, mut run_slice: impl FnMut()) {
    while !stop_requested.load(Ordering::SeqCst) {
        run_slice();
    }
}

// ---------------------------------------------------------------------------
// C callbacks
// ---------------------------------------------------------------------------

/// Called by the OS on the run loop thread for each observed pointer event.
///
/// Passive tap: the event is always returned unchanged.
unsafe extern "C" fn event_tap_callback(
    _proxy: CGEventTapProxy,
    event_type: u32,
    event: CGEventRef,
    user_info: *mut c_void,
) -> CGEventRef {
    let state = &*(user_info as *const TapState);

    match event_type {
        CG_EVENT_TAP_DISABLED_BY_TIMEOUT | CG_EVENT_TAP_DISABLED_BY_USER_INPUT => {
            log::warn!("tap: disabled by the OS (type {event_type:#x}); re-enabling");
            let port = state.tap_port.get();
            if !port.is_null() {
                CGEventTapEnable(port, true);
            }
        }
        _ => state.pending.set(TRAILING_QUERIES),
    }
    event
}

/// Repeating timer on the run loop thread. Queries NSCursor while dirty.
unsafe extern "C" fn poll_timer_callback(_timer: CFRunLoopTimerRef, info: *mut c_void) {
    let state = &*(info as *const TapState);

    let pending = state.pending.get();
    if pending == 0 {
        return;
    }
    state.pending.set(pending - 1);

    let cursor = state.query();
    log::debug!("tap: cursor {cursor}");
    (state.sink)(cursor);
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
