//! Windows cursor monitoring via WH_MOUSE_LL plus a thread timer.
//!
//! `WindowsCursorSource` implements `CursorSource`. `start()` spawns a
//! background thread that installs the hook, arms a thread timer, and runs a
//! `GetMessageW` loop (required for low-level hooks to deliver events).
//! `stop()` posts `WM_QUIT` to exit the message loop, then joins the thread;
//! the thread unhooks and kills the timer on its way out.
//!
//! No special permissions are required on Windows for WH_MOUSE_LL.
//!
//! The hook runs before the window under the pointer receives WM_SETCURSOR,
//! so querying the cursor inside the hook would return the previous shape.
//! The hook only marks the cursor as dirty; `WM_TIMER` ticks query it while
//! dirty, plus one trailing tick after the last mouse event.
//!
//! State storage: `WH_MOUSE_LL` hook procs receive no `user_info` pointer, so
//! the sink lives in a process-global `Mutex`. Only one
//! `WindowsCursorSource` can be active at a time.

use std::ptr;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::mpsc;
use std::sync::Mutex;
use std::thread::{self, JoinHandle};

use windows_sys::Win32::Foundation::{LPARAM, LRESULT, WPARAM};
use windows_sys::Win32::System::Threading::GetCurrentThreadId;
use windows_sys::Win32::UI::WindowsAndMessaging::{
    CallNextHookEx, GetMessageW, KillTimer, PostThreadMessageW, SetTimer, SetWindowsHookExW,
    UnhookWindowsHookEx, HC_ACTION, MSG, WH_MOUSE_LL, WM_QUIT, WM_TIMER,
};

use super::cursors::SystemCursors;
use crate::platform::{CursorSink, CursorSource, PlatformError};

/// Timer ticks that still query after the last mouse event.
const TRAILING_QUERIES: u8 = 2;

// ---------------------------------------------------------------------------
// Process-global state
// ---------------------------------------------------------------------------

struct HookState {
    sink: CursorSink,
    cursors: SystemCursors,
}

/// Sink and cursor table of the active source.
static HOOK_STATE: Mutex<Option<HookState>> = Mutex::new(None);

/// Timer ticks left that should query the cursor.
static PENDING: AtomicU8 = AtomicU8::new(0);

// ---------------------------------------------------------------------------
// Public struct
// ---------------------------------------------------------------------------

/// Windows cursor source using `WH_MOUSE_LL` and `GetCursorInfo`.
pub struct WindowsCursorSource {
    query_interval_ms: u32,
    /// Thread ID of the background message-loop thread; used for `PostThreadMessageW`.
    thread_id: u32,
    thread: Option<JoinHandle<()>>,
}

impl WindowsCursorSource {
    pub fn new(query_interval_ms: u64) -> Self {
        Self {
            query_interval_ms: query_interval_ms.clamp(1, u32::MAX as u64) as u32,
            thread_id: 0,
            thread: None,
        }
    }
}

// ---------------------------------------------------------------------------
// CursorSource trait impl
// ---------------------------------------------------------------------------

impl CursorSource for WindowsCursorSource {
    fn start(&mut self, sink: CursorSink) -> Result<(), PlatformError> {
        if self.thread.is_some() {
            return Err(PlatformError::Other("cursor source is already running".into()));
        }

        // Store state globally before the hook is installed.
        {
            let mut guard = HOOK_STATE
                .lock()
                .map_err(|_| PlatformError::Other("hook state mutex poisoned".into()))?;
            if guard.is_some() {
                return Err(PlatformError::Other(
                    "another cursor source is already active in this process".into(),
                ));
            }
            *guard = Some(HookState {
                sink,
                cursors: SystemCursors::load(),
            });
        }
        PENDING.store(0, Ordering::SeqCst);

        // Channel: background thread sends its thread id after setup.
        let (info_tx, info_rx) = mpsc::channel::<Result<u32, PlatformError>>();
        let interval = self.query_interval_ms;

        let spawned = thread::Builder::new()
            .name("cursor-monitor-hook".into())
            .spawn(move || {
                // Install hook on this thread; the GetMessageW loop below keeps it alive.
                let hook =
                    unsafe { SetWindowsHookExW(WH_MOUSE_LL, Some(hook_proc), ptr::null_mut(), 0) };
                if hook.is_null() {
                    let _ = info_tx.send(Err(PlatformError::Other(
                        "SetWindowsHookExW(WH_MOUSE_LL) failed".into(),
                    )));
                    return;
                }

                let timer = unsafe { SetTimer(ptr::null_mut(), 0, interval, None) };
                if timer == 0 {
                    log::warn!("hook: SetTimer failed; cursor changes are only seen on start");
                }

                query_and_report();

                let thread_id = unsafe { GetCurrentThreadId() };
                let _ = info_tx.send(Ok(thread_id));

                log::info!("hook: WH_MOUSE_LL hook active");

                // Returns 0 on WM_QUIT, -1 on error; both exit the loop.
                unsafe {
                    let mut msg: MSG = std::mem::zeroed();
                    while GetMessageW(&mut msg, ptr::null_mut(), 0, 0) > 0 {
                        if msg.message == WM_TIMER {
                            on_timer();
                        }
                    }
                }

                log::info!("hook: message loop exited");

                unsafe {
                    if timer != 0 {
                        KillTimer(ptr::null_mut(), timer);
                    }
                    UnhookWindowsHookEx(hook);
                }
            });

        let thread = match spawned {
            Ok(thread) => thread,
            Err(e) => {
                clear_state();
                return Err(PlatformError::Other(format!("failed to spawn hook thread: {e}")));
            }
        };

        match info_rx.recv() {
            Ok(Ok(thread_id)) => {
                self.thread_id = thread_id;
                self.thread = Some(thread);
                Ok(())
            }
            Ok(Err(e)) => {
                let _ = thread.join();
                clear_state();
                Err(e)
            }
            Err(_) => {
                let _ = thread.join();
                clear_state();
                Err(PlatformError::Other(
                    "hook thread exited before reporting hook status".into(),
                ))
            }
        }
    }

    fn stop(&mut self) -> Result<(), PlatformError> {
        let Some(thread) = self.thread.take() else {
            return Ok(());
        };

        // Signal the message loop to exit.
        if self.thread_id != 0 {
            unsafe { PostThreadMessageW(self.thread_id, WM_QUIT, 0, 0) };
            self.thread_id = 0;
        }
        let _ = thread.join();

        // The hook and timer are gone; nothing can reach the sink any more.
        clear_state();
        Ok(())
    }
}

impl Drop for WindowsCursorSource {
    fn drop(&mut self) {
        let _ = self.stop();
    }
}

fn clear_state() {
    let _ = HOOK_STATE.lock().map(|mut g| *g = None);
}

// ---------------------------------------------------------------------------
// Hook procedure and timer
// ---------------------------------------------------------------------------

/// Low-level mouse hook proc, called on the background message-loop thread.
///
/// Every mouse event is passed on unchanged.
unsafe extern "system" fn hook_proc(n_code: i32, w_param: WPARAM, l_param: LPARAM) -> LRESULT {
    if n_code == HC_ACTION as i32 {
        PENDING.store(TRAILING_QUERIES, Ordering::Relaxed);
    }
    CallNextHookEx(ptr::null_mut(), n_code, w_param, l_param)
}

fn on_timer() {
    let pending = PENDING.load(Ordering::Relaxed);
    if pending == 0 {
        return;
    }
    PENDING.store(pending - 1, Ordering::Relaxed);
    query_and_report();
}

fn query_and_report() {
    if let Ok(guard) = HOOK_STATE.lock() {
        if let Some(state) = guard.as_ref() {
            let cursor = state.cursors.current();
            log::debug!("hook: cursor {cursor}");
            (state.sink)(cursor);
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_produces_idle_state() {
        let source = WindowsCursorSource::new(50);
        assert_eq!(source.query_interval_ms, 50);
        assert_eq!(source.thread_id, 0);
        assert!(source.thread.is_none());
    }

    /// Stopping a source that was never started must return Ok and not panic.
    #[test]
    fn stop_on_unstarted_source_is_noop() {
        let mut source = WindowsCursorSource::new(0);
        assert!(source.stop().is_ok());
    }
}
