//! Cursor monitoring on X11 via the XFixes extension.
//!
//! `LinuxXFixesSource` implements `CursorSource`. `start()` connects to the X
//! server on the calling thread so that connection errors surface
//! immediately, selects `DisplayCursorNotify` on the root window, then spawns
//! a background thread that blocks in `wait_for_event`. Every cursor change
//! on the display arrives as an `XFixesCursorNotify` event carrying the
//! cursor's name atom.
//!
//! Wakeup: `wait_for_event` has no timeout, so `stop()` sends a ClientMessage
//! to a private 1x1 InputOnly window created by this source. With an empty
//! event mask the server delivers it to the creating client, i.e. to the
//! blocked background thread, which then exits the loop.
//!
//! Unnamed cursors (application bitmaps created without `XFixesSetCursorName`)
//! have the atom `None` and are reported as `CursorType::Unknown`.

use std::collections::HashMap;
use std::fmt::Display;
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use x11rb::connection::{Connection, RequestConnection as _};
use x11rb::errors::ConnectionError;
use x11rb::protocol::xfixes::{self, ConnectionExt as _, CursorNotifyMask};
use x11rb::protocol::xproto::{
    Atom, ClientMessageEvent, ConnectionExt as _, CreateWindowAux, EventMask, Window, WindowClass,
};
use x11rb::protocol::Event;
use x11rb::rust_connection::RustConnection;

use super::names::cursor_from_x_name;
use crate::cursor::CursorType;
use crate::platform::{CursorSink, CursorSource, PlatformError};

/// Atom used as the ClientMessage type for the stop wakeup.
const STOP_ATOM_NAME: &[u8] = b"_CURSOR_MONITOR_STOP";

// ---------------------------------------------------------------------------
// Public struct
// ---------------------------------------------------------------------------

/// Linux cursor source backed by XFixes cursor-notify events.
pub struct LinuxXFixesSource {
    display: Option<String>,
    running: Option<Running>,
}

/// State owned while the background thread is alive.
struct Running {
    conn: Arc<RustConnection>,
    wake_window: Window,
    stop_atom: Atom,
    thread: JoinHandle<()>,
}

impl LinuxXFixesSource {
    pub fn new(display: Option<String>) -> Self {
        Self {
            display,
            running: None,
        }
    }
}

// ---------------------------------------------------------------------------
// CursorSource trait impl
// ---------------------------------------------------------------------------

impl CursorSource for LinuxXFixesSource {
    fn start(&mut self, sink: CursorSink) -> Result<(), PlatformError> {
        if self.running.is_some() {
            return Err(PlatformError::Other("cursor source is already running".into()));
        }

        let (conn, screen_num) = x11rb::connect(self.display.as_deref()).map_err(|e| {
            PlatformError::Unavailable(format!("cannot connect to X server: {e}"))
        })?;

        if conn
            .extension_information(xfixes::X11_EXTENSION_NAME)
            .map_err(x11_error)?
            .is_none()
        {
            return Err(PlatformError::Unavailable(
                "X server does not support the XFIXES extension".into(),
            ));
        }
        // Cursor notification and cursor names need XFixes 2.0 or newer.
        let version = conn
            .xfixes_query_version(5, 0)
            .map_err(x11_error)?
            .reply()
            .map_err(x11_error)?;
        if version.major_version < 2 {
            return Err(PlatformError::Unavailable(format!(
                "XFIXES {}.{} is too old; 2.0 is required",
                version.major_version, version.minor_version
            )));
        }

        let root = conn
            .setup()
            .roots
            .get(screen_num)
            .map(|screen| screen.root)
            .ok_or_else(|| PlatformError::Other(format!("X screen {screen_num} not found")))?;

        let stop_atom = conn
            .intern_atom(false, STOP_ATOM_NAME)
            .map_err(x11_error)?
            .reply()
            .map_err(x11_error)?
            .atom;

        let wake_window = conn.generate_id().map_err(x11_error)?;
        conn.create_window(
            x11rb::COPY_DEPTH_FROM_PARENT,
            wake_window,
            root,
            0,
            0,
            1,
            1,
            0,
            WindowClass::INPUT_ONLY,
            x11rb::COPY_FROM_PARENT,
            &CreateWindowAux::new(),
        )
        .map_err(x11_error)?;

        conn.xfixes_select_cursor_input(root, CursorNotifyMask::DISPLAY_CURSOR)
            .map_err(x11_error)?;

        let initial = current_cursor(&conn)?;
        conn.flush().map_err(x11_error)?;

        let conn = Arc::new(conn);
        let worker_conn = Arc::clone(&conn);

        let thread = thread::Builder::new()
            .name("cursor-monitor-xfixes".into())
            .spawn(move || {
                log::info!("xfixes: cursor notify active on root {root:#x}");
                sink(initial);

                if let Err(e) = event_loop(&worker_conn, wake_window, stop_atom, &sink) {
                    log::error!("xfixes: event loop failed: {e}");
                }

                let _ = worker_conn.destroy_window(wake_window);
                let _ = worker_conn.flush();
                log::info!("xfixes: event loop exited");
            })
            .map_err(|e| PlatformError::Other(format!("failed to spawn X event thread: {e}")))?;

        self.running = Some(Running {
            conn,
            wake_window,
            stop_atom,
            thread,
        });
        Ok(())
    }

    fn stop(&mut self) -> Result<(), PlatformError> {
        let Some(running) = self.running.take() else {
            return Ok(());
        };

        let event = ClientMessageEvent::new(32, running.wake_window, running.stop_atom, [0u32; 5]);
        let sent = running
            .conn
            .send_event(false, running.wake_window, EventMask::NO_EVENT, event)
            .map(|_| ())
            .and_then(|()| running.conn.flush());
        if let Err(e) = sent {
            // A broken connection also ends `wait_for_event`, so the join
            // below still returns.
            log::warn!("xfixes: failed to send stop message: {e}");
        }

        if running.thread.join().is_err() {
            log::error!("xfixes: event thread panicked");
        }
        Ok(())
    }
}

impl Drop for LinuxXFixesSource {
    fn drop(&mut self) {
        let _ = self.stop();
    }
}

// ---------------------------------------------------------------------------
// Event loop
// ---------------------------------------------------------------------------

/// Forwards cursor changes to `sink` until the stop message arrives.
fn event_loop(
    conn: &RustConnection,
    wake_window: Window,
    stop_atom: Atom,
    sink: &CursorSink,
) -> Result<(), ConnectionError> {
    let mut names: HashMap<Atom, CursorType> = HashMap::new();

    loop {
        match conn.wait_for_event()? {
            Event::XfixesCursorNotify(ev) => {
                let cursor = match names.get(&ev.name) {
                    Some(cursor) => *cursor,
                    None => {
                        let cursor = resolve_atom(conn, ev.name);
                        names.insert(ev.name, cursor);
                        cursor
                    }
                };
                log::debug!("xfixes: cursor serial={} -> {cursor}", ev.cursor_serial);
                sink(cursor);
            }
            Event::ClientMessage(ev) if ev.window == wake_window && ev.type_ == stop_atom => {
                return Ok(());
            }
            _ => {}
        }
    }
}

/// Looks up the name behind a cursor atom. Failures degrade to `Unknown`.
fn resolve_atom(conn: &RustConnection, atom: Atom) -> CursorType {
    if atom == x11rb::NONE {
        return CursorType::Unknown;
    }
    match conn.get_atom_name(atom).map(|cookie| cookie.reply()) {
        Ok(Ok(reply)) => cursor_from_x_name(&String::from_utf8_lossy(&reply.name)),
        Ok(Err(e)) => {
            log::debug!("xfixes: GetAtomName({atom}) failed: {e}");
            CursorType::Unknown
        }
        Err(e) => {
            log::debug!("xfixes: GetAtomName({atom}) failed: {e}");
            CursorType::Unknown
        }
    }
}

/// Reads the name of the cursor currently displayed.
fn current_cursor(conn: &RustConnection) -> Result<CursorType, PlatformError> {
    let reply = conn
        .xfixes_get_cursor_image_and_name()
        .map_err(x11_error)?
        .reply()
        .map_err(x11_error)?;
    if reply.name.is_empty() {
        return Ok(CursorType::Unknown);
    }
    Ok(cursor_from_x_name(&String::from_utf8_lossy(&reply.name)))
}

fn x11_error(e: impl Display) -> PlatformError {
    PlatformError::Other(format!("X11: {e}"))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
