//! Linux platform backend.
//!
//! Capture: XFixes cursor-notify events via `LinuxXFixesSource`.
//!
//! Startup detection:
//! 1. `x11_display` configured → connect to it, skip detection
//! 2. `DISPLAY` only (X11)     → XFixes sees every cursor change
//! 3. `DISPLAY` + `WAYLAND_DISPLAY` → XFixes on XWayland; only X clients are seen
//! 4. `WAYLAND_DISPLAY` only   → no protocol exposes other clients' cursors, clear error
//! 5. Neither variable set     → no display, clear error

mod detect;
mod names;
mod xfixes;

use detect::{DisplayServer, SessionEnv};
use xfixes::LinuxXFixesSource;

use crate::platform::{CursorSource, PlatformError, PlatformOptions};

// ---------------------------------------------------------------------------
// Factory: cursor source
// ---------------------------------------------------------------------------

/// Returns the XFixes cursor source when an X server is reachable.
pub fn create_cursor_source(
    options: &PlatformOptions,
) -> Result<Box<dyn CursorSource>, PlatformError> {
    if let Some(display) = &options.x11_display {
        return Ok(Box::new(LinuxXFixesSource::new(Some(display.clone()))));
    }

    let session = SessionEnv::from_env();
    match session.server() {
        Some(server) if server.has_x_server() => {
            if server == DisplayServer::XWayland {
                log::warn!(
                    "platform: Wayland session with XWayland; only cursors set by X11 clients are visible"
                );
            }
            log::debug!("platform: using X display {:?}", session.display);
            Ok(Box::new(LinuxXFixesSource::new(None)))
        }
        Some(_) => Err(PlatformError::Unavailable(
            "Pure Wayland sessions do not expose the system cursor to other clients.".into(),
        )),
        None => Err(PlatformError::Unavailable(
            "No display server detected. Set DISPLAY or `platform.x11_display`.".into(),
        )),
    }
}
