//! macOS platform backend.
//!
//! Capture: passive CGEventTap (session level) + NSCursor queries via
//! `MacOSCursorSource`.
//!
//! Listen-only pointer taps do not need Accessibility permission on current
//! macOS releases, but managed machines may still block them. If
//! `CGEventTapCreate` fails, `start()` returns `PlatformError::PermissionDenied`.
//! Guide the user to:
//!   System Settings > Privacy & Security > Input Monitoring

mod event_tap;
mod nscursor;

use event_tap::MacOSCursorSource;

use crate::platform::{CursorSource, PlatformError, PlatformOptions};

// ---------------------------------------------------------------------------
// Factory: cursor source
// ---------------------------------------------------------------------------

/// Returns the CGEventTap-based cursor source.
///
/// The tap is created in `start()` so that `new()` always succeeds.
pub fn create_cursor_source(
    options: &PlatformOptions,
) -> Result<Box<dyn CursorSource>, PlatformError> {
    Ok(Box::new(MacOSCursorSource::new(options.query_interval_ms)))
}
