//! Windows platform backend: WH_MOUSE_LL hook + GetCursorInfo.
//!
//! The factory returns a `WindowsCursorSource`; see `hook` for the threading
//! model and `cursors` for handle classification.

mod cursors;
mod hook;

use hook::WindowsCursorSource;

use crate::platform::{CursorSource, PlatformError, PlatformOptions};

/// Returns a `WindowsCursorSource` backed by `WH_MOUSE_LL`.
pub fn create_cursor_source(
    options: &PlatformOptions,
) -> Result<Box<dyn CursorSource>, PlatformError> {
    Ok(Box::new(WindowsCursorSource::new(options.query_interval_ms)))
}
