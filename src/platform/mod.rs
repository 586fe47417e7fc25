//! Platform abstraction layer.
//!
//! Defines the `CursorSource` trait and its error type. Each OS backend lives
//! in a child module and is selected at compile time by
//! `create_cursor_source`.

#[cfg(target_os = "linux")]
mod linux;
#[cfg(target_os = "macos")]
mod macos;
#[cfg(target_os = "windows")]
mod windows;

#[cfg(test)]
pub(crate) mod fake;

use serde::{Deserialize, Serialize};

use crate::cursor::CursorType;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors raised while creating or driving a native cursor source.
#[derive(Debug, thiserror::Error)]
pub enum PlatformError {
    /// The OS refused to install the tap (missing Accessibility permission,
    /// display access denied).
    #[error("permission denied: {0}")]
    PermissionDenied(String),
    /// No backend can observe the cursor in this session.
    #[error("unavailable: {0}")]
    Unavailable(String),
    #[error("{0}")]
    Other(String),
}

// ---------------------------------------------------------------------------
// Options
// ---------------------------------------------------------------------------

/// Backend tuning shared by all platforms.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PlatformOptions {
    /// Minimum spacing between cursor queries (macOS) or the poll period
    /// (Windows), in milliseconds.
    pub query_interval_ms: u64,
    /// X display to connect to instead of `$DISPLAY` (Linux only).
    pub x11_display: Option<String>,
}

impl Default for PlatformOptions {
    fn default() -> Self {
        Self {
            query_interval_ms: 50,
            x11_display: None,
        }
    }
}

// ---------------------------------------------------------------------------
// CursorSource
// ---------------------------------------------------------------------------

/// Callback invoked on the OS thread with each observed cursor.
pub type CursorSink = Box<dyn Fn(CursorType) + Send>;

/// A native event tap that reports the system cursor.
///
/// `start` reports the cursor visible at start once, then reports whenever the
/// OS signals cursor or pointer activity. The same type may be reported many
/// times in a row; callers filter duplicates.
///
/// After `stop` returns the sink has been dropped and is never invoked again.
/// `stop` on an idle source is a no-op.
pub trait CursorSource: Send {
    fn start(&mut self, sink: CursorSink) -> Result<(), PlatformError>;
    fn stop(&mut self) -> Result<(), PlatformError>;
}

// ---------------------------------------------------------------------------
// Factory
// ---------------------------------------------------------------------------

#[cfg(target_os = "linux")]
pub use linux::create_cursor_source;
#[cfg(target_os = "macos")]
pub use macos::create_cursor_source;
#[cfg(target_os = "windows")]
pub use windows::create_cursor_source;

/// No cursor backend exists for this target.
#[cfg(not(any(target_os = "linux", target_os = "macos", target_os = "windows")))]
pub fn create_cursor_source(
    _options: &PlatformOptions,
) -> Result<Box<dyn CursorSource>, PlatformError> {
    Err(PlatformError::Unavailable(
        "cursor monitoring is not supported on this platform".into(),
    ))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_options() {
        let opts = PlatformOptions::default();
        assert_eq!(opts.query_interval_ms, 50);
        assert!(opts.x11_display.is_none());
    }

    #[test]
    fn error_messages_carry_detail() {
        let err = PlatformError::PermissionDenied("grant Accessibility".into());
        assert_eq!(err.to_string(), "permission denied: grant Accessibility");
    }
}
