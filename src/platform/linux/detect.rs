//! Linux session detection for the XFixes backend.
//!
//! XFixes needs an X server. Under a Wayland compositor that is XWayland,
//! which only sees cursors set by X clients; native Wayland windows are
//! invisible to us.

use std::env;

// ---------------------------------------------------------------------------
// Display server type
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisplayServer {
    /// Only `DISPLAY` is set.
    X11,
    /// Both `WAYLAND_DISPLAY` and `DISPLAY` are set.
    XWayland,
    /// Only `WAYLAND_DISPLAY` is set.
    Wayland,
}

impl DisplayServer {
    /// True when an X server is reachable for XFixes.
    pub fn has_x_server(self) -> bool {
        matches!(self, DisplayServer::X11 | DisplayServer::XWayland)
    }
}

// ---------------------------------------------------------------------------
// Session environment
// ---------------------------------------------------------------------------

/// The display variables of the current session. Empty values count as unset.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionEnv {
    pub display: Option<String>,
    pub wayland_display: Option<String>,
}

impl SessionEnv {
    pub fn from_env() -> Self {
        Self {
            display: non_empty_var("DISPLAY"),
            wayland_display: non_empty_var("WAYLAND_DISPLAY"),
        }
    }

    /// `None` outside any graphical session.
    pub fn server(&self) -> Option<DisplayServer> {
        match (self.wayland_display.is_some(), self.display.is_some()) {
            (true, true) => Some(DisplayServer::XWayland),
            (true, false) => Some(DisplayServer::Wayland),
            (false, true) => Some(DisplayServer::X11),
            (false, false) => None,
        }
    }
}

fn non_empty_var(name: &str) -> Option<String> {
    env::var(name).ok().filter(|v| !v.is_empty())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
