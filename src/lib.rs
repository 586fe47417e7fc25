//! Cross-platform system cursor change monitor.
//!
//! A native event tap runs on a background OS thread and reports the shape of
//! the system cursor. Changes are handed to a host callback through a
//! thread-safe function bridge, so the callback always runs on one host
//! thread, once per change, in order.
//!
//! # Backends
//!
//! - **macOS**: passive CGEventTap + `NSCursor currentSystemCursor`
//! - **Linux**: XFixes cursor-notify events (X11 and XWayland)
//! - **Windows**: `WH_MOUSE_LL` hook + `GetCursorInfo`
//!
//! # Example
//!
//! ```no_run
//! use cursor_monitor::CursorMonitor;
//!
//! fn main() -> Result<(), cursor_monitor::MonitorError> {
//!     let monitor = CursorMonitor::new(|cursor| println!("cursor: {cursor}"))?;
//!     monitor.start()?;
//!     std::thread::sleep(std::time::Duration::from_secs(10));
//!     monitor.stop()?;
//!     Ok(())
//! }
//! ```
//!
//! To run the callback on your own thread instead, use
//! `CursorMonitor::builder().build(callback)` and pump the returned
//! `CallQueue`.

pub mod bridge;
pub mod config;
mod cursor;
mod emitter;
mod monitor;
pub mod platform;

pub use bridge::{threadsafe_function, BridgeError, CallMode, CallQueue, Dispatch, ThreadsafeFunction};
pub use config::{Config, ConfigError, MonitorConfig, OutputConfig, OutputFormat};
pub use cursor::{CursorType, UnknownCursorName};
pub use emitter::{CursorEmitter, ListenerId};
pub use monitor::{CursorMonitor, CursorMonitorBuilder, MonitorError, HOST_THREAD_NAME};
pub use platform::{create_cursor_source, CursorSink, CursorSource, PlatformError, PlatformOptions};
