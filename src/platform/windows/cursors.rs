//! Win32 cursor handle → `CursorType` mapping.
//!
//! Standard cursors loaded with `LoadCursorW(NULL, IDC_*)` are shared
//! system-wide, so the handle returned by `GetCursorInfo` compares equal to
//! the one we load. Application cursors (custom bitmaps) have their own
//! handles and map to `CursorType::Unknown`.

use std::ptr;

use windows_sys::core::PCWSTR;
use windows_sys::Win32::UI::WindowsAndMessaging::{
    GetCursorInfo, LoadCursorW, CURSORINFO, CURSOR_SHOWING, IDC_APPSTARTING, IDC_ARROW,
    IDC_CROSS, IDC_HAND, IDC_HELP, IDC_IBEAM, IDC_NO, IDC_SIZEALL, IDC_SIZENESW, IDC_SIZENS,
    IDC_SIZENWSE, IDC_SIZEWE, IDC_WAIT,
};

use crate::cursor::CursorType;

const STANDARD_CURSORS: [(PCWSTR, CursorType); 13] = [
    (IDC_ARROW, CursorType::Default),
    (IDC_IBEAM, CursorType::Text),
    (IDC_HAND, CursorType::Pointer),
    (IDC_CROSS, CursorType::Crosshair),
    (IDC_NO, CursorType::NotAllowed),
    (IDC_SIZEWE, CursorType::EwResize),
    (IDC_SIZENS, CursorType::NsResize),
    (IDC_SIZENWSE, CursorType::NwseResize),
    (IDC_SIZENESW, CursorType::NeswResize),
    (IDC_SIZEALL, CursorType::Move),
    (IDC_WAIT, CursorType::Wait),
    (IDC_APPSTARTING, CursorType::Progress),
    (IDC_HELP, CursorType::Help),
];

/// Handles of the shared system cursors. Stored as `isize` so the table is
/// `Send` and can live in the hook's global state.
pub struct SystemCursors {
    handles: Vec<(isize, CursorType)>,
}

impl SystemCursors {
    pub fn load() -> Self {
        let handles = STANDARD_CURSORS
            .iter()
            .filter_map(|&(id, cursor_type)| {
                let handle = unsafe { LoadCursorW(ptr::null_mut(), id) };
                if handle.is_null() {
                    log::debug!("cursors: LoadCursorW failed for {cursor_type}");
                    None
                } else {
                    Some((handle as isize, cursor_type))
                }
            })
            .collect();
        Self { handles }
    }

    /// Looks up a cursor handle.
    pub fn classify(&self, handle: isize) -> CursorType {
        self.handles
            .iter()
            .find(|(h, _)| *h == handle)
            .map(|(_, cursor_type)| *cursor_type)
            .unwrap_or(CursorType::Unknown)
    }

    /// Reads the cursor currently shown on screen.
    pub fn current(&self) -> CursorType {
        let mut info: CURSORINFO = unsafe { std::mem::zeroed() };
        info.cbSize = std::mem::size_of::<CURSORINFO>() as u32;

        if unsafe { GetCursorInfo(&mut info) } == 0 {
            log::debug!("cursors: GetCursorInfo failed");
            return CursorType::Unknown;
        }
        if info.flags & CURSOR_SHOWING == 0 {
            return CursorType::None;
        }
        self.classify(info.hCursor as isize)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
