//! X cursor name → `CursorType` mapping.
//!
//! Cursor themes expose the same shape under several names: the legacy
//! X11 core font names (`left_ptr`, `xterm`, `hand2`), the freedesktop
//! cursor-spec names (`pointer`, `text`, `col-resize`), and the Qt/KDE
//! aliases (`size_hor`, `whats_this`). Toolkits pick whichever they know,
//! so all of them are listed. Hashed names (hex digests used by some
//! themes for legacy bitmaps) fall through to `Unknown`.

use crate::cursor::CursorType;

/// Maps an X cursor atom name to a `CursorType`.
///
/// Matching is exact after ASCII lowercasing; `_` and `-` are not treated as
/// equivalent because themes use both spellings for different cursors.
pub fn cursor_from_x_name(name: &str) -> CursorType {
    let lower = name.to_ascii_lowercase();
    match lower.as_str() {
        "left_ptr" | "default" | "arrow" | "top_left_arrow" | "right_ptr" => CursorType::Default,

        "xterm" | "text" | "ibeam" => CursorType::Text,
        "vertical-text" => CursorType::VerticalText,

        "hand" | "hand1" | "hand2" | "pointer" | "pointing_hand" => CursorType::Pointer,

        "crosshair" | "cross" | "tcross" | "cross_reverse" | "diamond_cross" => {
            CursorType::Crosshair
        }

        "openhand" | "grab" | "dnd-none" => CursorType::Grab,
        "closedhand" | "grabbing" | "dnd-move" => CursorType::Grabbing,

        "not-allowed" | "crossed_circle" | "forbidden" | "no-drop" | "circle"
        | "dnd-no-drop" => CursorType::NotAllowed,

        "sb_h_double_arrow" | "h_double_arrow" | "ew-resize" | "col-resize" | "e-resize"
        | "w-resize" | "left_side" | "right_side" | "size_hor" | "split_h" => CursorType::EwResize,

        "sb_v_double_arrow" | "v_double_arrow" | "ns-resize" | "row-resize" | "n-resize"
        | "s-resize" | "top_side" | "bottom_side" | "size_ver" | "split_v" => CursorType::NsResize,

        "nwse-resize" | "nw-resize" | "se-resize" | "top_left_corner" | "bottom_right_corner"
        | "size_fdiag" => CursorType::NwseResize,

        "nesw-resize" | "ne-resize" | "sw-resize" | "top_right_corner" | "bottom_left_corner"
        | "size_bdiag" => CursorType::NeswResize,

        "fleur" | "move" | "all-scroll" | "size_all" => CursorType::Move,

        "watch" | "wait" => CursorType::Wait,
        "left_ptr_watch" | "progress" | "half-busy" => CursorType::Progress,

        "question_arrow" | "help" | "whats_this" | "left_ptr_help" => CursorType::Help,
        "context-menu" => CursorType::ContextMenu,
        "copy" | "dnd-copy" => CursorType::Copy,
        "alias" | "link" | "dnd-link" => CursorType::Alias,

        _ => CursorType::Unknown,
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
