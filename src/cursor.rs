//! Platform-agnostic cursor vocabulary.
//!
//! Every backend maps its native cursor representation (NSCursor singleton,
//! X cursor atom name, Win32 HCURSOR) onto `CursorType`. Names follow the CSS
//! `cursor` keywords so a renderer can use them without a lookup table.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// CursorType
// ---------------------------------------------------------------------------

/// The shape of the system cursor as reported by a cursor source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CursorType {
    /// Standard arrow.
    Default,
    /// Cursor hidden by the foreground application.
    None,
    /// I-beam over editable or selectable text.
    Text,
    /// I-beam for vertical text layout.
    VerticalText,
    /// Pointing hand over a link or button.
    Pointer,
    Crosshair,
    /// Open hand: something can be dragged.
    Grab,
    /// Closed hand: something is being dragged.
    Grabbing,
    NotAllowed,
    EwResize,
    NsResize,
    NwseResize,
    NeswResize,
    Move,
    /// Busy; input is blocked.
    Wait,
    /// Busy in the background; input is still accepted.
    Progress,
    Help,
    ContextMenu,
    Copy,
    Alias,
    /// A custom or unrecognised cursor.
    Unknown,
}

impl CursorType {
    /// Every variant, in declaration order.
    pub const ALL: [CursorType; 21] = [
        CursorType::Default,
        CursorType::None,
        CursorType::Text,
        CursorType::VerticalText,
        CursorType::Pointer,
        CursorType::Crosshair,
        CursorType::Grab,
        CursorType::Grabbing,
        CursorType::NotAllowed,
        CursorType::EwResize,
        CursorType::NsResize,
        CursorType::NwseResize,
        CursorType::NeswResize,
        CursorType::Move,
        CursorType::Wait,
        CursorType::Progress,
        CursorType::Help,
        CursorType::ContextMenu,
        CursorType::Copy,
        CursorType::Alias,
        CursorType::Unknown,
    ];

    /// CSS keyword for this cursor.
    pub fn as_str(self) -> &'static str {
        match self {
            CursorType::Default => "default",
            CursorType::None => "none",
            CursorType::Text => "text",
            CursorType::VerticalText => "vertical-text",
            CursorType::Pointer => "pointer",
            CursorType::Crosshair => "crosshair",
            CursorType::Grab => "grab",
            CursorType::Grabbing => "grabbing",
            CursorType::NotAllowed => "not-allowed",
            CursorType::EwResize => "ew-resize",
            CursorType::NsResize => "ns-resize",
            CursorType::NwseResize => "nwse-resize",
            CursorType::NeswResize => "nesw-resize",
            CursorType::Move => "move",
            CursorType::Wait => "wait",
            CursorType::Progress => "progress",
            CursorType::Help => "help",
            CursorType::ContextMenu => "context-menu",
            CursorType::Copy => "copy",
            CursorType::Alias => "alias",
            CursorType::Unknown => "unknown",
        }
    }

    /// True for cursors shown over text input.
    pub fn is_text_input(self) -> bool {
        matches!(self, CursorType::Text | CursorType::VerticalText)
    }

    /// True for cursors that indicate a clickable element.
    pub fn is_clickable(self) -> bool {
        matches!(self, CursorType::Pointer | CursorType::Alias)
    }

    /// True while the system or application is busy.
    pub fn is_busy(self) -> bool {
        matches!(self, CursorType::Wait | CursorType::Progress)
    }

    pub fn is_resize(self) -> bool {
        matches!(
            self,
            CursorType::EwResize
                | CursorType::NsResize
                | CursorType::NwseResize
                | CursorType::NeswResize
        )
    }
}

impl fmt::Display for CursorType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Returned by `CursorType::from_str` for names outside the vocabulary.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown cursor name: {0:?}")]
pub struct UnknownCursorName(pub String);

impl FromStr for CursorType {
    type Err = UnknownCursorName;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        CursorType::ALL
            .iter()
            .copied()
            .find(|c| c.as_str() == s)
            .ok_or_else(|| UnknownCursorName(s.to_string()))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn names_parse_back_to_the_same_variant() {
        for cursor in CursorType::ALL {
            assert_eq!(cursor.as_str().parse::<CursorType>(), Ok(cursor));
        }
    }

    #[test]
    fn names_are_unique() {
        let mut names: Vec<&str> = CursorType::ALL.iter().map(|c| c.as_str()).collect();
        names.sort_unstable();
        names.dedup();
        assert_eq!(names.len(), CursorType::ALL.len());
    }

    #[test]
    fn unknown_name_is_rejected() {
        let err = "left_ptr".parse::<CursorType>().unwrap_err();
        assert_eq!(err, UnknownCursorName("left_ptr".into()));
    }

    #[test]
    fn serde_uses_css_keywords() {
        let json = serde_json::to_string(&CursorType::NotAllowed).unwrap();
        assert_eq!(json, "\"not-allowed\"");
        let back: CursorType = serde_json::from_str("\"vertical-text\"").unwrap();
        assert_eq!(back, CursorType::VerticalText);
    }

    #[test]
    fn display_matches_as_str() {
        assert_eq!(CursorType::EwResize.to_string(), "ew-resize");
    }

    #[test]
    fn classification() {
        assert!(CursorType::Text.is_text_input());
        assert!(!CursorType::Pointer.is_text_input());
        assert!(CursorType::Pointer.is_clickable());
        assert!(CursorType::Progress.is_busy());
        assert!(CursorType::NeswResize.is_resize());
        assert!(!CursorType::Move.is_resize());
    }
}
