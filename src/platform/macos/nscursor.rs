//! NSCursor queries.
//!
//! `+[NSCursor currentSystemCursor]` returns a fresh NSCursor instance on
//! every call, so it never compares pointer-equal to the shared singletons
//! (`arrowCursor`, `IBeamCursor`, ...). `CursorMatcher` first tries
//! `isEqual:` and then falls back to comparing TIFF representations of the
//! cursor images, which are cached once per matcher.
//!
//! Must be created and used on a single thread (the tap's run loop thread);
//! every query runs inside its own autorelease pool.

use objc::rc::{autoreleasepool, StrongPtr};
use objc::runtime::{Class, Object, BOOL, NO};
use objc::{msg_send, sel, sel_impl};

use crate::cursor::CursorType;

// Loads AppKit so that the NSCursor class is registered with the runtime.
#[link(name = "AppKit", kind = "framework")]
extern "C" {}

/// Fetches a shared system cursor by class-method selector.
macro_rules! system_cursor {
    ($class:expr, $selector:ident) => {{
        let cursor: *mut Object = msg_send![$class, $selector];
        cursor
    }};
}

// ---------------------------------------------------------------------------
// CursorMatcher
// ---------------------------------------------------------------------------

struct Reference {
    cursor_type: CursorType,
    cursor: StrongPtr,
    /// TIFF data of the cursor image; `None` if AppKit returned no image.
    tiff: Option<StrongPtr>,
}

/// Maps the current system cursor onto `CursorType`.
pub struct CursorMatcher {
    class: &'static Class,
    references: Vec<Reference>,
}

impl CursorMatcher {
    /// Returns `None` when AppKit's NSCursor class is not available.
    pub fn new() -> Option<Self> {
        let class = Class::get("NSCursor")?;

        let references = autoreleasepool(|| unsafe {
            let table: [(*mut Object, CursorType); 16] = [
                (system_cursor!(class, arrowCursor), CursorType::Default),
                (system_cursor!(class, IBeamCursor), CursorType::Text),
                (
                    system_cursor!(class, IBeamCursorForVerticalLayout),
                    CursorType::VerticalText,
                ),
                (system_cursor!(class, pointingHandCursor), CursorType::Pointer),
                (system_cursor!(class, crosshairCursor), CursorType::Crosshair),
                (system_cursor!(class, openHandCursor), CursorType::Grab),
                (system_cursor!(class, closedHandCursor), CursorType::Grabbing),
                (
                    system_cursor!(class, operationNotAllowedCursor),
                    CursorType::NotAllowed,
                ),
                (system_cursor!(class, resizeLeftRightCursor), CursorType::EwResize),
                (system_cursor!(class, resizeLeftCursor), CursorType::EwResize),
                (system_cursor!(class, resizeRightCursor), CursorType::EwResize),
                (system_cursor!(class, resizeUpDownCursor), CursorType::NsResize),
                (system_cursor!(class, resizeUpCursor), CursorType::NsResize),
                (system_cursor!(class, resizeDownCursor), CursorType::NsResize),
                (system_cursor!(class, contextualMenuCursor), CursorType::ContextMenu),
                (system_cursor!(class, dragCopyCursor), CursorType::Copy),
            ];

            let mut references: Vec<Reference> = table
                .iter()
                .filter(|(cursor, _)| !cursor.is_null())
                .map(|&(cursor, cursor_type)| Reference {
                    cursor_type,
                    cursor: StrongPtr::retain(cursor),
                    tiff: tiff_of(cursor),
                })
                .collect();

            let link = system_cursor!(class, dragLinkCursor);
            if !link.is_null() {
                references.push(Reference {
                    cursor_type: CursorType::Alias,
                    cursor: StrongPtr::retain(link),
                    tiff: tiff_of(link),
                });
            }
            references
        });

        log::debug!("nscursor: {} reference cursors loaded", references.len());
        Some(Self { class, references })
    }

    /// Returns the cursor the window server is currently displaying.
    pub fn current(&self) -> CursorType {
        autoreleasepool(|| unsafe {
            let current: *mut Object = msg_send![self.class, currentSystemCursor];
            if current.is_null() {
                return CursorType::Unknown;
            }

            for reference in &self.references {
                let equal: BOOL = msg_send![current, isEqual: *reference.cursor];
                if equal != NO {
                    return reference.cursor_type;
                }
            }

            let Some(current_tiff) = tiff_of(current) else {
                return CursorType::Unknown;
            };
            for reference in &self.references {
                if let Some(tiff) = &reference.tiff {
                    let equal: BOOL = msg_send![*current_tiff, isEqualToData: **tiff];
                    if equal != NO {
                        return reference.cursor_type;
                    }
                }
            }
            CursorType::Unknown
        })
    }
}

/// Retains the TIFF representation of a cursor's image.
unsafe fn tiff_of(cursor: *mut Object) -> Option<StrongPtr> {
    let image: *mut Object = msg_send![cursor, image];
    if image.is_null() {
        return None;
    }
    let data: *mut Object = msg_send![image, TIFFRepresentation];
    if data.is_null() {
        None
    } else {
        Some(StrongPtr::retain(data))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
