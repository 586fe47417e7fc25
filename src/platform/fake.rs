//! Scripted cursor source for unit tests.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use crate::cursor::CursorType;
use crate::platform::{CursorSink, CursorSource, PlatformError};

/// Test-side handle that plays the role of the OS callback thread.
#[derive(Clone, Default)]
pub struct FakeHandle {
    sink: Arc<Mutex<Option<CursorSink>>>,
    starts: Arc<AtomicUsize>,
}

impl FakeHandle {
    /// Reports `cursor` through the installed sink. Returns false when the
    /// source is not running.
    pub fn emit(&self, cursor: CursorType) -> bool {
        match self.sink.lock().unwrap().as_ref() {
            Some(sink) => {
                sink(cursor);
                true
            }
            None => false,
        }
    }

    pub fn is_active(&self) -> bool {
        self.sink.lock().unwrap().is_some()
    }

    pub fn starts(&self) -> usize {
        self.starts.load(Ordering::SeqCst)
    }
}

pub struct FakeSource {
    handle: FakeHandle,
    fail_with_permission: bool,
}

impl FakeSource {
    pub fn new() -> (Self, FakeHandle) {
        let handle = FakeHandle::default();
        (
            Self {
                handle: handle.clone(),
                fail_with_permission: false,
            },
            handle,
        )
    }

    /// A source whose `start` always fails like a denied OS permission.
    pub fn denied() -> Self {
        Self {
            handle: FakeHandle::default(),
            fail_with_permission: true,
        }
    }
}

impl CursorSource for FakeSource {
    fn start(&mut self, sink: CursorSink) -> Result<(), PlatformError> {
        if self.fail_with_permission {
            return Err(PlatformError::PermissionDenied("fake tap refused".into()));
        }
        let mut slot = self.handle.sink.lock().unwrap();
        if slot.is_some() {
            return Err(PlatformError::Other("cursor source is already running".into()));
        }
        *slot = Some(sink);
        self.handle.starts.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn stop(&mut self) -> Result<(), PlatformError> {
        self.handle.sink.lock().unwrap().take();
        Ok(())
    }
}
