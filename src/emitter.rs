//! Event-emitter wrapper around `CursorMonitor`.
//!
//! `CursorEmitter` owns a monitor whose host-thread callback fans each cursor
//! change out to any number of listeners, in registration order.
//!
//! Listeners run on the monitor's host thread. The registry lock is not held
//! while a listener runs, so a listener may add or remove listeners; the
//! change applies from the next event.

use std::sync::mpsc::{self, Receiver};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::cursor::CursorType;
use crate::monitor::{CursorMonitor, CursorMonitorBuilder, MonitorError};

/// Identifies a registered listener for `CursorEmitter::off`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

type Listener = Arc<Mutex<dyn FnMut(CursorType) + Send>>;

struct Entry {
    id: ListenerId,
    once: bool,
    listener: Listener,
}

#[derive(Default)]
struct Registry {
    next_id: u64,
    entries: Vec<Entry>,
}

/// A `CursorMonitor` with a listener registry.
pub struct CursorEmitter {
    registry: Arc<Mutex<Registry>>,
    monitor: CursorMonitor,
}

impl CursorEmitter {
    /// Emitter over the platform cursor source with default settings.
    pub fn new() -> Result<Self, MonitorError> {
        Self::with_builder(CursorMonitorBuilder::new())
    }

    /// Emitter over a monitor configured by `builder`. The emitter always
    /// delivers on a dedicated host thread.
    pub fn with_builder(builder: CursorMonitorBuilder) -> Result<Self, MonitorError> {
        let registry = Arc::new(Mutex::new(Registry::default()));
        let dispatch = Arc::clone(&registry);
        let monitor = builder.spawn(move |cursor| emit(&dispatch, cursor))?;
        Ok(Self { registry, monitor })
    }

    /// Calls `listener` for every cursor change.
    pub fn on_change<F>(&self, listener: F) -> ListenerId
    where
        F: FnMut(CursorType) + Send + 'static,
    {
        self.add(listener, false)
    }

    /// Calls `listener` for the next cursor change only.
    pub fn once<F>(&self, listener: F) -> ListenerId
    where
        F: FnMut(CursorType) + Send + 'static,
    {
        self.add(listener, true)
    }

    /// Removes a listener. Returns false if it was not registered.
    pub fn off(&self, id: ListenerId) -> bool {
        let mut registry = lock(self.registry.as_ref());
        let before = registry.entries.len();
        registry.entries.retain(|entry| entry.id != id);
        registry.entries.len() != before
    }

    pub fn listener_count(&self) -> usize {
        lock(self.registry.as_ref()).entries.len()
    }

    /// Registers a channel listener and returns its receiving end.
    pub fn subscribe(&self) -> (ListenerId, Receiver<CursorType>) {
        let (tx, rx) = mpsc::channel();
        let id = self.on_change(move |cursor| {
            let _ = tx.send(cursor);
        });
        (id, rx)
    }

    pub fn start(&self) -> Result<(), MonitorError> {
        self.monitor.start()
    }

    pub fn stop(&self) -> Result<(), MonitorError> {
        self.monitor.stop()
    }

    pub fn is_running(&self) -> bool {
        self.monitor.is_running()
    }

    fn add<F>(&self, listener: F, once: bool) -> ListenerId
    where
        F: FnMut(CursorType) + Send + 'static,
    {
        let mut registry = lock(self.registry.as_ref());
        let id = ListenerId(registry.next_id);
        registry.next_id += 1;
        registry.entries.push(Entry {
            id,
            once,
            listener: Arc::new(Mutex::new(listener)),
        });
        id
    }
}

/// A panicking listener must not disable the registry or itself.
fn lock<T: ?Sized>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Runs on the host thread for every forwarded cursor change.
fn emit(registry: &Mutex<Registry>, cursor: CursorType) {
    let snapshot: Vec<Listener> = {
        let mut registry = lock(registry);
        let snapshot = registry
            .entries
            .iter()
            .map(|entry| Arc::clone(&entry.listener))
            .collect();
        registry.entries.retain(|entry| !entry.once);
        snapshot
    };

    for listener in snapshot {
        let mut listener = lock(listener.as_ref());
        (&mut *listener)(cursor);
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::fake::{FakeHandle, FakeSource};
    use pretty_assertions::assert_eq;
    use std::time::Duration;

    const WAIT: Duration = Duration::from_secs(5);

    fn emitter() -> (CursorEmitter, FakeHandle) {
        let (source, tap) = FakeSource::new();
        let emitter =
            CursorEmitter::with_builder(CursorMonitor::builder().source(Box::new(source))).unwrap();
        (emitter, tap)
    }

    #[test]
    fn listeners_receive_changes_in_registration_order() {
        let (emitter, tap) = emitter();
        let (tx, rx) = mpsc::channel();
        let first = tx.clone();
        emitter.on_change(move |c| first.send(("first", c)).unwrap());
        emitter.on_change(move |c| tx.send(("second", c)).unwrap());

        emitter.start().unwrap();
        tap.emit(CursorType::Pointer);

        assert_eq!(rx.recv_timeout(WAIT).unwrap(), ("first", CursorType::Pointer));
        assert_eq!(rx.recv_timeout(WAIT).unwrap(), ("second", CursorType::Pointer));
    }

    #[test]
    fn once_listener_fires_a_single_time() {
        let (emitter, tap) = emitter();
        let (tx, rx) = mpsc::channel();
        emitter.once(move |c| tx.send(c).unwrap());
        let (_, all) = emitter.subscribe();
        assert_eq!(emitter.listener_count(), 2);

        emitter.start().unwrap();
        tap.emit(CursorType::Text);
        tap.emit(CursorType::Default);

        assert_eq!(all.recv_timeout(WAIT).unwrap(), CursorType::Text);
        assert_eq!(all.recv_timeout(WAIT).unwrap(), CursorType::Default);
        assert_eq!(rx.recv_timeout(WAIT).unwrap(), CursorType::Text);
        assert!(rx.try_recv().is_err());
        assert_eq!(emitter.listener_count(), 1);
    }

    #[test]
    fn off_removes_listener() {
        let (emitter, tap) = emitter();
        let (removed_id, removed) = emitter.subscribe();
        let (_, kept) = emitter.subscribe();

        assert!(emitter.off(removed_id));
        assert!(!emitter.off(removed_id));

        emitter.start().unwrap();
        tap.emit(CursorType::Move);
        assert_eq!(kept.recv_timeout(WAIT).unwrap(), CursorType::Move);
        assert!(removed.try_recv().is_err());
    }

    #[test]
    fn listener_may_register_another_listener() {
        let (source, tap) = FakeSource::new();
        let emitter = Arc::new(
            CursorEmitter::with_builder(CursorMonitor::builder().source(Box::new(source))).unwrap(),
        );
        let (tx, rx) = mpsc::channel();

        let inner = Arc::downgrade(&emitter);
        emitter.once(move |_| {
            if let Some(emitter) = inner.upgrade() {
                let tx = tx.clone();
                emitter.on_change(move |c| tx.send(c).unwrap());
            }
        });
        let (_, all) = emitter.subscribe();

        emitter.start().unwrap();
        tap.emit(CursorType::Default);
        assert_eq!(all.recv_timeout(WAIT).unwrap(), CursorType::Default);
        tap.emit(CursorType::Wait);
        assert_eq!(all.recv_timeout(WAIT).unwrap(), CursorType::Wait);

        // Registered during the first event; sees only the second.
        assert_eq!(rx.recv_timeout(WAIT).unwrap(), CursorType::Wait);
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn listener_may_drop_the_last_emitter_handle() {
        let (source, tap) = FakeSource::new();
        let emitter = Arc::new(
            CursorEmitter::with_builder(CursorMonitor::builder().source(Box::new(source))).unwrap(),
        );
        let slot = Arc::new(Mutex::new(Some(Arc::clone(&emitter))));
        let (tx, rx) = mpsc::channel();
        {
            let slot = Arc::clone(&slot);
            emitter.once(move |_| {
                drop(slot.lock().unwrap().take());
                tx.send(()).unwrap();
            });
        }

        emitter.start().unwrap();
        drop(emitter);
        tap.emit(CursorType::Pointer);

        rx.recv_timeout(WAIT).unwrap();
        assert!(!tap.is_active());
    }

    #[test]
    fn start_stop_delegate_to_monitor() {
        let (emitter, tap) = emitter();
        assert!(!emitter.is_running());
        emitter.start().unwrap();
        assert!(emitter.is_running());
        assert!(tap.is_active());
        emitter.stop().unwrap();
        assert!(!emitter.is_running());
        assert!(!tap.is_active());
    }
}
