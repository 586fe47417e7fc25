//! Thread-safe function bridge.
//!
//! A `ThreadsafeFunction<T>` is a cloneable handle that background threads use
//! to schedule `callback(value)` on a single host thread. The host side is a
//! `CallQueue`, which owns the callback (so the callback itself need not be
//! `Send`) and runs queued calls in FIFO order when the host pumps it.
//!
//! Lifecycle:
//! - `close()` lets every call queued before it run, then ends the host loop.
//! - `abort()` drops every call that has not run yet and ends the host loop.
//! - Dropping the `CallQueue` makes every later `call` fail with `Closing`.
//!
//! A call that returns `Ok` runs exactly once unless the function is aborted.
//! Calls racing with `close()` either fail with `Closing` or run: the host
//! keeps draining until no `call` is between its closing check and its send.

use std::io;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender, SyncSender, TryRecvError, TrySendError};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

/// How often a blocked host re-checks the closing flag.
const CLOSE_POLL: Duration = Duration::from_millis(50);

// ---------------------------------------------------------------------------
// Public types
// ---------------------------------------------------------------------------

/// Behaviour of `call` when a bounded queue is full.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallMode {
    /// Wait for the host to make room.
    Blocking,
    /// Fail with `BridgeError::QueueFull`.
    NonBlocking,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum BridgeError {
    /// The function was closed or aborted, or the host queue is gone.
    #[error("thread-safe function is closing")]
    Closing,
    #[error("call queue is full")]
    QueueFull,
}

/// Outcome of a time-limited host pump.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dispatch {
    /// The timeout elapsed; more calls may still arrive.
    Idle,
    /// The function was closed or aborted, or every sender is gone.
    Closed,
}

// ---------------------------------------------------------------------------
// Construction
// ---------------------------------------------------------------------------

enum Message<T> {
    Call(T),
    Close,
}

enum QueueSender<T> {
    Bounded(SyncSender<Message<T>>),
    Unbounded(Sender<Message<T>>),
}

impl<T> Clone for QueueSender<T> {
    fn clone(&self) -> Self {
        match self {
            QueueSender::Bounded(tx) => QueueSender::Bounded(tx.clone()),
            QueueSender::Unbounded(tx) => QueueSender::Unbounded(tx.clone()),
        }
    }
}

#[derive(Default)]
struct Shared {
    closing: AtomicBool,
    aborted: AtomicBool,
    /// Calls that passed the closing check and have not finished sending.
    in_flight: AtomicUsize,
}

/// Creates a thread-safe function for `callback`.
///
/// `max_queue_size` bounds the number of undelivered calls; `0` means
/// unbounded.
pub fn threadsafe_function<T, F>(
    callback: F,
    max_queue_size: usize,
) -> (ThreadsafeFunction<T>, CallQueue<T, F>)
where
    F: FnMut(T),
{
    let shared = Arc::new(Shared::default());
    let (tx, rx) = if max_queue_size == 0 {
        let (tx, rx) = mpsc::channel();
        (QueueSender::Unbounded(tx), rx)
    } else {
        let (tx, rx) = mpsc::sync_channel(max_queue_size);
        (QueueSender::Bounded(tx), rx)
    };

    (
        ThreadsafeFunction {
            tx,
            shared: Arc::clone(&shared),
        },
        CallQueue {
            rx,
            callback,
            shared,
            closed: false,
        },
    )
}

// ---------------------------------------------------------------------------
// ThreadsafeFunction
// ---------------------------------------------------------------------------

/// Handle used by any thread to schedule calls on the host thread.
pub struct ThreadsafeFunction<T> {
    tx: QueueSender<T>,
    shared: Arc<Shared>,
}

impl<T> Clone for ThreadsafeFunction<T> {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<T> ThreadsafeFunction<T> {
    /// Queues `value` for delivery to the host callback.
    pub fn call(&self, value: T, mode: CallMode) -> Result<(), BridgeError> {
        // SeqCst pairs with `close` and `CallQueue::finish`: either this call
        // sees the flag, or the host sees it in flight.
        self.shared.in_flight.fetch_add(1, Ordering::SeqCst);
        let result = if self.shared.closing.load(Ordering::SeqCst) {
            Err(BridgeError::Closing)
        } else {
            self.send(Message::Call(value), mode)
        };
        self.shared.in_flight.fetch_sub(1, Ordering::SeqCst);
        result
    }

    fn send(&self, message: Message<T>, mode: CallMode) -> Result<(), BridgeError> {
        match (&self.tx, mode) {
            (QueueSender::Unbounded(tx), _) => tx.send(message).map_err(|_| BridgeError::Closing),
            (QueueSender::Bounded(tx), CallMode::Blocking) => {
                tx.send(message).map_err(|_| BridgeError::Closing)
            }
            (QueueSender::Bounded(tx), CallMode::NonBlocking) => {
                tx.try_send(message).map_err(|e| match e {
                    TrySendError::Full(_) => BridgeError::QueueFull,
                    TrySendError::Disconnected(_) => BridgeError::Closing,
                })
            }
        }
    }

    /// Stops accepting calls. Calls already queued are still delivered.
    pub fn close(&self) {
        if self.shared.closing.swap(true, Ordering::SeqCst) {
            return;
        }
        // Never block here: the host thread itself may be closing. If a
        // bounded queue is full the host notices the flag once it drains.
        let _ = match &self.tx {
            QueueSender::Unbounded(tx) => tx.send(Message::Close).map_err(|_| ()),
            QueueSender::Bounded(tx) => tx.try_send(Message::Close).map_err(|_| ()),
        };
    }

    /// Stops accepting calls and discards every call not yet delivered.
    pub fn abort(&self) {
        self.shared.aborted.store(true, Ordering::Release);
        self.close();
    }

    pub fn is_closing(&self) -> bool {
        self.shared.closing.load(Ordering::SeqCst)
    }
}

// ---------------------------------------------------------------------------
// CallQueue
// ---------------------------------------------------------------------------

/// Host side of the bridge. Owns the callback and runs queued calls.
pub struct CallQueue<T, F> {
    rx: Receiver<Message<T>>,
    callback: F,
    shared: Arc<Shared>,
    closed: bool,
}

impl<T, F> CallQueue<T, F>
where
    F: FnMut(T),
{
    /// Runs every call already queued without blocking. Returns how many ran.
    pub fn dispatch_pending(&mut self) -> usize {
        let mut delivered = 0;
        while !self.closed {
            match self.rx.try_recv() {
                Ok(Message::Call(value)) => delivered += usize::from(self.deliver(value)),
                Ok(Message::Close) => delivered += self.finish(),
                Err(TryRecvError::Empty) => {
                    // A full bounded queue may have had no room for the
                    // close marker.
                    if self.shared.closing.load(Ordering::SeqCst) {
                        delivered += self.finish();
                    }
                    break;
                }
                Err(TryRecvError::Disconnected) => self.closed = true,
            }
        }
        delivered
    }

    /// Blocks, delivering calls, until the function is closed or aborted or
    /// every `ThreadsafeFunction` handle has been dropped.
    pub fn run(&mut self) {
        while !self.closed {
            self.step(CLOSE_POLL);
        }
    }

    /// Delivers calls until `timeout` elapses or the function closes.
    pub fn run_for(&mut self, timeout: Duration) -> Dispatch {
        let deadline = Instant::now() + timeout;
        while !self.closed {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Dispatch::Idle;
            }
            self.step(remaining.min(CLOSE_POLL));
        }
        Dispatch::Closed
    }

    /// True once the host loop has seen the close marker or lost every sender.
    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Waits up to `wait` for one message and handles it.
    fn step(&mut self, wait: Duration) {
        match self.rx.recv_timeout(wait) {
            Ok(Message::Call(value)) => {
                self.deliver(value);
            }
            Ok(Message::Close) => {
                self.finish();
            }
            Err(RecvTimeoutError::Timeout) => {
                if self.shared.closing.load(Ordering::SeqCst) {
                    self.finish();
                }
            }
            Err(RecvTimeoutError::Disconnected) => self.closed = true,
        }
    }

    /// Drains whatever is still queued, including calls still being sent,
    /// then marks the queue closed.
    fn finish(&mut self) -> usize {
        let mut delivered = 0;
        loop {
            let settled = self.shared.in_flight.load(Ordering::SeqCst) == 0;
            while let Ok(message) = self.rx.try_recv() {
                if let Message::Call(value) = message {
                    delivered += usize::from(self.deliver(value));
                }
            }
            if settled {
                break;
            }
            thread::yield_now();
        }
        self.closed = true;
        log::debug!("bridge: call queue closed");
        delivered
    }

    /// Invokes the callback once. Returns false if the call was discarded.
    fn deliver(&mut self, value: T) -> bool {
        if self.shared.aborted.load(Ordering::Acquire) {
            return false;
        }
        let callback = &mut self.callback;
        if panic::catch_unwind(AssertUnwindSafe(|| callback(value))).is_err() {
            log::error!("bridge: host callback panicked; continuing with the next call");
        }
        true
    }
}

impl<T, F> CallQueue<T, F>
where
    T: Send + 'static,
    F: FnMut(T) + Send + 'static,
{
    /// Moves the queue onto a dedicated host thread that runs until closed.
    pub fn spawn(self, name: &str) -> io::Result<JoinHandle<()>> {
        thread::Builder::new().name(name.to_string()).spawn(move || {
            let mut queue = self;
            queue.run();
        })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::cell::RefCell;
    use std::rc::Rc;
    use std::sync::Mutex;

    #[test]
    fn dispatch_pending_runs_calls_in_order() {
        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&seen);
        let (tsfn, mut queue) = threadsafe_function(move |v: u32| sink.borrow_mut().push(v), 0);

        for v in 1..=3 {
            tsfn.call(v, CallMode::NonBlocking).unwrap();
        }
        assert_eq!(queue.dispatch_pending(), 3);
        assert_eq!(*seen.borrow(), vec![1, 2, 3]);
        assert_eq!(queue.dispatch_pending(), 0);
    }

    #[test]
    fn non_blocking_call_on_full_queue_fails() {
        let (tsfn, mut queue) = threadsafe_function(|_: u8| {}, 1);
        tsfn.call(1, CallMode::NonBlocking).unwrap();
        assert_eq!(tsfn.call(2, CallMode::NonBlocking), Err(BridgeError::QueueFull));
        assert_eq!(queue.dispatch_pending(), 1);
        assert!(tsfn.call(3, CallMode::NonBlocking).is_ok());
    }

    #[test]
    fn close_delivers_queued_calls_then_stops() {
        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&seen);
        let (tsfn, mut queue) = threadsafe_function(move |v: u32| sink.borrow_mut().push(v), 0);

        tsfn.call(1, CallMode::Blocking).unwrap();
        tsfn.call(2, CallMode::Blocking).unwrap();
        tsfn.close();
        assert_eq!(tsfn.call(3, CallMode::Blocking), Err(BridgeError::Closing));

        queue.run();
        assert!(queue.is_closed());
        assert_eq!(*seen.borrow(), vec![1, 2]);
    }

    #[test]
    fn close_on_full_bounded_queue_still_ends_the_host_loop() {
        let count = Rc::new(RefCell::new(0));
        let sink = Rc::clone(&count);
        let (tsfn, mut queue) = threadsafe_function(move |_: u8| *sink.borrow_mut() += 1, 1);

        tsfn.call(1, CallMode::NonBlocking).unwrap();
        tsfn.close();
        queue.run();
        assert_eq!(*count.borrow(), 1);
    }

    #[test]
    fn dispatch_pending_sees_close_on_full_bounded_queue() {
        let count = Rc::new(RefCell::new(0));
        let sink = Rc::clone(&count);
        let (tsfn, mut queue) = threadsafe_function(move |_: u8| *sink.borrow_mut() += 1, 1);

        tsfn.call(1, CallMode::NonBlocking).unwrap();
        // No room for the close marker.
        tsfn.close();
        assert_eq!(queue.dispatch_pending(), 1);
        assert!(queue.is_closed());
        assert_eq!(*count.borrow(), 1);
    }

    #[test]
    fn abort_discards_undelivered_calls() {
        let count = Rc::new(RefCell::new(0));
        let sink = Rc::clone(&count);
        let (tsfn, mut queue) = threadsafe_function(move |_: u8| *sink.borrow_mut() += 1, 0);

        tsfn.call(1, CallMode::Blocking).unwrap();
        tsfn.call(2, CallMode::Blocking).unwrap();
        tsfn.abort();
        assert!(tsfn.is_closing());
        assert_eq!(queue.dispatch_pending(), 0);
        assert_eq!(*count.borrow(), 0);
        assert!(queue.is_closed());
    }

    #[test]
    fn dropping_the_queue_rejects_calls() {
        let (tsfn, queue) = threadsafe_function(|_: u8| {}, 0);
        drop(queue);
        assert_eq!(tsfn.call(1, CallMode::Blocking), Err(BridgeError::Closing));
    }

    #[test]
    fn run_returns_when_every_sender_is_dropped() {
        let (tsfn, mut queue) = threadsafe_function(|_: u8| {}, 0);
        let worker = thread::spawn(move || {
            tsfn.call(7, CallMode::Blocking).unwrap();
        });
        queue.run();
        worker.join().unwrap();
        assert!(queue.is_closed());
    }

    #[test]
    fn run_for_times_out_when_idle() {
        let (_tsfn, mut queue) = threadsafe_function(|_: u8| {}, 0);
        assert_eq!(queue.run_for(Duration::from_millis(20)), Dispatch::Idle);
        assert!(!queue.is_closed());
    }

    #[test]
    fn panicking_callback_does_not_stop_delivery() {
        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&seen);
        let (tsfn, mut queue) = threadsafe_function(
            move |v: u32| {
                if v == 2 {
                    panic!("boom");
                }
                sink.borrow_mut().push(v);
            },
            0,
        );
        for v in 1..=3 {
            tsfn.call(v, CallMode::Blocking).unwrap();
        }
        assert_eq!(queue.dispatch_pending(), 3);
        assert_eq!(*seen.borrow(), vec![1, 3]);
    }

    #[test]
    fn calls_from_many_threads_are_each_delivered_once() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let (tsfn, queue) = threadsafe_function(move |v: u32| sink.lock().unwrap().push(v), 8);
        let host = queue.spawn("test-host").unwrap();

        let workers: Vec<_> = (0..4u32)
            .map(|t| {
                let tsfn = tsfn.clone();
                thread::spawn(move || {
                    for i in 0..100 {
                        tsfn.call(t * 1000 + i, CallMode::Blocking).unwrap();
                    }
                })
            })
            .collect();
        for worker in workers {
            worker.join().unwrap();
        }
        tsfn.close();
        host.join().unwrap();

        let mut seen = seen.lock().unwrap().clone();
        assert_eq!(seen.len(), 400);
        seen.sort_unstable();
        seen.dedup();
        assert_eq!(seen.len(), 400);
    }

    #[test]
    fn per_sender_order_is_preserved() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let (tsfn, queue) = threadsafe_function(move |v: u32| sink.lock().unwrap().push(v), 0);
        let host = queue.spawn("test-host-order").unwrap();

        let sender = tsfn.clone();
        thread::spawn(move || {
            for i in 0..50 {
                sender.call(i, CallMode::Blocking).unwrap();
            }
        })
        .join()
        .unwrap();
        tsfn.close();
        host.join().unwrap();

        assert_eq!(*seen.lock().unwrap(), (0..50).collect::<Vec<_>>());
    }

    #[test]
    fn accepted_calls_racing_close_are_all_delivered() {
        for _ in 0..50 {
            let delivered = Arc::new(AtomicUsize::new(0));
            let sink = Arc::clone(&delivered);
            let (tsfn, queue) = threadsafe_function(
                move |_: u32| {
                    sink.fetch_add(1, Ordering::SeqCst);
                },
                0,
            );
            let host = queue.spawn("test-host-race").unwrap();

            let workers: Vec<_> = (0..4)
                .map(|_| {
                    let tsfn = tsfn.clone();
                    thread::spawn(move || {
                        let mut accepted = 0;
                        for i in 0..200 {
                            if tsfn.call(i, CallMode::NonBlocking).is_ok() {
                                accepted += 1;
                            }
                        }
                        accepted
                    })
                })
                .collect();
            thread::yield_now();
            tsfn.close();
            host.join().unwrap();

            let accepted: usize = workers.into_iter().map(|w| w.join().unwrap()).sum();
            assert_eq!(delivered.load(Ordering::SeqCst), accepted);
        }
    }
}
