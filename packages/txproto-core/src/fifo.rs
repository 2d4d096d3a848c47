//! Bounded FIFO — a generic multi-producer/multi-consumer queue with
//! backpressure policies, mirroring, and peek.
//!
//! One generic template (here, one generic type) is instantiated for
//! packets, frames, and buffer-refs by parameterizing over [`FifoItem`].

use std::collections::VecDeque;
use std::sync::Arc;

use bitflags::bitflags;
use parking_lot::{Condvar, Mutex};

use crate::error::{TxError, TxResult};

bitflags! {
    /// Independent blocking-policy flags for a FIFO.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct FifoFlags: u8 {
        /// Pop blocks while the FIFO is empty. Default.
        const BLOCK_MAX_OUTPUT = 0b001;
        /// Push blocks while the FIFO is full.
        const BLOCK_NO_INPUT   = 0b010;
        /// Forces pop to return immediately with `None` when empty,
        /// overriding `BLOCK_MAX_OUTPUT` for that one call.
        const PULL_NO_BLOCK    = 0b100;
    }
}

impl Default for FifoFlags {
    fn default() -> Self {
        FifoFlags::BLOCK_MAX_OUTPUT
    }
}

/// Requirement for any type stored in a [`Fifo`]: mirroring clones an item
/// via a cheap shallow share (a refcount bump for refcounted payloads),
/// never a deep copy.
pub trait FifoItem: Send + 'static {
    /// Returns a cheap shared handle to the same underlying data.
    fn shallow_share(&self) -> Self;
}

/// Blanket impl for any `Arc<T>`-shaped item — the common case for
/// packet/frame/buffer payloads.
impl<T: Send + Sync + 'static> FifoItem for Arc<T> {
    fn shallow_share(&self) -> Self {
        Arc::clone(self)
    }
}

struct Inner<T> {
    items: VecDeque<T>,
    max_len: Option<usize>, // None = unbounded
    flags: FifoFlags,
    eos: bool,
    mirrors: Vec<Fifo<T>>,
}

/// A bounded, ordered queue of items, with optional mirroring to
/// downstream FIFOs and independent push/pop blocking policies.
pub struct Fifo<T> {
    inner: Arc<Mutex<Inner<T>>>,
    not_empty: Arc<Condvar>,
    not_full: Arc<Condvar>,
}

impl<T> Clone for Fifo<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
            not_empty: Arc::clone(&self.not_empty),
            not_full: Arc::clone(&self.not_full),
        }
    }
}

/// Outcome of a pop, distinguishing "nothing available right now" from
/// "the stream has ended" — collapsed to a plain `Option` at the
/// `pop`/`pop_flags` boundary per the spec's public operations table, but
/// kept distinct internally so tests can assert on it precisely.
#[derive(Debug, PartialEq, Eq)]
pub enum PopOutcome<T> {
    Item(T),
    WouldBlock,
    Eos,
}

impl<T: FifoItem> Fifo<T> {
    /// Creates a new FIFO. `max_len = None` is unbounded, `Some(0)` is
    /// zero-buffered (every push must rendezvous with a waiting pop).
    #[must_use]
    pub fn create(max_len: Option<usize>, flags: FifoFlags) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner {
                items: VecDeque::new(),
                max_len,
                flags,
                eos: false,
                mirrors: Vec::new(),
            })),
            not_empty: Arc::new(Condvar::new()),
            not_full: Arc::new(Condvar::new()),
        }
    }

    /// Creates a FIFO sharing no storage with `src` but configured the
    /// same way — used by mirrors that need their own independent
    /// position. (See DESIGN.md OQ-1 for how this relates to `mirror`.)
    #[must_use]
    pub fn ref_view(src: &Self, max_len: Option<usize>, flags: FifoFlags) -> Self {
        let view = Self::create(max_len, flags);
        src.inner.lock().mirrors.push(view.clone());
        view
    }

    /// Pushes `Some(item)`, or `None` as the end-of-stream sentinel.
    ///
    /// An EOS push wakes every waiter; all subsequent pops return
    /// `Ok(None)` until [`Fifo::rebuild`] is called. Mirrors receive a
    /// shallow-shared clone of every pushed item, in insertion order,
    /// isolated from the source's own backpressure unless the FIFO was
    /// itself configured with `BLOCK_MAX_OUTPUT` (a slow mirror never
    /// blocks the source through this path — mirrors are pushed best
    /// effort against their own policy).
    pub fn push(&self, item: Option<T>) -> TxResult<()> {
        let mut guard = self.inner.lock();

        let Some(item) = item else {
            guard.eos = true;
            drop(guard);
            self.not_empty.notify_all();
            return Ok(());
        };

        loop {
            let full = guard
                .max_len
                .is_some_and(|max| guard.items.len() >= max);
            if !full {
                break;
            }
            if !guard.flags.contains(FifoFlags::BLOCK_NO_INPUT) {
                return Err(TxError::WouldBlock);
            }
            self.not_full.wait(&mut guard);
        }

        for mirror in &guard.mirrors {
            // Mirror backpressure is isolated: best-effort push against
            // the mirror's own policy, never the source's.
            let _ = mirror.push(Some(item.shallow_share()));
        }

        guard.items.push_back(item);
        drop(guard);
        self.not_empty.notify_one();
        Ok(())
    }

    /// Pops the next item, honoring the FIFO's configured blocking
    /// policy. Returns `Ok(None)` both on a non-blocking miss and on EOS
    /// — use [`Fifo::pop_detailed`] to distinguish the two.
    pub fn pop(&self) -> TxResult<Option<T>> {
        match self.pop_detailed(self.flags())? {
            PopOutcome::Item(item) => Ok(Some(item)),
            PopOutcome::WouldBlock | PopOutcome::Eos => Ok(None),
        }
    }

    /// Pops using an explicit flag override for this one call (e.g. force
    /// `PULL_NO_BLOCK` regardless of the FIFO's configured policy).
    pub fn pop_flags(&self, flags: FifoFlags) -> TxResult<Option<T>> {
        match self.pop_detailed(flags)? {
            PopOutcome::Item(item) => Ok(Some(item)),
            PopOutcome::WouldBlock | PopOutcome::Eos => Ok(None),
        }
    }

    /// Full-fidelity pop distinguishing would-block from EOS.
    pub fn pop_detailed(&self, flags: FifoFlags) -> TxResult<PopOutcome<T>> {
        let mut guard = self.inner.lock();
        let no_block = flags.contains(FifoFlags::PULL_NO_BLOCK)
            || !flags.contains(FifoFlags::BLOCK_MAX_OUTPUT);

        loop {
            if let Some(item) = guard.items.pop_front() {
                drop(guard);
                self.not_full.notify_one();
                return Ok(PopOutcome::Item(item));
            }
            if guard.eos {
                return Ok(PopOutcome::Eos);
            }
            if no_block {
                return Ok(PopOutcome::WouldBlock);
            }
            self.not_empty.wait(&mut guard);
        }
    }

    /// Returns a shallow-shared clone of the front item without removing it.
    pub fn peek(&self) -> Option<T> {
        let guard = self.inner.lock();
        guard.items.front().map(FifoItem::shallow_share)
    }

    /// Current queue length.
    #[must_use]
    pub fn size(&self) -> usize {
        self.inner.lock().items.len()
    }

    /// Whether the FIFO is at its configured maximum.
    #[must_use]
    pub fn is_full(&self) -> bool {
        let guard = self.inner.lock();
        guard.max_len.is_some_and(|max| guard.items.len() >= max)
    }

    /// The configured maximum length, `None` if unbounded.
    #[must_use]
    pub fn max(&self) -> Option<usize> {
        self.inner.lock().max_len
    }

    /// Updates the maximum length.
    pub fn set_max(&self, max_len: Option<usize>) {
        self.inner.lock().max_len = max_len;
        self.not_full.notify_all();
    }

    /// Updates the blocking-policy flags.
    pub fn set_flags(&self, flags: FifoFlags) {
        self.inner.lock().flags = flags;
    }

    fn flags(&self) -> FifoFlags {
        self.inner.lock().flags
    }

    /// Registers `mirror` to receive a shallow-shared clone of every item
    /// pushed into `self` from now on, in push order.
    pub fn mirror(&self, mirror: &Self) {
        self.inner.lock().mirrors.push(mirror.clone());
    }

    /// Atomically removes `mirror` from the mirror set. In-flight clones
    /// already delivered to it are unaffected.
    pub fn unmirror(&self, mirror: &Self) {
        self.inner
            .lock()
            .mirrors
            .retain(|m| !Arc::ptr_eq(&m.inner, &mirror.inner));
    }

    /// Removes every mirror.
    pub fn unmirror_all(&self) {
        self.inner.lock().mirrors.clear();
    }

    /// Clears the EOS latch and empties the queue so the FIFO can be
    /// reused for a fresh stream.
    pub fn rebuild(&self) {
        let mut guard = self.inner.lock();
        guard.eos = false;
        guard.items.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(n: i32) -> Arc<i32> {
        Arc::new(n)
    }

    #[test]
    fn push_pop_preserves_order() {
        let fifo: Fifo<Arc<i32>> = Fifo::create(None, FifoFlags::default());
        fifo.push(Some(item(1))).unwrap();
        fifo.push(Some(item(2))).unwrap();
        fifo.push(Some(item(3))).unwrap();
        assert_eq!(*fifo.pop().unwrap().unwrap(), 1);
        assert_eq!(*fifo.pop().unwrap().unwrap(), 2);
        assert_eq!(*fifo.pop().unwrap().unwrap(), 3);
    }

    #[test]
    fn eos_wakes_and_sticks() {
        let fifo: Fifo<Arc<i32>> = Fifo::create(None, FifoFlags::default());
        fifo.push(Some(item(1))).unwrap();
        fifo.push(None).unwrap();
        assert_eq!(*fifo.pop().unwrap().unwrap(), 1);
        assert_eq!(fifo.pop().unwrap(), None);
        assert_eq!(fifo.pop().unwrap(), None);
        assert_eq!(
            fifo.pop_detailed(FifoFlags::BLOCK_MAX_OUTPUT).unwrap(),
            PopOutcome::Eos
        );
    }

    #[test]
    fn nonblocking_push_would_block_when_full() {
        let fifo: Fifo<Arc<i32>> = Fifo::create(Some(1), FifoFlags::empty());
        fifo.push(Some(item(1))).unwrap();
        let err = fifo.push(Some(item(2))).unwrap_err();
        assert!(matches!(err, TxError::WouldBlock));
    }

    #[test]
    fn nonblocking_pop_distinguishes_would_block_from_eos() {
        let fifo: Fifo<Arc<i32>> = Fifo::create(None, FifoFlags::empty());
        assert_eq!(
            fifo.pop_detailed(FifoFlags::empty()).unwrap(),
            PopOutcome::WouldBlock
        );
        fifo.push(None).unwrap();
        assert_eq!(fifo.pop_detailed(FifoFlags::empty()).unwrap(), PopOutcome::Eos);
    }

    #[test]
    fn mirror_receives_source_push_order() {
        let src: Fifo<Arc<i32>> = Fifo::create(None, FifoFlags::default());
        let mirror: Fifo<Arc<i32>> = Fifo::create(None, FifoFlags::default());
        src.mirror(&mirror);

        src.push(Some(item(1))).unwrap();
        src.push(Some(item(2))).unwrap();

        assert_eq!(*mirror.pop().unwrap().unwrap(), 1);
        assert_eq!(*mirror.pop().unwrap().unwrap(), 2);
        // Source itself still has both items; mirroring doesn't drain it.
        assert_eq!(src.size(), 2);
    }

    #[test]
    fn unmirror_stops_future_delivery() {
        let src: Fifo<Arc<i32>> = Fifo::create(None, FifoFlags::default());
        let mirror: Fifo<Arc<i32>> = Fifo::create(None, FifoFlags::default());
        src.mirror(&mirror);
        src.push(Some(item(1))).unwrap();
        src.unmirror(&mirror);
        src.push(Some(item(2))).unwrap();

        assert_eq!(*mirror.pop().unwrap().unwrap(), 1);
        assert_eq!(mirror.pop_detailed(FifoFlags::empty()).unwrap(), PopOutcome::WouldBlock);
    }

    #[test]
    fn peek_does_not_remove() {
        let fifo: Fifo<Arc<i32>> = Fifo::create(None, FifoFlags::default());
        fifo.push(Some(item(7))).unwrap();
        assert_eq!(*fifo.peek().unwrap(), 7);
        assert_eq!(fifo.size(), 1);
    }

    #[test]
    fn blocking_push_wakes_on_pop() {
        use std::thread;
        use std::time::Duration;

        let fifo: Fifo<Arc<i32>> = Fifo::create(Some(1), FifoFlags::BLOCK_NO_INPUT);
        fifo.push(Some(item(1))).unwrap();

        let fifo2 = fifo.clone();
        let handle = thread::spawn(move || {
            fifo2.push(Some(item(2))).unwrap();
        });

        thread::sleep(Duration::from_millis(20));
        assert_eq!(*fifo.pop().unwrap().unwrap(), 1);
        handle.join().unwrap();
        assert_eq!(*fifo.pop().unwrap().unwrap(), 2);
    }
}
