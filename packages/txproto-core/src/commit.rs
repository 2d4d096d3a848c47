//! Commit/Discard Protocol — the two-phase activation barrier used when
//! wiring a new branch into a running graph.
//!
//! A component joins the protocol once, at link time, with a pair of
//! one-shot closures. [`CommitProtocol::commit`] calls every `on_commit`
//! still pending, in the order they registered; [`CommitProtocol::discard`]
//! calls every `on_discard` still pending, in the *reverse* of that order
//! (so a component is torn down only after whatever it depends on has had
//! a chance to refuse first). Neither call short-circuits on the first
//! failure — every handler gets a chance to run, and the caller gets a
//! full report of what failed.
//!
//! This is deliberately its own ordered registry rather than built on top
//! of [`crate::event::EventList`]: `ON_COMMIT`/`ON_DISCARD` handlers return
//! a [`TxResult`], while ordinary event callbacks do not, and the
//! aggregate-without-short-circuiting contract only applies here.

use parking_lot::Mutex;

use crate::error::TxError;

type Handler = Box<dyn FnMut() -> Result<(), TxError> + Send>;

struct Slot {
    name: String,
    on_commit: Mutex<Option<Handler>>,
    on_discard: Mutex<Option<Handler>>,
}

/// An ordered registry of commit/discard handler pairs.
pub struct CommitProtocol {
    slots: Mutex<Vec<Slot>>,
}

impl Default for CommitProtocol {
    fn default() -> Self {
        Self::new()
    }
}

/// The outcome of one commit or discard pass.
#[derive(Debug, Default)]
pub struct CommitReport {
    pub succeeded: Vec<String>,
    pub failed: Vec<(String, TxError)>,
}

impl CommitReport {
    #[must_use]
    pub fn is_ok(&self) -> bool {
        self.failed.is_empty()
    }
}

impl CommitProtocol {
    #[must_use]
    pub fn new() -> Self {
        Self {
            slots: Mutex::new(Vec::new()),
        }
    }

    /// Registers a commit/discard pair under `name`. Registration order is
    /// commit order; discard visits slots in the reverse of registration
    /// order.
    pub fn register(
        &self,
        name: impl Into<String>,
        on_commit: impl FnMut() -> Result<(), TxError> + Send + 'static,
        on_discard: impl FnMut() -> Result<(), TxError> + Send + 'static,
    ) {
        self.slots.lock().push(Slot {
            name: name.into(),
            on_commit: Mutex::new(Some(Box::new(on_commit))),
            on_discard: Mutex::new(Some(Box::new(on_discard))),
        });
    }

    /// Runs every still-pending `on_commit` handler in registration order.
    /// A handler that already fired (from a previous `commit` call) is
    /// skipped, not re-run.
    pub fn commit(&self) -> CommitReport {
        let slots = self.slots.lock();
        let mut report = CommitReport::default();
        for slot in slots.iter() {
            let mut guard = slot.on_commit.lock();
            let Some(mut handler) = guard.take() else {
                continue;
            };
            match handler() {
                Ok(()) => report.succeeded.push(slot.name.clone()),
                Err(e) => report.failed.push((slot.name.clone(), e)),
            }
        }
        report
    }

    /// Runs every still-pending `on_discard` handler in the reverse of
    /// registration order.
    pub fn discard(&self) -> CommitReport {
        let slots = self.slots.lock();
        let mut report = CommitReport::default();
        for slot in slots.iter().rev() {
            let mut guard = slot.on_discard.lock();
            let Some(mut handler) = guard.take() else {
                continue;
            };
            match handler() {
                Ok(()) => report.succeeded.push(slot.name.clone()),
                Err(e) => report.failed.push((slot.name.clone(), e)),
            }
        }
        report
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.slots.lock().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
