//! I/O Source Registry — a live catalog of capture/playback endpoints
//! discovered by platform-specific backends (WASAPI, DXGI screen capture,
//! etc.), each kept behind the [`IoApiBackend`] trait so this crate never
//! links against a concrete platform API.

use std::any::Any;
use std::collections::HashSet;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use dashmap::DashMap;

use crate::controller::CtrlFlags;
use crate::error::{TxError, TxResult};
use crate::event::{Category, EventList, Phase};
use crate::fifo::{Fifo, FifoFlags};
use crate::media_ops::RawFrame;
use crate::object::Kind;

/// A discovered I/O endpoint.
///
/// `events` and `output` are identity-stable across refresh passes as long
/// as the backend keeps reporting the same `id` with the same descriptive
/// fields: [`IoRegistry::refresh`] only replaces an entry (and so only
/// resets its FIFO and event list) when the backend reports it as new or
/// changed.
pub struct IoEntry {
    /// Stable identifier derived from the endpoint's name, so the same
    /// physical device gets the same id across process restarts even
    /// though the backend may enumerate it in a different order.
    pub id: u32,
    pub name: String,
    pub kind: Kind,
    pub is_default: bool,
    /// Per-entry event list (`ON_CHANGE` when this specific entry's own
    /// state is touched via [`IoApiBackend::ctrl`], `ON_EOS` when its
    /// stream ends, etc.) — distinct from the backend-wide list the
    /// registry dispatches discovery-level `ON_CHANGE` events on.
    pub events: Arc<EventList>,
    /// Decoded frames this entry has produced, for a source entry, or
    /// frames queued to play out, for a sink entry. Unused until
    /// [`IoApiBackend::init_io`] actually opens the stream.
    pub output: Fifo<Arc<RawFrame>>,
}

impl Clone for IoEntry {
    fn clone(&self) -> Self {
        Self {
            id: self.id,
            name: self.name.clone(),
            kind: self.kind,
            is_default: self.is_default,
            events: Arc::clone(&self.events),
            output: self.output.clone(),
        }
    }
}

impl fmt::Debug for IoEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IoEntry")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("kind", &self.kind)
            .field("is_default", &self.is_default)
            .finish()
    }
}

impl IoEntry {
    /// Builds a fresh entry with its own empty output FIFO and event
    /// list — what a backend's [`IoApiBackend::enumerate`] returns for
    /// every endpoint it sees, new or not. The registry itself decides
    /// whether to adopt this fresh state or keep a previously live one.
    #[must_use]
    pub fn new(id: u32, name: impl Into<String>, kind: Kind, is_default: bool) -> Self {
        Self {
            id,
            name: name.into(),
            kind,
            is_default,
            events: Arc::new(EventList::new()),
            output: Fifo::create(None, FifoFlags::default()),
        }
    }

    fn same_identity(&self, other: &Self) -> bool {
        self.name == other.name && self.kind == other.kind && self.is_default == other.is_default
    }
}

/// Computes the stable identifier for an endpoint name: the CRC32 of its
/// UTF-8 bytes. Kept as a free function so backends can precompute an
/// `IoEntry` without going through the registry.
#[must_use]
pub fn stable_id(name: &str) -> u32 {
    crc32fast::hash(name.as_bytes())
}

/// Implemented once per platform capture/playback API. The registry polls
/// this periodically on a background thread rather than assuming the
/// backend can push change notifications itself.
pub trait IoApiBackend: Send + Sync {
    /// Human-readable name of this backend, used in logs.
    fn name(&self) -> &str;

    /// Enumerates every endpoint currently visible to this backend.
    fn enumerate(&self) -> TxResult<Vec<IoEntry>>;

    /// One-time platform-level initialization (acquiring a COM apartment,
    /// opening a device context) done once before the first enumeration.
    /// Default no-op for backends with nothing to set up.
    fn init_sys(&self) -> TxResult<()> {
        Ok(())
    }

    /// Opens the actual capture/playback stream backing `entry`, so its
    /// `output` FIFO starts receiving (or draining, for a sink) frames.
    /// Default unsupported — a backend that only enumerates (never
    /// streams) doesn't need to implement this.
    fn init_io(&self, _entry: &IoEntry) -> TxResult<()> {
        Err(TxError::Unsupported("backend does not implement init_io"))
    }

    /// Bumps the backend's own reference count on endpoint `id`, so a
    /// shared device handle isn't torn down while more than one consumer
    /// still holds it. Default no-op for backends with no shared handle
    /// to protect.
    fn ref_entry(&self, _id: u32) -> TxResult<()> {
        Ok(())
    }

    /// Sends a backend-specific control message to endpoint `id` (mute,
    /// volume, format switch). Default unsupported.
    fn ctrl(&self, _id: u32, _flags: CtrlFlags, _payload: Option<Box<dyn Any + Send>>) -> TxResult<()> {
        Err(TxError::Unsupported("backend does not implement ctrl"))
    }
}

#[derive(Clone)]
struct BackendState {
    backend: Arc<dyn IoApiBackend>,
    events: Arc<EventList>,
}

/// Runs one enumeration pass across `backends`, adopting each backend's
/// fresh [`IoEntry`] into `entries` only where the id is new or its
/// descriptive fields changed, dispatching `ON_CHANGE` on that backend's
/// event list when anything did, then drops entries no backend reported
/// this pass. Shared by [`IoRegistry::refresh`] and the discovery thread
/// so both run identical logic.
fn run_discovery_pass(backends: &[BackendState], entries: &DashMap<u32, IoEntry>) {
    let mut seen = HashSet::new();
    for state in backends {
        match state.backend.enumerate() {
            Ok(found) => {
                let mut changed = false;
                for entry in found {
                    seen.insert(entry.id);
                    let is_fresh = match entries.get(&entry.id) {
                        Some(existing) => !existing.same_identity(&entry),
                        None => true,
                    };
                    if is_fresh {
                        changed = true;
                        entries.insert(entry.id, entry);
                    }
                }
                if changed {
                    state.events.dispatch(Phase::ON_CHANGE, Category::TYPE_IO, None);
                }
            }
            Err(err) => {
                tracing::warn!(backend = state.backend.name(), error = %err, "io backend enumeration failed");
            }
        }
    }
    entries.retain(|id, _| seen.contains(id));
}

/// Holds the union of every backend's current enumeration, refreshed on a
/// background thread. Readers never block on a live device query; they
/// always see the last successfully completed enumeration.
pub struct IoRegistry {
    backends: Vec<BackendState>,
    entries: Arc<DashMap<u32, IoEntry>>,
    stop: Arc<AtomicBool>,
    poll_handle: parking_lot::Mutex<Option<JoinHandle<()>>>,
}

impl IoRegistry {
    #[must_use]
    pub fn new(backends: Vec<Arc<dyn IoApiBackend>>) -> Self {
        let backends = backends
            .into_iter()
            .map(|backend| BackendState {
                backend,
                events: Arc::new(EventList::new()),
            })
            .collect();
        Self {
            backends,
            entries: Arc::new(DashMap::new()),
            stop: Arc::new(AtomicBool::new(false)),
            poll_handle: parking_lot::Mutex::new(None),
        }
    }

    /// Runs `init_sys` once for every backend. A backend that fails init
    /// is logged and simply never contributes entries; it does not stop
    /// the other backends from initializing.
    pub fn init_sys(&self) {
        for state in &self.backends {
            if let Err(err) = state.backend.init_sys() {
                tracing::warn!(backend = state.backend.name(), error = %err, "io backend init_sys failed");
            }
        }
    }

    /// The backend-wide event list for `name`, so a caller can register
    /// for that backend's `ON_CHANGE` notifications. `None` if no backend
    /// with that name is registered.
    #[must_use]
    pub fn backend_events(&self, name: &str) -> Option<Arc<EventList>> {
        self.backends
            .iter()
            .find(|s| s.backend.name() == name)
            .map(|s| Arc::clone(&s.events))
    }

    /// Runs one enumeration pass across every backend, adopting each
    /// backend's fresh [`IoEntry`] only where the id is new or its
    /// descriptive fields changed (an unchanged entry keeps its live FIFO
    /// and event list), then dispatches `ON_CHANGE` on that backend's
    /// event list if anything changed. Drops entries no backend reported
    /// this pass.
    pub fn refresh(&self) {
        run_discovery_pass(&self.backends, &self.entries);
    }

    /// Spawns a background thread that runs a discovery pass every
    /// `interval`, until [`IoRegistry::stop`] is called or this registry
    /// is dropped.
    pub fn spawn_discovery(&self, interval: Duration) {
        let backends = self.backends.clone();
        let entries = Arc::clone(&self.entries);
        let stop = Arc::clone(&self.stop);

        let handle = std::thread::Builder::new()
            .name("io-discovery".into())
            .spawn(move || {
                let span = tracing::info_span!("io_discovery");
                let _enter = span.enter();
                while !stop.load(Ordering::Acquire) {
                    run_discovery_pass(&backends, &entries);
                    std::thread::sleep(interval);
                }
            })
            .expect("spawning io discovery thread");

        *self.poll_handle.lock() = Some(handle);
    }

    /// Signals the discovery thread to stop. Does not join it; drop does
    /// that.
    pub fn stop(&self) {
        self.stop.store(true, Ordering::Release);
    }

    #[must_use]
    pub fn get(&self, id: u32) -> Option<IoEntry> {
        self.entries.get(&id).map(|e| e.clone())
    }

    #[must_use]
    pub fn list(&self, kind: Option<Kind>) -> Vec<IoEntry> {
        self.entries
            .iter()
            .filter(|e| kind.map_or(true, |k| e.kind == k))
            .map(|e| e.clone())
            .collect()
    }

    #[must_use]
    pub fn default_for(&self, kind: Kind) -> Option<IoEntry> {
        self.entries
            .iter()
            .find(|e| e.kind == kind && e.is_default)
            .map(|e| e.clone())
    }

    /// Looks up `id` in the catalog, then forwards to every backend's
    /// [`IoApiBackend::ref_entry`] until one accepts it. Most backends
    /// never override the default no-op, so this is only meaningful for a
    /// backend that tracks its own per-entry refcount.
    ///
    /// # Errors
    /// Returns [`TxError::NotFound`] if `id` is not catalogued, or the
    /// last backend's error if every backend rejected the call.
    pub fn ref_entry(&self, id: u32) -> TxResult<()> {
        self.get(id)
            .ok_or_else(|| TxError::NotFound(format!("io entry {id}")))?;
        let mut last_err = TxError::NotFound(format!("io entry {id}"));
        for state in &self.backends {
            match state.backend.ref_entry(id) {
                Ok(()) => return Ok(()),
                Err(err) => last_err = err,
            }
        }
        Err(last_err)
    }
}

impl Drop for IoRegistry {
    fn drop(&mut self) {
        self.stop();
        if let Some(handle) = self.poll_handle.lock().take() {
            let _ = handle.join();
        }
    }
}
