//! Event Bus — per-object lists of callbacks keyed by event phase and
//! category, with one-shot, immediate, and dependency semantics.
//!
//! # Cyclic references (Design Notes §9)
//!
//! The specification calls out that an event's `ctx`/`dep_ctx` pointers
//! could form a cycle (component A holds an event whose dependency is B,
//! B holds one whose dependency is A), and resolves it by making those
//! two pointers weak references, with strong ownership living only in
//! whichever [`EventList`] the event is enrolled in. In Rust we get this
//! for free by never storing an owning handle there in the first place:
//! `ctx`/`dep_ctx` are plain [`ComponentId`] values (an opaque `Copy` id),
//! not `Arc<Component>`. There is nothing to upgrade and nothing that can
//! keep a component alive through an event that targets it — a stronger
//! form of the same resolution the spec describes.

use std::any::Any;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use bitflags::bitflags;
use parking_lot::Mutex;
use uuid::Uuid;

/// Opaque identifier for a component, used as the `ctx`/`dep_ctx` on events
/// without requiring an owning reference (see module docs).
pub type ComponentId = Uuid;

bitflags! {
    /// The phase bits of an event's type. Exactly the closed set from the
    /// specification's event-kinds table.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct Phase: u16 {
        const ON_COMMIT  = 1 << 0;
        const ON_DISCARD = 1 << 1;
        const ON_CONFIG  = 1 << 2;
        const ON_INIT    = 1 << 3;
        const ON_DESTROY = 1 << 4;
        const ON_ERROR   = 1 << 5;
        const ON_EOS     = 1 << 6;
        const ON_CHANGE  = 1 << 7;
        const ON_STATS   = 1 << 8;
    }

    /// The category bits of an event's type.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct Category: u8 {
        const TYPE_LINK   = 1 << 0;
        const TYPE_SOURCE = 1 << 1;
        const TYPE_SINK   = 1 << 2;
        const TYPE_FILTER = 1 << 3;
        const TYPE_IO     = 1 << 4;
    }

    /// Behavior-modifying flags, orthogonal to phase/category matching.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct EventFlags: u8 {
        const ONESHOT    = 1 << 0;
        const IMMEDIATE  = 1 << 1;
        const DEPENDENCY = 1 << 2;
        const EXPIRED    = 1 << 3;
    }
}

/// Arguments passed to an event's callback on dispatch.
pub struct EventArgs<'a> {
    /// The phase bit(s) this dispatch fired for.
    pub phase: Phase,
    /// The object the event targets.
    pub ctx: ComponentId,
    /// The object this event depends on, if any.
    pub dep_ctx: Option<ComponentId>,
    /// Dispatch-supplied payload (e.g. an error, a stats snapshot).
    pub data: Option<&'a (dyn Any + Send + Sync)>,
}

type Callback = Box<dyn FnMut(EventArgs<'_>) + Send>;

/// A single registered callback bound to a phase/category on some object.
///
/// Cloning an `Event` clones the handle to its callback (an `Arc<Mutex<_>>`)
/// along with its plain-value metadata — this is what lets [`EventList`]
/// copy a batch of matching events out from under its lock before invoking
/// them, per the concurrency rule in §4.C/§5 ("dispatch releases the
/// event-list lock before invoking a callback").
#[derive(Clone)]
pub struct Event {
    phase: Phase,
    category: Category,
    flags: EventFlags,
    ctx: ComponentId,
    dep_ctx: Option<ComponentId>,
    callback: Arc<Mutex<Callback>>,
    id: u64,
}

static NEXT_EVENT_ID: AtomicU64 = AtomicU64::new(1);

impl Event {
    /// Creates a new event.
    pub fn new(
        phase: Phase,
        category: Category,
        flags: EventFlags,
        ctx: ComponentId,
        dep_ctx: Option<ComponentId>,
        callback: impl FnMut(EventArgs<'_>) + Send + 'static,
    ) -> Self {
        Self {
            phase,
            category,
            flags,
            ctx,
            dep_ctx,
            callback: Arc::new(Mutex::new(Box::new(callback))),
            id: NEXT_EVENT_ID.fetch_add(1, Ordering::Relaxed),
        }
    }

    /// The phase bits this event is registered for.
    #[must_use]
    pub fn phase(&self) -> Phase {
        self.phase
    }

    #[must_use]
    pub fn is_oneshot(&self) -> bool {
        self.flags.contains(EventFlags::ONESHOT)
    }

    #[must_use]
    pub fn is_immediate(&self) -> bool {
        self.flags.contains(EventFlags::IMMEDIATE)
    }

    #[must_use]
    pub fn is_dependency(&self) -> bool {
        self.flags.contains(EventFlags::DEPENDENCY)
    }

    #[must_use]
    pub fn is_expired(&self) -> bool {
        self.flags.contains(EventFlags::EXPIRED)
    }

    fn fire(&self, mask: Phase, data: Option<&(dyn Any + Send + Sync)>) {
        let args = EventArgs {
            phase: self.phase & mask,
            ctx: self.ctx,
            dep_ctx: self.dep_ctx,
            data,
        };
        (self.callback.lock())(args);
    }

    fn matches(&self, mask: Phase, category: Category) -> bool {
        if self.is_expired() || self.is_dependency() {
            return false;
        }
        let phase_ok = self.phase.intersects(mask);
        let category_ok =
            self.category.is_empty() || category.is_empty() || self.category.intersects(category);
        phase_ok && category_ok
    }
}

/// An insertion-ordered list of events belonging to one object.
pub struct EventList {
    events: Mutex<Vec<Event>>,
    dispatched: Mutex<Phase>,
}

impl Default for EventList {
    fn default() -> Self {
        Self::new()
    }
}

impl EventList {
    #[must_use]
    pub fn new() -> Self {
        Self {
            events: Mutex::new(Vec::new()),
            dispatched: Mutex::new(Phase::empty()),
        }
    }

    /// Registers `event`. An `IMMEDIATE` event fires synchronously here,
    /// against a synthetic one-event dispatch, before (if non-oneshot)
    /// being enrolled for future matches.
    pub fn add(&self, event: Event) {
        if event.is_immediate() {
            event.fire(event.phase, None);
            if event.is_oneshot() {
                return;
            }
        }
        self.events.lock().push(event);
    }

    /// Dispatches every matching, non-expired, non-dependency event whose
    /// phase intersects `mask` and whose category agrees with `category`
    /// (empty category on either side always agrees). Oneshot events are
    /// removed from the list before their callback runs. Returns the
    /// number of events fired.
    pub fn dispatch(
        &self,
        mask: Phase,
        category: Category,
        data: Option<&(dyn Any + Send + Sync)>,
    ) -> usize {
        let mut fired_phase = Phase::empty();
        let to_fire: Vec<Event> = {
            let mut events = self.events.lock();
            let mut fired = Vec::new();
            let mut i = 0;
            while i < events.len() {
                if events[i].matches(mask, category) {
                    let ev = events[i].clone();
                    fired_phase |= ev.phase & mask;
                    if ev.is_oneshot() {
                        events.remove(i);
                    } else {
                        i += 1;
                    }
                    fired.push(ev);
                } else {
                    i += 1;
                }
            }
            fired
        };

        if !fired_phase.is_empty() {
            *self.dispatched.lock() |= fired_phase;
        }

        for ev in &to_fire {
            ev.fire(mask, data);
        }
        to_fire.len()
    }

    /// Whether any event matching `phase` has ever fired from this list.
    #[must_use]
    pub fn has_dispatched(&self, phase: Phase) -> bool {
        self.dispatched.lock().intersects(phase)
    }

    /// Releases every `DEPENDENCY` event on this list whose `dep_ctx`
    /// matches `source` and whose phase intersects `signaled_phase` — the
    /// mechanism by which a source component's own `ON_INIT` dispatch
    /// unblocks a deferred link staged on a destination's list. Released
    /// events become ordinary pending events, eligible for the next
    /// matching [`EventList::dispatch`] call.
    pub fn release_dependencies(&self, source: ComponentId, signaled_phase: Phase) {
        let mut events = self.events.lock();
        for ev in events.iter_mut() {
            if ev.is_dependency()
                && ev.dep_ctx == Some(source)
                && ev.phase.intersects(signaled_phase)
            {
                ev.flags.remove(EventFlags::DEPENDENCY);
            }
        }
    }

    /// Removes a previously registered event by identity. A no-op if the
    /// event already fired as a oneshot (and was therefore already
    /// removed) or was never added.
    pub fn remove(&self, event: &Event) {
        self.events.lock().retain(|e| e.id != event.id);
    }

    /// Number of currently enrolled (non-expired) events.
    #[must_use]
    pub fn len(&self) -> usize {
        self.events.lock().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering as AtOrd};

    fn id() -> ComponentId {
        Uuid::new_v4()
    }

    #[test]
    fn dispatch_fires_matching_events_once_each() {
        let list = EventList::new();
        let count = Arc::new(AtomicUsize::new(0));
        let c = Arc::clone(&count);
        list.add(Event::new(
            Phase::ON_COMMIT,
            Category::empty(),
            EventFlags::empty(),
            id(),
            None,
            move |_| {
                c.fetch_add(1, AtOrd::SeqCst);
            },
        ));

        list.dispatch(Phase::ON_COMMIT, Category::empty(), None);
        list.dispatch(Phase::ON_DISCARD, Category::empty(), None);
        assert_eq!(count.load(AtOrd::SeqCst), 1);
    }

    #[test]
    fn oneshot_event_never_refires() {
        let list = EventList::new();
        let count = Arc::new(AtomicUsize::new(0));
        let c = Arc::clone(&count);
        list.add(Event::new(
            Phase::ON_COMMIT,
            Category::empty(),
            EventFlags::ONESHOT,
            id(),
            None,
            move |_| {
                c.fetch_add(1, AtOrd::SeqCst);
            },
        ));

        list.dispatch(Phase::ON_COMMIT, Category::empty(), None);
        list.dispatch(Phase::ON_COMMIT, Category::empty(), None);
        assert_eq!(count.load(AtOrd::SeqCst), 1);
        assert_eq!(list.len(), 0);
    }

    #[test]
    fn has_dispatched_tracks_phase_since_construction() {
        let list = EventList::new();
        assert!(!list.has_dispatched(Phase::ON_INIT));
        list.add(Event::new(
            Phase::ON_INIT,
            Category::empty(),
            EventFlags::empty(),
            id(),
            None,
            |_| {},
        ));
        list.dispatch(Phase::ON_INIT, Category::empty(), None);
        assert!(list.has_dispatched(Phase::ON_INIT));
        assert!(!list.has_dispatched(Phase::ON_COMMIT));
    }

    #[test]
    fn immediate_event_fires_at_registration() {
        let list = EventList::new();
        let count = Arc::new(AtomicUsize::new(0));
        let c = Arc::clone(&count);
        list.add(Event::new(
            Phase::ON_CONFIG,
            Category::empty(),
            EventFlags::IMMEDIATE,
            id(),
            None,
            move |_| {
                c.fetch_add(1, AtOrd::SeqCst);
            },
        ));
        assert_eq!(count.load(AtOrd::SeqCst), 1);
        // Still enrolled for future matches since it's not oneshot.
        list.dispatch(Phase::ON_CONFIG, Category::empty(), None);
        assert_eq!(count.load(AtOrd::SeqCst), 2);
    }

    #[test]
    fn immediate_oneshot_fires_once_and_is_not_enrolled() {
        let list = EventList::new();
        let count = Arc::new(AtomicUsize::new(0));
        let c = Arc::clone(&count);
        list.add(Event::new(
            Phase::ON_CONFIG,
            Category::empty(),
            EventFlags::IMMEDIATE | EventFlags::ONESHOT,
            id(),
            None,
            move |_| {
                c.fetch_add(1, AtOrd::SeqCst);
            },
        ));
        assert_eq!(count.load(AtOrd::SeqCst), 1);
        assert_eq!(list.len(), 0);
        list.dispatch(Phase::ON_CONFIG, Category::empty(), None);
        assert_eq!(count.load(AtOrd::SeqCst), 1);
    }

    #[test]
    fn dependency_event_waits_for_release() {
        let list = EventList::new();
        let source = id();
        let count = Arc::new(AtomicUsize::new(0));
        let c = Arc::clone(&count);
        list.add(Event::new(
            Phase::ON_CONFIG,
            Category::empty(),
            EventFlags::DEPENDENCY,
            id(),
            Some(source),
            move |_| {
                c.fetch_add(1, AtOrd::SeqCst);
            },
        ));

        list.dispatch(Phase::ON_CONFIG, Category::empty(), None);
        assert_eq!(count.load(AtOrd::SeqCst), 0, "dependency event must not fire yet");

        list.release_dependencies(source, Phase::ON_INIT);
        list.dispatch(Phase::ON_CONFIG, Category::empty(), None);
        assert_eq!(count.load(AtOrd::SeqCst), 1);
    }

    #[test]
    fn category_mismatch_does_not_fire() {
        let list = EventList::new();
        let count = Arc::new(AtomicUsize::new(0));
        let c = Arc::clone(&count);
        list.add(Event::new(
            Phase::ON_COMMIT,
            Category::TYPE_LINK,
            EventFlags::empty(),
            id(),
            None,
            move |_| {
                c.fetch_add(1, AtOrd::SeqCst);
            },
        ));
        list.dispatch(Phase::ON_COMMIT, Category::TYPE_SINK, None);
        assert_eq!(count.load(AtOrd::SeqCst), 0);

        list.dispatch(Phase::ON_COMMIT, Category::TYPE_LINK, None);
        assert_eq!(count.load(AtOrd::SeqCst), 1);
    }

    #[test]
    fn reentrant_add_during_dispatch_is_safe() {
        let list = Arc::new(EventList::new());
        let list2 = Arc::clone(&list);
        list.add(Event::new(
            Phase::ON_COMMIT,
            Category::empty(),
            EventFlags::ONESHOT,
            id(),
            None,
            move |_| {
                list2.add(Event::new(
                    Phase::ON_COMMIT,
                    Category::empty(),
                    EventFlags::empty(),
                    id(),
                    None,
                    |_| {},
                ));
            },
        ));
        list.dispatch(Phase::ON_COMMIT, Category::empty(), None);
        assert_eq!(list.len(), 1);
    }
}
