//! Main Context — the composition root a running graph hangs off of.
//!
//! A [`MainContext`] owns exactly the state that has to be shared by
//! every component rather than passed down a call chain: the root event
//! list (for context-scoped events like a process-wide `ON_ERROR`), the
//! epoch clock, the commit/discard protocol, the I/O source registry, a
//! per-component controller table, and a name-to-id lookup table so
//! components can find each other (and external callers can find a
//! component) without holding a direct reference.

use std::any::Any;
use std::sync::Arc;

use dashmap::DashMap;

use crate::commit::{CommitProtocol, CommitReport};
use crate::controller::{Controller, CtrlFlags, CtrlMessage};
use crate::epoch::{EpochClock, EpochMode};
use crate::error::{TxError, TxResult};
use crate::event::{ComponentId, Event, EventArgs, EventList, Phase};
use crate::io_registry::{IoApiBackend, IoRegistry};
use crate::link::{self, LinkRequest, Wiring};
use crate::object::Kind;

/// A component's registration with the context: enough to find it again
/// and to link to it, without the context owning its actual processing
/// state (that lives with whatever created the component).
pub struct ComponentHandle {
    pub id: ComponentId,
    pub kind: Kind,
    pub events: Arc<EventList>,
}

impl ComponentHandle {
    #[must_use]
    pub fn new(kind: Kind) -> Self {
        Self {
            id: ComponentId::new_v4(),
            kind,
            events: Arc::new(EventList::new()),
        }
    }
}

/// The composition root. Cheap to clone (everything it holds is already
/// behind an `Arc` or a concurrent map), so it is normally handed out as
/// `Arc<MainContext>` to every component's worker thread.
pub struct MainContext {
    /// Context-scoped events (not tied to any single component).
    pub root_events: Arc<EventList>,
    pub epoch: Arc<EpochClock>,
    pub commit: Arc<CommitProtocol>,
    pub io: Arc<IoRegistry>,
    components: DashMap<ComponentId, ComponentHandle>,
    controllers: Arc<DashMap<ComponentId, Controller>>,
    external_refs: DashMap<String, ComponentId>,
}

impl MainContext {
    #[must_use]
    pub fn new(epoch_mode: EpochMode, io_backends: Vec<Arc<dyn IoApiBackend>>) -> Arc<Self> {
        Arc::new(Self {
            root_events: Arc::new(EventList::new()),
            epoch: Arc::new(EpochClock::new(epoch_mode)),
            commit: Arc::new(CommitProtocol::new()),
            io: Arc::new(IoRegistry::new(io_backends)),
            components: DashMap::new(),
            controllers: Arc::new(DashMap::new()),
            external_refs: DashMap::new(),
        })
    }

    /// Registers a new component of `kind`, returning its handle. The
    /// context keeps only the handle (id, kind, event list) — ownership
    /// of whatever drives the component's actual work stays with the
    /// caller.
    pub fn register(&self, kind: Kind) -> ComponentHandle {
        let handle = ComponentHandle::new(kind);
        let stored = ComponentHandle {
            id: handle.id,
            kind: handle.kind,
            events: Arc::clone(&handle.events),
        };
        self.components.insert(stored.id, stored);
        handle
    }

    /// Removes a component's registration. Does not touch any links
    /// already staged against its event list — discard those first via
    /// [`MainContext::commit`]/[`MainContext::discard`].
    pub fn unregister(&self, id: ComponentId) {
        self.components.remove(&id);
    }

    #[must_use]
    pub fn event_list_of(&self, id: ComponentId) -> Option<Arc<EventList>> {
        self.components.get(&id).map(|c| Arc::clone(&c.events))
    }

    #[must_use]
    pub fn kind_of(&self, id: ComponentId) -> Option<Kind> {
        self.components.get(&id).map(|c| c.kind)
    }

    /// Binds a name to a component id in the external-reference table, so
    /// a script/CLI frontend (outside this crate) can resolve a
    /// human-readable name to a [`ComponentId`] without walking the graph
    /// itself.
    pub fn bind_external(&self, name: impl Into<String>, id: ComponentId) {
        self.external_refs.insert(name.into(), id);
    }

    #[must_use]
    pub fn resolve_external(&self, name: &str) -> Option<ComponentId> {
        self.external_refs.get(name).map(|id| *id)
    }

    pub fn unbind_external(&self, name: &str) {
        self.external_refs.remove(name);
    }

    fn component_entry(&self, id: ComponentId) -> TxResult<(Kind, Arc<EventList>)> {
        self.components
            .get(&id)
            .map(|c| (c.kind, Arc::clone(&c.events)))
            .ok_or_else(|| TxError::NotFound(format!("component {id}")))
    }

    /// Links two registered components through the [`crate::link`]
    /// negotiator, staging `on_ready` per its immediate/deferred rule.
    /// Equivalent to [`MainContext::link_autostart`] with autostart
    /// disabled and no global-header requirement — the common case used
    /// by a caller that owns its own start/stop sequencing.
    ///
    /// # Errors
    /// Returns [`TxError::NotFound`] if either id is not registered, or
    /// whatever [`link::link`] returns for an illegal kind pair.
    pub fn link(
        &self,
        src: ComponentId,
        dst: ComponentId,
        on_ready: impl FnMut(EventArgs<'_>) + Send + 'static,
    ) -> TxResult<Wiring> {
        self.link_autostart(src, dst, false, false, on_ready)
    }

    /// Links two registered components, optionally issuing `CTRL_START`
    /// to both as soon as the wiring succeeds and/or negotiating a global
    /// codec header on an encoder→muxer link. A teardown is always
    /// registered with the context's commit protocol regardless of
    /// `autostart`.
    ///
    /// # Errors
    /// Returns [`TxError::NotFound`] if either id is not registered, or
    /// whatever [`link::link`] returns for an illegal kind pair.
    pub fn link_autostart(
        &self,
        src: ComponentId,
        dst: ComponentId,
        autostart: bool,
        needs_global_header: bool,
        on_ready: impl FnMut(EventArgs<'_>) + Send + 'static,
    ) -> TxResult<Wiring> {
        let (src_kind, src_events) = self.component_entry(src)?;
        let (dst_kind, dst_events) = self.component_entry(dst)?;

        let controllers_for_start = Arc::clone(&self.controllers);
        let epoch_for_start = Arc::clone(&self.epoch);
        let on_start = move || {
            let now = epoch_for_start.now();
            for id in [src, dst] {
                if let Some(controller) = controllers_for_start.get(&id) {
                    controller.post(CtrlMessage::with_payload(CtrlFlags::START, Box::new(now)));
                }
            }
        };

        let controllers_for_discard = Arc::clone(&self.controllers);
        let on_teardown = move || -> TxResult<()> {
            for id in [src, dst] {
                if let Some(controller) = controllers_for_discard.get(&id) {
                    controller.post_flags(CtrlFlags::DISCARD);
                }
            }
            Ok(())
        };

        link::link(
            src,
            src_kind,
            &src_events,
            dst,
            dst_kind,
            &dst_events,
            LinkRequest {
                commit: &self.commit,
                autostart,
                needs_global_header,
            },
            on_start,
            on_teardown,
            || {},
            on_ready,
        )
    }

    #[must_use]
    pub fn component_count(&self) -> usize {
        self.components.len()
    }

    /// Registers `controller` as the worker for `id`, replacing (and
    /// dropping — which stops it) any controller previously attached to
    /// that id.
    pub fn attach_controller(&self, id: ComponentId, controller: Controller) {
        self.controllers.insert(id, controller);
    }

    /// Generic control dispatch, binding [`CtrlFlags`] semantics to this
    /// context's collaborators:
    ///
    /// - `COMMIT`/`DISCARD` run the commit protocol (protocol-wide, not
    ///   scoped to `id`) and surface any failed slot as
    ///   [`TxError::Fatal`].
    /// - `SIGNAL` dispatches `ON_INIT` on `id`'s own event list, which is
    ///   what releases any dependent link staged against it (see
    ///   [`crate::link`]).
    /// - `START` posts a `START` message carrying the current epoch value
    ///   to `id`'s controller.
    /// - `STOP` removes and posts `STOP` to `id`'s controller, then joins
    ///   its worker thread.
    /// - `OPTS`/`COMMAND`/`FLUSH` forward `payload` to `id`'s controller
    ///   unchanged.
    ///
    /// # Errors
    /// Returns [`TxError::NotFound`] if `flags` requires a controller (or
    /// event list) that isn't registered for `id`, or [`TxError::Fatal`]
    /// if a commit/discard pass reports a failed slot.
    pub fn ctrl(
        &self,
        id: ComponentId,
        flags: CtrlFlags,
        payload: Option<Box<dyn Any + Send>>,
    ) -> TxResult<()> {
        if flags.contains(CtrlFlags::COMMIT) {
            let report = self.commit.commit();
            if !report.is_ok() {
                return Err(TxError::Fatal(format!(
                    "commit failed: {:?}",
                    report.failed
                )));
            }
        }
        if flags.contains(CtrlFlags::DISCARD) {
            let report = self.commit.discard();
            if !report.is_ok() {
                return Err(TxError::Fatal(format!(
                    "discard failed: {:?}",
                    report.failed
                )));
            }
        }
        if flags.contains(CtrlFlags::SIGNAL) {
            let events = self
                .event_list_of(id)
                .ok_or_else(|| TxError::NotFound(format!("component {id}")))?;
            events.dispatch(Phase::ON_INIT, crate::event::Category::empty(), None);
        }
        if flags.contains(CtrlFlags::START) {
            let controller = self
                .controllers
                .get(&id)
                .ok_or_else(|| TxError::NotFound(format!("controller {id}")))?;
            let now = self.epoch.now();
            controller.post(CtrlMessage::with_payload(CtrlFlags::START, Box::new(now)));
        }
        if flags.contains(CtrlFlags::STOP) {
            let (_, mut controller) = self
                .controllers
                .remove(&id)
                .ok_or_else(|| TxError::NotFound(format!("controller {id}")))?;
            controller.post_flags(CtrlFlags::STOP);
            controller.join();
        }
        let forward = CtrlFlags::OPTS | CtrlFlags::COMMAND | CtrlFlags::FLUSH;
        if flags.intersects(forward) {
            let controller = self
                .controllers
                .get(&id)
                .ok_or_else(|| TxError::NotFound(format!("controller {id}")))?;
            controller.post(CtrlMessage {
                flags: flags & forward,
                payload,
            });
        }
        Ok(())
    }

    /// Switches the epoch clock to [`EpochMode::Offset`] and sets its
    /// stored value to `offset` microseconds.
    pub fn epoch_set_offset(&self, offset: i64) {
        self.epoch.set_mode(EpochMode::Offset);
        self.epoch.set(offset);
    }

    /// Switches the epoch clock to [`EpochMode::System`] and sets its
    /// stored value to `offset` microseconds.
    pub fn epoch_set_system(&self, offset: i64) {
        self.epoch.set_mode(EpochMode::System);
        self.epoch.set(offset);
    }

    /// Runs every still-pending commit handler. Thin wrapper over
    /// `self.commit.commit()`, named to match the context-level operation
    /// a frontend calls.
    #[must_use]
    pub fn commit(&self) -> CommitReport {
        self.commit.commit()
    }

    /// Runs every still-pending discard handler.
    #[must_use]
    pub fn discard(&self) -> CommitReport {
        self.commit.discard()
    }

    /// Registers `event` on `id`'s event list.
    ///
    /// # Errors
    /// Returns [`TxError::NotFound`] if `id` is not registered.
    pub fn event_register(&self, id: ComponentId, event: Event) -> TxResult<()> {
        self.event_list_of(id)
            .ok_or_else(|| TxError::NotFound(format!("component {id}")))?
            .add(event);
        Ok(())
    }

    /// Removes a previously registered event from `id`'s event list.
    ///
    /// # Errors
    /// Returns [`TxError::NotFound`] if `id` is not registered.
    pub fn event_destroy(&self, id: ComponentId, event: &Event) -> TxResult<()> {
        self.event_list_of(id)
            .ok_or_else(|| TxError::NotFound(format!("component {id}")))?
            .remove(event);
        Ok(())
    }

    /// Tears down `id` entirely: drops its controller (stopping its
    /// worker thread), its registration, and any external-reference
    /// binding that pointed at it.
    pub fn destroy(&self, id: ComponentId) {
        self.controllers.remove(&id);
        self.components.remove(&id);
        self.external_refs.retain(|_, v| *v != id);
    }

    /// Dispatches `ON_INIT` on the context's own root event list, the
    /// context-scoped counterpart to a component's own init signal.
    pub fn init(&self) {
        self.root_events
            .dispatch(Phase::ON_INIT, crate::event::Category::empty(), None);
    }

    /// Tears the whole graph down: every controller (stopping each
    /// worker), every component registration, every external-reference
    /// binding, and the I/O discovery thread.
    pub fn free(&self) {
        self.controllers.clear();
        self.components.clear();
        self.external_refs.clear();
        self.io.stop();
    }
}
