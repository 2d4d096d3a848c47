//! Link Negotiator — decides how two component kinds should be wired
//! together, stages the `ON_INIT` handshake between them, negotiates an
//! encoder's global-header requirement with the muxer(s) it feeds, and
//! (when asked to autostart) starts the link and always registers its
//! teardown.
//!
//! Wiring two components is more than checking the kind pair is legal:
//! the destination's `ON_INIT` handler for this link can only run once
//! the source has itself reached `ON_INIT`. If the source got there
//! first, the handler runs immediately at registration time. Otherwise it
//! is staged as a `DEPENDENCY` event that the source's own `ON_INIT`
//! dispatch releases (see [`crate::event::EventList::release_dependencies`]).

use std::sync::Arc;

use crate::commit::CommitProtocol;
use crate::error::{TxError, TxResult};
use crate::event::{Category, ComponentId, Event, EventFlags, EventList, Phase};
use crate::object::Kind;

/// The concrete wiring action the negotiator chose for a `(src, dst)`
/// kind pair, per the source-kind → destination-kind table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkAction {
    /// Maps the source's output pad directly onto the destination's input
    /// pad (filter→filter, filter→sink, decoder/source→filter).
    MapPad,
    /// Mirrors the source's FIFO into the destination's input FIFO rather
    /// than sharing a single pad (source/decoder→encoder).
    MirrorFifo,
    /// Adds a new stream on the destination muxer and mirrors the
    /// source encoder's packet FIFO into it.
    AddStreamAndMirror,
    /// Connects a demuxer stream (by id/descriptor) straight to a decoder.
    ConnectStream,
}

/// The outcome of a successful [`link`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Wiring {
    pub action: LinkAction,
}

/// Table-driven action selection for a `(src, dst)` kind pair, per the
/// specification's wiring table (source/filter/encoder/muxer/decoder/
/// interface).
///
/// # Errors
/// Returns [`TxError::Unsupported`] for a pair not in the table.
pub fn action_for(src: Kind, dst: Kind) -> Result<LinkAction, TxError> {
    use Kind::*;
    use LinkAction::*;

    let action = match (src, dst) {
        // *_SOURCE -> filter: map source FIFO into destination filter pad.
        (AudioSrc | VideoSrc | SubSrc | Demuxer, Filter) => MapPad,
        // *_SOURCE -> encoder: mirror source FIFO into encoder input FIFO.
        (AudioSrc | VideoSrc | SubSrc, Encoder) => MirrorFifo,
        // *_SOURCE -> interface: mirror source FIFO into interface FIFO.
        (AudioSrc | VideoSrc | SubSrc, Interface) => MirrorFifo,

        // Decoder -> filter: map decoder frame FIFO into filter pad.
        (Decoder, Filter) => MapPad,
        // Decoder -> {encoder, interface, *_SINK}: mirror frame FIFO.
        (Decoder, Encoder | Interface | AudioSink | VideoSink | SubSink) => MirrorFifo,

        // Filter -> filter: pad to pad.
        (Filter, Filter) => MapPad,
        // Filter -> encoder: pad to encoder input FIFO.
        (Filter, Encoder) => MapPad,
        // Filter -> interface: pad to interface FIFO.
        (Filter, Interface) => MapPad,
        // Filter -> *_SINK: pad to pad.
        (Filter, AudioSink | VideoSink | SubSink) => MapPad,

        // Encoder -> muxer: add stream + mirror packet FIFO.
        (Encoder, Muxer) => AddStreamAndMirror,

        // Demuxer -> decoder: connect (stream id/desc).
        (Demuxer, Decoder) => ConnectStream,
        // Demuxer -> a raw packet sink: treated as a direct stream connect.
        (Demuxer, PacketSink) => ConnectStream,

        // Muxer -> its own output sink: pad/FIFO map, same shape as Filter->*_SINK.
        (Muxer, MuxerSink) => MapPad,

        // Interface/script attaching to the owning context.
        (Interface | Script, Context) => MapPad,

        _ => return Err(TxError::Unsupported("kind pair is not linkable")),
    };
    Ok(action)
}

/// Convenience boolean form of [`action_for`].
#[must_use]
pub fn is_wireable(src: Kind, dst: Kind) -> bool {
    action_for(src, dst).is_ok()
}

/// Parameters a caller supplies to [`link`] beyond the two endpoints
/// themselves.
pub struct LinkRequest<'a> {
    pub commit: &'a CommitProtocol,
    /// When set, the negotiator issues `CTRL_START` to both endpoints
    /// (via `on_start`) as soon as linking succeeds. A matching teardown
    /// is registered with `commit` either way.
    pub autostart: bool,
    /// Whether the muxer side of an encoder→muxer link demands a global
    /// header. Ignored for every other kind pair.
    pub needs_global_header: bool,
}

/// Wires `dst_list` to run `on_ready` once `src` has reached `ON_INIT`,
/// selects the `(src_kind, dst_kind)` wiring action, negotiates the
/// encoder→muxer global-header flag, and (per `req.autostart`) starts the
/// link immediately while always registering its teardown with
/// `req.commit`.
///
/// # Errors
/// Returns [`TxError::Unsupported`] if `(src_kind, dst_kind)` is not a
/// legal pair.
#[allow(clippy::too_many_arguments)]
pub fn link(
    src: ComponentId,
    src_kind: Kind,
    src_list: &Arc<EventList>,
    dst: ComponentId,
    dst_kind: Kind,
    dst_list: &Arc<EventList>,
    req: LinkRequest<'_>,
    mut on_start: impl FnMut() + Send + 'static,
    mut on_teardown: impl FnMut() -> TxResult<()> + Send + 'static,
    mut on_global_header_required: impl FnMut() + Send + 'static,
    on_ready: impl FnMut(crate::event::EventArgs<'_>) + Send + 'static,
) -> Result<Wiring, TxError> {
    let action = action_for(src_kind, dst_kind)?;

    if src_list.has_dispatched(Phase::ON_INIT) {
        dst_list.add(Event::new(
            Phase::ON_INIT,
            Category::TYPE_LINK,
            EventFlags::IMMEDIATE | EventFlags::ONESHOT,
            dst,
            Some(src),
            on_ready,
        ));
    } else {
        dst_list.add(Event::new(
            Phase::ON_INIT,
            Category::TYPE_LINK,
            EventFlags::ONESHOT | EventFlags::DEPENDENCY,
            dst,
            Some(src),
            on_ready,
        ));
        let dst_list_for_release = Arc::clone(dst_list);
        src_list.add(Event::new(
            Phase::ON_INIT,
            Category::TYPE_LINK,
            EventFlags::ONESHOT,
            src,
            None,
            move |_| {
                dst_list_for_release.release_dependencies(src, Phase::ON_INIT);
            },
        ));
    }

    // Encoder<->muxer global-header negotiation: install a one-shot
    // ON_CONFIG event on the encoder that sets need_global_header. Several
    // muxers may drive the same encoder, each installing its own such
    // event; the caller's flag is OR-combined simply because each of
    // these fires independently and none of them clear it.
    if action == LinkAction::AddStreamAndMirror && req.needs_global_header {
        src_list.add(Event::new(
            Phase::ON_CONFIG,
            Category::empty(),
            EventFlags::ONESHOT,
            src,
            None,
            move |_| on_global_header_required(),
        ));
    }

    if req.autostart {
        on_start();
    }
    // Discard registration always happens, autostart or not.
    req.commit
        .register(format!("link:{src}->{dst}"), || Ok(()), move || on_teardown());

    Ok(Wiring { action })
}
