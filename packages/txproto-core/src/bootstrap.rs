//! Composition root for wiring a small demo graph together.
//!
//! This is not part of the component model itself — it is the pattern an
//! embedder (a CLI frontend, a test) follows to stand one up: build a
//! [`MainContext`], register components, link them in dependency order,
//! bind a couple of names into the external-reference table, and hand the
//! result back as one [`Pipeline`] value.

use std::sync::Arc;

use crate::context::{ComponentHandle, MainContext};
use crate::epoch::EpochMode;
use crate::error::TxResult;
use crate::media_ops::MediaOps;
use crate::object::Kind;

/// A minimal demux → decode → encode → mux chain, wired and ready to
/// commit.
pub struct Pipeline {
    pub ctx: Arc<MainContext>,
    pub demux: ComponentHandle,
    pub decoder: ComponentHandle,
    pub encoder: ComponentHandle,
    pub muxer: ComponentHandle,
    media_ops: Arc<dyn MediaOps>,
}

impl Pipeline {
    #[must_use]
    pub fn media_ops(&self) -> &Arc<dyn MediaOps> {
        &self.media_ops
    }
}

/// Builds and wires a demux → decoder → encoder → muxer chain against
/// `media_ops`.
///
/// Wiring order matters the same way it does in the production topology:
/// each [`MainContext::link`] call stages its `ON_INIT` handshake against
/// whichever side hasn't initialized yet, so linking source-to-sink in
/// source order (rather than, say, muxer first) keeps every link in the
/// cheap "already initialized" path once the graph actually starts.
///
/// # Errors
/// Propagates a [`crate::error::TxError::Unsupported`] if any adjacent
/// pair in the chain is not a legal kind pair (it always is, for the
/// fixed chain this builds — kept fallible because [`MainContext::link`]
/// is).
pub fn bootstrap_demo_pipeline(media_ops: Arc<dyn MediaOps>) -> TxResult<Pipeline> {
    let ctx = MainContext::new(EpochMode::Offset, Vec::new());

    let demux = ctx.register(Kind::Demuxer);
    let decoder = ctx.register(Kind::Decoder);
    let encoder = ctx.register(Kind::Encoder);
    let muxer = ctx.register(Kind::Muxer);

    ctx.link(demux.id, decoder.id, |_| {})?;
    ctx.link(decoder.id, encoder.id, |_| {})?;
    ctx.link(encoder.id, muxer.id, |_| {})?;

    ctx.bind_external("input0", demux.id);
    ctx.bind_external("output0", muxer.id);

    Ok(Pipeline {
        ctx,
        demux,
        decoder,
        encoder,
        muxer,
        media_ops,
    })
}
