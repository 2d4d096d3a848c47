//! txproto-core — the programmable media pipeline runtime.
//!
//! This crate is the component graph runtime a media pipeline frontend
//! drives: a refcounted object model, a bounded-FIFO transport between
//! components, an event bus, a shared epoch clock, a link negotiator, a
//! commit/discard activation protocol, a per-component controller thread,
//! an I/O source registry, and the main context that ties all of it
//! together.
//!
//! It does not itself decode, demux, mux, or encode anything — that is
//! [`media_ops::MediaOps`], an external collaborator trait this crate
//! depends on but never implements with a real codec. It does not speak
//! to a platform capture API directly either; that lives behind
//! [`io_registry::IoApiBackend`]. And it has no CLI or scripting
//! frontend: [`context::MainContext`] is a library entry point other
//! binaries (see `apps/server`) build on.
//!
//! # Modules
//!
//! - [`object`]: the refcounted, named, kinded [`object::ClassedObject`] handle
//! - [`fifo`]: the bounded queue components pass buffers through
//! - [`event`]: the phase/category event bus each component owns a list of
//! - [`epoch`]: the shared clock one [`context::MainContext`] hands to every component
//! - [`link`]: kind-pair wiring legality and `ON_INIT` handshake staging
//! - [`commit`]: the two-phase commit/discard activation protocol
//! - [`controller`]: the plain-thread control-message loop a component runs on
//! - [`io_registry`]: the discovered capture/playback endpoint catalog
//! - [`context`]: the composition root, [`context::MainContext`]
//! - [`wire`]: the packet-sink framing, cursor-pipe records, and `kymux://` URIs
//! - [`media_ops`]: the external collaborator boundary for actual media work
//! - [`error`]: the runtime's error taxonomy

#![warn(clippy::all)]

pub mod bootstrap;
pub mod commit;
pub mod context;
pub mod controller;
pub mod epoch;
pub mod error;
pub mod event;
pub mod fifo;
pub mod io_registry;
pub mod link;
pub mod media_ops;
pub mod object;
pub mod protocol_constants;
pub mod wire;

pub use bootstrap::{bootstrap_demo_pipeline, Pipeline};
pub use commit::{CommitProtocol, CommitReport};
pub use context::{ComponentHandle, MainContext};
pub use controller::{ComponentWorker, Controller, CtrlFlags, CtrlMessage};
pub use epoch::{EpochClock, EpochMode};
pub use error::{ErrorCode, TxError, TxResult};
pub use event::{Category, ComponentId, Event, EventArgs, EventFlags, EventList, Phase};
pub use fifo::{Fifo, FifoFlags, PopOutcome};
pub use io_registry::{IoApiBackend, IoEntry, IoRegistry};
pub use link::Wiring;
pub use media_ops::{Decoder, DemuxStream, Encoder, MediaOps, Muxer, RawFrame, RawPacket};
pub use object::{ClassedObject, Kind, KindFamily};
pub use wire::{CodecFourcc, CodecHeader, CursorRecord, Endpoint, PacketSinkConnection, StreamPacket};
