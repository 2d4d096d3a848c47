//! Fixed constants for the runtime's own wire formats and defaults. Values
//! here are either mandated by a format this crate defines itself (the
//! packet-sink framing, the `kymux://` scheme) or are defaults a
//! `main_context` is free to override, not external protocol constraints.

/// Service identifier advertised by an [`crate::io_registry::IoApiBackend`]
/// discovery thread's tracing spans, and by anything that needs to name
/// this runtime in a log line.
pub const SERVICE_ID: &str = "txproto";

// ─────────────────────────────────────────────────────────────────────────────
// FIFO defaults
// ─────────────────────────────────────────────────────────────────────────────

/// Default bounded-FIFO capacity for a link with no explicit size, chosen
/// to absorb a few packets' worth of jitter without real bounds on
/// memory.
pub const DEFAULT_FIFO_CAPACITY: usize = 16;

// ─────────────────────────────────────────────────────────────────────────────
// I/O discovery
// ─────────────────────────────────────────────────────────────────────────────

/// Default interval between [`crate::io_registry::IoRegistry`] background
/// enumeration passes.
pub const DEFAULT_IO_DISCOVERY_INTERVAL_SECS: u64 = 2;

// ─────────────────────────────────────────────────────────────────────────────
// Packet-sink wire format
// ─────────────────────────────────────────────────────────────────────────────

/// Current packet-sink framing version. Bumped only if the 12-byte header
/// layouts in [`crate::wire::CodecHeader`]/[`crate::wire::StreamPacket`]
/// change.
pub const PACKET_SINK_VERSION: u8 = 1;
