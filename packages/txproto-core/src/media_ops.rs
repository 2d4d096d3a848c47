//! External collaborator boundary for actual media work.
//!
//! Everything in this crate — the object model, event bus, FIFOs, link
//! negotiation, the commit/discard protocol, the controller, the main
//! context — exists to wire components together and move buffers between
//! them. None of it knows how to decode a frame or mux a container; that
//! is deliberately out of scope (see the specification's Non-goals), and
//! is instead expressed as the [`MediaOps`] trait family so a concrete
//! backend (an FFI binding to a real codec/demux/mux library, or a test
//! double) can be plugged in without this crate depending on it.

use bytes::Bytes;

use crate::error::TxResult;

/// One encoded packet, either read from a demuxer or produced by an
/// encoder.
#[derive(Debug, Clone)]
pub struct RawPacket {
    pub stream_index: u32,
    pub pts: i64,
    pub data: Bytes,
}

/// One decoded frame, either produced by a decoder or about to be fed to
/// an encoder/filter.
#[derive(Debug, Clone)]
pub struct RawFrame {
    pub pts: i64,
    pub data: Bytes,
}

/// Opens demuxers, decoders, encoders, and muxers for a concrete media
/// backend. Implementations own whatever native handles or FFI bindings
/// that requires; this crate only ever sees the trait objects below.
pub trait MediaOps: Send + Sync {
    /// Opens a demuxer reading from `uri`.
    fn demux_open(&self, uri: &str) -> TxResult<Box<dyn DemuxStream>>;

    /// Opens a decoder for `codec_name`, given its extradata (may be
    /// empty for codecs that don't use one).
    fn decoder_open(&self, codec_name: &str, extradata: &[u8]) -> TxResult<Box<dyn Decoder>>;

    /// Opens an encoder for `codec_name` with the given options (e.g.
    /// bitrate, resolution — left as opaque key/value pairs since this
    /// crate does not interpret codec options).
    fn encoder_open(&self, codec_name: &str, options: &[(String, String)])
        -> TxResult<Box<dyn Encoder>>;

    /// Opens a muxer for `format_name`, writing to `uri`.
    fn muxer_open(&self, format_name: &str, uri: &str) -> TxResult<Box<dyn Muxer>>;

    /// Whether a muxer for `format_name` demands a global (in extradata,
    /// not in-band) codec header. Queried by [`crate::link`] whenever it
    /// wires an encoder to a muxer, so the encoder can be told to emit one
    /// before its first packet. Most container formats need this
    /// (`mp4`, `mov`, `mkv`); stream-oriented ones don't (`mpegts`).
    /// Default `false` — concrete backends override per format.
    fn needs_global_header(&self, _format_name: &str) -> bool {
        false
    }

    /// Called once when a component starts processing, with the current
    /// main-context epoch value in microseconds, so the concrete object a
    /// `demux_open`/`decoder_open`/etc. call produced can stamp its own
    /// timestamps as `monotonic_now - epoch_now`. Default no-op — the mock
    /// backend below has no wall-clock-relative behavior to seed.
    fn start(&self, _epoch_now: i64) {}
}

pub trait DemuxStream: Send {
    /// Reads the next packet, or `Ok(None)` at end of stream.
    fn read_packet(&mut self) -> TxResult<Option<RawPacket>>;
}

pub trait Decoder: Send {
    fn send_packet(&mut self, packet: &RawPacket) -> TxResult<()>;
    /// Drains one decoded frame. May need to be called more than once per
    /// `send_packet` (B-frame reordering, etc.) until it returns `None`.
    fn receive_frame(&mut self) -> TxResult<Option<RawFrame>>;
}

pub trait Encoder: Send {
    fn send_frame(&mut self, frame: &RawFrame) -> TxResult<()>;
    /// Drains one encoded packet, or `None` if the encoder needs more
    /// frames before it can produce output.
    fn receive_packet(&mut self) -> TxResult<Option<RawPacket>>;
    /// Returns the codec's extradata/initialization data, valid only once
    /// the encoder has produced at least one packet.
    fn extradata(&self) -> Option<Bytes>;
}

pub trait Muxer: Send {
    fn write_packet(&mut self, packet: &RawPacket) -> TxResult<()>;
    /// Flushes and closes the container. Called exactly once, from the
    /// `ON_DISCARD` handler of the owning muxer component.
    fn finalize(&mut self) -> TxResult<()>;
}

/// A loopback [`MediaOps`] implementation that never touches a real
/// codec: decoders and encoders pass their input straight through as
/// output, and the muxer/demuxer are in-memory queues. Used by the demo
/// binary and by this crate's own integration tests to exercise graph
/// wiring without a native media dependency.
pub mod mock {
    use super::{DemuxStream, Decoder, Encoder, Muxer, RawFrame, RawPacket};
    use crate::error::TxResult;
    use bytes::Bytes;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    pub struct MockMediaOps;

    impl super::MediaOps for MockMediaOps {
        fn demux_open(&self, _uri: &str) -> TxResult<Box<dyn DemuxStream>> {
            Ok(Box::new(MockDemux {
                packets: VecDeque::new(),
            }))
        }

        fn decoder_open(
            &self,
            _codec_name: &str,
            _extradata: &[u8],
        ) -> TxResult<Box<dyn Decoder>> {
            Ok(Box::new(PassThroughDecoder {
                pending: VecDeque::new(),
            }))
        }

        fn encoder_open(
            &self,
            _codec_name: &str,
            _options: &[(String, String)],
        ) -> TxResult<Box<dyn Encoder>> {
            Ok(Box::new(PassThroughEncoder {
                pending: VecDeque::new(),
            }))
        }

        fn muxer_open(&self, _format_name: &str, _uri: &str) -> TxResult<Box<dyn Muxer>> {
            Ok(Box::new(MockMuxer {
                written: Mutex::new(Vec::new()),
            }))
        }

        /// Mirrors the real-world split: fragmented/file container formats
        /// need a global header, stream-oriented ones don't.
        fn needs_global_header(&self, format_name: &str) -> bool {
            matches!(format_name, "mp4" | "mov" | "mkv")
        }
    }

    /// A demuxer that plays back a fixed, caller-supplied packet queue —
    /// feed it via [`MockDemux::push`] before wiring it into a graph.
    pub struct MockDemux {
        packets: VecDeque<RawPacket>,
    }

    impl MockDemux {
        pub fn push(&mut self, packet: RawPacket) {
            self.packets.push_back(packet);
        }
    }

    impl DemuxStream for MockDemux {
        fn read_packet(&mut self) -> TxResult<Option<RawPacket>> {
            Ok(self.packets.pop_front())
        }
    }

    struct PassThroughDecoder {
        pending: VecDeque<RawFrame>,
    }

    impl Decoder for PassThroughDecoder {
        fn send_packet(&mut self, packet: &RawPacket) -> TxResult<()> {
            self.pending.push_back(RawFrame {
                pts: packet.pts,
                data: packet.data.clone(),
            });
            Ok(())
        }

        fn receive_frame(&mut self) -> TxResult<Option<RawFrame>> {
            Ok(self.pending.pop_front())
        }
    }

    struct PassThroughEncoder {
        pending: VecDeque<RawPacket>,
    }

    impl Encoder for PassThroughEncoder {
        fn send_frame(&mut self, frame: &RawFrame) -> TxResult<()> {
            self.pending.push_back(RawPacket {
                stream_index: 0,
                pts: frame.pts,
                data: frame.data.clone(),
            });
            Ok(())
        }

        fn receive_packet(&mut self) -> TxResult<Option<RawPacket>> {
            Ok(self.pending.pop_front())
        }

        fn extradata(&self) -> Option<Bytes> {
            None
        }
    }

    struct MockMuxer {
        written: Mutex<Vec<RawPacket>>,
    }

    impl Muxer for MockMuxer {
        fn write_packet(&mut self, packet: &RawPacket) -> TxResult<()> {
            self.written.lock().unwrap().push(packet.clone());
            Ok(())
        }

        fn finalize(&mut self) -> TxResult<()> {
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::mock::MockMediaOps;
    use super::*;

    #[test]
    fn passthrough_decoder_forwards_bytes_unchanged() {
        let ops = MockMediaOps;
        let mut decoder = ops.decoder_open("mock", &[]).unwrap();
        decoder
            .send_packet(&RawPacket {
                stream_index: 0,
                pts: 10,
                data: Bytes::from_static(b"frame-bytes"),
            })
            .unwrap();
        let frame = decoder.receive_frame().unwrap().unwrap();
        assert_eq!(frame.pts, 10);
        assert_eq!(&frame.data[..], b"frame-bytes");
        assert!(decoder.receive_frame().unwrap().is_none());
    }

    #[test]
    fn passthrough_encoder_forwards_bytes_unchanged() {
        let ops = MockMediaOps;
        let mut encoder = ops.encoder_open("mock", &[]).unwrap();
        encoder
            .send_frame(&RawFrame {
                pts: 5,
                data: Bytes::from_static(b"encoded"),
            })
            .unwrap();
        let packet = encoder.receive_packet().unwrap().unwrap();
        assert_eq!(packet.pts, 5);
        assert_eq!(&packet.data[..], b"encoded");
    }

    #[test]
    fn global_header_requirement_is_format_specific() {
        let ops = MockMediaOps;
        assert!(ops.needs_global_header("mp4"));
        assert!(!ops.needs_global_header("mpegts"));
    }

    #[test]
    fn muxer_finalize_is_idempotent_for_callers() {
        let ops = MockMediaOps;
        let mut muxer = ops.muxer_open("mock", "kymux://out").unwrap();
        muxer
            .write_packet(&RawPacket {
                stream_index: 0,
                pts: 0,
                data: Bytes::new(),
            })
            .unwrap();
        assert!(muxer.finalize().is_ok());
    }
}
