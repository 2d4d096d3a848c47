//! Wire formats owned by this crate: the packet-sink binary framing used
//! by [`crate::object::Kind::PacketSink`] components, the cursor-pipe
//! record format used for local IPC snapshots, and the `kymux://`
//! endpoint URI scheme components use to describe where their I/O goes.
//!
//! Actual encoded media bytes are opaque here — this module only frames
//! them. Producing/consuming the payload itself is a [`crate::media_ops`]
//! concern.
//!
//! The packet-sink stream is not one uniform frame shape: a codec header
//! is sent exactly once, before any other frame, then every subsequent
//! frame is either a config packet (extradata changed) or a media packet.
//! Config and media packets share one on-wire layout — a `u64` of
//! flags-or-pts followed by a `u32` payload length — distinguished by the
//! `KYMUX_FLAG_CONFIG` bit, which is how the original C packet sink tells
//! them apart too.

use std::io::{Read, Write};
use std::net::{TcpListener, TcpStream};

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::error::TxError;

/// Bit 63: always set on every frame after the codec header. Mirrors the
/// original `KYMUX_FLAG_KYMEDIA`.
pub const KYMUX_FLAG_KYMEDIA: u64 = 1 << 63;
/// Bit 62: set on a config packet, clear on a media packet.
pub const KYMUX_FLAG_CONFIG: u64 = 1 << 62;
/// Bit 61: set when a media packet's payload is a keyframe. Meaningless on
/// a config packet.
pub const KYMUX_FLAG_KEY: u64 = 1 << 61;
/// The low 61 bits of a media packet's first `u64` are the PTS, modulo
/// 2^61.
pub const KYMUX_PTS_MASK: u64 = (1u64 << 61) - 1;

/// The closed set of codec fourccs the packet-sink protocol frames.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CodecFourcc {
    H264,
    H265,
    H266,
    Opus,
}

impl CodecFourcc {
    #[must_use]
    pub const fn as_u32(self) -> u32 {
        match self {
            CodecFourcc::H264 => 0x6832_3634,
            CodecFourcc::H265 => 0x6832_3635,
            CodecFourcc::H266 => 0x6832_3636,
            CodecFourcc::Opus => 0x6F70_7573,
        }
    }

    #[must_use]
    pub const fn from_u32(v: u32) -> Option<Self> {
        match v {
            0x6832_3634 => Some(CodecFourcc::H264),
            0x6832_3635 => Some(CodecFourcc::H265),
            0x6832_3636 => Some(CodecFourcc::H266),
            0x6F70_7573 => Some(CodecFourcc::Opus),
            _ => None,
        }
    }
}

/// The codec header: `u32 fourcc + u8 rotation + u8[7] reserved(=0)`. Sent
/// exactly once per stream, before any config or media packet.
pub const CODEC_HEADER_LEN: usize = 12;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CodecHeader {
    pub fourcc: CodecFourcc,
    /// Rotation in quarter turns, `0..=3`.
    pub rotation: u8,
}

impl CodecHeader {
    #[must_use]
    pub fn encode(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(CODEC_HEADER_LEN);
        buf.put_u32(self.fourcc.as_u32());
        buf.put_u8(self.rotation);
        buf.put_bytes(0, 7);
        buf.freeze()
    }

    /// Decodes one codec header from the front of `buf`.
    ///
    /// # Errors
    /// Returns [`TxError::InvalidArg`] for an unrecognized fourcc or an
    /// out-of-range rotation.
    pub fn decode(buf: &[u8]) -> Result<Option<(Self, usize)>, TxError> {
        if buf.len() < CODEC_HEADER_LEN {
            return Ok(None);
        }
        let mut header = &buf[..CODEC_HEADER_LEN];
        let fourcc_raw = header.get_u32();
        let rotation = header.get_u8();

        let fourcc = CodecFourcc::from_u32(fourcc_raw)
            .ok_or_else(|| TxError::InvalidArg(format!("unknown codec fourcc {fourcc_raw:#010x}")))?;
        if rotation > 3 {
            return Err(TxError::InvalidArg(format!("invalid rotation {rotation}")));
        }

        Ok(Some((Self { fourcc, rotation }, CODEC_HEADER_LEN)))
    }
}

/// The shared 12-byte header of a config or media packet: `u64
/// flags_or_pts + u32 payload_size`, followed by `payload_size` bytes.
pub const STREAM_PACKET_HEADER_LEN: usize = 12;

/// A config packet (out-of-band extradata change) or a media packet
/// (one encoded frame), sharing one wire layout.
#[derive(Debug, Clone)]
pub struct StreamPacket {
    /// `true` for a config packet, `false` for a media packet.
    pub is_config: bool,
    /// Meaningless when `is_config`.
    pub key: bool,
    /// Meaningless when `is_config`. Stored already folded into
    /// `0..2^61` — see [`KYMUX_PTS_MASK`].
    pub pts: i64,
    pub payload: Bytes,
}

impl StreamPacket {
    #[must_use]
    pub fn config(extradata: Bytes) -> Self {
        Self {
            is_config: true,
            key: false,
            pts: 0,
            payload: extradata,
        }
    }

    #[must_use]
    pub fn media(pts: i64, key: bool, payload: Bytes) -> Self {
        Self {
            is_config: false,
            key,
            pts,
            payload,
        }
    }

    #[must_use]
    pub fn encode(&self) -> Bytes {
        let mut flags = KYMUX_FLAG_KYMEDIA;
        if self.is_config {
            flags |= KYMUX_FLAG_CONFIG;
        } else {
            flags |= (self.pts as u64) & KYMUX_PTS_MASK;
            if self.key {
                flags |= KYMUX_FLAG_KEY;
            }
        }

        let mut buf = BytesMut::with_capacity(STREAM_PACKET_HEADER_LEN + self.payload.len());
        buf.put_u64(flags);
        buf.put_u32(self.payload.len() as u32);
        buf.extend_from_slice(&self.payload);
        buf.freeze()
    }

    /// Decodes one config or media packet from the front of `buf`.
    ///
    /// # Errors
    /// Returns [`TxError::InvalidArg`] if the `KYMEDIA` bit is clear —
    /// this layout is only ever used for frames following a codec header.
    pub fn decode(buf: &[u8]) -> Result<Option<(Self, usize)>, TxError> {
        if buf.len() < STREAM_PACKET_HEADER_LEN {
            return Ok(None);
        }
        let mut header = &buf[..STREAM_PACKET_HEADER_LEN];
        let flags = header.get_u64();
        let payload_len = header.get_u32() as usize;

        let total = STREAM_PACKET_HEADER_LEN + payload_len;
        if buf.len() < total {
            return Ok(None);
        }

        if flags & KYMUX_FLAG_KYMEDIA == 0 {
            return Err(TxError::InvalidArg("packet missing KYMEDIA flag".into()));
        }
        let is_config = flags & KYMUX_FLAG_CONFIG != 0;
        let key = !is_config && flags & KYMUX_FLAG_KEY != 0;
        let pts = (flags & KYMUX_PTS_MASK) as i64;
        let payload = Bytes::copy_from_slice(&buf[STREAM_PACKET_HEADER_LEN..total]);

        Ok(Some((
            Self {
                is_config,
                key,
                pts,
                payload,
            },
            total,
        )))
    }
}

/// A blocking TCP connection to a packet-sink endpoint, after the
/// endpoint handshake has completed.
pub struct PacketSinkConnection {
    stream: TcpStream,
}

impl PacketSinkConnection {
    /// Connects to `endpoint`'s `host:port`, sends its 2-byte endpoint id
    /// in network order, and waits for the 1-byte sync reply.
    ///
    /// # Errors
    /// Returns [`TxError::External`] if the connect, write, or read fails.
    pub fn connect(endpoint: &Endpoint) -> Result<Self, TxError> {
        let mut stream = TcpStream::connect((endpoint.host.as_str(), endpoint.port))
            .map_err(io_err)?;
        stream.write_all(&endpoint.id.to_be_bytes()).map_err(io_err)?;
        let mut sync = [0u8; 1];
        stream.read_exact(&mut sync).map_err(io_err)?;
        Ok(Self { stream })
    }

    /// Writes the stream's codec header. Must be the first frame sent.
    ///
    /// # Errors
    /// Returns [`TxError::External`] if the write fails.
    pub fn send_codec_header(&mut self, header: &CodecHeader) -> Result<(), TxError> {
        self.stream.write_all(&header.encode()).map_err(io_err)
    }

    /// Writes one config or media packet.
    ///
    /// # Errors
    /// Returns [`TxError::External`] if the write fails.
    pub fn send_packet(&mut self, packet: &StreamPacket) -> Result<(), TxError> {
        self.stream.write_all(&packet.encode()).map_err(io_err)
    }
}

fn io_err(e: std::io::Error) -> TxError {
    TxError::External(e.raw_os_error().unwrap_or(-1))
}

/// One cursor-pipe record: always a display id and a visibility flag, and
/// — only when visible — position, hotspot, dimensions, and the ARGB
/// pixel buffer for that cursor's current bitmap.
#[derive(Debug, Clone, PartialEq)]
pub struct CursorRecord {
    pub display_id: u32,
    pub visible: bool,
    pub x: u32,
    pub y: u32,
    pub hotspot_x: u32,
    pub hotspot_y: u32,
    pub width: u32,
    pub height: u32,
    /// ARGB pixels, `width * height` of them when populated; kept as a
    /// flat buffer (not a `width`-by-`height` matrix type) to match the
    /// wire layout exactly.
    pub pixels: Vec<u32>,
}

/// The fixed prefix every record carries: `u32 display_id, u8 visible`.
const CURSOR_RECORD_PREFIX_LEN: usize = 5;
/// The fixed portion that follows the prefix when `visible` is set: six
/// `u32` fields plus the pixel-buffer `size` field.
const CURSOR_RECORD_VISIBLE_FIELDS_LEN: usize = 4 * 7;

impl CursorRecord {
    /// A hidden-cursor record for `display_id`.
    #[must_use]
    pub fn hidden(display_id: u32) -> Self {
        Self {
            display_id,
            visible: false,
            x: 0,
            y: 0,
            hotspot_x: 0,
            hotspot_y: 0,
            width: 0,
            height: 0,
            pixels: Vec::new(),
        }
    }

    #[must_use]
    pub fn encode(&self) -> Bytes {
        let mut len = CURSOR_RECORD_PREFIX_LEN;
        if self.visible {
            len += CURSOR_RECORD_VISIBLE_FIELDS_LEN + 4 * self.pixels.len();
        }
        let mut buf = BytesMut::with_capacity(len);
        buf.put_u32(self.display_id);
        buf.put_u8(u8::from(self.visible));
        if self.visible {
            buf.put_u32(self.x);
            buf.put_u32(self.y);
            buf.put_u32(self.hotspot_x);
            buf.put_u32(self.hotspot_y);
            buf.put_u32(self.width);
            buf.put_u32(self.height);
            buf.put_u32(self.pixels.len() as u32);
            for pixel in &self.pixels {
                buf.put_u32(*pixel);
            }
        }
        buf.freeze()
    }

    /// Decodes one cursor record from the front of `buf`.
    ///
    /// # Errors
    /// Returns [`TxError::InvalidArg`] if the visibility byte is neither
    /// 0 nor 1.
    pub fn decode(buf: &[u8]) -> Result<Option<(Self, usize)>, TxError> {
        if buf.len() < CURSOR_RECORD_PREFIX_LEN {
            return Ok(None);
        }
        let mut prefix = &buf[..CURSOR_RECORD_PREFIX_LEN];
        let display_id = prefix.get_u32();
        let visible_raw = prefix.get_u8();
        let visible = match visible_raw {
            0 => false,
            1 => true,
            other => return Err(TxError::InvalidArg(format!("invalid visible byte {other}"))),
        };

        if !visible {
            return Ok(Some((Self::hidden(display_id), CURSOR_RECORD_PREFIX_LEN)));
        }

        if buf.len() < CURSOR_RECORD_PREFIX_LEN + CURSOR_RECORD_VISIBLE_FIELDS_LEN {
            return Ok(None);
        }
        let mut fields = &buf[CURSOR_RECORD_PREFIX_LEN..CURSOR_RECORD_PREFIX_LEN + CURSOR_RECORD_VISIBLE_FIELDS_LEN];
        let x = fields.get_u32();
        let y = fields.get_u32();
        let hotspot_x = fields.get_u32();
        let hotspot_y = fields.get_u32();
        let width = fields.get_u32();
        let height = fields.get_u32();
        let size = fields.get_u32() as usize;

        let pixels_start = CURSOR_RECORD_PREFIX_LEN + CURSOR_RECORD_VISIBLE_FIELDS_LEN;
        let total = pixels_start + 4 * size;
        if buf.len() < total {
            return Ok(None);
        }
        let mut pixel_bytes = &buf[pixels_start..total];
        let mut pixels = Vec::with_capacity(size);
        for _ in 0..size {
            pixels.push(pixel_bytes.get_u32());
        }

        Ok(Some((
            Self {
                display_id,
                visible: true,
                x,
                y,
                hotspot_x,
                hotspot_y,
                width,
                height,
                pixels,
            },
            total,
        )))
    }
}

/// A parsed `kymux://host:port/<hex endpoint id>` endpoint URI. `id` is
/// the 2-byte endpoint identifier sent, in network order, as the first
/// thing over the TCP connection a sink opens to `host:port`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    pub host: String,
    pub port: u16,
    pub id: u16,
}

const ENDPOINT_SCHEME: &str = "kymux://";

impl Endpoint {
    /// Parses a `kymux://` URI.
    ///
    /// # Errors
    /// Returns [`TxError::InvalidArg`] if the scheme is missing, the host
    /// or port segment is malformed, or the path is not a valid hex
    /// endpoint id.
    pub fn parse(uri: &str) -> Result<Self, TxError> {
        let rest = uri
            .strip_prefix(ENDPOINT_SCHEME)
            .ok_or_else(|| TxError::InvalidArg(format!("missing {ENDPOINT_SCHEME} scheme")))?;

        let (authority, path) = rest
            .split_once('/')
            .ok_or_else(|| TxError::InvalidArg("missing endpoint id".into()))?;

        let (host, port_str) = authority
            .rsplit_once(':')
            .ok_or_else(|| TxError::InvalidArg("missing port".into()))?;
        if host.is_empty() {
            return Err(TxError::InvalidArg("missing host".into()));
        }
        let port = port_str
            .parse::<u16>()
            .map_err(|_| TxError::InvalidArg(format!("invalid port {port_str}")))?;

        let id = u16::from_str_radix(path, 16)
            .map_err(|_| TxError::InvalidArg(format!("invalid hex endpoint id {path}")))?;

        Ok(Self {
            host: host.to_string(),
            port,
            id,
        })
    }
}
