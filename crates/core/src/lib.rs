//! # rtsp — RTSP/1.0 server library for live H.265/AAC streaming
//!
//! Publishes one locally produced H.265 video track and one AAC audio
//! track to a small, fixed number of RTSP clients over interleaved
//! RTP-over-TCP (RFC 2326 §10.12), driven entirely by OS threads and
//! condition variables — no async runtime.
//!
//! ## Protocol references
//!
//! | RFC | Topic | How this crate uses it |
//! |-----|-------|------------------------|
//! | [RFC 2326](https://tools.ietf.org/html/rfc2326) | RTSP 1.0 | Request/response parsing, session lifecycle, interleaved transport |
//! | [RFC 3550](https://tools.ietf.org/html/rfc3550) | RTP/RTCP | Packet header format, SSRC/sequence semantics, Sender Reports |
//! | [RFC 4566](https://tools.ietf.org/html/rfc4566) | SDP | Session description generation for DESCRIBE responses |
//! | [RFC 7798](https://tools.ietf.org/html/rfc7798) | H.265 RTP payload | NAL unit packetization, FU fragmentation, SDP fmtp attributes |
//! | [RFC 3640](https://tools.ietf.org/html/rfc3640) | AAC RTP payload | MPEG4-GENERIC AAC-hbr packetization |
//!
//! ## Architecture
//!
//! ```text
//! ┌────────────────────────────────────────────┐
//! │  RtspServer      — accept loop, slot table  │
//! ├────────────────────────────────────────────┤
//! │  RtspClient      — per-connection protocol  │
//! │  RtpSession      — one client's A/V bundle  │
//! ├────────────────────────────────────────────┤
//! │  AudioStream / VideoStream — double buffer  │
//! │  + packetize-and-send writer threads        │
//! ├────────────────────────────────────────────┤
//! │  EncoderTap      — fan-out from producers   │
//! │  DelayQueue      — audio pacing             │
//! ├────────────────────────────────────────────┤
//! │  Packetizer, NalScanner, HierarchyPool,     │
//! │  CircularDeque, CancellableSocket           │
//! └────────────────────────────────────────────┘
//! ```
//!
//! ## Quick start
//!
//! ```no_run
//! use rtsp::{RtspServer, ServerConfig};
//!
//! let server = RtspServer::new(ServerConfig::default(), true, true);
//! server.start().unwrap();
//!
//! // Feed encoder output from whatever produces it:
//! // server.video_tap().on_frame(&h265_access_unit, presentation_time_us, flags);
//! // server.audio_tap().on_frame(&aac_access_unit, presentation_time_us, flags);
//!
//! server.stop();
//! ```
//!
//! ## Crate layout
//!
//! - [`server`] — [`RtspServer`], the accept loop and client slot table.
//! - [`client`] — [`client::RtspClient`], the per-connection protocol state machine.
//! - [`session`] — [`session::RtpSession`], one client's audio + video bundle.
//! - [`stream`] — [`stream::AudioStream`]/[`stream::VideoStream`], the double-buffered writers.
//! - [`tap`] — [`tap::VideoEncoderTap`]/[`tap::AudioEncoderTap`], fan-out from producers.
//! - [`delay_queue`] — wall-clock-paced audio frame queue.
//! - [`packetizer`] — stateless RTP/RTCP wire encoders.
//! - [`nal`] — Annex-B NAL unit scanning.
//! - [`pool`] — [`pool::HierarchyPool`], the two-tier frame buffer allocator.
//! - [`circular_deque`] — fixed-capacity ring buffer.
//! - [`cancellable_socket`] — self-pipe cancellable TCP I/O.
//! - [`buffer`] — [`buffer::FrameBuffer`], the fixed-capacity frame cell.
//! - [`media`] — [`media::RtspMedia`], enabled-track bookkeeping.
//! - [`protocol`] — RTSP request/response parsing and SDP generation.
//! - [`stats`] — [`stats::StreamStats`] running counters.
//! - [`config`] — compile-time constants and [`config::ServerConfig`].
//! - [`error`] — [`RtspError`] enum and [`Result`] alias.

pub mod buffer;
pub mod cancellable_socket;
pub mod circular_deque;
pub mod client;
pub mod config;
pub mod delay_queue;
pub mod error;
pub mod media;
pub mod nal;
pub mod packetizer;
pub mod pool;
pub mod protocol;
pub mod server;
pub mod session;
pub mod stats;
pub mod stream;
pub mod tap;

pub use config::ServerConfig;
pub use error::{Result, RtspError};
pub use media::RtspMedia;
pub use server::RtspServer;
