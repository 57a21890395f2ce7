//! Compile-time constants and server configuration.

/// TCP port the RTSP server listens on.
pub const RTSP_PORT: u16 = 8554;

/// Maximum number of simultaneous TCP clients.
pub const MAX_CLIENTS: usize = 2;

/// Maximum number of [`FrameListener`](crate::tap::FrameListener)s a
/// single encoder tap fans out to (one per connected client's
/// stream of the relevant media kind).
pub const MAX_LISTENERS: usize = MAX_CLIENTS;

/// Capacity, in bytes, of a non-keyframe video `FrameBuffer` cell.
pub const NORMAL_VIDEO_FRAME_SIZE: usize = 32 * 1024;

/// Capacity, in bytes, of a keyframe video `FrameBuffer` cell.
pub const MAX_VIDEO_FRAME_SIZE: usize = 128 * 1024;

/// Capacity, in bytes, of an audio `FrameBuffer` cell.
pub const MAX_AUDIO_FRAME_SIZE: usize = 512;

/// Maximum bytes written to a socket in a single interleaved RTP packet,
/// including the `$`-prefix.
pub const RTP_MAX_PACKET_SIZE: usize = 1024;

/// Byte length of the interleaved TCP framing prefix (`$`, channel, 16-bit length).
pub const TCP_PREFIX_SIZE: usize = 4;

/// RTP version field value (version 2, no padding/extension/CSRC in the fixed header).
pub const RTP_VERSION: u8 = 0x80;

/// RTP payload type used for H.265 access units (RFC 7798, dynamic range).
pub const H265_PAYLOAD_TYPE: u8 = 97;

/// RTP payload type used for AAC access units (RFC 3640 MPEG4-GENERIC).
pub const AAC_PAYLOAD_TYPE: u8 = 96;

/// RTP clock rate for the H.265 video track, in Hz.
pub const VIDEO_SAMPLE_RATE: u32 = 90_000;

/// RTP clock rate for the AAC audio track, in Hz.
pub const AUDIO_SAMPLE_RATE: u32 = 44_100;

/// Audio channel count advertised in SDP (`MPEG4-GENERIC/<rate>/<channels>`).
pub const AUDIO_CHANNEL_COUNT: u8 = 1;

/// H.265 NAL unit type used for fragmentation units (RFC 7798 §4.4.3).
pub const H265_FU_NAL_TYPE: u8 = 49;

/// Depth of the [`DelayQueue`](crate::delay_queue::DelayQueue) used to
/// pace audio access units against the wall clock.
pub const AUDIO_QUEUE_DEPTH: usize = 30;

/// Minimum wall-clock interval between RTCP sender reports, in seconds.
pub const RTCP_SR_INTERVAL_SECS: u64 = 2;

/// Minimum number of RTP packets sent before another RTCP SR may be
/// emitted, even if the time interval has elapsed.
pub const RTCP_SR_PACKET_THRESHOLD: u64 = 50;

/// Number of frames between `StreamStats` summary log lines.
pub const STATS_LOG_INTERVAL_FRAMES: u64 = 10_000;

/// Video track id advertised in SDP `a=control:trackID=<id>` and used to
/// route SETUP requests.
pub const VIDEO_TRACK_ID: i32 = 0;

/// Audio track id advertised in SDP `a=control:trackID=<id>` and used to
/// route SETUP requests.
pub const AUDIO_TRACK_ID: i32 = 1;

/// Interleaved channel numbers (RFC 2326 §10.12) for the video track:
/// RTP on the even channel, RTCP on the next odd channel.
pub const VIDEO_INTERLEAVE_CHANNEL: u8 = 0;

/// Interleaved channel numbers for the audio track: RTP on the even
/// channel, RTCP on the next odd channel.
pub const AUDIO_INTERLEAVE_CHANNEL: u8 = 2;

/// Server-identifying string carried in every RTSP response's `Server:` header.
pub const SERVER_AGENT: &str = concat!("rtsp-rs/", env!("CARGO_PKG_VERSION"));

/// Runtime configuration for an [`RtspServer`](crate::server::RtspServer).
///
/// Most deployments only need [`ServerConfig::default`]; the fields are
/// exposed for embedding into test harnesses that bind an ephemeral port.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// TCP port to bind. Defaults to [`RTSP_PORT`]; pass `0` to have the
    /// OS choose an ephemeral port (used by integration tests).
    pub port: u16,
    /// Bind address, e.g. `0.0.0.0` or `127.0.0.1`.
    pub bind_addr: std::net::IpAddr,
    /// SDP session name (`s=` line).
    pub session_name: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: RTSP_PORT,
            bind_addr: std::net::IpAddr::V4(std::net::Ipv4Addr::UNSPECIFIED),
            session_name: "Camera Stream".to_string(),
        }
    }
}
