//! Per-track RTP writer: the double-buffered producer/consumer hand-off
//! between an encoder tap's callback thread and a dedicated writer
//! thread that packetizes and sends over a client's interleaved TCP
//! socket.
//!
//! Conceptually this is a lock-free `write_idx`/`read_idx` pair
//! published with release/acquire orderings. This implementation gets
//! the same two-phase wait protocol (the producer never overwrites a
//! slot the consumer might still be reading, and the consumer never
//! reads a slot the producer hasn't finished publishing) by holding
//! both indices and the slot contents behind one
//! `parking_lot::Mutex`, signaled with a `Condvar` — the ordering
//! guarantees come from the mutex, not from manual atomics, which
//! keeps the hot path a single short critical section on each side
//! instead of actually lock-free.

use std::net::TcpStream;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Instant, SystemTime};

use parking_lot::{Condvar, Mutex};
use rand::Rng;

use crate::buffer::FrameBuffer;
use crate::cancellable_socket::CancellableSocket;
use crate::config::{
    AUDIO_SAMPLE_RATE, MAX_AUDIO_FRAME_SIZE, MAX_VIDEO_FRAME_SIZE, NORMAL_VIDEO_FRAME_SIZE,
    RTCP_SR_INTERVAL_SECS, RTCP_SR_PACKET_THRESHOLD, RTP_MAX_PACKET_SIZE, VIDEO_SAMPLE_RATE,
};
use crate::error::RtspError;
use crate::nal::extract_nal_units;
use crate::packetizer;
use crate::stats::StreamStats;
use crate::tap::{AudioEncoderTap, FrameListener, ListenerId, VideoEncoderTap};

const MAX_NAL_UNITS_PER_ACCESS_UNIT: usize = 16;

/// Converts a presentation-time delta (microseconds) to an RTP
/// timestamp delta at `clock_rate_hz`.
fn rtp_ticks(delta_us: i64, clock_rate_hz: u32) -> u32 {
    ((delta_us.max(0) as i128 * clock_rate_hz as i128) / 1_000_000) as u32
}

/// Shared RTCP-SR bookkeeping: emitted every [`RTCP_SR_INTERVAL_SECS`]
/// once at least [`RTCP_SR_PACKET_THRESHOLD`] packets have gone out,
/// twice in a row each time it's due (belt-and-braces retransmit).
struct RtcpSchedule {
    last_report_unix_sec: Option<u64>,
}

impl RtcpSchedule {
    fn new() -> Self {
        Self {
            last_report_unix_sec: None,
        }
    }

    /// Whether an SR is due right now, given the cumulative packet
    /// count sent so far. Consumes the due-ness: calling this again
    /// immediately afterwards returns `false` until the next even
    /// second ticks over.
    fn due(&mut self, packet_count: u64, now: SystemTime) -> bool {
        if packet_count < RTCP_SR_PACKET_THRESHOLD {
            return false;
        }
        let now_sec = now
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0);
        if now_sec % 2 != 0 {
            return false;
        }
        if self.last_report_unix_sec == Some(now_sec) {
            return false;
        }
        self.last_report_unix_sec = Some(now_sec);
        true
    }
}

/// Common per-track send-side counters, reset on every `start`.
struct TrackCounters {
    ssrc: u32,
    sequence: u16,
    last_rtp_timestamp: u32,
    last_presentation_time_us: i64,
    packet_count: u64,
    octet_count: u64,
}

impl TrackCounters {
    fn fresh() -> Self {
        let mut rng = rand::rng();
        Self {
            ssrc: rng.random(),
            sequence: rng.random(),
            last_rtp_timestamp: rng.random(),
            last_presentation_time_us: i64::MIN,
            packet_count: 0,
            octet_count: 0,
        }
    }

    fn next_sequence(&mut self) -> u16 {
        let seq = self.sequence;
        self.sequence = self.sequence.wrapping_add(1);
        seq
    }
}

/// Socket + channel a stream writes interleaved packets to, shared by
/// reference so the RTSP client's socket outlives the writer thread it
/// hands off to.
pub(crate) struct SendTarget {
    pub socket: Arc<CancellableSocket<TcpStream>>,
    pub rtp_channel: u8,
}

impl SendTarget {
    fn rtcp_channel(&self) -> u8 {
        self.rtp_channel + 1
    }
}

// ---------------------------------------------------------------------
// Audio
// ---------------------------------------------------------------------

struct AudioSlot {
    buffer: FrameBuffer<MAX_AUDIO_FRAME_SIZE>,
    ready: bool,
    /// When this slot was last published, used to measure elapsed
    /// process time once the frame it holds has been sent.
    received_at: Instant,
}

/// A frame handed from `take_frame` to the writer, paired with the
/// wall-clock time it became available so the writer can report real
/// processing latency instead of a constant.
struct TakenFrame<const N: usize> {
    buffer: FrameBuffer<N>,
    received_at: Instant,
}

impl<const N: usize> TakenFrame<N> {
    fn elapsed_us(&self) -> f64 {
        self.received_at.elapsed().as_micros() as f64
    }
}

struct AudioBufferState {
    slots: [AudioSlot; 2],
    read_idx: usize,
    write_idx: usize,
    stopping: bool,
}

/// AAC/RTP writer for one client's audio track.
///
/// `running`/`stopping` together hold the three states of a
/// `StreamState::{Idle,Running,Stopping}` lifecycle: `!running` is Idle, `running
/// && !stopping` is Running, `running && stopping` is the brief window
/// between `stop()` flagging the writer and the writer thread exiting.
pub struct AudioStream {
    state: Mutex<AudioBufferState>,
    cond: Condvar,
    writer: Mutex<Option<JoinHandle<()>>>,
    running: std::sync::atomic::AtomicBool,
    stats: Mutex<StreamStats>,
    /// Set on `start`, cleared by the writer thread itself on exit so
    /// this stream stops receiving frames the moment its writer stops
    /// sending them, instead of waiting on an external `stop()`.
    listener: Mutex<Option<(Arc<AudioEncoderTap>, ListenerId)>>,
}

impl AudioStream {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(AudioBufferState {
                slots: [
                    AudioSlot {
                        buffer: FrameBuffer::new(),
                        ready: false,
                        received_at: Instant::now(),
                    },
                    AudioSlot {
                        buffer: FrameBuffer::new(),
                        ready: false,
                        received_at: Instant::now(),
                    },
                ],
                read_idx: 0,
                write_idx: 0,
                stopping: false,
            }),
            cond: Condvar::new(),
            writer: Mutex::new(None),
            running: std::sync::atomic::AtomicBool::new(false),
            stats: Mutex::new(StreamStats::new("audio")),
            listener: Mutex::new(None),
        })
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Idle → Running. No-op if already running. Registers this stream
    /// as a listener on `tap`; the writer thread removes it again on
    /// exit, whether that exit was requested via `stop()` or the writer
    /// gave up on its own (e.g. a failed send).
    pub fn start(
        self: &Arc<Self>,
        socket: Arc<CancellableSocket<TcpStream>>,
        channel: u8,
        tap: Arc<AudioEncoderTap>,
    ) {
        if self
            .running
            .compare_exchange(
                false,
                true,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_err()
        {
            return;
        }

        {
            let mut state = self.state.lock();
            state.stopping = false;
        }

        let listener: Arc<dyn FrameListener> = Arc::clone(self) as Arc<dyn FrameListener>;
        let listener_id = tap.add_listener(listener);
        *self.listener.lock() = listener_id.map(|id| (tap, id));

        let target = SendTarget {
            socket,
            rtp_channel: channel,
        };
        let this = Arc::clone(self);
        let handle = std::thread::spawn(move || this.run_writer(target));
        *self.writer.lock() = Some(handle);
    }

    fn deregister_listener(&self) {
        if let Some((tap, id)) = self.listener.lock().take() {
            tap.remove_listener(id);
        }
    }

    /// Running → Stopping → Idle. No-op if not running.
    pub fn stop(self: &Arc<Self>) {
        if !self.is_running() {
            return;
        }
        {
            let mut state = self.state.lock();
            state.stopping = true;
        }
        self.cond.notify_all();
        if let Some(handle) = self.writer.lock().take() {
            let _ = handle.join();
        }
        self.running.store(false, Ordering::Release);
    }

    fn publish(&self, data: &[u8], presentation_time_us: i64, flags: u32) {
        if data.len() > MAX_AUDIO_FRAME_SIZE {
            tracing::error!(
                size = data.len(),
                capacity = MAX_AUDIO_FRAME_SIZE,
                "dropping oversize audio frame"
            );
            return;
        }
        let mut state = self.state.lock();
        let w = 1 - state.read_idx;
        state.slots[w].buffer.fill(data, presentation_time_us, flags);
        state.slots[w].ready = true;
        state.slots[w].received_at = Instant::now();
        state.write_idx = w;
        drop(state);
        self.stats.lock().on_frame_available(presentation_time_us);
        self.cond.notify_all();
    }

    /// Two-phase wait, returning the next due frame, or
    /// `None` once the stream is stopping.
    fn take_frame(&self, last_pts: i64) -> Option<TakenFrame<MAX_AUDIO_FRAME_SIZE>> {
        let mut state = self.state.lock();

        loop {
            let w = state.write_idx;
            if state.slots[w].ready && state.slots[w].buffer.presentation_time_us > last_pts {
                break;
            }
            if state.stopping {
                return None;
            }
            self.cond.wait(&mut state);
        }

        let w = state.write_idx;
        state.read_idx = w;
        loop {
            if state.write_idx != w || state.stopping {
                break;
            }
            self.cond.wait(&mut state);
        }

        let w = state.read_idx;
        let buffer = state.slots[w].buffer.clone();
        let received_at = state.slots[w].received_at;
        state.slots[w].ready = false;
        Some(TakenFrame { buffer, received_at })
    }

    fn run_writer(self: Arc<Self>, target: SendTarget) {
        let mut counters = TrackCounters::fresh();
        let mut rtcp = RtcpSchedule::new();
        let mut dst = [0u8; RTP_MAX_PACKET_SIZE];

        loop {
            let Some(taken) = self.take_frame(counters.last_presentation_time_us) else {
                break;
            };
            let frame = &taken.buffer;

            let delta_us = frame.presentation_time_us - counters.last_presentation_time_us;
            let delta_us = if counters.last_presentation_time_us == i64::MIN {
                0
            } else {
                delta_us
            };
            counters.last_rtp_timestamp = counters
                .last_rtp_timestamp
                .wrapping_add(rtp_ticks(delta_us, AUDIO_SAMPLE_RATE));
            counters.last_presentation_time_us = frame.presentation_time_us;

            let seq = counters.next_sequence();
            let written = match packetizer::packetize_aac(
                target.rtp_channel,
                counters.ssrc,
                seq,
                counters.last_rtp_timestamp,
                frame.as_slice(),
                &mut dst,
            ) {
                Ok(n) => n,
                Err(err) => {
                    tracing::error!(error = %err, "audio packetizer failed, aborting stream");
                    break;
                }
            };

            if target.socket.write_all(&dst[..written]).is_err() {
                tracing::info!("audio send failed, writer exiting");
                break;
            }

            counters.packet_count += 1;
            counters.octet_count += frame.size as u64;
            self.stats.lock().on_frame_sent(taken.elapsed_us());

            if rtcp.due(counters.packet_count, SystemTime::now()) {
                self.send_rtcp_sr(&target, &counters);
                self.send_rtcp_sr(&target, &counters);
            }
        }

        self.deregister_listener();
    }

    fn send_rtcp_sr(&self, target: &SendTarget, counters: &TrackCounters) {
        let mut dst = [0u8; 32];
        match packetizer::packetize_rtcp_sr(
            target.rtcp_channel(),
            counters.ssrc,
            SystemTime::now(),
            counters.last_rtp_timestamp,
            counters.packet_count as u32,
            counters.octet_count as u32,
            &mut dst,
        ) {
            Ok(n) => {
                let _ = target.socket.write_all(&dst[..n]);
            }
            Err(err) => tracing::warn!(error = %err, "failed to build audio RTCP SR"),
        }
    }
}

impl FrameListener for AudioStream {
    fn on_frame(&self, data: &[u8], presentation_time_us: i64, flags: u32) {
        self.publish(data, presentation_time_us, flags);
    }
}

// ---------------------------------------------------------------------
// Video
// ---------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum VideoFrameType {
    NoFrame,
    IFrame,
    NonIFrame,
}

struct VideoSlot {
    normal: FrameBuffer<NORMAL_VIDEO_FRAME_SIZE>,
    keyframe: FrameBuffer<MAX_VIDEO_FRAME_SIZE>,
    frame_type: VideoFrameType,
    normal_received_at: Instant,
    keyframe_received_at: Instant,
}

struct VideoBufferState {
    slots: [VideoSlot; 2],
    read_idx: usize,
    write_idx: usize,
    stopping: bool,
}

/// One frame handed from [`VideoStream::take_frame`] to the writer: the
/// frame actually due, plus an optional cached keyframe to retransmit
/// first so a client that connects between key frames still gets one.
///
/// Each half carries its own presentation time; the writer must never
/// borrow one half's timestamp to send the other — a real risk here,
/// since the two halves are consumed together but timestamped
/// independently.
struct ConsumedVideoFrame {
    retransmit_keyframe: Option<FrameBuffer<MAX_VIDEO_FRAME_SIZE>>,
    frame_type: VideoFrameType,
    normal: FrameBuffer<NORMAL_VIDEO_FRAME_SIZE>,
    normal_received_at: Instant,
    keyframe: FrameBuffer<MAX_VIDEO_FRAME_SIZE>,
    keyframe_received_at: Instant,
}

/// H.265/RTP writer for one client's video track. See
/// [`AudioStream`]'s doc comment for how `running`/`stopping` encode
/// the `StreamState` lifecycle.
pub struct VideoStream {
    state: Mutex<VideoBufferState>,
    cond: Condvar,
    writer: Mutex<Option<JoinHandle<()>>>,
    running: std::sync::atomic::AtomicBool,
    stats: Mutex<StreamStats>,
    /// Set on `start`, cleared by the writer thread itself on exit. See
    /// [`AudioStream`]'s field of the same name.
    listener: Mutex<Option<(Arc<VideoEncoderTap>, ListenerId)>>,
}

impl VideoStream {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(VideoBufferState {
                slots: [
                    VideoSlot {
                        normal: FrameBuffer::new(),
                        keyframe: FrameBuffer::new(),
                        frame_type: VideoFrameType::NoFrame,
                        normal_received_at: Instant::now(),
                        keyframe_received_at: Instant::now(),
                    },
                    VideoSlot {
                        normal: FrameBuffer::new(),
                        keyframe: FrameBuffer::new(),
                        frame_type: VideoFrameType::NoFrame,
                        normal_received_at: Instant::now(),
                        keyframe_received_at: Instant::now(),
                    },
                ],
                read_idx: 0,
                write_idx: 0,
                stopping: false,
            }),
            cond: Condvar::new(),
            writer: Mutex::new(None),
            running: std::sync::atomic::AtomicBool::new(false),
            stats: Mutex::new(StreamStats::new("video")),
            listener: Mutex::new(None),
        })
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    pub fn start(
        self: &Arc<Self>,
        socket: Arc<CancellableSocket<TcpStream>>,
        channel: u8,
        tap: Arc<VideoEncoderTap>,
    ) {
        if self
            .running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return;
        }

        {
            let mut state = self.state.lock();
            state.stopping = false;
        }

        let listener: Arc<dyn FrameListener> = Arc::clone(self) as Arc<dyn FrameListener>;
        let listener_id = tap.add_listener(listener);
        *self.listener.lock() = listener_id.map(|id| (tap, id));

        let target = SendTarget {
            socket,
            rtp_channel: channel,
        };
        let this = Arc::clone(self);
        let handle = std::thread::spawn(move || this.run_writer(target));
        *self.writer.lock() = Some(handle);
    }

    fn deregister_listener(&self) {
        if let Some((tap, id)) = self.listener.lock().take() {
            tap.remove_listener(id);
        }
    }

    pub fn stop(self: &Arc<Self>) {
        if !self.is_running() {
            return;
        }
        {
            let mut state = self.state.lock();
            state.stopping = true;
        }
        self.cond.notify_all();
        if let Some(handle) = self.writer.lock().take() {
            let _ = handle.join();
        }
        self.running.store(false, Ordering::Release);
    }

    fn publish(&self, data: &[u8], presentation_time_us: i64, flags: u32) {
        let is_key = flags & crate::buffer::flags::KEY_FRAME != 0;
        let capacity = if is_key {
            MAX_VIDEO_FRAME_SIZE
        } else {
            NORMAL_VIDEO_FRAME_SIZE
        };
        if data.len() > capacity {
            tracing::error!(
                size = data.len(),
                capacity,
                key_frame = is_key,
                "dropping oversize video frame"
            );
            return;
        }

        let mut state = self.state.lock();
        let w = 1 - state.read_idx;
        if is_key {
            state.slots[w].keyframe.fill(data, presentation_time_us, flags);
            state.slots[w].frame_type = VideoFrameType::IFrame;
            state.slots[w].keyframe_received_at = Instant::now();
        } else {
            state.slots[w].normal.fill(data, presentation_time_us, flags);
            state.slots[w].frame_type = VideoFrameType::NonIFrame;
            state.slots[w].normal_received_at = Instant::now();
        }
        state.write_idx = w;
        drop(state);
        self.stats.lock().on_frame_available(presentation_time_us);
        self.cond.notify_all();
    }

    fn take_frame(&self, last_pts: i64) -> Option<ConsumedVideoFrame> {
        let mut state = self.state.lock();

        loop {
            let w = state.write_idx;
            let slot = &state.slots[w];
            let pts = match slot.frame_type {
                VideoFrameType::NoFrame => None,
                VideoFrameType::IFrame => Some(slot.keyframe.presentation_time_us),
                VideoFrameType::NonIFrame => Some(slot.normal.presentation_time_us),
            };
            // A key frame must have been observed at least once before any
            // frame is forwarded, so a freshly connected client always
            // starts on (or after) a decodable picture.
            let keyframe_available = slot.keyframe.size > 0 || state.slots[1 - w].keyframe.size > 0;
            if let Some(pts) = pts {
                if pts > last_pts && keyframe_available {
                    break;
                }
            }
            if state.stopping {
                return None;
            }
            self.cond.wait(&mut state);
        }

        let w = state.write_idx;
        state.read_idx = w;
        loop {
            if state.write_idx != w || state.stopping {
                break;
            }
            self.cond.wait(&mut state);
        }

        let w = state.read_idx;
        let slot = &state.slots[w];
        let frame_type = slot.frame_type;
        let normal = slot.normal.clone();
        let normal_received_at = slot.normal_received_at;
        let keyframe = slot.keyframe.clone();
        let keyframe_received_at = slot.keyframe_received_at;
        state.slots[w].frame_type = VideoFrameType::NoFrame;

        let retransmit_keyframe = if frame_type == VideoFrameType::NonIFrame
            && keyframe.size > 0
            && keyframe.presentation_time_us > last_pts
        {
            Some(keyframe.clone())
        } else {
            None
        };

        Some(ConsumedVideoFrame {
            retransmit_keyframe,
            frame_type,
            normal,
            normal_received_at,
            keyframe,
            keyframe_received_at,
        })
    }

    fn run_writer(self: Arc<Self>, target: SendTarget) {
        let mut counters = TrackCounters::fresh();
        let mut rtcp = RtcpSchedule::new();

        loop {
            let Some(consumed) = self.take_frame(counters.last_presentation_time_us) else {
                break;
            };

            if let Some(keyframe) = &consumed.retransmit_keyframe {
                if !self.send_access_unit(&target, &mut counters, keyframe) {
                    break;
                }
            }

            let sent = match consumed.frame_type {
                VideoFrameType::IFrame => {
                    self.send_access_unit(&target, &mut counters, &consumed.keyframe)
                }
                VideoFrameType::NonIFrame => {
                    self.send_access_unit(&target, &mut counters, &consumed.normal)
                }
                VideoFrameType::NoFrame => true,
            };
            if !sent {
                break;
            }

            let elapsed_us = match consumed.frame_type {
                VideoFrameType::IFrame => consumed.keyframe_received_at.elapsed().as_micros() as f64,
                VideoFrameType::NonIFrame => consumed.normal_received_at.elapsed().as_micros() as f64,
                VideoFrameType::NoFrame => 0.0,
            };
            self.stats.lock().on_frame_sent(elapsed_us);

            if rtcp.due(counters.packet_count, SystemTime::now()) {
                self.send_rtcp_sr(&target, &counters);
                self.send_rtcp_sr(&target, &counters);
            }
        }

        self.deregister_listener();
    }

    /// Packetizes and sends every NAL unit of one access unit, fragmenting
    /// as needed, all fragments sharing one RTP timestamp.
    fn send_access_unit<const N: usize>(
        &self,
        target: &SendTarget,
        counters: &mut TrackCounters,
        frame: &FrameBuffer<N>,
    ) -> bool {
        let delta_us = if counters.last_presentation_time_us == i64::MIN {
            0
        } else {
            frame.presentation_time_us - counters.last_presentation_time_us
        };
        counters.last_rtp_timestamp = counters
            .last_rtp_timestamp
            .wrapping_add(rtp_ticks(delta_us, VIDEO_SAMPLE_RATE));
        counters.last_presentation_time_us = frame.presentation_time_us;

        let access_unit = frame.as_slice();
        let nal_units =
            extract_nal_units(access_unit, 0, access_unit.len(), MAX_NAL_UNITS_PER_ACCESS_UNIT);

        let mut dst = [0u8; RTP_MAX_PACKET_SIZE];
        for nal in &nal_units {
            if !nal.is_valid() {
                continue;
            }
            let mut offset = nal.start;
            while offset < nal.end {
                let seq = counters.next_sequence();
                let (written, new_offset) = match packetizer::packetize_h265_nal(
                    target.rtp_channel,
                    counters.ssrc,
                    seq,
                    counters.last_rtp_timestamp,
                    access_unit,
                    offset,
                    nal,
                    &mut dst,
                ) {
                    Ok(result) => result,
                    Err(err) => {
                        tracing::error!(error = %err, "H.265 packetizer failed, aborting stream");
                        return false;
                    }
                };

                if target.socket.write_all(&dst[..written]).is_err() {
                    tracing::info!("video send failed, writer exiting");
                    return false;
                }

                counters.packet_count += 1;
                counters.octet_count += (written
                    - crate::config::TCP_PREFIX_SIZE
                    - 12 /* RTP header */) as u64;
                offset = new_offset;
            }
        }

        true
    }

    fn send_rtcp_sr(&self, target: &SendTarget, counters: &TrackCounters) {
        let mut dst = [0u8; 32];
        match packetizer::packetize_rtcp_sr(
            target.rtcp_channel(),
            counters.ssrc,
            SystemTime::now(),
            counters.last_rtp_timestamp,
            counters.packet_count as u32,
            counters.octet_count as u32,
            &mut dst,
        ) {
            Ok(n) => {
                let _ = target.socket.write_all(&dst[..n]);
            }
            Err(err) => tracing::warn!(error = %err, "failed to build video RTCP SR"),
        }
    }
}

impl FrameListener for VideoStream {
    fn on_frame(&self, data: &[u8], presentation_time_us: i64, flags: u32) {
        self.publish(data, presentation_time_us, flags);
    }
}
