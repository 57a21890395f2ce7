//! Video encoder tap: fans out H.265 access units and latches VPS/SPS/PPS
//! from codec-config access units for SDP generation.

use std::sync::Arc;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use parking_lot::{Condvar, Mutex};

use crate::buffer::flags;
use crate::nal::{extract_nal_units, nal_type, NAL_TYPE_PPS, NAL_TYPE_SPS, NAL_TYPE_VPS};
use crate::tap::{FrameListener, ListenerId, ListenerRegistry};

const MAX_PARAMETER_SET_NALS: usize = 16;

/// Base64-encoded VPS/SPS/PPS, produced once per encoder session from
/// the first codec-config access unit.
#[derive(Debug, Clone, Default)]
pub struct ParameterSets {
    pub vps: String,
    pub sps: String,
    pub pps: String,
}

/// Receives H.265 access units from the video encoder callback thread
/// and fans non-config frames out to registered listeners.
///
/// Codec-config access units (VPS/SPS/PPS) are intercepted: they update
/// [`ParameterSets`] and are never forwarded as RTP payload.
pub struct VideoEncoderTap {
    listeners: ListenerRegistry,
    params: Mutex<Option<ParameterSets>>,
    params_ready: Condvar,
}

impl VideoEncoderTap {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            listeners: ListenerRegistry::new(),
            params: Mutex::new(None),
            params_ready: Condvar::new(),
        })
    }

    pub fn add_listener(&self, listener: Arc<dyn FrameListener>) -> Option<ListenerId> {
        self.listeners.add(listener)
    }

    pub fn remove_listener(&self, id: ListenerId) {
        self.listeners.remove(id)
    }

    /// Called by the video encoder producer with one complete access unit.
    pub fn on_frame(&self, data: &[u8], presentation_time_us: i64, frame_flags: u32) {
        if frame_flags & flags::CODEC_CONFIG != 0 {
            self.latch_parameter_sets(data);
            return;
        }
        self.listeners.for_each(data, presentation_time_us, frame_flags);
    }

    fn latch_parameter_sets(&self, data: &[u8]) {
        let units = extract_nal_units(data, 0, data.len(), MAX_PARAMETER_SET_NALS);
        let mut sets = ParameterSets::default();

        for unit in &units {
            if !unit.is_valid() {
                continue;
            }
            let ty = nal_type(data, unit);
            let body = &data[unit.header_offset()..unit.end];
            let encoded = BASE64.encode(body);
            match ty {
                NAL_TYPE_VPS => sets.vps = encoded,
                NAL_TYPE_SPS => sets.sps = encoded,
                NAL_TYPE_PPS => sets.pps = encoded,
                _ => {}
            }
        }

        let mut guard = self.params.lock();
        *guard = Some(sets);
        self.params_ready.notify_all();
    }

    /// Blocks until the first codec-config access unit has been
    /// observed, then returns a copy of the latched parameter sets.
    pub fn get_params(&self) -> ParameterSets {
        let mut guard = self.params.lock();
        while guard.is_none() {
            self.params_ready.wait(&mut guard);
        }
        guard.clone().expect("latch invariant: guard is Some after wait")
    }

    /// Non-blocking variant of [`get_params`](Self::get_params), for
    /// callers that want to distinguish "not yet available" from
    /// blocking indefinitely.
    pub fn try_get_params(&self) -> Option<ParameterSets> {
        self.params.lock().clone()
    }
}
