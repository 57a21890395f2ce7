//! Fan-out of encoded frames from an external producer (the camera/mic
//! encoder callback thread) to up to [`crate::config::MAX_LISTENERS`]
//! registered consumers.

mod audio;
mod video;

pub use audio::AudioEncoderTap;
pub use video::{ParameterSets, VideoEncoderTap};

use std::sync::Arc;

use parking_lot::Mutex;

use crate::config::MAX_LISTENERS;

/// Receives fanned-out frames from an [`AudioEncoderTap`] or
/// [`VideoEncoderTap`]. Implementors are typically a stream's double
/// buffer producer side (see [`crate::stream`]).
pub trait FrameListener: Send + Sync {
    fn on_frame(&self, data: &[u8], presentation_time_us: i64, flags: u32);
}

/// Opaque token identifying a registered listener, returned by
/// [`ListenerRegistry::add`] and consumed by [`ListenerRegistry::remove`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ListenerId(usize);

/// Bounded set of registered [`FrameListener`]s, invoked in registration
/// order under a single lock.
pub struct ListenerRegistry {
    slots: Mutex<[Option<Arc<dyn FrameListener>>; MAX_LISTENERS]>,
}

impl ListenerRegistry {
    pub fn new() -> Self {
        Self {
            slots: Mutex::new(std::array::from_fn(|_| None)),
        }
    }

    /// Registers `listener` in the first free slot, or `None` if the
    /// registry is already at [`MAX_LISTENERS`].
    pub fn add(&self, listener: Arc<dyn FrameListener>) -> Option<ListenerId> {
        let mut slots = self.slots.lock();
        for (index, slot) in slots.iter_mut().enumerate() {
            if slot.is_none() {
                *slot = Some(listener);
                return Some(ListenerId(index));
            }
        }
        None
    }

    pub fn remove(&self, id: ListenerId) {
        self.slots.lock()[id.0] = None;
    }

    /// Invokes every registered listener, in registration-slot order,
    /// while holding the registry lock.
    pub fn for_each(&self, data: &[u8], presentation_time_us: i64, flags: u32) {
        let slots = self.slots.lock();
        for listener in slots.iter().flatten() {
            listener.on_frame(data, presentation_time_us, flags);
        }
    }
}

impl Default for ListenerRegistry {
    fn default() -> Self {
        Self::new()
    }
}
