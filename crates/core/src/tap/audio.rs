//! Audio encoder tap: paces AAC access units through a [`DelayQueue`]
//! before fanning them out to registered listeners.

use std::sync::Arc;

use parking_lot::Mutex;

use crate::buffer::flags;
use crate::config::{AUDIO_QUEUE_DEPTH, MAX_AUDIO_FRAME_SIZE};
use crate::delay_queue::DelayQueue;
use crate::pool::HierarchyPool;
use crate::tap::{FrameListener, ListenerId, ListenerRegistry};

type AudioDelayQueue = DelayQueue<MAX_AUDIO_FRAME_SIZE, MAX_AUDIO_FRAME_SIZE, AUDIO_QUEUE_DEPTH>;

/// Receives AAC access units from the audio encoder callback thread,
/// paces them through a [`DelayQueue`], and fans the paced output out
/// to registered listeners from a dedicated consumer thread.
pub struct AudioEncoderTap {
    listeners: Arc<ListenerRegistry>,
    queue: Arc<AudioDelayQueue>,
    consumer: Mutex<Option<std::thread::JoinHandle<()>>>,
}

impl AudioEncoderTap {
    pub fn new() -> Arc<Self> {
        let pool = Arc::new(HierarchyPool::new(AUDIO_QUEUE_DEPTH));
        let queue = DelayQueue::new(pool);
        let listeners = Arc::new(ListenerRegistry::new());

        let tap = Arc::new(Self {
            listeners: Arc::clone(&listeners),
            queue: Arc::clone(&queue),
            consumer: Mutex::new(None),
        });

        let consumer_queue = Arc::clone(&queue);
        let consumer_listeners = listeners;
        let handle = std::thread::spawn(move || {
            consumer_queue.run(|data, presentation_time_us, frame_flags| {
                consumer_listeners.for_each(data, presentation_time_us, frame_flags);
            });
        });
        *tap.consumer.lock() = Some(handle);

        tap
    }

    pub fn add_listener(&self, listener: Arc<dyn FrameListener>) -> Option<ListenerId> {
        self.listeners.add(listener)
    }

    pub fn remove_listener(&self, id: ListenerId) {
        self.listeners.remove(id)
    }

    /// Called by the audio encoder producer with one raw AAC access unit.
    pub fn on_frame(&self, data: &[u8], presentation_time_us: i64, frame_flags: u32) {
        if frame_flags & flags::CODEC_CONFIG != 0 {
            return;
        }
        if let Err(err) = self.queue.enqueue(data, presentation_time_us, frame_flags) {
            tracing::warn!(error = %err, "dropping audio frame");
        }
    }
}

impl Drop for AudioEncoderTap {
    fn drop(&mut self) {
        self.queue.stop();
        if let Some(handle) = self.consumer.lock().take() {
            let _ = handle.join();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct Counter(Arc<AtomicUsize>);
    impl FrameListener for Counter {
        fn on_frame(&self, _data: &[u8], _presentation_time_us: i64, _flags: u32) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn forwards_non_config_frames_through_the_delay_queue() {
        let tap = AudioEncoderTap::new();
        let count = Arc::new(AtomicUsize::new(0));
        tap.add_listener(Arc::new(Counter(Arc::clone(&count))));

        tap.on_frame(&[1, 2, 3], 0, 0);

        let deadline = std::time::Instant::now() + std::time::Duration::from_millis(500);
        while count.load(Ordering::SeqCst) == 0 && std::time::Instant::now() < deadline {
            std::thread::sleep(std::time::Duration::from_millis(5));
        }
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn codec_config_frames_are_suppressed() {
        let tap = AudioEncoderTap::new();
        let count = Arc::new(AtomicUsize::new(0));
        tap.add_listener(Arc::new(Counter(Arc::clone(&count))));

        tap.on_frame(&[1, 2, 3], 0, flags::CODEC_CONFIG);

        std::thread::sleep(std::time::Duration::from_millis(100));
        assert_eq!(count.load(Ordering::SeqCst), 0);
    }
}
