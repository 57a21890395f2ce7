//! Bounded, wall-clock-paced queue used to smooth out AAC encoder
//! output before it reaches the RTP writer.
//!
//! MediaCodec-style AAC encoders batch multiple access units per
//! callback; without pacing, the downstream buffer bloats and audio
//! runs ahead of video. `DelayQueue` anchors the first dequeued frame's
//! presentation time against the wall clock and holds every later frame
//! until its own presentation time has elapsed relative to that anchor.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

use crate::circular_deque::CircularDeque;
use crate::error::RtspError;
use crate::pool::{HierarchyPool, PoolCell};

/// Bounded queue of pending access units, paced against the wall clock
/// before being handed to a consumer callback.
///
/// `D`/`M` are the default/max cell capacities of the backing
/// [`HierarchyPool`]; `CAP` is the queue depth.
pub struct DelayQueue<const D: usize, const M: usize, const CAP: usize> {
    pool: Arc<HierarchyPool<D, M>>,
    queue: Mutex<CircularDeque<PoolCell<D, M>, CAP>>,
    not_empty: Condvar,
    running: AtomicBool,
}

impl<const D: usize, const M: usize, const CAP: usize> DelayQueue<D, M, CAP> {
    pub fn new(pool: Arc<HierarchyPool<D, M>>) -> Arc<Self> {
        Arc::new(Self {
            pool,
            queue: Mutex::new(CircularDeque::new()),
            not_empty: Condvar::new(),
            running: AtomicBool::new(true),
        })
    }

    /// Enqueues a frame, acquiring a cell from the pool sized to `data`.
    ///
    /// If the queue is already at capacity, the oldest cell is dropped
    /// (returning it to the pool) to make room, matching
    /// [`CircularDeque::push_back`]'s overwrite-oldest semantics.
    pub fn enqueue(&self, data: &[u8], presentation_time_us: i64, flags: u32) -> Result<(), RtspError> {
        let mut cell = self.pool.acquire(data.len())?;
        cell.fill(data, presentation_time_us, flags);

        let mut queue = self.queue.lock();
        queue.push_back(cell);
        drop(queue);
        self.not_empty.notify_one();
        Ok(())
    }

    /// Unblocks a concurrent [`run`](Self::run) call and makes it return
    /// once the queue drains.
    pub fn stop(&self) {
        self.running.store(false, Ordering::Release);
        self.not_empty.notify_all();
    }

    /// Drives the pacing loop, calling `on_frame(payload, presentation_time_us, flags)`
    /// for each frame once its presentation time has elapsed relative to
    /// the first dequeued frame. Blocks the calling thread until
    /// [`stop`](Self::stop) is called and the queue is empty.
    pub fn run(&self, mut on_frame: impl FnMut(&[u8], i64, u32)) {
        let mut anchor: Option<(Instant, i64)> = None;

        loop {
            let cell = {
                let mut queue = self.queue.lock();
                loop {
                    if let Some(cell) = queue.pop_front() {
                        break Some(cell);
                    }
                    if !self.running.load(Ordering::Acquire) {
                        break None;
                    }
                    self.not_empty.wait(&mut queue);
                }
            };

            let Some(cell) = cell else {
                break;
            };

            let pts = cell.presentation_time_us();
            let (start_wall, first_pts) = *anchor.get_or_insert((Instant::now(), pts));
            let expected_elapsed_us = (pts - first_pts).max(0) as u64;
            let expected_elapsed = Duration::from_micros(expected_elapsed_us);
            let actual_elapsed = start_wall.elapsed();

            if expected_elapsed > actual_elapsed {
                std::thread::sleep(expected_elapsed - actual_elapsed);
            }

            on_frame(cell.as_slice(), pts, cell.flags());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn enqueue_drops_oldest_when_full() {
        let pool = Arc::new(HierarchyPool::<64, 64>::new(8));
        let queue: Arc<DelayQueue<64, 64, 2>> = DelayQueue::new(pool);

        queue.enqueue(&[1], 0, 0).unwrap();
        queue.enqueue(&[2], 1, 0).unwrap();
        queue.enqueue(&[3], 2, 0).unwrap(); // drops frame "1"

        let received = Arc::new(Mutex::new(Vec::new()));
        let received_clone = Arc::clone(&received);
        queue.stop();
        queue.run(|data, _pts, _flags| {
            received_clone.lock().push(data.to_vec());
        });

        assert_eq!(*received.lock(), vec![vec![2u8], vec![3u8]]);
    }

    #[test]
    fn run_releases_cells_back_to_pool() {
        let pool = Arc::new(HierarchyPool::<64, 64>::new(2));
        let queue: Arc<DelayQueue<64, 64, 4>> = DelayQueue::new(Arc::clone(&pool));

        queue.enqueue(&[1], 0, 0).unwrap();
        queue.enqueue(&[2], 1, 0).unwrap();
        queue.stop();
        queue.run(|_, _, _| {});

        // Both dequeued cells were released back to the pool by `run`,
        // so both slots of this 2-slot pool are free again.
        let h1 = pool.acquire(1);
        let h2 = pool.acquire(1);
        assert!(h1.is_ok());
        assert!(h2.is_ok());
    }

    #[test]
    fn pacing_does_not_release_frames_before_their_due_time() {
        let pool = Arc::new(HierarchyPool::<64, 64>::new(8));
        let queue: Arc<DelayQueue<64, 64, 8>> = DelayQueue::new(Arc::clone(&pool));

        queue.enqueue(&[1], 0, 0).unwrap();
        queue.enqueue(&[2], 50_000, 0).unwrap(); // 50ms later

        let started = Instant::now();
        let runner = Arc::clone(&queue);
        let handle = std::thread::spawn(move || {
            let mut timestamps = Vec::new();
            runner.run(|_, _, _| timestamps.push(Instant::now()));
            timestamps
        });

        std::thread::sleep(Duration::from_millis(80));
        queue.stop();
        let timestamps = handle.join().unwrap();

        assert_eq!(timestamps.len(), 2);
        assert!(timestamps[1].duration_since(started) >= Duration::from_millis(45));
    }
}
