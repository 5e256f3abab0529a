//! Bounded frame queue between the producer and one consumer.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use crossbeam_channel::{Receiver, Sender, TryRecvError, TrySendError};
use tracing::trace;

use crate::frame::SharedFrame;

/// Default capacity of a frame buffer.
pub const FRAME_BUFFER_CAPACITY: usize = 10;

/// Bounded FIFO of frames.
///
/// `push` never blocks: when the buffer is full the incoming frame is
/// dropped and counted. `pop_front` never blocks either.
pub struct FrameBuffer {
    sender: Sender<SharedFrame>,
    receiver: Receiver<SharedFrame>,
    capacity: usize,
    accepted: AtomicU64,
    dropped: AtomicU64,
}

impl FrameBuffer {
    /// Create an empty buffer holding at most `capacity` frames.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        let (sender, receiver) = crossbeam_channel::bounded(capacity);

        Self {
            sender,
            receiver,
            capacity,
            accepted: AtomicU64::new(0),
            dropped: AtomicU64::new(0),
        }
    }

    /// Append a frame. Returns false if the buffer was full and the frame
    /// was discarded.
    pub fn push(&self, frame: SharedFrame) -> bool {
        match self.sender.try_send(frame) {
            Ok(()) => {
                self.accepted.fetch_add(1, Ordering::Relaxed);
                true
            }
            Err(TrySendError::Full(frame)) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                trace!(sequence = frame.sequence, "Frame buffer full, dropping frame");
                false
            }
            // Both ends live in this struct
            Err(TrySendError::Disconnected(_)) => false,
        }
    }

    /// Remove and return the oldest frame, if any.
    pub fn pop_front(&self) -> Option<SharedFrame> {
        match self.receiver.try_recv() {
            Ok(frame) => Some(frame),
            Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => None,
        }
    }

    /// Remove the oldest frame, waiting up to `timeout` for one to arrive.
    pub fn pop_timeout(&self, timeout: Duration) -> Option<SharedFrame> {
        self.receiver.recv_timeout(timeout).ok()
    }

    /// Discard every buffered frame, returning how many were removed.
    pub fn clear(&self) -> usize {
        self.receiver.try_iter().count()
    }

    pub fn len(&self) -> usize {
        self.receiver.len()
    }

    pub fn is_empty(&self) -> bool {
        self.receiver.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Frames accepted since creation.
    pub fn accepted(&self) -> u64 {
        self.accepted.load(Ordering::Relaxed)
    }

    /// Frames rejected because the buffer was full.
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

impl Default for FrameBuffer {
    fn default() -> Self {
        Self::new(FRAME_BUFFER_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::collections::HashSet;
    use std::sync::atomic::AtomicBool;
    use std::sync::Arc;
    use std::thread;
    use std::time::Instant;

    use bytes::Bytes;

    use crate::frame::{CaptureTimestamp, CapturedFrame, PixelFormat};

    fn frame(sequence: u64) -> SharedFrame {
        Arc::new(CapturedFrame::new(
            Bytes::from_static(&[0]),
            1,
            1,
            PixelFormat::Gray8,
            CaptureTimestamp::now(Instant::now()),
            sequence,
        ))
    }

    #[test]
    fn test_push_drops_newest_when_full() {
        let buffer = FrameBuffer::new(2);
        assert!(buffer.push(frame(0)));
        assert!(buffer.push(frame(1)));
        assert!(!buffer.push(frame(2)));

        assert_eq!(buffer.len(), 2);
        assert_eq!(buffer.dropped(), 1);
        assert_eq!(buffer.pop_front().unwrap().sequence, 0);
        assert_eq!(buffer.pop_front().unwrap().sequence, 1);
    }

    #[test]
    fn test_pop_empty_returns_none() {
        let buffer = FrameBuffer::default();
        let start = Instant::now();
        assert!(buffer.pop_front().is_none());
        assert!(start.elapsed() < Duration::from_millis(50));
    }

    #[test]
    fn test_pop_timeout_waits_for_frame() {
        let buffer = Arc::new(FrameBuffer::new(4));
        let producer = Arc::clone(&buffer);
        let handle = thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            producer.push(frame(7));
        });

        let popped = buffer.pop_timeout(Duration::from_secs(2));
        handle.join().unwrap();
        assert_eq!(popped.unwrap().sequence, 7);
    }

    #[test]
    fn test_concurrent_pushers_never_exceed_capacity() {
        let buffer = Arc::new(FrameBuffer::new(FRAME_BUFFER_CAPACITY));
        let running = Arc::new(AtomicBool::new(true));

        let observer = {
            let buffer = Arc::clone(&buffer);
            let running = Arc::clone(&running);
            thread::spawn(move || {
                let mut max_len = 0;
                while running.load(Ordering::SeqCst) {
                    max_len = max_len.max(buffer.len());
                    if buffer.len() > FRAME_BUFFER_CAPACITY / 2 {
                        buffer.pop_front();
                    }
                }
                max_len
            })
        };

        let pushers: Vec<_> = (0..8)
            .map(|p| {
                let buffer = Arc::clone(&buffer);
                thread::spawn(move || {
                    for i in 0..2_000 {
                        buffer.push(frame(p * 10_000 + i));
                    }
                })
            })
            .collect();

        for pusher in pushers {
            pusher.join().unwrap();
        }
        running.store(false, Ordering::SeqCst);
        let max_len = observer.join().unwrap();

        assert!(max_len <= FRAME_BUFFER_CAPACITY);
        assert!(buffer.len() <= FRAME_BUFFER_CAPACITY);
        assert_eq!(buffer.accepted() + buffer.dropped(), 16_000);
    }

    #[test]
    fn test_frames_are_moved_out_once() {
        let buffer = Arc::new(FrameBuffer::new(FRAME_BUFFER_CAPACITY));
        let total_pushed = 5_000u64;

        let producer = {
            let buffer = Arc::clone(&buffer);
            thread::spawn(move || {
                for i in 0..total_pushed {
                    buffer.push(frame(i));
                    if i % 64 == 0 {
                        thread::yield_now();
                    }
                }
            })
        };

        let consumers: Vec<_> = (0..2)
            .map(|_| {
                let buffer = Arc::clone(&buffer);
                thread::spawn(move || {
                    let mut seen = Vec::new();
                    let deadline = Instant::now() + Duration::from_secs(5);
                    while Instant::now() < deadline {
                        match buffer.pop_timeout(Duration::from_millis(50)) {
                            Some(frame) => seen.push(frame.sequence),
                            None => break,
                        }
                    }
                    seen
                })
            })
            .collect();

        producer.join().unwrap();
        let mut all = Vec::new();
        for consumer in consumers {
            all.extend(consumer.join().unwrap());
        }
        all.extend(std::iter::from_fn(|| buffer.pop_front().map(|f| f.sequence)));

        let unique: HashSet<u64> = all.iter().copied().collect();
        assert_eq!(unique.len(), all.len(), "a frame was observed twice");
        assert!(all.len() as u64 <= total_pushed);
        assert_eq!(all.len() as u64, buffer.accepted());
    }

    #[test]
    fn test_clear() {
        let buffer = FrameBuffer::new(3);
        buffer.push(frame(0));
        buffer.push(frame(1));
        assert_eq!(buffer.clear(), 2);
        assert!(buffer.is_empty());
    }
}
