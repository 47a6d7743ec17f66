//! Frame queue between the network loop and the audio consumer
//!
//! The queue is an unbounded crossbeam channel split into a
//! [`FrameProducer`] (network side) and a [`FrameConsumer`] (reader side).
//! Frames are opaque byte payloads; each push enqueues exactly one frame
//! and frames are never split, merged or reordered.

use bytes::Bytes;
use crossbeam_channel::{unbounded, Receiver, RecvTimeoutError, Sender, TryRecvError};
use std::iter::FusedIterator;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::error::StreamError;

/// Shared mute flag. Muting only affects frames pushed afterwards.
#[derive(Clone, Debug, Default)]
pub struct MuteGate(Arc<AtomicBool>);

impl MuteGate {
    pub fn new(muted: bool) -> Self {
        Self(Arc::new(AtomicBool::new(muted)))
    }

    pub fn mute(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn unmute(&self) {
        self.0.store(false, Ordering::SeqCst);
    }

    pub fn is_muted(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Stream counters, shared by every session of a source
#[derive(Debug, Default)]
pub struct StreamCounters {
    frames_received: AtomicU64,
    bytes_received: AtomicU64,
    frames_muted: AtomicU64,
    frames_read: AtomicU64,
    overflows: AtomicU64,
    write_failures: AtomicU64,
}

impl StreamCounters {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a write that could not be delivered to any buffer
    pub fn record_write_failure(&self) {
        self.write_failures.fetch_add(1, Ordering::Relaxed);
    }

    /// Get a snapshot of all counters
    pub fn snapshot(&self) -> BufferStats {
        BufferStats {
            frames_received: self.frames_received.load(Ordering::Relaxed),
            bytes_received: self.bytes_received.load(Ordering::Relaxed),
            frames_muted: self.frames_muted.load(Ordering::Relaxed),
            frames_read: self.frames_read.load(Ordering::Relaxed),
            overflows: self.overflows.load(Ordering::Relaxed),
            write_failures: self.write_failures.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time copy of [`StreamCounters`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize)]
pub struct BufferStats {
    /// Frames accepted into a buffer
    pub frames_received: u64,
    pub bytes_received: u64,
    /// Frames discarded because the source was muted
    pub frames_muted: u64,
    pub frames_read: u64,
    /// Reads that hit an empty queue with overflow signalling enabled
    pub overflows: u64,
    /// Frames that arrived with no active session
    pub write_failures: u64,
}

/// Create a fresh, empty frame queue
pub fn audio_buffer(
    chunk_size: usize,
    gate: MuteGate,
    counters: Arc<StreamCounters>,
) -> (FrameProducer, FrameConsumer) {
    let (tx, rx) = unbounded();
    let producer = FrameProducer {
        tx,
        gate,
        counters: counters.clone(),
    };
    let consumer = FrameConsumer {
        rx,
        chunk_size,
        counters,
    };
    (producer, consumer)
}

/// Write half of the frame queue
#[derive(Debug)]
pub struct FrameProducer {
    tx: Sender<Bytes>,
    gate: MuteGate,
    counters: Arc<StreamCounters>,
}

impl FrameProducer {
    /// Append one frame to the queue. Never blocks.
    ///
    /// While muted the frame is dropped and `Ok(())` is returned.
    pub fn push(&self, frame: Bytes) -> Result<(), StreamError> {
        if self.gate.is_muted() {
            self.counters.frames_muted.fetch_add(1, Ordering::Relaxed);
            return Ok(());
        }

        let len = frame.len() as u64;
        self.tx.send(frame).map_err(|_| StreamError::Disconnected)?;
        self.counters.frames_received.fetch_add(1, Ordering::Relaxed);
        self.counters.bytes_received.fetch_add(len, Ordering::Relaxed);
        Ok(())
    }
}

/// Read half of the frame queue
#[derive(Debug, Clone)]
pub struct FrameConsumer {
    rx: Receiver<Bytes>,
    chunk_size: usize,
    counters: Arc<StreamCounters>,
}

impl FrameConsumer {
    /// Read `n` bytes worth of frames without blocking.
    ///
    /// `n` must be a multiple of the chunk size. When the queue runs dry the
    /// reader yields [`StreamError::Overflow`] if `overflow` is set, and
    /// otherwise ends early.
    pub fn read(&self, n: usize, overflow: bool) -> Result<ChunkReader, StreamError> {
        self.reader(n, overflow, None)
    }

    /// Like [`read`](Self::read), but each frame may wait up to `timeout`
    /// before the overflow policy applies
    pub fn read_timeout(
        &self,
        n: usize,
        overflow: bool,
        timeout: Duration,
    ) -> Result<ChunkReader, StreamError> {
        self.reader(n, overflow, Some(timeout))
    }

    fn reader(
        &self,
        n: usize,
        overflow: bool,
        wait: Option<Duration>,
    ) -> Result<ChunkReader, StreamError> {
        if n % self.chunk_size != 0 {
            return Err(StreamError::ChunkMisaligned {
                requested: n,
                chunk_size: self.chunk_size,
            });
        }

        Ok(ChunkReader {
            consumer: self.clone(),
            remaining: n / self.chunk_size,
            overflow,
            wait,
            done: false,
        })
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    /// Number of frames currently queued
    pub fn len(&self) -> usize {
        self.rx.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }

    fn pop(&self, wait: Option<Duration>) -> Result<Bytes, StreamError> {
        match wait {
            None => self.rx.try_recv().map_err(|e| match e {
                TryRecvError::Empty => StreamError::Overflow,
                TryRecvError::Disconnected => StreamError::Disconnected,
            }),
            Some(timeout) => self.rx.recv_timeout(timeout).map_err(|e| match e {
                RecvTimeoutError::Timeout => StreamError::Overflow,
                RecvTimeoutError::Disconnected => StreamError::Disconnected,
            }),
        }
    }
}

/// Lazy sequence of frames produced by one read call.
///
/// Yields at most `n / chunk_size` frames. It is not a cursor: once it ends,
/// issue a new read.
#[derive(Debug)]
pub struct ChunkReader {
    consumer: FrameConsumer,
    remaining: usize,
    overflow: bool,
    wait: Option<Duration>,
    done: bool,
}

impl ChunkReader {
    /// Frames still to be read on the happy path
    pub fn remaining(&self) -> usize {
        self.remaining
    }

    /// Drain into one contiguous buffer
    pub fn join(self) -> Result<Vec<u8>, StreamError> {
        // Size from what is queued; `remaining` comes from the caller's `n`
        let frames = self.remaining.min(self.consumer.len());
        let mut out = Vec::with_capacity(frames * self.consumer.chunk_size);
        for frame in self {
            out.extend_from_slice(&frame?);
        }
        Ok(out)
    }
}

impl Iterator for ChunkReader {
    type Item = Result<Bytes, StreamError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done || self.remaining == 0 {
            return None;
        }

        match self.consumer.pop(self.wait) {
            Ok(frame) => {
                self.remaining -= 1;
                self.consumer.counters.frames_read.fetch_add(1, Ordering::Relaxed);
                Some(Ok(frame))
            }
            Err(err) => {
                self.done = true;
                if self.overflow {
                    self.consumer.counters.overflows.fetch_add(1, Ordering::Relaxed);
                    Some(Err(err))
                } else {
                    None
                }
            }
        }
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        if self.done {
            (0, Some(0))
        } else {
            (0, Some(self.remaining))
        }
    }
}

impl FusedIterator for ChunkReader {}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn buffer(chunk_size: usize) -> (FrameProducer, FrameConsumer, MuteGate) {
        let gate = MuteGate::default();
        let (producer, consumer) =
            audio_buffer(chunk_size, gate.clone(), Arc::new(StreamCounters::new()));
        (producer, consumer, gate)
    }

    fn frame(fill: u8, len: usize) -> Bytes {
        Bytes::from(vec![fill; len])
    }

    #[test]
    fn test_read_in_order_then_overflow() {
        let (producer, consumer, _) = buffer(1024);

        for i in 0..3 {
            producer.push(frame(i, 1024)).unwrap();
        }

        let frames: Vec<Bytes> = consumer
            .read(3072, true)
            .unwrap()
            .collect::<Result<_, _>>()
            .unwrap();
        assert_eq!(frames, vec![frame(0, 1024), frame(1, 1024), frame(2, 1024)]);

        let mut reader = consumer.read(1024, true).unwrap();
        assert_eq!(reader.next(), Some(Err(StreamError::Overflow)));
        assert_eq!(reader.next(), None);
    }

    #[test]
    fn test_short_read_without_overflow() {
        let (producer, consumer, _) = buffer(4);
        producer.push(frame(7, 4)).unwrap();

        let frames: Vec<_> = consumer.read(16, false).unwrap().collect();
        assert_eq!(frames, vec![Ok(frame(7, 4))]);

        assert_eq!(consumer.read(8, false).unwrap().count(), 0);
    }

    #[test]
    fn test_misaligned_read_fails_fast() {
        let (producer, consumer, _) = buffer(1024);
        producer.push(frame(1, 1024)).unwrap();

        let err = consumer.read(1500, false).unwrap_err();
        assert_eq!(
            err,
            StreamError::ChunkMisaligned { requested: 1500, chunk_size: 1024 }
        );
        // Nothing was consumed
        assert_eq!(consumer.len(), 1);
    }

    #[test]
    fn test_zero_read_is_empty() {
        let (producer, consumer, _) = buffer(2);
        producer.push(frame(1, 2)).unwrap();
        assert_eq!(consumer.read(0, true).unwrap().count(), 0);
        assert_eq!(consumer.len(), 1);
    }

    #[test]
    fn test_frames_are_not_merged_or_split() {
        let (producer, consumer, _) = buffer(2);
        producer.push(frame(1, 5)).unwrap();
        producer.push(frame(2, 1)).unwrap();

        let frames: Vec<_> = consumer.read(4, false).unwrap().collect();
        assert_eq!(frames, vec![Ok(frame(1, 5)), Ok(frame(2, 1))]);
    }

    #[test]
    fn test_muted_writes_are_dropped() {
        let (producer, consumer, gate) = buffer(2);
        gate.mute();
        for _ in 0..5 {
            producer.push(frame(9, 2)).unwrap();
        }
        assert!(consumer.is_empty());

        gate.unmute();
        producer.push(frame(3, 2)).unwrap();
        let frames: Vec<_> = consumer.read(2, true).unwrap().collect();
        assert_eq!(frames, vec![Ok(frame(3, 2))]);
    }

    #[test]
    fn test_mute_keeps_queued_frames() {
        let (producer, consumer, gate) = buffer(2);
        producer.push(frame(1, 2)).unwrap();
        gate.mute();
        assert_eq!(consumer.read(2, true).unwrap().join().unwrap(), vec![1, 1]);
    }

    #[test]
    fn test_join() {
        let (producer, consumer, _) = buffer(2);
        producer.push(frame(1, 2)).unwrap();
        producer.push(frame(2, 2)).unwrap();
        assert_eq!(consumer.read(4, true).unwrap().join().unwrap(), vec![1, 1, 2, 2]);

        assert_eq!(consumer.read(2, true).unwrap().join(), Err(StreamError::Overflow));
    }

    #[test]
    fn test_read_timeout_waits_for_producer() {
        let (producer, consumer, _) = buffer(2);

        let handle = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(20));
            producer.push(frame(4, 2)).unwrap();
            producer
        });

        let data = consumer
            .read_timeout(2, true, Duration::from_secs(5))
            .unwrap()
            .join()
            .unwrap();
        assert_eq!(data, vec![4, 4]);

        let _producer = handle.join().unwrap();
        let mut reader = consumer
            .read_timeout(2, true, Duration::from_millis(10))
            .unwrap();
        assert_eq!(reader.next(), Some(Err(StreamError::Overflow)));
    }

    #[test]
    fn test_disconnected_producer() {
        let (producer, consumer, _) = buffer(2);
        drop(producer);
        let mut reader = consumer.read(2, true).unwrap();
        assert_eq!(reader.next(), Some(Err(StreamError::Disconnected)));
        assert_eq!(consumer.read(2, false).unwrap().count(), 0);
    }

    #[test]
    fn test_counters() {
        let gate = MuteGate::default();
        let counters = Arc::new(StreamCounters::new());
        let (producer, consumer) = audio_buffer(2, gate.clone(), counters.clone());

        producer.push(frame(1, 2)).unwrap();
        producer.push(frame(1, 2)).unwrap();
        gate.mute();
        producer.push(frame(1, 2)).unwrap();
        let _ = consumer.read(6, true).unwrap().count();

        let stats = counters.snapshot();
        assert_eq!(stats.frames_received, 2);
        assert_eq!(stats.bytes_received, 4);
        assert_eq!(stats.frames_muted, 1);
        assert_eq!(stats.frames_read, 2);
        assert_eq!(stats.overflows, 1);
    }

    #[test]
    fn test_join_huge_aligned_read() {
        let (producer, consumer, _) = buffer(1024);
        producer.push(frame(3, 1024)).unwrap();

        let n = (usize::MAX / 1024) * 1024;
        let data = consumer.read(n, false).unwrap().join().unwrap();
        assert_eq!(data, vec![3; 1024]);

        let data = consumer.read(1 << 36, false).unwrap().join().unwrap();
        assert!(data.is_empty());
    }

    proptest! {
        #[test]
        fn prop_fifo_order(frames in prop::collection::vec(prop::collection::vec(any::<u8>(), 0..64), 0..32)) {
            let (producer, consumer, _) = buffer(16);
            for f in &frames {
                producer.push(Bytes::from(f.clone())).unwrap();
            }

            let read: Vec<Vec<u8>> = consumer
                .read(16 * frames.len(), false)
                .unwrap()
                .map(|f| f.unwrap().to_vec())
                .collect();
            prop_assert_eq!(read, frames);
            prop_assert!(consumer.is_empty());
        }
    }
}
