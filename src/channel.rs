//! Synchronized latest-frame hand-off between one producer and many readers.
//!
//! Every registered input source owns one [`FrameChannel`]. The producer
//! thread calls [`FrameChannel::publish`] for each captured JPEG; any number
//! of consumer threads block in [`FrameReader::wait_and_copy`] and receive a
//! private copy of the most recent frame.
//!
//! The channel is a *latest-value* conduit, not a queue: a slow reader skips
//! intermediate frames and always resumes at the newest one. Publishes are
//! totally ordered by the slot mutex, so a reader never observes a frame
//! that mixes bytes from two publishes.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Headroom added whenever the retained buffer has to grow, so that small
/// frame size fluctuations do not reallocate on every publish.
const GROW_HEADROOM: usize = 10 * 1024;

/// How long a blocked reader sleeps between stop-flag checks. The flag is
/// normally paired with a broadcast wake, so this only bounds the exit delay
/// when a caller sets the flag without going through the context.
const WAIT_SLICE: Duration = Duration::from_millis(100);

// ----------------------------------------------------------------------------
// FrameTimestamp
// ----------------------------------------------------------------------------

/// Capture timestamp with microsecond resolution, carried with each frame
/// and rendered as `<sec>.<usec>` in the `X-Timestamp` response header.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct FrameTimestamp {
    pub sec: u64,
    pub usec: u32,
}

impl FrameTimestamp {
    pub fn now() -> Self {
        match SystemTime::now().duration_since(UNIX_EPOCH) {
            Ok(elapsed) => Self {
                sec: elapsed.as_secs(),
                usec: elapsed.subsec_micros(),
            },
            // Clock before the epoch; stamp zero rather than failing capture.
            Err(_) => Self::default(),
        }
    }
}

impl std::fmt::Display for FrameTimestamp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{:06}", self.sec, self.usec)
    }
}

// ----------------------------------------------------------------------------
// FrameChannel
// ----------------------------------------------------------------------------

/// The retained frame. `buf` never shrinks; `len` marks the valid prefix.
/// Both are only touched under the channel mutex, which is what makes a
/// concurrent copy-out consistent.
struct FrameSlot {
    buf: Vec<u8>,
    len: usize,
    timestamp: FrameTimestamp,
    /// Publish counter; readers use it as their cursor.
    seq: u64,
}

/// Single-writer / multi-reader synchronized slot holding the most recent
/// frame of one input source.
pub struct FrameChannel {
    slot: Mutex<FrameSlot>,
    fresh: Condvar,
    stop: Arc<AtomicBool>,
}

impl FrameChannel {
    /// Create a channel bound to the process-wide stop flag. `capacity_hint`
    /// pre-sizes the retained buffer for the expected frame size.
    pub fn new(stop: Arc<AtomicBool>, capacity_hint: usize) -> Self {
        Self {
            slot: Mutex::new(FrameSlot {
                buf: vec![0; capacity_hint],
                len: 0,
                timestamp: FrameTimestamp::default(),
                seq: 0,
            }),
            fresh: Condvar::new(),
            stop,
        }
    }

    /// Publish a frame and broadcast-wake every blocked reader.
    ///
    /// Must be called by exactly one producer thread at a time; the owning
    /// module guarantees this, the channel does not arbitrate. The retained
    /// buffer grows only when the frame is larger than everything seen so
    /// far and is never shrunk.
    pub fn publish(&self, bytes: &[u8], timestamp: FrameTimestamp) {
        let mut slot = self.lock_slot();
        if bytes.len() > slot.buf.len() {
            log::debug!(
                "frame buffer grows {} -> {} bytes",
                slot.buf.len(),
                bytes.len() + GROW_HEADROOM
            );
            slot.buf.resize(bytes.len() + GROW_HEADROOM, 0);
        }
        slot.buf[..bytes.len()].copy_from_slice(bytes);
        slot.len = bytes.len();
        slot.timestamp = timestamp;
        slot.seq += 1;
        drop(slot);
        self.fresh.notify_all();
    }

    /// Wake every blocked reader without publishing. Used on shutdown so
    /// readers observe the stop flag instead of hanging forever.
    pub fn wake_all(&self) {
        // Taking the lock orders the wake after any in-flight wait re-check.
        drop(self.lock_slot());
        self.fresh.notify_all();
    }

    /// Set the shared stop flag and wake all readers of this channel.
    pub fn stop(&self) {
        self.stop.store(true, Ordering::SeqCst);
        self.wake_all();
    }

    pub fn is_stopped(&self) -> bool {
        self.stop.load(Ordering::SeqCst)
    }

    /// New reader cursor. The first `wait_and_copy` on a fresh reader
    /// returns the currently retained frame if one was already published.
    pub fn reader(self: &Arc<Self>) -> FrameReader {
        FrameReader {
            channel: Arc::clone(self),
            last_seq: 0,
        }
    }

    /// Current retained buffer size in bytes (monotonic).
    pub fn retained_capacity(&self) -> usize {
        self.lock_slot().buf.len()
    }

    fn lock_slot(&self) -> std::sync::MutexGuard<'_, FrameSlot> {
        // A poisoned slot means a publisher or reader panicked mid-copy;
        // the frame can no longer be trusted, so propagating the panic is
        // the only safe option.
        self.slot.lock().expect("frame slot lock poisoned")
    }
}

// ----------------------------------------------------------------------------
// FrameReader
// ----------------------------------------------------------------------------

/// Per-consumer cursor over a [`FrameChannel`].
///
/// Each reader remembers the sequence number of the last frame it copied, so
/// repeated calls deliver each retained frame at most once and otherwise
/// block until the next publish.
pub struct FrameReader {
    channel: Arc<FrameChannel>,
    last_seq: u64,
}

impl FrameReader {
    /// Block until a frame newer than this cursor exists, then copy it into
    /// `out` (growing `out` if needed) while holding the slot lock.
    ///
    /// Returns the frame length and capture timestamp, or `None` once the
    /// stop flag is set.
    pub fn wait_and_copy(&mut self, out: &mut Vec<u8>) -> Option<(usize, FrameTimestamp)> {
        let mut slot = self.channel.lock_slot();
        loop {
            if self.channel.is_stopped() {
                return None;
            }
            if slot.seq != self.last_seq && slot.len > 0 {
                break;
            }
            let (guard, _timeout) = self
                .channel
                .fresh
                .wait_timeout(slot, WAIT_SLICE)
                .expect("frame slot lock poisoned");
            slot = guard;
        }
        if slot.len > out.len() {
            out.resize(slot.len, 0);
        }
        out[..slot.len].copy_from_slice(&slot.buf[..slot.len]);
        self.last_seq = slot.seq;
        Some((slot.len, slot.timestamp))
    }

    pub fn channel(&self) -> &Arc<FrameChannel> {
        &self.channel
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
