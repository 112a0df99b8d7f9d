//! Playback position derived from decode progress.
//!
//! The decode loop records the presentation duration of every packet it
//! enqueues.  Readers see `baseline + min(elapsed since the last packet,
//! that packet's duration)`, which advances smoothly between packets but
//! freezes when the stream stalls instead of drifting past real decode
//! progress.

use std::sync::Mutex;
use std::time::{Duration, Instant};

#[derive(Debug, Default)]
struct PositionInner {
    /// Accumulated duration of all fully-counted packets, plus the seek
    /// baseline.
    base: Duration,
    /// Duration of the most recent packet, not yet folded into `base`.
    last_dur: Duration,
    /// When the most recent packet was recorded.
    last_mark: Option<Instant>,
}

#[derive(Debug, Default)]
pub struct PositionTracker {
    inner: Mutex<PositionInner>,
}

impl PositionTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Restarts the clock at `base` (0 for fresh plays, the seek target
    /// after `move_to`).
    pub fn reset(&self, base: Duration) {
        let mut inner = self.inner.lock().unwrap();
        inner.base = base;
        inner.last_dur = Duration::ZERO;
        inner.last_mark = None;
    }

    /// Called once per enqueued packet with its presentation duration.
    pub fn record_packet(&self, dur: Duration) {
        let mut inner = self.inner.lock().unwrap();
        let carried = inner.last_dur;
        inner.base += carried;
        inner.last_dur = dur;
        inner.last_mark = Some(Instant::now());
    }

    /// Current playback position.  Monotone while packets keep arriving;
    /// bounded by the last packet's duration when they stop.
    pub fn current(&self) -> Duration {
        let inner = self.inner.lock().unwrap();
        match inner.last_mark {
            Some(mark) => inner.base + mark.elapsed().min(inner.last_dur),
            None => inner.base,
        }
    }
}
