//! Audio device abstraction and the bounded sample queue feeding it.
//!
//! The decode loop pushes interleaved f32 frames into a [`SampleQueue`];
//! the device callback pops from it and zero-fills on underrun.  The
//! queue is bounded so decode throughput is paced by real playback, and
//! both sides unblock promptly when the queue is closed.

use std::any::Any;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::time::{Duration, Instant};

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{SampleFormat, SampleRate};
use radio_core::RadioError;
use tracing::{debug, error, warn};

/// How the device wants its samples.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OutputSpec {
    pub sample_rate: u32,
    pub channels: u16,
}

// ── sample queue ──────────────────────────────────────────────────────────────

#[derive(Debug, Default)]
struct QueueInner {
    samples: VecDeque<f32>,
    closed: bool,
}

/// Bounded FIFO of interleaved f32 samples between decode and playback.
#[derive(Debug)]
pub struct SampleQueue {
    inner: Mutex<QueueInner>,
    space: Condvar,
    capacity: usize,
}

impl SampleQueue {
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Mutex::new(QueueInner::default()),
            space: Condvar::new(),
            capacity: capacity.max(1),
        }
    }

    /// Enqueues one packet's worth of samples, waiting for space.
    ///
    /// A packet is admitted whenever the queue is below capacity, even
    /// if the packet itself overshoots it, so a single oversized packet
    /// cannot deadlock the pipeline.  Returns false when the queue was
    /// closed or `keep` went false while waiting.
    pub fn push_blocking(&self, samples: &[f32], keep: &AtomicBool) -> bool {
        let mut inner = self.inner.lock().unwrap();
        loop {
            if inner.closed || !keep.load(Ordering::SeqCst) {
                return false;
            }
            if inner.samples.len() < self.capacity {
                inner.samples.extend(samples.iter().copied());
                return true;
            }
            let (guard, _) = self
                .space
                .wait_timeout(inner, Duration::from_millis(10))
                .unwrap();
            inner = guard;
        }
    }

    /// Pops up to `out.len()` samples; the remainder is zero-filled.
    /// Returns how many real samples were written.  Called from the
    /// device callback, so it never blocks.
    pub fn pop_into(&self, out: &mut [f32]) -> usize {
        let mut inner = self.inner.lock().unwrap();
        let n = out.len().min(inner.samples.len());
        for slot in out.iter_mut().take(n) {
            *slot = inner.samples.pop_front().unwrap_or(0.0);
        }
        drop(inner);
        for slot in out.iter_mut().skip(n) {
            *slot = 0.0;
        }
        if n > 0 {
            self.space.notify_one();
        }
        n
    }

    pub fn queued_samples(&self) -> usize {
        self.inner.lock().unwrap().samples.len()
    }

    /// Drops all buffered samples without closing the queue.
    pub fn clear(&self) {
        self.inner.lock().unwrap().samples.clear();
        self.space.notify_all();
    }

    /// Closes the queue: pending and future pushes return false.
    pub fn close(&self) {
        self.inner.lock().unwrap().closed = true;
        self.space.notify_all();
    }

    /// Waits until the queue drains or `timeout` passes.  Bounded poll;
    /// the callback side has no doorbell for "went empty".
    pub fn wait_empty(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        loop {
            if self.queued_samples() == 0 {
                return true;
            }
            if Instant::now() >= deadline {
                return false;
            }
            std::thread::sleep(Duration::from_millis(10));
        }
    }
}

// ── device abstraction ────────────────────────────────────────────────────────

/// One opened playback device.
///
/// Dropping the session releases the device.  The backend-specific
/// stream handle is type-erased because backends like cpal hand out
/// `!Send` guards that must stay on the opening thread.
pub struct OutputSession {
    spec: OutputSpec,
    queue: Arc<SampleQueue>,
    _guard: Box<dyn Any>,
}

impl OutputSession {
    pub fn new(spec: OutputSpec, queue: Arc<SampleQueue>, guard: Box<dyn Any>) -> Self {
        Self {
            spec,
            queue,
            _guard: guard,
        }
    }

    /// The negotiated device format.  May differ from what was
    /// requested; the caller resamples to bridge the gap.
    pub fn spec(&self) -> OutputSpec {
        self.spec
    }

    pub fn queue(&self) -> Arc<SampleQueue> {
        Arc::clone(&self.queue)
    }
}

/// Factory for playback sessions.  `open` is called on the session
/// worker thread and the returned session stays there.
pub trait AudioOutput: Send + Sync {
    fn open(&self, requested: OutputSpec) -> Result<OutputSession, RadioError>;
}

// ── cpal backend ──────────────────────────────────────────────────────────────

/// Real playback through the system's default output device.
///
/// The device claim is independent of any session serialization above:
/// even if an old session outlives its stop deadline, a second `open`
/// fails instead of double-opening the device.
#[derive(Debug, Default)]
pub struct CpalOutput {
    /// Queue depth in seconds of audio at the negotiated rate.
    pub buffer_seconds: f32,
    claimed: Arc<AtomicBool>,
}

impl CpalOutput {
    pub fn new() -> Self {
        Self {
            buffer_seconds: 1.0,
            claimed: Arc::new(AtomicBool::new(false)),
        }
    }
}

/// Releases the device claim when the session guard is dropped.
struct DeviceClaim {
    claimed: Arc<AtomicBool>,
}

impl Drop for DeviceClaim {
    fn drop(&mut self) {
        self.claimed.store(false, Ordering::SeqCst);
    }
}

impl AudioOutput for CpalOutput {
    fn open(&self, requested: OutputSpec) -> Result<OutputSession, RadioError> {
        if self.claimed.swap(true, Ordering::SeqCst) {
            return Err(RadioError::Device(
                "output device is already claimed by another session".to_string(),
            ));
        }
        let claim = DeviceClaim {
            claimed: Arc::clone(&self.claimed),
        };

        let host = cpal::default_host();
        let device = host
            .default_output_device()
            .ok_or_else(|| RadioError::Device("no default output device".to_string()))?;

        let supported = pick_config(&device, requested)?;
        let spec = OutputSpec {
            sample_rate: supported.sample_rate().0,
            channels: supported.channels(),
        };
        let sample_format = supported.sample_format();
        let config = supported.config();
        debug!(
            "output: requested {}Hz/{}ch, device gives {}Hz/{}ch ({sample_format:?})",
            requested.sample_rate, requested.channels, spec.sample_rate, spec.channels
        );

        let buffer_seconds = if self.buffer_seconds > 0.0 {
            self.buffer_seconds
        } else {
            1.0
        };
        let capacity =
            (spec.sample_rate as f32 * spec.channels as f32 * buffer_seconds) as usize;
        let queue = Arc::new(SampleQueue::new(capacity));

        let stream = build_stream(&device, &config, sample_format, Arc::clone(&queue))?;
        stream
            .play()
            .map_err(|e| RadioError::Device(e.to_string()))?;

        Ok(OutputSession::new(spec, queue, Box::new((stream, claim))))
    }
}

/// Picks the supported config closest to what the decoder produces so
/// the resampler has the least work to do.  Falls back to the device
/// default when nothing matches.  The returned config carries the
/// sample format the stream must be built with.
fn pick_config(
    device: &cpal::Device,
    requested: OutputSpec,
) -> Result<cpal::SupportedStreamConfig, RadioError> {
    let supported = device
        .supported_output_configs()
        .map_err(|e| RadioError::Device(e.to_string()))?;

    if let Some(config) = choose_supported(supported, requested) {
        return Ok(config);
    }

    warn!(
        "output: no config matches {}ch, using device default",
        requested.channels
    );
    device
        .default_output_config()
        .map_err(|e| RadioError::Device(e.to_string()))
}

/// Selection among the advertised ranges: exact rate match on the
/// requested channel count wins, else the max rate of a matching
/// channel range, else nothing.
fn choose_supported(
    ranges: impl IntoIterator<Item = cpal::SupportedStreamConfigRange>,
    requested: OutputSpec,
) -> Option<cpal::SupportedStreamConfig> {
    let mut fallback = None;
    for range in ranges {
        if range.channels() != requested.channels {
            continue;
        }
        if range.min_sample_rate().0 <= requested.sample_rate
            && requested.sample_rate <= range.max_sample_rate().0
        {
            return Some(range.with_sample_rate(SampleRate(requested.sample_rate)));
        }
        fallback.get_or_insert_with(|| range.with_max_sample_rate());
    }
    fallback
}

fn build_stream(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    sample_format: SampleFormat,
    queue: Arc<SampleQueue>,
) -> Result<cpal::Stream, RadioError> {
    let err_fn = |e| error!("output: device stream error: {e}");

    let stream = match sample_format {
        SampleFormat::F32 => device.build_output_stream(
            config,
            move |data: &mut [f32], _| {
                queue.pop_into(data);
            },
            err_fn,
            None,
        ),
        SampleFormat::I16 => {
            let mut scratch = Vec::new();
            device.build_output_stream(
                config,
                move |data: &mut [i16], _| {
                    scratch.resize(data.len(), 0.0);
                    queue.pop_into(&mut scratch);
                    for (dst, &src) in data.iter_mut().zip(scratch.iter()) {
                        *dst = (src.clamp(-1.0, 1.0) * i16::MAX as f32) as i16;
                    }
                },
                err_fn,
                None,
            )
        }
        SampleFormat::U16 => {
            let mut scratch = Vec::new();
            device.build_output_stream(
                config,
                move |data: &mut [u16], _| {
                    scratch.resize(data.len(), 0.0);
                    queue.pop_into(&mut scratch);
                    for (dst, &src) in data.iter_mut().zip(scratch.iter()) {
                        let unit = src.clamp(-1.0, 1.0) * 0.5 + 0.5;
                        *dst = (unit * u16::MAX as f32) as u16;
                    }
                },
                err_fn,
                None,
            )
        }
        other => {
            return Err(RadioError::Device(format!(
                "unsupported device sample format {other:?}"
            )))
        }
    };

    stream.map_err(|e| RadioError::Device(e.to_string()))
}
