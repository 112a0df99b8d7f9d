//! Shared fixtures: generated WAV files and a device-free audio output
//! that drains the queue at playback speed.

use std::io::Write;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use radio_engine::{AudioOutput, OutputSession, OutputSpec, RadioError, SampleQueue};
use tempfile::NamedTempFile;

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();
}

/// Writes a 16-bit PCM WAV with `frames` frames of a 440 Hz tone.
pub fn make_wav(rate: u32, channels: u16, frames: usize) -> NamedTempFile {
    let mut file = tempfile::Builder::new()
        .prefix("radio-fixture-")
        .suffix(".wav")
        .tempfile()
        .expect("create fixture file");

    let block_align = channels * 2;
    let data_len = (frames * block_align as usize) as u32;
    let byte_rate = rate * block_align as u32;

    let mut bytes = Vec::with_capacity(44 + data_len as usize);
    bytes.extend_from_slice(b"RIFF");
    bytes.extend_from_slice(&(36 + data_len).to_le_bytes());
    bytes.extend_from_slice(b"WAVE");
    bytes.extend_from_slice(b"fmt ");
    bytes.extend_from_slice(&16u32.to_le_bytes());
    bytes.extend_from_slice(&1u16.to_le_bytes()); // PCM
    bytes.extend_from_slice(&channels.to_le_bytes());
    bytes.extend_from_slice(&rate.to_le_bytes());
    bytes.extend_from_slice(&byte_rate.to_le_bytes());
    bytes.extend_from_slice(&block_align.to_le_bytes());
    bytes.extend_from_slice(&16u16.to_le_bytes()); // bits per sample
    bytes.extend_from_slice(b"data");
    bytes.extend_from_slice(&data_len.to_le_bytes());

    for i in 0..frames {
        let t = i as f32 / rate as f32;
        let sample = ((t * 440.0 * std::f32::consts::TAU).sin() * 0.3 * i16::MAX as f32) as i16;
        for _ in 0..channels {
            bytes.extend_from_slice(&sample.to_le_bytes());
        }
    }

    file.write_all(&bytes).expect("write fixture");
    file.flush().expect("flush fixture");
    file
}

/// Counters shared with the test body.
#[derive(Default)]
pub struct MockStats {
    /// Sessions currently open.
    pub open_now: AtomicUsize,
    /// High-water mark of concurrently open sessions.
    pub max_concurrent: AtomicUsize,
    /// Real (non-silence) samples the consumer has popped.
    pub samples_seen: AtomicUsize,
}

/// An output whose consumer thread pops samples at roughly real-time
/// playback speed, so the bounded queue paces the decode loop the way
/// a sound card would.
pub struct MockOutput {
    pub stats: Arc<MockStats>,
}

impl MockOutput {
    pub fn new() -> Self {
        Self {
            stats: Arc::new(MockStats::default()),
        }
    }
}

struct MockGuard {
    stats: Arc<MockStats>,
    stop: Arc<AtomicBool>,
    consumer: Option<thread::JoinHandle<()>>,
}

impl Drop for MockGuard {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::SeqCst);
        if let Some(handle) = self.consumer.take() {
            let _ = handle.join();
        }
        self.stats.open_now.fetch_sub(1, Ordering::SeqCst);
    }
}

impl AudioOutput for MockOutput {
    fn open(&self, requested: OutputSpec) -> Result<OutputSession, RadioError> {
        let stats = Arc::clone(&self.stats);
        let now = stats.open_now.fetch_add(1, Ordering::SeqCst) + 1;
        stats.max_concurrent.fetch_max(now, Ordering::SeqCst);

        // A quarter second of buffer, like a small hardware ring.
        let capacity = (requested.sample_rate as usize * requested.channels as usize) / 4;
        let queue = Arc::new(SampleQueue::new(capacity.max(1)));

        let stop = Arc::new(AtomicBool::new(false));
        let tick_samples =
            (requested.sample_rate as usize * requested.channels as usize) / 100;

        let consumer = {
            let queue = Arc::clone(&queue);
            let stop = Arc::clone(&stop);
            let stats = Arc::clone(&stats);
            thread::spawn(move || {
                let mut chunk = vec![0.0f32; tick_samples.max(1)];
                while !stop.load(Ordering::SeqCst) {
                    let popped = queue.pop_into(&mut chunk);
                    stats.samples_seen.fetch_add(popped, Ordering::SeqCst);
                    thread::sleep(Duration::from_millis(10));
                }
            })
        };

        let guard = MockGuard {
            stats,
            stop,
            consumer: Some(consumer),
        };
        Ok(OutputSession::new(requested, queue, Box::new(guard)))
    }
}

/// Polls `predicate` every 10 ms until it holds or `timeout` passes.
pub fn wait_for(timeout: Duration, predicate: impl Fn() -> bool) -> bool {
    let deadline = std::time::Instant::now() + timeout;
    while std::time::Instant::now() < deadline {
        if predicate() {
            return true;
        }
        thread::sleep(Duration::from_millis(10));
    }
    predicate()
}
