//! Session controller: one live playback session at a time.
//!
//! `play` is non-blocking: it tears down any previous session, resets
//! the published state, and hands the new target to a detached worker
//! thread.  Every start path holds the start lock while the previous
//! worker is stopped and awaited.  A worker that overruns the stop
//! deadline is abandoned, not trusted: each session carries its own
//! cancellation token and a generation number, and a stale worker's
//! writes to the shared state are discarded, so it can neither resume
//! on the next session's behalf nor clobber its published flags.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use radio_core::{PresetTable, RadioError, TransportSnapshot};
use tracing::{debug, info, warn};

use crate::metadata::StreamNamePublisher;
use crate::output::{AudioOutput, SampleQueue};
use crate::pipeline::run_session;
use crate::position::PositionTracker;
use crate::resolver::{resolve_target, ResolverConfig};

/// How long `stop_and_wait` gives the worker to notice cancellation
/// and release the device.
const STOP_TIMEOUT: Duration = Duration::from_secs(5);

/// State shared between the controller and session worker threads.
///
/// Readers (the UI thread) touch only atomics and short-lived locks,
/// so polling never waits on the decode loop.
pub(crate) struct SessionShared {
    /// Bumped at every session start; a worker whose generation no
    /// longer matches is stale and must not write here.
    generation: AtomicU64,
    /// The live session's cancellation token (true = keep playing).
    active_keep: Mutex<Option<Arc<AtomicBool>>>,
    playing: AtomicBool,
    has_error: AtomicBool,
    last_error: Mutex<String>,
    last_target: Mutex<String>,
    total_run_ms: AtomicU64,
    position: PositionTracker,
    stream_name: StreamNamePublisher,
    connect_timeout: Duration,
    read_timeout: Duration,
    /// The live session's queue; `stop` clears and closes it so a
    /// blocked enqueue unblocks immediately.
    active_queue: Mutex<Option<Arc<SampleQueue>>>,
    idle_lock: Mutex<()>,
    idle_cond: Condvar,
}

impl SessionShared {
    fn new(connect_timeout: Duration, read_timeout: Duration) -> Self {
        Self {
            generation: AtomicU64::new(0),
            active_keep: Mutex::new(None),
            playing: AtomicBool::new(false),
            has_error: AtomicBool::new(false),
            last_error: Mutex::new(String::new()),
            last_target: Mutex::new(String::new()),
            total_run_ms: AtomicU64::new(0),
            position: PositionTracker::new(),
            stream_name: StreamNamePublisher::new(),
            connect_timeout,
            read_timeout,
            active_queue: Mutex::new(None),
            idle_lock: Mutex::new(()),
            idle_cond: Condvar::new(),
        }
    }

    fn take_queue_handle(&self) -> Option<Arc<SampleQueue>> {
        self.active_queue.lock().unwrap().clone()
    }

    fn mark_idle(&self) {
        self.playing.store(false, Ordering::SeqCst);
        *self.active_queue.lock().unwrap() = None;
        let _guard = self.idle_lock.lock().unwrap();
        self.idle_cond.notify_all();
    }

    fn record_failure(&self, err: &RadioError) {
        *self.last_error.lock().unwrap() = err.to_string();
        self.has_error.store(true, Ordering::SeqCst);
    }
}

/// One session's view of the shared state.
///
/// All writes go through here and are dropped once a newer session has
/// been started, so an abandoned worker finishing late cannot disturb
/// its successor.
pub(crate) struct SessionCtx {
    shared: Arc<SessionShared>,
    keep: Arc<AtomicBool>,
    generation: u64,
}

impl SessionCtx {
    fn is_current(&self) -> bool {
        self.shared.generation.load(Ordering::SeqCst) == self.generation
    }

    /// True while this session should keep decoding: its own token is
    /// set and no newer session has been started.
    pub(crate) fn keep_playing(&self) -> bool {
        self.keep.load(Ordering::SeqCst) && self.is_current()
    }

    /// The raw token, for enqueue waits.  `stop` flips it, so a push
    /// blocked on a full queue unblocks without consulting the
    /// generation.
    pub(crate) fn keep_flag(&self) -> &AtomicBool {
        &self.keep
    }

    pub(crate) fn connect_timeout(&self) -> Duration {
        self.shared.connect_timeout
    }

    pub(crate) fn read_timeout(&self) -> Duration {
        self.shared.read_timeout
    }

    pub(crate) fn set_active_queue(&self, queue: Option<Arc<SampleQueue>>) {
        if self.is_current() {
            *self.shared.active_queue.lock().unwrap() = queue;
        }
    }

    pub(crate) fn set_total_run(&self, total: Duration) {
        if self.is_current() {
            self.shared
                .total_run_ms
                .store(total.as_millis() as u64, Ordering::SeqCst);
        }
    }

    pub(crate) fn reset_position(&self, base: Duration) {
        if self.is_current() {
            self.shared.position.reset(base);
        }
    }

    pub(crate) fn record_packet(&self, dur: Duration) {
        if self.is_current() {
            self.shared.position.record_packet(dur);
        }
    }

    pub(crate) fn publish_stream_name(&self, name: &str) {
        if self.is_current() {
            self.shared.stream_name.publish(name);
        }
    }

    fn record_failure(&self, err: &RadioError) {
        if self.is_current() {
            self.shared.record_failure(err);
        }
    }

    fn finish(&self) {
        if self.is_current() {
            self.shared.mark_idle();
        }
    }
}

/// The embedding application's handle to the radio engine.
pub struct RadioHost {
    presets: Arc<PresetTable>,
    output: Arc<dyn AudioOutput>,
    resolver: ResolverConfig,
    shared: Arc<SessionShared>,
    /// Serializes `play`/`stop`/`move_to` so session teardown and
    /// spawn never interleave across callers.
    start_lock: Mutex<()>,
}

impl RadioHost {
    pub fn new(presets: PresetTable, output: Arc<dyn AudioOutput>) -> Self {
        Self::with_resolver(presets, output, ResolverConfig::default())
    }

    pub fn with_resolver(
        presets: PresetTable,
        output: Arc<dyn AudioOutput>,
        resolver: ResolverConfig,
    ) -> Self {
        let shared = SessionShared::new(resolver.connect_timeout, resolver.request_timeout);
        Self {
            presets: Arc::new(presets),
            output,
            resolver,
            shared: Arc::new(shared),
            start_lock: Mutex::new(()),
        }
    }

    /// Starts playing `target` (preset name or URL) from the beginning.
    /// Any current session is stopped first.  Returns once the worker
    /// is spawned; resolution and decoding happen on the worker.
    pub fn play(&self, target: &str) {
        self.play_at(target, Duration::ZERO);
    }

    /// Starts playing `target` from `start_offset` into the stream.
    pub fn play_at(&self, target: &str, start_offset: Duration) {
        let _start = self.start_lock.lock().unwrap();
        self.stop_and_wait_inner();

        let shared = &self.shared;
        let generation = shared.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let keep = Arc::new(AtomicBool::new(true));
        *shared.active_keep.lock().unwrap() = Some(Arc::clone(&keep));

        shared.has_error.store(false, Ordering::SeqCst);
        shared.last_error.lock().unwrap().clear();
        shared.total_run_ms.store(0, Ordering::SeqCst);
        shared.position.reset(start_offset);
        shared.stream_name.clear();
        *shared.last_target.lock().unwrap() = target.to_string();
        shared.playing.store(true, Ordering::SeqCst);

        info!("host: playing {:?} from {:?}", target, start_offset);

        let presets = Arc::clone(&self.presets);
        let output = Arc::clone(&self.output);
        let resolver = self.resolver.clone();
        let ctx = SessionCtx {
            shared: Arc::clone(shared),
            keep,
            generation,
        };
        let target = target.to_string();

        let spawned = thread::Builder::new()
            .name("radio-session".to_string())
            .spawn(move || {
                let resolved = resolve_target(&presets, &target, &resolver);
                let result = run_session(
                    &resolved.effective_url,
                    start_offset,
                    &ctx,
                    output.as_ref(),
                );
                if let Err(err) = result {
                    warn!("host: session for {:?} failed: {err}", target);
                    ctx.record_failure(&err);
                } else {
                    debug!("host: session for {:?} finished", target);
                }
                ctx.finish();
            });

        if let Err(e) = spawned {
            let err = RadioError::Device(format!("failed to spawn session thread: {e}"));
            warn!("host: {err}");
            shared.record_failure(&err);
            *shared.active_keep.lock().unwrap() = None;
            shared.mark_idle();
        }
    }

    /// Requests the current session to stop.  Returns immediately; the
    /// worker notices at the next packet boundary.  Buffered audio is
    /// discarded, not drained.
    pub fn stop(&self) {
        if let Some(keep) = self.shared.active_keep.lock().unwrap().as_ref() {
            keep.store(false, Ordering::SeqCst);
        }
        if let Some(queue) = self.shared.take_queue_handle() {
            queue.clear();
            queue.close();
        }
        self.shared.stream_name.clear();
    }

    /// Stops and waits for the worker to release the device.
    pub fn stop_and_wait(&self) {
        let _start = self.start_lock.lock().unwrap();
        self.stop_and_wait_inner();
    }

    fn stop_and_wait_inner(&self) {
        self.stop();
        if !self.wait_idle(STOP_TIMEOUT) {
            // The worker is stuck in a blocking call.  Abandon it: its
            // generation goes stale the moment the next session starts,
            // after which every shared-state write it makes is
            // discarded and it winds down on its own.
            warn!("host: session did not stop within {:?}, abandoning it", STOP_TIMEOUT);
        }
    }

    /// Restarts the current target at `position`.  No-op when nothing
    /// has ever been played.
    pub fn move_to(&self, position: Duration) {
        let target = self.shared.last_target.lock().unwrap().clone();
        if target.is_empty() {
            debug!("host: move_to with no target, ignoring");
            return;
        }
        self.play_at(&target, position);
    }

    pub fn is_playing(&self) -> bool {
        self.shared.playing.load(Ordering::SeqCst)
    }

    pub fn has_error(&self) -> bool {
        self.shared.has_error.load(Ordering::SeqCst)
    }

    pub fn last_error(&self) -> String {
        self.shared.last_error.lock().unwrap().clone()
    }

    /// Display name of what is playing; empty until metadata arrives.
    pub fn stream_name(&self) -> String {
        self.shared.stream_name.current()
    }

    /// Position within the current stream.
    pub fn current_run(&self) -> Duration {
        self.shared.position.current()
    }

    /// Total stream duration; zero when unknown (live streams).
    pub fn total_run(&self) -> Duration {
        Duration::from_millis(self.shared.total_run_ms.load(Ordering::SeqCst))
    }

    pub fn presets(&self) -> &PresetTable {
        &self.presets
    }

    /// Copies the whole published state in one call.
    pub fn snapshot(&self) -> TransportSnapshot {
        TransportSnapshot {
            playing: self.is_playing(),
            has_error: self.has_error(),
            last_error: self.last_error(),
            last_target: self.shared.last_target.lock().unwrap().clone(),
            stream_name: self.stream_name(),
            current_run_ms: self.current_run().as_millis() as u64,
            total_run_ms: self.shared.total_run_ms.load(Ordering::SeqCst),
        }
    }

    /// Blocks until no session is running, up to `timeout`.  Returns
    /// true when idle was reached.
    pub fn wait_idle(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut guard = self.shared.idle_lock.lock().unwrap();
        while self.shared.playing.load(Ordering::SeqCst) {
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            let (next, _) = self
                .shared
                .idle_cond
                .wait_timeout(guard, deadline - now)
                .unwrap();
            guard = next;
        }
        true
    }
}
