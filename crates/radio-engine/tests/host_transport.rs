//! End-to-end transport behaviour against generated WAV fixtures and a
//! device-free output.  No network, no sound card.

mod common;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use common::{init_tracing, make_wav, wait_for, MockOutput};
use radio_engine::{
    AudioOutput, OutputSession, OutputSpec, PresetTable, RadioError, RadioHost, ResolverConfig,
};

fn offline() -> ResolverConfig {
    ResolverConfig {
        follow_redirects: false,
        ..Default::default()
    }
}

fn host_with(presets: PresetTable, output: Arc<dyn AudioOutput>) -> RadioHost {
    init_tracing();
    RadioHost::with_resolver(presets, output, offline())
}

#[test]
fn preset_name_plays_the_mapped_stream() {
    let fixture = make_wav(22_050, 1, 22_050 * 5);
    let mut presets = PresetTable::new();
    presets.add("fixture", fixture.path().to_str().unwrap());

    let output = MockOutput::new();
    let stats = Arc::clone(&output.stats);
    let host = host_with(presets, Arc::new(output));

    host.play("fixture");
    assert!(wait_for(Duration::from_secs(5), || {
        stats.samples_seen.load(Ordering::SeqCst) > 0
    }));
    assert!(host.is_playing());
    assert!(!host.has_error());
    assert_eq!(host.snapshot().last_target, "fixture");

    host.stop_and_wait();
    assert!(!host.is_playing());
}

#[test]
fn unreadable_target_ends_with_an_error() {
    let host = host_with(PresetTable::new(), Arc::new(MockOutput::new()));

    host.play("/nonexistent/stream.mp3");
    assert!(host.wait_idle(Duration::from_secs(5)));
    assert!(!host.is_playing());
    assert!(host.has_error());
    assert!(!host.last_error().is_empty());
}

#[test]
fn failed_device_open_is_reported_not_panicked() {
    struct BrokenOutput;
    impl AudioOutput for BrokenOutput {
        fn open(&self, _requested: OutputSpec) -> Result<OutputSession, RadioError> {
            Err(RadioError::Device("no device in CI".to_string()))
        }
    }

    let fixture = make_wav(22_050, 1, 22_050);
    let host = host_with(PresetTable::new(), Arc::new(BrokenOutput));

    host.play(fixture.path().to_str().unwrap());
    assert!(host.wait_idle(Duration::from_secs(5)));
    assert!(host.has_error());
    assert!(host.last_error().contains("audio device error"));
}

#[test]
fn rapid_restarts_never_overlap_sessions() {
    let fixture_a = make_wav(22_050, 1, 22_050 * 10);
    let fixture_b = make_wav(22_050, 2, 22_050 * 10);

    let output = MockOutput::new();
    let stats = Arc::clone(&output.stats);
    let host = host_with(PresetTable::new(), Arc::new(output));

    for _ in 0..3 {
        host.play(fixture_a.path().to_str().unwrap());
        host.play(fixture_b.path().to_str().unwrap());
    }
    assert!(wait_for(Duration::from_secs(5), || {
        stats.samples_seen.load(Ordering::SeqCst) > 0
    }));
    host.stop_and_wait();

    assert_eq!(stats.max_concurrent.load(Ordering::SeqCst), 1);
    assert_eq!(stats.open_now.load(Ordering::SeqCst), 0);
}

#[test]
fn move_to_restarts_at_the_requested_position() {
    let fixture = make_wav(22_050, 1, 22_050 * 60);

    let output = MockOutput::new();
    let host = host_with(PresetTable::new(), Arc::new(output));

    host.play(fixture.path().to_str().unwrap());
    assert!(wait_for(Duration::from_secs(5), || host.total_run()
        > Duration::ZERO));
    let total = host.total_run();
    assert!(total >= Duration::from_secs(59) && total <= Duration::from_secs(61));

    host.move_to(Duration::from_secs(30));
    std::thread::sleep(Duration::from_millis(300));
    let pos = host.current_run();
    assert!(
        pos >= Duration::from_secs(29) && pos <= Duration::from_millis(31_000),
        "position after seek was {pos:?}"
    );

    host.stop_and_wait();
}

#[test]
fn position_is_monotone_while_playing() {
    let fixture = make_wav(22_050, 1, 22_050 * 10);

    let output = MockOutput::new();
    let stats = Arc::clone(&output.stats);
    let host = host_with(PresetTable::new(), Arc::new(output));

    host.play(fixture.path().to_str().unwrap());
    assert!(wait_for(Duration::from_secs(5), || {
        stats.samples_seen.load(Ordering::SeqCst) > 0
    }));

    let mut prev = host.current_run();
    for _ in 0..10 {
        std::thread::sleep(Duration::from_millis(20));
        let now = host.current_run();
        assert!(now >= prev, "position went backwards: {prev:?} -> {now:?}");
        prev = now;
    }

    host.stop_and_wait();
}

#[test]
fn stop_halts_sample_flow_promptly() {
    let fixture = make_wav(22_050, 1, 22_050 * 30);

    let output = MockOutput::new();
    let stats = Arc::clone(&output.stats);
    let host = host_with(PresetTable::new(), Arc::new(output));

    host.play(fixture.path().to_str().unwrap());
    assert!(wait_for(Duration::from_secs(5), || {
        stats.samples_seen.load(Ordering::SeqCst) > 0
    }));

    host.stop();
    assert!(wait_for(Duration::from_secs(2), || !host.is_playing()));

    // Stop discards buffered audio; the consumer must see no new
    // samples once the session is down.
    let after_stop = stats.samples_seen.load(Ordering::SeqCst);
    std::thread::sleep(Duration::from_millis(100));
    assert_eq!(stats.samples_seen.load(Ordering::SeqCst), after_stop);
}

#[test]
fn abandoned_session_cannot_disturb_its_successor() {
    // First device open stalls past the stop deadline, modeling a
    // session stuck in a blocking setup step on a dead socket.
    struct StallFirstOpen {
        inner: MockOutput,
        stalled: Arc<AtomicBool>,
    }

    impl AudioOutput for StallFirstOpen {
        fn open(&self, requested: OutputSpec) -> Result<OutputSession, RadioError> {
            if !self.stalled.swap(true, Ordering::SeqCst) {
                std::thread::sleep(Duration::from_secs(6));
            }
            self.inner.open(requested)
        }
    }

    let fixture_a = make_wav(22_050, 1, 22_050 * 5);
    let fixture_b = make_wav(22_050, 1, 22_050 * 30);

    let output = StallFirstOpen {
        inner: MockOutput::new(),
        stalled: Arc::new(AtomicBool::new(false)),
    };
    let stats = Arc::clone(&output.inner.stats);
    let stall_entered = Arc::clone(&output.stalled);
    let host = host_with(PresetTable::new(), Arc::new(output));

    host.play(fixture_a.path().to_str().unwrap());
    assert!(wait_for(Duration::from_secs(2), || {
        stall_entered.load(Ordering::SeqCst)
    }));

    // The first worker is stuck; this waits out the stop deadline,
    // abandons it, and starts the second session.
    host.play(fixture_b.path().to_str().unwrap());
    assert!(wait_for(Duration::from_secs(5), || {
        stats.samples_seen.load(Ordering::SeqCst) > 0
    }));
    assert!(host.is_playing());

    // Let the abandoned worker's open return.  It must wind down
    // without reviving itself on the new session's state: no second
    // device held, no error recorded, the playing flag untouched.
    std::thread::sleep(Duration::from_secs(2));
    assert!(host.is_playing());
    assert!(!host.has_error());
    assert_eq!(stats.open_now.load(Ordering::SeqCst), 1);

    let before = stats.samples_seen.load(Ordering::SeqCst);
    std::thread::sleep(Duration::from_millis(200));
    assert!(stats.samples_seen.load(Ordering::SeqCst) > before);

    // The queue handle still belongs to the live session, so stop
    // still lands on it.
    host.stop();
    assert!(wait_for(Duration::from_secs(2), || !host.is_playing()));
    assert_eq!(stats.open_now.load(Ordering::SeqCst), 0);
}

#[test]
fn tagless_stream_has_an_empty_name() {
    let fixture = make_wav(22_050, 1, 22_050 * 5);

    let output = MockOutput::new();
    let stats = Arc::clone(&output.stats);
    let host = host_with(PresetTable::new(), Arc::new(output));

    host.play(fixture.path().to_str().unwrap());
    assert!(wait_for(Duration::from_secs(5), || {
        stats.samples_seen.load(Ordering::SeqCst) > 0
    }));
    assert_eq!(host.stream_name(), "");

    host.stop_and_wait();
}
