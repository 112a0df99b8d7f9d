//! The decode pipeline: container → decoder → device → resampler →
//! packet loop.  Runs to completion on the session worker thread.
//!
//! Each setup step maps its failure to a distinct error kind so the
//! controller can report *where* a play attempt died: container open
//! and probe → format, decoder construction → codec, device open →
//! device, converter construction → resampler, everything inside the
//! packet loop → decode.
//!
//! Cancellation is checked after every blocking setup step, not just
//! in the packet loop; a session cancelled during a slow container
//! open must never go on to acquire the audio device.

use std::time::Duration;

use radio_core::RadioError;
use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::{FormatOptions, FormatReader, SeekMode, SeekTo, Track};
use symphonia::core::meta::MetadataOptions;
use symphonia::core::units::{Time, TimeBase};
use tracing::{debug, warn};

use crate::host::SessionCtx;
use crate::metadata::derive_stream_name;
use crate::output::{AudioOutput, OutputSpec};
use crate::resample::{remap_channels, Resampler};
use crate::source::open_media_source;

/// How long to let the queue drain after a clean end-of-stream before
/// releasing the device anyway.
const DRAIN_TIMEOUT: Duration = Duration::from_secs(10);

/// Plays `url` from `start_offset` until end-of-stream, a decode
/// failure, or cooperative cancellation via the session's token.
pub(crate) fn run_session(
    url: &str,
    start_offset: Duration,
    ctx: &SessionCtx,
    output: &dyn AudioOutput,
) -> Result<(), RadioError> {
    // Container open and probe.
    let (stream, hint) = open_media_source(url, ctx.connect_timeout(), ctx.read_timeout())?;
    let mut probed = symphonia::default::get_probe()
        .format(
            &hint,
            stream,
            &FormatOptions::default(),
            &MetadataOptions::default(),
        )
        .map_err(|e| RadioError::Format(e.to_string()))?;

    // The open and probe are the slow, blocking part of setup; the
    // session may have been cancelled while they ran.
    if !ctx.keep_playing() {
        return Ok(());
    }

    // Container-level tags (e.g. vorbis comments) arrive with the probe
    // rather than in-band; publish them before the loop starts.
    if let Some(metadata) = probed.metadata.get() {
        publish_initial_name(ctx, metadata.current());
    }

    let mut format = probed.format;

    let track = select_track(format.as_ref())?;
    let track_id = track.id;
    let codec_params = track.codec_params.clone();

    // Decoder construction.
    let mut decoder = symphonia::default::get_codecs()
        .make(&codec_params, &DecoderOptions::default())
        .map_err(|e| RadioError::Codec(e.to_string()))?;

    let src_rate = codec_params
        .sample_rate
        .ok_or_else(|| RadioError::Codec("track reports no sample rate".to_string()))?;
    let src_channels = codec_params
        .channels
        .map(|c| c.count() as u16)
        .unwrap_or(2);

    // Last gate before the device is acquired.
    if !ctx.keep_playing() {
        return Ok(());
    }

    // Device open.  The session owns the device until it is dropped at
    // the end of this function.
    let session = output.open(OutputSpec {
        sample_rate: src_rate,
        channels: src_channels,
    })?;
    let device_spec = session.spec();
    let queue = session.queue();
    ctx.set_active_queue(Some(queue.clone()));

    // Converter construction.
    let mut resampler = Resampler::new(src_rate, device_spec.sample_rate, device_spec.channels)?;

    // Total duration, when the container knows it.  Live streams do not.
    let time_base = codec_params.time_base;
    let total = match (codec_params.n_frames, time_base) {
        (Some(frames), Some(tb)) => time_to_duration(tb.calc_time(frames)),
        (Some(frames), None) => Duration::from_secs_f64(frames as f64 / src_rate as f64),
        _ => Duration::ZERO,
    };
    ctx.set_total_run(total);

    // Seek before the loop starts; a failed seek degrades to playing
    // from the start rather than aborting.
    let baseline = if start_offset > Duration::ZERO {
        let target = Time::from(start_offset.as_secs_f64());
        match format.seek(
            SeekMode::Accurate,
            SeekTo::Time {
                time: target,
                track_id: Some(track_id),
            },
        ) {
            Ok(seeked) => {
                decoder.reset();
                match time_base {
                    Some(tb) => time_to_duration(tb.calc_time(seeked.actual_ts)),
                    None => start_offset,
                }
            }
            Err(e) => {
                warn!("pipeline: seek to {:?} failed ({e}), playing from start", start_offset);
                Duration::ZERO
            }
        }
    } else {
        Duration::ZERO
    };
    ctx.reset_position(baseline);

    debug!(
        "pipeline: {} @ {}Hz/{}ch -> device {}Hz/{}ch, total {:?}",
        url, src_rate, src_channels, device_spec.sample_rate, device_spec.channels, total
    );

    // Packet loop.
    let loop_result = (|| -> Result<(), RadioError> {
        while ctx.keep_playing() {
            let packet = match format.next_packet() {
                Ok(packet) => packet,
                Err(SymphoniaError::IoError(e))
                    if e.kind() == std::io::ErrorKind::UnexpectedEof =>
                {
                    return Ok(());
                }
                // Track list changed under us; treat as end-of-stream.
                Err(SymphoniaError::ResetRequired) => return Ok(()),
                Err(e) => return Err(RadioError::Decode(e.to_string())),
            };

            if packet.track_id() != track_id {
                continue;
            }

            let packet_dur = packet_duration(packet.dur(), time_base, src_rate);

            let decoded = decoder
                .decode(&packet)
                .map_err(|e| RadioError::Decode(e.to_string()))?;

            let spec = *decoded.spec();
            let mut sample_buf = SampleBuffer::<f32>::new(decoded.capacity() as u64, spec);
            sample_buf.copy_interleaved_ref(decoded);

            let remapped = remap_channels(
                sample_buf.samples(),
                spec.channels.count() as u16,
                device_spec.channels,
            );
            let converted = resampler
                .process(&remapped)
                .map_err(|e| RadioError::Decode(e.to_string()))?;

            if !queue.push_blocking(&converted, ctx.keep_flag()) {
                return Ok(());
            }
            ctx.record_packet(packet_dur);

            // Metadata revisions ride alongside the packets; publish
            // only the newest one.
            let mut md = format.metadata();
            if !md.is_latest() {
                if let Some(revision) = md.skip_to_latest() {
                    ctx.publish_stream_name(&derive_stream_name(revision.tags()));
                }
            }
        }
        Ok(())
    })();

    // Let buffered audio play out before the device is released.  A
    // stop request clears the queue first, so this returns quickly; on
    // a decode error it plays out what was already accepted.
    if ctx.keep_playing() {
        queue.wait_empty(DRAIN_TIMEOUT);
    }

    ctx.set_active_queue(None);
    drop(session);
    loop_result
}

fn select_track(format: &dyn FormatReader) -> Result<&Track, RadioError> {
    if let Some(track) = format.default_track() {
        if track.codec_params.codec != CODEC_TYPE_NULL {
            return Ok(track);
        }
    }
    format
        .tracks()
        .iter()
        .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
        .ok_or_else(|| RadioError::Format("no decodable audio track".to_string()))
}

fn publish_initial_name(
    ctx: &SessionCtx,
    revision: Option<&symphonia::core::meta::MetadataRevision>,
) {
    if let Some(revision) = revision {
        let name = derive_stream_name(revision.tags());
        if !name.is_empty() {
            ctx.publish_stream_name(&name);
        }
    }
}

fn packet_duration(dur: u64, time_base: Option<TimeBase>, sample_rate: u32) -> Duration {
    match time_base {
        Some(tb) => time_to_duration(tb.calc_time(dur)),
        None => Duration::from_secs_f64(dur as f64 / sample_rate as f64),
    }
}

fn time_to_duration(time: Time) -> Duration {
    Duration::from_secs_f64(time.seconds as f64 + time.frac)
}
