//! Sample-rate conversion between the decoded stream and the device.
//!
//! Wraps a sinc resampler behind a passthrough fast path.  Internet
//! streams deliver variably-sized packets, so the inner resampler is
//! rebuilt whenever the per-packet frame count changes.

use radio_core::RadioError;
use rubato::{
    Resampler as _, SincFixedIn, SincInterpolationParameters, SincInterpolationType,
    WindowFunction,
};
use tracing::debug;

pub struct Resampler {
    src_rate: u32,
    dst_rate: u32,
    channels: usize,
    inner: Option<SincFixedIn<f64>>,
    inner_frames: usize,
}

impl Resampler {
    /// Builds a converter from `src_rate` to `dst_rate`.  Equal rates
    /// yield a passthrough.  The sinc kernel is constructed eagerly so
    /// an unusable rate pair fails session setup instead of mid-play.
    pub fn new(src_rate: u32, dst_rate: u32, channels: u16) -> Result<Self, RadioError> {
        let channels = channels.max(1) as usize;
        let mut resampler = Self {
            src_rate,
            dst_rate,
            channels,
            inner: None,
            inner_frames: 0,
        };
        if src_rate != dst_rate {
            debug!("resample: {}Hz -> {}Hz, {}ch", src_rate, dst_rate, channels);
            // Typical packet size; process() rebuilds on mismatch.
            resampler.rebuild(1152)?;
        }
        Ok(resampler)
    }

    pub fn is_passthrough(&self) -> bool {
        self.src_rate == self.dst_rate
    }

    fn rebuild(&mut self, frames: usize) -> Result<(), RadioError> {
        let params = SincInterpolationParameters {
            sinc_len: 128,
            f_cutoff: 0.95,
            interpolation: SincInterpolationType::Linear,
            oversampling_factor: 128,
            window: WindowFunction::BlackmanHarris2,
        };
        let inner = SincFixedIn::<f64>::new(
            self.dst_rate as f64 / self.src_rate as f64,
            2.0,
            params,
            frames,
            self.channels,
        )
        .map_err(|e| RadioError::Resampler(e.to_string()))?;
        self.inner = Some(inner);
        self.inner_frames = frames;
        Ok(())
    }

    /// Converts one packet of interleaved samples.  Passthrough copies;
    /// otherwise the packet is deinterleaved, run through the sinc
    /// kernel, and reinterleaved.
    pub fn process(&mut self, interleaved: &[f32]) -> Result<Vec<f32>, RadioError> {
        if self.is_passthrough() {
            return Ok(interleaved.to_vec());
        }
        let frames = interleaved.len() / self.channels;
        if frames == 0 {
            return Ok(Vec::new());
        }
        if frames != self.inner_frames || self.inner.is_none() {
            self.rebuild(frames)?;
        }
        let inner = self.inner.as_mut().unwrap();

        let mut planar: Vec<Vec<f64>> = vec![Vec::with_capacity(frames); self.channels];
        for frame in interleaved.chunks_exact(self.channels) {
            for (ch, &sample) in frame.iter().enumerate() {
                planar[ch].push(sample as f64);
            }
        }

        let output = inner
            .process(&planar, None)
            .map_err(|e| RadioError::Resampler(e.to_string()))?;

        let out_frames = output.first().map_or(0, |ch| ch.len());
        let mut result = Vec::with_capacity(out_frames * self.channels);
        for i in 0..out_frames {
            for ch in &output {
                result.push(ch[i] as f32);
            }
        }
        Ok(result)
    }
}

/// Adapts interleaved audio from `src` channels to `dst` channels.
///
/// Mono → stereo duplicates, anything → mono averages, other pairs keep
/// the shared channels and pad the rest with silence.
pub fn remap_channels(input: &[f32], src: u16, dst: u16) -> Vec<f32> {
    let src = src.max(1) as usize;
    let dst = dst.max(1) as usize;
    if src == dst {
        return input.to_vec();
    }

    let frames = input.len() / src;
    let mut out = Vec::with_capacity(frames * dst);

    if src == 1 {
        for &sample in input.iter().take(frames) {
            out.extend(std::iter::repeat(sample).take(dst));
        }
    } else if dst == 1 {
        for frame in input.chunks_exact(src) {
            out.push(frame.iter().sum::<f32>() / src as f32);
        }
    } else {
        for frame in input.chunks_exact(src) {
            let shared = src.min(dst);
            out.extend_from_slice(&frame[..shared]);
            out.extend(std::iter::repeat(0.0).take(dst - shared));
        }
    }

    out
}
