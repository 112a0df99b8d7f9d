use thiserror::Error;

/// Failure kinds of a playback session.
///
/// `Location` is recovered locally by the resolver (fall back to the
/// original URL); every other kind aborts the current session and is
/// surfaced to the caller through the polled transport state.  Errors
/// never cross the worker-thread boundary directly.
#[derive(Debug, Clone, Error)]
pub enum RadioError {
    /// Preset / URL / redirect resolution failed.  Non-fatal.
    #[error("location resolution failed: {0}")]
    Location(String),
    /// The container could not be opened or has no audio stream.
    #[error("format error: {0}")]
    Format(String),
    /// No decoder is available for the stream's codec, or it failed to open.
    #[error("codec error: {0}")]
    Codec(String),
    /// The audio output device could not be opened.
    #[error("audio device error: {0}")]
    Device(String),
    /// The sample-rate conversion context could not be set up.
    #[error("resampler error: {0}")]
    Resampler(String),
    /// Mid-stream decode / convert / enqueue failure.
    #[error("decode error: {0}")]
    Decode(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_includes_detail() {
        let err = RadioError::Format("no audio stream".to_string());
        assert_eq!(err.to_string(), "format error: no audio stream");
        let err = RadioError::Device("device busy".to_string());
        assert!(err.to_string().contains("device busy"));
    }
}
