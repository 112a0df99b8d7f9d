use serde::{Deserialize, Serialize};

/// One-call snapshot of the published transport state.
///
/// Everything here is copied out of the controller's atomics/slots at
/// call time; the embedding UI polls this instead of reaching into the
/// decode pipeline.  Durations are milliseconds; `total_run_ms == 0`
/// means the container reported no duration (live streams).
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct TransportSnapshot {
    pub playing: bool,
    pub has_error: bool,
    pub last_error: String,
    /// The target as requested (preset name or raw URL), not the
    /// resolved effective URL.  `move_to` replays this.
    pub last_target: String,
    pub stream_name: String,
    pub current_run_ms: u64,
    pub total_run_ms: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snapshot_round_trips_through_json() {
        let snap = TransportSnapshot {
            playing: true,
            has_error: false,
            last_error: String::new(),
            last_target: "chill".to_string(),
            stream_name: "Cool FM".to_string(),
            current_run_ms: 31_500,
            total_run_ms: 0,
        };
        let json = serde_json::to_string(&snap).unwrap();
        let back: TransportSnapshot = serde_json::from_str(&json).unwrap();
        assert!(back.playing);
        assert_eq!(back.stream_name, "Cool FM");
        assert_eq!(back.total_run_ms, 0);
    }
}
