//! Shared leaf types for the radio playback engine: preset table,
//! error taxonomy, and the transport snapshot polled by embedding UIs.

pub mod error;
pub mod presets;
pub mod state;

pub use error::RadioError;
pub use presets::{Preset, PresetTable};
pub use state::TransportSnapshot;
