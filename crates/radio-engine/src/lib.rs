//! Internet-radio playback engine.
//!
//! Architecture:
//!
//! ```text
//!   RadioHost::play(target)           (UI thread, non-blocking)
//!         │  serialized by the start lock: stop-and-wait, then spawn
//!         ▼
//!   radio-session worker thread
//!         ├── resolver   — preset lookup + best-effort redirect probe
//!         └── pipeline   — open container → decode → resample → enqueue
//!                              │                        │
//!                              ├── position tracker ────┤  (atomics / light locks,
//!                              ├── stream-name slot ────┤   read by the UI thread)
//!                              └── sample queue → audio device callback
//! ```
//!
//! The host owns at most one active session.  `stop()` flips a
//! cooperative cancellation flag that the decode loop observes at
//! packet boundaries, so cancellation latency is bounded by one
//! packet's decode time.  The audio device is opened on the worker
//! thread and released before `is_playing()` goes false.

pub mod host;
pub mod metadata;
pub mod output;
pub mod pipeline;
pub mod position;
pub mod resample;
pub mod resolver;
pub mod source;

pub use host::RadioHost;
pub use output::{AudioOutput, CpalOutput, OutputSession, OutputSpec, SampleQueue};
pub use radio_core::{Preset, PresetTable, RadioError, TransportSnapshot};
pub use resolver::{ResolvedTarget, ResolverConfig};
