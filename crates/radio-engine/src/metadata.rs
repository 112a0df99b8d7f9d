//! Stream-name extraction and publication.
//!
//! Internet-radio containers revise their metadata mid-stream (track
//! changes).  The decode loop derives a display name from the newest
//! revision and publishes it through a lock-free slot the UI thread
//! reads on every poll.

use arc_swap::ArcSwapOption;
use std::sync::Arc;
use symphonia::core::meta::{StandardTagKey, Tag};

/// Single-writer, many-reader slot holding the current stream name.
///
/// Readers always see a complete string; the writer swaps whole `Arc`s
/// so there is no torn read and no lock on the poll path.
#[derive(Debug, Default)]
pub struct StreamNamePublisher {
    slot: ArcSwapOption<String>,
}

impl StreamNamePublisher {
    pub fn new() -> Self {
        Self::default()
    }

    /// The current name, empty when nothing has been published.
    pub fn current(&self) -> String {
        match self.slot.load_full() {
            Some(name) => (*name).clone(),
            None => String::new(),
        }
    }

    /// Publishes a new name, skipping the swap when nothing changed.
    pub fn publish(&self, name: &str) {
        if let Some(existing) = self.slot.load_full() {
            if *existing == name {
                return;
            }
        } else if name.is_empty() {
            return;
        }
        self.slot.store(Some(Arc::new(name.to_string())));
    }

    pub fn clear(&self) {
        self.slot.store(None);
    }
}

/// Derives a display name from one metadata revision.
///
/// Preference order: a title tag, then the station name the server sent
/// (`icy-name`), then the first tag rendered as `key: value`.  An empty
/// revision yields an empty name.
pub fn derive_stream_name(tags: &[Tag]) -> String {
    if let Some(title) = tags.iter().find(|t| {
        t.std_key == Some(StandardTagKey::TrackTitle) || t.key.eq_ignore_ascii_case("title")
    }) {
        return t_value(title);
    }

    if let Some(station) = tags.iter().find(|t| t.key.eq_ignore_ascii_case("icy-name")) {
        return t_value(station);
    }

    match tags.first() {
        Some(tag) => format!("{}: {}", tag.key, t_value(tag)),
        None => String::new(),
    }
}

fn t_value(tag: &Tag) -> String {
    tag.value.to_string()
}
