//! Target resolution: preset lookup plus a best-effort redirect probe.

use std::time::Duration;

use radio_core::{PresetTable, RadioError};
use tracing::{debug, warn};

/// Knobs for the redirect probe.  The probe is best-effort: any failure
/// falls back to the unprobed URL instead of failing the play request.
#[derive(Debug, Clone)]
pub struct ResolverConfig {
    /// When false, the probe is skipped entirely (offline / tests).
    pub follow_redirects: bool,
    pub connect_timeout: Duration,
    pub request_timeout: Duration,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            follow_redirects: true,
            connect_timeout: Duration::from_secs(10),
            request_timeout: Duration::from_secs(10),
        }
    }
}

/// A play target after resolution.  Immutable once built.
#[derive(Debug, Clone)]
pub struct ResolvedTarget {
    /// What the caller asked for (preset name or raw URL).
    pub requested: String,
    /// The URL the decode pipeline will actually open.
    pub effective_url: String,
}

/// Resolves `target` to the URL to open.
///
/// A preset name is substituted from the table; anything else is
/// treated as a literal URL.  For http(s) URLs the redirect probe
/// replaces the URL with the final address after redirects, so the
/// container is opened at a stable location.
pub fn resolve_target(presets: &PresetTable, target: &str, cfg: &ResolverConfig) -> ResolvedTarget {
    let url = match presets.resolve(target) {
        Some(url) => {
            debug!("resolver: preset {:?} -> {}", target, url);
            url.to_string()
        }
        None => target.to_string(),
    };

    let effective_url = if cfg.follow_redirects && is_http_url(&url) {
        match probe_effective_url(&url, cfg) {
            Ok(effective) => {
                if effective != url {
                    debug!("resolver: {} redirects to {}", url, effective);
                }
                effective
            }
            Err(e) => {
                warn!("resolver: {}, using original URL", e);
                url
            }
        }
    } else {
        url
    };

    ResolvedTarget {
        requested: target.to_string(),
        effective_url,
    }
}

fn is_http_url(url: &str) -> bool {
    url.starts_with("http://") || url.starts_with("https://")
}

/// Issues a HEAD request with redirects enabled and returns the final
/// URL.  Runs on the session worker thread only.
fn probe_effective_url(url: &str, cfg: &ResolverConfig) -> Result<String, RadioError> {
    let client = reqwest::blocking::Client::builder()
        .connect_timeout(cfg.connect_timeout)
        .timeout(cfg.request_timeout)
        .build()
        .map_err(|e| RadioError::Location(e.to_string()))?;

    let response = client
        .head(url)
        .send()
        .map_err(|e| RadioError::Location(e.to_string()))?;

    Ok(response.url().to_string())
}
