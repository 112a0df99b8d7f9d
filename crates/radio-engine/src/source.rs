//! Byte sources for the demuxer: live HTTP streams and local files.

use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom};
use std::path::Path;
use std::sync::Mutex;
use std::time::Duration;

use radio_core::RadioError;
use symphonia::core::io::{MediaSource, MediaSourceStream};
use symphonia::core::probe::Hint;
use tracing::debug;

/// A live HTTP response exposed as a demuxer byte source.
///
/// Radio streams are endless and non-seekable; `seek` reports an
/// unsupported-operation error and `is_seekable` is false so the
/// demuxer never relies on it.  The response sits behind a mutex
/// because the demuxer trait wants `Sync` while the reader does not
/// provide it.
struct HttpStream {
    inner: Mutex<reqwest::blocking::Response>,
    byte_len: Option<u64>,
}

impl Read for HttpStream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.inner.lock().unwrap().read(buf)
    }
}

impl Seek for HttpStream {
    fn seek(&mut self, _pos: SeekFrom) -> io::Result<u64> {
        Err(io::Error::new(
            io::ErrorKind::Unsupported,
            "live stream is not seekable",
        ))
    }
}

impl MediaSource for HttpStream {
    fn is_seekable(&self) -> bool {
        false
    }

    fn byte_len(&self) -> Option<u64> {
        self.byte_len
    }
}

/// Opens `url` and wraps it in a demuxer-ready stream, along with a
/// container hint derived from the URL's extension.
///
/// `read_timeout` is per-read (idle), not whole-body, so it bounds a
/// stalled socket without killing a healthy live stream.
pub fn open_media_source(
    url: &str,
    connect_timeout: Duration,
    read_timeout: Duration,
) -> Result<(MediaSourceStream, Hint), RadioError> {
    let mut hint = Hint::new();
    if let Some(ext) = extension_of(url) {
        hint.with_extension(&ext);
    }

    let source: Box<dyn MediaSource> = if url.starts_with("http://") || url.starts_with("https://")
    {
        debug!("source: opening stream {}", url);
        let client = reqwest::blocking::Client::builder()
            .connect_timeout(connect_timeout)
            .read_timeout(read_timeout)
            .build()
            .map_err(|e| RadioError::Format(e.to_string()))?;
        let response = client
            .get(url)
            .send()
            .and_then(|r| r.error_for_status())
            .map_err(|e| RadioError::Format(e.to_string()))?;
        let byte_len = response.content_length();
        Box::new(HttpStream {
            inner: Mutex::new(response),
            byte_len,
        })
    } else {
        debug!("source: opening file {}", url);
        let file = File::open(url).map_err(|e| RadioError::Format(e.to_string()))?;
        Box::new(file)
    };

    Ok((MediaSourceStream::new(source, Default::default()), hint))
}

fn extension_of(url: &str) -> Option<String> {
    // Strip any query string before looking at the path extension.
    let path = url.split(['?', '#']).next().unwrap_or(url);
    Path::new(path)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
}
