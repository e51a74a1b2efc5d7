//! Remote archive retrieval
//!
//! `UrlFetcher` handles `http(s)://` through a blocking reqwest client and
//! `file://` by copying, which keeps offline runs and tests on the same path.

use std::fmt;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::Path;
use std::time::Duration;

use tracing::{debug, instrument};
use url::Url;

use crate::error::StageError;

/// Connect timeout for HTTP sources
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
/// Whole-transfer timeout (series archives run to hundreds of MB)
const TRANSFER_TIMEOUT: Duration = Duration::from_secs(60 * 60);

/// Retrieves a remote resource to a local path
pub trait Fetcher: Send + Sync + fmt::Debug {
    /// Write the resource at `url` to `dest`, returning the byte count
    fn fetch(&self, url: &str, dest: &Path) -> Result<u64, StageError>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct UrlFetcher;

impl UrlFetcher {
    pub fn new() -> Self {
        Self
    }

    fn fetch_http(&self, url: &str, dest: &Path) -> Result<u64, StageError> {
        let client = reqwest::blocking::Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .timeout(TRANSFER_TIMEOUT)
            .redirect(reqwest::redirect::Policy::limited(5))
            .user_agent(concat!("geoflow/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| acquire_error(url, e))?;

        let mut response = client
            .get(url)
            .send()
            .and_then(|r| r.error_for_status())
            .map_err(|e| acquire_error(url, e))?;

        let file = File::create(dest).map_err(|e| StageError::output(dest, e))?;
        let mut writer = BufWriter::new(file);
        let bytes = response
            .copy_to(&mut writer)
            .map_err(|e| acquire_error(url, e))?;
        writer.flush().map_err(|e| StageError::output(dest, e))?;
        Ok(bytes)
    }

    fn fetch_file(&self, url: &Url, dest: &Path) -> Result<u64, StageError> {
        let source = url
            .to_file_path()
            .map_err(|_| acquire_error(url.as_str(), "not a local file path"))?;
        if !source.is_file() {
            return Err(acquire_error(url.as_str(), "no such file"));
        }
        fs::copy(&source, dest).map_err(|e| StageError::output(dest, e))
    }
}

impl Fetcher for UrlFetcher {
    #[instrument(skip(self, dest))]
    fn fetch(&self, url: &str, dest: &Path) -> Result<u64, StageError> {
        let parsed = Url::parse(url).map_err(|e| acquire_error(url, e))?;
        debug!(scheme = parsed.scheme(), "Fetching");

        match parsed.scheme() {
            "http" | "https" => self.fetch_http(url, dest),
            "file" => self.fetch_file(&parsed, dest),
            other => Err(acquire_error(url, format!("unsupported scheme '{}'", other))),
        }
    }
}

fn acquire_error(url: &str, reason: impl fmt::Display) -> StageError {
    StageError::Acquire {
        url: url.to_string(),
        reason: reason.to_string(),
    }
}
