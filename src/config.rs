//! Pipeline configuration
//!
//! ## Priority Order (highest to lowest)
//!
//! 1. CLI flags (applied by the binary after loading)
//! 2. Environment variables (`GEOFLOW_DATASET`, `GEOFLOW_SOURCE_URL`, `GEOFLOW_WORK_DIR`)
//! 3. Config file (`geoflow.toml` in the working directory, or an explicit path)
//! 4. Defaults
//!
//! Parameters are fixed once a run starts and are threaded unchanged to every stage.

use std::fs;
use std::path::{Component, Path, PathBuf};

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::{PipelineError, Result};

/// Config file looked up in the working directory when no path is given
pub const CONFIG_FILE: &str = "geoflow.toml";

pub const DEFAULT_DATASET: &str = "GSE68849";

/// `{series}` is the GEO bucket (`GSE68nnn`), `{dataset}` the accession
pub const DEFAULT_SOURCE_URL: &str =
    "https://ftp.ncbi.nlm.nih.gov/geo/series/{series}/{dataset}/suppl/{dataset}_RAW.tar";

static DATASET_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z0-9_.-]+$").expect("static regex"));

/// Every location is relative to `work_dir` unless absolute.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PipelineConfig {
    pub dataset: String,
    pub source_url: String,
    pub work_dir: Option<PathBuf>,
    pub download_dir: PathBuf,
    pub extract_dir: PathBuf,
    pub processed_dir: PathBuf,
    pub trimmed_dir: PathBuf,
    /// Locations removed by the clean stage (defaults to download + extract dirs)
    pub cleanup_dirs: Option<Vec<PathBuf>>,
    /// Sentinel written by the clean stage
    pub marker: PathBuf,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            dataset: DEFAULT_DATASET.to_string(),
            source_url: DEFAULT_SOURCE_URL.to_string(),
            work_dir: None,
            download_dir: PathBuf::from("data_downloads"),
            extract_dir: PathBuf::from("data_extracted"),
            processed_dir: PathBuf::from("data_processed"),
            trimmed_dir: PathBuf::from("data_trimmed"),
            cleanup_dirs: None,
            marker: PathBuf::from("cleanup_status.done"),
        }
    }
}

impl PipelineConfig {
    /// Load configuration from a file
    ///
    /// With `path = None`, reads `geoflow.toml` from the working directory if present,
    /// defaults otherwise. An explicit path that does not exist is an error.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path = match path {
            Some(p) => p.to_path_buf(),
            None => {
                let implicit = PathBuf::from(CONFIG_FILE);
                if !implicit.exists() {
                    return Ok(Self::default());
                }
                implicit
            }
        };

        let content = fs::read_to_string(&path).map_err(|e| PipelineError::Config {
            reason: format!("Failed to read config file '{}': {}", path.display(), e),
        })?;

        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| PipelineError::Config {
            reason: format!("Failed to parse config file: {}", e),
        })
    }

    /// Merge process environment variables
    pub fn with_env(self) -> Self {
        self.with_env_from(|key| std::env::var(key).ok())
    }

    /// Merge variables from an arbitrary lookup (empty values are ignored)
    pub fn with_env_from(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        let get = |key: &str| lookup(key).filter(|v| !v.is_empty());

        if let Some(dataset) = get("GEOFLOW_DATASET") {
            self.dataset = dataset;
        }
        if let Some(url) = get("GEOFLOW_SOURCE_URL") {
            self.source_url = url;
        }
        if let Some(dir) = get("GEOFLOW_WORK_DIR") {
            self.work_dir = Some(PathBuf::from(dir));
        }

        self
    }

    /// Check the dataset id, locations and source URL
    pub fn validate(&self) -> Result<()> {
        if !DATASET_PATTERN.is_match(&self.dataset) || self.dataset.chars().all(|c| c == '.') {
            return Err(PipelineError::InvalidDataset {
                dataset: self.dataset.clone(),
            });
        }

        let locations = [
            ("download_dir", &self.download_dir),
            ("extract_dir", &self.extract_dir),
            ("processed_dir", &self.processed_dir),
            ("trimmed_dir", &self.trimmed_dir),
            ("marker", &self.marker),
        ];
        for (key, path) in locations {
            if path.as_os_str().is_empty() {
                return Err(PipelineError::Config {
                    reason: format!("'{}' must not be empty", key),
                });
            }
        }
        if let Some(dirs) = &self.cleanup_dirs {
            if dirs.iter().any(|d| d.as_os_str().is_empty()) {
                return Err(PipelineError::Config {
                    reason: "'cleanup_dirs' entries must not be empty".to_string(),
                });
            }
        }
        // Cleaning must never take the pipeline's own results with it
        let (trimmed, marker) = (lexical(&self.trimmed_dir()), lexical(&self.marker()));
        for dir in self.cleanup_dirs() {
            let covered = lexical(&dir);
            if trimmed.starts_with(&covered) || marker.starts_with(&covered) {
                return Err(PipelineError::Config {
                    reason: format!(
                        "cleanup location '{}' would remove the trimmed output or marker",
                        dir.display()
                    ),
                });
            }
        }

        let url = self.source_url();
        let parsed = Url::parse(&url).map_err(|e| PipelineError::Config {
            reason: format!("invalid source_url '{}': {}", url, e),
        })?;
        match parsed.scheme() {
            "http" | "https" | "file" => Ok(()),
            other => Err(PipelineError::Config {
                reason: format!("unsupported source_url scheme '{}' (use http, https or file)", other),
            }),
        }
    }

    /// Source URL with `{dataset}` and `{series}` expanded
    pub fn source_url(&self) -> String {
        self.source_url
            .replace("{series}", &series_bucket(&self.dataset))
            .replace("{dataset}", &self.dataset)
    }

    fn rooted(&self, path: &Path) -> PathBuf {
        match &self.work_dir {
            Some(root) if path.is_relative() => root.join(path),
            _ => path.to_path_buf(),
        }
    }

    pub fn download_dir(&self) -> PathBuf {
        self.rooted(&self.download_dir)
    }

    pub fn extract_dir(&self) -> PathBuf {
        self.rooted(&self.extract_dir)
    }

    pub fn processed_dir(&self) -> PathBuf {
        self.rooted(&self.processed_dir)
    }

    pub fn trimmed_dir(&self) -> PathBuf {
        self.rooted(&self.trimmed_dir)
    }

    pub fn marker(&self) -> PathBuf {
        self.rooted(&self.marker)
    }

    /// Cleanup locations, falling back to the (overridden) download + extract dirs
    pub fn cleanup_dirs(&self) -> Vec<PathBuf> {
        match &self.cleanup_dirs {
            Some(dirs) => dirs.iter().map(|d| self.rooted(d)).collect(),
            None => vec![self.download_dir(), self.extract_dir()],
        }
    }
}

/// Drop `.` components so `./data` and `data` compare equal
fn lexical(path: &Path) -> PathBuf {
    path.components()
        .filter(|c| !matches!(c, Component::CurDir))
        .collect()
}

/// GEO series bucket: the accession with its last three digits replaced by `nnn`.
///
/// `GSE68849` -> `GSE68nnn`, `GSE1` -> `GSEnnn`.
pub fn series_bucket(dataset: &str) -> String {
    let prefix_len = dataset.trim_end_matches(|c: char| c.is_ascii_digit()).len();
    let (prefix, digits) = dataset.split_at(prefix_len);
    let keep = digits.len().saturating_sub(3);
    format!("{}{}nnn", prefix, &digits[..keep])
}
