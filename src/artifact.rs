//! Artifact references: addressable task outputs
//!
//! An artifact is a location on disk (file or directory) plus an existence check.
//! Existence is the only completion signal: no checksum, no timestamp, no content
//! validation. A partially written artifact at the expected path counts as done.

use std::fmt;
use std::path::{Path, PathBuf};

use serde::Serialize;

/// Shape of the artifact at its location
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactKind {
    File,
    Dir,
}

/// Handle to a task's declared output
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct ArtifactRef {
    location: PathBuf,
    kind: ArtifactKind,
}

impl ArtifactRef {
    pub fn file(location: impl Into<PathBuf>) -> Self {
        Self {
            location: location.into(),
            kind: ArtifactKind::File,
        }
    }

    pub fn dir(location: impl Into<PathBuf>) -> Self {
        Self {
            location: location.into(),
            kind: ArtifactKind::Dir,
        }
    }

    /// Where the artifact lives
    #[inline]
    pub fn locate(&self) -> &Path {
        &self.location
    }

    #[inline]
    pub fn kind(&self) -> ArtifactKind {
        self.kind
    }

    /// Pure read of filesystem state.
    ///
    /// A directory artifact is satisfied by the directory itself, whatever it holds.
    /// A file artifact requires a non-directory entry at the location.
    pub fn exists(&self) -> bool {
        match self.kind {
            ArtifactKind::Dir => self.location.is_dir(),
            ArtifactKind::File => self.location.exists() && !self.location.is_dir(),
        }
    }
}

impl fmt::Display for ArtifactRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            ArtifactKind::File => write!(f, "{}", self.location.display()),
            ArtifactKind::Dir => write!(f, "{}/", self.location.display()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn missing_location_does_not_exist() {
        let tmp = TempDir::new().unwrap();
        assert!(!ArtifactRef::file(tmp.path().join("nope.tar")).exists());
        assert!(!ArtifactRef::dir(tmp.path().join("nope")).exists());
    }

    #[test]
    fn empty_directory_satisfies_dir_artifact() {
        let tmp = TempDir::new().unwrap();
        let dir = tmp.path().join("extracted");
        fs::create_dir(&dir).unwrap();

        assert!(ArtifactRef::dir(&dir).exists());
    }

    #[test]
    fn partial_file_is_indistinguishable_from_complete() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("half.tar");
        fs::write(&path, b"\0\0").unwrap();

        assert!(ArtifactRef::file(&path).exists());
    }

    #[test]
    fn kinds_do_not_cross_match() {
        let tmp = TempDir::new().unwrap();
        let file = tmp.path().join("marker.done");
        fs::write(&file, "x").unwrap();

        assert!(!ArtifactRef::dir(&file).exists());
        assert!(!ArtifactRef::file(tmp.path()).exists());
    }

    #[test]
    fn display_marks_directories() {
        assert_eq!(ArtifactRef::dir("data_trimmed").to_string(), "data_trimmed/");
        assert_eq!(ArtifactRef::file("a.tar").to_string(), "a.tar");
    }
}
