//! normalize: decompress every `.txt.gz` member of the extracted archive
//!
//! `foo.txt.gz` becomes `foo_processed.txt`. Files without the suffix are ignored
//! (logged at debug level), wherever they sit in the extraction tree.

use std::fs::File;
use std::io::{self, BufReader, BufWriter, Write};
use std::path::Path;
use std::sync::Arc;

use flate2::read::MultiGzDecoder;
use tracing::{debug, info};
use walkdir::WalkDir;

use crate::artifact::ArtifactRef;
use crate::error::StageError;
use crate::task::{Task, TaskParams, TaskRef};

use super::{build_dir, single_input, OutputNames, Stage, StageContext, Unpack};

/// Members selected for decompression
pub const COMPRESSED_SUFFIX: &str = ".txt.gz";
/// Marker inserted before the extension of a decompressed file
pub const PROCESSED_SUFFIX: &str = "_processed.txt";

#[derive(Debug, Clone)]
pub struct Normalize {
    ctx: Arc<StageContext>,
}

impl Normalize {
    pub fn new(ctx: Arc<StageContext>) -> Self {
        Self { ctx }
    }
}

impl Task for Normalize {
    fn name(&self) -> &str {
        Stage::Normalize.as_str()
    }

    fn params(&self) -> TaskParams {
        let config = &self.ctx.config;
        TaskParams::new()
            .with("dataset", &config.dataset)
            .with("extract_dir", config.extract_dir().display())
            .with("processed_dir", config.processed_dir().display())
    }

    fn dependencies(&self) -> Vec<TaskRef> {
        vec![Arc::new(Unpack::new(Arc::clone(&self.ctx)))]
    }

    fn output(&self) -> ArtifactRef {
        ArtifactRef::dir(self.ctx.config.processed_dir())
    }

    fn execute(&self, inputs: &[ArtifactRef]) -> Result<(), StageError> {
        let source = single_input(inputs, Stage::Normalize)?;
        let dest = self.ctx.config.processed_dir();

        build_dir(&dest, |staging| decompress_tree(source, staging))
    }
}

/// `foo.txt.gz` -> `foo_processed.txt` (None when the name lacks the suffix)
pub fn processed_name(file_name: &str) -> Option<String> {
    let stem = file_name.strip_suffix(COMPRESSED_SUFFIX)?;
    if stem.is_empty() {
        return None;
    }
    Some(format!("{}{}", stem, PROCESSED_SUFFIX))
}

/// Walk `source` recursively and decompress each matching file into `dest`.
///
/// `dest` is flat, so two members with the same file name in different
/// subdirectories fail the stage rather than overwrite each other.
fn decompress_tree(source: &Path, dest: &Path) -> Result<(), StageError> {
    let mut produced = OutputNames::default();
    for entry in WalkDir::new(source).sort_by_file_name() {
        let entry = entry.map_err(|e| StageError::transform(source, e))?;
        if !entry.file_type().is_file() {
            continue;
        }

        let file_name = entry.file_name().to_string_lossy();
        let Some(out_name) = processed_name(&file_name) else {
            debug!(path = %entry.path().display(), "Ignoring non-matching file");
            continue;
        };

        produced.claim(&out_name, entry.path())?;
        let out_path = dest.join(&out_name);
        decompress_file(entry.path(), &out_path)?;
        info!(path = %out_name, "Decompressed and saved");
    }
    Ok(())
}

/// Gunzip `src` into `dst`
pub fn decompress_file(src: &Path, dst: &Path) -> Result<u64, StageError> {
    let input = File::open(src).map_err(|e| StageError::transform(src, e))?;
    let mut decoder = MultiGzDecoder::new(BufReader::new(input));

    let output = File::create(dst).map_err(|e| StageError::output(dst, e))?;
    let mut writer = BufWriter::new(output);

    let bytes = io::copy(&mut decoder, &mut writer).map_err(|e| match e.kind() {
        io::ErrorKind::InvalidInput | io::ErrorKind::InvalidData | io::ErrorKind::UnexpectedEof => {
            StageError::transform(src, e)
        }
        _ => StageError::output(dst, e),
    })?;
    writer.flush().map_err(|e| StageError::output(dst, e))?;
    Ok(bytes)
}
