//! project: drop the annotation columns from each processed table
//!
//! Tables are tab-delimited with a header row. The output keeps every other
//! column in its original order and every row in its original order.

use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Cursor, Read, Write};
use std::path::Path;
use std::sync::Arc;

use tracing::{debug, info};
use walkdir::WalkDir;

use crate::artifact::ArtifactRef;
use crate::error::StageError;
use crate::task::{Task, TaskParams, TaskRef};

use super::normalize::PROCESSED_SUFFIX;
use super::{build_dir, single_input, Normalize, OutputNames, Stage, StageContext};

/// Columns removed from every table (absent ones are ignored)
pub const DROP_COLUMNS: [&str; 4] = [
    "Definition",
    "Ontology_Component",
    "Ontology_Process",
    "Ontology_Function",
];

pub const TRIMMED_SUFFIX: &str = "_trimmed.txt";

#[derive(Debug, Clone)]
pub struct Project {
    ctx: Arc<StageContext>,
}

impl Project {
    pub fn new(ctx: Arc<StageContext>) -> Self {
        Self { ctx }
    }
}

impl Task for Project {
    fn name(&self) -> &str {
        Stage::Project.as_str()
    }

    fn params(&self) -> TaskParams {
        let config = &self.ctx.config;
        TaskParams::new()
            .with("dataset", &config.dataset)
            .with("processed_dir", config.processed_dir().display())
            .with("trimmed_dir", config.trimmed_dir().display())
    }

    fn dependencies(&self) -> Vec<TaskRef> {
        vec![Arc::new(Normalize::new(Arc::clone(&self.ctx)))]
    }

    fn output(&self) -> ArtifactRef {
        ArtifactRef::dir(self.ctx.config.trimmed_dir())
    }

    fn execute(&self, inputs: &[ArtifactRef]) -> Result<(), StageError> {
        let source = single_input(inputs, Stage::Project)?;
        let dest = self.ctx.config.trimmed_dir();

        build_dir(&dest, |staging| {
            let mut produced = OutputNames::default();
            for entry in WalkDir::new(source).sort_by_file_name() {
                let entry = entry.map_err(|e| StageError::transform(source, e))?;
                if !entry.file_type().is_file() {
                    continue;
                }
                let file_name = entry.file_name().to_string_lossy();
                let Some(out_name) = trimmed_name(&file_name) else {
                    debug!(path = %entry.path().display(), "Ignoring non-matching file");
                    continue;
                };

                produced.claim(&out_name, entry.path())?;
                let rows = project_file(entry.path(), &staging.join(&out_name), &DROP_COLUMNS)?;
                info!(path = %out_name, rows, "Trimmed and saved");
            }
            Ok(())
        })
    }
}

/// `foo_processed.txt` -> `foo_trimmed.txt`
pub fn trimmed_name(file_name: &str) -> Option<String> {
    let stem = file_name.strip_suffix(PROCESSED_SUFFIX)?;
    if stem.is_empty() {
        return None;
    }
    Some(format!("{}{}", stem, TRIMMED_SUFFIX))
}

/// Project one table file, returning the row count
pub fn project_file(src: &Path, dst: &Path, drop: &[&str]) -> Result<u64, StageError> {
    let input = File::open(src).map_err(|e| StageError::transform(src, e))?;
    let output = File::create(dst).map_err(|e| StageError::output(dst, e))?;
    let mut writer = BufWriter::new(output);

    let rows = project_columns(BufReader::new(input), &mut writer, drop).map_err(|e| match e {
        ProjectError::Read(reason) => StageError::transform(src, reason),
        ProjectError::Write(source) => StageError::output(dst, source),
    })?;
    writer.flush().map_err(|e| StageError::output(dst, e))?;
    Ok(rows)
}

#[derive(Debug)]
pub enum ProjectError {
    /// Malformed input (missing header, ragged rows, bad encoding)
    Read(String),
    Write(std::io::Error),
}

/// Copy a tab-delimited table, dropping the named columns.
///
/// Fields are copied byte for byte: quotes carry no meaning and are never added.
/// Rows end with the header row's terminator (`\r\n` or `\n`), and the last row
/// always gets one. A table with none of the named columns passes through unchanged
/// apart from a missing final terminator.
pub fn project_columns<R: Read, W: Write>(
    input: R,
    output: W,
    drop: &[&str],
) -> Result<u64, ProjectError> {
    let mut input = BufReader::new(input);
    let mut header_line = Vec::new();
    input
        .read_until(b'\n', &mut header_line)
        .map_err(|e| ProjectError::Read(e.to_string()))?;
    let terminator = if header_line.ends_with(b"\r\n") {
        csv::Terminator::CRLF
    } else {
        csv::Terminator::Any(b'\n')
    };

    let mut reader = csv::ReaderBuilder::new()
        .delimiter(b'\t')
        .quoting(false)
        .has_headers(true)
        .from_reader(Cursor::new(header_line).chain(input));
    let mut writer = csv::WriterBuilder::new()
        .delimiter(b'\t')
        .quote_style(csv::QuoteStyle::Never)
        .terminator(terminator)
        .from_writer(output);

    let headers = reader
        .byte_headers()
        .map_err(|e| ProjectError::Read(e.to_string()))?
        .clone();
    if headers.is_empty() {
        return Err(ProjectError::Read("no header row".to_string()));
    }

    let keep: Vec<usize> = headers
        .iter()
        .enumerate()
        .filter(|(_, name)| !drop.iter().any(|d| d.as_bytes() == *name))
        .map(|(i, _)| i)
        .collect();

    writer
        .write_record(keep.iter().map(|&i| &headers[i]))
        .map_err(write_error)?;

    let mut rows = 0u64;
    let mut record = csv::ByteRecord::new();
    while reader
        .read_byte_record(&mut record)
        .map_err(|e| ProjectError::Read(e.to_string()))?
    {
        writer
            .write_record(keep.iter().map(|&i| &record[i]))
            .map_err(write_error)?;
        rows += 1;
    }

    writer.flush().map_err(ProjectError::Write)?;
    Ok(rows)
}

fn write_error(e: csv::Error) -> ProjectError {
    match e.into_kind() {
        csv::ErrorKind::Io(io) => ProjectError::Write(io),
        other => ProjectError::Write(std::io::Error::other(format!("{:?}", other))),
    }
}
