//! Durable session output.
//!
//! Every file goes through a hidden temp file in the target directory that is
//! flushed, synced and renamed into place, so readers only ever see a
//! complete file.

use crate::session::{Session, SessionMetadata, ensure_output_dir};
use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use stroop_core::{InkColor, ResponseRecord, Result, StroopError};
use tracing::{error, info};

pub const CSV_HEADER: &str = "trial_index,word,ink_color,response_color,reaction_time_ms,correct";

/// Writes trial data and the metadata sidecar for a session
#[derive(Debug, Clone, Copy, Default)]
pub struct SessionWriter;

impl SessionWriter {
    pub fn new() -> Self {
        Self
    }

    /// Replaces `session.output_path()` with one CSV row per record, in order.
    pub fn flush(&self, session: &Session, records: &[ResponseRecord]) -> Result<()> {
        ensure_output_dir(session.output_dir())?;
        write_atomically(session.output_path(), |w| {
            writeln!(w, "{}", CSV_HEADER)?;
            for record in records {
                writeln!(w, "{}", CsvRow::from(record))?;
            }
            Ok(())
        })
        .inspect_err(|e| error!("Failed to write session data: {}", e))?;
        info!(
            "Wrote {} trial rows to {}",
            records.len(),
            session.output_path().display()
        );
        Ok(())
    }

    pub fn write_metadata(&self, session: &Session, metadata: &SessionMetadata) -> Result<()> {
        ensure_output_dir(session.output_dir())?;
        let path = session.metadata_path();
        write_atomically(&path, |w| {
            serde_json::to_writer_pretty(&mut *w, metadata)?;
            writeln!(w)
        })
        .inspect_err(|e| error!("Failed to write session metadata: {}", e))?;
        info!("Wrote session metadata to {}", path.display());
        Ok(())
    }
}

fn temp_path(path: &Path) -> io::Result<PathBuf> {
    let parent = path.parent().ok_or_else(|| {
        io::Error::new(io::ErrorKind::InvalidInput, "path has no parent directory")
    })?;
    let file_name = path
        .file_name()
        .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "path has no file name"))?;
    Ok(parent.join(format!(".{}.tmp", file_name.to_string_lossy())))
}

fn write_atomically<F>(path: &Path, write: F) -> Result<()>
where
    F: FnOnce(&mut BufWriter<File>) -> io::Result<()>,
{
    let tmp = temp_path(path).map_err(|e| StroopError::io(path, e))?;
    let result = (|| -> io::Result<()> {
        let mut writer = BufWriter::new(File::create(&tmp)?);
        write(&mut writer)?;
        let file = writer.into_inner().map_err(|e| e.into_error())?;
        file.sync_all()?;
        drop(file);
        fs::rename(&tmp, path)
    })();

    if let Err(e) = result {
        let _ = fs::remove_file(&tmp);
        return Err(StroopError::io(path, e));
    }
    Ok(())
}

/// One data row as it appears in the CSV
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CsvRow {
    pub trial_index: usize,
    pub word: InkColor,
    pub ink_color: InkColor,
    pub response_color: Option<InkColor>,
    pub reaction_time_ms: u64,
    pub correct: bool,
}

impl From<&ResponseRecord> for CsvRow {
    fn from(record: &ResponseRecord) -> Self {
        Self {
            trial_index: record.trial.index(),
            word: record.trial.word(),
            ink_color: record.trial.ink_color(),
            response_color: record.response_color,
            reaction_time_ms: record.reaction_time_ms,
            correct: record.correct,
        }
    }
}

impl std::fmt::Display for CsvRow {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{},{},{},{},{},{}",
            self.trial_index,
            self.word.name(),
            self.ink_color.name(),
            self.response_color.map(|c| c.name()).unwrap_or(""),
            self.reaction_time_ms,
            self.correct
        )
    }
}

impl std::str::FromStr for CsvRow {
    type Err = String;

    fn from_str(line: &str) -> std::result::Result<Self, Self::Err> {
        let fields: Vec<&str> = line.split(',').collect();
        let [index, word, ink, response, rt, correct] = fields.as_slice() else {
            return Err(format!("expected 6 fields, found {}", fields.len()));
        };
        Ok(Self {
            trial_index: index.parse().map_err(|e| format!("trial_index: {}", e))?,
            word: word.parse()?,
            ink_color: ink.parse()?,
            response_color: match *response {
                "" => None,
                name => Some(name.parse()?),
            },
            reaction_time_ms: rt.parse().map_err(|e| format!("reaction_time_ms: {}", e))?,
            correct: correct.parse().map_err(|e| format!("correct: {}", e))?,
        })
    }
}

/// Parses a file produced by [`SessionWriter::flush`]
pub fn read_rows(path: &Path) -> Result<Vec<CsvRow>> {
    let content = fs::read_to_string(path).map_err(|e| StroopError::io(path, e))?;
    let invalid = |msg: String| {
        StroopError::io(path, io::Error::new(io::ErrorKind::InvalidData, msg))
    };

    let mut lines = content.lines();
    match lines.next() {
        Some(header) if header == CSV_HEADER => {}
        other => return Err(invalid(format!("unexpected header {:?}", other))),
    }
    lines
        .enumerate()
        .filter(|(_, line)| !line.is_empty())
        .map(|(n, line)| line.parse().map_err(|e| invalid(format!("row {}: {}", n + 1, e))))
        .collect()
}
