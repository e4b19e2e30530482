use crate::config::PathSettings;
use crate::models::{BattleId, FetchOutcome};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("failed to access {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid JSON in {}: {source}", .path.display())]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// One entry of the processed battle summaries
///
/// Only the fields needed to pick battle IDs are read.
#[derive(Debug, Clone, Deserialize)]
pub struct BattleSummary {
    #[serde(rename = "gameid")]
    pub game_id: BattleId,
    #[serde(default)]
    pub skip: bool,
}

/// Battle IDs of every summary not flagged as skipped, in file order
pub fn read_battle_ids(path: &Path, limit: Option<usize>) -> Result<Vec<BattleId>, StorageError> {
    let file = fs::File::open(path).map_err(|source| StorageError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let summaries: Vec<BattleSummary> =
        serde_json::from_reader(BufReader::new(file)).map_err(|source| StorageError::Json {
            path: path.to_path_buf(),
            source,
        })?;

    Ok(select_battle_ids(&summaries, limit))
}

pub fn select_battle_ids(summaries: &[BattleSummary], limit: Option<usize>) -> Vec<BattleId> {
    summaries
        .iter()
        .filter(|s| !s.skip)
        .map(|s| s.game_id)
        .take(limit.unwrap_or(usize::MAX))
        .collect()
}

/// Write the three result files
///
/// Must only be called with the outcome of a completed run.
pub fn write_outcome(outcome: &FetchOutcome, paths: &PathSettings) -> Result<(), StorageError> {
    write_json(&paths.skipped_output, &outcome.skipped)?;
    write_json(&paths.missing_output, &outcome.missing)?;
    write_json(&paths.output, &outcome.fetched)?;
    Ok(())
}

fn write_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<(), StorageError> {
    let io_error = |source: std::io::Error| StorageError::Io {
        path: path.to_path_buf(),
        source,
    };

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(io_error)?;
    }
    let file = fs::File::create(path).map_err(io_error)?;
    let mut writer = BufWriter::new(file);
    serde_json::to_writer(&mut writer, value).map_err(|source| StorageError::Json {
        path: path.to_path_buf(),
        source,
    })?;
    writer.flush().map_err(io_error)?;

    tracing::debug!("Wrote {}", path.display());
    Ok(())
}
