use crate::services::grouping::{move_file, FileMove, GroupError};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, ErrorKind, Write};
use std::path::{Path, PathBuf};

pub const HISTORY_FILE: &str = ".photocluster-history.jsonl";

/// One grouping run: the files it moved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryRecord {
    pub timestamp: String,
    pub moves: Vec<FileMove>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RestoreSelection {
    Latest,
    Index(usize),
    All,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RestoreReport {
    pub restored: Vec<FileMove>,
    pub skipped: usize,
    pub records_removed: usize,
}

pub fn history_path(out_dir: &Path) -> PathBuf {
    out_dir.join(HISTORY_FILE)
}

pub fn append_record(out_dir: &Path, moves: &[FileMove]) -> Result<(), GroupError> {
    let path = history_path(out_dir);
    let record = HistoryRecord {
        timestamp: Utc::now().to_rfc3339(),
        moves: moves.to_vec(),
    };
    let line = serde_json::to_string(&record)?;

    let io_err = |source| GroupError::History {
        path: path.clone(),
        source,
    };
    let mut out = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&path)
        .map_err(io_err)?;
    writeln!(out, "{}", line).map_err(io_err)?;

    log::info!("Recorded grouping history in {}", path.display());
    Ok(())
}

/// Read all well-formed records. A missing file means no history.
pub fn read_history(out_dir: &Path) -> Result<Vec<HistoryRecord>, GroupError> {
    let path = history_path(out_dir);
    let file = match File::open(&path) {
        Ok(file) => file,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
        Err(source) => return Err(GroupError::History { path, source }),
    };

    let mut records = Vec::new();
    for (i, line) in BufReader::new(file).lines().enumerate() {
        let line = line.map_err(|source| GroupError::History {
            path: path.clone(),
            source,
        })?;
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str::<HistoryRecord>(&line) {
            Ok(record) => records.push(record),
            Err(err) => log::warn!("Skipping malformed history entry {}: {}", i, err),
        }
    }
    Ok(records)
}

/// Move files from the selected records back to where they came from, then
/// drop those records from the history file.
pub fn restore_history(
    out_dir: &Path,
    selection: RestoreSelection,
) -> Result<RestoreReport, GroupError> {
    let records = read_history(out_dir)?;
    if records.is_empty() {
        return Err(GroupError::NoHistory);
    }

    let indices: Vec<usize> = match selection {
        RestoreSelection::All => (0..records.len()).collect(),
        RestoreSelection::Latest => vec![records.len() - 1],
        RestoreSelection::Index(index) if index < records.len() => vec![index],
        RestoreSelection::Index(index) => {
            return Err(GroupError::InvalidRecord {
                index,
                len: records.len(),
            });
        }
    };

    let mut report = RestoreReport::default();
    // Newest first so later moves are undone before earlier ones.
    for &i in indices.iter().rev() {
        let record = &records[i];
        log::info!(
            "Restoring {} files from record {}",
            record.moves.len(),
            record.timestamp
        );
        for file_move in &record.moves {
            if !file_move.to.exists() {
                log::warn!("{} does not exist; skipping", file_move.to.display());
                report.skipped += 1;
                continue;
            }
            if file_move.from.exists() {
                log::warn!("{} already exists; skipping", file_move.from.display());
                report.skipped += 1;
                continue;
            }
            if let Some(parent) = file_move.from.parent() {
                fs::create_dir_all(parent).map_err(|source| GroupError::CreateDir {
                    path: parent.to_path_buf(),
                    source,
                })?;
            }
            move_file(&file_move.to, &file_move.from)?;
            report.restored.push(FileMove {
                from: file_move.to.clone(),
                to: file_move.from.clone(),
            });

            // Best effort: drop the group directory once it is empty.
            if let Some(group_dir) = file_move.to.parent() {
                let _ = fs::remove_dir(group_dir);
            }
        }
    }

    let remaining: Vec<&HistoryRecord> = records
        .iter()
        .enumerate()
        .filter(|(i, _)| !indices.contains(i))
        .map(|(_, record)| record)
        .collect();
    rewrite_history(out_dir, &remaining)?;
    report.records_removed = indices.len();

    Ok(report)
}

fn rewrite_history(out_dir: &Path, records: &[&HistoryRecord]) -> Result<(), GroupError> {
    let path = history_path(out_dir);
    if records.is_empty() {
        return match fs::remove_file(&path) {
            Err(e) if e.kind() != ErrorKind::NotFound => {
                Err(GroupError::History { path, source: e })
            }
            _ => Ok(()),
        };
    }

    let mut content = String::new();
    for record in records {
        content.push_str(&serde_json::to_string(record)?);
        content.push('\n');
    }
    fs::write(&path, content).map_err(|source| GroupError::History { path, source })
}
