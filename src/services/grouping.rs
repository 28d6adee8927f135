use crate::core::fingerprint::ClusterAssignment;
use crate::services::history;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum GroupError {
    #[error("failed to create directory {path}: {source}")]
    CreateDir {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to move {from} -> {to}: {source}")]
    Move {
        from: PathBuf,
        to: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("invalid file name: {path}")]
    InvalidFileName { path: PathBuf },

    #[error("history file {path}: {source}")]
    History {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to encode history record: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("no history records to restore")]
    NoHistory,

    #[error("invalid history index {index}; {len} record(s) available")]
    InvalidRecord { index: usize, len: usize },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileMove {
    pub from: PathBuf,
    pub to: PathBuf,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupReport {
    pub moves: Vec<FileMove>,
    pub skipped_noise: usize,
    pub dry_run: bool,
}

pub fn group_dir_name(cluster_id: u32) -> String {
    format!("group_{}", cluster_id)
}

/// Move every clustered image into `out_dir/group_<id>/`. Noise images stay
/// where they are. With `dry_run` the moves are planned but not performed.
pub fn group_image_files(
    assignments: &[ClusterAssignment],
    out_dir: &Path,
    dry_run: bool,
) -> Result<GroupReport, GroupError> {
    log::info!("Organizing {} images into groups", assignments.len());

    let mut report = GroupReport {
        dry_run,
        ..GroupReport::default()
    };
    let outcome = move_into_groups(assignments, out_dir, &mut report);

    if dry_run {
        log::info!("Dry run: {} images would be moved", report.moves.len());
        return outcome.map(|()| report);
    }

    log::info!("Moved {} images to cluster directories", report.moves.len());
    // Files moved before a failure still need a record so they can be restored.
    let recorded = if report.moves.is_empty() {
        Ok(())
    } else {
        history::append_record(out_dir, &report.moves)
    };

    match (outcome, recorded) {
        (Err(e), recorded) => {
            if let Err(history_err) = recorded {
                log::error!("Failed to record partial grouping: {}", history_err);
            }
            Err(e)
        }
        (Ok(()), recorded) => recorded.map(|()| report),
    }
}

fn move_into_groups(
    assignments: &[ClusterAssignment],
    out_dir: &Path,
    report: &mut GroupReport,
) -> Result<(), GroupError> {
    let mut taken: HashSet<PathBuf> = HashSet::new();

    for assignment in assignments {
        let Some(cluster_id) = assignment.label.cluster_id() else {
            log::debug!("Skipping noise point: {}", assignment.identifier.display());
            report.skipped_noise += 1;
            continue;
        };

        let source = &assignment.identifier;
        let cluster_dir = out_dir.join(group_dir_name(cluster_id));
        let file_name = source
            .file_name()
            .ok_or_else(|| GroupError::InvalidFileName {
                path: source.clone(),
            })?;

        if source.parent() == Some(cluster_dir.as_path()) {
            log::debug!("{} is already grouped", source.display());
            continue;
        }

        let destination = unique_destination(&cluster_dir, Path::new(file_name), &taken);
        taken.insert(destination.clone());

        if !report.dry_run {
            fs::create_dir_all(&cluster_dir).map_err(|source| GroupError::CreateDir {
                path: cluster_dir.clone(),
                source,
            })?;
            move_file(source, &destination)?;
        }

        report.moves.push(FileMove {
            from: source.clone(),
            to: destination,
        });
    }

    Ok(())
}

/// Rename, falling back to copy + delete across filesystems.
pub(crate) fn move_file(from: &Path, to: &Path) -> Result<(), GroupError> {
    let wrap = |source: io::Error| GroupError::Move {
        from: from.to_path_buf(),
        to: to.to_path_buf(),
        source,
    };

    match fs::rename(from, to) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::CrossesDevices => {
            fs::copy(from, to).map_err(wrap)?;
            fs::remove_file(from).map_err(wrap)
        }
        Err(e) => Err(wrap(e)),
    }
}

// Never overwrite: `name.jpg` becomes `name_1.jpg`, `name_2.jpg`, ...
fn unique_destination(dir: &Path, file_name: &Path, taken: &HashSet<PathBuf>) -> PathBuf {
    let candidate = dir.join(file_name);
    if !candidate.exists() && !taken.contains(&candidate) {
        return candidate;
    }

    let stem = file_name
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let extension = file_name
        .extension()
        .map(|e| format!(".{}", e.to_string_lossy()))
        .unwrap_or_default();

    (1..)
        .map(|n| dir.join(format!("{}_{}{}", stem, n, extension)))
        .find(|candidate| !candidate.exists() && !taken.contains(candidate))
        .unwrap_or(candidate)
}
