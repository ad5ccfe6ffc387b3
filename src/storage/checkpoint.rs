//! Checkpoint and dataset files for resumable crawling
//!
//! A crawl persists its partially built region tree after every province so
//! an interrupted run can pick up where it stopped. This module owns every
//! file the crawler writes:
//!
//! - checkpoints: `<output>/checkpoints/checkpoint_<YYYYMMDD>.json`
//! - temp snapshots: `<output>/temp_wilayah_<YYYYMMDD_HHMMSS>.json`
//! - final artifacts: `<output>/wilayah_final_<YYYYMMDD>.json`
//!
//! All of them share the [`RegionData`] JSON shape, are pretty-printed, and
//! are written to a `.tmp` sibling first and then renamed into place.
//!
//! # Example
//!
//! ```no_run
//! use wilayah::storage::checkpoint::{CheckpointKey, CheckpointStore};
//!
//! # fn example() -> Result<(), wilayah::error::StorageError> {
//! let store = CheckpointStore::new("./output");
//! let key = CheckpointKey::today();
//!
//! let tree = store.load(&key)?;
//! println!("Resuming with {} provinces", tree.pro.len());
//! store.save(&key, &tree)?;
//! # Ok(())
//! # }
//! ```

use chrono::{DateTime, Local, NaiveDate};
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use crate::models::{RegionCounts, RegionData};
use crate::utils::error::StorageError;

const CHECKPOINT_DIR: &str = "checkpoints";
const CHECKPOINT_PREFIX: &str = "checkpoint_";
const TEMP_PREFIX: &str = "temp_wilayah_";
const FINAL_PREFIX: &str = "wilayah_final_";

// ============================================================================
// Checkpoint Key
// ============================================================================

/// Date key of a checkpoint (`YYYYMMDD`, local calendar date)
///
/// A run that crosses midnight writes to the next day's key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CheckpointKey(String);

impl CheckpointKey {
    pub fn today() -> Self {
        Self::from_date(Local::now().date_naive())
    }

    pub fn from_date(date: NaiveDate) -> Self {
        Self(date.format("%Y%m%d").to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for CheckpointKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

// ============================================================================
// Checkpoint Info
// ============================================================================

/// Summary of one checkpoint file on disk
#[derive(Debug, Clone)]
pub struct CheckpointInfo {
    pub name: String,
    pub path: PathBuf,
    pub size_bytes: u64,
    pub modified: Option<DateTime<Local>>,
    /// Node counts, or why the file could not be read
    pub counts: Result<RegionCounts, String>,
}

// ============================================================================
// Checkpoint Store
// ============================================================================

/// Reads and writes the crawler's files under one output directory
#[derive(Debug, Clone)]
pub struct CheckpointStore {
    output_dir: PathBuf,
    checkpoint_dir: PathBuf,
}

impl CheckpointStore {
    /// Create a store rooted at `output_dir`; directories are created on first write
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        let output_dir = output_dir.into();
        let checkpoint_dir = output_dir.join(CHECKPOINT_DIR);
        Self {
            output_dir,
            checkpoint_dir,
        }
    }

    pub fn checkpoint_dir(&self) -> &Path {
        &self.checkpoint_dir
    }

    pub fn checkpoint_path(&self, key: &CheckpointKey) -> PathBuf {
        self.checkpoint_dir
            .join(format!("{CHECKPOINT_PREFIX}{key}.json"))
    }

    /// Temp snapshot path for a crawl started at `started`
    pub fn temp_snapshot_path(&self, started: DateTime<Local>) -> PathBuf {
        self.output_dir.join(format!(
            "{TEMP_PREFIX}{}.json",
            started.format("%Y%m%d_%H%M%S")
        ))
    }

    pub fn final_artifact_path(&self, key: &CheckpointKey) -> PathBuf {
        self.output_dir.join(format!("{FINAL_PREFIX}{key}.json"))
    }

    /// Load the checkpoint for `key`
    ///
    /// A missing file is an empty tree. A file that exists but does not parse
    /// is [`StorageError::CorruptCheckpoint`].
    pub fn load(&self, key: &CheckpointKey) -> Result<RegionData, StorageError> {
        let path = self.checkpoint_path(key);

        let file = match File::open(&path) {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "No checkpoint, starting fresh");
                return Ok(RegionData::new());
            }
            Err(e) => return Err(StorageError::io(path, e)),
        };

        let data: RegionData = serde_json::from_reader(BufReader::new(file))
            .map_err(|source| StorageError::CorruptCheckpoint {
                path: path.clone(),
                source,
            })?;

        tracing::info!(
            path = %path.display(),
            provinces = data.pro.len(),
            "Checkpoint loaded"
        );
        Ok(data)
    }

    /// Save `data` as the checkpoint for `key`, replacing any previous one
    pub fn save(&self, key: &CheckpointKey, data: &RegionData) -> Result<PathBuf, StorageError> {
        let path = self.checkpoint_path(key);
        write_dataset(&path, data)?;
        tracing::debug!(path = %path.display(), provinces = data.pro.len(), "Checkpoint saved");
        Ok(path)
    }

    /// Delete the checkpoint for `key`; a missing file is not an error
    pub fn delete(&self, key: &CheckpointKey) -> Result<(), StorageError> {
        let path = self.checkpoint_path(key);
        match fs::remove_file(&path) {
            Ok(()) => {
                tracing::debug!(path = %path.display(), "Checkpoint deleted");
                Ok(())
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(StorageError::io(path, e)),
        }
    }

    /// List all checkpoint files, sorted by name
    ///
    /// Files that fail to parse are reported through
    /// [`CheckpointInfo::counts`] rather than failing the listing.
    pub fn list(&self) -> Result<Vec<CheckpointInfo>, StorageError> {
        let mut infos = Vec::new();

        for path in self.checkpoint_files()? {
            let name = path
                .file_name()
                .and_then(|n| n.to_str())
                .unwrap_or_default()
                .to_string();

            let metadata = fs::metadata(&path).map_err(|e| StorageError::io(&path, e))?;
            let modified = metadata.modified().ok().map(DateTime::<Local>::from);

            let counts = read_dataset(&path)
                .map(|data| data.counts())
                .map_err(|e| e.to_string());

            infos.push(CheckpointInfo {
                name,
                path,
                size_bytes: metadata.len(),
                modified,
                counts,
            });
        }

        infos.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(infos)
    }

    /// Delete checkpoint files last modified more than `days` days ago
    ///
    /// Returns the number of files deleted. Files that cannot be removed are
    /// logged and skipped.
    pub fn clean_older_than(&self, days: u64) -> Result<usize, StorageError> {
        let max_age = Duration::from_secs(days * 24 * 60 * 60);
        let now = SystemTime::now();
        let mut cleaned = 0;

        for path in self.checkpoint_files()? {
            let modified = fs::metadata(&path)
                .and_then(|m| m.modified())
                .map_err(|e| StorageError::io(&path, e))?;

            let age = now.duration_since(modified).unwrap_or_default();
            if age <= max_age {
                continue;
            }

            match fs::remove_file(&path) {
                Ok(()) => {
                    tracing::info!(path = %path.display(), "Removed old checkpoint");
                    cleaned += 1;
                }
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "Failed to remove checkpoint");
                }
            }
        }

        Ok(cleaned)
    }

    /// `*.json` files in the checkpoint directory; none if it does not exist
    fn checkpoint_files(&self) -> Result<Vec<PathBuf>, StorageError> {
        let entries = match fs::read_dir(&self.checkpoint_dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(StorageError::io(&self.checkpoint_dir, e)),
        };

        let mut files = Vec::new();
        for entry in entries {
            let path = entry
                .map_err(|e| StorageError::io(&self.checkpoint_dir, e))?
                .path();
            if path.is_file() && path.extension().is_some_and(|ext| ext == "json") {
                files.push(path);
            }
        }
        Ok(files)
    }
}

// ============================================================================
// Dataset Files
// ============================================================================

/// Read a region tree from any dataset file
pub fn read_dataset(path: &Path) -> Result<RegionData, StorageError> {
    let file = File::open(path).map_err(|e| StorageError::io(path, e))?;
    serde_json::from_reader(BufReader::new(file)).map_err(|source| StorageError::InvalidDataset {
        path: path.to_path_buf(),
        source,
    })
}

/// Write a region tree atomically (`<file>.tmp` then rename)
///
/// Parent directories are created as needed. Output is pretty-printed with
/// non-ASCII characters written as-is.
pub fn write_dataset(path: &Path, data: &RegionData) -> Result<(), StorageError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|e| StorageError::io(parent, e))?;
    }

    let mut temp_name = path.file_name().unwrap_or_default().to_os_string();
    temp_name.push(".tmp");
    let temp_path = path.with_file_name(temp_name);

    let file = File::create(&temp_path).map_err(|e| StorageError::io(&temp_path, e))?;
    let mut writer = BufWriter::new(file);
    serde_json::to_writer_pretty(&mut writer, data).map_err(|source| StorageError::Serialize {
        path: temp_path.clone(),
        source,
    })?;
    writer
        .flush()
        .map_err(|e| StorageError::io(&temp_path, e))?;
    drop(writer);

    fs::rename(&temp_path, path).map_err(|e| StorageError::io(path, e))?;
    Ok(())
}

/// Locate the newest dataset under `dir`
///
/// Final artifacts win over temp snapshots; within each kind the
/// lexicographically greatest name (latest timestamp) is chosen.
pub fn find_latest_dataset(dir: &Path) -> Result<PathBuf, StorageError> {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == ErrorKind::NotFound => {
            return Err(StorageError::DatasetNotFound(dir.to_path_buf()))
        }
        Err(e) => return Err(StorageError::io(dir, e)),
    };

    let mut finals = Vec::new();
    let mut temps = Vec::new();

    for entry in entries {
        let entry = entry.map_err(|e| StorageError::io(dir, e))?;
        let Some(name) = entry.file_name().to_str().map(str::to_string) else {
            continue;
        };
        if !name.ends_with(".json") {
            continue;
        }
        if name.starts_with(FINAL_PREFIX) {
            finals.push(name);
        } else if name.starts_with(TEMP_PREFIX) {
            temps.push(name);
        }
    }

    finals
        .into_iter()
        .max()
        .or_else(|| temps.into_iter().max())
        .map(|name| dir.join(name))
        .ok_or_else(|| StorageError::DatasetNotFound(dir.to_path_buf()))
}

/// Where a repaired dataset was written
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FixReport {
    pub output: PathBuf,
    /// Copy of the original when it was rewritten in place
    pub backup: Option<PathBuf>,
}

/// `<stem>_backup.<ext>` beside `path`
pub fn backup_path(path: &Path) -> PathBuf {
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let name = match path.extension() {
        Some(ext) => format!("{stem}_backup.{}", ext.to_string_lossy()),
        None => format!("{stem}_backup"),
    };
    path.with_file_name(name)
}

/// Re-run name normalisation over an existing dataset file
///
/// With no `output` the input is moved to its backup path and the repaired
/// tree is written in its place. If the rewrite fails the backup is moved
/// back.
pub fn fix_dataset(input: &Path, output: Option<&Path>) -> Result<FixReport, StorageError> {
    if let Some(output) = output {
        let mut data = read_dataset(input)?;
        data.normalize_names();
        write_dataset(output, &data)?;
        return Ok(FixReport {
            output: output.to_path_buf(),
            backup: None,
        });
    }

    // Fail before touching anything if the input is unreadable
    let mut data = read_dataset(input)?;
    data.normalize_names();

    let backup = backup_path(input);
    fs::rename(input, &backup).map_err(|e| StorageError::io(input, e))?;
    tracing::info!(backup = %backup.display(), "Backup created");

    if let Err(e) = write_dataset(input, &data) {
        if let Err(restore) = fs::rename(&backup, input) {
            tracing::error!(error = %restore, "Failed to restore backup");
        }
        return Err(e);
    }

    Ok(FixReport {
        output: input.to_path_buf(),
        backup: Some(backup),
    })
}
