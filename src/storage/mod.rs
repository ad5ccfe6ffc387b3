//! Durable storage for crawl state and datasets
//!
//! All crawler output is plain JSON on the local filesystem; see
//! [`checkpoint`] for the file layout.

pub mod checkpoint;

pub use checkpoint::{
    backup_path, find_latest_dataset, fix_dataset, read_dataset, write_dataset, CheckpointInfo,
    CheckpointKey, CheckpointStore, FixReport,
};
