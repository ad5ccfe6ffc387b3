use anyhow::{Context, Result};

use wilayah::config::Config;
use wilayah::storage::CheckpointStore;
use wilayah::utils::format_bytes;

/// Print every checkpoint with its size, age and node counts
pub fn checkpoints_info(config: &Config) -> Result<()> {
    let store = CheckpointStore::new(&config.storage.output_dir);
    let infos = store.list().context("Failed to list checkpoints")?;

    if infos.is_empty() {
        println!("No checkpoints in {}", store.checkpoint_dir().display());
        return Ok(());
    }

    println!("Checkpoints in {}", store.checkpoint_dir().display());
    println!();

    for info in infos {
        println!("{}", info.name);
        println!("  Size: {}", format_bytes(info.size_bytes));
        if let Some(modified) = info.modified {
            println!("  Modified: {}", modified.format("%Y-%m-%d %H:%M:%S"));
        }
        match info.counts {
            Ok(counts) => println!(
                "  Contents: {} provinsi, {} kabupaten, {} kecamatan, {} desa",
                counts.provinces, counts.regencies, counts.districts, counts.villages
            ),
            Err(e) => println!("  Unreadable: {e}"),
        }
    }

    Ok(())
}

/// Delete checkpoints older than `days` days
pub fn checkpoints_clean(config: &Config, days: u64) -> Result<()> {
    let store = CheckpointStore::new(&config.storage.output_dir);
    let removed = store
        .clean_older_than(days)
        .context("Failed to clean checkpoints")?;

    println!("Removed {removed} checkpoint(s) older than {days} day(s)");
    Ok(())
}
