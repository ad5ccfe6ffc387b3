use anyhow::{Context, Result};
use std::path::PathBuf;

use wilayah::storage::fix_dataset;

/// Re-normalise the names of an existing dataset file
pub fn fix(input: PathBuf, output: Option<PathBuf>) -> Result<()> {
    let report = fix_dataset(&input, output.as_deref())
        .with_context(|| format!("Failed to fix {}", input.display()))?;

    if let Some(backup) = &report.backup {
        println!("Backup: {}", backup.display());
    }
    println!("Fixed dataset written to {}", report.output.display());
    Ok(())
}
