// 📂 Snapshot Discovery
// Downloads land in `<data>/<YYYYMM>/basho/<basho_id>.json`; find the latest run and its files

use anyhow::{Context, Result};
use chrono::NaiveDate;
use std::path::{Path, PathBuf};

/// Folder inside a run directory holding basho snapshots
pub const BASHO_FOLDER: &str = "basho";

/// Parse a `YYYYMM` run directory name
fn parse_run_month(name: &str) -> Option<NaiveDate> {
    if name.len() != 6 || !name.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    NaiveDate::parse_from_str(&format!("{}01", name), "%Y%m%d").ok()
}

/// Most recent `YYYYMM` directory under `base`, if any
pub fn most_recent_run_dir(base: &Path) -> Result<Option<PathBuf>> {
    let entries = std::fs::read_dir(base)
        .with_context(|| format!("Failed to read data directory {}", base.display()))?;

    let mut latest: Option<(NaiveDate, PathBuf)> = None;

    for entry in entries {
        let entry = entry?;
        if !entry.file_type()?.is_dir() {
            continue;
        }
        let name = entry.file_name();
        let Some(month) = name.to_str().and_then(parse_run_month) else {
            continue;
        };
        if latest.as_ref().map_or(true, |(best, _)| month > *best) {
            latest = Some((month, entry.path()));
        }
    }

    Ok(latest.map(|(_, path)| path))
}

/// Snapshot folder of the most recent run
pub fn latest_snapshot_dir(base: &Path) -> Result<Option<PathBuf>> {
    Ok(most_recent_run_dir(base)?.map(|run| run.join(BASHO_FOLDER)))
}

/// `*.json` files in `dir`, sorted by file name
pub fn list_snapshot_files(dir: &Path) -> Result<Vec<PathBuf>> {
    let entries = std::fs::read_dir(dir)
        .with_context(|| format!("Failed to read snapshot directory {}", dir.display()))?;

    let mut files = Vec::new();
    for entry in entries {
        let path = entry?.path();
        if path.is_file() && path.extension().map_or(false, |ext| ext == "json") {
            files.push(path);
        }
    }
    files.sort();

    Ok(files)
}
