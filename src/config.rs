// 🔧 Configuration - Runtime settings
// Built once at startup from the environment and passed down explicitly

use anyhow::{Context, Result};
use std::env;
use std::path::PathBuf;

/// Pipeline configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Root holding `YYYYMM` run directories
    pub data_dir: PathBuf,
    /// SQLite store for bouts
    pub db_path: PathBuf,
    /// Worker threads used to read and reconstruct snapshots
    pub workers: usize,
    /// Only process the most recent run directory (otherwise `data_dir` is the snapshot folder)
    pub latest_only: bool,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            data_dir: PathBuf::from("data"),
            db_path: PathBuf::from("bouts.db"),
            workers: default_workers(),
            latest_only: true,
        }
    }
}

impl Config {
    /// Load configuration from environment variables, falling back to defaults
    pub fn from_env() -> Result<Self> {
        let mut config = Config::default();

        if let Ok(dir) = env::var("SUMO_DATA_DIR") {
            config.data_dir = PathBuf::from(dir);
        }
        if let Ok(path) = env::var("SUMO_DB_PATH") {
            config.db_path = PathBuf::from(path);
        }
        if let Ok(workers) = env::var("SUMO_WORKERS") {
            config.workers = workers
                .parse()
                .with_context(|| format!("Invalid SUMO_WORKERS: {}", workers))?;
        }

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.workers == 0 {
            anyhow::bail!("workers must be at least 1");
        }
        Ok(())
    }
}

fn default_workers() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(4)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_valid() {
        let config = Config::default();
        assert!(config.workers >= 1);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_zero_workers_rejected() {
        let config = Config {
            workers: 0,
            ..Config::default()
        };
        assert!(config.validate().is_err());
    }
}
