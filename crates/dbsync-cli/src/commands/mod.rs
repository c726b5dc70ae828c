//! CLI command implementations.

pub mod config;
pub mod daemon;
pub mod keygen;
pub mod send;

use std::path::Path;

use anyhow::{Context, Result};
use dbsync_config::{ConfigLoader, DbsyncConfig};

/// Loads the layered configuration rooted at `project_dir`.
fn load_config(project_dir: &Path) -> Result<DbsyncConfig> {
    ConfigLoader::new()
        .with_project_dir(project_dir)
        .load()
        .context("Failed to load configuration")
}
