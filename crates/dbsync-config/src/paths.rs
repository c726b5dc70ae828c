//! Path utilities and XDG directory discovery

use crate::ConfigError;
use directories::ProjectDirs;
use std::path::{Path, PathBuf};

/// XDG-compliant paths for dbsync
pub struct Paths {
    project_dirs: Option<ProjectDirs>,
}

impl Paths {
    /// Create a new Paths instance with XDG discovery
    pub fn new() -> Self {
        Self {
            project_dirs: ProjectDirs::from("org", "dbsync", "dbsync"),
        }
    }

    /// Get user config directory (~/.config/dbsync/)
    pub fn user_config_dir(&self) -> Result<PathBuf, ConfigError> {
        self.project_dirs
            .as_ref()
            .map(|p| p.config_dir().to_path_buf())
            .ok_or_else(|| {
                ConfigError::XdgError("Failed to determine user config directory".to_string())
            })
    }

    /// Get user config file path (~/.config/dbsync/config.toml)
    pub fn user_config_file(&self) -> Result<PathBuf, ConfigError> {
        Ok(self.user_config_dir()?.join("config.toml"))
    }

    /// Default location for generated key pairs (~/.config/dbsync/keys/)
    pub fn user_key_dir(&self) -> Result<PathBuf, ConfigError> {
        Ok(self.user_config_dir()?.join("keys"))
    }

    /// Get project config file path (dbsync.toml)
    pub fn project_config_file(project_dir: impl AsRef<Path>) -> PathBuf {
        project_dir.as_ref().join("dbsync.toml")
    }

    /// Get local config file path (dbsync.local.toml, gitignored)
    pub fn local_config_file(project_dir: impl AsRef<Path>) -> PathBuf {
        project_dir.as_ref().join("dbsync.local.toml")
    }
}

impl Default for Paths {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_xdg_paths() {
        let paths = Paths::new();

        // Platform dependent, but must mention the application when present.
        if let Ok(config_dir) = paths.user_config_dir() {
            assert!(config_dir.to_string_lossy().contains("dbsync"));
        }
        if let Ok(key_dir) = paths.user_key_dir() {
            assert!(key_dir.ends_with("keys"));
        }
    }

    #[test]
    fn test_project_paths() {
        let temp_dir = tempdir().expect("Failed to create temp dir");
        let project_dir = temp_dir.path();

        assert_eq!(
            Paths::project_config_file(project_dir),
            project_dir.join("dbsync.toml")
        );
        assert_eq!(
            Paths::local_config_file(project_dir),
            project_dir.join("dbsync.local.toml")
        );
    }
}
