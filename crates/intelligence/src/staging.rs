//! Scoped credential staging
//!
//! A [`StagingArea`] is owned by exactly one sync operation. The directory is
//! created on first use and removed when the area is dropped, which the
//! coordinator does on every exit path of the operation.

use anyhow::{Context, Result};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// Permissions of staged secret files (owner read-only)
pub const SECRET_FILE_MODE: u32 = 0o400;

/// Temporary, private directory for secret material
#[derive(Debug)]
pub struct StagingArea {
    prefix: String,
    dir: Option<TempDir>,
}

impl StagingArea {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            dir: None,
        }
    }

    /// The staging directory, created on first call
    pub fn dir(&mut self) -> Result<&Path> {
        if self.dir.is_none() {
            let dir = tempfile::Builder::new()
                .prefix(&self.prefix)
                .tempdir()
                .context("Failed to create staging directory")?;
            log::debug!("Created staging directory {}", dir.path().display());
            self.dir = Some(dir);
        }
        match &self.dir {
            Some(dir) => Ok(dir.path()),
            None => anyhow::bail!("staging directory unavailable"),
        }
    }

    /// The staging directory if it has been created
    pub fn path(&self) -> Option<&Path> {
        self.dir.as_ref().map(TempDir::path)
    }

    pub fn is_active(&self) -> bool {
        self.dir.is_some()
    }

    /// Write a secret file readable only by its owner
    pub fn write_secret(&mut self, name: &str, contents: &[u8]) -> Result<PathBuf> {
        if name.contains(['/', '\\']) || name == ".." || name.is_empty() {
            anyhow::bail!("invalid staged file name: {name:?}");
        }
        let path = self.dir()?.join(name);
        let mut file = open_secret(&path)
            .with_context(|| format!("Failed to create {}", path.display()))?;
        file.write_all(contents)
            .with_context(|| format!("Failed to write {}", path.display()))?;
        Ok(path)
    }

    /// Remove the directory now, reporting cleanup errors
    pub fn release(mut self) -> Result<()> {
        if let Some(dir) = self.dir.take() {
            let path = dir.path().to_path_buf();
            dir.close()
                .with_context(|| format!("Failed to remove {}", path.display()))?;
            log::debug!("Removed staging directory {}", path.display());
        }
        Ok(())
    }
}

#[cfg(unix)]
fn open_secret(path: &Path) -> std::io::Result<fs::File> {
    use std::os::unix::fs::OpenOptionsExt;

    fs::OpenOptions::new()
        .write(true)
        .create_new(true)
        .mode(SECRET_FILE_MODE)
        .open(path)
}

#[cfg(not(unix))]
fn open_secret(path: &Path) -> std::io::Result<fs::File> {
    let file = fs::OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(path)?;
    let mut perms = file.metadata()?.permissions();
    perms.set_readonly(true);
    fs::set_permissions(path, perms)?;
    Ok(file)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lazy_creation() {
        let mut area = StagingArea::new("test-");
        assert!(area.path().is_none());
        let dir = area.dir().unwrap().to_path_buf();
        assert!(dir.is_dir());
        assert!(
            dir.file_name()
                .unwrap()
                .to_string_lossy()
                .starts_with("test-")
        );
    }

    #[test]
    fn test_drop_removes_directory() {
        let mut area = StagingArea::new("test-");
        let file = area.write_secret("config.json", b"{}").unwrap();
        let dir = area.path().unwrap().to_path_buf();
        assert!(file.exists());
        drop(area);
        assert!(!dir.exists());
    }

    #[test]
    fn test_release_removes_directory() {
        let mut area = StagingArea::new("test-");
        area.write_secret("config.json", b"{}").unwrap();
        let dir = area.path().unwrap().to_path_buf();
        area.release().unwrap();
        assert!(!dir.exists());
    }

    #[cfg(unix)]
    #[test]
    fn test_secret_is_owner_read_only() {
        use std::os::unix::fs::PermissionsExt;

        let mut area = StagingArea::new("test-");
        let file = area.write_secret("config.json", b"secret").unwrap();
        let mode = fs::metadata(&file).unwrap().permissions().mode() & 0o777;
        assert_eq!(mode, SECRET_FILE_MODE);
        assert_eq!(fs::read(&file).unwrap(), b"secret");
    }

    #[test]
    fn test_rejects_path_traversal() {
        let mut area = StagingArea::new("test-");
        assert!(area.write_secret("../escape", b"x").is_err());
        assert!(area.write_secret("", b"x").is_err());
    }
}
