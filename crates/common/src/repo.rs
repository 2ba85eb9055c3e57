//! On-disk repository layout and the exclusive lock that guards it.
//!
//! A repository is a directory holding `config.toml`, a `LOCK` file and
//! the `datastore/` directory. Before anything reads or mutates the
//! datastore the daemon takes an exclusive OS-level lock on `LOCK`
//! through a [`RepositoryHandle`]. The handle is released exactly once:
//! either explicitly via [`RepositoryHandle::release`] or when the node
//! that took ownership of it closes.

use std::fs::{self, File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use fs2::FileExt;

use crate::config::{ConfigError, Identity, RepoConfig};

pub const APP_NAME: &str = "cairn";
pub const CONFIG_FILE_NAME: &str = "config.toml";
pub const LOCK_FILE_NAME: &str = "LOCK";
pub const DATASTORE_DIR_NAME: &str = "datastore";

/// Default repository location (`~/.cairn`).
pub fn default_repo_path() -> Result<PathBuf, RepoError> {
    let home = dirs::home_dir().ok_or(RepoError::NoHomeDirectory)?;
    Ok(home.join(format!(".{}", APP_NAME)))
}

/// Whether a repository exists at `path`. The config file is the marker.
pub fn is_initialized(path: &Path) -> bool {
    path.join(CONFIG_FILE_NAME).is_file()
}

/// Create a new repository at `path`.
///
/// Fails if one already exists; see [`init_if_absent`] for the
/// idempotent variant.
pub fn init(path: &Path, config: Option<RepoConfig>) -> Result<RepoConfig, RepoError> {
    if is_initialized(path) {
        return Err(RepoError::AlreadyInitialized(path.to_path_buf()));
    }

    fs::create_dir_all(path.join(DATASTORE_DIR_NAME))?;

    let config = match config {
        Some(config) => config,
        None => RepoConfig::with_identity(Identity::generate()?),
    };
    config.save(&path.join(CONFIG_FILE_NAME))?;

    tracing::info!(path = %path.display(), peer_id = %config.identity.peer_id, "initialized repository");
    Ok(config)
}

/// Initialize a default repository unless one is already there.
///
/// An existing repository is left untouched. Returns whether a new
/// repository was created.
pub fn init_if_absent(path: &Path) -> Result<bool, RepoError> {
    if is_initialized(path) {
        tracing::debug!(path = %path.display(), "repository already initialized, skipping init");
        return Ok(false);
    }
    init(path, None)?;
    Ok(true)
}

/// Exclusive lease on a repository.
///
/// At most one live handle exists per repository path: the lock is an
/// advisory OS lock on the `LOCK` file, held as long as the file stays
/// open.
#[derive(Debug)]
pub struct RepositoryHandle {
    path: PathBuf,
    config: RepoConfig,
    lock: Option<File>,
}

impl RepositoryHandle {
    /// Lock the repository at `path` and load its configuration.
    pub fn acquire(path: &Path) -> Result<Self, RepoError> {
        if !is_initialized(path) {
            return Err(RepoError::Uninitialized(path.to_path_buf()));
        }

        let lock_path = path.join(LOCK_FILE_NAME);
        let mut lock = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&lock_path)?;

        if FileExt::try_lock_exclusive(&lock).is_err() {
            return Err(RepoError::LockHeld {
                path: path.to_path_buf(),
                pid: read_pid(&mut lock),
            });
        }

        // Lock is ours from here on; dropping `lock` on any early return
        // closes the file and with it the lock.
        lock.set_len(0)?;
        writeln!(lock, "{}", std::process::id())?;
        lock.sync_all()?;

        let config = RepoConfig::load(&path.join(CONFIG_FILE_NAME))
            .map_err(|e| RepoError::Corrupt(path.to_path_buf(), e.to_string()))?;
        if !path.join(DATASTORE_DIR_NAME).is_dir() {
            return Err(RepoError::Corrupt(
                path.to_path_buf(),
                format!("missing {}/ directory", DATASTORE_DIR_NAME),
            ));
        }

        tracing::debug!(path = %path.display(), "acquired repository lock");
        Ok(Self {
            path: path.to_path_buf(),
            config,
            lock: Some(lock),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn config(&self) -> &RepoConfig {
        &self.config
    }

    pub fn datastore_path(&self) -> PathBuf {
        self.path.join(DATASTORE_DIR_NAME)
    }

    /// Give up the lock.
    pub fn release(mut self) -> Result<(), RepoError> {
        self.unlock()
    }

    fn unlock(&mut self) -> Result<(), RepoError> {
        if let Some(lock) = self.lock.take() {
            let result = lock.set_len(0).and_then(|_| FileExt::unlock(&lock));
            drop(lock);
            result?;
            tracing::debug!(path = %self.path.display(), "released repository lock");
        }
        Ok(())
    }
}

impl Drop for RepositoryHandle {
    fn drop(&mut self) {
        if self.lock.is_some() {
            tracing::warn!(path = %self.path.display(), "repository handle dropped without release");
            if let Err(e) = self.unlock() {
                tracing::error!("failed to release repository lock: {}", e);
            }
        }
    }
}

fn read_pid(lock: &mut File) -> Option<u32> {
    let mut contents = String::new();
    lock.seek(SeekFrom::Start(0)).ok()?;
    lock.read_to_string(&mut contents).ok()?;
    contents.trim().parse().ok()
}

#[derive(Debug, thiserror::Error)]
pub enum RepoError {
    #[error("no repository at {}. Run 'cairn init' or pass --init", .0.display())]
    Uninitialized(PathBuf),

    #[error("repository already initialized at {}", .0.display())]
    AlreadyInitialized(PathBuf),

    #[error("repository at {} is locked{}", .path.display(), .pid.map(|p| format!(" by process {}", p)).unwrap_or_default())]
    LockHeld { path: PathBuf, pid: Option<u32> },

    #[error("repository at {} is corrupt: {}", .0.display(), .1)]
    Corrupt(PathBuf, String),

    #[error("no home directory found")]
    NoHomeDirectory,

    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}
