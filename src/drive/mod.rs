//! Virtual drives
//!
//! A drive is a directory holding one file per key. Each drive has its own
//! readers-writer lock and a fault flag; drives never share either.

use crate::error::{Error, Result};
use parking_lot::RwLock;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{debug, info};

/// Check that a key or configuration name can be used as a file name
pub fn validate_name(name: &str) -> Result<()> {
    if name.is_empty()
        || name == "."
        || name == ".."
        || name.contains(['/', '\\', '\0'])
    {
        return Err(Error::InvalidName(name.to_string()));
    }
    Ok(())
}

/// Suffix of the temporary file a write goes through before being renamed
const TEMP_SUFFIX: &str = ".tmp";

fn temp_name(key: &str) -> String {
    format!(".{}{}", key, TEMP_SUFFIX)
}

/// Check that `key` can be stored on a drive. Names shaped like the drive's
/// own temporary files are reserved.
pub fn validate_key(key: &str) -> Result<()> {
    validate_name(key)?;
    if key.starts_with('.') && key.ends_with(TEMP_SUFFIX) {
        return Err(Error::InvalidName(key.to_string()));
    }
    Ok(())
}

/// A named, lockable storage unit backed by a directory
#[derive(Debug)]
pub struct Drive {
    name: String,
    location: PathBuf,
    failed: AtomicBool,
    lock: RwLock<()>,
}

impl Drive {
    /// Create a drive, making its backing directory if needed
    pub fn create<P: Into<PathBuf>>(name: &str, location: P) -> Result<Self> {
        let drive = Self::attach(name, location)?;
        fs::create_dir_all(&drive.location)?;
        debug!("Created drive {} at {:?}", drive.name, drive.location);
        Ok(drive)
    }

    /// Wrap an existing backing directory without touching the filesystem
    pub fn attach<P: Into<PathBuf>>(name: &str, location: P) -> Result<Self> {
        validate_name(name)?;
        Ok(Drive {
            name: name.to_string(),
            location: location.into(),
            failed: AtomicBool::new(false),
            lock: RwLock::new(()),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn location(&self) -> &Path {
        &self.location
    }

    /// Mark the drive as faulted; reads and writes fail until [`Drive::restore`]
    pub fn fail(&self) {
        if !self.failed.swap(true, Ordering::SeqCst) {
            info!("Drive {} marked as failed", self.name);
        }
    }

    /// Clear the fault flag
    pub fn restore(&self) {
        if self.failed.swap(false, Ordering::SeqCst) {
            info!("Drive {} restored", self.name);
        }
    }

    pub fn is_failed(&self) -> bool {
        self.failed.load(Ordering::SeqCst)
    }

    /// Whether the backing directory is present
    pub fn has_backing(&self) -> bool {
        self.location.is_dir()
    }

    fn key_path(&self, key: &str) -> PathBuf {
        self.location.join(key)
    }

    /// Store `data` under `key`, replacing any previous value
    pub fn write(&self, key: &str, data: &[u8]) -> Result<()> {
        if self.is_failed() {
            return Err(Error::DriveFailed(self.name.clone()));
        }
        validate_key(key)?;

        let _guard = self.lock.write();

        let path = self.key_path(key);
        let temp_path = self.location.join(temp_name(key));
        fs::write(&temp_path, data)?;
        fs::rename(&temp_path, &path)?;

        debug!("Drive {}: wrote {} ({} bytes)", self.name, key, data.len());
        Ok(())
    }

    /// Read the value stored under `key`
    pub fn read(&self, key: &str) -> Result<Vec<u8>> {
        if self.is_failed() {
            return Err(Error::DriveFailed(self.name.clone()));
        }
        validate_key(key)?;

        let _guard = self.lock.read();

        match fs::read(self.key_path(key)) {
            Ok(data) => {
                debug!("Drive {}: read {} ({} bytes)", self.name, key, data.len());
                Ok(data)
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                Err(Error::NotFound(format!("{} on drive {}", key, self.name)))
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Whether a value for `key` is stored. Ignores the fault flag.
    pub fn exists(&self, key: &str) -> bool {
        if validate_key(key).is_err() {
            return false;
        }
        let _guard = self.lock.read();
        self.key_path(key).is_file()
    }

    /// (Re)create the backing directory. Leaves the fault flag alone.
    pub fn recreate(&self) -> Result<()> {
        let _guard = self.lock.write();
        fs::create_dir_all(&self.location)?;
        debug!("Drive {}: recreated backing storage", self.name);
        Ok(())
    }
}
