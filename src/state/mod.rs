//! Persisted registry of RAID configurations
//!
//! The registry is one JSON document mapping configuration name to
//! [`RaidRecord`], plus a detached file holding the lowercase hex SHA-256 of
//! the document's exact bytes. A digest mismatch invalidates the whole store.
//!
//! Every mutation is load, verify, modify, dump, all under the store's lock.
//! A dump writes both files to temporary siblings before renaming them into
//! place, so loaders in this process never see one without the other. A crash
//! between the two renames leaves a mismatched pair, which `load` rejects.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use ring::digest::{digest, SHA256};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::config::Config;
use crate::error::{Error, Result};
use crate::raid::RaidKind;

/// Persisted description of one RAID instance
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RaidRecord {
    /// Unique configuration name
    pub name: String,

    /// RAID level
    pub kind: RaidKind,

    /// Drive names in strategy order
    pub drive_names: Vec<String>,

    /// Creation time, if known
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
}

impl RaidRecord {
    /// Create a record stamped with the current time
    pub fn new(name: &str, kind: RaidKind, drive_names: Vec<String>) -> Self {
        RaidRecord {
            name: name.to_string(),
            kind,
            drive_names,
            created_at: Some(Utc::now()),
        }
    }
}

/// Name to record mapping, kept ordered so serialization is deterministic
pub type RaidMap = BTreeMap<String, RaidRecord>;

/// Lowercase hex SHA-256 of `bytes`
pub fn digest_hex(bytes: &[u8]) -> String {
    hex::encode(digest(&SHA256, bytes).as_ref())
}

/// Checksum-verified store of RAID configurations
#[derive(Debug)]
pub struct StateStore {
    base_dir: PathBuf,
    document_path: PathBuf,
    digest_path: PathBuf,
    drives_path: PathBuf,
    lock: Mutex<()>,
}

impl StateStore {
    pub fn new(config: &Config) -> Self {
        StateStore {
            base_dir: config.base_dir.clone(),
            document_path: config.state_document_path(),
            digest_path: config.state_digest_path(),
            drives_path: config.drives_path(),
            lock: Mutex::new(()),
        }
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    /// Create the base directory and an empty registry. Fails if either file
    /// already exists.
    pub fn initialize(&self) -> Result<()> {
        let _guard = self.lock.lock();

        fs::create_dir_all(&self.base_dir)?;
        if self.document_path.exists() || self.digest_path.exists() {
            return Err(Error::AlreadyInitialized(self.base_dir.clone()));
        }

        self.dump(&RaidMap::new())?;
        info!("Initialized RAID state in {:?}", self.base_dir);
        Ok(())
    }

    /// Load and verify the registry
    pub fn load(&self) -> Result<RaidMap> {
        let _guard = self.lock.lock();
        self.load_unlocked()
    }

    /// Add a record. The store, not the caller, decides uniqueness.
    pub fn save(&self, record: RaidRecord) -> Result<()> {
        let _guard = self.lock.lock();

        let mut map = self.load_unlocked()?;
        if map.contains_key(&record.name) {
            return Err(Error::NameTaken(record.name));
        }

        let name = record.name.clone();
        map.insert(name.clone(), record);
        self.dump(&map)?;

        debug!("Saved RAID configuration {} ({} total)", name, map.len());
        Ok(())
    }

    pub fn exists(&self, name: &str) -> Result<bool> {
        Ok(self.load()?.contains_key(name))
    }

    pub fn get(&self, name: &str) -> Result<Option<RaidRecord>> {
        Ok(self.load()?.remove(name))
    }

    /// All records, ordered by name
    pub fn list(&self) -> Result<Vec<RaidRecord>> {
        Ok(self.load()?.into_values().collect())
    }

    /// Check every drive of `record` has backing storage, reporting all
    /// missing drives at once
    pub fn validate_drives(&self, record: &RaidRecord) -> Result<()> {
        let missing: Vec<String> = record
            .drive_names
            .iter()
            .filter(|name| !self.drives_path.join(name.as_str()).exists())
            .cloned()
            .collect();

        if !missing.is_empty() {
            return Err(Error::MissingDrives(missing));
        }
        Ok(())
    }

    fn load_unlocked(&self) -> Result<RaidMap> {
        let document = self.read_state_file(&self.document_path)?;
        let expected = self.read_state_file(&self.digest_path)?;
        let expected = String::from_utf8_lossy(&expected).trim().to_string();

        let actual = digest_hex(&document);
        if actual != expected {
            return Err(Error::ChecksumMismatch { expected, actual });
        }

        let map: RaidMap =
            serde_json::from_slice(&document).map_err(|e| Error::Corrupt(e.to_string()))?;

        if let Some((key, record)) = map.iter().find(|(key, record)| **key != record.name) {
            return Err(Error::Corrupt(format!(
                "entry {:?} holds record named {:?}",
                key, record.name
            )));
        }

        Ok(map)
    }

    fn read_state_file(&self, path: &Path) -> Result<Vec<u8>> {
        fs::read(path).map_err(|e| {
            if e.kind() == io::ErrorKind::NotFound {
                Error::NotInitialized(self.base_dir.clone())
            } else {
                Error::Io(e)
            }
        })
    }

    /// Write document and digest from the same snapshot
    fn dump(&self, map: &RaidMap) -> Result<()> {
        let document = serde_json::to_vec_pretty(map)?;
        let checksum = digest_hex(&document);

        let document_temp = write_temp(&self.document_path, &document)?;
        let digest_temp = write_temp(&self.digest_path, checksum.as_bytes())?;
        fs::rename(&document_temp, &self.document_path)?;
        fs::rename(&digest_temp, &self.digest_path)?;

        Ok(())
    }
}

/// Write `data` to a synced temporary sibling of `path` and return its path
fn write_temp(path: &Path, data: &[u8]) -> Result<PathBuf> {
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let temp_path = path.with_file_name(format!(".{}.tmp", file_name));

    let mut file = File::create(&temp_path)?;
    file.write_all(data)?;
    file.sync_all()?;

    Ok(temp_path)
}
