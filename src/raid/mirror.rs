//! RAID1 mirroring

use tracing::{debug, info, warn};

use super::{check_drive_count, drive_not_found, restore_onto, write_sequence, RaidKind};
use crate::drive::Drive;
use crate::error::{Error, Result};

/// Every drive holds a full copy of every key
#[derive(Debug)]
pub struct Mirror {
    name: String,
    drives: Vec<Drive>,
}

impl Mirror {
    pub fn new(name: &str, drives: Vec<Drive>) -> Result<Self> {
        check_drive_count(RaidKind::Mirror, &drives)?;
        Ok(Mirror {
            name: name.to_string(),
            drives,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn drives(&self) -> &[Drive] {
        &self.drives
    }

    pub fn write(&self, key: &str, data: &[u8]) -> Result<()> {
        let writes: Vec<(&Drive, &str, &[u8])> =
            self.drives.iter().map(|drive| (drive, key, data)).collect();
        write_sequence(key, &writes)
    }

    /// Return the first copy that reads; fails with the last error only when
    /// every drive fails.
    pub fn read(&self, key: &str) -> Result<Vec<u8>> {
        let mut last_err = None;
        for drive in &self.drives {
            match drive.read(key) {
                Ok(data) => return Ok(data),
                Err(e) => {
                    debug!("{}: {} unreadable on {}: {}", self.name, key, drive.name(), e);
                    last_err = Some(e);
                }
            }
        }
        Err(last_err.unwrap_or_else(|| Error::NotFound(key.to_string())))
    }

    pub fn reconstruct(&self, key: &str, failed_drive: &str) -> Result<()> {
        let reference = self
            .drives
            .iter()
            .filter(|d| d.exists(key))
            .find_map(|d| d.read(key).ok())
            .ok_or_else(|| {
                Error::NotFound(format!("no readable copy of {} in {}", key, self.name))
            })?;

        let target = self
            .drives
            .iter()
            .find(|d| d.name() == failed_drive)
            .ok_or_else(|| drive_not_found(&self.name, failed_drive))?;

        if let Err(e) = restore_onto(target, key, &reference) {
            warn!("{}: failed to restore {} onto {}: {}", self.name, key, failed_drive, e);
            return Err(e);
        }

        info!("{}: reconstructed {} on drive {}", self.name, key, failed_drive);
        Ok(())
    }
}
