//! RAID10: stripes over mirrored pairs
//!
//! Drives are paired in order, `(d0, d1), (d2, d3), ...`. Each pair takes one
//! stripe range, as RAID0 assigns ranges to drives, and both members store it.

use tracing::{debug, info};

use super::{
    check_drive_count, drive_not_found, restore_onto, stripe_ranges, write_sequence, RaidKind,
};
use crate::drive::Drive;
use crate::error::{Error, Result};

/// Striped array of mirrored pairs
#[derive(Debug)]
pub struct StripedMirror {
    name: String,
    pairs: Vec<[Drive; 2]>,
}

impl StripedMirror {
    /// Needs an even number of at least four drives
    pub fn new(name: &str, drives: Vec<Drive>) -> Result<Self> {
        check_drive_count(RaidKind::StripedMirror, &drives)?;
        if drives.len() % 2 != 0 {
            return Err(Error::InsufficientDrives {
                kind: RaidKind::StripedMirror,
                required: drives.len() + 1,
                actual: drives.len(),
            });
        }

        let mut pairs = Vec::with_capacity(drives.len() / 2);
        let mut iter = drives.into_iter();
        while let (Some(primary), Some(secondary)) = (iter.next(), iter.next()) {
            pairs.push([primary, secondary]);
        }

        Ok(StripedMirror {
            name: name.to_string(),
            pairs,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn pairs(&self) -> &[[Drive; 2]] {
        &self.pairs
    }

    pub fn drives(&self) -> Vec<&Drive> {
        self.pairs.iter().flatten().collect()
    }

    pub fn write(&self, key: &str, data: &[u8]) -> Result<()> {
        let ranges = stripe_ranges(data.len(), self.pairs.len());
        let writes: Vec<(&Drive, &str, &[u8])> = self
            .pairs
            .iter()
            .zip(ranges)
            .flat_map(|(pair, range)| {
                let chunk = &data[range];
                pair.iter().map(move |drive| (drive, key, chunk))
            })
            .collect();

        write_sequence(key, &writes)
    }

    /// Read each pair's range from the primary, falling back to the secondary
    pub fn read(&self, key: &str) -> Result<Vec<u8>> {
        let mut result = Vec::new();
        for [primary, secondary] in &self.pairs {
            let chunk = match primary.read(key) {
                Ok(chunk) => chunk,
                Err(e) => {
                    debug!(
                        "{}: {} unreadable on {} ({}), trying {}",
                        self.name,
                        key,
                        primary.name(),
                        e,
                        secondary.name()
                    );
                    secondary.read(key)?
                }
            };
            result.extend_from_slice(&chunk);
        }
        Ok(result)
    }

    /// Copy the partner's range back onto `failed_drive`
    pub fn reconstruct(&self, key: &str, failed_drive: &str) -> Result<()> {
        for [first, second] in &self.pairs {
            let (source, target) = if first.name() == failed_drive {
                (second, first)
            } else if second.name() == failed_drive {
                (first, second)
            } else {
                continue;
            };

            let chunk = source.read(key)?;
            restore_onto(target, key, &chunk)?;
            info!(
                "{}: reconstructed {} on drive {} from {}",
                self.name,
                key,
                failed_drive,
                source.name()
            );
            return Ok(());
        }

        Err(drive_not_found(&self.name, failed_drive))
    }
}
