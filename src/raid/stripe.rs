//! RAID0 striping
//!
//! Data is cut into one contiguous range per drive. There is no redundancy,
//! so a single unreadable drive fails the read and nothing can be rebuilt.

use tracing::debug;

use super::{check_drive_count, stripe_ranges, write_sequence, RaidKind};
use crate::drive::Drive;
use crate::error::{Error, Result};

/// Striped array without redundancy
#[derive(Debug)]
pub struct Stripe {
    name: String,
    drives: Vec<Drive>,
}

impl Stripe {
    pub fn new(name: &str, drives: Vec<Drive>) -> Result<Self> {
        check_drive_count(RaidKind::Stripe, &drives)?;
        Ok(Stripe {
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
        let ranges = stripe_ranges(data.len(), self.drives.len());
        let writes: Vec<(&Drive, &str, &[u8])> = self
            .drives
            .iter()
            .zip(ranges)
            .map(|(drive, range)| (drive, key, &data[range]))
            .collect();

        write_sequence(key, &writes)?;
        debug!(
            "{}: striped {} bytes of {} over {} drives",
            self.name,
            data.len(),
            key,
            self.drives.len()
        );
        Ok(())
    }

    pub fn read(&self, key: &str) -> Result<Vec<u8>> {
        let mut result = Vec::new();
        for drive in &self.drives {
            result.extend_from_slice(&drive.read(key)?);
        }
        Ok(result)
    }

    pub fn reconstruct(&self, _key: &str, _failed_drive: &str) -> Result<()> {
        Err(Error::Unsupported {
            kind: RaidKind::Stripe,
            operation: "reconstruction",
        })
    }
}
