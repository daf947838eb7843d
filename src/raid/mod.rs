//! RAID strategies over virtual drives
//!
//! Four layouts share one contract: write, read, reconstruct. [`Raid`] is a
//! closed sum over them so callers can match on the kind exhaustively.

pub mod factory;
pub mod health;
pub mod mirror;
pub mod parity;
pub mod stripe;
pub mod striped_mirror;

pub use factory::RaidFactory;
pub use health::{ArrayHealth, ArrayStatus, DriveHealth};
pub use mirror::Mirror;
pub use parity::{Parity, ParityBlock};
pub use stripe::Stripe;
pub use striped_mirror::StripedMirror;

use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::Range;
use std::str::FromStr;
use tracing::warn;

use crate::drive::Drive;
use crate::error::{Error, Result};

/// Supported RAID levels
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum RaidKind {
    /// RAID0: striping, no redundancy
    #[serde(rename = "RAID0")]
    Stripe,

    /// RAID1: full copies on every drive
    #[serde(rename = "RAID1")]
    Mirror,

    /// RAID5: striping with rotating XOR parity
    #[serde(rename = "RAID5")]
    Parity,

    /// RAID10: striping across mirrored pairs
    #[serde(rename = "RAID10")]
    StripedMirror,
}

impl RaidKind {
    pub fn all() -> [RaidKind; 4] {
        [
            RaidKind::Stripe,
            RaidKind::Mirror,
            RaidKind::Parity,
            RaidKind::StripedMirror,
        ]
    }

    /// Minimum number of drives; also the number the factory allocates
    pub fn min_drives(self) -> usize {
        match self {
            RaidKind::Stripe | RaidKind::Mirror => 2,
            RaidKind::Parity => 3,
            RaidKind::StripedMirror => 4,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            RaidKind::Stripe => "RAID0",
            RaidKind::Mirror => "RAID1",
            RaidKind::Parity => "RAID5",
            RaidKind::StripedMirror => "RAID10",
        }
    }
}

impl fmt::Display for RaidKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RaidKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "raid0" | "stripe" => Ok(RaidKind::Stripe),
            "raid1" | "mirror" => Ok(RaidKind::Mirror),
            "raid5" | "parity" => Ok(RaidKind::Parity),
            "raid10" | "striped-mirror" => Ok(RaidKind::StripedMirror),
            _ => Err(Error::InvalidKind(s.to_string())),
        }
    }
}

/// A RAID instance of one of the supported kinds
#[derive(Debug)]
pub enum Raid {
    Stripe(Stripe),
    Mirror(Mirror),
    Parity(Parity),
    StripedMirror(StripedMirror),
}

impl Raid {
    /// Build the strategy for `kind` over `drives` (in order)
    pub fn new(kind: RaidKind, name: &str, drives: Vec<Drive>) -> Result<Self> {
        Ok(match kind {
            RaidKind::Stripe => Raid::Stripe(Stripe::new(name, drives)?),
            RaidKind::Mirror => Raid::Mirror(Mirror::new(name, drives)?),
            RaidKind::Parity => Raid::Parity(Parity::new(name, drives)?),
            RaidKind::StripedMirror => Raid::StripedMirror(StripedMirror::new(name, drives)?),
        })
    }

    pub fn name(&self) -> &str {
        match self {
            Raid::Stripe(r) => r.name(),
            Raid::Mirror(r) => r.name(),
            Raid::Parity(r) => r.name(),
            Raid::StripedMirror(r) => r.name(),
        }
    }

    pub fn kind(&self) -> RaidKind {
        match self {
            Raid::Stripe(_) => RaidKind::Stripe,
            Raid::Mirror(_) => RaidKind::Mirror,
            Raid::Parity(_) => RaidKind::Parity,
            Raid::StripedMirror(_) => RaidKind::StripedMirror,
        }
    }

    /// Drives in configuration order
    pub fn drives(&self) -> Vec<&Drive> {
        match self {
            Raid::Stripe(r) => r.drives().iter().collect(),
            Raid::Mirror(r) => r.drives().iter().collect(),
            Raid::Parity(r) => r.drives().iter().collect(),
            Raid::StripedMirror(r) => r.drives(),
        }
    }

    pub fn drive(&self, name: &str) -> Option<&Drive> {
        self.drives().into_iter().find(|d| d.name() == name)
    }

    pub fn write(&self, key: &str, data: &[u8]) -> Result<()> {
        match self {
            Raid::Stripe(r) => r.write(key, data),
            Raid::Mirror(r) => r.write(key, data),
            Raid::Parity(r) => r.write(key, data),
            Raid::StripedMirror(r) => r.write(key, data),
        }
    }

    pub fn read(&self, key: &str) -> Result<Vec<u8>> {
        match self {
            Raid::Stripe(r) => r.read(key),
            Raid::Mirror(r) => r.read(key),
            Raid::Parity(r) => r.read(key),
            Raid::StripedMirror(r) => r.read(key),
        }
    }

    /// Rebuild `key` onto `failed_drive`, clearing its fault flag
    pub fn reconstruct(&self, key: &str, failed_drive: &str) -> Result<()> {
        match self {
            Raid::Stripe(r) => r.reconstruct(key, failed_drive),
            Raid::Mirror(r) => r.reconstruct(key, failed_drive),
            Raid::Parity(r) => r.reconstruct(key, failed_drive),
            Raid::StripedMirror(r) => r.reconstruct(key, failed_drive),
        }
    }

    pub fn health(&self) -> ArrayHealth {
        ArrayHealth::of(self)
    }
}

/// Reject a drive set smaller than the kind's minimum
pub(crate) fn check_drive_count(kind: RaidKind, drives: &[Drive]) -> Result<()> {
    if drives.len() < kind.min_drives() {
        return Err(Error::InsufficientDrives {
            kind,
            required: kind.min_drives(),
            actual: drives.len(),
        });
    }
    Ok(())
}

/// Split `len` bytes into `parts` ranges of `len / parts`; the last one
/// absorbs the remainder.
pub fn stripe_ranges(len: usize, parts: usize) -> Vec<Range<usize>> {
    let chunk = len / parts;
    (0..parts)
        .map(|i| {
            let start = i * chunk;
            let end = if i + 1 == parts { len } else { start + chunk };
            start..end
        })
        .collect()
}

/// Write each payload to its drive in order. Stops at the first failure;
/// if earlier drives were already written the error names them.
pub(crate) fn write_sequence(key: &str, writes: &[(&Drive, &str, &[u8])]) -> Result<()> {
    let mut completed: Vec<String> = Vec::with_capacity(writes.len());

    for (drive, drive_key, data) in writes {
        if let Err(e) = drive.write(drive_key, data) {
            if completed.is_empty() {
                return Err(e);
            }
            warn!(
                "Write of {} stopped at drive {} after {}/{} drives: {}",
                key,
                drive.name(),
                completed.len(),
                writes.len(),
                e
            );
            return Err(Error::PartialWrite {
                key: key.to_string(),
                completed,
                failed: drive.name().to_string(),
                source: Box::new(e),
            });
        }
        completed.push(drive.name().to_string());
    }

    Ok(())
}

/// Bring a failed drive back and store recovered bytes on it
pub(crate) fn restore_onto(drive: &Drive, key: &str, data: &[u8]) -> Result<()> {
    drive.recreate()?;
    drive.restore();
    drive.write(key, data)
}

pub(crate) fn drive_not_found(raid: &str, drive: &str) -> Error {
    Error::DriveNotFound {
        raid: raid.to_string(),
        drive: drive.to_string(),
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use tempfile::TempDir;

    /// Drives named `d0..d{count}` under `temp`
    pub(crate) fn make_drives(temp: &TempDir, count: usize) -> Vec<Drive> {
        (0..count)
            .map(|i| {
                let name = format!("d{}", i);
                Drive::create(&name, temp.path().join(&name)).unwrap()
            })
            .collect()
    }

    #[test]
    fn test_kind_parsing() {
        assert_eq!("RAID0".parse::<RaidKind>().unwrap(), RaidKind::Stripe);
        assert_eq!("raid1".parse::<RaidKind>().unwrap(), RaidKind::Mirror);
        assert_eq!("parity".parse::<RaidKind>().unwrap(), RaidKind::Parity);
        assert_eq!("RAID10".parse::<RaidKind>().unwrap(), RaidKind::StripedMirror);
        assert!(matches!("RAID6".parse::<RaidKind>(), Err(Error::InvalidKind(_))));

        for kind in RaidKind::all() {
            assert_eq!(kind.to_string().parse::<RaidKind>().unwrap(), kind);
        }
    }

    #[test]
    fn test_kind_serde_names() {
        let json = serde_json::to_string(&RaidKind::StripedMirror).unwrap();
        assert_eq!(json, "\"RAID10\"");
        let kind: RaidKind = serde_json::from_str("\"RAID5\"").unwrap();
        assert_eq!(kind, RaidKind::Parity);
    }

    #[test]
    fn test_stripe_ranges() {
        let ranges = stripe_ranges(11, 3);
        assert_eq!(ranges, vec![0..3, 3..6, 6..11]);

        let ranges = stripe_ranges(1, 2);
        assert_eq!(ranges, vec![0..0, 0..1]);
    }

    #[test]
    fn test_roundtrip_all_kinds() {
        let data = b"The quick brown fox jumps over the lazy dog";

        for kind in RaidKind::all() {
            for extra in [0, 2] {
                let temp = TempDir::new().unwrap();
                let drives = make_drives(&temp, kind.min_drives() + extra);
                let raid = Raid::new(kind, "r", drives).unwrap();

                for len in [1, 2, 7, data.len()] {
                    let key = format!("k{}", len);
                    raid.write(&key, &data[..len]).unwrap();
                    assert_eq!(raid.read(&key).unwrap(), &data[..len], "{} len {}", kind, len);
                }
                assert_eq!(raid.kind(), kind);
            }
        }
    }

    #[test]
    fn test_too_few_drives() {
        for kind in RaidKind::all() {
            let temp = TempDir::new().unwrap();
            let drives = make_drives(&temp, kind.min_drives() - 1);
            let err = Raid::new(kind, "r", drives).unwrap_err();
            assert!(matches!(err, Error::InsufficientDrives { .. }));
        }
    }

    #[test]
    fn test_partial_write_reports_completed_drives() {
        let temp = TempDir::new().unwrap();
        let raid = Raid::new(RaidKind::Mirror, "r1", make_drives(&temp, 3)).unwrap();
        raid.drive("d1").unwrap().fail();

        match raid.write("a.txt", b"hello").unwrap_err() {
            Error::PartialWrite {
                completed, failed, ..
            } => {
                assert_eq!(completed, vec!["d0".to_string()]);
                assert_eq!(failed, "d1");
            }
            other => panic!("unexpected error: {}", other),
        }
        // no rollback
        assert!(raid.drive("d0").unwrap().exists("a.txt"));
        assert!(!raid.drive("d2").unwrap().exists("a.txt"));
    }

    #[test]
    fn test_first_drive_failure_is_plain() {
        let temp = TempDir::new().unwrap();
        let raid = Raid::new(RaidKind::Stripe, "r0", make_drives(&temp, 2)).unwrap();
        raid.drive("d0").unwrap().fail();

        assert!(matches!(raid.write("a", b"abcd"), Err(Error::DriveFailed(_))));
    }
}
