//! Array health derived from drive fault flags
//!
//! Tracks the status of each drive and whether the array as a whole can
//! still serve reads.

use serde::{Deserialize, Serialize};

use super::Raid;

/// Status of a single drive
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DriveHealth {
    /// Drive name
    pub name: String,
    /// Fault flag is set
    pub failed: bool,
    /// Backing directory exists
    pub present: bool,
}

/// Overall array status
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum ArrayStatus {
    /// All drives healthy, full redundancy
    Healthy,
    /// Operating with reduced redundancy
    Degraded,
    /// Data can no longer be read
    Failed,
}

/// Overall RAID array health
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArrayHealth {
    /// Overall status
    pub status: ArrayStatus,
    /// Individual drive health, in configuration order
    pub drives: Vec<DriveHealth>,
}

impl ArrayHealth {
    pub fn of(raid: &Raid) -> Self {
        let drives: Vec<DriveHealth> = raid
            .drives()
            .into_iter()
            .map(|d| DriveHealth {
                name: d.name().to_string(),
                failed: d.is_failed(),
                present: d.has_backing(),
            })
            .collect();

        let failed = drives.iter().filter(|d| d.failed).count();
        let status = if failed == 0 {
            ArrayStatus::Healthy
        } else {
            match raid {
                Raid::Stripe(_) => ArrayStatus::Failed,
                Raid::Mirror(_) if failed == drives.len() => ArrayStatus::Failed,
                Raid::Mirror(_) => ArrayStatus::Degraded,
                Raid::Parity(_) if failed > 1 => ArrayStatus::Failed,
                Raid::Parity(_) => ArrayStatus::Degraded,
                Raid::StripedMirror(r) => {
                    if r.pairs().iter().any(|[a, b]| a.is_failed() && b.is_failed()) {
                        ArrayStatus::Failed
                    } else {
                        ArrayStatus::Degraded
                    }
                }
            }
        };

        ArrayHealth { status, drives }
    }

    /// Number of drives with the fault flag set
    pub fn failed_count(&self) -> usize {
        self.drives.iter().filter(|d| d.failed).count()
    }

    pub fn is_degraded(&self) -> bool {
        self.status == ArrayStatus::Degraded
    }

    pub fn can_operate(&self) -> bool {
        self.status != ArrayStatus::Failed
    }
}
