//! raidsim - RAID semantics over ordinary file storage
//!
//! Distributes, mirrors and parity-protects named values across virtual
//! drives, and rebuilds a drive's content after a simulated failure.

pub mod config;
pub mod drive;
pub mod error;
pub mod raid;
pub mod state;

pub use config::Config;
pub use error::{Error, Result};

/// Re-export commonly used types
pub mod prelude {
    pub use crate::config::Config;
    pub use crate::drive::Drive;
    pub use crate::error::{Error, Result};
    pub use crate::raid::{Raid, RaidFactory, RaidKind};
    pub use crate::state::{RaidRecord, StateStore};
}
