//! Creating and reopening RAID configurations

use std::sync::Arc;
use tracing::{info, warn};

use super::{Raid, RaidKind};
use crate::config::Config;
use crate::drive::{validate_name, Drive};
use crate::error::{Error, Result};
use crate::state::{RaidRecord, StateStore};

/// Allocates drives, builds strategies and records them in the state store
pub struct RaidFactory {
    config: Config,
    store: Arc<StateStore>,
}

impl RaidFactory {
    pub fn new(config: Config, store: Arc<StateStore>) -> Self {
        RaidFactory { config, store }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn store(&self) -> &StateStore {
        &self.store
    }

    /// Name of drive `index` of configuration `name`
    pub fn drive_name(name: &str, index: usize) -> String {
        format!("{}{}", name, index)
    }

    /// Create configuration `name` of `kind` (e.g. `"RAID5"`)
    pub fn create_named(&self, kind: &str, name: &str) -> Result<Raid> {
        let kind: RaidKind = kind.parse()?;
        self.create(kind, name)
    }

    /// Allocate the minimum number of drives for `kind`, build the strategy
    /// and persist its record
    pub fn create(&self, kind: RaidKind, name: &str) -> Result<Raid> {
        validate_name(name)?;

        if self.store.exists(name)? {
            return Err(Error::NameTaken(name.to_string()));
        }

        let drives = (0..kind.min_drives())
            .map(|i| {
                let drive_name = Self::drive_name(name, i);
                let location = self.config.drive_path(&drive_name);
                Drive::create(&drive_name, location)
            })
            .collect::<Result<Vec<_>>>()?;
        let drive_names = drives.iter().map(|d| d.name().to_string()).collect();

        let raid = Raid::new(kind, name, drives)?;

        // The store rechecks the name; a concurrent create may have won.
        self.store.save(RaidRecord::new(name, kind, drive_names))?;

        info!("Created {} configuration {}", kind, name);
        Ok(raid)
    }

    /// Rebuild the strategy for a recorded configuration. Drives whose
    /// backing storage is gone come back marked as failed.
    pub fn open(&self, name: &str) -> Result<Raid> {
        let record = self
            .store
            .get(name)?
            .ok_or_else(|| Error::NotFound(format!("RAID configuration {}", name)))?;

        let drives = record
            .drive_names
            .iter()
            .map(|drive_name| {
                let drive = Drive::attach(drive_name, self.config.drive_path(drive_name))?;
                if !drive.has_backing() {
                    warn!("{}: drive {} has no backing storage", name, drive_name);
                    drive.fail();
                }
                Ok(drive)
            })
            .collect::<Result<Vec<_>>>()?;

        Raid::new(record.kind, &record.name, drives)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn test_factory(temp: &TempDir) -> RaidFactory {
        let config = Config::new(temp.path().join("ws"));
        let store = Arc::new(StateStore::new(&config));
        store.initialize().unwrap();
        RaidFactory::new(config, store)
    }

    #[test]
    fn test_create_allocates_minimum_drives() {
        let temp = TempDir::new().unwrap();
        let factory = test_factory(&temp);

        for kind in RaidKind::all() {
            let name = format!("{}-set", kind.as_str().to_lowercase());
            let raid = factory.create(kind, &name).unwrap();
            assert_eq!(raid.kind(), kind);
            assert_eq!(raid.drives().len(), kind.min_drives());

            let record = factory.store().get(&name).unwrap().unwrap();
            let names: Vec<&str> = raid.drives().iter().map(|d| d.name()).collect();
            assert_eq!(record.drive_names, names);
            assert_eq!(record.drive_names[0], format!("{}0", name));
            assert!(factory.store().validate_drives(&record).is_ok());
        }
    }

    #[test]
    fn test_create_rejects_invalid_kind() {
        let temp = TempDir::new().unwrap();
        let factory = test_factory(&temp);

        assert!(matches!(factory.create_named("RAID6", "x"), Err(Error::InvalidKind(_))));
        assert!(factory.store().list().unwrap().is_empty());
    }

    #[test]
    fn test_create_rejects_taken_name() {
        let temp = TempDir::new().unwrap();
        let factory = test_factory(&temp);

        factory.create(RaidKind::Mirror, "r1").unwrap();
        assert!(matches!(
            factory.create(RaidKind::Stripe, "r1"),
            Err(Error::NameTaken(_))
        ));
        assert_eq!(factory.store().get("r1").unwrap().unwrap().kind, RaidKind::Mirror);
    }

    #[test]
    fn test_create_requires_initialized_state() {
        let temp = TempDir::new().unwrap();
        let config = Config::new(temp.path());
        let factory = RaidFactory::new(config.clone(), Arc::new(StateStore::new(&config)));

        assert!(matches!(
            factory.create(RaidKind::Mirror, "r1"),
            Err(Error::NotInitialized(_))
        ));
    }

    #[test]
    fn test_open_reads_back_data() {
        let temp = TempDir::new().unwrap();
        let factory = test_factory(&temp);

        let raid = factory.create(RaidKind::Parity, "r5").unwrap();
        raid.write("x", b"persisted across handles").unwrap();
        drop(raid);

        let reopened = factory.open("r5").unwrap();
        assert_eq!(reopened.kind(), RaidKind::Parity);
        assert_eq!(reopened.read("x").unwrap(), b"persisted across handles");
        assert!(matches!(factory.open("nope"), Err(Error::NotFound(_))));
    }

    #[test]
    fn test_open_marks_lost_drive_failed_and_reconstructs() {
        let temp = TempDir::new().unwrap();
        let factory = test_factory(&temp);

        let raid = factory.create(RaidKind::Mirror, "m").unwrap();
        raid.write("a.txt", b"hello").unwrap();
        std::fs::remove_dir_all(factory.config().drive_path("m0")).unwrap();

        let record = factory.store().get("m").unwrap().unwrap();
        assert!(matches!(
            factory.store().validate_drives(&record),
            Err(Error::MissingDrives(ref missing)) if missing == &vec!["m0".to_string()]
        ));

        let raid = factory.open("m").unwrap();
        assert!(raid.drive("m0").unwrap().is_failed());
        assert_eq!(raid.read("a.txt").unwrap(), b"hello");

        raid.reconstruct("a.txt", "m0").unwrap();
        assert!(factory.store().validate_drives(&record).is_ok());
        assert_eq!(raid.drive("m0").unwrap().read("a.txt").unwrap(), b"hello");
    }

    #[test]
    fn test_mirror_scenario_through_factory() {
        let temp = TempDir::new().unwrap();
        let factory = test_factory(&temp);

        let raid = factory.create(RaidKind::Mirror, "r1").unwrap();
        raid.write("a.txt", b"hello").unwrap();

        raid.drive("r10").unwrap().fail();
        assert_eq!(raid.read("a.txt").unwrap(), b"hello");

        raid.reconstruct("a.txt", "r10").unwrap();
        assert_eq!(raid.drive("r10").unwrap().read("a.txt").unwrap(), b"hello");
    }
}
