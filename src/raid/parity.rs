//! RAID5 striping with rotating parity
//!
//! For `n` drives a value is cut into `n - 1` chunks of
//! `ceil(len / (n - 1))` bytes, the last ones shorter or empty. The XOR of
//! all chunks (zero-padded to the chunk size) goes to the parity drive under
//! `<key>.parity`. The parity drive is chosen per key from a BLAKE3 hash of
//! the key, and data chunk `j` lives on the `j`-th remaining drive.
//!
//! The parity key stores a [`ParityBlock`], which also records the value's
//! length so a rebuilt chunk gets back its exact size.

use serde::{Deserialize, Serialize};
use std::ops::Range;
use tracing::{debug, info, warn};

use super::{check_drive_count, drive_not_found, restore_onto, write_sequence, RaidKind};
use crate::drive::Drive;
use crate::error::{Error, Result};

/// Suffix appended to a key to name its parity entry
pub const PARITY_SUFFIX: &str = ".parity";

/// Contents of a parity entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParityBlock {
    /// Length of the original value
    pub data_len: u64,
    /// XOR of all data chunks, `chunk_size` bytes
    pub parity: Vec<u8>,
}

impl ParityBlock {
    /// XOR `chunks` together, treating short chunks as zero-padded
    pub fn compute(chunks: &[&[u8]], data_len: usize) -> Self {
        let size = chunks.iter().map(|c| c.len()).max().unwrap_or(0);
        let mut parity = vec![0u8; size];
        for chunk in chunks {
            xor_into(&mut parity, chunk);
        }
        ParityBlock {
            data_len: data_len as u64,
            parity,
        }
    }

    pub fn encode(&self) -> Result<Vec<u8>> {
        Ok(bincode::serialize(self)?)
    }

    pub fn decode(bytes: &[u8]) -> Result<Self> {
        Ok(bincode::deserialize(bytes)?)
    }
}

fn xor_into(acc: &mut [u8], chunk: &[u8]) {
    for (a, b) in acc.iter_mut().zip(chunk) {
        *a ^= b;
    }
}

/// Byte ranges of each data slot for a value of `len` bytes
pub fn slot_ranges(len: usize, slots: usize) -> Vec<Range<usize>> {
    let size = len.div_ceil(slots);
    (0..slots)
        .map(|i| {
            let start = (i * size).min(len);
            let end = (start + size).min(len);
            start..end
        })
        .collect()
}

pub fn parity_key(key: &str) -> String {
    format!("{}{}", key, PARITY_SUFFIX)
}

/// User keys may not end in [`PARITY_SUFFIX`]; that namespace holds parity
fn check_key(key: &str) -> Result<()> {
    if key.ends_with(PARITY_SUFFIX) {
        return Err(Error::InvalidName(key.to_string()));
    }
    Ok(())
}

/// Striped array with one rotating XOR parity slot per key
#[derive(Debug)]
pub struct Parity {
    name: String,
    drives: Vec<Drive>,
}

impl Parity {
    pub fn new(name: &str, drives: Vec<Drive>) -> Result<Self> {
        check_drive_count(RaidKind::Parity, &drives)?;
        Ok(Parity {
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

    fn slots(&self) -> usize {
        self.drives.len() - 1
    }

    /// Index of the drive holding parity for `key`
    pub fn parity_index(&self, key: &str) -> usize {
        let hash = blake3::hash(key.as_bytes());
        let mut prefix = [0u8; 8];
        prefix.copy_from_slice(&hash.as_bytes()[..8]);
        (u64::from_le_bytes(prefix) % self.drives.len() as u64) as usize
    }

    pub fn parity_drive(&self, key: &str) -> &Drive {
        &self.drives[self.parity_index(key)]
    }

    /// Drives holding data chunks for `key`, in slot order
    pub fn data_drives(&self, key: &str) -> Vec<&Drive> {
        let parity = self.parity_index(key);
        self.drives
            .iter()
            .enumerate()
            .filter(|(idx, _)| *idx != parity)
            .map(|(_, drive)| drive)
            .collect()
    }

    pub fn write(&self, key: &str, data: &[u8]) -> Result<()> {
        check_key(key)?;
        let ranges = slot_ranges(data.len(), self.slots());
        let chunks: Vec<&[u8]> = ranges.into_iter().map(|r| &data[r]).collect();
        let block = ParityBlock::compute(&chunks, data.len()).encode()?;

        let parity_index = self.parity_index(key);
        let parity_key = parity_key(key);
        let mut data_chunks = chunks.iter().copied();
        let mut writes: Vec<(&Drive, &str, &[u8])> = Vec::with_capacity(self.drives.len());
        for (idx, drive) in self.drives.iter().enumerate() {
            if idx == parity_index {
                writes.push((drive, parity_key.as_str(), block.as_slice()));
            } else if let Some(chunk) = data_chunks.next() {
                writes.push((drive, key, chunk));
            }
        }

        write_sequence(key, &writes)?;
        debug!(
            "{}: wrote {} ({} bytes, parity on {})",
            self.name,
            key,
            data.len(),
            self.drives[parity_index].name()
        );
        Ok(())
    }

    /// Concatenate the data chunks, leaving the parity slot out. A single
    /// unreadable chunk is rebuilt in memory from parity.
    pub fn read(&self, key: &str) -> Result<Vec<u8>> {
        check_key(key)?;
        let mut chunks: Vec<Option<Vec<u8>>> = Vec::with_capacity(self.slots());
        let mut first_err = None;

        for drive in self.data_drives(key) {
            match drive.read(key) {
                Ok(chunk) => chunks.push(Some(chunk)),
                Err(e) => {
                    if let Some(first) = first_err.take() {
                        return Err(first);
                    }
                    first_err = Some(e);
                    chunks.push(None);
                }
            }
        }

        if let Some(err) = first_err {
            let missing = chunks.iter().position(Option::is_none).unwrap_or(0);
            let block = match self.read_parity_block(key) {
                Ok(block) => block,
                Err(_) => return Err(err),
            };
            warn!(
                "{}: slot {} of {} unavailable ({}), rebuilding from parity",
                self.name, missing, key, err
            );
            let recovered = self.recover_slot(key, &block, missing, &chunks)?;
            chunks[missing] = Some(recovered);
        }

        Ok(chunks.into_iter().flatten().flatten().collect())
    }

    fn read_parity_block(&self, key: &str) -> Result<ParityBlock> {
        ParityBlock::decode(&self.parity_drive(key).read(&parity_key(key))?)
    }

    /// XOR parity with every other slot to get slot `missing` back
    fn recover_slot(
        &self,
        key: &str,
        block: &ParityBlock,
        missing: usize,
        chunks: &[Option<Vec<u8>>],
    ) -> Result<Vec<u8>> {
        let ranges = slot_ranges(block.data_len as usize, self.slots());
        let mut acc = block.parity.clone();

        for (slot, chunk) in chunks.iter().enumerate() {
            if slot == missing {
                continue;
            }
            let chunk = chunk
                .as_ref()
                .ok_or_else(|| Error::NotFound(format!("slot {} of {}", slot, key)))?;
            if chunk.len() != ranges[slot].len() {
                return Err(Error::Corrupt(format!(
                    "slot {} of {} is {} bytes, expected {}",
                    slot,
                    key,
                    chunk.len(),
                    ranges[slot].len()
                )));
            }
            xor_into(&mut acc, chunk);
        }

        let expected = ranges[missing].len();
        if acc.len() < expected {
            return Err(Error::Corrupt(format!(
                "parity of {} is {} bytes, slot {} needs {}",
                key,
                acc.len(),
                missing,
                expected
            )));
        }
        acc.truncate(expected);
        Ok(acc)
    }

    /// Rebuild `failed_drive`'s share of `key`. Every surviving drive must be
    /// readable; an unreadable sibling is an error, never a zero chunk.
    pub fn reconstruct(&self, key: &str, failed_drive: &str) -> Result<()> {
        check_key(key)?;
        let target_index = self
            .drives
            .iter()
            .position(|d| d.name() == failed_drive)
            .ok_or_else(|| drive_not_found(&self.name, failed_drive))?;
        let target = &self.drives[target_index];
        let parity_index = self.parity_index(key);

        if target_index == parity_index {
            let chunks = self
                .data_drives(key)
                .into_iter()
                .map(|drive| drive.read(key))
                .collect::<Result<Vec<_>>>()?;
            let data_len = chunks.iter().map(Vec::len).sum();
            let refs: Vec<&[u8]> = chunks.iter().map(Vec::as_slice).collect();
            let block = ParityBlock::compute(&refs, data_len).encode()?;

            restore_onto(target, &parity_key(key), &block)?;
            info!("{}: recomputed parity of {} on drive {}", self.name, key, failed_drive);
            return Ok(());
        }

        let block = self.read_parity_block(key)?;
        let data_drives = self.data_drives(key);
        let missing = data_drives
            .iter()
            .position(|d| d.name() == failed_drive)
            .ok_or_else(|| drive_not_found(&self.name, failed_drive))?;

        let mut chunks: Vec<Option<Vec<u8>>> = Vec::with_capacity(data_drives.len());
        for (slot, drive) in data_drives.iter().enumerate() {
            if slot == missing {
                chunks.push(None);
            } else {
                chunks.push(Some(drive.read(key)?));
            }
        }

        let recovered = self.recover_slot(key, &block, missing, &chunks)?;
        restore_onto(target, key, &recovered)?;
        info!(
            "{}: reconstructed slot {} of {} on drive {} ({} bytes)",
            self.name,
            missing,
            key,
            failed_drive,
            recovered.len()
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::raid::tests::make_drives;
    use tempfile::TempDir;

    fn make_parity(temp: &TempDir, count: usize) -> Parity {
        Parity::new("r5", make_drives(temp, count)).unwrap()
    }

    #[test]
    fn test_slot_ranges() {
        assert_eq!(slot_ranges(6, 2), vec![0..3, 3..6]);
        assert_eq!(slot_ranges(7, 2), vec![0..4, 4..7]);
        assert_eq!(slot_ranges(5, 4), vec![0..2, 2..4, 4..5, 5..5]);
        assert_eq!(slot_ranges(0, 2), vec![0..0, 0..0]);
    }

    #[test]
    fn test_parity_block_xor() {
        let block = ParityBlock::compute(&[&b"abc"[..], &b"de"[..]], 5);
        assert_eq!(block.data_len, 5);
        assert_eq!(block.parity, vec![b'a' ^ b'd', b'b' ^ b'e', b'c']);
        assert_eq!(ParityBlock::decode(&block.encode().unwrap()).unwrap(), block);
    }

    #[test]
    fn test_parity_rotates_between_keys() {
        let temp = TempDir::new().unwrap();
        let parity = make_parity(&temp, 3);

        let indices: std::collections::HashSet<usize> =
            (0..32).map(|i| parity.parity_index(&format!("k{}", i))).collect();
        assert!(indices.len() > 1);
        assert_eq!(parity.parity_index("k1"), parity.parity_index("k1"));
    }

    #[test]
    fn test_read_excludes_parity_slot() {
        let temp = TempDir::new().unwrap();
        let parity = make_parity(&temp, 4);
        let data = b"0123456789";

        parity.write("f", data).unwrap();
        assert_eq!(parity.read("f").unwrap(), data);

        // The parity drive keeps only the parity entry for this key
        let pdrive = parity.parity_drive("f");
        assert!(!pdrive.exists("f"));
        assert!(pdrive.exists(&parity_key("f")));

        // Naively appending every readable entry would not give the value back
        let mut naive = Vec::new();
        for drive in parity.drives() {
            if let Ok(chunk) = drive.read("f") {
                naive.extend(chunk);
            }
            if let Ok(chunk) = drive.read(&parity_key("f")) {
                naive.extend(chunk);
            }
        }
        assert_ne!(naive, data);
    }

    #[test]
    fn test_reconstruct_second_chunk() {
        let temp = TempDir::new().unwrap();
        let parity = make_parity(&temp, 3);
        let data = b"abcdef";

        parity.write("x", data).unwrap();
        let holder = parity.data_drives("x")[1];
        assert_eq!(holder.read("x").unwrap(), b"def");

        holder.fail();
        let name = holder.name().to_string();
        parity.reconstruct("x", &name).unwrap();

        let holder = parity.data_drives("x")[1];
        assert!(!holder.is_failed());
        assert_eq!(holder.read("x").unwrap(), b"def");
    }

    #[test]
    fn test_reconstruct_every_data_slot() {
        let data = b"odd-length payload!";
        for count in [3, 4, 5] {
            let temp = TempDir::new().unwrap();
            let parity = make_parity(&temp, count);
            parity.write("file", data).unwrap();

            let ranges = slot_ranges(data.len(), count - 1);
            for (slot, range) in ranges.into_iter().enumerate() {
                let drive = parity.data_drives("file")[slot];
                let name = drive.name().to_string();
                std::fs::remove_dir_all(drive.location()).unwrap();
                drive.fail();

                parity.reconstruct("file", &name).unwrap();
                assert_eq!(drive.read("file").unwrap(), &data[range]);
            }
            assert_eq!(parity.read("file").unwrap(), data);
        }
    }

    #[test]
    fn test_reconstruct_parity_drive() {
        let temp = TempDir::new().unwrap();
        let parity = make_parity(&temp, 4);
        let data = b"seven b";
        parity.write("p", data).unwrap();

        let pdrive = parity.parity_drive("p");
        let name = pdrive.name().to_string();
        pdrive.fail();
        parity.reconstruct("p", &name).unwrap();

        let block = ParityBlock::decode(&pdrive.read(&parity_key("p")).unwrap()).unwrap();
        assert_eq!(block.data_len, data.len() as u64);

        let mut acc = block.parity.clone();
        for drive in parity.data_drives("p") {
            xor_into(&mut acc, &drive.read("p").unwrap());
        }
        assert!(acc.iter().all(|b| *b == 0));
    }

    #[test]
    fn test_degraded_read() {
        let temp = TempDir::new().unwrap();
        let parity = make_parity(&temp, 3);
        parity.write("x", b"abcdefg").unwrap();

        parity.data_drives("x")[0].fail();
        assert_eq!(parity.read("x").unwrap(), b"abcdefg");

        parity.parity_drive("x").fail();
        assert!(parity.read("x").unwrap_err().is_drive_failed());
    }

    #[test]
    fn test_two_failures_cannot_reconstruct() {
        let temp = TempDir::new().unwrap();
        let parity = make_parity(&temp, 4);
        parity.write("x", b"abcdefghi").unwrap();

        let data_drives = parity.data_drives("x");
        data_drives[0].fail();
        data_drives[2].fail();
        let name = data_drives[0].name().to_string();

        assert!(parity.reconstruct("x", &name).unwrap_err().is_drive_failed());
        assert!(parity.read("x").is_err());
    }

    #[test]
    fn test_parity_suffix_is_reserved() {
        let temp = TempDir::new().unwrap();
        let parity = make_parity(&temp, 3);

        for i in 0..20 {
            let key = format!("a{}", i);
            let shadow = parity_key(&key);
            parity.write(&key, b"abcdef").unwrap();

            assert!(matches!(
                parity.write(&shadow, b"zzzzzzzz"),
                Err(Error::InvalidName(_))
            ));
            assert!(matches!(parity.read(&shadow), Err(Error::InvalidName(_))));

            let holder = parity.data_drives(&key)[1];
            holder.fail();
            assert_eq!(parity.read(&key).unwrap(), b"abcdef");

            let name = holder.name().to_string();
            parity.reconstruct(&key, &name).unwrap();
            assert_eq!(holder.read(&key).unwrap(), b"def");
        }
    }

    #[test]
    fn test_reconstruct_unknown_drive_or_key() {
        let temp = TempDir::new().unwrap();
        let parity = make_parity(&temp, 3);

        assert!(matches!(
            parity.reconstruct("x", "nope"),
            Err(Error::DriveNotFound { .. })
        ));

        let data_drive = parity.data_drives("never-written")[0].name().to_string();
        assert!(parity
            .reconstruct("never-written", &data_drive)
            .unwrap_err()
            .is_not_found());
    }
}
