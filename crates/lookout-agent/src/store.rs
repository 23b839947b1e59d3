//! Atomic single-file mode store.
//!
//! The persisted record is 7 bytes: LE magic, format version, the mode byte,
//! and a checksum over everything before it. Commits go through a temp file,
//! `fsync`, atomic rename, and a parent-directory `fsync`, so a crash at any
//! point leaves either the old value or the new one - never a torn record.
//!
//! A present-but-invalid record is a fatal [`StoreError::Corrupt`], never a
//! silent default: running in the wrong mode risks an infinite notify loop
//! or an inert watch, and only an operator can know which value was intended.

use std::fs::File;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use lookout_core::store::{ModeStore, OperatingMode, StoreError};

const STORE_MAGIC: u32 = 0x4C4F_4F4B;
const STORE_VERSION: u8 = 1;
const RECORD_LEN: usize = 7;

/// Durable mode flag in a single small file.
#[derive(Debug)]
pub struct FileModeStore {
    path: PathBuf,
}

impl FileModeStore {
    /// Open the store at `path`, creating parent directories. A store that
    /// has never held a value is seeded to [`OperatingMode::Monitor`] with
    /// one durable commit.
    ///
    /// # Errors
    ///
    /// [`StoreError::Open`] when the location is unusable, or the seeding
    /// commit's error.
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|source| StoreError::Open {
                path: path.to_path_buf(),
                source,
            })?;
        }
        let store = Self {
            path: path.to_path_buf(),
        };
        if !store.path.exists() {
            store.commit(OperatingMode::Monitor)?;
        }
        Ok(store)
    }

    fn commit(&self, mode: OperatingMode) -> Result<(), StoreError> {
        self.commit_inner(mode)
            .map_err(|source| StoreError::Commit { mode, source })
    }

    fn commit_inner(&self, mode: OperatingMode) -> io::Result<()> {
        let tmp = self.path.with_extension("tmp");
        let mut file = File::create(&tmp)?;
        file.write_all(&encode(mode))?;
        file.sync_all()?;
        drop(file);
        std::fs::rename(&tmp, &self.path)?;
        // The rename itself must be on disk before we report durability.
        if let Some(parent) = self.path.parent() {
            File::open(parent)?.sync_all()?;
        }
        Ok(())
    }
}

impl ModeStore for FileModeStore {
    fn load(&mut self) -> Result<OperatingMode, StoreError> {
        let bytes = std::fs::read(&self.path).map_err(|source| StoreError::Read { source })?;
        decode(&bytes)
    }

    fn save(&mut self, mode: OperatingMode) -> Result<(), StoreError> {
        self.commit(mode)
    }
}

fn encode(mode: OperatingMode) -> [u8; RECORD_LEN] {
    let mut record = [0u8; RECORD_LEN];
    record[0..4].copy_from_slice(&STORE_MAGIC.to_le_bytes());
    record[4] = STORE_VERSION;
    record[5] = mode.as_persisted();
    record[RECORD_LEN - 1] = checksum8(&record[..RECORD_LEN - 1]);
    record
}

fn decode(bytes: &[u8]) -> Result<OperatingMode, StoreError> {
    if bytes.len() != RECORD_LEN {
        return Err(StoreError::Corrupt {
            detail: format!("expected {RECORD_LEN} bytes, found {}", bytes.len()),
        });
    }
    if u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]) != STORE_MAGIC {
        return Err(StoreError::Corrupt {
            detail: "bad magic".into(),
        });
    }
    let expected = checksum8(&bytes[..RECORD_LEN - 1]);
    if bytes[RECORD_LEN - 1] != expected {
        return Err(StoreError::Corrupt {
            detail: "checksum mismatch".into(),
        });
    }
    if bytes[4] != STORE_VERSION {
        return Err(StoreError::Corrupt {
            detail: format!("unsupported record version {}", bytes[4]),
        });
    }
    OperatingMode::from_persisted(bytes[5]).ok_or_else(|| StoreError::Corrupt {
        detail: format!("unknown mode byte {:#04x}", bytes[5]),
    })
}

fn checksum8(bytes: &[u8]) -> u8 {
    let mut acc = 0x5Au8;
    for &byte in bytes {
        acc ^= byte.rotate_left(1);
    }
    acc
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn store_path(dir: &tempfile::TempDir) -> PathBuf {
        dir.path().join("state").join("mode")
    }

    #[test]
    fn test_first_open_seeds_monitor() {
        let dir = tempfile::tempdir().unwrap();
        let path = store_path(&dir);
        let mut store = FileModeStore::open(&path).unwrap();
        assert!(path.exists());
        assert_eq!(store.load().unwrap(), OperatingMode::Monitor);
    }

    #[test]
    fn test_mode_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = store_path(&dir);

        let mut store = FileModeStore::open(&path).unwrap();
        store.save(OperatingMode::Notify).unwrap();
        drop(store);

        // Simulated reboot: a fresh handle must see the committed value,
        // not a reseeded default.
        let mut store = FileModeStore::open(&path).unwrap();
        assert_eq!(store.load().unwrap(), OperatingMode::Notify);

        store.save(OperatingMode::Monitor).unwrap();
        drop(store);
        let mut store = FileModeStore::open(&path).unwrap();
        assert_eq!(store.load().unwrap(), OperatingMode::Monitor);
    }

    #[test]
    fn test_commit_leaves_no_temp_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = store_path(&dir);
        let mut store = FileModeStore::open(&path).unwrap();
        store.save(OperatingMode::Notify).unwrap();
        assert!(!path.with_extension("tmp").exists());
    }

    #[test]
    fn test_garbage_record_is_corrupt_not_default() {
        let dir = tempfile::tempdir().unwrap();
        let path = store_path(&dir);
        let mut store = FileModeStore::open(&path).unwrap();

        std::fs::write(&path, [0xFFu8; RECORD_LEN]).unwrap();
        assert!(matches!(store.load(), Err(StoreError::Corrupt { .. })));
    }

    #[test]
    fn test_truncated_record_is_corrupt() {
        let dir = tempfile::tempdir().unwrap();
        let path = store_path(&dir);
        let mut store = FileModeStore::open(&path).unwrap();

        std::fs::write(&path, &encode(OperatingMode::Notify)[..3]).unwrap();
        assert!(matches!(store.load(), Err(StoreError::Corrupt { .. })));
    }

    #[test]
    fn test_flipped_byte_fails_checksum() {
        let dir = tempfile::tempdir().unwrap();
        let path = store_path(&dir);
        let mut store = FileModeStore::open(&path).unwrap();

        let mut record = encode(OperatingMode::Notify);
        record[5] ^= 0x10;
        std::fs::write(&path, record).unwrap();
        assert!(matches!(store.load(), Err(StoreError::Corrupt { .. })));
    }

    #[test]
    fn test_unknown_mode_byte_with_valid_checksum_is_corrupt() {
        let dir = tempfile::tempdir().unwrap();
        let path = store_path(&dir);
        let mut store = FileModeStore::open(&path).unwrap();

        let mut record = encode(OperatingMode::Monitor);
        record[5] = 7;
        record[RECORD_LEN - 1] = checksum8(&record[..RECORD_LEN - 1]);
        std::fs::write(&path, record).unwrap();

        let err = store.load().unwrap_err();
        assert!(err.to_string().contains("0x07"));
    }

    #[test]
    fn test_unsupported_version_is_corrupt() {
        let dir = tempfile::tempdir().unwrap();
        let path = store_path(&dir);
        let mut store = FileModeStore::open(&path).unwrap();

        let mut record = encode(OperatingMode::Monitor);
        record[4] = 9;
        record[RECORD_LEN - 1] = checksum8(&record[..RECORD_LEN - 1]);
        std::fs::write(&path, record).unwrap();
        assert!(matches!(store.load(), Err(StoreError::Corrupt { .. })));
    }

    #[test]
    fn test_missing_file_is_read_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = store_path(&dir);
        let mut store = FileModeStore::open(&path).unwrap();
        std::fs::remove_file(&path).unwrap();
        assert!(matches!(store.load(), Err(StoreError::Read { .. })));
    }
}
