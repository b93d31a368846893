//! Installation seed custody.
//!
//! The seed is a random 32-byte value written once per store directory,
//! in cleartext. The AES key is derived from it with HKDF, never stored.
//! Cleartext custody keeps cached data from being trivially readable by
//! casual inspection; it does not defend against an attacker who can read
//! the store directory. A platform credential store would be the stronger
//! home for the seed.

use crate::crypto::{EncryptionKey, KEY_SIZE};
use crate::error::{StoreError, StoreResult};
use rand::RngCore;
use std::fs::{self, File};
use std::io::Write;
use std::path::Path;

/// Loads the installation seed at `path`, creating it on first open,
/// and derives the cache encryption key from it.
pub(crate) fn load_or_create(path: &Path) -> StoreResult<EncryptionKey> {
    let seed = match fs::read(path) {
        Ok(bytes) => {
            if bytes.len() != KEY_SIZE {
                return Err(StoreError::Corrupted(format!(
                    "key file {} holds {} bytes, expected {KEY_SIZE}",
                    path.display(),
                    bytes.len()
                )));
            }
            bytes
        }
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            let mut seed = vec![0u8; KEY_SIZE];
            rand::thread_rng().fill_bytes(&mut seed);
            write_seed(path, &seed)?;
            seed
        }
        Err(err) => return Err(err.into()),
    };

    EncryptionKey::derive_from_seed(&seed)
}

/// Writes the seed through a temp file + rename so a crash never leaves a
/// short key file behind.
fn write_seed(path: &Path, seed: &[u8]) -> StoreResult<()> {
    let temp_path = path.with_extension("tmp");

    let mut file = File::create(&temp_path)?;
    file.write_all(seed)?;
    file.sync_all()?;
    drop(file);

    fs::rename(&temp_path, path)?;
    restrict_permissions(path)?;

    Ok(())
}

#[cfg(unix)]
fn restrict_permissions(path: &Path) -> StoreResult<()> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(0o600))?;
    Ok(())
}

#[cfg(not(unix))]
fn restrict_permissions(_path: &Path) -> StoreResult<()> {
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn first_open_creates_seed() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("key.bin");

        assert!(!path.exists());
        load_or_create(&path).unwrap();
        assert!(path.exists());
        assert_eq!(fs::read(&path).unwrap().len(), KEY_SIZE);
    }

    #[test]
    fn reopen_derives_same_key() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("key.bin");

        let key1 = load_or_create(&path).unwrap();
        let key2 = load_or_create(&path).unwrap();
        assert_eq!(key1.as_bytes(), key2.as_bytes());
    }

    #[test]
    fn short_seed_file_is_rejected() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("key.bin");
        fs::write(&path, b"too short").unwrap();

        let result = load_or_create(&path);
        assert!(matches!(result, Err(StoreError::Corrupted(_))));
    }

    #[test]
    fn seed_is_not_the_key() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("key.bin");

        let key = load_or_create(&path).unwrap();
        let seed = fs::read(&path).unwrap();
        assert_ne!(key.as_bytes().as_slice(), seed.as_slice());
    }

    #[cfg(unix)]
    #[test]
    fn seed_file_is_owner_only() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempdir().unwrap();
        let path = dir.path().join("key.bin");
        load_or_create(&path).unwrap();

        let mode = fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }
}
