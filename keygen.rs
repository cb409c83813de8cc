//! Random material: generated passwords, salts and IVs, and key files.
//!
//! ## Security Features
//!
//! - Generated keys come from `OsRng` and are wiped on drop (via `Zeroizing`)
//! - Key files are created exclusively with Unix permissions 0600
//! - Salt/IV generation takes any `CryptoRng`, so tests can inject a seeded source

use crate::cipher::{Iv, IV_LEN};
use crate::error::{CryptError, IoContext};
use crate::kdf::{Salt, KEY_LEN, SALT_LEN};
use rand_core::{CryptoRng, OsRng, RngCore};
use std::path::Path;
use tokio::fs;
use tracing::{info, warn};
use zeroize::Zeroizing;

/// Returns a fresh 256-bit key as 64 lowercase hex characters, usable as a password.
pub fn generate_key() -> Zeroizing<String> {
    let mut key = Zeroizing::new([0u8; KEY_LEN]);
    OsRng.fill_bytes(key.as_mut_slice());
    Zeroizing::new(hex::encode(key.as_slice()))
}

pub fn fresh_salt<R: RngCore + CryptoRng>(rng: &mut R) -> Salt {
    let mut salt = [0u8; SALT_LEN];
    rng.fill_bytes(&mut salt);
    salt
}

pub fn fresh_iv<R: RngCore + CryptoRng>(rng: &mut R) -> Iv {
    let mut iv = [0u8; IV_LEN];
    rng.fill_bytes(&mut iv);
    iv
}

/// Writes `key` to a new file. Refuses to overwrite an existing one.
pub async fn save_key_file(path: &Path, key: &str) -> Result<(), CryptError> {
    if fs::try_exists(path)
        .await
        .io_context(|| format!("checking existence of {}", path.display()))?
    {
        return Err(CryptError::validation(format!(
            "key file {} already exists",
            path.display()
        )));
    }

    info!(path = %path.display(), "saving generated key");

    // Write with restrictive permissions using spawn_blocking for Unix
    #[cfg(unix)]
    {
        let path_buf = path.to_path_buf();
        let contents = Zeroizing::new(key.to_owned());
        tokio::task::spawn_blocking(move || {
            use std::fs::OpenOptions;
            use std::io::Write;
            use std::os::unix::fs::OpenOptionsExt;

            let mut f = OpenOptions::new()
                .write(true)
                .create_new(true)
                .mode(0o600)
                .open(&path_buf)?;
            f.write_all(contents.as_bytes())?;
            f.sync_all()
        })
        .await
        .map_err(|e| CryptError::io("saving key file", std::io::Error::other(e)))?
        .io_context(|| format!("writing key file {}", path.display()))?;
    }
    #[cfg(not(unix))]
    {
        fs::write(path, key.as_bytes())
            .await
            .io_context(|| format!("writing key file {}", path.display()))?;
    }

    Ok(())
}

/// Reads a password from a key file, trimming surrounding whitespace.
pub async fn load_key_file(path: &Path) -> Result<Zeroizing<String>, CryptError> {
    let raw = Zeroizing::new(
        fs::read_to_string(path)
            .await
            .io_context(|| format!("reading key file {}", path.display()))?,
    );
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        warn!(path = %path.display(), "key file is empty");
        return Err(CryptError::validation(format!(
            "key file {} is empty",
            path.display()
        )));
    }
    Ok(Zeroizing::new(trimmed.to_owned()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use tempfile::TempDir;

    #[test]
    fn test_generated_key_is_64_hex_chars() {
        let key = generate_key();
        assert_eq!(key.len(), 64);
        assert!(key.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
    }

    #[test]
    fn test_generated_keys_do_not_repeat() {
        let keys: HashSet<String> = (0..256).map(|_| generate_key().to_string()).collect();
        assert_eq!(keys.len(), 256);
    }

    #[test]
    fn test_fresh_material_uses_given_rng() {
        struct Fixed(u8);
        impl RngCore for Fixed {
            fn next_u32(&mut self) -> u32 {
                u32::from_le_bytes([self.0; 4])
            }
            fn next_u64(&mut self) -> u64 {
                u64::from_le_bytes([self.0; 8])
            }
            fn fill_bytes(&mut self, dest: &mut [u8]) {
                dest.fill(self.0);
            }
            fn try_fill_bytes(&mut self, dest: &mut [u8]) -> Result<(), rand_core::Error> {
                self.fill_bytes(dest);
                Ok(())
            }
        }
        impl CryptoRng for Fixed {}

        let mut rng = Fixed(0xAB);
        assert_eq!(fresh_salt(&mut rng), [0xAB; SALT_LEN]);
        assert_eq!(fresh_iv(&mut rng), [0xAB; IV_LEN]);
    }

    #[tokio::test]
    async fn test_key_file_round_trip() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("encryption_key.txt");
        let key = generate_key();

        save_key_file(&path, &key).await.expect("save key");
        let loaded = load_key_file(&path).await.expect("load key");
        assert_eq!(loaded.as_str(), key.as_str());

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mode = std::fs::metadata(&path).unwrap().permissions().mode();
            assert_eq!(mode & 0o777, 0o600);
        }
    }

    #[tokio::test]
    async fn test_save_refuses_overwrite() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("key.txt");
        std::fs::write(&path, "existing").unwrap();

        let err = save_key_file(&path, "new").await.unwrap_err();
        assert!(matches!(err, CryptError::Validation(_)));
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "existing");
    }

    #[tokio::test]
    async fn test_load_trims_and_rejects_empty() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("key.txt");

        std::fs::write(&path, "  secret\n").unwrap();
        assert_eq!(load_key_file(&path).await.unwrap().as_str(), "secret");

        std::fs::write(&path, "\n\t ").unwrap();
        assert!(matches!(
            load_key_file(&path).await.unwrap_err(),
            CryptError::Validation(_)
        ));
    }
}
