//! Password-based key derivation and the password verification hash.
//!
//! Keys come from PBKDF2-HMAC-SHA256 over (password, salt) with a fixed
//! iteration count. The verification hash is a plain SHA-256 of the raw
//! password and is stored in the container header.

use crate::error::CryptError;
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;
use zeroize::Zeroizing;

/// PBKDF2 rounds; not stored in the header, so changing it breaks old files
pub const KDF_ITERATIONS: u32 = 65_536;
pub const SALT_LEN: usize = 16;
pub const KEY_LEN: usize = 32;
pub const HASH_LEN: usize = 32;

pub type Salt = [u8; SALT_LEN];
pub type VerificationHash = [u8; HASH_LEN];

/// 256-bit AES key, wiped on drop.
pub type DerivedKey = Zeroizing<[u8; KEY_LEN]>;

pub fn derive_key(password: &str, salt: &Salt) -> DerivedKey {
    let mut key = Zeroizing::new([0u8; KEY_LEN]);
    pbkdf2::pbkdf2_hmac::<Sha256>(password.as_bytes(), salt, KDF_ITERATIONS, key.as_mut_slice());
    key
}

/// Runs [`derive_key`] on the blocking pool; 65536 rounds is long enough to stall a runtime thread.
pub async fn derive_key_blocking(password: &str, salt: Salt) -> Result<DerivedKey, CryptError> {
    let password = Zeroizing::new(password.to_owned());
    tokio::task::spawn_blocking(move || derive_key(&password, &salt))
        .await
        .map_err(|e| CryptError::io("deriving key", std::io::Error::other(e)))
}

pub fn verification_hash(password: &str) -> VerificationHash {
    Sha256::digest(password.as_bytes()).into()
}

/// Constant-time comparison of a stored hash against the supplied password.
pub fn verify_password(password: &str, stored: &[u8]) -> bool {
    let computed = verification_hash(password);
    if stored.len() != computed.len() {
        return false;
    }
    stored.ct_eq(&computed[..]).into()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_derive_is_deterministic() {
        let salt = [7u8; SALT_LEN];
        let a = derive_key("hunter2", &salt);
        let b = derive_key("hunter2", &salt);
        assert_eq!(*a, *b);
    }

    #[test]
    fn test_derive_depends_on_salt_and_password() {
        let a = derive_key("hunter2", &[1u8; SALT_LEN]);
        let b = derive_key("hunter2", &[2u8; SALT_LEN]);
        let c = derive_key("hunter3", &[1u8; SALT_LEN]);
        assert_ne!(*a, *b);
        assert_ne!(*a, *c);
    }

    #[test]
    fn test_empty_password_still_derives() {
        let key = derive_key("", &[0u8; SALT_LEN]);
        assert_ne!(*key, [0u8; KEY_LEN]);
    }

    #[test]
    fn test_verification_hash_known_answer() {
        // SHA-256("abc")
        assert_eq!(
            hex::encode(verification_hash("abc")),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn test_verify_password() {
        let stored = verification_hash("correct horse");
        assert!(verify_password("correct horse", &stored));
        assert!(!verify_password("battery staple", &stored));
        assert!(!verify_password("correct horse", &stored[..16]));

        let mut tampered = stored;
        tampered[HASH_LEN - 1] ^= 0x80;
        assert!(!verify_password("correct horse", &tampered));
    }

    #[tokio::test]
    async fn test_blocking_matches_sync() {
        let salt = [9u8; SALT_LEN];
        let a = derive_key_blocking("pw", salt).await.expect("derive");
        assert_eq!(*a, *derive_key("pw", &salt));
    }
}
