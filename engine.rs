//! Single-file encryption and decryption.
//!
//! This module provides [`FileCrypter`], which turns a file into a container
//! next to it (and back), replacing the source atomically.
//!
//! ## Naming
//!
//! - Encryption writes `<random uuid>.<extension>`; the original name lives
//!   only inside the encrypted header.
//! - Decryption restores the original name in the container's directory and
//!   never overwrites an existing file.

use crate::cipher::StreamCipher;
use crate::config::Config;
use crate::container;
use crate::error::{CryptError, IoContext};
use crate::replace::{parent_dir, StagedFile};
use rand_core::{CryptoRng, OsRng, RngCore};
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::BufReader;
use tracing::{debug, error, info};
use uuid::Uuid;

pub struct FileCrypter {
    stream: StreamCipher,
    extension: String,
}

impl Default for FileCrypter {
    fn default() -> Self {
        Self::new(&Config::default())
    }
}

impl FileCrypter {
    pub fn new(config: &Config) -> Self {
        Self {
            stream: StreamCipher::new(config.chunk_size),
            extension: config.extension.trim().to_string(),
        }
    }

    pub fn extension(&self) -> &str {
        &self.extension
    }

    /// Whether `path` carries the container extension.
    pub fn is_container(&self, path: &Path) -> bool {
        path.extension().and_then(|e| e.to_str()) == Some(self.extension.as_str())
    }

    /// Encrypts `path` in place. Returns the path of the new container.
    pub async fn encrypt_file(&self, path: &Path, password: &str) -> Result<PathBuf, CryptError> {
        self.encrypt_file_with_rng(path, password, &mut OsRng).await
    }

    /// As [`encrypt_file`](Self::encrypt_file), drawing salts and IVs from `rng`.
    pub async fn encrypt_file_with_rng<G>(
        &self,
        path: &Path,
        password: &str,
        rng: &mut G,
    ) -> Result<PathBuf, CryptError>
    where
        G: RngCore + CryptoRng,
    {
        check_inputs(path, password).await?;
        let original_name = path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| {
                CryptError::validation(format!("{} has no UTF-8 file name", path.display()))
            })?;
        debug!(file = %path.display(), "encrypting file");

        let dir = parent_dir(path);
        let destination = dir.join(format!("{}.{}", Uuid::new_v4(), self.extension));

        let mut source = fs::File::open(path)
            .await
            .io_context(|| format!("opening {}", path.display()))?;
        let mut staged = StagedFile::create_in(&dir)?;

        let result = container::seal(
            &self.stream,
            &mut source,
            staged.writer(),
            password,
            original_name,
            rng,
        )
        .await;
        let bytes = match result {
            Ok(bytes) => bytes,
            Err(e) => {
                error!(file = %path.display(), error = %e, "encryption failed");
                return Err(e);
            }
        };
        drop(source);

        staged.commit(&destination, path).await?;
        info!(
            file = %path.display(),
            container = %destination.display(),
            bytes,
            "file encrypted successfully"
        );
        Ok(destination)
    }

    /// Decrypts the container at `path` in place. Returns the restored path.
    pub async fn decrypt_file(&self, path: &Path, password: &str) -> Result<PathBuf, CryptError> {
        check_inputs(path, password).await?;
        debug!(file = %path.display(), "decrypting file");

        let file = fs::File::open(path)
            .await
            .io_context(|| format!("opening {}", path.display()))?;
        let mut reader = BufReader::new(file);

        let opened = match container::open(&mut reader, password).await {
            Ok(opened) => opened,
            Err(e) => {
                error!(file = %path.display(), error = %e, "container rejected");
                return Err(e);
            }
        };

        let dir = parent_dir(path);
        let destination = dir.join(&opened.original_name);
        if fs::try_exists(&destination)
            .await
            .io_context(|| format!("checking {}", destination.display()))?
        {
            return Err(CryptError::io(
                format!("restoring {}", destination.display()),
                std::io::Error::new(std::io::ErrorKind::AlreadyExists, "destination already exists"),
            ));
        }

        let mut staged = StagedFile::create_in(&dir)?;
        let bytes = match opened
            .decrypt_body(&self.stream, &mut reader, staged.writer())
            .await
        {
            Ok(bytes) => bytes,
            Err(e) => {
                error!(file = %path.display(), error = %e, "decryption failed");
                return Err(e);
            }
        };
        drop(reader);

        staged.commit(&destination, path).await?;
        info!(
            file = %path.display(),
            restored = %destination.display(),
            bytes,
            "file decrypted successfully"
        );
        Ok(destination)
    }
}

async fn check_inputs(path: &Path, password: &str) -> Result<(), CryptError> {
    if path.as_os_str().is_empty() {
        return Err(CryptError::validation("path is empty"));
    }
    if password.is_empty() {
        return Err(CryptError::validation("password is empty"));
    }
    match fs::metadata(path).await {
        Ok(meta) if meta.is_file() => Ok(()),
        Ok(_) => Err(CryptError::validation(format!(
            "{} is not a regular file",
            path.display()
        ))),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(CryptError::validation(
            format!("{} does not exist", path.display()),
        )),
        Err(e) => Err(CryptError::io(format!("inspecting {}", path.display()), e)),
    }
}
