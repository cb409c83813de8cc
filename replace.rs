//! Write-to-temp-then-rename file replacement.
//!
//! Output is staged in a uniquely named temporary file next to the
//! destination, so the final rename never crosses filesystems. The source is
//! removed only after the destination exists under its final name. Dropping a
//! [`StagedFile`] without committing deletes the temporary file.

use crate::error::{CryptError, IoContext};
use std::path::{Path, PathBuf};
use tempfile::TempPath;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};

const TEMP_PREFIX: &str = ".ofencrypt-";
const TEMP_SUFFIX: &str = ".tmp";

pub struct StagedFile {
    file: fs::File,
    temp_path: TempPath,
}

impl StagedFile {
    /// Creates an empty temporary file inside `dir`.
    pub fn create_in(dir: &Path) -> Result<Self, CryptError> {
        let named = tempfile::Builder::new()
            .prefix(TEMP_PREFIX)
            .suffix(TEMP_SUFFIX)
            .tempfile_in(dir)
            .io_context(|| format!("creating temporary file in {}", dir.display()))?;
        let (file, temp_path) = named.into_parts();
        debug!(temp = %temp_path.display(), "staged temporary file");
        Ok(Self {
            file: fs::File::from_std(file),
            temp_path,
        })
    }

    pub fn writer(&mut self) -> &mut fs::File {
        &mut self.file
    }

    pub fn path(&self) -> &Path {
        &self.temp_path
    }

    /// Flushes the staged output, renames it to `destination` (never
    /// replacing an existing file) and then deletes `source`.
    pub async fn commit(self, destination: &Path, source: &Path) -> Result<(), CryptError> {
        let Self { mut file, temp_path } = self;

        file.flush().await.io_context(|| "flushing temporary file")?;
        file.sync_all().await.io_context(|| "syncing temporary file")?;
        drop(file);

        temp_path.persist_noclobber(destination).map_err(|e| {
            // e.path drops here and removes the temporary file
            CryptError::io(
                format!("renaming temporary file to {}", destination.display()),
                e.error,
            )
        })?;
        debug!(destination = %destination.display(), "output materialised");

        if let Err(e) = fs::remove_file(source).await {
            warn!(source = %source.display(), error = %e, "output written but source could not be removed");
            return Err(CryptError::io(
                format!("removing source {}", source.display()),
                e,
            ));
        }
        Ok(())
    }
}

/// Directory that will hold the temporary and final files for `path`.
pub fn parent_dir(path: &Path) -> PathBuf {
    match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from("."),
    }
}
