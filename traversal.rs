//! Directory jobs: discover candidate files, transform them one at a time,
//! isolate per-file failures and report progress.

use crate::cipher::Direction;
use crate::engine::FileCrypter;
use crate::error::CryptError;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, info, warn};
use walkdir::WalkDir;
use zeroize::Zeroizing;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    SingleFile,
    Directory,
}

/// Receives progress and per-item failures while a job runs.
pub trait JobObserver {
    /// Called with the file about to be processed.
    fn item_started(&mut self, _path: &Path) {}

    /// Called after every item, whether it succeeded or failed.
    fn progress(&mut self, processed: usize, total: usize);

    fn item_failed(&mut self, reason: &'static str, cause: &CryptError);
}

/// Adapts a pair of closures into a [`JobObserver`].
pub struct FnObserver<P, E> {
    on_progress: P,
    on_error: E,
}

impl<P, E> FnObserver<P, E>
where
    P: FnMut(usize, usize),
    E: FnMut(&'static str, &CryptError),
{
    pub fn new(on_progress: P, on_error: E) -> Self {
        Self {
            on_progress,
            on_error,
        }
    }
}

impl<P, E> JobObserver for FnObserver<P, E>
where
    P: FnMut(usize, usize),
    E: FnMut(&'static str, &CryptError),
{
    fn progress(&mut self, processed: usize, total: usize) {
        (self.on_progress)(processed, total)
    }

    fn item_failed(&mut self, reason: &'static str, cause: &CryptError) {
        (self.on_error)(reason, cause)
    }
}

/// Observer that ignores everything.
pub struct Silent;

impl JobObserver for Silent {
    fn progress(&mut self, _processed: usize, _total: usize) {}
    fn item_failed(&mut self, _reason: &'static str, _cause: &CryptError) {}
}

#[derive(Debug, Clone)]
pub struct ItemFailure {
    pub path: PathBuf,
    pub reason: &'static str,
    pub message: String,
}

/// Outcome of a job.
#[derive(Debug, Clone, Default)]
pub struct Summary {
    pub total: usize,
    pub succeeded: usize,
    pub failures: Vec<ItemFailure>,
}

impl Summary {
    pub fn failed(&self) -> usize {
        self.failures.len()
    }

    pub fn is_success(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Result of scanning a directory tree.
#[derive(Debug, Default)]
pub struct Discovery {
    /// Candidate files in file-name order at every level.
    pub files: Vec<PathBuf>,
    /// Entries below the root that could not be read; their subtrees are skipped.
    pub unreadable: Vec<(PathBuf, CryptError)>,
}

/// Lists the files a directory job will touch, in file-name order at every level.
/// Decryption only considers files with the container extension. Failing to
/// read the root is fatal; anything deeper is collected and the walk goes on.
pub fn discover(
    crypter: &FileCrypter,
    root: &Path,
    direction: Direction,
) -> Result<Discovery, CryptError> {
    let mut found = Discovery::default();
    for entry in WalkDir::new(root).follow_links(false).sort_by_file_name() {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) if e.depth() == 0 => {
                return Err(CryptError::io(format!("scanning {}", root.display()), e.into()));
            }
            Err(e) => {
                let path = e.path().unwrap_or(root).to_path_buf();
                warn!(path = %path.display(), error = %e, "skipping unreadable entry");
                let cause = CryptError::io(format!("scanning {}", path.display()), e.into());
                found.unreadable.push((path, cause));
                continue;
            }
        };
        if !entry.file_type().is_file() {
            continue;
        }
        let path = entry.into_path();
        if direction == Direction::Decrypt && !crypter.is_container(&path) {
            continue;
        }
        found.files.push(path);
    }
    Ok(found)
}

/// Runs `direction` over every candidate under `root`, one file at a time.
/// Per-file errors go to `observer` and the summary; only losing the root
/// itself aborts the job.
pub async fn process_directory<O>(
    crypter: &FileCrypter,
    root: &Path,
    password: &str,
    direction: Direction,
    observer: &mut O,
) -> Result<Summary, CryptError>
where
    O: JobObserver + ?Sized,
{
    check_root(root, password).await?;

    let Discovery { files, unreadable } = discover(crypter, root, direction)?;
    let total = unreadable.len() + files.len();
    info!(root = %root.display(), ?direction, total, skipped = unreadable.len(), "directory job started");

    let mut summary = Summary {
        total,
        ..Summary::default()
    };

    // unreadable subtrees count as failed items
    for (index, (path, cause)) in unreadable.into_iter().enumerate() {
        observer.item_failed(cause.reason_code(), &cause);
        summary.failures.push(ItemFailure {
            path,
            reason: cause.reason_code(),
            message: cause.to_string(),
        });
        observer.progress(index + 1, total);
    }
    let offset = summary.failed();

    for (index, file) in files.iter().enumerate() {
        observer.item_started(file);

        let result = match direction {
            Direction::Encrypt => crypter.encrypt_file(file, password).await,
            Direction::Decrypt => crypter.decrypt_file(file, password).await,
        };

        match result {
            Ok(output) => {
                debug!(file = %file.display(), output = %output.display(), "item done");
                summary.succeeded += 1;
            }
            Err(e) => {
                if !fs::try_exists(root).await.unwrap_or(false) {
                    return Err(CryptError::io(
                        format!("processing {}", root.display()),
                        std::io::Error::new(
                            std::io::ErrorKind::NotFound,
                            "root directory disappeared during the job",
                        ),
                    ));
                }
                warn!(file = %file.display(), reason = e.reason_code(), error = %e, "item failed");
                observer.item_failed(e.reason_code(), &e);
                summary.failures.push(ItemFailure {
                    path: file.clone(),
                    reason: e.reason_code(),
                    message: e.to_string(),
                });
            }
        }

        observer.progress(offset + index + 1, total);
    }

    info!(
        root = %root.display(),
        total,
        succeeded = summary.succeeded,
        failed = summary.failed(),
        "directory job finished"
    );
    Ok(summary)
}

pub async fn encrypt_directory<O>(
    crypter: &FileCrypter,
    root: &Path,
    password: &str,
    observer: &mut O,
) -> Result<Summary, CryptError>
where
    O: JobObserver + ?Sized,
{
    process_directory(crypter, root, password, Direction::Encrypt, observer).await
}

pub async fn decrypt_directory<O>(
    crypter: &FileCrypter,
    root: &Path,
    password: &str,
    observer: &mut O,
) -> Result<Summary, CryptError>
where
    O: JobObserver + ?Sized,
{
    process_directory(crypter, root, password, Direction::Decrypt, observer).await
}

async fn check_root(root: &Path, password: &str) -> Result<(), CryptError> {
    if root.as_os_str().is_empty() {
        return Err(CryptError::validation("path is empty"));
    }
    if password.is_empty() {
        return Err(CryptError::validation("password is empty"));
    }
    match fs::metadata(root).await {
        Ok(meta) if meta.is_dir() => Ok(()),
        Ok(_) => Err(CryptError::validation(format!(
            "{} is not a directory",
            root.display()
        ))),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(CryptError::validation(
            format!("{} does not exist", root.display()),
        )),
        Err(e) => Err(CryptError::io(format!("inspecting {}", root.display()), e)),
    }
}

/// One user-initiated operation: what to process, how, and with which password.
pub struct ProcessingJob {
    pub path: PathBuf,
    pub mode: Mode,
    pub direction: Direction,
    password: Zeroizing<String>,
}

impl ProcessingJob {
    pub fn new(
        path: impl Into<PathBuf>,
        mode: Mode,
        direction: Direction,
        password: impl Into<String>,
    ) -> Self {
        Self {
            path: path.into(),
            mode,
            direction,
            password: Zeroizing::new(password.into()),
        }
    }

    /// Validates the job and runs it to completion. A single-file job
    /// returns its error directly; a directory job records item errors in the
    /// summary.
    pub async fn run<O>(self, crypter: &FileCrypter, observer: &mut O) -> Result<Summary, CryptError>
    where
        O: JobObserver + ?Sized,
    {
        if self.path.as_os_str().is_empty() {
            return Err(CryptError::validation("path is empty"));
        }
        if self.password.is_empty() {
            return Err(CryptError::validation("password is empty"));
        }
        let meta = fs::metadata(&self.path).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                CryptError::validation(format!("{} does not exist", self.path.display()))
            } else {
                CryptError::io(format!("inspecting {}", self.path.display()), e)
            }
        })?;

        match self.mode {
            Mode::SingleFile => {
                if !meta.is_file() {
                    return Err(CryptError::validation(format!(
                        "{} is not a file; use directory mode",
                        self.path.display()
                    )));
                }
                if self.direction == Direction::Decrypt && !crypter.is_container(&self.path) {
                    return Err(CryptError::validation(format!(
                        "{} does not have the .{} extension",
                        self.path.display(),
                        crypter.extension()
                    )));
                }
                observer.item_started(&self.path);
                match self.direction {
                    Direction::Encrypt => crypter.encrypt_file(&self.path, &self.password).await?,
                    Direction::Decrypt => crypter.decrypt_file(&self.path, &self.password).await?,
                };
                observer.progress(1, 1);
                Ok(Summary {
                    total: 1,
                    succeeded: 1,
                    failures: Vec::new(),
                })
            }
            Mode::Directory => {
                if !meta.is_dir() {
                    return Err(CryptError::validation(format!(
                        "{} is not a directory; use single-file mode",
                        self.path.display()
                    )));
                }
                process_directory(crypter, &self.path, &self.password, self.direction, observer).await
            }
        }
    }
}
