//! # ofencrypt - Password-based file and directory encryption
//!
//! ofencrypt turns a file into a self-describing container (AES-256-CBC,
//! PBKDF2-HMAC-SHA256 keys) and back, or does the same for every file under a
//! directory.
//!
//! ## Features
//!
//! - **Fail-fast header**: program id and a password hash are checked before
//!   any ciphertext is touched
//! - **Hidden names**: the original filename is stored encrypted; containers
//!   are named `<uuid>.encrypted`
//! - **Streaming**: bodies are processed in 4 KiB chunks regardless of size
//! - **Atomic replacement**: output is staged in a temporary file and the
//!   source is removed only after the rename succeeds
//! - **Directory jobs**: per-file failures are isolated and reported
//!
//! ## Quick Start
//!
//! ```no_run
//! use ofencrypt::{engine::FileCrypter, traversal::{self, Silent}};
//! use std::path::Path;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let crypter = FileCrypter::default();
//!
//!     let container = crypter.encrypt_file(Path::new("secret.txt"), "password").await?;
//!     crypter.decrypt_file(&container, "password").await?;
//!
//!     let summary =
//!         traversal::encrypt_directory(&crypter, Path::new("./docs"), "password", &mut Silent).await?;
//!     println!("{} of {} files encrypted", summary.succeeded, summary.total);
//!     Ok(())
//! }
//! ```

pub mod cipher;
pub mod config;
pub mod container;
pub mod engine;
pub mod error;
pub mod kdf;
pub mod keygen;
pub mod replace;
pub mod traversal;

// Re-export common types for convenience
pub use cipher::Direction;
pub use error::CryptError;
pub use keygen::generate_key;
pub use traversal::{JobObserver, Mode, ProcessingJob, Summary};
