use anyhow::Result;
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

use ofencrypt::{
    cipher, config, container, engine::FileCrypter, kdf, traversal, CryptError, Direction, Mode,
    ProcessingJob,
};

fn entries(dir: &Path) -> Vec<PathBuf> {
    let mut out: Vec<_> = fs::read_dir(dir)
        .unwrap()
        .map(|e| e.unwrap().path())
        .collect();
    out.sort();
    out
}

#[tokio::test]
async fn file_round_trip_restores_bytes_and_name() -> Result<()> {
    let tmp = TempDir::new()?;
    let path = tmp.path().join("holiday photo.jpg");
    let data: Vec<u8> = (0..5000u32).map(|i| (i % 256) as u8).collect();
    fs::write(&path, &data)?;

    let crypter = FileCrypter::default();
    let container = crypter.encrypt_file(&path, "s3cret").await?;

    // container name reveals nothing about the original
    let container_name = container.file_name().unwrap().to_string_lossy().into_owned();
    assert!(container_name.ends_with(".encrypted"));
    assert!(!container_name.contains("holiday"));
    assert_ne!(fs::read(&container)?, data);

    let restored = crypter.decrypt_file(&container, "s3cret").await?;
    assert_eq!(restored.file_name().unwrap(), "holiday photo.jpg");
    assert_eq!(fs::read(&restored)?, data);
    assert_eq!(entries(tmp.path()), vec![restored]);
    Ok(())
}

#[tokio::test]
async fn empty_file_round_trip() -> Result<()> {
    let tmp = TempDir::new()?;
    let path = tmp.path().join("empty");
    fs::write(&path, b"")?;

    let crypter = FileCrypter::default();
    let container = crypter.encrypt_file(&path, "pw").await?;
    let restored = crypter.decrypt_file(&container, "pw").await?;
    assert_eq!(fs::read(restored)?, b"");
    Ok(())
}

#[tokio::test]
async fn wrong_password_is_authentication_error_without_output() -> Result<()> {
    let tmp = TempDir::new()?;
    let path = tmp.path().join("plans.txt");
    fs::write(&path, b"world domination")?;

    let crypter = FileCrypter::default();
    let container = crypter.encrypt_file(&path, "P").await?;
    let before = fs::read(&container)?;

    let err = crypter.decrypt_file(&container, "P2").await.unwrap_err();
    assert!(matches!(err, CryptError::Authentication));
    assert_eq!(err.reason_code(), "authentication_failed");
    assert_eq!(fs::read(&container)?, before);
    assert_eq!(entries(tmp.path()), vec![container]);
    Ok(())
}

#[tokio::test]
async fn foreign_file_is_format_error() -> Result<()> {
    let tmp = TempDir::new()?;
    let path = tmp.path().join("notes.encrypted");
    fs::write(&path, b"\x10not a container at all, just text")?;

    let err = FileCrypter::default()
        .decrypt_file(&path, "pw")
        .await
        .unwrap_err();
    assert!(matches!(err, CryptError::Format(_)));
    assert_eq!(fs::read(&path)?, b"\x10not a container at all, just text");
    assert_eq!(entries(tmp.path()), vec![path]);
    Ok(())
}

#[tokio::test]
async fn corrupted_body_is_padding_error() -> Result<()> {
    let tmp = TempDir::new()?;
    let path = tmp.path().join("data.bin");
    fs::write(&path, vec![7u8; 100])?;

    let crypter = FileCrypter::default();
    let container = crypter.encrypt_file(&path, "pw").await?;
    let mut raw = fs::read(&container)?;
    raw.truncate(raw.len() - 5);
    fs::write(&container, &raw)?;

    let err = crypter.decrypt_file(&container, "pw").await.unwrap_err();
    assert!(matches!(err, CryptError::Padding(_)));
    // no temporary or partial output left behind
    assert_eq!(entries(tmp.path()), vec![container.clone()]);
    assert_eq!(fs::read(&container)?, raw);
    Ok(())
}

#[cfg(unix)]
#[tokio::test]
async fn read_only_directory_preserves_source() -> Result<()> {
    use std::os::unix::fs::PermissionsExt;

    let tmp = TempDir::new()?;
    let dir = tmp.path().join("locked");
    fs::create_dir(&dir)?;
    let path = dir.join("keep.txt");
    fs::write(&path, b"original bytes")?;
    fs::set_permissions(&dir, fs::Permissions::from_mode(0o555))?;

    // privileged users ignore directory permissions; nothing to test then
    let canary = dir.join("canary");
    if fs::write(&canary, b"").is_ok() {
        fs::remove_file(&canary)?;
        fs::set_permissions(&dir, fs::Permissions::from_mode(0o755))?;
        return Ok(());
    }

    let result = FileCrypter::default().encrypt_file(&path, "pw").await;
    fs::set_permissions(&dir, fs::Permissions::from_mode(0o755))?;

    let err = result.unwrap_err();
    assert!(matches!(err, CryptError::Io { .. }));
    assert_eq!(fs::read(&path)?, b"original bytes");
    assert_eq!(entries(&dir), vec![path]);
    Ok(())
}

#[tokio::test]
async fn directory_partial_failure_is_isolated() -> Result<()> {
    let tmp = TempDir::new()?;
    let root = tmp.path().join("docs");
    fs::create_dir_all(root.join("nested"))?;
    fs::write(root.join("one.txt"), b"one")?;
    fs::write(root.join("two.txt"), b"two")?;
    fs::write(root.join("nested/three.txt"), b"three")?;

    let crypter = FileCrypter::default();
    let summary = traversal::encrypt_directory(&crypter, &root, "pw", &mut traversal::Silent).await?;
    assert_eq!((summary.total, summary.succeeded, summary.failed()), (3, 3, 0));

    // corrupt the container in the nested directory
    let corrupted = entries(&root.join("nested")).pop().unwrap();
    let mut raw = fs::read(&corrupted)?;
    let last = raw.len() - 1;
    raw.truncate(last);
    fs::write(&corrupted, &raw)?;

    let mut progress = Vec::new();
    let mut failures = Vec::new();
    let mut observer = traversal::FnObserver::new(
        |processed, total| progress.push((processed, total)),
        |reason, _cause: &CryptError| failures.push(reason),
    );
    let summary = traversal::decrypt_directory(&crypter, &root, "pw", &mut observer).await?;
    drop(observer);

    assert_eq!(summary.total, 3);
    assert_eq!(summary.succeeded, 2);
    assert_eq!(summary.failed(), 1);
    assert_eq!(summary.failures[0].path, corrupted);
    assert_eq!(progress, vec![(1, 3), (2, 3), (3, 3)]);
    assert_eq!(failures, vec!["padding_error"]);

    assert_eq!(fs::read(root.join("one.txt"))?, b"one");
    assert_eq!(fs::read(root.join("two.txt"))?, b"two");
    assert_eq!(fs::read(&corrupted)?, raw);
    assert!(!root.join("nested/three.txt").exists());
    Ok(())
}

#[tokio::test]
async fn directory_job_round_trip_via_processing_job() -> Result<()> {
    let tmp = TempDir::new()?;
    let root = tmp.path();
    fs::write(root.join("a.txt"), b"alpha")?;
    fs::write(root.join("b.txt"), b"beta")?;

    let crypter = FileCrypter::new(&config::Config::new("locked", 8192));
    let summary = ProcessingJob::new(root, Mode::Directory, Direction::Encrypt, "pw")
        .run(&crypter, &mut traversal::Silent)
        .await?;
    assert!(summary.is_success());
    assert!(entries(root).iter().all(|p| crypter.is_container(p)));

    // unrelated file is skipped when decrypting
    fs::write(root.join("readme.md"), b"hello")?;
    let summary = ProcessingJob::new(root, Mode::Directory, Direction::Decrypt, "pw")
        .run(&crypter, &mut traversal::Silent)
        .await?;
    assert_eq!(summary.total, 2);
    assert!(summary.is_success());

    assert_eq!(
        entries(root),
        vec![root.join("a.txt"), root.join("b.txt"), root.join("readme.md")]
    );
    assert_eq!(fs::read(root.join("a.txt"))?, b"alpha");
    Ok(())
}

#[tokio::test]
async fn large_file_matches_whole_buffer_encryption() -> Result<()> {
    let tmp = TempDir::new()?;
    let path = tmp.path().join("big.bin");
    let data: Vec<u8> = (0..(1024 * 1024 + 13)).map(|i: usize| (i * 7 % 253) as u8).collect();
    fs::write(&path, &data)?;

    let crypter = FileCrypter::default();
    let container_path = crypter.encrypt_file(&path, "pw").await?;
    let raw = fs::read(&container_path)?;

    let header = container::ContainerHeader::read_from(&mut std::io::Cursor::new(raw.clone())).await?;
    let header_len = header.to_bytes().len();
    let key = kdf::derive_key("pw", &header.salt);
    assert_eq!(&raw[header_len..], cipher::encrypt_buffer(&key, &header.iv, &data).as_slice());

    let restored = crypter.decrypt_file(&container_path, "pw").await?;
    assert_eq!(fs::read(restored)?, data);
    Ok(())
}

#[test]
fn generated_keys_are_hex_and_unique() {
    let a = ofencrypt::generate_key();
    let b = ofencrypt::generate_key();
    assert_eq!(a.len(), 64);
    assert!(a.chars().all(|c| c.is_ascii_hexdigit()));
    assert_ne!(a.as_str(), b.as_str());
}
