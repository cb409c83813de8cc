//! On-disk container format.
//!
//! ```text
//! [len:1][program id]
//! [len:1][SHA-256(password):32]
//! [len:1][salt:16]
//! [len:1][iv:16]
//! [len:1][filename blob: salt:16 ‖ iv:16 ‖ AES-CBC(name)]
//! [AES-256-CBC(body) ... until EOF]
//! ```
//!
//! Every header field carries a one-byte length prefix, which caps it at 255
//! bytes. The filename blob is keyed from its own salt/IV pair.

use crate::cipher::{self, Iv, StreamCipher, BLOCK_SIZE, IV_LEN};
use crate::error::CryptError;
use crate::kdf::{self, DerivedKey, Salt, VerificationHash, HASH_LEN, SALT_LEN};
use crate::keygen;
use rand_core::{CryptoRng, RngCore};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::debug;
use zeroize::Zeroizing;

/// Identifies files produced by this tool
pub const PROGRAM_ID: &[u8] = b"OpenFileEncryptor";

pub const MAX_FIELD_LEN: usize = u8::MAX as usize;

/// Longest filename (in UTF-8 bytes) whose encrypted blob still fits a header field
pub const MAX_NAME_LEN: usize = (MAX_FIELD_LEN - SALT_LEN - IV_LEN) / BLOCK_SIZE * BLOCK_SIZE - 1;

/// Parsed header of a container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerHeader {
    pub verification_hash: VerificationHash,
    pub salt: Salt,
    pub iv: Iv,
    pub name_blob: Vec<u8>,
}

impl ContainerHeader {
    /// Builds a header for `original_name`. `name_salt`/`name_iv` key the
    /// filename blob and must differ from the body's `salt`/`iv`.
    pub fn new(
        password: &str,
        original_name: &str,
        salt: Salt,
        iv: Iv,
        name_salt: Salt,
        name_iv: Iv,
    ) -> Result<Self, CryptError> {
        if original_name.is_empty() {
            return Err(CryptError::validation("original filename is empty"));
        }
        if original_name.len() > MAX_NAME_LEN {
            return Err(CryptError::validation(format!(
                "filename is {} bytes, the container format allows at most {}",
                original_name.len(),
                MAX_NAME_LEN
            )));
        }

        let name_blob = cipher::encrypt_string(original_name, password, name_salt, name_iv);
        debug_assert!(name_blob.len() <= MAX_FIELD_LEN);

        Ok(Self {
            verification_hash: kdf::verification_hash(password),
            salt,
            iv,
            name_blob,
        })
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let fields: [&[u8]; 5] = [
            PROGRAM_ID,
            &self.verification_hash,
            &self.salt,
            &self.iv,
            &self.name_blob,
        ];
        let mut out = Vec::with_capacity(fields.iter().map(|f| f.len() + 1).sum());
        for field in fields {
            // lengths are bounded by construction
            out.push(field.len() as u8);
            out.extend_from_slice(field);
        }
        out
    }

    pub async fn write_to<W>(&self, writer: &mut W) -> Result<(), CryptError>
    where
        W: AsyncWrite + Unpin,
    {
        if self.name_blob.len() > MAX_FIELD_LEN {
            return Err(CryptError::validation("filename blob exceeds 255 bytes"));
        }
        writer
            .write_all(&self.to_bytes())
            .await
            .map_err(|e| CryptError::io("writing container header", e))
    }

    /// Reads the header fields in order. Fails with [`CryptError::Format`]
    /// as soon as the program id does not match.
    pub async fn read_from<R>(reader: &mut R) -> Result<Self, CryptError>
    where
        R: AsyncRead + Unpin,
    {
        let marker = read_field(reader, "program id").await?;
        if marker != PROGRAM_ID {
            return Err(CryptError::format("the file was not encrypted with this program"));
        }

        let verification_hash = read_fixed::<_, HASH_LEN>(reader, "password hash").await?;
        let salt = read_fixed::<_, SALT_LEN>(reader, "salt").await?;
        let iv = read_fixed::<_, IV_LEN>(reader, "iv").await?;
        let name_blob = read_field(reader, "filename").await?;

        Ok(Self {
            verification_hash,
            salt,
            iv,
            name_blob,
        })
    }

    pub fn authenticate(&self, password: &str) -> Result<(), CryptError> {
        if kdf::verify_password(password, &self.verification_hash) {
            Ok(())
        } else {
            Err(CryptError::Authentication)
        }
    }

    /// Decrypts the stored filename. The result is a bare file name.
    pub fn original_name(&self, password: &str) -> Result<String, CryptError> {
        let name = cipher::decrypt_string(&self.name_blob, password)?;
        if name.is_empty()
            || name == "."
            || name == ".."
            || name.contains('/')
            || name.contains('\\')
            || name.contains('\0')
        {
            return Err(CryptError::format(format!(
                "stored filename {:?} is not a plain file name",
                name
            )));
        }
        Ok(name)
    }
}

async fn read_field<R>(reader: &mut R, what: &str) -> Result<Vec<u8>, CryptError>
where
    R: AsyncRead + Unpin,
{
    let len = reader.read_u8().await.map_err(|e| header_read_error(e, what))?;
    let mut buf = vec![0u8; len as usize];
    reader
        .read_exact(&mut buf)
        .await
        .map_err(|e| header_read_error(e, what))?;
    Ok(buf)
}

async fn read_fixed<R, const N: usize>(reader: &mut R, what: &str) -> Result<[u8; N], CryptError>
where
    R: AsyncRead + Unpin,
{
    let field = read_field(reader, what).await?;
    field.as_slice().try_into().map_err(|_| {
        CryptError::format(format!(
            "header field {} is {} bytes, expected {}",
            what,
            field.len(),
            N
        ))
    })
}

fn header_read_error(err: std::io::Error, what: &str) -> CryptError {
    if err.kind() == std::io::ErrorKind::UnexpectedEof {
        CryptError::format(format!("header truncated while reading {}", what))
    } else {
        CryptError::io(format!("reading header field {}", what), err)
    }
}

/// Writes a complete container for the plaintext in `reader`.
/// Returns the number of plaintext bytes encrypted.
pub async fn seal<R, W, G>(
    stream: &StreamCipher,
    reader: &mut R,
    writer: &mut W,
    password: &str,
    original_name: &str,
    rng: &mut G,
) -> Result<u64, CryptError>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
    G: RngCore + CryptoRng,
{
    let salt = keygen::fresh_salt(rng);
    let iv = keygen::fresh_iv(rng);
    let name_salt = keygen::fresh_salt(rng);
    let name_iv = keygen::fresh_iv(rng);

    let header = {
        let password = Zeroizing::new(password.to_owned());
        let name = original_name.to_owned();
        tokio::task::spawn_blocking(move || {
            ContainerHeader::new(&password, &name, salt, iv, name_salt, name_iv)
        })
        .await
        .map_err(|e| CryptError::io("encrypting filename", std::io::Error::other(e)))??
    };
    let key = kdf::derive_key_blocking(password, salt).await?;

    header.write_to(writer).await?;
    let consumed = stream.encrypt_stream(&key, &iv, reader, writer).await?;
    debug!(bytes = consumed, "container sealed");
    Ok(consumed)
}

/// A container whose header passed authentication, ready for body decryption.
pub struct OpenedContainer {
    pub header: ContainerHeader,
    pub original_name: String,
    key: DerivedKey,
}

impl OpenedContainer {
    /// Streams the remaining ciphertext from `reader` as plaintext into `writer`.
    pub async fn decrypt_body<R, W>(
        &self,
        stream: &StreamCipher,
        reader: &mut R,
        writer: &mut W,
    ) -> Result<u64, CryptError>
    where
        R: AsyncRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        stream
            .decrypt_stream(&self.key, &self.header.iv, reader, writer)
            .await
    }
}

/// Reads and checks the header: program id, then password hash, then the
/// filename. No key is derived unless the first two checks pass.
pub async fn open<R>(reader: &mut R, password: &str) -> Result<OpenedContainer, CryptError>
where
    R: AsyncRead + Unpin,
{
    let header = ContainerHeader::read_from(reader).await?;
    header.authenticate(password)?;

    let owned = Zeroizing::new(password.to_owned());
    let (header, original_name) = tokio::task::spawn_blocking(move || {
        let name = header.original_name(&owned);
        (header, name)
    })
    .await
    .map_err(|e| CryptError::io("decrypting filename", std::io::Error::other(e)))?;
    let original_name = original_name?;

    let key = kdf::derive_key_blocking(password, header.salt).await?;
    Ok(OpenedContainer {
        header,
        original_name,
        key,
    })
}
