//! AES-256-CBC streaming encryption and decryption.
//!
//! This module provides [`StreamCipher`] for transforming file bodies in
//! fixed-size chunks, and [`CbcContext`], the running cipher state that
//! carries the chaining block and any partial block between chunks.
//!
//! ## Padding
//!
//! PKCS#7: the final block is always padded, so a plaintext that is an exact
//! multiple of 16 bytes gains one full block of `0x10` bytes.
//!
//! ## Short strings
//!
//! [`encrypt_string`] produces a self-contained blob `salt ‖ IV ‖ ciphertext`
//! keyed from the password, used for the original filename in the header.

use crate::error::{CryptError, IoContext};
use crate::kdf::{self, Salt, KEY_LEN, SALT_LEN};
use aes::cipher::{BlockDecrypt, BlockEncrypt, KeyInit};
use aes::{Aes256Dec, Aes256Enc, Block as AesBlock};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

pub const BLOCK_SIZE: usize = 16;
pub const IV_LEN: usize = 16;

/// Bytes read from the source per iteration
pub const DEFAULT_CHUNK_SIZE: usize = 4096;

pub type Iv = [u8; IV_LEN];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Encrypt,
    Decrypt,
}

enum BlockCore {
    Enc(Aes256Enc),
    Dec(Aes256Dec),
}

/// Running CBC state. Feed input with [`update`](Self::update), then call
/// [`finalize`](Self::finalize) exactly once.
pub struct CbcContext {
    core: BlockCore,
    chain: [u8; BLOCK_SIZE],
    pending: Vec<u8>,
}

impl CbcContext {
    pub fn new(direction: Direction, key: &[u8; KEY_LEN], iv: &Iv) -> Self {
        let core = match direction {
            Direction::Encrypt => BlockCore::Enc(Aes256Enc::new(key.into())),
            Direction::Decrypt => BlockCore::Dec(Aes256Dec::new(key.into())),
        };
        Self {
            core,
            chain: *iv,
            pending: Vec::with_capacity(BLOCK_SIZE * 2),
        }
    }

    /// Appends transformed output for every block that is complete and not
    /// the last one needed for finalisation.
    pub fn update(&mut self, input: &[u8], out: &mut Vec<u8>) {
        self.pending.extend_from_slice(input);

        let ready = if self.is_decrypting() {
            // the final ciphertext block holds the padding, keep it back
            self.pending.len().saturating_sub(1) / BLOCK_SIZE
        } else {
            self.pending.len() / BLOCK_SIZE
        };
        if ready == 0 {
            return;
        }

        let take = ready * BLOCK_SIZE;
        out.reserve(take);
        let mut block = [0u8; BLOCK_SIZE];
        for i in 0..ready {
            block.copy_from_slice(&self.pending[i * BLOCK_SIZE..(i + 1) * BLOCK_SIZE]);
            out.extend_from_slice(&self.process_block(&block));
        }
        self.pending.drain(..take);
    }

    /// Emits the final block: padded on encryption, unpadded on decryption.
    pub fn finalize(mut self, out: &mut Vec<u8>) -> Result<(), CryptError> {
        if self.is_decrypting() {
            self.unpad_final(out)
        } else {
            self.pad_final(out);
            Ok(())
        }
    }

    fn pad_final(&mut self, out: &mut Vec<u8>) {
        let used = self.pending.len();
        let pad = (BLOCK_SIZE - used) as u8;
        let mut block = [pad; BLOCK_SIZE];
        block[..used].copy_from_slice(&self.pending);
        out.extend_from_slice(&self.process_block(&block));
        self.pending.clear();
    }

    fn unpad_final(&mut self, out: &mut Vec<u8>) -> Result<(), CryptError> {
        if self.pending.len() != BLOCK_SIZE {
            return Err(CryptError::padding(format!(
                "ciphertext length is not a positive multiple of {} bytes",
                BLOCK_SIZE
            )));
        }
        let mut block = [0u8; BLOCK_SIZE];
        block.copy_from_slice(&self.pending);
        let plain = self.process_block(&block);

        let pad = plain[BLOCK_SIZE - 1] as usize;
        if pad == 0
            || pad > BLOCK_SIZE
            || plain[BLOCK_SIZE - pad..].iter().any(|&b| b as usize != pad)
        {
            return Err(CryptError::padding("invalid padding in final block"));
        }
        out.extend_from_slice(&plain[..BLOCK_SIZE - pad]);
        Ok(())
    }

    fn is_decrypting(&self) -> bool {
        matches!(self.core, BlockCore::Dec(_))
    }

    fn process_block(&mut self, input: &[u8; BLOCK_SIZE]) -> [u8; BLOCK_SIZE] {
        let mut output = [0u8; BLOCK_SIZE];
        match &self.core {
            BlockCore::Enc(aes) => {
                let mut block = AesBlock::from(xor(input, &self.chain));
                aes.encrypt_block(&mut block);
                output.copy_from_slice(block.as_slice());
                self.chain = output;
            }
            BlockCore::Dec(aes) => {
                let mut block = AesBlock::from(*input);
                aes.decrypt_block(&mut block);
                let mut decrypted = [0u8; BLOCK_SIZE];
                decrypted.copy_from_slice(block.as_slice());
                output = xor(&decrypted, &self.chain);
                self.chain = *input;
            }
        }
        output
    }
}

fn xor(a: &[u8; BLOCK_SIZE], b: &[u8; BLOCK_SIZE]) -> [u8; BLOCK_SIZE] {
    let mut out = [0u8; BLOCK_SIZE];
    for (o, (x, y)) in out.iter_mut().zip(a.iter().zip(b.iter())) {
        *o = x ^ y;
    }
    out
}

/// Whole-buffer encryption.
pub fn encrypt_buffer(key: &[u8; KEY_LEN], iv: &Iv, plaintext: &[u8]) -> Vec<u8> {
    let mut ctx = CbcContext::new(Direction::Encrypt, key, iv);
    let mut out = Vec::with_capacity(plaintext.len() + BLOCK_SIZE);
    ctx.update(plaintext, &mut out);
    ctx.pad_final(&mut out);
    out
}

/// Whole-buffer decryption.
pub fn decrypt_buffer(key: &[u8; KEY_LEN], iv: &Iv, ciphertext: &[u8]) -> Result<Vec<u8>, CryptError> {
    let mut ctx = CbcContext::new(Direction::Decrypt, key, iv);
    let mut out = Vec::with_capacity(ciphertext.len());
    ctx.update(ciphertext, &mut out);
    ctx.finalize(&mut out)?;
    Ok(out)
}

/// Encrypts a short string into `salt ‖ IV ‖ ciphertext` under a key derived
/// from `password` and `salt`.
pub fn encrypt_string(text: &str, password: &str, salt: Salt, iv: Iv) -> Vec<u8> {
    let key = kdf::derive_key(password, &salt);
    let ciphertext = encrypt_buffer(&key, &iv, text.as_bytes());

    let mut blob = Vec::with_capacity(SALT_LEN + IV_LEN + ciphertext.len());
    blob.extend_from_slice(&salt);
    blob.extend_from_slice(&iv);
    blob.extend_from_slice(&ciphertext);
    blob
}

/// Reverses [`encrypt_string`].
pub fn decrypt_string(blob: &[u8], password: &str) -> Result<String, CryptError> {
    if blob.len() < SALT_LEN + IV_LEN {
        return Err(CryptError::format("encrypted string blob is too short"));
    }
    let (salt_bytes, rest) = blob.split_at(SALT_LEN);
    let (iv_bytes, ciphertext) = rest.split_at(IV_LEN);

    let mut salt = [0u8; SALT_LEN];
    salt.copy_from_slice(salt_bytes);
    let mut iv = [0u8; IV_LEN];
    iv.copy_from_slice(iv_bytes);

    let key = kdf::derive_key(password, &salt);
    let plain = decrypt_buffer(&key, &iv, ciphertext)?;
    String::from_utf8(plain).map_err(|_| CryptError::format("decrypted string is not valid UTF-8"))
}

/// StreamCipher applies AES-256-CBC to a byte stream in bounded chunks
pub struct StreamCipher {
    chunk_size: usize,
}

impl Default for StreamCipher {
    fn default() -> Self {
        Self::new(DEFAULT_CHUNK_SIZE)
    }
}

impl StreamCipher {
    pub fn new(chunk_size: usize) -> Self {
        Self {
            chunk_size: chunk_size.max(BLOCK_SIZE),
        }
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    /// Encrypts everything `reader` yields until EOF, writing ciphertext to `writer`.
    /// Returns the number of plaintext bytes consumed.
    pub async fn encrypt_stream<R, W>(
        &self,
        key: &[u8; KEY_LEN],
        iv: &Iv,
        reader: &mut R,
        writer: &mut W,
    ) -> Result<u64, CryptError>
    where
        R: AsyncRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        let ctx = CbcContext::new(Direction::Encrypt, key, iv);
        let (consumed, _) = self.pump(ctx, reader, writer).await?;
        Ok(consumed)
    }

    /// Decrypts everything `reader` yields until EOF, writing plaintext to `writer`.
    /// Returns the number of plaintext bytes written.
    pub async fn decrypt_stream<R, W>(
        &self,
        key: &[u8; KEY_LEN],
        iv: &Iv,
        reader: &mut R,
        writer: &mut W,
    ) -> Result<u64, CryptError>
    where
        R: AsyncRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        let ctx = CbcContext::new(Direction::Decrypt, key, iv);
        let (_, produced) = self.pump(ctx, reader, writer).await?;
        Ok(produced)
    }

    async fn pump<R, W>(
        &self,
        mut ctx: CbcContext,
        reader: &mut R,
        writer: &mut W,
    ) -> Result<(u64, u64), CryptError>
    where
        R: AsyncRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        let mut buffer = vec![0u8; self.chunk_size];
        let mut output = Vec::with_capacity(self.chunk_size + BLOCK_SIZE);
        let mut consumed = 0u64;
        let mut produced = 0u64;

        loop {
            let n = reader
                .read(&mut buffer)
                .await
                .io_context(|| "reading input stream")?;
            if n == 0 {
                break;
            }
            consumed += n as u64;

            output.clear();
            ctx.update(&buffer[..n], &mut output);
            writer
                .write_all(&output)
                .await
                .io_context(|| "writing output stream")?;
            produced += output.len() as u64;
        }

        output.clear();
        ctx.finalize(&mut output)?;
        writer
            .write_all(&output)
            .await
            .io_context(|| "writing output stream")?;
        produced += output.len() as u64;

        writer.flush().await.io_context(|| "flushing output stream")?;
        Ok((consumed, produced))
    }
}
