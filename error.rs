use thiserror::Error;

/// Error taxonomy for every encrypt/decrypt operation.
#[derive(Debug, Error)]
pub enum CryptError {
    /// The file is not a container produced by this tool, or its header is damaged
    #[error("Format error: {0}")]
    Format(String),

    /// The stored password hash does not match the supplied password
    #[error("Authentication error: the password does not match this file")]
    Authentication,

    /// The password matched but the ciphertext is truncated or corrupted
    #[error("Padding error: {0}")]
    Padding(String),

    /// Reading the source, writing the temporary file or renaming failed.
    /// The source file is left untouched.
    #[error("I/O error while {context}: {source}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    /// Bad caller input: empty path or password, missing path, wrong mode
    #[error("Validation error: {0}")]
    Validation(String),
}

impl CryptError {
    pub fn format(msg: impl Into<String>) -> Self {
        Self::Format(msg.into())
    }

    pub fn padding(msg: impl Into<String>) -> Self {
        Self::Padding(msg.into())
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }

    /// Stable code handed to item-failure sinks.
    pub fn reason_code(&self) -> &'static str {
        match self {
            Self::Format(_) => "format_error",
            Self::Authentication => "authentication_failed",
            Self::Padding(_) => "padding_error",
            Self::Io { .. } => "io_error",
            Self::Validation(_) => "validation_error",
        }
    }
}

impl From<std::io::Error> for CryptError {
    fn from(err: std::io::Error) -> Self {
        Self::io("performing file I/O", err)
    }
}

/// Attaches a context string to I/O results, mirroring `anyhow::Context`.
pub(crate) trait IoContext<T> {
    fn io_context<F, S>(self, f: F) -> Result<T, CryptError>
    where
        F: FnOnce() -> S,
        S: Into<String>;
}

impl<T> IoContext<T> for Result<T, std::io::Error> {
    fn io_context<F, S>(self, f: F) -> Result<T, CryptError>
    where
        F: FnOnce() -> S,
        S: Into<String>,
    {
        self.map_err(|e| CryptError::io(f(), e))
    }
}
