use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// Backing errors for all provisioning operations.
#[derive(Error, Debug)]
pub enum Error {
    #[error("required configuration '{name}' is not set")]
    MissingConfiguration { name: String },
    #[error("unsupported machine architecture '{machine}'")]
    UnsupportedPlatform { machine: String },
    #[error("failed fetch (message: {message:?}, retryable: {retryable:?})")]
    Fetch { message: String, retryable: bool },
    #[error("checksum mismatch for '{artifact}' (expected '{expected}', computed '{computed}')")]
    Integrity {
        artifact: String,
        expected: String,
        computed: String,
    },
    #[error("failed install (message: {message:?})")]
    Install { message: String },
}

impl Error {
    /// Returns the error message in "String".
    #[inline]
    #[must_use]
    pub fn message(&self) -> String {
        self.to_string()
    }

    /// Returns if the error is retryable.
    /// Nothing in the provisioner retries; the flag only classifies the
    /// failure in diagnostics.
    #[inline]
    #[must_use]
    pub fn retryable(&self) -> bool {
        match self {
            Error::Fetch { retryable, .. } => *retryable,
            _ => false,
        }
    }
}
