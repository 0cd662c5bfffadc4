use std::path::PathBuf;

use thiserror::Error;

use crate::types::UserId;

pub type AtfsResult<T> = Result<T, AtfsError>;

/// Every failure an atfs operation can report.
///
/// Messages carry identifiers, sizes and paths only. Key material, passwords
/// and plaintext never end up in an error.
#[derive(Debug, Error)]
pub enum AtfsError {
    #[error("malformed identifier: {0:?}")]
    MalformedIdentifier(String),

    #[error("unsupported cipher: {0:?}")]
    UnsupportedCipher(String),

    #[error("unsupported hash: {0:?}")]
    UnsupportedHash(String),

    #[error("wrapped file key is corrupt: {0}")]
    EnvelopeCorrupt(String),

    /// The asymmetric key does not match the one used to wrap, or the
    /// ciphertext was damaged.
    #[error("decryption failed: key mismatch or corrupted envelope")]
    DecryptionFailed,

    #[error("access denied for user {0}")]
    AccessDenied(UserId),

    #[error("invalid recipient: {0}")]
    InvalidRecipient(String),

    /// Signature or payload check failed. Always fatal.
    #[error("integrity violation: {0}")]
    IntegrityViolation(String),

    #[error("insufficient storage: {required} bytes required, {available} available")]
    InsufficientStorage { required: u64, available: u64 },

    #[error("invalid password")]
    InvalidPassword,

    #[error("malformed vault: {0}")]
    MalformedVault(String),

    #[error("malformed container: {0}")]
    MalformedContainer(String),

    #[error("invalid file name: {0}")]
    InvalidName(String),

    #[error("payload too large: {size} bytes (limit {limit})")]
    PayloadTooLarge { size: u64, limit: u64 },

    #[error("unsupported RSA key size: {0} bits")]
    UnsupportedKeySize(usize),

    #[error("key error: {0}")]
    Key(String),

    #[error("storage unavailable: {}", .0.display())]
    StorageUnavailable(PathBuf),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("config error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl AtfsError {
    /// Short message suitable for showing to an end user.
    pub fn user_message(&self) -> &'static str {
        match self {
            AtfsError::MalformedIdentifier(_) => "The algorithm name is not well formed.",
            AtfsError::UnsupportedCipher(_) => "This cipher is not supported.",
            AtfsError::UnsupportedHash(_) => "This hash algorithm is not supported.",
            AtfsError::EnvelopeCorrupt(_) | AtfsError::MalformedContainer(_) => {
                "The encrypted file is damaged."
            }
            AtfsError::DecryptionFailed | AtfsError::AccessDenied(_) => {
                "You do not have access to this file."
            }
            AtfsError::InvalidRecipient(_) => "This user cannot be added as a recipient.",
            AtfsError::IntegrityViolation(_) => {
                "The file has been modified and cannot be trusted."
            }
            AtfsError::InsufficientStorage { .. } => "There is not enough free space.",
            AtfsError::InvalidPassword => "Wrong password.",
            AtfsError::MalformedVault(_) => "The key vault is damaged.",
            AtfsError::InvalidName(_) => "The file name cannot be used.",
            AtfsError::PayloadTooLarge { .. } => "The file is too large.",
            AtfsError::UnsupportedKeySize(_) | AtfsError::Key(_) => "The key is not usable.",
            AtfsError::StorageUnavailable(_) => "The storage location is not available.",
            AtfsError::NotFound(_) => "The file does not exist.",
            AtfsError::Config(_) => "The configuration is invalid.",
            AtfsError::Io(_) => "A storage error occurred.",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insufficient_storage_message() {
        let err = AtfsError::InsufficientStorage {
            required: 4096,
            available: 100,
        };
        assert_eq!(
            err.to_string(),
            "insufficient storage: 4096 bytes required, 100 available"
        );
    }

    #[test]
    fn test_access_denied_names_user() {
        let err = AtfsError::AccessDenied(UserId(7));
        assert_eq!(err.to_string(), "access denied for user 7");
        assert_eq!(err.user_message(), "You do not have access to this file.");
    }

    #[test]
    fn test_io_conversion() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        let err: AtfsError = io.into();
        assert!(matches!(err, AtfsError::Io(_)));
    }
}
