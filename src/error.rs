use crate::types::Address;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// Coarse error class, surfaced through [`last_error_kind`].
///
/// [`last_error_kind`]: crate::KernelHandle::last_error_kind
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorKind {
    /// A seek or read against the image or device failed. Fatal to the
    /// current operation, never retried.
    Io,
    /// A page-table level marked the address not present. Callers may
    /// legitimately probe unmapped addresses, so this is recoverable.
    InvalidTranslation,
    /// The operation only makes sense against a dead image.
    Unsupported,
    /// A list walk saw a different number of records than the kernel's own
    /// counter claimed.
    Inconsistent,
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("can't read {what}: {source}")]
    Io {
        what: String,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid address {va:x}: level {level} entry not present")]
    InvalidTranslation { va: Address, level: u8 },

    #[error("{0} requires a dead kernel image")]
    Unsupported(&'static str),

    #[error("inconsistent {what}: kernel counted {expected} records, walk saw {actual}")]
    Inconsistent {
        what: String,
        expected: usize,
        actual: usize,
    },
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Io { .. } => ErrorKind::Io,
            Error::InvalidTranslation { .. } => ErrorKind::InvalidTranslation,
            Error::Unsupported(_) => ErrorKind::Unsupported,
            Error::Inconsistent { .. } => ErrorKind::Inconsistent,
        }
    }
}
