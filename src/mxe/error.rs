//! Custom error types for the mxe-edit crate.

use thiserror::Error;

/// The primary error type for all operations in this crate.
///
/// Most per-field and per-line faults are logged and skipped rather than
/// returned (see the import/export paths); this type covers the faults
/// that abort a whole-file operation.
#[derive(Debug, Error)]
pub enum MxeError {
    /// An error originating from I/O operations.
    #[error("I/O error: {0:?}")]
    Io(#[from] std::io::Error),

    /// The file is structurally invalid or does not conform to the MXE layout.
    #[error("Invalid format: {0}")]
    InvalidFormat(String),

    /// A translated address points past the end of the source file.
    #[error("Address {address:#x} out of range for file of {file_len} bytes")]
    AddressOutOfRange { address: u64, file_len: u64 },

    /// A string read from the file is not valid UTF-8.
    #[error("Invalid UTF-8 in string at offset {offset:#x}")]
    InvalidString { offset: u64 },
}

/// A convenience `Result` type alias using the crate's `MxeError` type.
pub type Result<T> = std::result::Result<T, MxeError>;
