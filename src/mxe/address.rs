//! Virtual-to-file address translation and low-level string reads.
//!
//! MXE records store addresses relative to the start of the data section,
//! which sits behind a fixed-size file header. Translation is a pure
//! mapping; callers are responsible for bounds-checking the result
//! against the file length before dereferencing.

use std::fs::File;
use std::io::{Read, Seek, SeekFrom};

use super::error::{MxeError, Result};

/// Byte offset of the data section behind the fixed MXE file header.
pub const DATA_BASE: u64 = 0x20;

/// Longest NUL-terminated string the reader will chase before giving up.
/// Guards against dereferencing a non-pointer word into the middle of
/// record data.
pub const MAX_STRING_LEN: usize = 0x1000;

/// Translate a stored virtual address to a real file offset.
///
/// A stored address of zero (or a negative value, which no valid file
/// produces) means "no pointer" and maps to zero so callers can skip it.
pub fn real_address(virtual_addr: i32) -> u64 {
    if virtual_addr <= 0 {
        0
    } else {
        virtual_addr as u64 + DATA_BASE
    }
}

/// Read a NUL-terminated UTF-8 string at `offset`.
///
/// Returns the decoded text. Fails if the offset is outside the file,
/// the terminator is not found within [`MAX_STRING_LEN`] bytes, or the
/// bytes are not valid UTF-8.
pub fn read_cstring_at(file: &mut File, offset: u64, file_len: u64) -> Result<String> {
    if offset >= file_len {
        return Err(MxeError::AddressOutOfRange {
            address: offset,
            file_len,
        });
    }

    file.seek(SeekFrom::Start(offset))?;
    let mut bytes = Vec::new();
    let mut buf = [0u8; 64];
    'outer: loop {
        let n = file.read(&mut buf)?;
        if n == 0 {
            return Err(MxeError::InvalidFormat(format!(
                "Unterminated string at offset {:#x}",
                offset
            )));
        }
        for &b in &buf[..n] {
            if b == 0 {
                break 'outer;
            }
            bytes.push(b);
            if bytes.len() > MAX_STRING_LEN {
                return Err(MxeError::InvalidFormat(format!(
                    "String at offset {:#x} exceeds {} bytes",
                    offset, MAX_STRING_LEN
                )));
            }
        }
    }

    String::from_utf8(bytes).map_err(|_| MxeError::InvalidString { offset })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_and_negative_addresses_mean_no_pointer() {
        assert_eq!(real_address(0), 0);
        assert_eq!(real_address(-1), 0);
    }

    #[test]
    fn positive_addresses_shift_past_the_header() {
        assert_eq!(real_address(1), DATA_BASE + 1);
        assert_eq!(real_address(0x84), DATA_BASE + 0x84);
    }
}
