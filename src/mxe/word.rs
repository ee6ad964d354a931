//! A single typed 4-byte field at a fixed file offset.
//!
//! An [`MxeWord`] owns the raw disk bytes of one field plus, for pointer
//! kinds, the resolved target string. Disk byte order is the reverse of
//! the in-memory numeric order (big-endian on disk), so encode and decode
//! each perform exactly one reversal.

use std::fs::File;
use std::io::{Read, Seek, SeekFrom, Write};

use byteorder::{BigEndian, ByteOrder};
use log::{info, warn};

use super::address::{self, real_address};
use super::csv::CsvOptions;
use super::error::Result;
use super::types::ValueKind;

/// Width of every numeric/pointer field in bytes.
pub const WORD_SIZE: u64 = 4;

/// Back-reference to a pointer field's NUL-terminated target string.
///
/// Kept as plain data (offset, text, byte length, dirty flag) so the
/// field and the table-level rewrite pass agree on who writes the target
/// bytes. A zero offset marks the "no pointer" case: the text is empty
/// and, because edits must preserve byte length, can never change.
#[derive(Debug, Clone)]
pub struct PointerTarget {
    offset: u64,
    text: String,
    byte_len: usize,
    dirty: bool,
}

/// One tagged field: 4 raw bytes at a fixed position, decoded according
/// to the kind selected by its header's first character.
#[derive(Debug, Clone)]
pub struct MxeWord {
    position: u64,
    header: String,
    kind: ValueKind,
    raw: [u8; 4],
    target: Option<PointerTarget>,
}

impl MxeWord {
    /// Create a field at `position`. The kind is selected once, here,
    /// from the header's first character; unknown tags decode as hex.
    pub fn new(position: u64, header: impl Into<String>) -> Self {
        let header = header.into();
        let kind = ValueKind::from_header(&header);
        Self {
            position,
            header,
            kind,
            raw: [0; 4],
            target: None,
        }
    }

    pub fn position(&self) -> u64 {
        self.position
    }

    pub fn header(&self) -> &str {
        &self.header
    }

    pub fn kind(&self) -> ValueKind {
        self.kind
    }

    pub fn raw(&self) -> &[u8; 4] {
        &self.raw
    }

    /// The resolved pointer-target string, if this is a resolved pointer.
    pub fn target_text(&self) -> Option<&str> {
        self.target.as_ref().map(|t| t.text.as_str())
    }

    /// Read the raw bytes at `position`; pointer kinds additionally
    /// resolve their target string.
    pub fn read_from(&mut self, file: &mut File, file_len: u64) -> Result<()> {
        file.seek(SeekFrom::Start(self.position))?;
        file.read_exact(&mut self.raw)?;
        if self.kind == ValueKind::Pointer {
            self.resolve_target(file, file_len);
        }
        Ok(())
    }

    /// Resolve the pointer target. Out-of-range and undecodable targets
    /// leave the field unresolved; it then displays as hex.
    fn resolve_target(&mut self, file: &mut File, file_len: u64) {
        let p = real_address(self.value_i32());
        if p == 0 {
            self.target = Some(PointerTarget {
                offset: 0,
                text: String::new(),
                byte_len: 0,
                dirty: false,
            });
            return;
        }
        if p >= file_len {
            warn!(
                "Pointer header [{}] contains overly large pointer [{}] exceeding source file \
                 size. Are you sure this is a pointer? Check your config.txt. Skipping value.",
                self.header,
                self.as_hex()
            );
            self.target = None;
            return;
        }
        match address::read_cstring_at(file, p, file_len) {
            Ok(text) => {
                let byte_len = text.len();
                self.target = Some(PointerTarget {
                    offset: p,
                    text,
                    byte_len,
                    dirty: false,
                });
            }
            Err(e) => {
                warn!(
                    "Pointer header [{}] target at {:#x} is unreadable ({}). Skipping value.",
                    self.header, p, e
                );
                self.target = None;
            }
        }
    }

    /// The word's value as a signed integer (one reversal from disk order).
    pub fn value_i32(&self) -> i32 {
        BigEndian::read_i32(&self.raw)
    }

    fn as_float(&self) -> f32 {
        f32::from_bits(BigEndian::read_u32(&self.raw))
    }

    /// `0x`-prefixed uppercase hex of the raw bytes in disk order.
    pub fn as_hex(&self) -> String {
        let mut s = String::with_capacity(2 + self.raw.len() * 2);
        s.push_str("0x");
        for b in &self.raw {
            s.push_str(&format!("{:02X}", b));
        }
        s
    }

    /// Dash-separated hex byte dump in disk order.
    fn as_ones(&self) -> String {
        let pairs: Vec<String> = self.raw.iter().map(|b| format!("{:02X}", b)).collect();
        format!("0x{}", pairs.join("-"))
    }

    /// Bit string of all raw bytes in disk order.
    fn as_binary(&self) -> String {
        self.raw.iter().map(|b| format!("{:08b}", b)).collect()
    }

    /// Decode this field for textual presentation under the given
    /// display options. The hex override wins for every kind; the
    /// literal override forces hex for pointers only.
    pub fn value(&self, opts: &CsvOptions) -> String {
        if opts.hex {
            return self.as_hex();
        }
        match self.kind {
            ValueKind::Int => self.value_i32().to_string(),
            ValueKind::Float => self.as_float().to_string(),
            ValueKind::Hex => self.as_hex(),
            ValueKind::OneByOne => self.as_ones(),
            ValueKind::Binary => self.as_binary(),
            ValueKind::Pointer => {
                if opts.literal {
                    return self.as_hex();
                }
                match &self.target {
                    Some(t) => t.text.replace(',', "~"),
                    None => {
                        warn!(
                            "Pointer header [{}] contains overly large pointer [{}] exceeding \
                             source file size. Are you sure this is a pointer? Check your \
                             config.txt. Skipping value.",
                            self.header,
                            self.as_hex()
                        );
                        self.as_hex()
                    }
                }
            }
        }
    }

    /// Whether the hex display prefix applies to this field's header in
    /// CSV output under the given options.
    pub fn hex_prefixed(&self, opts: &CsvOptions) -> bool {
        opts.hex || (opts.literal && self.kind == ValueKind::Pointer)
    }

    fn header_matches(&self, given: &str, opts: &CsvOptions) -> bool {
        if given == self.header {
            return true;
        }
        // Exported headers carry a display-only `h` prefix in hex and
        // literal-pointer modes.
        self.hex_prefixed(opts)
            && given.strip_prefix('h').is_some_and(|rest| rest == self.header)
    }

    /// Re-encode this field from a CSV cell.
    ///
    /// A header that does not match this field's own header is a sign of
    /// schema drift between export and import: the write is rejected and
    /// logged, nothing is mutated. Returns whether the stored value
    /// actually changed; equal values are silent.
    pub fn set_value(&mut self, header: &str, text: &str, opts: &CsvOptions) -> bool {
        if !self.header_matches(header, opts) {
            warn!(
                "Non-matching header found. Expected [{}] found [{}]. Skipping value.",
                self.header, header
            );
            return false;
        }

        // Hex and literal-pointer display modes export raw hex, so the
        // same path decodes them on the way back in.
        if self.hex_prefixed(opts) {
            return self.set_numeric(text, false);
        }

        match self.kind {
            ValueKind::Int | ValueKind::Hex => self.set_numeric(text, false),
            ValueKind::Float => self.set_float(text),
            ValueKind::OneByOne => {
                let stripped = text.replace('-', "");
                self.set_numeric(&stripped, false)
            }
            ValueKind::Binary => self.set_numeric(text, true),
            ValueKind::Pointer => self.set_pointer(text),
        }
    }

    /// Parse `text` as a 32-bit value (`0x` prefix selects hex; `binary`
    /// selects base 2) and store it big-endian. Logs and skips on parse
    /// failure.
    fn set_numeric(&mut self, text: &str, binary: bool) -> bool {
        let text = text.trim();
        let parsed: Option<i32> = if binary {
            u32::from_str_radix(text, 2).ok().map(|v| v as i32)
        } else if let Some(hex) = text.strip_prefix("0x").or_else(|| text.strip_prefix("0X")) {
            u32::from_str_radix(hex, 16).ok().map(|v| v as i32)
        } else {
            text.parse::<i32>().ok()
        };
        let Some(v) = parsed else {
            warn!(
                "Could not parse [{}] as a value for header [{}]. Skipping value.",
                text, self.header
            );
            return false;
        };
        self.store_i32(v)
    }

    fn set_float(&mut self, text: &str) -> bool {
        match text.trim().parse::<f32>() {
            Ok(f) => self.store_i32(f.to_bits() as i32),
            Err(_) => {
                warn!(
                    "Could not parse [{}] as a float for header [{}]. Skipping value.",
                    text, self.header
                );
                false
            }
        }
    }

    fn store_i32(&mut self, v: i32) -> bool {
        let before = self.as_hex();
        BigEndian::write_i32(&mut self.raw, v);
        let after = self.as_hex();
        if before != after {
            info!(
                "Changing [{}] original value [{}] to new value [{}]",
                self.header, before, after
            );
            true
        } else {
            false
        }
    }

    /// Replace the pointer-target string in place. The new string must
    /// have exactly the old UTF-8 byte length; anything else is rejected
    /// because an in-place rewrite cannot relocate data.
    fn set_pointer(&mut self, text: &str) -> bool {
        let val = text.replace('~', ",");
        let Some(target) = self.target.as_mut() else {
            warn!(
                "Pointer header [{}] was never resolved; cannot edit its target. Skipping value.",
                self.header
            );
            return false;
        };
        if val == target.text {
            return false;
        }
        if val.len() != target.byte_len {
            warn!(
                "Could not change [{}] original value [{}] to new value [{}] due to \
                 non-matching lengths.",
                self.header, target.text, val
            );
            return false;
        }
        info!(
            "Changing [{}] original value [{}] to new value [{}]",
            self.header, target.text, val
        );
        target.text = val;
        target.dirty = true;
        true
    }

    /// Write the fixed-width bytes back at `position`; a dirty pointer
    /// target is rewritten at its own offset (same length, terminator
    /// untouched).
    pub fn write_back(&self, file: &mut File) -> Result<()> {
        file.seek(SeekFrom::Start(self.position))?;
        file.write_all(&self.raw)?;
        if let Some(t) = &self.target {
            if t.dirty {
                file.seek(SeekFrom::Start(t.offset))?;
                file.write_all(t.text.as_bytes())?;
            }
        }
        Ok(())
    }

    /// Guess this word's kind from its raw bytes, for schema discovery.
    ///
    /// Checked in order: a value whose translated address lands inside
    /// the file on a readable, non-empty printable string is a pointer;
    /// a bit pattern decoding to a float of plausible magnitude is a
    /// float; small magnitudes are integers; everything else is hex.
    pub fn probe_kind(&self, file: &mut File, file_len: u64) -> ValueKind {
        let v = self.value_i32();
        if v == 0 {
            return ValueKind::Int;
        }
        let p = real_address(v);
        if p > 0 && p < file_len {
            if let Ok(s) = address::read_cstring_at(file, p, file_len) {
                if !s.is_empty() && s.chars().all(|c| !c.is_control()) {
                    return ValueKind::Pointer;
                }
            }
        }
        let f = self.as_float();
        if f.is_finite() && (1e-4f32..1e7f32).contains(&f.abs()) {
            return ValueKind::Float;
        }
        if v.unsigned_abs() < 0x0100_0000 {
            ValueKind::Int
        } else {
            ValueKind::Hex
        }
    }

    #[cfg(test)]
    pub(crate) fn set_raw(&mut self, raw: [u8; 4]) {
        self.raw = raw;
    }

    #[cfg(test)]
    pub(crate) fn set_test_target(&mut self, offset: u64, text: &str) {
        self.target = Some(PointerTarget {
            offset,
            text: text.to_string(),
            byte_len: text.len(),
            dirty: false,
        });
    }

    #[cfg(test)]
    pub(crate) fn target_dirty(&self) -> bool {
        self.target.as_ref().is_some_and(|t| t.dirty)
    }
}
