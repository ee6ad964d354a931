//! One table record: four index words plus the typed field block they
//! point at.

use std::fs::File;
use std::io::{self, Write};

use log::warn;

use super::address::real_address;
use super::csv::CsvOptions;
use super::error::Result;
use super::types::{MxeEntryType, ValueKind};
use super::word::{MxeWord, WORD_SIZE};

/// Size of one table slot: index, title pointer, type code, block address.
pub const INDEX_ENTRY_SIZE: u64 = 4 * WORD_SIZE;

/// One entry of the MXE record table.
///
/// The slot itself holds four words (`iIndex`, `pVm`, `iType` and the
/// record-block address); the typed fields live elsewhere in the file at
/// the translated block address and are loaded once the entry's schema
/// is known. The block address is kept as a hex word: its target is a
/// record block, not a string, so it must not be chased as a pointer.
#[derive(Debug)]
pub struct MxeIndexEntry {
    position: u64,
    index_word: MxeWord,
    vm_word: MxeWord,
    type_word: MxeWord,
    addr_word: MxeWord,
    fields: Vec<MxeWord>,
}

impl MxeIndexEntry {
    /// Parse the table slot at `position` and resolve the title string.
    pub fn read(file: &mut File, position: u64, file_len: u64) -> Result<Self> {
        let mut index_word = MxeWord::new(position, "iIndex");
        let mut vm_word = MxeWord::new(position + WORD_SIZE, "pVm");
        let mut type_word = MxeWord::new(position + 2 * WORD_SIZE, "iType");
        let mut addr_word = MxeWord::new(position + 3 * WORD_SIZE, "hAddr");

        index_word.read_from(file, file_len)?;
        vm_word.read_from(file, file_len)?;
        type_word.read_from(file, file_len)?;
        addr_word.read_from(file, file_len)?;

        Ok(Self {
            position,
            index_word,
            vm_word,
            type_word,
            addr_word,
            fields: Vec::new(),
        })
    }

    /// File offset of this entry's table slot.
    pub fn position(&self) -> u64 {
        self.position
    }

    /// The record's own declared index (the table key).
    pub fn index(&self) -> i32 {
        self.index_word.value_i32()
    }

    /// The record title naming its schema. Unresolvable titles come back
    /// empty; those records group together and stay schemaless.
    pub fn title(&self) -> &str {
        self.vm_word.target_text().unwrap_or("")
    }

    /// The numeric type code used in CSV filenames and import validation.
    pub fn type_code(&self) -> i32 {
        self.type_word.value_i32()
    }

    /// Translated file offset of the record's field block (0 = none).
    pub fn block_offset(&self) -> u64 {
        real_address(self.addr_word.value_i32())
    }

    /// Translated file offset of the title string (0 = none).
    pub fn title_offset(&self) -> u64 {
        real_address(self.vm_word.value_i32())
    }

    pub fn fields(&self) -> &[MxeWord] {
        &self.fields
    }

    /// Build and read the typed fields per the schema's header order.
    /// Fields that would run past the end of the file are skipped with a
    /// warning; the record keeps whatever loaded cleanly.
    pub fn load_fields(
        &mut self,
        file: &mut File,
        schema: &MxeEntryType,
        file_len: u64,
    ) -> Result<()> {
        let base = self.block_offset();
        if base == 0 {
            return Ok(());
        }
        self.fields.clear();
        for (j, header) in schema.headers.iter().enumerate() {
            let pos = base + j as u64 * WORD_SIZE;
            if pos + WORD_SIZE > file_len {
                warn!(
                    "Record [{}] field {} at {:#x} runs past end of file; truncating block",
                    self.title(),
                    j,
                    pos
                );
                break;
            }
            let mut word = MxeWord::new(pos, header.clone());
            word.read_from(file, file_len)?;
            self.fields.push(word);
        }
        Ok(())
    }

    /// Probe the raw words of this record's block and suggest a kind for
    /// each position. `span_bytes` bounds the block (derived by the
    /// parser from the distance to the next record or string).
    pub fn suggest_types(
        &self,
        file: &mut File,
        file_len: u64,
        span_bytes: u64,
    ) -> Result<Vec<ValueKind>> {
        let base = self.block_offset();
        let mut kinds = Vec::new();
        if base == 0 {
            return Ok(kinds);
        }
        let count = span_bytes / WORD_SIZE;
        for j in 0..count {
            let pos = base + j * WORD_SIZE;
            if pos + WORD_SIZE > file_len {
                break;
            }
            // Probe through a plain hex word so reading never chases the
            // value as a pointer.
            let mut word = MxeWord::new(pos, "h");
            word.read_from(file, file_len)?;
            kinds.push(word.probe_kind(file, file_len));
        }
        Ok(kinds)
    }

    /// Emit one data row: record index, title cell, then one decoded
    /// value per emitted field, each followed by a comma.
    pub fn write_csv_row(&self, out: &mut impl Write, opts: &CsvOptions) -> io::Result<()> {
        write!(out, "{},{},", self.index(), self.vm_word.value(opts))?;
        for field in &self.fields {
            if field.header().is_empty() && !opts.verbose {
                continue;
            }
            write!(out, "{},", field.value(opts))?;
        }
        writeln!(out)
    }

    /// Emit one index row: index, title, type code, block address.
    pub fn write_index_row(&self, out: &mut impl Write) -> io::Result<()> {
        writeln!(
            out,
            "{},{},{},{}",
            self.index(),
            self.title().replace(',', "~"),
            self.type_code(),
            self.addr_word.as_hex()
        )
    }

    /// Apply one validated CSV line. `headers` and `values` are the
    /// per-field cells (identity columns already removed), in the same
    /// emission order `write_csv_row` used; a trailing empty cell from
    /// the row's final comma is simply never paired with a field.
    /// Returns whether any stored value changed.
    pub fn apply_csv_line(
        &mut self,
        headers: &[String],
        values: &[String],
        opts: &CsvOptions,
    ) -> bool {
        let mut changed = false;
        let mut cell = 0usize;
        for field in &mut self.fields {
            if field.header().is_empty() && !opts.verbose {
                continue;
            }
            if cell >= headers.len() || cell >= values.len() {
                break;
            }
            changed |= field.set_value(&headers[cell], &values[cell], opts);
            cell += 1;
        }
        changed
    }

    /// Write the slot words and the field block back to their original
    /// offsets, including any dirty pointer-target strings.
    pub fn write_back(&self, file: &mut File) -> Result<()> {
        self.index_word.write_back(file)?;
        self.vm_word.write_back(file)?;
        self.type_word.write_back(file)?;
        self.addr_word.write_back(file)?;
        for field in &self.fields {
            field.write_back(file)?;
        }
        Ok(())
    }
}
