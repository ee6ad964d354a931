//! Core MXE table parser and in-place editor.

pub mod address;
pub mod config;
pub mod csv;
pub mod entry;
pub mod error;
pub mod types;
pub mod word;

mod discover;

use std::collections::HashMap;
use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};

use log::{debug, error, info, warn};

use self::entry::{MxeIndexEntry, INDEX_ENTRY_SIZE};
use self::types::{MxeEntryType, TypeRegistry};
use self::word::{MxeWord, WORD_SIZE};

pub use self::csv::CsvOptions;
pub use self::error::{MxeError, Result};

/// Fixed file offset of the record count word.
pub const TABLE_COUNT_ADDR: u64 = 0x84;
/// Fixed file offset of the table start address word.
pub const TABLE_START_ADDR: u64 = 0x88;

const DISCOVERED_DUMP_NAME: &str = "discovered-types.txt";

/// The main parser and editor for MXE table files.
///
/// Opening a file runs the sequential phases once: header read, record
/// enumeration via pointer chasing, schema discovery for titles without
/// a configured type, and field loading. After that the registry is an
/// immutable snapshot and the table only changes through CSV import.
pub struct MxeParser {
    path: PathBuf,
    basedir: PathBuf,
    file_len: u64,
    entries: Vec<MxeIndexEntry>,
    by_index: HashMap<i32, usize>,
    registry: TypeRegistry,
    discovered: Vec<MxeEntryType>,
}

impl MxeParser {
    /// Open and fully parse an MXE file.
    ///
    /// `registry` carries the manually configured schemas; titles it
    /// does not know are probed and unified into discovered schemas.
    /// CSV files live in a sibling directory named after the file stem,
    /// created here.
    ///
    /// # Errors
    /// Returns an error if the file cannot be opened, is too short to
    /// hold the table header, or fails on a whole-file read.
    pub fn open(path: impl AsRef<Path>, registry: TypeRegistry) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        info!("Opening MXE file: {}", path.display());
        let mut file = File::open(&path)?;
        let file_len = file.metadata()?.len();

        if TABLE_START_ADDR + WORD_SIZE > file_len {
            return Err(MxeError::InvalidFormat(format!(
                "File of {} bytes is too short to hold an MXE table header",
                file_len
            )));
        }

        let stem = path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("mxe")
            .to_string();
        let basedir = path
            .parent()
            .unwrap_or_else(|| Path::new("."))
            .join(stem);
        fs::create_dir_all(&basedir)?;

        let mut parser = Self {
            path,
            basedir,
            file_len,
            entries: Vec::new(),
            by_index: HashMap::new(),
            registry,
            discovered: Vec::new(),
        };
        parser.read_table(&mut file)?;
        parser.discover(&mut file)?;
        parser.load_fields(&mut file);

        info!(
            "MXE file opened: {} records, {} known types ({} discovered)",
            parser.entries.len(),
            parser.registry.len(),
            parser.discovered.len()
        );
        Ok(parser)
    }

    /// Phase 1 and 2: read the table header words and enumerate records.
    fn read_table(&mut self, file: &mut File) -> Result<()> {
        let mut count_word = MxeWord::new(TABLE_COUNT_ADDR, "iCount");
        let mut start_word = MxeWord::new(TABLE_START_ADDR, "iStart");
        count_word.read_from(file, self.file_len)?;
        start_word.read_from(file, self.file_len)?;

        let count = count_word.value_i32();
        info!("Entry count: {}", count);

        let mut current = start_word.value_i32();
        for i in 0..count {
            let pos = address::real_address(current);
            if pos == 0 || pos + INDEX_ENTRY_SIZE > self.file_len {
                warn!(
                    "Table slot {} at virtual address {:#x} is out of range; stopping \
                     enumeration",
                    i, current
                );
                break;
            }
            let entry = MxeIndexEntry::read(file, pos, self.file_len)?;
            let index = entry.index();
            match self.by_index.get(&index).copied() {
                Some(slot) => {
                    // Corrupt input signal; keep the later record.
                    warn!(
                        "Duplicate record index {} in table; keeping the later entry",
                        index
                    );
                    self.entries[slot] = entry;
                }
                None => {
                    self.by_index.insert(index, self.entries.len());
                    self.entries.push(entry);
                }
            }
            current += INDEX_ENTRY_SIZE as i32;
        }
        Ok(())
    }

    /// Phase 3: discover schemas for titles the registry does not know,
    /// then dump them for review.
    fn discover(&mut self, file: &mut File) -> Result<()> {
        self.discovered =
            discover::discover_types(file, self.file_len, &self.entries, &mut self.registry)?;
        if !self.discovered.is_empty() {
            let dump = self.basedir.join(DISCOVERED_DUMP_NAME);
            if let Err(e) = config::append_discovered(&dump, &self.discovered) {
                error!("Failed to write {}: {}", dump.display(), e);
            }
        }
        Ok(())
    }

    /// Phase 4: load every record's typed fields per its schema. A
    /// record that fails to load is skipped, not fatal.
    fn load_fields(&mut self, file: &mut File) {
        for entry in &mut self.entries {
            let Some(schema) = self.registry.get(entry.title()) else {
                debug!(
                    "Record index {} has no schema for title [{}]; no fields loaded",
                    entry.index(),
                    entry.title()
                );
                continue;
            };
            // Schema lives in the registry snapshot; clone the headers
            // out rather than holding a borrow across the mutation.
            let schema = schema.clone();
            if let Err(e) = entry.load_fields(file, &schema, self.file_len) {
                warn!(
                    "Failed to load fields for record index {}: {}. Skipping record.",
                    entry.index(),
                    e
                );
            }
        }
    }

    /// Directory the CSV files are written to and read from.
    pub fn basedir(&self) -> &Path {
        &self.basedir
    }

    pub fn entry_count(&self) -> usize {
        self.entries.len()
    }

    pub fn entries(&self) -> &[MxeIndexEntry] {
        &self.entries
    }

    pub fn registry(&self) -> &TypeRegistry {
        &self.registry
    }

    /// Schemas discovered during this run, in first-seen order.
    pub fn discovered_types(&self) -> &[MxeEntryType] {
        &self.discovered
    }

    /// Export the whole-table index file and the per-title index files.
    pub fn write_indexes(&self) {
        csv::export_indexes(&self.entries, &self.registry, &self.basedir);
    }

    /// Export one data CSV per record title.
    pub fn write_csv(&self, opts: &CsvOptions) {
        csv::export_data(&self.entries, &self.registry, &self.basedir, opts);
    }

    /// Import edited data CSVs back into the in-memory table. Returns
    /// whether any stored value changed.
    pub fn read_csvs(&mut self, opts: &CsvOptions) -> bool {
        csv::import_dir(
            &mut self.entries,
            &self.by_index,
            &self.registry,
            &self.basedir,
            opts,
        )
    }

    /// Rewrite the source binary in place: every record writes its slot
    /// words, field block, and dirty pointer targets at their original
    /// offsets. Failures are logged and abort only this operation.
    pub fn write_mxe(&self) {
        if let Err(e) = self.try_write() {
            error!("Failed to write {}: {}", self.path.display(), e);
        }
    }

    fn try_write(&self) -> Result<()> {
        let mut file = OpenOptions::new().write(true).open(&self.path)?;
        for entry in &self.entries {
            entry.write_back(&mut file)?;
        }
        info!("Wrote {} records back to {}", self.entries.len(), self.path.display());
        Ok(())
    }
}
