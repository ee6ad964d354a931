//! CSV export and import for record tables.
//!
//! The format is the editor's own single-escape scheme, not RFC 4180:
//! cells are comma-separated with no quoting, pointer strings escape
//! embedded commas as `~`, and data rows end with a trailing comma.
//! One data file is written per record title; import must run with the
//! same display options the export used, since those options change both
//! the emitted headers and the value forms.

use std::collections::HashMap;
use std::fs::{self, File};
use std::io::{self, BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use log::{error, info, warn};

use super::entry::MxeIndexEntry;
use super::types::{MxeEntryType, SchemaSource, TypeRegistry};

pub const DATA_ENDING: &str = "-Data.csv";
pub const HEX_ENDING: &str = "-Hex.csv";
pub const INDEX_ENDING: &str = "-Index.csv";
pub const ALL_INDEXES_NAME: &str = "All-Indexes.csv";

const OTHER_MARK: &str = "-OTHER";
const DATA_ID_COLUMNS: &str = "iMxeIndex,iMxeVm,";
const INDEX_ID_COLUMNS: &str = "iIndex,pVm,iType,pAddr";

/// Display configuration threaded through export and import.
///
/// These toggles only affect textual presentation of decoded values,
/// never the underlying binary semantics.
#[derive(Debug, Clone, Copy)]
pub struct CsvOptions {
    /// Emit unnamed (padding) fields too. Defaults on.
    pub verbose: bool,
    /// Show pointer fields as their raw hex word instead of the string.
    pub literal: bool,
    /// Show every field as its raw hex word.
    pub hex: bool,
}

impl Default for CsvOptions {
    fn default() -> Self {
        Self {
            verbose: true,
            literal: false,
            hex: false,
        }
    }
}

impl CsvOptions {
    fn data_ending(&self) -> &'static str {
        if self.hex {
            HEX_ENDING
        } else {
            DATA_ENDING
        }
    }
}

/// The headers a schema emits under the given options: unnamed fields
/// dropped unless verbose, and a display-only `h` prefix in hex mode (or
/// literal mode, for pointer headers).
fn emitted_headers(schema: &MxeEntryType, opts: &CsvOptions) -> Vec<String> {
    schema
        .headers
        .iter()
        .filter(|h| !h.is_empty() || opts.verbose)
        .map(|h| {
            if opts.hex || (opts.literal && h.starts_with('p')) {
                format!("h{}", h)
            } else {
                h.clone()
            }
        })
        .collect()
}

/// Group entries by title, preserving table order of first appearance
/// so output is byte-for-byte reproducible across runs.
fn group_by_title(entries: &[MxeIndexEntry]) -> Vec<(String, Vec<usize>)> {
    let mut order: Vec<(String, Vec<usize>)> = Vec::new();
    for (i, entry) in entries.iter().enumerate() {
        let title = entry.title().to_string();
        match order.iter_mut().find(|(t, _)| *t == title) {
            Some((_, slots)) => slots.push(i),
            None => order.push((title, vec![i])),
        }
    }
    order
}

fn group_file_name(
    basedir: &Path,
    schema: &MxeEntryType,
    type_code: i32,
    ending: &str,
) -> PathBuf {
    let mark = match schema.source {
        SchemaSource::Discovered => OTHER_MARK,
        SchemaSource::Configured => "",
    };
    basedir.join(format!("{}-{}{}{}", type_code, schema.title, mark, ending))
}

/// Write one data file per record title. File-level failures are logged
/// and abort only that file.
pub fn export_data(
    entries: &[MxeIndexEntry],
    registry: &TypeRegistry,
    basedir: &Path,
    opts: &CsvOptions,
) {
    for (title, slots) in group_by_title(entries) {
        let Some(schema) = registry.get(&title) else {
            warn!("No schema for title [{}]; skipping data export", title);
            continue;
        };
        let path = group_file_name(
            basedir,
            schema,
            entries[slots[0]].type_code(),
            opts.data_ending(),
        );
        info!("Writing data file {}", path.display());
        if let Err(e) = write_data_file(&path, entries, &slots, schema, opts) {
            error!("Failed to write {}: {}", path.display(), e);
        }
    }
}

fn write_data_file(
    path: &Path,
    entries: &[MxeIndexEntry],
    slots: &[usize],
    schema: &MxeEntryType,
    opts: &CsvOptions,
) -> io::Result<()> {
    let mut out = BufWriter::new(File::create(path)?);
    out.write_all(DATA_ID_COLUMNS.as_bytes())?;
    for header in emitted_headers(schema, opts) {
        write!(out, "{},", header)?;
    }
    writeln!(out)?;
    for &slot in slots {
        entries[slot].write_csv_row(&mut out, opts)?;
    }
    out.flush()
}

/// Write the whole-table index file plus one index file per title,
/// rows sorted by ascending record file position.
pub fn export_indexes(entries: &[MxeIndexEntry], registry: &TypeRegistry, basedir: &Path) {
    let all_path = basedir.join(ALL_INDEXES_NAME);
    info!("Writing index file {}", all_path.display());
    let all: Vec<usize> = (0..entries.len()).collect();
    if let Err(e) = write_index_file(&all_path, entries, &all) {
        error!("Failed to write {}: {}", all_path.display(), e);
    }

    for (title, slots) in group_by_title(entries) {
        let Some(schema) = registry.get(&title) else {
            continue;
        };
        let path = group_file_name(
            basedir,
            schema,
            entries[slots[0]].type_code(),
            INDEX_ENDING,
        );
        info!("Writing index file {}", path.display());
        if let Err(e) = write_index_file(&path, entries, &slots) {
            error!("Failed to write {}: {}", path.display(), e);
        }
    }
}

fn write_index_file(path: &Path, entries: &[MxeIndexEntry], slots: &[usize]) -> io::Result<()> {
    let mut sorted = slots.to_vec();
    sorted.sort_by_key(|&i| entries[i].position());

    let mut out = BufWriter::new(File::create(path)?);
    writeln!(out, "{}", INDEX_ID_COLUMNS)?;
    for i in sorted {
        entries[i].write_index_row(&mut out)?;
    }
    out.flush()
}

/// Read every data CSV in `basedir` back into the table. Returns whether
/// any stored value changed.
pub fn import_dir(
    entries: &mut [MxeIndexEntry],
    by_index: &HashMap<i32, usize>,
    registry: &TypeRegistry,
    basedir: &Path,
    opts: &CsvOptions,
) -> bool {
    let ending = opts.data_ending();
    let dir = match fs::read_dir(basedir) {
        Ok(d) => d,
        Err(e) => {
            error!("Cannot read CSV directory {}: {}", basedir.display(), e);
            return false;
        }
    };

    let mut files: Vec<PathBuf> = dir
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| {
            p.file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|n| n.ends_with(ending))
        })
        .collect();
    files.sort();

    let mut changed = false;
    for path in files {
        changed |= import_file(&path, entries, by_index, registry, opts, ending);
    }
    changed
}

/// Parse `<count>-<title>` out of a data CSV filename; a trailing
/// `-OTHER` marker in the title position is stripped.
fn parse_file_name(name: &str, ending: &str) -> Option<(i32, String)> {
    let body = name.strip_suffix(ending)?;
    let (count_str, title) = body.split_once('-')?;
    let title = title.strip_suffix(OTHER_MARK).unwrap_or(title);
    let count = count_str.parse::<i32>().ok()?;
    Some((count, title.to_string()))
}

fn import_file(
    path: &Path,
    entries: &mut [MxeIndexEntry],
    by_index: &HashMap<i32, usize>,
    registry: &TypeRegistry,
    opts: &CsvOptions,
    ending: &str,
) -> bool {
    let name = path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or_default();
    let Some((count, title)) = parse_file_name(name, ending) else {
        warn!(
            "Csv file [{}] was not named in the expected manner (e.g. \
             '4-VlMxMapObjectCommonInfo-Data.csv'). Skipping file.",
            path.display()
        );
        return false;
    };

    info!("Reading in CSV data from [{}]...", path.display());
    let file = match File::open(path) {
        Ok(f) => f,
        Err(e) => {
            error!("Failed to open {}: {}", path.display(), e);
            return false;
        }
    };

    // Emitted width under the current options, for the per-line column
    // count check. A trailing comma produces one extra empty cell, so
    // both the bare and the trailing-cell widths are accepted.
    let expected = registry
        .get(&title)
        .map(|schema| emitted_headers(schema, opts).len());

    let mut lines = BufReader::new(file).lines();
    let headers: Vec<String> = match lines.next() {
        Some(Ok(line)) => line.split(',').skip(2).map(str::to_string).collect(),
        Some(Err(e)) => {
            error!("Failed to read {}: {}", path.display(), e);
            return false;
        }
        None => return false,
    };

    let mut changed = false;
    let mut line_num = 1usize;
    for line in lines {
        line_num += 1;
        let line = match line {
            Ok(l) => l,
            Err(e) => {
                error!("Failed to read {} line {}: {}", path.display(), line_num, e);
                return changed;
            }
        };
        if line.is_empty() {
            continue;
        }
        let cells: Vec<&str> = line.split(',').collect();
        if cells.len() < 2 {
            warn!(
                "Short line [{}] in [{}]. Skipping record.",
                line_num,
                path.display()
            );
            continue;
        }
        let Ok(index_id) = cells[0].parse::<i32>() else {
            warn!(
                "Could not parse record index on line [{}] of [{}]. Skipping record.",
                line_num,
                path.display()
            );
            continue;
        };
        let Some(&slot) = by_index.get(&index_id) else {
            warn!(
                "No record with index [{}] referenced on line [{}] of [{}]. Skipping record.",
                index_id,
                line_num,
                path.display()
            );
            continue;
        };
        let entry = &mut entries[slot];
        if entry.title() != title {
            warn!(
                "Mxe type mismatch referenced in file name [{}] on line [{}]. Expected [{}] \
                 but found [{}]. Skipping record.",
                path.display(),
                line_num,
                entry.title(),
                title
            );
            continue;
        }
        if entry.type_code() != count {
            warn!(
                "Mxe size mismatch referenced in file name [{}] on line [{}]. Expected [{}] \
                 but found [{}]. Skipping record.",
                path.display(),
                line_num,
                entry.type_code(),
                count
            );
            continue;
        }
        let data: Vec<String> = cells[2..].iter().map(|s| s.to_string()).collect();
        let width_ok = headers.len() == data.len()
            && expected.is_some_and(|n| data.len() == n || data.len() == n + 1);
        if !width_ok {
            warn!(
                "Mxe count mismatch referenced in file name [{}] on line [{}]. Expected [{}] \
                 but found [{}]. Skipping record.",
                path.display(),
                line_num,
                headers.len(),
                data.len()
            );
            continue;
        }
        changed |= entry.apply_csv_line(&headers, &data, opts);
    }
    changed
}
