//! Schema discovery: probe untyped records and unify their per-field
//! kind guesses into one schema per record title.

use std::fs::File;

use log::{debug, info};

use super::entry::MxeIndexEntry;
use super::error::Result;
use super::types::{MxeEntryType, TypeRegistry, ValueKind};

/// Upper bound on how many bytes of a record block get probed when the
/// gap to the next structure is large (e.g. the last record before the
/// string pool).
const MAX_PROBE_SPAN: u64 = 0x400;

/// Merge a newly probed kind list into the group's accumulated list,
/// position by position.
///
/// A longer `new` list extends `old` verbatim. Matching tags stay. A new
/// byte-dump tag (`Hex`, `OneByOne`, `Binary`) forces the position to
/// `Hex`, the safest lossless representation. `Int` vs `Float` resolves
/// to `Float`; `Int` vs `Pointer` demotes to `Int` (a value that is
/// sometimes not a valid pointer is safer read as an integer). Any other
/// mismatch leaves the old tag untouched.
pub fn merge_kind_lists(old: &mut Vec<ValueKind>, new: &[ValueKind]) {
    use ValueKind::*;
    for (i, &n) in new.iter().enumerate() {
        if i >= old.len() {
            old.push(n);
            continue;
        }
        let o = old[i];
        if o == n {
            continue;
        }
        match (o, n) {
            (_, Hex | OneByOne | Binary) => old[i] = Hex,
            (Int, Float) | (Float, Int) => old[i] = Float,
            (Int, Pointer) | (Pointer, Int) => old[i] = Int,
            _ => {}
        }
    }
}

/// Probe every entry whose title has no registered schema, unify the
/// suggestions per title, and register the results.
///
/// Grouping follows table order, so schema registration order is the
/// order titles are first seen; rerunning over an unchanged file yields
/// identical schemas. Returns the newly discovered schemas in that
/// order.
pub fn discover_types(
    file: &mut File,
    file_len: u64,
    entries: &[MxeIndexEntry],
    registry: &mut TypeRegistry,
) -> Result<Vec<MxeEntryType>> {
    // Block spans are bounded by the nearest following structure: any
    // other record block or title string, else the end of the file.
    let mut boundaries: Vec<u64> = entries
        .iter()
        .flat_map(|e| [e.block_offset(), e.title_offset()])
        .filter(|&off| off > 0)
        .collect();
    boundaries.push(file_len);
    boundaries.sort_unstable();
    boundaries.dedup();

    let mut order: Vec<String> = Vec::new();
    let mut groups: Vec<Vec<ValueKind>> = Vec::new();

    for entry in entries {
        let title = entry.title();
        if title.is_empty() || registry.contains(title) {
            continue;
        }
        let base = entry.block_offset();
        if base == 0 {
            continue;
        }
        let next = boundaries
            .iter()
            .copied()
            .find(|&b| b > base)
            .unwrap_or(file_len);
        let span = (next - base).min(MAX_PROBE_SPAN);
        let kinds = entry.suggest_types(file, file_len, span)?;
        debug!(
            "Probed record [{}] at {:#x}: {} candidate fields",
            title,
            base,
            kinds.len()
        );
        match order.iter().position(|t| t == title) {
            Some(i) => merge_kind_lists(&mut groups[i], &kinds),
            None => {
                order.push(title.to_string());
                groups.push(kinds);
            }
        }
    }

    let mut discovered = Vec::with_capacity(order.len());
    for (title, kinds) in order.into_iter().zip(groups) {
        let schema = MxeEntryType::discovered(title.clone(), &kinds);
        info!(
            "Discovered type [{}] with {} fields: {}",
            title,
            schema.field_count(),
            schema.headers.join(",")
        );
        registry.register(schema.clone());
        discovered.push(schema);
    }
    Ok(discovered)
}
