//! Loading of manually-known type schemas and dumping of discovered ones.
//!
//! The config file is plain text, one schema per line:
//!
//! ```text
//! # comment
//! VlMxMapObjectCommonInfo=iId,pName,fPosX,fPosY,fPosZ,,hFlags
//! ```
//!
//! An empty header between commas marks an unnamed (padding) field.
//! Discovered schemas are appended to a dump file in the same syntax so
//! they can be reviewed and promoted into the config.

use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::Path;

use log::{info, warn};

use super::error::Result;
use super::types::{MxeEntryType, SchemaSource, TypeRegistry};

/// Parse one config line into a (title, headers) pair. Comments and
/// blank lines yield `None`.
fn parse_line(line: &str) -> Option<(String, Vec<String>)> {
    let line = line.trim();
    if line.is_empty() || line.starts_with('#') {
        return None;
    }
    let (title, rest) = line.split_once('=')?;
    let title = title.trim();
    if title.is_empty() {
        return None;
    }
    let headers = rest.split(',').map(|h| h.trim().to_string()).collect();
    Some((title.to_string(), headers))
}

/// Load configured schemas from `path`. A missing file is not an error:
/// every title in the source binary is then subject to discovery.
pub fn load(path: &Path) -> Result<TypeRegistry> {
    let mut registry = TypeRegistry::new();
    if !path.exists() {
        info!(
            "No config file at {}; all types will be discovered",
            path.display()
        );
        return Ok(registry);
    }
    let text = fs::read_to_string(path)?;
    for (num, line) in text.lines().enumerate() {
        let Some((title, headers)) = parse_line(line) else {
            if !line.trim().is_empty() && !line.trim_start().starts_with('#') {
                warn!(
                    "Malformed line {} in {}; skipping",
                    num + 1,
                    path.display()
                );
            }
            continue;
        };
        registry.register(MxeEntryType::new(title, headers, SchemaSource::Configured));
    }
    info!(
        "Loaded {} configured types from {}",
        registry.len(),
        path.display()
    );
    Ok(registry)
}

/// Append discovered schemas to the dump file for later review.
pub fn append_discovered(path: &Path, schemas: &[MxeEntryType]) -> io::Result<()> {
    if schemas.is_empty() {
        return Ok(());
    }
    let mut out = OpenOptions::new().create(true).append(true).open(path)?;
    for schema in schemas {
        writeln!(out, "{}={}", schema.title, schema.headers.join(","))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lines_parse_title_and_headers() {
        let (title, headers) = parse_line("VlThing=iId,pName,fX").unwrap();
        assert_eq!(title, "VlThing");
        assert_eq!(headers, vec!["iId", "pName", "fX"]);
    }

    #[test]
    fn empty_headers_mark_padding_fields() {
        let (_, headers) = parse_line("VlThing=iId,,hRest").unwrap();
        assert_eq!(headers, vec!["iId", "", "hRest"]);
    }

    #[test]
    fn comments_and_blanks_are_ignored() {
        assert!(parse_line("# a comment").is_none());
        assert!(parse_line("   ").is_none());
        assert!(parse_line("no separator here").is_none());
    }
}
