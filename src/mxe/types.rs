//! Value kinds, per-title schemas, and the schema registry.

use std::collections::HashMap;

/// The closed set of field value kinds, selected by the first character
/// of a field's header string.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueKind {
    /// 4-byte signed integer (`i`).
    Int,
    /// 4-byte virtual address of a NUL-terminated string (`p`).
    Pointer,
    /// 4-byte IEEE-754 single (`f`).
    Float,
    /// Same storage as `Int`, presented as hex (`h`).
    Hex,
    /// Dash-separated hex byte dump in disk order (`l`).
    OneByOne,
    /// Bit string of all raw bytes (`b`).
    Binary,
}

impl ValueKind {
    /// Map a header tag character to its kind.
    pub fn from_tag(c: char) -> Option<Self> {
        match c {
            'i' => Some(Self::Int),
            'p' => Some(Self::Pointer),
            'f' => Some(Self::Float),
            'h' => Some(Self::Hex),
            'l' => Some(Self::OneByOne),
            'b' => Some(Self::Binary),
            _ => None,
        }
    }

    /// Select the kind for a full header string. Empty headers and
    /// unknown tags fall back to `Hex`, the lossless presentation.
    pub fn from_header(header: &str) -> Self {
        header
            .chars()
            .next()
            .and_then(Self::from_tag)
            .unwrap_or(Self::Hex)
    }

    /// The tag character for this kind.
    pub fn tag(self) -> char {
        match self {
            Self::Int => 'i',
            Self::Pointer => 'p',
            Self::Float => 'f',
            Self::Hex => 'h',
            Self::OneByOne => 'l',
            Self::Binary => 'b',
        }
    }
}

/// Where a schema came from. Discovered schemas are flagged in the
/// exported CSV filenames so a user knows the layout was inferred.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchemaSource {
    /// Supplied by `config.txt` before the run.
    Configured,
    /// Synthesized by probing records during this run.
    Discovered,
}

/// An ordered field schema shared by all records of one title.
///
/// Each header's first character selects the field's [`ValueKind`];
/// configured schemas may carry empty headers for padding positions.
#[derive(Debug, Clone)]
pub struct MxeEntryType {
    pub title: String,
    pub headers: Vec<String>,
    pub source: SchemaSource,
}

impl MxeEntryType {
    pub fn new(title: impl Into<String>, headers: Vec<String>, source: SchemaSource) -> Self {
        Self {
            title: title.into(),
            headers,
            source,
        }
    }

    /// Build a discovered schema from unified kind tags.
    pub fn discovered(title: impl Into<String>, kinds: &[ValueKind]) -> Self {
        Self::new(
            title,
            kinds.iter().map(|k| k.tag().to_string()).collect(),
            SchemaSource::Discovered,
        )
    }

    pub fn field_count(&self) -> usize {
        self.headers.len()
    }
}

/// Name-to-schema registry for one file's processing.
///
/// Configured schemas are loaded before the file is opened; discovery
/// inserts its unified schemas exactly once, before any export or import
/// pass reads the registry. After that point the registry is only read.
#[derive(Debug, Default)]
pub struct TypeRegistry {
    types: HashMap<String, MxeEntryType>,
}

impl TypeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, title: &str) -> Option<&MxeEntryType> {
        self.types.get(title)
    }

    pub fn contains(&self, title: &str) -> bool {
        self.types.contains_key(title)
    }

    /// Register a schema. The first registration for a title wins;
    /// schemas are never re-unified within a run.
    pub fn register(&mut self, schema: MxeEntryType) {
        self.types.entry(schema.title.clone()).or_insert(schema);
    }

    pub fn len(&self) -> usize {
        self.types.len()
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_selection_follows_the_header_tag() {
        assert_eq!(ValueKind::from_header("iMxeIndex"), ValueKind::Int);
        assert_eq!(ValueKind::from_header("pName"), ValueKind::Pointer);
        assert_eq!(ValueKind::from_header("fScale"), ValueKind::Float);
        assert_eq!(ValueKind::from_header("lFlags"), ValueKind::OneByOne);
        assert_eq!(ValueKind::from_header("bMask"), ValueKind::Binary);
    }

    #[test]
    fn unknown_or_empty_headers_fall_back_to_hex() {
        assert_eq!(ValueKind::from_header(""), ValueKind::Hex);
        assert_eq!(ValueKind::from_header("xOdd"), ValueKind::Hex);
    }

    #[test]
    fn first_registration_wins() {
        let mut reg = TypeRegistry::new();
        reg.register(MxeEntryType::new(
            "VlThing",
            vec!["iA".into()],
            SchemaSource::Configured,
        ));
        reg.register(MxeEntryType::discovered("VlThing", &[ValueKind::Float]));
        assert_eq!(reg.get("VlThing").unwrap().headers, vec!["iA".to_string()]);
        assert_eq!(
            reg.get("VlThing").unwrap().source,
            SchemaSource::Configured
        );
    }
}
