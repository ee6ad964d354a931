//! # mxe-edit
//!
//! A reader and in-place editor for MXE binary asset tables.
//!
//! An MXE file is a header-indexed table of fixed-size records whose
//! fields are tagged scalars or pointers to NUL-terminated strings
//! elsewhere in the file. This crate parses the table without per-type
//! schemas, infers a field schema for unconfigured record titles,
//! exports records to editable CSV files, re-imports edited values, and
//! rewrites the original file in place without changing its size or
//! layout.
pub mod mxe;

// Re-export the main types for convenience
pub use mxe::{
    config,
    csv::CsvOptions,
    error::{MxeError, Result},
    types::{MxeEntryType, SchemaSource, TypeRegistry, ValueKind},
    MxeParser,
};
