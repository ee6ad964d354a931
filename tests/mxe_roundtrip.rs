use std::fs;
use std::path::{Path, PathBuf};

use mxe_edit::mxe::address::DATA_BASE;
use mxe_edit::{CsvOptions, MxeEntryType, MxeParser, SchemaSource, TypeRegistry};
use tempfile::TempDir;

const TABLE_COUNT_ADDR: usize = 0x84;
const TABLE_START_ADDR: usize = 0x88;

// Layout of the synthetic sample file (real offsets):
//   0x90  table, two 16-byte slots
//   0xB0  record block A: int 5, pointer -> "abc"
//   0xB8  record block B: float 1.5, pointer -> "a,b"
//   0xC0  "VlUnknownThing\0" (shared title)
//   0xCF  "abc\0"
//   0xD3  "a,b\0"
const TABLE_AT: u64 = 0x90;
const BLOCK_A: u64 = 0xB0;
const BLOCK_B: u64 = 0xB8;
const TITLE_AT: u64 = 0xC0;
const STR_ABC: u64 = 0xCF;
const STR_AB: u64 = 0xD3;
const FILE_LEN: usize = 0xD8;

struct MxeImage {
    bytes: Vec<u8>,
}

impl MxeImage {
    fn new(len: usize) -> Self {
        Self {
            bytes: vec![0u8; len],
        }
    }

    fn put_word(&mut self, off: u64, v: u32) {
        let off = off as usize;
        self.bytes[off..off + 4].copy_from_slice(&v.to_be_bytes());
    }

    fn put_cstr(&mut self, off: u64, s: &str) {
        let off = off as usize;
        self.bytes[off..off + s.len()].copy_from_slice(s.as_bytes());
        self.bytes[off + s.len()] = 0;
    }
}

fn va(real: u64) -> u32 {
    (real - DATA_BASE) as u32
}

/// Build the sample image. Record A suggests kinds [i, p], record B
/// suggests [f, p]; unification must yield [f, p].
fn build_sample(second_index: u32) -> Vec<u8> {
    let mut img = MxeImage::new(FILE_LEN);
    img.put_word(TABLE_COUNT_ADDR as u64, 2);
    img.put_word(TABLE_START_ADDR as u64, va(TABLE_AT));

    // Slot A: index 0, title, type code 4, block A.
    img.put_word(TABLE_AT, 0);
    img.put_word(TABLE_AT + 4, va(TITLE_AT));
    img.put_word(TABLE_AT + 8, 4);
    img.put_word(TABLE_AT + 12, va(BLOCK_A));

    // Slot B: same title and type code, block B.
    img.put_word(TABLE_AT + 16, second_index);
    img.put_word(TABLE_AT + 20, va(TITLE_AT));
    img.put_word(TABLE_AT + 24, 4);
    img.put_word(TABLE_AT + 28, va(BLOCK_B));

    img.put_word(BLOCK_A, 5);
    img.put_word(BLOCK_A + 4, va(STR_ABC));
    img.put_word(BLOCK_B, 1.5f32.to_bits());
    img.put_word(BLOCK_B + 4, va(STR_AB));

    img.put_cstr(TITLE_AT, "VlUnknownThing");
    img.put_cstr(STR_ABC, "abc");
    img.put_cstr(STR_AB, "a,b");
    img.bytes
}

fn write_sample(dir: &Path) -> PathBuf {
    let path = dir.join("sample.mxe");
    fs::write(&path, build_sample(1)).expect("write sample");
    path
}

fn read_lines(path: &Path) -> Vec<String> {
    fs::read_to_string(path)
        .unwrap_or_else(|e| panic!("failed to read {}: {}", path.display(), e))
        .lines()
        .map(str::to_string)
        .collect()
}

#[test]
fn discovers_and_unifies_schema_across_records() {
    let dir = TempDir::new().expect("tempdir");
    let path = write_sample(dir.path());
    let parser = MxeParser::open(&path, TypeRegistry::new()).expect("open mxe");

    assert_eq!(parser.entry_count(), 2);
    assert_eq!(parser.discovered_types().len(), 1);
    let schema = &parser.discovered_types()[0];
    assert_eq!(schema.title, "VlUnknownThing");
    assert_eq!(schema.headers, vec!["f", "p"]);
    assert_eq!(schema.source, SchemaSource::Discovered);
    assert!(parser.registry().contains("VlUnknownThing"));

    // The dump file records the discovery for later promotion.
    let dump = read_lines(&parser.basedir().join("discovered-types.txt"));
    assert_eq!(dump, vec!["VlUnknownThing=f,p"]);
}

#[test]
fn exports_grouped_data_and_index_csvs() {
    let dir = TempDir::new().expect("tempdir");
    let path = write_sample(dir.path());
    let parser = MxeParser::open(&path, TypeRegistry::new()).expect("open mxe");
    let opts = CsvOptions::default();
    parser.write_indexes();
    parser.write_csv(&opts);

    let data = read_lines(&parser.basedir().join("4-VlUnknownThing-OTHER-Data.csv"));
    assert_eq!(data[0], "iMxeIndex,iMxeVm,f,p,");
    assert!(data[1].starts_with("0,VlUnknownThing,"));
    assert!(data[1].ends_with(",abc,"), "row was {:?}", data[1]);
    assert_eq!(data[2], "1,VlUnknownThing,1.5,a~b,");

    let all = read_lines(&parser.basedir().join("All-Indexes.csv"));
    assert_eq!(
        all,
        vec![
            "iIndex,pVm,iType,pAddr",
            "0,VlUnknownThing,4,0x00000090",
            "1,VlUnknownThing,4,0x00000098",
        ]
    );
    assert!(parser
        .basedir()
        .join("4-VlUnknownThing-OTHER-Index.csv")
        .exists());
}

#[test]
fn discovery_is_deterministic_across_runs() {
    let dir = TempDir::new().expect("tempdir");
    let path = write_sample(dir.path());
    let opts = CsvOptions::default();

    let parser = MxeParser::open(&path, TypeRegistry::new()).expect("first open");
    parser.write_csv(&opts);
    let csv_path = parser.basedir().join("4-VlUnknownThing-OTHER-Data.csv");
    let first = fs::read_to_string(&csv_path).expect("first export");

    let parser = MxeParser::open(&path, TypeRegistry::new()).expect("second open");
    parser.write_csv(&opts);
    let second = fs::read_to_string(&csv_path).expect("second export");

    assert_eq!(first, second);
}

#[test]
fn import_rewrites_values_in_place() {
    let dir = TempDir::new().expect("tempdir");
    let path = write_sample(dir.path());
    let opts = CsvOptions::default();
    let mut parser = MxeParser::open(&path, TypeRegistry::new()).expect("open mxe");
    parser.write_csv(&opts);

    let csv_path = parser.basedir().join("4-VlUnknownThing-OTHER-Data.csv");
    let edited = fs::read_to_string(&csv_path)
        .expect("read export")
        .replace("1.5", "2.5")
        .replace("a~b", "x~y");
    fs::write(&csv_path, edited).expect("write edited csv");

    assert!(parser.read_csvs(&opts), "expected a change to be found");
    parser.write_mxe();

    let bytes = fs::read(&path).expect("read rewritten file");
    assert_eq!(bytes.len(), FILE_LEN, "rewrite must not resize the file");
    assert_eq!(
        &bytes[BLOCK_B as usize..BLOCK_B as usize + 4],
        &2.5f32.to_bits().to_be_bytes()
    );
    assert_eq!(&bytes[STR_AB as usize..STR_AB as usize + 3], b"x,y");
    assert_eq!(bytes[STR_AB as usize + 3], 0, "terminator must survive");
    // Untouched record A block.
    assert_eq!(&bytes[BLOCK_A as usize..BLOCK_A as usize + 4], &[0, 0, 0, 5]);

    // A fresh parse sees the edited values.
    let reopened = MxeParser::open(&path, TypeRegistry::new()).expect("reopen");
    let fields = reopened.entries()[1].fields();
    assert_eq!(fields[0].value(&opts), "2.5");
    assert_eq!(fields[1].value(&opts), "x~y");
}

#[test]
fn pointer_length_guard_leaves_file_untouched() {
    let dir = TempDir::new().expect("tempdir");
    let path = write_sample(dir.path());
    let original = fs::read(&path).expect("read original");
    let opts = CsvOptions::default();
    let mut parser = MxeParser::open(&path, TypeRegistry::new()).expect("open mxe");
    parser.write_csv(&opts);

    let csv_path = parser.basedir().join("4-VlUnknownThing-OTHER-Data.csv");
    let edited = fs::read_to_string(&csv_path)
        .expect("read export")
        .replace("a~b", "abcd");
    fs::write(&csv_path, edited).expect("write edited csv");

    assert!(!parser.read_csvs(&opts), "length mismatch must be rejected");
    parser.write_mxe();
    assert_eq!(fs::read(&path).expect("reread"), original);
}

#[test]
fn rejects_rows_with_wrong_column_count() {
    let dir = TempDir::new().expect("tempdir");
    let path = write_sample(dir.path());
    let opts = CsvOptions::default();
    let mut parser = MxeParser::open(&path, TypeRegistry::new()).expect("open mxe");
    parser.write_csv(&opts);

    let csv_path = parser.basedir().join("4-VlUnknownThing-OTHER-Data.csv");
    let edited = fs::read_to_string(&csv_path)
        .expect("read export")
        .replace("1.5,a~b,", "2.5,a~b,extra,");
    fs::write(&csv_path, edited).expect("write edited csv");

    assert!(!parser.read_csvs(&opts));
    let fields = parser.entries()[1].fields();
    assert_eq!(fields[0].value(&opts), "1.5", "row must be left unapplied");
}

#[test]
fn misnamed_csv_files_are_skipped() {
    let dir = TempDir::new().expect("tempdir");
    let path = write_sample(dir.path());
    let opts = CsvOptions::default();
    let mut parser = MxeParser::open(&path, TypeRegistry::new()).expect("open mxe");

    fs::write(
        parser.basedir().join("Whatever-Data.csv"),
        "iMxeIndex,iMxeVm,f,p,\n0,VlUnknownThing,9.5,abc,\n",
    )
    .expect("write stray csv");

    assert!(!parser.read_csvs(&opts));
}

#[test]
fn configured_types_skip_discovery_and_other_marker() {
    let dir = TempDir::new().expect("tempdir");
    let path = write_sample(dir.path());
    let mut registry = TypeRegistry::new();
    registry.register(MxeEntryType::new(
        "VlUnknownThing",
        vec!["pX".into(), "pName".into()],
        SchemaSource::Configured,
    ));

    let parser = MxeParser::open(&path, registry).expect("open mxe");
    assert!(parser.discovered_types().is_empty());

    let opts = CsvOptions::default();
    parser.write_csv(&opts);
    let data = read_lines(&parser.basedir().join("4-VlUnknownThing-Data.csv"));
    assert_eq!(data[0], "iMxeIndex,iMxeVm,pX,pName,");
    // Record B's first word is no valid pointer: out-of-range targets
    // fall back to the raw hex word instead of failing the parse.
    assert_eq!(data[2], "1,VlUnknownThing,0x3FC00000,a~b,");
}

#[test]
fn duplicate_record_indexes_keep_the_last_entry() {
    let dir = TempDir::new().expect("tempdir");
    let path = dir.path().join("dup.mxe");
    fs::write(&path, build_sample(0)).expect("write sample");

    let parser = MxeParser::open(&path, TypeRegistry::new()).expect("open mxe");
    assert_eq!(parser.entry_count(), 1);
    assert_eq!(parser.entries()[0].block_offset(), BLOCK_B);
}

#[test]
fn rewrite_without_changes_is_byte_identical() {
    let dir = TempDir::new().expect("tempdir");
    let path = write_sample(dir.path());
    let original = fs::read(&path).expect("read original");

    let parser = MxeParser::open(&path, TypeRegistry::new()).expect("open mxe");
    parser.write_mxe();
    assert_eq!(fs::read(&path).expect("reread"), original);
}
