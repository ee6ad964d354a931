use mxe_edit::{config, CsvOptions, MxeParser, TypeRegistry};
use std::env;
use std::path::Path;

const CONFIG_FILE: &str = "config.txt";

fn main() {
    env_logger::init();

    let args: Vec<String> = env::args().collect();

    if args.len() < 2 {
        eprintln!(
            "Usage: {} <path-to-mxe-file> [--import] [--quiet] [--literal] [--hex]",
            args[0]
        );
        std::process::exit(1);
    }

    let mxe_path = &args[1];
    let mut import = false;
    let mut opts = CsvOptions::default();
    for arg in &args[2..] {
        match arg.as_str() {
            "--import" => import = true,
            "--quiet" => opts.verbose = false,
            "--literal" => opts.literal = true,
            "--hex" => opts.hex = true,
            other => {
                eprintln!("ERROR: Unknown argument [{}]", other);
                std::process::exit(1);
            }
        }
    }

    let registry = match config::load(Path::new(CONFIG_FILE)) {
        Ok(r) => r,
        Err(e) => {
            eprintln!("ERROR: Failed to load {}", CONFIG_FILE);
            eprintln!("  {}", e);
            std::process::exit(1);
        }
    };

    println!("Reading MXE file: {}", mxe_path);
    println!("{}", "=".repeat(60));

    let mut parser = match MxeParser::open(mxe_path, registry) {
        Ok(p) => p,
        Err(e) => {
            eprintln!("\nERROR: Failed to read MXE file");
            eprintln!("  {}", e);
            std::process::exit(1);
        }
    };

    println!("\nTable Information:");
    println!("  Records: {}", parser.entry_count());
    println!("  Known types: {}", parser.registry().len());
    println!("  Discovered this run: {}", parser.discovered_types().len());
    for schema in parser.discovered_types() {
        println!(
            "    {} ({} fields: {})",
            schema.title,
            schema.field_count(),
            schema.headers.join(",")
        );
    }

    if import {
        println!("\nReading edited CSV files from {}", parser.basedir().display());
        if parser.read_csvs(&opts) {
            println!("Changes found; rewriting {} in place.", mxe_path);
            parser.write_mxe();
        } else {
            println!("No changes found; file left untouched.");
        }
    } else {
        println!("\nWriting CSV files to {}", parser.basedir().display());
        parser.write_indexes();
        parser.write_csv(&opts);
    }

    println!("\n{}", "=".repeat(60));
    println!("Done.");
}
