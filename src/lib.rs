//! Labelconv: a stateless dataset annotation format engine.
//!
//! Labelconv detects, imports, and exports object detection datasets in
//! the three common interchange conventions (COCO JSON, YOLO, Pascal
//! VOC). It is built to sit behind an orchestrating host: every
//! invocation reads exactly one JSON request from stdin, does its work,
//! and writes exactly one JSON response to stdout. Importing never
//! mutates the source tree, and exporting produces a materialization
//! plan (directories, file contents, copy tasks) rather than touching
//! the disk itself.
//!
//! # Modules
//!
//! - [`ir`]: the normalized intermediate model importers produce
//! - [`formats`]: per-format detection, import, and export
//! - [`protocol`]: the request/response wire types
//! - [`dispatch`]: pure per-operation handlers
//! - [`error`]: error types for labelconv operations

pub mod dispatch;
pub mod error;
pub mod formats;
pub mod ir;
pub mod protocol;

use std::io::Read;

use clap::{Parser, Subcommand};

pub use error::LabelconvError;

use protocol::{
    DetectRequest, DetectResponse, ErrorItem, ExportRequest, ExportResponse, ImportRequest,
    ImportResponse,
};

/// The labelconv CLI application.
#[derive(Parser)]
#[command(name = "labelconv")]
#[command(version, author, about)]
#[command(propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

/// Available subcommands. Each reads one JSON request from stdin and
/// writes one JSON response to stdout.
#[derive(Subcommand)]
enum Commands {
    /// Score a directory tree against the supported dataset formats.
    Detect,

    /// Import a dataset into the normalized model.
    Import,

    /// Plan an export of a normalized dataset into a target format.
    Export,
}

/// Run the labelconv CLI.
///
/// This is the main entry point for the CLI, called from `main.rs`.
/// A malformed request still produces a well-formed response (and exit
/// code zero); only I/O failures surface as errors.
pub fn run() -> Result<(), LabelconvError> {
    let cli = Cli::parse();

    let Some(command) = cli.command else {
        println!("labelconv {}", env!("CARGO_PKG_VERSION"));
        println!();
        println!("Stateless dataset annotation format engine.");
        println!();
        println!("Run 'labelconv --help' for usage information.");
        return Ok(());
    };

    let mut input = String::new();
    std::io::stdin().read_to_string(&mut input)?;

    let output = match command {
        Commands::Detect => encode(&run_detect(&input))?,
        Commands::Import => encode(&run_import(&input))?,
        Commands::Export => encode(&run_export(&input))?,
    };
    println!("{output}");
    Ok(())
}

fn encode<T: serde::Serialize>(response: &T) -> Result<String, LabelconvError> {
    serde_json::to_string(response).map_err(LabelconvError::ResponseEncode)
}

fn run_detect(input: &str) -> DetectResponse {
    match serde_json::from_str::<DetectRequest>(input) {
        Ok(request) => dispatch::detect(&request),
        Err(err) => {
            eprintln!("labelconv: invalid detect request: {err}");
            DetectResponse::unsupported("Failed to parse request")
        }
    }
}

fn run_import(input: &str) -> ImportResponse {
    match serde_json::from_str::<ImportRequest>(input) {
        Ok(request) => dispatch::import(&request),
        Err(err) => {
            eprintln!("labelconv: invalid import request: {err}");
            ImportResponse::from_error(ErrorItem::new(
                protocol::error_codes::INVALID_REQUEST,
                "Failed to parse import request",
            ))
        }
    }
}

fn run_export(input: &str) -> ExportResponse {
    match serde_json::from_str::<ExportRequest>(input) {
        Ok(request) => dispatch::export(&request),
        Err(err) => {
            eprintln!("labelconv: invalid export request: {err}");
            ExportResponse::from_error(ErrorItem::new(
                protocol::error_codes::INVALID_REQUEST,
                "Failed to parse export request",
            ))
        }
    }
}
