//! Operation dispatch: one pure handler per wire operation.
//!
//! Handlers take a parsed request and return a response value; they
//! never touch stdin or stdout themselves, which keeps them directly
//! testable and leaves the process plumbing to the CLI layer.

use std::path::Path;

use crate::formats::{self, DatasetFormat};
use crate::protocol::{
    error_codes, DetectRequest, DetectResponse, ErrorItem, ExportRequest, ExportResponse,
    ImportRequest, ImportResponse, FORMAT_ID_PREFIX,
};

/// Scores the request's root against every known format and reports the
/// best match. The format hint, if any, is advisory and does not bias
/// the scoring.
pub fn detect(request: &DetectRequest) -> DetectResponse {
    let root = Path::new(&request.root_path);

    match formats::best_match(root) {
        Some(best) => DetectResponse {
            supported: true,
            score: best.score,
            reason: format!("[{}] {}", best.format.display_name(), best.reason),
            format_id: best.format.format_id(),
        },
        None => {
            DetectResponse::unsupported("No supported dataset format detected (COCO/YOLO/VOC)")
        }
    }
}

/// Resolves the dataset format and runs the matching importer.
///
/// Resolution order: the explicit `format` param (unless `auto`), then
/// the request's format id, then auto-detection.
pub fn import(request: &ImportRequest) -> ImportResponse {
    let root = Path::new(&request.root_path);

    let format = match resolve_import_format(request, root) {
        Ok(format) => format,
        Err(error) => return ImportResponse::from_error(error),
    };

    match format {
        DatasetFormat::Coco => formats::coco::import(root, &request.params),
        DatasetFormat::Yolo => formats::yolo::import(root, &request.params),
        DatasetFormat::Voc => formats::voc::import(root, &request.params),
    }
}

fn resolve_import_format(request: &ImportRequest, root: &Path) -> Result<DatasetFormat, ErrorItem> {
    if let Some(tag) = request.params.format.as_deref().filter(|tag| *tag != "auto") {
        return DatasetFormat::from_tag(tag).ok_or_else(|| {
            ErrorItem::new(error_codes::UNKNOWN_FORMAT, format!("Unknown format: {tag}"))
        });
    }

    let tag = request
        .format_id
        .strip_prefix(FORMAT_ID_PREFIX)
        .unwrap_or(&request.format_id);
    if let Some(format) = DatasetFormat::from_tag(tag) {
        return Ok(format);
    }

    formats::best_match(root)
        .map(|best| best.format)
        .ok_or_else(|| {
            ErrorItem::new(
                error_codes::UNKNOWN_FORMAT,
                "Could not determine dataset format. Please specify format parameter.",
            )
        })
}

/// Runs the exporter named by the request's format.
pub fn export(request: &ExportRequest) -> ExportResponse {
    let tag = request
        .format
        .strip_prefix(FORMAT_ID_PREFIX)
        .unwrap_or(&request.format);

    match DatasetFormat::from_tag(tag) {
        Some(DatasetFormat::Coco) => formats::coco::export(request),
        Some(DatasetFormat::Yolo) => formats::yolo::export(request),
        Some(DatasetFormat::Voc) => formats::voc::export(request),
        None => ExportResponse::from_error(ErrorItem::new(
            error_codes::UNSUPPORTED_FORMAT,
            format!("Unsupported export format: {}", request.format),
        )),
    }
}
