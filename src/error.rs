use std::path::PathBuf;
use thiserror::Error;

/// The main error type for labelconv operations.
///
/// Per-record problems (a bad label line, an annotation referencing an
/// unknown image) never surface here; importers count those in their
/// `skipped*` stats and keep going. This type covers failures that stop
/// a whole file or the process boundary itself: unreadable files,
/// malformed JSON/XML/YAML documents, an unwritable stdout.
#[derive(Debug, Error)]
pub enum LabelconvError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse COCO JSON from {path}: {source}")]
    CocoJsonParse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Failed to parse VOC XML from {path}: {message}")]
    VocXmlParse { path: PathBuf, message: String },

    #[error("Failed to serialize response: {0}")]
    ResponseEncode(#[source] serde_json::Error),
}
