//! Wire contract for the three process-boundary operations.
//!
//! Each invocation consumes one serialized request object and produces
//! exactly one serialized response object. The field identifiers here are
//! the interoperability contract with the orchestrating system and must
//! not change; internal naming is free to differ (hence the pervasive
//! `rename` attributes).
//!
//! Failure never travels through the process exit status: structural
//! problems become an error response, configuration problems become an
//! `errors[]` entry next to empty result arrays, and per-record problems
//! are only visible as skipped counters.

use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;

use crate::ir::{AnnotationDef, CategoryDef, Geometry, ImageRef, ImportStats};

/// Stable identifier of this engine on the plugin wire.
pub const PLUGIN_ID: &str = "dataset.common";

/// Prefix of fully-qualified format ids (`dataset.common:coco`, ...).
pub const FORMAT_ID_PREFIX: &str = "dataset.common:";

// ============================================================================
// Error items
// ============================================================================

/// Advisory error entry. Only fatal when it is the sole output.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ErrorItem {
    pub code: String,
    pub message: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<BTreeMap<String, serde_json::Value>>,
}

impl ErrorItem {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            details: None,
        }
    }

    pub fn with_detail(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.details
            .get_or_insert_with(BTreeMap::new)
            .insert(key.into(), value.into());
        self
    }
}

/// Error codes emitted by the engine.
pub mod error_codes {
    pub const INVALID_REQUEST: &str = "invalid_request";
    pub const UNKNOWN_FORMAT: &str = "unknown_format";
    pub const UNSUPPORTED_FORMAT: &str = "unsupported_format";
    pub const MISSING_ANNOTATION_FILE: &str = "missing_annotation_file";
    pub const INVALID_ANNOTATION_FILE: &str = "invalid_annotation_file";
    pub const MISSING_LABELS_DIR: &str = "missing_labels_dir";
    pub const NO_LABEL_FILES: &str = "no_label_files";
    pub const MISSING_ANNOTATIONS_DIR: &str = "missing_annotations_dir";
    pub const NO_ANNOTATION_FILES: &str = "no_annotation_files";
}

// ============================================================================
// Detect
// ============================================================================

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct DetectRequest {
    #[serde(rename = "rootPath")]
    pub root_path: String,

    /// Advisory format hint from the caller; detection re-scores all
    /// formats regardless, so the hint is accepted but not binding.
    #[serde(rename = "hintFormat", default, skip_serializing_if = "Option::is_none")]
    pub hint_format: Option<String>,

    #[serde(default, skip_serializing_if = "ImportParams::is_empty")]
    pub params: ImportParams,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DetectResponse {
    pub supported: bool,
    pub score: f64,
    pub reason: String,

    #[serde(rename = "formatId")]
    pub format_id: String,
}

impl DetectResponse {
    /// The "nothing recognized here" response.
    pub fn unsupported(reason: impl Into<String>) -> Self {
        Self {
            supported: false,
            score: 0.0,
            reason: reason.into(),
            format_id: PLUGIN_ID.to_string(),
        }
    }
}

// ============================================================================
// Import
// ============================================================================

/// Optional caller overrides for import resolution. Relative paths are
/// joined to the request's root path. Unknown params are preserved in
/// `extra` and ignored.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ImportParams {
    #[serde(rename = "annotationFile", default, skip_serializing_if = "Option::is_none")]
    pub annotation_file: Option<String>,

    #[serde(rename = "imagesDir", default, skip_serializing_if = "Option::is_none")]
    pub images_dir: Option<String>,

    #[serde(rename = "labelsDir", default, skip_serializing_if = "Option::is_none")]
    pub labels_dir: Option<String>,

    #[serde(rename = "classesFile", default, skip_serializing_if = "Option::is_none")]
    pub classes_file: Option<String>,

    /// Explicit format override; `"auto"` (or absence) means detect.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub format: Option<String>,

    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

impl ImportParams {
    pub fn is_empty(&self) -> bool {
        self.annotation_file.is_none()
            && self.images_dir.is_none()
            && self.labels_dir.is_none()
            && self.classes_file.is_none()
            && self.format.is_none()
            && self.extra.is_empty()
    }
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ImportRequest {
    #[serde(rename = "rootPath")]
    pub root_path: String,

    #[serde(rename = "formatId", default)]
    pub format_id: String,

    #[serde(default)]
    pub params: ImportParams,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ImportResponse {
    pub images: Vec<ImageRef>,
    pub categories: Vec<CategoryDef>,
    pub annotations: Vec<AnnotationDef>,
    pub stats: ImportStats,
    pub errors: Vec<ErrorItem>,
}

impl ImportResponse {
    /// A response carrying a single configuration error and zero results.
    pub fn from_error(error: ErrorItem) -> Self {
        Self {
            errors: vec![error],
            ..Default::default()
        }
    }
}

// ============================================================================
// Export
// ============================================================================

/// Caller-assigned split label. Anything unrecognized collapses to the
/// documented default of `train`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Split {
    #[default]
    Train,
    Val,
    Test,
}

impl Split {
    pub const ALL: [Split; 3] = [Split::Train, Split::Val, Split::Test];

    pub fn as_str(&self) -> &'static str {
        match self {
            Split::Train => "train",
            Split::Val => "val",
            Split::Test => "test",
        }
    }
}

impl<'de> Deserialize<'de> for Split {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Ok(match raw.as_str() {
            "val" => Split::Val,
            "test" => Split::Test,
            _ => Split::Train,
        })
    }
}

/// An image as the caller hands it back for export: resolved absolute
/// path, pixel dimensions, and a pre-assigned split.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ExportImage {
    pub key: String,

    #[serde(rename = "relativePath")]
    pub relative_path: String,

    #[serde(rename = "absolutePath", default)]
    pub absolute_path: String,

    #[serde(default)]
    pub width: u32,

    #[serde(default)]
    pub height: u32,

    #[serde(default)]
    pub split: Split,
}

/// A category with its caller-assigned integer id.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ExportCategory {
    pub id: i64,
    pub name: String,

    #[serde(rename = "type", default)]
    pub kind: String,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub color: String,

    /// Category metadata as a JSON string (keypoint slot names, skeleton).
    /// The orchestrator's wire spells this field `mate`; `meta` is
    /// accepted as an alias.
    #[serde(rename = "mate", alias = "meta", default, skip_serializing_if = "String::is_empty")]
    pub mate: String,
}

impl ExportCategory {
    /// Parses the keypoint slot names out of the `mate` JSON, if any.
    pub fn keypoint_names(&self) -> Vec<String> {
        #[derive(Deserialize)]
        struct Mate {
            #[serde(default)]
            keypoints: Vec<MateSlot>,
        }
        #[derive(Deserialize)]
        struct MateSlot {
            #[serde(default)]
            name: String,
        }

        if self.mate.is_empty() {
            return Vec::new();
        }
        serde_json::from_str::<Mate>(&self.mate)
            .map(|mate| mate.keypoints.into_iter().map(|slot| slot.name).collect())
            .unwrap_or_default()
    }
}

/// An annotation in export-time shape: integer category id, same tagged
/// geometry union as import.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ExportAnnotation {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,

    #[serde(rename = "imageKey")]
    pub image_key: String,

    #[serde(rename = "categoryId")]
    pub category_id: i64,

    #[serde(flatten)]
    pub geometry: Geometry,
}

/// Split ratios supplied by the caller. Advisory only: splits are already
/// assigned per image, so exporters never consult the ratios.
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize)]
pub struct SplitConfig {
    #[serde(default)]
    pub train: u32,
    #[serde(default)]
    pub val: u32,
    #[serde(default)]
    pub test: u32,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ExportRequest {
    pub format: String,

    #[serde(rename = "outputDir", default)]
    pub output_dir: String,

    #[serde(default)]
    pub images: Vec<ExportImage>,

    #[serde(default)]
    pub categories: Vec<ExportCategory>,

    #[serde(default)]
    pub annotations: Vec<ExportAnnotation>,

    #[serde(default)]
    pub split: SplitConfig,
}

/// One text file the caller should write.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileOutput {
    pub path: String,
    pub content: String,
}

/// One image copy the caller should perform.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CopyTask {
    pub from: String,
    pub to: String,
}

/// The materialization plan: everything the caller must do on disk,
/// described but not performed.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ExportStructure {
    pub directories: Vec<String>,
    pub files: Vec<FileOutput>,

    #[serde(rename = "copyImages")]
    pub copy_images: Vec<CopyTask>,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExportStats {
    #[serde(rename = "imageCount")]
    pub image_count: usize,

    #[serde(rename = "annotationCount")]
    pub annotation_count: usize,

    #[serde(rename = "trainCount")]
    pub train_count: usize,

    #[serde(rename = "valCount")]
    pub val_count: usize,

    #[serde(rename = "testCount")]
    pub test_count: usize,
}

impl ExportStats {
    /// Counts one image toward its split bucket.
    pub fn record_split(&mut self, split: Split) {
        match split {
            Split::Train => self.train_count += 1,
            Split::Val => self.val_count += 1,
            Split::Test => self.test_count += 1,
        }
    }
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ExportResponse {
    pub success: bool,
    pub structure: ExportStructure,
    pub stats: ExportStats,
    pub errors: Vec<ErrorItem>,
}

impl ExportResponse {
    pub fn from_error(error: ErrorItem) -> Self {
        Self {
            success: false,
            errors: vec![error],
            ..Default::default()
        }
    }
}
