//! The three supported dataset formats and their shared plumbing.
//!
//! Each format module owns its full lifecycle: structural detection,
//! import into the intermediate model, and export into a materialization
//! plan. This module holds the closed format enum the dispatcher matches
//! on, the detection scoring type, and the filesystem scanning helpers
//! all three formats share.

pub mod coco;
pub mod voc;
pub mod yolo;

use std::fs;
use std::path::{Path, PathBuf};

use walkdir::WalkDir;

/// Image file extensions recognized across all formats, matched
/// case-insensitively. Order matters: extension-swap lookups try these
/// in order and the first hit wins.
pub const IMAGE_EXTENSIONS: [&str; 5] = ["jpg", "jpeg", "png", "bmp", "webp"];

/// Filenames that look like YOLO labels but are class-name files.
pub const YOLO_NAME_FILES: [&str; 3] = ["classes.txt", "data.names", "obj.names"];

/// A supported dataset convention. Closed on purpose: adding a format is
/// a compile-time-checked change at every dispatch site.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DatasetFormat {
    Coco,
    Yolo,
    Voc,
}

impl DatasetFormat {
    /// Registration order; doubles as the detection tie-break priority.
    pub const ALL: [DatasetFormat; 3] = [DatasetFormat::Coco, DatasetFormat::Yolo, DatasetFormat::Voc];

    /// Short wire tag (`coco`, `yolo`, `voc`).
    pub fn tag(&self) -> &'static str {
        match self {
            DatasetFormat::Coco => "coco",
            DatasetFormat::Yolo => "yolo",
            DatasetFormat::Voc => "voc",
        }
    }

    /// Human-readable name used in detection reasons.
    pub fn display_name(&self) -> &'static str {
        match self {
            DatasetFormat::Coco => "COCO",
            DatasetFormat::Yolo => "YOLO",
            DatasetFormat::Voc => "Pascal VOC",
        }
    }

    /// Fully-qualified wire format id.
    pub fn format_id(&self) -> String {
        format!("{}{}", crate::protocol::FORMAT_ID_PREFIX, self.tag())
    }

    pub fn from_tag(tag: &str) -> Option<Self> {
        match tag {
            "coco" => Some(DatasetFormat::Coco),
            "yolo" => Some(DatasetFormat::Yolo),
            "voc" => Some(DatasetFormat::Voc),
            _ => None,
        }
    }
}

impl std::fmt::Display for DatasetFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.tag())
    }
}

/// Structural confidence that a directory tree follows one format.
#[derive(Clone, Debug)]
pub struct FormatScore {
    pub format: DatasetFormat,
    pub score: f64,
    pub reason: String,
}

impl FormatScore {
    pub fn none(format: DatasetFormat, reason: impl Into<String>) -> Self {
        Self {
            format,
            score: 0.0,
            reason: reason.into(),
        }
    }
}

/// Scores all formats against a root, highest first. The sort is stable,
/// so equal scores fall back to registration order (COCO > YOLO > VOC);
/// ties should not occur on valid inputs but the contract stays
/// deterministic either way.
pub fn detect_all(root: &Path) -> Vec<FormatScore> {
    let mut scores = vec![
        coco::detect(root),
        yolo::detect(root),
        voc::detect(root),
    ];
    scores.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
    scores
}

/// The best non-zero match, if any.
pub fn best_match(root: &Path) -> Option<FormatScore> {
    detect_all(root).into_iter().next().filter(|s| s.score > 0.0)
}

// ============================================================================
// Shared filesystem scanning helpers
// ============================================================================

/// Resolves a caller-supplied param path: absolute wins, relative joins
/// the dataset root.
pub(crate) fn resolve_param_path(root: &Path, value: &str) -> PathBuf {
    let path = Path::new(value);
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        root.join(path)
    }
}

/// First existing directory among `candidates` (relative to `root`).
pub(crate) fn first_existing_dir(root: &Path, candidates: &[&str]) -> Option<PathBuf> {
    candidates
        .iter()
        .map(|rel| root.join(rel))
        .find(|path| path.is_dir())
}

pub(crate) fn has_extension(path: &Path, allowed: &[&str]) -> bool {
    let Some(ext) = path.extension().and_then(|ext| ext.to_str()) else {
        return false;
    };
    allowed.iter().any(|allowed_ext| ext.eq_ignore_ascii_case(allowed_ext))
}

/// Non-recursive listing of files with one extension, sorted by name.
pub(crate) fn list_files_with_extension(dir: &Path, extension: &str) -> Vec<PathBuf> {
    let Ok(entries) = fs::read_dir(dir) else {
        return Vec::new();
    };

    let mut files: Vec<PathBuf> = entries
        .flatten()
        .map(|entry| entry.path())
        .filter(|path| path.is_file() && has_extension(path, &[extension]))
        .collect();
    files.sort();
    files
}

/// Recursive listing of files with any of the extensions, sorted by path
/// for deterministic downstream ordering. Traversal errors are skipped;
/// a partially unreadable tree still yields what it can.
pub(crate) fn walk_files_with_extensions(root: &Path, extensions: &[&str]) -> Vec<PathBuf> {
    let mut files: Vec<PathBuf> = WalkDir::new(root)
        .follow_links(true)
        .into_iter()
        .flatten()
        .filter(|entry| entry.file_type().is_file() && has_extension(entry.path(), extensions))
        .map(|entry| entry.path().to_path_buf())
        .collect();
    files.sort();
    files
}

/// Path relative to `root`, with forward slashes, for use as image keys
/// and relative paths on the wire.
pub(crate) fn rel_string(root: &Path, path: &Path) -> String {
    let rel = path.strip_prefix(root).unwrap_or(path);
    rel.to_string_lossy().replace('\\', "/")
}

/// Probes an image header for its dimensions. Failures are non-fatal:
/// formats that do not record dimensions simply leave the hint empty.
pub(crate) fn probe_dimensions(path: &Path) -> Option<(u32, u32)> {
    let size = imagesize::size(path).ok()?;
    let width = u32::try_from(size.width).ok()?;
    let height = u32::try_from(size.height).ok()?;
    Some((width, height))
}

/// True for the known non-label `.txt` filenames in YOLO trees.
pub(crate) fn is_yolo_name_file(path: &Path) -> bool {
    path.file_name()
        .and_then(|name| name.to_str())
        .map(|name| {
            let lower = name.to_ascii_lowercase();
            YOLO_NAME_FILES.iter().any(|known| *known == lower)
        })
        .unwrap_or(false)
}

/// One-level subdirectories of a root, sorted by name.
pub(crate) fn subdirectories(root: &Path) -> Vec<PathBuf> {
    let Ok(entries) = fs::read_dir(root) else {
        return Vec::new();
    };
    let mut dirs: Vec<PathBuf> = entries
        .flatten()
        .map(|entry| entry.path())
        .filter(|path| path.is_dir())
        .collect();
    dirs.sort();
    dirs
}

/// Filename stem (without extension) as a lossy string.
pub(crate) fn file_stem_string(path: &Path) -> String {
    path.file_stem()
        .map(|stem| stem.to_string_lossy().to_string())
        .unwrap_or_default()
}
