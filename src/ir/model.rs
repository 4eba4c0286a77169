//! Core entities of the format-agnostic intermediate model.
//!
//! All format-specific importers produce these types, and the dispatcher
//! hands them to the caller verbatim. Entities are keyed by opaque strings
//! rather than integer ids: the orchestrating system allocates integer ids
//! only after import, so the engine never has to coordinate id spaces.
//! Every entity is created fresh per import call and never mutated after.

use serde::{Deserialize, Serialize};

use super::geometry::{ExtraFields, Geometry};

/// One physical image file discovered during import.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ImageRef {
    /// Opaque unique string; import-time identity.
    pub key: String,

    /// Path relative to the dataset root.
    #[serde(rename = "relativePath")]
    pub relative_path: String,

    /// Optional width/height and format-specific hints.
    #[serde(default, skip_serializing_if = "ImageMeta::is_empty")]
    pub meta: ImageMeta,
}

impl ImageRef {
    /// Creates an image ref whose key doubles as the relative path.
    pub fn new(relative_path: impl Into<String>) -> Self {
        let relative_path = relative_path.into();
        Self {
            key: relative_path.clone(),
            relative_path,
            meta: ImageMeta::default(),
        }
    }

    pub fn with_dimensions(mut self, width: u32, height: u32) -> Self {
        self.meta.width = Some(width);
        self.meta.height = Some(height);
        self
    }
}

/// Known image hints plus a residual bag for anything format-specific.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ImageMeta {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub width: Option<u32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub height: Option<u32>,

    #[serde(flatten)]
    pub extra: ExtraFields,
}

impl ImageMeta {
    pub fn is_empty(&self) -> bool {
        self.width.is_none() && self.height.is_none() && self.extra.is_empty()
    }
}

/// What a category describes. Keypoint categories only ever exist as
/// satellites of a bbox category; no annotation carries one directly.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CategoryKind {
    Bbox,
    Keypoint,
}

/// One semantic class referenced by at least one annotation.
///
/// Importers never materialize unused classes: a class id that appears in
/// `classes.txt` but in zero label files produces no category.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CategoryDef {
    /// Opaque unique string key (`cat_<id>`, `class_<id>`, ...).
    pub key: String,

    pub name: String,

    #[serde(rename = "type")]
    pub kind: CategoryKind,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub color: String,

    #[serde(rename = "sortOrder", default, skip_serializing_if = "is_zero")]
    pub sort_order: u32,

    #[serde(default, skip_serializing_if = "CategoryMeta::is_empty")]
    pub meta: CategoryMeta,
}

fn is_zero(value: &u32) -> bool {
    *value == 0
}

impl CategoryDef {
    /// A bbox category with the palette color for `order` (0-based).
    pub fn bbox(key: impl Into<String>, name: impl Into<String>, order: usize) -> Self {
        Self {
            key: key.into(),
            name: name.into(),
            kind: CategoryKind::Bbox,
            color: pick_color(order).to_string(),
            sort_order: order as u32 + 1,
            meta: CategoryMeta::default(),
        }
    }

    /// A keypoint category holding the ordered slot list.
    pub fn keypoint(
        key: impl Into<String>,
        name: impl Into<String>,
        order: usize,
        slots: Vec<KeypointSlot>,
    ) -> Self {
        Self {
            key: key.into(),
            name: name.into(),
            kind: CategoryKind::Keypoint,
            color: pick_color(order).to_string(),
            sort_order: order as u32 + 1,
            meta: CategoryMeta {
                keypoints: slots,
                ..Default::default()
            },
        }
    }

    pub fn with_keypoint_category(mut self, keypoint_key: impl Into<String>) -> Self {
        self.meta.keypoint_category_key = Some(keypoint_key.into());
        self
    }

    pub fn with_skeleton(mut self, skeleton: Vec<[u32; 2]>) -> Self {
        self.meta.skeleton = skeleton;
        self
    }
}

/// One named slot of a keypoint category, positional id starting at 1.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeypointSlot {
    pub id: u32,
    pub name: String,
}

impl KeypointSlot {
    /// Builds positionally-named slots `"1"`, `"2"`, ... as the YOLO
    /// importer needs when no semantic names exist.
    pub fn numbered(count: usize) -> Vec<Self> {
        (1..=count as u32)
            .map(|id| Self {
                id,
                name: id.to_string(),
            })
            .collect()
    }

    /// Builds slots from an ordered name list (COCO category keypoints).
    pub fn named(names: &[String]) -> Vec<Self> {
        names
            .iter()
            .enumerate()
            .map(|(idx, name)| Self {
                id: idx as u32 + 1,
                name: name.clone(),
            })
            .collect()
    }
}

/// Typed category metadata plus a residual untyped bag.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct CategoryMeta {
    /// Ordered keypoint slots; only populated on keypoint categories.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub keypoints: Vec<KeypointSlot>,

    /// Optional skeleton edge list (pairs of 1-based slot ids).
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub skeleton: Vec<[u32; 2]>,

    /// On a bbox category: the key of its bound keypoint category.
    #[serde(
        rename = "keypointCategoryKey",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub keypoint_category_key: Option<String>,

    #[serde(flatten)]
    pub extra: ExtraFields,
}

impl CategoryMeta {
    pub fn is_empty(&self) -> bool {
        self.keypoints.is_empty()
            && self.skeleton.is_empty()
            && self.keypoint_category_key.is_none()
            && self.extra.is_empty()
    }
}

/// One annotation tying an image to a category through a geometry.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AnnotationDef {
    #[serde(rename = "imageKey")]
    pub image_key: String,

    #[serde(rename = "categoryKey")]
    pub category_key: String,

    #[serde(flatten)]
    pub geometry: Geometry,
}

/// Import outcome counters. Skipped counters record per-record failures
/// that did not abort the import.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportStats {
    #[serde(rename = "imageCount")]
    pub image_count: usize,

    #[serde(rename = "annotationCount")]
    pub annotation_count: usize,

    #[serde(rename = "skippedImages")]
    pub skipped_images: usize,

    #[serde(rename = "skippedAnnotations")]
    pub skipped_annotations: usize,
}

/// Fixed palette cycled over categories in creation order.
const PALETTE: [&str; 12] = [
    "#FF6B6B", "#4ECDC4", "#45B7D1", "#96CEB4", "#FFEAA7", "#DDA0DD", "#98D8C8", "#F7DC6F",
    "#74B9FF", "#A29BFE", "#FD79A8", "#00CEC9",
];

/// Returns the palette color for the given category creation index.
pub fn pick_color(index: usize) -> &'static str {
    PALETTE[index % PALETTE.len()]
}
