//! COCO JSON detection, import, and export.
//!
//! A COCO dataset is one self-contained JSON file with `images`,
//! `annotations`, and `categories` arrays. COCO bboxes are pixel-space
//! `[x, y, width, height]` with a top-left origin; the importer divides
//! by the owning image's dimensions to reach the normalized model, and
//! the exporter multiplies back.
//!
//! COCO is the only source format with first-class keypoint support: a
//! category carrying a `keypoints` name list makes the importer
//! synthesize a satellite keypoint category alongside the bbox category,
//! and per-annotation `keypoints` arrays are reshaped into `[x, y, v]`
//! triples embedded in the bbox annotation.

use std::collections::BTreeMap;
use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use super::{
    list_files_with_extension, resolve_param_path, subdirectories, DatasetFormat, FormatScore,
};
use crate::error::LabelconvError;
use crate::ir::{
    clamp_bbox, clamp_unit, AnnotationDef, BboxData, CategoryDef, Geometry, ImageRef, Keypoint,
    KeypointSlot,
};
use crate::protocol::{
    error_codes, CopyTask, ErrorItem, ExportRequest, ExportResponse, FileOutput, ImportParams,
    ImportResponse, Split,
};

/// Conventional directories searched for the annotation JSON, in order.
const ANNOTATION_DIR_CANDIDATES: [&str; 8] = [
    "annotations",
    "labels",
    "annotation",
    "label",
    "json",
    "train/annotations",
    "val/annotations",
    "test/annotations",
];

/// Conventional image directory names, in resolution order.
const IMAGES_DIR_CANDIDATES: [&str; 14] = [
    "images", "train2017", "val2017", "test2017", "train", "val", "test", "train2014", "val2014",
    "JPEGImages", "img", "imgs", "data", "photos",
];

// ============================================================================
// COCO schema (internal to this module)
// ============================================================================

#[derive(Debug, Default, Serialize, Deserialize)]
struct CocoDataset {
    #[serde(default)]
    images: Vec<CocoImage>,

    #[serde(default)]
    annotations: Vec<CocoAnnotation>,

    #[serde(default)]
    categories: Vec<CocoCategory>,
}

#[derive(Debug, Serialize, Deserialize)]
struct CocoImage {
    id: i64,

    #[serde(default)]
    file_name: String,

    #[serde(default)]
    width: u32,

    #[serde(default)]
    height: u32,
}

#[derive(Debug, Serialize, Deserialize)]
struct CocoAnnotation {
    #[serde(default)]
    id: i64,

    image_id: i64,

    category_id: i64,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    bbox: Vec<f64>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    keypoints: Vec<f64>,

    #[serde(default, skip_serializing_if = "serde_json::Value::is_null")]
    segmentation: serde_json::Value,

    #[serde(default)]
    area: f64,

    #[serde(default)]
    iscrowd: u8,
}

#[derive(Debug, Serialize, Deserialize)]
struct CocoCategory {
    id: i64,

    #[serde(default)]
    name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    supercategory: Option<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    keypoints: Vec<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    skeleton: Vec<Vec<u32>>,
}

// ============================================================================
// Detection
// ============================================================================

/// Scores a directory tree as a COCO dataset.
///
/// A single JSON file that parses as an object holding `images`,
/// `annotations`, and `categories` simultaneously scores 0.9; anything
/// else scores 0.
pub fn detect(root: &Path) -> FormatScore {
    let files = find_annotation_files(root);
    if files.is_empty() {
        return FormatScore::none(DatasetFormat::Coco, "No COCO annotation files found");
    }

    for file in &files {
        if validate_annotation_file(file) {
            return FormatScore {
                format: DatasetFormat::Coco,
                score: 0.9,
                reason: format!("Found COCO annotation: {}", basename(&file.to_string_lossy())),
            };
        }
    }

    FormatScore::none(
        DatasetFormat::Coco,
        "JSON files found but not valid COCO format",
    )
}

/// Collects candidate annotation JSONs: the root, the conventional
/// annotation directories, then one level of arbitrary subdirectories
/// (plus their `annotations/` child). First discovery order is kept.
fn find_annotation_files(root: &Path) -> Vec<PathBuf> {
    let mut files = Vec::new();
    let mut visited = BTreeSet::new();

    let mut add_dir = |dir: &Path, files: &mut Vec<PathBuf>| {
        for file in list_files_with_extension(dir, "json") {
            if visited.insert(file.clone()) {
                files.push(file);
            }
        }
    };

    add_dir(root, &mut files);
    for candidate in ANNOTATION_DIR_CANDIDATES {
        add_dir(&root.join(candidate), &mut files);
    }
    for subdir in subdirectories(root) {
        add_dir(&subdir, &mut files);
        add_dir(&subdir.join("annotations"), &mut files);
    }

    files
}

fn validate_annotation_file(path: &Path) -> bool {
    let Ok(data) = fs::read(path) else {
        return false;
    };
    let Ok(value) = serde_json::from_slice::<serde_json::Value>(&data) else {
        return false;
    };
    let Some(object) = value.as_object() else {
        return false;
    };

    object.contains_key("images")
        && object.contains_key("annotations")
        && object.contains_key("categories")
}

// ============================================================================
// Import
// ============================================================================

/// Imports a COCO dataset rooted at `root` into the normalized model.
pub fn import(root: &Path, params: &ImportParams) -> ImportResponse {
    let annotation_file = match &params.annotation_file {
        Some(value) => Some(resolve_param_path(root, value)),
        None => find_annotation_files(root).into_iter().next(),
    };

    let Some(annotation_file) = annotation_file else {
        return ImportResponse::from_error(ErrorItem::new(
            error_codes::MISSING_ANNOTATION_FILE,
            "No COCO annotation file found",
        ));
    };

    let dataset = match parse_annotation_file(&annotation_file) {
        Ok(dataset) => dataset,
        Err(err) => {
            return ImportResponse::from_error(
                ErrorItem::new(error_codes::INVALID_ANNOTATION_FILE, err.to_string())
                    .with_detail("file", annotation_file.to_string_lossy().to_string()),
            );
        }
    };

    let mut response = ImportResponse::default();

    // Image paths are relative to the dataset root; when a conventional
    // images directory exists it is prefixed, otherwise the bare
    // file_name stands alone.
    let images_dir = params.images_dir.clone().or_else(|| {
        IMAGES_DIR_CANDIDATES
            .iter()
            .find(|candidate| root.join(candidate).is_dir())
            .map(|candidate| candidate.to_string())
    });

    let mut image_key_by_id: BTreeMap<i64, String> = BTreeMap::new();
    let mut image_size_by_id: BTreeMap<i64, (u32, u32)> = BTreeMap::new();

    for image in &dataset.images {
        let relative_path = match &images_dir {
            Some(dir) => format!("{}/{}", dir.trim_end_matches('/'), image.file_name),
            None => image.file_name.clone(),
        };

        image_key_by_id.insert(image.id, relative_path.clone());
        image_size_by_id.insert(image.id, (image.width, image.height));

        response
            .images
            .push(ImageRef::new(relative_path).with_dimensions(image.width, image.height));
    }
    response.stats.image_count = response.images.len();

    let (categories, keypoint_key_by_id) = build_categories(&dataset.categories);
    response.categories = categories;

    for annotation in &dataset.annotations {
        let Some(image_key) = image_key_by_id.get(&annotation.image_id) else {
            response.stats.skipped_annotations += 1;
            continue;
        };
        let category_key = format!("cat_{}", annotation.category_id);
        if !dataset
            .categories
            .iter()
            .any(|category| category.id == annotation.category_id)
        {
            response.stats.skipped_annotations += 1;
            continue;
        }

        let (width, height) = image_size_by_id
            .get(&annotation.image_id)
            .copied()
            .unwrap_or((0, 0));
        // Zero dimensions would divide the world away; treat as 1px.
        let width = f64::from(width).max(1.0);
        let height = f64::from(height).max(1.0);

        if annotation.bbox.len() != 4 {
            response.stats.skipped_annotations += 1;
            continue;
        }

        let (x, y, w, h) = clamp_bbox(
            annotation.bbox[0] / width,
            annotation.bbox[1] / height,
            annotation.bbox[2] / width,
            annotation.bbox[3] / height,
        );
        let mut bbox = BboxData::new(x, y, w, h);

        if !annotation.keypoints.is_empty() && annotation.keypoints.len() % 3 == 0 {
            let keypoints: Vec<Keypoint> = annotation
                .keypoints
                .chunks_exact(3)
                .map(|triple| {
                    Keypoint::new(
                        clamp_unit(triple[0] / width),
                        clamp_unit(triple[1] / height),
                        triple[2],
                    )
                })
                .collect();
            bbox.keypoints = Some(keypoints);
            bbox.keypoint_category_key = keypoint_key_by_id.get(&annotation.category_id).cloned();
        }

        response.annotations.push(AnnotationDef {
            image_key: image_key.clone(),
            category_key,
            geometry: Geometry::Bbox(bbox),
        });
    }
    response.stats.annotation_count = response.annotations.len();

    response
}

/// Synthesizes categories from the COCO category list: first one
/// keypoint category per source category with a non-empty keypoint-name
/// list, then one bbox category per source category, bound to its
/// keypoint satellite where one exists.
fn build_categories(source: &[CocoCategory]) -> (Vec<CategoryDef>, BTreeMap<i64, String>) {
    let mut categories = Vec::new();
    let mut keypoint_key_by_id = BTreeMap::new();
    let mut order = 0usize;

    for category in source {
        if category.keypoints.is_empty() {
            continue;
        }

        let keypoint_key = format!("cat_{}_kp", category.id);
        keypoint_key_by_id.insert(category.id, keypoint_key.clone());

        let mut def = CategoryDef::keypoint(
            keypoint_key,
            format!("{}_keypoints", category.name),
            order,
            KeypointSlot::named(&category.keypoints),
        );
        let skeleton: Vec<[u32; 2]> = category
            .skeleton
            .iter()
            .filter(|edge| edge.len() == 2)
            .map(|edge| [edge[0], edge[1]])
            .collect();
        if !skeleton.is_empty() {
            def = def.with_skeleton(skeleton);
        }
        categories.push(def);
        order += 1;
    }

    for category in source {
        let mut def = CategoryDef::bbox(format!("cat_{}", category.id), &category.name, order);
        if let Some(keypoint_key) = keypoint_key_by_id.get(&category.id) {
            def = def.with_keypoint_category(keypoint_key.clone());
        }
        categories.push(def);
        order += 1;
    }

    (categories, keypoint_key_by_id)
}

fn parse_annotation_file(path: &Path) -> Result<CocoDataset, LabelconvError> {
    let data = fs::read(path).map_err(LabelconvError::Io)?;
    serde_json::from_slice(&data).map_err(|source| LabelconvError::CocoJsonParse {
        path: path.to_path_buf(),
        source,
    })
}

// ============================================================================
// Export
// ============================================================================

/// Plans a COCO export: `{train,val,test}` image directories plus an
/// `annotations/` directory holding one self-contained JSON per
/// non-empty split.
pub fn export(request: &ExportRequest) -> ExportResponse {
    let mut response = ExportResponse {
        success: true,
        ..Default::default()
    };
    response.structure.directories = vec![
        "train".to_string(),
        "val".to_string(),
        "test".to_string(),
        "annotations".to_string(),
    ];

    let image_id_by_key: BTreeMap<&str, i64> = request
        .images
        .iter()
        .enumerate()
        .map(|(idx, image)| (image.key.as_str(), idx as i64 + 1))
        .collect();
    let image_by_key: BTreeMap<&str, &crate::protocol::ExportImage> = request
        .images
        .iter()
        .map(|image| (image.key.as_str(), image))
        .collect();

    // COCO files are self-contained, so every split gets the full
    // category list.
    let categories: Vec<CocoCategory> = request
        .categories
        .iter()
        .map(|category| {
            let keypoints = category.keypoint_names();
            CocoCategory {
                id: category.id,
                name: category.name.clone(),
                supercategory: None,
                keypoints,
                skeleton: Vec::new(),
            }
        })
        .collect();

    let mut split_datasets: BTreeMap<Split, CocoDataset> = Split::ALL
        .into_iter()
        .map(|split| {
            (
                split,
                CocoDataset {
                    images: Vec::new(),
                    annotations: Vec::new(),
                    categories: categories
                        .iter()
                        .map(|c| CocoCategory {
                            id: c.id,
                            name: c.name.clone(),
                            supercategory: None,
                            keypoints: c.keypoints.clone(),
                            skeleton: Vec::new(),
                        })
                        .collect(),
                },
            )
        })
        .collect();

    for image in &request.images {
        response.stats.record_split(image.split);

        let image_id = image_id_by_key[image.key.as_str()];
        let file_name = basename(&image.relative_path);

        if let Some(dataset) = split_datasets.get_mut(&image.split) {
            dataset.images.push(CocoImage {
                id: image_id,
                file_name: file_name.clone(),
                width: image.width,
                height: image.height,
            });
        }

        response.structure.copy_images.push(CopyTask {
            from: image.absolute_path.clone(),
            to: format!("{}/{}", image.split.as_str(), file_name),
        });
    }

    let mut next_annotation_id: i64 = 1;
    for annotation in &request.annotations {
        let Some(&image_id) = image_id_by_key.get(annotation.image_key.as_str()) else {
            continue;
        };
        let image = image_by_key[annotation.image_key.as_str()];
        let width = f64::from(image.width);
        let height = f64::from(image.height);

        let coco_annotation = match &annotation.geometry {
            Geometry::Bbox(bbox) => export_bbox(
                next_annotation_id,
                image_id,
                annotation.category_id,
                bbox,
                width,
                height,
            ),
            Geometry::Polygon(polygon) => {
                match export_polygon(
                    next_annotation_id,
                    image_id,
                    annotation.category_id,
                    &polygon.points,
                    width,
                    height,
                ) {
                    Some(coco_annotation) => coco_annotation,
                    None => continue,
                }
            }
        };

        if let Some(dataset) = split_datasets.get_mut(&image.split) {
            dataset.annotations.push(coco_annotation);
            next_annotation_id += 1;
        }
    }

    for (split, dataset) in &split_datasets {
        if dataset.images.is_empty() {
            continue;
        }
        match serde_json::to_string_pretty(dataset) {
            Ok(content) => response.structure.files.push(FileOutput {
                path: format!("annotations/{}.json", split.as_str()),
                content,
            }),
            Err(err) => {
                response.success = false;
                response.errors.push(ErrorItem::new(
                    error_codes::INVALID_ANNOTATION_FILE,
                    format!("failed to serialize {} annotations: {err}", split.as_str()),
                ));
            }
        }
    }

    response.stats.image_count = request.images.len();
    response.stats.annotation_count = request.annotations.len();
    response
}

/// A plain box denormalizes directly; a keypoint-carrying box emits
/// flattened pixel triples and derives its output box from the extent of
/// visible keypoints, falling back to the stored box when nothing is
/// visible and clamping degenerate extents to a 10px footprint.
fn export_bbox(
    id: i64,
    image_id: i64,
    category_id: i64,
    bbox: &BboxData,
    width: f64,
    height: f64,
) -> CocoAnnotation {
    let stored_x = bbox.x * width;
    let stored_y = bbox.y * height;
    let stored_w = bbox.width * width;
    let stored_h = bbox.height * height;

    let keypoints = bbox.keypoints.as_deref().unwrap_or_default();
    if keypoints.is_empty() {
        return CocoAnnotation {
            id,
            image_id,
            category_id,
            bbox: vec![stored_x, stored_y, stored_w, stored_h],
            keypoints: Vec::new(),
            segmentation: serde_json::Value::Null,
            area: stored_w * stored_h,
            iscrowd: 0,
        };
    }

    let mut flat = Vec::with_capacity(keypoints.len() * 3);
    let mut extent: Option<(f64, f64, f64, f64)> = None;
    for kp in keypoints {
        let px = kp.x * width;
        let py = kp.y * height;
        flat.extend_from_slice(&[px, py, kp.visibility]);

        if kp.visibility > 0.0 {
            extent = Some(match extent {
                None => (px, py, px, py),
                Some((min_x, min_y, max_x, max_y)) => {
                    (min_x.min(px), min_y.min(py), max_x.max(px), max_y.max(py))
                }
            });
        }
    }

    let (x, y, w, h) = match extent {
        Some((min_x, min_y, max_x, max_y)) => {
            let mut w = max_x - min_x;
            let mut h = max_y - min_y;
            if w < 1.0 {
                w = 10.0;
            }
            if h < 1.0 {
                h = 10.0;
            }
            (min_x, min_y, w, h)
        }
        None => (stored_x, stored_y, stored_w.max(10.0), stored_h.max(10.0)),
    };

    CocoAnnotation {
        id,
        image_id,
        category_id,
        bbox: vec![x, y, w, h],
        keypoints: flat,
        segmentation: serde_json::Value::Null,
        area: w * h,
        iscrowd: 0,
    }
}

fn export_polygon(
    id: i64,
    image_id: i64,
    category_id: i64,
    points: &[[f64; 2]],
    width: f64,
    height: f64,
) -> Option<CocoAnnotation> {
    if points.len() < 3 {
        return None;
    }

    let mut flat = Vec::with_capacity(points.len() * 2);
    let mut min_x = f64::INFINITY;
    let mut min_y = f64::INFINITY;
    let mut max_x = f64::NEG_INFINITY;
    let mut max_y = f64::NEG_INFINITY;

    for point in points {
        let px = point[0] * width;
        let py = point[1] * height;
        flat.extend_from_slice(&[px, py]);
        min_x = min_x.min(px);
        min_y = min_y.min(py);
        max_x = max_x.max(px);
        max_y = max_y.max(py);
    }

    let w = max_x - min_x;
    let h = max_y - min_y;

    Some(CocoAnnotation {
        id,
        image_id,
        category_id,
        bbox: vec![min_x, min_y, w, h],
        keypoints: Vec::new(),
        segmentation: serde_json::json!([flat]),
        area: w * h,
        iscrowd: 0,
    })
}

fn basename(path: &str) -> String {
    Path::new(path)
        .file_name()
        .map(|name| name.to_string_lossy().to_string())
        .unwrap_or_else(|| path.to_string())
}
