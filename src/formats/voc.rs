//! Pascal VOC detection, import, and export.
//!
//! VOC keeps one XML document per image, with absolute pixel corner
//! coordinates (`xmin`/`ymin`/`xmax`/`ymax`) and no class manifest; the
//! set of classes is whatever the object names happen to be. The
//! importer synthesizes categories from the distinct object names in
//! sorted order, so category keys are stable across runs regardless of
//! which file mentions a class first.
//!
//! Parsing is lenient by design: an XML file that fails to parse skips
//! that image, and a malformed `<object>` skips that object, without
//! aborting the import.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt::Write as _;
use std::fs;
use std::path::{Path, PathBuf};

use super::{
    file_stem_string, first_existing_dir, list_files_with_extension, rel_string,
    resolve_param_path, subdirectories, walk_files_with_extensions, DatasetFormat, FormatScore,
    IMAGE_EXTENSIONS,
};
use crate::error::LabelconvError;
use crate::ir::{clamp_bbox, AnnotationDef, BboxData, CategoryDef, Geometry, ImageRef};
use crate::protocol::{
    error_codes, CopyTask, ErrorItem, ExportRequest, ExportResponse, FileOutput, ImportParams,
    ImportResponse, Split,
};

/// Conventional annotation directory names, in resolution order.
const ANNOTATIONS_DIR_CANDIDATES: [&str; 4] = ["Annotations", "annotations", "labels", "xml"];

/// Directories searched during detection.
const DETECT_DIR_CANDIDATES: [&str; 9] = [
    "Annotations",
    "annotations",
    "labels",
    "xml",
    "train/Annotations",
    "val/Annotations",
    "test/Annotations",
    "train/annotations",
    "val/annotations",
];

/// Conventional image directory names, in resolution order.
const IMAGES_DIR_CANDIDATES: [&str; 5] = ["JPEGImages", "images", "imgs", "img", "photos"];

// ============================================================================
// Detection
// ============================================================================

/// Scores a directory tree as a Pascal VOC dataset.
///
/// One well-formed `<annotation>` document with a non-empty filename or
/// at least one object scores 0.88.
pub fn detect(root: &Path) -> FormatScore {
    let files = find_annotation_files_for_detection(root);
    if files.is_empty() {
        return FormatScore::none(DatasetFormat::Voc, "No VOC annotation files found");
    }

    for file in &files {
        if validate_annotation_file(file) {
            return FormatScore {
                format: DatasetFormat::Voc,
                score: 0.88,
                reason: format!("Found VOC annotation: {}", file_name_string(file)),
            };
        }
    }

    FormatScore::none(
        DatasetFormat::Voc,
        "XML files found but not valid VOC format",
    )
}

fn find_annotation_files_for_detection(root: &Path) -> Vec<PathBuf> {
    let mut files = Vec::new();
    let mut visited = BTreeSet::new();

    let mut add_dir = |dir: &Path, files: &mut Vec<PathBuf>| {
        for file in list_files_with_extension(dir, "xml") {
            if visited.insert(file.clone()) {
                files.push(file);
            }
        }
    };

    add_dir(root, &mut files);
    for candidate in DETECT_DIR_CANDIDATES {
        add_dir(&root.join(candidate), &mut files);
    }
    for subdir in subdirectories(root) {
        add_dir(&subdir, &mut files);
        add_dir(&subdir.join("Annotations"), &mut files);
        add_dir(&subdir.join("annotations"), &mut files);
    }

    files
}

fn validate_annotation_file(path: &Path) -> bool {
    let Ok(content) = fs::read_to_string(path) else {
        return false;
    };
    let Ok(doc) = roxmltree::Document::parse(&content) else {
        return false;
    };

    let root = doc.root_element();
    if root.tag_name().name() != "annotation" {
        return false;
    }

    let has_filename = root
        .children()
        .find(|node| node.has_tag_name("filename"))
        .and_then(|node| node.text())
        .map(|text| !text.trim().is_empty())
        .unwrap_or(false);
    let has_object = root.children().any(|node| node.has_tag_name("object"));

    has_filename || has_object
}

// ============================================================================
// Import
// ============================================================================

struct VocObject {
    name: String,
    xmin: f64,
    ymin: f64,
    xmax: f64,
    ymax: f64,
}

struct VocAnnotation {
    filename: String,
    folder: String,
    width: f64,
    height: f64,
    objects: Vec<VocObject>,
    skipped_objects: usize,
}

/// Imports a Pascal VOC dataset rooted at `root` into the normalized
/// model.
pub fn import(root: &Path, params: &ImportParams) -> ImportResponse {
    // The annotationFile param carries the annotations directory here;
    // VOC has no single annotation file to point at.
    let annotations_dir = match &params.annotation_file {
        Some(value) => {
            let dir = resolve_param_path(root, value);
            dir.is_dir().then_some(dir)
        }
        None => first_existing_dir(root, &ANNOTATIONS_DIR_CANDIDATES).or_else(|| {
            // Split-subfolder layouts (train/Annotations, ...) fall back
            // to a recursive walk from the root.
            (!walk_files_with_extensions(root, &["xml"]).is_empty()).then(|| root.to_path_buf())
        }),
    };

    let Some(annotations_dir) = annotations_dir else {
        return ImportResponse::from_error(ErrorItem::new(
            error_codes::MISSING_ANNOTATIONS_DIR,
            "No VOC annotations directory found",
        ));
    };

    let xml_files = walk_files_with_extensions(&annotations_dir, &["xml"]);
    if xml_files.is_empty() {
        return ImportResponse::from_error(
            ErrorItem::new(error_codes::NO_ANNOTATION_FILES, "No annotation files found")
                .with_detail(
                    "annotationsDir",
                    annotations_dir.to_string_lossy().to_string(),
                ),
        );
    }

    let images_dir = match &params.images_dir {
        Some(value) => resolve_param_path(root, value),
        None => {
            first_existing_dir(root, &IMAGES_DIR_CANDIDATES).unwrap_or_else(|| root.to_path_buf())
        }
    };

    let mut response = ImportResponse::default();
    let mut parsed: Vec<(PathBuf, VocAnnotation)> = Vec::new();
    let mut class_names: BTreeSet<String> = BTreeSet::new();

    for file in &xml_files {
        match parse_annotation_file(file) {
            Ok(annotation) => {
                for object in &annotation.objects {
                    class_names.insert(object.name.clone());
                }
                parsed.push((file.clone(), annotation));
            }
            Err(err) => {
                eprintln!("labelconv: {err}");
                response.stats.skipped_images += 1;
            }
        }
    }

    // Sorted distinct names keep category keys stable across runs.
    let key_by_name: BTreeMap<&str, String> = class_names
        .iter()
        .enumerate()
        .map(|(idx, name)| (name.as_str(), format!("class_{idx}")))
        .collect();
    for (idx, name) in class_names.iter().enumerate() {
        response
            .categories
            .push(CategoryDef::bbox(format!("class_{idx}"), name, idx));
    }

    let mut seen_image_keys: BTreeSet<String> = BTreeSet::new();
    for (file, annotation) in &parsed {
        let filename = if annotation.filename.is_empty() {
            format!("{}.jpg", file_stem_string(file))
        } else {
            annotation.filename.clone()
        };
        let relative_path = resolve_image_path(root, &images_dir, &annotation.folder, &filename);

        // Degenerate sizes would blow up normalization.
        let width = annotation.width.max(1.0);
        let height = annotation.height.max(1.0);

        // Keys are unique: two XMLs resolving to the same image share
        // one ImageRef.
        if seen_image_keys.insert(relative_path.clone()) {
            let mut image = ImageRef::new(relative_path.clone());
            if annotation.width > 0.0 && annotation.height > 0.0 {
                image = image.with_dimensions(annotation.width as u32, annotation.height as u32);
            }
            response.images.push(image);
        }
        response.stats.skipped_annotations += annotation.skipped_objects;

        for object in &annotation.objects {
            let (x, y, w, h) = clamp_bbox(
                object.xmin / width,
                object.ymin / height,
                (object.xmax - object.xmin) / width,
                (object.ymax - object.ymin) / height,
            );
            response.annotations.push(AnnotationDef {
                image_key: relative_path.clone(),
                category_key: key_by_name[object.name.as_str()].clone(),
                geometry: Geometry::Bbox(BboxData::new(x, y, w, h)),
            });
        }
    }

    response.stats.image_count = response.images.len();
    response.stats.annotation_count = response.annotations.len();
    response
}

/// Resolves the image path an XML refers to, in falling priority: the
/// literal filename under the images dir, an extension-swapped sibling,
/// the XML's own `<folder>/<filename>`, then the bare filename.
fn resolve_image_path(root: &Path, images_dir: &Path, folder: &str, filename: &str) -> String {
    let literal = images_dir.join(filename);
    if literal.is_file() {
        return rel_string(root, &literal);
    }

    let stem = file_stem_string(Path::new(filename));
    for ext in IMAGE_EXTENSIONS {
        let swapped = images_dir.join(format!("{stem}.{ext}"));
        if swapped.is_file() {
            return rel_string(root, &swapped);
        }
    }

    if !folder.is_empty() {
        let foldered = root.join(folder).join(filename);
        if foldered.is_file() {
            return rel_string(root, &foldered);
        }
    }

    filename.to_string()
}

fn parse_annotation_file(path: &Path) -> Result<VocAnnotation, LabelconvError> {
    let content = fs::read_to_string(path)?;
    let doc =
        roxmltree::Document::parse(&content).map_err(|err| LabelconvError::VocXmlParse {
            path: path.to_path_buf(),
            message: err.to_string(),
        })?;

    let root = doc.root_element();
    if root.tag_name().name() != "annotation" {
        return Err(LabelconvError::VocXmlParse {
            path: path.to_path_buf(),
            message: format!(
                "expected <annotation> root, found <{}>",
                root.tag_name().name()
            ),
        });
    }

    let filename = child_text(root, "filename").unwrap_or_default();
    let folder = child_text(root, "folder").unwrap_or_default();

    let (width, height) = root
        .children()
        .find(|node| node.has_tag_name("size"))
        .map(|size| {
            (
                child_number(size, "width").unwrap_or(0.0),
                child_number(size, "height").unwrap_or(0.0),
            )
        })
        .unwrap_or((0.0, 0.0));

    let mut objects = Vec::new();
    let mut skipped_objects = 0;
    for node in root.children().filter(|node| node.has_tag_name("object")) {
        match parse_object(node) {
            Some(object) => objects.push(object),
            None => skipped_objects += 1,
        }
    }

    Ok(VocAnnotation {
        filename,
        folder,
        width,
        height,
        objects,
        skipped_objects,
    })
}

fn parse_object(node: roxmltree::Node<'_, '_>) -> Option<VocObject> {
    let name = child_text(node, "name")?;
    let bndbox = node.children().find(|child| child.has_tag_name("bndbox"))?;

    Some(VocObject {
        name,
        xmin: child_number(bndbox, "xmin")?,
        ymin: child_number(bndbox, "ymin")?,
        xmax: child_number(bndbox, "xmax")?,
        ymax: child_number(bndbox, "ymax")?,
    })
}

fn child_text(node: roxmltree::Node<'_, '_>, name: &str) -> Option<String> {
    let text = node
        .children()
        .find(|child| child.has_tag_name(name))?
        .text()?
        .trim();
    (!text.is_empty()).then(|| text.to_string())
}

fn child_number(node: roxmltree::Node<'_, '_>, name: &str) -> Option<f64> {
    child_text(node, name)?.parse().ok()
}

fn file_name_string(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().to_string())
        .unwrap_or_default()
}

// ============================================================================
// Export
// ============================================================================

/// Plans a Pascal VOC export: `{split}/{JPEGImages,Annotations}`
/// directories and one XML per image.
///
/// Only bbox geometry has a VOC representation. Keypoints riding on a
/// box are dropped (the box itself survives); polygon annotations are
/// skipped entirely.
pub fn export(request: &ExportRequest) -> ExportResponse {
    let mut response = ExportResponse {
        success: true,
        ..Default::default()
    };
    response.structure.directories = Split::ALL
        .iter()
        .flat_map(|split| {
            [
                format!("{}/JPEGImages", split.as_str()),
                format!("{}/Annotations", split.as_str()),
            ]
        })
        .collect();

    let name_by_id: BTreeMap<i64, &str> = request
        .categories
        .iter()
        .map(|category| (category.id, category.name.as_str()))
        .collect();

    let mut objects_by_image: BTreeMap<&str, Vec<(&str, &BboxData)>> = BTreeMap::new();
    for annotation in &request.annotations {
        let Some(bbox) = annotation.geometry.as_bbox() else {
            continue;
        };
        let Some(&name) = name_by_id.get(&annotation.category_id) else {
            continue;
        };
        objects_by_image
            .entry(annotation.image_key.as_str())
            .or_default()
            .push((name, bbox));
    }

    for image in &request.images {
        response.stats.record_split(image.split);

        let file_name = basename(&image.relative_path);
        let stem = file_stem_string(Path::new(&file_name));
        let objects = objects_by_image
            .get(image.key.as_str())
            .map(Vec::as_slice)
            .unwrap_or_default();

        response.structure.files.push(FileOutput {
            path: format!("{}/Annotations/{stem}.xml", image.split.as_str()),
            content: render_annotation_xml(image, &file_name, objects),
        });
        response.structure.copy_images.push(CopyTask {
            from: image.absolute_path.clone(),
            to: format!("{}/JPEGImages/{}", image.split.as_str(), file_name),
        });
    }

    response.stats.image_count = request.images.len();
    response.stats.annotation_count = request.annotations.len();
    response
}

fn render_annotation_xml(
    image: &crate::protocol::ExportImage,
    file_name: &str,
    objects: &[(&str, &BboxData)],
) -> String {
    let width = f64::from(image.width);
    let height = f64::from(image.height);

    let mut xml = String::from("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n");
    let _ = writeln!(xml, "<annotation>");
    let _ = writeln!(xml, "  <folder>{}</folder>", image.split.as_str());
    let _ = writeln!(xml, "  <filename>{}</filename>", xml_escape(file_name));
    let _ = writeln!(xml, "  <size>");
    let _ = writeln!(xml, "    <width>{}</width>", image.width);
    let _ = writeln!(xml, "    <height>{}</height>", image.height);
    let _ = writeln!(xml, "    <depth>3</depth>");
    let _ = writeln!(xml, "  </size>");

    for &(name, bbox) in objects {
        let _ = writeln!(xml, "  <object>");
        let _ = writeln!(xml, "    <name>{}</name>", xml_escape(name));
        let _ = writeln!(xml, "    <pose>Unspecified</pose>");
        let _ = writeln!(xml, "    <truncated>0</truncated>");
        let _ = writeln!(xml, "    <difficult>0</difficult>");
        let _ = writeln!(xml, "    <bndbox>");
        let _ = writeln!(xml, "      <xmin>{}</xmin>", round_px(bbox.x * width));
        let _ = writeln!(xml, "      <ymin>{}</ymin>", round_px(bbox.y * height));
        let _ = writeln!(
            xml,
            "      <xmax>{}</xmax>",
            round_px((bbox.x + bbox.width) * width)
        );
        let _ = writeln!(
            xml,
            "      <ymax>{}</ymax>",
            round_px((bbox.y + bbox.height) * height)
        );
        let _ = writeln!(xml, "    </bndbox>");
        let _ = writeln!(xml, "  </object>");
    }

    let _ = writeln!(xml, "</annotation>");
    xml
}

/// Rounds a pixel coordinate to 1/100 so binary float artifacts
/// (`(0.1 + 0.2) * 100` is not 30) never leak into the XML.
fn round_px(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

fn xml_escape(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for ch in value.chars() {
        match ch {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&apos;"),
            _ => escaped.push(ch),
        }
    }
    escaped
}

fn basename(path: &str) -> String {
    Path::new(path)
        .file_name()
        .map(|name| name.to_string_lossy().to_string())
        .unwrap_or_else(|| path.to_string())
}
