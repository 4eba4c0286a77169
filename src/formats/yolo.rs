//! YOLO detection, import, and export.
//!
//! YOLO spreads a dataset across one `.txt` label file per image, each
//! line `class cx cy w h` in normalized center coordinates, optionally
//! followed by keypoint `x y v` triplets. Class names live outside the
//! label files, in `data.yaml` or a plain name list.
//!
//! Import runs in two passes: a scan pass over the parsed label rows
//! derives the class and keypoint summary (so categories can be built
//! before any annotation), then a decode pass emits annotations. Label
//! files are parsed exactly once; both passes read the same rows.

use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::{Path, PathBuf};

use super::{
    file_stem_string, first_existing_dir, is_yolo_name_file, probe_dimensions, rel_string,
    resolve_param_path, subdirectories, walk_files_with_extensions, DatasetFormat, FormatScore,
    IMAGE_EXTENSIONS,
};
use crate::ir::{
    clamp_bbox, AnnotationDef, BboxData, CategoryDef, Geometry, ImageRef, Keypoint, KeypointSlot,
};
use crate::protocol::{
    error_codes, CopyTask, ErrorItem, ExportRequest, ExportResponse, FileOutput, ImportParams,
    ImportResponse, Split,
};

/// Conventional label directory names, in resolution order.
const LABELS_DIR_CANDIDATES: [&str; 6] = [
    "labels",
    "train/labels",
    "val/labels",
    "labels/train",
    "labels/val",
    "label",
];

/// Directories searched during detection; broader than the import
/// candidates because detection only needs one plausible label file.
const DETECT_DIR_CANDIDATES: [&str; 7] = [
    "labels",
    "labels/train",
    "labels/val",
    "train/labels",
    "val/labels",
    "test/labels",
    "label",
];

/// Conventional image directory names, in resolution order.
const IMAGES_DIR_CANDIDATES: [&str; 8] = [
    "images",
    "train/images",
    "val/images",
    "images/train",
    "images/val",
    "img",
    "imgs",
    "JPEGImages",
];

/// Class-name files probed when no `classes_file` param and no
/// `data.yaml` names are available.
const NAME_FILE_CANDIDATES: [&str; 4] = ["classes.txt", "data.names", "obj.names", "names.txt"];

// ============================================================================
// Detection
// ============================================================================

/// Scores a directory tree as a YOLO dataset.
///
/// One label file whose first data line is `class cx cy w h ...` with a
/// non-negative integer class and four parseable floats scores 0.85.
pub fn detect(root: &Path) -> FormatScore {
    let files = find_label_files_for_detection(root);
    if files.is_empty() {
        return FormatScore::none(DatasetFormat::Yolo, "No YOLO label files found");
    }

    for file in &files {
        if validate_label_file(file) {
            return FormatScore {
                format: DatasetFormat::Yolo,
                score: 0.85,
                reason: format!(
                    "Found YOLO label file: {}",
                    file_name_string(file)
                ),
            };
        }
    }

    FormatScore::none(
        DatasetFormat::Yolo,
        "Label files found but not valid YOLO format",
    )
}

fn find_label_files_for_detection(root: &Path) -> Vec<PathBuf> {
    let mut files = Vec::new();
    let mut visited = BTreeSet::new();

    let mut add_dir = |dir: &Path, files: &mut Vec<PathBuf>| {
        for file in super::list_files_with_extension(dir, "txt") {
            if is_yolo_name_file(&file) {
                continue;
            }
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
        add_dir(&subdir.join("labels"), &mut files);
    }

    files
}

/// True when the first non-comment, non-blank line looks like a YOLO
/// annotation row.
fn validate_label_file(path: &Path) -> bool {
    let Ok(content) = fs::read_to_string(path) else {
        return false;
    };

    for line in content.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let tokens: Vec<&str> = line.split_whitespace().collect();
        if tokens.len() < 5 {
            return false;
        }
        if tokens[0].parse::<usize>().is_err() {
            return false;
        }
        return tokens[1..5].iter().all(|t| t.parse::<f64>().is_ok());
    }

    false
}

// ============================================================================
// Import
// ============================================================================

/// One parsed label row. Keypoint triplets are kept exactly as written;
/// YOLO keypoints are already normalized and are not re-clamped.
struct LabelRow {
    class_id: usize,
    cx: f64,
    cy: f64,
    w: f64,
    h: f64,
    keypoints: Vec<Keypoint>,
}

/// Parsed content of one label file plus its per-line skip count.
struct LabelFile {
    path: PathBuf,
    rows: Vec<LabelRow>,
    skipped_lines: usize,
}

/// Imports a YOLO dataset rooted at `root` into the normalized model.
pub fn import(root: &Path, params: &ImportParams) -> ImportResponse {
    let labels_dir = match &params.labels_dir {
        Some(value) => {
            let dir = resolve_param_path(root, value);
            dir.is_dir().then_some(dir)
        }
        None => first_existing_dir(root, &LABELS_DIR_CANDIDATES)
            .or_else(|| root_holds_label_files(root).then(|| root.to_path_buf())),
    };

    let Some(labels_dir) = labels_dir else {
        return ImportResponse::from_error(ErrorItem::new(
            error_codes::MISSING_LABELS_DIR,
            "No YOLO labels directory found",
        ));
    };

    let label_paths: Vec<PathBuf> = walk_files_with_extensions(&labels_dir, &["txt"])
        .into_iter()
        .filter(|path| !is_yolo_name_file(path))
        .collect();
    if label_paths.is_empty() {
        return ImportResponse::from_error(
            ErrorItem::new(error_codes::NO_LABEL_FILES, "No label files found")
                .with_detail("labelsDir", labels_dir.to_string_lossy().to_string()),
        );
    }

    let mut response = ImportResponse::default();

    // Single parse pass; scan and decode both read these rows.
    let label_files: Vec<LabelFile> = label_paths
        .iter()
        .map(|path| parse_label_file(path))
        .collect();

    let mut used_class_ids: BTreeSet<usize> = BTreeSet::new();
    let mut keypoint_counts: BTreeMap<usize, usize> = BTreeMap::new();
    for file in &label_files {
        for row in &file.rows {
            used_class_ids.insert(row.class_id);
            if !row.keypoints.is_empty() {
                let entry = keypoint_counts.entry(row.class_id).or_insert(0);
                *entry = (*entry).max(row.keypoints.len());
            }
        }
        response.stats.skipped_annotations += file.skipped_lines;
    }

    // All label files empty: nothing to import, and nothing wrong either.
    if used_class_ids.is_empty() {
        return response;
    }

    let class_names = load_class_names(root, &labels_dir, params);

    let mut keypoint_key_by_class: BTreeMap<usize, String> = BTreeMap::new();
    let mut order = 0usize;
    for &class_id in &used_class_ids {
        let Some(&count) = keypoint_counts.get(&class_id) else {
            continue;
        };
        let key = format!("class_{class_id}_kp");
        response.categories.push(CategoryDef::keypoint(
            key.clone(),
            format!("{}_keypoints", class_display_name(&class_names, class_id)),
            order,
            KeypointSlot::numbered(count),
        ));
        keypoint_key_by_class.insert(class_id, key);
        order += 1;
    }
    for &class_id in &used_class_ids {
        let mut def = CategoryDef::bbox(
            format!("class_{class_id}"),
            class_display_name(&class_names, class_id),
            order,
        );
        if let Some(key) = keypoint_key_by_class.get(&class_id) {
            def = def.with_keypoint_category(key.clone());
        }
        response.categories.push(def);
        order += 1;
    }

    // Images are matched to label files by stem; the first image found
    // for a stem wins.
    let images_dir = match &params.images_dir {
        Some(value) => {
            let dir = resolve_param_path(root, value);
            if dir.is_dir() {
                dir
            } else {
                root.to_path_buf()
            }
        }
        None => first_existing_dir(root, &IMAGES_DIR_CANDIDATES)
            .unwrap_or_else(|| root.to_path_buf()),
    };
    let image_by_stem = index_images_by_stem(&images_dir);

    // Every physical image becomes an ImageRef, labelled or not.
    let mut key_by_stem: BTreeMap<&str, String> = BTreeMap::new();
    for (stem, image_path) in &image_by_stem {
        let relative_path = rel_string(root, image_path);
        let mut image = ImageRef::new(relative_path.clone());
        if let Some((width, height)) = probe_dimensions(image_path) {
            image = image.with_dimensions(width, height);
        }
        response.images.push(image);
        key_by_stem.insert(stem.as_str(), relative_path);
    }

    for file in &label_files {
        let stem = file_stem_string(&file.path);
        let Some(relative_path) = key_by_stem.get(stem.as_str()) else {
            // An orphan label file loses its boxes, nothing else.
            response.stats.skipped_annotations += file.rows.len();
            continue;
        };

        for row in &file.rows {
            let (x, y, w, h) = clamp_bbox(
                row.cx - row.w / 2.0,
                row.cy - row.h / 2.0,
                row.w,
                row.h,
            );
            let mut bbox = BboxData::new(x, y, w, h);
            if !row.keypoints.is_empty() {
                bbox.keypoint_category_key = keypoint_key_by_class.get(&row.class_id).cloned();
                bbox.keypoints = Some(row.keypoints.clone());
            }

            response.annotations.push(AnnotationDef {
                image_key: relative_path.clone(),
                category_key: format!("class_{}", row.class_id),
                geometry: Geometry::Bbox(bbox),
            });
        }
    }

    response.stats.image_count = response.images.len();
    response.stats.annotation_count = response.annotations.len();
    response
}

fn root_holds_label_files(root: &Path) -> bool {
    super::list_files_with_extension(root, "txt")
        .iter()
        .any(|path| !is_yolo_name_file(path))
}

fn class_display_name(names: &[String], class_id: usize) -> String {
    names
        .get(class_id)
        .cloned()
        .unwrap_or_else(|| format!("class_{class_id}"))
}

fn parse_label_file(path: &Path) -> LabelFile {
    let content = fs::read_to_string(path).unwrap_or_default();
    let mut rows = Vec::new();
    let mut skipped_lines = 0;

    for line in content.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        match parse_label_line(line) {
            Some(row) => rows.push(row),
            None => skipped_lines += 1,
        }
    }

    LabelFile {
        path: path.to_path_buf(),
        rows,
        skipped_lines,
    }
}

fn parse_label_line(line: &str) -> Option<LabelRow> {
    let tokens: Vec<&str> = line.split_whitespace().collect();
    if tokens.len() < 5 {
        return None;
    }

    let class_id = tokens[0].parse::<usize>().ok()?;
    let cx = tokens[1].parse::<f64>().ok()?;
    let cy = tokens[2].parse::<f64>().ok()?;
    let w = tokens[3].parse::<f64>().ok()?;
    let h = tokens[4].parse::<f64>().ok()?;

    // Trailing tokens become keypoints only when they form whole x y v
    // triplets and every token parses; otherwise the box survives bare.
    let mut keypoints = Vec::new();
    let rest = &tokens[5..];
    if !rest.is_empty() && rest.len() % 3 == 0 {
        let parsed: Option<Vec<f64>> = rest.iter().map(|t| t.parse::<f64>().ok()).collect();
        if let Some(values) = parsed {
            keypoints = values
                .chunks_exact(3)
                .map(|triple| Keypoint::new(triple[0], triple[1], triple[2]))
                .collect();
        }
    }

    Some(LabelRow {
        class_id,
        cx,
        cy,
        w,
        h,
        keypoints,
    })
}

/// Maps image stems to paths under the images directory; first hit per
/// stem wins (paths are walked in sorted order).
fn index_images_by_stem(images_dir: &Path) -> BTreeMap<String, PathBuf> {
    let mut index = BTreeMap::new();
    for path in walk_files_with_extensions(images_dir, &IMAGE_EXTENSIONS) {
        index
            .entry(file_stem_string(&path))
            .or_insert(path);
    }
    index
}

/// Resolves class names in priority order: the `classesFile` param, then
/// `data.yaml`/`dataset.yaml` names, then the conventional name files in
/// the root and labels directories.
fn load_class_names(root: &Path, labels_dir: &Path, params: &ImportParams) -> Vec<String> {
    if let Some(value) = &params.classes_file {
        let names = read_name_list(&resolve_param_path(root, value));
        if !names.is_empty() {
            return names;
        }
    }

    for yaml_name in ["data.yaml", "dataset.yaml"] {
        let names = read_data_yaml_names(&root.join(yaml_name));
        if !names.is_empty() {
            return names;
        }
    }

    for dir in [root, labels_dir] {
        for candidate in NAME_FILE_CANDIDATES {
            let names = read_name_list(&dir.join(candidate));
            if !names.is_empty() {
                return names;
            }
        }
    }

    Vec::new()
}

/// One class name per line; blanks and `#` comments are skipped.
fn read_name_list(path: &Path) -> Vec<String> {
    let Ok(content) = fs::read_to_string(path) else {
        return Vec::new();
    };
    content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(str::to_string)
        .collect()
}

/// Reads the `names:` entry of a YOLO data.yaml. Both spellings are
/// accepted: a plain sequence, or the Ultralytics id-to-name mapping
/// (ordered by id).
fn read_data_yaml_names(path: &Path) -> Vec<String> {
    let Ok(content) = fs::read_to_string(path) else {
        return Vec::new();
    };
    let Ok(doc) = serde_yaml::from_str::<serde_yaml::Value>(&content) else {
        return Vec::new();
    };

    match doc.get("names") {
        Some(serde_yaml::Value::Sequence(seq)) => seq
            .iter()
            .filter_map(|v| v.as_str().map(str::to_string))
            .collect(),
        Some(serde_yaml::Value::Mapping(map)) => {
            let mut by_id: BTreeMap<u64, String> = BTreeMap::new();
            for (key, value) in map {
                let (Some(id), Some(name)) = (key.as_u64(), value.as_str()) else {
                    continue;
                };
                by_id.insert(id, name.to_string());
            }
            by_id.into_values().collect()
        }
        _ => Vec::new(),
    }
}

fn file_name_string(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().to_string())
        .unwrap_or_default()
}

// ============================================================================
// Export
// ============================================================================

/// Plans a YOLO export: `{split}/{images,labels}` directories, one label
/// file per image with annotations, and a `data.yaml` at the root.
///
/// When any keypoints are present, every line in every label file is
/// padded to the same triplet count so readers can rely on uniform row
/// width.
pub fn export(request: &ExportRequest) -> ExportResponse {
    let mut response = ExportResponse {
        success: true,
        ..Default::default()
    };
    response.structure.directories = Split::ALL
        .iter()
        .flat_map(|split| {
            [
                format!("{}/images", split.as_str()),
                format!("{}/labels", split.as_str()),
            ]
        })
        .collect();

    // Keypoint categories have no YOLO representation of their own;
    // class indices and data.yaml names come from the remaining list.
    let exported_categories: Vec<&crate::protocol::ExportCategory> = request
        .categories
        .iter()
        .filter(|category| category.kind != "keypoint")
        .collect();
    let class_index_by_id: BTreeMap<i64, usize> = exported_categories
        .iter()
        .enumerate()
        .map(|(idx, category)| (category.id, idx))
        .collect();

    // Pose columns only when some annotation actually carries
    // keypoints. The declared slot count on a category is consulted
    // only as a width fallback, never as a trigger.
    let mut has_keypoints = request
        .annotations
        .iter()
        .filter_map(|a| a.geometry.as_bbox())
        .any(|bbox| bbox.keypoints.is_some());
    let mut kpt_count = request
        .annotations
        .iter()
        .filter_map(|a| a.geometry.as_bbox())
        .map(BboxData::keypoint_count)
        .max()
        .unwrap_or(0);
    if has_keypoints && kpt_count == 0 {
        for category in &exported_categories {
            kpt_count = kpt_count.max(category.keypoint_names().len());
        }
    }
    has_keypoints = kpt_count > 0;

    let mut lines_by_image: BTreeMap<&str, Vec<String>> = BTreeMap::new();
    for annotation in &request.annotations {
        let Some(&class_index) = class_index_by_id.get(&annotation.category_id) else {
            continue;
        };
        let line = match &annotation.geometry {
            Geometry::Bbox(bbox) => format_bbox_line(class_index, bbox, has_keypoints, kpt_count),
            Geometry::Polygon(polygon) => {
                let Some(line) = format_polygon_line(class_index, &polygon.points) else {
                    continue;
                };
                line
            }
        };
        lines_by_image
            .entry(annotation.image_key.as_str())
            .or_default()
            .push(line);
    }

    for image in &request.images {
        response.stats.record_split(image.split);

        let file_name = basename(&image.relative_path);
        response.structure.copy_images.push(CopyTask {
            from: image.absolute_path.clone(),
            to: format!("{}/images/{}", image.split.as_str(), file_name),
        });

        if let Some(lines) = lines_by_image.get(image.key.as_str()) {
            let stem = file_stem_string(Path::new(&file_name));
            response.structure.files.push(FileOutput {
                path: format!("{}/labels/{stem}.txt", image.split.as_str()),
                content: format!("{}\n", lines.join("\n")),
            });
        }
    }

    let names: Vec<&str> = exported_categories
        .iter()
        .map(|category| category.name.as_str())
        .collect();
    response.structure.files.push(FileOutput {
        path: "data.yaml".to_string(),
        content: render_data_yaml(&names, has_keypoints.then_some(kpt_count)),
    });

    response.stats.image_count = request.images.len();
    response.stats.annotation_count = request.annotations.len();
    response
}

fn format_bbox_line(
    class_index: usize,
    bbox: &BboxData,
    has_keypoints: bool,
    kpt_count: usize,
) -> String {
    let cx = bbox.x + bbox.width / 2.0;
    let cy = bbox.y + bbox.height / 2.0;
    let mut line = format!(
        "{class_index} {cx:.6} {cy:.6} {:.6} {:.6}",
        bbox.width, bbox.height
    );

    if has_keypoints {
        let keypoints = bbox.keypoints.as_deref().unwrap_or_default();
        for kp in keypoints.iter().take(kpt_count) {
            line.push_str(&format!(" {:.6} {:.6} {}", kp.x, kp.y, kp.visibility as i64));
        }
        for _ in keypoints.len()..kpt_count {
            line.push_str(" 0 0 0");
        }
    }

    line
}

fn format_polygon_line(class_index: usize, points: &[[f64; 2]]) -> Option<String> {
    if points.len() < 3 {
        return None;
    }
    let mut line = class_index.to_string();
    for point in points {
        line.push_str(&format!(" {:.6} {:.6}", point[0], point[1]));
    }
    Some(line)
}

fn render_data_yaml(names: &[&str], kpt_count: Option<usize>) -> String {
    let quoted: Vec<String> = names.iter().map(|name| format!("'{name}'")).collect();
    let mut content = format!(
        "train: ./train/images\nval: ./val/images\ntest: ./test/images\n\nnc: {}\nnames: [{}]\n",
        names.len(),
        quoted.join(", ")
    );
    if let Some(count) = kpt_count {
        content.push_str(&format!("kpt_shape: [{count}, 3]\n"));
    }
    content
}

fn basename(path: &str) -> String {
    Path::new(path)
        .file_name()
        .map(|name| name.to_string_lossy().to_string())
        .unwrap_or_else(|| path.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::CategoryKind;
    use crate::protocol::{ExportAnnotation, ExportCategory, ExportImage};
    use std::fs;

    // Minimal 2x2 BMP so dimension probing has something real to read.
    fn bmp_bytes() -> Vec<u8> {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(b"BM");
        bytes.extend_from_slice(&70u32.to_le_bytes());
        bytes.extend_from_slice(&[0; 4]);
        bytes.extend_from_slice(&54u32.to_le_bytes());
        bytes.extend_from_slice(&40u32.to_le_bytes());
        bytes.extend_from_slice(&2i32.to_le_bytes());
        bytes.extend_from_slice(&2i32.to_le_bytes());
        bytes.extend_from_slice(&1u16.to_le_bytes());
        bytes.extend_from_slice(&24u16.to_le_bytes());
        bytes.extend_from_slice(&[0; 24]);
        bytes.extend_from_slice(&[0; 16]);
        bytes
    }

    fn write_dataset(root: &Path, label_content: &str) {
        fs::create_dir_all(root.join("labels")).expect("create labels dir");
        fs::create_dir_all(root.join("images")).expect("create images dir");
        fs::write(root.join("labels/img001.txt"), label_content).expect("write label file");
        fs::write(root.join("images/img001.bmp"), bmp_bytes()).expect("write image");
    }

    #[test]
    fn detect_scores_plausible_label_file() {
        let temp = tempfile::tempdir().expect("create temp dir");
        write_dataset(temp.path(), "0 0.5 0.5 0.2 0.2\n");

        let score = detect(temp.path());
        assert_eq!(score.score, 0.85);
        assert!(score.reason.contains("img001.txt"));
    }

    #[test]
    fn detect_ignores_name_files_and_rejects_prose() {
        let temp = tempfile::tempdir().expect("create temp dir");
        fs::create_dir_all(temp.path().join("labels")).expect("create labels dir");
        fs::write(temp.path().join("labels/classes.txt"), "person\ncar\n").expect("write names");
        fs::write(temp.path().join("labels/notes.txt"), "not a label file\n")
            .expect("write notes");

        let score = detect(temp.path());
        assert_eq!(score.score, 0.0);
        assert!(score.reason.contains("not valid YOLO"));
    }

    #[test]
    fn import_builds_categories_from_used_classes_only() {
        let temp = tempfile::tempdir().expect("create temp dir");
        write_dataset(temp.path(), "2 0.5 0.5 0.2 0.2\n");
        fs::write(temp.path().join("classes.txt"), "person\ncar\ndog\nbird\n")
            .expect("write classes");

        let response = import(temp.path(), &ImportParams::default());
        assert_eq!(response.categories.len(), 1);
        assert_eq!(response.categories[0].key, "class_2");
        assert_eq!(response.categories[0].name, "dog");
    }

    #[test]
    fn import_converts_center_format_to_top_left() {
        let temp = tempfile::tempdir().expect("create temp dir");
        write_dataset(temp.path(), "0 0.5 0.5 0.2 0.4\n");

        let response = import(temp.path(), &ImportParams::default());
        let bbox = response.annotations[0]
            .geometry
            .as_bbox()
            .expect("bbox geometry");
        assert!((bbox.x - 0.4).abs() < 1e-12);
        assert!((bbox.y - 0.3).abs() < 1e-12);
        assert!((bbox.width - 0.2).abs() < 1e-12);
        assert!((bbox.height - 0.4).abs() < 1e-12);
    }

    #[test]
    fn import_reads_keypoint_triplets_verbatim() {
        let temp = tempfile::tempdir().expect("create temp dir");
        write_dataset(temp.path(), "0 0.5 0.5 0.2 0.2 0.45 0.55 2 0.5 0.6 1\n");

        let response = import(temp.path(), &ImportParams::default());
        assert_eq!(response.categories.len(), 2);
        assert_eq!(response.categories[0].key, "class_0_kp");
        assert_eq!(response.categories[0].kind, CategoryKind::Keypoint);
        assert_eq!(response.categories[0].meta.keypoints.len(), 2);

        let bbox = response.annotations[0]
            .geometry
            .as_bbox()
            .expect("bbox geometry");
        let keypoints = bbox.keypoints.as_ref().expect("keypoints");
        assert_eq!(keypoints.len(), 2);
        assert_eq!(keypoints[0], Keypoint::new(0.45, 0.55, 2.0));
        assert_eq!(bbox.keypoint_category_key.as_deref(), Some("class_0_kp"));
    }

    #[test]
    fn import_keeps_box_when_trailing_tokens_are_not_triplets() {
        let row = parse_label_line("0 0.5 0.5 0.2 0.2 0.1 0.2").expect("parse line");
        assert!(row.keypoints.is_empty());
    }

    #[test]
    fn import_counts_malformed_lines_once() {
        let temp = tempfile::tempdir().expect("create temp dir");
        write_dataset(
            temp.path(),
            "# header comment\n0 0.5 0.5 0.2 0.2\nnot a row\n1 0.5\n",
        );

        let response = import(temp.path(), &ImportParams::default());
        assert_eq!(response.stats.annotation_count, 1);
        assert_eq!(response.stats.skipped_annotations, 2);
    }

    #[test]
    fn orphan_label_files_only_lose_their_boxes() {
        let temp = tempfile::tempdir().expect("create temp dir");
        write_dataset(temp.path(), "0 0.5 0.5 0.2 0.2\n");
        fs::write(temp.path().join("labels/orphan.txt"), "0 0.5 0.5 0.2 0.2\n")
            .expect("write orphan label");

        let response = import(temp.path(), &ImportParams::default());
        assert_eq!(response.stats.image_count, 1);
        assert_eq!(response.stats.skipped_images, 0);
        assert_eq!(response.stats.skipped_annotations, 1);
        assert_eq!(response.stats.annotation_count, 1);
    }

    #[test]
    fn unlabeled_images_still_materialize() {
        let temp = tempfile::tempdir().expect("create temp dir");
        write_dataset(temp.path(), "0 0.5 0.5 0.2 0.2\n");
        fs::write(temp.path().join("images/extra.bmp"), bmp_bytes()).expect("write image");

        let response = import(temp.path(), &ImportParams::default());
        assert_eq!(response.stats.image_count, 2);
        assert_eq!(response.stats.annotation_count, 1);

        let keys: Vec<&str> = response.images.iter().map(|i| i.key.as_str()).collect();
        assert_eq!(keys, vec!["images/extra.bmp", "images/img001.bmp"]);
    }

    #[test]
    fn import_of_empty_label_files_is_empty_but_not_an_error() {
        let temp = tempfile::tempdir().expect("create temp dir");
        write_dataset(temp.path(), "");

        let response = import(temp.path(), &ImportParams::default());
        assert!(response.errors.is_empty());
        assert!(response.images.is_empty());
        assert!(response.categories.is_empty());
    }

    #[test]
    fn import_without_labels_dir_reports_configuration_error() {
        let temp = tempfile::tempdir().expect("create temp dir");

        let response = import(temp.path(), &ImportParams::default());
        assert_eq!(response.errors.len(), 1);
        assert_eq!(response.errors[0].code, error_codes::MISSING_LABELS_DIR);
    }

    #[test]
    fn data_yaml_names_accept_sequence_and_mapping() {
        let temp = tempfile::tempdir().expect("create temp dir");

        fs::write(temp.path().join("data.yaml"), "nc: 2\nnames: [person, car]\n")
            .expect("write yaml");
        assert_eq!(
            read_data_yaml_names(&temp.path().join("data.yaml")),
            vec!["person", "car"]
        );

        fs::write(
            temp.path().join("dataset.yaml"),
            "names:\n  1: car\n  0: person\n",
        )
        .expect("write yaml");
        assert_eq!(
            read_data_yaml_names(&temp.path().join("dataset.yaml")),
            vec!["person", "car"]
        );
    }

    fn export_image(key: &str, split: Split) -> ExportImage {
        ExportImage {
            key: key.to_string(),
            relative_path: format!("images/{key}"),
            absolute_path: format!("/data/images/{key}"),
            width: 100,
            height: 50,
            split,
        }
    }

    fn bbox_annotation(image_key: &str, category_id: i64, bbox: BboxData) -> ExportAnnotation {
        ExportAnnotation {
            id: None,
            image_key: image_key.to_string(),
            category_id,
            geometry: Geometry::Bbox(bbox),
        }
    }

    fn category(id: i64, name: &str) -> ExportCategory {
        ExportCategory {
            id,
            name: name.to_string(),
            kind: "bbox".to_string(),
            color: String::new(),
            mate: String::new(),
        }
    }

    #[test]
    fn export_writes_center_format_with_six_decimals() {
        let mut bbox = BboxData::new(0.1, 0.2, 0.2, 0.2);
        bbox.keypoints = Some(vec![Keypoint::new(0.15, 0.3, 2.0)]);

        let request = ExportRequest {
            format: "yolo".to_string(),
            images: vec![export_image("a.jpg", Split::Train)],
            categories: vec![category(7, "cat")],
            annotations: vec![bbox_annotation("a.jpg", 7, bbox)],
            ..Default::default()
        };

        let response = export(&request);
        let label = response
            .structure
            .files
            .iter()
            .find(|f| f.path == "train/labels/a.txt")
            .expect("label file");
        assert_eq!(
            label.content,
            "0 0.200000 0.300000 0.200000 0.200000 0.150000 0.300000 2\n"
        );

        let yaml = response
            .structure
            .files
            .iter()
            .find(|f| f.path == "data.yaml")
            .expect("data.yaml");
        assert!(yaml.content.contains("nc: 1"));
        assert!(yaml.content.contains("names: ['cat']"));
        assert!(yaml.content.contains("kpt_shape: [1, 3]"));
    }

    #[test]
    fn export_pads_keypointless_lines_to_uniform_width() {
        let mut with_kps = BboxData::new(0.1, 0.1, 0.2, 0.2);
        with_kps.keypoints = Some(vec![
            Keypoint::new(0.15, 0.15, 2.0),
            Keypoint::new(0.2, 0.2, 1.0),
        ]);

        let request = ExportRequest {
            format: "yolo".to_string(),
            images: vec![export_image("a.jpg", Split::Train)],
            categories: vec![category(1, "cat")],
            annotations: vec![
                bbox_annotation("a.jpg", 1, with_kps),
                bbox_annotation("a.jpg", 1, BboxData::new(0.5, 0.5, 0.2, 0.2)),
            ],
            ..Default::default()
        };

        let response = export(&request);
        let label = &response
            .structure
            .files
            .iter()
            .find(|f| f.path == "train/labels/a.txt")
            .expect("label file")
            .content;

        for line in label.trim_end().lines() {
            assert_eq!(line.split_whitespace().count(), 5 + 2 * 3);
        }
        assert!(label.lines().nth(1).expect("second line").ends_with("0 0 0 0 0 0"));
    }

    #[test]
    fn export_skips_label_file_for_unannotated_images() {
        let request = ExportRequest {
            format: "yolo".to_string(),
            images: vec![export_image("a.jpg", Split::Val)],
            categories: vec![category(1, "cat")],
            annotations: vec![],
            ..Default::default()
        };

        let response = export(&request);
        assert!(response
            .structure
            .files
            .iter()
            .all(|f| f.path == "data.yaml"));
        assert_eq!(response.structure.copy_images[0].to, "val/images/a.jpg");
        assert_eq!(response.stats.val_count, 1);
    }

    #[test]
    fn export_class_index_skips_keypoint_categories() {
        let mut categories = vec![category(1, "person"), category(2, "dog")];
        categories.insert(
            1,
            ExportCategory {
                id: 9,
                name: "person_keypoints".to_string(),
                kind: "keypoint".to_string(),
                color: String::new(),
                mate: String::new(),
            },
        );

        let request = ExportRequest {
            format: "yolo".to_string(),
            images: vec![export_image("a.jpg", Split::Train)],
            categories,
            annotations: vec![bbox_annotation("a.jpg", 2, BboxData::new(0.1, 0.1, 0.2, 0.2))],
            ..Default::default()
        };

        let response = export(&request);
        let label = response
            .structure
            .files
            .iter()
            .find(|f| f.path == "train/labels/a.txt")
            .expect("label file");
        assert!(label.content.starts_with("1 "));

        let yaml = response
            .structure
            .files
            .iter()
            .find(|f| f.path == "data.yaml")
            .expect("data.yaml");
        assert!(yaml.content.contains("names: ['person', 'dog']"));
    }

    #[test]
    fn export_polygon_line_is_flat_vertex_list() {
        let line = format_polygon_line(3, &[[0.1, 0.1], [0.5, 0.1], [0.5, 0.4]])
            .expect("polygon line");
        assert_eq!(
            line,
            "3 0.100000 0.100000 0.500000 0.100000 0.500000 0.400000"
        );
        assert!(format_polygon_line(3, &[[0.1, 0.1], [0.5, 0.1]]).is_none());
    }
}
