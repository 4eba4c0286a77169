//! YOLO export scenarios, including the COCO-to-YOLO keypoint path.

mod common;

use labelconv::dispatch;
use labelconv::ir::{BboxData, Geometry, Keypoint};
use labelconv::protocol::{
    ExportAnnotation, ExportCategory, ExportImage, ExportRequest, ImportRequest, Split,
};

fn image(key: &str, split: Split) -> ExportImage {
    ExportImage {
        key: key.to_string(),
        relative_path: format!("images/{key}"),
        absolute_path: format!("/data/images/{key}"),
        width: 100,
        height: 50,
        split,
    }
}

fn bbox_category(id: i64, name: &str) -> ExportCategory {
    ExportCategory {
        id,
        name: name.to_string(),
        kind: "bbox".to_string(),
        color: String::new(),
        mate: String::new(),
    }
}

#[test]
fn coco_import_exports_the_documented_yolo_line() {
    let temp = tempfile::tempdir().expect("create temp dir");
    common::write_coco_fixture(temp.path());

    let imported = dispatch::import(&ImportRequest {
        root_path: temp.path().to_string_lossy().to_string(),
        format_id: "dataset.common:coco".to_string(),
        ..Default::default()
    });

    // Host-style id assignment: ids by category position.
    let request = ExportRequest {
        format: "yolo".to_string(),
        images: vec![image("img001.jpg", Split::Train)],
        categories: imported
            .categories
            .iter()
            .enumerate()
            .map(|(idx, category)| ExportCategory {
                id: idx as i64 + 1,
                name: category.name.clone(),
                kind: serde_json::to_value(category.kind)
                    .expect("serialize kind")
                    .as_str()
                    .expect("kind string")
                    .to_string(),
                color: category.color.clone(),
                mate: String::new(),
            })
            .collect(),
        annotations: imported
            .annotations
            .iter()
            .map(|annotation| ExportAnnotation {
                id: None,
                image_key: "img001.jpg".to_string(),
                category_id: imported
                    .categories
                    .iter()
                    .position(|c| c.key == annotation.category_key)
                    .expect("category position") as i64
                    + 1,
                geometry: annotation.geometry.clone(),
            })
            .collect(),
        ..Default::default()
    };

    let exported = dispatch::export(&request);
    assert!(exported.success);

    let label = exported
        .structure
        .files
        .iter()
        .find(|file| file.path == "train/labels/img001.txt")
        .expect("label file");
    assert_eq!(
        label.content,
        "0 0.200000 0.300000 0.200000 0.200000 0.150000 0.300000 2\n"
    );

    let yaml = exported
        .structure
        .files
        .iter()
        .find(|file| file.path == "data.yaml")
        .expect("data.yaml");
    assert!(yaml.content.starts_with("train: ./train/images\n"));
    assert!(yaml.content.contains("nc: 1"));
    assert!(yaml.content.contains("names: ['cat']"));
    assert!(yaml.content.contains("kpt_shape: [1, 3]"));
}

#[test]
fn mixed_keypoint_presence_pads_every_line_to_uniform_width() {
    let mut with_kps = BboxData::new(0.1, 0.1, 0.2, 0.2);
    with_kps.keypoints = Some(vec![
        Keypoint::new(0.15, 0.15, 2.0),
        Keypoint::new(0.2, 0.2, 1.0),
        Keypoint::new(0.25, 0.25, 0.0),
    ]);

    let request = ExportRequest {
        format: "yolo".to_string(),
        images: vec![image("a.jpg", Split::Train), image("b.jpg", Split::Val)],
        categories: vec![bbox_category(1, "person"), bbox_category(2, "dog")],
        annotations: vec![
            ExportAnnotation {
                id: None,
                image_key: "a.jpg".to_string(),
                category_id: 1,
                geometry: Geometry::Bbox(with_kps),
            },
            ExportAnnotation {
                id: None,
                image_key: "a.jpg".to_string(),
                category_id: 2,
                geometry: Geometry::Bbox(BboxData::new(0.4, 0.4, 0.1, 0.1)),
            },
            ExportAnnotation {
                id: None,
                image_key: "b.jpg".to_string(),
                category_id: 2,
                geometry: Geometry::Bbox(BboxData::new(0.6, 0.6, 0.2, 0.2)),
            },
        ],
        ..Default::default()
    };

    let exported = dispatch::export(&request);
    let label_files: Vec<_> = exported
        .structure
        .files
        .iter()
        .filter(|file| file.path.ends_with(".txt"))
        .collect();
    assert_eq!(label_files.len(), 2);

    // 5 base tokens plus 3 tokens per keypoint slot, on every line of
    // every file, keypoints or not.
    for file in label_files {
        for line in file.content.trim_end().lines() {
            assert_eq!(line.split_whitespace().count(), 5 + 3 * 3, "{line}");
        }
    }

    assert_eq!(exported.stats.train_count, 1);
    assert_eq!(exported.stats.val_count, 1);
}

#[test]
fn without_keypoints_lines_stay_five_tokens() {
    let request = ExportRequest {
        format: "yolo".to_string(),
        images: vec![image("a.jpg", Split::Train)],
        categories: vec![bbox_category(1, "person")],
        annotations: vec![ExportAnnotation {
            id: None,
            image_key: "a.jpg".to_string(),
            category_id: 1,
            geometry: Geometry::Bbox(BboxData::new(0.25, 0.25, 0.5, 0.5)),
        }],
        ..Default::default()
    };

    let exported = dispatch::export(&request);
    let label = exported
        .structure
        .files
        .iter()
        .find(|file| file.path == "train/labels/a.txt")
        .expect("label file");
    assert_eq!(label.content, "0 0.500000 0.500000 0.500000 0.500000\n");

    let yaml = exported
        .structure
        .files
        .iter()
        .find(|file| file.path == "data.yaml")
        .expect("data.yaml");
    assert!(!yaml.content.contains("kpt_shape"));
}

#[test]
fn declared_slots_without_keypoint_annotations_stay_plain_detection() {
    // A category that merely declares keypoint slots must not flip the
    // export into pose format; only annotations carrying keypoints do.
    let mut category = bbox_category(1, "person");
    category.mate = r#"{"keypoints":[{"name":"nose"},{"name":"tail"}]}"#.to_string();

    let request = ExportRequest {
        format: "yolo".to_string(),
        images: vec![image("a.jpg", Split::Train)],
        categories: vec![category],
        annotations: vec![ExportAnnotation {
            id: None,
            image_key: "a.jpg".to_string(),
            category_id: 1,
            geometry: Geometry::Bbox(BboxData::new(0.1, 0.1, 0.2, 0.2)),
        }],
        ..Default::default()
    };

    let exported = dispatch::export(&request);
    let label = exported
        .structure
        .files
        .iter()
        .find(|file| file.path == "train/labels/a.txt")
        .expect("label file");
    assert_eq!(label.content, "0 0.200000 0.200000 0.200000 0.200000\n");

    let yaml = exported
        .structure
        .files
        .iter()
        .find(|file| file.path == "data.yaml")
        .expect("data.yaml");
    assert!(!yaml.content.contains("kpt_shape"));
}

#[test]
fn category_slots_set_width_when_keypoint_fields_are_empty() {
    // An annotation with an empty keypoints field establishes pose
    // format; the width then falls back to the category's slot count.
    let mut category = bbox_category(1, "person");
    category.mate = r#"{"keypoints":[{"name":"nose"},{"name":"tail"}]}"#.to_string();

    let mut bbox = BboxData::new(0.1, 0.1, 0.2, 0.2);
    bbox.keypoints = Some(Vec::new());

    let request = ExportRequest {
        format: "yolo".to_string(),
        images: vec![image("a.jpg", Split::Train)],
        categories: vec![category],
        annotations: vec![ExportAnnotation {
            id: None,
            image_key: "a.jpg".to_string(),
            category_id: 1,
            geometry: Geometry::Bbox(bbox),
        }],
        ..Default::default()
    };

    let exported = dispatch::export(&request);
    let label = exported
        .structure
        .files
        .iter()
        .find(|file| file.path == "train/labels/a.txt")
        .expect("label file");
    assert_eq!(
        label.content,
        "0 0.200000 0.200000 0.200000 0.200000 0 0 0 0 0 0\n"
    );

    let yaml = exported
        .structure
        .files
        .iter()
        .find(|file| file.path == "data.yaml")
        .expect("data.yaml");
    assert!(yaml.content.contains("kpt_shape: [2, 3]"));
}
