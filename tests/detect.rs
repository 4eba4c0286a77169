//! Detection behavior across whole dataset trees.

mod common;

use std::fs;

use labelconv::dispatch;
use labelconv::protocol::DetectRequest;

fn detect_at(root: &std::path::Path) -> labelconv::protocol::DetectResponse {
    dispatch::detect(&DetectRequest {
        root_path: root.to_string_lossy().to_string(),
        ..Default::default()
    })
}

#[test]
fn coco_tree_scores_highest() {
    let temp = tempfile::tempdir().expect("create temp dir");
    common::write_coco_fixture(temp.path());

    let response = detect_at(temp.path());
    assert!(response.supported);
    assert_eq!(response.score, 0.9);
    assert_eq!(response.format_id, "dataset.common:coco");
    assert_eq!(
        response.reason,
        "[COCO] Found COCO annotation: annotations.json"
    );
}

#[test]
fn yolo_tree_scores_085() {
    let temp = tempfile::tempdir().expect("create temp dir");
    common::write_yolo_fixture(temp.path());

    let response = detect_at(temp.path());
    assert!(response.supported);
    assert_eq!(response.score, 0.85);
    assert_eq!(response.format_id, "dataset.common:yolo");
    assert!(response.reason.starts_with("[YOLO] "));
}

#[test]
fn voc_tree_scores_088() {
    let temp = tempfile::tempdir().expect("create temp dir");
    fs::create_dir_all(temp.path().join("Annotations")).expect("create dirs");
    fs::write(
        temp.path().join("Annotations/img001.xml"),
        r#"<annotation>
            <filename>img001.jpg</filename>
            <size><width>100</width><height>50</height></size>
            <object><name>dog</name>
                <bndbox><xmin>1</xmin><ymin>1</ymin><xmax>5</xmax><ymax>5</ymax></bndbox>
            </object>
        </annotation>"#,
    )
    .expect("write xml");

    let response = detect_at(temp.path());
    assert!(response.supported);
    assert_eq!(response.score, 0.88);
    assert_eq!(response.format_id, "dataset.common:voc");
}

#[test]
fn coco_wins_in_a_mixed_tree() {
    // A tree holding both a COCO JSON and YOLO label files resolves to
    // the higher-scoring COCO.
    let temp = tempfile::tempdir().expect("create temp dir");
    common::write_coco_fixture(temp.path());
    common::write_yolo_fixture(temp.path());

    let response = detect_at(temp.path());
    assert_eq!(response.format_id, "dataset.common:coco");
    assert_eq!(response.score, 0.9);
}

#[test]
fn empty_tree_is_unsupported() {
    let temp = tempfile::tempdir().expect("create temp dir");

    let response = detect_at(temp.path());
    assert!(!response.supported);
    assert_eq!(response.score, 0.0);
    assert_eq!(
        response.reason,
        "No supported dataset format detected (COCO/YOLO/VOC)"
    );
    assert_eq!(response.format_id, "dataset.common");
}

#[test]
fn detection_reads_but_never_writes_the_tree() {
    let temp = tempfile::tempdir().expect("create temp dir");
    common::write_yolo_fixture(temp.path());
    let before: Vec<_> = walkdir_paths(temp.path());

    detect_at(temp.path());

    assert_eq!(walkdir_paths(temp.path()), before);
}

fn walkdir_paths(root: &std::path::Path) -> Vec<std::path::PathBuf> {
    let mut paths: Vec<_> = walkdir::WalkDir::new(root)
        .into_iter()
        .flatten()
        .map(|entry| entry.path().to_path_buf())
        .collect();
    paths.sort();
    paths
}
