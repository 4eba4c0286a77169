//! Shared fixtures for integration tests.
#![allow(dead_code)]

use std::fs;
use std::path::Path;

/// Bytes of a minimal 2x2 24-bit BMP, so dimension probing sees a real
/// image header.
pub fn bmp_bytes() -> Vec<u8> {
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

pub fn write_bmp(path: &Path) {
    fs::write(path, bmp_bytes()).expect("write bmp");
}

/// A one-image COCO dataset with a keypoint-bearing category: the image
/// is 100x50, the annotation is `bbox [10, 10, 20, 10]` with one `nose`
/// keypoint at pixel (15, 15).
pub fn write_coco_fixture(root: &Path) {
    fs::write(
        root.join("annotations.json"),
        r#"{
            "images": [
                {"id": 1, "width": 100, "height": 50, "file_name": "img001.jpg"}
            ],
            "categories": [
                {"id": 1, "name": "cat", "keypoints": ["nose"]}
            ],
            "annotations": [
                {"id": 1, "image_id": 1, "category_id": 1,
                 "bbox": [10.0, 10.0, 20.0, 10.0],
                 "keypoints": [15.0, 15.0, 2.0]}
            ]
        }"#,
    )
    .expect("write coco json");
}

/// A one-image YOLO dataset with labels/, images/ and a classes file.
pub fn write_yolo_fixture(root: &Path) {
    fs::create_dir_all(root.join("labels")).expect("create labels dir");
    fs::create_dir_all(root.join("images")).expect("create images dir");
    fs::write(root.join("labels/img001.txt"), "0 0.5 0.5 0.2 0.2\n").expect("write label");
    fs::write(root.join("classes.txt"), "person\n").expect("write classes");
    write_bmp(&root.join("images/img001.bmp"));
}
