//! Normalized annotation geometry.
//!
//! All geometry in the intermediate model is normalized to [0, 1] relative
//! to the owning image's dimensions, with a top-left origin. The `Geometry`
//! enum is the on-the-wire tagged union: `type` selects the variant and
//! `data` carries its fields, so only the two on-disk geometry kinds
//! (bbox, polygon) can ever be represented. Keypoints are not a geometry
//! kind of their own; they ride along inside a bbox as a satellite field.

use serde::de::{SeqAccess, Visitor};
use serde::ser::SerializeSeq;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::BTreeMap;

/// A single named keypoint instance: normalized position plus the COCO-style
/// visibility flag (0 = absent, 1 = occluded, 2 = visible).
///
/// Serialized as a bare `[x, y, visibility]` triple.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Keypoint {
    pub x: f64,
    pub y: f64,
    pub visibility: f64,
}

impl Keypoint {
    #[inline]
    pub fn new(x: f64, y: f64, visibility: f64) -> Self {
        Self { x, y, visibility }
    }
}

// Custom serde so a keypoint travels as a 3-element array, matching the
// wire contract, without an intermediate tuple type.
impl Serialize for Keypoint {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut seq = serializer.serialize_seq(Some(3))?;
        seq.serialize_element(&self.x)?;
        seq.serialize_element(&self.y)?;
        seq.serialize_element(&self.visibility)?;
        seq.end()
    }
}

impl<'de> Deserialize<'de> for Keypoint {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct KeypointVisitor;

        impl<'de> Visitor<'de> for KeypointVisitor {
            type Value = Keypoint;

            fn expecting(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str("a [x, y, visibility] triple")
            }

            fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> Result<Keypoint, A::Error> {
                let x = seq
                    .next_element::<f64>()?
                    .ok_or_else(|| serde::de::Error::invalid_length(0, &self))?;
                let y = seq
                    .next_element::<f64>()?
                    .ok_or_else(|| serde::de::Error::invalid_length(1, &self))?;
                let visibility = seq
                    .next_element::<f64>()?
                    .ok_or_else(|| serde::de::Error::invalid_length(2, &self))?;
                // Tolerate (and drop) trailing elements.
                while seq.next_element::<serde_json::Value>()?.is_some() {}
                Ok(Keypoint { x, y, visibility })
            }
        }

        deserializer.deserialize_seq(KeypointVisitor)
    }
}

/// Normalized bounding box data, top-left origin.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct BboxData {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,

    /// Satellite keypoints carried inside the box, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub keypoints: Option<Vec<Keypoint>>,

    /// Echo of the bound keypoint category so consumers can resolve the
    /// slot names without a join.
    #[serde(
        rename = "keypointCategoryKey",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub keypoint_category_key: Option<String>,
}

impl BboxData {
    /// A plain box with no keypoint payload.
    pub fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self {
            x,
            y,
            width,
            height,
            keypoints: None,
            keypoint_category_key: None,
        }
    }

    /// Number of keypoint triplets carried by this box.
    pub fn keypoint_count(&self) -> usize {
        self.keypoints.as_ref().map_or(0, Vec::len)
    }
}

/// Normalized polygon data: an ordered ring of `[x, y]` vertices.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct PolygonData {
    pub points: Vec<[f64; 2]>,
}

/// The tagged geometry union. Flattened into annotation objects so the
/// wire shape is `{"type": "bbox", "data": {...}}`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "lowercase")]
pub enum Geometry {
    Bbox(BboxData),
    Polygon(PolygonData),
}

impl Geometry {
    pub fn as_bbox(&self) -> Option<&BboxData> {
        match self {
            Geometry::Bbox(data) => Some(data),
            Geometry::Polygon(_) => None,
        }
    }

    pub fn as_polygon(&self) -> Option<&PolygonData> {
        match self {
            Geometry::Bbox(_) => None,
            Geometry::Polygon(data) => Some(data),
        }
    }
}

/// Residual untyped metadata bag for fields no current format needs.
pub type ExtraFields = BTreeMap<String, serde_json::Value>;

/// Clamps a normalized coordinate into [0, 1].
#[inline]
pub fn clamp_unit(value: f64) -> f64 {
    value.clamp(0.0, 1.0)
}

/// Clamps a normalized top-left box into the unit square.
///
/// Position is clamped first, then the extent is capped so the box never
/// spills past 1.0. Source annotations slightly exceeding image bounds
/// (common in COCO) therefore survive as edge-touching boxes.
pub fn clamp_bbox(x: f64, y: f64, width: f64, height: f64) -> (f64, f64, f64, f64) {
    let cx = clamp_unit(x);
    let cy = clamp_unit(y);
    let cw = clamp_unit(width).min(1.0 - cx);
    let ch = clamp_unit(height).min(1.0 - cy);
    (cx, cy, cw, ch)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keypoint_serializes_as_triple() {
        let kp = Keypoint::new(0.15, 0.3, 2.0);
        let json = serde_json::to_string(&kp).expect("serialize keypoint");
        assert_eq!(json, "[0.15,0.3,2.0]");
    }

    #[test]
    fn keypoint_roundtrips() {
        let kp: Keypoint = serde_json::from_str("[0.5, 0.25, 1]").expect("parse keypoint");
        assert_eq!(kp, Keypoint::new(0.5, 0.25, 1.0));
    }

    #[test]
    fn geometry_wire_shape_is_adjacently_tagged() {
        let geometry = Geometry::Bbox(BboxData::new(0.1, 0.2, 0.3, 0.4));
        let value = serde_json::to_value(&geometry).expect("serialize geometry");
        assert_eq!(value["type"], "bbox");
        assert_eq!(value["data"]["x"], 0.1);
        assert_eq!(value["data"]["height"], 0.4);
        assert!(value["data"].get("keypoints").is_none());
    }

    #[test]
    fn polygon_points_are_pairs() {
        let geometry = Geometry::Polygon(PolygonData {
            points: vec![[0.0, 0.0], [0.5, 0.0], [0.5, 0.5]],
        });
        let value = serde_json::to_value(&geometry).expect("serialize geometry");
        assert_eq!(value["type"], "polygon");
        assert_eq!(value["data"]["points"][2][1], 0.5);
    }

    #[test]
    fn clamp_bbox_keeps_box_inside_unit_square() {
        let (x, y, w, h) = clamp_bbox(-0.05, 0.9, 0.5, 0.5);
        assert_eq!(x, 0.0);
        assert_eq!(y, 0.9);
        assert_eq!(w, 0.5);
        assert!((h - 0.1).abs() < 1e-12);
    }

    #[test]
    fn clamp_bbox_leaves_valid_boxes_alone() {
        let (x, y, w, h) = clamp_bbox(0.1, 0.2, 0.2, 0.2);
        assert_eq!((x, y, w, h), (0.1, 0.2, 0.2, 0.2));
    }
}
