//! Intermediate model for labelconv.
//!
//! This module defines the format-agnostic representation that every
//! importer produces and the export request mirrors. It plays the same
//! role an AST plays in a compiler: the three dataset formats parse into
//! it, and materialization plans render out of it.
//!
//! # Design principles
//!
//! 1. **Opaque keys, not ids**: entities carry string keys during import;
//!    the orchestrating caller resolves them to integer ids before export.
//!
//! 2. **Normalized geometry**: all coordinates are fractions of the owning
//!    image's dimensions, top-left origin, clamped into [0, 1] at import.
//!
//! 3. **Closed geometry union**: annotation payloads are a tagged enum per
//!    `type`, so the compiler checks every consumer handles both kinds.

pub mod geometry;
pub mod model;

pub use geometry::{clamp_bbox, clamp_unit, BboxData, Geometry, Keypoint, PolygonData};
pub use model::{
    pick_color, AnnotationDef, CategoryDef, CategoryKind, CategoryMeta, ImageMeta, ImageRef,
    ImportStats, KeypointSlot,
};
