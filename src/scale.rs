//! Combined/bulk output: an arbitrary number of certificates packed onto a
//! caller-chosen number of pages. Certificates stack vertically; positions
//! map proportionally into each slot so every field keeps its relative place,
//! and one averaged scale factor (with legibility floors) drives font sizes
//! and spacing.

use crate::error::CertPressError;
use crate::types::{Pt, Size};

/// Baseline certificate size the proportional math is anchored to: a
/// one-third-of-letter slot, so a 3-per-page letter layout renders at 1:1.
pub const REFERENCE_WIDTH: f32 = 612.0;
pub const REFERENCE_HEIGHT: f32 = 264.0;

const MIN_SCALE: f32 = 0.35;
const MIN_FONT_PT: f32 = 6.0;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CombinedPlan {
    pub per_page: usize,
    pub page_count: usize,
    pub slot_height: Pt,
    x_ratio: f32,
    y_ratio: f32,
    scale: f32,
}

impl CombinedPlan {
    pub fn scale(&self) -> f32 {
        self.scale
    }

    /// Horizontal mapping: authored x relative to the reference width lands
    /// at the same fraction of the page width.
    pub fn map_x(&self, authored_x: f32) -> Pt {
        Pt::from_f32(authored_x * self.x_ratio)
    }

    /// Vertical mapping into a slot, still in top-down authoring space; the
    /// coordinate translator flips it afterwards.
    pub fn map_y(&self, slot_index: usize, authored_y: f32) -> Pt {
        self.slot_height * slot_index as i32 + Pt::from_f32(authored_y * self.y_ratio)
    }

    pub fn map_len_x(&self, len: f32) -> Pt {
        Pt::from_f32(len * self.x_ratio)
    }

    pub fn map_len_y(&self, len: f32) -> Pt {
        Pt::from_f32(len * self.y_ratio)
    }

    /// Scaled font size with the legibility floor applied.
    pub fn font_size(&self, base: f32) -> Pt {
        Pt::from_f32((base * self.scale).max(MIN_FONT_PT))
    }
}

pub fn plan(
    record_count: usize,
    target_pages: usize,
    page: Size,
) -> Result<CombinedPlan, CertPressError> {
    if record_count == 0 {
        return Err(CertPressError::EmptyBatch);
    }
    let target_pages = target_pages.max(1);
    let per_page = record_count.div_ceil(target_pages);
    let page_count = record_count.div_ceil(per_page);
    let page_w = page.width.to_f32();
    let page_h = page.height.to_f32();
    let slot_h = page_h / per_page as f32;
    let x_ratio = page_w / REFERENCE_WIDTH;
    let y_ratio = slot_h / REFERENCE_HEIGHT;
    let scale = ((x_ratio + y_ratio) / 2.0).max(MIN_SCALE);
    Ok(CombinedPlan {
        per_page,
        page_count,
        slot_height: Pt::from_f32(slot_h),
        x_ratio,
        y_ratio,
        scale,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn three_per_letter_page_is_identity() {
        let plan = plan(3, 1, Size::letter()).unwrap();
        assert_eq!(plan.per_page, 3);
        assert!((plan.scale() - 1.0).abs() < 1e-3);
        assert_eq!(plan.map_x(100.0).to_milli_i64(), 100_000);
        assert_eq!(plan.map_y(0, 50.0).to_milli_i64(), 50_000);
        assert_eq!(plan.map_y(1, 50.0).to_milli_i64(), 314_000);
    }

    #[test]
    fn pages_follow_ceil_division() {
        let plan = plan(10, 3, Size::letter()).unwrap();
        assert_eq!(plan.per_page, 4);
        assert_eq!(plan.page_count, 3);
        // Fewer records than requested pages never produces empty pages.
        let small = super::plan(2, 5, Size::letter()).unwrap();
        assert_eq!(small.per_page, 1);
        assert_eq!(small.page_count, 2);
    }

    #[test]
    fn relative_position_survives_doubling() {
        // Halving target pages while doubling the record count must keep the
        // x/page-width and y/slot-height ratios stable.
        let a = plan(6, 4, Size::letter()).unwrap();
        let b = plan(12, 2, Size::letter()).unwrap();
        let page_w = Size::letter().width.to_f32();
        let ax = a.map_x(200.0).to_f32() / page_w;
        let bx = b.map_x(200.0).to_f32() / page_w;
        assert!((ax - bx).abs() < 1e-4);
        let ay = (a.map_y(0, 130.0).to_f32()) / a.slot_height.to_f32();
        let by = (b.map_y(0, 130.0).to_f32()) / b.slot_height.to_f32();
        assert!((ay - by).abs() < 1e-3);
    }

    #[test]
    fn font_floor_keeps_text_legible() {
        let crowded = plan(40, 1, Size::letter()).unwrap();
        assert_eq!(crowded.font_size(10.0).to_f32(), MIN_FONT_PT);
        let roomy = plan(3, 1, Size::letter()).unwrap();
        assert!((roomy.font_size(10.0).to_f32() - 10.0).abs() < 0.1);
    }

    #[test]
    fn scale_never_drops_below_floor() {
        let plan = plan(100, 1, Size::letter()).unwrap();
        assert!(plan.scale() >= MIN_SCALE);
    }
}
