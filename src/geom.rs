//! Authoring space is top-down (origin top-left, y grows downward); the page
//! description format is bottom-up. Text anchors flip directly because text
//! draws upward from its baseline; box-shaped elements (images, rectangles)
//! are authored by their top-left corner and additionally shift down by their
//! own height so they draw into the intended area.

use crate::types::Pt;

pub fn text_baseline_y(page_height: Pt, authored_y: Pt) -> Pt {
    page_height - authored_y
}

pub fn box_bottom_y(page_height: Pt, authored_y: Pt, height: Pt) -> Pt {
    page_height - authored_y - height
}

/// Inverse of `text_baseline_y`, used by tooling that maps page-space output
/// back to authored coordinates.
pub fn authored_y(page_height: Pt, translated_y: Pt) -> Pt {
    page_height - translated_y
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn text_round_trip_identity() {
        let page_h = Pt::from_f32(600.0);
        for raw in [0.0f32, 100.0, 599.5, 600.0] {
            let y = Pt::from_f32(raw);
            let translated = text_baseline_y(page_h, y);
            assert_eq!(authored_y(page_h, translated), y);
        }
    }

    #[test]
    fn authored_100_on_600_page_lands_at_500() {
        let y = text_baseline_y(Pt::from_f32(600.0), Pt::from_f32(100.0));
        assert_eq!(y.to_milli_i64(), 500_000);
    }

    #[test]
    fn boxes_shift_down_by_their_height() {
        let y = box_bottom_y(Pt::from_f32(600.0), Pt::from_f32(100.0), Pt::from_f32(40.0));
        assert_eq!(y.to_milli_i64(), 460_000);
    }
}
