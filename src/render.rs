//! Draws one certificate instance onto the canvas. Elements paint in a fixed
//! z-order: shapes, then images, then text, then checkbox marks, so marks and
//! substituted text always sit above decorative geometry.

use crate::assets::{AssetFetcher, ImageAsset};
use crate::canvas::Canvas;
use crate::checkbox;
use crate::error::CertPressError;
use crate::geom;
use crate::positions::{FieldPlacement, PositionLookup};
use crate::scale::CombinedPlan;
use crate::template::{
    Align, Background, CheckboxElement, ImageElement, ShapeElement, ShapeGeometry, Template,
    TextElement,
};
use crate::types::{Color, Pt};
use crate::vars::{self, Record, Transforms};
use std::collections::BTreeMap;

/// Average glyph advance as a fraction of the font size, for the base-14
/// faces this engine uses. Good enough for alignment and truncation.
const CHAR_WIDTH_FACTOR: f32 = 0.6;

/// Bezier circle constant.
const KAPPA: f32 = 0.552_284_75;

/// Decoded image assets keyed by source string. Preloaded once per render so
/// page building never touches the network.
#[derive(Debug, Clone, Default)]
pub struct ImageStore {
    assets: BTreeMap<String, ImageAsset>,
}

impl ImageStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolves every image source the template references, including an
    /// image background. Sources that fail to resolve are simply absent;
    /// their elements will be skipped at draw time.
    pub fn preload(template: &Template, fetcher: &dyn AssetFetcher) -> Self {
        let mut store = Self::new();
        if let Background::Image { source } = &template.background {
            store.load(source, false, fetcher);
        }
        for image in template.image_elements() {
            store.load(&image.source, image.grayscale, fetcher);
        }
        store
    }

    fn load(&mut self, source: &str, grayscale: bool, fetcher: &dyn AssetFetcher) {
        if self.assets.contains_key(source) {
            return;
        }
        if let Some(asset) = crate::assets::load_image(source, grayscale, fetcher) {
            self.assets.insert(source.to_string(), asset);
        }
    }

    pub fn get(&self, source: &str) -> Option<&ImageAsset> {
        self.assets.get(source)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &ImageAsset)> {
        self.assets.iter()
    }
}

/// Per-field resolved drawing parameters after the position lookup has been
/// applied, still in top-down authoring space.
struct ResolvedText {
    x: f32,
    y: f32,
    font_name: &'static str,
    font_size: f32,
    align: Align,
    max_width: Option<f32>,
}

fn resolve_text_placement(element: &TextElement, lookup: &PositionLookup<'_>) -> ResolvedText {
    let authored = ResolvedText {
        x: element.x,
        y: element.y,
        font_name: element.font_name(),
        font_size: element.font_size,
        align: element.align,
        max_width: element.max_width,
    };
    match lookup {
        PositionLookup::Authored => authored,
        PositionLookup::Offset(dy) => ResolvedText {
            y: element.y + dy,
            ..authored
        },
        PositionLookup::Table(table) => match table.field(&element.id) {
            Some(placement) => ResolvedText {
                x: placement.x,
                y: placement.y,
                font_name: placement
                    .font_family
                    .as_deref()
                    .map(|family| crate::template::font_name_for(family, element.font_weight))
                    .unwrap_or_else(|| element.font_name()),
                font_size: placement.font_size.unwrap_or(element.font_size),
                align: placement.align.unwrap_or(element.align),
                max_width: placement.max_width.or(element.max_width),
            },
            // Fields the table does not mention keep their authored place.
            None => authored,
        },
    }
}

fn shifted_xy(x: f32, y: f32, id: &str, lookup: &PositionLookup<'_>) -> (f32, f32) {
    match lookup {
        PositionLookup::Authored => (x, y),
        PositionLookup::Offset(dy) => (x, y + dy),
        PositionLookup::Table(table) => match table.field(id) {
            Some(FieldPlacement { x: tx, y: ty, .. }) => (*tx, *ty),
            None => (x, y),
        },
    }
}

/// Truncates to what fits in `max_width`, appending an ellipsis. Character
/// counting, not shaping; consistent with the alignment estimate.
fn fit_text(text: &str, font_size: f32, max_width: Option<f32>) -> String {
    let Some(max_width) = max_width else {
        return text.to_string();
    };
    if max_width <= 0.0 || font_size <= 0.0 {
        return text.to_string();
    }
    let max_chars = (max_width / (font_size * CHAR_WIDTH_FACTOR)).floor() as usize;
    let count = text.chars().count();
    if count <= max_chars {
        return text.to_string();
    }
    let mut out: String = text.chars().take(max_chars).collect();
    out.push('…');
    out
}

fn aligned_x(x: f32, text: &str, font_size: f32, align: Align) -> f32 {
    let width = text.chars().count() as f32 * font_size * CHAR_WIDTH_FACTOR;
    match align {
        Align::Left => x,
        Align::Center => x - width / 2.0,
        Align::Right => x - width,
    }
}

/// Draws one record at one tiling position. The canvas page is shared with
/// the other instances on it; each call leaves graphics state balanced.
pub fn draw_instance(
    canvas: &mut Canvas,
    template: &Template,
    record: &Record,
    transforms: &Transforms,
    lookup: &PositionLookup<'_>,
    images: &ImageStore,
) -> Result<(), CertPressError> {
    let page_h = canvas.page_size().height;
    canvas.save_state();

    for shape in template.shape_elements() {
        draw_shape(canvas, shape, lookup, page_h);
    }
    for image in template.image_elements() {
        draw_image_element(canvas, image, lookup, images, page_h);
    }
    for text in template.text_elements() {
        let placement = resolve_text_placement(text, lookup);
        let resolved = vars::resolve(&text.content, record, transforms);
        let fitted = fit_text(&resolved, placement.font_size, placement.max_width);
        if fitted.is_empty() {
            continue;
        }
        canvas.set_font_name(placement.font_name);
        canvas.set_font_size(Pt::from_f32(placement.font_size));
        canvas.set_fill_color(Color::from_hex(&text.color));
        let x = aligned_x(placement.x, &fitted, placement.font_size, placement.align);
        let y = geom::text_baseline_y(page_h, Pt::from_f32(placement.y));
        canvas.draw_string(Pt::from_f32(x), y, fitted);
    }
    for element in template.checkbox_elements() {
        draw_checkbox(canvas, template, element, record, lookup, page_h);
    }

    canvas.restore_state();
    Ok(())
}

fn draw_shape(
    canvas: &mut Canvas,
    shape: &ShapeElement,
    lookup: &PositionLookup<'_>,
    page_h: Pt,
) {
    let fill = shape.fill.as_deref().map(Color::from_hex);
    let border = shape.border_color.as_deref().map(Color::from_hex);
    if fill.is_none() && border.is_none() {
        return;
    }
    if let Some(color) = fill {
        canvas.set_fill_color(color);
    }
    if let Some(color) = border {
        canvas.set_stroke_color(color);
        canvas.set_line_width(Pt::from_f32(shape.border_width));
    }

    match &shape.geometry {
        ShapeGeometry::Rect {
            x,
            y,
            width,
            height,
        } => {
            let (x, y) = shifted_xy(*x, *y, &shape.id, lookup);
            let bottom = geom::box_bottom_y(page_h, Pt::from_f32(y), Pt::from_f32(*height));
            canvas.rect_path(
                Pt::from_f32(x),
                bottom,
                Pt::from_f32(*width),
                Pt::from_f32(*height),
            );
        }
        ShapeGeometry::Line { x1, y1, x2, y2 } => {
            // The whole segment shifts rigidly; a table entry repositions its
            // first endpoint and the second follows by the same delta.
            let (sx, sy) = shifted_xy(*x1, *y1, &shape.id, lookup);
            let (dx, dy) = (sx - x1, sy - y1);
            canvas.move_to(Pt::from_f32(sx), geom::text_baseline_y(page_h, Pt::from_f32(sy)));
            canvas.line_to(
                Pt::from_f32(*x2 + dx),
                geom::text_baseline_y(page_h, Pt::from_f32(*y2 + dy)),
            );
        }
        ShapeGeometry::Circle { cx, cy, radius } => {
            let (cx, cy) = shifted_xy(*cx, *cy, &shape.id, lookup);
            circle_path(
                canvas,
                Pt::from_f32(cx),
                geom::text_baseline_y(page_h, Pt::from_f32(cy)),
                Pt::from_f32(*radius),
            );
        }
    }

    match (fill, border) {
        (Some(_), Some(_)) => canvas.fill_stroke(),
        (Some(_), None) => canvas.fill(),
        (None, Some(_)) => canvas.stroke(),
        (None, None) => {}
    }
}

fn circle_path(canvas: &mut Canvas, cx: Pt, cy: Pt, r: Pt) {
    let k = r * KAPPA;
    canvas.move_to(cx + r, cy);
    canvas.curve_to(cx + r, cy + k, cx + k, cy + r, cx, cy + r);
    canvas.curve_to(cx - k, cy + r, cx - r, cy + k, cx - r, cy);
    canvas.curve_to(cx - r, cy - k, cx - k, cy - r, cx, cy - r);
    canvas.curve_to(cx + k, cy - r, cx + r, cy - k, cx + r, cy);
    canvas.close_path();
}

fn draw_image_element(
    canvas: &mut Canvas,
    image: &ImageElement,
    lookup: &PositionLookup<'_>,
    images: &ImageStore,
    page_h: Pt,
) {
    // Unresolvable assets were already warned about at preload.
    if images.get(&image.source).is_none() {
        return;
    }
    let (x, y) = shifted_xy(image.x, image.y, &image.id, lookup);
    let bottom = geom::box_bottom_y(page_h, Pt::from_f32(y), Pt::from_f32(image.height));
    canvas.draw_image(
        Pt::from_f32(x),
        bottom,
        Pt::from_f32(image.width),
        Pt::from_f32(image.height),
        &image.source,
    );
}

fn draw_checkbox(
    canvas: &mut Canvas,
    template: &Template,
    element: &CheckboxElement,
    record: &Record,
    lookup: &PositionLookup<'_>,
    page_h: Pt,
) {
    let selected = checkbox::resolve(element, record).map(|option| option.label.clone());
    let box_size = element.box_size;

    for option in &element.options {
        let marked = selected.as_deref() == Some(option.label.as_str());
        let override_xy = option_override(element, option.label.as_str(), lookup);

        // An option bound to a declared shape owns no geometry of its own:
        // the shape pass already drew the box, so only the mark lands here.
        if let Some((shape_id, bx, by, bw, bh)) = bound_shape(template, element, option) {
            if !marked {
                continue;
            }
            let (x, y) = match override_xy {
                Some(xy) => xy,
                None => shifted_xy(bx, by, &shape_id, lookup),
            };
            let bottom = geom::box_bottom_y(page_h, Pt::from_f32(y), Pt::from_f32(bh));
            draw_mark(
                canvas,
                Pt::from_f32(x),
                bottom,
                Pt::from_f32(bw),
                Pt::from_f32(bh),
            );
            continue;
        }

        let (x, y) = match override_xy {
            Some(xy) => xy,
            None => match lookup {
                PositionLookup::Offset(dy) => (option.x, option.y + dy),
                _ => (option.x, option.y),
            },
        };
        let bottom = geom::box_bottom_y(page_h, Pt::from_f32(y), Pt::from_f32(box_size));

        canvas.set_stroke_color(Color::BLACK);
        canvas.set_line_width(Pt::from_f32(1.0));
        canvas.rect_path(
            Pt::from_f32(x),
            bottom,
            Pt::from_f32(box_size),
            Pt::from_f32(box_size),
        );
        canvas.stroke();

        // Option label sits beside the box regardless of stack orientation.
        let label_size = (box_size * 0.75).max(6.0);
        canvas.set_font_name("Helvetica");
        canvas.set_font_size(Pt::from_f32(label_size));
        canvas.set_fill_color(Color::BLACK);
        canvas.draw_string(
            Pt::from_f32(x + box_size + 4.0),
            bottom + Pt::from_f32(box_size * 0.2),
            option.label.clone(),
        );

        if marked {
            draw_mark(
                canvas,
                Pt::from_f32(x),
                bottom,
                Pt::from_f32(box_size),
                Pt::from_f32(box_size),
            );
        }
    }
}

/// The declared shape an option is bound to, as (id, x, y, width, height) in
/// authoring space. Lines carry no markable area and stay unbound.
fn bound_shape(
    template: &Template,
    element: &CheckboxElement,
    option: &crate::template::CheckOption,
) -> Option<(String, f32, f32, f32, f32)> {
    let shape_id = checkbox::shape_id(&element.data_key, &option.label);
    let shape = template.shape_elements().find(|s| s.id == shape_id)?;
    match shape.geometry {
        ShapeGeometry::Rect {
            x,
            y,
            width,
            height,
        } => Some((shape_id, x, y, width, height)),
        ShapeGeometry::Circle { cx, cy, radius } => Some((
            shape_id,
            cx - radius,
            cy - radius,
            radius * 2.0,
            radius * 2.0,
        )),
        ShapeGeometry::Line { .. } => None,
    }
}

fn option_override(
    element: &CheckboxElement,
    label: &str,
    lookup: &PositionLookup<'_>,
) -> Option<(f32, f32)> {
    let PositionLookup::Table(table) = lookup else {
        return None;
    };
    table
        .field(&element.id)
        .and_then(|field| field.options.iter().find(|o| o.label == label))
        .map(|option| (option.x, option.y))
}

/// X-shaped mark inset inside the option box.
fn draw_mark(canvas: &mut Canvas, x: Pt, bottom: Pt, width: Pt, height: Pt) {
    let inset_x = width * 0.2;
    let inset_y = height * 0.2;
    canvas.set_stroke_color(Color::BLACK);
    canvas.set_line_width(width.min(height) * 0.12);
    canvas.move_to(x + inset_x, bottom + inset_y);
    canvas.line_to(x + width - inset_x, bottom + height - inset_y);
    canvas.stroke();
    canvas.move_to(x + inset_x, bottom + height - inset_y);
    canvas.line_to(x + width - inset_x, bottom + inset_y);
    canvas.stroke();
}

/// Combined-mode drawing: the whole instance is mapped into one vertical slot
/// through the plan's proportional ratios, fonts through its scale factor.
pub fn draw_combined_instance(
    canvas: &mut Canvas,
    template: &Template,
    record: &Record,
    transforms: &Transforms,
    plan: &CombinedPlan,
    slot_index: usize,
    images: &ImageStore,
) -> Result<(), CertPressError> {
    let page_h = canvas.page_size().height;
    canvas.save_state();

    for shape in template.shape_elements() {
        draw_combined_shape(canvas, shape, plan, slot_index, page_h);
    }
    for image in template.image_elements() {
        if images.get(&image.source).is_none() {
            continue;
        }
        let x = plan.map_x(image.x);
        let y = plan.map_y(slot_index, image.y);
        let w = plan.map_len_x(image.width);
        let h = plan.map_len_y(image.height);
        canvas.draw_image(x, geom::box_bottom_y(page_h, y, h), w, h, &image.source);
    }
    for text in template.text_elements() {
        let resolved = vars::resolve(&text.content, record, transforms);
        let font_size = plan.font_size(text.font_size).to_f32();
        let max_width = text.max_width.map(|w| plan.map_len_x(w).to_f32());
        let fitted = fit_text(&resolved, font_size, max_width);
        if fitted.is_empty() {
            continue;
        }
        canvas.set_font_name(text.font_name());
        canvas.set_font_size(Pt::from_f32(font_size));
        canvas.set_fill_color(Color::from_hex(&text.color));
        let anchor_x = plan.map_x(text.x).to_f32();
        let x = aligned_x(anchor_x, &fitted, font_size, text.align);
        let y = geom::text_baseline_y(page_h, plan.map_y(slot_index, text.y));
        canvas.draw_string(Pt::from_f32(x), y, fitted);
    }
    for element in template.checkbox_elements() {
        draw_combined_checkbox(canvas, template, element, record, plan, slot_index, page_h);
    }

    canvas.restore_state();
    Ok(())
}

fn draw_combined_shape(
    canvas: &mut Canvas,
    shape: &ShapeElement,
    plan: &CombinedPlan,
    slot_index: usize,
    page_h: Pt,
) {
    let fill = shape.fill.as_deref().map(Color::from_hex);
    let border = shape.border_color.as_deref().map(Color::from_hex);
    if fill.is_none() && border.is_none() {
        return;
    }
    if let Some(color) = fill {
        canvas.set_fill_color(color);
    }
    if let Some(color) = border {
        canvas.set_stroke_color(color);
        canvas.set_line_width(Pt::from_f32((shape.border_width * plan.scale()).max(0.25)));
    }

    match &shape.geometry {
        ShapeGeometry::Rect {
            x,
            y,
            width,
            height,
        } => {
            let w = plan.map_len_x(*width);
            let h = plan.map_len_y(*height);
            let mapped_y = plan.map_y(slot_index, *y);
            canvas.rect_path(plan.map_x(*x), geom::box_bottom_y(page_h, mapped_y, h), w, h);
        }
        ShapeGeometry::Line { x1, y1, x2, y2 } => {
            canvas.move_to(
                plan.map_x(*x1),
                geom::text_baseline_y(page_h, plan.map_y(slot_index, *y1)),
            );
            canvas.line_to(
                plan.map_x(*x2),
                geom::text_baseline_y(page_h, plan.map_y(slot_index, *y2)),
            );
        }
        ShapeGeometry::Circle { cx, cy, radius } => {
            circle_path(
                canvas,
                plan.map_x(*cx),
                geom::text_baseline_y(page_h, plan.map_y(slot_index, *cy)),
                Pt::from_f32(*radius * plan.scale()),
            );
        }
    }

    match (fill, border) {
        (Some(_), Some(_)) => canvas.fill_stroke(),
        (Some(_), None) => canvas.fill(),
        (None, Some(_)) => canvas.stroke(),
        (None, None) => {}
    }
}

fn draw_combined_checkbox(
    canvas: &mut Canvas,
    template: &Template,
    element: &CheckboxElement,
    record: &Record,
    plan: &CombinedPlan,
    slot_index: usize,
    page_h: Pt,
) {
    let selected = checkbox::resolve(element, record).map(|option| option.label.clone());
    let box_size = (element.box_size * plan.scale()).max(4.0);

    for option in &element.options {
        let marked = selected.as_deref() == Some(option.label.as_str());

        // Shape-bound options: the shape pass drew the box at its mapped
        // place, so only the mark is added here.
        if let Some((_, bx, by, bw, bh)) = bound_shape(template, element, option) {
            if !marked {
                continue;
            }
            let x = plan.map_x(bx);
            let y = plan.map_y(slot_index, by);
            let w = plan.map_len_x(bw);
            let h = plan.map_len_y(bh);
            draw_mark(canvas, x, geom::box_bottom_y(page_h, y, h), w, h);
            continue;
        }

        let x = plan.map_x(option.x).to_f32();
        let y = plan.map_y(slot_index, option.y);
        let bottom = geom::box_bottom_y(page_h, y, Pt::from_f32(box_size));

        canvas.set_stroke_color(Color::BLACK);
        canvas.set_line_width(Pt::from_f32((plan.scale()).max(0.25)));
        canvas.rect_path(
            Pt::from_f32(x),
            bottom,
            Pt::from_f32(box_size),
            Pt::from_f32(box_size),
        );
        canvas.stroke();

        let label_size = (box_size * 0.75).max(4.0);
        canvas.set_font_name("Helvetica");
        canvas.set_font_size(Pt::from_f32(label_size));
        canvas.set_fill_color(Color::BLACK);
        canvas.draw_string(
            Pt::from_f32(x + box_size + 3.0),
            bottom + Pt::from_f32(box_size * 0.2),
            option.label.clone(),
        );

        if marked {
            draw_mark(
                canvas,
                Pt::from_f32(x),
                bottom,
                Pt::from_f32(box_size),
                Pt::from_f32(box_size),
            );
        }
    }
}
