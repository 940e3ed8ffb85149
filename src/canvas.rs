use crate::assets::ImageAsset;
use crate::types::{Color, Pt, Size};
use std::collections::BTreeMap;

/// Page-description commands. All coordinates are bottom-up page space; the
/// coordinate translation from authoring space happens before recording.
#[derive(Debug, Clone)]
pub enum Command {
    SaveState,
    RestoreState,
    SetFillColor(Color),
    SetStrokeColor(Color),
    SetLineWidth(Pt),
    SetFontName(String),
    SetFontSize(Pt),
    MoveTo {
        x: Pt,
        y: Pt,
    },
    LineTo {
        x: Pt,
        y: Pt,
    },
    CurveTo {
        x1: Pt,
        y1: Pt,
        x2: Pt,
        y2: Pt,
        x: Pt,
        y: Pt,
    },
    ClosePath,
    // Appends a rectangle to the current path; painted by Fill/Stroke/FillStroke.
    RectPath {
        x: Pt,
        y: Pt,
        width: Pt,
        height: Pt,
    },
    Fill,
    Stroke,
    FillStroke,
    // Baseline-anchored text in the current font.
    DrawString {
        x: Pt,
        y: Pt,
        text: String,
    },
    DrawImage {
        x: Pt,
        y: Pt,
        width: Pt,
        height: Pt,
        resource_id: String,
    },
}

#[derive(Debug, Clone)]
pub struct Page {
    pub commands: Vec<Command>,
}

impl Page {
    fn new() -> Self {
        Self {
            commands: Vec::new(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Document {
    pub page_size: Size,
    pub pages: Vec<Page>,
    pub images: BTreeMap<String, ImageAsset>,
}

#[derive(Debug, Clone)]
struct GraphicsState {
    fill_color: Color,
    stroke_color: Color,
    line_width: Pt,
    font_size: Pt,
    font_name: String,
}

impl GraphicsState {
    fn initial() -> Self {
        Self {
            fill_color: Color::BLACK,
            stroke_color: Color::BLACK,
            line_width: Pt::from_f32(1.0),
            font_size: Pt::from_f32(12.0),
            font_name: "Helvetica".to_string(),
        }
    }
}

pub struct Canvas {
    page_size: Size,
    pages: Vec<Page>,
    current: Page,
    state_stack: Vec<GraphicsState>,
    current_state: GraphicsState,
    images: BTreeMap<String, ImageAsset>,
}

impl Canvas {
    pub fn new(page_size: Size) -> Self {
        Self {
            page_size,
            pages: Vec::new(),
            current: Page::new(),
            state_stack: Vec::new(),
            current_state: GraphicsState::initial(),
            images: BTreeMap::new(),
        }
    }

    pub fn page_size(&self) -> Size {
        self.page_size
    }

    pub fn save_state(&mut self) {
        self.state_stack.push(self.current_state.clone());
        self.current.commands.push(Command::SaveState);
    }

    pub fn restore_state(&mut self) {
        if let Some(state) = self.state_stack.pop() {
            self.current_state = state;
            self.current.commands.push(Command::RestoreState);
        }
    }

    pub fn set_fill_color(&mut self, color: Color) {
        if self.current_state.fill_color == color {
            return;
        }
        self.current_state.fill_color = color;
        self.current.commands.push(Command::SetFillColor(color));
    }

    pub fn set_stroke_color(&mut self, color: Color) {
        if self.current_state.stroke_color == color {
            return;
        }
        self.current_state.stroke_color = color;
        self.current.commands.push(Command::SetStrokeColor(color));
    }

    pub fn set_line_width(&mut self, width: Pt) {
        let width = if width < Pt::ZERO { Pt::ZERO } else { width };
        if self.current_state.line_width == width {
            return;
        }
        self.current_state.line_width = width;
        self.current.commands.push(Command::SetLineWidth(width));
    }

    pub fn set_font_name(&mut self, name: &str) {
        if self.current_state.font_name == name {
            return;
        }
        self.current_state.font_name = name.to_string();
        self.current
            .commands
            .push(Command::SetFontName(self.current_state.font_name.clone()));
    }

    pub fn set_font_size(&mut self, size: Pt) {
        if self.current_state.font_size == size {
            return;
        }
        self.current_state.font_size = size;
        self.current.commands.push(Command::SetFontSize(size));
    }

    pub fn move_to(&mut self, x: Pt, y: Pt) {
        self.current.commands.push(Command::MoveTo { x, y });
    }

    pub fn line_to(&mut self, x: Pt, y: Pt) {
        self.current.commands.push(Command::LineTo { x, y });
    }

    pub fn curve_to(&mut self, x1: Pt, y1: Pt, x2: Pt, y2: Pt, x: Pt, y: Pt) {
        self.current.commands.push(Command::CurveTo {
            x1,
            y1,
            x2,
            y2,
            x,
            y,
        });
    }

    pub fn close_path(&mut self) {
        self.current.commands.push(Command::ClosePath);
    }

    pub fn rect_path(&mut self, x: Pt, y: Pt, width: Pt, height: Pt) {
        self.current.commands.push(Command::RectPath {
            x,
            y,
            width,
            height,
        });
    }

    pub fn fill(&mut self) {
        self.current.commands.push(Command::Fill);
    }

    pub fn stroke(&mut self) {
        self.current.commands.push(Command::Stroke);
    }

    pub fn fill_stroke(&mut self) {
        self.current.commands.push(Command::FillStroke);
    }

    pub fn draw_string(&mut self, x: Pt, y: Pt, text: impl Into<String>) {
        self.current.commands.push(Command::DrawString {
            x,
            y,
            text: text.into(),
        });
    }

    pub fn draw_image(
        &mut self,
        x: Pt,
        y: Pt,
        width: Pt,
        height: Pt,
        resource_id: impl Into<String>,
    ) {
        self.current.commands.push(Command::DrawImage {
            x,
            y,
            width,
            height,
            resource_id: resource_id.into(),
        });
    }

    /// Registers decoded image bytes for a resource id referenced by
    /// `draw_image`. Re-registering the same id keeps the first asset.
    pub fn register_image(&mut self, resource_id: impl Into<String>, asset: ImageAsset) {
        self.images.entry(resource_id.into()).or_insert(asset);
    }

    pub fn show_page(&mut self) {
        let current = std::mem::replace(&mut self.current, Page::new());
        self.pages.push(current);
        self.state_stack.clear();
        self.current_state = GraphicsState::initial();
    }

    pub fn finish(mut self) -> Document {
        if !self.current.commands.is_empty() || self.pages.is_empty() {
            self.show_page();
        }
        Document {
            page_size: self.page_size,
            pages: self.pages,
            images: self.images,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn redundant_state_changes_are_elided() {
        let mut canvas = Canvas::new(Size::letter());
        canvas.set_fill_color(Color::BLACK); // already the initial state
        canvas.set_fill_color(Color::rgb(1.0, 0.0, 0.0));
        canvas.set_fill_color(Color::rgb(1.0, 0.0, 0.0));
        let doc = canvas.finish();
        let sets = doc.pages[0]
            .commands
            .iter()
            .filter(|c| matches!(c, Command::SetFillColor(_)))
            .count();
        assert_eq!(sets, 1);
    }

    #[test]
    fn state_restores_across_save_restore() {
        let mut canvas = Canvas::new(Size::letter());
        canvas.save_state();
        canvas.set_font_size(Pt::from_f32(30.0));
        canvas.restore_state();
        // Back at the default size, so setting 30 again must be recorded.
        canvas.set_font_size(Pt::from_f32(30.0));
        let doc = canvas.finish();
        let sizes = doc.pages[0]
            .commands
            .iter()
            .filter(|c| matches!(c, Command::SetFontSize(_)))
            .count();
        assert_eq!(sizes, 2);
    }

    #[test]
    fn finish_always_yields_at_least_one_page() {
        let doc = Canvas::new(Size::letter()).finish();
        assert_eq!(doc.pages.len(), 1);
    }
}
