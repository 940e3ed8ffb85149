//! certpress renders position-based certificate templates into PDF bytes.
//!
//! A template describes a single certificate in top-down authoring
//! coordinates; a record supplies the per-student values that `{{key}}`
//! tokens substitute. The engine tiles one to three instances per physical
//! page using per-family coordinate data, or packs an entire batch onto a
//! fixed number of pages in combined mode. Output is deterministic: the same
//! template and records always produce the same bytes.

mod assemble;
mod assets;
mod canvas;
mod checkbox;
mod error;
mod geom;
mod pdf;
mod positions;
mod render;
mod scale;
mod template;
mod tiling;
mod types;
mod vars;

pub use assemble::{certificate_filename, combined_filename};
pub use assets::{AssetFetcher, HttpFetcher, ImageAsset};
pub use canvas::{Canvas, Command, Document, Page};
pub use error::CertPressError;
pub use geom::{authored_y, box_bottom_y, text_baseline_y};
pub use positions::{
    FamilyLayout, FieldPlacement, OptionPlacement, PositionLookup, PositionRegistry, PositionTable,
};
pub use render::ImageStore;
pub use scale::CombinedPlan;
pub use template::{
    Align, Background, CheckOption, CheckboxElement, CheckboxOrientation, Element, FontWeight,
    ImageElement, Orientation, PageGeometry, ShapeElement, ShapeGeometry, Template, TemplateStore,
    TextElement, VariableSpec,
};
pub use tiling::{Slot, TilingPlan};
pub use types::{Color, Pt, Size};
pub use vars::{Record, TransformFn, Transforms, full_name_upper, long_date, number_text};

/// Rendering engine handle: templates, position data, transforms and the
/// asset fetcher, wired once and reused across renders.
pub struct CertPress {
    templates: TemplateStore,
    registry: PositionRegistry,
    transforms: Transforms,
    fetcher: Box<dyn AssetFetcher>,
}

impl CertPress {
    /// Engine with the shipped families, the standard date transform and a
    /// live HTTP fetcher.
    pub fn new() -> Self {
        Self::builder().build()
    }

    pub fn builder() -> CertPressBuilder {
        CertPressBuilder::default()
    }

    pub fn templates(&self) -> &TemplateStore {
        &self.templates
    }

    pub fn templates_mut(&mut self) -> &mut TemplateStore {
        &mut self.templates
    }

    pub fn registry(&self) -> &PositionRegistry {
        &self.registry
    }

    /// One certificate for one record.
    pub fn render(&self, template: &Template, record: &Record) -> Result<Vec<u8>, CertPressError> {
        self.render_batch(template, std::slice::from_ref(record))
    }

    /// One certificate per record, tiled per the template.
    pub fn render_batch(
        &self,
        template: &Template,
        records: &[Record],
    ) -> Result<Vec<u8>, CertPressError> {
        assemble::render_batch(
            template,
            records,
            &self.transforms,
            &self.registry,
            self.fetcher.as_ref(),
        )
    }

    /// The whole batch packed onto `target_pages` pages.
    pub fn render_combined(
        &self,
        template: &Template,
        records: &[Record],
        target_pages: usize,
    ) -> Result<Vec<u8>, CertPressError> {
        assemble::render_combined(
            template,
            records,
            &self.transforms,
            target_pages,
            self.fetcher.as_ref(),
        )
    }

    /// Renders against the family's default template, falling back to the
    /// hardcoded layout when the family has none.
    pub fn render_default(
        &self,
        class_type: &str,
        records: &[Record],
    ) -> Result<Vec<u8>, CertPressError> {
        let template = self.templates.default_for(class_type);
        self.render_batch(&template, records)
    }
}

impl Default for CertPress {
    fn default() -> Self {
        Self::new()
    }
}

pub struct CertPressBuilder {
    templates: TemplateStore,
    registry: PositionRegistry,
    transforms: Transforms,
    fetcher: Box<dyn AssetFetcher>,
}

impl Default for CertPressBuilder {
    fn default() -> Self {
        let mut transforms = Transforms::new();
        transforms.bind("completionDate", vars::long_date());
        Self {
            templates: TemplateStore::new(),
            registry: PositionRegistry::builtin(),
            transforms,
            fetcher: Box::new(HttpFetcher::new()),
        }
    }
}

impl CertPressBuilder {
    pub fn templates(mut self, templates: TemplateStore) -> Self {
        self.templates = templates;
        self
    }

    pub fn registry(mut self, registry: PositionRegistry) -> Self {
        self.registry = registry;
        self
    }

    pub fn transforms(mut self, transforms: Transforms) -> Self {
        self.transforms = transforms;
        self
    }

    /// Binds one transform on top of the defaults.
    pub fn transform(mut self, key: impl Into<String>, transform: vars::TransformFn) -> Self {
        self.transforms.bind(key, transform);
        self
    }

    pub fn fetcher(mut self, fetcher: impl AssetFetcher + 'static) -> Self {
        self.fetcher = Box::new(fetcher);
        self
    }

    pub fn build(self) -> CertPress {
        CertPress {
            templates: self.templates,
            registry: self.registry,
            transforms: self.transforms,
            fetcher: self.fetcher,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assets::testing::{StubFetcher, tiny_png};
    use serde_json::json;

    fn engine() -> CertPress {
        CertPress::builder().fetcher(StubFetcher::default()).build()
    }

    fn john_doe() -> Record {
        Record::from_value(json!({
            "studentName": "JOHN DOE",
            "completionDate": "2024-01-05",
            "licenseNumber": "D1234-56789",
        }))
    }

    #[test]
    fn end_to_end_single_certificate() {
        let engine = engine();
        let template = Template::default_for("adult-6hr");
        let bytes = engine.render(&template, &john_doe()).unwrap();
        assert!(bytes.starts_with(b"%PDF-1.7"));
        assert!(bytes.ends_with(b"%%EOF"));
        let text = String::from_utf8_lossy(&bytes);
        assert!(text.contains("(JOHN DOE) Tj"));
        // The default transform turned the ISO date into its long form.
        assert!(text.contains("(Completed on Jan 5, 2024) Tj"));
        assert!(!text.contains("{{"));
    }

    #[test]
    fn name_transform_draws_at_flipped_baseline() {
        let engine = CertPress::builder()
            .fetcher(StubFetcher::default())
            .transform("studentName", vars::full_name_upper())
            .build();
        let raw = r#"{
            "classType": "adult-6hr",
            "page": {"width": 600, "height": 600},
            "elements": [
                {"kind": "text", "id": "name", "content": "{{studentName}}",
                 "x": 100, "y": 100, "fontSize": 18}
            ]
        }"#;
        let template = Template::from_json(raw).unwrap();
        let record = Record::from_value(json!({"first": "john", "last": "doe"}));
        let bytes = engine.render(&template, &record).unwrap();
        let text = String::from_utf8_lossy(&bytes);
        // Authored y 100 on a 600pt page lands at baseline 500.
        assert!(text.contains("100 500 Td"));
        assert!(text.contains("(JOHN DOE) Tj"));
    }

    #[test]
    fn rendering_is_idempotent() {
        let engine = engine();
        let template = Template::default_for("teen-8hr");
        let records = vec![john_doe(), john_doe(), john_doe()];
        let a = engine.render_batch(&template, &records).unwrap();
        let b = engine.render_batch(&template, &records).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn tiling_respects_family_offsets() {
        let engine = engine();
        let mut template = Template::default_for("adult-6hr");
        template.instances_per_page = 3;
        let records = vec![john_doe(), john_doe(), john_doe()];
        let bytes = engine.render_batch(&template, &records).unwrap();
        let text = String::from_utf8_lossy(&bytes);
        // Three instances on a single page.
        assert!(text.contains("/Count 1"));
        assert_eq!(text.matches("(JOHN DOE) Tj").count(), 3);
    }

    #[test]
    fn remote_image_element_embeds_through_the_fetcher() {
        let mut fetcher = StubFetcher::default();
        fetcher
            .responses
            .insert("https://assets.test/seal.png".to_string(), tiny_png());
        let engine = CertPress::builder().fetcher(fetcher).build();
        let mut template = Template::default_for("adult-6hr");
        template.elements.push(Element::Image(template::ImageElement {
            id: "seal".to_string(),
            source: "https://assets.test/seal.png".to_string(),
            x: 40.0,
            y: 40.0,
            width: 80.0,
            height: 80.0,
            grayscale: false,
        }));
        let bytes = engine.render(&template, &john_doe()).unwrap();
        let text = String::from_utf8_lossy(&bytes);
        assert!(text.contains("/Subtype /Image"));
        assert!(text.contains("/Im1 Do"));
    }

    #[test]
    fn unresolvable_image_skips_but_renders_the_rest() {
        let engine = engine();
        let mut template = Template::default_for("adult-6hr");
        template.elements.push(Element::Image(template::ImageElement {
            id: "seal".to_string(),
            source: "https://assets.test/gone.png".to_string(),
            x: 40.0,
            y: 40.0,
            width: 80.0,
            height: 80.0,
            grayscale: false,
        }));
        let bytes = engine.render(&template, &john_doe()).unwrap();
        let text = String::from_utf8_lossy(&bytes);
        assert!(!text.contains("/Subtype /Image"));
        assert!(text.contains("(JOHN DOE) Tj"));
    }

    #[test]
    fn default_template_fallback_renders_unknown_family() {
        let engine = engine();
        let bytes = engine
            .render_default("brand-new-family", &[john_doe()])
            .unwrap();
        assert!(bytes.starts_with(b"%PDF-1.7"));
    }

    #[test]
    fn combined_mode_end_to_end() {
        let engine = engine();
        let template = Template::default_for("adult-6hr");
        let records: Vec<Record> = (0..9).map(|_| john_doe()).collect();
        let bytes = engine.render_combined(&template, &records, 3).unwrap();
        let text = String::from_utf8_lossy(&bytes);
        assert!(text.contains("/Count 3"));
        assert_eq!(text.matches("(JOHN DOE) Tj").count(), 9);
    }
}
