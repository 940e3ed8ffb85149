use crate::error::CertPressError;
use crate::types::Size;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Orientation {
    #[default]
    Portrait,
    Landscape,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageGeometry {
    pub width: f32,
    pub height: f32,
    #[serde(default)]
    pub orientation: Orientation,
}

impl PageGeometry {
    /// Effective page size. Orientation is authoritative: a landscape page
    /// authored with portrait dimensions is rotated, and vice versa.
    pub fn size(&self) -> Size {
        let size = Size::new(self.width, self.height);
        match self.orientation {
            Orientation::Landscape if !size.is_landscape() => size.rotated(),
            Orientation::Portrait if size.is_landscape() => size.rotated(),
            _ => size,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Background {
    #[default]
    None,
    Color {
        value: String,
    },
    Image {
        source: String,
    },
    Pdf {
        source: String,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Align {
    #[default]
    Left,
    Center,
    Right,
}

fn default_font_family() -> String {
    "serif".to_string()
}

fn default_font_size() -> f32 {
    12.0
}

fn default_color() -> String {
    "#000000".to_string()
}

fn default_border_width() -> f32 {
    1.0
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TextElement {
    pub id: String,
    pub content: String,
    pub x: f32,
    pub y: f32,
    #[serde(default = "default_font_family")]
    pub font_family: String,
    #[serde(default = "default_font_size")]
    pub font_size: f32,
    #[serde(default)]
    pub font_weight: FontWeight,
    #[serde(default = "default_color")]
    pub color: String,
    #[serde(default)]
    pub align: Align,
    #[serde(default)]
    pub max_width: Option<f32>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FontWeight {
    #[default]
    Normal,
    Bold,
    Italic,
    BoldItalic,
}

impl TextElement {
    pub fn font_name(&self) -> &'static str {
        font_name_for(&self.font_family, self.font_weight)
    }
}

/// Maps an authored family/weight onto the fixed base-14 set: a serif family
/// with roman/bold/italic faces and a sans-serif family.
pub fn font_name_for(family: &str, weight: FontWeight) -> &'static str {
    let serif = {
        let f = family.to_ascii_lowercase();
        f.contains("serif") && !f.contains("sans") || f.contains("times")
    };
    match (serif, weight) {
        (true, FontWeight::Normal) => "Times-Roman",
        (true, FontWeight::Bold) => "Times-Bold",
        (true, FontWeight::Italic) => "Times-Italic",
        (true, FontWeight::BoldItalic) => "Times-BoldItalic",
        (false, FontWeight::Bold | FontWeight::BoldItalic) => "Helvetica-Bold",
        (false, FontWeight::Italic) => "Helvetica-Oblique",
        (false, FontWeight::Normal) => "Helvetica",
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageElement {
    pub id: String,
    pub source: String,
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    #[serde(default)]
    pub grayscale: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "shape", rename_all = "lowercase")]
pub enum ShapeGeometry {
    Rect {
        x: f32,
        y: f32,
        width: f32,
        height: f32,
    },
    Line {
        x1: f32,
        y1: f32,
        x2: f32,
        y2: f32,
    },
    Circle {
        cx: f32,
        cy: f32,
        radius: f32,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShapeElement {
    pub id: String,
    #[serde(flatten)]
    pub geometry: ShapeGeometry,
    #[serde(default)]
    pub fill: Option<String>,
    #[serde(default)]
    pub border_color: Option<String>,
    #[serde(default = "default_border_width")]
    pub border_width: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CheckboxOrientation {
    Horizontal,
    #[default]
    Vertical,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckOption {
    pub label: String,
    pub x: f32,
    pub y: f32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckboxElement {
    pub id: String,
    pub title: String,
    pub data_key: String,
    pub options: Vec<CheckOption>,
    #[serde(default)]
    pub orientation: CheckboxOrientation,
    #[serde(default = "default_font_size")]
    pub box_size: f32,
}

/// Closed element union. Unknown `kind` tags are a deserialization error, so
/// malformed templates fail at load time instead of dropping content.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Element {
    Text(TextElement),
    Image(ImageElement),
    Shape(ShapeElement),
    Checkbox(CheckboxElement),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VariableSpec {
    pub key: String,
    pub label: String,
    #[serde(default)]
    pub example: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Template {
    pub class_type: String,
    pub page: PageGeometry,
    #[serde(default = "default_instances")]
    pub instances_per_page: u32,
    #[serde(default)]
    pub background: Background,
    #[serde(default)]
    pub elements: Vec<Element>,
    #[serde(default)]
    pub available_variables: Vec<VariableSpec>,
    #[serde(default)]
    pub is_default: bool,
    #[serde(default = "default_true")]
    pub is_active: bool,
}

fn default_instances() -> u32 {
    1
}

impl Template {
    pub fn from_json(raw: &str) -> Result<Template, CertPressError> {
        let template: Template = serde_json::from_str(raw)
            .map_err(|err| CertPressError::InvalidTemplate(err.to_string()))?;
        template.validate()?;
        Ok(template)
    }

    pub fn page_size(&self) -> Size {
        self.page.size()
    }

    /// Structural validation. Geometry is load-bearing for every element, so
    /// these are the only failures that abort a render.
    pub fn validate(&self) -> Result<(), CertPressError> {
        if !(self.page.width > 0.0 && self.page.height > 0.0)
            || !self.page.width.is_finite()
            || !self.page.height.is_finite()
        {
            return Err(CertPressError::MissingPageGeometry);
        }
        if !(1..=3).contains(&self.instances_per_page) {
            return Err(CertPressError::InvalidInstancesPerPage(
                self.instances_per_page,
            ));
        }
        let mut seen = std::collections::BTreeSet::new();
        for element in &self.elements {
            let id = match element {
                Element::Text(e) => &e.id,
                Element::Image(e) => &e.id,
                Element::Shape(e) => &e.id,
                Element::Checkbox(e) => &e.id,
            };
            if !seen.insert(id.clone()) {
                return Err(CertPressError::InvalidTemplate(format!(
                    "duplicate element id '{}'",
                    id
                )));
            }
            if let Element::Checkbox(checkbox) = element {
                let mut labels = std::collections::BTreeSet::new();
                for option in &checkbox.options {
                    if !labels.insert(option.label.as_str()) {
                        return Err(CertPressError::InvalidTemplate(format!(
                            "checkbox '{}' repeats option label '{}'",
                            checkbox.id, option.label
                        )));
                    }
                }
            }
        }
        Ok(())
    }

    pub fn text_elements(&self) -> impl Iterator<Item = &TextElement> {
        self.elements.iter().filter_map(|e| match e {
            Element::Text(t) => Some(t),
            _ => None,
        })
    }

    pub fn image_elements(&self) -> impl Iterator<Item = &ImageElement> {
        self.elements.iter().filter_map(|e| match e {
            Element::Image(i) => Some(i),
            _ => None,
        })
    }

    pub fn shape_elements(&self) -> impl Iterator<Item = &ShapeElement> {
        self.elements.iter().filter_map(|e| match e {
            Element::Shape(s) => Some(s),
            _ => None,
        })
    }

    pub fn checkbox_elements(&self) -> impl Iterator<Item = &CheckboxElement> {
        self.elements.iter().filter_map(|e| match e {
            Element::Checkbox(c) => Some(c),
            _ => None,
        })
    }

    /// Read-only substitution catalog for editor tooling.
    pub fn variable_catalog(&self) -> &[VariableSpec] {
        &self.available_variables
    }

    /// Hardcoded fallback layout for a document family, substitutable when no
    /// persisted template exists for it.
    pub fn default_for(class_type: &str) -> Template {
        Template {
            class_type: class_type.to_string(),
            page: PageGeometry {
                width: 612.0,
                height: 792.0,
                orientation: Orientation::Landscape,
            },
            instances_per_page: 1,
            background: Background::None,
            elements: vec![
                Element::Text(TextElement {
                    id: "student-name".to_string(),
                    content: "{{studentName}}".to_string(),
                    x: 396.0,
                    y: 250.0,
                    font_family: "serif".to_string(),
                    font_size: 28.0,
                    font_weight: FontWeight::Bold,
                    color: default_color(),
                    align: Align::Center,
                    max_width: Some(500.0),
                }),
                Element::Text(TextElement {
                    id: "completion-date".to_string(),
                    content: "Completed on {{completionDate}}".to_string(),
                    x: 396.0,
                    y: 310.0,
                    font_family: "serif".to_string(),
                    font_size: 14.0,
                    font_weight: FontWeight::Normal,
                    color: default_color(),
                    align: Align::Center,
                    max_width: None,
                }),
                Element::Text(TextElement {
                    id: "license-number".to_string(),
                    content: "License No. {{licenseNumber}}".to_string(),
                    x: 396.0,
                    y: 340.0,
                    font_family: "serif".to_string(),
                    font_size: 12.0,
                    font_weight: FontWeight::Normal,
                    color: default_color(),
                    align: Align::Center,
                    max_width: None,
                }),
            ],
            available_variables: vec![
                VariableSpec {
                    key: "studentName".to_string(),
                    label: "Student name".to_string(),
                    example: "JOHN DOE".to_string(),
                },
                VariableSpec {
                    key: "completionDate".to_string(),
                    label: "Completion date".to_string(),
                    example: "Jan 5, 2024".to_string(),
                },
                VariableSpec {
                    key: "licenseNumber".to_string(),
                    label: "License number".to_string(),
                    example: "D1234-56789".to_string(),
                },
            ],
            is_default: true,
            is_active: true,
        }
    }
}

/// In-memory template collection modelling the write-side invariant: at most
/// one default template per document family.
#[derive(Debug, Clone, Default)]
pub struct TemplateStore {
    templates: Vec<Template>,
}

impl TemplateStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, template: Template) -> Result<usize, CertPressError> {
        template.validate()?;
        let make_default = template.is_default;
        let class_type = template.class_type.clone();
        self.templates.push(template);
        let index = self.templates.len() - 1;
        if make_default {
            self.set_default(index);
        } else if !self
            .templates
            .iter()
            .any(|t| t.class_type == class_type && t.is_default)
        {
            // First template of a family becomes its default.
            self.templates[index].is_default = true;
        }
        Ok(index)
    }

    /// Marks one template as the family default, clearing the flag on all
    /// same-family siblings.
    pub fn set_default(&mut self, index: usize) {
        let Some(class_type) = self.templates.get(index).map(|t| t.class_type.clone()) else {
            return;
        };
        for (i, template) in self.templates.iter_mut().enumerate() {
            if template.class_type == class_type {
                template.is_default = i == index;
            }
        }
    }

    /// The family default, or the hardcoded fallback when the family has no
    /// persisted template.
    pub fn default_for(&self, class_type: &str) -> Template {
        self.templates
            .iter()
            .find(|t| t.class_type == class_type && t.is_default && t.is_active)
            .cloned()
            .unwrap_or_else(|| Template::default_for(class_type))
    }

    pub fn templates(&self) -> &[Template] {
        &self.templates
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn minimal_json(extra: &str) -> String {
        format!(
            r#"{{"classType":"adult-6hr","page":{{"width":612,"height":792}}{}}}"#,
            extra
        )
    }

    #[test]
    fn loads_minimal_template_with_defaults() {
        let template = Template::from_json(&minimal_json("")).unwrap();
        assert_eq!(template.instances_per_page, 1);
        assert_eq!(template.background, Background::None);
        assert!(template.is_active);
    }

    #[test]
    fn unknown_element_kind_is_rejected_at_load() {
        let raw = minimal_json(
            r#","elements":[{"kind":"video","id":"v1","source":"x"}]"#,
        );
        let err = Template::from_json(&raw).unwrap_err();
        assert!(matches!(err, CertPressError::InvalidTemplate(_)));
    }

    #[test]
    fn instances_per_page_outside_range_is_fatal() {
        let raw = minimal_json(r#","instancesPerPage":4"#);
        let err = Template::from_json(&raw).unwrap_err();
        assert!(matches!(err, CertPressError::InvalidInstancesPerPage(4)));
    }

    #[test]
    fn zero_page_geometry_is_fatal() {
        let raw = r#"{"classType":"x","page":{"width":0,"height":792}}"#;
        let err = Template::from_json(raw).unwrap_err();
        assert!(matches!(err, CertPressError::MissingPageGeometry));
    }

    #[test]
    fn orientation_overrides_authored_dimensions() {
        let page = PageGeometry {
            width: 612.0,
            height: 792.0,
            orientation: Orientation::Landscape,
        };
        assert!(page.size().is_landscape());
        assert_eq!(page.size(), Size::letter().rotated());
    }

    #[test]
    fn duplicate_element_ids_are_rejected() {
        let raw = minimal_json(
            r#","elements":[
                {"kind":"text","id":"a","content":"x","x":0,"y":0},
                {"kind":"text","id":"a","content":"y","x":0,"y":10}
            ]"#,
        );
        assert!(Template::from_json(&raw).is_err());
    }

    #[test]
    fn store_keeps_exactly_one_default_per_family() {
        let mut store = TemplateStore::new();
        let mut a = Template::default_for("adult-6hr");
        a.is_default = false;
        let first = store.insert(a.clone()).unwrap();
        let second = store.insert(a).unwrap();
        store.set_default(second);
        let defaults: Vec<bool> = store.templates().iter().map(|t| t.is_default).collect();
        assert_eq!(defaults, vec![false, true]);
        store.set_default(first);
        let defaults: Vec<bool> = store.templates().iter().map(|t| t.is_default).collect();
        assert_eq!(defaults, vec![true, false]);
    }

    #[test]
    fn missing_family_falls_back_to_hardcoded_default() {
        let store = TemplateStore::new();
        let template = store.default_for("teen-8hr");
        assert_eq!(template.class_type, "teen-8hr");
        assert!(template.validate().is_ok());
        assert!(template.text_elements().count() > 0);
        let keys: Vec<&str> = template
            .variable_catalog()
            .iter()
            .map(|v| v.key.as_str())
            .collect();
        assert_eq!(keys, vec!["studentName", "completionDate", "licenseNumber"]);
    }

    #[test]
    fn font_mapping_covers_both_families() {
        let mut text = TextElement {
            id: "t".to_string(),
            content: String::new(),
            x: 0.0,
            y: 0.0,
            font_family: "Times New Roman".to_string(),
            font_size: 12.0,
            font_weight: FontWeight::Bold,
            color: default_color(),
            align: Align::Left,
            max_width: None,
        };
        assert_eq!(text.font_name(), "Times-Bold");
        text.font_family = "sans-serif".to_string();
        assert_eq!(text.font_name(), "Helvetica-Bold");
        text.font_weight = FontWeight::Normal;
        assert_eq!(text.font_name(), "Helvetica");
    }
}
