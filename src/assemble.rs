//! Batch assembly: validates the template, plans the tiling, builds pages in
//! parallel and serializes the result. A PDF background is handled after
//! serialization by stamping the rendered overlay onto the underlay document.

use crate::assets::{self, AssetFetcher};
use crate::canvas::{Canvas, Document, Page};
use crate::error::CertPressError;
use crate::pdf;
use crate::positions::PositionRegistry;
use crate::render::{self, ImageStore};
use crate::scale;
use crate::template::{Background, Template};
use crate::tiling;
use crate::types::Pt;
use crate::vars::{Record, Transforms};
use log::warn;
use lopdf::{
    Document as LoDocument, Object as LoObject, ObjectId as LoObjectId, Stream as LoStream,
    dictionary,
};
use rayon::prelude::*;

/// One certificate per record, tiled onto pages per the template's
/// `instances_per_page` and the family's position data.
pub fn render_batch(
    template: &Template,
    records: &[Record],
    transforms: &Transforms,
    registry: &PositionRegistry,
    fetcher: &dyn AssetFetcher,
) -> Result<Vec<u8>, CertPressError> {
    template.validate()?;
    registry.validate()?;
    let per_page = template.instances_per_page as usize;
    let plan = tiling::allocate(records.len(), per_page)?;

    // Fail fast: every position the plan will use must resolve.
    for position in 1..=per_page.min(records.len()) {
        registry.lookup(&template.class_type, position)?;
    }
    let page_size = template.page_size();
    if let Some(family) = registry.family(&template.class_type) {
        for finding in family.findings_for_page(page_size.height.to_f32()) {
            warn!("{}", finding);
        }
    }

    let images = ImageStore::preload(template, fetcher);
    log::debug!(
        "rendering '{}': {} records, {} per page, {} pages",
        template.class_type,
        records.len(),
        plan.instances_per_page(),
        plan.page_count()
    );

    let pages: Vec<Page> = (0..plan.page_count())
        .into_par_iter()
        .map(|page_index| {
            let mut canvas = Canvas::new(page_size);
            draw_background(&mut canvas, template, &images);
            for slot in plan.page(page_index) {
                let lookup = registry.lookup(&template.class_type, slot.position)?;
                render::draw_instance(
                    &mut canvas,
                    template,
                    &records[slot.record_index],
                    transforms,
                    &lookup,
                    &images,
                )?;
            }
            Ok(canvas.finish().pages.remove(0))
        })
        .collect::<Result<_, CertPressError>>()?;

    let document = merge_pages(page_size, pages, &images);
    let overlay = pdf::document_to_pdf(&document)?;
    apply_underlay(overlay, template, fetcher)
}

/// Combined output: the whole batch packed onto `target_pages` pages, each
/// instance scaled into its vertical slot. Image and PDF backgrounds are
/// authored at full certificate size and do not tile into slots, so only a
/// color background carries over.
pub fn render_combined(
    template: &Template,
    records: &[Record],
    transforms: &Transforms,
    target_pages: usize,
    fetcher: &dyn AssetFetcher,
) -> Result<Vec<u8>, CertPressError> {
    template.validate()?;
    let page_size = template.page_size();
    let plan = scale::plan(records.len(), target_pages, page_size)?;
    if !matches!(
        template.background,
        Background::None | Background::Color { .. }
    ) {
        warn!(
            "combined output for '{}' drops the template background",
            template.class_type
        );
    }
    let images = ImageStore::preload(template, fetcher);

    let pages: Vec<Page> = (0..plan.page_count)
        .into_par_iter()
        .map(|page_index| {
            let mut canvas = Canvas::new(page_size);
            if let Background::Color { value } = &template.background {
                fill_page(&mut canvas, page_size, value);
            }
            let first = page_index * plan.per_page;
            let last = (first + plan.per_page).min(records.len());
            for (slot_index, record) in records[first..last].iter().enumerate() {
                render::draw_combined_instance(
                    &mut canvas,
                    template,
                    record,
                    transforms,
                    &plan,
                    slot_index,
                    &images,
                )?;
            }
            Ok(canvas.finish().pages.remove(0))
        })
        .collect::<Result<_, CertPressError>>()?;

    let document = merge_pages(page_size, pages, &images);
    Ok(pdf::document_to_pdf(&document)?)
}

fn merge_pages(page_size: crate::types::Size, pages: Vec<Page>, images: &ImageStore) -> Document {
    let mut document = Document {
        page_size,
        pages,
        images: Default::default(),
    };
    for (source, asset) in images.iter() {
        document.images.insert(source.clone(), asset.clone());
    }
    document
}

fn draw_background(canvas: &mut Canvas, template: &Template, images: &ImageStore) {
    match &template.background {
        Background::None => {}
        Background::Color { value } => {
            let size = canvas.page_size();
            fill_page(canvas, size, value);
        }
        Background::Image { source } => {
            if images.get(source).is_some() {
                let size = canvas.page_size();
                canvas.draw_image(Pt::ZERO, Pt::ZERO, size.width, size.height, source);
            }
        }
        // Stamped onto the serialized overlay afterwards.
        Background::Pdf { .. } => {}
    }
}

fn fill_page(canvas: &mut Canvas, size: crate::types::Size, hex: &str) {
    canvas.set_fill_color(crate::types::Color::from_hex(hex));
    canvas.rect_path(Pt::ZERO, Pt::ZERO, size.width, size.height);
    canvas.fill();
}

/// If the template declares a PDF background, stamps the rendered overlay on
/// top of it. An unavailable or unreadable underlay degrades to the plain
/// overlay; an encrypted underlay is a hard error because silently dropping
/// an intentional letterhead would be worse than failing.
fn apply_underlay(
    overlay: Vec<u8>,
    template: &Template,
    fetcher: &dyn AssetFetcher,
) -> Result<Vec<u8>, CertPressError> {
    let Background::Pdf { source } = &template.background else {
        return Ok(overlay);
    };
    let Some(underlay_bytes) = assets::fetch_bytes(source, fetcher) else {
        return Ok(overlay);
    };
    let base = match LoDocument::load_mem(&underlay_bytes) {
        Ok(doc) => doc,
        Err(err) => {
            warn!("underlay not a readable pdf: {} ({})", source, err);
            return Ok(overlay);
        }
    };
    if base.is_encrypted() {
        return Err(CertPressError::Underlay(format!(
            "underlay '{}' is encrypted",
            source
        )));
    }
    let overlay_doc = LoDocument::load_mem(&overlay)
        .map_err(|err| CertPressError::Underlay(format!("overlay reload failed: {}", err)))?;
    stamp_overlay(base, overlay_doc).map_err(CertPressError::Underlay)
}

/// Form-XObject stamping: each overlay page becomes a form drawn on top of
/// the corresponding underlay page. A shorter underlay cycles, so a one-page
/// letterhead backs every certificate page.
fn stamp_overlay(mut base: LoDocument, mut overlay: LoDocument) -> Result<Vec<u8>, String> {
    let overlay_count = overlay.get_pages().len();
    if overlay_count == 0 {
        return Err("overlay has no pages".to_string());
    }
    replicate_pages(&mut base, overlay_count)?;

    let start_id = base.max_id + 1;
    overlay.renumber_objects_with(start_id);
    let overlay_ids: Vec<LoObjectId> = overlay.get_pages().values().copied().collect();
    if overlay.max_id > base.max_id {
        base.max_id = overlay.max_id;
    }
    base.objects.extend(overlay.objects);

    let base_ids: Vec<LoObjectId> = base.get_pages().values().copied().collect();
    for (index, overlay_page_id) in overlay_ids.iter().enumerate() {
        let overlay_page = base
            .get_object(*overlay_page_id)
            .and_then(LoObject::as_dict)
            .map_err(|err| err.to_string())?
            .clone();
        let content = base
            .get_page_content(*overlay_page_id)
            .map_err(|err| err.to_string())?;
        let bbox = page_box(&overlay_page);
        let resources = page_resources_object(&base, &overlay_page);

        let form = LoStream::new(
            dictionary! {
                "Type" => "XObject",
                "Subtype" => "Form",
                "FormType" => 1,
                "BBox" => LoObject::Array(bbox),
                "Resources" => resources,
            },
            content,
        );
        let form_id = base.add_object(form);
        let form_name = format!("CP_OVL_{}", index + 1);

        let base_page_id = base_ids[index];
        let page_dict = base
            .get_object(base_page_id)
            .and_then(LoObject::as_dict)
            .map_err(|err| err.to_string())?
            .clone();
        let mut page_resources = page_resources_dict(&page_dict, &base);
        let mut xobjects = page_xobject_dict(&page_resources, &base);
        xobjects.set(form_name.as_bytes().to_vec(), LoObject::Reference(form_id));
        page_resources.set("XObject", LoObject::Dictionary(xobjects));
        {
            let page_mut = base
                .get_object_mut(base_page_id)
                .and_then(LoObject::as_dict_mut)
                .map_err(|err| err.to_string())?;
            page_mut.set("Resources", LoObject::Dictionary(page_resources));
        }
        let do_content = format!("q 1 0 0 1 0 0 cm /{} Do Q\n", form_name).into_bytes();
        base.add_page_contents(base_page_id, do_content)
            .map_err(|err| err.to_string())?;
    }

    base.prune_objects();
    base.renumber_objects();
    base.compress();
    let mut out = Vec::new();
    base.save_to(&mut out).map_err(|err| err.to_string())?;
    Ok(out)
}

/// Appends duplicates of the underlay's pages (cycling from the first) until
/// it has `target` pages. Clones share Contents and Resources by reference.
fn replicate_pages(doc: &mut LoDocument, target: usize) -> Result<(), String> {
    let page_ids: Vec<LoObjectId> = doc.get_pages().values().copied().collect();
    if page_ids.is_empty() {
        return Err("underlay has no pages".to_string());
    }
    let existing = page_ids.len();
    for index in existing..target {
        let source_id = page_ids[index % existing];
        let page_dict = doc
            .get_object(source_id)
            .and_then(LoObject::as_dict)
            .map_err(|err| err.to_string())?
            .clone();
        let parent_id = match page_dict.get(b"Parent") {
            Ok(LoObject::Reference(id)) => *id,
            _ => return Err("underlay page has no parent node".to_string()),
        };
        let new_id = doc.add_object(LoObject::Dictionary(page_dict));
        let parent = doc
            .get_object_mut(parent_id)
            .and_then(LoObject::as_dict_mut)
            .map_err(|err| err.to_string())?;
        match parent.get_mut(b"Kids") {
            Ok(LoObject::Array(kids)) => kids.push(LoObject::Reference(new_id)),
            _ => return Err("underlay page tree has no kids array".to_string()),
        }
        let count = parent
            .get(b"Count")
            .and_then(LoObject::as_i64)
            .unwrap_or(existing as i64);
        parent.set("Count", count + 1);
    }
    Ok(())
}

fn page_box(page: &lopdf::Dictionary) -> Vec<LoObject> {
    if let Ok(arr) = page.get(b"CropBox").and_then(LoObject::as_array) {
        return arr.clone();
    }
    if let Ok(arr) = page.get(b"MediaBox").and_then(LoObject::as_array) {
        return arr.clone();
    }
    vec![0.into(), 0.into(), 612.into(), 792.into()]
}

fn page_resources_object(doc: &LoDocument, page: &lopdf::Dictionary) -> LoObject {
    match page.get(b"Resources") {
        Ok(LoObject::Reference(id)) => doc
            .get_object(*id)
            .cloned()
            .unwrap_or_else(|_| LoObject::Dictionary(lopdf::Dictionary::new())),
        Ok(LoObject::Dictionary(d)) => LoObject::Dictionary(d.clone()),
        _ => LoObject::Dictionary(lopdf::Dictionary::new()),
    }
}

fn page_resources_dict(page: &lopdf::Dictionary, doc: &LoDocument) -> lopdf::Dictionary {
    match page.get(b"Resources") {
        Ok(LoObject::Dictionary(d)) => d.clone(),
        Ok(LoObject::Reference(id)) => doc
            .get_object(*id)
            .ok()
            .and_then(|o| o.as_dict().ok())
            .cloned()
            .unwrap_or_default(),
        _ => lopdf::Dictionary::new(),
    }
}

fn page_xobject_dict(resources: &lopdf::Dictionary, doc: &LoDocument) -> lopdf::Dictionary {
    match resources.get(b"XObject") {
        Ok(LoObject::Dictionary(d)) => d.clone(),
        Ok(LoObject::Reference(id)) => doc
            .get_object(*id)
            .ok()
            .and_then(|o| o.as_dict().ok())
            .cloned()
            .unwrap_or_default(),
        _ => lopdf::Dictionary::new(),
    }
}

/// `Adult-6hr_Certificate_<id>.pdf` style download name.
pub fn certificate_filename(class_type: &str, record_id: &str) -> String {
    format!(
        "{}_Certificate_{}.pdf",
        family_title(class_type),
        sanitize(record_id)
    )
}

/// `Adult-6hr_Certificates_Combined_2024-03-05.pdf` style download name.
pub fn combined_filename(class_type: &str, date: chrono::NaiveDate) -> String {
    format!(
        "{}_Certificates_Combined_{}.pdf",
        family_title(class_type),
        date.format("%Y-%m-%d")
    )
}

fn family_title(class_type: &str) -> String {
    class_type
        .split('-')
        .map(|segment| {
            let mut chars = segment.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join("-")
}

fn sanitize(raw: &str) -> String {
    raw.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect()
}
