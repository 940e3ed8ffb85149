//! Streaming PDF serializer for canvas documents. Objects are written in
//! dependency order with a classic xref table and trailer. Fonts are the
//! base-14 Type1 set with WinAnsi encoding, written once per document;
//! image XObjects are deduplicated by content digest.

use crate::assets::ImageAsset;
use crate::canvas::{Command, Document, Page};
use crate::types::{Color, Pt, Size};
use std::collections::BTreeMap;
use std::io::{self, Write};

const PDF_CATALOG_ID: usize = 1;
const PDF_PAGES_ID: usize = 2;
const PDF_RESOURCES_ID: usize = 3;

pub fn document_to_pdf(document: &Document) -> io::Result<Vec<u8>> {
    let mut out = Vec::new();
    let mut writer = PdfWriter::new(&mut out, document.page_size)?;
    for page in &document.pages {
        writer.add_page(page, &document.images)?;
    }
    writer.finish()?;
    Ok(out)
}

struct FontSlot {
    resource: String,
    object_id: usize,
}

struct PdfWriter<'a, W: Write> {
    writer: &'a mut W,
    offset: usize,
    offsets: Vec<usize>, // indexed by object id; 0 is the free object.
    next_id: usize,
    page_size: Size,
    fonts: BTreeMap<String, FontSlot>,
    next_font_resource: usize,
    image_resources: Vec<(String, usize)>,
    image_name_map: BTreeMap<String, String>,
    image_digest_map: BTreeMap<[u8; 32], String>,
    next_image_index: usize,
    page_ids: Vec<usize>,
}

impl<'a, W: Write> PdfWriter<'a, W> {
    fn new(writer: &'a mut W, page_size: Size) -> io::Result<Self> {
        let mut offset = 0usize;
        write_bytes(writer, b"%PDF-1.7\n", &mut offset)?;
        write_bytes(writer, b"%\xE2\xE3\xCF\xD3\n", &mut offset)?;
        Ok(Self {
            writer,
            offset,
            offsets: vec![0; PDF_RESOURCES_ID + 1],
            next_id: PDF_RESOURCES_ID + 1,
            page_size,
            fonts: BTreeMap::new(),
            next_font_resource: 1,
            image_resources: Vec::new(),
            image_name_map: BTreeMap::new(),
            image_digest_map: BTreeMap::new(),
            next_image_index: 1,
            page_ids: Vec::new(),
        })
    }

    fn add_page(
        &mut self,
        page: &Page,
        images: &BTreeMap<String, ImageAsset>,
    ) -> io::Result<()> {
        let start = self.alloc_ids(2);
        let content_id = start;
        let page_id = start + 1;

        let content_stream = self.render_commands(&page.commands, images)?;
        self.write_object(content_id, &stream_object(&content_stream))?;

        let page_obj = format!(
            "<< /Type /Page /Parent {} 0 R /MediaBox [0 0 {} {}] /Resources {} 0 R /Contents {} 0 R >>",
            PDF_PAGES_ID,
            fmt_pt(self.page_size.width),
            fmt_pt(self.page_size.height),
            PDF_RESOURCES_ID,
            content_id
        );
        self.write_object(page_id, &page_obj)?;
        self.page_ids.push(page_id);
        Ok(())
    }

    fn render_commands(
        &mut self,
        commands: &[Command],
        images: &BTreeMap<String, ImageAsset>,
    ) -> io::Result<String> {
        let mut out = String::new();
        let mut current_font_size = Pt::from_f32(12.0);
        let mut current_font_name = "Helvetica".to_string();

        for cmd in commands {
            match cmd {
                Command::SaveState => out.push_str("q\n"),
                Command::RestoreState => out.push_str("Q\n"),
                Command::SetFillColor(color) => out.push_str(&fill_color_op(*color)),
                Command::SetStrokeColor(color) => out.push_str(&stroke_color_op(*color)),
                Command::SetLineWidth(width) => {
                    out.push_str(&format!("{} w\n", fmt_pt(*width)));
                }
                Command::SetFontName(name) => {
                    current_font_name = name.clone();
                }
                Command::SetFontSize(size) => {
                    current_font_size = *size;
                }
                Command::MoveTo { x, y } => {
                    out.push_str(&format!("{} {} m\n", fmt_pt(*x), fmt_pt(*y)));
                }
                Command::LineTo { x, y } => {
                    out.push_str(&format!("{} {} l\n", fmt_pt(*x), fmt_pt(*y)));
                }
                Command::CurveTo {
                    x1,
                    y1,
                    x2,
                    y2,
                    x,
                    y,
                } => {
                    out.push_str(&format!(
                        "{} {} {} {} {} {} c\n",
                        fmt_pt(*x1),
                        fmt_pt(*y1),
                        fmt_pt(*x2),
                        fmt_pt(*y2),
                        fmt_pt(*x),
                        fmt_pt(*y),
                    ));
                }
                Command::ClosePath => out.push_str("h\n"),
                Command::RectPath {
                    x,
                    y,
                    width,
                    height,
                } => {
                    out.push_str(&format!(
                        "{} {} {} {} re\n",
                        fmt_pt(*x),
                        fmt_pt(*y),
                        fmt_pt(*width),
                        fmt_pt(*height)
                    ));
                }
                Command::Fill => out.push_str("f\n"),
                Command::Stroke => out.push_str("S\n"),
                Command::FillStroke => out.push_str("B\n"),
                Command::DrawString { x, y, text } => {
                    let resource = self.ensure_font(&current_font_name)?;
                    out.push_str("BT\n");
                    out.push_str(&format!("/{} {} Tf\n", resource, fmt_pt(current_font_size)));
                    out.push_str(&format!("{} {} Td\n", fmt_pt(*x), fmt_pt(*y)));
                    out.push_str(&format!("({}) Tj\n", encode_winansi(text)));
                    out.push_str("ET\n");
                }
                Command::DrawImage {
                    x,
                    y,
                    width,
                    height,
                    resource_id,
                } => {
                    if let Some(name) = self.ensure_image(resource_id, images)? {
                        out.push_str("q\n");
                        out.push_str(&format!(
                            "{} 0 0 {} {} {} cm\n",
                            fmt_pt(*width),
                            fmt_pt(*height),
                            fmt_pt(*x),
                            fmt_pt(*y)
                        ));
                        out.push_str(&format!("/{} Do\n", name));
                        out.push_str("Q\n");
                    }
                }
            }
        }
        Ok(out)
    }

    fn ensure_font(&mut self, name: &str) -> io::Result<String> {
        let name = normalize_base14(name);
        if let Some(slot) = self.fonts.get(name) {
            return Ok(slot.resource.clone());
        }
        let resource = format!("F{}", self.next_font_resource);
        self.next_font_resource += 1;
        let object_id = self.alloc_ids(1);
        self.write_object(object_id, &font_object(name))?;
        self.fonts.insert(
            name.to_string(),
            FontSlot {
                resource: resource.clone(),
                object_id,
            },
        );
        Ok(resource)
    }

    fn ensure_image(
        &mut self,
        resource_id: &str,
        images: &BTreeMap<String, ImageAsset>,
    ) -> io::Result<Option<String>> {
        if let Some(name) = self.image_name_map.get(resource_id) {
            return Ok(Some(name.clone()));
        }
        let Some(asset) = images.get(resource_id) else {
            // Unregistered resource: the draw is dropped, never fatal.
            return Ok(None);
        };

        let digest = asset.content_digest();
        if let Some(name) = self.image_digest_map.get(&digest) {
            let name = name.clone();
            self.image_name_map
                .insert(resource_id.to_string(), name.clone());
            return Ok(Some(name));
        }

        let smask_id = asset.smask.as_ref().map(|_| self.alloc_ids(1));
        let obj_id = self.alloc_ids(1);
        let name = format!("Im{}", self.next_image_index);
        self.next_image_index += 1;

        if let (Some(mask), Some(mask_id)) = (asset.smask.as_ref(), smask_id) {
            self.write_object(mask_id, &image_smask_object(asset, &mask.data))?;
        }
        self.write_object(obj_id, &image_object(asset, smask_id))?;
        self.image_resources.push((name.clone(), obj_id));
        self.image_name_map
            .insert(resource_id.to_string(), name.clone());
        self.image_digest_map.insert(digest, name.clone());
        Ok(Some(name))
    }

    fn finish(&mut self) -> io::Result<usize> {
        // Resources dictionary, shared by every page.
        let mut resources = Vec::new();
        if !self.fonts.is_empty() {
            let entries = self
                .fonts
                .values()
                .map(|slot| format!("/{} {} 0 R", slot.resource, slot.object_id))
                .collect::<Vec<_>>()
                .join(" ");
            resources.push(format!("/Font << {} >>", entries));
        }
        if !self.image_resources.is_empty() {
            let entries = self
                .image_resources
                .iter()
                .map(|(name, id)| format!("/{} {} 0 R", name, id))
                .collect::<Vec<_>>()
                .join(" ");
            resources.push(format!("/XObject << {} >>", entries));
        }
        self.write_object(PDF_RESOURCES_ID, &format!("<< {} >>", resources.join(" ")))?;

        let kids = self
            .page_ids
            .iter()
            .map(|id| format!("{} 0 R", id))
            .collect::<Vec<_>>()
            .join(" ");
        self.write_object(
            PDF_PAGES_ID,
            &format!(
                "<< /Type /Pages /Count {} /Kids [{}] >>",
                self.page_ids.len(),
                kids
            ),
        )?;
        self.write_object(
            PDF_CATALOG_ID,
            &format!("<< /Type /Catalog /Pages {} 0 R >>", PDF_PAGES_ID),
        )?;

        let total_objects = self.next_id.saturating_sub(1);
        let xref_start = self.offset;
        write_str(
            self.writer,
            &format!("xref\n0 {}\n", total_objects + 1),
            &mut self.offset,
        )?;
        write_bytes(self.writer, b"0000000000 65535 f \n", &mut self.offset)?;
        for id in 1..=total_objects {
            let obj_offset = self.offsets.get(id).copied().unwrap_or(0);
            write_str(
                self.writer,
                &format!("{:010} 00000 n \n", obj_offset),
                &mut self.offset,
            )?;
        }
        let trailer = format!(
            "trailer\n<< /Size {} /Root {} 0 R >>\nstartxref\n{}\n%%EOF",
            total_objects + 1,
            PDF_CATALOG_ID,
            xref_start
        );
        write_str(self.writer, &trailer, &mut self.offset)?;
        Ok(self.offset)
    }

    fn alloc_ids(&mut self, count: usize) -> usize {
        let start = self.next_id;
        self.next_id = self.next_id.saturating_add(count);
        if self.offsets.len() < self.next_id {
            self.offsets.resize(self.next_id, 0);
        }
        start
    }

    fn write_object(&mut self, obj_id: usize, body: &str) -> io::Result<()> {
        if let Some(slot) = self.offsets.get_mut(obj_id) {
            *slot = self.offset;
        }
        write_str(self.writer, &format!("{} 0 obj\n", obj_id), &mut self.offset)?;
        write_bytes(self.writer, body.as_bytes(), &mut self.offset)?;
        write_bytes(self.writer, b"\nendobj\n", &mut self.offset)?;
        Ok(())
    }
}

fn write_bytes<W: Write>(writer: &mut W, data: &[u8], offset: &mut usize) -> io::Result<()> {
    writer.write_all(data)?;
    *offset += data.len();
    Ok(())
}

fn write_str<W: Write>(writer: &mut W, data: &str, offset: &mut usize) -> io::Result<()> {
    write_bytes(writer, data.as_bytes(), offset)
}

fn stream_object(content: &str) -> String {
    let length = content.as_bytes().len();
    format!("<< /Length {} >>\nstream\n{}\nendstream", length, content)
}

fn font_object(name: &str) -> String {
    format!(
        "<< /Type /Font /Subtype /Type1 /BaseFont /{} /Encoding /WinAnsiEncoding >>",
        name
    )
}

/// The render contract only exposes the fixed base-14 set; anything else
/// falls back to Helvetica.
fn normalize_base14(name: &str) -> &'static str {
    match name.trim().to_ascii_lowercase().as_str() {
        "times-roman" => "Times-Roman",
        "times-bold" => "Times-Bold",
        "times-italic" => "Times-Italic",
        "times-bolditalic" => "Times-BoldItalic",
        "helvetica-bold" => "Helvetica-Bold",
        "helvetica-oblique" => "Helvetica-Oblique",
        "helvetica-boldoblique" => "Helvetica-BoldOblique",
        "courier" => "Courier",
        "courier-bold" => "Courier-Bold",
        "zapfdingbats" => "ZapfDingbats",
        _ => "Helvetica",
    }
}

fn image_object(asset: &ImageAsset, smask_id: Option<usize>) -> String {
    let stream_data = encode_stream_data(&asset.data);
    let filters = match asset.filter {
        "/DCTDecode" => "[/ASCIIHexDecode /DCTDecode]",
        _ => "[/ASCIIHexDecode /FlateDecode]",
    };
    let smask = smask_id
        .map(|id| format!(" /SMask {} 0 R", id))
        .unwrap_or_default();
    format!(
        "<< /Type /XObject /Subtype /Image /Width {} /Height {} /ColorSpace {} /BitsPerComponent {} /Length {} /Filter {}{} >>\nstream\n{}\nendstream",
        asset.width,
        asset.height,
        asset.color_space,
        asset.bits_per_component,
        stream_data.len(),
        filters,
        smask,
        stream_data
    )
}

fn image_smask_object(asset: &ImageAsset, mask_data: &[u8]) -> String {
    let stream_data = encode_stream_data(mask_data);
    format!(
        "<< /Type /XObject /Subtype /Image /Width {} /Height {} /ColorSpace /DeviceGray /BitsPerComponent 8 /Length {} /Filter [/ASCIIHexDecode /FlateDecode] >>\nstream\n{}\nendstream",
        asset.width,
        asset.height,
        stream_data.len(),
        stream_data
    )
}

fn encode_stream_data(data: &[u8]) -> String {
    let mut hex = ascii_hex_encode(data);
    hex.push('>');
    hex
}

fn ascii_hex_encode(data: &[u8]) -> String {
    use std::fmt::Write as _;
    let mut out = String::with_capacity(data.len() * 2);
    for (index, byte) in data.iter().enumerate() {
        let _ = write!(&mut out, "{:02X}", byte);
        if index % 32 == 31 {
            out.push('\n');
        }
    }
    out
}

fn fill_color_op(color: Color) -> String {
    format!(
        "{} {} {} rg\n",
        fmt(color.r),
        fmt(color.g),
        fmt(color.b)
    )
}

fn stroke_color_op(color: Color) -> String {
    format!(
        "{} {} {} RG\n",
        fmt(color.r),
        fmt(color.g),
        fmt(color.b)
    )
}

fn fmt(value: f32) -> String {
    if !value.is_finite() {
        return "0".to_string();
    }
    format_milli((value as f64 * 1000.0).round() as i64)
}

fn fmt_pt(value: Pt) -> String {
    format_milli(value.to_milli_i64())
}

fn format_milli(milli: i64) -> String {
    if milli == 0 {
        return "0".to_string();
    }
    let sign = if milli < 0 { "-" } else { "" };
    let abs = milli.abs();
    let int_part = abs / 1000;
    let frac_part = abs % 1000;
    if frac_part == 0 {
        format!("{}{}", sign, int_part)
    } else {
        let mut s = format!("{}{}.{:03}", sign, int_part, frac_part);
        while s.ends_with('0') {
            s.pop();
        }
        if s.ends_with('.') {
            s.pop();
        }
        s
    }
}

/// WinAnsi (cp1252) string encoding with PDF escaping. Characters outside
/// the code page degrade to '?'.
fn encode_winansi(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for ch in input.chars() {
        let byte = match ch {
            '\u{0000}'..='\u{007F}' => ch as u8,
            '\u{00A0}'..='\u{00FF}' => ch as u8,
            '\u{20AC}' => 0x80,
            '\u{201A}' => 0x82,
            '\u{0192}' => 0x83,
            '\u{201E}' => 0x84,
            '\u{2026}' => 0x85,
            '\u{2020}' => 0x86,
            '\u{2021}' => 0x87,
            '\u{02C6}' => 0x88,
            '\u{2030}' => 0x89,
            '\u{0160}' => 0x8A,
            '\u{2039}' => 0x8B,
            '\u{0152}' => 0x8C,
            '\u{017D}' => 0x8E,
            '\u{2018}' => 0x91,
            '\u{2019}' => 0x92,
            '\u{201C}' => 0x93,
            '\u{201D}' => 0x94,
            '\u{2022}' => 0x95,
            '\u{2013}' => 0x96,
            '\u{2014}' => 0x97,
            '\u{02DC}' => 0x98,
            '\u{2122}' => 0x99,
            '\u{0161}' => 0x9A,
            '\u{203A}' => 0x9B,
            '\u{0153}' => 0x9C,
            '\u{017E}' => 0x9E,
            '\u{0178}' => 0x9F,
            _ => b'?',
        };
        match byte {
            b'\\' => out.push_str("\\\\"),
            b'(' => out.push_str("\\("),
            b')' => out.push_str("\\)"),
            b'\n' => out.push_str("\\n"),
            b'\r' => out.push_str("\\r"),
            b if b < 0x20 || b >= 0x7f => out.push_str(&format!("\\{:03o}", b)),
            b => out.push(b as char),
        }
    }
    out
}
