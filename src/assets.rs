//! Asset resolution and decoding. Sources are data URIs, local paths or
//! remote URLs; remote bytes come through an injectable fetcher so the engine
//! never owns connection or retry policy (one attempt, then degrade).
//! Decoding is an ordered fallback chain: PNG first, then JPEG, then the
//! asset is skipped with a warning.

use base64::Engine;
use image::GenericImageView;
use log::warn;
use sha2::{Digest, Sha256};
use std::io::Write;
use std::path::Path;
use std::sync::OnceLock;

/// Remote byte source. Implementations return the body on HTTP 200 and an
/// error message otherwise; the engine treats every error the same way.
pub trait AssetFetcher: Send + Sync {
    fn fetch(&self, url: &str) -> Result<Vec<u8>, String>;
}

/// Blocking HTTP fetcher used by default. The client is built on first use
/// and shared across renders.
#[derive(Debug, Default)]
pub struct HttpFetcher {
    client: OnceLock<reqwest::blocking::Client>,
}

impl HttpFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    fn client(&self) -> &reqwest::blocking::Client {
        self.client.get_or_init(reqwest::blocking::Client::new)
    }
}

impl AssetFetcher for HttpFetcher {
    fn fetch(&self, url: &str) -> Result<Vec<u8>, String> {
        let response = self
            .client()
            .get(url)
            .send()
            .map_err(|err| err.to_string())?;
        if !response.status().is_success() {
            return Err(format!("http status {}", response.status()));
        }
        response
            .bytes()
            .map(|bytes| bytes.to_vec())
            .map_err(|err| err.to_string())
    }
}

/// Decoded, PDF-ready image data.
#[derive(Debug, Clone, PartialEq)]
pub struct ImageAsset {
    pub width: u32,
    pub height: u32,
    pub color_space: &'static str,
    pub bits_per_component: u8,
    pub filter: &'static str,
    pub data: Vec<u8>,
    pub smask: Option<AlphaMask>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AlphaMask {
    pub data: Vec<u8>,
}

impl ImageAsset {
    /// Content digest used to embed identical bytes once per document even
    /// when referenced through different sources.
    pub fn content_digest(&self) -> [u8; 32] {
        let mut hasher = Sha256::new();
        hasher.update(&self.data);
        if let Some(mask) = &self.smask {
            hasher.update(&mask.data);
        }
        hasher.finalize().into()
    }
}

/// Raw bytes for a source, before decoding. Used for images and for PDF
/// underlay documents alike.
pub fn fetch_bytes(source: &str, fetcher: &dyn AssetFetcher) -> Option<Vec<u8>> {
    if let Some((_mime, data)) = parse_data_uri(source) {
        return Some(data);
    }
    if source.starts_with("http://") || source.starts_with("https://") {
        return match fetcher.fetch(source) {
            Ok(bytes) => Some(bytes),
            Err(err) => {
                warn!("remote asset unavailable: {} ({})", source, err);
                None
            }
        };
    }
    match std::fs::read(Path::new(source)) {
        Ok(bytes) => Some(bytes),
        Err(err) => {
            warn!("local asset unavailable: {} ({})", source, err);
            None
        }
    }
}

/// Full resolution chain for an image element. `None` means the element is
/// omitted from the page; the render carries on.
pub fn load_image(source: &str, grayscale: bool, fetcher: &dyn AssetFetcher) -> Option<ImageAsset> {
    let bytes = fetch_bytes(source, fetcher)?;
    match decode_image(&bytes, grayscale) {
        Some(asset) => Some(asset),
        None => {
            warn!("image bytes not decodable as png or jpeg: {}", source);
            None
        }
    }
}

/// PNG-then-JPEG decode chain.
pub fn decode_image(bytes: &[u8], grayscale: bool) -> Option<ImageAsset> {
    if let Ok(decoded) = image::load_from_memory_with_format(bytes, image::ImageFormat::Png) {
        return Some(encode_decoded(decoded, grayscale, None));
    }
    match image::load_from_memory_with_format(bytes, image::ImageFormat::Jpeg) {
        Ok(decoded) => Some(encode_decoded(decoded, grayscale, Some(bytes))),
        Err(_) => None,
    }
}

fn encode_decoded(
    decoded: image::DynamicImage,
    grayscale: bool,
    jpeg_bytes: Option<&[u8]>,
) -> ImageAsset {
    let (width, height) = decoded.dimensions();

    if grayscale {
        let luma = decoded.to_luma8();
        return ImageAsset {
            width,
            height,
            color_space: "/DeviceGray",
            bits_per_component: 8,
            filter: "/FlateDecode",
            data: flate_compress(luma.as_raw()),
            smask: None,
        };
    }

    // JPEG passes through untouched as a DCT stream.
    if let Some(bytes) = jpeg_bytes {
        let color_space = match decoded.color() {
            image::ColorType::L8 | image::ColorType::La8 => "/DeviceGray",
            _ => "/DeviceRGB",
        };
        return ImageAsset {
            width,
            height,
            color_space,
            bits_per_component: 8,
            filter: "/DCTDecode",
            data: bytes.to_vec(),
            smask: None,
        };
    }

    let rgba = decoded.to_rgba8();
    let mut rgb = Vec::with_capacity((width * height * 3) as usize);
    let mut alpha = Vec::with_capacity((width * height) as usize);
    let mut has_alpha = false;
    for pixel in rgba.pixels() {
        let [r, g, b, a] = pixel.0;
        if a != 255 {
            has_alpha = true;
        }
        rgb.extend_from_slice(&[r, g, b]);
        alpha.push(a);
    }
    ImageAsset {
        width,
        height,
        color_space: "/DeviceRGB",
        bits_per_component: 8,
        filter: "/FlateDecode",
        data: flate_compress(&rgb),
        smask: has_alpha.then(|| AlphaMask {
            data: flate_compress(&alpha),
        }),
    }
}

pub fn parse_data_uri(uri: &str) -> Option<(String, Vec<u8>)> {
    let rest = uri.strip_prefix("data:")?;
    let (header, data_part) = rest.split_once(',')?;
    let mime = header
        .split(';')
        .next()
        .filter(|m| !m.is_empty())
        .unwrap_or("application/octet-stream")
        .to_string();
    let data = if header.contains("base64") {
        base64::engine::general_purpose::STANDARD
            .decode(data_part)
            .ok()?
    } else {
        data_part.as_bytes().to_vec()
    };
    Some((mime, data))
}

pub(crate) fn flate_compress(data: &[u8]) -> Vec<u8> {
    let mut encoder =
        flate2::write::ZlibEncoder::new(Vec::new(), flate2::Compression::default());
    let _ = encoder.write_all(data);
    encoder.finish().unwrap_or_default()
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use std::collections::BTreeMap;

    /// Canned fetcher for tests: URL -> body, anything else errors.
    #[derive(Default)]
    pub struct StubFetcher {
        pub responses: BTreeMap<String, Vec<u8>>,
    }

    impl AssetFetcher for StubFetcher {
        fn fetch(&self, url: &str) -> Result<Vec<u8>, String> {
            self.responses
                .get(url)
                .cloned()
                .ok_or_else(|| "not found".to_string())
        }
    }

    /// Smallest valid 1x1 opaque PNG.
    pub fn tiny_png() -> Vec<u8> {
        let mut buffer = std::io::Cursor::new(Vec::new());
        let img = image::RgbImage::from_pixel(1, 1, image::Rgb([255, 0, 0]));
        image::DynamicImage::ImageRgb8(img)
            .write_to(&mut buffer, image::ImageFormat::Png)
            .unwrap();
        buffer.into_inner()
    }

    pub fn tiny_jpeg() -> Vec<u8> {
        let mut buffer = std::io::Cursor::new(Vec::new());
        let img = image::RgbImage::from_pixel(1, 1, image::Rgb([0, 255, 0]));
        image::DynamicImage::ImageRgb8(img)
            .write_to(&mut buffer, image::ImageFormat::Jpeg)
            .unwrap();
        buffer.into_inner()
    }
}
