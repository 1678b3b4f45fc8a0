//! Image optimization.
//!
//! - PNG: palette quantization with imagequant, then oxipng recompression
//!   (optionally zopfli). Images that cannot reach the minimum quality are
//!   only recompressed.
//! - JPEG: decode and re-encode at reduced quality with `image`
//! - GIF: frames re-encoded with the `image` GIF encoder, loop count kept
//! - SVG: markup cleanup over quick-xml events
//!
//! An optimized result that is not smaller than its input is discarded in
//! favour of the original bytes.

use image::codecs::gif::{GifDecoder, GifEncoder, Repeat};
use image::codecs::jpeg::JpegEncoder;
use image::metadata::LoopCount;
use image::{AnimationDecoder, DynamicImage, ImageFormat};
use quick_xml::events::attributes::Attribute;
use quick_xml::events::{BytesStart, Event};
use quick_xml::name::QName;
use quick_xml::{Reader, Writer};
use std::borrow::Cow;
use std::io::Cursor;
use std::num::NonZeroU8;
use std::path::Path;

/// Lowest and highest JPEG quality accepted.
pub const JPEG_QUALITY_RANGE: (u8, u8) = (70, 80);

/// Minimum and target quality for PNG quantization.
pub const PNG_QUALITY_RANGE: (u8, u8) = (50, 60);

const ZOPFLI_ITERATIONS: u8 = 15;

/// 1 is slowest and best, 30 fastest.
const GIF_SPEED: i32 = 10;

/// Elements whose whitespace-only text is content.
const TEXT_CONTENT: &[&[u8]] = &[
    b"text", b"tspan", b"textPath", b"title", b"desc", b"script", b"style",
];

/// Optimizable image format, by extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageKind {
    Png,
    Jpeg,
    Gif,
    Svg,
}

impl ImageKind {
    #[must_use]
    pub fn from_path(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?.to_ascii_lowercase();
        match ext.as_str() {
            "png" => Some(Self::Png),
            "jpg" | "jpeg" => Some(Self::Jpeg),
            "gif" => Some(Self::Gif),
            "svg" => Some(Self::Svg),
            _ => None,
        }
    }
}

/// Optimizer settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImageSettings {
    jpeg_quality: u8,
    zopfli: bool,
}

impl Default for ImageSettings {
    fn default() -> Self {
        Self::new(75, true)
    }
}

impl ImageSettings {
    /// Settings with `jpeg_quality` clamped to [`JPEG_QUALITY_RANGE`].
    #[must_use]
    pub fn new(jpeg_quality: u8, zopfli: bool) -> Self {
        let (lo, hi) = JPEG_QUALITY_RANGE;
        Self {
            jpeg_quality: jpeg_quality.clamp(lo, hi),
            zopfli,
        }
    }

    #[must_use]
    pub fn jpeg_quality(&self) -> u8 {
        self.jpeg_quality
    }
}

/// Optimize one image, returning the bytes to write.
pub fn optimize_image(
    kind: ImageKind,
    bytes: &[u8],
    settings: &ImageSettings,
) -> Result<Vec<u8>, ImageError> {
    let optimized = match kind {
        ImageKind::Png => optimize_png(bytes, settings)?,
        ImageKind::Jpeg => optimize_jpeg(bytes, settings)?,
        ImageKind::Gif => optimize_gif(bytes)?,
        ImageKind::Svg => {
            let text = std::str::from_utf8(bytes)
                .map_err(|e| ImageError::Svg(format!("not UTF-8: {e}")))?;
            clean_svg(text)?.into_bytes()
        }
    };

    if optimized.len() < bytes.len() {
        Ok(optimized)
    } else {
        Ok(bytes.to_vec())
    }
}

fn png_options(settings: &ImageSettings) -> oxipng::Options {
    let mut options = oxipng::Options::from_preset(2);
    options.strip = oxipng::StripChunks::Safe;
    if settings.zopfli {
        options.deflate = oxipng::Deflaters::Zopfli {
            iterations: NonZeroU8::new(ZOPFLI_ITERATIONS).unwrap_or(NonZeroU8::MIN),
        };
    }
    options
}

fn optimize_png(bytes: &[u8], settings: &ImageSettings) -> Result<Vec<u8>, ImageError> {
    let options = png_options(settings);
    let decoded = image::load_from_memory_with_format(bytes, ImageFormat::Png)
        .map_err(|e| ImageError::Png(e.to_string()))?;

    match quantize(&decoded)? {
        Some(raw) => raw
            .create_optimized_png(&options)
            .map_err(|e| ImageError::Png(e.to_string())),
        None => oxipng::optimize_from_memory(bytes, &options)
            .map_err(|e| ImageError::Png(e.to_string())),
    }
}

/// Reduce `image` to a palette. `None` when the palette would fall below the
/// minimum quality.
fn quantize(image: &DynamicImage) -> Result<Option<oxipng::RawImage>, ImageError> {
    let rgba = image.to_rgba8();
    let (width, height) = rgba.dimensions();
    let pixels: Vec<imagequant::RGBA> = rgba
        .pixels()
        .map(|p| imagequant::RGBA::new(p[0], p[1], p[2], p[3]))
        .collect();

    let quant_err = |e: imagequant::Error| ImageError::Png(format!("quantization: {e}"));
    let mut attr = imagequant::new();
    let (min, target) = PNG_QUALITY_RANGE;
    attr.set_quality(min, target).map_err(quant_err)?;

    let mut liq_image = attr
        .new_image(pixels, width as usize, height as usize, 0.0)
        .map_err(quant_err)?;
    let mut result = match attr.quantize(&mut liq_image) {
        Ok(result) => result,
        Err(imagequant::Error::QualityTooLow) => return Ok(None),
        Err(e) => return Err(quant_err(e)),
    };
    result.set_dithering_level(1.0).map_err(quant_err)?;
    let (palette, indices) = result.remapped(&mut liq_image).map_err(quant_err)?;

    oxipng::RawImage::new(
        width,
        height,
        oxipng::ColorType::Indexed { palette },
        oxipng::BitDepth::Eight,
        indices,
    )
    .map(Some)
    .map_err(|e| ImageError::Png(e.to_string()))
}

fn optimize_jpeg(bytes: &[u8], settings: &ImageSettings) -> Result<Vec<u8>, ImageError> {
    let decoded = image::load_from_memory_with_format(bytes, ImageFormat::Jpeg)
        .map_err(|e| ImageError::Jpeg(e.to_string()))?;
    let decoded = match decoded {
        DynamicImage::ImageLuma8(_) | DynamicImage::ImageRgb8(_) => decoded,
        other => DynamicImage::ImageRgb8(other.to_rgb8()),
    };

    let mut out = Vec::with_capacity(bytes.len());
    decoded
        .write_with_encoder(JpegEncoder::new_with_quality(&mut out, settings.jpeg_quality))
        .map_err(|e| ImageError::Jpeg(e.to_string()))?;
    Ok(out)
}

fn optimize_gif(bytes: &[u8]) -> Result<Vec<u8>, ImageError> {
    let gif_err = |e: image::ImageError| ImageError::Gif(e.to_string());
    let decoder = GifDecoder::new(Cursor::new(bytes)).map_err(gif_err)?;
    let repeat = match decoder.loop_count() {
        LoopCount::Infinite => Repeat::Infinite,
        LoopCount::Finite(n) => Repeat::Finite(u16::try_from(n.get()).unwrap_or(u16::MAX)),
    };
    let frames = decoder.into_frames().collect_frames().map_err(gif_err)?;

    let mut out = Vec::with_capacity(bytes.len());
    {
        let mut encoder = GifEncoder::new_with_speed(&mut out, GIF_SPEED);
        encoder.set_repeat(repeat).map_err(gif_err)?;
        encoder.encode_frames(frames).map_err(gif_err)?;
    }
    Ok(out)
}

/// Clean SVG markup.
///
/// Removes comments, empty attributes and empty `<text>`/`<tspan>` elements,
/// unwraps `<g>` groups that carry no attributes, and drops whitespace-only
/// text outside text content. Everything else (`viewBox`, ids, foreign
/// namespaces, presentation attributes, script and style bodies) is written
/// back as read.
pub fn clean_svg(source: &str) -> Result<String, ImageError> {
    let events = read_events(source)?;
    let mut writer = Writer::new(Vec::with_capacity(source.len()));
    let mut open: Vec<(Vec<u8>, bool)> = Vec::new();
    let mut i = 0;

    while i < events.len() {
        let event = &events[i];
        i += 1;

        let kept = match event {
            Event::Start(start) if is_text_element(start) => {
                if let Some(end) = matching_end(&events, i - 1) {
                    if events[i..end].iter().all(is_blank_text) {
                        i = end + 1;
                        continue;
                    }
                }
                let start = without_empty_attributes(start)?;
                open.push((start.name().as_ref().to_vec(), false));
                Event::Start(start)
            }
            Event::Empty(start) if is_text_element(start) => continue,
            Event::Start(start) => {
                let start = without_empty_attributes(start)?;
                let name = start.name().as_ref().to_vec();
                let unwrap = name == b"g" && start.attributes().next().is_none();
                open.push((name, unwrap));
                if unwrap {
                    continue;
                }
                Event::Start(start)
            }
            Event::Empty(start) => Event::Empty(without_empty_attributes(start)?),
            Event::End(end) => {
                if let Some((_, true)) = open.pop() {
                    continue;
                }
                Event::End(end.clone())
            }
            Event::Text(text) if is_blank(text) => {
                let in_text = open
                    .last()
                    .is_some_and(|(name, _)| TEXT_CONTENT.contains(&name.as_slice()));
                if !in_text {
                    continue;
                }
                event.clone()
            }
            _ => event.clone(),
        };

        writer
            .write_event(kept)
            .map_err(|e| ImageError::Svg(e.to_string()))?;
    }

    let out = String::from_utf8(writer.into_inner())
        .map_err(|e| ImageError::Svg(format!("not UTF-8: {e}")))?;
    Ok(out.trim().to_string())
}

/// Parse the whole document, dropping comments.
fn read_events(source: &str) -> Result<Vec<Event<'_>>, ImageError> {
    let mut reader = Reader::from_str(source);
    let mut events = Vec::new();
    loop {
        let event = reader.read_event().map_err(|e| {
            ImageError::Svg(format!("at byte {}: {e}", reader.buffer_position()))
        })?;
        match event {
            Event::Eof => break,
            Event::Comment(_) => {}
            other => events.push(other),
        }
    }
    Ok(events)
}

/// Index of the `End` event closing the `Start` at `start`.
fn matching_end(events: &[Event<'_>], start: usize) -> Option<usize> {
    let mut depth = 0_usize;
    for (offset, event) in events[start..].iter().enumerate() {
        match event {
            Event::Start(_) => depth += 1,
            Event::End(_) => {
                depth -= 1;
                if depth == 0 {
                    return Some(start + offset);
                }
            }
            _ => {}
        }
    }
    None
}

fn is_text_element(start: &BytesStart<'_>) -> bool {
    matches!(start.name().as_ref(), b"text" | b"tspan")
}

fn is_blank(text: &[u8]) -> bool {
    text.iter().all(u8::is_ascii_whitespace)
}

fn is_blank_text(event: &Event<'_>) -> bool {
    matches!(event, Event::Text(text) if is_blank(text))
}

/// Copy of `start` without attributes whose value is empty. The tag is only
/// rebuilt when something is dropped.
fn without_empty_attributes<'a>(start: &BytesStart<'a>) -> Result<BytesStart<'a>, ImageError> {
    let attributes = start
        .attributes()
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| ImageError::Svg(e.to_string()))?;
    if attributes.iter().all(|a| !a.value.is_empty()) {
        return Ok(start.clone());
    }

    let mut cleaned = start.clone().into_owned();
    cleaned.clear_attributes();
    for attribute in attributes.iter().filter(|a| !a.value.is_empty()) {
        let value: Cow<'_, [u8]> = if attribute.value.contains(&b'"') {
            Cow::Owned(escape_quotes(&attribute.value))
        } else {
            Cow::Borrowed(&attribute.value)
        };
        cleaned.push_attribute(Attribute {
            key: QName(attribute.key.as_ref()),
            value,
        });
    }
    Ok(cleaned)
}

/// Values read from single-quoted attributes are written back double-quoted.
fn escape_quotes(value: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(value.len() + 8);
    for &b in value {
        if b == b'"' {
            out.extend_from_slice(b"&quot;");
        } else {
            out.push(b);
        }
    }
    out
}

/// Image optimization error.
#[derive(Debug)]
pub enum ImageError {
    Png(String),
    Jpeg(String),
    Gif(String),
    Svg(String),
}

impl std::fmt::Display for ImageError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ImageError::Png(msg) => write!(f, "PNG optimization failed: {msg}"),
            ImageError::Jpeg(msg) => write!(f, "JPEG optimization failed: {msg}"),
            ImageError::Gif(msg) => write!(f, "GIF optimization failed: {msg}"),
            ImageError::Svg(msg) => write!(f, "SVG optimization failed: {msg}"),
        }
    }
}

impl std::error::Error for ImageError {}
