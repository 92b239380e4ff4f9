use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use image::codecs::bmp::BmpEncoder;
use image::codecs::jpeg::JpegEncoder;
use image::codecs::png::PngEncoder;
use image::codecs::tga::TgaEncoder;
use image::{DynamicImage, RgbaImage};
use serde::{Deserialize, Serialize};

use crate::canvas::{BlendMode, Layer, LayerStack, PixelBuffer};
use crate::error::{CoreError, Result};
use crate::ops::compositor;

/// Current project file version.
pub const PROJECT_VERSION: u32 = 1;
/// Maximum canvas dimension accepted from a project file.
pub const MAX_CANVAS_DIM: u32 = 32_768;
/// Maximum number of layers in a project file.
pub const MAX_LAYERS: usize = 256;

const PNG_DATA_URL_PREFIX: &str = "data:image/png;base64,";

// ============================================================================
// PERSISTED RECORDS
// ============================================================================

/// One layer as stored in a project file. `image_data` is a PNG data URL.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LayerRecord {
    #[serde(default)]
    pub id: String,
    pub name: String,
    pub width: u32,
    pub height: u32,
    #[serde(default = "default_true")]
    pub visible: bool,
    #[serde(default = "default_opacity")]
    pub opacity: i32,
    #[serde(default = "default_blend")]
    pub blend_mode: String,
    #[serde(default)]
    pub locked: bool,
    #[serde(default)]
    pub is_background: bool,
    #[serde(default)]
    pub x: i32,
    #[serde(default)]
    pub y: i32,
    pub image_data: String,
}

fn default_true() -> bool {
    true
}

fn default_opacity() -> i32 {
    100
}

fn default_blend() -> String {
    BlendMode::Normal.name().to_string()
}

/// Top-level project file.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectFile {
    pub version: u32,
    pub width: u32,
    pub height: u32,
    #[serde(default)]
    pub active_layer_index: usize,
    pub layers: Vec<LayerRecord>,
}

// ============================================================================
// DATA URLS
// ============================================================================

pub fn encode_png_data_url(pixels: &PixelBuffer) -> Result<String> {
    let png = encode_image(pixels, ExportFormat::Png, 100)?;
    Ok(format!("{PNG_DATA_URL_PREFIX}{}", STANDARD.encode(png)))
}

/// Decode a `data:<mime>;base64,<payload>` URL (or a bare base64 payload)
/// into pixels. Any raster format the image crate is built with is accepted.
pub fn decode_data_url(url: &str) -> Result<PixelBuffer> {
    let payload = match url.split_once(',') {
        Some((header, data)) if header.starts_with("data:") => {
            if !header.ends_with(";base64") {
                return Err(CoreError::InvalidProject(format!(
                    "image data is not base64 encoded ({header})"
                )));
            }
            data
        }
        _ => url,
    };
    let bytes = STANDARD.decode(payload.trim())?;
    let img = image::load_from_memory(&bytes)?.to_rgba8();
    PixelBuffer::from_rgba_image(&img)
}

pub fn layer_to_record(layer: &Layer) -> Result<LayerRecord> {
    Ok(LayerRecord {
        id: layer.id.clone(),
        name: layer.name.clone(),
        width: layer.width(),
        height: layer.height(),
        visible: layer.visible,
        opacity: layer.opacity as i32,
        blend_mode: layer.blend_mode.name().to_string(),
        locked: layer.locked,
        is_background: layer.is_background,
        x: layer.x,
        y: layer.y,
        image_data: encode_png_data_url(&layer.pixels)?,
    })
}

impl Layer {
    /// Rebuild a layer from its record and already-decoded pixels. Opacity is
    /// clamped; an unknown blend mode falls back to normal.
    pub fn from_record(record: &LayerRecord, pixels: PixelBuffer) -> Result<Self> {
        if pixels.dimensions() != (record.width, record.height) {
            return Err(CoreError::InvalidProject(format!(
                "layer '{}' declares {}x{} but its image is {}x{}",
                record.name,
                record.width,
                record.height,
                pixels.width(),
                pixels.height()
            )));
        }
        let blend_mode = BlendMode::from_name(&record.blend_mode).unwrap_or_else(|| {
            log_warn!(
                "Layer '{}' has unknown blend mode '{}', using normal",
                record.name,
                record.blend_mode
            );
            BlendMode::Normal
        });
        let mut layer = Layer::from_buffer(record.name.clone(), pixels);
        if !record.id.is_empty() {
            layer.id = record.id.clone();
        }
        layer.visible = record.visible;
        layer.set_opacity(record.opacity);
        layer.blend_mode = blend_mode;
        layer.locked = record.locked;
        layer.is_background = record.is_background;
        layer.x = record.x;
        layer.y = record.y;
        Ok(layer)
    }
}

// ============================================================================
// PROJECT FILES
// ============================================================================

pub fn stack_to_project(stack: &LayerStack) -> Result<ProjectFile> {
    let layers = stack
        .layers()
        .iter()
        .map(layer_to_record)
        .collect::<Result<Vec<_>>>()?;
    Ok(ProjectFile {
        version: PROJECT_VERSION,
        width: stack.width(),
        height: stack.height(),
        active_layer_index: stack.active_layer_index(),
        layers,
    })
}

pub fn project_to_stack(project: &ProjectFile) -> Result<LayerStack> {
    if project.version > PROJECT_VERSION {
        return Err(CoreError::InvalidProject(format!(
            "project version {} is newer than supported version {}",
            project.version, PROJECT_VERSION
        )));
    }
    if project.width > MAX_CANVAS_DIM || project.height > MAX_CANVAS_DIM {
        return Err(CoreError::InvalidProject(format!(
            "canvas {}x{} exceeds the {}x{} limit",
            project.width, project.height, MAX_CANVAS_DIM, MAX_CANVAS_DIM
        )));
    }
    if project.layers.len() > MAX_LAYERS {
        return Err(CoreError::InvalidProject(format!(
            "{} layers exceeds the limit of {}",
            project.layers.len(),
            MAX_LAYERS
        )));
    }

    let mut layers = Vec::with_capacity(project.layers.len());
    for record in &project.layers {
        if record.width > MAX_CANVAS_DIM || record.height > MAX_CANVAS_DIM {
            return Err(CoreError::InvalidProject(format!(
                "layer '{}' is {}x{}, above the {}x{} limit",
                record.name, record.width, record.height, MAX_CANVAS_DIM, MAX_CANVAS_DIM
            )));
        }
        let pixels = decode_data_url(&record.image_data)?;
        layers.push(Layer::from_record(record, pixels)?);
    }
    LayerStack::from_layers(
        project.width,
        project.height,
        layers,
        project.active_layer_index,
    )
}

pub fn project_to_json(stack: &LayerStack) -> Result<String> {
    Ok(serde_json::to_string_pretty(&stack_to_project(stack)?)?)
}

pub fn project_from_json(json: &str) -> Result<LayerStack> {
    let project: ProjectFile = serde_json::from_str(json)?;
    project_to_stack(&project)
}

pub fn save_project(stack: &LayerStack, path: &Path) -> Result<()> {
    let project = stack_to_project(stack)?;
    let mut writer = BufWriter::new(File::create(path)?);
    serde_json::to_writer_pretty(&mut writer, &project)?;
    writer.flush()?;
    log_info!("Saved project {} ({} layers)", path.display(), stack.len());
    Ok(())
}

pub fn load_project(path: &Path) -> Result<LayerStack> {
    let reader = BufReader::new(File::open(path)?);
    let project: ProjectFile = serde_json::from_reader(reader)?;
    let stack = project_to_stack(&project)?;
    log_info!("Loaded project {} ({} layers)", path.display(), stack.len());
    Ok(stack)
}

// ============================================================================
// FLAT EXPORT
// ============================================================================

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ExportFormat {
    Png,
    Jpeg,
    Bmp,
    Tga,
}

impl ExportFormat {
    /// Unknown mime types fall back to PNG.
    pub fn from_mime(mime: &str) -> Self {
        match mime.trim().to_ascii_lowercase().as_str() {
            "image/jpeg" | "image/jpg" => ExportFormat::Jpeg,
            "image/bmp" | "image/x-bmp" => ExportFormat::Bmp,
            "image/x-tga" | "image/tga" | "image/x-targa" => ExportFormat::Tga,
            _ => ExportFormat::Png,
        }
    }

    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_ascii_lowercase().as_str() {
            "png" => Some(ExportFormat::Png),
            "jpg" | "jpeg" => Some(ExportFormat::Jpeg),
            "bmp" => Some(ExportFormat::Bmp),
            "tga" => Some(ExportFormat::Tga),
            _ => None,
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            ExportFormat::Png => "png",
            ExportFormat::Jpeg => "jpg",
            ExportFormat::Bmp => "bmp",
            ExportFormat::Tga => "tga",
        }
    }

    pub fn mime(&self) -> &'static str {
        match self {
            ExportFormat::Png => "image/png",
            ExportFormat::Jpeg => "image/jpeg",
            ExportFormat::Bmp => "image/bmp",
            ExportFormat::Tga => "image/x-tga",
        }
    }
}

/// Encode pixels into an in-memory file. JPEG drops alpha; `quality` only
/// applies to JPEG.
pub fn encode_image(pixels: &PixelBuffer, format: ExportFormat, quality: u8) -> Result<Vec<u8>> {
    let mut out = Vec::new();
    let (w, h) = pixels.dimensions();
    match format {
        ExportFormat::Png => {
            let encoder = PngEncoder::new(&mut out);
            #[allow(deprecated)]
            encoder.encode(pixels.as_raw(), w, h, image::ColorType::Rgba8)?;
        }
        ExportFormat::Jpeg => {
            let rgb_image = DynamicImage::ImageRgba8(pixels.to_rgba_image()).to_rgb8();
            let mut encoder = JpegEncoder::new_with_quality(&mut out, quality.clamp(1, 100));
            encoder.encode(rgb_image.as_raw(), w, h, image::ColorType::Rgb8)?;
        }
        ExportFormat::Bmp => {
            let mut encoder = BmpEncoder::new(&mut out);
            encoder.encode(pixels.as_raw(), w, h, image::ColorType::Rgba8)?;
        }
        ExportFormat::Tga => {
            let encoder = TgaEncoder::new(&mut out);
            encoder.encode(pixels.as_raw(), w, h, image::ColorType::Rgba8)?;
        }
    }
    Ok(out)
}

/// Composite `layers` at canvas size and encode the result as `mime`.
pub fn export_flat_image(
    layers: &[Layer],
    width: u32,
    height: u32,
    mime: &str,
    quality: u8,
) -> Result<Vec<u8>> {
    let flat = compositor::composite_layers(layers, width, height)?;
    encode_image(&flat, ExportFormat::from_mime(mime), quality)
}

// ============================================================================
// SYNCHRONOUS LOADER (CLI / headless mode)
// ============================================================================

/// Load a `.json` project, or any raster image as a single background layer
/// named after the file.
pub fn load_document(path: &Path) -> Result<LayerStack> {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_lowercase();
    if ext == "json" {
        return load_project(path);
    }

    let img: RgbaImage = image::open(path)?.to_rgba8();
    let name = path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("Background")
        .to_string();
    let mut layer = Layer::from_buffer(name, PixelBuffer::from_rgba_image(&img)?);
    layer.is_background = true;
    LayerStack::from_layers(img.width(), img.height(), vec![layer], 0)
}

/// Write raw bytes produced by [`encode_image`] or [`export_flat_image`].
pub fn write_bytes(path: &Path, bytes: &[u8]) -> Result<()> {
    let mut writer = BufWriter::new(File::create(path)?);
    writer.write_all(bytes)?;
    writer.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_stack() -> LayerStack {
        let mut stack = LayerStack::new(3, 2, [255, 255, 255, 255]).unwrap();
        stack.add_layer(Some("Ink".into()));
        let top = stack.active_layer_mut();
        top.pixels.set(1, 1, [10, 20, 30, 200]);
        top.opacity = 65;
        top.blend_mode = BlendMode::Multiply;
        top.x = -1;
        top.y = 2;
        top.locked = true;
        stack
    }

    #[test]
    fn data_url_round_trip() {
        let mut buf = PixelBuffer::new(2, 2).unwrap();
        buf.set(0, 1, [1, 2, 3, 4]);
        let url = encode_png_data_url(&buf).unwrap();
        assert!(url.starts_with("data:image/png;base64,"));
        assert_eq!(decode_data_url(&url).unwrap(), buf);
        assert!(decode_data_url("data:image/png,abc").is_err());
    }

    #[test]
    fn project_json_preserves_layers() {
        let stack = sample_stack();
        let json = project_to_json(&stack).unwrap();
        assert!(json.contains("\"blendMode\": \"multiply\""));
        assert!(json.contains("\"isBackground\": true"));
        let back = project_from_json(&json).unwrap();
        assert_eq!(back.len(), 2);
        assert_eq!(back.active_layer_index(), 1);
        for (a, b) in stack.layers().iter().zip(back.layers()) {
            assert_eq!(a.id, b.id);
            assert_eq!(a.name, b.name);
            assert_eq!(a.opacity, b.opacity);
            assert_eq!(a.blend_mode, b.blend_mode);
            assert_eq!((a.x, a.y, a.locked, a.is_background), (b.x, b.y, b.locked, b.is_background));
            assert_eq!(a.pixels, b.pixels);
        }
    }

    #[test]
    fn record_defaults_and_fallbacks() {
        let url = encode_png_data_url(&PixelBuffer::new(1, 1).unwrap()).unwrap();
        let json = format!(
            r#"{{"name":"L","width":1,"height":1,"opacity":250,"blendMode":"luminosity","imageData":"{url}"}}"#
        );
        let record: LayerRecord = serde_json::from_str(&json).unwrap();
        let pixels = decode_data_url(&record.image_data).unwrap();
        let layer = Layer::from_record(&record, pixels).unwrap();
        assert!(layer.visible);
        assert_eq!(layer.opacity, 100);
        assert_eq!(layer.blend_mode, BlendMode::Normal);
        assert!(!layer.id.is_empty());
    }

    #[test]
    fn mismatched_record_size_is_rejected() {
        let stack = sample_stack();
        let mut record = layer_to_record(&stack.layers()[0]).unwrap();
        record.width = 9;
        let pixels = decode_data_url(&record.image_data).unwrap();
        assert!(matches!(
            Layer::from_record(&record, pixels),
            Err(CoreError::InvalidProject(_))
        ));
    }

    #[test]
    fn oversized_projects_are_rejected() {
        let mut project = stack_to_project(&sample_stack()).unwrap();
        project.width = MAX_CANVAS_DIM + 1;
        assert!(project_to_stack(&project).is_err());
        let mut project = stack_to_project(&sample_stack()).unwrap();
        project.layers.clear();
        assert!(project_to_stack(&project).is_err());
    }

    #[test]
    fn oversized_layer_record_is_rejected_before_decoding() {
        let mut project = stack_to_project(&sample_stack()).unwrap();
        project.layers[1].width = MAX_CANVAS_DIM + 1;
        // not valid base64, so only the size check can produce this message
        project.layers[1].image_data = "data:image/png;base64,!!!".into();
        match project_to_stack(&project) {
            Err(CoreError::InvalidProject(msg)) => assert!(msg.contains("limit"), "{msg}"),
            other => panic!("expected InvalidProject, got {other:?}"),
        }
    }

    #[test]
    fn mime_mapping() {
        assert_eq!(ExportFormat::from_mime("image/jpeg"), ExportFormat::Jpeg);
        assert_eq!(ExportFormat::from_mime("image/webp"), ExportFormat::Png);
        assert_eq!(ExportFormat::from_extension("TGA"), Some(ExportFormat::Tga));
        for f in [ExportFormat::Png, ExportFormat::Jpeg, ExportFormat::Bmp, ExportFormat::Tga] {
            assert_eq!(ExportFormat::from_mime(f.mime()), f);
            assert_eq!(ExportFormat::from_extension(f.extension()), Some(f));
        }
    }

    #[test]
    fn flat_export_decodes_to_the_composite() {
        let stack = sample_stack();
        let png = export_flat_image(stack.layers(), 3, 2, "image/png", 90).unwrap();
        let decoded = image::load_from_memory(&png).unwrap().to_rgba8();
        assert_eq!(PixelBuffer::from_rgba_image(&decoded).unwrap(), stack.composite());

        let jpg = export_flat_image(stack.layers(), 3, 2, "image/jpeg", 80).unwrap();
        assert_eq!(&jpg[..2], &[0xFF, 0xD8]);
        let bmp = export_flat_image(stack.layers(), 3, 2, "image/bmp", 80).unwrap();
        assert_eq!(&bmp[..2], b"BM");
    }
}
