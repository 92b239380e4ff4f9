use image::RgbaImage;
use uuid::Uuid;

use crate::error::{CoreError, Result};
use crate::ops::compositor;

/// Longest edge of a generated layer-stack thumbnail when the caller does not
/// ask for a specific size.
pub const DEFAULT_THUMBNAIL_EDGE: u32 = 256;

// ============================================================================
// PIXEL BUFFER
// ============================================================================

/// A rectangular grid of straight-alpha RGBA8 samples.
///
/// The backing vector always holds exactly `width * height * 4` bytes in
/// R, G, B, A order. Both sides are strictly positive.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PixelBuffer {
    width: u32,
    height: u32,
    data: Vec<u8>,
}

impl PixelBuffer {
    /// Fully transparent buffer.
    pub fn new(width: u32, height: u32) -> Result<Self> {
        Self::new_filled(width, height, [0, 0, 0, 0])
    }

    pub fn new_filled(width: u32, height: u32, color: [u8; 4]) -> Result<Self> {
        check_dimensions(width, height)?;
        let len = width as usize * height as usize;
        let mut data = Vec::with_capacity(len * 4);
        for _ in 0..len {
            data.extend_from_slice(&color);
        }
        Ok(Self { width, height, data })
    }

    /// Wrap an existing RGBA byte vector.
    pub fn from_raw(width: u32, height: u32, data: Vec<u8>) -> Result<Self> {
        check_dimensions(width, height)?;
        let expected = width as usize * height as usize * 4;
        if data.len() != expected {
            return Err(CoreError::BufferSizeMismatch {
                expected,
                actual: data.len(),
            });
        }
        Ok(Self { width, height, data })
    }

    pub fn from_rgba_image(img: &RgbaImage) -> Result<Self> {
        Self::from_raw(img.width(), img.height(), img.as_raw().clone())
    }

    pub fn to_rgba_image(&self) -> RgbaImage {
        RgbaImage::from_raw(self.width, self.height, self.data.clone())
            .unwrap_or_else(|| RgbaImage::new(self.width, self.height))
    }

    /// Build a buffer with the same dimensions as `self` from freshly computed
    /// data. Callers in this crate always allocate `self.as_raw().len()` bytes.
    pub(crate) fn with_data(&self, data: Vec<u8>) -> Self {
        debug_assert_eq!(data.len(), self.data.len());
        Self {
            width: self.width,
            height: self.height,
            data,
        }
    }

    /// Transparent buffer for dimensions already validated by the caller.
    pub(crate) fn blank(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            data: vec![0u8; width as usize * height as usize * 4],
        }
    }

    #[inline]
    pub fn width(&self) -> u32 {
        self.width
    }

    #[inline]
    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub fn as_raw(&self) -> &[u8] {
        &self.data
    }

    /// In-place access for per-pixel operations that never read neighbours.
    pub(crate) fn as_raw_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }

    pub fn into_raw(self) -> Vec<u8> {
        self.data
    }

    /// Byte offset of pixel `(x, y)`; the coordinates must already be in range.
    #[inline]
    pub fn pixel_index(&self, x: u32, y: u32) -> usize {
        (y as usize * self.width as usize + x as usize) * 4
    }

    /// Read a pixel. Coordinates outside the buffer are clamped to the nearest
    /// edge pixel.
    #[inline]
    pub fn get(&self, x: u32, y: u32) -> [u8; 4] {
        self.sample_clamped(x as i64, y as i64)
    }

    /// Edge-replicating sampler used by every neighbourhood filter.
    #[inline]
    pub fn sample_clamped(&self, x: i64, y: i64) -> [u8; 4] {
        let cx = x.clamp(0, self.width as i64 - 1) as u32;
        let cy = y.clamp(0, self.height as i64 - 1) as u32;
        let i = self.pixel_index(cx, cy);
        [
            self.data[i],
            self.data[i + 1],
            self.data[i + 2],
            self.data[i + 3],
        ]
    }

    /// Write a pixel. Out-of-range writes are ignored.
    pub fn set(&mut self, x: u32, y: u32, px: [u8; 4]) {
        if x >= self.width || y >= self.height {
            return;
        }
        let i = self.pixel_index(x, y);
        self.data[i..i + 4].copy_from_slice(&px);
    }

    pub fn fill(&mut self, color: [u8; 4]) {
        for px in self.data.chunks_exact_mut(4) {
            px.copy_from_slice(&color);
        }
    }

    pub fn memory_bytes(&self) -> usize {
        self.data.len()
    }
}

fn check_dimensions(width: u32, height: u32) -> Result<()> {
    if width == 0 || height == 0 {
        return Err(CoreError::InvalidDimension { width, height });
    }
    Ok(())
}

// ============================================================================
// BLEND MODES
// ============================================================================

/// Per-pixel compositing operator applied when a layer is drawn over the
/// layers beneath it.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
pub enum BlendMode {
    #[default]
    Normal,
    Multiply,
    Screen,
    Overlay,
    Darken,
    Lighten,
    ColorDodge,
    ColorBurn,
    HardLight,
    SoftLight,
    Difference,
    Exclusion,
}

impl BlendMode {
    pub fn all() -> &'static [BlendMode] {
        &[
            BlendMode::Normal,
            BlendMode::Multiply,
            BlendMode::Screen,
            BlendMode::Overlay,
            BlendMode::Darken,
            BlendMode::Lighten,
            BlendMode::ColorDodge,
            BlendMode::ColorBurn,
            BlendMode::HardLight,
            BlendMode::SoftLight,
            BlendMode::Difference,
            BlendMode::Exclusion,
        ]
    }

    /// Stable name used in project files (CSS compositing names).
    pub fn name(&self) -> &'static str {
        match self {
            BlendMode::Normal => "normal",
            BlendMode::Multiply => "multiply",
            BlendMode::Screen => "screen",
            BlendMode::Overlay => "overlay",
            BlendMode::Darken => "darken",
            BlendMode::Lighten => "lighten",
            BlendMode::ColorDodge => "color-dodge",
            BlendMode::ColorBurn => "color-burn",
            BlendMode::HardLight => "hard-light",
            BlendMode::SoftLight => "soft-light",
            BlendMode::Difference => "difference",
            BlendMode::Exclusion => "exclusion",
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            BlendMode::Normal => "Normal",
            BlendMode::Multiply => "Multiply",
            BlendMode::Screen => "Screen",
            BlendMode::Overlay => "Overlay",
            BlendMode::Darken => "Darken",
            BlendMode::Lighten => "Lighten",
            BlendMode::ColorDodge => "Color Dodge",
            BlendMode::ColorBurn => "Color Burn",
            BlendMode::HardLight => "Hard Light",
            BlendMode::SoftLight => "Soft Light",
            BlendMode::Difference => "Difference",
            BlendMode::Exclusion => "Exclusion",
        }
    }

    /// Parse a stored name. Accepts `source-over` for `normal` and ignores
    /// case and `_`/`-` differences.
    pub fn from_name(name: &str) -> Option<Self> {
        let key = name.trim().to_ascii_lowercase().replace('_', "-");
        if key == "source-over" {
            return Some(BlendMode::Normal);
        }
        Self::all().iter().copied().find(|m| m.name() == key)
    }
}

// ============================================================================
// LAYER
// ============================================================================

#[derive(Clone, Debug)]
pub struct Layer {
    pub id: String,
    pub name: String,
    pub pixels: PixelBuffer,
    pub visible: bool,
    /// Percent, 0..=100.
    pub opacity: u8,
    pub blend_mode: BlendMode,
    pub locked: bool,
    pub is_background: bool,
    pub x: i32,
    pub y: i32,
}

impl Layer {
    pub fn new(name: String, width: u32, height: u32, fill_color: [u8; 4]) -> Result<Self> {
        let pixels = PixelBuffer::new_filled(width, height, fill_color)?;
        Ok(Self::from_buffer(name, pixels))
    }

    /// Image-seeded layer with default properties and a fresh id.
    pub fn from_buffer(name: String, pixels: PixelBuffer) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            name,
            pixels,
            visible: true,
            opacity: 100,
            blend_mode: BlendMode::Normal,
            locked: false,
            is_background: false,
            x: 0,
            y: 0,
        }
    }

    pub fn set_opacity(&mut self, opacity: i32) {
        self.opacity = opacity.clamp(0, 100) as u8;
    }

    /// Opacity as a 0..1 multiplier.
    pub fn opacity_factor(&self) -> f32 {
        self.opacity.min(100) as f32 / 100.0
    }

    pub fn width(&self) -> u32 {
        self.pixels.width()
    }

    pub fn height(&self) -> u32 {
        self.pixels.height()
    }
}

// ============================================================================
// LAYER STACK
// ============================================================================

/// Ordered layers of one document, bottom to top, plus the active index that
/// filters target.
///
/// The stack is never empty, the active index is always valid and at most one
/// layer carries the background flag.
#[derive(Clone, Debug)]
pub struct LayerStack {
    width: u32,
    height: u32,
    layers: Vec<Layer>,
    active_layer_index: usize,
}

impl LayerStack {
    /// A new document: one opaque background layer filled with `background`.
    pub fn new(width: u32, height: u32, background: [u8; 4]) -> Result<Self> {
        let mut layer = Layer::new("Background".to_string(), width, height, background)?;
        layer.is_background = true;
        Ok(Self {
            width,
            height,
            layers: vec![layer],
            active_layer_index: 0,
        })
    }

    /// Rebuild a stack from already-constructed layers (project loading,
    /// history restore). The active index is clamped and duplicate
    /// background flags are cleared, keeping the lowest one.
    pub fn from_layers(
        width: u32,
        height: u32,
        mut layers: Vec<Layer>,
        active_layer_index: usize,
    ) -> Result<Self> {
        check_dimensions(width, height)?;
        if layers.is_empty() {
            return Err(CoreError::InvalidProject("layer stack cannot be empty".into()));
        }
        let mut seen_background = false;
        for layer in &mut layers {
            if layer.is_background {
                if seen_background {
                    layer.is_background = false;
                }
                seen_background = true;
            }
            layer.opacity = layer.opacity.min(100);
        }
        let active_layer_index = active_layer_index.min(layers.len() - 1);
        Ok(Self {
            width,
            height,
            layers,
            active_layer_index,
        })
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn len(&self) -> usize {
        self.layers.len()
    }

    /// Always false; kept for API symmetry with `len`.
    pub fn is_empty(&self) -> bool {
        self.layers.is_empty()
    }

    pub fn layers(&self) -> &[Layer] {
        &self.layers
    }

    pub fn layer(&self, index: usize) -> Option<&Layer> {
        self.layers.get(index)
    }

    pub fn layer_mut(&mut self, index: usize) -> Option<&mut Layer> {
        self.layers.get_mut(index)
    }

    pub fn index_of(&self, id: &str) -> Option<usize> {
        self.layers.iter().position(|l| l.id == id)
    }

    pub fn layer_by_id(&self, id: &str) -> Option<&Layer> {
        self.layers.iter().find(|l| l.id == id)
    }

    pub fn active_layer_index(&self) -> usize {
        self.active_layer_index
    }

    pub fn active_layer(&self) -> &Layer {
        &self.layers[self.active_layer_index]
    }

    pub fn active_layer_mut(&mut self) -> &mut Layer {
        &mut self.layers[self.active_layer_index]
    }

    pub fn set_active(&mut self, index: usize) -> Result<()> {
        if index >= self.layers.len() {
            return Err(CoreError::LayerIndexOutOfRange {
                index,
                len: self.layers.len(),
            });
        }
        self.active_layer_index = index;
        Ok(())
    }

    /// Pixel buffer of the layer filters target.
    pub fn active_buffer(&self) -> &PixelBuffer {
        &self.active_layer().pixels
    }

    /// Swap a freshly computed buffer into the active layer. The buffer must
    /// match the layer's dimensions.
    pub fn commit_active_buffer(&mut self, buffer: PixelBuffer) -> Result<()> {
        let layer = self.active_layer_mut();
        if buffer.dimensions() != layer.pixels.dimensions() {
            return Err(CoreError::BufferSizeMismatch {
                expected: layer.pixels.memory_bytes(),
                actual: buffer.memory_bytes(),
            });
        }
        layer.pixels = buffer;
        Ok(())
    }

    /// Add a transparent canvas-sized layer above the active one and make it
    /// active. Returns its index.
    pub fn add_layer(&mut self, name: Option<String>) -> usize {
        let name = name.unwrap_or_else(|| format!("Layer {}", self.layers.len() + 1));
        let layer = Layer::from_buffer(name, PixelBuffer::blank(self.width, self.height));
        self.insert_above_active(layer)
    }

    /// Add an image-seeded layer above the active one and make it active.
    pub fn import_layer(&mut self, name: String, pixels: PixelBuffer) -> usize {
        self.insert_above_active(Layer::from_buffer(name, pixels))
    }

    fn insert_above_active(&mut self, layer: Layer) -> usize {
        let idx = (self.active_layer_index + 1).min(self.layers.len());
        self.layers.insert(idx, layer);
        self.active_layer_index = idx;
        idx
    }

    /// Remove a layer. Blocked (returns `false`) for the sole remaining layer
    /// and for the background layer.
    pub fn delete_layer(&mut self, index: usize) -> bool {
        if self.layers.len() <= 1 || index >= self.layers.len() {
            return false;
        }
        if self.layers[index].is_background {
            return false;
        }
        self.layers.remove(index);
        if self.active_layer_index > index
            || self.active_layer_index >= self.layers.len()
        {
            self.active_layer_index = self.active_layer_index.saturating_sub(1);
        }
        true
    }

    /// Copy a layer directly above itself; the copy becomes active.
    pub fn duplicate_layer(&mut self, index: usize) -> Option<usize> {
        let src = self.layers.get(index)?;
        let mut dup = src.clone();
        dup.id = Uuid::new_v4().to_string();
        dup.name = format!("{} Copy", src.name);
        dup.is_background = false;
        let new_idx = index + 1;
        self.layers.insert(new_idx, dup);
        self.active_layer_index = new_idx;
        Some(new_idx)
    }

    pub fn move_layer_up(&mut self, index: usize) -> bool {
        if index + 1 >= self.layers.len() {
            return false;
        }
        self.swap_layers(index, index + 1);
        true
    }

    pub fn move_layer_down(&mut self, index: usize) -> bool {
        if index == 0 || index >= self.layers.len() {
            return false;
        }
        self.swap_layers(index, index - 1);
        true
    }

    fn swap_layers(&mut self, a: usize, b: usize) {
        self.layers.swap(a, b);
        if self.active_layer_index == a {
            self.active_layer_index = b;
        } else if self.active_layer_index == b {
            self.active_layer_index = a;
        }
    }

    /// Flattened view of every visible layer at canvas size.
    pub fn composite(&self) -> PixelBuffer {
        let mut out = PixelBuffer::blank(self.width, self.height);
        for layer in &self.layers {
            compositor::composite_onto(&mut out, layer);
        }
        out
    }

    /// Blend the layer at `index` into the one directly below it, drop it, and
    /// make the merged layer active. Returns `false` (no-op) for the bottom
    /// layer, an out-of-range index or a locked lower layer.
    pub fn merge_down(&mut self, index: usize) -> bool {
        if index == 0 || index >= self.layers.len() {
            return false;
        }
        if self.layers[index - 1].locked {
            return false;
        }
        let top = self.layers.remove(index);
        let bottom = &mut self.layers[index - 1];
        if top.visible {
            let mut merged = bottom.pixels.clone();
            compositor::blend_buffer_at(
                &mut merged,
                &top.pixels,
                top.x - bottom.x,
                top.y - bottom.y,
                top.blend_mode,
                top.opacity_factor(),
            );
            bottom.pixels = merged;
        }
        self.active_layer_index = index - 1;
        true
    }

    /// Collapse the whole stack into a single background layer.
    pub fn flatten(&mut self) {
        let mut flat = Layer::from_buffer("Flattened".to_string(), self.composite());
        flat.is_background = true;
        self.layers = vec![flat];
        self.active_layer_index = 0;
    }

    /// Downscaled composite whose longest edge is at most `max_edge`.
    pub fn thumbnail(&self, max_edge: u32) -> PixelBuffer {
        let full = self.composite();
        let longest = self.width.max(self.height);
        if max_edge == 0 || longest <= max_edge {
            return full;
        }
        let scale = max_edge as f32 / longest as f32;
        let nw = ((self.width as f32 * scale).round() as u32).max(1);
        let nh = ((self.height as f32 * scale).round() as u32).max(1);
        let resized = image::imageops::resize(
            &full.to_rgba_image(),
            nw,
            nh,
            image::imageops::FilterType::Triangle,
        );
        PixelBuffer::from_rgba_image(&resized).unwrap_or(full)
    }

    pub fn memory_bytes(&self) -> usize {
        self.layers
            .iter()
            .map(|l| l.pixels.memory_bytes() + l.name.len() + l.id.len())
            .sum()
    }
}
