// ============================================================================
// FILTER DISPATCH
// ============================================================================
//
// Maps a filter name plus loosely typed options onto the pure filter
// functions, then commits the result into the active layer of a stack.
// ============================================================================

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use crate::canvas::{LayerStack, PixelBuffer};
use crate::error::{CoreError, Result};
use crate::ops::{adjustments, convolution, effects, filters};

pub const DEFAULT_BLUR_RADIUS: f32 = 5.0;
pub const DEFAULT_NOISE_AMOUNT: f32 = 25.0;
pub const DEFAULT_MEDIAN_SIZE: u32 = 3;

/// Every filter the dispatcher knows about.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FilterKind {
    GaussianBlur,
    Sharpen,
    Emboss,
    EdgeDetect,
    Grayscale,
    Sepia,
    Invert,
    Vintage,
    BrightnessContrast,
    HueSaturation,
    Noise,
    Median,
    OilPainting,
    Sketch,
    Watercolor,
}

impl FilterKind {
    pub fn all() -> &'static [FilterKind] {
        &[
            FilterKind::GaussianBlur,
            FilterKind::Sharpen,
            FilterKind::Emboss,
            FilterKind::EdgeDetect,
            FilterKind::Grayscale,
            FilterKind::Sepia,
            FilterKind::Invert,
            FilterKind::Vintage,
            FilterKind::BrightnessContrast,
            FilterKind::HueSaturation,
            FilterKind::Noise,
            FilterKind::Median,
            FilterKind::OilPainting,
            FilterKind::Sketch,
            FilterKind::Watercolor,
        ]
    }

    /// Canonical kebab-case name.
    pub fn name(&self) -> &'static str {
        match self {
            FilterKind::GaussianBlur => "gaussian-blur",
            FilterKind::Sharpen => "sharpen",
            FilterKind::Emboss => "emboss",
            FilterKind::EdgeDetect => "edge-detect",
            FilterKind::Grayscale => "grayscale",
            FilterKind::Sepia => "sepia",
            FilterKind::Invert => "invert",
            FilterKind::Vintage => "vintage",
            FilterKind::BrightnessContrast => "brightness-contrast",
            FilterKind::HueSaturation => "hue-saturation",
            FilterKind::Noise => "noise",
            FilterKind::Median => "median",
            FilterKind::OilPainting => "oil-painting",
            FilterKind::Sketch => "sketch",
            FilterKind::Watercolor => "watercolor",
        }
    }

    /// Label recorded in the undo history.
    pub fn label(&self) -> &'static str {
        match self {
            FilterKind::GaussianBlur => "Gaussian Blur",
            FilterKind::Sharpen => "Sharpen",
            FilterKind::Emboss => "Emboss",
            FilterKind::EdgeDetect => "Edge Detect",
            FilterKind::Grayscale => "Grayscale",
            FilterKind::Sepia => "Sepia",
            FilterKind::Invert => "Invert Colors",
            FilterKind::Vintage => "Vintage",
            FilterKind::BrightnessContrast => "Brightness/Contrast",
            FilterKind::HueSaturation => "Hue/Saturation",
            FilterKind::Noise => "Add Noise",
            FilterKind::Median => "Median",
            FilterKind::OilPainting => "Oil Painting",
            FilterKind::Sketch => "Sketch",
            FilterKind::Watercolor => "Watercolor",
        }
    }
}

impl fmt::Display for FilterKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for FilterKind {
    type Err = CoreError;

    /// Accepts kebab, snake and camel spellings (`edge-detect`,
    /// `edge_detect`, `edgeDetect`) plus a few common aliases.
    fn from_str(s: &str) -> Result<Self> {
        let key: String = s
            .trim()
            .chars()
            .filter(|c| !matches!(c, '-' | '_' | ' '))
            .flat_map(char::to_lowercase)
            .collect();
        let kind = match key.as_str() {
            "gaussianblur" | "blur" | "gaussian" => FilterKind::GaussianBlur,
            "sharpen" => FilterKind::Sharpen,
            "emboss" => FilterKind::Emboss,
            "edgedetect" | "edges" | "edge" => FilterKind::EdgeDetect,
            "grayscale" | "greyscale" | "desaturate" => FilterKind::Grayscale,
            "sepia" => FilterKind::Sepia,
            "invert" | "invertcolors" => FilterKind::Invert,
            "vintage" => FilterKind::Vintage,
            "brightnesscontrast" | "brightness" | "contrast" => FilterKind::BrightnessContrast,
            "huesaturation" | "hue" | "saturation" => FilterKind::HueSaturation,
            "noise" | "addnoise" => FilterKind::Noise,
            "median" | "dustscratches" => FilterKind::Median,
            "oilpainting" | "oil" => FilterKind::OilPainting,
            "sketch" | "pencil" => FilterKind::Sketch,
            "watercolor" | "watercolour" => FilterKind::Watercolor,
            _ => return Err(CoreError::UnknownFilter(s.to_string())),
        };
        Ok(kind)
    }
}

// ============================================================================
// OPTIONS
// ============================================================================

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum OptionValue {
    Number(f64),
    Flag(bool),
}

/// String-keyed filter parameters. Getters fall back to the caller's default
/// when a key is missing or has the wrong shape.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct FilterOptions {
    values: HashMap<String, OptionValue>,
}

impl FilterOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_number(mut self, key: &str, value: f64) -> Self {
        self.set(key, OptionValue::Number(value));
        self
    }

    pub fn with_flag(mut self, key: &str, value: bool) -> Self {
        self.set(key, OptionValue::Flag(value));
        self
    }

    pub fn set(&mut self, key: &str, value: OptionValue) {
        self.values.insert(key.to_string(), value);
    }

    pub fn get(&self, key: &str) -> Option<OptionValue> {
        self.values.get(key).copied()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn number(&self, key: &str, default: f64) -> f64 {
        match self.values.get(key) {
            Some(OptionValue::Number(n)) if n.is_finite() => *n,
            Some(OptionValue::Flag(b)) => f64::from(u8::from(*b)),
            _ => default,
        }
    }

    pub fn flag(&self, key: &str, default: bool) -> bool {
        match self.values.get(key) {
            Some(OptionValue::Flag(b)) => *b,
            Some(OptionValue::Number(n)) => *n != 0.0,
            None => default,
        }
    }

    /// Explicit `seed` option, or a fresh one.
    pub fn seed(&self) -> u32 {
        match self.values.get("seed") {
            Some(OptionValue::Number(n)) if n.is_finite() => *n as i64 as u32,
            _ => effects::fresh_seed(),
        }
    }

    fn f32_or(&self, key: &str, default: f32) -> f32 {
        self.number(key, default as f64) as f32
    }

    fn u32_or(&self, key: &str, default: u32) -> u32 {
        let n = self.number(key, default as f64);
        if n <= 0.0 { 0 } else { n.round().min(u32::MAX as f64) as u32 }
    }
}

impl FromStr for FilterOptions {
    type Err = String;

    /// Parse `key=value` pairs separated by commas. Values are numbers or
    /// `true`/`false`; a bare key is a `true` flag.
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let mut opts = FilterOptions::new();
        for pair in s.split(',').map(str::trim).filter(|p| !p.is_empty()) {
            let (key, raw) = match pair.split_once('=') {
                Some((k, v)) => (k.trim(), v.trim()),
                None => (pair, "true"),
            };
            if key.is_empty() {
                return Err(format!("missing option name in '{pair}'"));
            }
            let value = match raw.to_ascii_lowercase().as_str() {
                "true" | "yes" | "on" => OptionValue::Flag(true),
                "false" | "no" | "off" => OptionValue::Flag(false),
                _ => OptionValue::Number(
                    raw.parse::<f64>()
                        .map_err(|_| format!("option '{key}' has non-numeric value '{raw}'"))?,
                ),
            };
            opts.set(key, value);
        }
        Ok(opts)
    }
}

// ============================================================================
// DISPATCH
// ============================================================================

/// What a successful [`apply_filter`] changed. The caller records history
/// and redraws from this.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FilterCommit {
    pub layer_id: String,
    pub layer_index: usize,
    pub kind: FilterKind,
    pub label: String,
}

/// Run one filter on a buffer. Pure: the input is never modified.
pub fn run_filter(src: &PixelBuffer, kind: FilterKind, opts: &FilterOptions) -> PixelBuffer {
    match kind {
        FilterKind::GaussianBlur => {
            // `blur` wins over the older `radius` key.
            let radius = opts.number("radius", DEFAULT_BLUR_RADIUS as f64);
            filters::gaussian_blur(src, opts.number("blur", radius) as f32)
        }
        FilterKind::Sharpen => convolution::sharpen(src),
        FilterKind::Emboss => convolution::emboss(src),
        FilterKind::EdgeDetect => convolution::edge_detect(src),
        FilterKind::Grayscale => adjustments::grayscale(src),
        FilterKind::Sepia => adjustments::sepia(src),
        FilterKind::Invert => adjustments::invert(src),
        FilterKind::Vintage => adjustments::vintage(src, opts.seed()),
        FilterKind::BrightnessContrast => adjustments::brightness_contrast(
            src,
            opts.f32_or("brightness", 0.0),
            opts.f32_or("contrast", 0.0),
        ),
        FilterKind::HueSaturation => adjustments::hue_saturation(
            src,
            opts.f32_or("hue", 0.0),
            opts.f32_or("saturation", 0.0),
        ),
        FilterKind::Noise => effects::add_noise(
            src,
            opts.f32_or("amount", DEFAULT_NOISE_AMOUNT),
            opts.flag("uniform", false),
            opts.seed(),
        ),
        FilterKind::Median => effects::median(src, opts.u32_or("size", DEFAULT_MEDIAN_SIZE)),
        FilterKind::OilPainting => effects::oil_painting(
            src,
            opts.u32_or("radius", effects::DEFAULT_OIL_RADIUS),
            opts.u32_or("levels", effects::DEFAULT_OIL_LEVELS),
        ),
        FilterKind::Sketch => effects::sketch(src),
        FilterKind::Watercolor => filters::watercolor(src),
    }
}

/// Apply a filter by name to the active layer. Unknown names are logged and
/// ignored (`Ok(None)`); a locked active layer is an error.
pub fn apply_filter(
    stack: &mut LayerStack,
    name: &str,
    opts: &FilterOptions,
) -> Result<Option<FilterCommit>> {
    match name.parse::<FilterKind>() {
        Ok(kind) => apply_filter_kind(stack, kind, opts).map(Some),
        Err(e) => {
            log_warn!("Ignoring filter request: {}", e);
            Ok(None)
        }
    }
}

pub fn apply_filter_kind(
    stack: &mut LayerStack,
    kind: FilterKind,
    opts: &FilterOptions,
) -> Result<FilterCommit> {
    let layer = stack.active_layer();
    if layer.locked {
        return Err(CoreError::LayerLocked(layer.name.clone()));
    }
    let layer_id = layer.id.clone();
    let layer_index = stack.active_layer_index();

    let result = run_filter(stack.active_buffer(), kind, opts);
    stack.commit_active_buffer(result)?;
    log_info!("Applied {} to layer {}", kind.label(), layer_index);

    Ok(FilterCommit {
        layer_id,
        layer_index,
        kind,
        label: kind.label().to_string(),
    })
}
