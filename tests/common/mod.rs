#![allow(dead_code)]

use pixelstack::{Layer, LayerStack, PixelBuffer};

/// Horizontal red ramp over a vertical green ramp, opaque.
pub fn gradient(width: u32, height: u32) -> PixelBuffer {
    let mut buf = PixelBuffer::new(width, height).unwrap();
    for y in 0..height {
        for x in 0..width {
            buf.set(x, y, [ramp(x, width), ramp(y, height), 64, 255]);
        }
    }
    buf
}

fn ramp(i: u32, n: u32) -> u8 {
    if n <= 1 { 0 } else { (i * 255 / (n - 1)) as u8 }
}

/// Two-colour checkerboard with `cell`-pixel squares.
pub fn checkerboard(width: u32, height: u32, cell: u32, a: [u8; 4], b: [u8; 4]) -> PixelBuffer {
    let mut buf = PixelBuffer::new(width, height).unwrap();
    for y in 0..height {
        for x in 0..width {
            let even = ((x / cell) + (y / cell)) % 2 == 0;
            buf.set(x, y, if even { a } else { b });
        }
    }
    buf
}

pub fn solid(width: u32, height: u32, color: [u8; 4]) -> PixelBuffer {
    PixelBuffer::new_filled(width, height, color).unwrap()
}

/// Opaque background of `bg` with one extra layer per `(color, opacity)`.
pub fn stack_with(bg: [u8; 4], tops: &[([u8; 4], u8)], size: u32) -> LayerStack {
    let mut layers = vec![{
        let mut l = Layer::new("Background".into(), size, size, bg).unwrap();
        l.is_background = true;
        l
    }];
    for (i, (color, opacity)) in tops.iter().enumerate() {
        let mut l = Layer::new(format!("Layer {}", i + 1), size, size, *color).unwrap();
        l.opacity = *opacity;
        layers.push(l);
    }
    let active = layers.len() - 1;
    LayerStack::from_layers(size, size, layers, active).unwrap()
}

pub fn temp_dir(tag: &str) -> std::path::PathBuf {
    let dir = std::env::temp_dir().join(format!("pixelstack-{}-{}", tag, uuid::Uuid::new_v4()));
    std::fs::create_dir_all(&dir).unwrap();
    dir
}
