#[macro_use]
pub mod logger;
pub mod canvas;
pub mod cli;
pub mod components;
pub mod error;
pub mod io;
pub mod ops;
pub mod project;
pub mod settings;

pub use canvas::{BlendMode, Layer, LayerStack, PixelBuffer};
pub use error::{CoreError, Result};
pub use ops::dispatch::{FilterKind, FilterOptions, apply_filter};
pub use project::Project;
