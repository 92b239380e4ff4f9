use std::path::{Path, PathBuf};

use crate::canvas::DEFAULT_THUMBNAIL_EDGE;
use crate::components::history::{DEFAULT_MAX_MEMORY_BYTES, DEFAULT_MAX_STEPS};
use crate::error::Result;

/// User preferences stored as `key=value` lines.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Settings {
    pub max_undo_steps: usize,
    pub max_history_mb: usize,
    pub default_width: u32,
    pub default_height: u32,
    pub background_color: [u8; 4],
    pub jpeg_quality: u8,
    pub thumbnail_edge: u32,
    /// Run filters across all cores. When off, the CLI pins rayon to one
    /// thread.
    pub parallel: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            max_undo_steps: DEFAULT_MAX_STEPS,
            max_history_mb: DEFAULT_MAX_MEMORY_BYTES / (1024 * 1024),
            default_width: 800,
            default_height: 600,
            background_color: [255, 255, 255, 255],
            jpeg_quality: 90,
            thumbnail_edge: DEFAULT_THUMBNAIL_EDGE,
            parallel: true,
        }
    }
}

impl Settings {
    /// Path to the settings file.
    /// On Linux:   ~/.config/pixelstack/pixelstack_settings.cfg  (XDG_CONFIG_HOME respected)
    /// On Windows: %APPDATA%\pixelstack\pixelstack_settings.cfg
    /// On macOS:   ~/Library/Application Support/pixelstack/pixelstack_settings.cfg
    /// Fallback:   same directory as the executable.
    pub fn settings_path() -> Option<PathBuf> {
        #[cfg(target_os = "linux")]
        {
            let config_dir = std::env::var("XDG_CONFIG_HOME")
                .map(PathBuf::from)
                .unwrap_or_else(|_| {
                    let home = std::env::var("HOME").unwrap_or_else(|_| "~".to_string());
                    PathBuf::from(home).join(".config")
                })
                .join("pixelstack");
            return Some(config_dir.join("pixelstack_settings.cfg"));
        }
        #[cfg(target_os = "windows")]
        {
            let appdata = std::env::var("APPDATA")
                .or_else(|_| std::env::var("USERPROFILE"))
                .ok()?;
            return Some(
                PathBuf::from(appdata)
                    .join("pixelstack")
                    .join("pixelstack_settings.cfg"),
            );
        }
        #[cfg(target_os = "macos")]
        {
            let home = std::env::var("HOME").unwrap_or_else(|_| "~".to_string());
            return Some(
                PathBuf::from(home)
                    .join("Library")
                    .join("Application Support")
                    .join("pixelstack")
                    .join("pixelstack_settings.cfg"),
            );
        }
        #[cfg(not(any(target_os = "linux", target_os = "windows", target_os = "macos")))]
        {
            std::env::current_exe()
                .ok()
                .and_then(|p| p.parent().map(|d| d.join("pixelstack_settings.cfg")))
        }
    }

    fn color_to_str(c: [u8; 4]) -> String {
        format!("{},{},{},{}", c[0], c[1], c[2], c[3])
    }

    /// Parse "r,g,b,a"
    fn str_to_color(s: &str) -> Option<[u8; 4]> {
        let parts: Vec<&str> = s.split(',').collect();
        if parts.len() != 4 {
            return None;
        }
        let mut out = [0u8; 4];
        for (slot, part) in out.iter_mut().zip(parts) {
            *slot = part.trim().parse().ok()?;
        }
        Some(out)
    }

    pub fn to_config_string(&self) -> String {
        format!(
            "max_undo_steps={}\n\
             max_history_mb={}\n\
             default_width={}\n\
             default_height={}\n\
             background_color={}\n\
             jpeg_quality={}\n\
             thumbnail_edge={}\n\
             parallel={}\n",
            self.max_undo_steps,
            self.max_history_mb,
            self.default_width,
            self.default_height,
            Self::color_to_str(self.background_color),
            self.jpeg_quality,
            self.thumbnail_edge,
            self.parallel,
        )
    }

    /// Parse a settings file. Unknown keys and malformed values are skipped,
    /// leaving the default for that field.
    pub fn parse(content: &str) -> Self {
        let mut s = Self::default();
        for line in content.lines() {
            let line = line.trim();
            if line.starts_with('#') {
                continue;
            }
            let Some((key, val)) = line.split_once('=') else { continue };
            let val = val.trim();
            match key.trim() {
                "max_undo_steps" => {
                    if let Ok(v) = val.parse::<usize>() {
                        s.max_undo_steps = v.max(1);
                    }
                }
                "max_history_mb" => {
                    if let Ok(v) = val.parse() {
                        s.max_history_mb = v;
                    }
                }
                "default_width" => {
                    if let Ok(v) = val.parse::<u32>()
                        && v > 0
                    {
                        s.default_width = v;
                    }
                }
                "default_height" => {
                    if let Ok(v) = val.parse::<u32>()
                        && v > 0
                    {
                        s.default_height = v;
                    }
                }
                "background_color" => {
                    if let Some(c) = Self::str_to_color(val) {
                        s.background_color = c;
                    }
                }
                "jpeg_quality" => {
                    if let Ok(v) = val.parse::<u8>() {
                        s.jpeg_quality = v.clamp(1, 100);
                    }
                }
                "thumbnail_edge" => {
                    if let Ok(v) = val.parse() {
                        s.thumbnail_edge = v;
                    }
                }
                "parallel" => {
                    s.parallel = val == "true";
                }
                _ => {}
            }
        }
        s
    }

    /// History memory cap in bytes; 0 disables the cap.
    pub fn max_history_bytes(&self) -> Option<usize> {
        (self.max_history_mb > 0).then(|| self.max_history_mb * 1024 * 1024)
    }

    /// Load from the platform settings file (defaults if missing or corrupt).
    pub fn load() -> Self {
        let Some(path) = Self::settings_path() else { return Self::default() };
        Self::load_from(&path)
    }

    pub fn load_from(path: &Path) -> Self {
        match std::fs::read_to_string(path) {
            Ok(content) => Self::parse(&content),
            Err(_) => Self::default(),
        }
    }

    /// Save to the platform settings file.
    pub fn save(&self) -> Result<()> {
        let Some(path) = Self::settings_path() else { return Ok(()) };
        self.save_to(&path)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, self.to_config_string())?;
        Ok(())
    }
}
