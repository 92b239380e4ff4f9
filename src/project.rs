use std::path::{Path, PathBuf};
use uuid::Uuid;

use crate::canvas::{LayerStack, PixelBuffer};
use crate::components::history::{HistoryManager, LayerSnapshotCommand, SnapshotCommand};
use crate::error::Result;
use crate::io;
use crate::ops::dispatch::{self, FilterCommit, FilterKind, FilterOptions};
use crate::settings::Settings;

/// Single open document: a layer stack plus its undo history.
///
/// Every mutating method records its own history entry, so callers only
/// need to act on the return values (redraw, refresh the layer panel).
pub struct Project {
    pub id: Uuid,
    pub stack: LayerStack,
    pub history: HistoryManager,
    /// `None` for unsaved/untitled files.
    pub path: Option<PathBuf>,
    pub is_dirty: bool,

    /// Display name (derived from path or "Untitled-X")
    pub name: String,

    jpeg_quality: u8,
    thumbnail_edge: u32,
}

impl Project {
    pub fn new_untitled(untitled_counter: usize, settings: &Settings) -> Result<Self> {
        let stack = LayerStack::new(
            settings.default_width,
            settings.default_height,
            settings.background_color,
        )?;
        Ok(Self::from_stack(
            format!("Untitled-{}", untitled_counter),
            stack,
            settings,
        ))
    }

    pub fn from_stack(name: String, stack: LayerStack, settings: &Settings) -> Self {
        Self {
            id: Uuid::new_v4(),
            stack,
            history: HistoryManager::with_limits(
                settings.max_undo_steps,
                settings.max_history_bytes(),
            ),
            path: None,
            is_dirty: false,
            name,
            jpeg_quality: settings.jpeg_quality,
            thumbnail_edge: settings.thumbnail_edge,
        }
    }

    /// Open a JSON project or a raster image.
    pub fn open(path: &Path, settings: &Settings) -> Result<Self> {
        let stack = io::load_document(path)?;
        let mut project = Self::from_stack(String::new(), stack, settings);
        project.path = Some(path.to_path_buf());
        project.update_name_from_path();
        Ok(project)
    }

    pub fn mark_dirty(&mut self) {
        self.is_dirty = true;
    }

    pub fn mark_clean(&mut self) {
        self.is_dirty = false;
    }

    pub fn update_name_from_path(&mut self) {
        if let Some(ref path) = self.path {
            self.name = path
                .file_name()
                .map(|s| s.to_string_lossy().to_string())
                .unwrap_or_else(|| "Unknown".to_string());
        }
    }

    /// Get the display title (name with dirty indicator)
    pub fn display_title(&self) -> String {
        if self.is_dirty {
            format!("{}*", self.name)
        } else {
            self.name.clone()
        }
    }

    // ========================================================================
    // EDITING
    // ========================================================================

    /// Run a named filter on the active layer and record it in the history
    /// under the filter's label. Unknown names change nothing.
    pub fn apply_filter(&mut self, name: &str, opts: &FilterOptions) -> Result<Option<FilterCommit>> {
        let kind = match name.parse::<FilterKind>() {
            Ok(kind) => kind,
            Err(e) => {
                log_warn!("Ignoring filter request: {}", e);
                return Ok(None);
            }
        };
        let mut cmd = LayerSnapshotCommand::new(kind.label(), &self.stack);
        let commit = dispatch::apply_filter_kind(&mut self.stack, kind, opts)?;
        cmd.set_after(&self.stack);
        self.history.push(Box::new(cmd));
        self.mark_dirty();
        Ok(Some(commit))
    }

    pub fn merge_down(&mut self, index: usize) -> bool {
        self.structural("Merge Down", |stack| stack.merge_down(index))
    }

    pub fn flatten(&mut self) {
        self.structural("Flatten Image", |stack| {
            stack.flatten();
            true
        });
    }

    pub fn add_layer(&mut self, name: Option<String>) -> usize {
        let mut index = 0;
        self.structural("New Layer", |stack| {
            index = stack.add_layer(name);
            true
        });
        index
    }

    pub fn delete_layer(&mut self, index: usize) -> bool {
        self.structural("Delete Layer", |stack| stack.delete_layer(index))
    }

    pub fn duplicate_layer(&mut self, index: usize) -> Option<usize> {
        let mut result = None;
        self.structural("Duplicate Layer", |stack| {
            result = stack.duplicate_layer(index);
            result.is_some()
        });
        result
    }

    /// Run a stack operation under a whole-stack snapshot. The entry is only
    /// recorded when the operation reports a change.
    fn structural<F>(&mut self, label: &str, op: F) -> bool
    where
        F: FnOnce(&mut LayerStack) -> bool,
    {
        let mut cmd = SnapshotCommand::new(label, &self.stack);
        if !op(&mut self.stack) {
            return false;
        }
        cmd.set_after(&self.stack);
        self.history.push(Box::new(cmd));
        self.mark_dirty();
        true
    }

    pub fn undo(&mut self) -> Option<String> {
        let label = self.history.undo(&mut self.stack)?;
        self.mark_dirty();
        Some(label)
    }

    pub fn redo(&mut self) -> Option<String> {
        let label = self.history.redo(&mut self.stack)?;
        self.mark_dirty();
        Some(label)
    }

    // ========================================================================
    // OUTPUT
    // ========================================================================

    /// Flattened image encoded as `mime` (PNG for unknown types).
    pub fn export(&self, mime: &str) -> Result<Vec<u8>> {
        io::export_flat_image(
            self.stack.layers(),
            self.stack.width(),
            self.stack.height(),
            mime,
            self.jpeg_quality,
        )
    }

    pub fn thumbnail(&self) -> PixelBuffer {
        self.stack.thumbnail(self.thumbnail_edge)
    }

    /// Save as a JSON project and adopt `path` as the document path.
    pub fn save(&mut self, path: &Path) -> Result<()> {
        io::save_project(&self.stack, path)?;
        self.path = Some(path.to_path_buf());
        self.update_name_from_path();
        self.mark_clean();
        Ok(())
    }
}
