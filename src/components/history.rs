use std::collections::VecDeque;

use crate::canvas::{BlendMode, LayerStack, PixelBuffer};

// ============================================================================
// COMMAND TRAIT
// ============================================================================

/// Trait for undoable/redoable commands.
pub trait Command: Send + Sync {
    fn undo(&self, stack: &mut LayerStack);
    fn redo(&self, stack: &mut LayerStack);
    fn description(&self) -> String;
    fn memory_size(&self) -> usize;
}

// ============================================================================
// HISTORY MANAGER - Manages undo/redo stacks with memory limits
// ============================================================================

pub const DEFAULT_MAX_STEPS: usize = 50;
pub const DEFAULT_MAX_MEMORY_BYTES: usize = 100 * 1024 * 1024;

/// Undo/redo history manager with count and memory limits.
pub struct HistoryManager {
    undo_stack: VecDeque<Box<dyn Command>>,
    redo_stack: VecDeque<Box<dyn Command>>,
    max_history_size: usize,
    /// Optional memory cap in bytes.
    max_memory_bytes: Option<usize>,
    /// Running memory total across both stacks.
    total_memory: usize,
}

impl Default for HistoryManager {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_STEPS)
    }
}

impl HistoryManager {
    pub fn new(max_history_size: usize) -> Self {
        Self::with_limits(max_history_size, Some(DEFAULT_MAX_MEMORY_BYTES))
    }

    pub fn with_limits(max_history_size: usize, max_memory_bytes: Option<usize>) -> Self {
        Self {
            undo_stack: VecDeque::new(),
            redo_stack: VecDeque::new(),
            max_history_size: max_history_size.max(1),
            max_memory_bytes,
            total_memory: 0,
        }
    }

    pub fn push(&mut self, command: Box<dyn Command>) {
        // A new action invalidates everything that could be redone
        for cmd in self.redo_stack.drain(..) {
            self.total_memory = self.total_memory.saturating_sub(cmd.memory_size());
        }

        self.total_memory += command.memory_size();
        self.undo_stack.push_back(command);
        self.prune();
    }

    pub fn undo(&mut self, stack: &mut LayerStack) -> Option<String> {
        let command = self.undo_stack.pop_back()?;
        let description = command.description();
        command.undo(stack);
        self.redo_stack.push_back(command);
        Some(description)
    }

    pub fn redo(&mut self, stack: &mut LayerStack) -> Option<String> {
        let command = self.redo_stack.pop_back()?;
        let description = command.description();
        command.redo(stack);
        self.undo_stack.push_back(command);
        Some(description)
    }

    pub fn can_undo(&self) -> bool {
        !self.undo_stack.is_empty()
    }

    pub fn can_redo(&self) -> bool {
        !self.redo_stack.is_empty()
    }

    pub fn undo_description(&self) -> Option<String> {
        self.undo_stack.back().map(|c| c.description())
    }

    pub fn redo_description(&self) -> Option<String> {
        self.redo_stack.back().map(|c| c.description())
    }

    /// All undo descriptions, most recent first.
    pub fn undo_history(&self) -> Vec<String> {
        self.undo_stack.iter().rev().map(|c| c.description()).collect()
    }

    pub fn memory_usage(&self) -> usize {
        self.total_memory
    }

    fn prune(&mut self) {
        while self.undo_stack.len() > self.max_history_size {
            if let Some(removed) = self.undo_stack.pop_front() {
                self.total_memory = self.total_memory.saturating_sub(removed.memory_size());
            }
        }

        // The most recent step always survives the memory cap
        if let Some(max_bytes) = self.max_memory_bytes {
            while self.total_memory > max_bytes && self.undo_stack.len() > 1 {
                if let Some(removed) = self.undo_stack.pop_front() {
                    self.total_memory = self.total_memory.saturating_sub(removed.memory_size());
                }
            }
        }
    }

    pub fn clear(&mut self) {
        self.undo_stack.clear();
        self.redo_stack.clear();
        self.total_memory = 0;
    }

    /// Undo `steps` times, stopping early when the history runs out.
    pub fn undo_to(&mut self, steps: usize, stack: &mut LayerStack) {
        for _ in 0..steps {
            if self.undo(stack).is_none() {
                break;
            }
        }
    }

    pub fn undo_count(&self) -> usize {
        self.undo_stack.len()
    }

    pub fn redo_count(&self) -> usize {
        self.redo_stack.len()
    }
}

// ============================================================================
// SNAPSHOT COMMAND - whole-stack undo for structural operations
// ============================================================================

/// Stores the complete layer stack before and after an operation that
/// changes its structure (merge-down, flatten, add/delete, reorder).
pub struct SnapshotCommand {
    description: String,
    before: LayerStack,
    after: Option<LayerStack>,
}

impl SnapshotCommand {
    /// Create a snapshot command. Call BEFORE performing the operation,
    /// then call `set_after()`.
    pub fn new(description: impl Into<String>, stack: &LayerStack) -> Self {
        Self {
            description: description.into(),
            before: stack.clone(),
            after: None,
        }
    }

    pub fn set_after(&mut self, stack: &LayerStack) {
        self.after = Some(stack.clone());
    }
}

impl Command for SnapshotCommand {
    fn undo(&self, stack: &mut LayerStack) {
        *stack = self.before.clone();
    }

    fn redo(&self, stack: &mut LayerStack) {
        if let Some(after) = &self.after {
            *stack = after.clone();
        }
    }

    fn description(&self) -> String {
        self.description.clone()
    }

    fn memory_size(&self) -> usize {
        self.before.memory_bytes() + self.after.as_ref().map_or(0, |a| a.memory_bytes())
    }
}

// ============================================================================
// LAYER SNAPSHOT - single-layer undo for filters
// ============================================================================

/// Captures one layer's pixels, opacity and blend mode before and after an
/// operation. The layer is found by id, so reordering in between is fine.
pub struct LayerSnapshotCommand {
    description: String,
    layer_id: String,
    before: LayerState,
    after: Option<LayerState>,
}

#[derive(Clone)]
struct LayerState {
    pixels: PixelBuffer,
    opacity: u8,
    blend_mode: BlendMode,
}

impl LayerState {
    fn capture(stack: &LayerStack, layer_id: &str) -> Option<Self> {
        stack.layer_by_id(layer_id).map(|l| Self {
            pixels: l.pixels.clone(),
            opacity: l.opacity,
            blend_mode: l.blend_mode,
        })
    }

    fn restore(&self, stack: &mut LayerStack, layer_id: &str) {
        if let Some(idx) = stack.index_of(layer_id)
            && let Some(layer) = stack.layer_mut(idx)
        {
            layer.pixels = self.pixels.clone();
            layer.opacity = self.opacity;
            layer.blend_mode = self.blend_mode;
        }
    }
}

impl LayerSnapshotCommand {
    /// Snapshot the active layer.
    pub fn new(description: impl Into<String>, stack: &LayerStack) -> Self {
        let id = stack.active_layer().id.clone();
        Self::for_layer(description, stack, &id)
    }

    /// Snapshot a specific layer. An unknown id falls back to the active one.
    pub fn for_layer(description: impl Into<String>, stack: &LayerStack, layer_id: &str) -> Self {
        let layer = stack.layer_by_id(layer_id).unwrap_or_else(|| stack.active_layer());
        Self {
            description: description.into(),
            layer_id: layer.id.clone(),
            before: LayerState {
                pixels: layer.pixels.clone(),
                opacity: layer.opacity,
                blend_mode: layer.blend_mode,
            },
            after: None,
        }
    }

    pub fn set_after(&mut self, stack: &LayerStack) {
        self.after = LayerState::capture(stack, &self.layer_id);
    }

    pub fn layer_id(&self) -> &str {
        &self.layer_id
    }
}

impl Command for LayerSnapshotCommand {
    fn undo(&self, stack: &mut LayerStack) {
        self.before.restore(stack, &self.layer_id);
    }

    fn redo(&self, stack: &mut LayerStack) {
        if let Some(after) = &self.after {
            after.restore(stack, &self.layer_id);
        }
    }

    fn description(&self) -> String {
        self.description.clone()
    }

    fn memory_size(&self) -> usize {
        self.before.pixels.memory_bytes()
            + self.after.as_ref().map_or(0, |a| a.pixels.memory_bytes())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fill_active(stack: &mut LayerStack, color: [u8; 4]) {
        stack.active_layer_mut().pixels.fill(color);
    }

    fn record_fill(history: &mut HistoryManager, stack: &mut LayerStack, color: [u8; 4]) {
        let mut cmd = LayerSnapshotCommand::new(format!("Fill {color:?}"), stack);
        fill_active(stack, color);
        cmd.set_after(stack);
        history.push(Box::new(cmd));
    }

    #[test]
    fn layer_snapshot_undo_redo() {
        let mut stack = LayerStack::new(3, 3, [0, 0, 0, 255]).unwrap();
        let mut history = HistoryManager::default();
        record_fill(&mut history, &mut stack, [9, 9, 9, 255]);

        assert_eq!(history.undo(&mut stack).as_deref(), Some("Fill [9, 9, 9, 255]"));
        assert_eq!(stack.active_buffer().get(1, 1), [0, 0, 0, 255]);
        assert!(history.can_redo());
        history.redo(&mut stack);
        assert_eq!(stack.active_buffer().get(1, 1), [9, 9, 9, 255]);
    }

    #[test]
    fn snapshot_restores_structure() {
        let mut stack = LayerStack::new(2, 2, [1, 1, 1, 255]).unwrap();
        stack.add_layer(None);
        stack.add_layer(None);
        let mut history = HistoryManager::default();

        let mut cmd = SnapshotCommand::new("Flatten", &stack);
        stack.flatten();
        cmd.set_after(&stack);
        history.push(Box::new(cmd));
        assert_eq!(stack.len(), 1);

        history.undo(&mut stack);
        assert_eq!(stack.len(), 3);
        assert_eq!(stack.active_layer_index(), 2);
        history.redo(&mut stack);
        assert_eq!(stack.len(), 1);
        assert_eq!(stack.layers()[0].name, "Flattened");
    }

    #[test]
    fn push_clears_redo_and_caps_count() {
        let mut stack = LayerStack::new(2, 2, [0, 0, 0, 255]).unwrap();
        let mut history = HistoryManager::with_limits(3, None);
        for v in 1..=5u8 {
            record_fill(&mut history, &mut stack, [v, v, v, 255]);
        }
        assert_eq!(history.undo_count(), 3);
        assert_eq!(history.undo_history()[0], "Fill [5, 5, 5, 255]");

        history.undo(&mut stack);
        assert_eq!(history.redo_count(), 1);
        record_fill(&mut history, &mut stack, [7, 7, 7, 255]);
        assert_eq!(history.redo_count(), 0);
    }

    #[test]
    fn memory_cap_keeps_latest_step() {
        let mut stack = LayerStack::new(4, 4, [0, 0, 0, 255]).unwrap();
        // each fill stores two 64-byte buffers
        let mut history = HistoryManager::with_limits(100, Some(200));
        for v in 1..=4u8 {
            record_fill(&mut history, &mut stack, [v, 0, 0, 255]);
        }
        assert_eq!(history.undo_count(), 1);
        assert_eq!(history.memory_usage(), 128);
        history.clear();
        assert_eq!(history.memory_usage(), 0);
        assert!(!history.can_undo());
    }

    #[test]
    fn undo_to_stops_at_the_beginning() {
        let mut stack = LayerStack::new(1, 1, [0, 0, 0, 255]).unwrap();
        let mut history = HistoryManager::default();
        record_fill(&mut history, &mut stack, [1, 1, 1, 255]);
        record_fill(&mut history, &mut stack, [2, 2, 2, 255]);
        history.undo_to(10, &mut stack);
        assert_eq!(stack.active_buffer().get(0, 0), [0, 0, 0, 255]);
        assert_eq!(history.redo_count(), 2);
    }
}
