/// Sections: groups of passes recorded into one command list and submitted
/// to one queue.

use std::sync::Arc;
use crate::graphics_device::{CommandListType, Fence};

/// Fence value an external wait targets
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitValue {
    /// Always the same value
    Fixed(u64),
    /// The frame index passed to `CompiledGraph::begin_frame()`
    FrameIndex,
}

impl WaitValue {
    pub fn resolve(&self, frame_index: u64) -> u64 {
        match self {
            WaitValue::Fixed(value) => *value,
            WaitValue::FrameIndex => frame_index,
        }
    }
}

/// GPU-side wait on a fence owned outside the graph
#[derive(Debug, Clone)]
pub struct SectionWait {
    pub fence: Arc<dyn Fence>,
    pub value: WaitValue,
}

/// Section node of a render graph
#[derive(Debug, Clone)]
pub struct SectionDecl {
    pub(crate) name: String,
    pub(crate) list_type: CommandListType,
    /// CPU-side releases needed every frame before recording
    pub(crate) external_dependencies: u32,
    pub(crate) waits: Vec<SectionWait>,
}

impl SectionDecl {
    pub(crate) fn new(name: &str, list_type: CommandListType) -> Self {
        Self {
            name: name.to_string(),
            list_type,
            external_dependencies: 0,
            waits: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn list_type(&self) -> CommandListType {
        self.list_type
    }

    pub fn external_dependencies(&self) -> u32 {
        self.external_dependencies
    }

    pub fn waits(&self) -> &[SectionWait] {
        &self.waits
    }
}
