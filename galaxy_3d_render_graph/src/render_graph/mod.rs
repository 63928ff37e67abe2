/// Render graph module - declaration, compilation and per-frame execution

// Module declarations
pub mod render_graph;
pub mod resource;
pub mod pass;
pub mod section;
pub mod pass_action;
pub mod config;
pub mod plan;
pub mod state_tracker;
pub mod descriptor_slots;
pub mod compiled_pass;
pub mod compiled_graph;
pub mod scheduler;
mod compiler;

// Re-export the public surface
pub use render_graph::{RenderGraph, PassBuilder};
pub use resource::{ResourceKey, ResourceProvider, ResourceDecl, ResourceKind, ExternalSource, FrameBuffering};
pub use pass::{PassId, SectionId, TableId, PassStates, ResourceUsage, DescriptorItem, DescriptorTable, PassDecl};
pub use section::{SectionDecl, SectionWait, WaitValue};
pub use pass_action::{PassAction, MarkerAction, CustomAction};
pub use config::GraphConfig;
pub use plan::{GraphPlan, PassPlan, SectionPlan, ResourcePlan, PlannedBarrier, TableBinding};
pub use state_tracker::{ResourceStateTracker, PassUsage};
pub use descriptor_slots::{DescriptorSlotAssigner, DescriptorBinding};
pub use compiled_pass::PassContext;
pub use compiled_graph::CompiledGraph;
pub use scheduler::{FrameScheduler, SectionState};
