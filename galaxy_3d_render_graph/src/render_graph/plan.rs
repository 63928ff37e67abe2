/// Device independent compilation result.
///
/// A `GraphPlan` holds everything `RenderGraph::compile()` derives from a
/// declaration: barrier lists, descriptor slots, section order and
/// synchronization. It is a plain value so two plans of the same graph can
/// be compared.

use std::collections::BTreeMap;
use crate::graphics_device::{BarrierFlags, BarrierKind, CommandListType, DescriptorHeapKind, ResourceStates, Subresource};
use super::descriptor_slots::DescriptorBinding;
use super::pass::{DescriptorItem, PassId, SectionId, TableId};
use super::resource::ResourceKey;

/// Barrier precomputed at compile time, replayed every frame
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PlannedBarrier {
    pub resource: ResourceKey,
    pub subresource: Subresource,
    pub kind: BarrierKind,
    pub flags: BarrierFlags,
}

/// First slot and length of a descriptor table in its thread's shader visible range
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TableBinding {
    pub slot: u32,
    pub len: u32,
}

/// Compiled form of one pass
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PassPlan {
    pub name: String,
    pub section: SectionId,
    /// Descriptor slot space the pass uses
    pub thread: usize,
    pub pre_barriers: Vec<PlannedBarrier>,
    pub post_barriers: Vec<PlannedBarrier>,
    pub descriptors: BTreeMap<DescriptorItem, DescriptorBinding>,
    pub tables: BTreeMap<TableId, TableBinding>,
    /// Every resource the pass declared (sorted)
    pub resources: Vec<ResourceKey>,
}

impl PassPlan {
    pub fn barrier_count(&self) -> usize {
        self.pre_barriers.len() + self.post_barriers.len()
    }
}

/// Compiled form of one section
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SectionPlan {
    pub name: String,
    pub list_type: CommandListType,
    pub thread: usize,
    /// Passes in recording order
    pub passes: Vec<PassId>,
    pub predecessors: Vec<SectionId>,
    pub successors: Vec<SectionId>,
    /// Predecessors on another queue (GPU wait on their fence, same frame)
    pub cross_queue_waits: Vec<SectionId>,
    /// Sections of the previous frame this one must wait for on the GPU
    pub carry_waits: Vec<SectionId>,
    pub external_dependencies: u32,
}

/// Per-resource compilation result
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResourcePlan {
    /// State the resource is in when a frame starts (creation state for internal resources)
    pub entry_state: ResourceStates,
    /// Number of passes using the resource
    pub usage_count: usize,
}

/// Complete compilation result of a render graph
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GraphPlan {
    pub passes: Vec<PassPlan>,
    pub sections: Vec<SectionPlan>,
    /// Topological order of the sections
    pub section_order: Vec<SectionId>,
    pub resources: BTreeMap<ResourceKey, ResourcePlan>,
    /// Per thread, slot count of each heap kind (indexed by `DescriptorHeapKind::index()`)
    pub slot_counts: Vec<[u32; 3]>,
}

impl GraphPlan {
    /// Total number of barriers recorded per frame
    pub fn barrier_count(&self) -> usize {
        self.passes.iter().map(|pass| pass.barrier_count()).sum()
    }

    /// Barriers touching `resource`, in recording order of the passes
    pub fn barriers_of(&self, resource: ResourceKey) -> Vec<(PassId, PlannedBarrier)> {
        let mut barriers = Vec::new();
        for (index, pass) in self.passes.iter().enumerate() {
            for barrier in pass.pre_barriers.iter().chain(pass.post_barriers.iter()) {
                if barrier.resource == resource {
                    barriers.push((PassId(index as u32), *barrier));
                }
            }
        }
        barriers
    }

    /// Slot count of `kind` for `thread`
    pub fn slot_count(&self, thread: usize, kind: DescriptorHeapKind) -> u32 {
        self.slot_counts.get(thread).map(|counts| counts[kind.index()]).unwrap_or(0)
    }
}
