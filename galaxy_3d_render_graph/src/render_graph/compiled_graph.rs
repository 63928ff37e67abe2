/// Compiled render graph - per-frame runtime.
///
/// Owns everything the plan needs on a device: internal resources, one
/// command list per (frame slot, section), one fence per section and one
/// descriptor range per (frame slot, recording thread, heap kind).

use std::collections::BTreeSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use slotmap::SecondaryMap;
use crate::engine::Engine;
use crate::error::{Error, Result};
use crate::graphics_device::{
    CommandList, CommandQueue, DescriptorAllocator, DescriptorHeapKind, DescriptorRange, Fence,
    GpuResource, GraphicsDevice, ResourceDesc, ResourceView,
};
use crate::{engine_debug, engine_info, engine_warn};
use super::compiled_pass::CompiledPass;
use super::config::GraphConfig;
use super::pass::SectionId;
use super::plan::{GraphPlan, SectionPlan};
use super::render_graph::RenderGraph;
use super::resource::{ExternalSource, FrameBuffering, ResourceKey, ResourceKind, ResourceProvider};
use super::scheduler::FrameScheduler;
use super::section::SectionWait;

const SOURCE: &str = "galaxy3d::CompiledGraph";

/// Section with its queue and fence
pub(crate) struct CompiledSection {
    pub(crate) plan: SectionPlan,
    pub(crate) queue: Arc<dyn CommandQueue>,
    pub(crate) fence: Arc<dyn Fence>,
    pub(crate) waits: Vec<SectionWait>,
    /// Last submission value signaled on `fence`
    pub(crate) last_signaled: AtomicU64,
}

/// Everything one frame in flight records with
pub(crate) struct FrameSlot {
    pub(crate) resources: SecondaryMap<ResourceKey, Arc<dyn GpuResource>>,
    /// Per recording thread, one range per heap kind
    pub(crate) descriptor_ranges: Vec<[Option<DescriptorRange>; 3]>,
    /// Per section
    pub(crate) command_lists: Vec<Mutex<Box<dyn CommandList>>>,
    /// Per section, submission value of the last frame recorded from this slot
    pub(crate) submitted: Vec<AtomicU64>,
}

/// Descriptor the graph writes into every frame slot
#[derive(Debug, Clone, Copy)]
struct DescriptorWrite {
    thread: usize,
    kind: DescriptorHeapKind,
    slot: u32,
    resource: ResourceKey,
    view: ResourceView,
}

/// Caller-owned resource queried every frame
struct ProvidedResource {
    key: ResourceKey,
    desc: ResourceDesc,
    provider: Arc<dyn ResourceProvider>,
}

/// Render graph ready to execute
///
/// Built by `RenderGraph::compile()`. Dropping it waits for the GPU and
/// gives the descriptor ranges back.
pub struct CompiledGraph {
    name: String,
    plan: GraphPlan,
    config: GraphConfig,
    pub(crate) passes: Vec<CompiledPass>,
    pub(crate) sections: Vec<CompiledSection>,
    pub(crate) frames: Vec<FrameSlot>,
    pub(crate) resource_names: SecondaryMap<ResourceKey, String>,
    provided: Vec<ProvidedResource>,
    descriptor_writes: Vec<DescriptorWrite>,
    descriptors: Arc<Mutex<dyn DescriptorAllocator>>,
    /// Last submission value handed out (fence values are submission serials)
    serial: u64,
}

impl CompiledGraph {
    pub(crate) fn new(
        graph: &RenderGraph,
        plan: GraphPlan,
        device: &mut dyn GraphicsDevice,
        descriptors: Arc<Mutex<dyn DescriptorAllocator>>,
        config: GraphConfig,
    ) -> Result<Self> {
        let frame_count = config.frames_in_flight as usize;

        // Sections: queue + fence
        let mut sections = Vec::with_capacity(plan.sections.len());
        for (section_plan, decl) in plan.sections.iter().zip(graph.sections()) {
            let queue = device.command_queue(section_plan.list_type)?;
            let fence = device.create_fence(0, &format!("{}::{}", graph.name(), section_plan.name))?;
            sections.push(CompiledSection {
                plan: section_plan.clone(),
                queue,
                fence,
                waits: decl.waits().to_vec(),
                last_signaled: AtomicU64::new(0),
            });
        }

        // Frame slots: resources and command lists
        let mut frames: Vec<FrameSlot> = Vec::with_capacity(frame_count);
        for slot in 0..frame_count {
            let mut command_lists = Vec::with_capacity(sections.len());
            for section in &sections {
                let name = format!("{}::{}#{}", graph.name(), section.plan.name, slot);
                command_lists.push(Mutex::new(device.create_command_list(section.plan.list_type, &name)?));
            }
            frames.push(FrameSlot {
                resources: SecondaryMap::new(),
                descriptor_ranges: Vec::new(),
                command_lists,
                submitted: sections.iter().map(|_| AtomicU64::new(0)).collect(),
            });
        }

        let mut resource_names = SecondaryMap::new();
        let mut provided = Vec::new();
        let mut created = 0usize;
        for (key, decl) in graph.resources() {
            resource_names.insert(key, decl.name.clone());
            let Some(resource_plan) = plan.resources.get(&key) else {
                continue;
            };
            if resource_plan.usage_count == 0 {
                continue;
            }

            match &decl.kind {
                ResourceKind::External { source: ExternalSource::Fixed(resource), .. } => {
                    for frame in &mut frames {
                        frame.resources.insert(key, resource.clone());
                    }
                }
                ResourceKind::External { source: ExternalSource::Provided(provider), .. } => {
                    provided.push(ProvidedResource { key, desc: decl.desc, provider: provider.clone() });
                }
                ResourceKind::Internal { buffering: FrameBuffering::Single, .. } => {
                    let resource = device.create_resource(&decl.desc, resource_plan.entry_state, &decl.name)?;
                    created += 1;
                    for frame in &mut frames {
                        frame.resources.insert(key, resource.clone());
                    }
                }
                ResourceKind::Internal { buffering: FrameBuffering::PerFrame, .. } => {
                    for (slot, frame) in frames.iter_mut().enumerate() {
                        let name = format!("{}#{}", decl.name, slot);
                        frame.resources.insert(key, device.create_resource(&decl.desc, resource_plan.entry_state, &name)?);
                        created += 1;
                    }
                }
            }
        }

        let mut compiled = Self {
            name: graph.name().to_string(),
            passes: plan
                .passes
                .iter()
                .zip(graph.passes())
                .map(|(pass_plan, decl)| CompiledPass::new(pass_plan.clone(), decl.action.clone()))
                .collect(),
            plan,
            config,
            sections,
            frames,
            resource_names,
            provided,
            descriptor_writes: Vec::new(),
            descriptors,
            serial: 0,
        };
        compiled.descriptor_writes = compiled.collect_descriptor_writes(graph);
        compiled.allocate_descriptor_ranges()?;
        for slot in 0..frame_count {
            compiled.write_descriptors(slot, None)?;
        }

        engine_info!(SOURCE, "Graph '{}' compiled: {} frames in flight, {} resources created, {} descriptors per frame",
            compiled.name, frame_count, created, compiled.descriptor_writes.len());
        Ok(compiled)
    }

    // ===== ACCESSORS =====

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Plan the graph was compiled from
    pub fn plan(&self) -> &GraphPlan {
        &self.plan
    }

    pub fn config(&self) -> &GraphConfig {
        &self.config
    }

    /// Native resource behind `key` for `frame_index`'s slot
    ///
    /// Provided resources are only known once a frame using the slot began.
    pub fn resource(&self, key: ResourceKey, frame_index: u64) -> Option<&Arc<dyn GpuResource>> {
        self.frames[self.slot_of(frame_index)].resources.get(key)
    }

    /// Fence signaled by `section` after each submission
    pub fn section_fence(&self, section: SectionId) -> Option<&Arc<dyn Fence>> {
        self.sections.get(section.index()).map(|section| &section.fence)
    }

    /// Last value submitted for `section`'s fence (0 before the first frame)
    pub fn last_signaled_value(&self, section: SectionId) -> u64 {
        self.sections
            .get(section.index())
            .map(|section| section.last_signaled.load(Ordering::Acquire))
            .unwrap_or(0)
    }

    pub(crate) fn slot_of(&self, frame_index: u64) -> usize {
        (frame_index % self.frames.len() as u64) as usize
    }

    // ===== FRAME =====

    /// Start a frame
    ///
    /// Waits for the previous frame recorded from the same slot, refreshes
    /// provided resources (rewriting their descriptors when the handle
    /// changed) and returns the scheduler of the frame.
    ///
    /// # Errors
    ///
    /// - `InvalidResource` when a provider returns a resource whose
    ///   descriptor differs from the declared one
    /// - fence, provider and descriptor allocator errors
    pub fn begin_frame(&mut self, frame_index: u64) -> Result<FrameScheduler<'_>> {
        let slot = self.slot_of(frame_index);
        self.wait_slot(slot).map_err(|error| Engine::log_and_return_error(SOURCE, error))?;
        self.refresh_provided(slot, frame_index)
            .map_err(|error| Engine::log_and_return_error(SOURCE, error))?;

        self.serial += 1;
        let serial = self.serial;
        let carry_values = self
            .sections
            .iter()
            .map(|section| section.last_signaled.load(Ordering::Acquire))
            .collect();
        engine_debug!(SOURCE, "Graph '{}' frame {} begins (slot {}, submission {})",
            self.name, frame_index, slot, serial);

        Ok(FrameScheduler::new(&*self, slot, frame_index, serial, carry_values))
    }

    /// Record and submit a frame of a graph without external dependencies
    ///
    /// # Errors
    ///
    /// `SchedulingError` if a section waits on external dependencies (use
    /// `begin_frame()` and release them), plus every `begin_frame()` and
    /// recording error.
    pub fn execute(&mut self, frame_index: u64) -> Result<()> {
        if let Some(section) = self.sections.iter().find(|section| section.plan.external_dependencies > 0) {
            return Err(Engine::log_and_return_error(SOURCE, Error::SchedulingError(format!(
                "section '{}' has {} external dependencies, use begin_frame() and release()",
                section.plan.name, section.plan.external_dependencies
            ))));
        }
        self.begin_frame(frame_index)?.run()
    }

    /// Block until the last frame recorded from `frame_index`'s slot completed
    pub fn wait_frame(&self, frame_index: u64) -> Result<()> {
        self.wait_slot(self.slot_of(frame_index))
    }

    /// Block until everything submitted so far completed
    pub fn wait_idle(&self) -> Result<()> {
        for section in &self.sections {
            let value = section.last_signaled.load(Ordering::Acquire);
            if value > 0 {
                section.fence.wait(value)?;
            }
        }
        Ok(())
    }

    fn wait_slot(&self, slot: usize) -> Result<()> {
        for (section, submitted) in self.sections.iter().zip(&self.frames[slot].submitted) {
            let value = submitted.load(Ordering::Acquire);
            if value > 0 {
                section.fence.wait(value)?;
            }
        }
        Ok(())
    }

    fn refresh_provided(&mut self, slot: usize, frame_index: u64) -> Result<()> {
        let mut changed = Vec::new();
        for provided in &self.provided {
            let resource = provided.provider.resource(frame_index)?;
            if *resource.desc() != provided.desc {
                return Err(Error::InvalidResource(format!(
                    "'{}' provider returned '{}' whose descriptor {:?} differs from the declared {:?}",
                    self.resource_names.get(provided.key).map(String::as_str).unwrap_or_default(),
                    resource.name(),
                    resource.desc(),
                    provided.desc
                )));
            }

            let frame = &mut self.frames[slot];
            let same = frame
                .resources
                .get(provided.key)
                .is_some_and(|current| same_resource(current, &resource));
            if !same {
                frame.resources.insert(provided.key, resource);
                changed.push(provided.key);
            }
        }

        for key in changed {
            engine_debug!(SOURCE, "Resource '{}' changed handle, rewriting slot {} descriptors",
                self.resource_names.get(key).map(String::as_str).unwrap_or_default(), slot);
            self.write_descriptors(slot, Some(key))?;
        }
        Ok(())
    }

    // ===== DESCRIPTORS =====

    /// Every descriptor of the plan, table items expanded
    fn collect_descriptor_writes(&self, graph: &RenderGraph) -> Vec<DescriptorWrite> {
        let mut singles = BTreeSet::new();
        let mut tables = BTreeSet::new();
        for pass in &self.plan.passes {
            for (item, binding) in &pass.descriptors {
                singles.insert((pass.thread, binding.kind, binding.slot, *item));
            }
            for (table, binding) in &pass.tables {
                tables.insert((pass.thread, binding.slot, *table));
            }
        }

        let mut writes: Vec<DescriptorWrite> = singles
            .into_iter()
            .map(|(thread, kind, slot, item)| DescriptorWrite {
                thread,
                kind,
                slot,
                resource: item.resource,
                view: item.view,
            })
            .collect();
        for (thread, first, table) in tables {
            let Some(table) = graph.table(table) else {
                continue;
            };
            for (offset, item) in table.items.iter().enumerate() {
                writes.push(DescriptorWrite {
                    thread,
                    kind: DescriptorHeapKind::ShaderResource,
                    slot: first + offset as u32,
                    resource: item.resource,
                    view: item.view,
                });
            }
        }
        writes
    }

    fn allocate_descriptor_ranges(&mut self) -> Result<()> {
        let thread_count = self.plan.slot_counts.len();
        let descriptors = self.descriptors.clone();
        let mut allocator = lock(&descriptors)?;
        for frame in &mut self.frames {
            for thread in 0..thread_count {
                let mut ranges = [None; 3];
                for kind in DescriptorHeapKind::ALL {
                    let count = self.plan.slot_count(thread, kind);
                    if count > 0 {
                        ranges[kind.index()] = Some(allocator.allocate_range(kind, count)?);
                    }
                }
                frame.descriptor_ranges.push(ranges);
            }
        }
        Ok(())
    }

    /// Write the descriptors of `slot` (only those of `only` when given)
    ///
    /// Descriptors of resources without a handle yet are skipped.
    fn write_descriptors(&self, slot: usize, only: Option<ResourceKey>) -> Result<()> {
        let frame = &self.frames[slot];
        let mut allocator = lock(&self.descriptors)?;
        for write in &self.descriptor_writes {
            if only.is_some_and(|key| key != write.resource) {
                continue;
            }
            let Some(resource) = frame.resources.get(write.resource) else {
                continue;
            };
            let handle = frame.descriptor_ranges[write.thread][write.kind.index()]
                .and_then(|range| range.cpu_handle(write.slot))
                .ok_or_else(|| Error::BackendError(format!(
                    "descriptor slot {} of {:?} outside the range of thread {}",
                    write.slot, write.kind, write.thread
                )))?;
            allocator.write_descriptor(handle, resource.as_ref(), &write.view)?;
        }
        Ok(())
    }
}

impl Drop for CompiledGraph {
    fn drop(&mut self) {
        if let Err(error) = self.wait_idle() {
            engine_warn!(SOURCE, "Graph '{}' dropped while waiting for the GPU failed: {}", self.name, error);
        }
        if let Ok(mut allocator) = self.descriptors.lock() {
            for range in self.frames.iter().flat_map(|frame| frame.descriptor_ranges.iter().flatten().flatten()) {
                allocator.free_range(range);
            }
        }
    }
}

fn lock(descriptors: &Mutex<dyn DescriptorAllocator>) -> Result<MutexGuard<'_, dyn DescriptorAllocator + 'static>> {
    descriptors
        .lock()
        .map_err(|_| Error::BackendError("descriptor allocator lock poisoned".to_string()))
}

/// Same native object (data pointer comparison, vtables may differ)
fn same_resource(a: &Arc<dyn GpuResource>, b: &Arc<dyn GpuResource>) -> bool {
    std::ptr::eq(Arc::as_ptr(a) as *const (), Arc::as_ptr(b) as *const ())
}

#[cfg(test)]
#[path = "compiled_graph_tests.rs"]
mod tests;
