/// Compiled pass: replays a pass plan into a command list every frame.

use std::sync::Arc;
use slotmap::SecondaryMap;
use crate::error::{Error, Result};
use crate::graphics_device::{
    CommandList, CpuDescriptorHandle, DescriptorHeapKind, DescriptorRange, GpuDescriptorHandle,
    GpuResource, ResourceBarrier, ResourceView,
};
use super::descriptor_slots::DescriptorBinding;
use super::pass::{DescriptorItem, TableId};
use super::pass_action::PassAction;
use super::plan::{PassPlan, PlannedBarrier};
use super::resource::ResourceKey;

/// Per-frame data passes resolve their handles against
pub(crate) struct FrameView<'a> {
    pub(crate) frame_index: u64,
    pub(crate) resources: &'a SecondaryMap<ResourceKey, Arc<dyn GpuResource>>,
    /// Descriptor ranges of the recording thread, indexed by heap kind
    pub(crate) ranges: &'a [Option<DescriptorRange>; 3],
    pub(crate) names: &'a SecondaryMap<ResourceKey, String>,
}

impl FrameView<'_> {
    fn name_of(&self, key: ResourceKey) -> String {
        self.names
            .get(key)
            .cloned()
            .unwrap_or_else(|| format!("{:?}", key))
    }
}

/// Pass ready for execution
pub(crate) struct CompiledPass {
    plan: PassPlan,
    action: Option<Arc<dyn PassAction>>,
}

impl CompiledPass {
    pub(crate) fn new(plan: PassPlan, action: Option<Arc<dyn PassAction>>) -> Self {
        Self { plan, action }
    }

    pub(crate) fn name(&self) -> &str {
        &self.plan.name
    }

    /// Record the pass: pre-barriers, action inside a debug event, post-barriers
    pub(crate) fn execute(&self, list: &mut dyn CommandList, frame: &FrameView<'_>) -> Result<()> {
        record_barriers(list, &self.plan.pre_barriers, frame)?;

        list.begin_event(&self.plan.name);
        let result = match &self.action {
            Some(action) => {
                let mut ctx = PassContext { list: &mut *list, pass: self, frame };
                action.execute(&mut ctx)
            }
            None => Ok(()),
        };
        list.end_event();
        result?;

        record_barriers(list, &self.plan.post_barriers, frame)
    }
}

fn record_barriers(list: &mut dyn CommandList, planned: &[PlannedBarrier], frame: &FrameView<'_>) -> Result<()> {
    if planned.is_empty() {
        return Ok(());
    }

    let mut barriers = Vec::with_capacity(planned.len());
    for barrier in planned {
        let Some(resource) = frame.resources.get(barrier.resource) else {
            return Err(Error::InvalidResource(format!(
                "'{}' has no native resource in frame {}",
                frame.name_of(barrier.resource),
                frame.frame_index
            )));
        };
        barriers.push(ResourceBarrier {
            resource: resource.as_ref(),
            subresource: barrier.subresource,
            kind: barrier.kind,
            flags: barrier.flags,
        });
    }
    list.resource_barrier(&barriers)
}

/// What a pass action sees while it records
///
/// Every lookup is restricted to what the pass declared: anything else is a
/// `LookupError`.
pub struct PassContext<'a> {
    list: &'a mut dyn CommandList,
    pass: &'a CompiledPass,
    frame: &'a FrameView<'a>,
}

impl<'a> PassContext<'a> {
    /// Command list of the section the pass records into
    pub fn command_list(&mut self) -> &mut dyn CommandList {
        &mut *self.list
    }

    pub fn frame_index(&self) -> u64 {
        self.frame.frame_index
    }

    pub fn pass_name(&self) -> &str {
        self.pass.name()
    }

    /// Native resource behind `key` for the current frame
    pub fn resource(&self, key: ResourceKey) -> Result<&'a Arc<dyn GpuResource>> {
        if self.pass.plan.resources.binary_search(&key).is_err() {
            return Err(self.lookup_error(key));
        }
        self.frame.resources.get(key).ok_or_else(|| self.lookup_error(key))
    }

    /// CPU handle of the descriptor of `key` through `view`
    pub fn cpu_descriptor(&self, key: ResourceKey, view: &ResourceView) -> Result<CpuDescriptorHandle> {
        let binding = self.binding(key, view)?;
        self.frame.ranges[binding.kind.index()]
            .and_then(|range| range.cpu_handle(binding.slot))
            .ok_or_else(|| self.lookup_error(key))
    }

    /// GPU handle of the descriptor of `key` through `view`
    ///
    /// Render target and depth-stencil descriptors have no GPU address.
    pub fn gpu_descriptor(&self, key: ResourceKey, view: &ResourceView) -> Result<GpuDescriptorHandle> {
        let binding = self.binding(key, view)?;
        if !binding.kind.is_shader_visible() {
            return Err(self.lookup_error(key));
        }
        self.frame.ranges[binding.kind.index()]
            .and_then(|range| range.gpu_handle(binding.slot))
            .ok_or_else(|| self.lookup_error(key))
    }

    /// CPU handle of the first descriptor of `table`
    pub fn table_cpu_descriptor(&self, table: TableId) -> Result<CpuDescriptorHandle> {
        let slot = self.table_slot(table)?;
        self.shader_visible_range()
            .and_then(|range| range.cpu_handle(slot))
            .ok_or_else(|| self.table_error(table))
    }

    /// GPU handle of the first descriptor of `table`
    pub fn table_gpu_descriptor(&self, table: TableId) -> Result<GpuDescriptorHandle> {
        let slot = self.table_slot(table)?;
        self.shader_visible_range()
            .and_then(|range| range.gpu_handle(slot))
            .ok_or_else(|| self.table_error(table))
    }

    fn binding(&self, key: ResourceKey, view: &ResourceView) -> Result<DescriptorBinding> {
        let item = DescriptorItem { resource: key, view: *view };
        self.pass
            .plan
            .descriptors
            .get(&item)
            .copied()
            .ok_or_else(|| self.lookup_error(key))
    }

    fn table_slot(&self, table: TableId) -> Result<u32> {
        self.pass
            .plan
            .tables
            .get(&table)
            .map(|binding| binding.slot)
            .ok_or_else(|| self.table_error(table))
    }

    fn shader_visible_range(&self) -> Option<DescriptorRange> {
        self.frame.ranges[DescriptorHeapKind::ShaderResource.index()]
    }

    fn lookup_error(&self, key: ResourceKey) -> Error {
        Error::lookup(self.pass.name(), &self.frame.name_of(key))
    }

    fn table_error(&self, table: TableId) -> Error {
        Error::lookup(self.pass.name(), &format!("table #{}", table.index()))
    }
}

#[cfg(test)]
#[path = "compiled_pass_tests.rs"]
mod tests;
