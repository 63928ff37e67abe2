/// Mock graphics device for unit tests (no GPU required)
///
/// Every command, submission, fence operation and descriptor write is
/// appended to a shared journal so tests can assert on the exact stream
/// a compiled graph produces.

use std::any::Any;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use rustc_hash::FxHashMap;
use crate::error::{Error, Result};
use crate::engine_bail;
use crate::graphics_device::{
    BarrierFlags, BarrierKind, CommandList, CommandListType, CommandQueue,
    CpuDescriptorHandle, DescriptorAllocator, DescriptorHeapKind, DescriptorRange,
    Fence, GpuDescriptorHandle, GpuResource, GraphicsDevice, ResourceBarrier,
    ResourceDesc, ResourceStates, ResourceView, Subresource,
};

// ============================================================================
// Journal
// ============================================================================

/// One recorded device operation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MockEvent {
    CreateResource { name: String, state: ResourceStates },
    Reset { list: String },
    Close { list: String },
    Barrier {
        list: String,
        resource: String,
        subresource: Subresource,
        kind: BarrierKind,
        flags: BarrierFlags,
    },
    BeginEvent { list: String, name: String },
    EndEvent { list: String },
    Marker { list: String, name: String },
    Execute { queue: CommandListType, lists: Vec<String> },
    Signal { queue: CommandListType, fence: String, value: u64 },
    Wait { queue: CommandListType, fence: String, value: u64 },
    WriteDescriptor { handle: CpuDescriptorHandle, resource: String, view: ResourceView },
}

/// Shared event journal
pub type Journal = Arc<Mutex<Vec<MockEvent>>>;

fn push(journal: &Journal, event: MockEvent) {
    if let Ok(mut events) = journal.lock() {
        events.push(event);
    }
}

// ============================================================================
// Mock Resource
// ============================================================================

#[derive(Debug)]
pub struct MockResource {
    pub desc: ResourceDesc,
    pub name: String,
}

impl MockResource {
    pub fn new(desc: ResourceDesc, name: &str) -> Self {
        Self { desc, name: name.to_string() }
    }
}

impl GpuResource for MockResource {
    fn desc(&self) -> &ResourceDesc {
        &self.desc
    }

    fn name(&self) -> &str {
        &self.name
    }
}

// ============================================================================
// Mock Fence
// ============================================================================

#[derive(Debug)]
pub struct MockFence {
    pub name: String,
    value: AtomicU64,
}

impl MockFence {
    pub fn new(initial_value: u64, name: &str) -> Self {
        Self {
            name: name.to_string(),
            value: AtomicU64::new(initial_value),
        }
    }
}

impl Fence for MockFence {
    fn name(&self) -> &str {
        &self.name
    }

    fn completed_value(&self) -> u64 {
        self.value.load(Ordering::Acquire)
    }

    fn signal(&self, value: u64) -> Result<()> {
        self.value.fetch_max(value, Ordering::AcqRel);
        Ok(())
    }

    fn wait(&self, value: u64) -> Result<()> {
        // Mock queues complete synchronously: an unreached value would never be reached
        if self.completed_value() < value {
            engine_bail!("galaxy3d::MockFence",
                "Fence '{}' waits for {} but is at {}", self.name, value, self.completed_value());
        }
        Ok(())
    }
}

// ============================================================================
// Mock CommandList
// ============================================================================

#[derive(Debug)]
pub struct MockCommandList {
    pub name: String,
    pub list_type: CommandListType,
    pub recording: bool,
    journal: Journal,
}

impl MockCommandList {
    pub fn new(list_type: CommandListType, name: &str, journal: Journal) -> Self {
        Self {
            name: name.to_string(),
            list_type,
            recording: false,
            journal,
        }
    }

    fn ensure_recording(&self, operation: &str) -> Result<()> {
        if !self.recording {
            engine_bail!("galaxy3d::MockCommandList",
                "'{}' on closed command list '{}'", operation, self.name);
        }
        Ok(())
    }
}

impl CommandList for MockCommandList {
    fn list_type(&self) -> CommandListType {
        self.list_type
    }

    fn reset(&mut self) -> Result<()> {
        self.recording = true;
        push(&self.journal, MockEvent::Reset { list: self.name.clone() });
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        self.ensure_recording("close")?;
        self.recording = false;
        push(&self.journal, MockEvent::Close { list: self.name.clone() });
        Ok(())
    }

    fn resource_barrier(&mut self, barriers: &[ResourceBarrier<'_>]) -> Result<()> {
        self.ensure_recording("resource_barrier")?;
        for barrier in barriers {
            push(&self.journal, MockEvent::Barrier {
                list: self.name.clone(),
                resource: barrier.resource.name().to_string(),
                subresource: barrier.subresource,
                kind: barrier.kind,
                flags: barrier.flags,
            });
        }
        Ok(())
    }

    fn begin_event(&mut self, name: &str) {
        push(&self.journal, MockEvent::BeginEvent { list: self.name.clone(), name: name.to_string() });
    }

    fn end_event(&mut self) {
        push(&self.journal, MockEvent::EndEvent { list: self.name.clone() });
    }

    fn set_marker(&mut self, name: &str) {
        push(&self.journal, MockEvent::Marker { list: self.name.clone(), name: name.to_string() });
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

// ============================================================================
// Mock CommandQueue
// ============================================================================

pub struct MockCommandQueue {
    pub list_type: CommandListType,
    journal: Journal,
}

impl CommandQueue for MockCommandQueue {
    fn list_type(&self) -> CommandListType {
        self.list_type
    }

    fn execute_command_lists(&self, lists: &[&dyn CommandList]) -> Result<()> {
        let mut names = Vec::with_capacity(lists.len());
        for list in lists {
            let Some(mock) = list.as_any().downcast_ref::<MockCommandList>() else {
                engine_bail!("galaxy3d::MockCommandQueue", "Foreign command list submitted");
            };
            if mock.recording {
                engine_bail!("galaxy3d::MockCommandQueue",
                    "Command list '{}' submitted while still recording", mock.name);
            }
            names.push(mock.name.clone());
        }
        push(&self.journal, MockEvent::Execute { queue: self.list_type, lists: names });
        Ok(())
    }

    fn signal(&self, fence: &dyn Fence, value: u64) -> Result<()> {
        push(&self.journal, MockEvent::Signal {
            queue: self.list_type,
            fence: fence.name().to_string(),
            value,
        });
        fence.signal(value)
    }

    fn wait(&self, fence: &dyn Fence, value: u64) -> Result<()> {
        push(&self.journal, MockEvent::Wait {
            queue: self.list_type,
            fence: fence.name().to_string(),
            value,
        });
        Ok(())
    }
}

// ============================================================================
// Mock GraphicsDevice
// ============================================================================

pub struct MockGraphicsDevice {
    pub journal: Journal,
    /// Make every `create_resource` call fail with OutOfMemory
    pub fail_resource_creation: bool,
    pub command_lists_created: usize,
    queues: FxHashMap<CommandListType, Arc<MockCommandQueue>>,
}

impl MockGraphicsDevice {
    pub fn new() -> Self {
        Self {
            journal: Arc::new(Mutex::new(Vec::new())),
            fail_resource_creation: false,
            command_lists_created: 0,
            queues: FxHashMap::default(),
        }
    }

    /// Snapshot of the journal
    pub fn events(&self) -> Vec<MockEvent> {
        self.journal.lock().map(|events| events.clone()).unwrap_or_default()
    }

    /// Drop every recorded event
    pub fn clear_events(&self) {
        if let Ok(mut events) = self.journal.lock() {
            events.clear();
        }
    }
}

impl GraphicsDevice for MockGraphicsDevice {
    fn create_command_list(&mut self, list_type: CommandListType, name: &str) -> Result<Box<dyn CommandList>> {
        self.command_lists_created += 1;
        Ok(Box::new(MockCommandList::new(list_type, name, self.journal.clone())))
    }

    fn create_fence(&mut self, initial_value: u64, name: &str) -> Result<Arc<dyn Fence>> {
        Ok(Arc::new(MockFence::new(initial_value, name)))
    }

    fn command_queue(&mut self, list_type: CommandListType) -> Result<Arc<dyn CommandQueue>> {
        let journal = self.journal.clone();
        let queue = self.queues
            .entry(list_type)
            .or_insert_with(|| Arc::new(MockCommandQueue { list_type, journal }))
            .clone();
        Ok(queue)
    }

    fn create_resource(
        &mut self,
        desc: &ResourceDesc,
        initial_state: ResourceStates,
        name: &str,
    ) -> Result<Arc<dyn GpuResource>> {
        if self.fail_resource_creation {
            return Err(Error::OutOfMemory);
        }
        push(&self.journal, MockEvent::CreateResource { name: name.to_string(), state: initial_state });
        Ok(Arc::new(MockResource::new(*desc, name)))
    }
}

// ============================================================================
// Mock DescriptorAllocator
// ============================================================================

/// Descriptor allocator handing out ranges from three fake heaps
pub struct MockDescriptorAllocator {
    pub journal: Journal,
    pub allocated: Vec<DescriptorRange>,
    pub freed: Vec<DescriptorRange>,
    next: [u64; 3],
}

impl MockDescriptorAllocator {
    pub const INCREMENT: u32 = 32;
    pub const GPU_BASE: u64 = 0x8000_0000;

    pub fn new(journal: Journal) -> Self {
        Self {
            journal,
            allocated: Vec::new(),
            freed: Vec::new(),
            next: [0x1000_0000, 0x2000_0000, 0x3000_0000],
        }
    }
}

impl DescriptorAllocator for MockDescriptorAllocator {
    fn allocate_range(&mut self, kind: DescriptorHeapKind, count: u32) -> Result<DescriptorRange> {
        let cpu_start = self.next[kind.index()];
        self.next[kind.index()] += count as u64 * Self::INCREMENT as u64;
        let gpu_start = kind
            .is_shader_visible()
            .then(|| GpuDescriptorHandle(Self::GPU_BASE + (cpu_start - 0x1000_0000)));
        let range = DescriptorRange {
            kind,
            cpu_start: CpuDescriptorHandle(cpu_start),
            gpu_start,
            increment: Self::INCREMENT,
            count,
        };
        self.allocated.push(range);
        Ok(range)
    }

    fn free_range(&mut self, range: &DescriptorRange) {
        self.freed.push(*range);
    }

    fn write_descriptor(
        &mut self,
        handle: CpuDescriptorHandle,
        resource: &dyn GpuResource,
        view: &ResourceView,
    ) -> Result<()> {
        push(&self.journal, MockEvent::WriteDescriptor {
            handle,
            resource: resource.name().to_string(),
            view: *view,
        });
        Ok(())
    }
}

#[cfg(test)]
#[path = "mock_graphics_device_tests.rs"]
mod tests;
