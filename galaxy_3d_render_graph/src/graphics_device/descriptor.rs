/// Descriptor heaps, descriptor handles and the DescriptorAllocator trait

use crate::error::Result;
use super::{GpuResource, ResourceView};

/// Descriptor heap families
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum DescriptorHeapKind {
    /// CBV / SRV / UAV heap, shader visible
    ShaderResource,
    /// RTV heap, CPU only
    RenderTarget,
    /// DSV heap, CPU only
    DepthStencil,
}

impl DescriptorHeapKind {
    /// Every heap kind, in slot-space order
    pub const ALL: [DescriptorHeapKind; 3] = [
        DescriptorHeapKind::ShaderResource,
        DescriptorHeapKind::RenderTarget,
        DescriptorHeapKind::DepthStencil,
    ];

    /// Whether descriptors of this kind have a GPU address
    pub fn is_shader_visible(&self) -> bool {
        matches!(self, DescriptorHeapKind::ShaderResource)
    }

    /// Dense index of the kind (0..3)
    pub fn index(&self) -> usize {
        match self {
            DescriptorHeapKind::ShaderResource => 0,
            DescriptorHeapKind::RenderTarget => 1,
            DescriptorHeapKind::DepthStencil => 2,
        }
    }
}

/// CPU descriptor address
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CpuDescriptorHandle(pub u64);

/// GPU descriptor address
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct GpuDescriptorHandle(pub u64);

/// Contiguous run of descriptors handed out by a `DescriptorAllocator`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DescriptorRange {
    pub kind: DescriptorHeapKind,
    pub cpu_start: CpuDescriptorHandle,
    /// Only set for shader visible heaps
    pub gpu_start: Option<GpuDescriptorHandle>,
    /// Byte distance between two descriptors
    pub increment: u32,
    pub count: u32,
}

impl DescriptorRange {
    /// CPU handle of descriptor `index`, `None` past the end of the range
    pub fn cpu_handle(&self, index: u32) -> Option<CpuDescriptorHandle> {
        (index < self.count)
            .then(|| CpuDescriptorHandle(self.cpu_start.0 + index as u64 * self.increment as u64))
    }

    /// GPU handle of descriptor `index`, `None` for CPU-only heaps or past the end
    pub fn gpu_handle(&self, index: u32) -> Option<GpuDescriptorHandle> {
        let start = self.gpu_start?;
        (index < self.count)
            .then(|| GpuDescriptorHandle(start.0 + index as u64 * self.increment as u64))
    }
}

/// Descriptor heap allocator consumed by the graph compiler
///
/// The graph asks for one range per (recording thread, heap kind) and
/// writes descriptors into it at compile time, then again whenever an
/// external resource changes its native handle.
pub trait DescriptorAllocator: Send {
    /// Reserve `count` contiguous descriptors of `kind`
    fn allocate_range(&mut self, kind: DescriptorHeapKind, count: u32) -> Result<DescriptorRange>;

    /// Give a range back
    fn free_range(&mut self, range: &DescriptorRange);

    /// Create the descriptor for `view` of `resource` at `handle`
    fn write_descriptor(
        &mut self,
        handle: CpuDescriptorHandle,
        resource: &dyn GpuResource,
        view: &ResourceView,
    ) -> Result<()>;
}
