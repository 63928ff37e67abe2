/// CommandList trait and resource barriers

use std::any::Any;
use crate::error::Result;
use super::{CommandListType, GpuResource, ResourceStates, Subresource};

/// What a barrier synchronizes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BarrierKind {
    /// State transition of one or all subresources
    Transition {
        before: ResourceStates,
        after: ResourceStates,
    },
    /// Ordering between two unordered-access usages, no state change
    Uav,
}

/// Split barrier half (`D3D12_RESOURCE_BARRIER_FLAGS`)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BarrierFlags {
    None,
    BeginOnly,
    EndOnly,
}

/// Barrier on a native resource, resolved for the current frame
#[derive(Debug, Clone, Copy)]
pub struct ResourceBarrier<'a> {
    pub resource: &'a dyn GpuResource,
    pub subresource: Subresource,
    pub kind: BarrierKind,
    pub flags: BarrierFlags,
}

/// Command list for recording GPU commands
///
/// Lists are recorded by the frame scheduler's worker threads and later
/// submitted to the matching `CommandQueue`.
pub trait CommandList: Send + Sync {
    /// Queue family this list records for
    fn list_type(&self) -> CommandListType;

    /// Reset the list so it can record a new frame
    ///
    /// The previous recording must have completed on the GPU.
    fn reset(&mut self) -> Result<()>;

    /// Close the list; no command may be recorded afterwards
    fn close(&mut self) -> Result<()>;

    /// Record a batch of resource barriers
    fn resource_barrier(&mut self, barriers: &[ResourceBarrier<'_>]) -> Result<()>;

    /// Open a named debug region (PIX / RenderDoc)
    fn begin_event(&mut self, name: &str);

    /// Close the innermost debug region
    fn end_event(&mut self);

    /// Insert a named debug marker
    fn set_marker(&mut self, name: &str);

    /// Downcast access to the backend type
    fn as_any(&self) -> &dyn Any;

    /// Mutable downcast access to the backend type
    fn as_any_mut(&mut self) -> &mut dyn Any;
}
