/// GraphicsDevice, CommandQueue and Fence traits
///
/// The render graph never talks to a native API directly; backends
/// implement these traits and hand them to `RenderGraph::compile()`.

use std::fmt::Debug;
use std::sync::Arc;
use crate::error::Result;
use super::{CommandList, GpuResource, ResourceDesc, ResourceStates};

/// Command list / queue family
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum CommandListType {
    /// Graphics + compute + copy
    Direct,
    /// Compute + copy
    Compute,
    /// Copy only
    Copy,
}

/// Monotonic GPU/CPU synchronization point
pub trait Fence: Send + Sync + Debug {
    /// Debug name
    fn name(&self) -> &str;

    /// Last value reached
    fn completed_value(&self) -> u64;

    /// Set the value from the CPU side
    fn signal(&self, value: u64) -> Result<()>;

    /// Block the calling thread until `value` is reached
    fn wait(&self, value: u64) -> Result<()>;
}

/// Hardware queue accepting closed command lists
pub trait CommandQueue: Send + Sync {
    /// Family of lists this queue executes
    fn list_type(&self) -> CommandListType;

    /// Submit closed command lists, in order
    fn execute_command_lists(&self, lists: &[&dyn CommandList]) -> Result<()>;

    /// Have the GPU set `fence` to `value` once prior submissions complete
    fn signal(&self, fence: &dyn Fence, value: u64) -> Result<()>;

    /// Make later submissions wait (GPU side) until `fence` reaches `value`
    fn wait(&self, fence: &dyn Fence, value: u64) -> Result<()>;
}

/// Device able to create the objects a compiled graph owns
pub trait GraphicsDevice: Send {
    /// Create a command list ready for `reset()`
    fn create_command_list(&mut self, list_type: CommandListType, name: &str) -> Result<Box<dyn CommandList>>;

    /// Create a fence starting at `initial_value`
    fn create_fence(&mut self, initial_value: u64, name: &str) -> Result<Arc<dyn Fence>>;

    /// Queue used for command lists of `list_type`
    fn command_queue(&mut self, list_type: CommandListType) -> Result<Arc<dyn CommandQueue>>;

    /// Create a committed resource in `initial_state`
    fn create_resource(
        &mut self,
        desc: &ResourceDesc,
        initial_state: ResourceStates,
        name: &str,
    ) -> Result<Arc<dyn GpuResource>>;
}
