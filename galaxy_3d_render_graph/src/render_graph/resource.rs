/// Graph resources: external imports and graph-owned (internal) resources.

use std::sync::Arc;
use slotmap::new_key_type;
use crate::error::Result;
use crate::graphics_device::{GpuResource, ResourceDesc, ResourceStates};

// ===== SLOT MAP KEY =====

new_key_type! {
    /// Stable key for a resource declared in a RenderGraph.
    ///
    /// The key identifies the graph node for the whole lifetime of the
    /// graph and of every CompiledGraph built from it; the native handle
    /// behind it may change per frame slot.
    pub struct ResourceKey;
}

// ===== PROVIDERS =====

/// Supplies the native handle of an external resource, once per frame
///
/// Typical use is a swapchain back buffer whose handle rotates every frame.
/// Any `Fn(u64) -> Result<Arc<dyn GpuResource>>` closure is a provider.
pub trait ResourceProvider: Send + Sync {
    /// Native handle to use for `frame_index`
    fn resource(&self, frame_index: u64) -> Result<Arc<dyn GpuResource>>;
}

impl<F> ResourceProvider for F
where
    F: Fn(u64) -> Result<Arc<dyn GpuResource>> + Send + Sync,
{
    fn resource(&self, frame_index: u64) -> Result<Arc<dyn GpuResource>> {
        self(frame_index)
    }
}

// ===== DECLARATIONS =====

/// Where the native handle of an external resource comes from
#[derive(Clone)]
pub enum ExternalSource {
    /// Same handle every frame
    Fixed(Arc<dyn GpuResource>),
    /// Handle queried at the start of every frame
    Provided(Arc<dyn ResourceProvider>),
}

/// Multi-buffering of a graph-owned resource
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FrameBuffering {
    /// One native resource shared by every frame in flight
    Single,
    /// One native resource per frame in flight
    PerFrame,
}

/// Ownership of a graph resource
#[derive(Clone)]
pub enum ResourceKind {
    /// Lifetime and states owned by the caller
    External {
        source: ExternalSource,
        /// State the resource is in when the frame starts (`None`: first usage state)
        initial_state: Option<ResourceStates>,
        /// State the resource must be left in (`None`: left in its last usage state)
        final_state: Option<ResourceStates>,
    },
    /// Allocated through the device by `RenderGraph::compile()`
    Internal {
        /// Creation state (`None`: the state every frame leaves it in, or
        /// the first usage state when subresources end in different states)
        initial_state: Option<ResourceStates>,
        buffering: FrameBuffering,
    },
}

/// Resource node of a render graph
#[derive(Clone)]
pub struct ResourceDecl {
    pub name: String,
    pub desc: ResourceDesc,
    pub kind: ResourceKind,
}

impl ResourceDecl {
    /// Whether the caller owns the resource
    pub fn is_external(&self) -> bool {
        matches!(self.kind, ResourceKind::External { .. })
    }

    /// Declared entry state, if any
    pub fn initial_state(&self) -> Option<ResourceStates> {
        match &self.kind {
            ResourceKind::External { initial_state, .. } => *initial_state,
            ResourceKind::Internal { initial_state, .. } => *initial_state,
        }
    }

    /// Declared exit state, if any (always `None` for internal resources)
    pub fn final_state(&self) -> Option<ResourceStates> {
        match &self.kind {
            ResourceKind::External { final_state, .. } => *final_state,
            ResourceKind::Internal { .. } => None,
        }
    }

    /// Whether every frame in flight shares the same native resource
    pub fn is_single_buffered(&self) -> bool {
        match &self.kind {
            ResourceKind::External { source: ExternalSource::Fixed(_), .. } => true,
            ResourceKind::External { source: ExternalSource::Provided(_), .. } => false,
            ResourceKind::Internal { buffering, .. } => *buffering == FrameBuffering::Single,
        }
    }
}
