/*!
# Galaxy 3D Render Graph

Render graph compiler and runtime for explicit graphics APIs (D3D12 model).

A render graph is declared once as a set of passes and the resources they
touch. Compilation turns it into an immutable plan: resource state barriers
(split where possible), descriptor slots per recording thread, and an ordered
set of sections mapped to command queues. Every frame the compiled graph
replays that plan, recording sections in parallel as soon as their
dependencies are released.

## Architecture

- **graphics_device**: traits the graph consumes (device, queues, fences,
  command lists, resources, descriptor allocator)
- **render_graph::RenderGraph**: declaration builder
- **render_graph::GraphPlan**: device independent compilation result
- **render_graph::CompiledGraph**: per-frame runtime
- **render_graph::FrameScheduler**: dependency counters and worker threads
*/

// Internal modules
mod error;
mod engine;
mod utils;
pub mod log;
pub mod graphics_device;
pub mod render_graph;

// Main galaxy3d namespace module
pub mod galaxy3d {
    // Error types
    pub use crate::error::{Error, Result};

    // Engine facade (logging)
    pub use crate::engine::Engine;

    // Logging sub-module (types only, macros stay at the crate root)
    pub mod log {
        pub use crate::log::{Logger, LogEntry, LogSeverity, DefaultLogger};
    }

    // Device abstraction consumed by the graph
    pub mod device {
        pub use crate::graphics_device::*;
    }

    // Render graph declaration, compilation and execution
    pub mod render {
        pub use crate::render_graph::*;
    }
}
