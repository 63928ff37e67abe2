/// Graphics device module - traits and types the render graph consumes

// Module declarations
pub mod graphics_device;
pub mod command_list;
pub mod resource;
pub mod view;
pub mod descriptor;

// Re-export everything from graphics_device.rs
pub use graphics_device::*;

// Re-export from other modules
pub use command_list::*;
pub use resource::*;
pub use view::*;
pub use descriptor::*;

// Mock graphics device for tests (no GPU required)
#[cfg(test)]
pub mod mock_graphics_device;
