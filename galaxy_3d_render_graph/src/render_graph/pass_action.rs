/// Pass action trait and implementations.
///
/// Defines what a pass records between its pre-barriers and its
/// post-barriers.

use crate::error::Result;
use super::compiled_pass::PassContext;

/// Action executed by a compiled pass, once per frame
///
/// The same action is shared by the declaration and every compiled copy,
/// and may run on any recording thread.
pub trait PassAction: Send + Sync {
    /// Record commands into `ctx.command_list()`
    fn execute(&self, ctx: &mut PassContext<'_>) -> Result<()>;
}

/// Marker-only pass action (data-driven, no closure)
///
/// Leaves a debug marker in the command list. Used for passes that only
/// exist to move resources into a state (present, readback, hand-off to
/// another queue).
pub struct MarkerAction {
    label: String,
}

impl MarkerAction {
    pub fn new(label: &str) -> Self {
        Self { label: label.to_string() }
    }
}

impl PassAction for MarkerAction {
    fn execute(&self, ctx: &mut PassContext<'_>) -> Result<()> {
        ctx.command_list().set_marker(&self.label);
        Ok(())
    }
}

/// Custom pass action (closure-based)
///
/// Executes a user-provided closure with full access to the pass context.
pub struct CustomAction {
    callback: Box<dyn Fn(&mut PassContext<'_>) -> Result<()> + Send + Sync>,
}

impl CustomAction {
    pub fn new<F>(callback: F) -> Self
    where
        F: Fn(&mut PassContext<'_>) -> Result<()> + Send + Sync + 'static,
    {
        Self { callback: Box::new(callback) }
    }
}

impl PassAction for CustomAction {
    fn execute(&self, ctx: &mut PassContext<'_>) -> Result<()> {
        (self.callback)(ctx)
    }
}
