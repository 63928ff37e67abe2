/// Render graph - declarative description of a frame.
///
/// A render graph lists the resources a frame touches, the passes that use
/// them (with the view and the states each pass needs) and the sections
/// passes are recorded into. Nothing is validated while declaring: every
/// structural error is reported by `plan()` / `compile()`.

use std::sync::{Arc, Mutex};
use slotmap::SlotMap;
use crate::engine::Engine;
use crate::error::Result;
use crate::graphics_device::{
    CommandListType, DepthAccess, DescriptorAllocator, Fence, GpuResource, GraphicsDevice,
    ResourceDesc, ResourceStates, ResourceView, ViewDesc,
};
use super::compiled_graph::CompiledGraph;
use super::compiler;
use super::config::GraphConfig;
use super::pass::{
    DescriptorItem, DescriptorTable, PassDecl, PassId, PassStates, ResourceUsage, SectionId, TableId,
};
use super::pass_action::{CustomAction, PassAction};
use super::compiled_pass::PassContext;
use super::plan::GraphPlan;
use super::resource::{ExternalSource, FrameBuffering, ResourceDecl, ResourceKey, ResourceKind, ResourceProvider};
use super::section::{SectionDecl, SectionWait, WaitValue};

/// Render graph declaration
///
/// # Example
///
/// ```no_run
/// use galaxy_3d_render_graph::galaxy3d::render::{RenderGraph, FrameBuffering};
/// use galaxy_3d_render_graph::galaxy3d::device::{Format, ResourceDesc, ViewDesc};
///
/// let mut graph = RenderGraph::new("forward");
/// let color = graph.create_resource(
///     "color",
///     ResourceDesc::texture_2d(1920, 1080, Format::R8G8B8A8_UNORM),
///     None,
///     FrameBuffering::PerFrame,
/// );
/// graph.add_pass("opaque")
///     .render_target(color, ViewDesc::texture_2d())
///     .build();
/// graph.add_pass("tonemap")
///     .shader_resource(color, ViewDesc::texture_2d())
///     .build();
/// ```
pub struct RenderGraph {
    name: String,
    resources: SlotMap<ResourceKey, ResourceDecl>,
    passes: Vec<PassDecl>,
    sections: Vec<SectionDecl>,
    /// Explicit (before, after) section edges
    section_edges: Vec<(SectionId, SectionId)>,
    /// Section ids referenced by a setter before they existed
    unknown_sections: Vec<SectionId>,
    tables: Vec<DescriptorTable>,
}

impl RenderGraph {
    /// Create an empty graph with a single direct section named "main"
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            resources: SlotMap::with_key(),
            passes: Vec::new(),
            sections: vec![SectionDecl::new("main", CommandListType::Direct)],
            section_edges: Vec::new(),
            unknown_sections: Vec::new(),
            tables: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    // ===== RESOURCES =====

    /// Import a caller-owned resource whose handle never changes
    ///
    /// # Arguments
    ///
    /// * `name` - Debug name
    /// * `resource` - Native resource (its descriptor becomes the graph descriptor)
    /// * `initial_state` - State at frame start (`None`: the first usage state)
    /// * `final_state` - State to leave it in at frame end (`None`: last usage state)
    pub fn import_resource(
        &mut self,
        name: &str,
        resource: Arc<dyn GpuResource>,
        initial_state: Option<ResourceStates>,
        final_state: Option<ResourceStates>,
    ) -> ResourceKey {
        let desc = *resource.desc();
        self.resources.insert(ResourceDecl {
            name: name.to_string(),
            desc,
            kind: ResourceKind::External {
                source: ExternalSource::Fixed(resource),
                initial_state,
                final_state,
            },
        })
    }

    /// Import a caller-owned resource whose handle is queried every frame
    ///
    /// Every handle the provider returns must match `desc`.
    pub fn import_provided_resource<P: ResourceProvider + 'static>(
        &mut self,
        name: &str,
        desc: ResourceDesc,
        provider: P,
        initial_state: Option<ResourceStates>,
        final_state: Option<ResourceStates>,
    ) -> ResourceKey {
        self.resources.insert(ResourceDecl {
            name: name.to_string(),
            desc,
            kind: ResourceKind::External {
                source: ExternalSource::Provided(Arc::new(provider)),
                initial_state,
                final_state,
            },
        })
    }

    /// Declare a resource allocated by the graph at compile time
    pub fn create_resource(
        &mut self,
        name: &str,
        desc: ResourceDesc,
        initial_state: Option<ResourceStates>,
        buffering: FrameBuffering,
    ) -> ResourceKey {
        self.resources.insert(ResourceDecl {
            name: name.to_string(),
            desc,
            kind: ResourceKind::Internal { initial_state, buffering },
        })
    }

    /// Declare a descriptor table (shader resource and unordered access views only)
    pub fn create_descriptor_table(&mut self, items: &[(ResourceKey, ResourceView)]) -> TableId {
        let id = TableId(self.tables.len() as u32);
        self.tables.push(DescriptorTable {
            items: items
                .iter()
                .map(|(resource, view)| DescriptorItem { resource: *resource, view: *view })
                .collect(),
        });
        id
    }

    // ===== SECTIONS =====

    /// Section every pass goes to unless told otherwise
    pub fn main_section(&self) -> SectionId {
        SectionId(0)
    }

    /// Add a section recorded into its own command list of `list_type`
    pub fn add_section(&mut self, name: &str, list_type: CommandListType) -> SectionId {
        let id = SectionId(self.sections.len() as u32);
        self.sections.push(SectionDecl::new(name, list_type));
        id
    }

    /// Make `after` wait for `before` every frame
    pub fn add_section_dependency(&mut self, before: SectionId, after: SectionId) {
        self.section_edges.push((before, after));
    }

    /// Number of CPU-side releases `section` needs every frame before recording
    pub fn set_external_dependencies(&mut self, section: SectionId, count: u32) {
        match self.sections.get_mut(section.index()) {
            Some(decl) => decl.external_dependencies = count,
            None => self.unknown_sections.push(section),
        }
    }

    /// Make `section`'s queue wait on a caller-owned fence before executing it
    pub fn add_section_wait(&mut self, section: SectionId, fence: Arc<dyn Fence>, value: WaitValue) {
        match self.sections.get_mut(section.index()) {
            Some(decl) => decl.waits.push(SectionWait { fence, value }),
            None => self.unknown_sections.push(section),
        }
    }

    // ===== PASSES =====

    /// Start declaring a pass (executed in declaration order)
    pub fn add_pass(&mut self, name: &str) -> PassBuilder<'_> {
        let section = self.main_section();
        PassBuilder {
            graph: self,
            decl: PassDecl {
                name: name.to_string(),
                usages: Vec::new(),
                tables: Vec::new(),
                action: None,
                section,
                depends_on: Vec::new(),
            },
        }
    }

    // ===== ACCESSORS =====

    pub fn resource(&self, key: ResourceKey) -> Option<&ResourceDecl> {
        self.resources.get(key)
    }

    pub fn resources(&self) -> impl Iterator<Item = (ResourceKey, &ResourceDecl)> {
        self.resources.iter()
    }

    pub fn pass(&self, id: PassId) -> Option<&PassDecl> {
        self.passes.get(id.index())
    }

    pub fn passes(&self) -> &[PassDecl] {
        &self.passes
    }

    pub fn section(&self, id: SectionId) -> Option<&SectionDecl> {
        self.sections.get(id.index())
    }

    pub fn sections(&self) -> &[SectionDecl] {
        &self.sections
    }

    pub fn table(&self, id: TableId) -> Option<&DescriptorTable> {
        self.tables.get(id.index())
    }

    pub(crate) fn tables(&self) -> &[DescriptorTable] {
        &self.tables
    }

    pub(crate) fn section_edges(&self) -> &[(SectionId, SectionId)] {
        &self.section_edges
    }

    pub(crate) fn unknown_sections(&self) -> &[SectionId] {
        &self.unknown_sections
    }

    // ===== COMPILATION =====

    /// Compute the barrier, descriptor and section plan without touching a device
    ///
    /// # Errors
    ///
    /// - `InitializationFailed` for an invalid configuration
    /// - `DeclarationError` for structural errors (undeclared resource, bad view, ...)
    /// - `DependencyCycle` when sections depend on each other
    pub fn plan(&self, config: &GraphConfig) -> Result<GraphPlan> {
        compiler::build_plan(self, config)
    }

    /// Compile the graph: plan it, allocate internal resources, command lists,
    /// fences and descriptor ranges, and write every descriptor
    ///
    /// # Errors
    ///
    /// Every error of `plan()`, plus device and descriptor allocator errors.
    pub fn compile(
        &self,
        device: &mut dyn GraphicsDevice,
        descriptors: Arc<Mutex<dyn DescriptorAllocator>>,
        config: GraphConfig,
    ) -> Result<CompiledGraph> {
        let plan = self.plan(&config)?;
        CompiledGraph::new(self, plan, device, descriptors, config)
            .map_err(|error| Engine::log_and_return_error("galaxy3d::CompiledGraph", error))
    }
}

/// Builder returned by `RenderGraph::add_pass()`
///
/// Call `build()` to append the pass to the graph.
pub struct PassBuilder<'g> {
    graph: &'g mut RenderGraph,
    decl: PassDecl,
}

impl<'g> PassBuilder<'g> {
    /// Use `resource` through `view` in `states`
    pub fn usage(mut self, resource: ResourceKey, view: ResourceView, states: impl Into<PassStates>) -> Self {
        self.decl.usages.push(ResourceUsage { resource, view, states: states.into() });
        self
    }

    /// Use `resource` without a descriptor (copies, indirect arguments, presentation)
    pub fn state(self, resource: ResourceKey, states: impl Into<PassStates>) -> Self {
        self.usage(resource, ResourceView::None, states)
    }

    /// Read through a shader resource view (pixel + non-pixel shader resource)
    pub fn shader_resource(self, resource: ResourceKey, view: ViewDesc) -> Self {
        let view = ResourceView::ShaderResource(view);
        self.usage(resource, view, view.default_state())
    }

    /// Read / write through an unordered access view
    pub fn unordered_access(self, resource: ResourceKey, view: ViewDesc) -> Self {
        let view = ResourceView::UnorderedAccess(view);
        self.usage(resource, view, view.default_state())
    }

    /// Write through a render target view
    pub fn render_target(self, resource: ResourceKey, view: ViewDesc) -> Self {
        let view = ResourceView::RenderTarget(view);
        self.usage(resource, view, view.default_state())
    }

    /// Use through a depth-stencil view
    pub fn depth_stencil(self, resource: ResourceKey, view: ViewDesc, access: DepthAccess) -> Self {
        let view = ResourceView::DepthStencil(view, access);
        self.usage(resource, view, view.default_state())
    }

    /// Bind a descriptor table (its items are used in their default states)
    pub fn descriptor_table(mut self, table: TableId) -> Self {
        self.decl.tables.push(table);
        self
    }

    /// Record the pass into `section` instead of the main section
    pub fn section(mut self, section: SectionId) -> Self {
        self.decl.section = section;
        self
    }

    /// Require an earlier pass (its section becomes a predecessor)
    pub fn depends_on(mut self, pass: PassId) -> Self {
        self.decl.depends_on.push(pass);
        self
    }

    /// Set the action recorded between the pre and post barriers
    pub fn execute<A: PassAction + 'static>(mut self, action: A) -> Self {
        self.decl.action = Some(Arc::new(action));
        self
    }

    /// Closure shorthand for `execute(CustomAction::new(callback))`
    pub fn execute_fn<F>(self, callback: F) -> Self
    where
        F: Fn(&mut PassContext<'_>) -> Result<()> + Send + Sync + 'static,
    {
        self.execute(CustomAction::new(callback))
    }

    /// Share an action with other passes or graphs
    pub fn execute_shared(mut self, action: Arc<dyn PassAction>) -> Self {
        self.decl.action = Some(action);
        self
    }

    /// Append the pass to the graph
    pub fn build(self) -> PassId {
        let id = PassId(self.graph.passes.len() as u32);
        self.graph.passes.push(self.decl);
        id
    }
}

#[cfg(test)]
#[path = "render_graph_tests.rs"]
mod tests;
