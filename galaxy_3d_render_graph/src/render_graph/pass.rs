/// Pass declarations: resource usages, descriptor tables and identifiers.

use std::sync::Arc;
use crate::graphics_device::{ResourceStates, ResourceView};
use super::pass_action::PassAction;
use super::resource::ResourceKey;

/// Index of a pass in declaration (= execution) order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PassId(pub(crate) u32);

impl PassId {
    pub fn index(&self) -> usize {
        self.0 as usize
    }
}

/// Index of a section
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SectionId(pub(crate) u32);

impl SectionId {
    pub fn index(&self) -> usize {
        self.0 as usize
    }
}

/// Index of a descriptor table declared on the graph
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TableId(pub(crate) u32);

impl TableId {
    pub fn index(&self) -> usize {
        self.0 as usize
    }
}

/// States a pass needs a resource in
///
/// - `beg`: required when the pass starts (transition from the previous pass)
/// - `mid`: state while the callback runs
/// - `end`: state the pass leaves the resource in
///
/// A plain `ResourceStates` converts to a uniform triple.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PassStates {
    pub beg: ResourceStates,
    pub mid: ResourceStates,
    pub end: ResourceStates,
}

impl PassStates {
    /// Same state for the whole pass
    pub fn uniform(states: ResourceStates) -> Self {
        Self { beg: states, mid: states, end: states }
    }

    /// Distinct states before, during and after the callback
    pub fn split(beg: ResourceStates, mid: ResourceStates, end: ResourceStates) -> Self {
        Self { beg, mid, end }
    }

    pub fn is_uniform(&self) -> bool {
        self.beg == self.mid && self.mid == self.end
    }

    /// Whether any of the three states writes
    pub fn is_write(&self) -> bool {
        self.beg.is_write() || self.mid.is_write() || self.end.is_write()
    }
}

impl From<ResourceStates> for PassStates {
    fn from(states: ResourceStates) -> Self {
        Self::uniform(states)
    }
}

/// One declared use of a resource by a pass
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResourceUsage {
    pub resource: ResourceKey,
    pub view: ResourceView,
    pub states: PassStates,
}

/// A (resource, view) pair that needs a descriptor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DescriptorItem {
    pub resource: ResourceKey,
    pub view: ResourceView,
}

/// Ordered run of shader visible descriptors bound as one table
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DescriptorTable {
    pub items: Vec<DescriptorItem>,
}

impl DescriptorTable {
    pub fn len(&self) -> u32 {
        self.items.len() as u32
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

/// Pass node of a render graph (built through `PassBuilder`)
#[derive(Clone)]
pub struct PassDecl {
    pub(crate) name: String,
    pub(crate) usages: Vec<ResourceUsage>,
    pub(crate) tables: Vec<TableId>,
    pub(crate) action: Option<Arc<dyn PassAction>>,
    pub(crate) section: SectionId,
    pub(crate) depends_on: Vec<PassId>,
}

impl PassDecl {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn usages(&self) -> &[ResourceUsage] {
        &self.usages
    }

    pub fn tables(&self) -> &[TableId] {
        &self.tables
    }

    pub fn section(&self) -> SectionId {
        self.section
    }

    pub fn depends_on(&self) -> &[PassId] {
        &self.depends_on
    }

    /// Whether the pass records anything besides its barriers
    pub fn has_action(&self) -> bool {
        self.action.is_some()
    }
}
