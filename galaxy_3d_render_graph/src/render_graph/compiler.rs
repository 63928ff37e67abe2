/// Graph compiler: turns a `RenderGraph` declaration into a `GraphPlan`.
///
/// Steps, all on plain data:
/// 1. validate sections, passes, views and states
/// 2. feed every usage into one `ResourceStateTracker` per resource
/// 3. walk each resource's usages in pass order to place barriers and
///    derive section dependencies
/// 4. assign descriptor slots per recording thread
/// 5. order sections topologically

use std::collections::{BTreeMap, BTreeSet};
use crate::engine::Engine;
use crate::error::{Error, Result};
use crate::graphics_device::{BarrierFlags, BarrierKind, DescriptorHeapKind, ResourceStates, ResourceView, Subresource};
use crate::{engine_debug, engine_info, engine_trace, engine_warn};
use super::config::GraphConfig;
use super::descriptor_slots::DescriptorSlotAssigner;
use super::pass::{DescriptorItem, PassId, PassStates, SectionId};
use super::plan::{GraphPlan, PassPlan, PlannedBarrier, ResourcePlan, SectionPlan, TableBinding};
use super::render_graph::RenderGraph;
use super::resource::{ResourceDecl, ResourceKey, ResourceKind};
use super::state_tracker::ResourceStateTracker;

const SOURCE: &str = "galaxy3d::GraphCompiler";

// Barrier lists of a pass, in recording order
const PRE_INTER: usize = 0;
const PRE_INTRA: usize = 1;
const POST_INTRA: usize = 2;
const POST_INTER: usize = 3;

type BarrierLists = [Vec<PlannedBarrier>; 4];

/// Compile `graph` into a plan (errors are logged)
pub(crate) fn build_plan(graph: &RenderGraph, config: &GraphConfig) -> Result<GraphPlan> {
    build(graph, config).map_err(|error| Engine::log_and_return_error(SOURCE, error))
}

fn build(graph: &RenderGraph, config: &GraphConfig) -> Result<GraphPlan> {
    config.validate()?;
    validate_sections(graph)?;
    let trackers = collect_usages(graph, config)?;

    let thread_count = config.thread_count as usize;
    let pass_sections: Vec<usize> = graph.passes().iter().map(|pass| pass.section().index()).collect();

    // Position of every pass inside its section
    let mut section_passes: Vec<Vec<PassId>> = vec![Vec::new(); graph.sections().len()];
    let mut positions = Vec::with_capacity(pass_sections.len());
    for (index, section) in pass_sections.iter().enumerate() {
        positions.push(section_passes[*section].len());
        section_passes[*section].push(PassId(index as u32));
    }

    // Explicit section edges and pass dependencies
    let mut edges: BTreeSet<(usize, usize)> = graph
        .section_edges()
        .iter()
        .map(|(before, after)| (before.index(), after.index()))
        .collect();
    for (index, pass) in graph.passes().iter().enumerate() {
        for dependency in pass.depends_on() {
            let before = pass_sections[dependency.index()];
            if before != pass_sections[index] {
                edges.insert((before, pass_sections[index]));
            }
        }
    }

    // Barriers and derived dependencies, resource by resource
    let walk = ResourceWalk {
        config,
        pass_sections: &pass_sections,
        positions: &positions,
    };
    let mut lists: Vec<BarrierLists> = vec![BarrierLists::default(); pass_sections.len()];
    let mut resources = BTreeMap::new();
    let mut carry: Vec<BTreeSet<usize>> = vec![BTreeSet::new(); graph.sections().len()];

    for (key, decl) in graph.resources() {
        let Some(tracker) = trackers.get(&key) else {
            engine_warn!(SOURCE, "Resource '{}' of graph '{}' is never used", decl.name, graph.name());
            resources.insert(key, ResourcePlan {
                entry_state: decl.initial_state().unwrap_or(ResourceStates::COMMON),
                usage_count: 0,
            });
            continue;
        };

        let outcome = walk.run(key, decl, tracker, &mut lists, &mut edges);
        engine_debug!(SOURCE, "Resource '{}': {} usages, {} barriers, entry state {:?}",
            decl.name, outcome.plan.usage_count, outcome.barrier_count, outcome.plan.entry_state);
        resources.insert(key, outcome.plan);

        // The first user must not overlap the previous frame's users on other queues
        if let (true, Some((first, others))) = (decl.is_single_buffered(), outcome.sections.split_first()) {
            for user in others {
                if graph.sections()[*user].list_type() != graph.sections()[*first].list_type() {
                    carry[*first].insert(*user);
                }
            }
        }
    }

    // Descriptor slots
    let mut assigner = DescriptorSlotAssigner::new();
    let mut passes = Vec::with_capacity(pass_sections.len());
    for ((index, decl), barrier_lists) in graph.passes().iter().enumerate().zip(lists) {
        let thread = pass_sections[index] % thread_count;
        let mut descriptors = BTreeMap::new();
        let mut tables = BTreeMap::new();
        let mut declared = BTreeSet::new();

        for usage in decl.usages() {
            declared.insert(usage.resource);
            let item = DescriptorItem { resource: usage.resource, view: usage.view };
            if let Some(binding) = assigner.allocate_descriptor_slot(thread, item) {
                descriptors.insert(item, binding);
            }
        }
        for table_id in decl.tables() {
            let table = &graph.tables()[table_id.index()];
            declared.extend(table.items.iter().map(|item| item.resource));
            let slot = assigner.allocate_descriptor_range_slot(thread, *table_id, table.len());
            tables.insert(*table_id, TableBinding { slot, len: table.len() });
        }

        let [pre_inter, pre_intra, post_intra, post_inter] = barrier_lists;
        passes.push(PassPlan {
            name: decl.name().to_string(),
            section: decl.section(),
            thread,
            pre_barriers: pre_inter.into_iter().chain(pre_intra).collect(),
            post_barriers: post_intra.into_iter().chain(post_inter).collect(),
            descriptors,
            tables,
            resources: declared.into_iter().collect(),
        });
    }
    let slot_counts = (0..thread_count)
        .map(|thread| DescriptorHeapKind::ALL.map(|kind| assigner.slot_count(thread, kind)))
        .collect();

    // Sections
    let section_count = graph.sections().len();
    let mut predecessors: Vec<BTreeSet<usize>> = vec![BTreeSet::new(); section_count];
    let mut successors: Vec<BTreeSet<usize>> = vec![BTreeSet::new(); section_count];
    for (before, after) in &edges {
        predecessors[*after].insert(*before);
        successors[*before].insert(*after);
    }
    let section_order = topological_order(graph, &predecessors, &successors)?;

    let sections = graph
        .sections()
        .iter()
        .enumerate()
        .map(|(index, decl)| SectionPlan {
            name: decl.name().to_string(),
            list_type: decl.list_type(),
            thread: index % thread_count,
            passes: section_passes[index].clone(),
            predecessors: predecessors[index].iter().map(|s| SectionId(*s as u32)).collect(),
            successors: successors[index].iter().map(|s| SectionId(*s as u32)).collect(),
            cross_queue_waits: predecessors[index]
                .iter()
                .filter(|s| graph.sections()[**s].list_type() != decl.list_type())
                .map(|s| SectionId(*s as u32))
                .collect(),
            carry_waits: carry[index].iter().map(|s| SectionId(*s as u32)).collect(),
            external_dependencies: decl.external_dependencies(),
        })
        .collect();

    let plan = GraphPlan {
        passes,
        sections,
        section_order,
        resources,
        slot_counts,
    };
    engine_info!(SOURCE, "Graph '{}' planned: {} passes, {} sections, {} barriers per frame",
        graph.name(), plan.passes.len(), plan.sections.len(), plan.barrier_count());
    Ok(plan)
}

// ===== VALIDATION =====

fn section_error(index: usize, message: &str) -> Error {
    Error::declaration("", &format!("section #{}", index), message)
}

fn validate_sections(graph: &RenderGraph) -> Result<()> {
    let count = graph.sections().len();
    if let Some(section) = graph.unknown_sections().first() {
        return Err(section_error(section.index(), "section is not declared in this graph"));
    }
    for (before, after) in graph.section_edges() {
        for section in [before, after] {
            if section.index() >= count {
                return Err(section_error(section.index(), "section dependency on an undeclared section"));
            }
        }
    }
    Ok(())
}

/// Validate every pass and feed its usages into per-resource trackers
fn collect_usages(
    graph: &RenderGraph,
    config: &GraphConfig,
) -> Result<BTreeMap<ResourceKey, ResourceStateTracker>> {
    let mut trackers: BTreeMap<ResourceKey, ResourceStateTracker> = BTreeMap::new();

    for (index, pass) in graph.passes().iter().enumerate() {
        let id = PassId(index as u32);
        if pass.section().index() >= graph.sections().len() {
            return Err(Error::declaration(
                pass.name(),
                &format!("section #{}", pass.section().index()),
                "pass assigned to an undeclared section",
            ));
        }
        for dependency in pass.depends_on() {
            if dependency.index() >= index {
                return Err(Error::declaration(
                    pass.name(),
                    &format!("pass #{}", dependency.index()),
                    "pass depends on a pass that is not declared before it",
                ));
            }
        }

        for usage in pass.usages() {
            track(graph, &mut trackers, config, id, pass.name(), usage.resource, &usage.view, usage.states)?;
        }

        for table_id in pass.tables() {
            let Some(table) = graph.table(*table_id) else {
                return Err(Error::declaration(
                    pass.name(),
                    &format!("table #{}", table_id.index()),
                    "descriptor table is not declared in this graph",
                ));
            };
            for item in &table.items {
                if !matches!(item.view, ResourceView::ShaderResource(_) | ResourceView::UnorderedAccess(_)) {
                    let name = graph.resource(item.resource).map(|decl| decl.name.as_str()).unwrap_or("<undeclared>");
                    return Err(Error::declaration(
                        pass.name(),
                        name,
                        format!("{} view in a descriptor table (only SRV and UAV are shader visible)", item.view.tag()),
                    ));
                }
                let states = PassStates::uniform(item.view.default_state());
                track(graph, &mut trackers, config, id, pass.name(), item.resource, &item.view, states)?;
            }
        }
    }

    if config.validate_hazards {
        for (key, tracker) in &trackers {
            if let Some((pass, subresource)) = tracker.conflicts().first() {
                let resource = graph.resource(*key).map(|decl| decl.name.as_str()).unwrap_or_default();
                return Err(Error::declaration(
                    graph.passes()[pass.index()].name(),
                    resource,
                    format!("conflicting states for subresource {} inside one pass", subresource),
                ));
            }
        }
    }

    Ok(trackers)
}

#[allow(clippy::too_many_arguments)]
fn track(
    graph: &RenderGraph,
    trackers: &mut BTreeMap<ResourceKey, ResourceStateTracker>,
    config: &GraphConfig,
    pass: PassId,
    pass_name: &str,
    key: ResourceKey,
    view: &ResourceView,
    states: PassStates,
) -> Result<()> {
    let Some(decl) = graph.resource(key) else {
        return Err(Error::declaration(pass_name, &format!("{:?}", key), "resource is not declared in this graph"));
    };

    if config.validate_hazards {
        for state in [states.beg, states.mid, states.end] {
            if state.is_invalid_combination() {
                return Err(Error::declaration(
                    pass_name,
                    &decl.name,
                    format!("write state combined with other states: {:?}", state),
                ));
            }
        }
    }

    trackers
        .entry(key)
        .or_insert_with(|| ResourceStateTracker::new(decl.desc.subresource_count()))
        .add_descriptor(pass, view, &decl.desc, states)
        .map_err(|error| Error::declaration(pass_name, &decl.name, error.to_string()))
}

// ===== BARRIERS =====

/// Tracking state of one subresource while walking its usages
#[derive(Debug, Clone)]
struct SubresourceCursor {
    state: ResourceStates,
    last_pass: Option<usize>,
    /// Section of the last usage that wrote or changed the state
    sync_section: Option<usize>,
    /// Sections that read the subresource since then
    readers: Vec<usize>,
}

struct WalkOutcome {
    plan: ResourcePlan,
    barrier_count: usize,
    /// Sections using the resource, first user first
    sections: Vec<usize>,
}

/// One pending barrier of the resource being walked
type Pending = (u32, BarrierKind, BarrierFlags);

struct ResourceWalk<'a> {
    config: &'a GraphConfig,
    pass_sections: &'a [usize],
    positions: &'a [usize],
}

impl ResourceWalk<'_> {
    fn run(
        &self,
        key: ResourceKey,
        decl: &ResourceDecl,
        tracker: &ResourceStateTracker,
        lists: &mut [BarrierLists],
        edges: &mut BTreeSet<(usize, usize)>,
    ) -> WalkOutcome {
        let usages = tracker.usages();
        let subresource_count = tracker.subresource_count();

        let entry_state = entry_state(decl, tracker);
        let mut cursors = vec![
            SubresourceCursor {
                state: entry_state,
                last_pass: None,
                sync_section: None,
                readers: Vec::new(),
            };
            subresource_count as usize
        ];
        let mut pending: BTreeMap<(usize, usize), Vec<Pending>> = BTreeMap::new();
        let mut sections: Vec<usize> = Vec::new();

        for usage in &usages {
            let pass = usage.pass.index();
            let section = self.pass_sections[pass];
            if !sections.contains(&section) {
                sections.push(section);
            }

            for (subresource, states) in &usage.states {
                let cursor = &mut cursors[*subresource as usize];
                let transition = cursor.state != states.beg;

                if transition {
                    let kind = BarrierKind::Transition { before: cursor.state, after: states.beg };
                    match cursor.last_pass {
                        Some(last) if self.can_split(last, pass) => {
                            pending.entry((last, POST_INTER)).or_default().push((*subresource, kind, BarrierFlags::BeginOnly));
                            pending.entry((pass, PRE_INTER)).or_default().push((*subresource, kind, BarrierFlags::EndOnly));
                        }
                        _ => {
                            pending.entry((pass, PRE_INTER)).or_default().push((*subresource, kind, BarrierFlags::None));
                        }
                    }
                } else if cursor.last_pass.is_some()
                    && cursor.state == ResourceStates::UNORDERED_ACCESS
                    && states.beg == ResourceStates::UNORDERED_ACCESS
                {
                    pending.entry((pass, PRE_INTER)).or_default().push((*subresource, BarrierKind::Uav, BarrierFlags::None));
                }

                if states.beg != states.mid {
                    let kind = BarrierKind::Transition { before: states.beg, after: states.mid };
                    pending.entry((pass, PRE_INTRA)).or_default().push((*subresource, kind, BarrierFlags::None));
                }
                if states.mid != states.end {
                    let kind = BarrierKind::Transition { before: states.mid, after: states.end };
                    pending.entry((pass, POST_INTRA)).or_default().push((*subresource, kind, BarrierFlags::None));
                }

                if transition || states.is_write() || !states.is_uniform() {
                    sync_from(cursor, section, edges);
                } else {
                    if let Some(writer) = cursor.sync_section {
                        if writer != section {
                            edges.insert((writer, section));
                        }
                    }
                    if !cursor.readers.contains(&section) {
                        cursor.readers.push(section);
                    }
                }

                cursor.state = states.end;
                cursor.last_pass = Some(pass);
            }
        }

        // Leave the resource in its exit state after its last usage
        let exit_state = match &decl.kind {
            ResourceKind::External { final_state, .. } => *final_state,
            ResourceKind::Internal { .. } => Some(entry_state),
        };
        if let (Some(exit_state), Some(last_usage)) = (exit_state, usages.last()) {
            for (subresource, cursor) in cursors.iter_mut().enumerate() {
                if cursor.state == exit_state {
                    continue;
                }
                let host = cursor.last_pass.unwrap_or(last_usage.pass.index());
                let kind = BarrierKind::Transition { before: cursor.state, after: exit_state };
                pending.entry((host, POST_INTER)).or_default().push((subresource as u32, kind, BarrierFlags::None));
                sync_from(cursor, self.pass_sections[host], edges);
            }
        }

        // Group per (pass, list) and collapse full coverage to ALL_SUBRESOURCES
        let mut barrier_count = 0;
        for ((pass, list), entries) in pending {
            for barrier in group(key, subresource_count, &entries) {
                engine_trace!(SOURCE, "Pass #{} list {}: {:?}", pass, list, barrier);
                lists[pass][list].push(barrier);
                barrier_count += 1;
            }
        }

        WalkOutcome {
            plan: ResourcePlan {
                entry_state,
                usage_count: usages.len(),
            },
            barrier_count,
            sections,
        }
    }

    /// Split when producer and consumer share a section with passes in between
    fn can_split(&self, last: usize, pass: usize) -> bool {
        self.config.split_barriers
            && self.pass_sections[last] == self.pass_sections[pass]
            && self.positions[pass] > self.positions[last] + 1
    }
}

/// State a resource is in when the frame starts
///
/// Declared initial state if any. Otherwise internal resources whose
/// subresources all end the frame in one state start in it (the frame loops
/// without a closing barrier), and everything else starts in its first
/// usage state.
fn entry_state(decl: &ResourceDecl, tracker: &ResourceStateTracker) -> ResourceStates {
    if let Some(state) = decl.initial_state() {
        return state;
    }

    let usages = tracker.usages();
    let first = usages
        .first()
        .and_then(|usage| usage.states.first())
        .map(|(_, states)| states.beg)
        .unwrap_or(ResourceStates::COMMON);

    if decl.is_external() {
        return first;
    }

    let mut last_states: Vec<Option<ResourceStates>> = vec![None; tracker.subresource_count() as usize];
    for usage in &usages {
        for (subresource, states) in &usage.states {
            last_states[*subresource as usize] = Some(states.end);
        }
    }
    match last_states.first().copied().flatten() {
        Some(end) if last_states.iter().all(|state| *state == Some(end)) => end,
        _ => first,
    }
}

/// Record a synchronizing usage in `section` on `cursor`
fn sync_from(cursor: &mut SubresourceCursor, section: usize, edges: &mut BTreeSet<(usize, usize)>) {
    for other in cursor.readers.drain(..).chain(cursor.sync_section) {
        if other != section {
            edges.insert((other, section));
        }
    }
    cursor.sync_section = Some(section);
}

/// Merge subresource entries sharing (kind, flags), in first-seen order
fn group(resource: ResourceKey, subresource_count: u32, entries: &[Pending]) -> Vec<PlannedBarrier> {
    let mut groups: Vec<(BarrierKind, BarrierFlags, Vec<u32>)> = Vec::new();
    for (subresource, kind, flags) in entries {
        match groups.iter_mut().find(|(k, f, _)| k == kind && f == flags) {
            Some((_, _, subresources)) => subresources.push(*subresource),
            None => groups.push((*kind, *flags, vec![*subresource])),
        }
    }

    let mut barriers = Vec::new();
    for (kind, flags, subresources) in groups {
        if subresources.len() as u32 == subresource_count {
            barriers.push(PlannedBarrier { resource, subresource: Subresource::All, kind, flags });
        } else {
            barriers.extend(subresources.into_iter().map(|index| PlannedBarrier {
                resource,
                subresource: Subresource::Index(index),
                kind,
                flags,
            }));
        }
    }
    barriers
}

// ===== SECTION ORDER =====

/// Kahn's algorithm, lowest section index first
fn topological_order(
    graph: &RenderGraph,
    predecessors: &[BTreeSet<usize>],
    successors: &[BTreeSet<usize>],
) -> Result<Vec<SectionId>> {
    let count = predecessors.len();
    let mut in_degree: Vec<usize> = predecessors.iter().map(|p| p.len()).collect();
    let mut ready: BTreeSet<usize> = (0..count).filter(|s| in_degree[*s] == 0).collect();
    let mut order = Vec::with_capacity(count);

    while let Some(section) = ready.pop_first() {
        order.push(SectionId(section as u32));
        for successor in &successors[section] {
            in_degree[*successor] -= 1;
            if in_degree[*successor] == 0 {
                ready.insert(*successor);
            }
        }
    }

    if order.len() == count {
        return Ok(order);
    }

    // Every section left has a predecessor left: walk backwards until a repeat
    let remaining: BTreeSet<usize> = (0..count).filter(|s| in_degree[*s] > 0).collect();
    let mut path: Vec<usize> = Vec::new();
    let mut current = remaining.first().copied();
    while let Some(section) = current {
        if let Some(position) = path.iter().position(|s| *s == section) {
            path.drain(..position);
            break;
        }
        path.push(section);
        current = predecessors[section].iter().find(|p| remaining.contains(p)).copied();
    }
    path.reverse();
    if let Some(first) = path.first().copied() {
        path.push(first);
    }

    Err(Error::DependencyCycle(
        path.into_iter().map(|s| graph.sections()[s].name().to_string()).collect(),
    ))
}

#[cfg(test)]
#[path = "compiler_tests.rs"]
mod tests;
