/// Per-resource usage tracker.
///
/// Collects (pass, subresource, states) records for one resource while a
/// graph is being compiled, then hands them back grouped per pass in
/// execution order. Records live in a flat arena; `usages()` radix-sorts
/// packed keys and scans them once.

use rdst::RadixSort;
use crate::error::Result;
use crate::graphics_device::{ResourceDesc, ResourceView, Subresource};
use super::pass::{PassId, PassStates};

#[derive(Debug, Clone, Copy)]
struct StateRecord {
    pass: u32,
    subresource: u32,
    states: PassStates,
}

/// Every state a single pass requires on one resource
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PassUsage {
    pub pass: PassId,
    /// (subresource index, states), ascending subresource order
    pub states: Vec<(u32, PassStates)>,
}

/// Usage tracker of one resource
#[derive(Debug, Clone)]
pub struct ResourceStateTracker {
    subresource_count: u32,
    records: Vec<StateRecord>,
}

impl ResourceStateTracker {
    /// Create an empty tracker for a resource with `subresource_count` subresources
    pub fn new(subresource_count: u32) -> Self {
        Self {
            subresource_count,
            records: Vec::new(),
        }
    }

    pub fn subresource_count(&self) -> u32 {
        self.subresource_count
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Record that `pass` needs `subresource` in `states`
    ///
    /// `Subresource::All` is expanded into one record per physical subresource.
    pub fn add_resource_state(&mut self, pass: PassId, subresource: Subresource, states: PassStates) {
        match subresource {
            Subresource::All => {
                for index in 0..self.subresource_count {
                    self.push(pass, index, states);
                }
            }
            Subresource::Index(index) => self.push(pass, index, states),
        }
    }

    /// Record every subresource `view` covers on a resource described by `desc`
    ///
    /// # Errors
    ///
    /// `InvalidResource` when the view does not fit the resource.
    pub fn add_descriptor(
        &mut self,
        pass: PassId,
        view: &ResourceView,
        desc: &ResourceDesc,
        states: PassStates,
    ) -> Result<()> {
        for subresource in view.subresources(desc)? {
            self.add_resource_state(pass, subresource, states);
        }
        Ok(())
    }

    /// Usages grouped per pass, ascending pass order
    ///
    /// When a pass recorded the same subresource more than once, the last
    /// record wins.
    pub fn usages(&self) -> Vec<PassUsage> {
        let mut usages: Vec<PassUsage> = Vec::new();
        self.scan(|pass, subresource, run| {
            let (_, states) = run[run.len() - 1];
            match usages.last_mut() {
                Some(usage) if usage.pass.0 == pass => usage.states.push((subresource, states)),
                _ => usages.push(PassUsage {
                    pass: PassId(pass),
                    states: vec![(subresource, states)],
                }),
            }
        });
        usages
    }

    /// (pass, subresource) pairs recorded with different states inside one
    /// pass where at least one of them writes
    pub fn conflicts(&self) -> Vec<(PassId, u32)> {
        let mut conflicts = Vec::new();
        self.scan(|pass, subresource, run| {
            let first = run[0].1;
            let differs = run.iter().any(|(_, states)| *states != first);
            let writes = run.iter().any(|(_, states)| states.is_write());
            if differs && writes {
                conflicts.push((PassId(pass), subresource));
            }
        });
        conflicts
    }

    fn push(&mut self, pass: PassId, subresource: u32, states: PassStates) {
        debug_assert!(subresource < self.subresource_count, "subresource {} out of range", subresource);
        self.records.push(StateRecord {
            pass: pass.0,
            subresource,
            states,
        });
    }

    /// Sort records by (pass, subresource, insertion order) and call `visit`
    /// once per (pass, subresource) run
    fn scan<F>(&self, mut visit: F)
    where
        F: FnMut(u32, u32, &[(u32, PassStates)]),
    {
        let mut keys: Vec<u128> = self.records
            .iter()
            .enumerate()
            .map(|(sequence, record)| {
                ((record.pass as u128) << 64) | ((record.subresource as u128) << 32) | sequence as u128
            })
            .collect();
        keys.radix_sort_unstable();

        let mut run: Vec<(u32, PassStates)> = Vec::new();
        let mut current: Option<(u32, u32)> = None;
        for key in keys {
            let record = &self.records[(key as u32) as usize];
            let id = (record.pass, record.subresource);
            if current != Some(id) {
                if let Some((pass, subresource)) = current {
                    visit(pass, subresource, &run);
                }
                run.clear();
                current = Some(id);
            }
            run.push((key as u32, record.states));
        }
        if let Some((pass, subresource)) = current {
            visit(pass, subresource, &run);
        }
    }
}

#[cfg(test)]
#[path = "state_tracker_tests.rs"]
mod tests;
