/// Descriptor slot assignment.
///
/// Every recording thread owns one descriptor range per heap kind. Within a
/// thread, each distinct (heap kind, item) gets one slot and each distinct
/// table gets a run of consecutive shader visible slots; asking again for
/// the same key returns the same slot.

use rustc_hash::FxHashMap;
use crate::graphics_device::DescriptorHeapKind;
use crate::utils::SlotAllocator;
use super::pass::{DescriptorItem, TableId};

/// Slot of a single descriptor inside its thread's range of `kind`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DescriptorBinding {
    pub kind: DescriptorHeapKind,
    pub slot: u32,
}

/// Memoized slot assigner, one slot space per (thread, heap kind)
#[derive(Debug, Default)]
pub struct DescriptorSlotAssigner {
    slots: FxHashMap<(usize, DescriptorHeapKind, DescriptorItem), u32>,
    range_slots: FxHashMap<(usize, TableId), u32>,
    allocators: Vec<[SlotAllocator; 3]>,
}

impl DescriptorSlotAssigner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Slot of `item` for `thread`
    ///
    /// Returns `None` for items whose view needs no descriptor.
    pub fn allocate_descriptor_slot(&mut self, thread: usize, item: DescriptorItem) -> Option<DescriptorBinding> {
        let kind = item.view.heap_kind()?;
        if let Some(slot) = self.slots.get(&(thread, kind, item)) {
            return Some(DescriptorBinding { kind, slot: *slot });
        }
        let slot = self.allocator(thread, kind).alloc();
        self.slots.insert((thread, kind, item), slot);
        Some(DescriptorBinding { kind, slot })
    }

    /// First slot of a `len`-descriptor table for `thread` (shader visible heap)
    pub fn allocate_descriptor_range_slot(&mut self, thread: usize, table: TableId, len: u32) -> u32 {
        if let Some(slot) = self.range_slots.get(&(thread, table)) {
            return *slot;
        }
        let slot = self.allocator(thread, DescriptorHeapKind::ShaderResource).alloc_range(len);
        self.range_slots.insert((thread, table), slot);
        slot
    }

    /// Single descriptors of `thread` as (kind, slot, item), ordered by kind then slot
    pub fn descriptor_slots(&self, thread: usize) -> Vec<(DescriptorHeapKind, u32, DescriptorItem)> {
        let mut slots: Vec<_> = self.slots
            .iter()
            .filter(|((t, _, _), _)| *t == thread)
            .map(|((_, kind, item), slot)| (*kind, *slot, *item))
            .collect();
        slots.sort_by_key(|(kind, slot, _)| (*kind, *slot));
        slots
    }

    /// Tables of `thread` as (first slot, table), ordered by slot
    pub fn descriptor_range_slots(&self, thread: usize) -> Vec<(u32, TableId)> {
        let mut ranges: Vec<_> = self.range_slots
            .iter()
            .filter(|((t, _), _)| *t == thread)
            .map(|((_, table), slot)| (*slot, *table))
            .collect();
        ranges.sort();
        ranges
    }

    /// Number of slots `thread` uses in its `kind` range
    pub fn slot_count(&self, thread: usize, kind: DescriptorHeapKind) -> u32 {
        self.allocators
            .get(thread)
            .map(|allocators| allocators[kind.index()].high_water_mark())
            .unwrap_or(0)
    }

    /// Number of threads that allocated at least once (highest thread + 1)
    pub fn thread_count(&self) -> usize {
        self.allocators.len()
    }

    fn allocator(&mut self, thread: usize, kind: DescriptorHeapKind) -> &mut SlotAllocator {
        if self.allocators.len() <= thread {
            self.allocators.resize_with(thread + 1, Default::default);
        }
        &mut self.allocators[thread][kind.index()]
    }
}

#[cfg(test)]
#[path = "descriptor_slots_tests.rs"]
mod tests;
