/// Hands out dense `u32` slot indices, one at a time or in contiguous runs.
///
/// Used for descriptor slots: every (thread, heap kind) pair owns one
/// allocator, and the final high water mark sizes the descriptor range
/// requested from the device. Slots are never recycled; a compiled
/// graph keeps its layout for its whole lifetime.
///
/// # Example
///
/// ```ignore
/// let mut alloc = SlotAllocator::new();
/// let a = alloc.alloc();          // 0
/// let t = alloc.alloc_range(3);   // 1 (occupies 1..4)
/// let b = alloc.alloc();          // 4
/// assert_eq!(alloc.high_water_mark(), 5);
/// ```
#[derive(Debug, Clone)]
pub struct SlotAllocator {
    next_id: u32,
    ranges: u32,
}

impl SlotAllocator {
    /// Create a new empty allocator
    pub fn new() -> Self {
        Self {
            next_id: 0,
            ranges: 0,
        }
    }

    /// Allocate the next slot index
    pub fn alloc(&mut self) -> u32 {
        self.alloc_range(1)
    }

    /// Allocate `count` consecutive slots and return the first one
    ///
    /// An empty run still returns the current position without moving it.
    pub fn alloc_range(&mut self, count: u32) -> u32 {
        let first = self.next_id;
        self.next_id += count;
        self.ranges += 1;
        first
    }

    /// Highest index ever allocated + 1.
    ///
    /// This is the minimum capacity the backing descriptor range must have.
    pub fn high_water_mark(&self) -> u32 {
        self.next_id
    }

    /// Number of allocation calls served (single slots and runs)
    pub fn len(&self) -> u32 {
        self.ranges
    }

    /// Whether nothing has been allocated yet
    pub fn is_empty(&self) -> bool {
        self.ranges == 0
    }
}

impl Default for SlotAllocator {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
#[path = "slot_allocator_tests.rs"]
mod tests;
