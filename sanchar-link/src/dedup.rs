//! Sliding window of recently handled request ids
//!
//! Fixed capacity, overwrite-oldest. An id is flagged as a duplicate only
//! while it is still in the window; after `capacity` newer distinct ids it
//! is evicted and accepted again.

/// Default window size
pub const DEFAULT_CAPACITY: usize = 16;

/// Fixed-capacity request id ring with a write cursor
#[derive(Debug, Clone)]
pub struct DedupFilter {
    slots: Box<[Option<u16>]>,
    cursor: usize, // Next slot to overwrite
}

impl Default for DedupFilter {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl DedupFilter {
    /// Create an empty window. A capacity of 0 is raised to 1.
    pub fn new(capacity: usize) -> Self {
        Self {
            slots: vec![None; capacity.max(1)].into_boxed_slice(),
            cursor: 0,
        }
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// True if `id` is in the window
    #[inline]
    pub fn contains(&self, id: u16) -> bool {
        self.slots.contains(&Some(id))
    }

    /// Check-and-insert in one step.
    ///
    /// Returns true for a duplicate (nothing recorded). Otherwise records
    /// `id` over the oldest slot and returns false. Id 0 is not exempt.
    pub fn seen_or_record(&mut self, id: u16) -> bool {
        if self.contains(id) {
            return true;
        }
        self.slots[self.cursor] = Some(id);
        self.cursor = (self.cursor + 1) % self.slots.len();
        false
    }
}
