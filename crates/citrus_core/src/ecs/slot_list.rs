//! Intrusive free/alloc lists over a fixed slot array
//!
//! Every slot carries one pair of links. While a slot is free, `next` chains
//! the free list (`prev` is unused); while it is allocated, `next`/`prev`
//! chain the alloc list in allocation order. A slot is therefore on exactly
//! one of the two lists at any time.

/// Link pair embedded in every pooled slot
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SlotLinks {
    /// Next slot on whichever list this slot is on
    pub(crate) next: Option<u32>,
    /// Previous slot on the alloc list
    pub(crate) prev: Option<u32>,
}

/// Slot types that embed [`SlotLinks`]
pub(crate) trait Linked {
    fn links(&self) -> &SlotLinks;
    fn links_mut(&mut self) -> &mut SlotLinks;
}

/// Heads and tail of the two lists threaded through a slot array
#[derive(Debug, Clone)]
pub(crate) struct SlotList {
    free_head: Option<u32>,
    alloc_head: Option<u32>,
    alloc_tail: Option<u32>,
    allocated: usize,
    capacity: usize,
}

impl SlotList {
    /// Thread every slot onto the free list in index order
    pub fn new<T: Linked>(slots: &mut [T]) -> Self {
        let capacity = slots.len();
        for (index, slot) in slots.iter_mut().enumerate() {
            let next = index + 1;
            *slot.links_mut() = SlotLinks {
                next: (next < capacity).then(|| to_index(next)),
                prev: None,
            };
        }

        Self {
            free_head: (capacity > 0).then_some(0),
            alloc_head: None,
            alloc_tail: None,
            allocated: 0,
            capacity,
        }
    }

    /// Take the first free slot and append it to the alloc list tail
    pub fn alloc<T: Linked>(&mut self, slots: &mut [T]) -> Option<u32> {
        let index = self.free_head?;
        self.free_head = slots[index as usize].links().next;

        *slots[index as usize].links_mut() = SlotLinks {
            next: None,
            prev: self.alloc_tail,
        };
        match self.alloc_tail {
            Some(tail) => slots[tail as usize].links_mut().next = Some(index),
            None => self.alloc_head = Some(index),
        }
        self.alloc_tail = Some(index);
        self.allocated += 1;

        Some(index)
    }

    /// Splice a slot out of the alloc list and push it onto the free list
    ///
    /// The caller guarantees the slot is currently allocated.
    pub fn free<T: Linked>(&mut self, slots: &mut [T], index: u32) {
        let SlotLinks { next, prev } = *slots[index as usize].links();

        match prev {
            Some(prev) => slots[prev as usize].links_mut().next = next,
            None => self.alloc_head = next,
        }
        match next {
            Some(next) => slots[next as usize].links_mut().prev = prev,
            None => self.alloc_tail = prev,
        }

        *slots[index as usize].links_mut() = SlotLinks {
            next: self.free_head,
            prev: None,
        };
        self.free_head = Some(index);
        self.allocated -= 1;
    }

    /// Walk the alloc list from head to tail
    pub fn iter_alloc<'a, T: Linked>(&self, slots: &'a [T]) -> AllocIter<'a, T> {
        AllocIter {
            slots,
            cursor: self.alloc_head,
        }
    }

    /// Number of slots on the free list, counted by walking it
    pub fn walk_free_len<T: Linked>(&self, slots: &[T]) -> usize {
        let mut count = 0;
        let mut cursor = self.free_head;
        while let Some(index) = cursor {
            count += 1;
            cursor = slots[index as usize].links().next;
        }
        count
    }

    /// Number of allocated slots
    pub const fn allocated(&self) -> usize {
        self.allocated
    }

    /// Number of free slots
    pub const fn available(&self) -> usize {
        self.capacity - self.allocated
    }

    /// Total number of slots
    pub const fn capacity(&self) -> usize {
        self.capacity
    }
}

/// Iterator over allocated slot indices in allocation order
pub(crate) struct AllocIter<'a, T> {
    slots: &'a [T],
    cursor: Option<u32>,
}

impl<T: Linked> Iterator for AllocIter<'_, T> {
    type Item = u32;

    fn next(&mut self) -> Option<u32> {
        let index = self.cursor?;
        self.cursor = self.slots[index as usize].links().next;
        Some(index)
    }
}

#[allow(clippy::cast_possible_truncation)]
const fn to_index(index: usize) -> u32 {
    index as u32
}
