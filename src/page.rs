/// One slot of a page: the object (if the slot is in use) and its mark bit.
struct Slot<T> {
    object: Option<T>,
    mark: bool,
}

/// A fixed-capacity slab of same-kind objects.
///
/// Slots are handed out from an index free list, lowest index first.
/// Objects are dropped either by `sweep` (when unmarked) or when the page
/// itself is dropped.
pub struct Page<T> {
    slots: Vec<Slot<T>>,
    /// Free slot indices. Popped from the back, so it is kept in
    /// descending order and the lowest free slot is reused first.
    free_list: Vec<u32>,
    live: usize,
}

impl<T> Page<T> {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        let mut slots = Vec::with_capacity(capacity);
        slots.resize_with(capacity, || Slot {
            object: None,
            mark: false,
        });
        Page {
            slots,
            free_list: (0..capacity as u32).rev().collect(),
            live: 0,
        }
    }

    /// Place an object in a free slot. Gives the object back when full.
    pub fn construct(&mut self, object: T) -> Result<u32, T> {
        let Some(index) = self.free_list.pop() else {
            return Err(object);
        };
        let slot = &mut self.slots[index as usize];
        slot.object = Some(object);
        slot.mark = false;
        self.live += 1;
        Ok(index)
    }

    #[inline]
    pub fn get(&self, index: u32) -> Option<&T> {
        self.slots.get(index as usize)?.object.as_ref()
    }

    #[inline]
    pub fn get_mut(&mut self, index: u32) -> Option<&mut T> {
        self.slots.get_mut(index as usize)?.object.as_mut()
    }

    /// Whether the slot currently holds an object.
    pub fn is_used(&self, index: u32) -> bool {
        self.get(index).is_some()
    }

    /// Set the mark bit of a used slot. Returns true only the first time a
    /// slot is marked in a cycle; free slots are never marked.
    pub fn mark(&mut self, index: u32) -> bool {
        match self.slots.get_mut(index as usize) {
            Some(slot) if slot.object.is_some() && !slot.mark => {
                slot.mark = true;
                true
            }
            _ => false,
        }
    }

    pub fn is_marked(&self, index: u32) -> bool {
        self.slots
            .get(index as usize)
            .map(|slot| slot.mark)
            .unwrap_or(false)
    }

    /// Clear every mark bit.
    pub fn clear_marks(&mut self) {
        for slot in &mut self.slots {
            slot.mark = false;
        }
    }

    /// Drop every unmarked object, return its slot to the free list and
    /// clear the surviving marks. Returns the number of objects dropped.
    pub fn sweep(&mut self) -> usize {
        let mut swept = 0;
        for (i, slot) in self.slots.iter_mut().enumerate() {
            if slot.object.is_some() && !slot.mark {
                slot.object = None;
                self.free_list.push(i as u32);
                swept += 1;
            }
            slot.mark = false;
        }
        self.live -= swept;
        // Keep the lowest free index at the back.
        self.free_list.sort_unstable_by(|a, b| b.cmp(a));
        swept
    }

    /// Total number of slots, used or free.
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Number of objects currently held.
    pub fn len(&self) -> usize {
        self.live
    }

    pub fn is_empty(&self) -> bool {
        self.live == 0
    }

    pub fn is_full(&self) -> bool {
        self.free_list.is_empty()
    }
}
