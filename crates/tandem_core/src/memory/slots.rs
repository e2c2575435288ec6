//! # Slot Allocator
//!
//! Maps object identities to fixed slots of the rigid-body region.
//!
//! Slots come off a free-list stack seeded in reverse, so the lowest free
//! index is handed out first and a released slot is the next one reused.
//! Lookups are O(1) in both directions.

use std::collections::HashMap;

use tandem_shared::ObjectId;

use crate::error::SlotError;

/// Identity to slot mapping with a fixed number of slots.
///
/// # Thread Safety
///
/// Not thread-safe. Owned by the simulation side only.
#[derive(Debug)]
pub struct SlotAllocator {
    /// Owner of each slot.
    owners: Box<[Option<ObjectId>]>,
    /// Slot of each owner.
    slots: HashMap<ObjectId, usize>,
    /// Free slots; the top is handed out next.
    free_list: Vec<usize>,
}

impl SlotAllocator {
    /// Creates an allocator with `capacity` free slots.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            owners: vec![None; capacity].into_boxed_slice(),
            slots: HashMap::with_capacity(capacity),
            free_list: (0..capacity).rev().collect(),
        }
    }

    /// Total slots.
    #[inline]
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.owners.len()
    }

    /// Owned slots.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// Whether no slot is owned.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Free slots.
    #[inline]
    #[must_use]
    pub fn free_count(&self) -> usize {
        self.free_list.len()
    }

    /// Gives `id` a free slot.
    ///
    /// # Errors
    ///
    /// Returns [`SlotError::CapacityExceeded`] when full and
    /// [`SlotError::DuplicateIdentity`] when `id` already owns a slot. The
    /// allocator is unchanged on error.
    pub fn allocate(&mut self, id: ObjectId) -> Result<usize, SlotError> {
        if let Some(&slot) = self.slots.get(&id) {
            return Err(SlotError::DuplicateIdentity(id, slot));
        }
        let slot = self.free_list.pop().ok_or(SlotError::CapacityExceeded {
            capacity: self.capacity(),
        })?;
        self.owners[slot] = Some(id);
        self.slots.insert(id, slot);
        Ok(slot)
    }

    /// Returns the slot of `id` to the free list.
    ///
    /// Returns the freed slot, or `None` if `id` owned nothing.
    pub fn release(&mut self, id: ObjectId) -> Option<usize> {
        let slot = self.slots.remove(&id)?;
        self.owners[slot] = None;
        self.free_list.push(slot);
        Some(slot)
    }

    /// Slot owned by `id`.
    #[inline]
    #[must_use]
    pub fn slot_of(&self, id: ObjectId) -> Option<usize> {
        self.slots.get(&id).copied()
    }

    /// Owner of `slot`.
    #[inline]
    #[must_use]
    pub fn owner_of(&self, slot: usize) -> Option<ObjectId> {
        self.owners.get(slot).copied().flatten()
    }

    /// Owned `(slot, id)` pairs in slot order.
    pub fn iter(&self) -> impl Iterator<Item = (usize, ObjectId)> + '_ {
        self.owners
            .iter()
            .enumerate()
            .filter_map(|(slot, owner)| owner.map(|id| (slot, id)))
    }

    /// Releases every slot.
    pub fn clear(&mut self) {
        self.owners.iter_mut().for_each(|o| *o = None);
        self.slots.clear();
        self.free_list.clear();
        self.free_list.extend((0..self.capacity()).rev());
    }
}
