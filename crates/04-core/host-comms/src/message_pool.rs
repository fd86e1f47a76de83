//! Fixed-capacity pool of in-flight message slots.
//!
//! Slots live in an arena sized at construction and never grow. Free slots
//! are tracked as a stack of indices. Every allocation bumps the slot's
//! generation, so a [`MessageHandle`] kept past its release can no longer
//! reach the slot. All state sits behind a single lock, shared by the
//! outbound path allocating slots and the completion path releasing them from
//! the transport thread.
//!
//! A slot moves `Vacant -> Live -> (Retiring ->) Vacant`. `Retiring` keeps the
//! slot reserved after its value was taken out, while the final release is
//! still pending on another thread.

use comms_abi::MessageHandle;
use parking_lot::Mutex;

use crate::error::{PoolError, PoolResult};

enum SlotState<T> {
    Vacant,
    Live(T),
    Retiring,
}

struct Slot<T> {
    generation: u32,
    state: SlotState<T>,
}

struct PoolInner<T> {
    slots: Vec<Slot<T>>,
    free: Vec<u32>,
}

impl<T> PoolInner<T> {
    fn slot_mut(&mut self, handle: MessageHandle) -> Option<&mut Slot<T>> {
        self.slots
            .get_mut(handle.slot as usize)
            .filter(|slot| slot.generation == handle.generation)
    }
}

/// Lock-protected arena of message slots.
pub struct MessagePool<T> {
    inner: Mutex<PoolInner<T>>,
    capacity: usize,
}

impl<T> MessagePool<T> {
    /// Creates a pool with `capacity` slots, all free.
    pub fn new(capacity: usize) -> PoolResult<Self> {
        if capacity == 0 || capacity > u32::MAX as usize {
            return Err(PoolError::InvalidCapacity {
                requested: capacity,
                maximum: u32::MAX as usize,
            });
        }

        let slots = (0..capacity)
            .map(|_| Slot {
                generation: 0,
                state: SlotState::Vacant,
            })
            .collect();
        // Reversed so that slot 0 is handed out first.
        let free = (0..capacity as u32).rev().collect();

        Ok(Self {
            inner: Mutex::new(PoolInner { slots, free }),
            capacity,
        })
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of slots currently free.
    pub fn available(&self) -> usize {
        self.inner.lock().free.len()
    }

    /// Number of slots live or retiring.
    pub fn outstanding(&self) -> usize {
        self.capacity - self.available()
    }

    /// Stores `value` in a free slot.
    ///
    /// Hands `value` back when every slot is taken.
    pub fn allocate(&self, value: T) -> Result<MessageHandle, T> {
        let mut inner = self.inner.lock();
        let Some(idx) = inner.free.pop() else {
            return Err(value);
        };
        let slot = &mut inner.slots[idx as usize];
        debug_assert!(matches!(slot.state, SlotState::Vacant), "slot {idx} on free list");
        slot.generation = slot.generation.wrapping_add(1);
        slot.state = SlotState::Live(value);
        Ok(MessageHandle {
            slot: idx,
            generation: slot.generation,
        })
    }

    /// Runs `f` against the value of a live slot.
    pub fn with_live<R>(&self, handle: MessageHandle, f: impl FnOnce(&T) -> R) -> Option<R> {
        let mut inner = self.inner.lock();
        match &inner.slot_mut(handle)?.state {
            SlotState::Live(value) => Some(f(value)),
            SlotState::Vacant | SlotState::Retiring => None,
        }
    }

    /// Takes the value out of a live slot, keeping the slot reserved until
    /// [`MessagePool::release`].
    ///
    /// Returns `None` if the handle is stale or the slot was already retired,
    /// so only the first caller ever receives the value.
    pub fn retire(&self, handle: MessageHandle) -> Option<T> {
        let mut inner = self.inner.lock();
        let slot = inner.slot_mut(handle)?;
        match std::mem::replace(&mut slot.state, SlotState::Retiring) {
            SlotState::Live(value) => Some(value),
            other => {
                slot.state = other;
                None
            }
        }
    }

    /// Returns a live or retiring slot to the free list.
    ///
    /// Yields the stored value when the slot was still live. The value is
    /// dropped by the caller, outside the pool lock.
    pub fn release(&self, handle: MessageHandle) -> PoolResult<Option<T>> {
        let mut inner = self.inner.lock();
        let stale = PoolError::StaleHandle {
            slot: handle.slot,
            generation: handle.generation,
        };
        let slot = inner.slot_mut(handle).ok_or(stale)?;
        let released = match std::mem::replace(&mut slot.state, SlotState::Vacant) {
            SlotState::Live(value) => Some(value),
            SlotState::Retiring => None,
            SlotState::Vacant => return Err(stale),
        };
        inner.free.push(handle.slot);
        Ok(released)
    }
}
