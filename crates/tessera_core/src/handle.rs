//! # Handles
//!
//! Generation-checked handles and the slot table that resolves them.
//!
//! A handle packs two fields into one integer:
//! - Low bits: index of a slot in a [`HandleTable`]
//! - High bits: generation of that slot at the time the handle was issued
//!
//! A handle resolves only while its slot holds a live reference *and* the
//! slot generation still matches. Releasing a slot clears the reference but
//! leaves the generation alone; the generation advances on the next acquire,
//! which is what makes every older handle to that slot stale.

use std::fmt;
use std::hash::Hash;
use std::marker::PhantomData;

use crate::error::{EcsError, EcsResult};

/// Default number of slots added each time a handle table grows.
pub const DEFAULT_HANDLE_TABLE_GROW: usize = 1024;

/// A fixed-width handle layout.
pub trait Handle: Copy + Eq + Hash + fmt::Debug + fmt::Display {
    /// Width of the index field.
    const INDEX_BITS: u32;
    /// Width of the generation field.
    const GENERATION_BITS: u32;
    /// Generation a slot wraps back to.
    const MIN_GENERATION: u64 = 0;
    /// Highest generation a slot reaches before wrapping.
    const MAX_GENERATION: u64 = (1u64 << Self::GENERATION_BITS) - 2;
    /// Maximum number of addressable slots.
    const MAX_INDICES: u64 = (1u64 << Self::INDEX_BITS) - 2;

    /// Packs an index and a generation into a handle.
    fn from_parts(index: u64, generation: u64) -> Self;

    /// The slot index field.
    fn slot_index(self) -> u64;

    /// The generation field.
    fn version(self) -> u64;
}

macro_rules! define_handle {
    ($(#[$meta:meta])* $name:ident($raw:ty), index_bits = $index_bits:expr, generation_bits = $generation_bits:expr) => {
        $(#[$meta])*
        #[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        #[repr(transparent)]
        pub struct $name($raw);

        impl $name {
            const INDEX_MASK: $raw = (1 << $index_bits) - 1;
            const GENERATION_MASK: $raw = (1 << $generation_bits) - 1;

            /// Sentinel handle that never resolves.
            pub const INVALID: Self = Self(<$raw>::MAX);

            /// Packs an index and a generation. Excess bits are truncated.
            #[inline]
            #[must_use]
            pub const fn new(index: $raw, generation: $raw) -> Self {
                Self(((generation & Self::GENERATION_MASK) << $index_bits) | (index & Self::INDEX_MASK))
            }

            /// Rebuilds a handle from its packed integer form.
            #[inline]
            #[must_use]
            pub const fn from_raw(raw: $raw) -> Self {
                Self(raw)
            }

            /// The packed integer form.
            #[inline]
            #[must_use]
            pub const fn raw(self) -> $raw {
                self.0
            }

            /// The slot index field.
            #[inline]
            #[must_use]
            pub const fn index(self) -> $raw {
                self.0 & Self::INDEX_MASK
            }

            /// The generation field.
            #[inline]
            #[must_use]
            pub const fn generation(self) -> $raw {
                (self.0 >> $index_bits) & Self::GENERATION_MASK
            }

            /// Whether this is the [`INVALID`](Self::INVALID) sentinel.
            #[inline]
            #[must_use]
            pub const fn is_invalid(self) -> bool {
                self.0 == <$raw>::MAX
            }
        }

        impl Handle for $name {
            const INDEX_BITS: u32 = $index_bits;
            const GENERATION_BITS: u32 = $generation_bits;

            #[inline]
            #[allow(clippy::cast_possible_truncation)]
            fn from_parts(index: u64, generation: u64) -> Self {
                Self::new(index as $raw, generation as $raw)
            }

            #[inline]
            fn slot_index(self) -> u64 {
                u64::from(self.index())
            }

            #[inline]
            fn version(self) -> u64 {
                u64::from(self.generation())
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::INVALID
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                if self.is_invalid() {
                    write!(f, "{}(INVALID)", stringify!($name))
                } else {
                    write!(f, "{}({}v{})", stringify!($name), self.index(), self.generation())
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}v{}", self.index(), self.generation())
            }
        }
    };
}

define_handle!(
    /// 32-bit handle: 20-bit index, 12-bit generation.
    Handle32(u32),
    index_bits = 20,
    generation_bits = 12
);

define_handle!(
    /// 64-bit handle: 40-bit index, 24-bit generation.
    Handle64(u64),
    index_bits = 40,
    generation_bits = 24
);

/// Identifier of a simulation object.
#[cfg(target_pointer_width = "64")]
pub type EntityId = Handle64;

/// Identifier of a simulation object.
#[cfg(not(target_pointer_width = "64"))]
pub type EntityId = Handle32;

#[derive(Clone, Copy, Debug)]
struct HandleSlot<R> {
    generation: u64,
    reference: Option<R>,
}

/// Generation-checked slot map from handles to references.
///
/// The table grows by a fixed block whenever every slot is in use.
///
/// # Performance
///
/// [`acquire`](Self::acquire) scans linearly for a free slot before
/// growing, so it is O(slots) in the worst case.
#[derive(Debug)]
pub struct HandleTable<R, H> {
    slots: Vec<HandleSlot<R>>,
    grow: usize,
    live: usize,
    _handle: PhantomData<H>,
}

impl<R: Copy, H: Handle> HandleTable<R, H> {
    /// Creates a table that grows by [`DEFAULT_HANDLE_TABLE_GROW`] slots.
    #[must_use]
    pub fn new() -> Self {
        Self::with_grow(DEFAULT_HANDLE_TABLE_GROW)
    }

    /// Creates a table that grows by `grow` slots, with one block ready.
    #[must_use]
    pub fn with_grow(grow: usize) -> Self {
        let grow = grow.max(1);
        let first_block = grow.min(usize::try_from(H::MAX_INDICES).unwrap_or(usize::MAX));
        Self {
            slots: vec![Self::vacant_slot(); first_block],
            grow,
            live: 0,
            _handle: PhantomData,
        }
    }

    /// Number of slots, live or free.
    #[inline]
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Number of slots holding a live reference.
    #[inline]
    #[must_use]
    pub const fn len(&self) -> usize {
        self.live
    }

    /// Whether no slot holds a live reference.
    #[inline]
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.live == 0
    }

    /// Stores `reference` in the first free slot and returns its handle.
    ///
    /// The slot generation is advanced, wrapping to
    /// [`Handle::MIN_GENERATION`] past [`Handle::MAX_GENERATION`].
    ///
    /// # Errors
    ///
    /// [`EcsError::HandleTableFull`] once the layout's index space is used up.
    pub fn acquire(&mut self, reference: R) -> EcsResult<H> {
        let index = match self.slots.iter().position(|slot| slot.reference.is_none()) {
            Some(index) => index,
            None => {
                let index = self.slots.len();
                self.grow_table()?;
                index
            }
        };

        let slot = &mut self.slots[index];
        slot.generation = if slot.generation + 1 > H::MAX_GENERATION {
            H::MIN_GENERATION
        } else {
            slot.generation + 1
        };
        slot.reference = Some(reference);
        self.live += 1;

        Ok(H::from_parts(index as u64, slot.generation))
    }

    /// Clears the slot `handle` refers to and returns its reference.
    ///
    /// The slot generation is left unchanged.
    ///
    /// # Errors
    ///
    /// [`EcsError::InvalidHandle`] if the handle does not currently resolve.
    pub fn release(&mut self, handle: H) -> EcsResult<R> {
        let reference = self
            .slot_for(handle)
            .and_then(|index| self.slots[index].reference.take())
            .ok_or(EcsError::InvalidHandle {
                index: handle.slot_index(),
                generation: handle.version(),
            })?;
        self.live -= 1;
        Ok(reference)
    }

    /// Resolves a handle, or `None` if it is stale or released.
    #[inline]
    #[must_use]
    pub fn get(&self, handle: H) -> Option<R> {
        self.slot_for(handle).and_then(|index| self.slots[index].reference)
    }

    /// Whether the handle still resolves.
    #[inline]
    #[must_use]
    pub fn contains(&self, handle: H) -> bool {
        self.get(handle).is_some()
    }

    /// Whether the slot has been reissued since this handle was created.
    #[inline]
    #[must_use]
    pub fn is_expired(&self, handle: H) -> bool {
        usize::try_from(handle.slot_index())
            .ok()
            .and_then(|index| self.slots.get(index))
            .map_or(true, |slot| slot.generation != handle.version())
    }

    /// The current handle of the slot at `index`, live or not.
    #[must_use]
    pub fn handle_at(&self, index: usize) -> Option<H> {
        self.slots
            .get(index)
            .map(|slot| H::from_parts(index as u64, slot.generation))
    }

    /// Iterates over every live `(handle, reference)` pair in slot order.
    pub fn iter(&self) -> impl Iterator<Item = (H, R)> + '_ {
        self.slots.iter().enumerate().filter_map(|(index, slot)| {
            slot.reference
                .map(|reference| (H::from_parts(index as u64, slot.generation), reference))
        })
    }

    fn slot_for(&self, handle: H) -> Option<usize> {
        let index = usize::try_from(handle.slot_index()).ok()?;
        let slot = self.slots.get(index)?;
        (slot.generation == handle.version()).then_some(index)
    }

    fn grow_table(&mut self) -> EcsResult<()> {
        let old_size = self.slots.len();
        let max = usize::try_from(H::MAX_INDICES).unwrap_or(usize::MAX);

        if old_size >= max {
            return Err(EcsError::HandleTableFull {
                capacity: H::MAX_INDICES,
            });
        }

        let new_size = old_size.saturating_add(self.grow).min(max);
        self.slots.resize(new_size, Self::vacant_slot());
        Ok(())
    }

    const fn vacant_slot() -> HandleSlot<R> {
        HandleSlot {
            generation: H::MIN_GENERATION,
            reference: None,
        }
    }
}

impl<R: Copy, H: Handle> Default for HandleTable<R, H> {
    fn default() -> Self {
        Self::new()
    }
}
