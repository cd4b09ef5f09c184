//! Shared table layout

/// Number of slots in the table
pub const TABLE_SIZE: usize = 2;

/// Item type stored in the table
pub type Item = i32;

/// Fixed-capacity stack of items stored in shared memory
///
/// Layout matches `struct { int items[TABLE_SIZE]; int count; }` so the
/// segment is readable by any participant using the same constant.
/// Callers must hold the table's `mutex` semaphore; see
/// [`CriticalSection`](crate::CriticalSection).
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SharedTable {
    /// Slots; only `items[..count]` are valid
    items: [Item; TABLE_SIZE],
    /// Number of valid items
    count: i32,
}

impl SharedTable {
    /// Size of SharedTable in bytes
    pub const SIZE: usize = std::mem::size_of::<Self>();

    pub const fn new() -> Self {
        Self {
            items: [0; TABLE_SIZE],
            count: 0,
        }
    }

    pub const fn capacity(&self) -> usize {
        TABLE_SIZE
    }

    /// Number of valid items, or `None` if `count` was corrupted
    fn checked_len(&self) -> Option<usize> {
        usize::try_from(self.count)
            .ok()
            .filter(|&len| len <= TABLE_SIZE)
    }

    /// False if the stored count is outside `0..=TABLE_SIZE`
    pub fn is_consistent(&self) -> bool {
        self.checked_len().is_some()
    }

    /// Number of valid items. A corrupted count reads as full.
    pub fn len(&self) -> usize {
        self.checked_len().unwrap_or(TABLE_SIZE)
    }

    pub fn is_empty(&self) -> bool {
        self.checked_len() == Some(0)
    }

    pub fn is_full(&self) -> bool {
        self.checked_len().map_or(true, |len| len == TABLE_SIZE)
    }

    /// Append `item` on top. Returns `false` if there is no free slot.
    pub fn try_push(&mut self, item: Item) -> bool {
        match self.checked_len() {
            Some(len) if len < TABLE_SIZE => {
                self.items[len] = item;
                self.count += 1;
                true
            }
            _ => false,
        }
    }

    /// Remove and return the most recently pushed item
    pub fn try_pop(&mut self) -> Option<Item> {
        match self.checked_len() {
            Some(len) if len > 0 => {
                self.count -= 1;
                Some(self.items[len - 1])
            }
            _ => None,
        }
    }

    /// Valid items, bottom first
    pub fn as_slice(&self) -> &[Item] {
        &self.items[..self.checked_len().unwrap_or(0)]
    }
}
