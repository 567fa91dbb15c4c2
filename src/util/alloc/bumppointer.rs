use crate::util::Address;

/// A cursor and a limit. Allocation bumps the cursor, and fails past the limit.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct BumpPointer {
    pub cursor: Address,
    pub limit: Address,
}

impl BumpPointer {
    pub const fn new(start: Address, end: Address) -> Self {
        BumpPointer {
            cursor: start,
            limit: end,
        }
    }

    /// An empty bump pointer: every allocation fails.
    pub const fn empty() -> Self {
        Self::new(Address::ZERO, Address::ZERO)
    }

    pub fn reset(&mut self, start: Address, end: Address) {
        self.cursor = start;
        self.limit = end;
    }

    pub fn is_empty(&self) -> bool {
        self.cursor.is_zero()
    }

    /// Allocate `size` bytes. `size` must already be aligned.
    pub fn alloc(&mut self, size: usize) -> Option<Address> {
        let result = self.cursor;
        let new_cursor = result + size;
        if !result.is_zero() && new_cursor <= self.limit {
            self.cursor = new_cursor;
            Some(result)
        } else {
            None
        }
    }
}
