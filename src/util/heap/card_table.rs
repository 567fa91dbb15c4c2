use crate::util::constants::{BYTES_IN_CARD, LOG_BYTES_IN_CARD};
use crate::util::Address;
use std::sync::atomic::{AtomicU8, Ordering};

const CLEAN: u8 = 0;
const DIRTY: u8 = 1;

/// One byte per card over the whole heap. A dirty card records that a reference
/// was stored into an object overlapping the card since the last collection.
pub struct CardTable {
    base: Address,
    cards: Vec<AtomicU8>,
}

impl CardTable {
    pub fn new(base: Address, heap_size: usize) -> Self {
        let num_cards = heap_size.div_ceil(BYTES_IN_CARD);
        CardTable {
            base,
            cards: (0..num_cards).map(|_| AtomicU8::new(CLEAN)).collect(),
        }
    }

    fn index(&self, addr: Address) -> usize {
        (addr - self.base) >> LOG_BYTES_IN_CARD
    }

    pub fn mark(&self, addr: Address) {
        let index = self.index(addr);
        self.cards[index].store(DIRTY, Ordering::Relaxed);
    }

    pub fn is_marked(&self, addr: Address) -> bool {
        self.cards[self.index(addr)].load(Ordering::Relaxed) == DIRTY
    }

    pub fn num_marked(&self) -> usize {
        self.cards
            .iter()
            .filter(|c| c.load(Ordering::Relaxed) == DIRTY)
            .count()
    }

    pub fn clear_all_cards(&self) {
        for card in &self.cards {
            card.store(CLEAN, Ordering::Relaxed);
        }
    }
}
