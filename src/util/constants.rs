/// log2 of the number of bytes in a megabyte
pub const LOG_BYTES_IN_MBYTE: u8 = 20;
/// The number of bytes in a megabyte
pub const BYTES_IN_MBYTE: usize = 1 << LOG_BYTES_IN_MBYTE;

/// log2 of the number of bytes in a kilobyte
pub const LOG_BYTES_IN_KBYTE: u8 = 10;
/// The number of bytes in a kilobyte
pub const BYTES_IN_KBYTE: usize = 1 << LOG_BYTES_IN_KBYTE;

/// log2 of the number of bytes in a word
#[cfg(target_pointer_width = "64")]
pub const LOG_BYTES_IN_WORD: u8 = 3;
/// log2 of the number of bytes in a word
#[cfg(target_pointer_width = "32")]
pub const LOG_BYTES_IN_WORD: u8 = 2;
/// The number of bytes in a word. Addresses, forwarding words and root slots are all one word.
pub const BYTES_IN_WORD: usize = 1 << LOG_BYTES_IN_WORD;

/// log2 of the number of bytes in a page
pub const LOG_BYTES_IN_PAGE: u8 = 12;
/// The number of bytes in a page
pub const BYTES_IN_PAGE: usize = 1 << LOG_BYTES_IN_PAGE;

/// log2 of the number of bytes covered by one card
pub const LOG_BYTES_IN_CARD: u8 = 9;
/// The number of bytes covered by one card
pub const BYTES_IN_CARD: usize = 1 << LOG_BYTES_IN_CARD;

/// The smallest TLAB granularity. Belt boundaries and the heap size are multiples of it.
pub const MIN_TLAB_SIZE: usize = BYTES_IN_PAGE;

/// The maximum number of memory regions published to an inspector.
pub const MAX_MEMORY_REGIONS: usize = 8;

/// The default number of inspector root slots: one megabyte worth of words.
pub const DEFAULT_MAX_INSPECTOR_ROOTS: usize = BYTES_IN_MBYTE / BYTES_IN_WORD;
