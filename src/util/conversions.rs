use crate::util::constants::*;

pub const fn raw_align_up(val: usize, align: usize) -> usize {
    // See https://github.com/rust-lang/rust/blob/e620d0f337d0643c757bab791fc7d88d63217704/src/libcore/alloc.rs#L192
    val.wrapping_add(align).wrapping_sub(1) & !align.wrapping_sub(1)
}

pub const fn raw_align_down(val: usize, align: usize) -> usize {
    val & !align.wrapping_sub(1)
}

pub const fn raw_is_aligned(val: usize, align: usize) -> bool {
    val & align.wrapping_sub(1) == 0
}

pub fn bytes_to_pages_up(bytes: usize) -> usize {
    (bytes + BYTES_IN_PAGE - 1) >> LOG_BYTES_IN_PAGE
}

pub const fn bytes_to_words_up(bytes: usize) -> usize {
    raw_align_up(bytes, BYTES_IN_WORD) >> LOG_BYTES_IN_WORD
}

/// Format a byte count with the largest unit that divides it, e.g. `64M`, `12K`, `100B`.
pub fn bytes_to_formatted_string(bytes: usize) -> String {
    if bytes >= BYTES_IN_MBYTE && bytes % BYTES_IN_MBYTE == 0 {
        format!("{}M", bytes >> LOG_BYTES_IN_MBYTE)
    } else if bytes >= BYTES_IN_KBYTE && bytes % BYTES_IN_KBYTE == 0 {
        format!("{}K", bytes >> LOG_BYTES_IN_KBYTE)
    } else {
        format!("{}B", bytes)
    }
}
