use crate::util::Address;
use std::io::{Error, Result};

/// Zero `len` bytes starting at `start`.
pub fn zero(start: Address, len: usize) {
    if len == 0 {
        return;
    }
    let ptr = start.to_mut_ptr::<libc::c_void>();
    unsafe { libc::memset(ptr, 0, len) };
}

/// Demand-zero mmap at an address chosen by the OS.
/// This function guarantees to zero all mapped memory. The returned address is
/// aligned to `align`, which must be a power of two no smaller than a page; the
/// mapping is over-reserved and trimmed so only `[start, start + size)` stays mapped.
pub fn dzmmap_anywhere(size: usize, align: usize) -> Result<Address> {
    debug_assert!(align.is_power_of_two());
    let reserve = size + align;
    let prot = libc::PROT_READ | libc::PROT_WRITE;
    let flags = libc::MAP_ANON | libc::MAP_PRIVATE | libc::MAP_NORESERVE;
    let ret = unsafe { libc::mmap(std::ptr::null_mut(), reserve, prot, flags, -1, 0) };
    if ret == libc::MAP_FAILED {
        return Err(Error::last_os_error());
    }
    let raw = Address::from_mut_ptr(ret);
    let start = raw.align_up(align);
    let end = start + size;
    // Trim the unaligned head and the unused tail.
    if start > raw {
        munmap(raw, start - raw)?;
    }
    let raw_end = raw + reserve;
    if raw_end > end {
        munmap(end, raw_end - end)?;
    }
    Ok(start)
}

/// Unmap `[start, start + size)`.
pub fn munmap(start: Address, size: usize) -> Result<()> {
    let result = unsafe { libc::munmap(start.to_mut_ptr(), size) };
    if result == -1 {
        Err(Error::last_os_error())
    } else {
        Ok(())
    }
}

/// An owned anonymous mapping. The memory is unmapped when this is dropped.
pub struct Mapping {
    start: Address,
    size: usize,
}

impl Mapping {
    /// Map `size` bytes of zeroed memory aligned to `align`.
    pub fn new(size: usize, align: usize) -> Result<Self> {
        let start = dzmmap_anywhere(size, align)?;
        Ok(Mapping { start, size })
    }

    pub fn start(&self) -> Address {
        self.start
    }

    pub fn end(&self) -> Address {
        self.start + self.size
    }

    pub fn size(&self) -> usize {
        self.size
    }
}

impl Drop for Mapping {
    fn drop(&mut self) {
        if let Err(e) = munmap(self.start, self.size) {
            warn!("Failed to unmap {} ({} bytes): {}", self.start, self.size, e);
        }
    }
}
