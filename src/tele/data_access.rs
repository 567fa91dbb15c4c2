//! Reading and writing the memory of the observed process.

use crate::util::constants::BYTES_IN_WORD;
use crate::util::Address;
use std::fmt;

/// A read or write of the observed process's memory failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DataIoError {
    pub address: Address,
    pub size: usize,
}

impl fmt::Display for DataIoError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "cannot access {} bytes at {}", self.size, self.address)
    }
}

impl std::error::Error for DataIoError {}

/// Byte-level access to the memory of the observed process.
///
/// Words are native-endian and `BYTES_IN_WORD` wide: the inspector and the observed
/// process run on the same platform.
pub trait DataAccess: Send + Sync {
    fn read_bytes(&self, address: Address, buffer: &mut [u8]) -> Result<(), DataIoError>;

    fn write_bytes(&self, address: Address, bytes: &[u8]) -> Result<(), DataIoError>;

    fn read_word(&self, address: Address) -> Result<usize, DataIoError> {
        let mut buffer = [0u8; BYTES_IN_WORD];
        self.read_bytes(address, &mut buffer)?;
        Ok(usize::from_ne_bytes(buffer))
    }

    fn write_word(&self, address: Address, value: usize) -> Result<(), DataIoError> {
        self.write_bytes(address, &value.to_ne_bytes())
    }

    fn read_u64(&self, address: Address) -> Result<u64, DataIoError> {
        let mut buffer = [0u8; 8];
        self.read_bytes(address, &mut buffer)?;
        Ok(u64::from_ne_bytes(buffer))
    }

    fn read_address(&self, address: Address) -> Result<Address, DataIoError> {
        self.read_word(address)
            .map(|word| unsafe { Address::from_usize(word) })
    }
}

/// Access to the memory of the current process, for an inspector that runs in the
/// same address space as the heap it observes.
pub struct LocalDataAccess {
    _private: (),
}

impl LocalDataAccess {
    /// # Safety
    /// Every address passed to this accessor must be mapped and readable (and
    /// writable, for writes) in the current process. Only the zero page is checked.
    pub unsafe fn new() -> Self {
        LocalDataAccess { _private: () }
    }

    fn check(address: Address, size: usize) -> Result<(), DataIoError> {
        if address.as_usize() < crate::util::constants::BYTES_IN_PAGE {
            Err(DataIoError { address, size })
        } else {
            Ok(())
        }
    }
}

impl DataAccess for LocalDataAccess {
    fn read_bytes(&self, address: Address, buffer: &mut [u8]) -> Result<(), DataIoError> {
        Self::check(address, buffer.len())?;
        unsafe {
            std::ptr::copy_nonoverlapping(address.to_ptr::<u8>(), buffer.as_mut_ptr(), buffer.len());
        }
        Ok(())
    }

    fn write_bytes(&self, address: Address, bytes: &[u8]) -> Result<(), DataIoError> {
        Self::check(address, bytes.len())?;
        unsafe {
            std::ptr::copy_nonoverlapping(bytes.as_ptr(), address.to_mut_ptr::<u8>(), bytes.len());
        }
        Ok(())
    }
}
