//! Block device interface shared by disk drivers and the file store.
#![cfg_attr(not(any(test, feature = "std")), no_std)]

#[cfg(any(test, feature = "std"))]
pub use self::memory::{MemoryDisk, OutOfRange};

#[cfg(any(test, feature = "std"))]
mod memory;

/// A trait representing a block device with a fixed block size.
///
/// # Constants
///
/// * `BLOCK_SIZE`: The size of each block in bytes.
pub trait BlockDevice<const BLOCK_SIZE: usize> {
    /// The error type that can be returned by the block device operations.
    type Error;

    /// Returns the number of blocks on the device.
    fn block_count(&self) -> usize;

    /// Reads a block of data from the device at the specified index into the
    /// provided buffer.
    ///
    /// Returns `Ok(())` if the read operation is successful, or an error of
    /// type `Self::Error` if it fails.
    fn read(&mut self, block_index: usize, data: &mut [u8; BLOCK_SIZE]) -> Result<(), Self::Error>;

    /// Writes a block of data to the device at the specified index from the
    /// provided buffer.
    ///
    /// Returns `Ok(())` if the write operation is successful, or an error of
    /// type `Self::Error` if it fails.
    fn write(&mut self, block_index: usize, data: &[u8; BLOCK_SIZE]) -> Result<(), Self::Error>;
}

impl<D, const BLOCK_SIZE: usize> BlockDevice<BLOCK_SIZE> for &mut D
where
    D: BlockDevice<BLOCK_SIZE> + ?Sized,
{
    type Error = D::Error;

    fn block_count(&self) -> usize {
        (**self).block_count()
    }

    fn read(&mut self, block_index: usize, data: &mut [u8; BLOCK_SIZE]) -> Result<(), Self::Error> {
        (**self).read(block_index, data)
    }

    fn write(&mut self, block_index: usize, data: &[u8; BLOCK_SIZE]) -> Result<(), Self::Error> {
        (**self).write(block_index, data)
    }
}
