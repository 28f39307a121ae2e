use crate::BlockDevice;

/// Error returned by [`MemoryDisk`] for accesses past its end.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OutOfRange(pub usize);

/// A block device backed by host memory, counting accesses.
#[derive(Debug, Clone)]
pub struct MemoryDisk<const BLOCK_SIZE: usize> {
    blocks: Vec<[u8; BLOCK_SIZE]>,
    reads: usize,
    writes: usize,
}

impl<const BLOCK_SIZE: usize> MemoryDisk<BLOCK_SIZE> {
    #[must_use]
    pub fn new(block_count: usize) -> Self {
        Self {
            blocks: vec![[0; BLOCK_SIZE]; block_count],
            reads: 0,
            writes: 0,
        }
    }

    /// Creates a disk holding `image`, zero-padded to whole blocks.
    #[must_use]
    pub fn from_image(image: &[u8]) -> Self {
        let mut disk = Self::new(image.len().div_ceil(BLOCK_SIZE));
        for (block, chunk) in disk.blocks.iter_mut().zip(image.chunks(BLOCK_SIZE)) {
            block[..chunk.len()].copy_from_slice(chunk);
        }
        disk
    }

    /// Returns the disk contents as one byte vector.
    #[must_use]
    pub fn image(&self) -> Vec<u8> {
        self.blocks.concat()
    }

    #[must_use]
    pub fn reads(&self) -> usize {
        self.reads
    }

    #[must_use]
    pub fn writes(&self) -> usize {
        self.writes
    }
}

impl<const BLOCK_SIZE: usize> BlockDevice<BLOCK_SIZE> for MemoryDisk<BLOCK_SIZE> {
    type Error = OutOfRange;

    fn block_count(&self) -> usize {
        self.blocks.len()
    }

    fn read(&mut self, block_index: usize, data: &mut [u8; BLOCK_SIZE]) -> Result<(), Self::Error> {
        let block = self.blocks.get(block_index).ok_or(OutOfRange(block_index))?;
        data.copy_from_slice(block);
        self.reads += 1;
        Ok(())
    }

    fn write(&mut self, block_index: usize, data: &[u8; BLOCK_SIZE]) -> Result<(), Self::Error> {
        let block = self
            .blocks
            .get_mut(block_index)
            .ok_or(OutOfRange(block_index))?;
        block.copy_from_slice(data);
        self.writes += 1;
        Ok(())
    }
}
