//! In-memory file table persisted as a ustar archive on a block device.
//!
//! The whole table is read at mount time and the whole archive range is
//! rewritten after every modification.
#![cfg_attr(not(test), no_std)]

use core::fmt;

use block_io::BlockDevice;
use dataview::PodMethods as _;
use ox32_fs_types::{BLOCK_SIZE, HeaderError, UstarHeader, entry_size};
use ox32_kernel_params::{DISK_MAX_SIZE, FILE_DATA_MAX, FILE_NAME_MAX, FILES_MAX, SECTOR_SIZE};

const _: () = assert!(BLOCK_SIZE == SECTOR_SIZE);

/// Number of sectors in the archive range.
pub const DISK_SECTORS: usize = DISK_MAX_SIZE / SECTOR_SIZE;

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum FsError {
    #[error("file not found")]
    NotFound,
    #[error("file table full")]
    TableFull,
    #[error("file name too long")]
    NameTooLong,
    #[error("file name is empty or contains NUL")]
    InvalidName,
    #[error("no block device mounted")]
    NotMounted,
    #[error("corrupt archive at offset {offset}: {source}")]
    CorruptArchive { offset: usize, source: HeaderError },
    #[error("archive entry at offset {offset} has {size} bytes of data")]
    FileTooLarge { offset: usize, size: usize },
    #[error("archive entry at offset {offset} runs past the archive range")]
    Truncated { offset: usize },
    #[error("device too small: {sectors} sectors")]
    DiskTooSmall { sectors: usize },
    #[error("I/O error at sector {sector}")]
    Io { sector: usize },
}

/// A file table slot.
#[derive(Clone, Copy)]
pub struct File {
    in_use: bool,
    name: [u8; FILE_NAME_MAX],
    name_len: usize,
    size: usize,
    data: [u8; FILE_DATA_MAX],
}

impl fmt::Debug for File {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("File")
            .field("name", &format_args!("{}", self.name().escape_ascii()))
            .field("size", &self.size)
            .finish_non_exhaustive()
    }
}

impl File {
    const EMPTY: Self = Self {
        in_use: false,
        name: [0; FILE_NAME_MAX],
        name_len: 0,
        size: 0,
        data: [0; FILE_DATA_MAX],
    };

    #[must_use]
    pub fn name(&self) -> &[u8] {
        &self.name[..self.name_len]
    }

    #[must_use]
    pub fn size(&self) -> usize {
        self.size
    }

    #[must_use]
    pub fn data(&self) -> &[u8] {
        &self.data[..self.size]
    }

    fn set_name(&mut self, name: &[u8]) {
        self.name = [0; FILE_NAME_MAX];
        self.name[..name.len()].copy_from_slice(name);
        self.name_len = name.len();
    }

    fn set_data(&mut self, data: &[u8]) {
        self.data[..data.len()].copy_from_slice(data);
        self.data[data.len()..].fill(0);
        self.size = data.len();
    }
}

/// The file table, its staging buffer, and the device backing them.
pub struct FileStore<D> {
    device: Option<D>,
    files: [File; FILES_MAX],
    staging: [u8; DISK_MAX_SIZE],
}

impl<D> fmt::Debug for FileStore<D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FileStore")
            .field("mounted", &self.device.is_some())
            .field("files", &self.iter().count())
            .finish_non_exhaustive()
    }
}

impl<D> Default for FileStore<D> {
    fn default() -> Self {
        Self::new()
    }
}

impl<D> FileStore<D> {
    /// Creates an empty, unmounted store.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            device: None,
            files: [File::EMPTY; FILES_MAX],
            staging: [0; DISK_MAX_SIZE],
        }
    }

    /// Returns the in-use files in table order.
    pub fn iter(&self) -> impl Iterator<Item = &File> {
        self.files.iter().filter(|f| f.in_use)
    }

    /// Finds the file named `name`.
    #[must_use]
    pub fn lookup(&self, name: &[u8]) -> Option<&File> {
        self.iter().find(|f| f.name() == name)
    }

    /// Copies the contents of `name` into `buf`, clamped to the file size.
    ///
    /// Returns the number of bytes copied.
    pub fn read(&self, name: &[u8], buf: &mut [u8]) -> Result<usize, FsError> {
        let file = self.lookup(name).ok_or(FsError::NotFound)?;
        let len = usize::min(buf.len(), file.size);
        buf[..len].copy_from_slice(&file.data[..len]);
        Ok(len)
    }
}

impl<D> FileStore<D>
where
    D: BlockDevice<SECTOR_SIZE>,
    D::Error: fmt::Debug,
{
    /// Attaches `device` and loads the file table from it.
    pub fn mount(&mut self, device: D) -> Result<(), FsError> {
        self.device = Some(device);
        self.load()
    }

    /// Detaches and returns the device.
    pub fn unmount(&mut self) -> Option<D> {
        self.device.take()
    }

    #[must_use]
    pub fn device(&self) -> Option<&D> {
        self.device.as_ref()
    }

    /// Reads the archive range and rebuilds the file table from it.
    ///
    /// Sectors past the end of the device read as zeros.
    pub fn load(&mut self) -> Result<(), FsError> {
        let device = self.device.as_mut().ok_or(FsError::NotMounted)?;

        self.staging.fill(0);
        let sectors = usize::min(device.block_count(), DISK_SECTORS);
        let (blocks, _) = self.staging.as_chunks_mut::<SECTOR_SIZE>();
        for (sector, block) in blocks.iter_mut().enumerate().take(sectors) {
            device.read(sector, block).map_err(|e| {
                log::warn!("file store: failed to read sector {sector}: {e:?}");
                FsError::Io { sector }
            })?;
        }

        self.files = [File::EMPTY; FILES_MAX];
        let mut offset = 0;
        for file in &mut self.files {
            if offset + BLOCK_SIZE > self.staging.len() {
                break;
            }
            let header = UstarHeader::from_block(&self.staging[offset..]);
            if header.is_end() {
                break;
            }
            let corrupt = |source| FsError::CorruptArchive { offset, source };
            header.validate().map_err(corrupt)?;
            let size = header.size().map_err(corrupt)?;
            let name = header.name();
            if name.len() >= FILE_NAME_MAX {
                return Err(corrupt(HeaderError::NameTooLong));
            }
            if size > FILE_DATA_MAX {
                return Err(FsError::FileTooLarge { offset, size });
            }
            let data_start = offset + BLOCK_SIZE;
            let Some(data) = self.staging.get(data_start..data_start + size) else {
                return Err(FsError::Truncated { offset });
            };

            file.in_use = true;
            file.set_name(name);
            file.set_data(data);
            log::debug!(
                "file store: file: {}, size={size}",
                name.escape_ascii()
            );

            offset += entry_size(size);
        }

        Ok(())
    }

    /// Writes the whole file table to the archive range.
    pub fn persist(&mut self) -> Result<(), FsError> {
        let device = self.device.as_mut().ok_or(FsError::NotMounted)?;
        let sectors = device.block_count();
        if sectors < DISK_SECTORS {
            log::warn!("file store: device has {sectors} sectors, need {DISK_SECTORS}");
            return Err(FsError::DiskTooSmall { sectors });
        }

        self.staging.fill(0);
        let mut offset = 0;
        for file in self.files.iter().filter(|f| f.in_use) {
            let header = UstarHeader::new(file.name(), file.size).map_err(|source| {
                FsError::CorruptArchive { offset, source }
            })?;
            self.staging[offset..offset + BLOCK_SIZE].copy_from_slice(header.as_bytes());
            let data_start = offset + BLOCK_SIZE;
            self.staging[data_start..data_start + file.size].copy_from_slice(file.data());
            offset += entry_size(file.size);
        }

        let (blocks, _) = self.staging.as_chunks::<SECTOR_SIZE>();
        for (sector, block) in blocks.iter().enumerate() {
            device.write(sector, block).map_err(|e| {
                log::warn!("file store: failed to write sector {sector}: {e:?}");
                FsError::Io { sector }
            })?;
        }

        Ok(())
    }

    /// Replaces the contents of `name` with `data`, creating the file if it
    /// does not exist, and persists the table.
    ///
    /// `data` is clamped to [`FILE_DATA_MAX`] bytes. Returns the number of
    /// bytes stored. If persisting fails the table is left as it was.
    pub fn write(&mut self, name: &[u8], data: &[u8]) -> Result<usize, FsError> {
        if self.device.is_none() {
            return Err(FsError::NotMounted);
        }
        if name.len() >= FILE_NAME_MAX {
            return Err(FsError::NameTooLong);
        }
        if name.is_empty() || name.contains(&0) {
            return Err(FsError::InvalidName);
        }

        let idx = match self.files.iter().position(|f| f.in_use && f.name() == name) {
            Some(idx) => idx,
            None => self
                .files
                .iter()
                .position(|f| !f.in_use)
                .ok_or(FsError::TableFull)?,
        };

        let saved = self.files[idx];
        let file = &mut self.files[idx];
        if !file.in_use {
            file.in_use = true;
            file.set_name(name);
        }
        let len = usize::min(data.len(), FILE_DATA_MAX);
        file.set_data(&data[..len]);

        if let Err(e) = self.persist() {
            self.files[idx] = saved;
            return Err(e);
        }
        Ok(len)
    }
}
