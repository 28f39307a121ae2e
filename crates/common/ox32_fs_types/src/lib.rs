//! On-disk layout of the file store.
//!
//! The disk holds a POSIX ustar archive. Each file is a 512-byte
//! [`UstarHeader`] immediately followed by its contents, padded up to the
//! next multiple of 512 bytes. A header whose name starts with NUL ends the
//! archive.
//!
//! | offset | size | field      | encoding                          |
//! |--------|------|------------|-----------------------------------|
//! | 0      | 100  | `name`     | NUL-terminated bytes              |
//! | 100    | 8    | `mode`     | octal                             |
//! | 124    | 12   | `size`     | 11 octal digits + NUL             |
//! | 148    | 8    | `checksum` | 6 octal digits + NUL + space      |
//! | 156    | 1    | `type`     | `'0'` for a regular file          |
//! | 257    | 6    | `magic`    | `"ustar\0"`                       |
//! | 263    | 2    | `version`  | `"00"`                            |
#![cfg_attr(not(test), no_std)]

use dataview::{Pod, PodMethods as _};

/// Size of an archive header, and the granularity of archive entries.
pub const BLOCK_SIZE: usize = 512;

pub const USTAR_MAGIC: [u8; 6] = *b"ustar\0";
pub const USTAR_VERSION: [u8; 2] = *b"00";

/// Type flag of a regular file.
pub const TYPE_REGULAR: u8 = b'0';

const DEFAULT_MODE: &[u8] = b"000644";

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum HeaderError {
    #[error("invalid magic")]
    BadMagic,
    #[error("invalid version")]
    BadVersion,
    #[error("invalid octal field")]
    BadOctal,
    #[error("value does not fit in octal field")]
    OctalOverflow,
    #[error("checksum mismatch: stored={stored:#o}, computed={computed:#o}")]
    ChecksumMismatch { stored: usize, computed: usize },
    #[error("file name too long")]
    NameTooLong,
}

#[repr(C)]
#[derive(Clone, Copy, Pod)]
pub struct UstarHeader {
    pub name: [u8; 100],
    pub mode: [u8; 8],
    pub uid: [u8; 8],
    pub gid: [u8; 8],
    pub size: [u8; 12],
    pub mtime: [u8; 12],
    pub checksum: [u8; 8],
    pub ty: u8,
    pub linkname: [u8; 100],
    pub magic: [u8; 6],
    pub version: [u8; 2],
    pub uname: [u8; 32],
    pub gname: [u8; 32],
    pub devmajor: [u8; 8],
    pub devminor: [u8; 8],
    pub prefix: [u8; 155],
    pub padding: [u8; 12],
}

const _: () = assert!(size_of::<UstarHeader>() == BLOCK_SIZE);

impl UstarHeader {
    /// Builds the header of a regular file, with a valid checksum.
    ///
    /// `name` must leave room for the terminating NUL.
    pub fn new(name: &[u8], size: usize) -> Result<Self, HeaderError> {
        let mut hdr = Self::zeroed();
        if name.len() >= hdr.name.len() {
            return Err(HeaderError::NameTooLong);
        }
        hdr.name[..name.len()].copy_from_slice(name);
        hdr.mode[..DEFAULT_MODE.len()].copy_from_slice(DEFAULT_MODE);
        write_octal(&mut hdr.size, size)?;
        hdr.ty = TYPE_REGULAR;
        hdr.magic = USTAR_MAGIC;
        hdr.version = USTAR_VERSION;
        hdr.seal();
        Ok(hdr)
    }

    /// Reads a header from the first [`BLOCK_SIZE`] bytes of `block`.
    ///
    /// # Panics
    ///
    /// Panics if `block` is shorter than [`BLOCK_SIZE`].
    #[must_use]
    pub fn from_block(block: &[u8]) -> Self {
        let mut hdr = Self::zeroed();
        hdr.as_bytes_mut().copy_from_slice(&block[..BLOCK_SIZE]);
        hdr
    }

    /// Returns `true` if this header terminates the archive.
    #[must_use]
    pub fn is_end(&self) -> bool {
        self.name[0] == 0
    }

    /// Returns the file name, without the terminating NUL.
    #[must_use]
    pub fn name(&self) -> &[u8] {
        let len = memchr::memchr(0, &self.name).unwrap_or(self.name.len());
        &self.name[..len]
    }

    pub fn size(&self) -> Result<usize, HeaderError> {
        parse_octal(&self.size)
    }

    /// Checks the magic, version, and checksum fields.
    pub fn validate(&self) -> Result<(), HeaderError> {
        if self.magic != USTAR_MAGIC {
            return Err(HeaderError::BadMagic);
        }
        if self.version != USTAR_VERSION {
            return Err(HeaderError::BadVersion);
        }
        let stored = parse_octal(&self.checksum)?;
        let computed = self.compute_checksum();
        if stored != computed {
            return Err(HeaderError::ChecksumMismatch { stored, computed });
        }
        Ok(())
    }

    /// Sums every header byte, counting the checksum field as spaces.
    #[must_use]
    pub fn compute_checksum(&self) -> usize {
        let bytes = self.as_bytes();
        let start = core::mem::offset_of!(Self, checksum);
        let end = start + self.checksum.len();
        bytes
            .iter()
            .enumerate()
            .map(|(i, b)| {
                if (start..end).contains(&i) {
                    usize::from(b' ')
                } else {
                    usize::from(*b)
                }
            })
            .sum()
    }

    /// Recomputes the checksum field.
    pub fn seal(&mut self) {
        let sum = self.compute_checksum();
        // 6 digits, NUL, space. The sum of 512 bytes never exceeds 6 digits.
        let mut field = [0; 8];
        let _ = write_octal(&mut field[..7], sum);
        field[7] = b' ';
        self.checksum = field;
    }
}

/// Parses a NUL- or space-terminated octal field.
///
/// Leading spaces are skipped. An empty field is zero.
pub fn parse_octal(field: &[u8]) -> Result<usize, HeaderError> {
    let mut value: usize = 0;
    let digits = field
        .iter()
        .copied()
        .skip_while(|&b| b == b' ')
        .take_while(|&b| b != 0 && b != b' ');
    for b in digits {
        if !(b'0'..=b'7').contains(&b) {
            return Err(HeaderError::BadOctal);
        }
        value = value
            .checked_mul(8)
            .and_then(|v| v.checked_add(usize::from(b - b'0')))
            .ok_or(HeaderError::BadOctal)?;
    }
    Ok(value)
}

/// Writes `value` as zero-padded octal digits followed by a NUL.
///
/// All but the last byte of `field` are digits.
pub fn write_octal(field: &mut [u8], mut value: usize) -> Result<(), HeaderError> {
    let Some((nul, digits)) = field.split_last_mut() else {
        return Err(HeaderError::OctalOverflow);
    };
    *nul = 0;
    for d in digits.iter_mut().rev() {
        *d = b"01234567"[value % 8];
        value /= 8;
    }
    if value != 0 {
        return Err(HeaderError::OctalOverflow);
    }
    Ok(())
}

/// Returns the number of archive bytes an entry of `size` bytes occupies.
#[must_use]
pub const fn entry_size(size: usize) -> usize {
    BLOCK_SIZE + size.next_multiple_of(BLOCK_SIZE)
}
