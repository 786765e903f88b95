// SPDX-License-Identifier: MIT OR Apache-2.0
//
// Copyright (c) 2023 Andre Richter <andre.o.richter@gmail.com>

//! Virtual storage devices.
//!
//! The loader reads every image through [`interface::IoDevice`], regardless of whether it comes
//! from a raw memory-mapped window or from a file on a FAT32 partition.

pub mod fat;
pub mod memmap;

use crate::{error::Error, uuid::Uuid};
use interface::BlockDevice;

//--------------------------------------------------------------------------------------------------
// Public Definitions
//--------------------------------------------------------------------------------------------------

/// Storage interfaces.
pub mod interface {
    use super::{Entity, ImageSpec};
    use crate::error::Error;

    /// Random access byte source, e.g. a memory-mapped flash window or a block driver.
    pub trait BlockDevice {
        /// Fill `buf` with the bytes starting at `offset`.
        fn read_at(&self, offset: u64, buf: &mut [u8]) -> Result<(), Error>;

        /// Size of the device in bytes.
        fn len(&self) -> u64;

        /// Whether the device has no content.
        fn is_empty(&self) -> bool {
            self.len() == 0
        }
    }

    /// The capability set of a virtual storage device.
    pub trait IoDevice {
        /// Open the object described by `spec`.
        fn open(&mut self, spec: &ImageSpec) -> Result<Entity, Error>;

        /// Size of the opened object in bytes.
        fn size(&mut self, entity: &Entity) -> Result<usize, Error>;

        /// Read up to `buf.len()` bytes from the current position of the opened object.
        ///
        /// Returns the number of bytes read. Subsequent reads continue where the last one stopped.
        fn read(&mut self, entity: &mut Entity, buf: &mut [u8]) -> Result<usize, Error>;

        /// Close the opened object. Always succeeds.
        fn close(&mut self, entity: Entity);
    }
}

/// What to open on a device.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ImageSpec {
    /// An image named by identifier, for devices that keep a name table.
    Uuid(Uuid),
    /// A raw byte range of the backing device.
    Block { offset: u64, length: usize },
}

/// Token for an opened object, handed out by [`interface::IoDevice::open`].
#[derive(Debug, PartialEq, Eq)]
pub struct Entity {
    token: usize,
}

//--------------------------------------------------------------------------------------------------
// Public Code
//--------------------------------------------------------------------------------------------------

impl Entity {
    pub(crate) const fn new(token: usize) -> Self {
        Self { token }
    }

    pub(crate) const fn token(&self) -> usize {
        self.token
    }
}

impl BlockDevice for [u8] {
    fn read_at(&self, offset: u64, buf: &mut [u8]) -> Result<(), Error> {
        let start = usize::try_from(offset).map_err(|_| Error::IoFailure)?;
        let src = start
            .checked_add(buf.len())
            .and_then(|end| self.get(start..end))
            .ok_or(Error::IoFailure)?;

        buf.copy_from_slice(src);
        Ok(())
    }

    fn len(&self) -> u64 {
        <[u8]>::len(self) as u64
    }
}

impl<T> BlockDevice for &T
where
    T: BlockDevice + ?Sized,
{
    fn read_at(&self, offset: u64, buf: &mut [u8]) -> Result<(), Error> {
        (**self).read_at(offset, buf)
    }

    fn len(&self) -> u64 {
        (**self).len()
    }
}
