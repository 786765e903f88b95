// SPDX-License-Identifier: MIT OR Apache-2.0
//
// Copyright (c) 2023 Andre Richter <andre.o.richter@gmail.com>

//! Memory-mapped storage device.
//!
//! Serves raw byte ranges of a memory window, e.g. a NOR flash mapped into the physical address
//! space or a partition preloaded by the boot ROM.

use super::{
    interface::{self, BlockDevice},
    Entity, ImageSpec,
};
use crate::{error::Error, warn};

//--------------------------------------------------------------------------------------------------
// Private Definitions
//--------------------------------------------------------------------------------------------------

#[derive(Copy, Clone)]
struct OpenRange {
    offset: u64,
    length: usize,
    pos: usize,
}

//--------------------------------------------------------------------------------------------------
// Public Definitions
//--------------------------------------------------------------------------------------------------

/// A memory window exposed as a virtual storage device with one open range at a time.
pub struct MemmapDevice<'a> {
    window: &'a [u8],
    open: Option<OpenRange>,
}

//--------------------------------------------------------------------------------------------------
// Public Code
//--------------------------------------------------------------------------------------------------

impl<'a> MemmapDevice<'a> {
    /// Create an instance.
    pub const fn new(window: &'a [u8]) -> Self {
        Self { window, open: None }
    }

    /// Create an instance covering `size` bytes at physical address `base`.
    ///
    /// # Safety
    ///
    /// - The range must be mapped, readable and unmodified for `'static`.
    pub unsafe fn from_raw(base: usize, size: usize) -> MemmapDevice<'static> {
        MemmapDevice::new(core::slice::from_raw_parts(base as *const u8, size))
    }

    /// The whole window.
    pub fn window(&self) -> &'a [u8] {
        self.window
    }
}

impl BlockDevice for MemmapDevice<'_> {
    fn read_at(&self, offset: u64, buf: &mut [u8]) -> Result<(), Error> {
        self.window.read_at(offset, buf)
    }

    fn len(&self) -> u64 {
        self.window.len() as u64
    }
}

impl interface::IoDevice for MemmapDevice<'_> {
    fn open(&mut self, spec: &ImageSpec) -> Result<Entity, Error> {
        if self.open.is_some() {
            warn!("memmap: Only one open range at a time");
            return Err(Error::TooManyOpenFiles);
        }

        let ImageSpec::Block { offset, length } = *spec else {
            return Err(Error::NotFound);
        };

        let end = offset.checked_add(length as u64).ok_or(Error::IoFailure)?;
        if end > self.window.len() as u64 {
            return Err(Error::IoFailure);
        }

        self.open = Some(OpenRange {
            offset,
            length,
            pos: 0,
        });

        Ok(Entity::new(0))
    }

    fn size(&mut self, _entity: &Entity) -> Result<usize, Error> {
        self.open.map(|r| r.length).ok_or(Error::InvalidState)
    }

    fn read(&mut self, _entity: &mut Entity, buf: &mut [u8]) -> Result<usize, Error> {
        let range = self.open.as_mut().ok_or(Error::InvalidState)?;

        let n = buf.len().min(range.length - range.pos);
        self.window
            .read_at(range.offset + range.pos as u64, &mut buf[..n])?;
        range.pos += n;

        Ok(n)
    }

    fn close(&mut self, _entity: Entity) {
        self.open = None;
    }
}

//--------------------------------------------------------------------------------------------------
// Testing
//--------------------------------------------------------------------------------------------------
