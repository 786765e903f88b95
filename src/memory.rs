// SPDX-License-Identifier: MIT OR Apache-2.0
//
// Copyright (c) 2018-2023 Andre Richter <andre.o.richter@gmail.com>

//! Memory Management.

use crate::{common, cpu, error::Error};
use core::fmt;

//--------------------------------------------------------------------------------------------------
// Public Definitions
//--------------------------------------------------------------------------------------------------

/// A physical memory region an image is loaded into.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct MemoryRegion {
    base: usize,
    max_size: usize,
}

//--------------------------------------------------------------------------------------------------
// Public Code
//--------------------------------------------------------------------------------------------------

impl MemoryRegion {
    /// Create an instance.
    pub const fn new(base: usize, max_size: usize) -> Self {
        Self { base, max_size }
    }

    /// Start address.
    pub const fn base(&self) -> usize {
        self.base
    }

    /// Capacity in bytes.
    pub const fn max_size(&self) -> usize {
        self.max_size
    }

    /// Exclusive end address.
    pub const fn end_exclusive(&self) -> usize {
        self.base + self.max_size
    }

    /// Checks that `size` bytes fit into the region.
    pub fn check_fits(&self, size: usize) -> Result<(), Error> {
        if size > self.max_size {
            return Err(Error::SizeExceeded);
        }

        Ok(())
    }

    /// Return the first `size` bytes of the region as a mutable slice.
    ///
    /// # Safety
    ///
    /// - The region must be backed by normal memory that nothing else references for the
    ///   lifetime of the returned slice.
    pub unsafe fn as_mut_slice(&self, size: usize) -> Result<&mut [u8], Error> {
        self.check_fits(size)?;

        Ok(core::slice::from_raw_parts_mut(self.base as *mut u8, size))
    }

    /// Copy `src` to the start of the region and flush it to the point of coherency.
    ///
    /// # Safety
    ///
    /// - See [`MemoryRegion::as_mut_slice`].
    pub unsafe fn copy_in(&self, src: &[u8]) -> Result<(), Error> {
        let dst = self.as_mut_slice(src.len())?;
        dst.copy_from_slice(src);
        cpu::flush_dcache_range(self.base, src.len());

        Ok(())
    }
}

impl fmt::Display for MemoryRegion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (size, unit) = common::size_human_readable_ceil(self.max_size);

        write!(
            f,
            "{:#010x} - {:#010x} | {:>4} {}",
            self.base,
            self.end_exclusive().saturating_sub(1),
            size,
            unit
        )
    }
}

//--------------------------------------------------------------------------------------------------
// Testing
//--------------------------------------------------------------------------------------------------
