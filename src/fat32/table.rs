// SPDX-License-Identifier: MIT OR Apache-2.0
//
// Copyright (c) 2023 Andre Richter <andre.o.richter@gmail.com>

//! File allocation table access.
//!
//! # Orientation
//!
//! The path of this file is:
//!
//! crate::fat32::table

use super::{bpb::BootParameterBlock, MAX_SECTOR_SIZE};
use crate::{common::le_u32, error::Error, storage::interface::BlockDevice};

//--------------------------------------------------------------------------------------------------
// Public Definitions
//--------------------------------------------------------------------------------------------------

/// Cluster links are 28 bits wide. The top nibble is reserved.
pub const CLUSTER_MASK: u32 = 0x0FFF_FFFF;

/// Marks a cluster with media defects. Everything from here up ends a chain.
pub const BAD_CLUSTER: u32 = 0x0FFF_FFF7;

/// Lazily populated cache of the first FAT copy.
///
/// The cache is backed by caller supplied memory, indexed by cluster number. A zero slot means
/// "not loaded yet"; whenever a slot is missing, the whole sector containing it is fetched. Links
/// beyond the cache capacity are read from the device on every access.
pub struct FatTable<'c> {
    cache: &'c mut [u32],
    fat_offset: u64,
    bytes_per_sector: usize,
}

//--------------------------------------------------------------------------------------------------
// Public Code
//--------------------------------------------------------------------------------------------------

/// Whether `link` ends a chain.
pub const fn is_chain_end(link: u32) -> bool {
    link < 2 || link >= BAD_CLUSTER
}

impl<'c> FatTable<'c> {
    /// Create an instance. The cache is cleared.
    pub fn new(cache: &'c mut [u32], bpb: &BootParameterBlock) -> Self {
        cache.fill(0);

        Self {
            cache,
            fat_offset: bpb.fat_offset(),
            bytes_per_sector: bpb.bytes_per_sector(),
        }
    }

    fn entries_per_sector(&self) -> usize {
        self.bytes_per_sector / 4
    }

    fn load_sector<D: BlockDevice>(&mut self, dev: &D, cluster: usize) -> Result<(), Error> {
        let eps = self.entries_per_sector();
        let first = cluster - cluster % eps;
        let sector_offset = self.fat_offset + (first as u64) * 4;

        let mut buf = [0_u8; MAX_SECTOR_SIZE];
        let buf = &mut buf[..self.bytes_per_sector];
        dev.read_at(sector_offset, buf)?;

        let end = (first + eps).min(self.cache.len());
        for (i, slot) in self.cache[first..end].iter_mut().enumerate() {
            *slot = le_u32(buf, i * 4);
        }

        Ok(())
    }

    /// The masked FAT link of `cluster`.
    pub fn entry<D: BlockDevice>(&mut self, dev: &D, cluster: u32) -> Result<u32, Error> {
        let idx = cluster as usize;

        if idx < self.cache.len() {
            if self.cache[idx] == 0 {
                self.load_sector(dev, idx)?;
            }

            return Ok(self.cache[idx] & CLUSTER_MASK);
        }

        let mut raw = [0_u8; 4];
        dev.read_at(self.fat_offset + cluster as u64 * 4, &mut raw)?;

        Ok(u32::from_le_bytes(raw) & CLUSTER_MASK)
    }

    /// The cluster following `cluster`, or `None` at the end of the chain.
    pub fn next<D: BlockDevice>(&mut self, dev: &D, cluster: u32) -> Result<Option<u32>, Error> {
        let link = self.entry(dev, cluster)?;

        Ok((!is_chain_end(link)).then_some(link))
    }
}

//--------------------------------------------------------------------------------------------------
// Testing
//--------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use core::cell::Cell;

    const FAT_OFFSET: usize = 512;

    /// Counts reads so cache hits can be observed.
    struct CountingDevice {
        bytes: std::vec::Vec<u8>,
        reads: Cell<usize>,
    }

    impl BlockDevice for CountingDevice {
        fn read_at(&self, offset: u64, buf: &mut [u8]) -> Result<(), Error> {
            self.reads.set(self.reads.get() + 1);
            self.bytes.as_slice().read_at(offset, buf)
        }

        fn len(&self) -> u64 {
            self.bytes.len() as u64
        }
    }

    fn device_with_links(links: &[(u32, u32)]) -> CountingDevice {
        let mut bytes = std::vec![0_u8; FAT_OFFSET + 4 * 512];
        for (cluster, link) in links {
            let off = FAT_OFFSET + *cluster as usize * 4;
            bytes[off..off + 4].copy_from_slice(&link.to_le_bytes());
        }

        CountingDevice {
            bytes,
            reads: Cell::new(0),
        }
    }

    fn table(cache: &mut [u32]) -> FatTable<'_> {
        FatTable {
            cache,
            fat_offset: FAT_OFFSET as u64,
            bytes_per_sector: 512,
        }
    }

    #[test]
    fn whole_sector_is_cached() {
        let dev = device_with_links(&[(2, 3), (3, 4), (4, 0x0FFF_FFFF)]);
        let mut cache = [0_u32; 256];
        let mut fat = table(&mut cache);

        assert_eq!(fat.next(&dev, 2), Ok(Some(3)));
        assert_eq!(fat.next(&dev, 3), Ok(Some(4)));
        assert_eq!(fat.next(&dev, 4), Ok(None));
        assert_eq!(dev.reads.get(), 1);
    }

    #[test]
    fn links_beyond_cache_are_read_directly() {
        let dev = device_with_links(&[(200, 201)]);
        let mut cache = [0_u32; 16];
        let mut fat = table(&mut cache);

        assert_eq!(fat.next(&dev, 200), Ok(Some(201)));
        assert_eq!(fat.next(&dev, 200), Ok(Some(201)));
        assert_eq!(dev.reads.get(), 2);
    }

    #[test]
    fn terminators() {
        let dev = device_with_links(&[(2, 0xF000_0005), (3, BAD_CLUSTER), (4, 1)]);
        let mut cache = [0_u32; 128];
        let mut fat = table(&mut cache);

        // Reserved top nibble is ignored.
        assert_eq!(fat.next(&dev, 2), Ok(Some(5)));
        assert_eq!(fat.next(&dev, 3), Ok(None));
        assert_eq!(fat.next(&dev, 4), Ok(None));
        assert!(is_chain_end(0));
        assert!(is_chain_end(0x0FFF_FFF8));
    }
}
