// SPDX-License-Identifier: MIT OR Apache-2.0
//
// Copyright (c) 2023 Andre Richter <andre.o.richter@gmail.com>

//! Boot parameter block.
//!
//! # Orientation
//!
//! The path of this file is:
//!
//! crate::fat32::bpb

use crate::{
    common::{le_u16, le_u32},
    error::Error,
};
use core::fmt;

//--------------------------------------------------------------------------------------------------
// Private Definitions
//--------------------------------------------------------------------------------------------------

const OFF_OEM_NAME: usize = 3;
const OFF_BYTES_PER_SECTOR: usize = 11;
const OFF_SECTORS_PER_CLUSTER: usize = 13;
const OFF_RESERVED_SECTORS: usize = 14;
const OFF_NUM_FATS: usize = 16;
const OFF_TOTAL_SECTORS_16: usize = 19;
const OFF_TOTAL_SECTORS_32: usize = 32;
const OFF_FAT_SIZE_32: usize = 36;
const OFF_ROOT_CLUSTER: usize = 44;
const OFF_SIGNATURE: usize = 510;

//--------------------------------------------------------------------------------------------------
// Public Definitions
//--------------------------------------------------------------------------------------------------

/// Boot sector signature.
pub const SIGNATURE: u16 = 0xAA55;

/// Minimum number of bytes needed to decode a boot parameter block.
pub const BPB_SIZE: usize = 512;

/// Volume geometry, read once at mount time.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct BootParameterBlock {
    oem_name: [u8; 8],
    bytes_per_sector: u16,
    sectors_per_cluster: u8,
    reserved_sectors: u16,
    num_fats: u8,
    total_sectors: u32,
    fat_size: u32,
    root_cluster: u32,
}

//--------------------------------------------------------------------------------------------------
// Public Code
//--------------------------------------------------------------------------------------------------

impl BootParameterBlock {
    /// Decode and validate the first sector of a volume.
    pub fn parse(sector: &[u8]) -> Result<Self, Error> {
        if sector.len() < BPB_SIZE {
            return Err(Error::InvalidSignature);
        }

        if le_u16(sector, OFF_SIGNATURE) != SIGNATURE {
            return Err(Error::InvalidSignature);
        }

        let mut oem_name = [0; 8];
        oem_name.copy_from_slice(&sector[OFF_OEM_NAME..OFF_OEM_NAME + 8]);

        let total_sectors = match le_u16(sector, OFF_TOTAL_SECTORS_16) {
            0 => le_u32(sector, OFF_TOTAL_SECTORS_32),
            n => n as u32,
        };

        let bpb = Self {
            oem_name,
            bytes_per_sector: le_u16(sector, OFF_BYTES_PER_SECTOR),
            sectors_per_cluster: sector[OFF_SECTORS_PER_CLUSTER],
            reserved_sectors: le_u16(sector, OFF_RESERVED_SECTORS),
            num_fats: sector[OFF_NUM_FATS],
            total_sectors,
            fat_size: le_u32(sector, OFF_FAT_SIZE_32),
            root_cluster: le_u32(sector, OFF_ROOT_CLUSTER),
        };
        bpb.check_geometry()?;

        Ok(bpb)
    }

    // Geometry the chain walker relies on. A volume violating it is treated as not formatted.
    fn check_geometry(&self) -> Result<(), Error> {
        let bps_ok = matches!(self.bytes_per_sector, 512 | 1024 | 2048 | 4096);
        let spc_ok = self.sectors_per_cluster.is_power_of_two();

        if !bps_ok
            || !spc_ok
            || self.num_fats == 0
            || self.fat_size == 0
            || self.root_cluster < 2
            || self.data_start_sector() >= self.total_sectors as u64
        {
            return Err(Error::InvalidSignature);
        }

        Ok(())
    }

    fn data_start_sector(&self) -> u64 {
        self.reserved_sectors as u64 + self.num_fats as u64 * self.fat_size as u64
    }

    /// The formatter's OEM name, trimmed.
    pub fn oem_name(&self) -> &str {
        let len = self
            .oem_name
            .iter()
            .rposition(|c| *c != b' ' && *c != 0)
            .map_or(0, |p| p + 1);

        core::str::from_utf8(&self.oem_name[..len]).unwrap_or("?")
    }

    pub fn bytes_per_sector(&self) -> usize {
        self.bytes_per_sector as usize
    }

    pub fn sectors_per_cluster(&self) -> usize {
        self.sectors_per_cluster as usize
    }

    /// Bytes in one cluster.
    pub fn cluster_size(&self) -> usize {
        self.bytes_per_sector() * self.sectors_per_cluster()
    }

    pub fn root_cluster(&self) -> u32 {
        self.root_cluster
    }

    /// Byte offset of the first FAT copy.
    pub fn fat_offset(&self) -> u64 {
        self.reserved_sectors as u64 * self.bytes_per_sector as u64
    }

    /// Byte size of one FAT copy.
    pub fn fat_bytes(&self) -> u64 {
        self.fat_size as u64 * self.bytes_per_sector as u64
    }

    /// Byte offset of the first data cluster, i.e. cluster 2.
    pub fn data_offset(&self) -> u64 {
        self.data_start_sector() * self.bytes_per_sector as u64
    }

    /// Byte offset of `cluster`.
    pub fn cluster_offset(&self, cluster: u32) -> u64 {
        self.data_offset() + (cluster as u64 - 2) * self.cluster_size() as u64
    }

    /// Number of data clusters. Bounds every chain walk.
    pub fn cluster_count(&self) -> u32 {
        let data_sectors = self.total_sectors as u64 - self.data_start_sector();
        let by_size = data_sectors / self.sectors_per_cluster as u64;
        let by_fat = self.fat_bytes() / 4 - 2;

        by_size.min(by_fat) as u32
    }
}

impl fmt::Display for BootParameterBlock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "'{}' {} B/sector, {} sectors/cluster, {} FATs of {} sectors, root cluster {}",
            self.oem_name(),
            self.bytes_per_sector,
            self.sectors_per_cluster,
            self.num_fats,
            self.fat_size,
            self.root_cluster
        )
    }
}

//--------------------------------------------------------------------------------------------------
// Testing
//--------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn boot_sector() -> [u8; 512] {
        let mut s = [0_u8; 512];

        s[OFF_OEM_NAME..OFF_OEM_NAME + 8].copy_from_slice(b"mkfs.fat");
        s[OFF_BYTES_PER_SECTOR..][..2].copy_from_slice(&512_u16.to_le_bytes());
        s[OFF_SECTORS_PER_CLUSTER] = 8;
        s[OFF_RESERVED_SECTORS..][..2].copy_from_slice(&32_u16.to_le_bytes());
        s[OFF_NUM_FATS] = 2;
        s[OFF_TOTAL_SECTORS_32..][..4].copy_from_slice(&131_072_u32.to_le_bytes());
        s[OFF_FAT_SIZE_32..][..4].copy_from_slice(&128_u32.to_le_bytes());
        s[OFF_ROOT_CLUSTER..][..4].copy_from_slice(&2_u32.to_le_bytes());
        s[OFF_SIGNATURE..][..2].copy_from_slice(&SIGNATURE.to_le_bytes());

        s
    }

    #[test]
    fn geometry_is_decoded() {
        let bpb = BootParameterBlock::parse(&boot_sector()).unwrap();

        assert_eq!(bpb.oem_name(), "mkfs.fat");
        assert_eq!(bpb.cluster_size(), 4096);
        assert_eq!(bpb.fat_offset(), 32 * 512);
        assert_eq!(bpb.data_offset(), (32 + 2 * 128) * 512);
        assert_eq!(bpb.cluster_offset(2), bpb.data_offset());
        assert_eq!(bpb.cluster_offset(5), bpb.data_offset() + 3 * 4096);
        assert_eq!(bpb.root_cluster(), 2);
    }

    #[test]
    fn bad_signature_is_rejected() {
        let mut s = boot_sector();
        s[OFF_SIGNATURE] = 0;

        assert_eq!(
            BootParameterBlock::parse(&s),
            Err(Error::InvalidSignature)
        );
    }

    #[test]
    fn unwalkable_geometry_is_rejected() {
        let mut s = boot_sector();
        s[OFF_SECTORS_PER_CLUSTER] = 3;
        assert_eq!(
            BootParameterBlock::parse(&s),
            Err(Error::InvalidSignature)
        );

        let mut s = boot_sector();
        s[OFF_ROOT_CLUSTER..][..4].copy_from_slice(&1_u32.to_le_bytes());
        assert_eq!(
            BootParameterBlock::parse(&s),
            Err(Error::InvalidSignature)
        );
    }
}
