// SPDX-License-Identifier: MIT OR Apache-2.0
//
// Copyright (c) 2023 Andre Richter <andre.o.richter@gmail.com>

//! BSP image loading policy.
//!
//! The board boots a monitor (BL31) that hands over to the non-secure payload (BL33). An initrd
//! and a device tree are loaded alongside and passed on through the handoff list.

use super::memory::{self, map};
use crate::{
    context::{spsr_64, DAIF_ALL},
    cpu,
    error::Error,
    image::{
        BlLoadInfo, BlMemParamsDesc, BlParams, EntryPointInfo, EpAttributes, ImageAttributes,
        ImageId, ImageInfo, ParamHeader, PARAM_IMAGE_BINARY, VERSION_2,
    },
    loader::{interface::Platform, LoaderConfig},
    storage::{interface::IoDevice, ImageSpec},
    uuid::Uuid,
    warn,
};

//--------------------------------------------------------------------------------------------------
// Private Definitions
//--------------------------------------------------------------------------------------------------

const NUM_DESCS: usize = 4;

/// Entry point info of an image nobody jumps to.
const fn data_image_ep(attributes: EpAttributes) -> EntryPointInfo {
    let mut ep = EntryPointInfo::new(attributes, 0, 0);
    ep.header = ParamHeader::new(PARAM_IMAGE_BINARY, VERSION_2);
    ep
}

//--------------------------------------------------------------------------------------------------
// Public Definitions
//--------------------------------------------------------------------------------------------------

/// The board's [`Platform`] implementation.
pub struct Mt7622Platform<'d> {
    descs: [BlMemParamsDesc; NUM_DESCS],
    load_info: BlLoadInfo,
    next_params: BlParams,
    boot_dev: &'d mut dyn IoDevice,
}

//--------------------------------------------------------------------------------------------------
// Public Code
//--------------------------------------------------------------------------------------------------

/// The images this board loads, in load order.
pub fn bl2_mem_params_descs() -> [BlMemParamsDesc; NUM_DESCS] {
    [
        BlMemParamsDesc {
            image_id: ImageId::BL31,
            ep_info: EntryPointInfo::new(
                EpAttributes::EXECUTABLE.union(EpAttributes::FIRST_EXE),
                map::BL31_BASE as u64,
                spsr_64(3, true, DAIF_ALL),
            ),
            image_info: ImageInfo::new(
                ImageAttributes::PLAT_SETUP,
                map::BL31_BASE,
                map::BL31_LIMIT - map::BL31_BASE,
            ),
            next_handoff_image_id: ImageId::BL33,
        },
        BlMemParamsDesc {
            image_id: ImageId::BL33,
            ep_info: EntryPointInfo::new(
                EpAttributes::NON_SECURE.union(EpAttributes::EXECUTABLE),
                map::BL33_BASE as u64,
                spsr_64(2, true, DAIF_ALL),
            ),
            image_info: ImageInfo::new(
                ImageAttributes::empty(),
                map::BL33_BASE,
                map::BL33_MAX_SIZE,
            ),
            next_handoff_image_id: ImageId::BL32_EXTRA2,
        },
        BlMemParamsDesc {
            image_id: ImageId::BL32_EXTRA2,
            ep_info: data_image_ep(EpAttributes::NON_SECURE),
            image_info: ImageInfo::new(
                ImageAttributes::empty(),
                map::BL32_EXTRA2_BASE,
                map::BL32_EXTRA2_MAX_SIZE,
            ),
            next_handoff_image_id: ImageId::NT_FW_CONFIG,
        },
        BlMemParamsDesc {
            image_id: ImageId::NT_FW_CONFIG,
            ep_info: data_image_ep(EpAttributes::NON_SECURE),
            image_info: ImageInfo::new(
                ImageAttributes::empty(),
                map::BL32_BASE,
                map::BL32_LIMIT - map::BL32_BASE,
            ),
            next_handoff_image_id: ImageId::INVALID,
        },
    ]
}

/// The name under which `image_id` is looked up on the boot device.
pub fn image_uuid(image_id: ImageId) -> Option<Uuid> {
    let uuid = match image_id {
        ImageId::BL31 => Uuid::EL3_RUNTIME_FIRMWARE_BL31,
        ImageId::BL32 => Uuid::SECURE_PAYLOAD_BL32,
        ImageId::BL33 => Uuid::NON_TRUSTED_FIRMWARE_BL33,
        ImageId::BL32_EXTRA2 => Uuid::SECURE_PAYLOAD_BL32_EXTRA2,
        ImageId::NT_FW_CONFIG => Uuid::NT_FW_CONFIG,
        _ => return None,
    };

    Some(uuid)
}

/// Loading policy of the board.
pub fn loader_config(use_prepositioned: bool) -> LoaderConfig {
    LoaderConfig {
        fallback_monitor_image: memory::fallback_monitor_image(),
        prepositioned_table: use_prepositioned.then_some(map::PREPOSITIONED_TABLE),
        ..LoaderConfig::new()
    }
}

impl<'d> Mt7622Platform<'d> {
    /// Create an instance that reads all images from `boot_dev`.
    pub fn new(boot_dev: &'d mut dyn IoDevice) -> Result<Self, Error> {
        let descs = bl2_mem_params_descs();
        let load_info = BlLoadInfo::from_descs(&descs)?;
        let next_params = BlParams::from_descs(&descs, &load_info)?;

        Ok(Self {
            descs,
            load_info,
            next_params,
            boot_dev,
        })
    }

    /// The descriptor table.
    pub fn descs(&self) -> &[BlMemParamsDesc] {
        &self.descs
    }
}

impl Platform for Mt7622Platform<'_> {
    fn bl_image_load_info(&mut self) -> &mut BlLoadInfo {
        &mut self.load_info
    }

    fn next_bl_params(&mut self) -> &mut BlParams {
        // Hand on the sizes recorded while loading.
        for node in self.next_params.nodes.iter_mut() {
            if let Some(loaded) = self.load_info.node(node.image_id) {
                node.image_info = loaded.image_info;
            }
        }

        &mut self.next_params
    }

    fn flush_next_bl_params(&mut self) {
        cpu::flush_dcache_range(
            &self.next_params as *const BlParams as usize,
            core::mem::size_of::<BlParams>(),
        );
    }

    fn image_source(
        &mut self,
        image_id: ImageId,
    ) -> Result<(&mut dyn IoDevice, ImageSpec), Error> {
        let uuid = image_uuid(image_id).ok_or(Error::NotFound)?;

        Ok((&mut *self.boot_dev, ImageSpec::Uuid(uuid)))
    }

    fn error_handler(&mut self, status: i32) -> ! {
        warn!("{}: BL2 halted with status {}", super::board_name(), status);
        cpu::wait_forever()
    }
}

//--------------------------------------------------------------------------------------------------
// Testing
//--------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::memmap::MemmapDevice;

    #[test]
    fn descriptor_regions_follow_the_memory_map() {
        let descs = bl2_mem_params_descs();
        let (bl31, bl33, initrd) = (
            descs[0].image_info.region(),
            descs[1].image_info.region(),
            descs[2].image_info.region(),
        );

        assert!(bl31.base() >= map::TZRAM_BASE);
        assert_eq!(bl31.end_exclusive(), map::TZRAM_BASE + map::TZRAM_SIZE);
        assert_eq!(initrd.base(), bl33.end_exclusive());
        assert!(initrd.end_exclusive() <= map::BL32_BASE);
    }

    #[test]
    fn handoff_chain_covers_all_images() {
        let mut dev = MemmapDevice::new(&[]);
        let mut plat = Mt7622Platform::new(&mut dev).unwrap();

        let ids: std::vec::Vec<ImageId> = plat
            .next_bl_params()
            .nodes
            .iter()
            .map(|n| n.image_id)
            .collect();
        assert_eq!(
            ids,
            [
                ImageId::BL31,
                ImageId::BL33,
                ImageId::BL32_EXTRA2,
                ImageId::NT_FW_CONFIG
            ]
        );
        assert_eq!(plat.bl_image_load_info().nodes.len(), NUM_DESCS);
        assert!(plat.descs()[0]
            .image_info
            .attributes
            .contains(ImageAttributes::PLAT_SETUP));
    }

    #[test]
    fn loaded_sizes_reach_the_handoff_list() {
        let mut dev = MemmapDevice::new(&[]);
        let mut plat = Mt7622Platform::new(&mut dev).unwrap();

        plat.bl_image_load_info().nodes[1].image_info.image_size = 0x1234;

        let params = plat.next_bl_params();
        assert_eq!(params.nodes[1].image_id, ImageId::BL33);
        assert_eq!(params.nodes[1].image_info.image_size, 0x1234);
    }

    #[test]
    fn images_are_looked_up_by_uuid() {
        let mut dev = MemmapDevice::new(&[]);
        let mut plat = Mt7622Platform::new(&mut dev).unwrap();

        let (_, spec) = plat.image_source(ImageId::BL33).unwrap();
        assert_eq!(spec, ImageSpec::Uuid(Uuid::NON_TRUSTED_FIRMWARE_BL33));

        assert_eq!(plat.image_source(ImageId::SCP_BL2).err(), Some(Error::NotFound));
    }

    #[test]
    fn config_selects_the_table() {
        assert_eq!(loader_config(false).prepositioned_table, None);
        assert_eq!(
            loader_config(true).prepositioned_table,
            Some(map::PREPOSITIONED_TABLE)
        );
        assert_eq!(loader_config(true).monitor_image, ImageId::BL31);
    }
}
