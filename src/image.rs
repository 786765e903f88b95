// SPDX-License-Identifier: MIT OR Apache-2.0
//
// Copyright (c) 2023 Andre Richter <andre.o.richter@gmail.com>

//! Image and entry point descriptors.
//!
//! The platform describes every image it wants loaded with a [`BlMemParamsDesc`]. Two views are
//! derived from the descriptor table:
//!
//! - [`BlLoadInfo`]: the images to load, in load order.
//! - [`BlParams`]: the images the next stage hands over to, following the handoff chain that
//!   starts at the first executable image.

use crate::{error::Error, memory::MemoryRegion, warn};
use bitflags::bitflags;
use core::fmt;

//--------------------------------------------------------------------------------------------------
// Public Definitions
//--------------------------------------------------------------------------------------------------

/// Upper bound of images in one load list.
pub const MAX_IMAGES: usize = 8;

/// Parameter header type: entry point info.
pub const PARAM_EP: u8 = 0x01;
/// Parameter header type: image info.
pub const PARAM_IMAGE_BINARY: u8 = 0x02;
/// Parameter header type: list of images to load.
pub const PARAM_BL_LOAD_INFO: u8 = 0x04;
/// Parameter header type: parameters for the next stage.
pub const PARAM_BL_PARAMS: u8 = 0x05;

/// First parameter layout version carrying linked descriptor lists.
pub const VERSION_2: u8 = 0x02;

/// Numeric image identifier shared with the platform.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ImageId(pub u32);

bitflags! {
    /// Per image loading policy.
    #[derive(Copy, Clone, Debug, PartialEq, Eq, Default)]
    pub struct ImageAttributes: u32 {
        /// Do not fetch the image, only run the hooks.
        const SKIP_LOADING = 1 << 0;
        /// Run platform setup before this image, unless already done.
        const PLAT_SETUP = 1 << 1;
    }
}

bitflags! {
    /// Entry point attributes.
    ///
    /// The security state is a two bit field: secure (0), non-secure (1) or realm (2).
    #[derive(Copy, Clone, Debug, PartialEq, Eq, Default)]
    pub struct EpAttributes: u32 {
        const NON_SECURE = 1 << 0;
        const REALM = 1 << 1;
        /// Big endian data accesses.
        const EE_BIG = 1 << 2;
        /// Secure EL1 can access the physical timer.
        const ST_ENABLE = 1 << 3;
        const EXECUTABLE = 1 << 4;
        /// Start of the handoff chain.
        const FIRST_EXE = 1 << 5;
    }
}

/// Security state of an execution context.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum SecurityState {
    Secure,
    NonSecure,
    Realm,
}

/// Common header of all parameter structures.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct ParamHeader {
    pub kind: u8,
    pub version: u8,
}

/// Where an image lives and how big it is.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct ImageInfo {
    pub header: ParamHeader,
    pub attributes: ImageAttributes,
    pub image_base: usize,
    pub image_max_size: usize,
    /// Bytes actually loaded. The only field the loader writes.
    pub image_size: usize,
}

/// Where and in which processor state the next stage starts.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct EntryPointInfo {
    pub header: ParamHeader,
    pub attributes: EpAttributes,
    pub pc: u64,
    pub spsr: u64,
    pub args: [u64; 8],
}

/// One entry of the load list.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct ImageLoadNode {
    pub image_id: ImageId,
    pub image_info: ImageInfo,
}

/// The images to load, in load order.
#[derive(Clone, Debug)]
pub struct BlLoadInfo {
    pub header: ParamHeader,
    pub nodes: heapless::Vec<ImageLoadNode, MAX_IMAGES>,
}

/// One entry of the handoff list.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct BlParamsNode {
    pub image_id: ImageId,
    pub image_info: ImageInfo,
    pub ep_info: EntryPointInfo,
}

/// Parameters passed to the next stage.
#[derive(Clone, Debug)]
pub struct BlParams {
    pub header: ParamHeader,
    pub nodes: heapless::Vec<BlParamsNode, MAX_IMAGES>,
}

/// Platform description of one image.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct BlMemParamsDesc {
    pub image_id: ImageId,
    pub image_info: ImageInfo,
    pub ep_info: EntryPointInfo,
    /// Image that receives control after this one, or [`ImageId::INVALID`].
    pub next_handoff_image_id: ImageId,
}

//--------------------------------------------------------------------------------------------------
// Public Code
//--------------------------------------------------------------------------------------------------

impl ImageId {
    pub const BL2: ImageId = ImageId(1);
    pub const SCP_BL2: ImageId = ImageId(2);
    pub const BL31: ImageId = ImageId(3);
    pub const BL32: ImageId = ImageId(4);
    pub const BL33: ImageId = ImageId(5);
    pub const FIP: ImageId = ImageId(19);
    pub const BL32_EXTRA1: ImageId = ImageId(21);
    pub const BL32_EXTRA2: ImageId = ImageId(22);
    pub const HW_CONFIG: ImageId = ImageId(23);
    pub const TB_FW_CONFIG: ImageId = ImageId(24);
    pub const SOC_FW_CONFIG: ImageId = ImageId(25);
    pub const TOS_FW_CONFIG: ImageId = ImageId(26);
    pub const NT_FW_CONFIG: ImageId = ImageId(27);
    pub const INVALID: ImageId = ImageId(u32::MAX);
}

impl fmt::Display for ImageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl EpAttributes {
    const SECURITY_MASK: EpAttributes =
        EpAttributes::from_bits_retain(Self::NON_SECURE.bits() | Self::REALM.bits());

    /// Decode the security state field.
    pub fn security_state(&self) -> Result<SecurityState, Error> {
        let field = *self & Self::SECURITY_MASK;

        if field.is_empty() {
            Ok(SecurityState::Secure)
        } else if field == Self::NON_SECURE {
            Ok(SecurityState::NonSecure)
        } else if field == Self::REALM {
            Ok(SecurityState::Realm)
        } else {
            Err(Error::InvalidState)
        }
    }
}

impl ParamHeader {
    /// Create an instance.
    pub const fn new(kind: u8, version: u8) -> Self {
        Self { kind, version }
    }

    /// Check the header tag and that the layout is at least [`VERSION_2`].
    pub fn validate(&self, expected_kind: u8) -> Result<(), Error> {
        if self.kind != expected_kind || self.version < VERSION_2 {
            return Err(Error::InvalidState);
        }

        Ok(())
    }
}

impl ImageInfo {
    /// Create an instance.
    pub const fn new(
        attributes: ImageAttributes,
        image_base: usize,
        image_max_size: usize,
    ) -> Self {
        Self {
            header: ParamHeader::new(PARAM_IMAGE_BINARY, VERSION_2),
            attributes,
            image_base,
            image_max_size,
            image_size: 0,
        }
    }

    /// The destination region.
    pub const fn region(&self) -> MemoryRegion {
        MemoryRegion::new(self.image_base, self.image_max_size)
    }
}

impl EntryPointInfo {
    /// Create an instance with all arguments zeroed.
    pub const fn new(attributes: EpAttributes, pc: u64, spsr: u64) -> Self {
        Self {
            header: ParamHeader::new(PARAM_EP, VERSION_2),
            attributes,
            pc,
            spsr,
            args: [0; 8],
        }
    }
}

impl BlMemParamsDesc {
    /// Whether the image has an entry point the boot chain can jump to.
    pub fn is_executable(&self) -> bool {
        self.ep_info.attributes.contains(EpAttributes::EXECUTABLE)
    }
}

impl BlLoadInfo {
    /// Derive the load list from a descriptor table, in table order.
    pub fn from_descs(descs: &[BlMemParamsDesc]) -> Result<Self, Error> {
        let mut nodes = heapless::Vec::new();

        for desc in descs.iter().filter(|d| d.image_id != ImageId::INVALID) {
            nodes
                .push(ImageLoadNode {
                    image_id: desc.image_id,
                    image_info: desc.image_info,
                })
                .map_err(|_| Error::SizeExceeded)?;
        }

        Ok(Self {
            header: ParamHeader::new(PARAM_BL_LOAD_INFO, VERSION_2),
            nodes,
        })
    }

    /// The load node of `image_id`, if any.
    pub fn node(&self, image_id: ImageId) -> Option<&ImageLoadNode> {
        self.nodes.iter().find(|n| n.image_id == image_id)
    }
}

impl BlParams {
    /// Build the handoff list by following `next_handoff_image_id` from the image flagged
    /// [`EpAttributes::FIRST_EXE`].
    ///
    /// Image information is taken from `load_info` where present, so the sizes recorded during
    /// loading are handed on.
    pub fn from_descs(descs: &[BlMemParamsDesc], load_info: &BlLoadInfo) -> Result<Self, Error> {
        let find = |id: ImageId| descs.iter().find(|d| d.image_id == id);

        let mut cur = descs
            .iter()
            .find(|d| d.ep_info.attributes.contains(EpAttributes::FIRST_EXE))
            .ok_or(Error::NotFound)?;

        if !cur.is_executable() {
            warn!("First handoff image id {} is not executable", cur.image_id);
            return Err(Error::InvalidState);
        }

        let mut nodes: heapless::Vec<BlParamsNode, MAX_IMAGES> = heapless::Vec::new();
        loop {
            let image_info = load_info
                .node(cur.image_id)
                .map(|n| n.image_info)
                .unwrap_or(cur.image_info);

            // A chain longer than the list can only be a cycle.
            nodes
                .push(BlParamsNode {
                    image_id: cur.image_id,
                    image_info,
                    ep_info: cur.ep_info,
                })
                .map_err(|_| Error::InvalidState)?;

            if cur.next_handoff_image_id == ImageId::INVALID {
                break;
            }
            cur = find(cur.next_handoff_image_id).ok_or(Error::NotFound)?;
        }

        Ok(Self {
            header: ParamHeader::new(PARAM_BL_PARAMS, VERSION_2),
            nodes,
        })
    }

    /// The first image to receive control.
    pub fn head(&self) -> Option<&BlParamsNode> {
        self.nodes.first()
    }

    /// Mutable access to the first image to receive control.
    pub fn head_mut(&mut self) -> Option<&mut BlParamsNode> {
        self.nodes.first_mut()
    }
}

//--------------------------------------------------------------------------------------------------
// Testing
//--------------------------------------------------------------------------------------------------
