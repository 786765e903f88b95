// SPDX-License-Identifier: MIT OR Apache-2.0
//
// Copyright (c) 2023 Andre Richter <andre.o.richter@gmail.com>

//! Image package device backed by a FAT32 partition.
//!
//! Images are looked up by UUID. Most UUIDs map to a small text file under `bootcfg/` that names
//! the real image file, so a distribution can switch kernels by rewriting one line.

use super::{interface, Entity, ImageSpec};
use crate::{
    error::Error,
    fat32::{DirEntry, Volume},
    info,
    storage::interface::BlockDevice,
    uuid::Uuid,
    warn,
};

//--------------------------------------------------------------------------------------------------
// Private Definitions
//--------------------------------------------------------------------------------------------------

struct OpenFile {
    entry: DirEntry,
    pos: usize,
}

//--------------------------------------------------------------------------------------------------
// Public Definitions
//--------------------------------------------------------------------------------------------------

/// Maps an image UUID to the path of its redirection file.
#[derive(Copy, Clone, Debug)]
pub struct FileNameEntry {
    pub uuid: Uuid,
    pub name: &'static str,
}

/// File tried first for the non-trusted firmware, before consulting the table.
pub const NON_TRUSTED_FIRMWARE_FILE: &str = "u-boot.bin";

/// Longest redirection line that is read.
pub const REDIRECT_MAX: usize = 255;

/// Prefix stripped from redirection targets. Boot configs name files as the running OS sees them.
pub const BOOT_DIR_PREFIX: &str = "/boot/";

/// The default lookup table. Terminated by [`Uuid::NULL`].
pub static DEFAULT_FILE_TABLE: [FileNameEntry; 5] = [
    FileNameEntry {
        uuid: Uuid::EL3_RUNTIME_FIRMWARE_BL31,
        name: "bootcfg/bl31",
    },
    FileNameEntry {
        uuid: Uuid::NON_TRUSTED_FIRMWARE_BL33,
        name: "bootcfg/linux",
    },
    FileNameEntry {
        uuid: Uuid::NT_FW_CONFIG,
        name: "bootcfg/atfdtb",
    },
    FileNameEntry {
        uuid: Uuid::SECURE_PAYLOAD_BL32_EXTRA2,
        name: "bootcfg/initrd",
    },
    FileNameEntry {
        uuid: Uuid::NULL,
        name: "",
    },
];

/// Virtual storage device serving images out of a mounted FAT32 volume.
///
/// Only one file can be open at a time.
pub struct FatImageDevice<'c, D: BlockDevice> {
    volume: Volume<'c, D>,
    table: &'static [FileNameEntry],
    current: Option<OpenFile>,
}

//--------------------------------------------------------------------------------------------------
// Private Code
//--------------------------------------------------------------------------------------------------

/// Extract the target path from the contents of a redirection file.
fn redirect_target(contents: &[u8]) -> Result<&str, Error> {
    let line = match contents.iter().position(|c| *c == b'\n') {
        Some(p) => &contents[..p],
        None => contents,
    };
    let line = line.strip_suffix(b"\r").unwrap_or(line);
    let line = core::str::from_utf8(line).map_err(|_| Error::NotFound)?;
    let target = line.strip_prefix(BOOT_DIR_PREFIX).unwrap_or(line).trim();

    if target.is_empty() {
        return Err(Error::NotFound);
    }

    Ok(target)
}

impl<D: BlockDevice> FatImageDevice<'_, D> {
    fn table_name(&self, uuid: &Uuid) -> Option<&'static str> {
        self.table
            .iter()
            .take_while(|e| !e.uuid.is_null())
            .find(|e| e.uuid == *uuid)
            .map(|e| e.name)
    }

    fn lookup(&mut self, uuid: &Uuid) -> Result<DirEntry, Error> {
        if *uuid == Uuid::NON_TRUSTED_FIRMWARE_BL33 {
            match self.volume.resolve_path(NON_TRUSTED_FIRMWARE_FILE) {
                Ok(entry) => {
                    info!("Opened {}", NON_TRUSTED_FIRMWARE_FILE);
                    return Ok(entry);
                }
                Err(Error::NotFound) => (),
                Err(e) => return Err(e),
            }
        }

        let Some(name) = self.table_name(uuid) else {
            warn!("fat: Unknown uuid {}", uuid);
            return Err(Error::NotFound);
        };

        info!("Reading filename from {}", name);
        let redirect = self.volume.resolve_path(name).map_err(|e| {
            warn!("fat: Failed opening {} ({})", name, e);
            e
        })?;

        let mut buf = [0_u8; REDIRECT_MAX];
        let n = self.volume.read_file(&redirect, &mut buf)?;
        let target = redirect_target(&buf[..n])?;

        info!("Opening ({})", target);
        self.volume.resolve_path(target).map_err(|e| {
            warn!("fat: Failed opening {} ({})", target, e);
            e
        })
    }
}

//--------------------------------------------------------------------------------------------------
// Public Code
//--------------------------------------------------------------------------------------------------

impl<'c, D: BlockDevice> FatImageDevice<'c, D> {
    /// Create an instance.
    ///
    /// `table` is consulted up to its first [`Uuid::NULL`] entry.
    pub fn new(volume: Volume<'c, D>, table: &'static [FileNameEntry]) -> Self {
        Self {
            volume,
            table,
            current: None,
        }
    }

    /// Mount `device` and wrap it.
    pub fn mount(
        device: D,
        fat_cache: &'c mut [u32],
        table: &'static [FileNameEntry],
    ) -> Result<Self, Error> {
        Ok(Self::new(Volume::mount(device, fat_cache)?, table))
    }

    /// The mounted volume.
    pub fn volume(&mut self) -> &mut Volume<'c, D> {
        &mut self.volume
    }

    /// Whether a file is currently open.
    pub fn is_open(&self) -> bool {
        self.current.is_some()
    }
}

impl<D: BlockDevice> interface::IoDevice for FatImageDevice<'_, D> {
    fn open(&mut self, spec: &ImageSpec) -> Result<Entity, Error> {
        if self.current.is_some() {
            warn!("fat: Only one open file at a time");
            return Err(Error::TooManyOpenFiles);
        }

        let ImageSpec::Uuid(uuid) = spec else {
            return Err(Error::NotFound);
        };

        let entry = self.lookup(uuid)?;
        self.current = Some(OpenFile { entry, pos: 0 });

        Ok(Entity::new(0))
    }

    fn size(&mut self, _entity: &Entity) -> Result<usize, Error> {
        self.current
            .as_ref()
            .map(|f| f.entry.size as usize)
            .ok_or(Error::InvalidState)
    }

    fn read(&mut self, _entity: &mut Entity, buf: &mut [u8]) -> Result<usize, Error> {
        let file = self.current.as_mut().ok_or(Error::InvalidState)?;

        let n = self.volume.read_file_at(&file.entry, file.pos, buf)?;
        file.pos += n;

        Ok(n)
    }

    fn close(&mut self, _entity: Entity) {
        self.current = None;
    }
}

//--------------------------------------------------------------------------------------------------
// Testing
//--------------------------------------------------------------------------------------------------
