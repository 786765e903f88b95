// SPDX-License-Identifier: MIT OR Apache-2.0
//
// Copyright (c) 2023 Andre Richter <andre.o.richter@gmail.com>

//! Directory entry records.
//!
//! Every 32 byte record is either a short (8.3) entry or a long-name fragment. Fragments precede
//! the short entry they belong to, highest ordinal first.
//!
//! # Orientation
//!
//! The path of this file is:
//!
//! crate::fat32::dir

use crate::common::{le_u16, le_u32};
use bitflags::bitflags;

//--------------------------------------------------------------------------------------------------
// Private Definitions
//--------------------------------------------------------------------------------------------------

const OFF_ATTR: usize = 11;
const OFF_NT_RES: usize = 12;
const OFF_CLUSTER_HI: usize = 20;
const OFF_CLUSTER_LO: usize = 26;
const OFF_SIZE: usize = 28;

const OFF_LFN_CHECKSUM: usize = 13;

// Byte offsets of the UTF-16 name units inside a long-name fragment.
const LFN_UNIT_OFFSETS: [usize; LFN_UNITS_PER_FRAGMENT] =
    [1, 3, 5, 7, 9, 14, 16, 18, 20, 22, 24, 28, 30];

// Short entry case flags, as set by Windows NT.
const NT_LOWER_BASE: u8 = 0x08;
const NT_LOWER_EXT: u8 = 0x10;

// Attribute bits a long-name fragment carries.
const LONG_NAME_MASK: u8 = 0x3F;
const LONG_NAME: u8 = 0x0F;

//--------------------------------------------------------------------------------------------------
// Public Definitions
//--------------------------------------------------------------------------------------------------

/// Size of one directory record.
pub const ENTRY_SIZE: usize = 32;

/// First name byte of the record that ends a directory.
pub const END_MARKER: u8 = 0x00;

/// First name byte of a deleted record.
pub const FREE_MARKER: u8 = 0xE5;

/// First name byte standing in for a real leading 0xE5.
const KANJI_E5: u8 = 0x05;

/// UTF-16 units in one long-name fragment.
pub const LFN_UNITS_PER_FRAGMENT: usize = 13;

/// Flag in the ordinal byte of the fragment holding the end of a long name.
pub const LFN_LAST_FRAGMENT: u8 = 0x40;

/// Bits of the ordinal byte holding the fragment sequence number.
pub const LFN_ORDINAL_MASK: u8 = 0x3F;

/// Longest short name when rendered, `BASENAME.EXT`.
pub const SHORT_NAME_MAX: usize = 12;

bitflags! {
    /// Short entry attributes.
    #[derive(Copy, Clone, Debug, PartialEq, Eq, Default)]
    pub struct Attributes: u8 {
        const READ_ONLY = 0x01;
        const HIDDEN = 0x02;
        const SYSTEM = 0x04;
        const VOLUME_ID = 0x08;
        const DIRECTORY = 0x10;
        const ARCHIVE = 0x20;
    }
}

/// A long-name fragment.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct LfnFragment {
    pub ordinal: u8,
    pub checksum: u8,
    pub units: [u16; LFN_UNITS_PER_FRAGMENT],
}

/// A short (8.3) entry.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct ShortEntry {
    pub name: [u8; 11],
    pub attributes: Attributes,
    pub nt_res: u8,
    pub first_cluster: u32,
    pub size: u32,
}

/// The interpretations of a directory record.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum DirRecord {
    /// No further records follow in this directory.
    End,
    /// Deleted record.
    Free,
    LongName(LfnFragment),
    Short(ShortEntry),
}

//--------------------------------------------------------------------------------------------------
// Public Code
//--------------------------------------------------------------------------------------------------

/// Checksum of an 11 byte short name, as stored in its long-name fragments.
pub fn short_name_checksum(name: &[u8; 11]) -> u8 {
    name.iter()
        .fold(0_u8, |sum, c| sum.rotate_right(1).wrapping_add(*c))
}

impl DirRecord {
    /// Decode one record.
    ///
    /// `raw` must be at least [`ENTRY_SIZE`] bytes long.
    pub fn parse(raw: &[u8]) -> Self {
        match raw[0] {
            END_MARKER => return DirRecord::End,
            FREE_MARKER => return DirRecord::Free,
            _ => (),
        }

        if raw[OFF_ATTR] & LONG_NAME_MASK == LONG_NAME {
            let mut units = [0; LFN_UNITS_PER_FRAGMENT];
            for (u, off) in units.iter_mut().zip(LFN_UNIT_OFFSETS) {
                *u = le_u16(raw, off);
            }

            return DirRecord::LongName(LfnFragment {
                ordinal: raw[0],
                checksum: raw[OFF_LFN_CHECKSUM],
                units,
            });
        }

        let mut name = [0; 11];
        name.copy_from_slice(&raw[..11]);

        let hi = le_u16(raw, OFF_CLUSTER_HI) as u32;
        let lo = le_u16(raw, OFF_CLUSTER_LO) as u32;

        DirRecord::Short(ShortEntry {
            name,
            attributes: Attributes::from_bits_retain(raw[OFF_ATTR]),
            nt_res: raw[OFF_NT_RES],
            first_cluster: (hi << 16) | lo,
            size: le_u32(raw, OFF_SIZE),
        })
    }
}

impl LfnFragment {
    /// Whether this fragment starts a new long name.
    pub fn is_last(&self) -> bool {
        self.ordinal & LFN_LAST_FRAGMENT != 0
    }

    /// The 1-based position of this fragment within its name.
    pub fn sequence(&self) -> u8 {
        self.ordinal & LFN_ORDINAL_MASK
    }
}

impl ShortEntry {
    pub fn checksum(&self) -> u8 {
        short_name_checksum(&self.name)
    }

    pub fn is_volume_id(&self) -> bool {
        self.attributes.contains(Attributes::VOLUME_ID)
    }

    pub fn is_directory(&self) -> bool {
        self.attributes.contains(Attributes::DIRECTORY)
    }

    /// `.` and `..`.
    pub fn is_dot_entry(&self) -> bool {
        self.name[0] == b'.'
    }

    /// Render the 8.3 name: trimmed base, and `.EXT` if the extension is not blank.
    ///
    /// Directories get no separator, their extension is appended to the base as is.
    pub fn display_name(&self) -> heapless::String<SHORT_NAME_MAX> {
        fn push_part(out: &mut heapless::String<SHORT_NAME_MAX>, part: &[u8], lower: bool) {
            let len = part.iter().rposition(|c| *c != b' ').map_or(0, |p| p + 1);

            for c in &part[..len] {
                let c = if c.is_ascii() && !c.is_ascii_control() {
                    *c as char
                } else {
                    '?'
                };
                let c = if lower { c.to_ascii_lowercase() } else { c };

                // 8 + 1 + 3 characters always fit.
                let _ = out.push(c);
            }
        }

        let mut base = [0; 8];
        base.copy_from_slice(&self.name[..8]);
        if base[0] == KANJI_E5 {
            base[0] = FREE_MARKER;
        }

        let mut out = heapless::String::new();
        push_part(&mut out, &base, self.nt_res & NT_LOWER_BASE != 0);

        let ext = &self.name[8..];
        if ext.iter().any(|c| *c != b' ') {
            if !self.is_directory() {
                let _ = out.push('.');
            }
            push_part(&mut out, ext, self.nt_res & NT_LOWER_EXT != 0);
        }

        out
    }
}

//--------------------------------------------------------------------------------------------------
// Testing
//--------------------------------------------------------------------------------------------------
