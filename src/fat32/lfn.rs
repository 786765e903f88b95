// SPDX-License-Identifier: MIT OR Apache-2.0
//
// Copyright (c) 2023 Andre Richter <andre.o.richter@gmail.com>

//! Long file name assembly.
//!
//! # Orientation
//!
//! The path of this file is:
//!
//! crate::fat32::lfn

use super::dir::{LfnFragment, LFN_UNITS_PER_FRAGMENT};

//--------------------------------------------------------------------------------------------------
// Public Definitions
//--------------------------------------------------------------------------------------------------

/// Most fragments a long name can span. 20 fragments hold the 255 character maximum.
pub const MAX_FRAGMENTS: usize = 20;

/// Longest long name in characters.
pub const NAME_MAX: usize = MAX_FRAGMENTS * LFN_UNITS_PER_FRAGMENT;

/// Collects fragments until the short entry they describe arrives.
///
/// Fragments are stored highest ordinal first, so the fragment flagged as last starts a new name.
/// A name is only handed out if every ordinal up to the last one was seen with the checksum the
/// starting fragment announced.
pub struct LongNameBuilder {
    buf: [u8; NAME_MAX],
    count: u8,
    checksum: u8,
    seen: u32,
    active: bool,
}

//--------------------------------------------------------------------------------------------------
// Private Code
//--------------------------------------------------------------------------------------------------

fn decode_unit(u: u16) -> u8 {
    if u < 0x80 {
        u as u8
    } else {
        b'?'
    }
}

//--------------------------------------------------------------------------------------------------
// Public Code
//--------------------------------------------------------------------------------------------------

impl LongNameBuilder {
    /// Create an instance.
    pub const fn new() -> Self {
        Self {
            buf: [0; NAME_MAX],
            count: 0,
            checksum: 0,
            seen: 0,
            active: false,
        }
    }

    /// Drop any partially assembled name.
    pub fn reset(&mut self) {
        self.count = 0;
        self.checksum = 0;
        self.seen = 0;
        self.active = false;
    }

    /// Add a fragment.
    pub fn push(&mut self, frag: &LfnFragment) {
        let seq = frag.sequence();

        if seq == 0 || seq as usize > MAX_FRAGMENTS {
            self.reset();
            return;
        }

        if frag.is_last() {
            self.reset();
            self.active = true;
            self.count = seq;
            self.checksum = frag.checksum;
        } else if !self.active || frag.checksum != self.checksum || seq > self.count {
            self.reset();
            return;
        }

        let start = (seq as usize - 1) * LFN_UNITS_PER_FRAGMENT;
        for (dst, u) in self.buf[start..start + LFN_UNITS_PER_FRAGMENT]
            .iter_mut()
            .zip(frag.units)
        {
            *dst = match u {
                0x0000 | 0xFFFF => 0,
                _ => decode_unit(u),
            };
        }
        self.seen |= 1 << (seq - 1);
    }

    /// The assembled name, if complete and belonging to a short entry with `short_checksum`.
    pub fn name(&self, short_checksum: u8) -> Option<&str> {
        let complete = (1_u32 << self.count) - 1;

        if !self.active || self.seen != complete || self.checksum != short_checksum {
            return None;
        }

        let used = &self.buf[..self.count as usize * LFN_UNITS_PER_FRAGMENT];
        let len = used.iter().position(|c| *c == 0).unwrap_or(used.len());
        if len == 0 {
            return None;
        }

        core::str::from_utf8(&used[..len]).ok()
    }
}

impl Default for LongNameBuilder {
    fn default() -> Self {
        Self::new()
    }
}

//--------------------------------------------------------------------------------------------------
// Testing
//--------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fat32::dir::{short_name_checksum, LFN_LAST_FRAGMENT};

    /// Split `name` into fragments in on-disk order, i.e. highest ordinal first.
    fn fragments(name: &str, checksum: u8) -> std::vec::Vec<LfnFragment> {
        let units: std::vec::Vec<u16> = name.encode_utf16().collect();
        let n = units.len().div_ceil(LFN_UNITS_PER_FRAGMENT);

        (1..=n)
            .rev()
            .map(|seq| {
                let mut frag = [0xFFFF_u16; LFN_UNITS_PER_FRAGMENT];
                let start = (seq - 1) * LFN_UNITS_PER_FRAGMENT;
                for (i, slot) in frag.iter_mut().enumerate() {
                    match units.get(start + i) {
                        Some(u) => *slot = *u,
                        None if start + i == units.len() => *slot = 0,
                        None => (),
                    }
                }

                LfnFragment {
                    ordinal: seq as u8 | if seq == n { LFN_LAST_FRAGMENT } else { 0 },
                    checksum,
                    units: frag,
                }
            })
            .collect()
    }

    #[test]
    fn fragments_assemble_in_ordinal_order() {
        let sum = short_name_checksum(b"LINUX-~1IMG");
        let mut b = LongNameBuilder::new();

        for f in fragments("linux-5.15.0-generic.img", sum) {
            b.push(&f);
        }

        assert_eq!(b.name(sum), Some("linux-5.15.0-generic.img"));
    }

    #[test]
    fn checksum_mismatch_yields_nothing() {
        let sum = short_name_checksum(b"LINUX-~1IMG");
        let mut b = LongNameBuilder::new();

        for f in fragments("linux-5.15.0-generic.img", sum) {
            b.push(&f);
        }

        assert_eq!(b.name(sum.wrapping_add(1)), None);
    }

    #[test]
    fn missing_fragment_yields_nothing() {
        let mut b = LongNameBuilder::new();
        let frags = fragments("a-name-spanning-three-fragments", 7);
        assert_eq!(frags.len(), 3);

        b.push(&frags[0]);
        b.push(&frags[2]);

        assert_eq!(b.name(7), None);
    }

    #[test]
    fn non_ascii_units_decode_as_placeholder() {
        let mut b = LongNameBuilder::new();

        for f in fragments("caf\u{e9}.bin", 1) {
            b.push(&f);
        }

        assert_eq!(b.name(1), Some("caf?.bin"));
    }

    #[test]
    fn orphan_fragment_is_ignored() {
        let mut b = LongNameBuilder::new();
        let frags = fragments("a-name-spanning-three-fragments", 7);

        // Middle fragment without its starting fragment.
        b.push(&frags[1]);
        assert_eq!(b.name(7), None);

        let bogus = LfnFragment {
            ordinal: LFN_LAST_FRAGMENT | 40,
            checksum: 7,
            units: [0; LFN_UNITS_PER_FRAGMENT],
        };
        b.push(&bogus);
        assert_eq!(b.name(7), None);
    }
}
