// SPDX-License-Identifier: MIT OR Apache-2.0
//
// Copyright (c) 2023 Andre Richter <andre.o.richter@gmail.com>

//! Test helpers: an in-memory FAT32 image builder.

#![allow(dead_code)]

pub const BPS: usize = 512;
pub const RESERVED_SECTORS: usize = 32;

/// End of chain marker as written by common formatters.
pub const EOC: u32 = 0x0FFF_FFFF;

const NT_LOWER_BASE: u8 = 0x08;
const NT_LOWER_EXT: u8 = 0x10;

const ATTR_VOLUME_ID: u8 = 0x08;
const ATTR_DIRECTORY: u8 = 0x10;
const ATTR_ARCHIVE: u8 = 0x20;
const ATTR_LONG_NAME: u8 = 0x0F;

const LFN_UNIT_OFFSETS: [usize; 13] = [1, 3, 5, 7, 9, 14, 16, 18, 20, 22, 24, 28, 30];

/// One directory record to emit.
pub enum Record<'a> {
    File {
        name: &'a str,
        cluster: u32,
        size: u32,
    },
    Dir {
        name: &'a str,
        cluster: u32,
    },
    /// A file whose long name fragments carry the wrong checksum. `short` must be a valid 8.3
    /// name.
    StaleLongName {
        long: &'a str,
        short: &'a str,
        cluster: u32,
        size: u32,
    },
    /// A deleted entry.
    Deleted,
    /// The end of directory marker.
    End,
    VolumeId(&'a str),
}

/// A FAT32 volume with one FAT copy, assembled in memory.
///
/// Cluster 2 is the root directory.
pub struct FatImage {
    bytes: Vec<u8>,
    sectors_per_cluster: usize,
    clusters: usize,
    fat_sectors: usize,
    next_free: u32,
    alias_counter: usize,
}

fn short_checksum(name: &[u8; 11]) -> u8 {
    name.iter()
        .fold(0_u8, |sum, c| ((sum & 1) << 7).wrapping_add(sum >> 1).wrapping_add(*c))
}

fn is_short_char(c: u8) -> bool {
    c.is_ascii_alphanumeric() || b"$%'-_@~`!(){}^#&".contains(&c)
}

fn uniform_case(part: &str) -> Option<bool> {
    let has_lower = part.bytes().any(|c| c.is_ascii_lowercase());
    let has_upper = part.bytes().any(|c| c.is_ascii_uppercase());

    match (has_lower, has_upper) {
        (true, true) => None,
        (lower, _) => Some(lower),
    }
}

/// The 8.3 form of `name` and its case flags, if `name` needs no long name.
fn short_form(name: &str) -> Option<([u8; 11], u8)> {
    let (base, ext) = match name.rfind('.') {
        Some(p) => (&name[..p], &name[p + 1..]),
        None => (name, ""),
    };

    if base.is_empty() || base.len() > 8 || ext.len() > 3 {
        return None;
    }
    if !base.bytes().chain(ext.bytes()).all(is_short_char) {
        return None;
    }

    let mut flags = 0;
    if uniform_case(base)? {
        flags |= NT_LOWER_BASE;
    }
    if uniform_case(ext)? {
        flags |= NT_LOWER_EXT;
    }

    let mut out = [b' '; 11];
    for (d, c) in out.iter_mut().zip(base.bytes()) {
        *d = c.to_ascii_uppercase();
    }
    for (d, c) in out[8..].iter_mut().zip(ext.bytes()) {
        *d = c.to_ascii_uppercase();
    }

    Some((out, flags))
}

fn short_entry(name: &[u8; 11], nt_res: u8, attr: u8, cluster: u32, size: u32) -> [u8; 32] {
    let mut raw = [0_u8; 32];

    raw[..11].copy_from_slice(name);
    raw[11] = attr;
    raw[12] = nt_res;
    raw[20..22].copy_from_slice(&((cluster >> 16) as u16).to_le_bytes());
    raw[26..28].copy_from_slice(&(cluster as u16).to_le_bytes());
    raw[28..32].copy_from_slice(&size.to_le_bytes());

    raw
}

/// Long-name fragments of `name`, in on-disk order.
fn lfn_entries(name: &str, checksum: u8) -> Vec<[u8; 32]> {
    let units: Vec<u16> = name.encode_utf16().collect();
    let count = units.len().div_ceil(13);
    let mut out = Vec::new();

    for seq in (1..=count).rev() {
        let mut raw = [0_u8; 32];
        raw[0] = seq as u8 | if seq == count { 0x40 } else { 0 };
        raw[11] = ATTR_LONG_NAME;
        raw[13] = checksum;

        for (i, off) in LFN_UNIT_OFFSETS.iter().enumerate() {
            let idx = (seq - 1) * 13 + i;
            let u = match idx.cmp(&units.len()) {
                std::cmp::Ordering::Less => units[idx],
                std::cmp::Ordering::Equal => 0x0000,
                std::cmp::Ordering::Greater => 0xFFFF,
            };
            raw[*off..*off + 2].copy_from_slice(&u.to_le_bytes());
        }

        out.push(raw);
    }

    out
}

impl FatImage {
    /// A volume with `clusters` data clusters of `sectors_per_cluster` sectors each.
    pub fn new(clusters: usize, sectors_per_cluster: usize) -> Self {
        let fat_sectors = ((clusters + 2) * 4).div_ceil(BPS);
        let total_sectors = RESERVED_SECTORS + fat_sectors + clusters * sectors_per_cluster;

        let mut img = Self {
            bytes: vec![0; total_sectors * BPS],
            sectors_per_cluster,
            clusters,
            fat_sectors,
            next_free: 3,
            alias_counter: 0,
        };

        let b = &mut img.bytes;
        b[0..3].copy_from_slice(&[0xEB, 0x58, 0x90]);
        b[3..11].copy_from_slice(b"TESTFAT ");
        b[11..13].copy_from_slice(&(BPS as u16).to_le_bytes());
        b[13] = sectors_per_cluster as u8;
        b[14..16].copy_from_slice(&(RESERVED_SECTORS as u16).to_le_bytes());
        b[16] = 1;
        b[21] = 0xF8;
        b[32..36].copy_from_slice(&(total_sectors as u32).to_le_bytes());
        b[36..40].copy_from_slice(&(fat_sectors as u32).to_le_bytes());
        b[44..48].copy_from_slice(&2_u32.to_le_bytes());
        b[510] = 0x55;
        b[511] = 0xAA;

        img.set_link(0, 0x0FFF_FFF8);
        img.set_link(1, EOC);
        img.set_link(2, EOC);

        img
    }

    pub fn cluster_size(&self) -> usize {
        self.sectors_per_cluster * BPS
    }

    pub fn cluster_count(&self) -> usize {
        self.clusters
    }

    fn cluster_offset(&self, cluster: u32) -> usize {
        (RESERVED_SECTORS + self.fat_sectors) * BPS + (cluster as usize - 2) * self.cluster_size()
    }

    /// Write the raw FAT entry of `cluster`.
    pub fn set_link(&mut self, cluster: u32, link: u32) {
        let off = RESERVED_SECTORS * BPS + cluster as usize * 4;
        self.bytes[off..off + 4].copy_from_slice(&link.to_le_bytes());
    }

    /// Reserve `n` consecutive free clusters.
    pub fn alloc(&mut self, n: usize) -> Vec<u32> {
        let first = self.next_free;
        self.next_free += n as u32;
        assert!(self.next_free as usize <= self.clusters + 2, "image full");

        (first..first + n as u32).collect()
    }

    /// Spread `data` over `chain`, linking the clusters in the given order.
    pub fn write_chain(&mut self, chain: &[u32], data: &[u8]) {
        let cs = self.cluster_size();
        assert!(data.len() <= chain.len() * cs);

        for (i, c) in chain.iter().enumerate() {
            let link = chain.get(i + 1).copied().unwrap_or(EOC);
            self.set_link(*c, link);

            let start = (i * cs).min(data.len());
            let end = ((i + 1) * cs).min(data.len());
            let off = self.cluster_offset(*c);
            self.bytes[off..off + end - start].copy_from_slice(&data[start..end]);
        }
    }

    /// Store `data` in fresh clusters. Returns the first cluster, or 0 for an empty file.
    pub fn add_file(&mut self, data: &[u8]) -> u32 {
        if data.is_empty() {
            return 0;
        }

        let chain = self.alloc(data.len().div_ceil(self.cluster_size()));
        self.write_chain(&chain, data);

        chain[0]
    }

    fn dir_bytes(&mut self, records: &[Record]) -> Vec<u8> {
        let mut out = Vec::new();

        for rec in records {
            let (name, attr, cluster, size) = match *rec {
                Record::File {
                    name,
                    cluster,
                    size,
                } => (name, ATTR_ARCHIVE, cluster, size),
                Record::Dir { name, cluster } => (name, ATTR_DIRECTORY, cluster, 0),
                Record::StaleLongName {
                    long,
                    short,
                    cluster,
                    size,
                } => {
                    let (short, flags) = short_form(short).expect("not an 8.3 name");
                    let stale = short_checksum(&short).wrapping_add(1);

                    for frag in lfn_entries(long, stale) {
                        out.extend_from_slice(&frag);
                    }
                    out.extend_from_slice(&short_entry(&short, flags, ATTR_ARCHIVE, cluster, size));
                    continue;
                }
                Record::End => {
                    out.extend_from_slice(&[0; 32]);
                    continue;
                }
                Record::Deleted => {
                    let mut raw = short_entry(b"DELETED TXT", 0, ATTR_ARCHIVE, 0, 0);
                    raw[0] = 0xE5;
                    out.extend_from_slice(&raw);
                    continue;
                }
                Record::VolumeId(label) => {
                    let mut name = [b' '; 11];
                    for (d, c) in name.iter_mut().zip(label.bytes()) {
                        *d = c;
                    }
                    out.extend_from_slice(&short_entry(&name, 0, ATTR_VOLUME_ID, 0, 0));
                    continue;
                }
            };

            match short_form(name) {
                Some((short, flags)) => {
                    out.extend_from_slice(&short_entry(&short, flags, attr, cluster, size));
                }
                None => {
                    self.alias_counter += 1;
                    let alias = format!("LFN{:03}~1", self.alias_counter % 1000);
                    let mut short = [b' '; 11];
                    short[..8].copy_from_slice(alias.as_bytes());

                    for frag in lfn_entries(name, short_checksum(&short)) {
                        out.extend_from_slice(&frag);
                    }
                    out.extend_from_slice(&short_entry(&short, 0, attr, cluster, size));
                }
            }
        }

        out
    }

    /// Write a directory into fresh clusters and return its first cluster.
    pub fn add_dir(&mut self, records: &[Record]) -> u32 {
        let bytes = self.dir_bytes(records);
        let n = bytes.len().div_ceil(self.cluster_size()).max(1);
        let chain = self.alloc(n);
        self.write_chain(&chain, &bytes);

        chain[0]
    }

    /// Write the root directory. Extra clusters are allocated if cluster 2 does not suffice.
    pub fn set_root(&mut self, records: &[Record]) {
        let bytes = self.dir_bytes(records);
        let extra = bytes.len().div_ceil(self.cluster_size()).saturating_sub(1);

        let mut chain = vec![2];
        chain.extend(self.alloc(extra));
        self.write_chain(&chain, &bytes);
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }
}

/// `len` bytes of a recognizable pattern.
pub fn pattern(len: usize, seed: u8) -> Vec<u8> {
    (0..len)
        .map(|i| (i as u8).wrapping_mul(31).wrapping_add(seed))
        .collect()
}
