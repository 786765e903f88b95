// SPDX-License-Identifier: MIT OR Apache-2.0
//
// Copyright (c) 2023 Andre Richter <andre.o.richter@gmail.com>

//! Read-only FAT32 cluster chain reader.
//!
//! Resolves paths to directory entries and streams file contents, without any heap. All state of
//! a mounted volume lives in [`Volume`]:
//!
//! - the boot parameter block, decoded once at mount time;
//! - the FAT cache, backed by memory the caller hands in.

pub mod bpb;
pub mod dir;
pub mod lfn;
pub mod table;

use crate::{error::Error, storage::interface::BlockDevice, verbose};
use bpb::{BootParameterBlock, BPB_SIZE};
use dir::{Attributes, DirRecord, ENTRY_SIZE};
use lfn::LongNameBuilder;
use table::{is_chain_end, FatTable};

//--------------------------------------------------------------------------------------------------
// Private Definitions
//--------------------------------------------------------------------------------------------------

/// Position of a directory scan, carried from one entry to the next.
struct DirCursor {
    /// Cluster being scanned, `None` once the directory is exhausted.
    cluster: Option<u32>,
    /// Byte offset of the next record within the cluster.
    offset: usize,
    /// Clusters visited so far.
    steps: u32,
    long_name: LongNameBuilder,
}

//--------------------------------------------------------------------------------------------------
// Public Definitions
//--------------------------------------------------------------------------------------------------

/// Largest supported sector size.
pub const MAX_SECTOR_SIZE: usize = 4096;

/// Longest file name.
pub const NAME_MAX: usize = 255;

/// Longest full path handed to a directory walk visitor.
pub const PATH_MAX: usize = 512;

/// Deepest directory nesting a directory walk descends into.
pub const MAX_WALK_DEPTH: usize = 8;

/// A file name.
pub type FileName = heapless::String<NAME_MAX>;

/// A resolved directory entry.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DirEntry {
    /// Long name if one was stored and verified, the rendered short name otherwise.
    pub name: FileName,
    pub attributes: Attributes,
    pub first_cluster: u32,
    pub size: u32,
}

/// A mounted FAT32 volume.
pub struct Volume<'c, D: BlockDevice> {
    device: D,
    bpb: BootParameterBlock,
    fat: FatTable<'c>,
    cluster_count: u32,
}

//--------------------------------------------------------------------------------------------------
// Private Code
//--------------------------------------------------------------------------------------------------

fn file_name(s: &str) -> FileName {
    let mut name = FileName::new();

    for c in s.chars() {
        if name.push(c).is_err() {
            break;
        }
    }

    name
}

impl DirCursor {
    fn new(cluster: u32) -> Self {
        Self {
            cluster: Some(cluster),
            offset: 0,
            steps: 1,
            long_name: LongNameBuilder::new(),
        }
    }
}

impl<D: BlockDevice> Volume<'_, D> {
    /// The next visible entry after `cur`, or `None` at the end of the directory.
    ///
    /// Reads each directory sector once per returned entry at most.
    fn next_in_dir(&mut self, cur: &mut DirCursor) -> Result<Option<DirEntry>, Error> {
        let bps = self.bpb.bytes_per_sector();
        let cluster_size = self.bpb.cluster_size();
        let mut buf = [0_u8; MAX_SECTOR_SIZE];

        while let Some(c) = cur.cluster {
            if cur.offset >= cluster_size {
                cur.cluster = self.fat.next(&self.device, c)?;
                cur.offset = 0;

                cur.steps += 1;
                if cur.steps > self.cluster_count {
                    return Err(Error::IoFailure);
                }
                continue;
            }

            let sector_start = cur.offset - cur.offset % bps;
            let sector = &mut buf[..bps];
            self.device
                .read_at(self.bpb.cluster_offset(c) + sector_start as u64, sector)?;

            while cur.offset < sector_start + bps {
                let at = cur.offset - sector_start;
                let raw = &sector[at..at + ENTRY_SIZE];
                cur.offset += ENTRY_SIZE;

                let short = match DirRecord::parse(raw) {
                    DirRecord::End => {
                        cur.cluster = None;
                        return Ok(None);
                    }
                    DirRecord::Free => {
                        cur.long_name.reset();
                        continue;
                    }
                    DirRecord::LongName(frag) => {
                        cur.long_name.push(&frag);
                        continue;
                    }
                    DirRecord::Short(short) => short,
                };

                if short.is_volume_id() || short.is_dot_entry() {
                    cur.long_name.reset();
                    continue;
                }

                let name = match cur.long_name.name(short.checksum()) {
                    Some(n) => file_name(n),
                    None => file_name(short.display_name().as_str()),
                };
                cur.long_name.reset();

                return Ok(Some(DirEntry {
                    name,
                    attributes: short.attributes,
                    first_cluster: short.first_cluster,
                    size: short.size,
                }));
            }
        }

        Ok(None)
    }

    /// Find `name` in the directory starting at `cluster`.
    fn find_in_dir(&mut self, cluster: u32, name: &str) -> Result<DirEntry, Error> {
        let mut cur = DirCursor::new(cluster);

        while let Some(entry) = self.next_in_dir(&mut cur)? {
            if entry.name.eq_ignore_ascii_case(name) {
                return Ok(entry);
            }
        }

        Err(Error::NotFound)
    }

    fn walk(
        &mut self,
        cluster: u32,
        path: &mut heapless::String<PATH_MAX>,
        depth: usize,
        visitor: &mut dyn FnMut(&str, &DirEntry),
    ) -> Result<(), Error> {
        let mut cur = DirCursor::new(cluster);

        while let Some(entry) = self.next_in_dir(&mut cur)? {
            let parent_len = path.len();
            path.push('/')
                .and_then(|_| path.push_str(&entry.name))
                .map_err(|_| Error::SizeExceeded)?;

            visitor(path.as_str(), &entry);

            if entry.attributes.contains(Attributes::DIRECTORY)
                && !is_chain_end(entry.first_cluster)
                && depth + 1 < MAX_WALK_DEPTH
            {
                self.walk(entry.first_cluster, path, depth + 1, visitor)?;
            }

            path.truncate(parent_len);
        }

        Ok(())
    }
}

//--------------------------------------------------------------------------------------------------
// Public Code
//--------------------------------------------------------------------------------------------------

impl DirEntry {
    pub fn is_directory(&self) -> bool {
        self.attributes.contains(Attributes::DIRECTORY)
    }
}

impl<'c, D: BlockDevice> Volume<'c, D> {
    /// Read and validate the boot parameter block of `device`.
    ///
    /// `fat_cache` backs the FAT cache, one slot per cluster. It may be smaller than the FAT.
    pub fn mount(device: D, fat_cache: &'c mut [u32]) -> Result<Self, Error> {
        let mut sector = [0_u8; BPB_SIZE];
        device.read_at(0, &mut sector)?;

        let bpb = BootParameterBlock::parse(&sector)?;
        verbose!("FAT32: {}", bpb);

        Ok(Self {
            fat: FatTable::new(fat_cache, &bpb),
            cluster_count: bpb.cluster_count(),
            device,
            bpb,
        })
    }

    /// The volume geometry.
    pub fn bpb(&self) -> &BootParameterBlock {
        &self.bpb
    }

    /// Give back the underlying device.
    pub fn into_device(self) -> D {
        self.device
    }

    /// Resolve a `/` separated path, starting at the root directory.
    ///
    /// Names match case-insensitively. Empty components are ignored. All but the final component
    /// must be directories, and the final one must not be.
    pub fn resolve_path(&mut self, path: &str) -> Result<DirEntry, Error> {
        let mut components = path.split('/').filter(|c| !c.is_empty()).peekable();
        let mut cluster = self.bpb.root_cluster();

        while let Some(component) = components.next() {
            let entry = self.find_in_dir(cluster, component)?;

            if components.peek().is_none() {
                if entry.is_directory() {
                    return Err(Error::NotFound);
                }
                return Ok(entry);
            }

            if !entry.is_directory() || is_chain_end(entry.first_cluster) {
                return Err(Error::NotFound);
            }
            cluster = entry.first_cluster;
        }

        Err(Error::NotFound)
    }

    /// Read the beginning of a file into `buf`.
    pub fn read_file(&mut self, entry: &DirEntry, buf: &mut [u8]) -> Result<usize, Error> {
        self.read_file_at(entry, 0, buf)
    }

    /// Read a file starting `offset` bytes in.
    ///
    /// Each chunk is capped to the remaining buffer, the remaining file and one cluster. Returns
    /// the number of bytes read, which is short if the chain ends before the file does.
    pub fn read_file_at(
        &mut self,
        entry: &DirEntry,
        offset: usize,
        buf: &mut [u8],
    ) -> Result<usize, Error> {
        let file_size = entry.size as usize;
        if offset >= file_size || buf.is_empty() {
            return Ok(0);
        }
        if is_chain_end(entry.first_cluster) {
            return Err(Error::IoFailure);
        }

        let cluster_size = self.bpb.cluster_size();
        let want = buf.len().min(file_size - offset);
        let mut within = offset % cluster_size;
        let mut steps = 0;

        let mut cluster = Some(entry.first_cluster);
        for _ in 0..offset / cluster_size {
            let Some(c) = cluster else { break };
            cluster = self.fat.next(&self.device, c)?;

            steps += 1;
            if steps > self.cluster_count {
                return Err(Error::IoFailure);
            }
        }

        let mut done = 0;
        while let Some(c) = cluster {
            let chunk = (want - done).min(cluster_size - within);
            let dst = &mut buf[done..done + chunk];
            self.device
                .read_at(self.bpb.cluster_offset(c) + within as u64, dst)?;

            done += chunk;
            within = 0;
            if done == want {
                break;
            }

            cluster = self.fat.next(&self.device, c)?;
            steps += 1;
            if steps > self.cluster_count {
                return Err(Error::IoFailure);
            }
        }

        Ok(done)
    }

    /// Visit every file and directory of the volume, depth first.
    ///
    /// The visitor receives the full path, e.g. `/bootcfg/linux`. Directories nested deeper than
    /// [`MAX_WALK_DEPTH`] are not descended into.
    pub fn for_each_entry(
        &mut self,
        mut visitor: impl FnMut(&str, &DirEntry),
    ) -> Result<(), Error> {
        let mut path = heapless::String::new();
        let root = self.bpb.root_cluster();

        self.walk(root, &mut path, 0, &mut visitor)
    }
}
