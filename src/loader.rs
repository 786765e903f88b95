// SPDX-License-Identifier: MIT OR Apache-2.0
//
// Copyright (c) 2023 Andre Richter <andre.o.richter@gmail.com>

//! Image loading.
//!
//! Walks the platform's load list and brings every image into its memory region, then hands
//! back the entry point of the first image that receives control.
//!
//! Per image, in list order:
//!
//! 1. Platform setup, if requested by the image and not done before.
//! 2. Pre-load hook.
//! 3. Unless the image is marked to skip loading: fetch, authenticate, copy. Two failures are
//!    recovered from. A missing secondary payload is loaded as empty, and a monitor image that
//!    fails to load is replaced by the built-in fallback copy.
//! 4. Post-load hook.
//!
//! Any other failure ends loading. [`bl2_load_images`] hands it to the platform's error handler.

use crate::{
    common, console,
    context::{interface::SysRegs, ContextManager},
    cpu, crc32,
    error::Error,
    image::{
        BlLoadInfo, BlParams, EntryPointInfo, ImageAttributes, ImageId, ImageInfo,
        PARAM_BL_LOAD_INFO, PARAM_BL_PARAMS, PARAM_EP,
    },
    info,
    memory::MemoryRegion,
    storage::{interface::IoDevice, Entity, ImageSpec},
    warn,
};
use core::fmt;

//--------------------------------------------------------------------------------------------------
// Private Definitions
//--------------------------------------------------------------------------------------------------

/// Number of 64 bit words in a table of pre-positioned images.
const PREPOSITIONED_WORDS: usize = 32;

/// The last word holds the CRC, each image takes an address and a size word.
const PREPOSITIONED_SLOTS: usize = (PREPOSITIONED_WORDS - 1) / 2;

/// Images already placed in memory by an earlier boot stage.
///
/// The table holds `(address, size)` word pairs, one per loaded image in load order, followed by
/// a CRC-32 over all preceding words.
struct PrepositionedTable {
    words: [u64; PREPOSITIONED_WORDS],
}

//--------------------------------------------------------------------------------------------------
// Public Definitions
//--------------------------------------------------------------------------------------------------

/// Loader interfaces.
pub mod interface {
    use super::*;

    /// Everything the loader needs from the platform.
    pub trait Platform {
        /// The images to load, in load order.
        fn bl_image_load_info(&mut self) -> &mut BlLoadInfo;

        /// The parameters handed to the next image. Called once all images are loaded.
        fn next_bl_params(&mut self) -> &mut BlParams;

        /// Write the next image's parameters back to memory.
        fn flush_next_bl_params(&mut self);

        /// The device and location that `image_id` is read from.
        fn image_source(
            &mut self,
            image_id: ImageId,
        ) -> Result<(&mut dyn IoDevice, ImageSpec), Error>;

        /// Check a freshly loaded image.
        fn authenticate(&mut self, image_id: ImageId, image: &[u8]) -> Result<(), Error> {
            let _ = (image_id, image);
            Ok(())
        }

        /// One-time platform setup, requested by the first image that carries
        /// [`ImageAttributes::PLAT_SETUP`].
        fn platform_setup(&mut self) {}

        /// Called before an image is loaded. A non-zero status stops loading.
        fn pre_image_load(&mut self, image_id: ImageId) -> i32 {
            let _ = image_id;
            0
        }

        /// Called after an image is loaded or skipped. A non-zero status stops loading.
        fn post_image_load(&mut self, image_id: ImageId) -> i32 {
            let _ = image_id;
            0
        }

        /// Record the anti-rollback version of the images just loaded.
        fn update_rollback_version(&mut self) -> i32 {
            0
        }

        /// Give up. Never returns.
        fn error_handler(&mut self, status: i32) -> !;
    }
}

/// Loading policy.
#[derive(Copy, Clone, Debug)]
pub struct LoaderConfig {
    /// Built-in copy of the monitor image, used if loading it fails.
    pub fallback_monitor_image: Option<&'static [u8]>,
    /// Address of a CRC protected table of images placed in memory ahead of time.
    pub prepositioned_table: Option<usize>,
    /// The image that falls back to [`LoaderConfig::fallback_monitor_image`].
    pub monitor_image: ImageId,
    /// The image that may be absent.
    pub secondary_payload: ImageId,
}

/// Where a load run stands.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum LoaderState {
    NotStarted,
    /// Working on the load list entry at `index`.
    PerImage { index: usize },
    /// Preparing the parameters of the next image.
    Finalizing,
    Done,
}

/// Why loading stopped.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum LoadError {
    /// The pre-load hook returned a non-zero status.
    PreLoadHook { image_id: ImageId, status: i32 },
    /// An image could not be loaded and no recovery applied.
    Image { image_id: ImageId, error: Error },
    /// The post-load hook returned a non-zero status.
    PostLoadHook { image_id: ImageId, status: i32 },
    /// The load list or the next image's parameters are malformed.
    Params(Error),
    /// Updating the anti-rollback version failed.
    RollbackUpdate(i32),
}

/// Drives one pass over the platform's load list.
pub struct ImageLoader<'p, P: interface::Platform> {
    platform: &'p mut P,
    config: LoaderConfig,
    state: LoaderState,
    plat_setup_done: bool,
}

//--------------------------------------------------------------------------------------------------
// Private Code
//--------------------------------------------------------------------------------------------------

impl PrepositionedTable {
    /// Read the table at `addr`. Returns `None` if its CRC does not match.
    ///
    /// A matching table is invalidated in memory, so that it is used by one boot only.
    ///
    /// # Safety
    ///
    /// - `addr` must point to [`PREPOSITIONED_WORDS`] readable and writable, aligned words.
    unsafe fn take(addr: usize) -> Option<Self> {
        if !common::is_aligned(addr, core::mem::align_of::<u64>()) {
            warn!("Pre-positioned image table at {:#x} is misaligned", addr);
            return None;
        }

        let table = core::slice::from_raw_parts_mut(addr as *mut u64, PREPOSITIONED_WORDS);

        let crc = table[..PREPOSITIONED_WORDS - 1]
            .iter()
            .fold(0, |crc, w| crc32::crc32_update(crc, &w.to_ne_bytes()));

        // Only the low half of the last word holds the CRC.
        if crc != table[PREPOSITIONED_WORDS - 1] as u32 {
            return None;
        }

        let mut words = [0; PREPOSITIONED_WORDS];
        words.copy_from_slice(table);

        table[PREPOSITIONED_WORDS - 1] = 0;
        cpu::flush_dcache_range(addr, PREPOSITIONED_WORDS * core::mem::size_of::<u64>());

        Some(Self { words })
    }

    /// The `(address, size)` of the `n`th loaded image, if it was pre-positioned.
    fn slot(&self, n: usize) -> Option<(usize, usize)> {
        if n >= PREPOSITIONED_SLOTS || self.words[2 * n] == 0 {
            return None;
        }

        Some((self.words[2 * n] as usize, self.words[2 * n + 1] as usize))
    }
}

/// Copy `src` into the image's region and record its size.
///
/// # Safety
///
/// - The image's region must be valid for writes, see [`MemoryRegion::as_mut_slice`].
unsafe fn copy_image(image_id: ImageId, info: &mut ImageInfo, src: &[u8]) -> Result<(), Error> {
    let region = info.region();

    info!(
        "Copying image id {} to {:#x}, size {:#x}",
        image_id,
        region.base(),
        src.len()
    );

    if let Err(e) = region.copy_in(src) {
        crate::error!("Image id {} size out of bounds", image_id);
        return Err(e);
    }
    info.image_size = src.len();

    Ok(())
}

/// Read exactly `buf.len()` bytes.
fn read_all(dev: &mut dyn IoDevice, entity: &mut Entity, buf: &mut [u8]) -> Result<(), Error> {
    let mut done = 0;

    while done < buf.len() {
        let n = dev.read(entity, &mut buf[done..])?;
        if n == 0 {
            return Err(Error::IoFailure);
        }
        done += n;
    }

    Ok(())
}

impl<'p, P: interface::Platform> ImageLoader<'p, P> {
    /// Fetch an image from its source, copy it into its region and authenticate it.
    ///
    /// # Safety
    ///
    /// - The image's region must be valid for writes, see [`MemoryRegion::as_mut_slice`].
    unsafe fn load_auth_image(
        &mut self,
        image_id: ImageId,
        info: &mut ImageInfo,
    ) -> Result<(), Error> {
        let region: MemoryRegion = info.region();

        let (dev, spec) = self.platform.image_source(image_id)?;
        let mut entity = dev.open(&spec)?;

        let res = (|| -> Result<usize, Error> {
            let size = dev.size(&entity)?;
            if size == 0 {
                warn!("Image id {} is empty", image_id);
                return Err(Error::IoFailure);
            }

            let dst = region.as_mut_slice(size)?;
            read_all(dev, &mut entity, dst)?;

            Ok(size)
        })();
        dev.close(entity);

        let size = res?;
        let image = region.as_mut_slice(size)?;

        if let Err(e) = self.platform.authenticate(image_id, image) {
            crate::error!("Authentication of image id {} failed", image_id);
            image.fill(0);
            cpu::flush_dcache_range(region.base(), size);
            return Err(e);
        }

        info.image_size = size;
        cpu::flush_dcache_range(region.base(), size);

        info!("Image id {} loaded at {:#x}, size {:#x}", image_id, region.base(), size);

        Ok(())
    }

    /// Load a single image, applying the recovery rules.
    unsafe fn load_one(
        &mut self,
        image_id: ImageId,
        info: &mut ImageInfo,
        preloaded: Option<(usize, usize)>,
    ) -> Result<(), Error> {
        let res = match preloaded {
            Some((addr, size)) => {
                let src = core::slice::from_raw_parts(addr as *const u8, size);
                copy_image(image_id, info, src)
            }
            None => {
                info!("Loading image id {}", image_id);
                self.load_auth_image(image_id, info)
            }
        };

        match res {
            Err(Error::NotFound) if image_id == self.config.secondary_payload => {
                info!("Image id {} not present, continuing without it", image_id);
                info.image_size = 0;
                Ok(())
            }
            Err(e) if image_id == self.config.monitor_image => {
                match self.config.fallback_monitor_image {
                    Some(blob) => {
                        warn!("Image id {} failed to load ({}), using built-in copy", image_id, e);
                        copy_image(image_id, info, blob)
                    }
                    None => Err(e),
                }
            }
            other => other,
        }
    }

    fn finalize(&mut self) -> Result<EntryPointInfo, LoadError> {
        let params = self.platform.next_bl_params();
        params.header.validate(PARAM_BL_PARAMS).map_err(LoadError::Params)?;

        let params_addr = &*params as *const BlParams as u64;
        let head = params.head_mut().ok_or(LoadError::Params(Error::InvalidState))?;
        head.ep_info.header.validate(PARAM_EP).map_err(LoadError::Params)?;

        if head.ep_info.args[0] == 0 {
            head.ep_info.args[0] = params_addr;
        }
        let ep = head.ep_info;

        self.platform.flush_next_bl_params();

        let status = self.platform.update_rollback_version();
        if status != 0 {
            return Err(LoadError::RollbackUpdate(status));
        }

        Ok(ep)
    }
}

//--------------------------------------------------------------------------------------------------
// Public Code
//--------------------------------------------------------------------------------------------------

impl LoaderConfig {
    /// Monitor is BL31, secondary payload is the initrd slot, no fallback and no table.
    pub const fn new() -> Self {
        Self {
            fallback_monitor_image: None,
            prepositioned_table: None,
            monitor_image: ImageId::BL31,
            secondary_payload: ImageId::BL32_EXTRA2,
        }
    }
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl LoadError {
    /// Status code for the platform's error handler.
    pub fn status(&self) -> i32 {
        match self {
            LoadError::PreLoadHook { status, .. } | LoadError::PostLoadHook { status, .. } => {
                *status
            }
            LoadError::Image { error, .. } | LoadError::Params(error) => error.errno(),
            LoadError::RollbackUpdate(status) => *status,
        }
    }
}

impl fmt::Display for LoadError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LoadError::PreLoadHook { image_id, status } => {
                write!(f, "Failure in pre image load handling of id {} ({})", image_id, status)
            }
            LoadError::Image { image_id, error } => {
                write!(f, "Failed to load image id {} ({})", image_id, error)
            }
            LoadError::PostLoadHook { image_id, status } => {
                write!(f, "Failure in post image load handling of id {} ({})", image_id, status)
            }
            LoadError::Params(e) => write!(f, "Malformed image parameters ({})", e),
            LoadError::RollbackUpdate(status) => {
                write!(f, "Failure in updating anti-rollback version ({})", status)
            }
        }
    }
}

impl<'p, P: interface::Platform> ImageLoader<'p, P> {
    /// Create an instance.
    pub fn new(platform: &'p mut P, config: LoaderConfig) -> Self {
        Self {
            platform,
            config,
            state: LoaderState::NotStarted,
            plat_setup_done: false,
        }
    }

    /// Where the last run stands, or stopped.
    pub fn state(&self) -> LoaderState {
        self.state
    }

    /// Load all images and return the entry point of the first one to run.
    ///
    /// # Safety
    ///
    /// - The memory region of every load list entry must be valid for writes and must not
    ///   overlap anything else in use, see [`MemoryRegion::as_mut_slice`].
    /// - A configured [`LoaderConfig::prepositioned_table`] must point to readable and writable
    ///   memory, and the images it lists must be readable.
    pub unsafe fn load_images(&mut self) -> Result<EntryPointInfo, LoadError> {
        {
            let load_info = self.platform.bl_image_load_info();
            load_info.header.validate(PARAM_BL_LOAD_INFO).map_err(LoadError::Params)?;
            if load_info.nodes.is_empty() {
                return Err(LoadError::Params(Error::InvalidState));
            }
        }

        let mut prepositioned = None;
        let count = self.platform.bl_image_load_info().nodes.len();
        let mut loaded = 0;

        for index in 0..count {
            self.state = LoaderState::PerImage { index };

            let node = self.platform.bl_image_load_info().nodes[index];
            let image_id = node.image_id;
            let mut info = node.image_info;

            if info.attributes.contains(ImageAttributes::PLAT_SETUP) {
                if self.plat_setup_done {
                    warn!("Platform setup already done");
                } else {
                    info!("Doing platform setup");
                    self.platform.platform_setup();
                    self.plat_setup_done = true;
                }
            }

            // The table may live in memory that platform setup brings up.
            if index == 0 {
                prepositioned = self
                    .config
                    .prepositioned_table
                    .and_then(|addr| PrepositionedTable::take(addr));
                if prepositioned.is_some() {
                    info!("Found pre-positioned images");
                }
            }

            let status = self.platform.pre_image_load(image_id);
            if status != 0 {
                return Err(LoadError::PreLoadHook { image_id, status });
            }

            if info.attributes.contains(ImageAttributes::SKIP_LOADING) {
                info!("Skip loading image id {}", image_id);
            } else {
                let preloaded = prepositioned.as_ref().and_then(|t| t.slot(loaded));
                loaded += 1;

                self.load_one(image_id, &mut info, preloaded)
                    .map_err(|error| LoadError::Image { image_id, error })?;

                self.platform.bl_image_load_info().nodes[index].image_info.image_size =
                    info.image_size;
            }

            let status = self.platform.post_image_load(image_id);
            if status != 0 {
                return Err(LoadError::PostLoadHook { image_id, status });
            }
        }

        self.state = LoaderState::Finalizing;
        let ep = self.finalize()?;
        self.state = LoaderState::Done;

        Ok(ep)
    }
}

/// Load all images, halting through the platform's error handler on failure.
///
/// # Safety
///
/// - See [`ImageLoader::load_images`].
pub unsafe fn bl2_load_images<P: interface::Platform>(
    platform: &mut P,
    config: LoaderConfig,
) -> EntryPointInfo {
    let res = ImageLoader::new(platform, config).load_images();

    match res {
        Ok(ep) => ep,
        Err(e) => {
            crate::error!("BL2: {}", e);
            // The handler may reset the SoC.
            console::console().flush();
            platform.error_handler(e.status())
        }
    }
}

/// Set up the context of the world `ep` enters and select it for the next exception return.
pub fn prepare_next_image<R: SysRegs>(
    cm: &mut ContextManager<'_, R>,
    ep: &EntryPointInfo,
) -> Result<(), Error> {
    let state = ep.attributes.security_state()?;

    cm.setup_context(ep)?;
    cm.prepare_exit_to_state(state)?;

    info!("Entry point {:#x} prepared", ep.pc);

    Ok(())
}

//--------------------------------------------------------------------------------------------------
// Testing
//--------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_status_codes() {
        assert_eq!(
            LoadError::PreLoadHook {
                image_id: ImageId::BL31,
                status: -3
            }
            .status(),
            -3
        );
        assert_eq!(
            LoadError::Image {
                image_id: ImageId::BL33,
                error: Error::NotFound
            }
            .status(),
            -2
        );
        assert_eq!(LoadError::RollbackUpdate(7).status(), 7);
    }

    #[test]
    fn prepositioned_table_needs_matching_crc() {
        let mut table = [0u64; PREPOSITIONED_WORDS];
        table[0] = 0x4800_0000;
        table[1] = 0x1000;

        assert!(unsafe { PrepositionedTable::take(table.as_mut_ptr() as usize) }.is_none());

        let crc = table[..PREPOSITIONED_WORDS - 1]
            .iter()
            .fold(0, |crc, w| crc32::crc32_update(crc, &w.to_ne_bytes()));
        table[PREPOSITIONED_WORDS - 1] = u64::from(crc);

        let t = unsafe { PrepositionedTable::take(table.as_mut_ptr() as usize) }.unwrap();
        assert_eq!(t.slot(0), Some((0x4800_0000, 0x1000)));
        assert_eq!(t.slot(1), None);
        assert_eq!(t.slot(PREPOSITIONED_SLOTS), None);

        // Used up.
        assert_eq!(table[PREPOSITIONED_WORDS - 1], 0);
    }

    #[test]
    fn prepositioned_crc_ignores_the_upper_half_word() {
        let mut table = [0u64; PREPOSITIONED_WORDS];
        table[0] = 0x4800_0000;
        table[1] = 0x20;

        let crc = table[..PREPOSITIONED_WORDS - 1]
            .iter()
            .fold(0, |crc, w| crc32::crc32_update(crc, &w.to_ne_bytes()));
        table[PREPOSITIONED_WORDS - 1] = (0xffff_ffff << 32) | u64::from(crc);

        let t = unsafe { PrepositionedTable::take(table.as_mut_ptr() as usize) };
        assert_eq!(t.and_then(|t| t.slot(0)), Some((0x4800_0000, 0x20)));
    }
}
