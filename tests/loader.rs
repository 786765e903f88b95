// SPDX-License-Identifier: MIT OR Apache-2.0
//
// Copyright (c) 2023 Andre Richter <andre.o.richter@gmail.com>

//! Image loading tests against host memory.

mod common;

use bl2::{
    bsp::platform::image_uuid,
    context::{
        spsr_64, Capabilities, ContextConfig, ContextManager, ContextState, CpuFeatures,
        RegisterBank, SysReg, DAIF_ALL,
    },
    crc32,
    error::Error,
    image::{
        BlLoadInfo, BlMemParamsDesc, BlParams, EntryPointInfo, EpAttributes, ImageAttributes,
        ImageId, ImageInfo, SecurityState,
    },
    loader::{self, interface::Platform, ImageLoader, LoadError, LoaderConfig, LoaderState},
    storage::{
        fat::{FatImageDevice, DEFAULT_FILE_TABLE},
        interface::IoDevice,
        memmap::MemmapDevice,
        ImageSpec,
    },
};
use common::{pattern, FatImage, Record};

const REGION_SIZE: usize = 4096;

static BUILTIN_MONITOR: [u8; 64] = [0x5a; 64];

/// Host buffers standing in for the load regions.
struct Regions {
    bl31: Vec<u8>,
    bl33: Vec<u8>,
    initrd: Vec<u8>,
    dtb: Vec<u8>,
}

impl Regions {
    fn new() -> Self {
        Self {
            bl31: vec![0xff; REGION_SIZE],
            bl33: vec![0xff; REGION_SIZE],
            initrd: vec![0xff; REGION_SIZE],
            dtb: vec![0xff; REGION_SIZE],
        }
    }

    fn descs(&mut self) -> Vec<BlMemParamsDesc> {
        let base = |v: &mut Vec<u8>| v.as_mut_ptr() as usize;
        let data_ep = EntryPointInfo::new(EpAttributes::NON_SECURE, 0, 0);

        vec![
            BlMemParamsDesc {
                image_id: ImageId::BL31,
                ep_info: EntryPointInfo::new(
                    EpAttributes::EXECUTABLE | EpAttributes::FIRST_EXE,
                    base(&mut self.bl31) as u64,
                    spsr_64(3, true, DAIF_ALL),
                ),
                image_info: ImageInfo::new(
                    ImageAttributes::PLAT_SETUP,
                    base(&mut self.bl31),
                    REGION_SIZE,
                ),
                next_handoff_image_id: ImageId::BL33,
            },
            BlMemParamsDesc {
                image_id: ImageId::BL33,
                ep_info: EntryPointInfo::new(
                    EpAttributes::NON_SECURE | EpAttributes::EXECUTABLE,
                    base(&mut self.bl33) as u64,
                    spsr_64(2, true, DAIF_ALL),
                ),
                image_info: ImageInfo::new(
                    ImageAttributes::empty(),
                    base(&mut self.bl33),
                    REGION_SIZE,
                ),
                next_handoff_image_id: ImageId::BL32_EXTRA2,
            },
            BlMemParamsDesc {
                image_id: ImageId::BL32_EXTRA2,
                ep_info: data_ep,
                image_info: ImageInfo::new(
                    ImageAttributes::empty(),
                    base(&mut self.initrd),
                    REGION_SIZE,
                ),
                next_handoff_image_id: ImageId::NT_FW_CONFIG,
            },
            BlMemParamsDesc {
                image_id: ImageId::NT_FW_CONFIG,
                ep_info: data_ep,
                image_info: ImageInfo::new(
                    ImageAttributes::empty(),
                    base(&mut self.dtb),
                    REGION_SIZE,
                ),
                next_handoff_image_id: ImageId::INVALID,
            },
        ]
    }
}

/// Records every call the loader makes.
struct TestPlatform<'d> {
    load_info: BlLoadInfo,
    params: BlParams,
    dev: &'d mut dyn IoDevice,
    sources: Vec<(ImageId, ImageSpec)>,
    log: Vec<String>,
    reject: Option<ImageId>,
    pre_fail: Option<(ImageId, i32)>,
    rollback_status: i32,
    /// Words written to the given address during platform setup.
    setup_writes: Option<(usize, [u64; 32])>,
}

impl<'d> TestPlatform<'d> {
    fn new(descs: &[BlMemParamsDesc], dev: &'d mut dyn IoDevice) -> Self {
        let load_info = BlLoadInfo::from_descs(descs).unwrap();
        let params = BlParams::from_descs(descs, &load_info).unwrap();

        Self {
            load_info,
            params,
            dev,
            sources: Vec::new(),
            log: Vec::new(),
            reject: None,
            pre_fail: None,
            rollback_status: 0,
            setup_writes: None,
        }
    }

    fn size_of(&self, id: ImageId) -> usize {
        self.load_info.node(id).unwrap().image_info.image_size
    }

    fn count(&self, what: &str) -> usize {
        self.log.iter().filter(|l| *l == what).count()
    }
}

impl Platform for TestPlatform<'_> {
    fn bl_image_load_info(&mut self) -> &mut BlLoadInfo {
        &mut self.load_info
    }

    fn next_bl_params(&mut self) -> &mut BlParams {
        for node in self.params.nodes.iter_mut() {
            if let Some(loaded) = self.load_info.node(node.image_id) {
                node.image_info = loaded.image_info;
            }
        }

        &mut self.params
    }

    fn flush_next_bl_params(&mut self) {
        self.log.push("flush".into());
    }

    fn image_source(
        &mut self,
        image_id: ImageId,
    ) -> Result<(&mut dyn IoDevice, ImageSpec), Error> {
        let spec = self
            .sources
            .iter()
            .find(|(id, _)| *id == image_id)
            .map(|(_, spec)| *spec)
            .ok_or(Error::NotFound)?;

        Ok((&mut *self.dev, spec))
    }

    fn authenticate(&mut self, image_id: ImageId, image: &[u8]) -> Result<(), Error> {
        self.log.push(format!("auth {} {}", image_id, image.len()));

        if self.reject == Some(image_id) {
            return Err(Error::InvalidSignature);
        }
        Ok(())
    }

    fn platform_setup(&mut self) {
        self.log.push("setup".into());

        if let Some((addr, words)) = self.setup_writes.take() {
            unsafe { std::slice::from_raw_parts_mut(addr as *mut u64, words.len()) }
                .copy_from_slice(&words);
        }
    }

    fn pre_image_load(&mut self, image_id: ImageId) -> i32 {
        self.log.push(format!("pre {}", image_id));

        match self.pre_fail {
            Some((id, status)) if id == image_id => status,
            _ => 0,
        }
    }

    fn post_image_load(&mut self, image_id: ImageId) -> i32 {
        self.log.push(format!("post {}", image_id));
        0
    }

    fn update_rollback_version(&mut self) -> i32 {
        self.rollback_status
    }

    fn error_handler(&mut self, status: i32) -> ! {
        panic!("error handler called with {}", status)
    }
}

/// A flash window with the monitor, the payload and a device tree back to back.
fn flash(monitor: &[u8], payload: &[u8]) -> (Vec<u8>, Vec<(ImageId, ImageSpec)>) {
    let dtb = pattern(64, 0xd7);
    let mut window = monitor.to_vec();
    window.extend_from_slice(payload);
    window.extend_from_slice(&dtb);

    let sources = vec![
        (
            ImageId::BL31,
            ImageSpec::Block {
                offset: 0,
                length: monitor.len(),
            },
        ),
        (
            ImageId::BL33,
            ImageSpec::Block {
                offset: monitor.len() as u64,
                length: payload.len(),
            },
        ),
        (
            ImageId::NT_FW_CONFIG,
            ImageSpec::Block {
                offset: (monitor.len() + payload.len()) as u64,
                length: dtb.len(),
            },
        ),
    ];

    (window, sources)
}

#[test]
fn loads_images_from_fat_partition() {
    let monitor = pattern(700, 1);
    let uboot = pattern(1500, 2);
    let dtb = pattern(300, 3);

    let mut img = FatImage::new(64, 1);
    let monitor_cluster = img.add_file(&monitor);
    let uboot_cluster = img.add_file(&uboot);
    let dtb_cluster = img.add_file(&dtb);
    let bl31_redirect = b"/boot/bl31.bin\n";
    let dtb_redirect = b"/boot/dtbs/board.dtb\n";
    let bl31_cfg = img.add_file(bl31_redirect);
    let dtb_cfg = img.add_file(dtb_redirect);
    let dtbs = img.add_dir(&[Record::File {
        name: "board.dtb",
        cluster: dtb_cluster,
        size: dtb.len() as u32,
    }]);
    let bootcfg = img.add_dir(&[
        Record::File {
            name: "bl31",
            cluster: bl31_cfg,
            size: bl31_redirect.len() as u32,
        },
        Record::File {
            name: "atfdtb",
            cluster: dtb_cfg,
            size: dtb_redirect.len() as u32,
        },
    ]);
    img.set_root(&[
        Record::Dir {
            name: "bootcfg",
            cluster: bootcfg,
        },
        Record::Dir {
            name: "dtbs",
            cluster: dtbs,
        },
        Record::File {
            name: "bl31.bin",
            cluster: monitor_cluster,
            size: monitor.len() as u32,
        },
        Record::File {
            name: "u-boot.bin",
            cluster: uboot_cluster,
            size: uboot.len() as u32,
        },
    ]);

    let mut cache = [0_u32; 128];
    let mut dev = FatImageDevice::mount(img.bytes(), &mut cache, &DEFAULT_FILE_TABLE).unwrap();

    let mut regions = Regions::new();
    let descs = regions.descs();
    let mut plat = TestPlatform::new(&descs, &mut dev);
    for d in descs.iter() {
        let uuid = image_uuid(d.image_id).unwrap();
        plat.sources.push((d.image_id, ImageSpec::Uuid(uuid)));
    }

    let mut ldr = ImageLoader::new(&mut plat, LoaderConfig::new());
    let ep = unsafe { ldr.load_images() }.unwrap();
    assert_eq!(ldr.state(), LoaderState::Done);

    assert_eq!(ep.pc, descs[0].ep_info.pc);
    assert_eq!(ep.args[0], &plat.params as *const BlParams as u64);

    // The initrd is optional and absent.
    assert_eq!(plat.size_of(ImageId::BL31), monitor.len());
    assert_eq!(plat.size_of(ImageId::BL33), uboot.len());
    assert_eq!(plat.size_of(ImageId::BL32_EXTRA2), 0);
    assert_eq!(plat.size_of(ImageId::NT_FW_CONFIG), dtb.len());

    let sizes: Vec<usize> = plat
        .params
        .nodes
        .iter()
        .map(|n| n.image_info.image_size)
        .collect();
    assert_eq!(sizes, [monitor.len(), uboot.len(), 0, dtb.len()]);

    assert_eq!(plat.count("setup"), 1);
    assert_eq!(plat.count("flush"), 1);
    assert_eq!(plat.count("pre 22"), 1);
    assert_eq!(plat.count("post 22"), 1);

    assert_eq!(&regions.bl31[..monitor.len()], monitor.as_slice());
    assert_eq!(&regions.bl33[..uboot.len()], uboot.as_slice());
    assert_eq!(&regions.dtb[..dtb.len()], dtb.as_slice());
    assert!(regions.initrd.iter().all(|b| *b == 0xff));
}

#[test]
fn missing_monitor_uses_builtin_copy() {
    let uboot = pattern(256, 9);
    let (window, mut sources) = flash(&[], &uboot);
    sources.retain(|(id, _)| *id != ImageId::BL31);

    let mut dev = MemmapDevice::new(&window);
    let mut regions = Regions::new();
    let descs = regions.descs();
    let mut plat = TestPlatform::new(&descs, &mut dev);
    plat.sources = sources;

    let config = LoaderConfig {
        fallback_monitor_image: Some(&BUILTIN_MONITOR),
        ..LoaderConfig::new()
    };
    unsafe { ImageLoader::new(&mut plat, config).load_images() }.unwrap();

    assert_eq!(plat.size_of(ImageId::BL31), BUILTIN_MONITOR.len());
    assert_eq!(plat.size_of(ImageId::BL33), uboot.len());
    assert_eq!(&regions.bl31[..BUILTIN_MONITOR.len()], &BUILTIN_MONITOR[..]);
}

#[test]
fn missing_monitor_without_builtin_copy_fails() {
    let (window, mut sources) = flash(&[], &pattern(256, 9));
    sources.retain(|(id, _)| *id != ImageId::BL31);

    let mut dev = MemmapDevice::new(&window);
    let mut regions = Regions::new();
    let descs = regions.descs();
    let mut plat = TestPlatform::new(&descs, &mut dev);
    plat.sources = sources;

    let mut ldr = ImageLoader::new(&mut plat, LoaderConfig::new());
    let err = unsafe { ldr.load_images() }.unwrap_err();

    assert_eq!(
        err,
        LoadError::Image {
            image_id: ImageId::BL31,
            error: Error::NotFound
        }
    );
    assert_eq!(err.status(), -2);
    assert_eq!(ldr.state(), LoaderState::PerImage { index: 0 });
}

#[test]
fn oversized_image_is_rejected() {
    let (window, sources) = flash(&pattern(100, 1), &pattern(REGION_SIZE + 1, 2));

    let mut dev = MemmapDevice::new(&window);
    let mut regions = Regions::new();
    let descs = regions.descs();
    let mut plat = TestPlatform::new(&descs, &mut dev);
    plat.sources = sources;

    let mut ldr = ImageLoader::new(&mut plat, LoaderConfig::new());
    let err = unsafe { ldr.load_images() }.unwrap_err();

    assert_eq!(
        err,
        LoadError::Image {
            image_id: ImageId::BL33,
            error: Error::SizeExceeded
        }
    );
    assert_eq!(ldr.state(), LoaderState::PerImage { index: 1 });
    assert!(regions.bl33.iter().all(|b| *b == 0xff));
}

#[test]
fn failed_authentication_wipes_the_image() {
    let uboot = pattern(512, 4);
    let (window, sources) = flash(&pattern(100, 1), &uboot);

    let mut dev = MemmapDevice::new(&window);
    let mut regions = Regions::new();
    let descs = regions.descs();
    let mut plat = TestPlatform::new(&descs, &mut dev);
    plat.sources = sources;
    plat.reject = Some(ImageId::BL33);

    let err = unsafe { ImageLoader::new(&mut plat, LoaderConfig::new()).load_images() }
        .unwrap_err();

    assert_eq!(
        err,
        LoadError::Image {
            image_id: ImageId::BL33,
            error: Error::InvalidSignature
        }
    );
    assert_eq!(plat.count("auth 5 512"), 1);
    assert_eq!(plat.size_of(ImageId::BL33), 0);
    assert!(regions.bl33[..uboot.len()].iter().all(|b| *b == 0));
    assert_eq!(regions.bl33[uboot.len()], 0xff);
}

#[test]
fn hook_failure_stops_loading() {
    let (window, sources) = flash(&pattern(100, 1), &pattern(200, 2));

    let mut dev = MemmapDevice::new(&window);
    let mut regions = Regions::new();
    let descs = regions.descs();
    let mut plat = TestPlatform::new(&descs, &mut dev);
    plat.sources = sources;
    plat.pre_fail = Some((ImageId::BL33, -5));

    let err = unsafe { ImageLoader::new(&mut plat, LoaderConfig::new()).load_images() }
        .unwrap_err();

    assert_eq!(
        err,
        LoadError::PreLoadHook {
            image_id: ImageId::BL33,
            status: -5
        }
    );
    assert_eq!(plat.size_of(ImageId::BL31), 100);
    assert_eq!(plat.count("post 5"), 0);
    assert_eq!(plat.count("pre 27"), 0);
    assert_eq!(plat.count("flush"), 0);
}

#[test]
fn skipped_images_only_run_hooks() {
    let (window, mut sources) = flash(&pattern(100, 1), &[]);
    sources.retain(|(id, _)| *id != ImageId::BL33);

    let mut dev = MemmapDevice::new(&window);
    let mut regions = Regions::new();
    let mut descs = regions.descs();
    descs[1].image_info.attributes = ImageAttributes::SKIP_LOADING;

    let mut plat = TestPlatform::new(&descs, &mut dev);
    plat.sources = sources;

    unsafe { ImageLoader::new(&mut plat, LoaderConfig::new()).load_images() }.unwrap();

    assert_eq!(plat.count("pre 5"), 1);
    assert_eq!(plat.count("post 5"), 1);
    assert_eq!(plat.size_of(ImageId::BL33), 0);
    assert!(regions.bl33.iter().all(|b| *b == 0xff));
}

#[test]
fn platform_setup_runs_once() {
    let (window, sources) = flash(&pattern(100, 1), &pattern(100, 2));

    let mut dev = MemmapDevice::new(&window);
    let mut regions = Regions::new();
    let mut descs = regions.descs();
    descs[1].image_info.attributes = ImageAttributes::PLAT_SETUP;

    let mut plat = TestPlatform::new(&descs, &mut dev);
    plat.sources = sources;

    unsafe { ImageLoader::new(&mut plat, LoaderConfig::new()).load_images() }.unwrap();

    assert_eq!(plat.count("setup"), 1);
    assert_eq!(plat.log[0], "setup");
}

#[test]
fn rollback_failure_is_reported() {
    let (window, sources) = flash(&pattern(100, 1), &pattern(100, 2));

    let mut dev = MemmapDevice::new(&window);
    let mut regions = Regions::new();
    let descs = regions.descs();
    let mut plat = TestPlatform::new(&descs, &mut dev);
    plat.sources = sources;
    plat.rollback_status = -1;

    let mut ldr = ImageLoader::new(&mut plat, LoaderConfig::new());
    let err = unsafe { ldr.load_images() }.unwrap_err();

    assert_eq!(err, LoadError::RollbackUpdate(-1));
    assert_eq!(ldr.state(), LoaderState::Finalizing);
}

/// Seal a pre-positioned image table with the CRC of its first 31 words.
fn seal(table: &mut [u64; 32]) {
    let bytes: Vec<u8> = table[..31].iter().flat_map(|w| w.to_ne_bytes()).collect();
    table[31] = u64::from(crc32::crc32(&bytes));
}

#[test]
fn prepositioned_images_bypass_the_device() {
    let monitor = pattern(300, 5);
    let uboot = pattern(400, 6);
    let dtb = pattern(50, 7);

    // Slots count loaded images. The initrd in slot 2 was not pre-positioned.
    let mut table = [0_u64; 32];
    table[0] = monitor.as_ptr() as u64;
    table[1] = monitor.len() as u64;
    table[2] = uboot.as_ptr() as u64;
    table[3] = uboot.len() as u64;
    table[6] = dtb.as_ptr() as u64;
    table[7] = dtb.len() as u64;
    seal(&mut table);

    // Nothing to read from the device, so every image has to come from the table.
    let mut dev = MemmapDevice::new(&[]);
    let mut regions = Regions::new();
    let descs = regions.descs();
    let mut plat = TestPlatform::new(&descs, &mut dev);

    let config = LoaderConfig {
        prepositioned_table: Some(table.as_mut_ptr() as usize),
        ..LoaderConfig::new()
    };
    unsafe { ImageLoader::new(&mut plat, config).load_images() }.unwrap();

    assert_eq!(plat.size_of(ImageId::BL31), monitor.len());
    assert_eq!(plat.size_of(ImageId::BL33), uboot.len());
    assert_eq!(&regions.bl31[..monitor.len()], monitor.as_slice());
    assert_eq!(&regions.bl33[..uboot.len()], uboot.as_slice());
    assert_eq!(&regions.dtb[..dtb.len()], dtb.as_slice());
    assert_eq!(plat.size_of(ImageId::BL32_EXTRA2), 0);
    assert_eq!(plat.count("auth 3 300"), 0);

    // The table is only good for one boot.
    assert_eq!(table[31], 0);
}

#[test]
fn prepositioned_table_is_read_after_platform_setup() {
    let monitor = pattern(300, 5);
    let uboot = pattern(400, 6);
    let dtb = pattern(50, 7);

    let mut words = [0_u64; 32];
    words[0] = monitor.as_ptr() as u64;
    words[1] = monitor.len() as u64;
    words[2] = uboot.as_ptr() as u64;
    words[3] = uboot.len() as u64;
    words[6] = dtb.as_ptr() as u64;
    words[7] = dtb.len() as u64;
    seal(&mut words);

    // Garbage until platform setup brings the memory up.
    let mut table = [u64::MAX; 32];

    let mut dev = MemmapDevice::new(&[]);
    let mut regions = Regions::new();
    let descs = regions.descs();
    let mut plat = TestPlatform::new(&descs, &mut dev);
    plat.setup_writes = Some((table.as_mut_ptr() as usize, words));

    let config = LoaderConfig {
        prepositioned_table: Some(table.as_mut_ptr() as usize),
        ..LoaderConfig::new()
    };
    unsafe { ImageLoader::new(&mut plat, config).load_images() }.unwrap();

    assert_eq!(plat.log[0], "setup");
    assert_eq!(plat.size_of(ImageId::BL31), monitor.len());
    assert_eq!(&regions.bl31[..monitor.len()], monitor.as_slice());
    assert_eq!(&regions.bl33[..uboot.len()], uboot.as_slice());
    assert_eq!(table[0], words[0]);
    assert_eq!(table[31], 0);
}

#[test]
fn corrupt_prepositioned_table_is_ignored() {
    let monitor = pattern(300, 5);

    let mut table = [0_u64; 32];
    table[0] = monitor.as_ptr() as u64;
    table[1] = monitor.len() as u64;
    table[31] = 0xdead_beef;

    let mut dev = MemmapDevice::new(&[]);
    let mut regions = Regions::new();
    let descs = regions.descs();
    let mut plat = TestPlatform::new(&descs, &mut dev);

    let config = LoaderConfig {
        prepositioned_table: Some(table.as_mut_ptr() as usize),
        ..LoaderConfig::new()
    };
    let err = unsafe { ImageLoader::new(&mut plat, config).load_images() }.unwrap_err();

    assert_eq!(
        err,
        LoadError::Image {
            image_id: ImageId::BL31,
            error: Error::NotFound
        }
    );
    assert_eq!(table[31], 0xdead_beef);
}

#[test]
fn loaded_payload_is_prepared_for_entry() {
    let (window, sources) = flash(&pattern(100, 1), &pattern(100, 2));

    let mut dev = MemmapDevice::new(&window);
    let mut regions = Regions::new();
    let descs = regions.descs();
    let mut plat = TestPlatform::new(&descs, &mut dev);
    plat.sources = sources;

    let ep = unsafe { loader::bl2_load_images(&mut plat, LoaderConfig::new()) };
    assert_eq!(ep.attributes.security_state(), Ok(SecurityState::Secure));

    let bl33 = plat.params.nodes[1].ep_info;
    let mut cm = ContextManager::with_capabilities(
        RegisterBank::new(),
        Capabilities::new(CpuFeatures::EL2, 0),
        ContextConfig::new(),
    );

    loader::prepare_next_image(&mut cm, &bl33).unwrap();

    let ns = SecurityState::NonSecure;
    assert_eq!(cm.next_eret_context(), Some(ns));
    assert_eq!(cm.state(ns), ContextState::Live);
    assert_eq!(cm.context(ns).elr_el3(), bl33.pc);
    assert_eq!(cm.context(ns).spsr_el3(), bl33.spsr);
    assert_eq!(cm.scr_el3(ns).unwrap() & 1, 1);
    assert_ne!(cm.regs().get(SysReg::SCTLR_EL2), 0);
}
