// SPDX-License-Identifier: MIT OR Apache-2.0
//
// Copyright (c) 2018-2023 Andre Richter <andre.o.richter@gmail.com>

//! The `bl2` library.
//!
//! The second stage of a secure boot chain. It runs at EL3, pulls the later boot stages from a
//! boot device into memory and prepares the CPU state they start in.
//!
//! # Overview
//!
//! - [`fat32`] follows cluster chains on a FAT32 volume and resolves paths in it.
//! - [`storage`] puts a uniform open, size, read and close interface in front of the image
//!   sources. [`storage::fat::FatImageDevice`] resolves image identifiers to files through small
//!   redirection files on the boot partition.
//! - [`loader`] walks the platform's list of images, loads each one into its memory region and
//!   returns the entry point of the next stage.
//! - [`context`] owns the per security state CPU context and the transition from EL3 into the
//!   next world.
//!
//! # Code organization and architecture
//!
//! The code is divided into different *modules*, each representing a typical **subsystem** of the
//! loader. Top-level module files of subsystems reside directly in the `src` folder. For example,
//! `src/memory.rs` contains code that is concerned with all things memory management.
//!
//! ## Visibility of processor architecture code
//!
//! Some of the subsystems depend on low-level code that is specific to the target processor
//! architecture. For each supported processor architecture, there exists a subfolder in
//! `src/_arch`, for example, `src/_arch/aarch64`.
//!
//! The architecture folders mirror the subsystem modules laid out in `src`. Bare metal builds
//! pull in `src/_arch/aarch64`. Everything else, most notably the unit tests, uses
//! `src/_arch/host`, and the context code runs against a simulated register bank.
//!
//! ## BSP code
//!
//! `BSP` stands for Board Support Package. `BSP` code is organized under `src/bsp.rs` and
//! contains target board specific definitions and functions, such as the board's memory map and
//! the list of images it boots.

#![cfg_attr(not(test), no_std)]

pub mod bsp;
pub mod common;
pub mod console;
pub mod context;
pub mod cpu;
pub mod crc32;
pub mod error;
pub mod fat32;
pub mod image;
pub mod loader;
pub mod memory;
pub mod print;
pub mod storage;
pub mod synchronization;
pub mod uuid;
