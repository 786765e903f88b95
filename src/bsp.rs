// SPDX-License-Identifier: MIT OR Apache-2.0
//
// Copyright (c) 2023 Andre Richter <andre.o.richter@gmail.com>

//! Conditional reexporting of Board Support Packages.

#[cfg(feature = "bsp_mt7622")]
mod mt7622;

#[cfg(feature = "bsp_mt7622")]
pub use mt7622::*;
