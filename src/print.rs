// SPDX-License-Identifier: MIT OR Apache-2.0
//
// Copyright (c) 2018-2023 Andre Richter <andre.o.richter@gmail.com>

//! Printing.
//!
//! There is no timer running this early in the boot chain, so messages carry a level tag instead
//! of a timestamp.

use crate::console;
use core::fmt;

//--------------------------------------------------------------------------------------------------
// Public Code
//--------------------------------------------------------------------------------------------------

#[doc(hidden)]
pub fn _print(args: fmt::Arguments) {
    // A console that fails to format has nowhere to report it.
    let _ = console::console().write_fmt(args);
}

/// Prints without a newline.
///
/// Carbon copy from <https://doc.rust-lang.org/src/std/macros.rs.html>
#[macro_export]
macro_rules! print {
    ($($arg:tt)*) => ($crate::print::_print(format_args!($($arg)*)));
}

/// Prints with a newline.
#[macro_export]
macro_rules! println {
    () => ($crate::print!("\n"));
    ($string:expr) => ({
        $crate::print::_print(format_args!(concat!($string, "\n")));
    });
    ($format_string:expr, $($arg:tt)*) => ({
        $crate::print::_print(format_args!(concat!($format_string, "\n"), $($arg)*));
    })
}

/// Prints an info, with a newline.
#[macro_export]
macro_rules! info {
    ($string:expr) => ({
        $crate::print::_print(format_args!(concat!("[I] ", $string, "\n")));
    });
    ($format_string:expr, $($arg:tt)*) => ({
        $crate::print::_print(format_args!(
            concat!("[I] ", $format_string, "\n"),
            $($arg)*
        ));
    })
}

/// Prints a warning, with a newline.
#[macro_export]
macro_rules! warn {
    ($string:expr) => ({
        $crate::print::_print(format_args!(concat!("[W] ", $string, "\n")));
    });
    ($format_string:expr, $($arg:tt)*) => ({
        $crate::print::_print(format_args!(
            concat!("[W] ", $format_string, "\n"),
            $($arg)*
        ));
    })
}

/// Prints an error, with a newline.
#[macro_export]
macro_rules! error {
    ($string:expr) => ({
        $crate::print::_print(format_args!(concat!("[E] ", $string, "\n")));
    });
    ($format_string:expr, $($arg:tt)*) => ({
        $crate::print::_print(format_args!(
            concat!("[E] ", $format_string, "\n"),
            $($arg)*
        ));
    })
}

/// Debug print, with a newline.
#[macro_export]
macro_rules! debug {
    ($string:expr) => ({
        if cfg!(feature = "debug_prints") {
            $crate::print::_print(format_args!(concat!("<D> ", $string, "\n")));
        }
    });
    ($format_string:expr, $($arg:tt)*) => ({
        if cfg!(feature = "debug_prints") {
            $crate::print::_print(format_args!(
                concat!("<D> ", $format_string, "\n"),
                $($arg)*
            ));
        }
    })
}

/// Verbose print, with a newline.
#[macro_export]
macro_rules! verbose {
    ($string:expr) => ({
        if cfg!(feature = "verbose_prints") {
            $crate::print::_print(format_args!(concat!("<V> ", $string, "\n")));
        }
    });
    ($format_string:expr, $($arg:tt)*) => ({
        if cfg!(feature = "verbose_prints") {
            $crate::print::_print(format_args!(
                concat!("<V> ", $format_string, "\n"),
                $($arg)*
            ));
        }
    })
}
