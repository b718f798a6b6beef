//! Shared HID protocol implementation for second generation Stream Deck models.
//!
//! This crate provides the common protocol primitives used by:
//! - Stream Deck MK.2
//! - Stream Deck +
//! - Stream Deck Neo
//!
//! ## Protocol Overview
//!
//! Images are JPEG encoded and sent on output report 2 in 1023 byte pages with a 7 byte
//! header. Commands are 31 byte feature reports on report 3, the firmware version is read
//! from feature report 5.

pub mod abi;

pub use abi::*;

use streamdeck_core::ReportLengths;

/// Report lengths of every v2 interface, excluding the report id
pub const REPORT_LENGTHS: ReportLengths = ReportLengths {
    feature: 31,
    input: 511,
    output: 1023,
};
