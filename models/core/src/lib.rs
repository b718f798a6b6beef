//! Core traits and types for the streamdeck-hid model abstraction.
//!
//! This crate provides:
//! - The `Model` trait with `as_*()` methods for capability discovery
//! - Capability traits (`HasInfoBar`, `HasTouchPoints`, `HasDials`, `HasTouchStrip`)
//! - The `Transport` trait models are driven through
//! - The page framer shared by every image upload
//! - Common types like `ModelInfo`, `Rect`, `KeyId`, `DeckError`

mod error;
mod features;
pub mod framer;
mod model;
mod transport;
mod types;

#[cfg(any(test, feature = "mock"))]
pub mod mock;

pub use error::{DeckError, Result};
pub use features::{HasDials, HasInfoBar, HasTouchPoints, HasTouchStrip};
pub use framer::{send_pages, Page, IMAGE_REPORT_ID};
pub use model::{parse_version, InputRange, Model, ModelInfo, ELGATO_VENDOR_ID};
pub use transport::{ReportLengths, Transport};
pub use types::{
    Control, DialId, ImageFormat, KeyId, Point, Rect, Surface, TouchPointId, TouchType,
    Transform,
};
