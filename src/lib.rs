//! Driver for Stream Deck style HID panels: keys with displays, dials, touch
//! points, info bars and touch strips.
//!
//! ```no_run
//! # async fn run() -> streamdeck_hid::Result<()> {
//! use streamdeck_hid::{get_device, HandlerResult, KeyId};
//!
//! let device = get_device("")?;
//! device.open()?;
//! device.set_key_color(KeyId(1), [0xff, 0, 0])?;
//! device.add_key_handler(KeyId(1), |_device, key| async move {
//!     let held = key.wait_for_release().await;
//!     println!("{key} held for {held:?}");
//!     HandlerResult::Ok(())
//! })?;
//! device.listen(None).await
//! # }
//! ```

pub mod codec;
mod config;
mod device;
mod hid;
mod input;
pub mod registry;

pub use config::{Config, DeviceConfig, GeneralConfig};
pub use device::Device;
pub use hid::{enumerate, get_device, HidTransport};
pub use input::{
    handler_error_channel, BoxError, Dial, HandlerError, HandlerResult, Key, TouchPoint,
};
pub use streamdeck_core::{
    DeckError, DialId, ImageFormat, KeyId, Model, ModelInfo, Point, Rect, Result, Surface,
    TouchPointId, TouchType, Transform, Transport,
};
