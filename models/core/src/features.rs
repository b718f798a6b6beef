//! Feature traits for model capabilities.
//!
//! Models opt-in to features by implementing these traits and returning
//! `Some(self)` from the corresponding `as_*()` method in the Model trait.

use crate::model::InputRange;
use crate::{Rect, Result, Surface, TouchPointId, Transport};

/// Secondary display strip above the keys
pub trait HasInfoBar {
    fn info_bar_surface(&self) -> &'static Surface;
    fn send_info_bar_image(&self, transport: &dyn Transport, data: &[u8]) -> Result<()>;
}

/// Touch sensitive points with a color indicator
pub trait HasTouchPoints {
    /// Touch point state bytes, reported right after the keys
    fn touch_points(&self) -> InputRange;
    fn set_touch_point_color(
        &self,
        transport: &dyn Transport,
        touch_point: TouchPointId,
        rgb: [u8; 3],
    ) -> Result<()>;
}

/// Rotary encoders with push switches
pub trait HasDials {
    /// Dial state bytes within the dial input report
    fn dials(&self) -> InputRange;
}

/// Touch sensitive display strip
pub trait HasTouchStrip {
    fn touch_strip_surface(&self) -> &'static Surface;
    /// Send an encoded image covering `rect` of the strip
    fn send_touch_strip_image(
        &self,
        transport: &dyn Transport,
        data: &[u8],
        rect: Rect,
    ) -> Result<()>;
}
