//! Protocol bindings for the Stream Deck Neo.
//!
//! Keys: 8, 96x96 pixels, JPEG.
//! Info bar: 248x58 pixels above the keys.
//! Touch points: 2, left and right of the info bar, each with an RGB indicator.

use streamdeck_core::{
    HasInfoBar, HasTouchPoints, ImageFormat, InputRange, KeyId, Model, ModelInfo, Rect, Result,
    Surface, TouchPointId, Transform, Transport,
};
use streamdeck_v2_protocol as protocol;

pub mod consts {
    /// USB Product ID
    pub const PRODUCT_ID: u16 = 0x009a;
}

/// Static model info for detection
pub static INFO: ModelInfo = ModelInfo {
    id: "neo",
    name: "Stream Deck Neo",
    product_id: consts::PRODUCT_ID,
    keys: InputRange::new(3, 8),
    key_surface: Surface {
        rect: Rect::sized(96, 96),
        format: ImageFormat::Jpeg,
        transform: Transform::FLIP_HORIZONTAL.union(Transform::FLIP_VERTICAL),
    },
    reports: protocol::REPORT_LENGTHS,
};

pub static INFO_BAR: Surface = Surface {
    rect: Rect::sized(248, 58),
    format: ImageFormat::Jpeg,
    transform: Transform::FLIP_HORIZONTAL.union(Transform::FLIP_VERTICAL),
};

/// Touch point state bytes, right after the keys
pub const TOUCH_POINTS: InputRange = InputRange::new(11, 2);

/// Stream Deck Neo
pub struct Neo;

impl Model for Neo {
    fn info(&self) -> &'static ModelInfo {
        &INFO
    }

    fn send_key_image(&self, transport: &dyn Transport, key: KeyId, data: &[u8]) -> Result<()> {
        protocol::send_key_image(transport, key, data)
    }

    fn reset(&self, transport: &dyn Transport) -> Result<()> {
        protocol::reset(transport)
    }

    fn set_brightness(&self, transport: &dyn Transport, percent: u8) -> Result<()> {
        protocol::set_brightness(transport, percent)
    }

    fn firmware_version(&self, transport: &dyn Transport) -> Result<String> {
        protocol::firmware_version(transport)
    }

    fn as_info_bar(&self) -> Option<&dyn HasInfoBar> {
        Some(self)
    }

    fn as_touch_points(&self) -> Option<&dyn HasTouchPoints> {
        Some(self)
    }
}

impl HasInfoBar for Neo {
    fn info_bar_surface(&self) -> &'static Surface {
        &INFO_BAR
    }

    fn send_info_bar_image(&self, transport: &dyn Transport, data: &[u8]) -> Result<()> {
        protocol::send_info_bar_image(transport, data)
    }
}

impl HasTouchPoints for Neo {
    fn touch_points(&self) -> InputRange {
        TOUCH_POINTS
    }

    fn set_touch_point_color(
        &self,
        transport: &dyn Transport,
        touch_point: TouchPointId,
        rgb: [u8; 3],
    ) -> Result<()> {
        // indicators are numbered after the keys
        let index = INFO.keys.count + touch_point.index();
        protocol::set_touch_point_color(transport, index as u8, rgb)
    }
}
