//! Geometry, image encoding and control identifier types.

use std::fmt;

use bitflags::bitflags;

/// Axis aligned rectangle in display pixels
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct Rect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl Rect {
    pub const fn new(x: u32, y: u32, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Rectangle of the given size anchored at the origin
    pub const fn sized(width: u32, height: u32) -> Self {
        Self::new(0, 0, width, height)
    }

    /// Same size, moved to the origin
    pub const fn at_origin(&self) -> Self {
        Self::sized(self.width, self.height)
    }

    pub const fn is_square(&self) -> bool {
        self.width == self.height
    }

    pub const fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    /// Check if `other` lies entirely inside this rectangle. Empty rectangles are always inside.
    pub fn contains(&self, other: &Rect) -> bool {
        if other.is_empty() {
            return true;
        }
        other.x >= self.x
            && other.y >= self.y
            && other.x as u64 + other.width as u64 <= self.x as u64 + self.width as u64
            && other.y as u64 + other.height as u64 <= self.y as u64 + self.height as u64
    }
}

impl fmt::Display for Rect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "({},{})-({},{})",
            self.x,
            self.y,
            self.x + self.width,
            self.y + self.height
        )
    }
}

/// A point reported by a touch strip
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct Point {
    pub x: u16,
    pub y: u16,
}

impl Point {
    pub const fn new(x: u16, y: u16) -> Self {
        Self { x, y }
    }
}

impl fmt::Display for Point {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({},{})", self.x, self.y)
    }
}

/// Wire image encoding accepted by a display surface
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageFormat {
    /// Uncompressed 24 bit bitmap
    Bmp,
    /// JPEG at maximum quality
    Jpeg,
}

bitflags! {
    /// Pixel transform applied before encoding, compensating for how a panel is mounted.
    #[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
    pub struct Transform: u8 {
        const FLIP_VERTICAL = 1 << 0;
        const FLIP_HORIZONTAL = 1 << 1;
        /// Quarter turn. Only valid for square surfaces.
        const ROTATE_90 = 1 << 2;
    }
}

/// Geometry and encoding of one kind of display surface
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Surface {
    pub rect: Rect,
    pub format: ImageFormat,
    pub transform: Transform,
}

macro_rules! control_id {
    [$(
        $( #[doc = $doc:expr] )*
        $name:ident => $prefix:literal;
    )+] => {
        $(
            $( #[doc = $doc] )*
            ///
            /// Identifiers are 1-based, in the order the device reports them.
            #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
            pub struct $name(pub u8);

            impl $name {
                /// Zero based position of the control within its group
                pub const fn index(self) -> usize {
                    self.0.saturating_sub(1) as usize
                }

                pub const fn from_index(index: usize) -> Self {
                    Self(index as u8 + 1)
                }
            }

            impl fmt::Display for $name {
                fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                    write!(f, concat!($prefix, "_{}"), self.0)
                }
            }
        )+
    };
}

control_id![
    /// A physical key with a display behind it
    KeyId => "KEY";
    /// A touch sensitive point with a color indicator
    TouchPointId => "TOUCH_POINT";
    /// A rotary encoder with a push switch
    DialId => "DIAL";
];

/// Duration class of a touch strip touch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum TouchType {
    Short = 1,
    Long = 2,
}

impl fmt::Display for TouchType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TouchType::Short => f.write_str("TOUCH_STRIP_TOUCH_TYPE_SHORT"),
            TouchType::Long => f.write_str("TOUCH_STRIP_TOUCH_TYPE_LONG"),
        }
    }
}

/// Any input control of a device
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Control {
    Key(KeyId),
    TouchPoint(TouchPointId),
    Dial(DialId),
    TouchStrip,
}

impl fmt::Display for Control {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Control::Key(id) => fmt::Display::fmt(id, f),
            Control::TouchPoint(id) => fmt::Display::fmt(id, f),
            Control::Dial(id) => fmt::Display::fmt(id, f),
            Control::TouchStrip => f.write_str("TOUCH_STRIP"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_are_one_based() {
        assert_eq!(KeyId(1).index(), 0);
        assert_eq!(KeyId::from_index(5), KeyId(6));
        assert_eq!(DialId(3).to_string(), "DIAL_3");
        assert_eq!(Control::TouchPoint(TouchPointId(2)).to_string(), "TOUCH_POINT_2");
    }

    #[test]
    fn rect_containment() {
        let strip = Rect::sized(800, 100);
        assert!(strip.contains(&Rect::new(200, 0, 200, 100)));
        assert!(strip.contains(&Rect::new(0, 0, 800, 100)));
        assert!(!strip.contains(&Rect::new(700, 0, 200, 100)));
        assert!(!strip.contains(&Rect::new(0, 50, 10, 51)));
        assert_eq!(Rect::new(10, 20, 30, 40).to_string(), "(10,20)-(40,60)");
    }
}
