//! Image scaling, transforms and wire encoding for display surfaces.

use std::io::{BufRead, Seek};
use std::path::Path;

use image::codecs::bmp::BmpEncoder;
use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::{
    imageops, ExtendedColorType, GenericImageView, ImageEncoder, ImageReader, Rgb, RgbImage,
    Rgba, RgbaImage,
};
use streamdeck_core::{DeckError, ImageFormat, Rect, Result, Surface, Transform};

/// Largest sub-rectangle of `dst` with the aspect ratio of `src`, centered on the
/// narrower axis.
pub fn letterbox(src: Rect, dst: Rect) -> Rect {
    let src_ratio = f64::from(src.width) / f64::from(src.height);
    let dst_ratio = f64::from(dst.width) / f64::from(dst.height);

    if src_ratio > dst_ratio {
        let height = (f64::from(dst.width) / src_ratio) as u32;
        let y = dst.y + (dst.height - height) / 2;
        Rect::new(dst.x, y, dst.width, height)
    } else {
        let width = (f64::from(dst.height) * src_ratio) as u32;
        let x = dst.x + (dst.width - width) / 2;
        Rect::new(x, dst.y, width, dst.height)
    }
}

/// Scale, transform and encode `source` for a display area of `target`'s size.
pub fn encode<I>(
    source: &I,
    target: Rect,
    format: ImageFormat,
    transform: Transform,
) -> Result<Vec<u8>>
where
    I: GenericImageView<Pixel = Rgba<u8>>,
{
    let (width, height) = source.dimensions();
    if width == 0 || height == 0 {
        return Err(DeckError::ImageInvalid("empty source image"));
    }
    if target.is_empty() {
        return Err(DeckError::ImageInvalid("empty target rectangle"));
    }
    if transform.contains(Transform::ROTATE_90) && !target.is_square() {
        return Err(DeckError::ImageInvalid("cannot rotate non-square canvas"));
    }

    let (w, h) = (target.width, target.height);
    let scaled = if (width, height) == (w, h) {
        RgbaImage::from_fn(w, h, |x, y| source.get_pixel(x, y))
    } else {
        let mut canvas = RgbaImage::new(w, h);
        let fit = letterbox(Rect::sized(width, height), target.at_origin());
        if !fit.is_empty() {
            let resized = imageops::resize(source, fit.width, fit.height, FilterType::Triangle);
            imageops::replace(&mut canvas, &resized, i64::from(fit.x), i64::from(fit.y));
        }
        canvas
    };

    let mut out = RgbImage::new(w, h);
    for (x, y, pixel) in scaled.enumerate_pixels() {
        let (mut xd, mut yd) = (x, y);
        if transform.contains(Transform::FLIP_HORIZONTAL) {
            xd = w - 1 - xd;
        }
        if transform.contains(Transform::FLIP_VERTICAL) {
            yd = h - 1 - yd;
        }
        if transform.contains(Transform::ROTATE_90) {
            (xd, yd) = (yd, w - 1 - xd);
        }

        // Mix alpha values against black
        let [r, g, b, a] = pixel.0;
        let a = f64::from(a) / 255.0;
        out.put_pixel(xd, yd, Rgb([r, g, b].map(|c| (f64::from(c) * a) as u8)));
    }

    let mut buf = Vec::new();
    match format {
        ImageFormat::Bmp => {
            BmpEncoder::new(&mut buf).write_image(out.as_raw(), w, h, ExtendedColorType::Rgb8)?
        },
        ImageFormat::Jpeg => JpegEncoder::new_with_quality(&mut buf, 100).write_image(
            out.as_raw(),
            w,
            h,
            ExtendedColorType::Rgb8,
        )?,
    }
    Ok(buf)
}

/// Encode `source` for a whole surface
pub fn encode_for<I>(source: &I, surface: &Surface) -> Result<Vec<u8>>
where
    I: GenericImageView<Pixel = Rgba<u8>>,
{
    encode(source, surface.rect, surface.format, surface.transform)
}

/// Uniform opaque image covering `rect`
pub fn solid(rect: Rect, rgb: [u8; 3]) -> RgbaImage {
    let [r, g, b] = rgb;
    RgbaImage::from_pixel(rect.width, rect.height, Rgba([r, g, b, 0xff]))
}

/// Decode an image in any format the `image` crate recognizes
pub fn decode<R: BufRead + Seek>(reader: R) -> Result<RgbaImage> {
    let image = ImageReader::new(reader).with_guessed_format()?.decode()?;
    Ok(image.to_rgba8())
}

pub fn open<P: AsRef<Path>>(path: P) -> Result<RgbaImage> {
    Ok(image::open(path)?.to_rgba8())
}
