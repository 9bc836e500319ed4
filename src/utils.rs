//! Conversions between `image` buffers and the plain maps the engine works on.
//!
//! Alpha is never matched or copied. A pixel's alpha decides whether it can
//! serve as a corpus pixel, and it is kept as is when colors are written back.

use image::{ImageBuffer, Pixel};

use crate::errors::SizeMismatch;
use crate::{Dims, Error, Mask, PixelMap};

#[inline]
fn color_channels<P: Pixel>() -> usize {
    if P::COLOR_TYPE.has_alpha() {
        P::CHANNEL_COUNT as usize - 1
    } else {
        P::CHANNEL_COUNT as usize
    }
}

#[inline]
fn alpha<P: Pixel<Subpixel = u8>>(pixel: &P) -> u8 {
    if P::COLOR_TYPE.has_alpha() {
        pixel.channels()[P::CHANNEL_COUNT as usize - 1]
    } else {
        255
    }
}

fn check_selection(dims: Dims, selection: &Mask) -> Result<(), Error> {
    if selection.dims() != dims {
        return Err(Error::SizeMismatch(SizeMismatch {
            name: "selection",
            expected: (dims.width, dims.height),
            actual: (selection.dims().width, selection.dims().height),
        }));
    }

    Ok(())
}

/// Copies the color channels of `img` into a new map, dropping alpha if the
/// pixel type has any.
pub fn color_map<P>(img: &ImageBuffer<P, Vec<u8>>) -> PixelMap
where
    P: Pixel<Subpixel = u8> + 'static,
{
    let channels = color_channels::<P>();
    PixelMap::from_fn(img.width(), img.height(), channels, |x, y, px| {
        px.copy_from_slice(&img.get_pixel(x, y).channels()[..channels]);
    })
}

/// The corpus pixels of `img` that may be copied: those inside `selection`
/// (every pixel if `None`) which aren't fully transparent.
pub fn corpus_mask<P>(
    img: &ImageBuffer<P, Vec<u8>>,
    selection: Option<&Mask>,
) -> Result<Mask, Error>
where
    P: Pixel<Subpixel = u8> + 'static,
{
    let dims = Dims::new(img.width(), img.height());
    if let Some(selection) = selection {
        check_selection(dims, selection)?;
    }

    Ok(Mask::from_fn(dims.width, dims.height, |x, y| {
        if alpha(img.get_pixel(x, y)) == 0 {
            return 0;
        }

        selection.map_or(Mask::SELECTED, |s| s.weight(x, y))
    }))
}

/// The target pixels of `img` to synthesize: those inside `selection`, or
/// every pixel if `None`. Transparent pixels are synthesized like any other.
pub fn target_mask<P>(
    img: &ImageBuffer<P, Vec<u8>>,
    selection: Option<&Mask>,
) -> Result<Mask, Error>
where
    P: Pixel<Subpixel = u8> + 'static,
{
    let dims = Dims::new(img.width(), img.height());
    match selection {
        Some(selection) => {
            check_selection(dims, selection)?;
            Ok(selection.clone())
        }
        None => Ok(Mask::all(dims.width, dims.height)),
    }
}

/// Writes the colors of `map` back into `img`, keeping the alpha of every
/// pixel untouched.
pub fn write_colors<P>(img: &mut ImageBuffer<P, Vec<u8>>, map: &PixelMap) -> Result<(), Error>
where
    P: Pixel<Subpixel = u8> + 'static,
{
    let dims = Dims::new(img.width(), img.height());
    if map.dims() != dims {
        return Err(Error::SizeMismatch(SizeMismatch {
            name: "synthesized map",
            expected: (dims.width, dims.height),
            actual: (map.width(), map.height()),
        }));
    }

    let channels = color_channels::<P>();
    if map.channels() != channels {
        return Err(Error::ChannelMismatch(channels as u32, map.channels() as u32));
    }

    for (x, y, pixel) in img.enumerate_pixels_mut() {
        pixel.channels_mut()[..channels].copy_from_slice(map.get(x, y));
    }

    Ok(())
}

#[cfg(test)]
mod test {
    use super::*;
    use image::{GrayImage, Luma, Rgba, RgbaImage};

    fn rgba() -> RgbaImage {
        RgbaImage::from_fn(3, 2, |x, y| {
            Rgba([x as u8 * 10, y as u8 * 10, 7, if x == 0 { 0 } else { 200 }])
        })
    }

    #[test]
    fn drops_alpha() {
        let map = color_map(&rgba());
        assert_eq!(map.channels(), 3);
        assert_eq!(map.get(2, 1), &[20, 10, 7]);

        let gray = color_map(&GrayImage::from_pixel(2, 2, Luma([9])));
        assert_eq!(gray.channels(), 1);
        assert_eq!(gray.get(1, 1), &[9]);
    }

    #[test]
    fn transparent_pixels_are_not_corpus() {
        let img = rgba();
        let mask = corpus_mask(&img, None).unwrap();
        assert_eq!(mask.count_in(), 4);
        assert!(!mask.is_in(0, 1));

        let selection = Mask::from_fn(3, 2, |x, _| if x == 2 { 255 } else { 0 });
        let mask = corpus_mask(&img, Some(&selection)).unwrap();
        assert_eq!(mask.count_in(), 2);
        assert!(mask.is_in(2, 0));

        // Target selection ignores alpha
        let mask = target_mask(&img, Some(&Mask::all(3, 2))).unwrap();
        assert!(mask.is_in(0, 0));

        assert!(matches!(
            corpus_mask(&img, Some(&Mask::all(2, 2))),
            Err(Error::SizeMismatch(_))
        ));
    }

    #[test]
    fn keeps_alpha_on_write() {
        let mut img = rgba();
        let map = PixelMap::from_fn(3, 2, 3, |_, _, px| px.copy_from_slice(&[1, 2, 3]));
        write_colors(&mut img, &map).unwrap();

        assert_eq!(img.get_pixel(0, 0), &Rgba([1, 2, 3, 0]));
        assert_eq!(img.get_pixel(1, 1), &Rgba([1, 2, 3, 200]));

        let gray = PixelMap::new(3, 2, 1);
        assert!(matches!(
            write_colors(&mut img, &gray),
            Err(Error::ChannelMismatch(3, 1))
        ));
    }
}
