//! Dense pixel buffers, their selection masks and edge handling.

use crate::Dims;

#[inline]
fn modulo(a: i32, b: i32) -> i32 {
    let result = a % b;
    if result < 0 {
        result + b
    } else {
        result
    }
}

/// How a coordinate that falls outside an image is brought back inside it,
/// chosen independently for each axis.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EdgeMode {
    /// Clamp to the nearest edge pixel.
    Clip,
    /// Wrap around to the opposite edge, as if the image were periodic.
    Wrap,
}

impl EdgeMode {
    #[inline]
    fn resolve(self, v: i32, len: u32) -> u32 {
        let len = len as i32;
        match self {
            Self::Wrap => modulo(v, len) as u32,
            Self::Clip => v.max(0).min(len - 1) as u32,
        }
    }
}

/// Edge policy for both axes of an image.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Edges {
    pub horizontal: EdgeMode,
    pub vertical: EdgeMode,
}

impl Default for Edges {
    fn default() -> Self {
        Self::tiling(false, false)
    }
}

impl Edges {
    /// Wraps the axes that tile and clips the others.
    pub fn tiling(horizontal: bool, vertical: bool) -> Self {
        let mode = |tile| if tile { EdgeMode::Wrap } else { EdgeMode::Clip };
        Self {
            horizontal: mode(horizontal),
            vertical: mode(vertical),
        }
    }

    /// Resolves a possibly out of bounds coordinate into `dims`. The result is
    /// always a valid pixel position.
    #[inline]
    pub fn resolve(self, x: i32, y: i32, dims: Dims) -> (u32, u32) {
        (
            self.horizontal.resolve(x, dims.width),
            self.vertical.resolve(y, dims.height),
        )
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub(crate) struct SignedCoord {
    pub(crate) x: i32,
    pub(crate) y: i32,
}

impl SignedCoord {
    pub(crate) fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    #[inline]
    pub(crate) fn offset(self, dx: i32, dy: i32) -> Self {
        Self::new(self.x + dx, self.y + dy)
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub(crate) struct Coord {
    pub(crate) x: u32,
    pub(crate) y: u32,
}

impl Coord {
    pub(crate) fn new(x: u32, y: u32) -> Self {
        Self { x, y }
    }

    #[inline]
    pub(crate) fn to_flat(self, dims: Dims) -> usize {
        self.y as usize * dims.width as usize + self.x as usize
    }

    #[inline]
    pub(crate) fn from_flat(flat: usize, dims: Dims) -> Self {
        let width = dims.width as usize;
        Self::new((flat % width) as u32, (flat / width) as u32)
    }

    #[inline]
    pub(crate) fn to_signed(self) -> SignedCoord {
        SignedCoord::new(self.x as i32, self.y as i32)
    }
}

/// A dense, row-major buffer of `channels` interleaved 8-bit values per pixel.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PixelMap {
    width: u32,
    height: u32,
    channels: usize,
    data: Vec<u8>,
}

impl PixelMap {
    /// Creates a map with every channel set to 0.
    pub fn new(width: u32, height: u32, channels: usize) -> Self {
        assert!(channels > 0, "a pixel map needs at least one channel");
        Self {
            width,
            height,
            channels,
            data: vec![0; width as usize * height as usize * channels],
        }
    }

    /// Wraps an existing buffer, returning `None` if its length is not
    /// `width * height * channels`.
    pub fn from_raw(width: u32, height: u32, channels: usize, data: Vec<u8>) -> Option<Self> {
        if channels == 0 || data.len() != width as usize * height as usize * channels {
            return None;
        }

        Some(Self {
            width,
            height,
            channels,
            data,
        })
    }

    /// Creates a map by calling `f` with each pixel's position and its
    /// (zeroed) channel values.
    pub fn from_fn<F>(width: u32, height: u32, channels: usize, mut f: F) -> Self
    where
        F: FnMut(u32, u32, &mut [u8]),
    {
        let mut map = Self::new(width, height, channels);
        for (i, pixel) in map.data.chunks_exact_mut(channels).enumerate() {
            let coord = Coord::from_flat(i, Dims::new(width, height));
            f(coord.x, coord.y, pixel);
        }
        map
    }

    #[inline]
    pub fn width(&self) -> u32 {
        self.width
    }

    #[inline]
    pub fn height(&self) -> u32 {
        self.height
    }

    #[inline]
    pub fn channels(&self) -> usize {
        self.channels
    }

    #[inline]
    pub fn dims(&self) -> Dims {
        Dims::new(self.width, self.height)
    }

    #[inline]
    fn index(&self, x: u32, y: u32) -> usize {
        assert!(
            x < self.width && y < self.height,
            "pixel ({}, {}) is outside of a {}x{} map",
            x,
            y,
            self.width,
            self.height
        );
        (y as usize * self.width as usize + x as usize) * self.channels
    }

    /// Gets the channel values at a position inside the map.
    ///
    /// # Panics
    ///
    /// If the position is out of bounds.
    #[inline]
    pub fn get(&self, x: u32, y: u32) -> &[u8] {
        let ind = self.index(x, y);
        &self.data[ind..ind + self.channels]
    }

    /// Overwrites the channel values at a position inside the map.
    ///
    /// # Panics
    ///
    /// If the position is out of bounds, or `pixel` has the wrong number of
    /// channels.
    #[inline]
    pub fn set(&mut self, x: u32, y: u32, pixel: &[u8]) {
        let ind = self.index(x, y);
        self.data[ind..ind + self.channels].copy_from_slice(pixel);
    }

    /// Gets the pixel at any signed position, resolving it with `edges`.
    #[inline]
    pub fn get_resolved(&self, x: i32, y: i32, edges: Edges) -> &[u8] {
        let (x, y) = edges.resolve(x, y, self.dims());
        self.get(x, y)
    }

    pub fn pixels(&self) -> std::slice::ChunksExact<'_, u8> {
        self.data.chunks_exact(self.channels)
    }

    pub fn as_raw(&self) -> &[u8] {
        &self.data
    }

    pub fn into_raw(self) -> Vec<u8> {
        self.data
    }
}

/// Per-pixel selection weights paired with a `PixelMap` of the same size.
///
/// A weight of 0 means the pixel is out, anything else means it is in, with
/// `Mask::SELECTED` being totally selected.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Mask {
    width: u32,
    height: u32,
    weights: Vec<u8>,
}

impl Mask {
    pub const SELECTED: u8 = 255;

    /// Every pixel totally selected.
    pub fn all(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            weights: vec![Self::SELECTED; width as usize * height as usize],
        }
    }

    /// No pixel selected.
    pub fn none(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            weights: vec![0; width as usize * height as usize],
        }
    }

    pub fn from_raw(width: u32, height: u32, weights: Vec<u8>) -> Option<Self> {
        if weights.len() != width as usize * height as usize {
            return None;
        }

        Some(Self {
            width,
            height,
            weights,
        })
    }

    pub fn from_fn<F>(width: u32, height: u32, mut f: F) -> Self
    where
        F: FnMut(u32, u32) -> u8,
    {
        let dims = Dims::new(width, height);
        let weights = (0..width as usize * height as usize)
            .map(|i| {
                let c = Coord::from_flat(i, dims);
                f(c.x, c.y)
            })
            .collect();

        Self {
            width,
            height,
            weights,
        }
    }

    #[inline]
    pub fn dims(&self) -> Dims {
        Dims::new(self.width, self.height)
    }

    #[inline]
    pub fn weight(&self, x: u32, y: u32) -> u8 {
        assert!(x < self.width && y < self.height);
        self.weights[y as usize * self.width as usize + x as usize]
    }

    #[inline]
    pub fn is_in(&self, x: u32, y: u32) -> bool {
        self.weight(x, y) > 0
    }

    /// The number of pixels with a positive weight.
    pub fn count_in(&self) -> usize {
        self.weights.iter().filter(|w| **w > 0).count()
    }

    pub fn as_raw(&self) -> &[u8] {
        &self.weights
    }
}
