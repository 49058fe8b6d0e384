// image.rs — Interleaved RGBA8 image container.
//
// Every stage of the engine exchanges `RgbaImage`: a dense, row-major buffer
// of `width * height` pixels, four samples each, in R, G, B, A order.
//
// Memory layout (width = 3):
//
//   data index:  0  1  2  3 | 4  5  6  7 | 8  9 10 11 | 12 ...
//   sample:      R  G  B  A | R  G  B  A | R  G  B  A | R  ...
//   pixel:       (0,0)      | (1,0)      | (2,0)      | (0,1)
//
// There is no stride padding: row y starts at `y * width * 4`. Buffers are
// never resized after construction; a stage that produces a new image
// allocates a new `RgbaImage` of the same shape and hands it on by value.

use std::fmt;

use crate::error::{BlurError, Result};

/// Samples per pixel (R, G, B, A).
pub const CHANNELS: usize = 4;

/// A width × height RGBA8 image with interleaved channels.
#[derive(Clone, PartialEq, Eq)]
pub struct RgbaImage {
    data: Vec<u8>,
    width: usize,
    height: usize,
}

impl RgbaImage {
    /// Create a zero-filled (transparent black) image.
    ///
    /// # Panics
    /// Panics if `width * height * 4` overflows `usize`.
    pub fn new(width: usize, height: usize) -> Self {
        let len = width
            .checked_mul(height)
            .and_then(|n| n.checked_mul(CHANNELS))
            .expect("image dimensions overflow usize");
        RgbaImage {
            data: vec![0u8; len],
            width,
            height,
        }
    }

    /// Wrap a decoded pixel buffer.
    ///
    /// Fails with `EmptyImage` if either dimension is zero, and with
    /// `BufferSize` if `data.len() != width * height * 4`.
    pub fn from_vec(width: usize, height: usize, data: Vec<u8>) -> Result<Self> {
        if width == 0 || height == 0 {
            return Err(BlurError::EmptyImage { width, height });
        }
        let expected = width
            .checked_mul(height)
            .and_then(|n| n.checked_mul(CHANNELS))
            .ok_or(BlurError::BufferSize {
                expected: usize::MAX,
                actual: data.len(),
            })?;
        if data.len() != expected {
            return Err(BlurError::BufferSize {
                expected,
                actual: data.len(),
            });
        }
        Ok(RgbaImage {
            data,
            width,
            height,
        })
    }

    /// Build an image by evaluating `f(x, y)` for every pixel.
    pub fn from_fn(width: usize, height: usize, mut f: impl FnMut(usize, usize) -> [u8; 4]) -> Self {
        let mut img = RgbaImage::new(width, height);
        for y in 0..height {
            for x in 0..width {
                img.set_pixel(x, y, f(x, y));
            }
        }
        img
    }

    /// An image where every pixel is `rgba`.
    pub fn filled(width: usize, height: usize, rgba: [u8; 4]) -> Self {
        Self::from_fn(width, height, |_, _| rgba)
    }

    #[inline]
    pub fn width(&self) -> usize {
        self.width
    }

    #[inline]
    pub fn height(&self) -> usize {
        self.height
    }

    /// `(width, height)`.
    #[inline]
    pub fn dimensions(&self) -> (usize, usize) {
        (self.width, self.height)
    }

    /// Number of pixels.
    #[inline]
    pub fn pixel_count(&self) -> usize {
        self.width * self.height
    }

    /// Bytes per row (`width * 4`).
    #[inline]
    pub fn row_len(&self) -> usize {
        self.width * CHANNELS
    }

    /// Index of sample `channel` of pixel `(x, y)` in the flat buffer.
    #[inline]
    pub fn index(&self, x: usize, y: usize, channel: usize) -> usize {
        (y * self.width + x) * CHANNELS + channel
    }

    /// Read one sample.
    ///
    /// # Panics
    /// Panics if `(x, y)` is outside the image or `channel >= 4`.
    #[inline]
    pub fn sample(&self, x: usize, y: usize, channel: usize) -> u8 {
        assert!(
            x < self.width && y < self.height && channel < CHANNELS,
            "sample ({x},{y},{channel}) out of bounds for {}×{} image",
            self.width,
            self.height,
        );
        self.data[self.index(x, y, channel)]
    }

    /// Read a whole pixel as `[r, g, b, a]`.
    #[inline]
    pub fn pixel(&self, x: usize, y: usize) -> [u8; 4] {
        assert!(
            x < self.width && y < self.height,
            "pixel ({x},{y}) out of bounds for {}×{} image",
            self.width,
            self.height,
        );
        let i = self.index(x, y, 0);
        [self.data[i], self.data[i + 1], self.data[i + 2], self.data[i + 3]]
    }

    /// Write a whole pixel.
    #[inline]
    pub fn set_pixel(&mut self, x: usize, y: usize, rgba: [u8; 4]) {
        assert!(
            x < self.width && y < self.height,
            "pixel ({x},{y}) out of bounds for {}×{} image",
            self.width,
            self.height,
        );
        let i = self.index(x, y, 0);
        self.data[i..i + CHANNELS].copy_from_slice(&rgba);
    }

    /// Borrow row `y` (`width * 4` bytes).
    pub fn row(&self, y: usize) -> &[u8] {
        assert!(y < self.height, "row {y} out of bounds (height {})", self.height);
        let start = y * self.row_len();
        &self.data[start..start + self.row_len()]
    }

    /// Iterate `(x, y, [r, g, b, a])` in row-major order.
    pub fn pixels(&self) -> impl Iterator<Item = (usize, usize, [u8; 4])> + '_ {
        let w = self.width;
        self.data.chunks_exact(CHANNELS).enumerate().map(move |(i, p)| {
            (i % w, i / w, [p[0], p[1], p[2], p[3]])
        })
    }

    #[inline]
    pub fn as_slice(&self) -> &[u8] {
        &self.data
    }

    #[inline]
    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        &mut self.data
    }

    /// Hand the raw buffer to the encoder.
    pub fn into_vec(self) -> Vec<u8> {
        self.data
    }

    /// A zeroed image with the same shape as `self`.
    pub fn same_shape(&self) -> Self {
        RgbaImage::new(self.width, self.height)
    }

    /// Fail with `DimensionMismatch` unless `other` has the same shape.
    pub fn ensure_same_shape(&self, other: &RgbaImage) -> Result<()> {
        if self.dimensions() != other.dimensions() {
            return Err(BlurError::DimensionMismatch {
                a: self.dimensions(),
                b: other.dimensions(),
            });
        }
        Ok(())
    }

    /// Fail with `EmptyImage` if either dimension is zero.
    pub fn ensure_not_empty(&self) -> Result<()> {
        if self.width == 0 || self.height == 0 {
            return Err(BlurError::EmptyImage {
                width: self.width,
                height: self.height,
            });
        }
        Ok(())
    }

    /// Largest per-sample absolute difference against `other`.
    ///
    /// Used to compare backends that may disagree by a rounding step.
    ///
    /// # Panics
    /// Panics if the shapes differ.
    pub fn max_abs_diff(&self, other: &RgbaImage) -> u8 {
        assert_eq!(self.dimensions(), other.dimensions(), "shape mismatch");
        self.data
            .iter()
            .zip(&other.data)
            .map(|(&a, &b)| a.abs_diff(b))
            .max()
            .unwrap_or(0)
    }
}

impl fmt::Debug for RgbaImage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "RgbaImage {}×{}", self.width, self.height)?;
        // Only dump small images in full.
        if self.width <= 8 && self.height <= 8 {
            for y in 0..self.height {
                write!(f, "  ")?;
                for x in 0..self.width {
                    let [r, g, b, a] = self.pixel(x, y);
                    write!(f, "({r:3},{g:3},{b:3},{a:3}) ")?;
                }
                writeln!(f)?;
            }
        }
        Ok(())
    }
}
