//! Image-space geometry.
//!
//! The origin of coordinate system is in top-left corner, one unit is one image pixel.
//! Integer [`Pixel`] coordinates address raster cells; shape geometry lives in continuous
//! [`P2`] coordinates, where pixel `(x, y)` covers `[x, x + 1) × [y, y + 1)`.

use {
  euclid::{Point2D, Box2D, Size2D},
  std::{fmt, str::FromStr},
  anyhow::bail,
};

pub mod shapes;
pub use shapes::*;

/// Pixel coordinate basis
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct PixelSpace;

/// Raster cell address.
pub type Pixel = Point2D<u32, PixelSpace>;
/// Continuous position in image space.
pub type P2 = Point2D<f32, PixelSpace>;
/// Image dimensions.
pub type Canvas = Size2D<u32, PixelSpace>;

/// Inclusive pixel bounds of a pixel set: `max` is the last occupied pixel, not one past it.
pub type PixelBounds = Box2D<u32, PixelSpace>;

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Default)]
pub struct Rgb {
  pub r: u8,
  pub g: u8,
  pub b: u8,
}

impl Rgb {
  pub const fn new(r: u8, g: u8, b: u8) -> Self {
    Self { r, g, b }
  }

  /// Rounds and saturates each channel.
  pub fn from_f32(c: [f32; 3]) -> Self {
    let ch = |v: f32| v.round().clamp(0.0, 255.0) as u8;
    Self::new(ch(c[0]), ch(c[1]), ch(c[2]))
  }

  pub fn to_f32(self) -> [f32; 3] {
    [self.r as f32, self.g as f32, self.b as f32]
  }

  /// Multiply every channel by `factor`, saturating.
  pub fn scale(self, factor: f32) -> Self {
    let [r, g, b] = self.to_f32();
    Self::from_f32([r * factor, g * factor, b * factor])
  }

  /// Shift every channel by its own offset, saturating.
  pub fn offset(self, delta: [f32; 3]) -> Self {
    let [r, g, b] = self.to_f32();
    Self::from_f32([r + delta[0], g + delta[1], b + delta[2]])
  }
}

impl fmt::Display for Rgb {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "#{:02x}{:02x}{:02x}", self.r, self.g, self.b)
  }
}

impl FromStr for Rgb {
  type Err = anyhow::Error;

  /// Parses `#rrggbb`.
  fn from_str(s: &str) -> anyhow::Result<Self> {
    let hex = s.trim().trim_start_matches('#');
    if hex.len() != 6 || !hex.is_ascii() {
      bail!("expected a color in #rrggbb form, got {s:?}")
    }
    let ch = |i: usize| u8::from_str_radix(&hex[i..i + 2], 16);
    Ok(Self::new(ch(0)?, ch(2)?, ch(4)?))
  }
}

/// Inclusive bounds of a pixel set, `None` when the set is empty.
pub fn pixel_bounds(pixels: &[Pixel]) -> Option<PixelBounds> {
  let first = *pixels.first()?;
  Some(pixels.iter().fold(
    Box2D::new(first, first),
    |b, p| Box2D::new(b.min.min(*p), b.max.max(*p))
  ))
}

/// Dense membership bitmap of one pixel set, allocated over the set's bounds only.
///
/// Point queries floor the continuous coordinate to the containing pixel; anything
/// outside the bounds or the canvas is outside the region.
#[derive(Clone)]
pub struct RegionMask {
  bounds: PixelBounds,
  stride: usize,
  bits: Vec<bool>,
  len: usize,
}

impl RegionMask {
  /// Pixels outside `canvas` are dropped. Duplicates are counted once.
  pub fn new(pixels: &[Pixel], canvas: Canvas) -> Option<Self> {
    let inside = |p: &&Pixel| p.x < canvas.width && p.y < canvas.height;
    let kept = pixels.iter().filter(inside).copied().collect::<Vec<_>>();
    let bounds = pixel_bounds(&kept)?;
    let stride = (bounds.max.x - bounds.min.x + 1) as usize;
    let rows = (bounds.max.y - bounds.min.y + 1) as usize;
    let mut mask = Self { bounds, stride, bits: vec![false; stride * rows], len: 0 };
    for p in kept {
      let i = mask.offset(p.x, p.y);
      if !mask.bits[i] {
        mask.bits[i] = true;
        mask.len += 1;
      }
    }
    Some(mask)
  }

  #[inline]
  fn offset(&self, x: u32, y: u32) -> usize {
    (y - self.bounds.min.y) as usize * self.stride + (x - self.bounds.min.x) as usize
  }

  #[inline]
  pub fn contains_pixel(&self, x: i64, y: i64) -> bool {
    let b = self.bounds;
    if x < b.min.x as i64 || y < b.min.y as i64 || x > b.max.x as i64 || y > b.max.y as i64 {
      return false;
    }
    self.bits[self.offset(x as u32, y as u32)]
  }

  #[inline]
  pub fn contains(&self, p: P2) -> bool {
    p.x.is_finite() && p.y.is_finite()
      && self.contains_pixel(p.x.floor() as i64, p.y.floor() as i64)
  }

  pub fn bounds(&self) -> PixelBounds {
    self.bounds
  }

  /// Number of member pixels.
  pub fn len(&self) -> usize {
    self.len
  }

  pub fn is_empty(&self) -> bool {
    self.len == 0
  }

  /// Member pixels over bounding box area, in `(0, 1]`.
  pub fn density(&self) -> f32 {
    self.len as f32 / self.bits.len() as f32
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test] fn mask_membership() {
    let pixels = [[2, 3], [3, 3], [2, 4]].map(Pixel::from);
    let mask = RegionMask::new(&pixels, Canvas::new(10, 10)).unwrap();
    assert_eq!(mask.len(), 3);
    assert!(mask.contains(P2::new(2.9, 3.1)));
    assert!(mask.contains(P2::new(3.0, 3.99)));
    assert!(!mask.contains(P2::new(3.0, 4.0)));
    assert!(!mask.contains(P2::new(-0.5, 3.0)));
    assert!((mask.density() - 0.75).abs() < 1e-6);
  }

  #[test] fn mask_clips_to_canvas() {
    let pixels = [[0, 0], [12, 0]].map(Pixel::from);
    let mask = RegionMask::new(&pixels, Canvas::new(10, 10)).unwrap();
    assert_eq!(mask.len(), 1);
    assert!(RegionMask::new(&[], Canvas::new(10, 10)).is_none());
  }

  #[test] fn rgb_parse_display() -> anyhow::Result<()> {
    let c: Rgb = "#ff8000".parse()?;
    assert_eq!(c, Rgb::new(255, 128, 0));
    assert_eq!(c.to_string(), "#ff8000");
    assert_eq!(c.scale(0.5), Rgb::new(128, 64, 0));
    assert!("12345".parse::<Rgb>().is_err());
    Ok(())
  }
}
