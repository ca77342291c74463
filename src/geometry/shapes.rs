use {
  super::{P2, Rgb, RegionMask},
  std::f32::consts::{PI, TAU},
};

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum HexOrientation {
  /// A vertex points up.
  Pointy,
  /// An edge lies on top.
  Flat,
}

impl HexOrientation {
  /// Angle of the first vertex.
  fn phase(self) -> f32 {
    match self {
      HexOrientation::Pointy => PI / 6.0,
      HexOrientation::Flat => 0.0,
    }
  }
}

/// A placed geometric primitive. `x, y` is always the center.
///
/// Rectangles are axis-aligned with full width `w` and height `h`; triangles and hexagons
/// are regular polygons inscribed in a circle of radius `r`. A `Pixel` covers exactly
/// one raster cell and is only produced by direct pixel fill.
#[derive(Debug, Copy, Clone, PartialEq)]
pub enum Shape {
  Circle { x: f32, y: f32, r: f32 },
  Rectangle { x: f32, y: f32, w: f32, h: f32 },
  Triangle { x: f32, y: f32, r: f32 },
  Hexagon { x: f32, y: f32, r: f32, orientation: HexOrientation },
  Pixel { x: u32, y: u32 },
}

/// Shape with its fill color, as handed to the renderer.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct Tile {
  pub shape: Shape,
  pub color: Rgb,
}

/// Shape family requested from the packer.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum ShapeKind {
  Circle,
  Rectangle,
  Triangle,
  Hexagon,
}

impl Shape {
  /// Build a shape of `kind` sized by `r`. Rectangles get `w = h = r`.
  pub fn of_kind(kind: ShapeKind, center: P2, r: f32, orientation: HexOrientation) -> Self {
    let (x, y) = (center.x, center.y);
    match kind {
      ShapeKind::Circle => Shape::Circle { x, y, r },
      ShapeKind::Rectangle => Shape::Rectangle { x, y, w: r, h: r },
      ShapeKind::Triangle => Shape::Triangle { x, y, r },
      ShapeKind::Hexagon => Shape::Hexagon { x, y, r, orientation },
    }
  }

  pub fn center(&self) -> P2 {
    match *self {
      Shape::Circle { x, y, .. }
      | Shape::Rectangle { x, y, .. }
      | Shape::Triangle { x, y, .. }
      | Shape::Hexagon { x, y, .. } => P2::new(x, y),
      Shape::Pixel { x, y } => P2::new(x as f32 + 0.5, y as f32 + 0.5),
    }
  }

  /// Radius used for collision approximation and spatial indexing.
  pub fn bounding_radius(&self) -> f32 {
    match *self {
      Shape::Circle { r, .. }
      | Shape::Triangle { r, .. }
      | Shape::Hexagon { r, .. } => r,
      Shape::Rectangle { w, h, .. } => w.max(h) / 2.0,
      Shape::Pixel { .. } => 0.5,
    }
  }

  pub fn area(&self) -> f32 {
    let sqrt3 = 3f32.sqrt();
    match *self {
      Shape::Circle { r, .. } => PI * r * r,
      Shape::Rectangle { w, h, .. } => w * h,
      Shape::Triangle { r, .. } => 3.0 * sqrt3 / 4.0 * r * r,
      Shape::Hexagon { r, .. } => 3.0 * sqrt3 / 2.0 * r * r,
      Shape::Pixel { .. } => 1.0,
    }
  }

  /// Polygon vertices, clockwise in screen space. Empty for circles and pixels.
  pub fn vertices(&self) -> Vec<P2> {
    match *self {
      Shape::Rectangle { x, y, w, h } => {
        let (hw, hh) = (w / 2.0, h / 2.0);
        vec![
          P2::new(x - hw, y - hh), P2::new(x + hw, y - hh),
          P2::new(x + hw, y + hh), P2::new(x - hw, y + hh),
        ]
      }
      Shape::Triangle { x, y, r } => regular_polygon(P2::new(x, y), r, 3, -PI / 2.0),
      Shape::Hexagon { x, y, r, orientation } =>
        regular_polygon(P2::new(x, y), r, 6, orientation.phase()),
      Shape::Circle { .. } | Shape::Pixel { .. } => vec![],
    }
  }

  /// Sampled region-fit: the center and every boundary sample must lie inside `mask`.
  ///
  /// Circles sample `max(8, ceil(r / 3))` points on the rim; polygons sample vertices and
  /// edge midpoints. Concavities between samples are not detected, so a shape may overshoot
  /// the region slightly.
  pub fn fits_within(&self, mask: &RegionMask) -> bool {
    if !mask.contains(self.center()) {
      return false;
    }
    match *self {
      Shape::Circle { x, y, r } => {
        let n = ((r / 3.0).ceil() as usize).max(8);
        rim_points(P2::new(x, y), r, n).all(|p| mask.contains(p))
      }
      Shape::Pixel { x, y } => mask.contains_pixel(x as i64, y as i64),
      _ => {
        let vs = self.vertices();
        (0..vs.len()).all(|i| {
          let (a, b) = (vs[i], vs[(i + 1) % vs.len()]);
          mask.contains(a) && mask.contains(a.lerp(b, 0.5))
        })
      }
    }
  }

  /// Two shapes collide when they are closer than their extents minus `padding`.
  ///
  /// Rectangle pairs use exact axis-aligned separation; every other pair falls back to
  /// bounding circles.
  pub fn collides(&self, other: &Shape, padding: f32) -> bool {
    match (*self, *other) {
      (Shape::Rectangle { x: x1, y: y1, w: w1, h: h1 },
       Shape::Rectangle { x: x2, y: y2, w: w2, h: h2 }) =>
        (x1 - x2).abs() < (w1 + w2) / 2.0 - padding
          && (y1 - y2).abs() < (h1 + h2) / 2.0 - padding,
      _ => {
        let reach = self.bounding_radius() + other.bounding_radius() - padding;
        self.center().distance_to(other.center()) < reach
      }
    }
  }
}

/// `n` evenly spaced points on a circle, starting at angle 0.
pub fn rim_points(center: P2, r: f32, n: usize) -> impl Iterator<Item = P2> {
  (0..n).map(move |i| {
    let angle = i as f32 / n as f32 * TAU;
    P2::new(center.x + angle.cos() * r, center.y + angle.sin() * r)
  })
}

fn regular_polygon(center: P2, r: f32, sides: usize, phase: f32) -> Vec<P2> {
  (0..sides)
    .map(|i| {
      let angle = phase + i as f32 * TAU / sides as f32;
      P2::new(center.x + angle.cos() * r, center.y + angle.sin() * r)
    })
    .collect()
}

macro_rules! named_enum {
  ($ty:ident { $($variant:ident => $name:literal),* $(,)? }) => {
    impl ::std::fmt::Display for $ty {
      fn fmt(&self, f: &mut ::std::fmt::Formatter<'_>) -> ::std::fmt::Result {
        f.write_str(match self { $($ty::$variant => $name),* })
      }
    }
    impl ::std::str::FromStr for $ty {
      type Err = ::anyhow::Error;
      fn from_str(s: &str) -> ::anyhow::Result<Self> {
        Ok(match s.to_ascii_lowercase().as_str() {
          $($name => $ty::$variant,)*
          other => ::anyhow::bail!(
            "unknown {} {other:?}, expected one of: {}",
            stringify!($ty), [$($name),*].join(", ")
          ),
        })
      }
    }
  };
}
pub(crate) use named_enum;

named_enum!(ShapeKind {
  Circle => "circle",
  Rectangle => "rectangle",
  Triangle => "triangle",
  Hexagon => "hexagon",
});

named_enum!(HexOrientation {
  Pointy => "pointy",
  Flat => "flat",
});
