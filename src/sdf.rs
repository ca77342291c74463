use {
  euclid::Vector2D as V2,
  crate::geometry::{P2, PixelSpace, Shape},
  std::f32::consts::PI,
};

/// Signed distance function: negative inside, positive outside, in pixels.
pub trait SDF {
  fn sdf(&self, pixel: P2) -> f32;
}

impl SDF for Shape {
  fn sdf(&self, pixel: P2) -> f32 {
    let p = pixel - self.center();
    match *self {
      Shape::Circle { r, .. } => p.length() - r,
      Shape::Rectangle { w, h, .. } => box_sdf(p, V2::new(w, h) / 2.0),
      Shape::Pixel { .. } => box_sdf(p, V2::splat(0.5)),
      Shape::Triangle { r, .. } => polygon_sdf(p, r, 3, PI / 2.0),
      Shape::Hexagon { .. } => {
        let vs = self.vertices();
        let first = vs[0] - self.center();
        // edge normals sit halfway between vertices
        let phase = first.y.atan2(first.x) + PI / 6.0;
        polygon_sdf(p, self.bounding_radius(), 6, phase)
      }
    }
  }
}

fn box_sdf(p: V2<f32, PixelSpace>, half: V2<f32, PixelSpace>) -> f32 {
  let dist = p.abs() - half;
  let outside_dist = dist
    .max(V2::splat(0.0))
    .length();
  let inside_dist = dist.x
    .max(dist.y)
    .min(0.0);
  outside_dist + inside_dist
}

/// Regular convex polygon of circumradius `r`; `normal_phase` is the angle of the first
/// edge normal. Exact inside, a slight underestimate near the corners outside.
fn polygon_sdf(p: V2<f32, PixelSpace>, r: f32, sides: usize, normal_phase: f32) -> f32 {
  let apothem = r * (PI / sides as f32).cos();
  (0..sides)
    .map(|i| {
      let angle = normal_phase + i as f32 * 2.0 * PI / sides as f32;
      p.x * angle.cos() + p.y * angle.sin()
    })
    .fold(f32::MIN, f32::max) - apothem
}
