use {
  super::{PackResult, PackingConfig},
  crate::{
    geometry::{Canvas, P2, Pixel, RegionMask, Rgb, Shape, Tile, rim_points},
    progress::{Checkpoint, Command, Progress},
  },
  rand::Rng,
  std::collections::HashSet,
};

/// Clearance used by micro-packing, tighter than [`super::COLLISION_PADDING`].
pub const MICRO_PADDING: f32 = 0.1;

/// One unit `Pixel` tile per distinct pixel inside the canvas. Consumes no attempts.
pub fn pixel_fill(pixels: &[Pixel], color: Rgb, canvas: Canvas) -> PackResult {
  let mut seen = HashSet::new();
  let tiles = pixels.iter()
    .filter(|p| p.x < canvas.width && p.y < canvas.height)
    .filter(|p| seen.insert((p.x, p.y)))
    .map(|p| Tile { shape: Shape::Pixel { x: p.x, y: p.y }, color })
    .collect::<Vec<_>>();
  PackResult {
    filled_area: tiles.len() as f32,
    island_area: tiles.len(),
    tiles,
    attempts_used: 0,
    cancelled: false,
  }
}

/// Circle packing for islands too small for the full packer.
///
/// Radii lie in `[0.5, min(8, max_radius)]`, region fit samples only the center and four
/// rim points, and circles may come within [`MICRO_PADDING`] of each other. Every attempt
/// picks a random island pixel and binary-searches the largest circle there.
pub fn micro_pack(
  pixels: &[Pixel],
  color: Rgb,
  canvas: Canvas,
  config: &PackingConfig,
  rng: &mut impl Rng,
  checkpoint: &mut impl Checkpoint,
) -> PackResult {
  let Some(mask) = RegionMask::new(pixels, canvas) else { return PackResult::default() };
  let inside = pixels.iter()
    .filter(|p| mask.contains_pixel(p.x as i64, p.y as i64))
    .collect::<Vec<_>>();
  let (lo, hi) = (0.5, config.max_radius.min(8.0).max(0.5));
  let max_failures = config.early_exit_threshold
    .unwrap_or(config.max_attempts / 8)
    .max(1);

  let mut circles: Vec<Shape> = vec![];
  let mut result = PackResult { island_area: mask.len(), ..PackResult::default() };
  let valid = |circles: &[Shape], shape: Shape| {
    let Shape::Circle { x, y, r } = shape else { return false };
    mask.contains(P2::new(x, y))
      && rim_points(P2::new(x, y), r, 4).all(|p| mask.contains(p))
      && !circles.iter().any(|c| c.collides(&shape, MICRO_PADDING))
  };

  let mut consecutive_failures = 0;
  for attempt in 0..config.max_attempts {
    if consecutive_failures >= max_failures {
      break;
    }
    if attempt % config.shapes_per_batch.max(1) == 0 {
      let progress = Progress::Packing {
        fill: result.filled_area / mask.len() as f32,
        failed_attempts: attempt.saturating_sub(circles.len() as u64),
        attempts_used: attempt,
      };
      if checkpoint.checkpoint(progress) == Command::Cancel {
        result.cancelled = true;
        break;
      }
    }
    result.attempts_used += 1;

    let p = inside[rng.gen_range(0..inside.len())];
    let (x, y) = (p.x as f32 + 0.5, p.y as f32 + 0.5);
    let (mut low, mut high, mut best) = (lo, hi, None);
    for _ in 0..6 {
      let mid = (low + high) / 2.0;
      if valid(&circles, Shape::Circle { x, y, r: mid }) {
        best = Some(mid);
        low = mid;
      } else {
        high = mid;
      }
    }

    match best {
      Some(r) => {
        let shape = Shape::Circle { x, y, r };
        circles.push(shape);
        result.filled_area += shape.area();
        result.tiles.push(Tile {
          shape,
          color: config.color_mode.pick(color, r, lo, hi, rng),
        });
        consecutive_failures = 0;
      }
      None => consecutive_failures += 1,
    }
  }
  result
}
