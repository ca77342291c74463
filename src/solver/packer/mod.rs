//! Heuristic packing of one island with non-overlapping shapes.
//!
//! A packing run owns its state in a [`Session`]: the placed tiles, an optional
//! [`SpatialIndex`] for collision queries, a coarse coverage grid used to find empty space,
//! and an optional failure cache that skips recently doomed positions. Nothing is shared
//! between runs, so independent islands can be packed on separate threads.
//!
//! The run is best-effort: it never fails, it returns whatever it managed to place together
//! with the number of attempts it consumed.

use {
  crate::{
    geometry::{Canvas, HexOrientation, P2, Pixel, RegionMask, Rgb, Shape, ShapeKind, Tile},
    progress::{Checkpoint, Command, Progress},
  },
  super::spatial_index::SpatialIndex,
  euclid::{Box2D, Point2D},
  grids::{CoverageGrid, FailureCache},
  rand::Rng,
  tracing::{debug, trace},
};

pub mod config;
mod grids;
mod micro;
#[cfg(test)] mod tests;

pub use {
  config::*,
  micro::{MICRO_PADDING, micro_pack, pixel_fill},
};

/// Clearance below which two shapes are still allowed to touch.
pub const COLLISION_PADDING: f32 = 0.3;

/// Islands smaller than this are filled pixel by pixel.
pub const PIXEL_FILL_BELOW: usize = 20;
/// Islands smaller than this (and not pixel-filled) are micro-packed.
pub const MICRO_PACK_BELOW: usize = 100;

/// How an island of a given size is filled.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum Strategy {
  PixelFill,
  MicroPack,
  FullPack,
}

impl Strategy {
  pub fn for_island(area: usize) -> Self {
    match area {
      a if a < PIXEL_FILL_BELOW => Strategy::PixelFill,
      a if a < MICRO_PACK_BELOW => Strategy::MicroPack,
      _ => Strategy::FullPack,
    }
  }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct PackResult {
  pub tiles: Vec<Tile>,
  pub attempts_used: u64,
  /// Sum of placed shape areas.
  pub filled_area: f32,
  /// Pixel count of the packed island.
  pub island_area: usize,
  /// The run was stopped by a checkpoint before it finished.
  pub cancelled: bool,
}

impl PackResult {
  /// Placed area over island area; `0` for an empty island.
  pub fn fill_fraction(&self) -> f32 {
    if self.island_area == 0 { 0.0 } else { self.filled_area / self.island_area as f32 }
  }
}

/// Pack `pixels` (one island) with shapes colored from `color`.
///
/// Returns an empty result for an empty island or a zero attempt budget. Islands too small
/// or too thin to search get a single shape at the center of their bounds.
pub fn pack(
  pixels: &[Pixel],
  color: Rgb,
  canvas: Canvas,
  config: &PackingConfig,
  rng: &mut impl Rng,
  checkpoint: &mut impl Checkpoint,
) -> PackResult {
  let Some(mask) = RegionMask::new(pixels, canvas) else { return PackResult::default() };
  if config.max_attempts == 0 {
    return PackResult { island_area: mask.len(), ..PackResult::default() };
  }
  if let Some(result) = degenerate(&mask, color, config, rng) {
    return result;
  }
  Session::new(pixels, mask, color, config, rng, checkpoint).run()
}

/// Single shape for islands under 10 px or narrower than 2 px.
fn degenerate(mask: &RegionMask, color: Rgb, config: &PackingConfig, rng: &mut impl Rng) -> Option<PackResult> {
  let b = mask.bounds();
  let (w, h) = ((b.max.x - b.min.x) as f32, (b.max.y - b.min.y) as f32);
  if mask.len() >= 10 && w >= 2.0 && h >= 2.0 {
    return None;
  }
  let center = P2::new(
    (b.min.x + b.max.x) as f32 / 2.0 + 0.5,
    (b.min.y + b.max.y) as f32 / 2.0 + 0.5,
  );
  let r = (w.min(h) / 2.0).max(1.0);
  let shape = Shape::of_kind(config.shape_kind, center, r, HexOrientation::Pointy);
  let color = config.color_mode.pick(color, r, config.min_radius, config.max_radius, rng);
  Some(PackResult {
    filled_area: shape.area(),
    tiles: vec![Tile { shape, color }],
    attempts_used: 0,
    island_area: mask.len(),
    cancelled: false,
  })
}

/// Radius range after capping the maximum on small or sparse islands.
/// The minimum is only lowered when it would otherwise exceed the capped maximum.
pub(crate) fn adaptive_radii(mask: &RegionMask, config: &PackingConfig) -> (f32, f32) {
  let (min, max) = (config.min_radius, config.max_radius);
  if !config.adaptive_sizing {
    return (min, max);
  }
  let cap = match mask.len() {
    a if a < 500 => 5.0,
    a if a < 2000 => 15.0,
    _ if mask.density() < 0.3 => 20.0,
    _ => f32::INFINITY,
  };
  let max = max.min(cap);
  (min.min(max), max)
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
enum Candidates {
  /// Uniform over the island's bounding box.
  BoundingBox,
  /// Centers of random island pixels.
  IslandPixels,
}

/// Parameters of one sweep over the attempt budget.
#[derive(Debug, Clone)]
struct PassPlan {
  min_radius: f32,
  max_radius: f32,
  attempts: u64,
  max_consecutive_failures: u64,
  candidates: Candidates,
  /// Draw candidates from uncovered cells once fill exceeds 30%, or from the start when `late`.
  targets_gaps: bool,
  late: bool,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
enum PassEnd {
  Exhausted,
  TargetFill,
  ConsecutiveFailures,
  LowPlacementRate,
  Cancelled,
}

struct Session<'a, R, C> {
  config: &'a PackingConfig,
  pixels: &'a [Pixel],
  mask: RegionMask,
  color: Rgb,
  rng: &'a mut R,
  checkpoint: &'a mut C,
  min_radius: f32,
  max_radius: f32,
  tiles: Vec<Tile>,
  index: Option<SpatialIndex>,
  coverage: CoverageGrid,
  failures: Option<FailureCache>,
  /// Uncovered cell centers, refreshed once per batch while gap targeting is active.
  gaps: Vec<P2>,
  filled_area: f32,
  attempts: u64,
  cancelled: bool,
}

impl<'a, R: Rng, C: Checkpoint> Session<'a, R, C> {
  fn new(
    pixels: &'a [Pixel],
    mask: RegionMask,
    color: Rgb,
    config: &'a PackingConfig,
    rng: &'a mut R,
    checkpoint: &'a mut C,
  ) -> Self {
    let (min_radius, max_radius) = adaptive_radii(&mask, config);
    let b = mask.bounds();
    let area = Box2D::new(
      Point2D::new(b.min.x as f32, b.min.y as f32),
      Point2D::new(b.max.x as f32 + 1.0, b.max.y as f32 + 1.0),
    );
    let avg_radius = (min_radius + max_radius) / 2.0;
    let index = config.use_spatial_index
      .then(|| SpatialIndex::new(area, Self::index_cell(avg_radius)));
    let coverage = CoverageGrid::new(&mask, min_radius.floor().max(2.0));
    let failures = config.collision_caching
      .then(|| FailureCache::new(&mask, (2.0 * min_radius).max(4.0)));
    Self {
      config, pixels, mask, color, rng, checkpoint,
      min_radius, max_radius,
      tiles: vec![],
      index,
      coverage,
      failures,
      gaps: vec![],
      filled_area: 0.0,
      attempts: 0,
      cancelled: false,
    }
  }

  fn index_cell(avg_radius: f32) -> f32 {
    (avg_radius * 2.5).max(20.0)
  }

  fn run(mut self) -> PackResult {
    debug!(
      area = self.mask.len(),
      density = self.mask.density(),
      radii = ?(self.min_radius, self.max_radius),
      budget = self.config.max_attempts,
      "packing island"
    );
    if self.config.multi_pass {
      let passes = self.multi_pass();
      trace!(passes = passes.len(), "multi-pass done");
    } else {
      self.single_pass();
    }
    if self.config.gap_filling && !self.cancelled {
      self.fill_gaps();
    }
    self.report();
    PackResult {
      island_area: self.mask.len(),
      tiles: self.tiles,
      attempts_used: self.attempts,
      filled_area: self.filled_area,
      cancelled: self.cancelled,
    }
  }

  fn fill(&self) -> f32 {
    self.filled_area / self.mask.len() as f32
  }

  fn remaining(&self) -> u64 {
    self.config.max_attempts.saturating_sub(self.attempts)
  }

  fn progress(&self) -> Progress {
    Progress::Packing {
      fill: self.fill(),
      failed_attempts: self.attempts.saturating_sub(self.tiles.len() as u64),
      attempts_used: self.attempts,
    }
  }

  /// Suspension point. Returns `false` once the host asked to stop.
  fn yield_point(&mut self) -> bool {
    let progress = self.progress();
    if self.checkpoint.checkpoint(progress) == Command::Cancel {
      self.cancelled = true;
    }
    !self.cancelled
  }

  /// Final progress report; the run is over, so a cancel request changes nothing.
  fn report(&mut self) {
    let progress = self.progress();
    let _ = self.checkpoint.checkpoint(progress);
  }

  /// Runs the size passes; returns shapes placed and the stop reason of every pass run.
  fn multi_pass(&mut self) -> Vec<(usize, PassEnd)> {
    let n = self.config.num_passes.max(1);
    let pass_attempts = (self.config.max_attempts / n as u64).max(1);
    let (min, max) = (self.min_radius, self.max_radius);
    let mut passes = Vec::with_capacity(n as usize);

    for pass in 0..n {
      let t = pass as f32 / n as f32;
      let lo = min + (max - min) * 0.4 * t;
      let hi = (max * (1.0 - 0.75 * t)).max(lo);
      self.reindex((lo + hi) / 2.0);

      let plan = PassPlan {
        min_radius: lo,
        max_radius: hi,
        attempts: pass_attempts,
        max_consecutive_failures: self.config.early_exit_threshold
          .unwrap_or(pass_attempts / 20)
          .max(1),
        candidates: Candidates::BoundingBox,
        targets_gaps: true,
        late: pass >= n / 2,
      };
      let (placed, end) = self.run_pass(&plan);
      debug!(pass = pass + 1, passes = n, radii = ?(lo, hi), placed, ?end, fill = self.fill(), "pass done");
      passes.push((placed, end));

      match end {
        PassEnd::Cancelled | PassEnd::TargetFill => break,
        _ if self.remaining() == 0 => break,
        _ if placed < 5 && pass >= n / 2 => {
          debug!(pass = pass + 1, "low yield, ending multi-pass early");
          break
        }
        _ => {}
      }
    }
    passes
  }

  fn single_pass(&mut self) {
    let plan = PassPlan {
      min_radius: self.min_radius,
      max_radius: self.max_radius,
      attempts: self.config.max_attempts,
      max_consecutive_failures: self.config.early_exit_threshold
        .unwrap_or(self.config.max_attempts / 10)
        .max(1),
      candidates: Candidates::IslandPixels,
      targets_gaps: false,
      late: false,
    };
    let (placed, end) = self.run_pass(&plan);
    debug!(placed, ?end, fill = self.fill(), "single pass done");
  }

  fn reindex(&mut self, avg_radius: f32) {
    let cell = Self::index_cell(avg_radius);
    let shapes = self.tiles.iter().map(|t| t.shape).collect::<Vec<_>>();
    if let Some(index) = &mut self.index {
      if index.update_cell_size(cell, shapes) {
        trace!(cell, shapes = index.len(), "spatial index rebuilt");
      }
    }
  }

  fn run_pass(&mut self, plan: &PassPlan) -> (usize, PassEnd) {
    let config = self.config;
    let batch = config.shapes_per_batch.max(1);
    let interval = config.smart_exit_check_interval.max(1);
    let placed_before = self.tiles.len();
    let mut consecutive_failures = 0;
    let mut window_start = self.tiles.len();
    let mut end = PassEnd::Exhausted;

    for attempt in 0..plan.attempts {
      if self.remaining() == 0 {
        break;
      }
      if consecutive_failures >= plan.max_consecutive_failures {
        end = PassEnd::ConsecutiveFailures;
        break;
      }
      if attempt % batch == 0 {
        if !self.yield_point() {
          end = PassEnd::Cancelled;
          break;
        }
        if self.gap_mode(plan) {
          self.gaps = self.coverage.gaps(&self.mask, 40, &mut *self.rng).sample;
        }
      }
      if self.fill() > config.target_fill {
        end = PassEnd::TargetFill;
        break;
      }
      if attempt > 0 && attempt % 200 == 0 {
        if let Some(cache) = &mut self.failures {
          cache.decay();
        }
      }
      if config.smart_early_exit && attempt > 0 && attempt % interval == 0 {
        let rate = (self.tiles.len() - window_start) as f32 / interval as f32;
        if rate < config.smart_exit_min_placement_rate {
          end = PassEnd::LowPlacementRate;
          break;
        }
        window_start = self.tiles.len();
      }

      let center = self.candidate(plan);
      self.attempts += 1;
      if self.attempt_at(center, plan.min_radius, plan.max_radius) {
        consecutive_failures = 0;
      } else {
        consecutive_failures += 1;
      }
    }
    (self.tiles.len() - placed_before, end)
  }

  fn gap_mode(&self, plan: &PassPlan) -> bool {
    plan.targets_gaps && (plan.late || self.fill() > 0.3)
  }

  fn candidate(&mut self, plan: &PassPlan) -> P2 {
    if self.gap_mode(plan) && !self.gaps.is_empty() {
      let half = self.coverage.cell_size() / 2.0;
      let gap = self.gaps[self.rng.gen_range(0..self.gaps.len())];
      return P2::new(
        gap.x + self.rng.gen_range(-half..half),
        gap.y + self.rng.gen_range(-half..half),
      );
    }
    match plan.candidates {
      Candidates::IslandPixels if !self.pixels.is_empty() => {
        let p = self.pixels[self.rng.gen_range(0..self.pixels.len())];
        P2::new(p.x as f32 + 0.5, p.y as f32 + 0.5)
      }
      _ => {
        let b = self.mask.bounds();
        P2::new(
          self.rng.gen_range(b.min.x as f32..b.max.x as f32 + 1.0),
          self.rng.gen_range(b.min.y as f32..b.max.y as f32 + 1.0),
        )
      }
    }
  }

  /// One attempt: size a shape at `center` within `[lo, hi]` and place it if it is valid.
  fn attempt_at(&mut self, center: P2, lo: f32, hi: f32) -> bool {
    if self.failures.as_ref().map_or(false, |cache| cache.likely_to_fail(center)) {
      return false;
    }
    let kind = self.choose_kind(center);
    let orientation = self.config.hexagon_orientation.resolve(&mut *self.rng);
    let radius = match self.config.packing_mode {
      PackingMode::Efficient => match self.largest_fit(center, kind, orientation, lo, hi) {
        Some(r) => r,
        None => return false,
      },
      PackingMode::Random => if hi > lo { self.rng.gen_range(lo..=hi) } else { lo },
    };
    self.try_place(center, kind, orientation, radius)
  }

  /// Binary search for the largest valid size; a collapsed range is tested once at `hi`.
  fn largest_fit(&self, center: P2, kind: ShapeKind, orientation: HexOrientation, lo: f32, hi: f32) -> Option<f32> {
    let valid = |r: f32| self.is_valid(&Shape::of_kind(kind, center, r, orientation), COLLISION_PADDING);
    if hi - lo <= 0.1 {
      return valid(hi).then(|| hi);
    }
    let (mut low, mut high, mut best) = (lo, hi, None);
    for _ in 0..7 {
      if high - low <= 0.1 {
        break;
      }
      let mid = (low + high) / 2.0;
      if valid(mid) {
        best = Some(mid);
        low = mid;
      } else {
        high = mid;
      }
    }
    best
  }

  fn is_valid(&self, shape: &Shape, padding: f32) -> bool {
    if !shape.fits_within(&self.mask) {
      return false;
    }
    match &self.index {
      Some(index) => !index.any_near(shape.center(), shape.bounding_radius(), |s| s.collides(shape, padding)),
      None => !self.tiles.iter().any(|t| t.shape.collides(shape, padding)),
    }
  }

  /// Final validity check and placement. Rectangles get an aspect jitter of 0.8 to 1.2.
  fn try_place(&mut self, center: P2, kind: ShapeKind, orientation: HexOrientation, radius: f32) -> bool {
    let shape = match kind {
      ShapeKind::Rectangle => {
        let aspect = self.rng.gen_range(0.8..1.2);
        Shape::Rectangle { x: center.x, y: center.y, w: radius * aspect, h: radius / aspect }
      }
      _ => Shape::of_kind(kind, center, radius, orientation),
    };
    if !self.is_valid(&shape, COLLISION_PADDING) {
      if let Some(cache) = &mut self.failures {
        cache.mark_failed(center);
      }
      return false;
    }
    let color = self.config.color_mode.pick(self.color, radius, self.min_radius, self.max_radius, &mut *self.rng);
    if let Some(index) = &mut self.index {
      index.insert(shape, self.tiles.len());
    }
    self.coverage.mark(&shape);
    self.filled_area += shape.area();
    self.tiles.push(Tile { shape, color });
    true
  }

  /// Shape family for the next attempt; context-biased when mixing is enabled.
  fn choose_kind(&mut self, center: P2) -> ShapeKind {
    if !self.config.mixed_shapes {
      return self.config.shape_kind;
    }
    let b = self.mask.bounds();
    let (w, h) = ((b.max.x - b.min.x + 1) as f32, (b.max.y - b.min.y + 1) as f32);
    let aspect = w / h;
    let edge = self.max_radius * 1.5;
    let near_edge = center.x - (b.min.x as f32) < edge
      || (b.max.x as f32) + 1.0 - center.x < edge
      || center.y - (b.min.y as f32) < edge
      || (b.max.y as f32) + 1.0 - center.y < edge;

    let roll = self.rng.gen::<f32>();
    if aspect > 2.0 || aspect < 0.5 {
      match roll {
        r if r < 0.6 => ShapeKind::Rectangle,
        r if r < 0.8 => ShapeKind::Hexagon,
        _ => ShapeKind::Circle,
      }
    } else if near_edge {
      if roll < 0.5 { ShapeKind::Rectangle } else { ShapeKind::Circle }
    } else if self.mask.density() < 0.5 {
      if roll < 0.7 { ShapeKind::Circle } else { ShapeKind::Hexagon }
    } else if roll < 0.7 {
      ShapeKind::Circle
    } else {
      ShapeKind::Rectangle
    }
  }

  /// Small shapes dropped into uncovered cells after the main passes.
  ///
  /// Every gap tried costs one attempt, out of at most a fifth of the budget and never more
  /// than what is left. Stops when no gaps remain or their count stops changing.
  fn fill_gaps(&mut self) {
    let budget = ((self.config.max_attempts as f32 * 0.2) as u64).min(self.remaining());
    let (lo, hi) = (self.min_radius * 0.5, self.min_radius * 2.0);
    let quarter = self.coverage.cell_size() / 4.0;
    let (mut used, mut placed, mut last_total) = (0, 0, None);

    while used < budget {
      if !self.yield_point() {
        break;
      }
      let gaps = self.coverage.gaps(&self.mask, 50, &mut *self.rng);
      if gaps.total == 0 || last_total == Some(gaps.total) {
        break;
      }
      last_total = Some(gaps.total);

      for gap in gaps.sample.into_iter().take(20) {
        if used == budget {
          break;
        }
        used += 1;
        self.attempts += 1;
        let p = P2::new(
          gap.x + self.rng.gen_range(-quarter..quarter),
          gap.y + self.rng.gen_range(-quarter..quarter),
        );
        let r = self.rng.gen_range(lo..=hi);
        let orientation = HexOrientation::Pointy;
        if self.try_place(p, ShapeKind::Circle, orientation, r)
          || self.try_place(p, ShapeKind::Rectangle, orientation, r * 0.8) {
          placed += 1;
        }
      }
    }
    debug!(placed, attempts = used, fill = self.fill(), "gap filling done");
  }
}
