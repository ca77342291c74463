use {
  crate::geometry::{HexOrientation, Rgb, ShapeKind, shapes::named_enum},
  anyhow::{bail, Result},
  rand::Rng,
};

/// Orientation policy for hexagons.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum HexagonOrientation {
  Pointy,
  Flat,
  /// Coin flip per shape.
  Random,
}

impl HexagonOrientation {
  pub fn resolve(self, rng: &mut impl Rng) -> HexOrientation {
    match self {
      HexagonOrientation::Pointy => HexOrientation::Pointy,
      HexagonOrientation::Flat => HexOrientation::Flat,
      HexagonOrientation::Random => if rng.gen_bool(0.5) {
        HexOrientation::Pointy
      } else {
        HexOrientation::Flat
      },
    }
  }
}

/// How a placed shape is colored from the region's base color.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ColorMode {
  /// The region color as is.
  Centroid,
  /// Uniformly random color.
  Random,
  /// Region color with every channel jittered by up to ±50.
  Variance,
  /// Region color darkened for small shapes, full brightness at the largest radius.
  Size,
}

impl ColorMode {
  pub fn pick(self, base: Rgb, radius: f32, min_radius: f32, max_radius: f32, rng: &mut impl Rng) -> Rgb {
    match self {
      ColorMode::Centroid => base,
      ColorMode::Random => Rgb::new(rng.gen(), rng.gen(), rng.gen()),
      ColorMode::Variance => base.offset([
        rng.gen_range(-50.0..50.0),
        rng.gen_range(-50.0..50.0),
        rng.gen_range(-50.0..50.0),
      ]),
      ColorMode::Size => {
        let span = max_radius - min_radius;
        let ratio = if span > f32::EPSILON { (radius - min_radius) / span } else { 1.0 };
        base.scale(ratio.clamp(0.0, 1.0))
      }
    }
  }
}

/// How a candidate's size is chosen.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum PackingMode {
  /// Uniformly random radius within the pass range.
  Random,
  /// Largest fitting radius by binary search.
  Efficient,
}

named_enum!(HexagonOrientation {
  Pointy => "pointy",
  Flat => "flat",
  Random => "random",
});

named_enum!(ColorMode {
  Centroid => "centroid",
  Random => "random",
  Variance => "variance",
  Size => "size",
});

named_enum!(PackingMode {
  Random => "random",
  Efficient => "efficient",
});

/// Knobs of one packing run.
#[derive(Debug, Clone, PartialEq)]
pub struct PackingConfig {
  pub min_radius: f32,
  pub max_radius: f32,
  pub max_attempts: u64,
  /// Attempts between checkpoints.
  pub shapes_per_batch: u64,
  pub shape_kind: ShapeKind,
  pub hexagon_orientation: HexagonOrientation,
  pub color_mode: ColorMode,
  pub packing_mode: PackingMode,
  /// Fill fraction at which packing stops.
  pub target_fill: f32,
  pub multi_pass: bool,
  pub num_passes: u32,
  pub mixed_shapes: bool,
  pub gap_filling: bool,
  /// Consecutive failures that end a pass. Derived from the pass budget when unset.
  pub early_exit_threshold: Option<u64>,
  pub use_spatial_index: bool,
  pub smart_early_exit: bool,
  pub smart_exit_check_interval: u64,
  pub smart_exit_min_placement_rate: f32,
  pub collision_caching: bool,
  /// Cap the maximum radius on small or sparse islands.
  pub adaptive_sizing: bool,
}

impl Default for PackingConfig {
  fn default() -> Self {
    Self {
      min_radius: 3.0,
      max_radius: 50.0,
      max_attempts: 10_000,
      shapes_per_batch: 50,
      shape_kind: ShapeKind::Circle,
      hexagon_orientation: HexagonOrientation::Random,
      color_mode: ColorMode::Centroid,
      packing_mode: PackingMode::Efficient,
      target_fill: 0.85,
      multi_pass: true,
      num_passes: 4,
      mixed_shapes: false,
      gap_filling: false,
      early_exit_threshold: None,
      use_spatial_index: true,
      smart_early_exit: true,
      smart_exit_check_interval: 100,
      smart_exit_min_placement_rate: 0.01,
      collision_caching: true,
      adaptive_sizing: true,
    }
  }
}

impl PackingConfig {
  pub fn with_radius(mut self, min_radius: f32, max_radius: f32) -> Self {
    self.min_radius = min_radius;
    self.max_radius = max_radius;
    self
  }
  pub fn with_max_attempts(mut self, max_attempts: u64) -> Self {
    self.max_attempts = max_attempts;
    self
  }
  pub fn with_shape_kind(mut self, kind: ShapeKind) -> Self {
    self.shape_kind = kind;
    self
  }
  pub fn with_hexagon_orientation(mut self, orientation: HexagonOrientation) -> Self {
    self.hexagon_orientation = orientation;
    self
  }
  pub fn with_color_mode(mut self, mode: ColorMode) -> Self {
    self.color_mode = mode;
    self
  }
  pub fn with_packing_mode(mut self, mode: PackingMode) -> Self {
    self.packing_mode = mode;
    self
  }
  /// `None` disables multi-pass packing.
  pub fn with_passes(mut self, passes: Option<u32>) -> Self {
    self.multi_pass = passes.is_some();
    if let Some(n) = passes {
      self.num_passes = n;
    }
    self
  }
  pub fn with_mixed_shapes(mut self, enable: bool) -> Self {
    self.mixed_shapes = enable;
    self
  }
  pub fn with_gap_filling(mut self, enable: bool) -> Self {
    self.gap_filling = enable;
    self
  }
  pub fn with_early_exit_threshold(mut self, threshold: Option<u64>) -> Self {
    self.early_exit_threshold = threshold;
    self
  }
  pub fn with_spatial_index(mut self, enable: bool) -> Self {
    self.use_spatial_index = enable;
    self
  }
  /// `None` disables the placement-rate early exit.
  pub fn with_smart_early_exit(mut self, check: Option<(u64, f32)>) -> Self {
    self.smart_early_exit = check.is_some();
    if let Some((interval, rate)) = check {
      self.smart_exit_check_interval = interval;
      self.smart_exit_min_placement_rate = rate;
    }
    self
  }
  pub fn with_collision_caching(mut self, enable: bool) -> Self {
    self.collision_caching = enable;
    self
  }
  pub fn with_adaptive_sizing(mut self, enable: bool) -> Self {
    self.adaptive_sizing = enable;
    self
  }

  /// Rejects configurations the packer does not guard against itself.
  pub fn validate(&self) -> Result<()> {
    if !(self.min_radius.is_finite() && self.max_radius.is_finite()) {
      bail!("radii must be finite, got {}..{}", self.min_radius, self.max_radius)
    }
    if self.min_radius <= 0.0 {
      bail!("min_radius must be positive, got {}", self.min_radius)
    }
    if self.min_radius > self.max_radius {
      bail!("min_radius {} exceeds max_radius {}", self.min_radius, self.max_radius)
    }
    if self.num_passes == 0 {
      bail!("num_passes must be at least 1")
    }
    if self.shapes_per_batch == 0 {
      bail!("shapes_per_batch must be at least 1")
    }
    if self.smart_exit_check_interval == 0 {
      bail!("smart_exit_check_interval must be at least 1")
    }
    if !(0.0..=1.0).contains(&self.target_fill) {
      bail!("target_fill must lie in [0, 1], got {}", self.target_fill)
    }
    Ok(())
  }
}
