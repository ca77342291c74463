use {
  super::*,
  crate::progress::{CancelToken, Unobserved},
  itertools::iproduct,
  rand::SeedableRng,
  rand_pcg::Pcg64,
};

const RED: Rgb = Rgb::new(200, 30, 30);

fn rect(x0: u32, y0: u32, w: u32, h: u32) -> Vec<Pixel> {
  iproduct!(x0..x0 + w, y0..y0 + h).map(|(x, y)| Pixel::new(x, y)).collect()
}

fn disk(cx: i64, cy: i64, r: i64) -> Vec<Pixel> {
  iproduct!(cx - r..=cx + r, cy - r..=cy + r)
    .filter(|(x, y)| (x - cx).pow(2) + (y - cy).pow(2) <= r * r)
    .map(|(x, y)| Pixel::new(x as u32, y as u32))
    .collect()
}

fn assert_disjoint(tiles: &[Tile], padding: f32) {
  for (i, a) in tiles.iter().enumerate() {
    for b in &tiles[i + 1..] {
      assert!(!a.shape.collides(&b.shape, padding), "{:?} overlaps {:?}", a.shape, b.shape);
    }
  }
}

#[test] fn ten_by_ten_square_single_pass() {
  let pixels = rect(0, 0, 10, 10);
  let config = PackingConfig::default()
    .with_radius(1.0, 3.0)
    .with_max_attempts(500)
    .with_shape_kind(ShapeKind::Circle)
    .with_passes(None);
  let mut rng = Pcg64::seed_from_u64(7);
  let result = pack(&pixels, RED, Canvas::new(10, 10), &config, &mut rng, &mut Unobserved);

  assert!(!result.tiles.is_empty());
  assert!(result.attempts_used <= 500);
  for t in &result.tiles {
    let Shape::Circle { x, y, r } = t.shape else { panic!("expected circles, got {:?}", t.shape) };
    assert!((1.0..=3.0).contains(&r), "radius {r}");
    assert!((0.0..=10.0).contains(&x) && (0.0..=10.0).contains(&y));
  }
  assert_disjoint(&result.tiles, COLLISION_PADDING);
}

#[test] fn fifteen_pixels_are_pixel_filled() {
  let pixels = rect(3, 3, 5, 3);
  assert_eq!(Strategy::for_island(pixels.len()), Strategy::PixelFill);
  let result = pixel_fill(&pixels, RED, Canvas::new(16, 16));
  assert_eq!(result.tiles.len(), 15);
  assert_eq!(result.attempts_used, 0);
  assert!(result.tiles.iter().all(|t| matches!(t.shape, Shape::Pixel { .. })));
  assert!((result.fill_fraction() - 1.0).abs() < 1e-6);
}

#[test] fn empty_and_zero_budget() {
  let mut rng = Pcg64::seed_from_u64(0);
  let config = PackingConfig::default();
  let empty = pack(&[], RED, Canvas::new(8, 8), &config, &mut rng, &mut Unobserved);
  assert_eq!(empty, PackResult::default());

  let broke = config.clone().with_max_attempts(0);
  let result = pack(&rect(0, 0, 30, 30), RED, Canvas::new(30, 30), &broke, &mut rng, &mut Unobserved);
  assert!(result.tiles.is_empty());
  assert_eq!(result.attempts_used, 0);
  assert_eq!(result.island_area, 900);
}

#[test] fn degenerate_strip_gets_one_shape() {
  let mut rng = Pcg64::seed_from_u64(0);
  let strip = rect(10, 4, 40, 1);
  let config = PackingConfig::default().with_shape_kind(ShapeKind::Rectangle);
  let result = pack(&strip, RED, Canvas::new(64, 64), &config, &mut rng, &mut Unobserved);
  assert_eq!(result.attempts_used, 0);
  assert_eq!(result.tiles.len(), 1);
  assert_eq!(result.tiles[0].shape, Shape::Rectangle { x: 30.0, y: 4.5, w: 1.0, h: 1.0 });

  let hex = pack(&rect(0, 0, 3, 3), RED, Canvas::new(8, 8),
    &config.with_shape_kind(ShapeKind::Hexagon), &mut rng, &mut Unobserved);
  assert!(matches!(
    hex.tiles[0].shape,
    Shape::Hexagon { orientation: HexOrientation::Pointy, r, .. } if r == 1.0
  ));
}

#[test] fn multi_pass_fills_a_disk() {
  let pixels = disk(60, 60, 50);
  let config = PackingConfig::default()
    .with_radius(2.0, 30.0)
    .with_max_attempts(4000)
    .with_adaptive_sizing(false);
  let mut rng = Pcg64::seed_from_u64(11);
  let result = pack(&pixels, RED, Canvas::new(128, 128), &config, &mut rng, &mut Unobserved);

  assert!(result.attempts_used <= 4000);
  assert!(result.fill_fraction() > 0.3, "fill {}", result.fill_fraction());
  assert_disjoint(&result.tiles, COLLISION_PADDING);

  let largest = result.tiles.iter().map(|t| t.shape.bounding_radius()).fold(0.0, f32::max);
  assert!(largest > 30.0 * 0.4375, "early passes place shapes larger than the last pass allows");
}

#[test] fn every_shape_kind_packs_without_overlap() {
  let pixels = rect(0, 0, 60, 40);
  for kind in [ShapeKind::Circle, ShapeKind::Rectangle, ShapeKind::Triangle, ShapeKind::Hexagon] {
    let config = PackingConfig::default()
      .with_radius(2.0, 10.0)
      .with_max_attempts(1500)
      .with_shape_kind(kind)
      .with_hexagon_orientation(HexagonOrientation::Random)
      .with_color_mode(ColorMode::Variance);
    let mut rng = Pcg64::seed_from_u64(3);
    let result = pack(&pixels, RED, Canvas::new(60, 40), &config, &mut rng, &mut Unobserved);
    assert!(!result.tiles.is_empty(), "{kind} placed nothing");
    assert_disjoint(&result.tiles, COLLISION_PADDING);
  }
}

#[test] fn spatial_index_does_not_change_validity() {
  let pixels = disk(40, 40, 35);
  for use_index in [true, false] {
    let config = PackingConfig::default()
      .with_radius(1.5, 12.0)
      .with_max_attempts(2000)
      .with_spatial_index(use_index)
      .with_collision_caching(!use_index)
      .with_mixed_shapes(true);
    let mut rng = Pcg64::seed_from_u64(5);
    let result = pack(&pixels, RED, Canvas::new(80, 80), &config, &mut rng, &mut Unobserved);
    assert!(result.tiles.len() > 10);
    assert_disjoint(&result.tiles, COLLISION_PADDING);
  }
}

#[test] fn gap_filling_stays_within_budget() {
  let pixels = rect(0, 0, 80, 80);
  let config = PackingConfig::default()
    .with_radius(2.0, 20.0)
    .with_max_attempts(1000)
    .with_gap_filling(true)
    .with_smart_early_exit(None);
  let mut rng = Pcg64::seed_from_u64(9);
  let result = pack(&pixels, RED, Canvas::new(80, 80), &config, &mut rng, &mut Unobserved);
  assert!(result.attempts_used <= 1000);
  assert_disjoint(&result.tiles, COLLISION_PADDING);
}

#[test] fn random_mode_uses_the_radius_range() {
  let pixels = rect(0, 0, 50, 50);
  let config = PackingConfig::default()
    .with_radius(2.0, 4.0)
    .with_max_attempts(800)
    .with_packing_mode(PackingMode::Random)
    .with_passes(None);
  let mut rng = Pcg64::seed_from_u64(2);
  let result = pack(&pixels, RED, Canvas::new(50, 50), &config, &mut rng, &mut Unobserved);
  assert!(!result.tiles.is_empty());
  assert!(result.tiles.iter().all(|t| (2.0..=4.0).contains(&t.shape.bounding_radius())));
}

#[test] fn adaptive_sizing_caps_small_islands() {
  let config = PackingConfig::default().with_radius(3.0, 50.0);
  let small = RegionMask::new(&rect(0, 0, 20, 20), Canvas::new(20, 20)).unwrap();
  assert_eq!(adaptive_radii(&small, &config), (3.0, 5.0));
  let medium = RegionMask::new(&rect(0, 0, 40, 40), Canvas::new(40, 40)).unwrap();
  assert_eq!(adaptive_radii(&medium, &config), (3.0, 15.0));
  let large = RegionMask::new(&rect(0, 0, 50, 50), Canvas::new(50, 50)).unwrap();
  assert_eq!(adaptive_radii(&large, &config), (3.0, 50.0));

  let tight = config.with_radius(8.0, 50.0);
  assert_eq!(adaptive_radii(&small, &tight), (5.0, 5.0));
}

#[test] fn cancellation_stops_at_first_checkpoint() {
  let pixels = rect(0, 0, 64, 64);
  let mut token = CancelToken::new();
  token.cancel();
  let mut rng = Pcg64::seed_from_u64(1);
  let result = pack(&pixels, RED, Canvas::new(64, 64), &PackingConfig::default(), &mut rng, &mut token);
  assert!(result.cancelled);
  assert!(result.tiles.is_empty());
  assert_eq!(result.attempts_used, 0);
}

#[test] fn progress_is_reported_per_batch() {
  let pixels = rect(0, 0, 40, 40);
  let config = PackingConfig::default()
    .with_max_attempts(300)
    .with_passes(None)
    .with_smart_early_exit(None)
    .with_early_exit_threshold(Some(1000));
  let mut reports = vec![];
  let mut observer = |p: Progress| {
    reports.push(p);
    Command::Continue
  };
  let mut rng = Pcg64::seed_from_u64(4);
  let result = pack(&pixels, RED, Canvas::new(40, 40), &config, &mut rng, &mut observer);
  assert!(reports.len() >= 2);
  let Some(Progress::Packing { attempts_used, .. }) = reports.last().copied() else {
    panic!("expected packing progress")
  };
  assert_eq!(attempts_used, result.attempts_used);
}

#[test] fn micro_pack_small_island() {
  let pixels = disk(10, 10, 4);
  assert_eq!(Strategy::for_island(pixels.len()), Strategy::MicroPack);
  let config = PackingConfig::default().with_max_attempts(600);
  let mut rng = Pcg64::seed_from_u64(8);
  let result = micro_pack(&pixels, RED, Canvas::new(20, 20), &config, &mut rng, &mut Unobserved);
  assert!(!result.tiles.is_empty());
  assert!(result.attempts_used <= 600);
  for t in &result.tiles {
    let Shape::Circle { r, .. } = t.shape else { panic!("micro-pack places circles only") };
    assert!((0.5..=8.0).contains(&r));
  }
  assert_disjoint(&result.tiles, MICRO_PADDING);
}

#[test] fn strategy_thresholds() {
  assert_eq!(Strategy::for_island(19), Strategy::PixelFill);
  assert_eq!(Strategy::for_island(20), Strategy::MicroPack);
  assert_eq!(Strategy::for_island(99), Strategy::MicroPack);
  assert_eq!(Strategy::for_island(100), Strategy::FullPack);
}

#[test] fn zero_intervals_do_not_divide_by_zero() {
  let pixels = rect(0, 0, 30, 30);
  let config = PackingConfig { shapes_per_batch: 0, ..PackingConfig::default() }
    .with_max_attempts(600)
    .with_smart_early_exit(Some((0, 0.0)));
  let mut rng = Pcg64::seed_from_u64(6);
  let result = pack(&pixels, RED, Canvas::new(30, 30), &config, &mut rng, &mut Unobserved);
  assert!(!result.tiles.is_empty());
  assert!(result.attempts_used <= 600);
  assert_disjoint(&result.tiles, COLLISION_PADDING);

  let single = config.with_passes(None);
  let result = pack(&pixels, RED, Canvas::new(30, 30), &single, &mut rng, &mut Unobserved);
  assert!(!result.tiles.is_empty());
}

fn session<'a>(
  pixels: &'a [Pixel],
  side: u32,
  config: &'a PackingConfig,
  rng: &'a mut Pcg64,
  checkpoint: &'a mut Unobserved,
) -> Session<'a, Pcg64, Unobserved> {
  let mask = RegionMask::new(pixels, Canvas::new(side, side)).unwrap();
  Session::new(pixels, mask, RED, config, rng, checkpoint)
}

fn plan(min_radius: f32, max_radius: f32, attempts: u64, max_consecutive_failures: u64) -> PassPlan {
  PassPlan {
    min_radius,
    max_radius,
    attempts,
    max_consecutive_failures,
    candidates: Candidates::IslandPixels,
    targets_gaps: false,
    late: false,
  }
}

/// A 10×10 square where no radius in 20..30 fits.
fn hopeless() -> (Vec<Pixel>, PackingConfig) {
  let config = PackingConfig::default()
    .with_radius(20.0, 30.0)
    .with_adaptive_sizing(false)
    .with_smart_early_exit(None);
  (rect(0, 0, 10, 10), config)
}

#[test] fn consecutive_failures_end_a_pass() {
  let (pixels, config) = hopeless();
  let (mut rng, mut cp) = (Pcg64::seed_from_u64(1), Unobserved);
  let mut s = session(&pixels, 10, &config, &mut rng, &mut cp);

  assert_eq!(s.run_pass(&plan(20.0, 30.0, 500, 25)), (0, PassEnd::ConsecutiveFailures));
  assert_eq!(s.attempts, 25);
}

#[test] fn low_placement_rate_ends_a_pass() {
  let (pixels, config) = hopeless();
  let config = config.with_smart_early_exit(Some((40, 0.05)));
  let (mut rng, mut cp) = (Pcg64::seed_from_u64(1), Unobserved);
  let mut s = session(&pixels, 10, &config, &mut rng, &mut cp);

  assert_eq!(s.run_pass(&plan(20.0, 30.0, 500, 1000)), (0, PassEnd::LowPlacementRate));
  assert_eq!(s.attempts, 40);

  // a pass that keeps placing is not cut short
  let pixels = rect(0, 0, 60, 60);
  let config = PackingConfig::default()
    .with_radius(1.0, 2.0)
    .with_adaptive_sizing(false)
    .with_smart_early_exit(Some((40, 0.05)));
  let (mut rng, mut cp) = (Pcg64::seed_from_u64(1), Unobserved);
  let mut s = session(&pixels, 60, &config, &mut rng, &mut cp);
  let (placed, end) = s.run_pass(&plan(1.0, 2.0, 120, 1000));
  assert_eq!(end, PassEnd::Exhausted);
  assert!(placed > 12);
  assert_eq!(s.attempts, 120);
}

#[test] fn late_pass_with_low_yield_ends_multi_pass() {
  let (pixels, config) = hopeless();
  let config = config
    .with_max_attempts(400)
    .with_passes(Some(4))
    .with_early_exit_threshold(Some(25));
  let (mut rng, mut cp) = (Pcg64::seed_from_u64(2), Unobserved);
  let mut s = session(&pixels, 10, &config, &mut rng, &mut cp);

  // passes 1 and 2 are early and always continue; pass 3 is late and places nothing
  let passes = s.multi_pass();
  assert_eq!(passes, vec![(0, PassEnd::ConsecutiveFailures); 3]);
  assert_eq!(s.attempts, 75);

  let mut rng = Pcg64::seed_from_u64(2);
  let result = pack(&pixels, RED, Canvas::new(10, 10), &config, &mut rng, &mut Unobserved);
  assert_eq!(result.attempts_used, 75);
  assert!(result.tiles.is_empty());
}

#[test] fn failure_cache_skips_doomed_positions() {
  let pixels = rect(0, 0, 40, 40);
  let center = P2::new(20.0, 20.0);
  for caching in [true, false] {
    let config = PackingConfig::default()
      .with_radius(2.0, 6.0)
      .with_adaptive_sizing(false)
      .with_packing_mode(PackingMode::Random)
      .with_collision_caching(caching);
    let (mut rng, mut cp) = (Pcg64::seed_from_u64(3), Unobserved);
    let mut s = session(&pixels, 40, &config, &mut rng, &mut cp);

    assert!(s.try_place(center, ShapeKind::Circle, HexOrientation::Pointy, 4.0));
    assert!(!s.attempt_at(center, 4.0, 4.0), "occupied position accepted");
    assert_eq!(s.failures.as_ref().map(|f| f.likely_to_fail(center)), caching.then(|| true));

    // free the position again; only the cache still rejects it
    s.tiles.clear();
    s.index = None;
    assert_eq!(s.attempt_at(center, 4.0, 4.0), !caching);
    if caching {
      (0..50).for_each(|_| s.failures.as_mut().unwrap().decay());
      assert!(s.attempt_at(center, 4.0, 4.0), "cache did not decay");
    }
  }
}

#[test] fn spatial_index_follows_pass_radii() {
  let pixels = rect(0, 0, 120, 120);
  let config = PackingConfig { target_fill: 1.0, ..PackingConfig::default() }
    .with_radius(10.0, 40.0)
    .with_adaptive_sizing(false)
    .with_max_attempts(2000)
    .with_passes(Some(4))
    .with_smart_early_exit(None);
  let (mut rng, mut cp) = (Pcg64::seed_from_u64(4), Unobserved);
  let mut s = session(&pixels, 120, &config, &mut rng, &mut cp);
  let initial = s.index.as_ref().unwrap().cell_size();
  assert_eq!(initial, Session::<Pcg64, Unobserved>::index_cell(25.0));

  let passes = s.multi_pass();
  assert!(passes.len() >= 3, "{passes:?}");
  let t = (passes.len() - 1) as f32 / 4.0;
  let lo = 10.0 + (40.0 - 10.0) * 0.4 * t;
  let hi = (40.0 * (1.0 - 0.75 * t)).max(lo);
  let index = s.index.as_ref().unwrap();
  assert_eq!(index.cell_size(), Session::<Pcg64, Unobserved>::index_cell((lo + hi) / 2.0));
  assert_ne!(index.cell_size(), initial);

  // every shape placed before a rebuild is still found by collision queries
  assert_eq!(index.len(), s.tiles.len());
  assert!(!s.tiles.is_empty());
  for tile in &s.tiles {
    assert!(!s.is_valid(&tile.shape, COLLISION_PADDING), "{:?} lost by the index", tile.shape);
  }
}
