//! From clustered regions to a list of colored tiles.
//!
//! Every region is split into islands, the cluster's attempt budget is spread over them, and
//! each island is filled with the strategy its size calls for: pixel fill, micro-packing or
//! the full packer. Islands draw their randomness from their own stream, derived from the
//! seed and the (cluster, island) position, so [`pack_regions`] and [`pack_regions_par`]
//! produce the same tiles.

use {
  crate::{
    error::{Context, Result},
    geometry::{Canvas, Pixel, Rgb, Tile},
    progress::Checkpoint,
    region::{Island, IslandStats, KMeansConfig, find_islands},
    solver::{
      Allocation, BudgetPolicy, PackResult, PackingConfig, Strategy,
      budget::AdaptiveBudget, micro_pack, pack, pixel_fill,
    },
  },
  anyhow::bail,
  rand_pcg::Pcg64,
  tracing::{debug, info, warn},
};

/// Island count above which a cluster is reported as heavily fragmented.
pub const FRAGMENTATION_WARNING: usize = 1000;

#[derive(Debug, Clone, PartialEq)]
pub struct PipelineConfig {
  /// Shape options; `max_attempts` is the budget of one whole cluster.
  pub packing: PackingConfig,
  pub clustering: KMeansConfig,
  pub budget: BudgetPolicy,
  pub seed: u64,
  /// Smallest island that may use multi-pass packing.
  pub multi_pass_min_area: usize,
}

impl Default for PipelineConfig {
  fn default() -> Self {
    Self {
      packing: PackingConfig::default(),
      clustering: KMeansConfig::default(),
      budget: BudgetPolicy::default(),
      seed: 0,
      multi_pass_min_area: 1000,
    }
  }
}

impl PipelineConfig {
  pub fn with_packing(mut self, packing: PackingConfig) -> Self {
    self.packing = packing;
    self
  }
  pub fn with_clustering(mut self, clustering: KMeansConfig) -> Self {
    self.clustering = clustering;
    self
  }
  pub fn with_budget(mut self, budget: BudgetPolicy) -> Self {
    self.budget = budget;
    self
  }
  pub fn with_seed(mut self, seed: u64) -> Self {
    self.seed = seed;
    self
  }
  pub fn with_multi_pass_min_area(mut self, area: usize) -> Self {
    self.multi_pass_min_area = area;
    self
  }

  pub fn validate(&self) -> Result<()> {
    self.packing.validate().context("invalid packing config")?;
    self.clustering.validate().context("invalid clustering config")?;
    Ok(())
  }

  /// Packing options of one island.
  fn island(&self, area: usize, quota: u64, early_exit: Option<u64>) -> PackingConfig {
    let mut config = self.packing.clone().with_max_attempts(quota);
    config.multi_pass &= area >= self.multi_pass_min_area;
    if early_exit.is_some() {
      config.early_exit_threshold = early_exit;
    }
    config
  }
}

/// Outcome of one cluster.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ClusterStats {
  pub color: Rgb,
  pub pixels: usize,
  pub islands: usize,
  pub sizes: IslandStats,
  /// Islands that received at least one shape.
  pub filled: usize,
  /// Islands without shapes, because the budget ran out or nothing fit.
  pub skipped: usize,
  pub pixel_filled: usize,
  pub micro_packed: usize,
  pub full_packed: usize,
  pub filled_area: f32,
  pub attempts_used: u64,
  pub attempt_budget: u64,
}

impl ClusterStats {
  /// Placed area over region area.
  pub fn coverage(&self) -> f32 {
    if self.pixels == 0 { 0.0 } else { self.filled_area / self.pixels as f32 }
  }

  fn record(&mut self, strategy: Strategy, result: &PackResult) {
    match strategy {
      Strategy::PixelFill => self.pixel_filled += 1,
      Strategy::MicroPack => self.micro_packed += 1,
      Strategy::FullPack => self.full_packed += 1,
    }
    if result.tiles.is_empty() {
      self.skipped += 1;
    } else {
      self.filled += 1;
    }
    self.filled_area += result.filled_area;
    self.attempts_used += result.attempts_used;
  }
}

/// Tiles of every cluster, in cluster order, with per-cluster statistics.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Mosaic {
  pub tiles: Vec<Tile>,
  pub clusters: Vec<ClusterStats>,
  /// A checkpoint stopped packing; the tiles are what was placed until then.
  pub cancelled: bool,
}

impl Mosaic {
  /// Placed area over the area of all regions.
  pub fn coverage(&self) -> f32 {
    let pixels = self.clusters.iter().map(|c| c.pixels).sum::<usize>();
    let filled = self.clusters.iter().map(|c| c.filled_area).sum::<f32>();
    if pixels == 0 { 0.0 } else { filled / pixels as f32 }
  }

  pub fn attempts_used(&self) -> u64 {
    self.clusters.iter().map(|c| c.attempts_used).sum()
  }
}

/// Random stream of one island.
fn island_rng(seed: u64, cluster: usize, island: usize) -> Pcg64 {
  let stream = (cluster as u128) << 64 | island as u128;
  Pcg64::new(seed as u128, stream)
}

fn check_inputs(regions: &[Vec<Pixel>], colors: &[Rgb], config: &PipelineConfig) -> Result<()> {
  if regions.len() != colors.len() {
    bail!("{} regions but {} colors", regions.len(), colors.len())
  }
  config.packing.validate().context("invalid packing config")
}

/// One cluster being packed: its islands and the statistics gathered so far.
struct ClusterRun<'a> {
  index: usize,
  color: Rgb,
  canvas: Canvas,
  config: &'a PipelineConfig,
  islands: Vec<Island>,
  stats: ClusterStats,
}

impl<'a> ClusterRun<'a> {
  fn new(index: usize, region: &[Pixel], color: Rgb, canvas: Canvas, config: &'a PipelineConfig) -> Self {
    let islands = find_islands(region, canvas);
    if islands.len() > FRAGMENTATION_WARNING {
      warn!(cluster = index, islands = islands.len(), "cluster is heavily fragmented");
    }
    let stats = ClusterStats {
      color,
      pixels: islands.iter().map(Island::area).sum(),
      islands: islands.len(),
      sizes: IslandStats::of(&islands),
      attempt_budget: config.packing.max_attempts,
      ..ClusterStats::default()
    };
    Self { index, color, canvas, config, islands, stats }
  }

  fn allocate(&self) -> Allocation {
    let areas = self.islands.iter().map(Island::area).collect::<Vec<_>>();
    self.config.budget.allocate(self.config.packing.max_attempts, &areas)
  }

  fn pack_island(
    &self,
    i: usize,
    quota: u64,
    early_exit: Option<u64>,
    checkpoint: &mut impl Checkpoint,
  ) -> (Strategy, PackResult) {
    let island = &self.islands[i];
    let strategy = Strategy::for_island(island.area());
    let config = self.config.island(island.area(), quota, early_exit);
    let mut rng = island_rng(self.config.seed, self.index, i);
    let result = match strategy {
      Strategy::PixelFill => pixel_fill(&island.pixels, self.color, self.canvas),
      Strategy::MicroPack =>
        micro_pack(&island.pixels, self.color, self.canvas, &config, &mut rng, checkpoint),
      Strategy::FullPack =>
        pack(&island.pixels, self.color, self.canvas, &config, &mut rng, checkpoint),
    };
    debug!(
      cluster = self.index, island = i, area = island.area(), ?strategy,
      multi_pass = config.multi_pass, quota, shapes = result.tiles.len(),
      attempts = result.attempts_used, coverage = result.fill_fraction(),
      "island packed"
    );
    (strategy, result)
  }

  /// Islands in order against a running budget; stops once it is spent.
  fn pack_adaptive(&mut self, mut budget: AdaptiveBudget, checkpoint: &mut impl Checkpoint) -> (Vec<Tile>, bool) {
    let mut tiles = vec![];
    for i in 0..self.islands.len() {
      let area = self.islands[i].area();
      let Some(quota) = budget.quota(area, Strategy::for_island(area)) else {
        debug!(cluster = self.index, island = i, "attempt budget exhausted");
        self.stats.skipped += self.islands.len() - i;
        break;
      };
      let (strategy, result) = self.pack_island(i, quota, Some(budget.threshold(area)), checkpoint);
      budget.consume(result.attempts_used);
      self.stats.record(strategy, &result);
      tiles.extend(result.tiles);
      if result.cancelled {
        return (tiles, true);
      }
    }
    (tiles, false)
  }

  fn pack_planned(&mut self, quotas: &[u64], checkpoint: &mut impl Checkpoint) -> (Vec<Tile>, bool) {
    let mut tiles = vec![];
    for (i, &quota) in quotas.iter().enumerate() {
      if quota == 0 {
        self.stats.skipped += 1;
        continue;
      }
      let (strategy, result) = self.pack_island(i, quota, None, checkpoint);
      self.stats.record(strategy, &result);
      tiles.extend(result.tiles);
      if result.cancelled {
        return (tiles, true);
      }
    }
    (tiles, false)
  }

  fn finish(self, tiles: Vec<Tile>, cancelled: bool) -> (Vec<Tile>, ClusterStats, bool) {
    let s = &self.stats;
    info!(
      cluster = self.index, color = %s.color, pixels = s.pixels, islands = s.islands,
      tiny = s.sizes.tiny, small = s.sizes.small, medium = s.sizes.medium, large = s.sizes.large,
      filled = s.filled, skipped = s.skipped, shapes = tiles.len(),
      coverage = s.coverage(), attempts = s.attempts_used, budget = s.attempt_budget,
      "cluster packed"
    );
    (tiles, self.stats, cancelled)
  }
}

fn assemble(clusters: impl IntoIterator<Item = (Vec<Tile>, ClusterStats, bool)>) -> Mosaic {
  let mut mosaic = Mosaic::default();
  for (tiles, stats, cancelled) in clusters {
    mosaic.tiles.extend(tiles);
    mosaic.clusters.push(stats);
    mosaic.cancelled |= cancelled;
  }
  mosaic
}

/// Pack every region with its color, one island at a time.
///
/// `regions[i]` is filled with `colors[i]`. A cancelled checkpoint stops packing after the
/// current island; the clusters not reached are missing from the result.
pub fn pack_regions(
  regions: &[Vec<Pixel>],
  colors: &[Rgb],
  canvas: Canvas,
  config: &PipelineConfig,
  checkpoint: &mut impl Checkpoint,
) -> Result<Mosaic> {
  check_inputs(regions, colors, config)?;
  let mut clusters = vec![];
  for (index, (region, &color)) in regions.iter().zip(colors).enumerate() {
    let mut run = ClusterRun::new(index, region, color, canvas, config);
    let (tiles, cancelled) = match run.allocate() {
      Allocation::Planned(quotas) => run.pack_planned(&quotas, checkpoint),
      Allocation::Adaptive(budget) => run.pack_adaptive(budget, checkpoint),
    };
    clusters.push(run.finish(tiles, cancelled));
    if cancelled {
      break;
    }
  }
  Ok(assemble(clusters))
}

/// [`pack_regions`] on the rayon pool.
///
/// Clusters are packed concurrently, and so are the islands of a cluster whose budget is
/// planned up front. Adaptive budgets depend on what earlier islands consumed, so their
/// islands still run in order. Every task gets its own clone of `checkpoint`; a shared
/// [`CancelToken`](crate::progress::CancelToken) stops all of them.
pub fn pack_regions_par<C>(
  regions: &[Vec<Pixel>],
  colors: &[Rgb],
  canvas: Canvas,
  config: &PipelineConfig,
  checkpoint: &C,
) -> Result<Mosaic>
  where C: Checkpoint + Clone + Send + Sync
{
  use rayon::prelude::*;

  check_inputs(regions, colors, config)?;
  let clusters = regions.par_iter()
    .zip(colors.par_iter())
    .enumerate()
    .map(|(index, (region, &color))| {
      let mut run = ClusterRun::new(index, region, color, canvas, config);
      let (tiles, cancelled) = match run.allocate() {
        Allocation::Adaptive(budget) => run.pack_adaptive(budget, &mut checkpoint.clone()),
        Allocation::Planned(quotas) => {
          let results = quotas.par_iter()
            .enumerate()
            .map(|(i, &quota)| (quota > 0)
              .then(|| run.pack_island(i, quota, None, &mut checkpoint.clone())))
            .collect::<Vec<_>>();
          let mut tiles = vec![];
          let mut cancelled = false;
          for result in results {
            match result {
              None => run.stats.skipped += 1,
              Some((strategy, result)) => {
                run.stats.record(strategy, &result);
                cancelled |= result.cancelled;
                tiles.extend(result.tiles);
              }
            }
          }
          (tiles, cancelled)
        }
      };
      run.finish(tiles, cancelled)
    })
    .collect::<Vec<_>>();
  Ok(assemble(clusters))
}
