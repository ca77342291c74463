use {
  clap::Parser,
  mosaic_packing::{
    drawing::{ImageRegions, flatten, regions_from_image, render_parallel},
    error::{self, Context, Result},
    geometry::{Rgb, ShapeKind},
    pipeline::{PipelineConfig, pack_regions, pack_regions_par},
    progress::{CancelToken, Command, Progress},
    region::{Init, KMeansConfig},
    solver::{
      BudgetPolicy, BudgetScheme, PackingConfig,
      budget::ThresholdMode,
      packer::{ColorMode, HexagonOrientation, PackingMode},
    },
  },
  std::path::PathBuf,
  tracing::{info, trace},
};

/// Turn an image into a mosaic of non-overlapping shapes.
#[derive(Debug, Parser)]
#[command(version, about)]
struct Args {
  input: PathBuf,
  #[arg(short, long, default_value = "mosaic.png")]
  output: PathBuf,

  /// Number of color regions.
  #[arg(short, default_value_t = 8)]
  k: usize,
  #[arg(long, default_value_t = 0.65)]
  spatial_weight: f32,
  #[arg(long, default_value_t = 25)]
  max_iter: u32,
  #[arg(long, default_value = "plusplus")]
  init: Init,
  /// Largest side of the copy the clustering runs on.
  #[arg(long, default_value_t = 400)]
  work_size: u32,

  #[arg(long, default_value = "circle")]
  shape: ShapeKind,
  #[arg(long, default_value = "random")]
  hexagon: HexagonOrientation,
  #[arg(long, default_value = "centroid")]
  color: ColorMode,
  #[arg(long, default_value = "efficient")]
  mode: PackingMode,
  #[arg(long, default_value_t = 3.0)]
  min_radius: f32,
  #[arg(long, default_value_t = 50.0)]
  max_radius: f32,
  /// Attempt budget of each cluster.
  #[arg(long, default_value_t = 10_000)]
  attempts: u64,
  /// Size passes of multi-pass packing; 0 packs in a single pass.
  #[arg(long, default_value_t = 4)]
  passes: u32,
  #[arg(long, default_value_t = 0.85)]
  target_fill: f32,
  #[arg(long)]
  mixed: bool,
  #[arg(long)]
  gap_filling: bool,

  #[arg(long, default_value = "fairshare")]
  budget: BudgetScheme,
  /// Consecutive failures before the adaptive budget abandons an island.
  #[arg(long, default_value_t = 300)]
  adaptive_threshold: u64,
  #[arg(long, default_value = "fixed")]
  threshold_mode: ThresholdMode,

  #[arg(long, default_value_t = 0)]
  seed: u64,
  /// Output scale relative to the input image.
  #[arg(long, default_value_t = 1.0)]
  scale: f32,
  /// Background color, `#rrggbb`.
  #[arg(long, default_value = "#000000")]
  background: Rgb,
  /// Pack islands on all cores.
  #[arg(long)]
  parallel: bool,
  /// -v for debug, -vv for trace output.
  #[arg(short, long, action = clap::ArgAction::Count)]
  verbose: u8,
}

impl Args {
  fn config(&self) -> PipelineConfig {
    let packing = PackingConfig {
      shape_kind: self.shape,
      hexagon_orientation: self.hexagon,
      color_mode: self.color,
      packing_mode: self.mode,
      target_fill: self.target_fill,
      ..PackingConfig::default()
    }
      .with_radius(self.min_radius, self.max_radius)
      .with_max_attempts(self.attempts)
      .with_passes((self.passes > 0).then(|| self.passes))
      .with_mixed_shapes(self.mixed)
      .with_gap_filling(self.gap_filling);
    let clustering = KMeansConfig::default()
      .with_k(self.k)
      .with_spatial_weight(self.spatial_weight)
      .with_max_iter(self.max_iter)
      .with_init(self.init);
    let budget = BudgetPolicy::new(self.budget)
      .with_adaptive_threshold(self.adaptive_threshold, self.threshold_mode);
    PipelineConfig::default()
      .with_packing(packing)
      .with_clustering(clustering)
      .with_budget(budget)
      .with_seed(self.seed)
  }
}

fn run(args: Args) -> Result<()> {
  let config = args.config();
  let image = image::open(&args.input)
    .with_context(|| format!("cannot open {}", args.input.display()))?;

  let mut log_progress = |progress: Progress| {
    trace!(?progress);
    Command::Continue
  };
  let ImageRegions { regions, clustering, canvas } =
    regions_from_image(&image, &config, args.work_size, &mut log_progress)?;
  let palette = clustering.palette();
  info!(
    palette = %palette.iter().map(Rgb::to_string).collect::<Vec<_>>().join(" "),
    iterations = clustering.iterations,
    converged = clustering.converged,
    "clusters found"
  );

  let mosaic = if args.parallel {
    pack_regions_par(&regions, &palette, canvas, &config, &CancelToken::new())?
  } else {
    pack_regions(&regions, &palette, canvas, &config, &mut log_progress)?
  };
  info!(
    shapes = mosaic.tiles.len(),
    coverage = mosaic.coverage(),
    attempts = mosaic.attempts_used(),
    "packing done"
  );

  let threads = rayon::current_num_threads();
  let image = render_parallel(&mosaic.tiles, canvas, args.scale, threads);
  flatten(&image, args.background)
    .save(&args.output)
    .with_context(|| format!("cannot write {}", args.output.display()))?;
  info!(output = %args.output.display(), "saved");
  Ok(())
}

fn main() {
  let args = Args::parse();
  let level = match args.verbose {
    0 => tracing::Level::INFO,
    1 => tracing::Level::DEBUG,
    _ => tracing::Level::TRACE,
  };
  tracing_subscriber::fmt()
    .with_max_level(level)
    .with_target(false)
    .init();

  if let Err(e) = run(args) {
    eprintln!("{}", error::display(&e));
    std::process::exit(1);
  }
}
