use {
  crate::{
    error::Result,
    geometry::{Canvas, Rgb, shapes::named_enum},
    progress::{Checkpoint, Command, Progress},
  },
  anyhow::bail,
  rand::{Rng, distributions::{Distribution, WeightedIndex}},
  tracing::debug,
};

/// Color and position of one image pixel. `index` is the row-major offset `y * width + x`.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct Sample {
  pub color: Rgb,
  pub index: u32,
}

/// `(r, g, b, x', y')`, where `x', y'` are the scaled, weighted spatial coordinates.
pub type Feature = [f32; 5];

/// Pixels per projection chunk; one checkpoint per chunk.
pub const PROJECTION_CHUNK: usize = 20_000;

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Init {
  /// `k` uniformly random samples.
  Random,
  /// k-means++ seeding.
  PlusPlus,
}

named_enum!(Init {
  Random => "random",
  PlusPlus => "plusplus",
});

#[derive(Debug, Clone, PartialEq)]
pub struct KMeansConfig {
  pub k: usize,
  /// `0` clusters by color alone, `1` lets position weigh as much as color.
  pub spatial_weight: f32,
  pub max_iter: u32,
  pub init: Init,
}

impl Default for KMeansConfig {
  fn default() -> Self {
    Self { k: 8, spatial_weight: 0.65, max_iter: 25, init: Init::PlusPlus }
  }
}

impl KMeansConfig {
  pub fn with_k(mut self, k: usize) -> Self {
    self.k = k;
    self
  }
  pub fn with_spatial_weight(mut self, weight: f32) -> Self {
    self.spatial_weight = weight;
    self
  }
  pub fn with_max_iter(mut self, max_iter: u32) -> Self {
    self.max_iter = max_iter;
    self
  }
  pub fn with_init(mut self, init: Init) -> Self {
    self.init = init;
    self
  }

  pub fn validate(&self) -> Result<()> {
    if self.k == 0 {
      bail!("k must be at least 1")
    }
    if !(0.0..=1.0).contains(&self.spatial_weight) {
      bail!("spatial_weight must lie in [0, 1], got {}", self.spatial_weight)
    }
    if self.max_iter == 0 {
      bail!("max_iter must be at least 1")
    }
    Ok(())
  }
}

/// Result of one clustering run.
#[derive(Debug, Clone, PartialEq)]
pub struct Clustering {
  /// Cluster of each sample, in sample order.
  pub assignments: Vec<usize>,
  /// Color part of every centroid.
  pub centroids: Vec<[f32; 3]>,
  /// Full feature-space centroids, in the clustered image's spatial scale.
  pub full_centroids: Vec<Feature>,
  pub iterations: u32,
  pub converged: bool,
  /// Within-cluster sum of squared distances after each assignment step.
  pub objective: Vec<f64>,
}

impl Clustering {
  /// Centroid colors, rounded.
  pub fn palette(&self) -> Vec<Rgb> {
    self.centroids.iter().map(|&c| Rgb::from_f32(c)).collect()
  }
}

/// Spatially weighted k-means over pixel samples.
#[derive(Debug, Clone, Default)]
pub struct RegionClusterer {
  pub config: KMeansConfig,
}

fn spatial_scale(canvas: Canvas) -> f32 {
  255.0 / canvas.width.max(canvas.height).max(1) as f32
}

fn distance2(a: &Feature, b: &Feature) -> f32 {
  a.iter().zip(b).map(|(a, b)| (a - b) * (a - b)).sum()
}

/// Index and squared distance of the nearest centroid; ties go to the lower index.
fn nearest(feature: &Feature, centroids: &[Feature]) -> (usize, f32) {
  centroids.iter()
    .enumerate()
    .fold((0, f32::INFINITY), |best, (j, c)| {
      let d = distance2(feature, c);
      if d < best.1 { (j, d) } else { best }
    })
}

impl RegionClusterer {
  pub fn new(config: KMeansConfig) -> Self {
    Self { config }
  }

  fn feature(&self, color: Rgb, x: u32, y: u32, scale: f32) -> Feature {
    let [r, g, b] = color.to_f32();
    let s = scale * self.config.spatial_weight;
    [r, g, b, x as f32 * s, y as f32 * s]
  }

  fn features(&self, samples: &[Sample], canvas: Canvas) -> Vec<Feature> {
    let scale = spatial_scale(canvas);
    let width = canvas.width.max(1);
    samples.iter()
      .map(|s| self.feature(s.color, s.index % width, s.index / width, scale))
      .collect()
  }

  fn seed(&self, features: &[Feature], rng: &mut impl Rng) -> Vec<Feature> {
    let k = self.config.k;
    let mut centroids = vec![features[rng.gen_range(0..features.len())]];
    while centroids.len() < k {
      let next = match self.config.init {
        Init::Random => features[rng.gen_range(0..features.len())],
        Init::PlusPlus => {
          let weights = features.iter().map(|f| nearest(f, &centroids).1);
          match WeightedIndex::new(weights) {
            Ok(dist) => features[dist.sample(rng)],
            // every sample coincides with a centroid
            Err(_) => features[rng.gen_range(0..features.len())],
          }
        }
      };
      centroids.push(next);
    }
    centroids
  }

  /// Lloyd iterations until the assignments repeat or `max_iter` rounds ran.
  ///
  /// Clusters left empty after an update are reseeded from a random sample. Fails on an
  /// empty sample set, an invalid configuration, or when the checkpoint cancels.
  pub fn cluster(
    &self,
    samples: &[Sample],
    canvas: Canvas,
    rng: &mut impl Rng,
    checkpoint: &mut impl Checkpoint,
  ) -> Result<Clustering> {
    use rayon::prelude::*;

    self.config.validate()?;
    if samples.is_empty() {
      bail!("cannot cluster an empty sample set")
    }
    let features = self.features(samples, canvas);
    let mut centroids = self.seed(&features, rng);
    let mut assignments = vec![usize::MAX; features.len()];
    let mut objective = vec![];
    let mut converged = false;
    let mut iterations = 0;

    for iteration in 0..self.config.max_iter {
      let progress = Progress::Clustering { iteration, max_iter: self.config.max_iter };
      if checkpoint.checkpoint(progress) == Command::Cancel {
        bail!("clustering cancelled at iteration {iteration}")
      }
      iterations = iteration + 1;

      let closest = features.par_iter()
        .map(|f| nearest(f, &centroids))
        .collect::<Vec<_>>();
      objective.push(closest.iter().map(|&(_, d)| d as f64).sum::<f64>());
      let next = closest.into_iter().map(|(j, _)| j).collect::<Vec<_>>();
      if next == assignments {
        converged = true;
        break;
      }
      assignments = next;

      let mut sums = vec![[0f64; 5]; centroids.len()];
      let mut counts = vec![0usize; centroids.len()];
      for (f, &j) in features.iter().zip(&assignments) {
        counts[j] += 1;
        sums[j].iter_mut().zip(f).for_each(|(s, v)| *s += *v as f64);
      }
      for (j, centroid) in centroids.iter_mut().enumerate() {
        *centroid = match counts[j] {
          0 => features[rng.gen_range(0..features.len())],
          n => sums[j].map(|s| (s / n as f64) as f32),
        };
      }
    }
    debug!(k = self.config.k, samples = samples.len(), iterations, converged, "k-means done");

    Ok(Clustering {
      assignments,
      centroids: centroids.iter().map(|c| [c[0], c[1], c[2]]).collect(),
      full_centroids: centroids,
      iterations,
      converged,
      objective,
    })
  }

  /// Assign every pixel of a full-resolution image to the nearest centroid of a clustering
  /// computed on a `work`-sized copy of it.
  ///
  /// Full-resolution positions are scaled by the full image's own spatial scale, which is
  /// the working-scale position times the full-to-working scale ratio. That lands them on
  /// the normalized axis the centroids were learned on. `pixels` is row-major and must hold `full.width * full.height` colors.
  pub fn project(
    &self,
    clustering: &Clustering,
    pixels: &[Rgb],
    full: Canvas,
    work: Canvas,
    checkpoint: &mut impl Checkpoint,
  ) -> Result<Vec<usize>> {
    use rayon::prelude::*;

    let total = full.width as usize * full.height as usize;
    if pixels.len() != total {
      bail!("expected {total} pixels for a {}x{} image, got {}", full.width, full.height, pixels.len())
    }
    let centroids = &clustering.full_centroids;
    if centroids.is_empty() {
      bail!("clustering has no centroids")
    }
    let scale = spatial_scale(full);
    debug!(ratio = scale / spatial_scale(work), pixels = total, "projecting clusters");

    let width = full.width as usize;
    let mut assignments = Vec::with_capacity(total);
    for (chunk_index, chunk) in pixels.chunks(PROJECTION_CHUNK).enumerate() {
      let offset = chunk_index * PROJECTION_CHUNK;
      if checkpoint.checkpoint(Progress::Projecting { done: offset, total }) == Command::Cancel {
        bail!("projection cancelled after {offset} of {total} pixels")
      }
      assignments.par_extend(chunk.par_iter()
        .enumerate()
        .map(|(i, &color)| {
          let at = offset + i;
          let f = self.feature(color, (at % width) as u32, (at / width) as u32, scale);
          nearest(&f, centroids).0
        }));
    }
    Ok(assignments)
  }
}
