use {
  crate::geometry::{P2, RegionMask, Shape},
  rand::{Rng, seq::SliceRandom},
};

/// Coarse grid anchored at the island's top-left pixel.
#[derive(Clone)]
struct Lattice {
  origin: P2,
  cell: f32,
  cols: usize,
  rows: usize,
}

impl Lattice {
  fn new(mask: &RegionMask, cell: f32) -> Self {
    let b = mask.bounds();
    let extent = |lo: u32, hi: u32| (((hi - lo + 1) as f32 / cell).ceil() as usize).max(1);
    Self {
      origin: P2::new(b.min.x as f32, b.min.y as f32),
      cell,
      cols: extent(b.min.x, b.max.x),
      rows: extent(b.min.y, b.max.y),
    }
  }

  fn cell_of(&self, p: P2) -> Option<(usize, usize)> {
    let gx = ((p.x - self.origin.x) / self.cell).floor();
    let gy = ((p.y - self.origin.y) / self.cell).floor();
    (gx >= 0.0 && gy >= 0.0 && (gx as usize) < self.cols && (gy as usize) < self.rows)
      .then(|| (gx as usize, gy as usize))
  }

  fn center_of(&self, gx: usize, gy: usize) -> P2 {
    P2::new(
      self.origin.x + (gx as f32 + 0.5) * self.cell,
      self.origin.y + (gy as f32 + 0.5) * self.cell,
    )
  }

  fn len(&self) -> usize {
    self.cols * self.rows
  }
}

/// Marks coarse cells overlapped by at least one placed shape.
pub(crate) struct CoverageGrid {
  lattice: Lattice,
  covered: Vec<bool>,
}

/// Uncovered cells whose center lies inside the region.
pub(crate) struct Gaps {
  /// All uncovered in-region cells.
  pub total: usize,
  /// Shuffled sample of their centers.
  pub sample: Vec<P2>,
}

impl CoverageGrid {
  pub fn new(mask: &RegionMask, cell: f32) -> Self {
    let lattice = Lattice::new(mask, cell);
    Self { covered: vec![false; lattice.len()], lattice }
  }

  pub fn cell_size(&self) -> f32 {
    self.lattice.cell
  }

  pub fn mark(&mut self, shape: &Shape) {
    let l = &self.lattice;
    let (c, r) = (shape.center(), shape.bounding_radius());
    let clamp = |v: f32, count: usize| v.floor().clamp(0.0, (count - 1) as f32) as usize;
    let (gx1, gx2) = (clamp((c.x - r - l.origin.x) / l.cell, l.cols), clamp((c.x + r - l.origin.x) / l.cell, l.cols));
    let (gy1, gy2) = (clamp((c.y - r - l.origin.y) / l.cell, l.rows), clamp((c.y + r - l.origin.y) / l.cell, l.rows));
    for gy in gy1..=gy2 {
      for gx in gx1..=gx2 {
        self.covered[gy * l.cols + gx] = true;
      }
    }
  }

  pub fn gaps(&self, mask: &RegionMask, sample_size: usize, rng: &mut impl Rng) -> Gaps {
    let l = &self.lattice;
    let mut sample = (0..l.rows)
      .flat_map(|gy| (0..l.cols).map(move |gx| (gx, gy)))
      .filter(|&(gx, gy)| !self.covered[gy * l.cols + gx])
      .map(|(gx, gy)| l.center_of(gx, gy))
      .filter(|p| mask.contains(*p))
      .collect::<Vec<_>>();
    let total = sample.len();
    sample.shuffle(rng);
    sample.truncate(sample_size);
    Gaps { total, sample }
  }
}

/// Decaying score of recent placement failures per coarse cell.
pub(crate) struct FailureCache {
  lattice: Lattice,
  scores: Vec<u8>,
}

impl FailureCache {
  const PENALTY: u8 = 50;

  pub fn new(mask: &RegionMask, cell: f32) -> Self {
    let lattice = Lattice::new(mask, cell);
    Self { scores: vec![0; lattice.len()], lattice }
  }

  pub fn likely_to_fail(&self, p: P2) -> bool {
    self.lattice.cell_of(p)
      .map_or(false, |(gx, gy)| self.scores[gy * self.lattice.cols + gx] > 0)
  }

  /// Penalise the cell under `p` and its eight neighbours.
  pub fn mark_failed(&mut self, p: P2) {
    let Some((gx, gy)) = self.lattice.cell_of(p) else { return };
    let l = &self.lattice;
    let xs = gx.saturating_sub(1)..=(gx + 1).min(l.cols - 1);
    for ny in gy.saturating_sub(1)..=(gy + 1).min(l.rows - 1) {
      for nx in xs.clone() {
        let score = &mut self.scores[ny * l.cols + nx];
        *score = score.saturating_add(Self::PENALTY);
      }
    }
  }

  pub fn decay(&mut self) {
    self.scores.iter_mut().for_each(|s| *s = s.saturating_sub(1));
  }
}
