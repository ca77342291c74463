use {
  crate::geometry::{P2, PixelSpace, Shape},
  euclid::{Box2D, Point2D, Size2D},
  std::{collections::HashSet, fmt::{Debug, Formatter}},
};

#[derive(Copy, Clone)]
struct Entry {
  id: usize,
  shape: Shape,
}

/// Uniform grid over a rectangular area, bucketing shapes by their bounding circle.
///
/// A shape is referenced from every cell its bounding square touches, so queries only
/// have to look at the cells covered by the query square. Cell coordinates outside the
/// grid are clamped onto its border cells.
pub struct SpatialIndex {
  area: Box2D<f32, PixelSpace>,
  cell_size: f32,
  cols: usize,
  rows: usize,
  cells: Vec<Vec<Entry>>,
  len: usize,
}

impl SpatialIndex {
  pub fn new(area: Box2D<f32, PixelSpace>, cell_size: f32) -> Self {
    let mut index = Self {
      area,
      cell_size: 0.0,
      cols: 0,
      rows: 0,
      cells: vec![],
      len: 0,
    };
    index.resize(cell_size);
    index
  }

  fn resize(&mut self, cell_size: f32) {
    let cell_size = cell_size.max(f32::EPSILON);
    let size = self.area.size();
    self.cell_size = cell_size;
    self.cols = ((size.width / cell_size).ceil() as usize).max(1);
    self.rows = ((size.height / cell_size).ceil() as usize).max(1);
    self.cells = vec![vec![]; self.cols * self.rows];
    self.len = 0;
  }

  pub fn cell_size(&self) -> f32 {
    self.cell_size
  }

  pub fn dimensions(&self) -> Size2D<usize, PixelSpace> {
    Size2D::new(self.cols, self.rows)
  }

  /// Number of inserted shapes.
  pub fn len(&self) -> usize {
    self.len
  }

  pub fn is_empty(&self) -> bool {
    self.len == 0
  }

  /// Inclusive `(col, row)` span of the square centered at `center` with half-width `radius`.
  fn span(&self, center: P2, radius: f32) -> Box2D<usize, PixelSpace> {
    let cell = |v: f32, origin: f32, count: usize| {
      let c = ((v - origin) / self.cell_size).floor();
      if c.is_nan() { 0 } else { c.clamp(0.0, (count - 1) as f32) as usize }
    };
    Box2D::new(
      Point2D::new(
        cell(center.x - radius, self.area.min.x, self.cols),
        cell(center.y - radius, self.area.min.y, self.rows)),
      Point2D::new(
        cell(center.x + radius, self.area.min.x, self.cols),
        cell(center.y + radius, self.area.min.y, self.rows)),
    )
  }

  fn cells_in(&self, span: Box2D<usize, PixelSpace>) -> impl Iterator<Item = usize> + '_ {
    let cols = self.cols;
    (span.min.y..=span.max.y)
      .flat_map(move |row| (span.min.x..=span.max.x).map(move |col| row * cols + col))
  }

  pub fn insert(&mut self, shape: Shape, id: usize) {
    let span = self.span(shape.center(), shape.bounding_radius());
    let cells = self.cells_in(span).collect::<Vec<_>>();
    for i in cells {
      self.cells[i].push(Entry { id, shape });
    }
    self.len += 1;
  }

  /// Deduplicated shapes referenced by the cells under the query square.
  pub fn query(&self, center: P2, radius: f32) -> Vec<(usize, Shape)> {
    let mut seen = HashSet::new();
    self.cells_in(self.span(center, radius))
      .flat_map(|i| self.cells[i].iter())
      .filter(|e| seen.insert(e.id))
      .map(|e| (e.id, e.shape))
      .collect()
  }

  /// Whether any shape near the query square satisfies `pred`.
  ///
  /// Shapes stored in several cells may be tested more than once; this skips
  /// deduplication, so `pred` must be a pure test.
  pub fn any_near(&self, center: P2, radius: f32, mut pred: impl FnMut(&Shape) -> bool) -> bool {
    self.cells_in(self.span(center, radius))
      .any(|i| self.cells[i].iter().any(|e| pred(&e.shape)))
  }

  /// Empty every cell, keeping the grid and its allocations.
  pub fn clear(&mut self) {
    self.cells.iter_mut().for_each(Vec::clear);
    self.len = 0;
  }

  /// Rebuild the grid at a new cell size and reinsert `shapes` with ids `0..n`.
  /// Returns `false` when the size is unchanged and nothing was done.
  pub fn update_cell_size(&mut self, cell_size: f32, shapes: impl IntoIterator<Item = Shape>) -> bool {
    if cell_size == self.cell_size {
      return false;
    }
    self.resize(cell_size);
    self.clear();
    shapes.into_iter()
      .enumerate()
      .for_each(|(id, shape)| self.insert(shape, id));
    true
  }
}

impl Debug for SpatialIndex {
  fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
    use humansize::{FileSize, file_size_opts as options};

    let entries = self.cells.iter().map(Vec::len).sum::<usize>();
    let size = std::mem::size_of::<Self>()
      + self.cells.capacity() * std::mem::size_of::<Vec<Entry>>()
      + self.cells.iter().map(Vec::capacity).sum::<usize>() * std::mem::size_of::<Entry>();
    f.debug_struct("SpatialIndex")
      .field("cell_size", &self.cell_size)
      .field("grid", &(self.cols, self.rows))
      .field("shapes", &self.len)
      .field("entries", &entries)
      .field("size", &size.file_size(options::BINARY).unwrap_or_default())
      .finish()
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn area(w: f32, h: f32) -> Box2D<f32, PixelSpace> {
    Box2D::new(Point2D::zero(), Point2D::new(w, h))
  }

  #[test] fn spanning_shape_is_deduplicated() {
    let mut index = SpatialIndex::new(area(100.0, 100.0), 10.0);
    index.insert(Shape::Circle { x: 50.0, y: 50.0, r: 15.0 }, 0);
    index.insert(Shape::Circle { x: 5.0, y: 5.0, r: 2.0 }, 1);

    let near = index.query(P2::new(45.0, 45.0), 1.0);
    assert_eq!(near.len(), 1);
    assert_eq!(near[0].0, 0);

    let all = index.query(P2::new(50.0, 50.0), 100.0);
    assert_eq!(all.len(), 2);
  }

  #[test] fn out_of_range_coordinates_clamp() {
    let mut index = SpatialIndex::new(area(40.0, 40.0), 10.0);
    index.insert(Shape::Rectangle { x: -5.0, y: 45.0, w: 4.0, h: 2.0 }, 7);
    assert_eq!(index.dimensions(), Size2D::new(4, 4));
    assert_eq!(index.query(P2::new(0.0, 39.0), 0.5).len(), 1);
  }

  #[test] fn rebuild_on_resize() {
    let shapes = [
      Shape::Circle { x: 10.0, y: 10.0, r: 3.0 },
      Shape::Circle { x: 30.0, y: 30.0, r: 3.0 },
    ];
    let mut index = SpatialIndex::new(area(50.0, 50.0), 20.0);
    shapes.iter().enumerate().for_each(|(i, s)| index.insert(*s, i));

    assert!(!index.update_cell_size(20.0, shapes));
    assert!(index.update_cell_size(5.0, shapes));
    assert_eq!(index.dimensions(), Size2D::new(10, 10));
    assert_eq!(index.len(), 2);
    let ids = index.query(P2::new(30.0, 30.0), 1.0)
      .into_iter().map(|(id, _)| id).collect::<Vec<_>>();
    assert_eq!(ids, vec![1]);

    index.clear();
    assert!(index.is_empty());
    assert!(index.query(P2::new(10.0, 10.0), 50.0).is_empty());
  }

  #[test] fn any_near_matches_query() {
    let mut index = SpatialIndex::new(area(60.0, 60.0), 8.0);
    let placed = Shape::Circle { x: 20.0, y: 20.0, r: 6.0 };
    index.insert(placed, 0);
    let candidate = Shape::Circle { x: 28.0, y: 20.0, r: 3.0 };
    assert!(index.any_near(candidate.center(), 3.0, |s| s.collides(&candidate, 0.3)));
    let far = Shape::Circle { x: 50.0, y: 50.0, r: 3.0 };
    assert!(!index.any_near(far.center(), 3.0, |s| s.collides(&far, 0.3)));
    println!("{index:?}");
  }
}
