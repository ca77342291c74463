use {
  crate::{
    error::Result,
    geometry::{Canvas, Pixel, PixelBounds, pixel_bounds},
  },
  anyhow::bail,
  std::collections::VecDeque,
};

/// Maximal 8-connected pixel set of one region.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Island {
  pub pixels: Vec<Pixel>,
}

impl Island {
  pub fn area(&self) -> usize {
    self.pixels.len()
  }

  pub fn bounds(&self) -> Option<PixelBounds> {
    pixel_bounds(&self.pixels)
  }
}

/// Island counts by size class.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq)]
pub struct IslandStats {
  /// Under 20 px.
  pub tiny: usize,
  /// 20 to 99 px.
  pub small: usize,
  /// 100 to 499 px.
  pub medium: usize,
  /// 500 px or more.
  pub large: usize,
}

impl IslandStats {
  pub fn of(islands: &[Island]) -> Self {
    islands.iter().fold(Self::default(), |mut s, island| {
      match island.area() {
        a if a < 20 => s.tiny += 1,
        a if a < 100 => s.small += 1,
        a if a < 500 => s.medium += 1,
        _ => s.large += 1,
      }
      s
    })
  }
}

#[derive(Copy, Clone, PartialEq, Eq)]
enum Cell {
  Outside,
  Unvisited,
  Visited,
}

/// Split a region into its 8-connected islands, largest first.
///
/// Pixels outside `canvas` are ignored and duplicates are kept once. Membership is a dense
/// grid over the region's bounds, so each neighbour test is a single lookup.
pub fn find_islands(region: &[Pixel], canvas: Canvas) -> Vec<Island> {
  let pixels = region.iter()
    .filter(|p| p.x < canvas.width && p.y < canvas.height)
    .copied()
    .collect::<Vec<_>>();
  let Some(bounds) = pixel_bounds(&pixels) else { return vec![] };
  let (x0, y0) = (bounds.min.x as i64, bounds.min.y as i64);
  let width = (bounds.max.x - bounds.min.x + 1) as i64;
  let height = (bounds.max.y - bounds.min.y + 1) as i64;

  let offset = |x: i64, y: i64| ((y - y0) * width + (x - x0)) as usize;
  let mut grid = vec![Cell::Outside; (width * height) as usize];
  for p in &pixels {
    grid[offset(p.x as i64, p.y as i64)] = Cell::Unvisited;
  }

  let mut islands = vec![];
  let mut queue = VecDeque::new();
  for start in &pixels {
    let i = offset(start.x as i64, start.y as i64);
    if grid[i] != Cell::Unvisited {
      continue;
    }
    grid[i] = Cell::Visited;
    queue.push_back(*start);

    let mut island = vec![];
    while let Some(p) = queue.pop_front() {
      island.push(p);
      let (px, py) = (p.x as i64, p.y as i64);
      for (dx, dy) in NEIGHBOURS {
        let (x, y) = (px + dx, py + dy);
        if x < x0 || y < y0 || x >= x0 + width || y >= y0 + height {
          continue;
        }
        let j = offset(x, y);
        if grid[j] == Cell::Unvisited {
          grid[j] = Cell::Visited;
          queue.push_back(Pixel::new(x as u32, y as u32));
        }
      }
    }
    islands.push(Island { pixels: island });
  }
  islands.sort_by_key(|island| std::cmp::Reverse(island.area()));
  islands
}

const NEIGHBOURS: [(i64, i64); 8] = [
  (-1, -1), (0, -1), (1, -1),
  (-1, 0), (1, 0),
  (-1, 1), (0, 1), (1, 1),
];

/// Group the pixels of a row-major label image by cluster.
pub fn extract_regions(assignments: &[usize], canvas: Canvas, k: usize) -> Result<Vec<Vec<Pixel>>> {
  let expected = canvas.width as usize * canvas.height as usize;
  if assignments.len() != expected {
    bail!("expected {expected} labels for a {}x{} image, got {}", canvas.width, canvas.height, assignments.len())
  }
  let mut regions = vec![vec![]; k];
  let width = canvas.width.max(1) as usize;
  for (i, &label) in assignments.iter().enumerate() {
    let Some(region) = regions.get_mut(label) else {
      bail!("label {label} at pixel {i} is out of range for {k} clusters")
    };
    region.push(Pixel::new((i % width) as u32, (i / width) as u32));
  }
  Ok(regions)
}
