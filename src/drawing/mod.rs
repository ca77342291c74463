//! Raster input and output: image → clustering samples, tiles → image.
//!
//! Tiles are rasterised through their signed distance, sampled at pixel centers, with one
//! pixel of anti-aliasing on the boundary.

use {
  crate::{
    error::{Context, Result},
    geometry::{Canvas, P2, Pixel, PixelSpace, Rgb, Shape, Tile},
    pipeline::{Mosaic, PipelineConfig, pack_regions},
    progress::Checkpoint,
    region::{Clustering, RegionClusterer, Sample, extract_regions},
    sdf::SDF,
  },
  euclid::{Box2D, Size2D},
  image::{DynamicImage, GenericImageView, Pixel as _, Rgba, RgbaImage, RgbImage, imageops::FilterType},
  rand::SeedableRng,
  tracing::{debug, info},
};


pub trait Draw<Backend> {
  fn draw(&self, image: &mut Backend);
}

/// A tile drawn at `factor` times its own scale.
#[derive(Debug, Copy, Clone)]
pub struct Scaled<T> {
  pub shape: T,
  pub factor: f32,
}

impl Shape {
  /// Same shape with every coordinate and size multiplied by `factor`.
  /// A pixel becomes a `factor`-sized square.
  pub fn scale(self, factor: f32) -> Shape {
    let s = factor;
    match self {
      Shape::Circle { x, y, r } => Shape::Circle { x: x * s, y: y * s, r: r * s },
      Shape::Rectangle { x, y, w, h } => Shape::Rectangle { x: x * s, y: y * s, w: w * s, h: h * s },
      Shape::Triangle { x, y, r } => Shape::Triangle { x: x * s, y: y * s, r: r * s },
      Shape::Hexagon { x, y, r, orientation } =>
        Shape::Hexagon { x: x * s, y: y * s, r: r * s, orientation },
      Shape::Pixel { x, y } => Shape::Rectangle {
        x: (x as f32 + 0.5) * s,
        y: (y as f32 + 0.5) * s,
        w: s,
        h: s,
      },
    }
  }

  /// Axis-aligned box enclosing the shape.
  fn draw_bounds(&self) -> Box2D<f32, PixelSpace> {
    let c = self.center();
    let (hw, hh) = match *self {
      Shape::Rectangle { w, h, .. } => (w / 2.0, h / 2.0),
      Shape::Pixel { .. } => (0.5, 0.5),
      _ => (self.bounding_radius(), self.bounding_radius()),
    };
    Box2D::new(P2::new(c.x - hw, c.y - hh), P2::new(c.x + hw, c.y + hh))
  }
}

impl Tile {
  pub fn scale(self, factor: f32) -> Scaled<Tile> {
    Scaled { shape: self, factor }
  }
}

impl Draw<RgbaImage> for Tile {
  fn draw(&self, image: &mut RgbaImage) {
    let shape = self.shape;
    let resolution: Size2D<u32, PixelSpace> = image.dimensions().into();
    let bounds = shape.draw_bounds()
      .inflate(1.0, 1.0)
      .round_out()
      .intersection(&Box2D::from_size(resolution.to_f32()))
      .map(|b| b.to_u32());
    let Some(bounds) = bounds else { return };
    let color = Rgba([self.color.r, self.color.g, self.color.b, 255]);

    itertools::iproduct!(bounds.y_range(), bounds.x_range())
      .for_each(|(y, x)| {
        let sdf = shape.sdf(P2::new(x as f32 + 0.5, y as f32 + 0.5));
        if sdf >= 0.5 {
          return;
        }
        let pixel = image.get_pixel_mut(x, y);
        *pixel = sdf_overlay_aa(sdf, *pixel, color);
      });
  }
}

impl Draw<RgbaImage> for Scaled<Tile> {
  fn draw(&self, image: &mut RgbaImage) {
    Tile { shape: self.shape.shape.scale(self.factor), color: self.shape.color }.draw(image)
  }
}

fn sdf_overlay_aa(sdf: f32, col1: Rgba<u8>, mut col2: Rgba<u8>) -> Rgba<u8> {
  let alpha = (0.5 - sdf).clamp(0.0, 1.0);
  col2.0[3] = ((col2.0[3] as f32) * alpha) as u8;
  over(col1, col2)
}

/// `top` composited over `bottom`; exact when either side is empty or `top` is opaque.
fn over(mut bottom: Rgba<u8>, top: Rgba<u8>) -> Rgba<u8> {
  match (bottom.0[3], top.0[3]) {
    (_, 0) => bottom,
    (0, _) | (_, 255) => top,
    _ => {
      bottom.blend(&top);
      bottom
    }
  }
}

/// Draw tiles onto a transparent `canvas * factor` image, in order.
pub fn render(tiles: &[Tile], canvas: Canvas, factor: f32) -> RgbaImage {
  let size = (canvas.to_f32() * factor).ceil().to_u32();
  let mut image = RgbaImage::new(size.width, size.height);
  tiles.iter().for_each(|tile| tile.scale(factor).draw(&mut image));
  image
}

/// [`render`] split across the rayon pool.
///
/// Every chunk of tiles is drawn on its own framebuffer and the buffers are overlaid in
/// order, so memory use grows with the number of chunks. Tiles of one packing never
/// overlap, so the result equals [`render`] up to anti-aliased pixels shared by two tiles.
pub fn render_parallel(tiles: &[Tile], canvas: Canvas, factor: f32, chunks: usize) -> RgbaImage {
  use rayon::prelude::*;

  if tiles.is_empty() {
    return render(tiles, canvas, factor);
  }
  let chunk_len = (tiles.len() as f32 / chunks.max(1) as f32).ceil() as usize;
  let partial_buffers = tiles.par_chunks(chunk_len.max(1))
    .map(|chunk| render(chunk, canvas, factor))
    .collect::<Vec<_>>();

  let mut buffers = partial_buffers.into_iter();
  let mut final_buffer = buffers.next().unwrap_or_else(|| render(&[], canvas, factor));
  buffers.for_each(|buffer| final_buffer.pixels_mut()
    .zip(buffer.pixels())
    .for_each(|(dst, src)| *dst = over(*dst, *src)));
  final_buffer
}

/// Flatten an image onto `background`.
pub fn flatten(image: &RgbaImage, background: Rgb) -> RgbImage {
  let bg = background.to_f32();
  RgbImage::from_fn(image.width(), image.height(), |x, y| {
    let Rgba([r, g, b, a]) = *image.get_pixel(x, y);
    let alpha = a as f32 / 255.0;
    let c = Rgb::from_f32([
      bg[0] + (r as f32 - bg[0]) * alpha,
      bg[1] + (g as f32 - bg[1]) * alpha,
      bg[2] + (b as f32 - bg[2]) * alpha,
    ]);
    image::Rgb([c.r, c.g, c.b])
  })
}

pub fn canvas_of(image: &RgbImage) -> Canvas {
  image.dimensions().into()
}

/// Row-major colors of an image.
pub fn colors(image: &RgbImage) -> Vec<Rgb> {
  image.pixels().map(|p| Rgb::new(p.0[0], p.0[1], p.0[2])).collect()
}

/// One clustering sample per pixel.
pub fn samples(image: &RgbImage) -> Vec<Sample> {
  image.pixels()
    .enumerate()
    .map(|(index, p)| Sample { color: Rgb::new(p.0[0], p.0[1], p.0[2]), index: index as u32 })
    .collect()
}

/// Shrink `image` so neither side exceeds `max_dimension`, keeping the aspect ratio.
/// Smaller images are returned as is.
pub fn downsample(image: &DynamicImage, max_dimension: u32) -> RgbImage {
  let (w, h) = image.dimensions();
  let max_dimension = max_dimension.max(1);
  if w.max(h) <= max_dimension {
    return image.to_rgb8();
  }
  image.resize(max_dimension, max_dimension, FilterType::Triangle).to_rgb8()
}

/// Clustered regions of an image, ready to be packed.
#[derive(Debug, Clone)]
pub struct ImageRegions {
  /// Pixels of each cluster, indexed like the palette.
  pub regions: Vec<Vec<Pixel>>,
  pub clustering: Clustering,
  pub canvas: Canvas,
}

/// Cluster an image and split it into per-cluster regions.
///
/// Clustering runs on a copy at most `work_dimension` pixels on a side and is projected back
/// onto the full image, so the regions are at full resolution.
pub fn regions_from_image(
  image: &DynamicImage,
  config: &PipelineConfig,
  work_dimension: u32,
  checkpoint: &mut impl Checkpoint,
) -> Result<ImageRegions> {
  config.validate()?;
  let full = image.to_rgb8();
  let work = downsample(image, work_dimension);
  let (canvas, work_canvas) = (canvas_of(&full), canvas_of(&work));
  info!(full = ?(canvas.width, canvas.height), work = ?(work_canvas.width, work_canvas.height), "clustering");

  let clusterer = RegionClusterer::new(config.clustering.clone());
  let mut rng = rand_pcg::Pcg64::seed_from_u64(config.seed);
  let clustering = clusterer.cluster(&samples(&work), work_canvas, &mut rng, checkpoint)
    .context("clustering failed")?;
  let labels = if work_canvas == canvas {
    clustering.assignments.clone()
  } else {
    clusterer.project(&clustering, &colors(&full), canvas, work_canvas, checkpoint)
      .context("projection failed")?
  };
  let regions = extract_regions(&labels, canvas, clustering.centroids.len())?;
  debug!(sizes = ?regions.iter().map(Vec::len).collect::<Vec<_>>(), "regions extracted");
  Ok(ImageRegions { regions, clustering, canvas })
}

/// [`regions_from_image`] followed by [`pack_regions`].
pub fn mosaic_from_image(
  image: &DynamicImage,
  config: &PipelineConfig,
  work_dimension: u32,
  checkpoint: &mut impl Checkpoint,
) -> Result<(Mosaic, Clustering)> {
  let ImageRegions { regions, clustering, canvas } =
    regions_from_image(image, config, work_dimension, checkpoint)?;
  let mosaic = pack_regions(&regions, &clustering.palette(), canvas, config, checkpoint)?;
  info!(
    shapes = mosaic.tiles.len(),
    coverage = mosaic.coverage(),
    attempts = mosaic.attempts_used(),
    cancelled = mosaic.cancelled,
    "mosaic done"
  );
  Ok((mosaic, clustering))
}
