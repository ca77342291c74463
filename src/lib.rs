//! This is a library for turning raster images into mosaics of non-overlapping shapes.
//!
//! The work is split in three stages:
//! - [`region`] clusters the image with a spatially weighted k-means and splits every
//!   cluster into 8-connected islands;
//! - [`solver`] fills one island with circles, rectangles, triangles or hexagons under a
//!   bounded attempt budget, and spreads a cluster's budget over its islands;
//! - [`pipeline`] ties both together and reports per-cluster statistics.
//!
//! [`drawing`] (requires the `drawing` feature) reads images and rasterises the result.
//!
//! # Basic usage
//! ```no_run
//! # #[cfg(not(feature = "drawing"))] fn main() {}
//! # #[cfg(feature = "drawing")]
//! # fn main() -> mosaic_packing::error::Result<()> {
//! # use mosaic_packing::{
//! #   drawing::{flatten, mosaic_from_image, render},
//! #   geometry::Rgb,
//! #   pipeline::PipelineConfig,
//! #   progress::Unobserved,
//! #   solver::PackingConfig,
//! # };
//! let image = image::open("in.png")?;
//! let config = PipelineConfig::default()
//!   .with_packing(PackingConfig::default().with_radius(2.0, 30.0));
//!
//! // cluster on a copy at most 400 px on a side, pack at full resolution
//! let (mosaic, _clustering) = mosaic_from_image(&image, &config, 400, &mut Unobserved)?;
//!
//! let canvas = (image.width(), image.height()).into();
//! flatten(&render(&mosaic.tiles, canvas, 2.0), Rgb::new(0, 0, 0)).save("out.png")?;
//! # Ok(())
//! # }
//! ```
//!
//! Packing a single island needs no image at all:
//! ```
//! # use {
//! #   mosaic_packing::{
//! #     geometry::{Canvas, Pixel, Rgb},
//! #     progress::Unobserved,
//! #     solver::{PackingConfig, pack},
//! #   },
//! #   rand::SeedableRng,
//! # };
//! let square = (0..10).flat_map(|x| (0..10).map(move |y| Pixel::new(x, y))).collect::<Vec<_>>();
//! let config = PackingConfig::default()
//!   .with_radius(1.0, 3.0)
//!   .with_max_attempts(500)
//!   .with_passes(None);
//! let mut rng = rand_pcg::Pcg64::seed_from_u64(0);
//!
//! let result = pack(&square, Rgb::new(255, 0, 0), Canvas::new(10, 10), &config, &mut rng, &mut Unobserved);
//! assert!(!result.tiles.is_empty());
//! assert!(result.attempts_used <= 500);
//! ```
//!
//! Long loops call a [`Checkpoint`](progress::Checkpoint) every batch of attempts, every
//! k-means iteration and every projection chunk. It receives progress and may cancel.

pub mod error;
pub mod geometry;
pub mod sdf;
pub mod progress;
pub mod solver;
pub mod region;
pub mod pipeline;
#[cfg(feature = "drawing")]
pub mod drawing;
