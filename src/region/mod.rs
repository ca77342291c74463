//! Decomposition of an image into color regions and of regions into islands.

pub mod kmeans;
pub use kmeans::{Clustering, Init, KMeansConfig, RegionClusterer, Sample};

pub mod components;
pub use components::{Island, IslandStats, extract_regions, find_islands};
