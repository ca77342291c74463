pub mod spatial_index;
pub use spatial_index::SpatialIndex;

pub mod packer;
pub use packer::{PackResult, PackingConfig, Strategy, micro_pack, pack, pixel_fill};

pub mod budget;
pub use budget::{Allocation, BudgetPolicy, BudgetScheme};
