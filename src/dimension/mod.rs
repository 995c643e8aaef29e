//! Dimension tables and surrogate key allocation.

pub mod allocator;
pub mod registry;
pub mod table;

pub use allocator::{Allocator, KeyAllocator, SurrogateKey};
pub use registry::{DimensionKeys, DimensionRegistry, RegistryMark};
pub use table::{DimensionRow, DimensionTable, TableMark};
