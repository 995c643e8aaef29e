//! flurry: normalizes denormalized sales transactions into a star schema.
//!
//! Each input record is split into four deduplicated dimension tables
//! (customer, product, salesperson, transaction date) that hand out stable
//! surrogate keys, and a fact table that references them by key.
//!
//! # Example
//!
//! ```ignore
//! use flurry::{Config, run_pipeline, error::PipelineError};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), PipelineError> {
//!     let config = Config::from_file("flurry.yaml")?;
//!     let stats = run_pipeline(config).await?;
//!     println!("Wrote {} fact rows", stats.fact_rows_written);
//!     Ok(())
//! }
//! ```

pub mod checkpoint;
pub mod config;
pub mod dimension;
pub mod dlq;
pub mod error;
pub mod fact;
pub mod metrics;
pub mod pipeline;
pub mod schema;
pub mod sink;
pub mod source;
pub mod storage;

// Re-export main types
pub use config::Config;
pub use dimension::{DimensionRegistry, SurrogateKey};
pub use fact::{FactAssembler, FactRow};
pub use pipeline::{AssembledBatch, BatchNormalizer, Pipeline, PipelineStats, run_pipeline};
pub use schema::Dimension;
pub use storage::{StorageProvider, StorageProviderRef};
