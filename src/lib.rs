//! RfmForge: customer segmentation by quartile-based RFM scoring
//!
//! This library derives Recency, Frequency and Monetary quartiles from a
//! customer table, composes them into a three-digit score and classifies
//! every customer into a named segment. A report layer renders distributions,
//! rank correlations and segment sizes.

pub mod cache;
pub mod cli;
pub mod config;
pub mod data;
pub mod error;
pub mod model;
pub mod segment;
pub mod stats;
pub mod viz;

// Re-export public items for easier access
pub use cache::DerivationCache;
pub use cli::Args;
pub use crate::config::AppConfig;
pub use data::{augment, load_dataset, select_columns, ColumnSelector, RfmDataset};
pub use error::{RfmError, RfmResult};
pub use model::{
    assign_quartiles, compose_score, compute_aggregates, derive, CustomerRecord, Derivation,
    DerivedRecord, Direction, Metric, QuartileMethod,
};
pub use segment::{classify, classify_str, RfmCategory, RfmScore, SEGMENT_RULES};
pub use viz::generate_report;

/// Common result type used by the CLI and report layers
pub type Result<T> = anyhow::Result<T>;
