// =============================================================================
// DATA TOOLKIT
// =============================================================================
//
// Three batch components over one in-memory table type:
//
//   acquirer  - GET a public page, lift one HTML table into a Dataset
//   cleaner   - five ordered passes, one reconciled report
//   analyzer  - descriptive statistics, correlations, IQR outliers
//
// Each takes its own config struct and its own Dataset. Nothing is global,
// nothing is shared between calls, so independent files can be processed
// side by side without coordination.
// =============================================================================

pub mod acquirer;
pub mod analyzer;
pub mod cleaner;
pub mod column_scanner;
pub mod config;
pub mod dedup;
pub mod error;
pub mod io;
pub mod metrics;
pub mod models;

pub use error::{Result, ToolkitError};
pub use models::{ColumnType, Dataset, Value};
