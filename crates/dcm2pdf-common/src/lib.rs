//! dcm2pdf Common Library
//!
//! Shared error handling and logging for the dcm2pdf workspace.
//!
//! - **Error Handling**: the pipeline error taxonomy and result alias
//! - **Logging**: tracing subscriber setup (console, rotated files, JSON)
//!
//! # Example
//!
//! ```no_run
//! use dcm2pdf_common::logging::{init_logging, LogConfig};
//! use dcm2pdf_common::{PipelineError, Result};
//!
//! fn start() -> Result<()> {
//!     let config = LogConfig::from_env().map_err(|e| PipelineError::Config(e.to_string()))?;
//!     init_logging(&config).map_err(|e| PipelineError::Config(e.to_string()))?;
//!     Ok(())
//! }
//! ```

#![deny(clippy::unwrap_used, clippy::expect_used)]

pub mod error;
pub mod logging;

pub use error::{PipelineError, Result, Stage};
