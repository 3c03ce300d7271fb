//! Canonical type definitions for tokenuze: errors and the token-usage
//! model shared by every provider parser and the aggregation pipeline.

mod error;
mod usage;

pub use error::*;
pub use usage::*;
