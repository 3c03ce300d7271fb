//! Services for aggregation, pricing resolution, model-name normalization,
//! machine identification, remote upload, and output rendering.

pub mod aggregator;
pub mod machine_id;
pub mod normalizer;
pub mod pricing;
pub mod render;
pub mod uploader;

pub use aggregator::{Aggregator, Report};
pub use normalizer::normalize_model_name;
pub use pricing::build_pricing_map;
