pub mod dataset;
pub mod types;
pub mod yaml;

pub use types::*;
pub use yaml::{load_suite, parse_suite};
