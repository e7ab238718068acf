//! Data-driven UI test execution engine.
//!
//! A suite document describes pages, locator candidates, parameter
//! tables and indexed test scripts; the runner interprets those scripts
//! against a pluggable automation [`driver::traits::Surface`], with
//! optional [`driver::traits::MessageBroker`] and HTTP collaborators.
//! Every step runs under a time-budgeted retry wrapper that recovers
//! from session loss by reinitializing the session.

pub mod driver;
pub mod error;
pub mod parser;
pub mod runner;

pub use driver::memory::{MemoryBroker, MemoryElement, MemorySurface};
pub use driver::traits::{MessageBroker, Surface};
pub use error::{ConfigError, StepError};
pub use parser::types::Suite;
pub use parser::yaml::load_suite;
pub use runner::Scenario;
