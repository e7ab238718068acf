use std::path::PathBuf;

use thiserror::Error;

use crate::driver::traits::{BrokerError, SurfaceError};

/// Everything that can go wrong while executing a single step.
///
/// The retry wrapper absorbs these; only [`StepError::RetryExhausted`]
/// surfaces to the scenario caller.
#[derive(Debug, Error)]
pub enum StepError {
    #[error("no locator candidate matched element '{element}' on page '{page}'")]
    ElementNotFound { page: String, element: String },

    /// Operation tag the interpreter does not recognize. Configuration
    /// error; retrying cannot fix it, but it still transits the retry
    /// wrapper's bookkeeping like any other failure.
    #[error("unsupported operation tag")]
    UnsupportedOperation,

    #[error("unsupported check condition tag")]
    UnsupportedCondition,

    #[error("unsupported wait predicate tag")]
    UnsupportedWait,

    #[error("unsupported assertion tag")]
    UnsupportedAssertion,

    #[error("wait '{predicate}' did not hold within {timeout_secs}s")]
    WaitTimeout { predicate: String, timeout_secs: u64 },

    /// The automation session is gone. The only recoverable kind: the
    /// retry wrapper reinitializes the session before the next attempt.
    #[error("automation session unreachable: {0}")]
    SessionUnreachable(String),

    #[error("no matching message on topic '{topic}' within {timeout_secs}s")]
    BrokerConsumeTimeout { topic: String, timeout_secs: u64 },

    #[error("no broker client configured for this scenario")]
    BrokerUnavailable,

    #[error("http call failed: {0}")]
    HttpCallFailed(String),

    #[error("upload source missing: {0}")]
    FileNotFound(PathBuf),

    #[error("assertion mismatch: {0}")]
    AssertionMismatch(String),

    #[error("branch target {target} is not a valid instruction index (script has {len})")]
    InvalidBranchTarget { target: u32, len: usize },

    #[error("instruction is missing required field '{0}'")]
    MissingField(&'static str),

    #[error("unknown test identifier '{0}'")]
    UnknownTest(String),

    #[error("unknown page '{0}' referenced by instruction")]
    UnknownPage(String),

    #[error("unknown element '{element}' on page '{page}'")]
    UnknownElement { page: String, element: String },

    #[error("surface failure: {0}")]
    Surface(#[from] SurfaceError),

    #[error("broker failure: {0}")]
    Broker(#[from] BrokerError),

    /// Aggregated failure raised after the retry budget for one step is
    /// spent, wrapping the last underlying cause when one was recorded.
    #[error("step '{step}' exhausted its retry budget of {budget_secs}s")]
    RetryExhausted {
        step: String,
        budget_secs: u64,
        #[source]
        cause: Option<Box<StepError>>,
    },
}

impl StepError {
    /// Whether this failure should trigger a session reinitialization
    /// before the next retry attempt.
    pub fn is_session_loss(&self) -> bool {
        matches!(
            self,
            StepError::SessionUnreachable(_) | StepError::Surface(SurfaceError::Unreachable(_))
        )
    }
}

/// Load-time configuration shape violations. These never reach the
/// interpreter; the suite loader rejects the document up front.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse suite yaml: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("failed to parse dataset {path}: {message}")]
    Dataset { path: PathBuf, message: String },

    #[error("unsupported dataset format: {0}")]
    UnsupportedDatasetFormat(PathBuf),

    #[error("test '{test}' {kind} indices must be contiguous from 1: expected {expected}, found {found}")]
    NonContiguousIndex {
        test: String,
        kind: &'static str,
        expected: u32,
        found: u32,
    },

    #[error("test '{test}' action {index}: check instructions need both ifTrueNext and ifFalseNext")]
    IncompleteBranch { test: String, index: u32 },

    #[error("test '{test}' {kind} {index} references unknown page '{page}'")]
    UnknownPage {
        test: String,
        kind: &'static str,
        index: u32,
        page: String,
    },

    #[error("test '{test}' {kind} {index} references unknown element '{element}' on page '{page}'")]
    UnknownElement {
        test: String,
        kind: &'static str,
        index: u32,
        page: String,
        element: String,
    },

    #[error("page '{page}' element '{element}' has no locator candidates")]
    EmptyLocatorList { page: String, element: String },
}
