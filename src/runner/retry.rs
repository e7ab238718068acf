use std::time::Instant;

use log::{debug, error, info, warn};

use super::scenario::Scenario;
use super::state::StepOutcome;
use crate::error::StepError;
use crate::parser::types::{ActionRecord, AssertionRecord, DatasetRow};

/// One logical step the retry wrapper can drive: a page navigation,
/// one action, or one assertion.
#[derive(Clone, Copy)]
pub(crate) enum Step<'a> {
    OpenPage {
        page: &'a str,
    },
    Action {
        record: &'a ActionRecord,
        row: Option<&'a DatasetRow>,
    },
    Assertion {
        record: &'a AssertionRecord,
        row: Option<&'a DatasetRow>,
    },
}

impl Scenario {
    /// Run one step until it succeeds or its retry budget
    /// (`max_attempts * (delay_seconds + 1)` seconds) is spent.
    ///
    /// Session loss reinitializes the session and starts another cycle
    /// without being recorded as a cause; every other failure becomes
    /// the "last cause" that the aggregated [`StepError::RetryExhausted`]
    /// wraps when the budget runs out.
    pub(crate) async fn with_retry(
        &mut self,
        description: &str,
        step: Step<'_>,
    ) -> Result<StepOutcome, StepError> {
        let policy = self.suite.settings.retry;
        let budget = policy.budget();
        let started = Instant::now();
        let mut last_cause: Option<StepError> = None;

        info!("attempting step: {description}");
        loop {
            match self.run_step(step).await {
                Ok(outcome) => {
                    debug!("step succeeded: {description}");
                    return Ok(outcome);
                }
                Err(err) if err.is_session_loss() => {
                    warn!("session lost during '{description}', reinitializing: {err}");
                    self.reinitialize_session().await?;
                }
                Err(err) => {
                    warn!("attempt failed for '{description}': {err}");
                    last_cause = Some(err);
                }
            }
            if started.elapsed() >= budget {
                error!(
                    "step '{description}' exhausted its retry budget of {}s",
                    budget.as_secs()
                );
                return Err(StepError::RetryExhausted {
                    step: description.to_string(),
                    budget_secs: budget.as_secs(),
                    cause: last_cause.map(Box::new),
                });
            }
            tokio::time::sleep(policy.delay()).await;
        }
    }

    async fn run_step(&mut self, step: Step<'_>) -> Result<StepOutcome, StepError> {
        match step {
            Step::OpenPage { page } => {
                self.do_open_page(page).await?;
                Ok(StepOutcome::Advance)
            }
            Step::Action { record, row } => self.execute_action(record, row).await,
            Step::Assertion { record, row } => {
                self.evaluate_assertion(record, row).await?;
                Ok(StepOutcome::Advance)
            }
        }
    }

    /// Tear down and recreate the automation session. Cached element
    /// handles all point into the dead session, so the table goes too.
    /// A failure here is fatal; it escapes the retry loop directly.
    pub(crate) async fn reinitialize_session(&mut self) -> Result<(), StepError> {
        self.surface.reset().await?;
        self.handles.clear();
        Ok(())
    }
}
