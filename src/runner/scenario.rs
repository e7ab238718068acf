use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use log::{error, info};

use super::params::ParamResolver;
use super::retry::Step;
use super::state::RunState;
use crate::driver::traits::{ElementHandle, MessageBroker, SessionState, Surface};
use crate::error::StepError;
use crate::parser::types::{
    ActionRecord, AssertionRecord, DatasetRow, RowFailurePolicy, Suite, WaitSpec,
};

/// One scenario execution: a live session plus the interpreter state
/// that belongs to it. Scenarios are independent; run several
/// concurrently by constructing several, each with its own surface,
/// broker client and HTTP client.
pub struct Scenario {
    pub(crate) suite: Arc<Suite>,
    pub(crate) surface: Box<dyn Surface>,
    pub(crate) broker: Option<Box<dyn MessageBroker>>,
    pub(crate) http: reqwest::Client,
    pub(crate) params: ParamResolver,

    /// Per-page element handle table. Primed on navigation, filled in
    /// as further elements resolve, cleared on page changes and
    /// session reinitialization; never shared across scenarios.
    pub(crate) handles: HashMap<String, HashMap<String, ElementHandle>>,

    /// Named session snapshots; discarded with the scenario.
    pub(crate) saved_states: HashMap<String, SessionState>,

    /// Topics this scenario's broker client already subscribed to.
    pub(crate) subscribed: HashSet<String>,
}

impl Scenario {
    pub fn new(suite: Suite, surface: Box<dyn Surface>) -> Self {
        let params = ParamResolver::new(suite.params.clone());
        Scenario {
            suite: Arc::new(suite),
            surface,
            broker: None,
            http: reqwest::Client::new(),
            params,
            handles: HashMap::new(),
            saved_states: HashMap::new(),
            subscribed: HashSet::new(),
        }
    }

    pub fn with_broker(mut self, broker: Box<dyn MessageBroker>) -> Self {
        self.broker = Some(broker);
        self
    }

    pub fn suite(&self) -> &Suite {
        &self.suite
    }

    pub(crate) fn default_timeout(&self) -> Duration {
        self.suite.settings.default_timeout()
    }

    /// Effective time bound for one step: the record's own wait timeout
    /// when present, else the process-wide default.
    pub(crate) fn step_timeout(&self, wait: Option<&WaitSpec>) -> Duration {
        wait.and_then(|w| w.timeout_secs)
            .map(Duration::from_secs)
            .unwrap_or_else(|| self.default_timeout())
    }

    /// Entry point: navigate the session to a named page and load its
    /// element table.
    pub async fn open_page(&mut self, page_id: &str) -> Result<(), StepError> {
        if !self.suite.pages.contains_key(page_id) {
            return Err(StepError::UnknownPage(page_id.to_string()));
        }
        let description = format!("navigate to page '{page_id}'");
        self.with_retry(&description, Step::OpenPage { page: page_id })
            .await?;
        Ok(())
    }

    /// Entry point: execute a named test script, replaying it once per
    /// dataset row when the test is bound to a dataset.
    pub async fn run_test(&mut self, test_id: &str) -> Result<(), StepError> {
        let suite = Arc::clone(&self.suite);
        let test = suite
            .tests
            .get(test_id)
            .ok_or_else(|| StepError::UnknownTest(test_id.to_string()))?;

        let Some(rows) = &test.dataset else {
            info!("executing test '{test_id}'");
            return self.run_script(&test.actions, None).await;
        };

        let mut first_failure: Option<StepError> = None;
        for (row_number, row) in rows.iter().enumerate() {
            info!(
                "executing test '{}' with row {}/{}",
                test_id,
                row_number + 1,
                rows.len()
            );
            if test.reset_session_per_row {
                self.reinitialize_session().await?;
                if let Some(start_page) = &test.start_page {
                    self.open_page(start_page).await?;
                }
            }
            if let Err(err) = self.run_script(&test.actions, Some(row)).await {
                match test.on_row_failure {
                    RowFailurePolicy::Abort => return Err(err),
                    RowFailurePolicy::Continue => {
                        error!("row {} of test '{}' failed: {err}", row_number + 1, test_id);
                        first_failure.get_or_insert(err);
                    }
                }
            }
        }
        match first_failure {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    /// Entry point: evaluate a named test's expected outcomes, once per
    /// dataset row when a dataset is bound.
    pub async fn verify_test(&mut self, test_id: &str) -> Result<(), StepError> {
        let suite = Arc::clone(&self.suite);
        let test = suite
            .tests
            .get(test_id)
            .ok_or_else(|| StepError::UnknownTest(test_id.to_string()))?;

        match &test.dataset {
            None => self.verify_script(&test.assertions, None).await,
            Some(rows) => {
                for (row_number, row) in rows.iter().enumerate() {
                    info!(
                        "verifying test '{}' with row {}/{}",
                        test_id,
                        row_number + 1,
                        rows.len()
                    );
                    self.verify_script(&test.assertions, Some(row)).await?;
                }
                Ok(())
            }
        }
    }

    /// Opaque visual capture of the live surface, for the reporting
    /// collaborator to attach on failure.
    pub async fn capture_surface(&self) -> Result<Vec<u8>, StepError> {
        Ok(self.surface.screenshot().await?)
    }

    /// Drive one script through the state machine: sequential advance,
    /// explicit jumps from check instructions, terminal success at the
    /// end of the list. Failures from the retry wrapper abort the
    /// current replay.
    async fn run_script(
        &mut self,
        actions: &[ActionRecord],
        row: Option<&DatasetRow>,
    ) -> Result<(), StepError> {
        let mut state = if actions.is_empty() {
            RunState::Succeeded
        } else {
            RunState::Running(0)
        };
        while let RunState::Running(pointer) = state {
            let record = &actions[pointer];
            let outcome = self
                .with_retry(&record.describe(), Step::Action { record, row })
                .await?;
            state = state.transition(outcome, actions.len())?;
        }
        Ok(())
    }

    /// Assertions are a flat sequential list; no branching instruction.
    async fn verify_script(
        &mut self,
        assertions: &[AssertionRecord],
        row: Option<&DatasetRow>,
    ) -> Result<(), StepError> {
        for record in assertions {
            self.with_retry(&record.describe(), Step::Assertion { record, row })
                .await?;
        }
        Ok(())
    }
}
