use std::path::PathBuf;
use std::time::{Duration, Instant};

use log::{debug, info, warn};

use super::scenario::Scenario;
use super::state::StepOutcome;
use super::{
    not_yet, poll_until, CONFIRM_INTERVAL, CONFIRM_TIMEOUT, CONSUME_POLL, INTERACT_TIMEOUT,
    POLL_INTERVAL,
};
use crate::driver::traits::ElementHandle;
use crate::error::StepError;
use crate::parser::types::{ActionRecord, Condition, DatasetRow, Operation};

impl Scenario {
    /// Execute one instruction. Most operations advance the pointer;
    /// check instructions return an explicit jump.
    pub(crate) async fn execute_action(
        &mut self,
        record: &ActionRecord,
        row: Option<&DatasetRow>,
    ) -> Result<StepOutcome, StepError> {
        self.apply_wait(
            record.wait.as_ref(),
            record.page.as_deref(),
            record.element.as_deref(),
            row,
        )
        .await?;

        match record.operation {
            Operation::EnterText => {
                let text = self
                    .params
                    .resolve(self.require_field(record.value.as_deref(), "value")?, row);
                let handle = self.target_handle(record, row).await?;
                self.ensure_interactable(&handle).await?;
                self.surface.clear(&handle).await?;
                self.surface.enter_text(&handle, &text).await?;
                // Surface mutations are not guaranteed synchronous;
                // confirm the value landed before moving on.
                let surface = self.surface.as_ref();
                let handle_ref = &handle;
                let expected = text.as_str();
                self.confirm("entered text applied", move || async move {
                    match surface.attribute(handle_ref, "value").await {
                        Ok(value) => Ok(value.as_deref() == Some(expected)),
                        Err(err) => not_yet(err),
                    }
                })
                .await?;
                Ok(StepOutcome::Advance)
            }
            Operation::Click => {
                let handle = self.target_handle(record, row).await?;
                self.ensure_interactable(&handle).await?;
                self.surface.click(&handle).await?;
                if let Some(target) = &record.target_page {
                    let target = target.clone();
                    let timeout = self.step_timeout(record.wait.as_ref());
                    self.await_page(&target, row, timeout).await?;
                }
                Ok(StepOutcome::Advance)
            }
            Operation::SelectOption => {
                let label = self
                    .params
                    .resolve(self.require_field(record.value.as_deref(), "value")?, row);
                let handle = self.target_handle(record, row).await?;
                self.ensure_interactable(&handle).await?;
                self.surface.select_option(&handle, &label).await?;
                let surface = self.surface.as_ref();
                let handle_ref = &handle;
                let expected = label.as_str();
                self.confirm("option selected", move || async move {
                    match surface.selected_option(handle_ref).await {
                        Ok(selected) => Ok(selected == expected),
                        Err(err) => not_yet(err),
                    }
                })
                .await?;
                Ok(StepOutcome::Advance)
            }
            Operation::Hover => {
                let handle = self.target_handle(record, row).await?;
                self.surface.hover(&handle).await?;
                Ok(StepOutcome::Advance)
            }
            Operation::Clear => {
                let handle = self.target_handle(record, row).await?;
                self.ensure_interactable(&handle).await?;
                self.surface.clear(&handle).await?;
                let surface = self.surface.as_ref();
                let handle_ref = &handle;
                self.confirm("field cleared", move || async move {
                    match surface.attribute(handle_ref, "value").await {
                        Ok(value) => Ok(value.as_deref().unwrap_or_default().is_empty()),
                        Err(err) => not_yet(err),
                    }
                })
                .await?;
                Ok(StepOutcome::Advance)
            }
            Operation::Submit => {
                let handle = self.target_handle(record, row).await?;
                self.ensure_interactable(&handle).await?;
                self.surface.submit(&handle).await?;
                Ok(StepOutcome::Advance)
            }
            Operation::DoubleClick => {
                let handle = self.target_handle(record, row).await?;
                self.ensure_interactable(&handle).await?;
                self.surface.double_click(&handle).await?;
                Ok(StepOutcome::Advance)
            }
            Operation::Navigate => {
                let target = self.require_field(record.target_page.as_deref(), "targetPage")?;
                let timeout = self.step_timeout(record.wait.as_ref());
                if record.element.is_some() {
                    // A trigger element is configured: the click drives
                    // the navigation, no direct URL load.
                    let handle = self.target_handle(record, row).await?;
                    self.ensure_interactable(&handle).await?;
                    self.surface.click(&handle).await?;
                    self.await_page(target, row, timeout).await?;
                } else {
                    self.navigate_to(target, row, timeout).await?;
                }
                Ok(StepOutcome::Advance)
            }
            Operation::Check => self.execute_check(record, row).await,
            Operation::SaveState => {
                let key = self.require_field(record.state_key.as_deref(), "stateKey")?;
                let state = self.surface.session_state().await?;
                debug!("saved session state under key '{key}'");
                self.saved_states.insert(key.to_string(), state);
                Ok(StepOutcome::Advance)
            }
            Operation::LoadState => {
                let key = self.require_field(record.state_key.as_deref(), "stateKey")?;
                match self.saved_states.get(key).cloned() {
                    Some(state) => {
                        self.surface.restore_session_state(&state).await?;
                        self.surface.refresh().await?;
                        // Everything resolved before the reload is stale.
                        self.handles.clear();
                    }
                    None => {
                        warn!("no saved session state under key '{key}', skipping restore");
                    }
                }
                Ok(StepOutcome::Advance)
            }
            Operation::Produce => {
                if !self.suite.settings.broker_enabled {
                    warn!("broker disabled in settings, skipping produce");
                    return Ok(StepOutcome::Advance);
                }
                let fields = record
                    .broker
                    .as_ref()
                    .ok_or(StepError::MissingField("broker"))?;
                let topic = self.params.resolve(&fields.topic, row);
                let key = self
                    .params
                    .resolve_opt(fields.key.as_deref(), row)
                    .unwrap_or_default();
                let value = self
                    .params
                    .resolve(self.require_field(fields.value.as_deref(), "value")?, row);
                let broker = self.broker.as_mut().ok_or(StepError::BrokerUnavailable)?;
                broker.publish(&topic, &key, &value).await?;
                broker.flush().await?;
                info!("published message to topic '{topic}'");
                Ok(StepOutcome::Advance)
            }
            Operation::Consume => self.execute_consume(record, row).await,
            Operation::HttpCall => self.execute_http(record, row).await,
            Operation::UploadFile => {
                let raw = self
                    .params
                    .resolve(self.require_field(record.value.as_deref(), "value")?, row);
                let path = PathBuf::from(raw);
                if !path.exists() {
                    return Err(StepError::FileNotFound(path));
                }
                let handle = self.target_handle(record, row).await?;
                self.surface.upload(&handle, &path).await?;
                Ok(StepOutcome::Advance)
            }
            Operation::Unknown => Err(StepError::UnsupportedOperation),
        }
    }

    /// Navigation entry used by `Step::OpenPage`.
    pub(crate) async fn do_open_page(&mut self, page_id: &str) -> Result<(), StepError> {
        let timeout = self.default_timeout();
        self.navigate_to(page_id, None, timeout).await
    }

    /// Load a configured page and wait for the surface to land on it.
    pub(crate) async fn navigate_to(
        &mut self,
        page_id: &str,
        row: Option<&DatasetRow>,
        timeout: Duration,
    ) -> Result<(), StepError> {
        let path = self.page_path(page_id)?;
        let base = self.suite.settings.base_url.trim_end_matches('/').to_string();
        let url = format!("{base}{path}");
        info!("navigating to {url}");
        self.surface.goto(&url).await?;
        self.await_page(page_id, row, timeout).await
    }

    /// Wait for the surface's location to report the page's path, then
    /// prime its element handle table.
    async fn await_page(
        &mut self,
        page_id: &str,
        row: Option<&DatasetRow>,
        timeout: Duration,
    ) -> Result<(), StepError> {
        let path = self.page_path(page_id)?;
        let surface = self.surface.as_ref();
        let path_ref = path.as_str();
        let landed = poll_until(timeout, POLL_INTERVAL, move || async move {
            match surface.current_url().await {
                Ok(url) => Ok(url.contains(path_ref)),
                Err(err) => not_yet(err),
            }
        })
        .await?;
        if !landed {
            return Err(StepError::WaitTimeout {
                predicate: format!("location contains '{path}'"),
                timeout_secs: timeout.as_secs(),
            });
        }
        // Handles resolved before the page change point into the old
        // document.
        self.handles.clear();
        self.prime_page(page_id, row).await
    }

    fn page_path(&self, page_id: &str) -> Result<String, StepError> {
        self.suite
            .pages
            .get(page_id)
            .map(|page| page.path.clone())
            .ok_or_else(|| StepError::UnknownPage(page_id.to_string()))
    }

    /// Evaluate a check instruction's condition and pick its branch.
    /// The condition makes one non-waiting pass over the element's
    /// candidates; waiting belongs to the record's wait spec.
    async fn execute_check(
        &mut self,
        record: &ActionRecord,
        row: Option<&DatasetRow>,
    ) -> Result<StepOutcome, StepError> {
        let condition = record
            .condition
            .ok_or(StepError::MissingField("condition"))?;
        let page = self.require_field(record.page.as_deref(), "page")?;
        let element = self.require_field(record.element.as_deref(), "element")?;
        let matches = self.peek_candidates(page, element, row).await?;

        let surface = self.surface.as_ref();
        let holds = match condition {
            Condition::Present => !matches.is_empty(),
            Condition::Visible => match matches.first() {
                Some(handle) => surface.is_displayed(handle).await.or_else(not_yet)?,
                None => false,
            },
            Condition::Enabled => match matches.first() {
                Some(handle) => surface.is_enabled(handle).await.or_else(not_yet)?,
                None => false,
            },
            Condition::Unknown => return Err(StepError::UnsupportedCondition),
        };

        let next = if holds {
            record.if_true_next.ok_or(StepError::MissingField("ifTrueNext"))?
        } else {
            record.if_false_next.ok_or(StepError::MissingField("ifFalseNext"))?
        };
        debug!(
            "check {:?} on '{element}' evaluated {holds}, continuing at {next}",
            condition
        );
        Ok(StepOutcome::Jump(next))
    }

    /// Consume from a topic until a matching message arrives or the
    /// step's time bound runs out. Subscribes on first use of a topic.
    async fn execute_consume(
        &mut self,
        record: &ActionRecord,
        row: Option<&DatasetRow>,
    ) -> Result<StepOutcome, StepError> {
        if !self.suite.settings.broker_enabled {
            warn!("broker disabled in settings, skipping consume");
            return Ok(StepOutcome::Advance);
        }
        let fields = record
            .broker
            .as_ref()
            .ok_or(StepError::MissingField("broker"))?;
        let topic = self.params.resolve(&fields.topic, row);
        let expected_key = self.params.resolve_opt(fields.key.as_deref(), row);
        let expected_fragment = self.params.resolve_opt(fields.value_contains.as_deref(), row);
        let timeout = self.step_timeout(record.wait.as_ref());

        let broker = self.broker.as_mut().ok_or(StepError::BrokerUnavailable)?;
        if !self.subscribed.contains(&topic) {
            broker.subscribe(&topic).await?;
            self.subscribed.insert(topic.clone());
        }

        let started = Instant::now();
        loop {
            let batch = broker.poll(CONSUME_POLL).await?;
            for message in batch {
                if message.topic != topic {
                    continue;
                }
                if let Some(key) = &expected_key {
                    if &message.key != key {
                        continue;
                    }
                }
                if let Some(fragment) = &expected_fragment {
                    if !message.value.contains(fragment.as_str()) {
                        continue;
                    }
                }
                info!("matched message on topic '{topic}' with key '{}'", message.key);
                return Ok(StepOutcome::Advance);
            }
            if started.elapsed() >= timeout {
                return Err(StepError::BrokerConsumeTimeout {
                    topic,
                    timeout_secs: timeout.as_secs(),
                });
            }
        }
    }

    /// Fire a templated HTTP request; any non-success status fails the
    /// step.
    async fn execute_http(
        &mut self,
        record: &ActionRecord,
        row: Option<&DatasetRow>,
    ) -> Result<StepOutcome, StepError> {
        let fields = record.http.as_ref().ok_or(StepError::MissingField("http"))?;
        let method = reqwest::Method::from_bytes(fields.method.to_uppercase().as_bytes())
            .map_err(|_| StepError::HttpCallFailed(format!("invalid method '{}'", fields.method)))?;
        let url = self.params.resolve(&fields.url, row);

        let mut request = self.http.request(method, url.as_str());
        let mut has_content_type = false;
        for (name, value) in &fields.headers {
            if name.eq_ignore_ascii_case("content-type") {
                has_content_type = true;
            }
            request = request.header(name, self.params.resolve(value, row));
        }
        if let Some(body) = &fields.body {
            if !has_content_type {
                request = request.header("Content-Type", "application/json");
            }
            request = request.body(self.params.resolve(body, row));
        }

        let response = request
            .send()
            .await
            .map_err(|err| StepError::HttpCallFailed(err.to_string()))?;
        let status = response.status();
        if !status.is_success() {
            return Err(StepError::HttpCallFailed(format!(
                "{url} returned {status}"
            )));
        }
        info!("http call to {url} returned {status}");
        Ok(StepOutcome::Advance)
    }

    async fn target_handle(
        &mut self,
        record: &ActionRecord,
        row: Option<&DatasetRow>,
    ) -> Result<ElementHandle, StepError> {
        let page = self.require_field(record.page.as_deref(), "page")?;
        let element = self.require_field(record.element.as_deref(), "element")?;
        self.resolve_element(page, element, row).await
    }

    /// Interactions against a hidden or disabled element silently do
    /// nothing on some surfaces; hold until it is ready.
    async fn ensure_interactable(&self, handle: &ElementHandle) -> Result<(), StepError> {
        let surface = self.surface.as_ref();
        let ready = poll_until(INTERACT_TIMEOUT, POLL_INTERVAL, move || async move {
            match surface.is_displayed(handle).await {
                Ok(true) => surface.is_enabled(handle).await.or_else(not_yet),
                Ok(false) => Ok(false),
                Err(err) => not_yet(err),
            }
        })
        .await?;
        if ready {
            Ok(())
        } else {
            Err(StepError::WaitTimeout {
                predicate: "element interactable".to_string(),
                timeout_secs: INTERACT_TIMEOUT.as_secs(),
            })
        }
    }

    async fn confirm<F, Fut>(&self, what: &str, probe: F) -> Result<(), StepError>
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = Result<bool, StepError>>,
    {
        if poll_until(CONFIRM_TIMEOUT, CONFIRM_INTERVAL, probe).await? {
            Ok(())
        } else {
            Err(StepError::WaitTimeout {
                predicate: what.to_string(),
                timeout_secs: CONFIRM_TIMEOUT.as_secs(),
            })
        }
    }
}
