use log::debug;

use super::scenario::Scenario;
use super::{not_yet, poll_until, POLL_INTERVAL};
use crate::error::StepError;
use crate::parser::types::{DatasetRow, WaitKind, WaitSpec};

impl Scenario {
    /// Hold the step until its wait predicate reports true, within the
    /// wait's own timeout (or the suite default). No spec, or a spec
    /// that only overrides the timeout, holds nothing.
    pub(crate) async fn apply_wait(
        &mut self,
        wait: Option<&WaitSpec>,
        page_id: Option<&str>,
        element_id: Option<&str>,
        row: Option<&DatasetRow>,
    ) -> Result<(), StepError> {
        let Some(spec) = wait else {
            return Ok(());
        };
        let Some(kind) = spec.predicate else {
            return Ok(());
        };
        let timeout = self.step_timeout(wait);

        let satisfied = match kind {
            WaitKind::Visible => {
                let handle = self.wait_element(page_id, element_id, row).await?;
                let surface = self.surface.as_ref();
                let handle = &handle;
                poll_until(timeout, POLL_INTERVAL, move || async move {
                    surface.is_displayed(handle).await.or_else(not_yet)
                })
                .await?
            }
            WaitKind::Clickable => {
                let handle = self.wait_element(page_id, element_id, row).await?;
                let surface = self.surface.as_ref();
                let handle = &handle;
                poll_until(timeout, POLL_INTERVAL, move || async move {
                    match surface.is_displayed(handle).await {
                        Ok(true) => surface.is_enabled(handle).await.or_else(not_yet),
                        Ok(false) => Ok(false),
                        Err(err) => not_yet(err),
                    }
                })
                .await?
            }
            WaitKind::Present => {
                let page = self.require_field(page_id, "page")?;
                let target =
                    self.primary_descriptor(page, self.require_field(element_id, "element")?, row)?;
                let surface = self.surface.as_ref();
                let target = &target;
                poll_until(timeout, POLL_INTERVAL, move || async move {
                    match surface.find(target).await {
                        Ok(matches) => Ok(!matches.is_empty()),
                        Err(err) => not_yet(err),
                    }
                })
                .await?
            }
            WaitKind::Invisible => {
                // Gone from the page or present but hidden both count.
                let page = self.require_field(page_id, "page")?;
                let target =
                    self.primary_descriptor(page, self.require_field(element_id, "element")?, row)?;
                let surface = self.surface.as_ref();
                let target = &target;
                poll_until(timeout, POLL_INTERVAL, move || async move {
                    let matches = match surface.find(target).await {
                        Ok(matches) => matches,
                        Err(err) => return not_yet(err),
                    };
                    match matches.first() {
                        None => Ok(true),
                        Some(handle) => match surface.is_displayed(handle).await {
                            Ok(displayed) => Ok(!displayed),
                            Err(err) => not_yet(err),
                        },
                    }
                })
                .await?
            }
            WaitKind::Stale => {
                let handle = self.wait_element(page_id, element_id, row).await?;
                let surface = self.surface.as_ref();
                let handle = &handle;
                poll_until(timeout, POLL_INTERVAL, move || async move {
                    surface.is_stale(handle).await.or_else(not_yet)
                })
                .await?
            }
            WaitKind::UrlContains => {
                let fragment = spec
                    .url_fragment
                    .as_deref()
                    .ok_or(StepError::MissingField("urlFragment"))?;
                let fragment = self.params.resolve(fragment, row);
                let surface = self.surface.as_ref();
                let fragment = fragment.as_str();
                poll_until(timeout, POLL_INTERVAL, move || async move {
                    match surface.current_url().await {
                        Ok(url) => Ok(url.contains(fragment)),
                        Err(err) => not_yet(err),
                    }
                })
                .await?
            }
            WaitKind::TextPresent => {
                let needle = spec
                    .text
                    .as_deref()
                    .ok_or(StepError::MissingField("text"))?;
                let needle = self.params.resolve(needle, row);
                let handle = self.wait_element(page_id, element_id, row).await?;
                let surface = self.surface.as_ref();
                let handle = &handle;
                let needle = needle.as_str();
                poll_until(timeout, POLL_INTERVAL, move || async move {
                    match surface.text(handle).await {
                        Ok(text) => Ok(text.contains(needle)),
                        Err(err) => not_yet(err),
                    }
                })
                .await?
            }
            WaitKind::Custom => {
                let script = spec
                    .script
                    .as_deref()
                    .ok_or(StepError::MissingField("script"))?;
                let script = self.params.resolve(script, row);
                let surface = self.surface.as_ref();
                let script = script.as_str();
                poll_until(timeout, POLL_INTERVAL, move || async move {
                    surface.eval_probe(script).await.or_else(not_yet)
                })
                .await?
            }
            WaitKind::Unknown => return Err(StepError::UnsupportedWait),
        };

        if satisfied {
            debug!("wait {kind:?} satisfied");
            Ok(())
        } else {
            Err(StepError::WaitTimeout {
                predicate: format!("{kind:?}"),
                timeout_secs: timeout.as_secs(),
            })
        }
    }

    pub(crate) fn require_field<'a>(
        &self,
        value: Option<&'a str>,
        name: &'static str,
    ) -> Result<&'a str, StepError> {
        value.ok_or(StepError::MissingField(name))
    }

    async fn wait_element(
        &mut self,
        page_id: Option<&str>,
        element_id: Option<&str>,
        row: Option<&DatasetRow>,
    ) -> Result<crate::driver::traits::ElementHandle, StepError> {
        let page_id = self.require_field(page_id, "page")?;
        let element_id = self.require_field(element_id, "element")?;
        self.resolve_element(page_id, element_id, row).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::memory::{MemoryElement, MemorySurface};
    use crate::driver::traits::{Surface, Target};
    use crate::parser::yaml::parse_suite;

    fn suite() -> crate::parser::types::Suite {
        parse_suite(
            r#"
settings:
  baseUrl: http://app.local
  defaultTimeoutSecs: 1
pages:
  checkout:
    path: /checkout
    elements:
      spinner:
        locators:
          - ordinal: 1
            strategy: id
            value: spinner
      total:
        locators:
          - ordinal: 1
            strategy: id
            value: total
"#,
        )
        .unwrap()
    }

    fn spec(kind: WaitKind) -> WaitSpec {
        WaitSpec {
            predicate: Some(kind),
            timeout_secs: Some(1),
            url_fragment: None,
            text: None,
            script: None,
        }
    }

    async fn scenario_on_checkout(surface: MemorySurface) -> Scenario {
        surface.goto("http://app.local/checkout").await.unwrap();
        Scenario::new(suite(), Box::new(surface))
    }

    #[tokio::test]
    async fn test_visible_wait_passes_for_displayed_element() {
        let surface = MemorySurface::new();
        surface.add_page(
            "/checkout",
            vec![MemoryElement::new("total").target(Target::Id("total".into()))],
        );
        let mut scenario = scenario_on_checkout(surface).await;
        scenario
            .apply_wait(Some(&spec(WaitKind::Visible)), Some("checkout"), Some("total"), None)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_invisible_wait_times_out_while_displayed() {
        let surface = MemorySurface::new();
        surface.add_page(
            "/checkout",
            vec![MemoryElement::new("spinner").target(Target::Id("spinner".into()))],
        );
        let mut scenario = scenario_on_checkout(surface).await;
        let err = scenario
            .apply_wait(Some(&spec(WaitKind::Invisible)), Some("checkout"), Some("spinner"), None)
            .await
            .unwrap_err();
        assert!(matches!(err, StepError::WaitTimeout { .. }));
    }

    #[tokio::test]
    async fn test_invisible_wait_passes_once_hidden() {
        let surface = MemorySurface::new();
        surface.add_page(
            "/checkout",
            vec![MemoryElement::new("spinner")
                .target(Target::Id("spinner".into()))
                .hidden()],
        );
        let mut scenario = scenario_on_checkout(surface).await;
        scenario
            .apply_wait(Some(&spec(WaitKind::Invisible)), Some("checkout"), Some("spinner"), None)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_clickable_wait_times_out_for_disabled_element() {
        let surface = MemorySurface::new();
        surface.add_page(
            "/checkout",
            vec![MemoryElement::new("total")
                .target(Target::Id("total".into()))
                .disabled()],
        );
        let mut scenario = scenario_on_checkout(surface).await;
        let err = scenario
            .apply_wait(Some(&spec(WaitKind::Clickable)), Some("checkout"), Some("total"), None)
            .await
            .unwrap_err();
        assert!(matches!(err, StepError::WaitTimeout { .. }));
    }

    #[tokio::test]
    async fn test_url_contains_wait_resolves_placeholders() {
        let surface = MemorySurface::new();
        surface.add_page("/checkout", vec![]);
        let mut scenario = scenario_on_checkout(surface).await;

        let mut row = DatasetRow::new();
        row.insert("section".to_string(), "checkout".to_string());
        let mut wait = spec(WaitKind::UrlContains);
        wait.url_fragment = Some("/${data.section}".to_string());
        scenario
            .apply_wait(Some(&wait), Some("checkout"), None, None)
            .await
            .unwrap_err();
        scenario
            .apply_wait(Some(&wait), Some("checkout"), None, Some(&row))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_custom_wait_reads_probe_result() {
        let surface = MemorySurface::new();
        surface.add_page("/checkout", vec![]);
        surface.set_probe("return window.ready", true);
        let mut scenario = scenario_on_checkout(surface).await;

        let mut wait = spec(WaitKind::Custom);
        wait.script = Some("return window.ready".to_string());
        scenario
            .apply_wait(Some(&wait), Some("checkout"), None, None)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_timeout_only_spec_holds_nothing() {
        let surface = MemorySurface::new();
        surface.add_page("/checkout", vec![]);
        let mut scenario = scenario_on_checkout(surface).await;

        let wait = WaitSpec {
            predicate: None,
            timeout_secs: Some(30),
            url_fragment: None,
            text: None,
            script: None,
        };
        scenario
            .apply_wait(Some(&wait), Some("checkout"), None, None)
            .await
            .unwrap();
    }
}
