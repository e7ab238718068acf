use log::{debug, warn};

use super::scenario::Scenario;
use super::{poll_until, POLL_INTERVAL};
use crate::driver::traits::{ElementHandle, Target};
use crate::error::StepError;
use crate::parser::types::{DatasetRow, LocatorCandidate};

impl Scenario {
    /// Resolve one element to a live handle and record it in the
    /// owning page's handle table.
    pub(crate) async fn resolve_element(
        &mut self,
        page_id: &str,
        element_id: &str,
        row: Option<&DatasetRow>,
    ) -> Result<ElementHandle, StepError> {
        let suite = std::sync::Arc::clone(&self.suite);
        let element = suite
            .pages
            .get(page_id)
            .ok_or_else(|| StepError::UnknownPage(page_id.to_string()))?
            .elements
            .get(element_id)
            .ok_or_else(|| StepError::UnknownElement {
                page: page_id.to_string(),
                element: element_id.to_string(),
            })?;
        let handle = self
            .try_candidates(page_id, element_id, &element.locators, row)
            .await?;
        self.handles
            .entry(page_id.to_string())
            .or_default()
            .insert(element_id.to_string(), handle.clone());
        Ok(handle)
    }

    /// Warm the page's handle table after a navigation with whatever
    /// resolves right now: one find per candidate, no polling. An
    /// element not rendered yet stays out of the table and resolves
    /// on first use rather than failing the navigation.
    pub(crate) async fn prime_page(
        &mut self,
        page_id: &str,
        row: Option<&DatasetRow>,
    ) -> Result<(), StepError> {
        let suite = std::sync::Arc::clone(&self.suite);
        let page = suite
            .pages
            .get(page_id)
            .ok_or_else(|| StepError::UnknownPage(page_id.to_string()))?;

        let mut table = std::collections::HashMap::new();
        for (element_id, element) in &page.elements {
            let mut matches = self.scan_once(element_id, &element.locators, row).await?;
            match matches.drain(..).next() {
                Some(handle) => {
                    table.insert(element_id.clone(), handle);
                }
                None => debug!("element '{element_id}' not rendered yet, deferring to first use"),
            };
        }
        self.handles.insert(page_id.to_string(), table);
        debug!("primed handle table for page '{page_id}'");
        Ok(())
    }

    /// Current matches for an element without waiting: one pass over
    /// its candidates in ascending ordinal, first descriptor with a
    /// live match wins. An empty result means "not on the page right
    /// now", not a failure.
    pub(crate) async fn peek_candidates(
        &self,
        page_id: &str,
        element_id: &str,
        row: Option<&DatasetRow>,
    ) -> Result<Vec<ElementHandle>, StepError> {
        let element = self
            .suite
            .pages
            .get(page_id)
            .ok_or_else(|| StepError::UnknownPage(page_id.to_string()))?
            .elements
            .get(element_id)
            .ok_or_else(|| StepError::UnknownElement {
                page: page_id.to_string(),
                element: element_id.to_string(),
            })?;
        self.scan_once(element_id, &element.locators, row).await
    }

    async fn scan_once(
        &self,
        element_id: &str,
        candidates: &[LocatorCandidate],
        row: Option<&DatasetRow>,
    ) -> Result<Vec<ElementHandle>, StepError> {
        let surface = self.surface.as_ref();
        for candidate in candidates {
            let resolved = self.params.resolve(&candidate.value, row);
            let target = candidate.strategy.descriptor(resolved);
            match surface.find(&target).await {
                Ok(matches) if !matches.is_empty() => return Ok(matches),
                Ok(_) => {}
                Err(err) => {
                    let err: StepError = err.into();
                    if err.is_session_loss() {
                        return Err(err);
                    }
                    warn!(
                        "candidate {target} for element '{element_id}' failed ({err}), trying next"
                    );
                }
            }
        }
        Ok(Vec::new())
    }

    pub(crate) fn cached_handle(
        &self,
        page_id: &str,
        element_id: &str,
    ) -> Result<ElementHandle, StepError> {
        self.handles
            .get(page_id)
            .and_then(|table| table.get(element_id))
            .cloned()
            .ok_or_else(|| StepError::UnknownElement {
                page: page_id.to_string(),
                element: element_id.to_string(),
            })
    }

    /// Concrete descriptor for the element's first locator candidate,
    /// used where a descriptor is needed rather than a handle (waits,
    /// count probes).
    pub(crate) fn primary_descriptor(
        &self,
        page_id: &str,
        element_id: &str,
        row: Option<&DatasetRow>,
    ) -> Result<Target, StepError> {
        let candidate = self
            .suite
            .pages
            .get(page_id)
            .ok_or_else(|| StepError::UnknownPage(page_id.to_string()))?
            .elements
            .get(element_id)
            .and_then(|element| element.locators.first())
            .ok_or_else(|| StepError::UnknownElement {
                page: page_id.to_string(),
                element: element_id.to_string(),
            })?;
        let resolved = self.params.resolve(&candidate.value, row);
        Ok(candidate.strategy.descriptor(resolved))
    }

    /// Try candidates in ascending ordinal, polling each against the
    /// surface within the default timeout. The first candidate with a
    /// match wins and later candidates are never attempted; a
    /// resolution error advances to the next candidate rather than
    /// failing the element. Session loss always aborts the scan.
    async fn try_candidates(
        &self,
        page_id: &str,
        element_id: &str,
        candidates: &[LocatorCandidate],
        row: Option<&DatasetRow>,
    ) -> Result<ElementHandle, StepError> {
        let surface = self.surface.as_ref();
        for candidate in candidates {
            let resolved = self.params.resolve(&candidate.value, row);
            let target = candidate.strategy.descriptor(resolved);
            let target_ref = &target;

            let outcome = poll_until(self.default_timeout(), POLL_INTERVAL, move || async move {
                match surface.find(target_ref).await {
                    Ok(matches) => Ok(!matches.is_empty()),
                    Err(err) => Err(err.into()),
                }
            })
            .await;

            match outcome {
                Ok(true) => {
                    let mut matches = surface.find(&target).await?;
                    if let Some(handle) = matches.drain(..).next() {
                        debug!("element '{element_id}' resolved via {target}");
                        return Ok(handle);
                    }
                    // Matched during the poll but vanished before the
                    // final fetch; treat like a miss and move on.
                    warn!("element '{element_id}' vanished after matching {target}");
                }
                Ok(false) => {
                    warn!(
                        "no match for element '{element_id}' via {target}, trying next candidate"
                    );
                }
                Err(err) if err.is_session_loss() => return Err(err),
                Err(err) => {
                    warn!(
                        "candidate {target} for element '{element_id}' failed ({err}), trying next"
                    );
                }
            }
        }
        Err(StepError::ElementNotFound {
            page: page_id.to_string(),
            element: element_id.to_string(),
        })
    }
}
