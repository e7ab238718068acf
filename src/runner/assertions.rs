use log::debug;

use super::scenario::Scenario;
use crate::error::StepError;
use crate::parser::types::{AssertionKind, AssertionRecord, ComparisonOp, DatasetRow};

/// Observed value an assertion compares against its expectation.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Actual {
    Text(String),
    Flag(bool),
    Count(usize),
}

impl Actual {
    fn render(&self) -> String {
        match self {
            Actual::Text(text) => text.clone(),
            Actual::Flag(flag) => flag.to_string(),
            Actual::Count(count) => count.to_string(),
        }
    }

    fn as_bool(&self) -> Option<bool> {
        match self {
            Actual::Flag(flag) => Some(*flag),
            Actual::Text(text) => match text.as_str() {
                "true" => Some(true),
                "false" => Some(false),
                _ => None,
            },
            Actual::Count(_) => None,
        }
    }

    fn as_number(&self) -> Option<f64> {
        match self {
            Actual::Count(count) => Some(*count as f64),
            Actual::Text(text) => text.trim().parse().ok(),
            Actual::Flag(_) => None,
        }
    }
}

/// Pure comparison between an observed value and the authored
/// expectation. Numeric operators coerce both sides to numbers and
/// reject values that will not parse.
pub(crate) fn assert_condition(
    actual: &Actual,
    operator: ComparisonOp,
    expected: Option<&str>,
) -> Result<(), StepError> {
    let mismatch = |detail: String| Err(StepError::AssertionMismatch(detail));
    match operator {
        ComparisonOp::Equals => {
            let expected = expected.ok_or(StepError::MissingField("expected"))?;
            if actual.render() == expected {
                Ok(())
            } else {
                mismatch(format!("expected '{expected}', got '{}'", actual.render()))
            }
        }
        ComparisonOp::Contains => {
            let expected = expected.ok_or(StepError::MissingField("expected"))?;
            if actual.render().contains(expected) {
                Ok(())
            } else {
                mismatch(format!(
                    "expected '{}' to contain '{expected}'",
                    actual.render()
                ))
            }
        }
        ComparisonOp::True | ComparisonOp::False => {
            let want = operator == ComparisonOp::True;
            match actual.as_bool() {
                Some(flag) if flag == want => Ok(()),
                Some(flag) => mismatch(format!("expected {want}, got {flag}")),
                None => mismatch(format!("'{}' is not a boolean", actual.render())),
            }
        }
        ComparisonOp::GreaterThan | ComparisonOp::LessThan => {
            let expected_raw = expected.ok_or(StepError::MissingField("expected"))?;
            let left = actual.as_number().ok_or_else(|| {
                StepError::AssertionMismatch(format!("'{}' is not numeric", actual.render()))
            })?;
            let right: f64 = expected_raw.trim().parse().map_err(|_| {
                StepError::AssertionMismatch(format!("expected value '{expected_raw}' is not numeric"))
            })?;
            let holds = if operator == ComparisonOp::GreaterThan {
                left > right
            } else {
                left < right
            };
            if holds {
                Ok(())
            } else {
                mismatch(format!("expected {left} {operator:?} {right}"))
            }
        }
        ComparisonOp::Unknown => Err(StepError::UnsupportedAssertion),
    }
}

impl Scenario {
    /// Probe the surface for the assertion's observed value and compare
    /// it against the (templated) expectation.
    pub(crate) async fn evaluate_assertion(
        &mut self,
        record: &AssertionRecord,
        row: Option<&DatasetRow>,
    ) -> Result<(), StepError> {
        self.apply_wait(
            record.wait.as_ref(),
            record.page.as_deref(),
            record.element.as_deref(),
            row,
        )
        .await?;
        let expected = self.params.resolve_opt(record.expected.as_deref(), row);

        let actual = match record.kind {
            AssertionKind::Url => Actual::Text(self.surface.current_url().await?),
            AssertionKind::Visible => {
                let handle = self.assertion_handle(record, row).await?;
                Actual::Flag(self.surface.is_displayed(&handle).await?)
            }
            AssertionKind::Enabled => {
                let handle = self.assertion_handle(record, row).await?;
                Actual::Flag(self.surface.is_enabled(&handle).await?)
            }
            AssertionKind::Text => {
                let handle = self.assertion_handle(record, row).await?;
                Actual::Text(self.surface.text(&handle).await?)
            }
            AssertionKind::Attribute => {
                let name = self.require_field(record.attribute.as_deref(), "attribute")?;
                let handle = self.assertion_handle(record, row).await?;
                Actual::Text(
                    self.surface
                        .attribute(&handle, name)
                        .await?
                        .unwrap_or_default(),
                )
            }
            AssertionKind::Count => {
                let page = self.require_field(record.page.as_deref(), "page")?;
                let element = self.require_field(record.element.as_deref(), "element")?;
                let target = self.primary_descriptor(page, element, row)?;
                Actual::Count(self.surface.find(&target).await?.len())
            }
            AssertionKind::Unknown => return Err(StepError::UnsupportedAssertion),
        };

        debug!(
            "assertion {} observed '{}'",
            record.index,
            actual.render()
        );
        assert_condition(&actual, record.operator, expected.as_deref())
    }

    async fn assertion_handle(
        &mut self,
        record: &AssertionRecord,
        row: Option<&DatasetRow>,
    ) -> Result<crate::driver::traits::ElementHandle, StepError> {
        let page = self.require_field(record.page.as_deref(), "page")?;
        let element = self.require_field(record.element.as_deref(), "element")?;
        self.resolve_element(page, element, row).await
    }
}
