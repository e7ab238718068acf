use std::collections::HashMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::driver::traits::Target;
use crate::error::ConfigError;

/// One set of named substitution values driving one replay of a script.
pub type DatasetRow = HashMap<String, String>;

/// A fully loaded suite: settings, static parameters, page/element
/// registry and the indexed test scripts. Constructed once and passed
/// into the interpreter; nothing here is mutated at run time.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Suite {
    pub settings: Settings,

    /// Static parameter table for `${param.*}` substitution, keyed by
    /// the name remainder after the prefix.
    #[serde(default)]
    pub params: HashMap<String, String>,

    #[serde(default)]
    pub pages: HashMap<String, PageConfig>,

    #[serde(default)]
    pub tests: HashMap<String, TestConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Settings {
    pub base_url: String,

    #[serde(default = "default_timeout_secs")]
    pub default_timeout_secs: u64,

    #[serde(default)]
    pub retry: RetryPolicy,

    #[serde(default)]
    pub broker_enabled: bool,
}

fn default_timeout_secs() -> u64 {
    10
}

impl Settings {
    pub fn default_timeout(&self) -> Duration {
        Duration::from_secs(self.default_timeout_secs)
    }
}

/// Process-wide retry knobs, read once at session start.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub delay_seconds: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetryPolicy {
            max_attempts: 3,
            delay_seconds: 1,
        }
    }
}

impl RetryPolicy {
    /// Total time window allotted to one step across all attempts.
    pub fn budget(&self) -> Duration {
        Duration::from_secs(self.max_attempts as u64 * (self.delay_seconds + 1))
    }

    pub fn delay(&self) -> Duration {
        Duration::from_secs(self.delay_seconds)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageConfig {
    /// Path appended to the base URL; navigation polls for it in the
    /// surface's location.
    pub path: String,

    #[serde(default)]
    pub elements: HashMap<String, ElementConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ElementConfig {
    pub locators: Vec<LocatorCandidate>,
}

/// One strategy+value pair for finding an element, tried in ascending
/// ordinal until one resolves.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LocatorCandidate {
    pub ordinal: u32,
    pub strategy: LocatorStrategy,
    /// Templated locator value; resolved against params and the current
    /// dataset row before use.
    pub value: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LocatorStrategy {
    Id,
    Css,
    Xpath,
    Name,
    Class,
    Tag,
}

impl LocatorStrategy {
    /// Build the concrete descriptor once the templated value has been
    /// resolved.
    pub fn descriptor(self, resolved: String) -> Target {
        match self {
            LocatorStrategy::Id => Target::Id(resolved),
            LocatorStrategy::Css => Target::Css(resolved),
            LocatorStrategy::Xpath => Target::XPath(resolved),
            LocatorStrategy::Name => Target::Name(resolved),
            LocatorStrategy::Class => Target::ClassName(resolved),
            LocatorStrategy::Tag => Target::Tag(resolved),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct TestConfig {
    #[serde(default)]
    pub actions: Vec<ActionRecord>,

    #[serde(default)]
    pub assertions: Vec<AssertionRecord>,

    /// Optional tabular dataset file (.csv or .json) relative to the
    /// suite document. Loaded into `dataset` by the suite loader.
    #[serde(default)]
    pub data_file: Option<String>,

    #[serde(skip)]
    pub dataset: Option<Vec<DatasetRow>>,

    /// Tear down and recreate the session before each dataset row.
    #[serde(default)]
    pub reset_session_per_row: bool,

    /// Page to open after a per-row session reset.
    #[serde(default)]
    pub start_page: Option<String>,

    #[serde(default)]
    pub on_row_failure: RowFailurePolicy,
}

/// Whether one row's unrecoverable failure aborts the remaining rows.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RowFailurePolicy {
    #[default]
    Abort,
    Continue,
}

/// One executable instruction in a test script.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionRecord {
    /// 1-based authored position; indices must be contiguous from 1.
    pub index: u32,

    pub operation: Operation,

    #[serde(default)]
    pub page: Option<String>,

    #[serde(default)]
    pub element: Option<String>,

    /// Templated value (text to enter, option label, upload path).
    #[serde(default)]
    pub value: Option<String>,

    #[serde(default)]
    pub target_page: Option<String>,

    #[serde(default)]
    pub condition: Option<Condition>,

    #[serde(default)]
    pub if_true_next: Option<u32>,

    #[serde(default)]
    pub if_false_next: Option<u32>,

    #[serde(default)]
    pub state_key: Option<String>,

    #[serde(default)]
    pub wait: Option<WaitSpec>,

    #[serde(default)]
    pub broker: Option<BrokerFields>,

    #[serde(default)]
    pub http: Option<HttpFields>,
}

impl ActionRecord {
    /// Human-readable step description used for logs and retry reports.
    pub fn describe(&self) -> String {
        let mut out = format!("action {} [{:?}]", self.index, self.operation);
        if let Some(page) = &self.page {
            out.push_str(&format!(" on page '{page}'"));
        }
        if let Some(element) = &self.element {
            out.push_str(&format!(" element '{element}'"));
        }
        if let Some(target) = &self.target_page {
            out.push_str(&format!(" -> page '{target}'"));
        }
        out
    }
}

/// Closed operation tags. Unrecognized tags land on `Unknown` so a
/// forward-written suite is rejected at execution with a configuration
/// error instead of a parse failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Operation {
    #[serde(rename = "enter")]
    EnterText,
    Click,
    #[serde(rename = "select")]
    SelectOption,
    Hover,
    Clear,
    Submit,
    DoubleClick,
    Navigate,
    Check,
    SaveState,
    LoadState,
    #[serde(alias = "kafkaProduce")]
    Produce,
    #[serde(alias = "kafkaConsume")]
    Consume,
    #[serde(alias = "restCall")]
    HttpCall,
    UploadFile,
    #[serde(other)]
    Unknown,
}

/// Boolean conditions a check instruction can evaluate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Condition {
    Visible,
    Enabled,
    Present,
    #[serde(other)]
    Unknown,
}

/// Precondition polled before an action or assertion executes.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WaitSpec {
    /// Predicate to poll before the step runs. A spec with only a
    /// timeout overrides the step's time bound without adding a
    /// precondition.
    #[serde(default, rename = "for")]
    pub predicate: Option<WaitKind>,

    /// Overrides the process-wide default timeout for this wait.
    #[serde(default, rename = "timeout")]
    pub timeout_secs: Option<u64>,

    /// Substring for the urlContains predicate. Templated.
    #[serde(default)]
    pub url_fragment: Option<String>,

    /// Expected text for the textPresent predicate. Templated.
    #[serde(default)]
    pub text: Option<String>,

    /// Opaque boolean-valued probe for the custom predicate. Templated.
    #[serde(default)]
    pub script: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum WaitKind {
    Visible,
    Clickable,
    Present,
    Invisible,
    Stale,
    UrlContains,
    TextPresent,
    Custom,
    #[serde(other)]
    Unknown,
}

/// Broker-operation fields; all values are templated.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BrokerFields {
    pub topic: String,

    #[serde(default)]
    pub key: Option<String>,

    #[serde(default)]
    pub value: Option<String>,

    /// Substring the consumed value must contain, when present.
    #[serde(default)]
    pub value_contains: Option<String>,
}

/// HTTP-operation fields; headers are an open templated map, not a
/// fixed schema.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HttpFields {
    pub method: String,
    pub url: String,

    #[serde(default)]
    pub body: Option<String>,

    #[serde(default)]
    pub headers: HashMap<String, String>,
}

/// One verification instruction.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssertionRecord {
    pub index: u32,

    #[serde(rename = "type")]
    pub kind: AssertionKind,

    #[serde(default)]
    pub page: Option<String>,

    #[serde(default)]
    pub element: Option<String>,

    /// Templated expected value.
    #[serde(default)]
    pub expected: Option<String>,

    pub operator: ComparisonOp,

    #[serde(default)]
    pub attribute: Option<String>,

    #[serde(default)]
    pub wait: Option<WaitSpec>,
}

impl AssertionRecord {
    pub fn describe(&self) -> String {
        let mut out = format!("assertion {} [{:?} {:?}]", self.index, self.kind, self.operator);
        if let Some(page) = &self.page {
            out.push_str(&format!(" on page '{page}'"));
        }
        if let Some(element) = &self.element {
            out.push_str(&format!(" element '{element}'"));
        }
        out
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AssertionKind {
    Url,
    Visible,
    Text,
    Count,
    Enabled,
    Attribute,
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ComparisonOp {
    Equals,
    Contains,
    True,
    False,
    GreaterThan,
    LessThan,
    #[serde(other)]
    Unknown,
}

impl Suite {
    /// Sort scripts by authored index and locator lists by ordinal.
    /// Called by the loader before validation.
    pub fn normalize(&mut self) {
        for test in self.tests.values_mut() {
            test.actions.sort_by_key(|a| a.index);
            test.assertions.sort_by_key(|a| a.index);
        }
        for page in self.pages.values_mut() {
            for element in page.elements.values_mut() {
                element.locators.sort_by_key(|l| l.ordinal);
            }
        }
    }

    /// Shape checks the interpreter relies on: contiguous 1-based
    /// indices, complete branch records, known page/element references
    /// and non-empty locator lists.
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (page_id, page) in &self.pages {
            for (element_id, element) in &page.elements {
                if element.locators.is_empty() {
                    return Err(ConfigError::EmptyLocatorList {
                        page: page_id.clone(),
                        element: element_id.clone(),
                    });
                }
            }
        }

        for (test_id, test) in &self.tests {
            self.check_indices(test_id, "action", test.actions.iter().map(|a| a.index))?;
            self.check_indices(test_id, "assertion", test.assertions.iter().map(|a| a.index))?;

            for action in &test.actions {
                if action.operation == Operation::Check
                    && (action.if_true_next.is_none() || action.if_false_next.is_none())
                {
                    return Err(ConfigError::IncompleteBranch {
                        test: test_id.clone(),
                        index: action.index,
                    });
                }
                self.check_reference(
                    test_id,
                    "action",
                    action.index,
                    action.page.as_deref(),
                    action.element.as_deref(),
                )?;
                if let Some(target) = &action.target_page {
                    if !self.pages.contains_key(target) {
                        return Err(ConfigError::UnknownPage {
                            test: test_id.clone(),
                            kind: "action",
                            index: action.index,
                            page: target.clone(),
                        });
                    }
                }
            }
            for assertion in &test.assertions {
                self.check_reference(
                    test_id,
                    "assertion",
                    assertion.index,
                    assertion.page.as_deref(),
                    assertion.element.as_deref(),
                )?;
            }
        }
        Ok(())
    }

    fn check_indices(
        &self,
        test_id: &str,
        kind: &'static str,
        indices: impl Iterator<Item = u32>,
    ) -> Result<(), ConfigError> {
        for (position, index) in indices.enumerate() {
            let expected = position as u32 + 1;
            if index != expected {
                return Err(ConfigError::NonContiguousIndex {
                    test: test_id.to_string(),
                    kind,
                    expected,
                    found: index,
                });
            }
        }
        Ok(())
    }

    fn check_reference(
        &self,
        test_id: &str,
        kind: &'static str,
        index: u32,
        page: Option<&str>,
        element: Option<&str>,
    ) -> Result<(), ConfigError> {
        let Some(page_id) = page else {
            return Ok(());
        };
        let Some(page_config) = self.pages.get(page_id) else {
            return Err(ConfigError::UnknownPage {
                test: test_id.to_string(),
                kind,
                index,
                page: page_id.to_string(),
            });
        };
        if let Some(element_id) = element {
            if !page_config.elements.contains_key(element_id) {
                return Err(ConfigError::UnknownElement {
                    test: test_id.to_string(),
                    kind,
                    index,
                    page: page_id.to_string(),
                    element: element_id.to_string(),
                });
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_operation_tags_parse() {
        let op: Operation = serde_yaml::from_str("enter").unwrap();
        assert_eq!(op, Operation::EnterText);
        let op: Operation = serde_yaml::from_str("doubleClick").unwrap();
        assert_eq!(op, Operation::DoubleClick);
        let op: Operation = serde_yaml::from_str("httpCall").unwrap();
        assert_eq!(op, Operation::HttpCall);
    }

    #[test]
    fn test_unknown_operation_tag_is_rejected_later_not_at_parse() {
        let op: Operation = serde_yaml::from_str("teleport").unwrap();
        assert_eq!(op, Operation::Unknown);
    }

    #[test]
    fn test_retry_budget() {
        let policy = RetryPolicy {
            max_attempts: 3,
            delay_seconds: 2,
        };
        assert_eq!(policy.budget(), Duration::from_secs(9));
    }

    #[test]
    fn test_action_record_yaml_shape() {
        let yaml = r#"
index: 3
operation: check
page: login
element: welcome-banner
condition: visible
ifTrueNext: 5
ifFalseNext: 4
"#;
        let action: ActionRecord = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(action.operation, Operation::Check);
        assert_eq!(action.condition, Some(Condition::Visible));
        assert_eq!(action.if_true_next, Some(5));
        assert_eq!(action.if_false_next, Some(4));
    }

    #[test]
    fn test_wait_spec_yaml_shape() {
        let yaml = r#"
for: urlContains
timeout: 5
urlFragment: /home
"#;
        let wait: WaitSpec = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(wait.predicate, Some(WaitKind::UrlContains));
        assert_eq!(wait.timeout_secs, Some(5));
        assert_eq!(wait.url_fragment.as_deref(), Some("/home"));
    }
}
