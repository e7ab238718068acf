//! End-to-end scenario runs against the in-memory driver.

use std::io::Write;
use std::time::{Duration, Instant};

use rowtest::driver::traits::Target;
use rowtest::error::StepError;
use rowtest::parser::parse_suite;
use rowtest::{load_suite, MemoryBroker, MemoryElement, MemorySurface, Scenario};

const SUITE: &str = r#"
settings:
  baseUrl: http://app.local
  defaultTimeoutSecs: 1
  brokerEnabled: true
  retry:
    maxAttempts: 3
    delaySeconds: 0
pages:
  login:
    path: /login
    elements:
      banner:
        locators:
          - ordinal: 1
            strategy: id
            value: banner
      username:
        locators:
          - ordinal: 1
            strategy: id
            value: username
      sign-in:
        locators:
          - ordinal: 1
            strategy: id
            value: sign-in
tests:
  gate:
    actions:
      - index: 1
        operation: check
        page: login
        element: banner
        condition: visible
        ifTrueNext: 5
        ifFalseNext: 2
      - index: 2
        operation: enter
        page: login
        element: username
        value: fallback
      - index: 3
        operation: click
        page: login
        element: sign-in
  press:
    actions:
      - index: 1
        operation: click
        page: login
        element: sign-in
"#;

fn login_surface(banner_displayed: bool) -> MemorySurface {
    let surface = MemorySurface::new();
    let mut banner = MemoryElement::new("banner").target(Target::Id("banner".into()));
    if !banner_displayed {
        banner = banner.hidden();
    }
    surface.add_page(
        "/login",
        vec![
            banner,
            MemoryElement::new("username").target(Target::Id("username".into())),
            MemoryElement::new("sign-in").target(Target::Id("sign-in".into())),
        ],
    );
    surface
}

#[tokio::test]
async fn test_true_branch_past_script_end_halts_successfully() {
    let surface = login_surface(true);
    let probe = surface.clone();
    let mut scenario = Scenario::new(parse_suite(SUITE).unwrap(), Box::new(surface));
    scenario.open_page("login").await.unwrap();

    scenario.run_test("gate").await.unwrap();

    // The jump to 5 in a 3-instruction script terminated the run; the
    // fallback instructions never executed.
    assert_eq!(probe.value_of("/login", "username").as_deref(), Some(""));
    assert_eq!(probe.clicks("/login", "sign-in"), 0);
}

#[tokio::test]
async fn test_false_branch_runs_fallback_instructions() {
    let surface = login_surface(false);
    let probe = surface.clone();
    let mut scenario = Scenario::new(parse_suite(SUITE).unwrap(), Box::new(surface));
    scenario.open_page("login").await.unwrap();

    scenario.run_test("gate").await.unwrap();

    assert_eq!(
        probe.value_of("/login", "username").as_deref(),
        Some("fallback")
    );
    assert_eq!(probe.clicks("/login", "sign-in"), 1);
}

#[tokio::test]
async fn test_session_loss_triggers_exactly_one_reinitialization() {
    let surface = login_surface(true);
    let probe = surface.clone();
    let mut scenario = Scenario::new(parse_suite(SUITE).unwrap(), Box::new(surface));
    scenario.open_page("login").await.unwrap();

    probe.drop_session_for(1);
    scenario.run_test("press").await.unwrap();

    assert_eq!(probe.resets(), 1);
    assert_eq!(probe.clicks("/login", "sign-in"), 1);
}

#[tokio::test]
async fn test_late_element_succeeds_on_a_later_attempt_without_reset() {
    let surface = MemorySurface::new();
    surface.add_page(
        "/login",
        vec![
            MemoryElement::new("banner").target(Target::Id("banner".into())),
            MemoryElement::new("username").target(Target::Id("username".into())),
            MemoryElement::new("sign-in")
                .target(Target::Id("sign-in".into()))
                .appears_after_finds(5),
        ],
    );
    let probe = surface.clone();

    let mut scenario = Scenario::new(parse_suite(SUITE).unwrap(), Box::new(surface));
    // open_page caches what it can see; the slow element is absorbed
    // by the action's own locator poll, without a session reset.
    scenario.open_page("login").await.unwrap();
    scenario.run_test("press").await.unwrap();

    assert_eq!(probe.resets(), 0);
    assert_eq!(probe.clicks("/login", "sign-in"), 1);
}

#[tokio::test]
async fn test_retry_budget_bounds_total_time_and_wraps_last_cause() {
    let suite = parse_suite(
        &SUITE.replace("maxAttempts: 3", "maxAttempts: 2"),
    )
    .unwrap();
    // No sign-in element at all: every attempt spends the 1s locator
    // poll, and the 2s budget allows two of them.
    let surface = MemorySurface::new();
    surface.add_page(
        "/login",
        vec![
            MemoryElement::new("banner").target(Target::Id("banner".into())),
            MemoryElement::new("username").target(Target::Id("username".into())),
        ],
    );
    let mut scenario = Scenario::new(suite, Box::new(surface));
    scenario.open_page("login").await.unwrap();

    let started = Instant::now();
    let err = scenario.run_test("press").await.unwrap_err();
    let elapsed = started.elapsed();

    match err {
        StepError::RetryExhausted {
            budget_secs, cause, ..
        } => {
            assert_eq!(budget_secs, 2);
            assert!(matches!(
                cause.as_deref(),
                Some(StepError::ElementNotFound { .. })
            ));
        }
        other => panic!("expected RetryExhausted, got {other}"),
    }
    assert!(elapsed >= Duration::from_secs(2));
    assert!(elapsed < Duration::from_secs(5));
}

#[tokio::test]
async fn test_dataset_rows_replay_with_continue_policy() {
    let dir = tempfile::tempdir().unwrap();
    let suite_path = dir.path().join("suite.yaml");
    let mut csv = std::fs::File::create(dir.path().join("slots.csv")).unwrap();
    writeln!(csv, "slot,label\none,a\n,b\nthree,c").unwrap();

    std::fs::write(
        &suite_path,
        r#"
settings:
  baseUrl: http://app.local
  defaultTimeoutSecs: 1
  retry:
    maxAttempts: 1
    delaySeconds: 0
pages:
  form:
    path: /form
    elements:
      field:
        locators:
          - ordinal: 1
            strategy: id
            value: slot-${data.slot}
tests:
  fill:
    dataFile: slots.csv
    onRowFailure: continue
    actions:
      - index: 1
        operation: enter
        page: form
        element: field
        value: from-${data.slot}
"#,
    )
    .unwrap();

    let surface = MemorySurface::new();
    surface.add_page(
        "/form",
        vec![
            MemoryElement::new("one").target(Target::Id("slot-one".into())),
            MemoryElement::new("three").target(Target::Id("slot-three".into())),
        ],
    );
    let probe = surface.clone();

    let suite = load_suite(&suite_path).unwrap();
    assert_eq!(suite.tests["fill"].dataset.as_ref().unwrap().len(), 3);

    let mut scenario = Scenario::new(suite, Box::new(surface));
    scenario.open_page("form").await.unwrap();

    // Row 2 has an empty slot, so its locator resolves to "slot-" and
    // never matches; the continue policy still replays row 3 and
    // reports the first failure afterwards.
    let err = scenario.run_test("fill").await.unwrap_err();
    assert!(matches!(err, StepError::RetryExhausted { .. }));
    assert_eq!(probe.value_of("/form", "one").as_deref(), Some("from-one"));
    assert_eq!(
        probe.value_of("/form", "three").as_deref(),
        Some("from-three")
    );
}

#[tokio::test]
async fn test_broker_roundtrip_inside_a_script() {
    let yaml = r#"
settings:
  baseUrl: http://app.local
  defaultTimeoutSecs: 1
  brokerEnabled: true
  retry:
    maxAttempts: 1
    delaySeconds: 0
pages:
  control:
    path: /control
    elements: {}
tests:
  signal:
    actions:
      - index: 1
        operation: kafkaProduce
        broker:
          topic: orders
          key: order-1
          value: '{"status":"CREATED"}'
      - index: 2
        operation: kafkaConsume
        broker:
          topic: orders
          valueContains: CREATED
"#;
    let surface = MemorySurface::new();
    surface.add_page("/control", vec![]);
    let mut scenario = Scenario::new(parse_suite(yaml).unwrap(), Box::new(surface))
        .with_broker(Box::new(MemoryBroker::new()));
    scenario.open_page("control").await.unwrap();

    scenario.run_test("signal").await.unwrap();
}

#[tokio::test]
async fn test_upload_sends_existing_file_to_surface() {
    let mut source = tempfile::NamedTempFile::new().unwrap();
    writeln!(source, "payload").unwrap();

    let yaml = format!(
        r#"
settings:
  baseUrl: http://app.local
  defaultTimeoutSecs: 1
  retry:
    maxAttempts: 1
    delaySeconds: 0
pages:
  form:
    path: /form
    elements:
      attachment:
        locators:
          - ordinal: 1
            strategy: id
            value: attachment
tests:
  attach:
    actions:
      - index: 1
        operation: uploadFile
        page: form
        element: attachment
        value: {}
"#,
        source.path().display()
    );

    let surface = MemorySurface::new();
    surface.add_page(
        "/form",
        vec![MemoryElement::new("attachment").target(Target::Id("attachment".into()))],
    );
    let probe = surface.clone();

    let mut scenario = Scenario::new(parse_suite(&yaml).unwrap(), Box::new(surface));
    scenario.open_page("form").await.unwrap();
    scenario.run_test("attach").await.unwrap();

    assert_eq!(probe.uploads("/form", "attachment"), vec![source.path().to_path_buf()]);
}

#[tokio::test]
async fn test_verify_test_evaluates_assertions() {
    let yaml = r#"
settings:
  baseUrl: http://app.local
  defaultTimeoutSecs: 1
  retry:
    maxAttempts: 1
    delaySeconds: 0
params:
  welcome: Welcome
pages:
  home:
    path: /home
    elements:
      banner:
        locators:
          - ordinal: 1
            strategy: id
            value: banner
tests:
  landing:
    assertions:
      - index: 1
        type: url
        operator: contains
        expected: /home
      - index: 2
        type: text
        page: home
        element: banner
        operator: contains
        expected: ${param.welcome}
      - index: 3
        type: visible
        page: home
        element: banner
        operator: "true"
"#;

    let surface = MemorySurface::new();
    surface.add_page(
        "/home",
        vec![MemoryElement::new("banner")
            .target(Target::Id("banner".into()))
            .text("Welcome back")],
    );
    let mut scenario = Scenario::new(parse_suite(yaml).unwrap(), Box::new(surface));
    scenario.open_page("home").await.unwrap();

    scenario.verify_test("landing").await.unwrap();
}
