//! End-to-end scenario tests with in-memory providers.

use std::fs;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tempfile::{tempdir, TempDir};
use tspec_core::{
    Configuration, DriverOptions, ErrorKind, HclEngine, Outcome, PlanDriver, ScenarioReport, ScenarioRunner,
    Scenario,
};
use tspec_provider::{
    methods, AttributeSchema, BlockSchema, MockLauncher, MockRegistry, MockTransport, NestingMode,
    ProviderLauncher, Schema, Transport, TransportResult,
};
use tspec_spec::{ProviderIdentity, Settings, ValueMap};

fn widget_provider() -> MockTransport {
    MockTransport::new().with_schema(
        Schema::default().with_resource(
            "widget",
            BlockSchema::new()
                .with_attribute("size", AttributeSchema::required())
                .with_attribute("label", AttributeSchema::optional())
                .with_attribute("id", AttributeSchema::computed())
                .with_block(
                    "rule",
                    NestingMode::List,
                    BlockSchema::new().with_attribute("port", AttributeSchema::required()),
                ),
        ),
    )
}

fn lookup_provider() -> MockTransport {
    MockTransport::new().with_schema(
        Schema::default().with_data_source(
            "lookup",
            BlockSchema::new()
                .with_attribute("key", AttributeSchema::required())
                .with_attribute("value", AttributeSchema::computed()),
        ),
    )
}

fn launcher() -> MockLauncher {
    MockLauncher::new()
        .with_provider("widget", widget_provider())
        .with_provider("lookup", lookup_provider())
}

/// Lay out `infra/main.tf` and `spec/case/main.tfspec` in a temp dir.
fn scenario(config: &str, spec: &str, tfvars: Option<&str>) -> (TempDir, Scenario) {
    let temp = tempdir().unwrap();
    let infra = temp.path().join("infra");
    let spec_dir = temp.path().join("spec").join("case");
    fs::create_dir_all(&infra).unwrap();
    fs::create_dir_all(&spec_dir).unwrap();
    fs::write(infra.join("main.tf"), config).unwrap();
    fs::write(spec_dir.join("main.tfspec"), spec).unwrap();
    if let Some(tfvars) = tfvars {
        fs::write(spec_dir.join("test.tfvars"), tfvars).unwrap();
    }
    let scenario = Scenario::from_dir("case", &spec_dir, &infra).unwrap();
    (temp, scenario)
}

async fn run(launcher: &MockLauncher, scenario: &Scenario) -> ScenarioReport {
    ScenarioRunner::new(Arc::new(HclEngine::new()), Arc::new(launcher.clone()))
        .run(scenario)
        .await
}

const WIDGET_CONFIG: &str = r#"
resource "widget" "main" {
  size = 10
}
"#;

#[tokio::test]
async fn test_matching_attribute_passes() {
    let launcher = launcher();
    let (_temp, scenario) = scenario(
        WIDGET_CONFIG,
        "assert \"widget\" \"main\" {\n  size = 10\n  id = computed\n}\n",
        None,
    );

    let report = run(&launcher, &scenario).await;
    assert!(report.error.is_none(), "{:?}", report.error);
    assert_eq!(report.verdicts.len(), 1);
    assert!(report.passed());
}

#[tokio::test]
async fn test_differing_attribute_fails_with_diff() {
    let launcher = launcher();
    let (_temp, scenario) = scenario(WIDGET_CONFIG, "assert \"widget\" \"main\" {\n  size = 11\n}\n", None);

    let report = run(&launcher, &scenario).await;
    assert!(report.error.is_none());
    assert!(!report.passed());
    match &report.verdicts[0].outcome {
        Outcome::Fail { mismatches } => {
            assert_eq!(mismatches.len(), 1);
            assert_eq!(mismatches[0].to_string(), "size: expected 11, actual 10");
        }
        other => panic!("unexpected outcome {:?}", other),
    }
}

const LOOKUP_CONFIG: &str = r#"
data "lookup" "info" {
  key = "x"
}

output "out" {
  value = data.lookup.info.value
}
"#;

#[tokio::test]
async fn test_mocked_lookup_flows_into_output() {
    let launcher = launcher();
    let (_temp, scenario) = scenario(
        LOOKUP_CONFIG,
        r#"
mock "lookup" "info" {
  key = "x"

  return {
    value = "y"
  }
}

assert "output" "out" {
  value = "y"
}
"#,
        None,
    );

    let report = run(&launcher, &scenario).await;
    assert!(report.passed(), "{:?}", report);

    let lookup = launcher.provider("lookup").unwrap();
    assert!(lookup.was_called(methods::VALIDATE_DATA_SOURCE));
    assert!(!lookup.was_called(methods::READ_DATA_SOURCE));
}

#[tokio::test]
async fn test_unmatched_lookup_is_mock_missing() {
    let launcher = launcher();
    let (_temp, scenario) = scenario(
        LOOKUP_CONFIG,
        "mock \"lookup\" \"info\" {\n  key = \"z\"\n  return {\n    value = \"y\"\n  }\n}\n",
        None,
    );

    let report = run(&launcher, &scenario).await;
    let error = report.error.expect("scenario should fail");
    assert_eq!(error.kind, ErrorKind::MockMissing);
    assert!(error.message.contains("lookup.info"));
    assert!(report.verdicts.is_empty());
}

#[tokio::test]
async fn test_unmocked_reads_allowed() {
    let launcher = launcher();
    let (_temp, scenario) = scenario(
        LOOKUP_CONFIG,
        "terraspec {\n  allow_unmocked_reads = true\n}\n\nassert \"output\" \"out\" {\n  value = null\n}\n",
        None,
    );

    let report = run(&launcher, &scenario).await;
    assert!(report.passed(), "{:?}", report);
}

const OPTIONAL_CONFIG: &str = r#"
variable "create_extra" {
  type    = bool
  default = false
}

resource "widget" "extra" {
  count = var.create_extra ? 1 : 0
  size  = 1
}
"#;

#[tokio::test]
async fn test_reject_absent_resource_passes() {
    let launcher = launcher();
    let (_temp, scenario) = scenario(
        OPTIONAL_CONFIG,
        "reject \"widget\" \"extra\" {}\n",
        Some("create_extra = false\n"),
    );

    let report = run(&launcher, &scenario).await;
    assert!(report.passed(), "{:?}", report);
}

#[tokio::test]
async fn test_reject_present_resource_fails() {
    let launcher = launcher();
    let (_temp, scenario) = scenario(
        OPTIONAL_CONFIG,
        "reject \"widget\" \"extra\" {}\n",
        Some("create_extra = true\n"),
    );

    let report = run(&launcher, &scenario).await;
    assert!(report.error.is_none());
    assert_eq!(
        report.verdicts[0].outcome,
        Outcome::UnexpectedlyPresent {
            addresses: vec!["widget.extra[0]".to_string()],
        }
    );
}

#[tokio::test]
async fn test_count_index_is_in_scope() {
    let launcher = launcher();
    let (_temp, scenario) = scenario(
        r#"
resource "widget" "many" {
  count = 3
  size  = count.index + 10
}
"#,
        "assert \"widget\" \"many[2]\" {\n  size = 12\n}\n",
        None,
    );

    let report = run(&launcher, &scenario).await;
    assert!(report.passed(), "{:?}", report);
}

#[tokio::test]
async fn test_oversized_count_is_an_evaluation_error() {
    let launcher = launcher();
    let (_temp, scenario) = scenario(
        "resource \"widget\" \"many\" {\n  count = 1000000000000\n  size  = 1\n}\n",
        "assert \"widget\" \"many[0]\" {}\n",
        None,
    );

    let report = run(&launcher, &scenario).await;
    let error = report.error.expect("scenario should fail");
    assert_eq!(error.kind, ErrorKind::Evaluation);
    assert!(error.message.contains("must not exceed"), "{}", error.message);
}

#[tokio::test]
async fn test_return_values_resolve_references() {
    let launcher = launcher();
    let (_temp, scenario) = scenario(
        r#"
resource "widget" "main" {
  size = 10
}

resource "widget" "other" {
  size  = 2
  label = "ref-${widget.main.id}"
}
"#,
        r#"
assert "widget" "main" {
  id = "w-1"

  return {
    id = "w-1"
  }
}

assert "widget" "other" {
  label = "ref-w-1"
}
"#,
        None,
    );

    let report = run(&launcher, &scenario).await;
    assert!(report.passed(), "{:?}", report);
}

#[tokio::test]
async fn test_nested_blocks_and_rejections() {
    let launcher = launcher();
    let (_temp, scenario) = scenario(
        r#"
resource "widget" "main" {
  size = 10

  rule {
    port = 443
  }

  rule {
    port = 80
  }
}
"#,
        r#"
assert "widget" "main" {
  rule {
    port = 80
  }

  reject {
    rule {
      port = 22
    }
  }
}

assert "widget" "main[0]" {
  size = 10
}
"#,
        None,
    );

    let report = run(&launcher, &scenario).await;
    assert!(report.error.is_none(), "{:?}", report.error);
    assert!(report.verdicts[0].passed());
    assert_eq!(report.verdicts[1].outcome, Outcome::TargetMissing);
}

#[tokio::test]
async fn test_for_each_instances() {
    let launcher = launcher();
    let (_temp, scenario) = scenario(
        r#"
locals {
  sizes = { a = 1, b = 2 }
}

resource "widget" "by_name" {
  for_each = local.sizes
  size     = each.value
  label    = upper(each.key)
}
"#,
        "assert \"widget\" \"by_name[\\\"b\\\"]\" {\n  size  = 2\n  label = \"B\"\n}\n",
        None,
    );

    let report = run(&launcher, &scenario).await;
    assert!(report.passed(), "{:?}", report);
}

#[tokio::test]
async fn test_workspace_is_injected() {
    let launcher = launcher();
    let (_temp, scenario) = scenario(
        r#"
resource "widget" "main" {
  size  = 1
  label = terraform.workspace
}
"#,
        r#"
terraspec {
  workspace = "staging"
}

assert "widget" "main" {
  label = terraspec.workspace
}
"#,
        None,
    );

    let report = run(&launcher, &scenario).await;
    assert!(report.passed(), "{:?}", report);
}

#[tokio::test]
async fn test_providers_shut_down_after_run() {
    let launcher = launcher();
    let (_temp, scenario) = scenario(LOOKUP_CONFIG, "", None);

    let report = run(&launcher, &scenario).await;
    assert_eq!(report.error.map(|e| e.kind), Some(ErrorKind::MockMissing));
    assert!(launcher.connected().is_empty());
    assert_eq!(launcher.stopped(), vec![ProviderIdentity::new("lookup")]);
    assert!(launcher.provider("lookup").unwrap().was_called(methods::STOP));
}

#[tokio::test]
async fn test_parse_error_stops_before_providers() {
    let launcher = launcher();
    let (_temp, scenario) = scenario(WIDGET_CONFIG, "unknown \"widget\" \"main\" {}\n", None);

    let report = run(&launcher, &scenario).await;
    assert_eq!(report.error.map(|e| e.kind), Some(ErrorKind::Parse));
    assert_eq!(launcher.provider("widget").unwrap().call_count(), 0);
}

#[tokio::test]
async fn test_duplicate_targets_fail_preflight() {
    let launcher = launcher();
    let (_temp, scenario) = scenario(
        WIDGET_CONFIG,
        "assert \"widget\" \"main\" {}\n\nreject \"widget\" \"main\" {}\n",
        None,
    );

    let report = run(&launcher, &scenario).await;
    assert_eq!(report.error.map(|e| e.kind), Some(ErrorKind::SpecInvariant));
    assert!(launcher.connected().is_empty());
}

const PINNED_CONFIG: &str = r#"
terraform {
  required_version = "< 1.0"
}

resource "widget" "main" {
  size = 10
}
"#;

#[tokio::test]
async fn test_required_version_mismatch() {
    let launcher = launcher();
    let (_temp, scenario) = scenario(PINNED_CONFIG, "assert \"widget\" \"main\" {\n  size = 10\n}\n", None);

    let report = run(&launcher, &scenario).await;
    let error = report.error.expect("version check should fail");
    assert_eq!(error.kind, ErrorKind::Evaluation);
    assert!(error.message.contains("requires version"));
}

#[tokio::test]
async fn test_required_version_ignored() {
    let launcher = launcher();
    let (_temp, scenario) = scenario(PINNED_CONFIG, "assert \"widget\" \"main\" {\n  size = 10\n}\n", None);

    let report = ScenarioRunner::new(Arc::new(HclEngine::new()), Arc::new(launcher.clone()))
        .with_options(DriverOptions::default().ignore_required_version(true))
        .run(&scenario)
        .await;
    assert!(report.passed(), "{:?}", report);
}

#[tokio::test]
async fn test_provider_diagnostics_are_evaluation_errors() {
    let widget = widget_provider().with_diagnostic(
        "widget",
        tspec_provider::Diagnostic::error("size must be even").with_attribute("size"),
    );
    let launcher = MockLauncher::new().with_provider("widget", widget);
    let (_temp, scenario) = scenario(WIDGET_CONFIG, "assert \"widget\" \"main\" {}\n", None);

    let report = run(&launcher, &scenario).await;
    let error = report.error.expect("validation should fail");
    assert_eq!(error.kind, ErrorKind::Evaluation);
    assert!(error.message.contains("widget.main"));
    assert!(error.message.contains("size must be even"));
}

#[tokio::test]
async fn test_run_all_aggregates() {
    let launcher = launcher();
    let (_a, passing) = scenario(WIDGET_CONFIG, "assert \"widget\" \"main\" {\n  size = 10\n}\n", None);
    let (_b, failing) = scenario(WIDGET_CONFIG, "assert \"widget\" \"main\" {\n  size = 3\n}\n", None);

    let report = ScenarioRunner::new(Arc::new(HclEngine::new()), Arc::new(launcher.clone()))
        .run_all(&[passing, failing])
        .await;
    assert_eq!(report.scenarios.len(), 2);
    assert_eq!(report.passed_count(), 1);
    assert_eq!(report.failed_count(), 1);
    assert!(!report.passed());
    assert!(!report.has_errors());
    assert_eq!(report.scenarios[0].name, "case");
}

/// Registers the connection with `inner`, then never completes `connect`.
struct StallingLauncher {
    inner: MockLauncher,
}

#[async_trait]
impl ProviderLauncher for StallingLauncher {
    async fn connect(&self, identity: &ProviderIdentity) -> TransportResult<Arc<dyn Transport>> {
        self.inner.connect(identity).await?;
        std::future::pending().await
    }

    async fn shutdown(&self, identity: &ProviderIdentity) -> TransportResult<()> {
        self.inner.shutdown(identity).await
    }

    async fn shutdown_all(&self) -> TransportResult<()> {
        self.inner.shutdown_all().await
    }
}

#[tokio::test]
async fn test_abandoned_run_still_shuts_down_providers() {
    let inner = launcher();
    let driver = PlanDriver::new(
        Arc::new(HclEngine::new()),
        Arc::new(StallingLauncher { inner: inner.clone() }),
    );
    let temp = tempdir().unwrap();
    let configuration = Configuration::from_text(temp.path(), WIDGET_CONFIG).unwrap();

    let settings = Settings::default();
    let options = DriverOptions::default();
    let run = driver.run(
        configuration,
        ValueMap::new(),
        &settings,
        Arc::new(MockRegistry::default()),
        &options,
    );
    let outcome = tokio::time::timeout(Duration::from_millis(50), run).await;
    assert!(outcome.is_err(), "run should still be pending");

    for _ in 0..100 {
        if !inner.stopped().is_empty() {
            break;
        }
        tokio::task::yield_now().await;
    }
    assert_eq!(inner.stopped(), vec![ProviderIdentity::new("widget")]);
    assert!(inner.connected().is_empty());
    assert!(inner.provider("widget").unwrap().was_called(methods::STOP));
}
