//! Main test runner that issues API requests and checks them against contracts

use std::path::PathBuf;
use std::time::Instant;

use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use supplyhub_contract::Violation;

use crate::api::ApiClient;
use crate::config::{HarnessConfig, PollDefaults};
use crate::error::{E2eError, E2eResult};
use crate::schemas::SchemaCatalog;
use crate::spec::ApiSpec;

/// Result of running a single test
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestResult {
    pub name: String,
    pub success: bool,
    pub duration_ms: u64,

    /// Status of the last response, if one arrived
    pub status: Option<u16>,

    /// Contract violations found in the response body
    pub violations: Vec<Violation>,
    pub error: Option<String>,
}

/// Result of running all tests
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestSuiteResult {
    pub total: usize,
    pub passed: usize,
    pub failed: usize,
    pub skipped: usize,
    pub duration_ms: u64,
    pub results: Vec<TestResult>,
}

impl TestSuiteResult {
    pub fn single(result: TestResult) -> Self {
        Self {
            total: 1,
            passed: usize::from(result.success),
            failed: usize::from(!result.success),
            skipped: 0,
            duration_ms: result.duration_ms,
            results: vec![result],
        }
    }

    /// Every spec ran and passed; a skipped spec fails the run
    pub fn all_passed(&self) -> bool {
        self.failed == 0 && self.skipped == 0
    }
}

/// Main API test runner
pub struct TestRunner {
    client: ApiClient,
    catalog: SchemaCatalog,
    poll_defaults: PollDefaults,

    /// Test specs directory
    specs_dir: PathBuf,

    /// Output directory for results
    output_dir: PathBuf,

    /// Stops in-flight polls and skips the remaining specs
    cancel: CancellationToken,
}

impl TestRunner {
    /// Create a runner from a validated configuration.
    ///
    /// Fixtures from `schemas_dir` are layered over the built-in catalog.
    pub fn new(config: &HarnessConfig) -> E2eResult<Self> {
        config.validate()?;

        let mut catalog = SchemaCatalog::builtin()?;
        if let Some(dir) = &config.schemas_dir {
            let loaded = catalog.load_dir(dir)?;
            info!("Loaded {} schema fixture(s) from {}", loaded, dir.display());
        }

        Ok(Self::with_catalog(config, ApiClient::new(config)?, catalog))
    }

    pub fn with_catalog(config: &HarnessConfig, client: ApiClient, catalog: SchemaCatalog) -> Self {
        Self {
            client,
            catalog,
            poll_defaults: config.poll.clone(),
            specs_dir: config.specs_dir.clone(),
            output_dir: config.output_dir.clone(),
            cancel: CancellationToken::new(),
        }
    }

    pub fn client(&self) -> &ApiClient {
        &self.client
    }

    pub fn catalog(&self) -> &SchemaCatalog {
        &self.catalog
    }

    /// Token that aborts the run when cancelled
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Block until the application answers, using the default poll settings
    pub async fn wait_for_app(&self) -> E2eResult<()> {
        let poll = self
            .poll_defaults
            .options(format!("{} to become reachable", self.client.base_url()))
            .with_cancellation(self.cancel.clone());
        let status = self.client.wait_until_reachable(&poll).await?;
        info!("Application reachable at {} (status {})", self.client.base_url(), status);
        Ok(())
    }

    /// Run all tests in the specs directory
    pub async fn run_all(&self) -> E2eResult<TestSuiteResult> {
        let specs = ApiSpec::load_all(&self.specs_dir)?;
        if specs.is_empty() {
            return Err(E2eError::SpecParse(format!(
                "No API specs found in {}",
                self.specs_dir.display()
            )));
        }
        self.run_specs(&specs).await
    }

    /// Run tests matching a tag
    pub async fn run_tagged(&self, tag: &str) -> E2eResult<TestSuiteResult> {
        let specs = ApiSpec::load_all(&self.specs_dir)?;
        let filtered: Vec<ApiSpec> = ApiSpec::filter_by_tag(&specs, tag)
            .into_iter()
            .cloned()
            .collect();
        if filtered.is_empty() {
            return Err(E2eError::SpecParse(format!(
                "No API specs tagged '{}' in {}",
                tag,
                self.specs_dir.display()
            )));
        }
        self.run_specs(&filtered).await
    }

    /// Run a specific test by name
    pub async fn run_test(&self, name: &str) -> E2eResult<TestResult> {
        let specs = ApiSpec::load_all(&self.specs_dir)?;
        let spec = specs
            .into_iter()
            .find(|s| s.name == name)
            .ok_or_else(|| E2eError::SpecParse(format!("Test not found: {}", name)))?;

        Ok(self.run_spec(&spec).await)
    }

    /// Run a list of test specs
    pub async fn run_specs(&self, specs: &[ApiSpec]) -> E2eResult<TestSuiteResult> {
        let start = Instant::now();
        let mut results = Vec::new();
        let mut passed = 0;
        let mut failed = 0;
        let mut skipped = 0;

        info!("Running {} test(s) against {}...", specs.len(), self.client.base_url());

        for spec in specs {
            if self.cancel.is_cancelled() {
                warn!("- {} skipped (run cancelled)", spec.name);
                skipped += 1;
                continue;
            }

            let result = self.run_spec(spec).await;
            if result.success {
                passed += 1;
                info!("✓ {} ({} ms)", result.name, result.duration_ms);
            } else {
                failed += 1;
                error!(
                    "✗ {} - {}",
                    result.name,
                    result.error.as_deref().unwrap_or("unknown error")
                );
            }
            results.push(result);
        }

        let duration_ms = start.elapsed().as_millis() as u64;

        info!("");
        info!(
            "Test Results: {} passed, {} failed, {} skipped ({} ms)",
            passed, failed, skipped, duration_ms
        );

        Ok(TestSuiteResult {
            total: specs.len(),
            passed,
            failed,
            skipped,
            duration_ms,
            results,
        })
    }

    /// Run a single test spec.
    ///
    /// Failures of any kind are recorded in the result rather than returned.
    pub async fn run_spec(&self, spec: &ApiSpec) -> TestResult {
        let start = Instant::now();
        debug!("Running test: {}", spec.name);

        let mut status = None;
        let (error, violations) = match self.execute(spec, &mut status).await {
            Ok(()) => (None, Vec::new()),
            Err(E2eError::SchemaValidation(err)) => {
                let message = err.to_string();
                (Some(message), err.violations)
            }
            Err(e) => (Some(e.to_string()), Vec::new()),
        };

        TestResult {
            name: spec.name.clone(),
            success: error.is_none(),
            duration_ms: start.elapsed().as_millis() as u64,
            status,
            violations,
            error,
        }
    }

    async fn execute(&self, spec: &ApiSpec, status: &mut Option<u16>) -> E2eResult<()> {
        spec.validate(&self.catalog)?;

        let path = &spec.request.path;
        let options = &spec.request.options;
        let response = match &spec.wait_until {
            Some(wait) => {
                let poll = wait
                    .poll_options(
                        &self.poll_defaults,
                        format!("{} {} at {}", spec.name, wait.pointer, path),
                    )
                    .with_cancellation(self.cancel.clone());
                self.client
                    .poll_get(path, options, &wait.predicate(), &poll)
                    .await?
            }
            None => self.client.get(path, options).await?,
        };
        *status = Some(response.status);

        if response.status != spec.expect.status {
            return Err(E2eError::UnexpectedStatus {
                path: path.clone(),
                expected: spec.expect.status,
                actual: response.status,
            });
        }

        if let Some(schema) = &spec.expect.schema {
            self.catalog.assert_valid(schema, &response.body)?;
        }

        Ok(())
    }

    /// Write test results to JSON file
    pub fn write_results(&self, results: &TestSuiteResult) -> E2eResult<PathBuf> {
        std::fs::create_dir_all(&self.output_dir)?;

        let path = self.output_dir.join("test-results.json");
        let json = serde_json::to_string_pretty(results)?;
        std::fs::write(&path, json)?;

        info!("Results written to: {}", path.display());
        Ok(path)
    }
}
