//! Main test runner that orchestrates planning, Playwright runs and reporting

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use crate::error::{E2eError, E2eResult};
use crate::playwright::{PlaywrightConfig, PlaywrightHandle, StepResult, TestRun};
use crate::spec::{TestStep, TestSuite};
use crate::storage::{self, TodoRecord};
use crate::target::{self, TargetConfig};

/// Separator between group and test name in titles
pub const TITLE_SEPARATOR: &str = " › ";

/// A test with all hooks composed in front of its body
#[derive(Debug, Clone)]
pub struct PlannedTest {
    pub suite: String,
    pub group: String,
    pub name: String,
    pub title: String,
    pub steps: Vec<TestStep>,
}

#[derive(Debug, Clone)]
pub struct PlannedGroup {
    pub name: String,
    pub parallel: bool,
    pub tests: Vec<PlannedTest>,
}

/// Selects which tests run
#[derive(Debug, Clone, Default)]
pub struct TestFilter {
    grep: Option<Regex>,
    tag: Option<String>,
}

impl TestFilter {
    pub fn new(grep: Option<&str>, tag: Option<&str>) -> E2eResult<Self> {
        let grep = grep
            .map(Regex::new)
            .transpose()
            .map_err(|e| E2eError::SpecParse(format!("invalid grep pattern: {}", e)))?;
        Ok(Self {
            grep,
            tag: tag.map(String::from),
        })
    }

    fn describe(&self) -> String {
        match (&self.grep, &self.tag) {
            (Some(re), Some(tag)) => format!("grep '{}' and tag '{}'", re, tag),
            (Some(re), None) => format!("grep '{}'", re),
            (None, Some(tag)) => format!("tag '{}'", tag),
            (None, None) => "any filter".to_string(),
        }
    }

    fn matches(&self, title: &str, tags: &[String]) -> bool {
        let grep_ok = self.grep.as_ref().map_or(true, |re| re.is_match(title));
        let tag_ok = self.tag.as_ref().map_or(true, |t| tags.contains(t));
        grep_ok && tag_ok
    }
}

/// Expand a suite into runnable tests, dropping groups left empty by the filter
pub fn plan(suite: &TestSuite, filter: &TestFilter) -> Vec<PlannedGroup> {
    suite
        .groups
        .iter()
        .map(|group| PlannedGroup {
            name: group.name.clone(),
            parallel: group.parallel,
            tests: group
                .tests
                .iter()
                .map(|test| (test, format!("{}{}{}", group.name, TITLE_SEPARATOR, test.name)))
                .filter(|(test, title)| filter.matches(title, &test.tags))
                .map(|(test, title)| PlannedTest {
                    suite: suite.name.clone(),
                    group: group.name.clone(),
                    name: test.name.clone(),
                    title,
                    steps: suite
                        .before_each
                        .iter()
                        .chain(&group.before_each)
                        .chain(&test.steps)
                        .cloned()
                        .collect(),
                })
                .collect(),
        })
        .filter(|group| !group.tests.is_empty())
        .collect()
}

/// Result of running a single test
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestResult {
    pub suite: String,
    pub title: String,
    pub success: bool,
    /// Passed, but only after a retry
    pub flaky: bool,
    pub attempts: u32,
    pub duration_ms: u64,
    pub steps: Vec<StepResult>,
    /// Storage record as left by the last attempt
    pub storage: Option<Vec<TodoRecord>>,
    pub error: Option<String>,
    pub screenshot_path: Option<PathBuf>,
}

impl TestResult {
    fn from_run(test: &PlannedTest, attempts: u32, run: TestRun) -> Self {
        let success = run.success();
        Self {
            suite: test.suite.clone(),
            title: test.title.clone(),
            success,
            flaky: success && attempts > 1,
            attempts,
            duration_ms: run.duration_ms,
            steps: run.steps,
            storage: run.storage,
            error: run.error,
            screenshot_path: run.screenshot_path,
        }
    }

    fn from_error(test: &PlannedTest, attempts: u32, err: &E2eError) -> Self {
        Self {
            suite: test.suite.clone(),
            title: test.title.clone(),
            success: false,
            flaky: false,
            attempts,
            duration_ms: 0,
            steps: Vec::new(),
            storage: None,
            error: Some(err.to_string()),
            screenshot_path: None,
        }
    }
}

/// Result of running all tests
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestSuiteResult {
    pub started_at: DateTime<Utc>,
    pub total: usize,
    pub passed: usize,
    pub failed: usize,
    pub flaky: usize,
    pub duration_ms: u64,
    pub results: Vec<TestResult>,
}

impl TestSuiteResult {
    pub fn from_results(started_at: DateTime<Utc>, duration: Duration, results: Vec<TestResult>) -> Self {
        let passed = results.iter().filter(|r| r.success).count();
        Self {
            started_at,
            total: results.len(),
            passed,
            failed: results.len() - passed,
            flaky: results.iter().filter(|r| r.flaky).count(),
            duration_ms: duration.as_millis() as u64,
            results,
        }
    }

    pub fn success(&self) -> bool {
        self.failed == 0
    }
}

/// Main E2E test runner
pub struct TestRunner {
    playwright_config: PlaywrightConfig,
    target_config: TargetConfig,
    skip_probe: bool,
    workers: usize,
    retries: u32,
    output_dir: PathBuf,

    /// Playwright handle, created on first run
    playwright: Option<Arc<PlaywrightHandle>>,
}

impl TestRunner {
    /// Create a new test runner with default configuration
    pub fn new() -> Self {
        Self::with_config(RunnerConfig::default())
    }

    /// Create a test runner with custom configuration
    pub fn with_config(config: RunnerConfig) -> Self {
        Self {
            playwright_config: config.playwright,
            target_config: config.target,
            skip_probe: config.skip_probe,
            workers: config.workers.max(1),
            retries: config.retries,
            output_dir: config.output_dir,
            playwright: None,
        }
    }

    /// Probe the target and check Playwright is installed
    pub async fn prepare(&mut self) -> E2eResult<Arc<PlaywrightHandle>> {
        if let Some(handle) = &self.playwright {
            return Ok(handle.clone());
        }

        if !self.skip_probe {
            target::wait_until_reachable(&self.target_config).await?;
        }

        let handle = Arc::new(PlaywrightHandle::new(self.playwright_config.clone()).await?);
        self.playwright = Some(handle.clone());
        Ok(handle)
    }

    pub async fn run_suite(&mut self, suite: &TestSuite, filter: &TestFilter) -> E2eResult<TestSuiteResult> {
        self.run_suites(std::slice::from_ref(suite), filter).await
    }

    /// Run every matching test. Groups run one after another; tests of a
    /// parallel group share the worker pool.
    pub async fn run_suites(&mut self, suites: &[TestSuite], filter: &TestFilter) -> E2eResult<TestSuiteResult> {
        let started_at = Utc::now();
        let start = Instant::now();

        let groups: Vec<PlannedGroup> = suites.iter().flat_map(|s| plan(s, filter)).collect();
        let count: usize = groups.iter().map(|g| g.tests.len()).sum();
        if count == 0 {
            return Err(E2eError::TestNotFound(format!(
                "no tests match {}",
                filter.describe()
            )));
        }

        let handle = self.prepare().await?;

        info!(
            "Running {} test(s) using {} worker(s)...",
            count, self.workers
        );

        let mut results = Vec::with_capacity(count);
        for group in groups {
            debug!("Group: {} (parallel: {})", group.name, group.parallel);
            let group_results = if group.parallel {
                self.run_parallel(&handle, group.tests).await?
            } else {
                let mut sequential = Vec::new();
                for test in &group.tests {
                    sequential.push(run_with_retries(&handle, test, self.retries).await);
                }
                sequential
            };
            results.extend(group_results);
        }

        let summary = TestSuiteResult::from_results(started_at, start.elapsed(), results);

        info!("");
        info!(
            "Test Results: {} passed, {} failed, {} flaky ({} ms)",
            summary.passed, summary.failed, summary.flaky, summary.duration_ms
        );

        Ok(summary)
    }

    async fn run_parallel(
        &self,
        handle: &Arc<PlaywrightHandle>,
        tests: Vec<PlannedTest>,
    ) -> E2eResult<Vec<TestResult>> {
        let semaphore = Arc::new(Semaphore::new(self.workers));
        let mut set = JoinSet::new();
        let mut slots: Vec<Option<TestResult>> = vec![None; tests.len()];

        for (index, test) in tests.into_iter().enumerate() {
            let semaphore = semaphore.clone();
            let handle = handle.clone();
            let retries = self.retries;
            set.spawn(async move {
                let _permit = semaphore.acquire_owned().await.ok();
                (index, run_with_retries(&handle, &test, retries).await)
            });
        }

        while let Some(joined) = set.join_next().await {
            let (index, result) = joined?;
            slots[index] = Some(result);
        }

        // Report in declaration order, not completion order
        Ok(slots.into_iter().flatten().collect())
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

impl Default for TestRunner {
    fn default() -> Self {
        Self::new()
    }
}

/// Run a test, re-running it after a failure up to `retries` times
async fn run_with_retries(handle: &PlaywrightHandle, test: &PlannedTest, retries: u32) -> TestResult {
    let mut attempt = 0;
    loop {
        attempt += 1;
        let result = match handle.run_test(&test.title, &test.steps).await {
            Ok(run) => TestResult::from_run(test, attempt, run),
            Err(e) => TestResult::from_error(test, attempt, &e),
        };

        if result.success {
            log_pass(&result);
            return result;
        }
        if attempt > retries {
            error!(
                "✗ {} - {}",
                result.title,
                result.error.as_deref().unwrap_or("unknown error")
            );
            return result;
        }
        warn!(
            "Retrying '{}' (attempt {} of {}): {}",
            result.title,
            attempt + 1,
            retries + 1,
            result.error.as_deref().unwrap_or("unknown error")
        );
    }
}

fn log_pass(result: &TestResult) {
    let flaky = if result.flaky { " [flaky]" } else { "" };
    info!("✓ {} ({} ms){}", result.title, result.duration_ms, flaky);
    if let Some(records) = &result.storage {
        debug!(
            "  {} item(s) persisted, {} completed",
            records.len(),
            storage::completed_count(records)
        );
    }
}

/// Configuration for the test runner
#[derive(Debug, Clone)]
pub struct RunnerConfig {
    pub playwright: PlaywrightConfig,
    pub target: TargetConfig,
    /// Skip the reachability probe, e.g. for targets behind auth
    pub skip_probe: bool,
    pub workers: usize,
    pub retries: u32,
    pub output_dir: PathBuf,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            playwright: PlaywrightConfig::default(),
            target: TargetConfig::default(),
            skip_probe: false,
            workers: default_workers(),
            retries: 0,
            output_dir: PathBuf::from("test-results"),
        }
    }
}

/// Half the available cores, at least one
pub fn default_workers() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get() / 2)
        .unwrap_or(1)
        .max(1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spec::{TestCase, TestGroup};
    use crate::todomvc;

    fn result(title: &str, success: bool, attempts: u32) -> TestResult {
        TestResult {
            suite: "todomvc".into(),
            title: title.into(),
            success,
            flaky: success && attempts > 1,
            attempts,
            duration_ms: 10,
            steps: Vec::new(),
            storage: None,
            error: (!success).then(|| "boom".to_string()),
            screenshot_path: None,
        }
    }

    #[test]
    fn test_plan_composes_hooks_in_order() {
        let suite = TestSuite {
            name: "s".into(),
            description: String::new(),
            before_each: vec![TestStep::Goto { url: String::new() }],
            groups: vec![TestGroup {
                name: "G".into(),
                parallel: false,
                before_each: vec![TestStep::Reload],
                tests: vec![TestCase {
                    name: "t".into(),
                    tags: vec![],
                    steps: vec![TestStep::GoBack],
                }],
            }],
        };

        let groups = plan(&suite, &TestFilter::default());
        assert_eq!(groups.len(), 1);
        let test = &groups[0].tests[0];
        assert_eq!(test.title, "G › t");
        assert_eq!(
            test.steps,
            vec![TestStep::Goto { url: String::new() }, TestStep::Reload, TestStep::GoBack]
        );
    }

    #[test]
    fn test_plan_grep_drops_empty_groups() {
        let filter = TestFilter::new(Some("back button"), None).unwrap();
        let groups = plan(&todomvc::suite(), &filter);
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].name, "Routing main");
        assert_eq!(groups[0].tests.len(), 1);
        assert_eq!(groups[0].tests[0].title, "Routing main › should respect the back button");
    }

    #[test]
    fn test_plan_tag_filter() {
        let filter = TestFilter::new(None, Some("persistence")).unwrap();
        let groups = plan(&todomvc::suite(), &filter);
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].tests[0].name, "should persist its data");
    }

    #[test]
    fn test_invalid_grep() {
        let err = TestFilter::new(Some("(unclosed"), None).unwrap_err();
        assert!(matches!(err, E2eError::SpecParse(_)));
    }

    #[tokio::test]
    async fn test_empty_selection_is_an_error() {
        let filter = TestFilter::new(Some("no such test"), None).unwrap();
        let mut runner = TestRunner::new();
        let err = runner.run_suite(&todomvc::suite(), &filter).await.unwrap_err();
        assert!(matches!(err, E2eError::TestNotFound(_)));
        assert!(err.to_string().contains("grep 'no such test'"));
    }

    #[test]
    fn test_suite_result_counts() {
        let summary = TestSuiteResult::from_results(
            Utc::now(),
            Duration::from_millis(1500),
            vec![result("a", true, 1), result("b", true, 2), result("c", false, 3)],
        );
        assert_eq!(summary.total, 3);
        assert_eq!(summary.passed, 2);
        assert_eq!(summary.failed, 1);
        assert_eq!(summary.flaky, 1);
        assert_eq!(summary.duration_ms, 1500);
        assert!(!summary.success());
    }

    #[test]
    fn test_write_results() {
        let dir = tempfile::tempdir().unwrap();
        let runner = TestRunner::with_config(RunnerConfig {
            output_dir: dir.path().join("out"),
            ..Default::default()
        });
        let summary = TestSuiteResult::from_results(Utc::now(), Duration::ZERO, vec![result("a", true, 1)]);

        let path = runner.write_results(&summary).unwrap();
        let written: serde_json::Value = serde_json::from_str(&std::fs::read_to_string(path).unwrap()).unwrap();
        assert_eq!(written["passed"], 1);
        assert_eq!(written["results"][0]["title"], "a");
    }

    /// Stand-in for `node` that runs a shell body instead of the rendered
    /// script. `$1` is the path of the rendered script.
    #[cfg(unix)]
    fn fake_node(dir: &std::path::Path, body: &str) -> (PathBuf, Arc<PlaywrightHandle>) {
        use std::os::unix::fs::PermissionsExt;

        let node = dir.join("fake-node");
        std::fs::write(&node, format!("#!/bin/sh\n{}\n", body)).unwrap();
        std::fs::set_permissions(&node, std::fs::Permissions::from_mode(0o755)).unwrap();

        let handle = PlaywrightHandle::unchecked(PlaywrightConfig {
            screenshot_dir: dir.join("screenshots"),
            work_dir: dir.to_path_buf(),
            node_binary: node.clone(),
            test_timeout: Duration::from_secs(10),
            ..Default::default()
        })
        .unwrap();
        (node, Arc::new(handle))
    }

    fn planned(title: &str) -> PlannedTest {
        PlannedTest {
            suite: "s".into(),
            group: "G".into(),
            name: title.into(),
            title: format!("G › {}", title),
            steps: vec![TestStep::Reload],
        }
    }

    const DONE: &str = r#"echo '@@todomvc-e2e {"event":"done","success":true}'"#;

    #[cfg(unix)]
    #[tokio::test]
    async fn test_retry_after_failure_marks_flaky() {
        let dir = tempfile::tempdir().unwrap();
        let marker = dir.path().join("attempted");
        let body = format!(
            r#"if [ -f "{marker}" ]; then {done}; exit 0; fi
touch "{marker}"
echo '@@todomvc-e2e {{"event":"failed","error":"first attempt"}}'
exit 1"#,
            marker = marker.display(),
            done = DONE,
        );
        let (_, handle) = fake_node(dir.path(), &body);

        let result = run_with_retries(&handle, &planned("flaky"), 1).await;
        assert!(result.success, "unexpected failure: {:?}", result.error);
        assert_eq!(result.attempts, 2);
        assert!(result.flaky);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_retries_exhausted() {
        let dir = tempfile::tempdir().unwrap();
        let body = r#"echo '@@todomvc-e2e {"event":"failed","error":"always"}'
exit 1"#;
        let (_, handle) = fake_node(dir.path(), body);

        let result = run_with_retries(&handle, &planned("broken"), 2).await;
        assert!(!result.success);
        assert!(!result.flaky);
        assert_eq!(result.attempts, 3);
        assert_eq!(result.error.as_deref(), Some("always"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_slow_test_times_out() {
        let dir = tempfile::tempdir().unwrap();
        let (node, _) = fake_node(dir.path(), "sleep 5");
        let handle = PlaywrightHandle::unchecked(PlaywrightConfig {
            screenshot_dir: dir.path().join("screenshots"),
            work_dir: dir.path().to_path_buf(),
            node_binary: node,
            test_timeout: Duration::from_millis(300),
            ..Default::default()
        })
        .unwrap();

        let start = Instant::now();
        let err = handle.run_test("G › slow", &[TestStep::Reload]).await.unwrap_err();
        assert!(start.elapsed() < Duration::from_secs(3));
        match &err {
            E2eError::Timeout { test, timeout } => {
                assert_eq!(test, "G › slow");
                assert_eq!(*timeout, Duration::from_millis(300));
            }
            other => panic!("unexpected error: {}", other),
        }

        let result = run_with_retries(&handle, &planned("slow"), 0).await;
        assert!(!result.success);
        assert!(result.error.unwrap().contains("timed out after 300ms"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_parallel_results_in_declaration_order() {
        let dir = tempfile::tempdir().unwrap();
        // The failure screenshot path embeds the title slug, so the rendered
        // script tells the tests apart. The first test finishes last.
        let body = format!(r#"if grep -q "g-first" "$1"; then sleep 1; fi
{}"#, DONE);
        let (_, handle) = fake_node(dir.path(), &body);

        let runner = TestRunner::with_config(RunnerConfig {
            workers: 3,
            ..Default::default()
        });
        let tests = vec![planned("first"), planned("second"), planned("third")];
        let results = runner.run_parallel(&handle, tests).await.unwrap();

        let titles: Vec<_> = results.iter().map(|r| r.title.as_str()).collect();
        assert_eq!(titles, ["G › first", "G › second", "G › third"]);
        assert!(results.iter().all(|r| r.success && r.attempts == 1));
    }

    #[test]
    fn test_default_workers_at_least_one() {
        assert!(default_workers() >= 1);
    }
}
