//! Playwright browser automation
//!
//! Each test is rendered into one self-contained Node.js script that
//! launches its own browser and context, runs the steps in order and
//! reports progress as `@@todomvc-e2e {json}` lines on stdout.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::OnceLock;
use std::time::{Duration, Instant};

use regex::Regex;
use serde::{Deserialize, Serialize};
use tokio::process::Command as TokioCommand;
use tracing::{debug, warn};

use crate::error::{E2eError, E2eResult};
use crate::spec::TestStep;
use crate::storage::{self, StorageProbe, TodoRecord, DEFAULT_STORAGE_KEY};
use crate::todomvc::{self, DEFAULT_BASE_URL};

/// Prefix of every event line the generated script prints
pub const EVENT_PREFIX: &str = "@@todomvc-e2e ";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum Browser {
    #[default]
    Chromium,
    Firefox,
    Webkit,
}

impl Browser {
    fn as_str(&self) -> &'static str {
        match self {
            Browser::Chromium => "chromium",
            Browser::Firefox => "firefox",
            Browser::Webkit => "webkit",
        }
    }
}

/// Result of executing a test step
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepResult {
    pub success: bool,
    pub step_name: String,
    pub duration_ms: u64,
    pub error: Option<String>,
}

/// Everything one script run reported back
#[derive(Debug, Clone, Default)]
pub struct TestRun {
    pub steps: Vec<StepResult>,
    pub storage: Option<Vec<TodoRecord>>,
    pub error: Option<String>,
    pub screenshot_path: Option<PathBuf>,
    pub duration_ms: u64,
}

impl TestRun {
    pub fn success(&self) -> bool {
        self.error.is_none()
    }
}

/// One line of the script's event stream
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ScriptEvent {
    Step {
        index: usize,
        name: String,
        success: bool,
        duration_ms: u64,
        #[serde(default)]
        error: Option<String>,
    },
    Failed {
        #[serde(default)]
        error: String,
    },
    Screenshot {
        path: PathBuf,
    },
    Storage {
        key: String,
        value: Option<String>,
    },
    Done {
        success: bool,
    },
}

/// Playwright browser handle
pub struct PlaywrightHandle {
    config: PlaywrightConfig,
    storage: StorageProbe,
}

impl PlaywrightHandle {
    /// Create a new Playwright handle
    pub async fn new(config: PlaywrightConfig) -> E2eResult<Self> {
        check_playwright_installed(&config.npx_binary, config.install_check_timeout).await?;
        Self::unchecked(config)
    }

    /// Create a handle without probing for an installed Playwright.
    /// Rendering scripts needs nothing installed.
    pub fn unchecked(config: PlaywrightConfig) -> E2eResult<Self> {
        std::fs::create_dir_all(&config.screenshot_dir)?;
        std::fs::create_dir_all(&config.work_dir)?;

        Ok(Self {
            storage: StorageProbe::new(config.storage_key.clone()),
            config,
        })
    }

    /// Run one test in a fresh browser and collect what it reported
    pub async fn run_test(&self, title: &str, steps: &[TestStep]) -> E2eResult<TestRun> {
        let start = Instant::now();
        let screenshot = self.config.screenshot_dir.join(format!("{}.png", slug(title)));
        let script = self.build_script(steps, &screenshot);

        let temp_dir = tempfile::Builder::new()
            .prefix(".todomvc-e2e-")
            .tempdir_in(&self.config.work_dir)?;
        let script_path = temp_dir.path().join("test.js");
        std::fs::write(&script_path, &script)?;

        debug!("Running Playwright script for '{}': {}", title, script_path.display());

        let child = TokioCommand::new(&self.config.node_binary)
            .arg(&script_path)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                E2eError::Playwright(format!(
                    "Failed to spawn {}: {}",
                    self.config.node_binary.display(),
                    e
                ))
            })?;

        let output = tokio::time::timeout(self.config.test_timeout, child.wait_with_output())
            .await
            .map_err(|_| E2eError::Timeout {
                test: title.to_string(),
                timeout: self.config.test_timeout,
            })??;

        let stdout = String::from_utf8_lossy(&output.stdout);
        let stderr = String::from_utf8_lossy(&output.stderr);
        let mut run = collect_run(parse_events(&stdout), output.status.success(), &stderr);
        run.duration_ms = start.elapsed().as_millis() as u64;
        Ok(run)
    }

    /// Build the Playwright script for a test
    pub fn build_script(&self, steps: &[TestStep], failure_screenshot: &Path) -> String {
        let mut script = String::new();

        script.push_str(&format!(
            r#"const {{ chromium, firefox, webkit, expect }} = require('@playwright/test');

const report = (event) => console.log({prefix} + JSON.stringify(event));

const errorText = (error) => String(error?.message ?? error);

const runStep = async (index, name, body) => {{
  const started = Date.now();
  try {{
    await body();
    report({{ event: 'step', index, name, success: true, duration_ms: Date.now() - started }});
  }} catch (error) {{
    report({{ event: 'step', index, name, success: false, duration_ms: Date.now() - started, error: errorText(error) }});
    throw error;
  }}
}};

(async () => {{
  const browser = await {browser}.launch({{ headless: {headless} }});
  const context = await browser.newContext({{
    viewport: {{ width: {width}, height: {height} }}
  }});
  context.setDefaultTimeout({action_timeout});
  const page = await context.newPage();
  let failed = false;

  try {{
"#,
            prefix = js(EVENT_PREFIX),
            browser = self.config.browser.as_str(),
            headless = self.config.headless,
            width = self.config.viewport_width,
            height = self.config.viewport_height,
            action_timeout = self.config.action_timeout_ms,
        ));

        for (i, step) in steps.iter().enumerate() {
            script.push_str(&format!(
                "    await runStep({}, {}, async () => {{\n",
                i,
                js(&step.label())
            ));
            self.step_to_js(step, &mut script);
            script.push_str("    });\n");
        }

        script.push_str(&format!(
            r#"  }} catch (error) {{
    failed = true;
    report({{ event: 'failed', error: errorText(error) }});
    try {{
      await page.screenshot({{ path: {shot}, fullPage: true }});
      report({{ event: 'screenshot', path: {shot} }});
    }} catch (_) {{}}
  }}

  try {{
    report({{ event: 'storage', key: {key}, value: await {snapshot} }});
  }} catch (_) {{}}

  await browser.close();
  report({{ event: 'done', success: !failed }});
  process.exit(failed ? 1 : 0);
}})();
"#,
            shot = js(&failure_screenshot.to_string_lossy()),
            key = js(self.storage.key()),
            snapshot = self.storage.snapshot(),
        ));

        script
    }

    /// Append the statements of one step
    fn step_to_js(&self, step: &TestStep, out: &mut String) {
        let expect_timeout = self.config.expect_timeout_ms;
        let line = match step {
            TestStep::Goto { url } => {
                format!("await page.goto({});", js(&resolve_url(&self.config.base_url, url)))
            }
            TestStep::Reload => "await page.reload();".to_string(),
            TestStep::GoBack => "await page.goBack();".to_string(),
            TestStep::Fill { selector, value } => {
                format!("await page.locator({}).fill({});", js(selector), js(value))
            }
            TestStep::Press { selector, key } => {
                format!("await page.locator({}).press({});", js(selector), js(key))
            }
            TestStep::Click { selector } => {
                format!("await page.locator({}).click();", js(selector))
            }
            TestStep::Check { selector } => {
                format!("await page.locator({}).check();", js(selector))
            }
            TestStep::Uncheck { selector } => {
                format!("await page.locator({}).uncheck();", js(selector))
            }
            TestStep::ExpectText { selector, texts } => format!(
                "await expect(page.locator({})).toHaveText({}, {{ timeout: {} }});",
                js(selector),
                serde_json::Value::from(texts.clone()),
                expect_timeout
            ),
            TestStep::ExpectClass { selector, classes } => {
                // A single class compares one element's whole class attribute.
                let expected = match classes.as_slice() {
                    [only] => js(only),
                    _ => serde_json::Value::from(classes.clone()).to_string(),
                };
                format!(
                    "await expect(page.locator({})).toHaveClass({}, {{ timeout: {} }});",
                    js(selector),
                    expected,
                    expect_timeout
                )
            }
            TestStep::ExpectCount { selector, count } => format!(
                "await expect(page.locator({})).toHaveCount({}, {{ timeout: {} }});",
                js(selector),
                count,
                expect_timeout
            ),
            TestStep::WaitForCompletedCount { expected } => self
                .storage
                .wait_for_completed_count(*expected, expect_timeout),
            TestStep::WaitForTitle { title } => {
                self.storage.wait_for_title(title, expect_timeout)
            }
            TestStep::CreateTodos { items } => {
                for inner in todomvc::create_todos(items.as_slice()) {
                    self.step_to_js(&inner, out);
                }
                return;
            }
            TestStep::Step { name, steps } => {
                out.push_str(&format!("      // {}\n", name.replace('\n', " ")));
                for inner in steps {
                    self.step_to_js(inner, out);
                }
                return;
            }
            TestStep::Screenshot { name } => {
                let path = self.config.screenshot_dir.join(format!("{}.png", slug(name)));
                format!("await page.screenshot({{ path: {} }});", js(&path.to_string_lossy()))
            }
            TestStep::Log { message } => {
                format!("console.log({});", js(&format!("[TEST] {}", message)))
            }
        };

        out.push_str("      ");
        out.push_str(&line);
        out.push('\n');
    }
}

/// Check if Playwright is installed. A check that hangs past `timeout`
/// counts as not installed.
pub async fn check_playwright_installed(npx: &Path, timeout: Duration) -> E2eResult<()> {
    let status = TokioCommand::new(npx)
        .args(["--no-install", "playwright", "--version"])
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .kill_on_drop(true)
        .status();

    match tokio::time::timeout(timeout, status).await {
        Ok(Ok(status)) if status.success() => Ok(()),
        Ok(_) => Err(E2eError::PlaywrightNotFound),
        Err(_) => {
            warn!("Playwright install check timed out after {:?}", timeout);
            Err(E2eError::PlaywrightNotFound)
        }
    }
}

/// Configuration for Playwright
#[derive(Debug, Clone)]
pub struct PlaywrightConfig {
    pub base_url: String,
    pub screenshot_dir: PathBuf,
    /// Generated scripts are written below this directory. Node resolves
    /// `@playwright/test` from here, so it should sit inside the npm project.
    pub work_dir: PathBuf,
    pub node_binary: PathBuf,
    pub npx_binary: PathBuf,
    pub install_check_timeout: Duration,
    pub viewport_width: u32,
    pub viewport_height: u32,
    pub browser: Browser,
    pub headless: bool,
    pub action_timeout_ms: u64,
    pub expect_timeout_ms: u64,
    pub test_timeout: Duration,
    pub storage_key: String,
}

impl Default for PlaywrightConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            screenshot_dir: PathBuf::from("test-results/screenshots"),
            work_dir: PathBuf::from("."),
            node_binary: PathBuf::from("node"),
            npx_binary: PathBuf::from("npx"),
            install_check_timeout: Duration::from_secs(15),
            viewport_width: 1280,
            viewport_height: 720,
            browser: Browser::Chromium,
            headless: true,
            action_timeout_ms: 0,
            expect_timeout_ms: 5000,
            test_timeout: Duration::from_secs(30),
            storage_key: DEFAULT_STORAGE_KEY.to_string(),
        }
    }
}

/// Extract events from the script's stdout, skipping any other output
pub fn parse_events(stdout: &str) -> Vec<ScriptEvent> {
    let mut events = Vec::new();

    for line in stdout.lines() {
        let Some(payload) = line.strip_prefix(EVENT_PREFIX) else {
            if !line.trim().is_empty() {
                debug!("[playwright] {}", line);
            }
            continue;
        };

        match serde_json::from_str(payload) {
            Ok(event) => events.push(event),
            Err(e) => warn!("Unparseable event line ({}): {}", e, payload),
        }
    }

    events
}

/// Fold the event stream and exit status into a [`TestRun`]
pub fn collect_run(events: Vec<ScriptEvent>, exited_ok: bool, stderr: &str) -> TestRun {
    let mut run = TestRun::default();
    let mut done = None;

    for event in events {
        match event {
            ScriptEvent::Step { name, success, duration_ms, error, .. } => {
                run.steps.push(StepResult {
                    success,
                    step_name: name,
                    duration_ms,
                    error: error.map(|e| strip_ansi(&e)),
                });
            }
            ScriptEvent::Failed { error } => {
                let reason = strip_ansi(&error);
                let failed_step = run.steps.last().filter(|s| !s.success);
                run.error = Some(match failed_step {
                    Some(step) => E2eError::StepFailed {
                        step: step.step_name.clone(),
                        reason,
                    }
                    .to_string(),
                    None => reason,
                });
            }
            ScriptEvent::Screenshot { path } => run.screenshot_path = Some(path),
            ScriptEvent::Storage { key, value } => {
                match storage::parse_records(value.as_deref()) {
                    Ok(records) => run.storage = Some(records),
                    Err(e) => warn!("Could not read storage key '{}': {}", key, e),
                }
            }
            ScriptEvent::Done { success } => done = Some(success),
        }
    }

    if run.error.is_none() && (done != Some(true) || !exited_ok) {
        let stderr = strip_ansi(stderr.trim());
        run.error = Some(if stderr.is_empty() {
            "Playwright script exited without reporting completion".to_string()
        } else {
            format!("Script failed:\nstderr: {}", stderr)
        });
    }

    run
}

/// Resolve a step URL against the base URL
pub fn resolve_url(base_url: &str, url: &str) -> String {
    if url.starts_with("http://") || url.starts_with("https://") {
        url.to_string()
    } else if url.is_empty() || url.starts_with('#') {
        format!("{}{}", base_url, url)
    } else {
        format!(
            "{}/{}",
            base_url.trim_end_matches('/'),
            url.trim_start_matches('/')
        )
    }
}

/// File-name-safe form of a test title
pub fn slug(title: &str) -> String {
    let mut slug = String::with_capacity(title.len());
    for c in title.chars() {
        if c.is_ascii_alphanumeric() {
            slug.push(c.to_ascii_lowercase());
        } else if !slug.ends_with('-') {
            slug.push('-');
        }
    }
    slug.trim_matches('-').to_string()
}

fn strip_ansi(text: &str) -> String {
    static ANSI: OnceLock<Regex> = OnceLock::new();
    let ansi = ANSI.get_or_init(|| Regex::new(r"\x1b\[[0-9;]*m").expect("valid ANSI regex"));
    ansi.replace_all(text, "").into_owned()
}

/// JavaScript string literal
fn js(value: &str) -> String {
    serde_json::Value::from(value).to_string()
}
