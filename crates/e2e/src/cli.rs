//! Command line of the e2e harness
//!
//! The harness is a `harness = false` test target, so `cargo test` hands it
//! the same arguments it hands libtest binaries: a positional name filter
//! plus flags such as `--nocapture`. Those are accepted and either mapped
//! onto our own selection or ignored.

use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;

use crate::error::E2eResult;
use crate::playwright::{Browser, PlaywrightConfig};
use crate::runner::{self, RunnerConfig, TestFilter};
use crate::storage::DEFAULT_STORAGE_KEY;
use crate::target::TargetConfig;
use crate::todomvc::DEFAULT_BASE_URL;

#[derive(Parser, Debug)]
#[command(name = "todomvc-e2e")]
#[command(about = "E2E browser tests for the TodoMVC demo")]
pub struct Args {
    /// URL of the app under test
    #[arg(long, env = "TODOMVC_BASE_URL", default_value = DEFAULT_BASE_URL)]
    pub base_url: String,

    /// Directory of YAML suites to run instead of the built-in suite
    #[arg(short, long, env = "TODOMVC_SPECS")]
    pub specs: Option<PathBuf>,

    /// Run only tests whose title matches this regex
    #[arg(short, long, env = "TODOMVC_GREP")]
    pub grep: Option<String>,

    /// Run only tests with this tag
    #[arg(short, long, env = "TODOMVC_TAG")]
    pub tag: Option<String>,

    /// Browser to use
    #[arg(long, env = "TODOMVC_BROWSER", value_enum, default_value_t = Browser::Chromium)]
    pub browser: Browser,

    /// Show the browser window
    #[arg(long, env = "TODOMVC_HEADED")]
    pub headed: bool,

    /// Tests of a parallel group run on at most this many browsers
    #[arg(short, long, env = "TODOMVC_WORKERS")]
    pub workers: Option<usize>,

    /// Re-run a failed test up to this many times
    #[arg(long, env = "TODOMVC_RETRIES", default_value = "0")]
    pub retries: u32,

    /// Whole-test timeout
    #[arg(long, env = "TODOMVC_TIMEOUT_MS", default_value = "30000")]
    pub timeout_ms: u64,

    /// Timeout of assertions and storage polls
    #[arg(long, env = "TODOMVC_EXPECT_TIMEOUT_MS", default_value = "5000")]
    pub expect_timeout_ms: u64,

    /// localStorage key holding the persisted items
    #[arg(long, env = "TODOMVC_STORAGE_KEY", default_value = DEFAULT_STORAGE_KEY)]
    pub storage_key: String,

    /// Skip the reachability probe of the base URL
    #[arg(long, env = "TODOMVC_SKIP_PROBE")]
    pub skip_probe: bool,

    /// Directory where generated scripts are written; must resolve `@playwright/test`
    #[arg(long, env = "TODOMVC_WORK_DIR", default_value = ".")]
    pub work_dir: PathBuf,

    /// Output directory for results
    #[arg(short, long, env = "TODOMVC_OUTPUT", default_value = "test-results")]
    pub output: PathBuf,

    /// Print the planned tests and exit
    #[arg(long, env = "TODOMVC_LIST")]
    pub list: bool,

    /// Fail instead of skipping when Playwright or the target is unavailable
    #[arg(long, env = "TODOMVC_E2E_REQUIRE")]
    pub require_browser: bool,

    /// libtest name filter: substring of the test title
    #[arg(hide = true)]
    pub test_filter: Option<String>,

    /// libtest: the name filter must equal the whole title
    #[arg(long, hide = true)]
    pub exact: bool,

    #[arg(long, hide = true)]
    pub nocapture: bool,

    #[arg(long, hide = true)]
    pub show_output: bool,

    #[arg(short, long, hide = true)]
    pub quiet: bool,

    #[arg(long, hide = true)]
    pub ignored: bool,

    #[arg(long, hide = true)]
    pub include_ignored: bool,

    #[arg(long, hide = true)]
    pub test_threads: Option<String>,

    #[arg(long, hide = true)]
    pub color: Option<String>,

    #[arg(long, hide = true)]
    pub format: Option<String>,
}

impl Args {
    /// Test selection. `--grep` wins over the libtest name filter.
    pub fn filter(&self) -> E2eResult<TestFilter> {
        let grep = match (&self.grep, &self.test_filter) {
            (Some(grep), _) => Some(grep.clone()),
            (None, Some(name)) if self.exact => Some(format!("^{}$", regex::escape(name))),
            (None, Some(name)) => Some(regex::escape(name)),
            (None, None) => None,
        };
        TestFilter::new(grep.as_deref(), self.tag.as_deref())
    }

    /// A libtest name filter that matches nothing here is meant for another
    /// test target of the package, so selecting no tests is not an error.
    pub fn selection_may_be_empty(&self) -> bool {
        self.grep.is_none() && self.test_filter.is_some()
    }

    pub fn runner_config(&self) -> RunnerConfig {
        RunnerConfig {
            playwright: PlaywrightConfig {
                base_url: self.base_url.clone(),
                screenshot_dir: self.output.join("screenshots"),
                work_dir: self.work_dir.clone(),
                browser: self.browser,
                headless: !self.headed,
                expect_timeout_ms: self.expect_timeout_ms,
                test_timeout: Duration::from_millis(self.timeout_ms),
                storage_key: self.storage_key.clone(),
                ..Default::default()
            },
            target: TargetConfig {
                base_url: self.base_url.clone(),
                ..Default::default()
            },
            skip_probe: self.skip_probe,
            workers: self.workers.unwrap_or_else(runner::default_workers),
            retries: self.retries,
            output_dir: self.output.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runner::plan;
    use crate::todomvc;
    use clap::CommandFactory;

    fn titles(args: &Args) -> Vec<String> {
        plan(&todomvc::suite(), &args.filter().unwrap())
            .into_iter()
            .flat_map(|g| g.tests)
            .map(|t| t.title)
            .collect()
    }

    #[test]
    fn test_command_is_well_formed() {
        Args::command().debug_assert();
    }

    #[test]
    fn test_accepts_libtest_arguments() {
        let args = Args::try_parse_from([
            "e2e",
            "test_slug",
            "--nocapture",
            "--quiet",
            "--test-threads",
            "1",
            "--color",
            "never",
            "--show-output",
        ])
        .unwrap();

        assert_eq!(args.test_filter.as_deref(), Some("test_slug"));
        assert!(args.selection_may_be_empty());
        assert!(titles(&args).is_empty());
    }

    #[test]
    fn test_name_filter_is_a_literal_substring() {
        let args = Args::try_parse_from(["e2e", "back button"]).unwrap();
        assert_eq!(titles(&args), ["Routing main › should respect the back button"]);

        // Regex metacharacters in a test name are matched literally
        let args = Args::try_parse_from(["e2e", "display (all)"]).unwrap();
        assert!(titles(&args).is_empty());
    }

    #[test]
    fn test_exact_name_filter() {
        let partial = Args::try_parse_from(["e2e", "should persist", "--exact"]).unwrap();
        assert!(titles(&partial).is_empty());

        let full = Args::try_parse_from([
            "e2e",
            "Persistence › should persist its data",
            "--exact",
        ])
        .unwrap();
        assert_eq!(titles(&full), ["Persistence › should persist its data"]);
    }

    #[test]
    fn test_grep_wins_over_name_filter() {
        let args = Args::try_parse_from(["e2e", "persist", "--grep", "filter$"]).unwrap();
        assert!(!args.selection_may_be_empty());
        assert_eq!(
            titles(&args),
            ["Routing main › should highlight the currently applied filter"]
        );
    }

    #[test]
    fn test_every_visible_option_has_an_env_var() {
        let command = Args::command();
        let missing: Vec<_> = command
            .get_arguments()
            .filter(|a| !a.is_positional() && !a.is_hide_set())
            .filter(|a| !matches!(a.get_id().as_str(), "help" | "version"))
            .filter(|a| a.get_env().is_none())
            .map(|a| a.get_id().to_string())
            .collect();
        assert!(missing.is_empty(), "options without env var: {:?}", missing);
    }

    #[test]
    fn test_runner_config_from_args() {
        let args = Args::try_parse_from([
            "e2e",
            "--headed",
            "--workers",
            "3",
            "--timeout-ms",
            "1000",
            "--output",
            "out",
        ])
        .unwrap();
        let config = args.runner_config();

        assert!(!config.playwright.headless);
        assert_eq!(config.workers, 3);
        assert_eq!(config.playwright.test_timeout, Duration::from_secs(1));
        assert_eq!(config.playwright.screenshot_dir, PathBuf::from("out/screenshots"));
        assert_eq!(config.target.base_url, DEFAULT_BASE_URL);
    }
}
