use std::process::Command;
use std::time::Duration;

use todomvc_e2e::playwright::PlaywrightConfig;
use todomvc_e2e::runner::RunnerConfig;
use todomvc_e2e::{todomvc, TestFilter, TestRunner};

fn playwright_available() -> bool {
    Command::new("npx")
        .args(["--no-install", "playwright", "--version"])
        .output()
        .map(|o| o.status.success())
        .unwrap_or(false)
}

/// Live run of the persistence test against the public demo
///
/// Marked ignored because it needs Node, Playwright browsers and network.
#[tokio::test]
#[ignore]
async fn persistence_survives_reload_on_public_demo() {
    if !playwright_available() {
        eprintln!("Skipping: playwright not available");
        return;
    }

    let output = tempfile::tempdir().expect("create output dir");
    let mut runner = TestRunner::with_config(RunnerConfig {
        playwright: PlaywrightConfig {
            screenshot_dir: output.path().join("screenshots"),
            test_timeout: Duration::from_secs(60),
            ..Default::default()
        },
        output_dir: output.path().to_path_buf(),
        retries: 1,
        ..Default::default()
    });

    let filter = TestFilter::new(Some("persist"), None).expect("valid filter");
    let results = runner
        .run_suite(&todomvc::suite(), &filter)
        .await
        .expect("run suite");

    assert_eq!(results.total, 1);
    let result = &results.results[0];
    assert!(result.success, "test failed: {:?}", result.error);

    let stored = result.storage.as_ref().expect("storage snapshot");
    let titles: Vec<_> = stored.iter().map(|r| r.title.as_str()).collect();
    assert_eq!(titles, &todomvc::TODO_ITEMS_FIXTURE[..2]);
    assert!(stored[0].completed);
    assert!(!stored[1].completed);
}
