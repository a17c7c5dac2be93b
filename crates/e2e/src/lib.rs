//! TodoMVC E2E Test Framework
//!
//! End-to-end browser tests for the TodoMVC demo, controlled from Rust:
//! - Describes tests declaratively (built in, or YAML suites)
//! - Renders each test into a Playwright script and runs it in its own browser
//! - Polls the app's persisted `localStorage` record to avoid flaky reads
//! - Runs groups in parallel on a bounded worker pool, with retries
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    E2E Test Runner (Rust)                   │
//! ├─────────────────────────────────────────────────────────────┤
//! │  TestRunner                                                 │
//! │    ├── prepare() -> probe target, check Playwright          │
//! │    ├── plan(suite, filter) -> [PlannedGroup]                │
//! │    ├── run_suites(..) -> TestSuiteResult                    │
//! │    └── write_results(..) -> test-results.json               │
//! ├─────────────────────────────────────────────────────────────┤
//! │  PlaywrightHandle                                           │
//! │    ├── build_script(steps) -> node script                   │
//! │    └── run_test(title, steps) -> TestRun (event stream)     │
//! ├─────────────────────────────────────────────────────────────┤
//! │  TestSuite                                                  │
//! │    ├── before_each: [TestStep]                              │
//! │    └── groups: [TestGroup { parallel, before_each, tests }] │
//! └─────────────────────────────────────────────────────────────┘
//! ```

pub mod cli;
pub mod error;
pub mod playwright;
pub mod runner;
pub mod selectors;
pub mod spec;
pub mod storage;
pub mod target;
pub mod todomvc;

pub use error::{E2eError, E2eResult};
pub use runner::{TestFilter, TestRunner};
pub use spec::{TestCase, TestGroup, TestStep, TestSuite};
pub use storage::TodoRecord;
