//! Declarative test model
//!
//! A [`TestSuite`] holds groups of test cases plus `before_each` hooks at
//! suite and group level. Suites are built in code (see [`crate::todomvc`])
//! or parsed from YAML.

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::{E2eError, E2eResult};

/// A suite of grouped browser tests
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestSuite {
    /// Unique name for this suite
    pub name: String,

    /// Human-readable description
    #[serde(default)]
    pub description: String,

    /// Steps run before every test in every group
    #[serde(default)]
    pub before_each: Vec<TestStep>,

    pub groups: Vec<TestGroup>,
}

/// A `describe` block: tests sharing a hook
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestGroup {
    pub name: String,

    /// Run this group's tests concurrently with each other
    #[serde(default)]
    pub parallel: bool,

    /// Steps run before every test of this group, after the suite hook
    #[serde(default)]
    pub before_each: Vec<TestStep>,

    pub tests: Vec<TestCase>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestCase {
    pub name: String,

    /// Tags for filtering tests
    #[serde(default)]
    pub tags: Vec<String>,

    /// Steps to execute in order
    pub steps: Vec<TestStep>,
}

/// A single step in a test
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum TestStep {
    /// Navigate to a URL. Relative URLs (including the empty string)
    /// resolve against the base URL.
    Goto {
        #[serde(default)]
        url: String,
    },

    Reload,

    GoBack,

    /// Fill an input field
    Fill {
        selector: String,
        value: String,
    },

    /// Press a key on an element
    Press {
        selector: String,
        key: String,
    },

    Click {
        selector: String,
    },

    Check {
        selector: String,
    },

    Uncheck {
        selector: String,
    },

    /// Matched elements have exactly these texts, in order
    ExpectText {
        selector: String,
        texts: Vec<String>,
    },

    /// Matched elements have exactly these class attributes, in order
    ExpectClass {
        selector: String,
        classes: Vec<String>,
    },

    ExpectCount {
        selector: String,
        count: usize,
    },

    /// Poll storage until this many items are completed
    WaitForCompletedCount {
        expected: usize,
    },

    /// Poll storage until an item with this title is persisted
    WaitForTitle {
        title: String,
    },

    /// Create items through the UI, one fill + Enter each
    CreateTodos {
        items: Vec<String>,
    },

    /// Named group of steps, reported as one step
    Step {
        name: String,
        steps: Vec<TestStep>,
    },

    Screenshot {
        name: String,
    },

    /// Log a message (for debugging)
    Log {
        message: String,
    },
}

impl TestStep {
    /// Short label used in logs and step results
    pub fn label(&self) -> String {
        match self {
            TestStep::Goto { url } if url.is_empty() => "goto:/".to_string(),
            TestStep::Goto { url } => format!("goto:{}", url),
            TestStep::Reload => "reload".to_string(),
            TestStep::GoBack => "go_back".to_string(),
            TestStep::Fill { selector, .. } => format!("fill:{}", selector),
            TestStep::Press { selector, key } => format!("press:{}:{}", selector, key),
            TestStep::Click { selector } => format!("click:{}", selector),
            TestStep::Check { selector } => format!("check:{}", selector),
            TestStep::Uncheck { selector } => format!("uncheck:{}", selector),
            TestStep::ExpectText { selector, .. } => format!("expect_text:{}", selector),
            TestStep::ExpectClass { selector, .. } => format!("expect_class:{}", selector),
            TestStep::ExpectCount { selector, count } => {
                format!("expect_count:{}={}", selector, count)
            }
            TestStep::WaitForCompletedCount { expected } => {
                format!("wait_for_completed_count:{}", expected)
            }
            TestStep::WaitForTitle { title } => format!("wait_for_title:{}", title),
            TestStep::CreateTodos { items } => format!("create_todos:{}", items.len()),
            TestStep::Step { name, .. } => format!("step:{}", name),
            TestStep::Screenshot { name } => format!("screenshot:{}", name),
            TestStep::Log { message } => {
                format!("log:{}", message.chars().take(30).collect::<String>())
            }
        }
    }
}

impl TestSuite {
    /// Parse a suite from a YAML string
    pub fn from_yaml(yaml: &str) -> E2eResult<Self> {
        let suite: Self = serde_yaml::from_str(yaml)?;
        suite.validate()?;
        Ok(suite)
    }

    /// Parse a suite from a YAML file
    pub fn from_file(path: &Path) -> E2eResult<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
            .map_err(|e| E2eError::SpecParse(format!("{}: {}", path.display(), e)))
    }

    /// Load all suites from a directory, sorted by path
    pub fn load_all(dir: &Path) -> E2eResult<Vec<Self>> {
        let mut paths: Vec<_> = walkdir::WalkDir::new(dir)
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| {
                e.path()
                    .extension()
                    .map(|ext| ext == "yaml" || ext == "yml")
                    .unwrap_or(false)
            })
            .map(|e| e.into_path())
            .collect();
        paths.sort();

        paths.iter().map(|p| Self::from_file(p)).collect()
    }

    /// Reject suites whose reports would be ambiguous
    pub fn validate(&self) -> E2eResult<()> {
        let mut seen = std::collections::HashSet::new();
        for group in &self.groups {
            for test in &group.tests {
                if !seen.insert((group.name.as_str(), test.name.as_str())) {
                    return Err(E2eError::SpecParse(format!(
                        "duplicate test '{}' in group '{}'",
                        test.name, group.name
                    )));
                }
            }
        }
        Ok(())
    }

    pub fn test_count(&self) -> usize {
        self.groups.iter().map(|g| g.tests.len()).sum()
    }
}
