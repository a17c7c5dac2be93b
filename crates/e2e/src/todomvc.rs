//! The built-in TodoMVC suite
//!
//! Every test starts from a fresh page at the base URL. The Routing group
//! additionally creates the three fixture items and waits until they are
//! persisted before the test body runs; navigating away earlier can lose
//! items in some framework implementations.

use crate::selectors::{self, NEW_TODO, TODO_ITEMS, TOGGLE};
use crate::spec::{TestCase, TestGroup, TestStep, TestSuite};

/// Public demo deployment
pub const DEFAULT_BASE_URL: &str = "https://demo.playwright.dev/todomvc";

/// Fixture items, in creation order
pub const TODO_ITEMS_FIXTURE: [&str; 3] = [
    "buy some cheese",
    "feed the cat",
    "book a doctors appointment",
];

/// Fill the new-item input and press Enter, once per item
pub fn create_todos<S: AsRef<str>>(items: &[S]) -> Vec<TestStep> {
    items
        .iter()
        .flat_map(|item| {
            [
                TestStep::Fill {
                    selector: NEW_TODO.to_string(),
                    value: item.as_ref().to_string(),
                },
                TestStep::Press {
                    selector: NEW_TODO.to_string(),
                    key: "Enter".to_string(),
                },
            ]
        })
        .collect()
}

pub fn create_default_todos() -> Vec<TestStep> {
    create_todos(&TODO_ITEMS_FIXTURE)
}

pub fn suite() -> TestSuite {
    TestSuite {
        name: "todomvc".to_string(),
        description: "Persistence and routing of the TodoMVC demo".to_string(),
        before_each: vec![TestStep::Goto { url: String::new() }],
        groups: vec![persistence(), routing()],
    }
}

fn persistence() -> TestGroup {
    let [first, second, _] = TODO_ITEMS_FIXTURE;

    let mut steps = create_todos(&[first, second]);
    steps.push(TestStep::Check {
        selector: selectors::nth_within(TODO_ITEMS, 0, TOGGLE),
    });
    steps.extend(expect_rows(&[first, second], &["completed", ""]));
    steps.push(TestStep::WaitForCompletedCount { expected: 1 });
    steps.push(TestStep::Reload);
    steps.extend(expect_rows(&[first, second], &["completed", ""]));

    TestGroup {
        name: "Persistence".to_string(),
        parallel: true,
        before_each: Vec::new(),
        tests: vec![case("should persist its data", &["persistence"], steps)],
    }
}

fn routing() -> TestGroup {
    let [first, _, third] = TODO_ITEMS_FIXTURE;

    let mut before_each = create_default_todos();
    before_each.push(TestStep::WaitForTitle {
        title: first.to_string(),
    });

    let mut active = complete_second();
    active.push(click_filter("Active"));
    active.push(expect_count(2));
    active.push(TestStep::ExpectText {
        selector: TODO_ITEMS.to_string(),
        texts: vec![first.to_string(), third.to_string()],
    });

    let mut back_button = complete_second();
    back_button.push(named(
        "Showing all items",
        vec![click_filter("All"), expect_count(3)],
    ));
    back_button.push(named("Showing active items", vec![click_filter("Active")]));
    back_button.push(named(
        "Showing completed items",
        vec![click_filter("Completed")],
    ));
    back_button.extend([
        expect_count(1),
        TestStep::GoBack,
        expect_count(2),
        TestStep::GoBack,
        expect_count(3),
    ]);

    let mut completed = complete_second();
    completed.push(click_filter("Completed"));
    completed.push(expect_count(1));

    let mut all = complete_second();
    all.extend([
        click_filter("Active"),
        click_filter("Completed"),
        click_filter("All"),
        expect_count(3),
    ]);

    let highlight = vec![
        expect_selected("All"),
        click_filter("Active"),
        expect_selected("Active"),
        click_filter("Completed"),
        expect_selected("Completed"),
    ];

    TestGroup {
        name: "Routing main".to_string(),
        parallel: true,
        before_each,
        tests: vec![
            case("should allow me to display active items", &["routing"], active),
            case("should respect the back button", &["routing"], back_button),
            case("should allow me to display completed items", &["routing"], completed),
            case("should allow me to display all items", &["routing"], all),
            case(
                "should highlight the currently applied filter",
                &["routing"],
                highlight,
            ),
        ],
    }
}

fn case(name: &str, tags: &[&str], steps: Vec<TestStep>) -> TestCase {
    TestCase {
        name: name.to_string(),
        tags: tags.iter().map(|t| t.to_string()).collect(),
        steps,
    }
}

fn named(name: &str, steps: Vec<TestStep>) -> TestStep {
    TestStep::Step {
        name: name.to_string(),
        steps,
    }
}

/// Mark the second item done and wait for it to be persisted
fn complete_second() -> Vec<TestStep> {
    vec![
        TestStep::Check {
            selector: selectors::nth(&selectors::toggles(), 1),
        },
        TestStep::WaitForCompletedCount { expected: 1 },
    ]
}

fn click_filter(label: &str) -> TestStep {
    TestStep::Click {
        selector: selectors::filter(label),
    }
}

fn expect_count(count: usize) -> TestStep {
    TestStep::ExpectCount {
        selector: TODO_ITEMS.to_string(),
        count,
    }
}

fn expect_selected(label: &str) -> TestStep {
    TestStep::ExpectClass {
        selector: selectors::filter(label),
        classes: vec!["selected".to_string()],
    }
}

fn expect_rows(texts: &[&str], classes: &[&str]) -> [TestStep; 2] {
    [
        TestStep::ExpectText {
            selector: TODO_ITEMS.to_string(),
            texts: texts.iter().map(|t| t.to_string()).collect(),
        },
        TestStep::ExpectClass {
            selector: TODO_ITEMS.to_string(),
            classes: classes.iter().map(|c| c.to_string()).collect(),
        },
    ]
}
