//! DOM selectors of the TodoMVC app
//!
//! Selectors are Playwright selector strings. Chaining uses the `>>`
//! combinator, so `nth=` and `text=` engines compose with plain CSS.

/// Input that creates a new item on `Enter`
pub const NEW_TODO: &str = ".new-todo";

/// One row per item in the list
pub const TODO_ITEMS: &str = ".todo-list li";

/// Completion checkbox inside a row
pub const TOGGLE: &str = ".toggle";

/// Filter links footer
pub const FILTERS: &str = ".filters";

/// Every completion checkbox in the list
pub fn toggles() -> String {
    format!("{} {}", TODO_ITEMS, TOGGLE)
}

/// Zero-based `index`th match of `selector`
pub fn nth(selector: &str, index: usize) -> String {
    format!("{} >> nth={}", selector, index)
}

/// Element matching `inner` inside the `index`th match of `outer`
pub fn nth_within(outer: &str, index: usize, inner: &str) -> String {
    format!("{} >> {}", nth(outer, index), inner)
}

/// Filter link by its visible label ("All", "Active", "Completed")
pub fn filter(label: &str) -> String {
    format!("{} >> text={}", FILTERS, label)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_row_toggle() {
        assert_eq!(
            nth_within(TODO_ITEMS, 0, TOGGLE),
            ".todo-list li >> nth=0 >> .toggle"
        );
    }

    #[test]
    fn test_second_toggle() {
        assert_eq!(nth(&toggles(), 1), ".todo-list li .toggle >> nth=1");
    }

    #[test]
    fn test_filter_link() {
        assert_eq!(filter("Active"), ".filters >> text=Active");
    }
}
